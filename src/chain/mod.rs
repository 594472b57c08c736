//! Chain module - read and submit access to every network a ramp touches
//!
//! This module provides:
//! - The `ChainClient` contract shared by EVM, Substrate and Stellar clients
//! - EVM clients with multi-RPC failover
//! - Substrate access through API sidecar instances
//! - Stellar access through Horizon
//! - Bounded confirmation and arrival polling

pub mod confirm;
pub mod evm;
mod rest;
pub mod stellar;
pub mod substrate;

pub use confirm::{wait_for_balance, wait_for_confirmation, wait_until};
pub use evm::EvmClient;
pub use stellar::StellarClient;
pub use substrate::SubstrateClient;

use crate::config::Settings;
use crate::error::{RampError, RampResult};
use crate::ramp::{AssetId, Network, NetworkKind};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};

/// Inclusion status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Confirmed { block: u64 },
    Failed { reason: String },
    NotFound,
}

/// Read and submit access to one network
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn network(&self) -> Network;

    /// Broadcast an encoded signed transaction and return its hash
    async fn submit(&self, encoded_tx: &str) -> RampResult<String>;

    /// Hash `encoded_tx` will be included under, when it can be derived without the node
    fn tx_hash(&self, _encoded_tx: &str) -> Option<String> {
        None
    }

    async fn tx_status(&self, hash: &str) -> RampResult<TxStatus>;

    /// Balance in the asset's smallest unit
    async fn balance(&self, account: &str, asset: &AssetId) -> RampResult<Decimal>;

    /// Nonce the account's next transaction must carry
    async fn next_nonce(&self, account: &str) -> RampResult<u64>;

    /// Latest block or ledger height
    async fn latest_block(&self) -> RampResult<u64>;
}

/// Shared, read-mostly pool of chain clients
#[derive(Default)]
pub struct ChainManager {
    clients: DashMap<Network, Arc<dyn ChainClient>>,
}

impl ChainManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build clients for all enabled networks
    pub fn from_settings(settings: &Settings) -> RampResult<Self> {
        let manager = Self::new();

        for (network, config) in settings.enabled_networks() {
            let client: Arc<dyn ChainClient> = match network.kind() {
                NetworkKind::Evm => Arc::new(EvmClient::new(network, config)?),
                NetworkKind::Substrate => Arc::new(SubstrateClient::new(network, config)?),
                NetworkKind::Stellar => Arc::new(StellarClient::new(config)?),
            };
            manager.register(client);
            info!("Network {} initialized", network);
        }

        Ok(manager)
    }

    pub fn register(&self, client: Arc<dyn ChainClient>) {
        self.clients.insert(client.network(), client);
    }

    pub fn get(&self, network: Network) -> RampResult<Arc<dyn ChainClient>> {
        self.clients
            .get(&network)
            .map(|c| c.clone())
            .ok_or_else(|| RampError::chain(network, "network not configured"))
    }

    /// Health check for all networks
    pub async fn health_check(&self) -> Vec<(Network, bool)> {
        let clients: Vec<_> = self.clients.iter().map(|e| e.value().clone()).collect();
        let mut results = Vec::with_capacity(clients.len());

        for client in clients {
            let network = client.network();
            let healthy = match client.latest_block().await {
                Ok(height) => {
                    crate::metrics::record_block_height(network, height);
                    true
                }
                Err(e) => {
                    error!("Health check failed for {}: {}", network, e);
                    false
                }
            };
            crate::metrics::record_chain_health(network, healthy);
            results.push((network, healthy));
        }

        results
    }

    pub fn connected_networks(&self) -> Vec<Network> {
        let mut networks: Vec<_> = self.clients.iter().map(|e| *e.key()).collect();
        networks.sort();
        networks
    }
}
