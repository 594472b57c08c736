//! EVM client with multi-RPC support and automatic failover

use super::{ChainClient, TxStatus};
use crate::config::NetworkConfig;
use crate::error::{RampError, RampResult};
use crate::ramp::{AssetId, Network};

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// `balanceOf(address)` call data
pub fn erc20_balance_of_calldata(owner: Address) -> Bytes {
    let mut data = ethers::utils::id("balanceOf(address)").to_vec();
    data.extend(abi::encode(&[Token::Address(owner)]));
    data.into()
}

pub fn parse_address(network: Network, value: &str) -> RampResult<Address> {
    value
        .parse::<Address>()
        .map_err(|e| RampError::Validation(format!("invalid {} address {}: {}", network, value, e)))
}

pub fn u256_to_decimal(network: Network, value: U256) -> RampResult<Decimal> {
    Decimal::from_str(&value.to_string())
        .map_err(|e| RampError::chain(network, format!("amount {} out of range: {}", value, e)))
}

/// Hash of a raw signed transaction: keccak256 over its RLP bytes
pub fn raw_tx_hash(encoded_tx: &str) -> Option<String> {
    let raw = ::hex::decode(encoded_tx.trim_start_matches("0x")).ok()?;
    Some(format!("{:?}", H256::from(ethers::utils::keccak256(raw))))
}

/// Multi-provider EVM client
pub struct EvmClient {
    network: Network,
    confirmation_blocks: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl EvmClient {
    pub fn new(network: Network, config: &NetworkConfig) -> RampResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.endpoints {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(100)));
                    debug!("Added HTTP provider for {}: {}", network, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(RampError::chain(network, "no valid RPC providers"));
        }

        Ok(Self {
            network,
            confirmation_blocks: config.confirmation_blocks.max(1),
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("{} failover to provider {}", self.network, next);
    }

    fn parse_hash(&self, hash: &str) -> RampResult<H256> {
        hash.parse::<H256>().map_err(|e| {
            RampError::Validation(format!("invalid {} tx hash {}: {}", self.network, hash, e))
        })
    }

    async fn block_number(&self) -> RampResult<u64> {
        let mut last_err = String::from("no providers");
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!("Failed to get block number from {}: {}", self.network, e);
                    last_err = e.to_string();
                    self.failover();
                }
            }
        }

        Err(RampError::chain(self.network, format!("all providers failed: {}", last_err)))
    }

    async fn erc20_balance(&self, token: Address, owner: Address) -> RampResult<U256> {
        let call: TypedTransaction = TransactionRequest::new()
            .to(token)
            .data(erc20_balance_of_calldata(owner))
            .into();

        let mut last_err = String::from("no providers");
        for _ in 0..self.http_providers.len() {
            match self.http().call(&call, None).await {
                Ok(raw) if raw.len() >= 32 => return Ok(U256::from_big_endian(&raw[..32])),
                Ok(raw) => {
                    return Err(RampError::chain(
                        self.network,
                        format!("balanceOf returned {} bytes", raw.len()),
                    ))
                }
                Err(e) => {
                    warn!("balanceOf failed on {}: {}", self.network, e);
                    last_err = e.to_string();
                    self.failover();
                }
            }
        }

        Err(RampError::chain(self.network, format!("all providers failed: {}", last_err)))
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    fn network(&self) -> Network {
        self.network
    }

    async fn submit(&self, encoded_tx: &str) -> RampResult<String> {
        let raw = ::hex::decode(encoded_tx.trim_start_matches("0x"))
            .map_err(|e| RampError::Validation(format!("transaction is not hex encoded: {}", e)))?;

        let pending = self
            .http()
            .send_raw_transaction(Bytes::from(raw))
            .await
            .map_err(|e| RampError::chain(self.network, e))?;

        let hash = format!("{:?}", pending.tx_hash());
        debug!("Submitted {} on {}", hash, self.network);
        Ok(hash)
    }

    fn tx_hash(&self, encoded_tx: &str) -> Option<String> {
        raw_tx_hash(encoded_tx)
    }

    async fn tx_status(&self, hash: &str) -> RampResult<TxStatus> {
        let tx_hash = self.parse_hash(hash)?;

        let receipt = self
            .http()
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| RampError::chain(self.network, e))?;

        match receipt {
            Some(receipt) => {
                if receipt.status != Some(1u64.into()) {
                    return Ok(TxStatus::Failed {
                        reason: "execution reverted".to_string(),
                    });
                }
                let Some(block) = receipt.block_number.map(|b| b.as_u64()) else {
                    return Ok(TxStatus::Pending);
                };
                let current = self.block_number().await?;
                if current.saturating_sub(block) + 1 >= self.confirmation_blocks {
                    Ok(TxStatus::Confirmed { block })
                } else {
                    Ok(TxStatus::Pending)
                }
            }
            None => {
                let known = self
                    .http()
                    .get_transaction(tx_hash)
                    .await
                    .map_err(|e| RampError::chain(self.network, e))?;
                Ok(if known.is_some() {
                    TxStatus::Pending
                } else {
                    TxStatus::NotFound
                })
            }
        }
    }

    async fn balance(&self, account: &str, asset: &AssetId) -> RampResult<Decimal> {
        let owner = parse_address(self.network, account)?;

        let raw = match asset {
            AssetId::Native => self
                .http()
                .get_balance(owner, None)
                .await
                .map_err(|e| RampError::chain(self.network, e))?,
            AssetId::Erc20 { address } => {
                let token = parse_address(self.network, address)?;
                self.erc20_balance(token, owner).await?
            }
            other => {
                return Err(RampError::Validation(format!(
                    "asset {} cannot be held on {}",
                    other, self.network
                )))
            }
        };

        u256_to_decimal(self.network, raw)
    }

    async fn next_nonce(&self, account: &str) -> RampResult<u64> {
        let owner = parse_address(self.network, account)?;
        let nonce = self
            .http()
            .get_transaction_count(owner, None)
            .await
            .map_err(|e| RampError::Nonce {
                network: self.network,
                message: e.to_string(),
            })?;

        Ok(nonce.as_u64())
    }

    async fn latest_block(&self) -> RampResult<u64> {
        self.block_number().await
    }
}
