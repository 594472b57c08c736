//! Nonce management for funding accounts
//!
//! Funding accounts are shared by every ramp. Allocation is serialized per
//! (network, account): a `NonceLease` holds the account's slot until the transaction
//! is broadcast and committed, or dropped, which releases the nonce for reuse.

use crate::chain::ChainClient;
use crate::error::RampResult;
use crate::ramp::Network;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Per-account nonce state
#[derive(Default)]
struct AccountNonceState {
    /// Next nonce known locally, ahead of the chain while transactions are in flight
    next: Option<u64>,
}

/// Exclusive right to send the next transaction of one account
pub struct NonceLease {
    guard: OwnedMutexGuard<AccountNonceState>,
    nonce: u64,
    network: Network,
}

impl NonceLease {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Mark the nonce as used; the next lease continues after it
    pub fn commit(mut self) {
        self.guard.next = Some(self.nonce + 1);
        debug!("Committed nonce {} on {}", self.nonce, self.network);
    }
}

/// Manages nonces across networks and funding accounts
#[derive(Default)]
pub struct NonceManager {
    accounts: DashMap<(Network, String), Arc<Mutex<AccountNonceState>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the account's slot and allocate its next nonce
    pub async fn acquire(&self, client: &dyn ChainClient, account: &str) -> RampResult<NonceLease> {
        let network = client.network();
        let slot = self
            .accounts
            .entry((network, account.to_ascii_lowercase()))
            .or_default()
            .clone();

        let mut guard = slot.lock_owned().await;
        let on_chain = client.next_nonce(account).await?;

        let nonce = match guard.next {
            Some(local) if local >= on_chain => local,
            Some(local) => {
                // Detect gaps
                warn!(
                    "Nonce for {} on {} advanced outside this process: local {}, chain {}",
                    account, network, local, on_chain
                );
                on_chain
            }
            None => on_chain,
        };
        guard.next = Some(nonce);

        debug!("Allocated nonce {} for {} on {}", nonce, account, network);
        Ok(NonceLease {
            guard,
            nonce,
            network,
        })
    }
}
