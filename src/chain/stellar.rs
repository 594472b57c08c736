//! Stellar client over Horizon
//!
//! Balances are reported in stroops so that amounts compare with the raw units used
//! everywhere else.

use super::rest::RestPool;
use super::{ChainClient, TxStatus};
use crate::config::NetworkConfig;
use crate::error::{RampError, RampResult};
use crate::ramp::{AssetId, Network};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

const STROOPS_PER_UNIT: i64 = 10_000_000;

#[derive(Serialize)]
struct SubmitForm<'a> {
    tx: &'a str,
}

#[derive(Deserialize)]
struct TransactionRecord {
    hash: String,
    successful: bool,
    ledger: u64,
}

#[derive(Deserialize)]
struct Account {
    sequence: String,
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct Balance {
    balance: String,
    asset_type: String,
    asset_code: Option<String>,
    asset_issuer: Option<String>,
}

#[derive(Deserialize)]
struct Root {
    history_latest_ledger: u64,
}

pub struct StellarClient {
    rest: RestPool,
}

/// Horizon decimal string to stroops
pub fn to_stroops(amount: &str) -> RampResult<Decimal> {
    let units = Decimal::from_str(amount).map_err(|e| {
        RampError::chain(Network::Stellar, format!("bad amount {}: {}", amount, e))
    })?;
    Ok((units * Decimal::from(STROOPS_PER_UNIT)).normalize())
}

impl StellarClient {
    pub fn new(config: &NetworkConfig) -> RampResult<Self> {
        Ok(Self {
            rest: RestPool::new(Network::Stellar, &config.endpoints)?,
        })
    }

    async fn account(&self, account_id: &str) -> RampResult<Option<Account>> {
        self.rest.get(&format!("/accounts/{}", account_id)).await
    }
}

fn matches_asset(balance: &Balance, asset: &AssetId) -> bool {
    match asset {
        AssetId::Native => balance.asset_type == "native",
        AssetId::StellarCredit { code, issuer } => {
            balance.asset_code.as_deref() == Some(code.as_str())
                && balance.asset_issuer.as_deref() == Some(issuer.as_str())
        }
        _ => false,
    }
}

#[async_trait]
impl ChainClient for StellarClient {
    fn network(&self) -> Network {
        Network::Stellar
    }

    async fn submit(&self, encoded_tx: &str) -> RampResult<String> {
        // Horizon answers once the transaction is in a closed ledger
        let record: TransactionRecord = self
            .rest
            .post_form("/transactions", &SubmitForm { tx: encoded_tx })
            .await?;
        debug!("Submitted {} on stellar (ledger {})", record.hash, record.ledger);
        Ok(record.hash)
    }

    async fn tx_status(&self, hash: &str) -> RampResult<TxStatus> {
        let record: Option<TransactionRecord> =
            self.rest.get(&format!("/transactions/{}", hash)).await?;

        Ok(match record {
            Some(r) if r.successful => TxStatus::Confirmed { block: r.ledger },
            Some(_) => TxStatus::Failed {
                reason: "transaction failed".to_string(),
            },
            None => TxStatus::NotFound,
        })
    }

    async fn balance(&self, account: &str, asset: &AssetId) -> RampResult<Decimal> {
        if !matches!(asset, AssetId::Native | AssetId::StellarCredit { .. }) {
            return Err(RampError::Validation(format!(
                "asset {} cannot be held on stellar",
                asset
            )));
        }

        // Unfunded accounts hold nothing
        let Some(account) = self.account(account).await? else {
            return Ok(Decimal::ZERO);
        };

        match account.balances.iter().find(|b| matches_asset(b, asset)) {
            Some(b) => to_stroops(&b.balance),
            None => Ok(Decimal::ZERO),
        }
    }

    async fn next_nonce(&self, account: &str) -> RampResult<u64> {
        let account = self.account(account).await?.ok_or_else(|| RampError::Nonce {
            network: Network::Stellar,
            message: "account does not exist".to_string(),
        })?;
        let sequence: u64 = account.sequence.parse().map_err(|e| RampError::Nonce {
            network: Network::Stellar,
            message: format!("bad sequence {}: {}", account.sequence, e),
        })?;
        // A transaction carries the account sequence plus one
        Ok(sequence + 1)
    }

    async fn latest_block(&self) -> RampResult<u64> {
        let root: Root = self
            .rest
            .get("/")
            .await?
            .ok_or_else(|| RampError::chain(Network::Stellar, "horizon root not found"))?;
        Ok(root.history_latest_ledger)
    }
}
