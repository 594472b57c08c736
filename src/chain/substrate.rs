//! Substrate client over substrate-api-sidecar

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

/// Finalized blocks searched for a submitted extrinsic
const STATUS_LOOKBACK_BLOCKS: u64 = 20;

#[derive(Serialize)]
struct SubmitRequest<'a> {
    tx: &'a str,
}

#[derive(Deserialize)]
struct SubmitResponse {
    hash: String,
}

#[derive(Deserialize)]
struct BalanceInfo {
    nonce: String,
    free: String,
}

#[derive(Deserialize)]
struct AssetBalances {
    assets: Vec<AssetBalance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetBalance {
    asset_id: String,
    balance: String,
}

#[derive(Deserialize)]
struct StorageValue {
    value: Option<TokenAccount>,
}

#[derive(Deserialize)]
struct TokenAccount {
    free: String,
}

#[derive(Deserialize)]
struct Header {
    number: String,
}

#[derive(Deserialize)]
struct Block {
    extrinsics: Vec<Extrinsic>,
}

#[derive(Deserialize)]
struct Extrinsic {
    hash: String,
    success: bool,
}

pub struct SubstrateClient {
    network: Network,
    rest: RestPool,
}

impl SubstrateClient {
    pub fn new(network: Network, config: &NetworkConfig) -> RampResult<Self> {
        Ok(Self {
            network,
            rest: RestPool::new(network, &config.endpoints)?,
        })
    }

    fn parse_amount(&self, raw: &str) -> RampResult<Decimal> {
        Decimal::from_str(raw)
            .map_err(|e| RampError::chain(self.network, format!("bad amount {}: {}", raw, e)))
    }

    fn parse_number(&self, raw: &str) -> RampResult<u64> {
        raw.parse()
            .map_err(|e| RampError::chain(self.network, format!("bad number {}: {}", raw, e)))
    }
}

/// Storage key form of an ORML currency id
fn currency_key(currency: &serde_json::Value) -> String {
    match currency {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl ChainClient for SubstrateClient {
    fn network(&self) -> Network {
        self.network
    }

    async fn submit(&self, encoded_tx: &str) -> RampResult<String> {
        let response: SubmitResponse = self
            .rest
            .post_json("/transaction", &SubmitRequest { tx: encoded_tx })
            .await?;
        debug!("Submitted {} on {}", response.hash, self.network);
        Ok(response.hash)
    }

    async fn tx_status(&self, hash: &str) -> RampResult<TxStatus> {
        let head = self.latest_block().await?;
        let from = head.saturating_sub(STATUS_LOOKBACK_BLOCKS);

        for number in (from..=head).rev() {
            let Some(block) = self.rest.get::<Block>(&format!("/blocks/{}", number)).await? else {
                continue;
            };
            if let Some(ext) = block
                .extrinsics
                .iter()
                .find(|x| x.hash.eq_ignore_ascii_case(hash))
            {
                return Ok(if ext.success {
                    TxStatus::Confirmed { block: number }
                } else {
                    TxStatus::Failed {
                        reason: "extrinsic failed".to_string(),
                    }
                });
            }
        }

        // Not yet in a finalized block
        Ok(TxStatus::Pending)
    }

    async fn balance(&self, account: &str, asset: &AssetId) -> RampResult<Decimal> {
        match asset {
            AssetId::Native => {
                let info: Option<BalanceInfo> = self
                    .rest
                    .get(&format!("/accounts/{}/balance-info", account))
                    .await?;
                info.map(|i| self.parse_amount(&i.free))
                    .unwrap_or(Ok(Decimal::ZERO))
            }
            AssetId::SubstrateAsset { id } => {
                let balances: Option<AssetBalances> = self
                    .rest
                    .get(&format!("/accounts/{}/asset-balances?assets[]={}", account, id))
                    .await?;
                let id = id.to_string();
                balances
                    .and_then(|b| b.assets.into_iter().find(|a| a.asset_id == id))
                    .map(|a| self.parse_amount(&a.balance))
                    .unwrap_or(Ok(Decimal::ZERO))
            }
            AssetId::OrmlToken { currency } => {
                let path = format!(
                    "/pallets/tokens/storage/accounts?keys[]={}&keys[]={}",
                    account,
                    currency_key(currency)
                );
                let storage: Option<StorageValue> = self.rest.get(&path).await?;
                storage
                    .and_then(|s| s.value)
                    .map(|v| self.parse_amount(&v.free))
                    .unwrap_or(Ok(Decimal::ZERO))
            }
            other => Err(RampError::Validation(format!(
                "asset {} cannot be held on {}",
                other, self.network
            ))),
        }
    }

    async fn next_nonce(&self, account: &str) -> RampResult<u64> {
        let info: Option<BalanceInfo> = self
            .rest
            .get(&format!("/accounts/{}/balance-info", account))
            .await?;
        match info {
            Some(info) => self.parse_number(&info.nonce),
            None => Ok(0),
        }
    }

    async fn latest_block(&self) -> RampResult<u64> {
        let header: Header = self
            .rest
            .get("/blocks/head/header")
            .await?
            .ok_or_else(|| RampError::chain(self.network, "no head header"))?;
        self.parse_number(&header.number)
    }
}
