//! Maintenance transaction signing for the orchestrator's funding accounts
//!
//! EVM funding transactions are signed locally with a `LocalWallet`; Substrate and
//! Stellar funding keys live behind a remote signing service.

use crate::chain::evm::parse_address;
use crate::config::Settings;
use crate::error::{RampError, RampResult};
use crate::ramp::{AssetId, Network};

use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

/// A signed funding transaction and the hash it will be included under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    pub encoded: String,
    pub hash: String,
}

/// Signs transactions on behalf of the funding accounts
#[async_trait]
pub trait FundingSigner: Send + Sync {
    /// Funding account on `network`
    fn address(&self, network: Network) -> RampResult<String>;

    /// Encoded transfer of `amount_raw` of `asset` to `to`
    async fn sign_transfer(
        &self,
        network: Network,
        to: &str,
        asset: &AssetId,
        amount_raw: Decimal,
        nonce: u64,
    ) -> RampResult<SignedTx>;

    /// Encoded EVM contract call
    async fn sign_contract_call(
        &self,
        network: Network,
        contract: &str,
        calldata: Bytes,
        nonce: u64,
    ) -> RampResult<SignedTx>;
}

pub fn decimal_to_u256(amount: Decimal) -> RampResult<U256> {
    if amount.is_sign_negative() || amount.fract() != Decimal::ZERO {
        return Err(RampError::Validation(format!(
            "amount {} is not a whole number of raw units",
            amount
        )));
    }
    U256::from_dec_str(&amount.trunc().to_string())
        .map_err(|e| RampError::Validation(format!("amount {}: {}", amount, e)))
}

/// `transfer(address,uint256)` call data
pub fn erc20_transfer_calldata(to: Address, amount: U256) -> Bytes {
    let mut data = ethers::utils::id("transfer(address,uint256)").to_vec();
    data.extend(abi::encode(&[Token::Address(to), Token::Uint(amount)]));
    data.into()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteTransferRequest<'a> {
    network: Network,
    from: &'a str,
    to: &'a str,
    asset: &'a AssetId,
    amount_raw: String,
    nonce: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSignResponse {
    tx_data: String,
    tx_hash: String,
}

/// Funding signer backed by a local EVM wallet and a remote signer service
pub struct FundingWallet {
    wallet: Option<LocalWallet>,
    evm_providers: HashMap<Network, Provider<Http>>,
    accounts: HashMap<Network, String>,
    signer_service_url: Option<String>,
    http: reqwest::Client,
}

impl FundingWallet {
    pub fn from_settings(settings: &Settings) -> RampResult<Self> {
        let wallet = match std::env::var(&settings.funding.evm_private_key_env) {
            Ok(key) if !key.trim().is_empty() => Some(
                key.parse::<LocalWallet>()
                    .map_err(|e| RampError::Signer(format!("Invalid private key: {}", e)))?,
            ),
            _ => None,
        };

        let mut evm_providers = HashMap::new();
        let mut accounts = HashMap::new();
        for (network, config) in settings.enabled_networks() {
            if let Some(address) = settings.funding_account(network).filter(|a| !a.is_empty()) {
                accounts.insert(network, address.to_string());
            }
            if network.is_evm() {
                if let Some(url) = config.endpoints.first() {
                    let provider = Provider::<Http>::try_from(url.as_str()).map_err(|e| {
                        RampError::Config(format!("{} endpoint {}: {}", network, url, e))
                    })?;
                    evm_providers.insert(network, provider);
                }
                if let Some(ref wallet) = wallet {
                    accounts.insert(network, format!("{:?}", wallet.address()));
                }
            }
        }

        match wallet {
            Some(ref w) => info!("EVM funding wallet loaded: {:?}", w.address()),
            None => info!(
                "No EVM funding key in {}; EVM funding transactions are disabled",
                settings.funding.evm_private_key_env
            ),
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RampError::Signer(e.to_string()))?;

        Ok(Self {
            wallet,
            evm_providers,
            accounts,
            signer_service_url: settings
                .funding
                .signer_service_url
                .as_ref()
                .filter(|u| !u.trim().is_empty())
                .map(|u| u.trim_end_matches('/').to_string()),
            http,
        })
    }

    fn wallet(&self) -> RampResult<&LocalWallet> {
        self.wallet
            .as_ref()
            .ok_or_else(|| RampError::Signer("no EVM funding key configured".to_string()))
    }

    fn provider(&self, network: Network) -> RampResult<&Provider<Http>> {
        self.evm_providers
            .get(&network)
            .ok_or_else(|| RampError::chain(network, "network not configured"))
    }

    /// Fill gas and chain id, sign, and RLP-encode
    async fn sign_evm(
        &self,
        network: Network,
        request: TransactionRequest,
    ) -> RampResult<SignedTx> {
        let wallet = self.wallet()?;
        let provider = self.provider(network)?;
        let chain_id = network
            .chain_id()
            .ok_or_else(|| RampError::Validation(format!("{} is not an EVM network", network)))?;
        let wallet = wallet.clone().with_chain_id(chain_id);

        let gas_price = provider
            .get_gas_price()
            .await
            .map_err(|e| RampError::chain(network, e))?;

        let mut tx: TypedTransaction = request
            .from(wallet.address())
            .chain_id(chain_id)
            .gas_price(gas_price)
            .into();

        let gas = provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| RampError::chain(network, e))?;
        // 20% headroom
        tx.set_gas(gas * 12 / 10);

        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| RampError::Signer(e.to_string()))?;

        Ok(SignedTx {
            encoded: format!("0x{}", ::hex::encode(tx.rlp_signed(&signature))),
            hash: format!("{:?}", tx.hash(&signature)),
        })
    }

    async fn sign_remote(
        &self,
        network: Network,
        to: &str,
        asset: &AssetId,
        amount_raw: Decimal,
        nonce: u64,
    ) -> RampResult<SignedTx> {
        let base = self
            .signer_service_url
            .as_ref()
            .ok_or_else(|| RampError::Signer("no signer service configured".to_string()))?;
        let from = self.address(network)?;

        let response = self
            .http
            .post(format!("{}/v1/funding/transfer", base))
            .json(&RemoteTransferRequest {
                network,
                from: &from,
                to,
                asset,
                amount_raw: amount_raw.to_string(),
                nonce,
            })
            .send()
            .await
            .map_err(|e| RampError::Signer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RampError::Signer(format!(
                "signer service returned {}",
                response.status()
            )));
        }

        let signed: RemoteSignResponse = response
            .json()
            .await
            .map_err(|e| RampError::Signer(e.to_string()))?;
        Ok(SignedTx {
            encoded: signed.tx_data,
            hash: signed.tx_hash,
        })
    }
}

#[async_trait]
impl FundingSigner for FundingWallet {
    fn address(&self, network: Network) -> RampResult<String> {
        self.accounts
            .get(&network)
            .cloned()
            .ok_or_else(|| RampError::Signer(format!("no funding account for {}", network)))
    }

    async fn sign_transfer(
        &self,
        network: Network,
        to: &str,
        asset: &AssetId,
        amount_raw: Decimal,
        nonce: u64,
    ) -> RampResult<SignedTx> {
        debug!("Signing {} {} transfer to {} on {}", amount_raw, asset, to, network);

        if !network.is_evm() {
            return self.sign_remote(network, to, asset, amount_raw, nonce).await;
        }

        let recipient = parse_address(network, to)?;
        let amount = decimal_to_u256(amount_raw)?;
        let request = match asset {
            AssetId::Native => TransactionRequest::new().to(recipient).value(amount),
            AssetId::Erc20 { address } => TransactionRequest::new()
                .to(parse_address(network, address)?)
                .data(erc20_transfer_calldata(recipient, amount)),
            other => {
                return Err(RampError::Validation(format!(
                    "asset {} cannot be transferred on {}",
                    other, network
                )))
            }
        };

        self.sign_evm(network, request.nonce(nonce)).await
    }

    async fn sign_contract_call(
        &self,
        network: Network,
        contract: &str,
        calldata: Bytes,
        nonce: u64,
    ) -> RampResult<SignedTx> {
        let request = TransactionRequest::new()
            .to(parse_address(network, contract)?)
            .data(calldata)
            .nonce(nonce);
        self.sign_evm(network, request).await
    }
}
