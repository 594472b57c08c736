//! Phase-tagged transaction records produced by the external transaction builders

use super::phase::{Network, RampPhase};
use crate::error::{RampError, RampResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque transaction payload
///
/// Signed transactions travel as encoded strings (RLP hex, SCALE hex, XDR base64).
/// Unsigned EVM transactions and typed-data payloads are structured JSON that only the
/// signing client interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TxData {
    Encoded(String),
    Structured(serde_json::Value),
}

impl TxData {
    pub fn is_empty(&self) -> bool {
        match self {
            TxData::Encoded(s) => s.trim().is_empty(),
            TxData::Structured(v) => v.is_null(),
        }
    }

    /// Encoded form, required for submission
    pub fn encoded(&self, phase: RampPhase) -> RampResult<&str> {
        match self {
            TxData::Encoded(s) => Ok(s.as_str()),
            TxData::Structured(_) => Err(RampError::Validation(format!(
                "presigned transaction for {} is not an encoded transaction",
                phase
            ))),
        }
    }
}

/// A transaction the client must sign, or its signed counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsignedTx {
    pub network: Network,
    pub phase: RampPhase,
    pub nonce: u64,
    pub signer: String,
    pub tx_data: TxData,
    #[serde(default)]
    pub meta: serde_json::Value,
}

pub type PresignedTx = UnsignedTx;

impl UnsignedTx {
    /// Whether `other` is the signed counterpart of this entry
    pub fn matches(&self, other: &PresignedTx) -> bool {
        self.phase == other.phase
            && self.network == other.network
            && self.nonce == other.nonce
            && self.signer.eq_ignore_ascii_case(&other.signer)
    }
}

/// Asset identifier on a specific network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AssetId {
    /// Native currency of the network
    Native,
    /// ERC-20 token contract
    Erc20 { address: String },
    /// `assets` pallet id (AssetHub)
    SubstrateAsset { id: u32 },
    /// `tokens` pallet currency id (Pendulum)
    OrmlToken { currency: serde_json::Value },
    /// Stellar credit asset
    StellarCredit { code: String, issuer: String },
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => write!(f, "native"),
            AssetId::Erc20 { address } => write!(f, "erc20:{}", address),
            AssetId::SubstrateAsset { id } => write!(f, "asset:{}", id),
            AssetId::OrmlToken { currency } => write!(f, "token:{}", currency),
            AssetId::StellarCredit { code, issuer } => write!(f, "{}:{}", code, issuer),
        }
    }
}
