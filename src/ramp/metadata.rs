//! Typed ramp metadata
//!
//! Written by the transaction builders at registration and by handlers while a ramp
//! progresses. Fields are only ever set or extended, never cleared. Handlers read the
//! fields they need through the `require_*` accessors, which fail with a named
//! `MissingMetadata` error instead of assuming presence.

use super::phase::{Network, RampPhase};
use super::tx::AssetId;
use crate::error::{RampError, RampResult};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An asset held by an account on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAsset {
    pub network: Network,
    pub account: String,
    pub asset: AssetId,
}

/// Balance an account must hold for a phase to count as done (raw units)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceExpectation {
    #[serde(flatten)]
    pub holding: AccountAsset,
    pub amount_raw: Decimal,
}

/// Stellar account receiving the anchor payout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StellarTarget {
    pub account_id: String,
    pub asset_code: String,
    pub asset_issuer: String,
}

/// Receiver-contract call that releases bridged funds on Moonbeam
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoonbeamReceiverCall {
    pub receiver_contract: String,
    /// bytes32, hex encoded
    pub receiver_id: String,
    /// Payload forwarded to the XCM, hex encoded
    pub payload: String,
}

/// A transaction signed by a funding account, persisted before it is broadcast
///
/// Keeping the encoded bytes lets a restarted run rebroadcast the exact transaction
/// instead of signing a second one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingTx {
    pub phase: RampPhase,
    pub network: Network,
    pub hash: String,
    pub encoded: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RampMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm_ephemeral_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substrate_ephemeral_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stellar_ephemeral_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stellar_target: Option<StellarTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moonbeam_receiver_call: Option<MoonbeamReceiverCall>,
    /// Destination balances that prove a bridge phase landed
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expected_arrivals: BTreeMap<RampPhase, BalanceExpectation>,
    /// Balances the subsidize phases top up to
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subsidy_targets: BTreeMap<RampPhase, BalanceExpectation>,
    /// Native balances each ephemeral account needs for fees, one per network
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ephemeral_funding: Vec<BalanceExpectation>,
    /// Working balances a cleanup phase sweeps back to the funding account
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cleanup_holdings: BTreeMap<RampPhase, Vec<AccountAsset>>,
    /// Hashes of client-signed transactions, recorded before broadcast when derivable
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub submitted_hashes: BTreeMap<RampPhase, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funding_txs: Vec<FundingTx>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub completed_cleanups: BTreeSet<RampPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
}

fn require<'a, T>(
    value: &'a Option<T>,
    phase: RampPhase,
    field: &'static str,
) -> RampResult<&'a T> {
    value
        .as_ref()
        .ok_or(RampError::MissingMetadata { phase, field })
}

impl RampMetadata {
    /// Patch carrying only a submitted hash
    pub fn with_submitted_hash(phase: RampPhase, hash: impl Into<String>) -> Self {
        let mut patch = Self::default();
        patch.submitted_hashes.insert(phase, hash.into());
        patch
    }

    /// Patch carrying only a funding transaction
    pub fn with_funding_tx(tx: FundingTx) -> Self {
        Self {
            funding_txs: vec![tx],
            ..Default::default()
        }
    }

    /// Patch marking a cleanup phase as done
    pub fn with_completed_cleanup(phase: RampPhase) -> Self {
        let mut patch = Self::default();
        patch.completed_cleanups.insert(phase);
        patch
    }

    /// Merge `patch` into `self`; set fields overwrite, nothing is removed
    pub fn merge(&mut self, patch: RampMetadata) {
        fn set<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        set(&mut self.evm_ephemeral_address, patch.evm_ephemeral_address);
        set(&mut self.substrate_ephemeral_address, patch.substrate_ephemeral_address);
        set(&mut self.stellar_ephemeral_account_id, patch.stellar_ephemeral_account_id);
        set(&mut self.stellar_target, patch.stellar_target);
        set(&mut self.moonbeam_receiver_call, patch.moonbeam_receiver_call);
        set(&mut self.additional_data, patch.additional_data);
        self.expected_arrivals.extend(patch.expected_arrivals);
        self.subsidy_targets.extend(patch.subsidy_targets);
        if !patch.ephemeral_funding.is_empty() {
            self.ephemeral_funding = patch.ephemeral_funding;
        }
        self.cleanup_holdings.extend(patch.cleanup_holdings);
        self.submitted_hashes.extend(patch.submitted_hashes);
        for tx in patch.funding_txs {
            self.funding_txs
                .retain(|t| !(t.phase == tx.phase && t.network == tx.network));
            self.funding_txs.push(tx);
        }
        self.completed_cleanups.extend(patch.completed_cleanups);
    }

    pub fn require_substrate_ephemeral(&self, phase: RampPhase) -> RampResult<&str> {
        require(&self.substrate_ephemeral_address, phase, "substrateEphemeralAddress")
            .map(String::as_str)
    }

    pub fn require_stellar_target(&self, phase: RampPhase) -> RampResult<&StellarTarget> {
        require(&self.stellar_target, phase, "stellarTarget")
    }

    pub fn require_receiver_call(&self, phase: RampPhase) -> RampResult<&MoonbeamReceiverCall> {
        require(&self.moonbeam_receiver_call, phase, "moonbeamReceiverCall")
    }

    pub fn require_arrival(&self, phase: RampPhase) -> RampResult<&BalanceExpectation> {
        self.expected_arrivals
            .get(&phase)
            .ok_or(RampError::MissingMetadata {
                phase,
                field: "expectedArrivals",
            })
    }

    pub fn require_subsidy_target(&self, phase: RampPhase) -> RampResult<&BalanceExpectation> {
        self.subsidy_targets
            .get(&phase)
            .ok_or(RampError::MissingMetadata {
                phase,
                field: "subsidyTargets",
            })
    }

    pub fn require_ephemeral_funding(&self, phase: RampPhase) -> RampResult<&[BalanceExpectation]> {
        if self.ephemeral_funding.is_empty() {
            return Err(RampError::MissingMetadata {
                phase,
                field: "ephemeralFunding",
            });
        }
        Ok(&self.ephemeral_funding)
    }

    pub fn cleanup_holdings_for(&self, phase: RampPhase) -> &[AccountAsset] {
        self.cleanup_holdings
            .get(&phase)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn submitted_hash(&self, phase: RampPhase) -> Option<&str> {
        self.submitted_hashes.get(&phase).map(String::as_str)
    }

    /// Funding transaction `phase` signed for `network`, if any
    pub fn funding_tx(&self, phase: RampPhase, network: Network) -> Option<&FundingTx> {
        self.funding_txs
            .iter()
            .find(|t| t.phase == phase && t.network == network)
    }
}
