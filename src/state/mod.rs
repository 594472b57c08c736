//! Ramp state persistence
//!
//! Handles:
//! - Atomic, validated updates of ramp state
//! - Processing leases that outlive a crashed process only until they expire
//! - The subsidy ledger
//! - Stale-ramp discovery for the recovery worker

mod memory;
mod postgres;

pub use memory::MemoryRampStore;
pub use postgres::PgRampStore;

use crate::error::RampResult;
use crate::ramp::{AssetId, Network, RampPhase, RampState, RampUpdate};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One transfer made from a funding account to cover a shortfall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsidyRecord {
    pub ramp_id: Uuid,
    pub phase: RampPhase,
    pub network: Network,
    pub asset: AssetId,
    pub amount_raw: Decimal,
    pub payer: String,
    pub tx_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Storage contract for ramp state
///
/// `update` is atomic per ramp id: concurrent updates never interleave and a rejected
/// update leaves the stored state untouched.
#[async_trait]
pub trait RampStore: Send + Sync {
    /// Persist a freshly registered ramp
    async fn create(&self, state: &RampState) -> RampResult<()>;

    async fn get(&self, id: Uuid) -> RampResult<Option<RampState>>;

    /// Apply `update` atomically and return the resulting state
    async fn update(&self, id: Uuid, update: RampUpdate) -> RampResult<RampState>;

    /// Unsettled, unparked ramps with presigned transactions, untouched since `before`
    async fn list_stale(&self, before: DateTime<Utc>, limit: usize) -> RampResult<Vec<RampState>>;

    /// Take the processing lease unless another owner holds a lease younger than `ttl`
    async fn try_acquire_lease(&self, id: Uuid, owner: &str, ttl: Duration) -> RampResult<bool>;

    /// Refresh a lease `owner` still holds; `false` when it is gone or held by someone else
    async fn renew_lease(&self, id: Uuid, owner: &str) -> RampResult<bool>;

    async fn release_lease(&self, id: Uuid, owner: &str) -> RampResult<()>;

    async fn record_subsidy(&self, record: &SubsidyRecord) -> RampResult<()>;

    async fn subsidies(&self, ramp_id: Uuid) -> RampResult<Vec<SubsidyRecord>>;

    async fn health_check(&self) -> RampResult<()>;
}
