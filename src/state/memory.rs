//! In-memory ramp store for development and tests

use super::{RampStore, SubsidyRecord};
use crate::error::{RampError, RampResult};
use crate::ramp::{RampState, RampUpdate};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

struct Lease {
    owner: String,
    taken_at: DateTime<Utc>,
}

struct Entry {
    state: RampState,
    lease: Option<Lease>,
}

#[derive(Default)]
pub struct MemoryRampStore {
    ramps: RwLock<HashMap<Uuid, Entry>>,
    subsidies: RwLock<Vec<SubsidyRecord>>,
}

impl MemoryRampStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RampStore for MemoryRampStore {
    async fn create(&self, state: &RampState) -> RampResult<()> {
        let mut ramps = self.ramps.write().await;
        if ramps.contains_key(&state.id) {
            return Err(RampError::Validation(format!("ramp {} already exists", state.id)));
        }
        if ramps.values().any(|e| e.state.quote_id == state.quote_id) {
            return Err(RampError::Validation(format!(
                "quote {} is already bound to a ramp",
                state.quote_id
            )));
        }
        ramps.insert(
            state.id,
            Entry {
                state: state.clone(),
                lease: None,
            },
        );
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RampResult<Option<RampState>> {
        Ok(self.ramps.read().await.get(&id).map(|e| e.state.clone()))
    }

    async fn update(&self, id: Uuid, update: RampUpdate) -> RampResult<RampState> {
        let mut ramps = self.ramps.write().await;
        let entry = ramps.get_mut(&id).ok_or(RampError::NotFound(id))?;
        // apply() validates before mutating, so a rejected update leaves the entry as is
        entry.state.apply(update)?;
        Ok(entry.state.clone())
    }

    async fn list_stale(&self, before: DateTime<Utc>, limit: usize) -> RampResult<Vec<RampState>> {
        let ramps = self.ramps.read().await;
        let mut stale: Vec<RampState> = ramps
            .values()
            .map(|e| &e.state)
            .filter(|s| {
                !s.is_settled()
                    && !s.is_parked()
                    && s.presigned_txs.is_some()
                    && s.updated_at < before
            })
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }

    async fn try_acquire_lease(&self, id: Uuid, owner: &str, ttl: Duration) -> RampResult<bool> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| RampError::Config(format!("invalid lease ttl: {}", e)))?;
        let now = Utc::now();

        let mut ramps = self.ramps.write().await;
        let entry = ramps.get_mut(&id).ok_or(RampError::NotFound(id))?;
        let free = match entry.lease {
            None => true,
            Some(ref lease) => now - lease.taken_at >= ttl,
        };
        if free {
            entry.lease = Some(Lease {
                owner: owner.to_string(),
                taken_at: now,
            });
        }
        Ok(free)
    }

    async fn renew_lease(&self, id: Uuid, owner: &str) -> RampResult<bool> {
        let mut ramps = self.ramps.write().await;
        let entry = ramps.get_mut(&id).ok_or(RampError::NotFound(id))?;
        match entry.lease {
            Some(ref mut lease) if lease.owner == owner => {
                lease.taken_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lease(&self, id: Uuid, owner: &str) -> RampResult<()> {
        let mut ramps = self.ramps.write().await;
        if let Some(entry) = ramps.get_mut(&id) {
            if entry.lease.as_ref().map(|l| l.owner == owner).unwrap_or(false) {
                entry.lease = None;
            }
        }
        Ok(())
    }

    async fn record_subsidy(&self, record: &SubsidyRecord) -> RampResult<()> {
        self.subsidies.write().await.push(record.clone());
        Ok(())
    }

    async fn subsidies(&self, ramp_id: Uuid) -> RampResult<Vec<SubsidyRecord>> {
        Ok(self
            .subsidies
            .read()
            .await
            .iter()
            .filter(|r| r.ramp_id == ramp_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> RampResult<()> {
        Ok(())
    }
}
