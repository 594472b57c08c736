//! Phase processor - drives one ramp through its route
//!
//! A run owns the ramp through two locks: the in-process `RampLocks` entry, and the
//! store's processing lease, which keeps other orchestrator instances out until it is
//! released or expires. The lease is renewed for as long as the run lasts; a run whose
//! lease was taken over stops at once. Within a run phases execute strictly one after
//! another in a bounded loop.

use super::handler::{execute, PhaseOutcome};
use super::lock::RampLocks;
use super::registry::PhaseRegistry;
use crate::config::OrchestratorConfig;
use crate::error::{RampError, RampResult};
use crate::ramp::{RampPhase, RampState};
use crate::state::RampStore;

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why a processor run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The route's last phase is done, or parked after a non-fatal failure
    Terminal { phase: RampPhase },
    /// Waiting on an event not yet observed
    Waiting { phase: RampPhase },
    /// The phase has no handler in this build
    Unimplemented { phase: RampPhase },
    /// Another run owns the ramp
    AlreadyRunning,
    /// Iteration guard hit; the next run continues from `phase`
    IterationLimit { phase: RampPhase },
}

impl ProcessOutcome {
    fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Terminal { .. } => "terminal",
            ProcessOutcome::Waiting { .. } => "waiting",
            ProcessOutcome::Unimplemented { .. } => "unimplemented",
            ProcessOutcome::AlreadyRunning => "already_running",
            ProcessOutcome::IterationLimit { .. } => "iteration_limit",
        }
    }
}

pub struct PhaseProcessor {
    store: Arc<dyn RampStore>,
    registry: Arc<PhaseRegistry>,
    locks: RampLocks,
    owner: String,
    lease_ttl: Duration,
    max_iterations: usize,
}

impl PhaseProcessor {
    pub fn new(
        store: Arc<dyn RampStore>,
        registry: Arc<PhaseRegistry>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            registry,
            locks: RampLocks::new(),
            owner: config.instance_id.clone(),
            lease_ttl: config.lock_ttl(),
            max_iterations: config.max_phase_iterations,
        }
    }

    /// Advance the ramp as far as it can go right now
    pub async fn process_ramp(&self, id: Uuid) -> RampResult<ProcessOutcome> {
        let Some(_guard) = self.locks.try_lock(id) else {
            debug!(ramp_id = %id, "Ramp already being processed in this instance");
            crate::metrics::record_process_run(ProcessOutcome::AlreadyRunning.label());
            return Ok(ProcessOutcome::AlreadyRunning);
        };

        let state = self.store.get(id).await?.ok_or(RampError::NotFound(id))?;

        if !self
            .store
            .try_acquire_lease(id, &self.owner, self.lease_ttl)
            .await?
        {
            info!(ramp_id = %id, "Ramp is leased by another instance");
            crate::metrics::record_process_run(ProcessOutcome::AlreadyRunning.label());
            return Ok(ProcessOutcome::AlreadyRunning);
        }

        let result = tokio::select! {
            result = self.run(state) => result,
            lost = self.hold_lease(id) => Err(lost),
        };

        if let Err(e) = self.store.release_lease(id, &self.owner).await {
            warn!(ramp_id = %id, "Failed to release processing lease: {}", e);
        }

        match result {
            Ok(outcome) => {
                crate::metrics::record_process_run(outcome.label());
                Ok(outcome)
            }
            Err(e) => {
                crate::metrics::record_process_run("failed");
                Err(e)
            }
        }
    }

    /// Renew the lease until it is lost; never returns while it is held
    async fn hold_lease(&self, id: Uuid) -> RampError {
        let period = (self.lease_ttl / 3).max(Duration::from_millis(10));
        let mut renewed_at = Instant::now();

        loop {
            tokio::time::sleep(period).await;
            match self.store.renew_lease(id, &self.owner).await {
                Ok(true) => {
                    renewed_at = Instant::now();
                    debug!(ramp_id = %id, "Processing lease renewed");
                }
                Ok(false) => {
                    warn!(ramp_id = %id, "Processing lease taken over, stopping run");
                    return RampError::LeaseLost(id);
                }
                Err(e) if renewed_at.elapsed() >= self.lease_ttl => {
                    warn!(ramp_id = %id, "Processing lease expired unrenewed: {}", e);
                    return RampError::LeaseLost(id);
                }
                Err(e) => warn!(ramp_id = %id, "Failed to renew processing lease: {}", e),
            }
        }
    }

    async fn run(&self, mut state: RampState) -> RampResult<ProcessOutcome> {
        let id = state.id;
        for _ in 0..self.max_iterations {
            let phase = state.current_phase;
            let Some(handler) = self.registry.get(phase) else {
                warn!(
                    ramp_id = %state.id,
                    phase = %phase,
                    "No handler for phase, ramp parked until support is added"
                );
                return Ok(ProcessOutcome::Unimplemented { phase });
            };

            match execute(handler.as_ref(), state, self.store.as_ref()).await? {
                PhaseOutcome::Advanced(next) => state = next,
                PhaseOutcome::Waiting => return Ok(ProcessOutcome::Waiting { phase }),
                PhaseOutcome::Terminal => {
                    info!(ramp_id = %id, phase = %phase, "Ramp reached its terminal phase");
                    return Ok(ProcessOutcome::Terminal { phase });
                }
            }
        }

        warn!(
            ramp_id = %id,
            phase = %state.current_phase,
            "Iteration limit of {} phases reached",
            self.max_iterations
        );
        Ok(ProcessOutcome::IterationLimit {
            phase: state.current_phase,
        })
    }
}
