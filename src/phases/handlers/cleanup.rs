//! Cleanup phases: sweep residual working balances back to the funding account
//!
//! The user's transfer has already completed when these run, so failures are logged and
//! never fail the ramp. Completion is recorded in metadata, which is what makes a second
//! run a no-op.

use super::common::submit_presigned_once;
use crate::error::RampResult;
use crate::phases::handler::{PhaseDeps, PhaseHandler, PhaseStep};
use crate::ramp::{RampMetadata, RampPhase, RampState, RampUpdate};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

pub struct CleanupHandler {
    phase: RampPhase,
    deps: PhaseDeps,
}

impl CleanupHandler {
    pub fn new(phase: RampPhase, deps: PhaseDeps) -> Self {
        Self { phase, deps }
    }

    async fn has_residual(&self, state: &RampState) -> RampResult<bool> {
        for holding in state.metadata.cleanup_holdings_for(self.phase) {
            let client = self.deps.chains.get(holding.network)?;
            if client.balance(&holding.account, &holding.asset).await? > Decimal::ZERO {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl PhaseHandler for CleanupHandler {
    fn phase(&self) -> RampPhase {
        self.phase
    }

    fn fatal_on_error(&self) -> bool {
        false
    }

    async fn already_applied(&self, state: &RampState) -> RampResult<bool> {
        Ok(state.metadata.completed_cleanups.contains(&self.phase))
    }

    async fn apply(&self, state: &RampState) -> RampResult<PhaseStep> {
        let untracked = state.metadata.cleanup_holdings_for(self.phase).is_empty();

        if untracked || self.has_residual(state).await? {
            match state.presigned_tx(self.phase) {
                Some(tx) => submit_presigned_once(&self.deps, state, tx).await?,
                None if untracked => info!(
                    ramp_id = %state.id,
                    phase = %self.phase,
                    "No cleanup transaction for this ramp"
                ),
                None => warn!(
                    ramp_id = %state.id,
                    phase = %self.phase,
                    "Residual balance left behind, no cleanup transaction was signed"
                ),
            }
        } else {
            info!(ramp_id = %state.id, phase = %self.phase, "Working accounts already empty");
        }

        let done = RampMetadata::with_completed_cleanup(self.phase);
        self.deps
            .store
            .update(state.id, RampUpdate::metadata(done))
            .await?;
        Ok(PhaseStep::Done)
    }
}
