//! Phases that broadcast one client-signed transaction
//!
//! Covers approvals and swaps on the source EVM chain, the Nabla approve/swap pair on
//! Pendulum, the Stellar anchor payment, the BRLA payout and fee distribution.

use super::common::{presigned_landed, presigned_or_missing, submit_presigned_once};
use crate::error::RampResult;
use crate::phases::handler::{PhaseDeps, PhaseHandler, PhaseStep};
use crate::ramp::{RampPhase, RampState};

use async_trait::async_trait;
use tracing::info;

pub struct PresignedPhaseHandler {
    phase: RampPhase,
    deps: PhaseDeps,
    /// Optional phases are skipped when no transaction was signed for them
    optional: bool,
}

impl PresignedPhaseHandler {
    pub fn required(phase: RampPhase, deps: PhaseDeps) -> Self {
        Self {
            phase,
            deps,
            optional: false,
        }
    }

    pub fn optional(phase: RampPhase, deps: PhaseDeps) -> Self {
        Self {
            phase,
            deps,
            optional: true,
        }
    }
}

#[async_trait]
impl PhaseHandler for PresignedPhaseHandler {
    fn phase(&self) -> RampPhase {
        self.phase
    }

    /// A failed fee distribution does not hold up the user's funds
    fn fatal_on_error(&self) -> bool {
        !self.optional
    }

    async fn already_applied(&self, state: &RampState) -> RampResult<bool> {
        match state.presigned_tx(self.phase) {
            Some(tx) => presigned_landed(&self.deps, state, tx).await,
            None => Ok(false),
        }
    }

    async fn apply(&self, state: &RampState) -> RampResult<PhaseStep> {
        if self.optional && !state.expects_signature(self.phase) {
            info!(ramp_id = %state.id, phase = %self.phase, "Nothing to submit, skipping");
            return Ok(PhaseStep::Done);
        }

        let Some(tx) = presigned_or_missing(state, self.phase)? else {
            return Ok(PhaseStep::Waiting);
        };

        submit_presigned_once(&self.deps, state, &tx).await?;
        Ok(PhaseStep::Done)
    }
}
