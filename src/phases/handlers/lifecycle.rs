//! Entry and exit phases

use crate::error::RampResult;
use crate::phases::handler::{PhaseHandler, PhaseStep};
use crate::ramp::{RampPhase, RampState};

use async_trait::async_trait;

/// Holds a registered ramp until the client's signatures are stored
pub struct InitialHandler;

#[async_trait]
impl PhaseHandler for InitialHandler {
    fn phase(&self) -> RampPhase {
        RampPhase::Initial
    }

    async fn already_applied(&self, _state: &RampState) -> RampResult<bool> {
        Ok(false)
    }

    async fn apply(&self, state: &RampState) -> RampResult<PhaseStep> {
        Ok(if state.presigned_txs.is_some() {
            PhaseStep::Done
        } else {
            PhaseStep::Waiting
        })
    }
}

pub struct CompleteHandler;

#[async_trait]
impl PhaseHandler for CompleteHandler {
    fn phase(&self) -> RampPhase {
        RampPhase::Complete
    }

    async fn already_applied(&self, _state: &RampState) -> RampResult<bool> {
        Ok(false)
    }

    async fn apply(&self, _state: &RampState) -> RampResult<PhaseStep> {
        Ok(PhaseStep::Done)
    }
}
