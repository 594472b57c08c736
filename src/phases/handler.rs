//! Phase handler contract and the single-phase execution step

use crate::chain::ChainManager;
use crate::config::ConfirmationConfig;
use crate::error::{RampError, RampResult};
use crate::ramp::{ErrorLogEntry, PhaseTransition, RampPhase, RampState, RampUpdate};
use crate::state::RampStore;
use crate::tx::{FundingSigner, NonceManager};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of a handler's side-effecting step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseStep {
    /// The phase's effect is committed
    Done,
    /// Blocked on something outside the orchestrator (e.g. client signatures)
    Waiting,
}

/// Collaborators shared by every handler, injected when the registry is built
#[derive(Clone)]
pub struct PhaseDeps {
    pub store: Arc<dyn RampStore>,
    pub chains: Arc<ChainManager>,
    pub funding: Arc<dyn FundingSigner>,
    pub nonces: Arc<NonceManager>,
    pub confirmation: ConfirmationConfig,
    pub submit_retries: u32,
    pub retry_delay: Duration,
}

/// One handler per phase
///
/// `already_applied` is the recovery predicate: it must be free of side effects and
/// answer whether the phase's effect has already landed. `apply` is only called when it
/// has not, and must itself be safe to re-run after a crash at any point.
#[async_trait]
pub trait PhaseHandler: Send + Sync {
    fn phase(&self) -> RampPhase;

    /// Non-fatal phases log their failure and let the ramp move on
    fn fatal_on_error(&self) -> bool {
        true
    }

    async fn already_applied(&self, state: &RampState) -> RampResult<bool>;

    async fn apply(&self, state: &RampState) -> RampResult<PhaseStep>;
}

/// What one `execute` call did to the ramp
#[derive(Debug)]
pub enum PhaseOutcome {
    /// Transitioned; carries the persisted state at the new phase
    Advanced(RampState),
    Waiting,
    /// The phase is the last of its route and its work is done or parked
    Terminal,
}

/// Run `handler` against `state`
///
/// A mismatched phase fails before anything is touched. Failures of the recovery
/// predicate or the side effect are appended to the error log before being returned;
/// the current phase stays put so that a later run re-enters the same handler.
pub async fn execute(
    handler: &dyn PhaseHandler,
    state: RampState,
    store: &dyn RampStore,
) -> RampResult<PhaseOutcome> {
    let phase = handler.phase();
    if state.current_phase != phase {
        return Err(RampError::PhaseMismatch {
            expected: phase,
            actual: state.current_phase,
        });
    }

    let started = Instant::now();
    debug!(ramp_id = %state.id, phase = %phase, "Executing phase");

    let result = run_step(handler, &state).await;
    let elapsed = started.elapsed().as_secs_f64();

    let (step, recovered) = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            crate::metrics::record_external_error(&e);
            let logged = match store
                .update(state.id, RampUpdate::error_log(ErrorLogEntry::from_error(phase, &e)))
                .await
            {
                Ok(logged) => Some(logged),
                Err(log_err) => {
                    error!(
                        ramp_id = %state.id,
                        phase = %phase,
                        "Failed to persist error log: {}",
                        log_err
                    );
                    None
                }
            };

            if handler.fatal_on_error() {
                error!(ramp_id = %state.id, phase = %phase, "Phase failed: {}", e);
                crate::metrics::record_phase_execution(phase, "failed", elapsed);
                return Err(e);
            }

            warn!(ramp_id = %state.id, phase = %phase, "Non-fatal phase failure: {}", e);
            crate::metrics::record_cleanup_failure(phase);
            crate::metrics::record_phase_execution(phase, "skipped", elapsed);
            let current = logged.unwrap_or(state);
            let note = serde_json::json!({ "failed": e.to_string() });
            return advance(current, phase, store, Some(note)).await;
        }
    };

    match step {
        PhaseStep::Waiting => {
            info!(ramp_id = %state.id, phase = %phase, "Phase waiting on external input");
            crate::metrics::record_phase_execution(phase, "waiting", elapsed);
            Ok(PhaseOutcome::Waiting)
        }
        PhaseStep::Done => {
            let outcome = if recovered { "recovered" } else { "done" };
            crate::metrics::record_phase_execution(phase, outcome, elapsed);
            let note = recovered.then(|| serde_json::json!({ "recovered": true }));
            advance(state, phase, store, note).await
        }
    }
}

async fn run_step(
    handler: &dyn PhaseHandler,
    state: &RampState,
) -> RampResult<(PhaseStep, bool)> {
    if handler.already_applied(state).await? {
        info!(
            ramp_id = %state.id,
            phase = %handler.phase(),
            "Effect already landed, skipping side effect"
        );
        return Ok((PhaseStep::Done, true));
    }
    Ok((handler.apply(state).await?, false))
}

async fn advance(
    state: RampState,
    phase: RampPhase,
    store: &dyn RampStore,
    note: Option<serde_json::Value>,
) -> RampResult<PhaseOutcome> {
    let Some(next) = state.route.next_phase(phase)? else {
        debug!(ramp_id = %state.id, phase = %phase, "Terminal phase reached");
        return Ok(PhaseOutcome::Terminal);
    };

    let update = RampUpdate {
        transition: Some(PhaseTransition {
            from: phase,
            to: next,
            metadata: note,
        }),
        ..Default::default()
    };
    let advanced = store.update(state.id, update).await?;
    info!(ramp_id = %advanced.id, phase = %phase, "Advanced to {}", next);
    Ok(PhaseOutcome::Advanced(advanced))
}
