//! Recovery worker
//!
//! Ramps stop advancing when a wait times out, a process dies mid-phase, or a cleanup
//! failed. The worker periodically picks up started ramps that have not been touched for
//! a while and runs the processor on them again. Ramps parked by an unrecoverable error
//! are left for an operator.

use crate::config::OrchestratorConfig;
use crate::error::RampResult;
use crate::phases::{PhaseProcessor, ProcessOutcome};
use crate::state::RampStore;

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

pub struct RecoveryWorker {
    store: Arc<dyn RampStore>,
    processor: Arc<PhaseProcessor>,
    interval: Duration,
    stale_after: chrono::Duration,
    batch_size: usize,
    shutdown: Arc<RwLock<bool>>,
}

impl RecoveryWorker {
    pub fn new(
        store: Arc<dyn RampStore>,
        processor: Arc<PhaseProcessor>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            processor,
            interval: Duration::from_secs(config.recovery_interval_secs.max(1)),
            stale_after: chrono::Duration::seconds(config.stale_after_secs as i64),
            batch_size: config.recovery_batch_size,
            shutdown: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn run(&self) -> RampResult<()> {
        let mut ticker = interval(self.interval);
        info!("Recovery worker started");

        loop {
            ticker.tick().await;
            if *self.shutdown.read().await {
                break;
            }

            if let Err(e) = self.recover_once().await {
                error!("Recovery pass failed: {}", e);
            }
        }

        info!("Recovery worker stopped");
        Ok(())
    }

    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
    }

    /// One pass over stale ramps; returns how many made progress
    pub async fn recover_once(&self) -> RampResult<usize> {
        let before = chrono::Utc::now() - self.stale_after;
        let stale = self.store.list_stale(before, self.batch_size).await?;
        if stale.is_empty() {
            debug!("No stale ramps");
            return Ok(0);
        }

        info!("Resuming {} stale ramps", stale.len());
        let runs = stale.iter().map(|state| {
            let id = state.id;
            let from = state.current_phase;
            async move { (id, from, self.processor.process_ramp(id).await) }
        });

        let mut progressed = 0;
        for (id, from, result) in join_all(runs).await {
            match result {
                Ok(ProcessOutcome::AlreadyRunning) => {
                    debug!(ramp_id = %id, "Skipped, already being processed")
                }
                Ok(outcome) => {
                    progressed += 1;
                    info!(ramp_id = %id, phase = %from, "Recovered: {:?}", outcome);
                }
                // the failing phase has already written its error log
                Err(e) => warn!(ramp_id = %id, phase = %from, "Recovery run failed: {}", e),
            }
        }

        crate::metrics::record_recovery_resumed(progressed);
        Ok(progressed)
    }
}
