//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Ramp registration and start
//! - Phase execution outcomes and latency
//! - Subsidy transfers and cleanup failures
//! - Chain health and external-chain errors

use crate::error::{RampError, RampResult};
use crate::ramp::{Network, RampPhase};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Ramp lifecycle
    pub static ref RAMPS_REGISTERED: CounterVec = register_counter_vec!(
        "ramp_registered_total",
        "Total ramps registered by route",
        &["route"]
    ).expect("metric can be registered");

    pub static ref RAMPS_STARTED: CounterVec = register_counter_vec!(
        "ramp_started_total",
        "Total ramps started by route",
        &["route"]
    ).expect("metric can be registered");

    pub static ref PROCESS_RUNS: CounterVec = register_counter_vec!(
        "ramp_process_runs_total",
        "Processor runs by outcome",
        &["outcome"]
    ).expect("metric can be registered");

    // Phase execution
    pub static ref PHASE_EXECUTIONS: CounterVec = register_counter_vec!(
        "ramp_phase_executions_total",
        "Phase executions by phase and outcome",
        &["phase", "outcome"]
    ).expect("metric can be registered");

    pub static ref PHASE_LATENCY: HistogramVec = register_histogram_vec!(
        "ramp_phase_latency_seconds",
        "Phase execution latency",
        &["phase"],
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 180.0, 600.0, 1800.0]
    ).expect("metric can be registered");

    // Funding
    pub static ref SUBSIDY_TRANSFERS: CounterVec = register_counter_vec!(
        "ramp_subsidy_transfers_total",
        "Subsidy transfers from funding accounts",
        &["network", "phase"]
    ).expect("metric can be registered");

    pub static ref CLEANUP_FAILURES: CounterVec = register_counter_vec!(
        "ramp_cleanup_failures_total",
        "Non-fatal cleanup and fee distribution failures",
        &["phase"]
    ).expect("metric can be registered");

    // Chains
    pub static ref EXTERNAL_ERRORS: CounterVec = register_counter_vec!(
        "ramp_external_chain_errors_total",
        "External chain errors by network",
        &["network"]
    ).expect("metric can be registered");

    pub static ref CHAIN_HEALTHY: GaugeVec = register_gauge_vec!(
        "ramp_chain_healthy",
        "Chain health status (1=healthy, 0=unhealthy)",
        &["network"]
    ).expect("metric can be registered");

    pub static ref CHAIN_BLOCK_HEIGHT: GaugeVec = register_gauge_vec!(
        "ramp_chain_block_height",
        "Latest observed block or ledger height per network",
        &["network"]
    ).expect("metric can be registered");

    // Recovery
    pub static ref RECOVERY_RESUMED: CounterVec = register_counter_vec!(
        "ramp_recovery_resumed_total",
        "Stale ramps resumed by the recovery worker",
        &[]
    ).expect("metric can be registered");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> RampResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| RampError::Config(format!("cannot bind metrics on {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| RampError::Internal(format!("metrics server: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// Helper functions to record metrics

pub fn record_ramp_registered(route: &str) {
    RAMPS_REGISTERED.with_label_values(&[route]).inc();
}

pub fn record_ramp_started(route: &str) {
    RAMPS_STARTED.with_label_values(&[route]).inc();
}

pub fn record_process_run(outcome: &str) {
    PROCESS_RUNS.with_label_values(&[outcome]).inc();
}

pub fn record_phase_execution(phase: RampPhase, outcome: &str, latency_secs: f64) {
    PHASE_EXECUTIONS
        .with_label_values(&[phase.as_str(), outcome])
        .inc();
    PHASE_LATENCY
        .with_label_values(&[phase.as_str()])
        .observe(latency_secs);
}

pub fn record_subsidy(network: Network, phase: RampPhase) {
    SUBSIDY_TRANSFERS
        .with_label_values(&[network.as_str(), phase.as_str()])
        .inc();
}

pub fn record_cleanup_failure(phase: RampPhase) {
    CLEANUP_FAILURES.with_label_values(&[phase.as_str()]).inc();
}

pub fn record_external_error(err: &RampError) {
    if let RampError::ExternalChain { network, .. } | RampError::Nonce { network, .. } = err {
        EXTERNAL_ERRORS.with_label_values(&[network.as_str()]).inc();
    }
}

pub fn record_chain_health(network: Network, healthy: bool) {
    CHAIN_HEALTHY
        .with_label_values(&[network.as_str()])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_block_height(network: Network, height: u64) {
    CHAIN_BLOCK_HEIGHT
        .with_label_values(&[network.as_str()])
        .set(height as f64);
}

pub fn record_recovery_resumed(count: usize) {
    RECOVERY_RESUMED
        .with_label_values(&[])
        .inc_by(count as f64);
}
