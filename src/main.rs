//! Ramp Orchestrator - phase engine for fiat/crypto ramps
//!
//! Drives each registered ramp through the phases of its route across EVM, Substrate
//! and Stellar networks, resuming safely after crashes and timeouts.

use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

mod api;
mod chain;
mod config;
mod error;
mod metrics;
mod phases;
mod ramp;
mod service;
mod state;
mod tx;
mod worker;

use chain::ChainManager;
use config::Settings;
use metrics::MetricsServer;
use phases::{PhaseDeps, PhaseProcessor, PhaseRegistry};
use service::{HttpTransactionBuilder, RampService};
use state::{MemoryRampStore, PgRampStore, RampStore};
use tx::{FundingWallet, NonceManager};
use worker::RecoveryWorker;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Ramp Orchestrator v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} networks",
        settings.enabled_networks().len()
    );

    let store: Arc<dyn RampStore> = if settings.database.in_memory {
        warn!("Using in-memory ramp store, state is lost on restart");
        Arc::new(MemoryRampStore::new())
    } else {
        let store = PgRampStore::new(&settings.database).await?;
        info!("Database connection established");
        store.run_migrations().await?;
        info!("Database migrations complete");
        Arc::new(store)
    };

    let chains = Arc::new(ChainManager::from_settings(&settings)?);
    info!("Chain clients initialized for {:?}", chains.connected_networks());

    let funding = Arc::new(FundingWallet::from_settings(&settings)?);

    let deps = PhaseDeps {
        store: store.clone(),
        chains: chains.clone(),
        funding,
        nonces: Arc::new(NonceManager::new()),
        confirmation: settings.confirmation.clone(),
        submit_retries: settings.orchestrator.submit_retries,
        retry_delay: settings.orchestrator.retry_delay(),
    };
    let registry = Arc::new(PhaseRegistry::standard(deps)?);
    info!("Phase registry built with {} handlers", registry.len());

    let processor = Arc::new(PhaseProcessor::new(
        store.clone(),
        registry,
        &settings.orchestrator,
    ));

    let builder = Arc::new(HttpTransactionBuilder::new(&settings.tx_builder)?);
    let service = Arc::new(RampService::new(store.clone(), builder, processor.clone()));

    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = api::AppState {
            service,
            store: store.clone(),
            chains: chains.clone(),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let worker = Arc::new(RecoveryWorker::new(
        store.clone(),
        processor,
        &settings.orchestrator,
    ));
    let worker_handle = tokio::spawn({
        let worker = worker.clone();
        async move {
            if let Err(e) = worker.run().await {
                error!("Recovery worker error: {}", e);
            }
        }
    });

    let health_handle = tokio::spawn({
        let chains = chains.clone();
        let store = store.clone();
        let interval = settings.orchestrator.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

                for (network, healthy) in chains.health_check().await {
                    if !healthy {
                        warn!("Network {} health check failed", network);
                    }
                }

                if let Err(e) = store.health_check().await {
                    warn!("Store health check failed: {}", e);
                }
            }
        }
    });

    info!("Ramp Orchestrator is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    worker.stop().await;

    // in-flight phases resume from their recorded hashes on the next start
    api_handle.abort();
    worker_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Ramp Orchestrator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,ramp_orchestrator=debug,sqlx=warn,hyper=warn")
    });

    let json = std::env::var("RAMP_LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
