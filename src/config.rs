//! Configuration management for the ramp orchestrator
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::ramp::{Network, NetworkKind};

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Slack between the longest single wait of a phase and the processing lease
pub const LEASE_MARGIN_SECS: u64 = 60;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub orchestrator: OrchestratorConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub confirmation: ConfirmationConfig,
    pub funding: FundingConfig,
    pub tx_builder: TxBuilderConfig,
    pub networks: HashMap<String, NetworkConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    pub instance_id: String,
    /// Upper bound on phases executed by one processor run
    pub max_phase_iterations: usize,
    pub lock_ttl_secs: u64,
    pub recovery_interval_secs: u64,
    pub stale_after_secs: u64,
    pub recovery_batch_size: usize,
    pub submit_retries: u32,
    pub retry_delay_ms: u64,
    pub health_check_interval_secs: u64,
}

impl OrchestratorConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Keep ramp state in process memory (development only)
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    pub poll_interval_ms: u64,
    /// Overall bound for a submitted transaction to be confirmed
    pub timeout_secs: u64,
    /// Overall bound for bridged funds to arrive
    pub bridge_timeout_secs: u64,
}

impl ConfirmationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_secs(self.bridge_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundingConfig {
    /// Environment variable holding the EVM funding key
    pub evm_private_key_env: String,
    /// Remote signer for Substrate and Stellar funding accounts
    pub signer_service_url: Option<String>,
    /// Funding account address per network name
    #[serde(default)]
    pub accounts: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxBuilderConfig {
    pub url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub kind: NetworkKind,
    /// RPC, sidecar or Horizon URLs, in failover order
    pub endpoints: Vec<String>,
    pub chain_id: Option<u64>,
    #[serde(default = "default_confirmation_blocks")]
    pub confirmation_blocks: u64,
    pub enabled: bool,
}

fn default_confirmation_blocks() -> u64 {
    1
}

impl Settings {
    /// Load settings from the file named by `RAMP_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("RAMP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.orchestrator.max_phase_iterations == 0 {
            anyhow::bail!("orchestrator.max_phase_iterations must be positive");
        }

        // the lease is renewed while a run holds it, but a lapse must outlast any one wait
        let longest_wait = self
            .confirmation
            .timeout_secs
            .max(self.confirmation.bridge_timeout_secs);
        if self.orchestrator.lock_ttl_secs < longest_wait + LEASE_MARGIN_SECS {
            anyhow::bail!(
                "orchestrator.lock_ttl_secs ({}) must be at least the longest confirmation wait ({}) plus {}",
                self.orchestrator.lock_ttl_secs,
                longest_wait,
                LEASE_MARGIN_SECS
            );
        }

        for (name, net) in &self.networks {
            let network: Network = name
                .parse()
                .map_err(|e: String| anyhow::anyhow!("[networks.{}]: {}", name, e))?;
            if network.kind() != net.kind {
                anyhow::bail!(
                    "Network {} is a {:?} network, configured as {:?}",
                    name,
                    network.kind(),
                    net.kind
                );
            }
            if net.enabled && net.endpoints.is_empty() {
                anyhow::bail!("Network {} has no endpoints configured", name);
            }
        }

        if self.enabled_networks().is_empty() {
            anyhow::bail!("At least one network must be enabled");
        }

        for name in self.funding.accounts.keys() {
            name.parse::<Network>()
                .map_err(|e| anyhow::anyhow!("[funding.accounts]: {}", e))?;
        }

        Ok(())
    }

    /// Enabled networks with their configuration
    pub fn enabled_networks(&self) -> Vec<(Network, &NetworkConfig)> {
        self.networks
            .iter()
            .filter(|(_, c)| c.enabled)
            .filter_map(|(name, c)| name.parse().ok().map(|n| (n, c)))
            .collect()
    }

    /// Funding account for a network, if configured
    pub fn funding_account(&self, network: Network) -> Option<&str> {
        self.funding
            .accounts
            .iter()
            .find(|(name, _)| name.parse::<Network>().ok() == Some(network))
            .map(|(_, addr)| addr.as_str())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
