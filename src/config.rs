//! Configuration module for the cosigner
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `COSIGNER_*` environment variables (`__` separates sections, e.g.
//! `COSIGNER_RPC__URL`). A `.env` file is loaded first when present.

use crate::tx_builder::errors::PipelineError;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use std::time::Duration;

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "cosigner.toml";

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "COSIGNER";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger RPC endpoint
    pub rpc: RpcConfig,

    /// Service signing identity source
    pub service: ServiceConfig,

    /// Service fee charged alongside burns and transfers
    pub fees: FeeConfig,

    /// Swap quote aggregator
    pub aggregator: AggregatorConfig,

    /// Automatic retry and rebuild budget
    pub retry: RetryConfig,

    /// Logging and metrics output
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub url: String,

    /// processed | confirmed | finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Environment variable holding the base58-encoded service secret key
    #[serde(default = "default_keypair_env")]
    pub keypair_env: String,

    /// Fallback keypair file (JSON byte array or raw 64 bytes)
    #[serde(default)]
    pub keypair_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Lamports paid by the user to the service per burn/transfer
    #[serde(default = "default_service_fee")]
    pub service_fee_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_url")]
    pub base_url: String,

    /// Let the aggregator pick slippage; `slippage_bps` is used otherwise
    #[serde(default = "default_true")]
    pub auto_slippage: bool,

    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u16,

    /// Client-side request rate limit
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    #[serde(default = "default_aggregator_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Resends of the same bytes after a transport failure
    #[serde(default = "default_one")]
    pub transport_retries: usize,

    /// Full rebuild-and-resign cycles after a stale anchor
    #[serde(default = "default_one_u32")]
    pub stale_rebuilds: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Expired swaps fetch a fresh quote and are signed again
    #[serde(default = "default_true")]
    pub rebuild_swaps_on_expiry: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,

    /// Print Prometheus text to stdout when the command finishes
    #[serde(default)]
    pub print_metrics: bool,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_keypair_env() -> String { "SERVICE_KEYPAIR".to_string() }
fn default_service_fee() -> u64 { 50_000_000 }
fn default_aggregator_url() -> String { "https://quote-api.jup.ag/v6".to_string() }
fn default_true() -> bool { true }
fn default_slippage_bps() -> u16 { 50 }
fn default_requests_per_second() -> u32 { 5 }
fn default_aggregator_timeout() -> u64 { 15 }
fn default_one() -> usize { 1 }
fn default_one_u32() -> u32 { 1 }
fn default_retry_delay_ms() -> u64 { 250 }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            commitment: default_commitment(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            keypair_env: default_keypair_env(),
            keypair_path: None,
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            service_fee_lamports: default_service_fee(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_aggregator_url(),
            auto_slippage: default_true(),
            slippage_bps: default_slippage_bps(),
            requests_per_second: default_requests_per_second(),
            timeout_secs: default_aggregator_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            transport_retries: default_one(),
            stale_rebuilds: default_one_u32(),
            retry_delay_ms: default_retry_delay_ms(),
            rebuild_swaps_on_expiry: default_true(),
        }
    }
}

impl RpcConfig {
    pub fn commitment_config(&self) -> Result<CommitmentConfig, PipelineError> {
        match self.commitment.as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(PipelineError::fatal_config(format!(
                "unknown commitment level '{}'",
                other
            ))),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AggregatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Config {
    /// Load `path` (optional) with `.env` and `COSIGNER_*` overrides
    pub fn load(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_layered(path, ENV_PREFIX)
    }

    /// Load `path` (optional) with overrides from `<prefix>_*` variables
    pub fn load_layered(path: &str, env_prefix: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that can only fail later at runtime
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.rpc.url.trim().is_empty() {
            return Err(PipelineError::fatal_config("rpc.url is empty"));
        }
        self.rpc.commitment_config()?;

        let base = self.aggregator.base_url.as_str();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(PipelineError::fatal_config(format!(
                "aggregator.base_url must be an http(s) URL, got '{}'",
                base
            )));
        }
        if self.aggregator.requests_per_second == 0 {
            return Err(PipelineError::fatal_config(
                "aggregator.requests_per_second must be greater than zero",
            ));
        }
        if self.service.keypair_env.trim().is_empty() && self.service.keypair_path.is_none() {
            return Err(PipelineError::fatal_config(
                "service.keypair_env or service.keypair_path must be set",
            ));
        }
        Ok(())
    }
}
