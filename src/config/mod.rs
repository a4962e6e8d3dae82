//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! Contract addresses and tuning knobs are externalized here; the
//! signing key is never part of the file and comes from the process
//! environment.

pub mod loader;

use serde::Deserialize;

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// Node connection, contracts and transaction tuning.
  pub chain: ChainConfig,
  /// Payment token settings.
  #[serde(default)]
  pub token: TokenConfig,
  /// Defaults applied to loan intents.
  #[serde(default)]
  pub loans: LoanDefaultsConfig,
  /// Persistence configuration.
  #[serde(default)]
  pub persistence: PersistenceConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Late-confirmation sweep.
  #[serde(default)]
  pub reconciliation: ReconciliationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  pub name: String,
  /// Log level (trace, debug, info, warn, error). RUST_LOG wins.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
  /// JSON-RPC endpoint.
  pub rpc_url: String,
  /// Refuse to start when the node reports a different chain id.
  pub expected_chain_id: Option<u64>,
  /// BNPL contract address (hex). Empty means unset.
  #[serde(default)]
  pub bnpl_contract: String,
  /// ERC-20 payment token address (hex). Empty means unset.
  #[serde(default)]
  pub token_contract: String,
  /// Name of the environment variable holding the signing key.
  #[serde(default = "default_signer_key_env")]
  pub signer_key_env: String,
  #[serde(default = "default_receipt_timeout")]
  pub receipt_timeout_secs: u64,
  #[serde(default = "default_receipt_poll_interval")]
  pub receipt_poll_interval_ms: u64,
  /// Headroom added on top of every gas estimate, in percent.
  #[serde(default = "default_gas_buffer")]
  pub gas_buffer_percent: u32,
  #[serde(default = "default_max_rpc")]
  pub max_rpc_per_second: u32,
  #[serde(default = "default_log_poll_interval")]
  pub log_poll_interval_secs: u64,
  /// Widest block window per `eth_getLogs` request.
  #[serde(default = "default_max_log_block_range")]
  pub max_log_block_range: u64,
  /// Block to start event polling from. Latest block when absent.
  pub start_block: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
  #[serde(default = "default_decimals")]
  pub decimals: u8,
}

impl Default for TokenConfig {
  fn default() -> Self {
    Self {
      decimals: default_decimals(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoanDefaultsConfig {
  /// Merchant used for createOrder when the intent names none.
  #[serde(default)]
  pub default_merchant: String,
  #[serde(default = "default_due_in")]
  pub default_due_in_seconds: u64,
  #[serde(default = "default_installments")]
  pub default_installments: u32,
}

impl Default for LoanDefaultsConfig {
  fn default() -> Self {
    Self {
      default_merchant: String::new(),
      default_due_in_seconds: default_due_in(),
      default_installments: default_installments(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for the ledger snapshot and JSONL audit log.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// JSON file mapping user ids to wallets.
  #[serde(default = "default_users_file")]
  pub users_file: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      data_dir: default_data_dir(),
      users_file: default_users_file(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Liveness/readiness endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconciliationConfig {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default = "default_sweep_interval")]
  pub interval_secs: u64,
}

impl Default for ReconciliationConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      interval_secs: default_sweep_interval(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_signer_key_env() -> String {
  "BNPL_SIGNER_KEY".to_string()
}

fn default_receipt_timeout() -> u64 {
  120
}

fn default_receipt_poll_interval() -> u64 {
  1_000
}

fn default_gas_buffer() -> u32 {
  20
}

fn default_max_rpc() -> u32 {
  25
}

fn default_log_poll_interval() -> u64 {
  5
}

fn default_max_log_block_range() -> u64 {
  2_000
}

fn default_decimals() -> u8 {
  6
}

fn default_due_in() -> u64 {
  30 * 24 * 3600
}

fn default_installments() -> u32 {
  4
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_users_file() -> String {
  "users.json".to_string()
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

fn default_sweep_interval() -> u64 {
  60
}
