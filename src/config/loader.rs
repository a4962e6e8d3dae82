//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters, and
//! resolving the values that must be typed before wiring: contract
//! addresses, the default merchant and the signing key.

use std::path::Path;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, ChainConfig, LoanDefaultsConfig};
use crate::domain::errors::ConfigurationError;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    service = %config.service.name,
    rpc = %redact_url(&config.chain.rpc_url),
    decimals = config.token.decimals,
    sweep = config.reconciliation.enabled,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content)
    .with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.chain.rpc_url.is_empty(),
    "chain.rpc_url must not be empty"
  );
  config.chain.contract_addresses()?;
  config.loans.merchant()?;

  anyhow::ensure!(
    config.chain.receipt_timeout_secs > 0,
    "chain.receipt_timeout_secs must be positive"
  );
  anyhow::ensure!(
    config.chain.receipt_poll_interval_ms > 0,
    "chain.receipt_poll_interval_ms must be positive"
  );
  anyhow::ensure!(
    config.chain.max_rpc_per_second > 0,
    "chain.max_rpc_per_second must be positive"
  );
  anyhow::ensure!(
    config.chain.log_poll_interval_secs > 0,
    "chain.log_poll_interval_secs must be positive"
  );
  anyhow::ensure!(
    config.chain.max_log_block_range > 0,
    "chain.max_log_block_range must be positive"
  );
  anyhow::ensure!(
    config.chain.gas_buffer_percent <= 500,
    "chain.gas_buffer_percent must be at most 500, got {}",
    config.chain.gas_buffer_percent
  );
  anyhow::ensure!(
    config.token.decimals <= 36,
    "token.decimals must be at most 36, got {}",
    config.token.decimals
  );
  anyhow::ensure!(
    config.loans.default_installments > 0,
    "loans.default_installments must be at least 1"
  );
  anyhow::ensure!(
    config.reconciliation.interval_secs > 0,
    "reconciliation.interval_secs must be positive"
  );

  Ok(())
}

impl ChainConfig {
  /// BNPL and token contract addresses, both required.
  pub fn contract_addresses(&self) -> Result<(Address, Address)> {
    let bnpl = parse_required_address(&self.bnpl_contract, "bnpl_contract")?;
    let token = parse_required_address(&self.token_contract, "token_contract")?;
    Ok((bnpl, token))
  }

  /// Read the signing key from the environment variable named in config.
  pub fn signing_key(&self) -> Result<PrivateKeySigner, ConfigurationError> {
    let raw = std::env::var(&self.signer_key_env)
      .map_err(|_| ConfigurationError::MissingSigningKey(self.signer_key_env.clone()))?;
    let raw = raw.trim();
    if raw.is_empty() {
      return Err(ConfigurationError::MissingSigningKey(self.signer_key_env.clone()));
    }
    raw
      .trim_start_matches("0x")
      .parse::<PrivateKeySigner>()
      .map_err(|_| ConfigurationError::InvalidSigningKey(self.signer_key_env.clone()))
  }
}

impl LoanDefaultsConfig {
  /// Configured default merchant, `None` when left empty.
  pub fn merchant(&self) -> Result<Option<Address>> {
    if self.default_merchant.trim().is_empty() {
      return Ok(None);
    }
    let addr = self
      .default_merchant
      .trim()
      .parse::<Address>()
      .with_context(|| format!("Invalid loans.default_merchant: {}", self.default_merchant))?;
    Ok(Some(addr))
  }
}

fn parse_required_address(raw: &str, name: &'static str) -> Result<Address> {
  let raw = raw.trim();
  if raw.is_empty() {
    return Err(ConfigurationError::MissingContractAddress(name).into());
  }
  raw
    .parse::<Address>()
    .with_context(|| format!("Invalid address for chain.{name}: {raw}"))
}

/// Keep only scheme and host[:port] of a URL for logging.
///
/// Provider keys travel in paths (`/v2/<key>`), query strings and
/// userinfo, so all three are dropped.
pub fn redact_url(url: &str) -> String {
  let (scheme, rest) = url.split_once("://").unwrap_or(("", url));
  let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
  let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
  if scheme.is_empty() {
    host.to_string()
  } else {
    format!("{scheme}://{host}")
  }
}
