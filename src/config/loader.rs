//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use super::{AppConfig, SettlementStrategy};

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
    path = %path.display(),
    portfolio = %config.trading.portfolio_name,
    product = %config.trading.product_id,
    leverage = %config.trading.leverage,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Load `path` if it exists, otherwise fall back to the built-in defaults.
pub fn load_or_default(path: &str) -> Result<AppConfig> {
  if Path::new(path).exists() {
    return load_config(path);
  }
  info!(path, "No config file found, using defaults");
  let config = AppConfig::default();
  validate_config(&config)?;
  Ok(config)
}

/// Parse and validate TOML content.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  let trading = &config.trading;

  anyhow::ensure!(
    !trading.portfolio_name.is_empty(),
    "trading.portfolio_name must not be empty"
  );
  anyhow::ensure!(
    !trading.product_id.is_empty(),
    "trading.product_id must not be empty"
  );
  anyhow::ensure!(
    trading.leverage > Decimal::ZERO,
    "trading.leverage must be positive, got {}",
    trading.leverage
  );
  anyhow::ensure!(
    trading.allocation_fraction > Decimal::ZERO && trading.allocation_fraction <= Decimal::ONE,
    "trading.allocation_fraction must be in (0, 1], got {}",
    trading.allocation_fraction
  );
  anyhow::ensure!(
    trading.price_slippage_factor > Decimal::ZERO
      && trading.price_slippage_factor <= Decimal::ONE,
    "trading.price_slippage_factor must be in (0, 1], got {}",
    trading.price_slippage_factor
  );
  anyhow::ensure!(
    trading.size_step > Decimal::ZERO && trading.price_step > Decimal::ZERO,
    "trading.size_step and trading.price_step must be positive"
  );

  if config.settlement.strategy == SettlementStrategy::Poll {
    anyhow::ensure!(
      config.settlement.poll_max_attempts > 0,
      "settlement.poll_max_attempts must be positive for the poll strategy"
    );
  }

  anyhow::ensure!(!config.api.base_url.is_empty(), "api.base_url must not be empty");
  anyhow::ensure!(config.api.timeout_ms > 0, "api.timeout_ms must be positive");
  anyhow::ensure!(
    config.api.requests_per_second > 0,
    "api.requests_per_second must be positive"
  );
  anyhow::ensure!(config.api.max_concurrent > 0, "api.max_concurrent must be positive");

  if config.proxy.enabled {
    anyhow::ensure!(
      config.proxy.url.as_deref().is_some_and(|u| !u.is_empty()),
      "proxy.url is required when proxy.enabled = true"
    );
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_empty_file_uses_defaults() {
    let config = parse_config("").unwrap();
    assert_eq!(config.trading.portfolio_name, "USDC Wallet");
    assert_eq!(config.trading.product_id, "BTC-PERP-INTX");
    assert_eq!(config.trading.leverage, dec!(10));
    assert_eq!(config.settlement.delay_ms, 2_000);
  }

  #[test]
  fn test_partial_override() {
    let config = parse_config(
      r#"
      [trading]
      leverage = 5
      allocation_fraction = 0.25
      margin_type = "ISOLATED"

      [settlement]
      strategy = "poll"
      "#,
    )
    .unwrap();
    assert_eq!(config.trading.leverage, dec!(5));
    assert_eq!(config.trading.allocation_fraction, dec!(0.25));
    assert_eq!(config.settlement.strategy, SettlementStrategy::Poll);
    assert_eq!(config.trading.product_id, "BTC-PERP-INTX");
  }

  #[test]
  fn test_rejects_bad_allocation() {
    let result = parse_config("[trading]\nallocation_fraction = 1.5\n");
    assert!(result.is_err());
  }

  #[test]
  fn test_proxy_requires_url() {
    assert!(parse_config("[proxy]\nenabled = true\n").is_err());
    assert!(parse_config("[proxy]\nenabled = true\nurl = \"socks5h://u:p@h:5000\"\n").is_ok());
  }

  #[test]
  fn test_call_timeout_covers_read_retries() {
    let config = parse_config("[api]\ntimeout_ms = 1000\nmax_retries = 2\nretry_base_delay_ms = 100\n").unwrap();
    // 3 attempts plus 100ms + 200ms of backoff
    assert_eq!(config.api.call_timeout(), std::time::Duration::from_millis(3300));
  }
}
