//! INTX Perpetuals Bot — Entry Point
//!
//! Loads configuration, wires the brokerage gateway, and runs the
//! reference cycle once. The run is not interruptible once started:
//! the exchange-side state is authoritative and nothing is rolled back.
//!
//! Wiring sequence:
//! 1. Load config.toml (path from INTX_BOT_CONFIG) or defaults
//! 2. Init tracing (JSON structured logging)
//! 3. Load API credentials from env (COINBASE_API_KEY, COINBASE_API_SECRET);
//!    a PEM secret selects CDP JWT auth, anything else legacy HMAC
//! 4. Create CoinbaseClient (HTTP + signing + retry + rate limit + proxy)
//! 5. Wrap CoinbaseGateway in GuardedGateway (sequencing + timeouts + metrics)
//! 6. Check the key's trade permission
//! 7. Run the cycle, then export metrics

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use intx_perps_bot::adapters::coinbase::{
  CoinbaseAuth, CoinbaseClient, CoinbaseClientConfig, CoinbaseGateway,
};
use intx_perps_bot::adapters::guarded::GuardedGateway;
use intx_perps_bot::adapters::metrics::RunMetrics;
use intx_perps_bot::config::{self, AppConfig};
use intx_perps_bot::usecases::run_cycle::{CycleOutcome, CycleParams, RunCycle};
use intx_perps_bot::usecases::settlement;

const CONFIG_ENV: &str = "INTX_BOT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
  // ── 1. Load configuration ───────────────────────────────
  let config_path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
  let config =
    config::loader::load_or_default(&config_path).context("Failed to load configuration")?;

  // ── 2. Initialize structured JSON logging ───────────────
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.bot.log_level)),
    )
    .json()
    .init();

  info!(
    name = %config.bot.name,
    version = env!("CARGO_PKG_VERSION"),
    config = %config_path,
    portfolio = %config.trading.portfolio_name,
    product = %config.trading.product_id,
    settlement = ?config.settlement.strategy,
    proxy = config.proxy.enabled,
    "Starting INTX perpetuals bot"
  );

  let metrics = Arc::new(RunMetrics::new().context("Failed to create metrics registry")?);
  let outcome = run(&config, Arc::clone(&metrics)).await;

  if let Some(path) = &config.metrics.textfile_path {
    if let Err(e) = metrics.write_textfile(path) {
      warn!(error = %e, "Failed to export metrics");
    }
  }

  if let Err(e) = &outcome {
    error!(error = %e, "Run failed");
  }
  outcome
}

/// Wire adapters and execute one cycle.
async fn run(config: &AppConfig, metrics: Arc<RunMetrics>) -> Result<()> {
  // ── 3. Credentials from env vars ────────────────────────
  let auth = Arc::new(CoinbaseAuth::from_env().context("Failed to load API credentials from env")?);

  // ── 4. Brokerage HTTP client ────────────────────────────
  let client_config = CoinbaseClientConfig::from_sections(&config.api, &config.proxy);
  let client = Arc::new(
    CoinbaseClient::new(auth, client_config).context("Failed to create brokerage client")?,
  );

  // ── 5. Gateway with sequencing + timeouts ───────────────
  let gateway = Arc::new(
    GuardedGateway::new(CoinbaseGateway::new(client), config.api.call_timeout())
      .with_metrics(metrics),
  );

  // ── 6. Preflight: the key must be allowed to trade ─────
  gateway
    .inner()
    .key_permissions()
    .await
    .context("Failed to read API key permissions")?
    .ensure_trading()
    .context("Refusing to trade")?;

  // ── 7. Run the cycle ────────────────────────────────────
  let params = CycleParams::try_from(&config.trading).context("Invalid trading parameters")?;
  let cycle = RunCycle::new(gateway, settlement::from_config(&config.settlement), params);

  let report = match cycle.run().await.context("Cycle aborted")? {
    CycleOutcome::Completed(report) => report,
    CycleOutcome::Halted(halt) => {
      match halt.landed_order() {
        Some(order) => error!(
          order_id = %order.order_id,
          client_order_id = %order.client_order_id,
          product_id = %order.product_id,
          "Order is working on the book after a lost response; resolve it manually"
        ),
        None if halt.reconciliation.is_none() => {
          error!("Exchange state unknown: reconciliation read failed");
        }
        None => warn!(client_order_id = %halt.client_order_id, "Lost order is not on the book"),
      }
      return Err(halt.to_error()).context("Cycle halted");
    }
  };

  info!(
    portfolio_id = %report.portfolio_id,
    base_size = %report.sized.base_size,
    limit_accepted = report.limit.result.is_accepted(),
    limit_cancelled = report.cancel.is_some(),
    market_accepted = report.market.result.is_accepted(),
    positions = report.positions.len(),
    reduced = report.reduction.is_some(),
    "Cycle complete"
  );
  Ok(())
}
