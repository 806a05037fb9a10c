//! Portfolio State Reader - Portfolio resolution and summaries
//!
//! Resolves a portfolio by exact name on the perpetuals venue and
//! fetches fresh financial summaries. Summaries are never cached:
//! every caller that needs post-change truth asks again.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::domain::trade::{PortfolioId, PortfolioSummary, ProductId, PERPETUALS_PLATFORM};
use crate::error::{EngineError, Result};
use crate::ports::gateway::ExchangeGateway;

/// Reads portfolio identity and state through the gateway.
pub struct PortfolioReader<G: ExchangeGateway> {
  gateway: Arc<G>,
}

impl<G: ExchangeGateway> Clone for PortfolioReader<G> {
  fn clone(&self) -> Self {
    Self {
      gateway: Arc::clone(&self.gateway),
    }
  }
}

impl<G: ExchangeGateway> PortfolioReader<G> {
  /// Create a reader over a shared gateway handle.
  pub fn new(gateway: Arc<G>) -> Self {
    Self { gateway }
  }

  /// Resolve `name` to a portfolio id on the perpetuals venue.
  ///
  /// Matching is exact on both name and platform; a name that only
  /// exists on another venue does not resolve.
  ///
  /// # Errors
  /// - `NotFound` when no perpetuals account carries the name
  /// - `InvalidInput` when the name maps to more than one portfolio
  #[instrument(skip(self))]
  pub async fn resolve_portfolio_id(&self, name: &str) -> Result<PortfolioId> {
    let accounts = self.gateway.list_accounts().await?;

    let mut matches: Vec<PortfolioId> = accounts
      .into_iter()
      .filter(|a| a.name == name && a.platform == PERPETUALS_PLATFORM)
      .map(|a| a.portfolio_id)
      .collect();
    matches.sort();
    matches.dedup();

    match matches.len() {
      0 => Err(EngineError::NotFound {
        what: "perpetuals portfolio",
        name: name.to_string(),
      }),
      1 => {
        let portfolio_id = matches.remove(0);
        info!(portfolio_id = %portfolio_id, "Portfolio resolved");
        Ok(portfolio_id)
      }
      n => Err(EngineError::InvalidInput(format!(
        "portfolio name {name:?} matches {n} perpetuals portfolios"
      ))),
    }
  }

  /// Fetch a fresh summary. Defaulted fields are flagged, not rejected.
  #[instrument(skip(self))]
  pub async fn fetch_summary(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSummary> {
    let summary = self.gateway.portfolio_summary(portfolio_id).await?;

    if !summary.is_complete() {
      warn!(
        portfolio_id = %portfolio_id,
        defaulted = ?summary.defaulted,
        "Portfolio summary has defaulted fields"
      );
    } else if summary.is_all_zero() {
      warn!(portfolio_id = %portfolio_id, "Portfolio summary is all zero");
    }

    Ok(summary)
  }

  /// Fetch a summary and fail with `PartialDataFailure` if any field defaulted.
  pub async fn fetch_complete_summary(
    &self,
    portfolio_id: &PortfolioId,
  ) -> Result<PortfolioSummary> {
    let summary = self.fetch_summary(portfolio_id).await?;
    summary.ensure_complete("portfolio_summary")?;
    Ok(summary)
  }

  /// Latest trade price, which must be positive.
  #[instrument(skip(self))]
  pub async fn market_price(&self, product_id: &ProductId) -> Result<Decimal> {
    let price = self.gateway.ticker(product_id).await?;
    if price <= Decimal::ZERO {
      return Err(EngineError::InvalidInput(format!(
        "non-positive trade price {price} for {product_id}"
      )));
    }
    info!(product_id = %product_id, price = %price, "Market price fetched");
    Ok(price)
  }
}

/// Emit a portfolio overview as a structured event.
pub fn log_summary(label: &str, summary: &PortfolioSummary) {
  info!(
    label,
    collateral = %summary.collateral.round_dp(2),
    unrealized_pnl = %summary.unrealized_pnl.round_dp(2),
    buying_power = %summary.buying_power.round_dp(2),
    total_balance = %summary.total_balance.round_dp(2),
    max_withdrawal = %summary.max_withdrawal.round_dp(2),
    complete = summary.is_complete(),
    "Portfolio overview"
  );
}
