//! Guarded Gateway - Sequencing, Timeouts, and Call Metrics
//!
//! Wraps any `ExchangeGateway` so that:
//! - state-changing calls (submit, cancel) run exclusively: no other
//!   call, read or write, is in flight while one is outstanding
//! - reads may overlap each other
//! - every call is bounded by a timeout; a timeout is an unknown
//!   outcome (`TransportFailure`), never a rejection
//!
//! Metrics are recorded per call when a registry is attached.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::warn;

use super::metrics::RunMetrics;
use crate::domain::trade::{
  Account, CancelResult, OpenOrder, OrderId, OrderRequest, OrderResult, OrderStatus, PortfolioId,
  PortfolioSummary, Position, ProductId,
};
use crate::error::{EngineError, Result};
use crate::ports::gateway::ExchangeGateway;

/// Sequencing and timeout decorator around a gateway.
pub struct GuardedGateway<G: ExchangeGateway> {
  inner: G,
  /// Readers share, state changes take it exclusively.
  gate: RwLock<()>,
  call_timeout: Duration,
  metrics: Option<Arc<RunMetrics>>,
}

impl<G: ExchangeGateway> GuardedGateway<G> {
  pub fn new(inner: G, call_timeout: Duration) -> Self {
    Self {
      inner,
      gate: RwLock::new(()),
      call_timeout,
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  pub const fn inner(&self) -> &G {
    &self.inner
  }

  async fn read<T>(&self, operation: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
    let _shared = self.gate.read().await;
    self.bounded(operation, call).await
  }

  async fn bounded<T>(
    &self,
    operation: &'static str,
    call: impl Future<Output = Result<T>>,
  ) -> Result<T> {
    let started = Instant::now();
    let (outcome, result) = match timeout(self.call_timeout, call).await {
      Ok(Ok(value)) => ("ok", Ok(value)),
      Ok(Err(e)) => ("error", Err(e)),
      Err(_) => {
        warn!(operation, timeout_ms = self.call_timeout.as_millis(), "Gateway call timed out");
        ("timeout", Err(self.timeout_error(operation)))
      }
    };
    self.record(operation, outcome, started.elapsed());
    result
  }

  fn timeout_error(&self, operation: &'static str) -> EngineError {
    EngineError::transport(
      operation,
      format!("no answer within {}ms", self.call_timeout.as_millis()),
    )
  }

  fn record(&self, operation: &str, outcome: &str, elapsed: Duration) {
    if let Some(metrics) = &self.metrics {
      metrics.record_call(operation, outcome, elapsed);
    }
  }
}

#[async_trait]
impl<G: ExchangeGateway> ExchangeGateway for GuardedGateway<G> {
  async fn list_accounts(&self) -> Result<Vec<Account>> {
    self.read("list_accounts", self.inner.list_accounts()).await
  }

  async fn portfolio_summary(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSummary> {
    self
      .read("portfolio_summary", self.inner.portfolio_summary(portfolio_id))
      .await
  }

  async fn ticker(&self, product_id: &ProductId) -> Result<Decimal> {
    self.read("ticker", self.inner.ticker(product_id)).await
  }

  async fn submit_order(&self, request: &OrderRequest) -> OrderResult {
    let _exclusive = self.gate.write().await;
    let started = Instant::now();

    let result = match timeout(self.call_timeout, self.inner.submit_order(request)).await {
      Ok(result) => result,
      Err(_) => {
        warn!(
          client_order_id = %request.client_order_id,
          timeout_ms = self.call_timeout.as_millis(),
          "Order submission timed out, outcome unknown"
        );
        OrderResult::TransportFailure {
          cause: self.timeout_error("submit_order").to_string(),
        }
      }
    };

    let outcome = if result.is_accepted() { "ok" } else { "error" };
    self.record("submit_order", outcome, started.elapsed());
    if let Some(metrics) = &self.metrics {
      metrics.record_order(request.sizing.kind(), &result);
    }
    result
  }

  async fn batch_cancel(&self, order_ids: &[OrderId]) -> Result<Vec<CancelResult>> {
    let _exclusive = self.gate.write().await;
    let results = self
      .bounded("batch_cancel", self.inner.batch_cancel(order_ids))
      .await?;
    if let Some(metrics) = &self.metrics {
      metrics.record_cancels(&results);
    }
    Ok(results)
  }

  async fn list_positions(&self, portfolio_id: &PortfolioId) -> Result<Vec<Position>> {
    self
      .read("list_positions", self.inner.list_positions(portfolio_id))
      .await
  }

  async fn order_status(&self, order_id: &OrderId) -> Result<OrderStatus> {
    self.read("order_status", self.inner.order_status(order_id)).await
  }

  async fn list_open_orders(
    &self,
    portfolio_id: &PortfolioId,
    product_id: &ProductId,
  ) -> Result<Vec<OpenOrder>> {
    self
      .read(
        "list_open_orders",
        self.inner.list_open_orders(portfolio_id, product_id),
      )
      .await
  }
}
