//! Order Manager - Order Lifecycle Management
//!
//! Drives each order intent through its lifecycle for one portfolio:
//! - Submitting limit (GTC) and market (IOC) orders
//! - Re-reading the portfolio summary after every state change
//! - Waiting for settlement through a pluggable strategy
//! - Idempotent batch cancellation
//!
//! State-changing methods take `&mut self`, so one manager can never have
//! two of them in flight at once.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::lifecycle::{OrderEvent, OrderState, TrackedOrder};
use crate::domain::trade::{
  CancelOutcome, ClientOrderId, OrderId, OrderRequest, OrderResult, OrderSizing, OrderStatus,
  PortfolioId, PortfolioSummary,
};
use crate::error::{EngineError, Result};
use crate::ports::gateway::ExchangeGateway;
use crate::ports::settlement::SettlementWait;
use crate::usecases::portfolio_reader::PortfolioReader;

/// What a submission produced.
#[derive(Debug, Clone)]
pub struct Placement {
  /// Idempotency token the order was sent with.
  pub client_order_id: ClientOrderId,
  /// Gateway outcome.
  pub result: OrderResult,
  /// Fresh summary read after acceptance; `None` when nothing changed.
  pub summary_after: Option<PortfolioSummary>,
}

/// What a batch cancel achieved. Both lists mean "no open order remains".
#[derive(Debug, Clone, Default)]
pub struct CancelReport {
  /// Orders that were open and are now cancelled.
  pub cancelled: Vec<OrderId>,
  /// Orders that were already filled, cancelled, or expired.
  pub already_closed: Vec<OrderId>,
  /// Fresh summary read after the cancel.
  pub summary_after: Option<PortfolioSummary>,
}

/// Manages order intents for a single portfolio.
pub struct OrderManager<G: ExchangeGateway> {
  /// Gateway port.
  gateway: Arc<G>,
  /// Reader used for post-change summaries.
  reader: PortfolioReader<G>,
  /// Portfolio every request must target.
  portfolio_id: PortfolioId,
  /// Wait strategy used before acting on an accepted order.
  settlement: Arc<dyn SettlementWait>,
  /// Every intent submitted through this manager, by client order id.
  orders: HashMap<ClientOrderId, TrackedOrder>,
}

impl<G: ExchangeGateway> OrderManager<G> {
  /// Create a manager bound to one portfolio.
  pub fn new(
    gateway: Arc<G>,
    portfolio_id: PortfolioId,
    settlement: Arc<dyn SettlementWait>,
  ) -> Self {
    Self {
      reader: PortfolioReader::new(Arc::clone(&gateway)),
      gateway,
      portfolio_id,
      settlement,
      orders: HashMap::new(),
    }
  }

  /// Portfolio this manager trades.
  pub fn portfolio_id(&self) -> &PortfolioId {
    &self.portfolio_id
  }

  /// Submit a GTC limit order.
  ///
  /// On acceptance the summary is re-read before returning. A transport
  /// failure comes back as `OrderResult::TransportFailure`: the order may
  /// exist, so callers must reconcile rather than resubmit.
  #[instrument(skip(self, request), fields(client_order_id = %request.client_order_id))]
  pub async fn place_limit_order(&mut self, request: OrderRequest) -> Result<Placement> {
    if !matches!(request.sizing, OrderSizing::Limit { .. }) {
      return Err(EngineError::InvalidInput(
        "place_limit_order requires limit sizing".to_string(),
      ));
    }
    self.place(request).await
  }

  /// Submit an immediate-or-cancel market order. Same contract as limit.
  #[instrument(skip(self, request), fields(client_order_id = %request.client_order_id))]
  pub async fn place_market_order(&mut self, request: OrderRequest) -> Result<Placement> {
    if !matches!(request.sizing, OrderSizing::MarketImmediateOrCancel { .. }) {
      return Err(EngineError::InvalidInput(
        "place_market_order requires market IOC sizing".to_string(),
      ));
    }
    self.place(request).await
  }

  async fn place(&mut self, request: OrderRequest) -> Result<Placement> {
    request.validate()?;
    if request.portfolio_id != self.portfolio_id {
      return Err(EngineError::InvalidInput(format!(
        "request targets portfolio {} but manager owns {}",
        request.portfolio_id, self.portfolio_id
      )));
    }
    if self.orders.contains_key(&request.client_order_id) {
      return Err(EngineError::InvalidInput(format!(
        "client order id {} already used",
        request.client_order_id
      )));
    }

    let client_order_id = request.client_order_id.clone();
    let mut tracked = TrackedOrder::new(request);
    tracked.advance(OrderEvent::Submit)?;

    let result = self.gateway.submit_order(&tracked.request).await;

    match &result {
      OrderResult::Accepted { order_id } => {
        tracked.advance(OrderEvent::Accept)?;
        tracked.order_id = Some(order_id.clone());
        info!(
          order_id = %order_id,
          kind = tracked.request.sizing.kind(),
          side = %tracked.request.side,
          size = %tracked.request.sizing.base_size(),
          "Order accepted"
        );
      }
      OrderResult::Rejected { reason } => {
        tracked.advance(OrderEvent::Reject)?;
        warn!(reason = %reason, kind = tracked.request.sizing.kind(), "Order rejected");
      }
      OrderResult::TransportFailure { cause } => {
        tracked.advance(OrderEvent::TransportFailure)?;
        warn!(
          cause = %cause,
          kind = tracked.request.sizing.kind(),
          "Order outcome unknown, reconciliation required"
        );
      }
    }

    self.orders.insert(client_order_id.clone(), tracked);

    // The order is tracked before the re-read, so a failed read never loses it.
    let summary_after = if result.is_accepted() {
      Some(self.reader.fetch_summary(&self.portfolio_id).await?)
    } else {
      None
    };

    Ok(Placement {
      client_order_id,
      result,
      summary_after,
    })
  }

  /// Wait for an accepted order to settle using the configured strategy.
  pub async fn await_settlement(&self, order_id: &OrderId) -> Result<Option<OrderStatus>> {
    self
      .settlement
      .await_settlement(&*self.gateway, order_id)
      .await
  }

  /// Cancel a batch of orders.
  ///
  /// Idempotent: an order that is already filled or cancelled counts as
  /// success. Fails with `Rejected` only when the exchange refuses to
  /// cancel an order that is still working.
  #[instrument(skip(self), fields(count = order_ids.len()))]
  pub async fn cancel_orders(&mut self, order_ids: &[OrderId]) -> Result<CancelReport> {
    if order_ids.is_empty() {
      return Ok(CancelReport::default());
    }

    for order_id in order_ids {
      if let Some(tracked) = self.tracked_by_order_id_mut(order_id) {
        tracked.advance(OrderEvent::RequestCancel)?;
      }
    }

    // On a transport failure the intents stay Cancelling until confirmed.
    let results = self.gateway.batch_cancel(order_ids).await?;

    let mut report = CancelReport::default();
    let mut refused = Vec::new();

    for order_id in order_ids {
      let outcome = results
        .iter()
        .find(|r| &r.order_id == order_id)
        .map_or_else(
          || CancelOutcome::Failed {
            reason: "no result returned".to_string(),
          },
          |r| r.outcome.clone(),
        );

      let event = match outcome {
        CancelOutcome::Cancelled => {
          report.cancelled.push(order_id.clone());
          OrderEvent::ConfirmCancel
        }
        CancelOutcome::AlreadyClosed => {
          report.already_closed.push(order_id.clone());
          OrderEvent::ConfirmCancel
        }
        CancelOutcome::Failed { reason } => {
          refused.push(format!("{order_id}: {reason}"));
          OrderEvent::CancelRefused
        }
      };

      if let Some(tracked) = self.tracked_by_order_id_mut(order_id) {
        tracked.advance(event)?;
      }
    }

    info!(
      cancelled = report.cancelled.len(),
      already_closed = report.already_closed.len(),
      refused = refused.len(),
      "Batch cancel completed"
    );

    report.summary_after = Some(self.reader.fetch_summary(&self.portfolio_id).await?);

    if refused.is_empty() {
      Ok(report)
    } else {
      Err(EngineError::Rejected {
        operation: "batch_cancel",
        reason: refused.join("; "),
      })
    }
  }

  /// Wait for settlement, then cancel one accepted order.
  ///
  /// The cancel is attempted even when the wait fails, so a GTC order
  /// never stays on the book because of a status read.
  pub async fn settle_and_cancel(&mut self, order_id: &OrderId) -> Result<CancelReport> {
    match self.await_settlement(order_id).await {
      Ok(Some(status)) => info!(order_id = %order_id, status = ?status, "Order settled"),
      Ok(None) => {}
      Err(e) => warn!(order_id = %order_id, error = %e, "Settlement wait failed, cancelling anyway"),
    }
    self.cancel_orders(std::slice::from_ref(order_id)).await
  }

  /// Lifecycle record for one intent.
  pub fn tracked(&self, client_order_id: &str) -> Option<&TrackedOrder> {
    self.orders.get(client_order_id)
  }

  /// Intents currently believed open on the exchange.
  pub fn open_orders(&self) -> impl Iterator<Item = &TrackedOrder> {
    self
      .orders
      .values()
      .filter(|t| t.state == OrderState::Open)
  }

  /// Intents whose submission outcome is unknown.
  pub fn unresolved_orders(&self) -> impl Iterator<Item = &TrackedOrder> {
    self
      .orders
      .values()
      .filter(|t| t.state == OrderState::Unresolved)
  }

  fn tracked_by_order_id_mut(&mut self, order_id: &str) -> Option<&mut TrackedOrder> {
    self
      .orders
      .values_mut()
      .find(|t| t.order_id.as_deref() == Some(order_id))
  }
}
