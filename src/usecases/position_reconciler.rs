//! Position Reconciler - Exposure reads and reductions
//!
//! Lists live positions and closes them with immediate-or-cancel market
//! orders on the opposite side. Positions are re-read right before a
//! reduction so the order size reflects fills that landed since the
//! caller's snapshot.
//!
//! Also performs the reconciliation read required after a transport
//! failure: positions and working orders, fetched together, plus a lookup
//! of the lost order by its client order id.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::domain::trade::{
  ClientOrderId, OpenOrder, OrderRequest, OrderResult, PortfolioId, PortfolioSummary, Position,
  ProductId,
};
use crate::error::Result;
use crate::ports::gateway::ExchangeGateway;
use crate::usecases::portfolio_reader::PortfolioReader;

/// Decides how much of a position to close.
///
/// The returned size is clamped to `abs(net_size)`; zero means "leave it".
pub trait ReductionPolicy: Send + Sync {
  fn reduction_size(&self, position: &Position) -> Decimal;
}

/// Close the whole position.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullClose;

impl ReductionPolicy for FullClose {
  fn reduction_size(&self, position: &Position) -> Decimal {
    position.net_size.abs()
  }
}

/// A reduction order that reached the gateway.
#[derive(Debug, Clone)]
pub struct Reduction {
  /// Position as re-read immediately before the order.
  pub position: Position,
  /// The closing order.
  pub request: OrderRequest,
  /// Gateway outcome.
  pub result: OrderResult,
  /// Fresh summary, read after acceptance.
  pub summary_after: Option<PortfolioSummary>,
}

/// Result of `reduce_position`.
#[derive(Debug, Clone)]
pub enum ReduceOutcome {
  /// Nothing to reduce; no order was submitted.
  Flat,
  /// A closing order was submitted.
  Submitted(Reduction),
}

/// Snapshot taken after an unknown submission outcome.
#[derive(Debug, Clone)]
pub struct Reconciliation {
  pub positions: Vec<Position>,
  pub open_orders: Vec<OpenOrder>,
  /// The lost order, if it turned out to be working on the book.
  pub landed_order: Option<OpenOrder>,
}

/// Reads and reduces exposure for a portfolio.
pub struct PositionReconciler<G: ExchangeGateway> {
  gateway: Arc<G>,
  reader: PortfolioReader<G>,
  policy: Box<dyn ReductionPolicy>,
}

impl<G: ExchangeGateway> PositionReconciler<G> {
  /// Reconciler that fully closes positions.
  pub fn new(gateway: Arc<G>) -> Self {
    Self::with_policy(gateway, Box::new(FullClose))
  }

  /// Reconciler with a caller-supplied reduction policy.
  pub fn with_policy(gateway: Arc<G>, policy: Box<dyn ReductionPolicy>) -> Self {
    Self {
      reader: PortfolioReader::new(Arc::clone(&gateway)),
      gateway,
      policy,
    }
  }

  /// Fresh snapshot of open positions. Each call is a new snapshot.
  #[instrument(skip(self))]
  pub async fn list_positions(&self, portfolio_id: &PortfolioId) -> Result<Vec<Position>> {
    self.gateway.list_positions(portfolio_id).await
  }

  /// Close `position` with a market IOC order on the opposite side.
  ///
  /// A flat position is a no-op. Otherwise positions are re-read first
  /// and the fresh `net_size` is used; if the position vanished in the
  /// meantime nothing is submitted. On acceptance the summary is re-read.
  ///
  /// # Errors
  /// `PartialDataFailure` when either snapshot lacks a parsable size.
  #[instrument(skip(self, position), fields(symbol = %position.symbol, net_size = %position.net_size))]
  pub async fn reduce_position(
    &self,
    position: &Position,
    portfolio_id: &PortfolioId,
  ) -> Result<ReduceOutcome> {
    position.ensure_size_known("list_positions")?;
    if position.is_flat() {
      info!("Position is flat, nothing to reduce");
      return Ok(ReduceOutcome::Flat);
    }

    let fresh = self
      .list_positions(portfolio_id)
      .await?
      .into_iter()
      .find(|p| p.symbol == position.symbol);

    let Some(fresh) = fresh else {
      info!("Position closed since snapshot, nothing to reduce");
      return Ok(ReduceOutcome::Flat);
    };
    fresh.ensure_size_known("list_positions")?;
    if fresh.net_size != position.net_size {
      warn!(
        snapshot = %position.net_size,
        live = %fresh.net_size,
        "Position changed since snapshot, using live size"
      );
    }

    let Some(side) = fresh.closing_side() else {
      return Ok(ReduceOutcome::Flat);
    };
    let size = self
      .policy
      .reduction_size(&fresh)
      .min(fresh.net_size.abs());
    if size <= Decimal::ZERO {
      info!("Reduction policy chose to keep the position");
      return Ok(ReduceOutcome::Flat);
    }

    let request = OrderRequest::market_ioc(fresh.symbol.clone(), side, size, portfolio_id.clone())
      .without_margin();
    request.validate()?;

    let result = self.gateway.submit_order(&request).await;
    match &result {
      OrderResult::Accepted { order_id } => {
        info!(order_id = %order_id, side = %side, size = %size, "Reduction accepted");
      }
      OrderResult::Rejected { reason } => warn!(reason = %reason, "Reduction rejected"),
      OrderResult::TransportFailure { cause } => {
        warn!(cause = %cause, "Reduction outcome unknown, reconciliation required");
      }
    }

    let summary_after = if result.is_accepted() {
      Some(self.reader.fetch_summary(portfolio_id).await?)
    } else {
      None
    };

    Ok(ReduceOutcome::Submitted(Reduction {
      position: fresh,
      request,
      result,
      summary_after,
    }))
  }

  /// Read positions and working orders after an unknown submission outcome.
  ///
  /// Both reads run concurrently; neither changes state.
  #[instrument(skip(self))]
  pub async fn reconcile_after_transport_failure(
    &self,
    portfolio_id: &PortfolioId,
    product_id: &ProductId,
    client_order_id: &ClientOrderId,
  ) -> Result<Reconciliation> {
    let (positions, open_orders) = tokio::join!(
      self.gateway.list_positions(portfolio_id),
      self.gateway.list_open_orders(portfolio_id, product_id),
    );
    let positions = positions?;
    let open_orders = open_orders?;

    let landed_order = open_orders
      .iter()
      .find(|o| &o.client_order_id == client_order_id)
      .cloned();

    match &landed_order {
      Some(order) => warn!(order_id = %order.order_id, "Lost order is working on the book"),
      None => info!("Lost order is not working on the book"),
    }
    log_positions("Positions after transport failure", &positions);

    Ok(Reconciliation {
      positions,
      open_orders,
      landed_order,
    })
  }
}

/// Emit one structured event per position.
pub fn log_positions(label: &str, positions: &[Position]) {
  if positions.is_empty() {
    info!(label, "No open positions");
    return;
  }
  for p in positions {
    info!(
      label,
      symbol = %p.symbol,
      net_size = %p.net_size.round_dp(3),
      unrealized_pnl = %p.unrealized_pnl.round_dp(2),
      vwap = %p.vwap.round_dp(2),
      leverage = %p.leverage.round_dp(1),
      "Position"
    );
  }
}
