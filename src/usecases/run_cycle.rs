//! Run Cycle - The reference trading workflow
//!
//! Each step waits for the previous step's committed result:
//! 1. Resolve the portfolio and read its summary
//! 2. Fetch the market price and size a limit buy
//! 3. Place the limit buy; on acceptance wait for settlement, then cancel it
//! 4. Place a market IOC buy at the same size
//! 5. Read positions, optionally close the traded product, read the summary
//!
//! A transport failure on any submission or cancel triggers a
//! reconciliation read and halts the cycle with `CycleOutcome::Halted`.
//! A rejection only ends that order.
//!
//! A halt never acts on what the reconciliation finds: an order that
//! landed on the book is reported in `CycleHalt::landed_order` and left
//! for the operator.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::config::TradingConfig;
use crate::domain::sizing::{RiskSizer, SizedOrder};
use crate::domain::trade::{
  ClientOrderId, MarginType, OpenOrder, OrderRequest, OrderResult, PortfolioId, PortfolioSummary,
  Position, ProductId, Side,
};
use crate::error::{EngineError, Result};
use crate::ports::gateway::ExchangeGateway;
use crate::ports::settlement::SettlementWait;
use crate::usecases::order_manager::{CancelReport, OrderManager, Placement};
use crate::usecases::portfolio_reader::{log_summary, PortfolioReader};
use crate::usecases::position_reconciler::{
  log_positions, PositionReconciler, Reconciliation, ReduceOutcome,
};

/// Parameters of one cycle.
#[derive(Debug, Clone)]
pub struct CycleParams {
  pub portfolio_name: String,
  pub product_id: ProductId,
  pub leverage: Decimal,
  pub margin_type: MarginType,
  pub sizer: RiskSizer,
  /// Close the traded product's position at the end.
  pub reduce_after_cycle: bool,
}

impl TryFrom<&TradingConfig> for CycleParams {
  type Error = EngineError;

  fn try_from(config: &TradingConfig) -> Result<Self> {
    Ok(Self {
      portfolio_name: config.portfolio_name.clone(),
      product_id: config.product_id.clone(),
      leverage: config.leverage,
      margin_type: config.margin_type,
      sizer: RiskSizer::new(
        config.allocation_fraction,
        config.price_slippage_factor,
        config.size_step,
        config.price_step,
      )?,
      reduce_after_cycle: config.reduce_after_cycle,
    })
  }
}

/// Everything a completed cycle observed.
#[derive(Debug, Clone)]
pub struct CycleReport {
  pub portfolio_id: PortfolioId,
  pub initial_summary: PortfolioSummary,
  pub market_price: Decimal,
  pub sized: SizedOrder,
  pub limit: Placement,
  /// Present when the limit order was accepted and then cancelled.
  pub cancel: Option<CancelReport>,
  pub market: Placement,
  pub positions: Vec<Position>,
  pub reduction: Option<ReduceOutcome>,
  pub final_summary: PortfolioSummary,
}

/// A cycle stopped after an operation whose outcome is unknown.
#[derive(Debug, Clone)]
pub struct CycleHalt {
  pub portfolio_id: PortfolioId,
  /// Operation whose response was lost.
  pub operation: &'static str,
  /// Client order id of the order involved.
  pub client_order_id: ClientOrderId,
  pub cause: String,
  /// Exchange state read after the failure; `None` if that read failed too.
  pub reconciliation: Option<Reconciliation>,
}

impl CycleHalt {
  /// The order involved, if it is working on the book.
  pub fn landed_order(&self) -> Option<&OpenOrder> {
    self
      .reconciliation
      .as_ref()
      .and_then(|r| r.landed_order.as_ref())
  }

  /// The halt as a `TransportFailure`.
  pub fn to_error(&self) -> EngineError {
    EngineError::TransportFailure {
      operation: self.operation,
      cause: self.cause.clone(),
    }
  }
}

/// How a cycle ended.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
  /// Every step ran.
  Completed(Box<CycleReport>),
  /// Stopped after an unknown outcome; nothing further was submitted.
  Halted(CycleHalt),
}

impl CycleOutcome {
  /// The report of a completed cycle, or the halt as an error.
  pub fn into_result(self) -> Result<CycleReport> {
    match self {
      Self::Completed(report) => Ok(*report),
      Self::Halted(halt) => Err(halt.to_error()),
    }
  }
}

/// Orchestrates reader → sizer → lifecycle manager → reconciler.
pub struct RunCycle<G: ExchangeGateway> {
  gateway: Arc<G>,
  settlement: Arc<dyn SettlementWait>,
  params: CycleParams,
}

impl<G: ExchangeGateway> RunCycle<G> {
  pub fn new(gateway: Arc<G>, settlement: Arc<dyn SettlementWait>, params: CycleParams) -> Self {
    Self {
      gateway,
      settlement,
      params,
    }
  }

  /// Execute the full cycle once.
  ///
  /// Errors are failures before anything was submitted, or known
  /// failures after; unknown outcomes come back as `CycleOutcome::Halted`.
  #[instrument(skip(self), fields(portfolio = %self.params.portfolio_name, product = %self.params.product_id))]
  pub async fn run(&self) -> Result<CycleOutcome> {
    let reader = PortfolioReader::new(Arc::clone(&self.gateway));
    let reconciler = PositionReconciler::new(Arc::clone(&self.gateway));
    let product_id = &self.params.product_id;

    // ── 1. Portfolio state ──────────────────────────────
    let portfolio_id = reader
      .resolve_portfolio_id(&self.params.portfolio_name)
      .await?;
    let initial_summary = reader.fetch_complete_summary(&portfolio_id).await?;
    log_summary("Initial Portfolio Overview", &initial_summary);

    // ── 2. Sizing ───────────────────────────────────────
    let market_price = reader.market_price(product_id).await?;
    let sized = self
      .params
      .sizer
      .size(&initial_summary, market_price, self.params.leverage)?;
    info!(
      leverage = %self.params.leverage,
      base_size = %sized.base_size,
      limit_price = %sized.limit_price,
      "Order parameters"
    );
    if sized.is_empty() {
      return Err(EngineError::InvalidInput(format!(
        "sized order is below one size step (max_withdrawal={}, price={market_price})",
        initial_summary.max_withdrawal
      )));
    }

    let mut manager = OrderManager::new(
      Arc::clone(&self.gateway),
      portfolio_id.clone(),
      Arc::clone(&self.settlement),
    );

    // ── 3. Limit buy, then cancel it ────────────────────
    let limit_request = OrderRequest::limit(
      product_id.clone(),
      Side::Buy,
      sized.limit_price,
      sized.base_size,
      portfolio_id.clone(),
    )
    .with_leverage(self.params.leverage, self.params.margin_type);
    let limit = manager.place_limit_order(limit_request).await?;

    let cancel = match &limit.result {
      OrderResult::Accepted { order_id } => {
        if let Some(summary) = &limit.summary_after {
          log_summary("Portfolio After Limit Order", summary);
        }
        match manager.settle_and_cancel(order_id).await {
          Ok(report) => Some(report),
          Err(e @ EngineError::Rejected { .. }) => {
            warn!(error = %e, "Limit order cancel refused, continuing");
            None
          }
          Err(EngineError::TransportFailure { operation, cause }) => {
            return Ok(
              self
                .halt(&reconciler, &portfolio_id, &limit.client_order_id, &cause, operation)
                .await,
            );
          }
          Err(e) => return Err(e),
        }
      }
      OrderResult::Rejected { reason } => {
        warn!(reason = %reason, "Limit order placement failed, continuing");
        None
      }
      OrderResult::TransportFailure { cause } => {
        return Ok(
          self
            .halt(&reconciler, &portfolio_id, &limit.client_order_id, cause, "submit_limit_order")
            .await,
        );
      }
    };

    // ── 4. Market buy at the same size ──────────────────
    let market_request = OrderRequest::market_ioc(
      product_id.clone(),
      Side::Buy,
      sized.base_size,
      portfolio_id.clone(),
    )
    .with_leverage(self.params.leverage, self.params.margin_type);
    let market = manager.place_market_order(market_request).await?;

    match &market.result {
      OrderResult::Accepted { .. } => {
        if let Some(summary) = &market.summary_after {
          log_summary("Portfolio After Market Order", summary);
        }
      }
      OrderResult::Rejected { reason } => {
        warn!(reason = %reason, "Market order placement failed, continuing");
      }
      OrderResult::TransportFailure { cause } => {
        return Ok(
          self
            .halt(&reconciler, &portfolio_id, &market.client_order_id, cause, "submit_market_order")
            .await,
        );
      }
    }

    // ── 5. Positions, reduction, final state ────────────
    let positions = reconciler.list_positions(&portfolio_id).await?;
    log_positions("Current Positions", &positions);

    let reduction = if self.params.reduce_after_cycle {
      match positions.iter().find(|p| &p.symbol == product_id) {
        Some(position) => {
          let outcome = reconciler.reduce_position(position, &portfolio_id).await?;
          if let ReduceOutcome::Submitted(reduction) = &outcome {
            if let OrderResult::TransportFailure { cause } = &reduction.result {
              return Ok(
                self
                  .halt(
                    &reconciler,
                    &portfolio_id,
                    &reduction.request.client_order_id,
                    cause,
                    "reduce_position",
                  )
                  .await,
              );
            }
          }
          Some(outcome)
        }
        None => {
          info!("No position on the traded product to reduce");
          None
        }
      }
    } else {
      None
    };

    let final_summary = reader.fetch_summary(&portfolio_id).await?;
    log_summary("Final Portfolio Overview", &final_summary);

    Ok(CycleOutcome::Completed(Box::new(CycleReport {
      portfolio_id,
      initial_summary,
      market_price,
      sized,
      limit,
      cancel,
      market,
      positions,
      reduction,
      final_summary,
    })))
  }

  /// Reconcile after an unknown outcome and report the halt.
  async fn halt(
    &self,
    reconciler: &PositionReconciler<G>,
    portfolio_id: &PortfolioId,
    client_order_id: &ClientOrderId,
    cause: &str,
    operation: &'static str,
  ) -> CycleOutcome {
    warn!(
      client_order_id = %client_order_id,
      operation,
      cause,
      "Outcome unknown, reconciling before halting"
    );
    let reconciliation = match reconciler
      .reconcile_after_transport_failure(portfolio_id, &self.params.product_id, client_order_id)
      .await
    {
      Ok(reconciliation) => Some(reconciliation),
      Err(e) => {
        warn!(error = %e, "Reconciliation read failed");
        None
      }
    };

    CycleOutcome::Halted(CycleHalt {
      portfolio_id: portfolio_id.clone(),
      operation,
      client_order_id: client_order_id.clone(),
      cause: cause.to_string(),
      reconciliation,
    })
  }
}
