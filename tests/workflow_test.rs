//! Workflow Tests - Full Cycle Against an In-Memory Exchange
//!
//! Runs the reference cycle through `GuardedGateway` against a stateful
//! fake exchange: limit orders rest, market IOC orders fill at once,
//! positions follow fills, and cancels are idempotent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use intx_perps_bot::adapters::guarded::GuardedGateway;
use intx_perps_bot::domain::sizing::RiskSizer;
use intx_perps_bot::domain::trade::{
  Account, CancelOutcome, CancelResult, ClientOrderId, MarginType, OpenOrder, OrderId,
  OrderRequest, OrderResult, OrderSizing, OrderStatus, PortfolioId, PortfolioSummary, Position,
  PositionField, ProductId, Side, PERPETUALS_PLATFORM,
};
use intx_perps_bot::error::{EngineError, Result};
use intx_perps_bot::ports::gateway::ExchangeGateway;
use intx_perps_bot::usecases::position_reconciler::{PositionReconciler, ReduceOutcome};
use intx_perps_bot::usecases::run_cycle::{CycleOutcome, CycleParams, RunCycle};
use intx_perps_bot::usecases::settlement::PollWithBackoff;

const PORTFOLIO: &str = "pf-1";
const PRODUCT: &str = "BTC-PERP-INTX";

struct BookOrder {
  request: OrderRequest,
  status: OrderStatus,
}

#[derive(Default)]
struct ExchangeState {
  orders: HashMap<OrderId, BookOrder>,
  seen_client_ids: Vec<ClientOrderId>,
  positions: HashMap<ProductId, Decimal>,
  next_id: u32,
}

/// In-memory exchange with one perpetuals portfolio.
struct FakeExchange {
  price: Decimal,
  max_withdrawal: Decimal,
  /// Decline every limit order.
  reject_limits: bool,
  /// Book this submission (1-based) but lose the response.
  lost_response_on: Option<u32>,
  state: Mutex<ExchangeState>,
}

impl FakeExchange {
  fn new(price: Decimal, max_withdrawal: Decimal) -> Self {
    Self {
      price,
      max_withdrawal,
      reject_limits: false,
      lost_response_on: None,
      state: Mutex::new(ExchangeState::default()),
    }
  }

  fn rejecting_limits(mut self) -> Self {
    self.reject_limits = true;
    self
  }

  fn losing_response_on(mut self, submission: u32) -> Self {
    self.lost_response_on = Some(submission);
    self
  }

  fn with_position(self, product: &str, net_size: Decimal) -> Self {
    self
      .state
      .lock()
      .unwrap()
      .positions
      .insert(product.to_string(), net_size);
    self
  }

  fn net_size(&self, product: &str) -> Decimal {
    self
      .state
      .lock()
      .unwrap()
      .positions
      .get(product)
      .copied()
      .unwrap_or_default()
  }

  fn statuses(&self) -> Vec<(String, OrderStatus)> {
    let state = self.state.lock().unwrap();
    let mut out: Vec<_> = state
      .orders
      .iter()
      .map(|(id, o)| (id.clone(), o.status))
      .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
  }
}

#[async_trait]
impl ExchangeGateway for FakeExchange {
  async fn list_accounts(&self) -> Result<Vec<Account>> {
    Ok(vec![
      Account {
        name: "USDC Wallet".to_string(),
        platform: "ACCOUNT_PLATFORM_CONSUMER".to_string(),
        portfolio_id: "pf-spot".to_string(),
      },
      Account {
        name: "USDC Wallet".to_string(),
        platform: PERPETUALS_PLATFORM.to_string(),
        portfolio_id: PORTFOLIO.to_string(),
      },
    ])
  }

  async fn portfolio_summary(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSummary> {
    if portfolio_id != PORTFOLIO {
      return Err(EngineError::NotFound {
        what: "portfolio",
        name: portfolio_id.clone(),
      });
    }
    Ok(PortfolioSummary {
      collateral: dec!(2000),
      unrealized_pnl: Decimal::ZERO,
      buying_power: dec!(20000),
      total_balance: dec!(2000),
      max_withdrawal: self.max_withdrawal,
      defaulted: Vec::new(),
    })
  }

  async fn ticker(&self, _: &ProductId) -> Result<Decimal> {
    Ok(self.price)
  }

  async fn submit_order(&self, request: &OrderRequest) -> OrderResult {
    let mut state = self.state.lock().unwrap();
    if state.seen_client_ids.contains(&request.client_order_id) {
      return OrderResult::Rejected {
        reason: "DUPLICATE_CLIENT_ORDER_ID".to_string(),
      };
    }
    state.seen_client_ids.push(request.client_order_id.clone());

    if self.reject_limits && matches!(request.sizing, OrderSizing::Limit { .. }) {
      return OrderResult::Rejected {
        reason: "INSUFFICIENT_FUND".to_string(),
      };
    }

    state.next_id += 1;
    let order_id = format!("ord-{:03}", state.next_id);

    let status = match &request.sizing {
      OrderSizing::Limit { limit_price, .. } if *limit_price < self.price => OrderStatus::Open,
      sizing => {
        let signed = match request.side {
          Side::Buy => sizing.base_size(),
          Side::Sell => -sizing.base_size(),
        };
        *state
          .positions
          .entry(request.product_id.clone())
          .or_default() += signed;
        OrderStatus::Filled
      }
    };

    state.orders.insert(
      order_id.clone(),
      BookOrder {
        request: request.clone(),
        status,
      },
    );

    if self.lost_response_on == Some(state.next_id) {
      return OrderResult::TransportFailure {
        cause: "connection reset by peer".to_string(),
      };
    }
    OrderResult::Accepted { order_id }
  }

  async fn batch_cancel(&self, order_ids: &[OrderId]) -> Result<Vec<CancelResult>> {
    let mut state = self.state.lock().unwrap();
    Ok(
      order_ids
        .iter()
        .map(|id| {
          let outcome = match state.orders.get_mut(id) {
            Some(order) if order.status == OrderStatus::Open => {
              order.status = OrderStatus::Cancelled;
              CancelOutcome::Cancelled
            }
            Some(_) => CancelOutcome::AlreadyClosed,
            None => CancelOutcome::Failed {
              reason: "UNKNOWN_ORDER".to_string(),
            },
          };
          CancelResult {
            order_id: id.clone(),
            outcome,
          }
        })
        .collect(),
    )
  }

  async fn list_positions(&self, _: &PortfolioId) -> Result<Vec<Position>> {
    let state = self.state.lock().unwrap();
    Ok(
      state
        .positions
        .iter()
        .filter(|(_, size)| !size.is_zero())
        .map(|(symbol, size)| Position {
          symbol: symbol.clone(),
          net_size: *size,
          unrealized_pnl: Decimal::ZERO,
          vwap: self.price,
          leverage: dec!(10),
          defaulted: Vec::new(),
        })
        .collect(),
    )
  }

  async fn order_status(&self, order_id: &OrderId) -> Result<OrderStatus> {
    self
      .state
      .lock()
      .unwrap()
      .orders
      .get(order_id)
      .map(|o| o.status)
      .ok_or_else(|| EngineError::NotFound {
        what: "order",
        name: order_id.clone(),
      })
  }

  async fn list_open_orders(
    &self,
    _: &PortfolioId,
    product_id: &ProductId,
  ) -> Result<Vec<OpenOrder>> {
    let state = self.state.lock().unwrap();
    Ok(
      state
        .orders
        .iter()
        .filter(|(_, o)| o.status == OrderStatus::Open && &o.request.product_id == product_id)
        .map(|(id, o)| OpenOrder {
          order_id: id.clone(),
          client_order_id: o.request.client_order_id.clone(),
          product_id: o.request.product_id.clone(),
          side: o.request.side,
          status: o.status,
        })
        .collect(),
    )
  }
}

fn guarded(exchange: FakeExchange) -> Arc<GuardedGateway<FakeExchange>> {
  Arc::new(GuardedGateway::new(exchange, Duration::from_secs(5)))
}

fn params(reduce_after_cycle: bool) -> CycleParams {
  CycleParams {
    portfolio_name: "USDC Wallet".to_string(),
    product_id: PRODUCT.to_string(),
    leverage: dec!(10),
    margin_type: MarginType::Cross,
    sizer: RiskSizer::default(),
    reduce_after_cycle,
  }
}

fn poll() -> Arc<PollWithBackoff> {
  Arc::new(PollWithBackoff::new(3, Duration::from_millis(1)))
}

#[tokio::test]
async fn test_cycle_without_reduction_leaves_market_fill() {
  let gateway = guarded(FakeExchange::new(dec!(50000), dec!(1000)));
  let cycle = RunCycle::new(Arc::clone(&gateway), poll(), params(false));

  let report = cycle.run().await.unwrap().into_result().unwrap();

  assert_eq!(report.sized.base_size, dec!(0.1));
  assert_eq!(report.sized.limit_price, dec!(49750));
  assert_eq!(gateway.inner().net_size(PRODUCT), dec!(0.1));
  assert_eq!(
    gateway.inner().statuses(),
    vec![
      ("ord-001".to_string(), OrderStatus::Cancelled),
      ("ord-002".to_string(), OrderStatus::Filled),
    ]
  );
  assert_eq!(report.positions.len(), 1);
}

#[tokio::test]
async fn test_cycle_with_reduction_ends_flat() {
  let gateway = guarded(FakeExchange::new(dec!(50000), dec!(1000)));
  let cycle = RunCycle::new(Arc::clone(&gateway), poll(), params(true));

  let report = cycle.run().await.unwrap().into_result().unwrap();

  let Some(ReduceOutcome::Submitted(reduction)) = report.reduction else {
    panic!("expected the market fill to be reduced");
  };
  assert_eq!(reduction.request.side, Side::Sell);
  assert_eq!(reduction.request.sizing.base_size(), dec!(0.1));
  assert!(reduction.result.is_accepted());
  assert!(gateway.inner().net_size(PRODUCT).is_zero());
}

#[tokio::test]
async fn test_reduction_uses_live_size() {
  let gateway = guarded(FakeExchange::new(dec!(50000), dec!(1000)).with_position(PRODUCT, dec!(0.25)));
  let reconciler = PositionReconciler::new(Arc::clone(&gateway));

  // Stale snapshot taken before more fills landed.
  let stale = Position {
    symbol: PRODUCT.to_string(),
    net_size: dec!(0.1),
    unrealized_pnl: Decimal::ZERO,
    vwap: dec!(50000),
    leverage: dec!(10),
    defaulted: Vec::new(),
  };
  let outcome = reconciler
    .reduce_position(&stale, &PORTFOLIO.to_string())
    .await
    .unwrap();

  assert!(matches!(outcome, ReduceOutcome::Submitted(_)));
  assert!(gateway.inner().net_size(PRODUCT).is_zero());
}

#[tokio::test]
async fn test_unknown_portfolio_name_aborts_before_trading() {
  let gateway = guarded(FakeExchange::new(dec!(50000), dec!(1000)));
  let mut p = params(false);
  p.portfolio_name = "Missing".to_string();
  let cycle = RunCycle::new(Arc::clone(&gateway), poll(), p);

  let err = cycle.run().await.unwrap_err();
  assert!(matches!(err, EngineError::NotFound { .. }));
  assert!(gateway.inner().statuses().is_empty());
}

#[tokio::test]
async fn test_rejected_limit_continues_to_market_order() {
  let gateway = guarded(FakeExchange::new(dec!(50000), dec!(1000)).rejecting_limits());
  let cycle = RunCycle::new(Arc::clone(&gateway), poll(), params(false));

  let report = cycle.run().await.unwrap().into_result().unwrap();

  assert!(matches!(report.limit.result, OrderResult::Rejected { .. }));
  assert!(report.cancel.is_none());
  assert!(report.market.result.is_accepted());
  assert_eq!(gateway.inner().net_size(PRODUCT), dec!(0.1));
}

#[tokio::test]
async fn test_lost_limit_response_halts_and_order_is_left_on_book() {
  let gateway = guarded(FakeExchange::new(dec!(50000), dec!(1000)).losing_response_on(1));
  let cycle = RunCycle::new(Arc::clone(&gateway), poll(), params(true));

  let CycleOutcome::Halted(halt) = cycle.run().await.unwrap() else {
    panic!("expected the cycle to halt");
  };

  assert!(halt.to_error().requires_reconciliation());
  assert_eq!(halt.landed_order().map(|o| o.order_id.as_str()), Some("ord-001"));
  // Nothing after the lost submission ran: no cancel, no market order.
  assert_eq!(
    gateway.inner().statuses(),
    vec![("ord-001".to_string(), OrderStatus::Open)]
  );
  assert!(gateway.inner().net_size(PRODUCT).is_zero());
}

#[tokio::test]
async fn test_unparsable_position_size_refuses_reduction() {
  let gateway = guarded(FakeExchange::new(dec!(50000), dec!(1000)));
  let reconciler = PositionReconciler::new(Arc::clone(&gateway));

  let unreadable = Position {
    symbol: PRODUCT.to_string(),
    net_size: Decimal::ZERO,
    unrealized_pnl: Decimal::ZERO,
    vwap: dec!(50000),
    leverage: dec!(10),
    defaulted: vec![PositionField::NetSize],
  };
  let err = reconciler
    .reduce_position(&unreadable, &PORTFOLIO.to_string())
    .await
    .unwrap_err();

  assert!(matches!(err, EngineError::PartialDataFailure { .. }));
  assert!(gateway.inner().statuses().is_empty());
}
