//! Coinbase Brokerage Wire Types
//!
//! Request/response shapes of the Advanced Trade brokerage endpoints
//! and their conversion into domain types. Every response field is
//! optional on the wire; monetary values arrive as decimal strings.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trade::{
  Account, CancelOutcome, CancelResult, MarginType, OpenOrder, OrderId, OrderRequest, OrderResult,
  OrderSizing, OrderStatus, PortfolioSummary, Position, PositionField, Side, SummaryField,
};
use crate::error::{EngineError, Result};

/// Parse a wire decimal string. Blank or malformed values are `None`.
pub fn parse_decimal(raw: Option<&str>) -> Option<Decimal> {
  raw
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .and_then(|s| Decimal::from_str(s).ok())
}

/// `{"value": "12.34", "currency": "USDC"}`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoneyValue {
  pub value: Option<String>,
  pub currency: Option<String>,
}

impl MoneyValue {
  fn amount(money: Option<&Self>) -> Option<Decimal> {
    parse_decimal(money.and_then(|m| m.value.as_deref()))
  }
}

// ── Accounts ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsResponse {
  #[serde(default)]
  pub accounts: Vec<WireAccount>,
  #[serde(default)]
  pub has_next: bool,
  #[serde(default)]
  pub cursor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireAccount {
  #[serde(default)]
  pub uuid: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub platform: String,
  #[serde(default)]
  pub retail_portfolio_id: String,
}

impl From<WireAccount> for Account {
  fn from(wire: WireAccount) -> Self {
    Self {
      name: wire.name,
      platform: wire.platform,
      portfolio_id: wire.retail_portfolio_id,
    }
  }
}

// ── Portfolio summary ───────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortfolioResponse {
  pub summary: Option<WireSummary>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireSummary {
  pub collateral: Option<MoneyValue>,
  pub unrealized_pnl: Option<MoneyValue>,
  pub buying_power: Option<MoneyValue>,
  pub total_balance: Option<MoneyValue>,
  pub max_withdrawal_amount: Option<MoneyValue>,
}

impl PortfolioResponse {
  /// Convert to a domain summary, zeroing and flagging absent fields.
  pub fn into_summary(self) -> PortfolioSummary {
    let wire = self.summary.unwrap_or_default();
    let mut summary = PortfolioSummary::default();

    let fields = [
      (SummaryField::Collateral, wire.collateral.as_ref(), &mut summary.collateral),
      (SummaryField::UnrealizedPnl, wire.unrealized_pnl.as_ref(), &mut summary.unrealized_pnl),
      (SummaryField::BuyingPower, wire.buying_power.as_ref(), &mut summary.buying_power),
      (SummaryField::TotalBalance, wire.total_balance.as_ref(), &mut summary.total_balance),
      (SummaryField::MaxWithdrawal, wire.max_withdrawal_amount.as_ref(), &mut summary.max_withdrawal),
    ];

    let mut defaulted = Vec::new();
    for (field, money, slot) in fields {
      match MoneyValue::amount(money) {
        Some(amount) => *slot = amount,
        None => defaulted.push(field),
      }
    }
    summary.defaulted = defaulted;
    summary
  }
}

// ── Key permissions ─────────────────────────────────────

/// `GET /key_permissions`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeyPermissions {
  pub can_view: bool,
  pub can_trade: bool,
  pub can_transfer: bool,
  pub portfolio_uuid: String,
  pub portfolio_type: String,
}

impl KeyPermissions {
  /// Fail unless the key can both read state and place orders.
  pub fn ensure_trading(&self) -> Result<()> {
    if self.can_view && self.can_trade {
      return Ok(());
    }
    Err(EngineError::InvalidInput(format!(
      "API key lacks trading permissions (can_view={}, can_trade={})",
      self.can_view, self.can_trade
    )))
  }
}

// ── Ticker ──────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TickerResponse {
  #[serde(default)]
  pub trades: Vec<WireTrade>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireTrade {
  pub price: Option<String>,
}

impl TickerResponse {
  /// Price of the most recent trade, if any parsed.
  pub fn latest_price(&self) -> Option<Decimal> {
    self
      .trades
      .first()
      .and_then(|t| parse_decimal(t.price.as_deref()))
  }
}

// ── Positions ───────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PositionsResponse {
  #[serde(default)]
  pub positions: Vec<WirePosition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePosition {
  #[serde(default)]
  pub symbol: String,
  pub net_size: Option<String>,
  pub unrealized_pnl: Option<MoneyValue>,
  pub vwap: Option<MoneyValue>,
  pub leverage: Option<String>,
}

impl From<WirePosition> for Position {
  /// Missing numbers default (zero, leverage one) and are flagged.
  fn from(wire: WirePosition) -> Self {
    let mut defaulted = Vec::new();
    let mut or_flag = |value: Option<Decimal>, field: PositionField, fallback: Decimal| {
      value.unwrap_or_else(|| {
        defaulted.push(field);
        fallback
      })
    };

    let net_size = or_flag(parse_decimal(wire.net_size.as_deref()), PositionField::NetSize, Decimal::ZERO);
    let unrealized_pnl = or_flag(
      MoneyValue::amount(wire.unrealized_pnl.as_ref()),
      PositionField::UnrealizedPnl,
      Decimal::ZERO,
    );
    let vwap = or_flag(MoneyValue::amount(wire.vwap.as_ref()), PositionField::Vwap, Decimal::ZERO);
    let leverage = or_flag(parse_decimal(wire.leverage.as_deref()), PositionField::Leverage, Decimal::ONE);

    Self {
      symbol: wire.symbol,
      net_size,
      unrealized_pnl,
      vwap,
      leverage,
      defaulted,
    }
  }
}

// ── Order creation ──────────────────────────────────────

/// Order payload for `POST /orders`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest<'a> {
  pub client_order_id: &'a str,
  pub product_id: &'a str,
  pub side: String,
  pub order_configuration: OrderConfiguration,
  pub retail_portfolio_id: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub leverage: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub margin_type: Option<MarginType>,
}

/// Externally tagged: `{"limit_limit_gtc": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderConfiguration {
  LimitLimitGtc { base_size: String, limit_price: String },
  MarketMarketIoc { base_size: String },
}

impl<'a> From<&'a OrderRequest> for CreateOrderRequest<'a> {
  fn from(request: &'a OrderRequest) -> Self {
    let order_configuration = match &request.sizing {
      OrderSizing::Limit {
        limit_price,
        base_size,
      } => OrderConfiguration::LimitLimitGtc {
        base_size: base_size.normalize().to_string(),
        limit_price: limit_price.normalize().to_string(),
      },
      OrderSizing::MarketImmediateOrCancel { base_size } => OrderConfiguration::MarketMarketIoc {
        base_size: base_size.normalize().to_string(),
      },
    };

    Self {
      client_order_id: &request.client_order_id,
      product_id: &request.product_id,
      side: request.side.to_string(),
      order_configuration,
      retail_portfolio_id: &request.portfolio_id,
      leverage: request.leverage.map(|l| l.normalize().to_string()),
      margin_type: request.margin_type,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderResponse {
  #[serde(default)]
  pub success: bool,
  pub success_response: Option<SuccessResponse>,
  pub error_response: Option<ErrorResponse>,
  pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SuccessResponse {
  #[serde(default)]
  pub order_id: String,
  pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
  pub error: Option<String>,
  pub message: Option<String>,
  pub error_details: Option<String>,
  pub preview_failure_reason: Option<String>,
}

impl ErrorResponse {
  fn reason(&self) -> Option<String> {
    let parts: Vec<&str> = [
      self.error.as_deref(),
      self.message.as_deref(),
      self.error_details.as_deref(),
      self.preview_failure_reason.as_deref(),
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .collect();

    (!parts.is_empty()).then(|| parts.join(": "))
  }
}

impl CreateOrderResponse {
  /// Map the exchange answer onto an order outcome.
  ///
  /// A success without an order id is treated as an unknown outcome:
  /// the order may exist but cannot be addressed.
  pub fn into_result(self) -> OrderResult {
    if self.success {
      return match self.success_response {
        Some(ok) if !ok.order_id.is_empty() => OrderResult::Accepted {
          order_id: ok.order_id,
        },
        _ => OrderResult::TransportFailure {
          cause: "order accepted without an order id".to_string(),
        },
      };
    }

    let reason = self
      .error_response
      .as_ref()
      .and_then(ErrorResponse::reason)
      .or(self.failure_reason)
      .unwrap_or_else(|| "UNKNOWN_FAILURE_REASON".to_string());
    OrderResult::Rejected { reason }
  }
}

// ── Cancellation ────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct BatchCancelRequest<'a> {
  pub order_ids: &'a [OrderId],
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchCancelResponse {
  #[serde(default)]
  pub results: Vec<WireCancelResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireCancelResult {
  #[serde(default)]
  pub success: bool,
  #[serde(default)]
  pub failure_reason: String,
  #[serde(default)]
  pub order_id: String,
}

/// Failure reasons meaning "there is no open order left to cancel".
const ALREADY_CLOSED_REASONS: &[&str] = &["UNKNOWN_CANCEL_ORDER", "DUPLICATE_CANCEL_REQUEST"];

impl From<WireCancelResult> for CancelResult {
  fn from(wire: WireCancelResult) -> Self {
    let outcome = if wire.success {
      CancelOutcome::Cancelled
    } else if ALREADY_CLOSED_REASONS.contains(&wire.failure_reason.as_str()) {
      CancelOutcome::AlreadyClosed
    } else {
      CancelOutcome::Failed {
        reason: wire.failure_reason,
      }
    };
    Self {
      order_id: wire.order_id,
      outcome,
    }
  }
}

// ── Order lookups ───────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
  pub order: WireOrder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersResponse {
  #[serde(default)]
  pub orders: Vec<WireOrder>,
  #[serde(default)]
  pub has_next: bool,
  #[serde(default)]
  pub cursor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireOrder {
  #[serde(default)]
  pub order_id: String,
  #[serde(default)]
  pub client_order_id: String,
  #[serde(default)]
  pub product_id: String,
  #[serde(default)]
  pub side: String,
  #[serde(default)]
  pub status: String,
}

/// Map an exchange status string.
pub fn parse_status(raw: &str) -> OrderStatus {
  match raw {
    "PENDING" | "QUEUED" => OrderStatus::Pending,
    "OPEN" | "CANCEL_QUEUED" => OrderStatus::Open,
    "FILLED" => OrderStatus::Filled,
    "CANCELLED" => OrderStatus::Cancelled,
    "EXPIRED" => OrderStatus::Expired,
    "FAILED" => OrderStatus::Failed,
    _ => OrderStatus::Unknown,
  }
}

impl WireOrder {
  /// `None` when the side is neither BUY nor SELL.
  pub fn into_open_order(self) -> Option<OpenOrder> {
    let side = match self.side.as_str() {
      "BUY" => Side::Buy,
      "SELL" => Side::Sell,
      _ => return None,
    };
    Some(OpenOrder {
      status: parse_status(&self.status),
      order_id: self.order_id,
      client_order_id: self.client_order_id,
      product_id: self.product_id,
      side,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  #[test]
  fn test_summary_parses_string_values() {
    let json = r#"{
      "summary": {
        "collateral": {"value": "150.25", "currency": "USDC"},
        "unrealized_pnl": {"value": "-3.5", "currency": "USDC"},
        "buying_power": {"value": "1000", "currency": "USDC"},
        "total_balance": {"value": "146.75", "currency": "USDC"},
        "max_withdrawal_amount": {"value": "100.00", "currency": "USDC"}
      }
    }"#;
    let summary = serde_json::from_str::<PortfolioResponse>(json)
      .unwrap()
      .into_summary();

    assert!(summary.is_complete());
    assert_eq!(summary.collateral, dec!(150.25));
    assert_eq!(summary.unrealized_pnl, dec!(-3.5));
    assert_eq!(summary.max_withdrawal, dec!(100.00));
  }

  #[test]
  fn test_summary_flags_missing_and_malformed_fields() {
    let json = r#"{
      "summary": {
        "collateral": {"value": "10"},
        "buying_power": {"value": "not-a-number"},
        "total_balance": {},
        "max_withdrawal_amount": {"value": "5"}
      }
    }"#;
    let summary = serde_json::from_str::<PortfolioResponse>(json)
      .unwrap()
      .into_summary();

    assert_eq!(summary.buying_power, Decimal::ZERO);
    assert!(summary.is_defaulted(SummaryField::UnrealizedPnl));
    assert!(summary.is_defaulted(SummaryField::BuyingPower));
    assert!(summary.is_defaulted(SummaryField::TotalBalance));
    assert!(!summary.is_defaulted(SummaryField::Collateral));
    assert_eq!(summary.defaulted.len(), 3);
  }

  #[test]
  fn test_missing_summary_defaults_every_field() {
    let summary = serde_json::from_str::<PortfolioResponse>("{}")
      .unwrap()
      .into_summary();
    assert_eq!(summary.defaulted.len(), 5);
    assert!(summary.is_all_zero());
  }

  #[test]
  fn test_ticker_takes_first_trade() {
    let json = r#"{"trades": [{"price": "50000.5"}, {"price": "49999"}]}"#;
    let ticker: TickerResponse = serde_json::from_str(json).unwrap();
    assert_eq!(ticker.latest_price(), Some(dec!(50000.5)));

    let empty: TickerResponse = serde_json::from_str(r#"{"trades": []}"#).unwrap();
    assert_eq!(empty.latest_price(), None);
  }

  #[test]
  fn test_view_only_key_cannot_trade() {
    let json = r#"{"can_view": true, "can_trade": false, "portfolio_type": "INTX"}"#;
    let permissions: KeyPermissions = serde_json::from_str(json).unwrap();
    assert!(matches!(permissions.ensure_trading(), Err(EngineError::InvalidInput(_))));

    let full: KeyPermissions =
      serde_json::from_str(r#"{"can_view": true, "can_trade": true}"#).unwrap();
    assert!(full.ensure_trading().is_ok());
  }

  #[test]
  fn test_position_defaults_leverage_to_one() {
    let json = r#"{"positions": [{
      "symbol": "BTC-PERP-INTX",
      "net_size": "-0.002",
      "unrealized_pnl": {"value": "1.2"},
      "vwap": {"value": "50100"}
    }]}"#;
    let response: PositionsResponse = serde_json::from_str(json).unwrap();
    let position = Position::from(response.positions[0].clone());

    assert_eq!(position.net_size, dec!(-0.002));
    assert_eq!(position.vwap, dec!(50100));
    assert_eq!(position.leverage, Decimal::ONE);
    assert_eq!(position.defaulted, vec![PositionField::Leverage]);
  }

  #[test]
  fn test_unparsable_net_size_is_flagged() {
    let json = r#"{"positions": [{
      "symbol": "BTC-PERP-INTX",
      "net_size": "n/a",
      "unrealized_pnl": {"value": "1.2"},
      "vwap": {"value": "50100"},
      "leverage": "5"
    }]}"#;
    let response: PositionsResponse = serde_json::from_str(json).unwrap();
    let position = Position::from(response.positions[0].clone());

    assert!(position.is_flat());
    assert!(position.is_defaulted(PositionField::NetSize));
    assert!(position.ensure_size_known("list_positions").is_err());
  }

  #[test]
  fn test_limit_payload_shape() {
    let request = OrderRequest::limit(
      "BTC-PERP-INTX".into(),
      Side::Buy,
      dec!(49750.0),
      dec!(0.100),
      "pf-1".into(),
    )
    .with_leverage(dec!(10), MarginType::Cross);

    let value = serde_json::to_value(CreateOrderRequest::from(&request)).unwrap();
    assert_eq!(value["side"], "BUY");
    assert_eq!(value["retail_portfolio_id"], "pf-1");
    assert_eq!(value["leverage"], "10");
    assert_eq!(value["margin_type"], "CROSS");
    assert_eq!(value["order_configuration"]["limit_limit_gtc"]["base_size"], "0.1");
    assert_eq!(value["order_configuration"]["limit_limit_gtc"]["limit_price"], "49750");
    assert_eq!(value["client_order_id"], request.client_order_id.as_str());
  }

  #[test]
  fn test_reduce_payload_omits_margin() {
    let request =
      OrderRequest::market_ioc("BTC-PERP-INTX".into(), Side::Sell, dec!(0.002), "pf-1".into())
        .without_margin();

    let value = serde_json::to_value(CreateOrderRequest::from(&request)).unwrap();
    assert!(value.get("leverage").is_none());
    assert!(value.get("margin_type").is_none());
    assert_eq!(value["order_configuration"]["market_market_ioc"]["base_size"], "0.002");
  }

  #[test]
  fn test_order_response_mapping() {
    let ok = r#"{"success": true, "success_response": {"order_id": "ord-1"}}"#;
    let rejected = r#"{"success": false, "error_response": {"error": "INSUFFICIENT_FUND", "message": "Insufficient balance"}}"#;
    let no_id = r#"{"success": true}"#;

    let parse = |s: &str| serde_json::from_str::<CreateOrderResponse>(s).unwrap().into_result();
    assert_eq!(parse(ok), OrderResult::Accepted { order_id: "ord-1".into() });
    assert_eq!(
      parse(rejected),
      OrderResult::Rejected {
        reason: "INSUFFICIENT_FUND: Insufficient balance".into()
      }
    );
    assert!(matches!(parse(no_id), OrderResult::TransportFailure { .. }));
  }

  #[test]
  fn test_cancel_reasons() {
    let json = r#"{"results": [
      {"success": true, "failure_reason": "", "order_id": "a"},
      {"success": false, "failure_reason": "UNKNOWN_CANCEL_ORDER", "order_id": "b"},
      {"success": false, "failure_reason": "COMMANDER_REJECTED_CANCEL_ORDER", "order_id": "c"}
    ]}"#;
    let response: BatchCancelResponse = serde_json::from_str(json).unwrap();
    let results: Vec<CancelResult> = response.results.into_iter().map(Into::into).collect();

    assert_eq!(results[0].outcome, CancelOutcome::Cancelled);
    assert_eq!(results[1].outcome, CancelOutcome::AlreadyClosed);
    assert_eq!(
      results[2].outcome,
      CancelOutcome::Failed {
        reason: "COMMANDER_REJECTED_CANCEL_ORDER".into()
      }
    );
  }

  #[test]
  fn test_status_strings() {
    assert_eq!(parse_status("OPEN"), OrderStatus::Open);
    assert_eq!(parse_status("QUEUED"), OrderStatus::Pending);
    assert_eq!(parse_status("FILLED"), OrderStatus::Filled);
    assert_eq!(parse_status("UNKNOWN_ORDER_STATUS"), OrderStatus::Unknown);
  }
}
