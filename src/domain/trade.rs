//! Core trading domain types.
//!
//! Accounts, portfolio snapshots, positions, and the abstract order
//! requests/results exchanged with the gateway port. Snapshots are
//! read-only copies of exchange state; the exchange stays the source of truth.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};

// ────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────

/// Exchange portfolio identifier (`retail_portfolio_id`).
pub type PortfolioId = String;

/// Instrument identifier, e.g. `BTC-PERP-INTX`.
pub type ProductId = String;

/// Exchange-assigned order identifier.
pub type OrderId = String;

/// System-generated idempotency token sent with every order.
pub type ClientOrderId = String;

/// Platform marker of the exchange's derivatives venue.
pub const PERPETUALS_PLATFORM: &str = "ACCOUNT_PLATFORM_INTX";

/// Generate a fresh client order id. Never reused across submissions.
pub fn new_client_order_id() -> ClientOrderId {
    Uuid::new_v4().to_string()
}

// ────────────────────────────────────────────
// Enums
// ────────────────────────────────────────────

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that offsets exposure taken on this side.
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Whether collateral is shared across positions or ring-fenced per position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarginType {
    #[default]
    Cross,
    Isolated,
}

impl std::fmt::Display for MarginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cross => write!(f, "CROSS"),
            Self::Isolated => write!(f, "ISOLATED"),
        }
    }
}

// ────────────────────────────────────────────
// Accounts and portfolio state
// ────────────────────────────────────────────

/// One entry of the exchange's account listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Display name, e.g. "USDC Wallet".
    pub name: String,
    /// Venue marker; `PERPETUALS_PLATFORM` for the derivatives venue.
    pub platform: String,
    /// Portfolio this account belongs to.
    pub portfolio_id: PortfolioId,
}

/// Monetary fields of a portfolio summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SummaryField {
    Collateral,
    UnrealizedPnl,
    BuyingPower,
    TotalBalance,
    MaxWithdrawal,
}

impl SummaryField {
    /// Stable field name used in logs and errors.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collateral => "collateral",
            Self::UnrealizedPnl => "unrealized_pnl",
            Self::BuyingPower => "buying_power",
            Self::TotalBalance => "total_balance",
            Self::MaxWithdrawal => "max_withdrawal",
        }
    }
}

/// Financial snapshot of a perpetuals portfolio.
///
/// Immutable once fetched. Any field the exchange omitted is zero and is
/// listed in `defaulted`, so callers can tell a real zero from a missing one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub collateral: Decimal,
    pub unrealized_pnl: Decimal,
    pub buying_power: Decimal,
    pub total_balance: Decimal,
    pub max_withdrawal: Decimal,
    /// Fields that were missing or unparsable and defaulted to zero.
    pub defaulted: Vec<SummaryField>,
}

impl PortfolioSummary {
    /// True when no field had to be defaulted.
    pub fn is_complete(&self) -> bool {
        self.defaulted.is_empty()
    }

    /// Whether a specific field was defaulted.
    pub fn is_defaulted(&self, field: SummaryField) -> bool {
        self.defaulted.contains(&field)
    }

    /// True when every monetary field is zero (suspect snapshot).
    pub fn is_all_zero(&self) -> bool {
        [
            self.collateral,
            self.unrealized_pnl,
            self.buying_power,
            self.total_balance,
            self.max_withdrawal,
        ]
        .iter()
        .all(Decimal::is_zero)
    }

    /// Fail with `PartialDataFailure` if any field was defaulted.
    pub fn ensure_complete(&self, operation: &'static str) -> Result<()> {
        if self.is_complete() {
            return Ok(());
        }
        Err(EngineError::PartialDataFailure {
            operation,
            fields: self.defaulted.iter().map(|f| f.as_str()).collect(),
        })
    }
}

/// Numeric fields of a position snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionField {
    NetSize,
    UnrealizedPnl,
    Vwap,
    Leverage,
}

impl PositionField {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NetSize => "net_size",
            Self::UnrealizedPnl => "unrealized_pnl",
            Self::Vwap => "vwap",
            Self::Leverage => "leverage",
        }
    }
}

/// Read-only snapshot of one open perpetual position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol, e.g. `BTC-PERP-INTX`.
    pub symbol: ProductId,
    /// Signed size: long positive, short negative.
    pub net_size: Decimal,
    pub unrealized_pnl: Decimal,
    /// Volume-weighted average entry price.
    pub vwap: Decimal,
    pub leverage: Decimal,
    /// Fields that were missing or unparsable and got a default
    /// (zero, or one for leverage).
    #[serde(default)]
    pub defaulted: Vec<PositionField>,
}

impl Position {
    /// Whether a specific field was defaulted.
    pub fn is_defaulted(&self, field: PositionField) -> bool {
        self.defaulted.contains(&field)
    }

    /// Fail with `PartialDataFailure` if the signed size was not reported.
    ///
    /// A defaulted size reads as flat, which would silently skip a reduction.
    pub fn ensure_size_known(&self, operation: &'static str) -> Result<()> {
        if self.is_defaulted(PositionField::NetSize) {
            return Err(EngineError::PartialDataFailure {
                operation,
                fields: vec![PositionField::NetSize.as_str()],
            });
        }
        Ok(())
    }

    /// A flat position carries no exposure.
    pub fn is_flat(&self) -> bool {
        self.net_size.is_zero()
    }

    /// Side of an order that closes this position, `None` when flat.
    pub fn closing_side(&self) -> Option<Side> {
        if self.net_size.is_sign_positive() && !self.net_size.is_zero() {
            Some(Side::Sell)
        } else if self.net_size.is_sign_negative() && !self.net_size.is_zero() {
            Some(Side::Buy)
        } else {
            None
        }
    }
}

// ────────────────────────────────────────────
// Orders
// ────────────────────────────────────────────

/// How an order is priced and sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSizing {
    /// Good-til-cancelled limit order resting at `limit_price`.
    Limit {
        limit_price: Decimal,
        base_size: Decimal,
    },
    /// Market order that fills immediately or expires.
    MarketImmediateOrCancel { base_size: Decimal },
}

impl OrderSizing {
    /// Quantity in base units.
    pub const fn base_size(&self) -> Decimal {
        match self {
            Self::Limit { base_size, .. } | Self::MarketImmediateOrCancel { base_size } => {
                *base_size
            }
        }
    }

    /// Short label for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Limit { .. } => "limit_gtc",
            Self::MarketImmediateOrCancel { .. } => "market_ioc",
        }
    }
}

/// Abstract order request handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Fresh idempotency token; a retry is a new request with a new id.
    pub client_order_id: ClientOrderId,
    pub product_id: ProductId,
    pub side: Side,
    pub sizing: OrderSizing,
    /// Leverage multiplier, positive when present.
    pub leverage: Option<Decimal>,
    /// Omitted on reduce-only closing orders.
    pub margin_type: Option<MarginType>,
    pub portfolio_id: PortfolioId,
}

impl OrderRequest {
    /// Build a GTC limit order with a freshly generated client order id.
    pub fn limit(
        product_id: ProductId,
        side: Side,
        limit_price: Decimal,
        base_size: Decimal,
        portfolio_id: PortfolioId,
    ) -> Self {
        Self {
            client_order_id: new_client_order_id(),
            product_id,
            side,
            sizing: OrderSizing::Limit {
                limit_price,
                base_size,
            },
            leverage: None,
            margin_type: Some(MarginType::Cross),
            portfolio_id,
        }
    }

    /// Build an immediate-or-cancel market order with a fresh client order id.
    pub fn market_ioc(
        product_id: ProductId,
        side: Side,
        base_size: Decimal,
        portfolio_id: PortfolioId,
    ) -> Self {
        Self {
            client_order_id: new_client_order_id(),
            product_id,
            side,
            sizing: OrderSizing::MarketImmediateOrCancel { base_size },
            leverage: None,
            margin_type: Some(MarginType::Cross),
            portfolio_id,
        }
    }

    /// Attach leverage and margin type.
    #[must_use]
    pub fn with_leverage(mut self, leverage: Decimal, margin_type: MarginType) -> Self {
        self.leverage = Some(leverage);
        self.margin_type = Some(margin_type);
        self
    }

    /// Drop leverage and margin type (closing orders inherit the position's).
    #[must_use]
    pub fn without_margin(mut self) -> Self {
        self.leverage = None;
        self.margin_type = None;
        self
    }

    /// Check request preconditions before anything reaches the gateway.
    pub fn validate(&self) -> Result<()> {
        if self.client_order_id.is_empty() {
            return Err(EngineError::InvalidInput(
                "client_order_id must not be empty".to_string(),
            ));
        }
        if self.sizing.base_size() <= Decimal::ZERO {
            return Err(EngineError::InvalidInput(format!(
                "base_size must be positive, got {}",
                self.sizing.base_size()
            )));
        }
        if let OrderSizing::Limit { limit_price, .. } = self.sizing {
            if limit_price <= Decimal::ZERO {
                return Err(EngineError::InvalidInput(format!(
                    "limit_price must be positive, got {limit_price}"
                )));
            }
        }
        if let Some(leverage) = self.leverage {
            if leverage <= Decimal::ZERO {
                return Err(EngineError::InvalidInput(format!(
                    "leverage must be positive, got {leverage}"
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a submission. Only `Accepted` means exposure may have changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderResult {
    /// The exchange took the order.
    Accepted { order_id: OrderId },
    /// The exchange declined the order (business rule).
    Rejected { reason: String },
    /// The call did not complete; the order may or may not exist.
    TransportFailure { cause: String },
}

impl OrderResult {
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Exchange order id, only present on acceptance.
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            Self::Accepted { order_id } => Some(order_id),
            _ => None,
        }
    }

    /// Convert a non-accepted result into the matching engine error.
    pub fn into_error(self, operation: &'static str) -> Option<EngineError> {
        match self {
            Self::Accepted { .. } => None,
            Self::Rejected { reason } => Some(EngineError::Rejected { operation, reason }),
            Self::TransportFailure { cause } => {
                Some(EngineError::TransportFailure { operation, cause })
            }
        }
    }
}

/// Exchange-side order status as reported by an order lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Received but not yet processed by the matching engine.
    Pending,
    /// Resting on the book.
    Open,
    Filled,
    Cancelled,
    Expired,
    Failed,
    /// Status string not recognised.
    Unknown,
}

impl OrderStatus {
    /// Whether the exchange has finished processing the acceptance.
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending | Self::Unknown)
    }

    /// Whether the order can no longer fill.
    pub const fn is_closed(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Expired | Self::Failed
        )
    }
}

/// An order currently known to the exchange for a portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub order_id: OrderId,
    pub client_order_id: ClientOrderId,
    pub product_id: ProductId,
    pub side: Side,
    pub status: OrderStatus,
}

/// Per-id result of a batch cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelOutcome {
    /// The order was open and is now cancelled.
    Cancelled,
    /// The order was already filled, cancelled, or expired.
    AlreadyClosed,
    /// The exchange refused to cancel.
    Failed { reason: String },
}

/// Cancel outcome paired with its order id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResult {
    pub order_id: OrderId,
    pub outcome: CancelOutcome,
}
