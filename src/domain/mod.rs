//! Domain layer - Core trading types and pure logic.
//!
//! No I/O here (hexagonal architecture inner ring). Sizing math,
//! the order lifecycle state machine, and the value types shared
//! with the ports all live in this module.

pub mod lifecycle;
pub mod sizing;
pub mod trade;

// Re-export core types for convenience
pub use lifecycle::{OrderEvent, OrderState, TrackedOrder};
pub use sizing::{floor_to_step, RiskSizer, SizedOrder};
pub use trade::{
    Account, CancelOutcome, CancelResult, ClientOrderId, MarginType, OpenOrder, OrderId,
    OrderRequest, OrderResult, OrderSizing, OrderStatus, PortfolioId, PortfolioSummary,
    Position, ProductId, Side, SummaryField, PERPETUALS_PLATFORM,
};
