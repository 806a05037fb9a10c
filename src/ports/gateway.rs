//! Exchange Gateway Port - Brokerage API Interface
//!
//! The only way the core talks to the exchange. Implementors own
//! authentication and serialization; the core hands over abstract
//! requests and branches on typed results.
//!
//! Key design decisions:
//! - `submit_order` returns `OrderResult`, never an error: a transport
//!   failure is an outcome (unknown), not an exception
//! - Reads return `Result` with `EngineError::TransportFailure` on I/O errors
//! - Every call returns a fresh snapshot; nothing is cached behind the port

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::trade::{
    Account, CancelResult, OpenOrder, OrderId, OrderRequest, OrderResult, OrderStatus,
    PortfolioId, PortfolioSummary, Position, ProductId,
};
use crate::error::Result;

/// Brokerage operations consumed by the engine.
#[async_trait]
pub trait ExchangeGateway: Send + Sync + 'static {
    /// List every account visible to the API key.
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Fetch the financial summary of a perpetuals portfolio.
    ///
    /// Missing monetary fields come back as zero and are listed in
    /// `PortfolioSummary::defaulted`.
    async fn portfolio_summary(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSummary>;

    /// Latest trade price for a product.
    ///
    /// # Errors
    /// `NotFound` when the product has no recent trades.
    async fn ticker(&self, product_id: &ProductId) -> Result<Decimal>;

    /// Submit one order (state-changing).
    async fn submit_order(&self, request: &OrderRequest) -> OrderResult;

    /// Cancel a batch of orders (state-changing). One result per id.
    async fn batch_cancel(&self, order_ids: &[OrderId]) -> Result<Vec<CancelResult>>;

    /// Snapshot of open positions in a portfolio.
    async fn list_positions(&self, portfolio_id: &PortfolioId) -> Result<Vec<Position>>;

    /// Current exchange-side status of one order.
    async fn order_status(&self, order_id: &OrderId) -> Result<OrderStatus>;

    /// Orders still working on the book for a portfolio and product.
    async fn list_open_orders(
        &self,
        portfolio_id: &PortfolioId,
        product_id: &ProductId,
    ) -> Result<Vec<OpenOrder>>;
}
