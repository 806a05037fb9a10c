//! Coinbase Exchange Gateway - Adapter for the Brokerage API
//!
//! Implements the `ExchangeGateway` port on top of `CoinbaseClient`.
//! Translates wire payloads to domain types; never retries a
//! state-changing call.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use super::client::CoinbaseClient;
use super::types::{
  parse_status, AccountsResponse, BatchCancelRequest, BatchCancelResponse, CreateOrderRequest,
  CreateOrderResponse, KeyPermissions, OrderResponse, OrdersResponse, PortfolioResponse,
  PositionsResponse, TickerResponse,
};
use crate::domain::trade::{
  Account, CancelOutcome, CancelResult, OpenOrder, OrderId, OrderRequest, OrderResult, OrderStatus,
  PortfolioId, PortfolioSummary, Position, ProductId,
};
use crate::error::{EngineError, Result};
use crate::ports::gateway::ExchangeGateway;

const BROKERAGE: &str = "/api/v3/brokerage";

/// Accounts per page when listing.
const ACCOUNTS_PAGE_LIMIT: u32 = 250;

/// Upper bound on pages followed for one listing.
const MAX_PAGES: usize = 20;

/// Brokerage gateway backed by the shared signed client.
pub struct CoinbaseGateway {
  client: Arc<CoinbaseClient>,
}

impl CoinbaseGateway {
  pub fn new(client: Arc<CoinbaseClient>) -> Self {
    Self { client }
  }

  /// What the API key may do. Read-only preflight before trading.
  #[instrument(skip(self))]
  pub async fn key_permissions(&self) -> Result<KeyPermissions> {
    let path = format!("{BROKERAGE}/key_permissions");
    let permissions: KeyPermissions = self.client.get("key_permissions", &path, &[]).await?;
    info!(
      can_view = permissions.can_view,
      can_trade = permissions.can_trade,
      portfolio_type = %permissions.portfolio_type,
      "API key permissions"
    );
    Ok(permissions)
  }
}

/// Query pairs for one page, adding the cursor after the first page.
fn paged<'a>(mut query: Vec<(&'a str, String)>, cursor: &str) -> Vec<(&'a str, String)> {
  if !cursor.is_empty() {
    query.push(("cursor", cursor.to_string()));
  }
  query
}

#[async_trait]
impl ExchangeGateway for CoinbaseGateway {
  #[instrument(skip(self))]
  async fn list_accounts(&self) -> Result<Vec<Account>> {
    let path = format!("{BROKERAGE}/accounts");
    let mut accounts = Vec::new();
    let mut cursor = String::new();

    for _ in 0..MAX_PAGES {
      let query = paged(vec![("limit", ACCOUNTS_PAGE_LIMIT.to_string())], &cursor);
      let page: AccountsResponse = self.client.get("list_accounts", &path, &query).await?;
      accounts.extend(page.accounts.into_iter().map(Account::from));

      if !page.has_next || page.cursor.is_empty() {
        return Ok(accounts);
      }
      cursor = page.cursor;
    }

    warn!(pages = MAX_PAGES, "Account listing truncated");
    Ok(accounts)
  }

  #[instrument(skip(self))]
  async fn portfolio_summary(&self, portfolio_id: &PortfolioId) -> Result<PortfolioSummary> {
    let path = format!("{BROKERAGE}/intx/portfolio/{portfolio_id}");
    let response: PortfolioResponse = self.client.get("portfolio_summary", &path, &[]).await?;
    Ok(response.into_summary())
  }

  #[instrument(skip(self))]
  async fn ticker(&self, product_id: &ProductId) -> Result<Decimal> {
    let path = format!("{BROKERAGE}/products/{product_id}/ticker");
    let query = [("limit", "1".to_string())];
    let response: TickerResponse = self.client.get("ticker", &path, &query).await?;
    response.latest_price().ok_or_else(|| EngineError::NotFound {
      what: "trade price",
      name: product_id.clone(),
    })
  }

  #[instrument(
    skip(self, request),
    fields(client_order_id = %request.client_order_id, kind = request.sizing.kind(), side = %request.side)
  )]
  async fn submit_order(&self, request: &OrderRequest) -> OrderResult {
    let payload = CreateOrderRequest::from(request);
    let path = format!("{BROKERAGE}/orders");

    let result = match self
      .client
      .post::<_, CreateOrderResponse>("submit_order", &path, &payload)
      .await
    {
      Ok(response) => response.into_result(),
      Err(EngineError::Rejected { reason, .. }) => OrderResult::Rejected { reason },
      Err(EngineError::InvalidInput(reason)) => OrderResult::Rejected { reason },
      Err(other) => OrderResult::TransportFailure {
        cause: other.to_string(),
      },
    };

    match &result {
      OrderResult::Accepted { order_id } => info!(order_id = %order_id, "Order accepted"),
      OrderResult::Rejected { reason } => warn!(reason = %reason, "Order rejected"),
      OrderResult::TransportFailure { cause } => warn!(cause = %cause, "Order outcome unknown"),
    }
    result
  }

  #[instrument(skip(self), fields(count = order_ids.len()))]
  async fn batch_cancel(&self, order_ids: &[OrderId]) -> Result<Vec<CancelResult>> {
    if order_ids.is_empty() {
      return Ok(Vec::new());
    }

    let path = format!("{BROKERAGE}/orders/batch_cancel");
    let response: BatchCancelResponse = self
      .client
      .post("batch_cancel", &path, &BatchCancelRequest { order_ids })
      .await?;

    let results: Vec<CancelResult> = response.results.into_iter().map(Into::into).collect();
    for r in &results {
      if let CancelOutcome::Failed { reason } = &r.outcome {
        warn!(order_id = %r.order_id, reason = %reason, "Cancel refused");
      }
    }
    Ok(results)
  }

  #[instrument(skip(self))]
  async fn list_positions(&self, portfolio_id: &PortfolioId) -> Result<Vec<Position>> {
    let path = format!("{BROKERAGE}/intx/positions/{portfolio_id}");
    let response: PositionsResponse = self.client.get("list_positions", &path, &[]).await?;
    Ok(
      response
        .positions
        .into_iter()
        .filter(|p| !p.symbol.is_empty())
        .map(Position::from)
        .collect(),
    )
  }

  #[instrument(skip(self))]
  async fn order_status(&self, order_id: &OrderId) -> Result<OrderStatus> {
    let path = format!("{BROKERAGE}/orders/historical/{order_id}");
    let response: OrderResponse = self.client.get("order_status", &path, &[]).await?;
    Ok(parse_status(&response.order.status))
  }

  #[instrument(skip(self))]
  async fn list_open_orders(
    &self,
    portfolio_id: &PortfolioId,
    product_id: &ProductId,
  ) -> Result<Vec<OpenOrder>> {
    let path = format!("{BROKERAGE}/orders/historical/batch");
    let mut orders = Vec::new();
    let mut cursor = String::new();

    for _ in 0..MAX_PAGES {
      let filters = vec![
        ("order_status", "OPEN".to_string()),
        ("product_ids", product_id.clone()),
        ("retail_portfolio_id", portfolio_id.clone()),
      ];
      let query = paged(filters, &cursor);
      let page: OrdersResponse = self.client.get("list_open_orders", &path, &query).await?;
      orders.extend(page.orders.into_iter().filter_map(|o| o.into_open_order()));

      if !page.has_next || page.cursor.is_empty() {
        return Ok(orders);
      }
      cursor = page.cursor;
    }

    warn!(pages = MAX_PAGES, "Open order listing truncated");
    Ok(orders)
  }
}
