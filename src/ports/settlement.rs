//! Settlement Wait Port - Pluggable "await settlement" strategy
//!
//! Exchanges may process acceptance and matching asynchronously. Before
//! acting on a freshly accepted order the lifecycle manager waits through
//! this port, so swapping a fixed delay for polling (or an event feed)
//! never changes the manager's sequencing.

use async_trait::async_trait;

use crate::domain::trade::{OrderId, OrderStatus};
use crate::error::Result;
use crate::ports::gateway::ExchangeGateway;

/// Strategy for waiting until an accepted order has settled.
#[async_trait]
pub trait SettlementWait: Send + Sync + 'static {
    /// Block until the order is considered settled.
    ///
    /// Returns the last observed status, or `None` when the strategy does
    /// not observe the exchange (e.g. a fixed delay).
    async fn await_settlement(
        &self,
        gateway: &dyn ExchangeGateway,
        order_id: &OrderId,
    ) -> Result<Option<OrderStatus>>;
}
