//! Settlement Wait Strategies
//!
//! Implementations of the `SettlementWait` port:
//! - `FixedDelay`: sleep a fixed interval (reference behavior)
//! - `PollWithBackoff`: poll the order status until the exchange has
//!   processed it, doubling the delay between polls
//!
//! Neither strategy fails the caller: a failed status read counts as
//! "not settled yet", so the cancel that follows always runs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::config::{SettlementConfig, SettlementStrategy};
use crate::domain::trade::{OrderId, OrderStatus};
use crate::error::Result;
use crate::ports::gateway::ExchangeGateway;
use crate::ports::settlement::SettlementWait;

/// Sleep for a fixed delay. Bounds staleness without touching the gateway.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
  delay: Duration,
}

impl FixedDelay {
  pub const fn new(delay: Duration) -> Self {
    Self { delay }
  }
}

#[async_trait]
impl SettlementWait for FixedDelay {
  async fn await_settlement(
    &self,
    _gateway: &dyn ExchangeGateway,
    order_id: &OrderId,
  ) -> Result<Option<OrderStatus>> {
    debug!(order_id = %order_id, delay_ms = self.delay.as_millis(), "Waiting fixed settle delay");
    sleep(self.delay).await;
    Ok(None)
  }
}

/// Poll the order status with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct PollWithBackoff {
  /// Maximum number of status reads.
  max_attempts: u32,
  /// Delay before the second read, doubled each time.
  base_delay: Duration,
  /// Upper bound on a single backoff.
  max_delay: Duration,
}

impl PollWithBackoff {
  pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
    Self {
      max_attempts,
      base_delay,
      max_delay: Duration::from_secs(5),
    }
  }

  /// Backoff before poll number `attempt` (0-based).
  fn backoff(&self, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }
}

#[async_trait]
impl SettlementWait for PollWithBackoff {
  #[instrument(skip(self, gateway))]
  async fn await_settlement(
    &self,
    gateway: &dyn ExchangeGateway,
    order_id: &OrderId,
  ) -> Result<Option<OrderStatus>> {
    let mut last = None;

    for attempt in 0..self.max_attempts {
      if attempt > 0 {
        sleep(self.backoff(attempt)).await;
      }

      let status = match gateway.order_status(order_id).await {
        Ok(status) => status,
        Err(e) => {
          warn!(attempt, error = %e, "Order status read failed");
          continue;
        }
      };
      debug!(attempt, status = ?status, "Polled order status");
      if status.is_settled() {
        return Ok(Some(status));
      }
      last = Some(status);
    }

    warn!(
      order_id = %order_id,
      attempts = self.max_attempts,
      last = ?last,
      "Order not settled after polling, proceeding"
    );
    Ok(last)
  }
}

/// Build the configured strategy.
pub fn from_config(config: &SettlementConfig) -> Arc<dyn SettlementWait> {
  match config.strategy {
    SettlementStrategy::Fixed => Arc::new(FixedDelay::new(Duration::from_millis(config.delay_ms))),
    SettlementStrategy::Poll => Arc::new(PollWithBackoff::new(
      config.poll_max_attempts,
      Duration::from_millis(config.poll_base_delay_ms),
    )),
  }
}
