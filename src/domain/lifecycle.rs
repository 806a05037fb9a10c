//! Order intent lifecycle.
//!
//! ```text
//!   Sized --submit--> Submitted --accept--> Open
//!   Submitted --reject--> Failed              (terminal)
//!   Submitted --transport failure--> Unresolved (terminal for the cycle)
//!   Open --request cancel--> Cancelling --confirm--> Cancelled (terminal)
//!   Cancelling --cancel refused--> Open
//! ```
//!
//! An `Open` intent nobody cancels stays open; ownership of the resulting
//! exposure passes to the position reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::trade::{OrderId, OrderRequest};
use crate::error::{EngineError, Result};

/// State of one order intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderState {
    /// Parameters computed, nothing sent yet.
    Sized,
    /// Handed to the gateway, awaiting the outcome.
    Submitted,
    /// Accepted by the exchange.
    Open,
    /// Declined by the exchange.
    Failed,
    /// Submission outcome unknown; requires a reconciliation read.
    Unresolved,
    /// Cancel requested, awaiting confirmation.
    Cancelling,
    /// Confirmed closed.
    Cancelled,
}

/// Inputs that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Submit,
    Accept,
    Reject,
    TransportFailure,
    RequestCancel,
    ConfirmCancel,
    CancelRefused,
}

impl OrderState {
    /// Apply an event, rejecting transitions the diagram does not allow.
    pub fn apply(self, event: OrderEvent) -> Result<Self> {
        use OrderEvent as E;
        use OrderState as S;

        let next = match (self, event) {
            (S::Sized, E::Submit) => S::Submitted,
            (S::Submitted, E::Accept) => S::Open,
            (S::Submitted, E::Reject) => S::Failed,
            (S::Submitted, E::TransportFailure) => S::Unresolved,
            (S::Open, E::RequestCancel) => S::Cancelling,
            (S::Cancelling, E::ConfirmCancel) => S::Cancelled,
            (S::Cancelling, E::CancelRefused) => S::Open,
            // A lost cancel response leaves the intent waiting for confirmation.
            (S::Cancelling, E::TransportFailure | E::RequestCancel) => S::Cancelling,
            // Re-cancelling a cancelled order is a no-op.
            (S::Cancelled, E::RequestCancel | E::ConfirmCancel) => S::Cancelled,
            (from, to) => {
                return Err(EngineError::InvalidTransition {
                    from: format!("{from:?}"),
                    to: format!("{to:?}"),
                });
            }
        };
        Ok(next)
    }

    /// Whether no further event can move the intent this cycle.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Unresolved | Self::Cancelled)
    }
}

/// An order intent tracked by the lifecycle manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedOrder {
    /// The request as submitted.
    pub request: OrderRequest,
    /// Current lifecycle state.
    pub state: OrderState,
    /// Exchange order id, set on acceptance.
    pub order_id: Option<OrderId>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl TrackedOrder {
    /// Start tracking a freshly sized request.
    pub fn new(request: OrderRequest) -> Self {
        Self {
            request,
            state: OrderState::Sized,
            order_id: None,
            updated_at: Utc::now(),
        }
    }

    /// Advance the state, stamping the transition time.
    pub fn advance(&mut self, event: OrderEvent) -> Result<OrderState> {
        self.state = self.state.apply(event)?;
        self.updated_at = Utc::now();
        Ok(self.state)
    }
}
