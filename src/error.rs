//! Engine Error Taxonomy
//!
//! Every failure the core can produce, split by recoverability:
//! - `NotFound` / `InvalidInput`: abort the current step, never retried
//! - `Rejected`: the exchange declined; terminal for that order only
//! - `TransportFailure`: outcome unknown; reconcile before any retry
//! - `PartialDataFailure`: a read succeeded with defaulted fields

use thiserror::Error;

/// Result alias used across the core layers.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the order-lifecycle and risk-sizing engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
  /// A named entity (portfolio, trade price, position) could not be resolved.
  #[error("{what} not found: {name}")]
  NotFound {
    /// Kind of entity looked up.
    what: &'static str,
    /// Name or identifier that failed to resolve.
    name: String,
  },

  /// Sizing or request preconditions were violated.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// The exchange answered and said no.
  #[error("{operation} rejected: {reason}")]
  Rejected {
    /// Gateway operation that was declined.
    operation: &'static str,
    /// Exchange-supplied reason.
    reason: String,
  },

  /// The call did not complete; the exchange-side outcome is unknown.
  #[error("{operation} transport failure (outcome unknown): {cause}")]
  TransportFailure {
    /// Gateway operation that was in flight.
    operation: &'static str,
    /// Underlying network / serialization / timeout cause.
    cause: String,
  },

  /// A read returned but some fields had to be defaulted to zero.
  #[error("{operation} returned partial data, defaulted fields: {}", fields.join(", "))]
  PartialDataFailure {
    /// Gateway operation that produced the partial snapshot.
    operation: &'static str,
    /// Names of the defaulted fields.
    fields: Vec<&'static str>,
  },

  /// An order intent was driven through an illegal lifecycle transition.
  #[error("invalid order transition: from {from} to {to}")]
  InvalidTransition {
    /// State the intent was in.
    from: String,
    /// State that was requested.
    to: String,
  },
}

impl EngineError {
  /// Shorthand for a transport failure with a displayable cause.
  pub fn transport(operation: &'static str, cause: impl std::fmt::Display) -> Self {
    Self::TransportFailure {
      operation,
      cause: cause.to_string(),
    }
  }

  /// Whether re-sizing from fresh state and retrying is a sensible response.
  pub const fn is_retryable(&self) -> bool {
    matches!(self, Self::Rejected { .. })
  }

  /// Whether the caller must perform a reconciliation read before acting again.
  pub const fn requires_reconciliation(&self) -> bool {
    matches!(self, Self::TransportFailure { .. })
  }
}
