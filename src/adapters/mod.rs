//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (HTTP client, metrics registry).
//!
//! Adapter categories:
//! - `coinbase`: Brokerage REST client, signing, and gateway
//! - `guarded`: Sequencing and timeout decorator for any gateway
//! - `metrics`: Prometheus run counters exported as a textfile

pub mod coinbase;
pub mod guarded;
pub mod metrics;
