//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer
//! requires from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `ExchangeGateway`: brokerage reads and state-changing order calls
//! - `SettlementWait`: how long to wait before acting on an accepted order

pub mod gateway;
pub mod settlement;
