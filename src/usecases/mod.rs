//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with the gateway port to implement the
//! order lifecycle. Each use case owns one concern and reads state
//! fresh from the exchange rather than caching it.
//!
//! Use cases:
//! - `PortfolioReader`: Portfolio resolution, summaries, market price
//! - `OrderManager`: Order placement, settlement, cancellation
//! - `PositionReconciler`: Position reads, reductions, post-failure reconciliation
//! - `Settlement`: Settlement wait strategies
//! - `RunCycle`: The reference end-to-end workflow

pub mod order_manager;
pub mod portfolio_reader;
pub mod position_reconciler;
pub mod run_cycle;
pub mod settlement;
