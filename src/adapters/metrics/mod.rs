//! Metrics Adapter
//!
//! Prometheus counters for gateway calls and order outcomes, exported
//! as a textfile at the end of a run.

pub mod prometheus;

pub use self::prometheus::RunMetrics;
