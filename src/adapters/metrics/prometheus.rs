//! Prometheus Metrics Registry - Run Observability
//!
//! Counts gateway calls, order outcomes, and cancel outcomes for a
//! run. The process is short-lived, so metrics are rendered in the
//! Prometheus text format and written to a file for the node
//! exporter's textfile collector instead of being served.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::info;

use crate::domain::trade::{CancelOutcome, CancelResult, OrderResult};

/// Centralized Prometheus metrics for one engine run.
///
/// All metrics follow the naming convention `intx_bot_*`.
pub struct RunMetrics {
    registry: Registry,
    /// Gateway calls by operation and outcome (`ok`, `error`, `timeout`).
    pub gateway_calls: IntCounterVec,
    /// Gateway call latency in milliseconds.
    pub gateway_latency_ms: HistogramVec,
    /// Submissions by sizing kind and outcome (`accepted`, `rejected`, `unknown`).
    pub orders: IntCounterVec,
    /// Per-order cancel outcomes.
    pub cancels: IntCounterVec,
}

impl RunMetrics {
    /// Create and register all metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let gateway_calls = IntCounterVec::new(
            Opts::new("intx_bot_gateway_calls_total", "Gateway calls by outcome"),
            &["operation", "outcome"],
        )?;

        let gateway_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "intx_bot_gateway_latency_ms",
                "Gateway call latency in milliseconds",
            )
            .buckets(vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 10000.0]),
            &["operation"],
        )?;

        let orders = IntCounterVec::new(
            Opts::new("intx_bot_orders_total", "Order submissions by outcome"),
            &["kind", "outcome"],
        )?;

        let cancels = IntCounterVec::new(
            Opts::new("intx_bot_cancels_total", "Per-order cancel outcomes"),
            &["outcome"],
        )?;

        registry.register(Box::new(gateway_calls.clone()))?;
        registry.register(Box::new(gateway_latency_ms.clone()))?;
        registry.register(Box::new(orders.clone()))?;
        registry.register(Box::new(cancels.clone()))?;

        Ok(Self {
            registry,
            gateway_calls,
            gateway_latency_ms,
            orders,
            cancels,
        })
    }

    pub fn record_call(&self, operation: &str, outcome: &str, elapsed: Duration) {
        self.gateway_calls
            .with_label_values(&[operation, outcome])
            .inc();
        self.gateway_latency_ms
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_order(&self, kind: &str, result: &OrderResult) {
        let outcome = match result {
            OrderResult::Accepted { .. } => "accepted",
            OrderResult::Rejected { .. } => "rejected",
            OrderResult::TransportFailure { .. } => "unknown",
        };
        self.orders.with_label_values(&[kind, outcome]).inc();
    }

    pub fn record_cancels(&self, results: &[CancelResult]) {
        for r in results {
            let outcome = match r.outcome {
                CancelOutcome::Cancelled => "cancelled",
                CancelOutcome::AlreadyClosed => "already_closed",
                CancelOutcome::Failed { .. } => "failed",
            };
            self.cancels.with_label_values(&[outcome]).inc();
        }
    }

    /// Render every registered metric in the text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics are not UTF-8")
    }

    /// Write the rendered metrics atomically (temp file + rename).
    pub fn write_textfile(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render()?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
        info!(path = %path.display(), "Metrics textfile written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        let metrics = RunMetrics::new().unwrap();
        metrics.record_call("ticker", "ok", Duration::from_millis(42));
        metrics.record_order(
            "limit",
            &OrderResult::Rejected {
                reason: "INSUFFICIENT_FUND".into(),
            },
        );
        metrics.record_cancels(&[CancelResult {
            order_id: "o-1".into(),
            outcome: CancelOutcome::AlreadyClosed,
        }]);

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"intx_bot_gateway_calls_total{operation="ticker",outcome="ok"} 1"#));
        assert!(text.contains(r#"intx_bot_orders_total{kind="limit",outcome="rejected"} 1"#));
        assert!(text.contains(r#"intx_bot_cancels_total{outcome="already_closed"} 1"#));
    }

    #[test]
    fn test_write_textfile() {
        let metrics = RunMetrics::new().unwrap();
        metrics.record_call("list_accounts", "error", Duration::from_millis(5));

        let path = std::env::temp_dir().join(format!("intx-bot-{}.prom", uuid::Uuid::new_v4()));
        metrics.write_textfile(&path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(written.contains("intx_bot_gateway_calls_total"));
    }
}
