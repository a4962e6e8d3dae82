//! Prometheus Metrics Registry - Ledger Observability
//!
//! Registers and exposes Prometheus metrics for the reconciliation
//! engine: ledger outcomes, chain submissions, approvals, decoded
//! events and confirmation latency. Implements the `EngineMetrics`
//! port so the core never touches the registry directly.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::ports::metrics::EngineMetrics;

/// All metrics follow the naming convention `bnpl_ledger_*`.
pub struct MetricsRegistry {
    registry: Registry,
    /// Finished ledger operations by operation and outcome.
    pub ledger_outcomes: IntCounterVec,
    /// Write calls by method and result.
    pub chain_submissions: IntCounterVec,
    pub approvals_submitted: IntCounter,
    /// Decoded contract events by name.
    pub events_decoded: IntCounterVec,
    /// Confirmed transactions missing their expected event.
    pub event_decode_misses: IntCounterVec,
    /// Broadcast-to-receipt latency in seconds.
    pub confirmation_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ledger_outcomes = IntCounterVec::new(
            Opts::new("bnpl_ledger_outcomes_total", "Ledger operations by outcome"),
            &["operation", "outcome"],
        )?;

        let chain_submissions = IntCounterVec::new(
            Opts::new(
                "bnpl_ledger_chain_submissions_total",
                "Contract write calls by method and result",
            ),
            &["method", "result"],
        )?;

        let approvals_submitted = IntCounter::new(
            "bnpl_ledger_approvals_submitted_total",
            "Token approve transactions submitted",
        )?;

        let events_decoded = IntCounterVec::new(
            Opts::new("bnpl_ledger_events_decoded_total", "Contract events decoded"),
            &["event"],
        )?;

        let event_decode_misses = IntCounterVec::new(
            Opts::new(
                "bnpl_ledger_event_decode_misses_total",
                "Confirmed transactions without the expected event",
            ),
            &["event"],
        )?;

        let confirmation_seconds = HistogramVec::new(
            HistogramOpts::new(
                "bnpl_ledger_confirmation_seconds",
                "Seconds from broadcast to mined receipt",
            )
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0]),
            &["method"],
        )?;

        registry.register(Box::new(ledger_outcomes.clone()))?;
        registry.register(Box::new(chain_submissions.clone()))?;
        registry.register(Box::new(approvals_submitted.clone()))?;
        registry.register(Box::new(events_decoded.clone()))?;
        registry.register(Box::new(event_decode_misses.clone()))?;
        registry.register(Box::new(confirmation_seconds.clone()))?;

        Ok(Self {
            registry,
            ledger_outcomes,
            chain_submissions,
            approvals_submitted,
            events_decoded,
            event_decode_misses,
            confirmation_seconds,
        })
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

impl EngineMetrics for MetricsRegistry {
    fn record_outcome(&self, operation: &str, outcome: &str) {
        self.ledger_outcomes.with_label_values(&[operation, outcome]).inc();
    }

    fn record_submission(&self, method: &str, result: &str) {
        self.chain_submissions.with_label_values(&[method, result]).inc();
    }

    fn observe_confirmation(&self, method: &str, seconds: f64) {
        self.confirmation_seconds.with_label_values(&[method]).observe(seconds);
    }

    fn record_approval(&self) {
        self.approvals_submitted.inc();
    }

    fn record_event(&self, event: &str) {
        self.events_decoded.with_label_values(&[event]).inc();
    }

    fn record_decode_miss(&self, event: &str) {
        self.event_decode_misses.with_label_values(&[event]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_recorded_series() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_outcome("create_loan_order", "confirmed");
        metrics.record_submission("createOrder", "estimation_failed");
        metrics.record_decode_miss("OrderCreated");

        let text = metrics.render().unwrap();
        assert!(text.contains("bnpl_ledger_outcomes_total{operation=\"create_loan_order\",outcome=\"confirmed\"} 1"));
        assert!(text.contains("method=\"createOrder\",result=\"estimation_failed\""));
        assert!(text.contains("bnpl_ledger_event_decode_misses_total{event=\"OrderCreated\"} 1"));
    }
}
