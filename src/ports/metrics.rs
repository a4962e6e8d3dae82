//! Metrics Port - Engine Telemetry Sink
//!
//! Every method has a no-op default so tests and tools can run the
//! engine without a registry. The Prometheus adapter overrides them all.

/// Telemetry emitted by the reconciliation engine.
pub trait EngineMetrics: Send + Sync + 'static {
  /// A ledger entry point finished with the given outcome label.
  fn record_outcome(&self, _operation: &str, _outcome: &str) {}

  /// A write call ended at `result` (confirmed, estimation_failed, ...).
  fn record_submission(&self, _method: &str, _result: &str) {}

  /// Seconds between broadcast and receipt.
  fn observe_confirmation(&self, _method: &str, _seconds: f64) {}

  /// An `approve` transaction was submitted.
  fn record_approval(&self) {}

  /// A contract event was decoded from a log.
  fn record_event(&self, _event: &str) {}

  /// A confirmed transaction lacked the expected event.
  fn record_decode_miss(&self, _event: &str) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl EngineMetrics for NoopMetrics {}
