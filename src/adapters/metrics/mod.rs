//! Metrics and Monitoring Adapters
//!
//! Prometheus metrics export (/metrics) and liveness/readiness endpoints
//! (/live, /ready) via axum 0.7.

pub mod health;
pub mod prometheus;

pub use health::{HealthServer, HealthState};
pub use prometheus::MetricsRegistry;
