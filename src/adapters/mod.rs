//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (blockchain RPC, file I/O, HTTP servers).
//!
//! Adapter categories:
//! - `chain`: JSON-RPC transport and signer via alloy-rs
//! - `directory`: file-backed user → wallet lookup
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: JSONL audit log and ledger snapshots

pub mod chain;
pub mod directory;
pub mod metrics;
pub mod persistence;
