//! Persistence Adapters - JSONL Audit Log and JSON Snapshots
//!
//! Implements the LedgerStore port with an append-only JSONL audit log
//! and atomic JSON snapshots for loans and repayments. No database.

pub mod audit_log;
pub mod file_store;
pub mod memory;
pub mod snapshot;

pub use audit_log::AuditLog;
pub use file_store::FileLedgerStore;
pub use memory::{InMemoryLedgerStore, LedgerContents};
pub use snapshot::SnapshotStore;
