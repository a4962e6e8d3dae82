//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Interfaces the engine requires from the outside world. Adapters
//! implement these traits.
//!
//! Port categories:
//! - `ChainClient`: Node transport and transaction signing
//! - `LedgerStore`: Loan/repayment records and the audit log
//! - `UserDirectory`: Wallet lookup for a user id
//! - `EngineMetrics`: Telemetry sink

pub mod chain_client;
pub mod metrics;
pub mod store;
pub mod user_directory;

pub use chain_client::{ChainCall, ChainClient, ObservedLog, TxReceipt};
pub use metrics::{EngineMetrics, NoopMetrics};
pub use store::LedgerStore;
pub use user_directory::{UserDirectory, WalletLookup};
