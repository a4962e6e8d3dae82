//! Use Cases Layer - The Reconciliation Engine
//!
//! Orchestrates domain types with port interfaces. Dependency order,
//! leaves first:
//! - `ContractGateway`: Typed BNPL/token reads and write-call builders
//! - `TransactionExecutor`: Gas estimate + buffer, submit, confirm, classify
//! - `AllowanceManager`: Exact-amount ERC-20 approvals
//! - `EventDecoder`: Receipt logs to typed events
//! - `ReconciliationLedger`: Intent orchestration and degraded-mode policy
//! - `EventFeed` / `SubscriptionRegistry`: Out-of-band event listeners
//! - `ReconciliationSweep`: Late-confirmation detection

pub mod allowance;
pub mod event_feed;
pub mod events;
pub mod executor;
pub mod gateway;
pub mod ledger;
pub mod subscriptions;
pub mod sweep;

pub use allowance::{AllowanceAction, AllowanceManager};
pub use event_feed::{ContractEvent, EventFeed};
pub use events::{DecodedEvent, EventDecoder, EventKind};
pub use executor::{Confirmed, TransactionExecutor, buffered_gas_limit};
pub use gateway::ContractGateway;
pub use ledger::{LedgerSettings, ReconciliationLedger};
pub use subscriptions::{EventHandler, LoggingHandler, SubscriptionId, SubscriptionRegistry};
pub use sweep::{ReconciliationSweep, SweepReport};
