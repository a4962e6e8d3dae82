//! Domain layer - contract bindings, on-chain views and local records.
//!
//! No I/O here. Everything is serializable and testable in isolation;
//! the engine in `usecases` moves values between these types.

pub mod abi;
pub mod errors;
pub mod order;
pub mod outcome;
pub mod records;
pub mod units;

pub use errors::{
    AllowanceError, ChainReadError, ConfigurationError, ConfirmationFailure, ExecutionError,
    FailureKind, LedgerError,
};
pub use order::{
    AllowanceSnapshot, BnplOrder, NetworkInfo, NominalInstallment, Quote, Tier, TokenInfo,
};
pub use outcome::{LiquidationResult, LoanOrderResult, Outcome, RepaymentResult};
pub use records::{
    BlockchainStatus, LedgerTransaction, Loan, LoanIntent, LoanStatus, Repayment,
    RepaymentStatus, TransactionSubtype, TransactionType,
};
