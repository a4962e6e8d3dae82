//! Error taxonomy for the reconciliation engine.
//!
//! Chain-facing failures are typed so the ledger can classify them into
//! a [`FailureKind`] and absorb them into a state transition. Only
//! [`ConfigurationError`] (startup) and [`LedgerError`] (request-level)
//! ever reach a caller as hard errors.

use std::fmt;

use alloy::primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::records::LoanStatus;

/// Fatal startup misconfiguration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing contract address for {0}")]
    MissingContractAddress(&'static str),

    #[error("signing key environment variable {0} is not set")]
    MissingSigningKey(String),

    #[error("signing key in {0} is not a valid secp256k1 private key")]
    InvalidSigningKey(String),

    #[error("chain id mismatch: expected {expected}, node reports {actual}")]
    ChainIdMismatch { expected: u64, actual: u64 },

    #[error("no contract code deployed at {address} ({name})")]
    NoContractCode { name: &'static str, address: Address },

    #[error("token.decimals is {configured} but the token reports {actual}")]
    TokenDecimalsMismatch { configured: u8, actual: u8 },
}

/// A view call failed at the RPC layer or its return data did not decode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainReadError {
    #[error("{method}: rpc call failed: {message}")]
    Rpc { method: &'static str, message: String },

    #[error("{method}: could not decode return data: {message}")]
    Decode { method: &'static str, message: String },
}

impl ChainReadError {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Rpc { method, .. } | Self::Decode { method, .. } => method,
        }
    }
}

/// Why a submitted transaction could not be confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationFailure {
    /// Not mined within the receipt timeout. Outcome on-chain is unknown.
    TimedOut { after_secs: u64 },
    /// Mined with status 0.
    Reverted,
    /// The node failed while polling for the receipt.
    Rpc(String),
}

impl fmt::Display for ConfirmationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut { after_secs } => write!(f, "timed out after {after_secs}s"),
            Self::Reverted => write!(f, "reverted"),
            Self::Rpc(msg) => write!(f, "rpc error: {msg}"),
        }
    }
}

/// Failure of a single write call driven by the `TransactionExecutor`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Gas estimation reverted. Usually an on-chain business rule rejected
    /// the call, so it is never retried.
    #[error("{method}: gas estimation failed: {message}")]
    EstimationFailed { method: &'static str, message: String },

    #[error("{method}: submission failed: {message}")]
    SubmissionFailed { method: &'static str, message: String },

    #[error("{method}: confirmation of {tx_hash} failed: {reason}")]
    ConfirmationFailed {
        method: &'static str,
        tx_hash: B256,
        reason: ConfirmationFailure,
    },
}

impl ExecutionError {
    /// Hash of the submitted transaction, when submission got that far.
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            Self::ConfirmationFailed { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::EstimationFailed { .. } => FailureKind::EstimationFailed,
            Self::SubmissionFailed { .. } => FailureKind::SubmissionFailed,
            Self::ConfirmationFailed { .. } => FailureKind::ConfirmationFailed,
        }
    }
}

/// The allowance precondition could not be established.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllowanceError {
    #[error(transparent)]
    Read(#[from] ChainReadError),

    #[error("owner {owner} holds {balance}, operation needs {required}")]
    InsufficientBalance {
        owner: Address,
        balance: U256,
        required: U256,
    },

    #[error("approval transaction failed: {0}")]
    Approval(#[source] ExecutionError),

    #[error("allowance is {actual} after approval, operation needs {required}")]
    StillInsufficient { actual: U256, required: U256 },
}

impl AllowanceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Read(_) => FailureKind::ChainRead,
            Self::InsufficientBalance { .. } => FailureKind::InsufficientBalance,
            Self::Approval(_) | Self::StillInsufficient { .. } => FailureKind::Allowance,
        }
    }

    /// Hash of the approval transaction, if one was submitted.
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            Self::Approval(e) => e.tx_hash(),
            _ => None,
        }
    }
}

/// Closed classification of absorbed chain failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    ChainRead,
    InsufficientBalance,
    Allowance,
    EstimationFailed,
    SubmissionFailed,
    ConfirmationFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChainRead => "chain_read",
            Self::InsufficientBalance => "insufficient_balance",
            Self::Allowance => "allowance",
            Self::EstimationFailed => "estimation_failed",
            Self::SubmissionFailed => "submission_failed",
            Self::ConfirmationFailed => "confirmation_failed",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-level errors returned by the ledger before (or instead of)
/// touching any record.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid loan intent: {0}")]
    InvalidIntent(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error("user directory failure: {0}")]
    UserDirectory(String),

    #[error("loan {0} not found")]
    LoanNotFound(String),

    #[error("loan {loan_id} is {status}, cannot {action}")]
    InvalidState {
        loan_id: String,
        status: LoanStatus,
        action: &'static str,
    },

    #[error("store failure: {0}")]
    Store(String),

    #[error(transparent)]
    ChainRead(#[from] ChainReadError),
}

impl LedgerError {
    pub fn store(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }
}
