//! Structured results of the ledger's entry points.

use serde::Serialize;

use super::errors::FailureKind;
use super::records::{Loan, Repayment};

/// How an orchestration run ended, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The chain write confirmed.
    Confirmed { tx_hash: String },
    /// Recorded without touching the chain (no wallet, no order, or the
    /// chain write failed and the local record degraded).
    LocalOnly { reason: String },
    /// The chain attempt failed; the local record reflects it.
    Failed { failure: FailureKind, message: String },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed { .. } => "confirmed",
            Self::LocalOnly { .. } => "local_only",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            Self::Confirmed { tx_hash } => Some(tx_hash),
            _ => None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanOrderResult {
    pub loan: Loan,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepaymentResult {
    pub repayment: Repayment,
    pub outcome: Outcome,
    /// Human-readable note, distinguishes degraded local-only repayments.
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationResult {
    pub loan: Loan,
    pub tx_hash: Option<String>,
    pub outcome: Outcome,
}
