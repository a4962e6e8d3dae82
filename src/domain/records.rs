//! Local ledger records.
//!
//! Denormalised copies of on-chain state plus the append-only audit trail.
//! The chain stays authoritative; these records are the engine's honest
//! account of the last known chain outcome.

use std::fmt;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::LedgerError;

/// Order id recorded when a confirmed `createOrder` emitted no decodable
/// `OrderCreated` event.
pub const SENTINEL_ORDER_ID: &str = "0";

/// 32 hex characters, no dashes.
pub fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    /// Recorded locally, no chain attempt made (or no wallet to make one).
    Pending,
    /// `createOrder` confirmed.
    Approved,
    /// At least one confirmed repayment.
    Active,
    Repaid,
    Defaulted,
    /// A chain attempt was made and did not confirm.
    Failed,
}

impl LoanStatus {
    /// Allowed lifecycle edges.
    ///
    /// `Failed -> Approved` exists only for late-confirmation reconciliation.
    /// `Pending -> Repaid | Defaulted` covers loans that never reached the chain.
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Pending, Approved | Failed | Repaid | Defaulted)
                | (Failed, Approved)
                | (Approved, Active | Repaid | Defaulted)
                | (Active, Repaid | Defaulted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Repaid | Self::Defaulted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Active => "ACTIVE",
            Self::Repaid => "REPAID",
            Self::Defaulted => "DEFAULTED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller's request for a new loan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanIntent {
    pub user_id: String,
    pub amount: Decimal,
    /// Percentage, 0..=100.
    pub interest_rate: Decimal,
    pub collateral_amount: Decimal,
    #[serde(default)]
    pub installments: Option<u32>,
    #[serde(default)]
    pub merchant: Option<Address>,
    #[serde(default)]
    pub due_in_seconds: Option<u64>,
}

impl LoanIntent {
    const MIN_AMOUNT: Decimal = dec!(0.01);
    const MAX_INTEREST: Decimal = dec!(100);

    /// Request-level validation, run before any record exists.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.user_id.trim().is_empty() {
            return Err(LedgerError::InvalidIntent("user_id is required".into()));
        }
        if self.amount < Self::MIN_AMOUNT {
            return Err(LedgerError::InvalidIntent(format!(
                "amount must be at least {}, got {}",
                Self::MIN_AMOUNT,
                self.amount
            )));
        }
        if self.interest_rate < Decimal::ZERO || self.interest_rate > Self::MAX_INTEREST {
            return Err(LedgerError::InvalidIntent(format!(
                "interest_rate must be within 0..=100, got {}",
                self.interest_rate
            )));
        }
        if self.collateral_amount < Self::MIN_AMOUNT {
            return Err(LedgerError::InvalidIntent(format!(
                "collateral_amount must be at least {}, got {}",
                Self::MIN_AMOUNT,
                self.collateral_amount
            )));
        }
        if self.collateral_amount >= self.amount {
            return Err(LedgerError::InvalidIntent(
                "collateral_amount must be less than amount".into(),
            ));
        }
        if self.installments == Some(0) {
            return Err(LedgerError::InvalidIntent("installments must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub loan_id: String,
    pub user_id: String,
    pub amount: Decimal,
    pub interest_rate: Decimal,
    pub collateral_amount: Decimal,
    pub status: LoanStatus,
    pub blockchain_order_id: Option<String>,
    pub blockchain_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn pending(intent: &LoanIntent, now: DateTime<Utc>) -> Self {
        Self {
            loan_id: new_record_id(),
            user_id: intent.user_id.clone(),
            amount: intent.amount,
            interest_rate: intent.interest_rate,
            collateral_amount: intent.collateral_amount,
            status: LoanStatus::Pending,
            blockchain_order_id: None,
            blockchain_tx_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move along a lifecycle edge, rejecting edges that do not exist.
    pub fn transition(&mut self, next: LoanStatus, now: DateTime<Utc>) -> Result<(), LedgerError> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::InvalidState {
                loan_id: self.loan_id.clone(),
                status: self.status,
                action: "change status",
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Record a confirmed `createOrder`. The only way an order id gets set.
    pub fn confirm_order(
        &mut self,
        order_id: String,
        tx_hash: String,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.transition(LoanStatus::Approved, now)?;
        self.blockchain_order_id = Some(order_id);
        self.blockchain_tx_hash = Some(tx_hash);
        Ok(())
    }

    /// A chain attempt was made and did not confirm.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transition(LoanStatus::Failed, now)?;
        self.blockchain_order_id = None;
        Ok(())
    }

    /// Whether repayments may still be recorded against this loan.
    pub fn accepts_repayment(&self) -> bool {
        matches!(
            self.status,
            LoanStatus::Pending | LoanStatus::Approved | LoanStatus::Active
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepaymentStatus {
    Pending,
    Paid,
    Late,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repayment {
    pub repayment_id: String,
    pub loan_id: String,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub status: RepaymentStatus,
    pub blockchain_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Repayment {
    /// Repayment backed by a confirmed transaction.
    pub fn paid_on_chain(loan_id: &str, amount: Decimal, tx_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            blockchain_tx_hash: Some(tx_hash),
            ..Self::paid_locally(loan_id, amount, now)
        }
    }

    /// Repayment intent recorded without a chain transaction.
    pub fn paid_locally(loan_id: &str, amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            repayment_id: new_record_id(),
            loan_id: loan_id.to_string(),
            amount,
            due_date: now,
            paid_date: Some(now),
            status: RepaymentStatus::Paid,
            blockchain_tx_hash: None,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    BlockchainOrderCreation,
    BlockchainRepayment,
    BlockchainFullRepayment,
    BlockchainLiquidation,
    BlockchainLateConfirmation,
}

impl TransactionType {
    /// Money direction from the borrower's point of view.
    pub fn subtype(self) -> TransactionSubtype {
        match self {
            Self::BlockchainOrderCreation | Self::BlockchainLateConfirmation => {
                TransactionSubtype::Credit
            }
            Self::BlockchainRepayment
            | Self::BlockchainFullRepayment
            | Self::BlockchainLiquidation => TransactionSubtype::Debit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionSubtype {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockchainStatus {
    Pending,
    Confirmed,
    Failed,
}

/// One row per chain-call attempt. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub tx_id: String,
    pub user_id: String,
    pub loan_id: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub subtype: TransactionSubtype,
    pub amount: Decimal,
    pub tx_hash: Option<String>,
    pub blockchain_order_id: Option<String>,
    pub blockchain_status: BlockchainStatus,
    /// Failure classification and message for FAILED rows.
    #[serde(default)]
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn confirmed(
        loan: &Loan,
        tx_type: TransactionType,
        amount: Decimal,
        tx_hash: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            blockchain_status: BlockchainStatus::Confirmed,
            ..Self::base(loan, tx_type, amount, now)
        }
    }

    pub fn failed(
        loan: &Loan,
        tx_type: TransactionType,
        amount: Decimal,
        tx_hash: Option<String>,
        detail: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tx_hash,
            blockchain_status: BlockchainStatus::Failed,
            detail: Some(detail),
            ..Self::base(loan, tx_type, amount, now)
        }
    }

    fn base(loan: &Loan, tx_type: TransactionType, amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            tx_id: new_record_id(),
            user_id: loan.user_id.clone(),
            loan_id: Some(loan.loan_id.clone()),
            tx_type,
            subtype: tx_type.subtype(),
            amount,
            tx_hash: None,
            blockchain_order_id: loan.blockchain_order_id.clone(),
            blockchain_status: BlockchainStatus::Pending,
            detail: None,
            created_at: now,
        }
    }
}
