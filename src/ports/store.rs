//! Ledger Store Port - Persistent Store Collaborator
//!
//! Plain create/find/update-by-id for loans and repayments, plus the
//! append-only transaction audit log. No cross-record transactions:
//! each write commits on its own.

use async_trait::async_trait;

use crate::domain::records::{LedgerTransaction, Loan, LoanStatus, Repayment};

#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
  /// Insert a new loan. Fails if the id already exists.
  async fn create_loan(&self, loan: &Loan) -> anyhow::Result<()>;

  async fn find_loan(&self, loan_id: &str) -> anyhow::Result<Option<Loan>>;

  /// Overwrite an existing loan by id. Fails if it does not exist.
  async fn update_loan(&self, loan: &Loan) -> anyhow::Result<()>;

  async fn find_loans_by_status(&self, status: LoanStatus) -> anyhow::Result<Vec<Loan>>;

  async fn create_repayment(&self, repayment: &Repayment) -> anyhow::Result<()>;

  /// Repayments for one loan, oldest first.
  async fn find_repayments_by_loan(&self, loan_id: &str) -> anyhow::Result<Vec<Repayment>>;

  /// Append one audit row. Rows are never updated or deleted.
  async fn append_transaction(&self, tx: &LedgerTransaction) -> anyhow::Result<()>;

  /// Audit rows for one loan, in append order.
  async fn find_transactions_by_loan(&self, loan_id: &str) -> anyhow::Result<Vec<LedgerTransaction>>;

  /// Check if the store is writable.
  async fn is_healthy(&self) -> bool;
}
