//! File-backed Ledger Store - Concrete Adapter for the LedgerStore Port
//!
//! Serves reads from memory. Loan and repayment writes are followed by
//! an atomic snapshot; audit rows are appended to the JSONL log first and
//! only then made visible in memory. Each write commits on its own.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use super::audit_log::AuditLog;
use super::memory::InMemoryLedgerStore;
use super::snapshot::SnapshotStore;
use crate::domain::records::{LedgerTransaction, Loan, LoanStatus, Repayment};
use crate::ports::store::LedgerStore;

pub struct FileLedgerStore {
    memory: InMemoryLedgerStore,
    snapshot: SnapshotStore,
    audit: AuditLog,
    /// Serialises snapshot writes so tmp-file renames never interleave.
    persist_lock: Mutex<()>,
}

impl FileLedgerStore {
    /// Open the store in `data_dir`, restoring the last snapshot and audit log.
    pub async fn open(data_dir: &str) -> Result<Self> {
        let snapshot = SnapshotStore::new(data_dir).await?;
        let audit = AuditLog::new(data_dir).await?;

        let mut contents = snapshot.load().await?.unwrap_or_default();
        contents.transactions = audit.load_all().await?;
        info!(
            data_dir,
            loans = contents.loans.len(),
            transactions = contents.transactions.len(),
            "Ledger store opened"
        );

        Ok(Self {
            memory: InMemoryLedgerStore::from_contents(contents),
            snapshot,
            audit,
            persist_lock: Mutex::new(()),
        })
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        self.snapshot.save(self.memory.contents().await).await
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn create_loan(&self, loan: &Loan) -> Result<()> {
        self.memory.create_loan(loan).await?;
        self.persist().await
    }

    async fn find_loan(&self, loan_id: &str) -> Result<Option<Loan>> {
        self.memory.find_loan(loan_id).await
    }

    async fn update_loan(&self, loan: &Loan) -> Result<()> {
        self.memory.update_loan(loan).await?;
        self.persist().await
    }

    async fn find_loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>> {
        self.memory.find_loans_by_status(status).await
    }

    async fn create_repayment(&self, repayment: &Repayment) -> Result<()> {
        self.memory.create_repayment(repayment).await?;
        self.persist().await
    }

    async fn find_repayments_by_loan(&self, loan_id: &str) -> Result<Vec<Repayment>> {
        self.memory.find_repayments_by_loan(loan_id).await
    }

    async fn append_transaction(&self, tx: &LedgerTransaction) -> Result<()> {
        self.audit.append(tx).await?;
        self.memory.append_transaction(tx).await
    }

    async fn find_transactions_by_loan(&self, loan_id: &str) -> Result<Vec<LedgerTransaction>> {
        self.memory.find_transactions_by_loan(loan_id).await
    }

    async fn is_healthy(&self) -> bool {
        self.snapshot.is_healthy().await && self.audit.is_healthy().await
    }
}
