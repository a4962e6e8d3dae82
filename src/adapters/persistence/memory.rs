//! In-memory Ledger Store
//!
//! Backing map for the file store and a standalone store for tests and
//! dry runs. Enforces the store contract: unique ids on create, existing
//! ids on update, append-only audit rows.

use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::records::{LedgerTransaction, Loan, LoanStatus, Repayment};
use crate::ports::store::LedgerStore;

/// Full contents of a ledger, as persisted in snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerContents {
    pub loans: Vec<Loan>,
    pub repayments: Vec<Repayment>,
    #[serde(default, skip_serializing)]
    pub transactions: Vec<LedgerTransaction>,
}

#[derive(Default)]
struct Tables {
    loans: HashMap<String, Loan>,
    /// Insertion order preserved.
    repayments: Vec<Repayment>,
    transactions: Vec<LedgerTransaction>,
}

#[derive(Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_contents(contents: LedgerContents) -> Self {
        let tables = Tables {
            loans: contents
                .loans
                .into_iter()
                .map(|l| (l.loan_id.clone(), l))
                .collect(),
            repayments: contents.repayments,
            transactions: contents.transactions,
        };
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Consistent copy of everything, loans ordered by creation time.
    pub async fn contents(&self) -> LedgerContents {
        let t = self.tables.read().await;
        let mut loans: Vec<Loan> = t.loans.values().cloned().collect();
        loans.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.loan_id.cmp(&b.loan_id)));
        LedgerContents {
            loans,
            repayments: t.repayments.clone(),
            transactions: t.transactions.clone(),
        }
    }

    pub async fn all_transactions(&self) -> Vec<LedgerTransaction> {
        self.tables.read().await.transactions.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_loan(&self, loan: &Loan) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.loans.contains_key(&loan.loan_id) {
            bail!("loan {} already exists", loan.loan_id);
        }
        t.loans.insert(loan.loan_id.clone(), loan.clone());
        Ok(())
    }

    async fn find_loan(&self, loan_id: &str) -> Result<Option<Loan>> {
        Ok(self.tables.read().await.loans.get(loan_id).cloned())
    }

    async fn update_loan(&self, loan: &Loan) -> Result<()> {
        let mut t = self.tables.write().await;
        match t.loans.get_mut(&loan.loan_id) {
            Some(existing) => {
                *existing = loan.clone();
                Ok(())
            }
            None => bail!("loan {} does not exist", loan.loan_id),
        }
    }

    async fn find_loans_by_status(&self, status: LoanStatus) -> Result<Vec<Loan>> {
        let t = self.tables.read().await;
        let mut loans: Vec<Loan> = t.loans.values().filter(|l| l.status == status).cloned().collect();
        loans.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(loans)
    }

    async fn create_repayment(&self, repayment: &Repayment) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.repayments.iter().any(|r| r.repayment_id == repayment.repayment_id) {
            bail!("repayment {} already exists", repayment.repayment_id);
        }
        t.repayments.push(repayment.clone());
        Ok(())
    }

    async fn find_repayments_by_loan(&self, loan_id: &str) -> Result<Vec<Repayment>> {
        let t = self.tables.read().await;
        Ok(t.repayments.iter().filter(|r| r.loan_id == loan_id).cloned().collect())
    }

    async fn append_transaction(&self, tx: &LedgerTransaction) -> Result<()> {
        self.tables.write().await.transactions.push(tx.clone());
        Ok(())
    }

    async fn find_transactions_by_loan(&self, loan_id: &str) -> Result<Vec<LedgerTransaction>> {
        let t = self.tables.read().await;
        Ok(t.transactions
            .iter()
            .filter(|tx| tx.loan_id.as_deref() == Some(loan_id))
            .cloned()
            .collect())
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::records::LoanIntent;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn loan() -> Loan {
        let intent = LoanIntent {
            user_id: "u-1".into(),
            amount: dec!(100),
            interest_rate: dec!(2),
            collateral_amount: dec!(20),
            installments: None,
            merchant: None,
            due_in_seconds: None,
        };
        Loan::pending(&intent, Utc::now())
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_id() {
        let store = InMemoryLedgerStore::new();
        let l = loan();
        store.create_loan(&l).await.unwrap();
        assert!(store.create_loan(&l).await.is_err());
    }

    #[tokio::test]
    async fn test_update_requires_existing_loan() {
        let store = InMemoryLedgerStore::new();
        assert!(store.update_loan(&loan()).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_status() {
        let store = InMemoryLedgerStore::new();
        let mut l = loan();
        store.create_loan(&l).await.unwrap();
        l.mark_failed(Utc::now()).unwrap();
        store.update_loan(&l).await.unwrap();

        assert_eq!(store.find_loans_by_status(LoanStatus::Failed).await.unwrap().len(), 1);
        assert!(store.find_loans_by_status(LoanStatus::Pending).await.unwrap().is_empty());
    }
}
