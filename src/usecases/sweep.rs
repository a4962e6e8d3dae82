//! Reconciliation Sweep - Late-confirmed Order Detection
//!
//! A `createOrder` whose receipt wait timed out may still be mined. The
//! sweep looks at FAILED loans whose failed creation audit row carries a
//! tx hash, fetches that receipt once, and if it was mined with an
//! `OrderCreated` event moves the loan to APPROVED and appends one
//! `BLOCKCHAIN_LATE_CONFIRMATION` row. It never submits transactions.
//!
//! Hashes from a failed approval are not creation attempts and are
//! skipped. A hash found mined without an order is remembered so later
//! passes do not fetch it again.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::FailureKind;
use crate::domain::records::{BlockchainStatus, LedgerTransaction, Loan, LoanStatus, TransactionType};
use crate::ports::chain_client::ChainClient;
use crate::ports::metrics::{EngineMetrics, NoopMetrics};
use crate::ports::store::LedgerStore;

use super::events::{EventDecoder, EventKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
  /// FAILED loans with a creation tx hash to check.
  pub examined: usize,
  /// Loans moved to APPROVED.
  pub reconciled: usize,
  /// Receipt still not available.
  pub unconfirmed: usize,
  /// Mined but reverted, or no `OrderCreated` in the receipt.
  pub not_created: usize,
}

pub struct ReconciliationSweep {
  store: Arc<dyn LedgerStore>,
  chain: Arc<dyn ChainClient>,
  decoder: EventDecoder,
  interval: Duration,
  /// Mined creation hashes that produced no order. Final, never refetched.
  settled: Mutex<HashSet<B256>>,
  metrics: Arc<dyn EngineMetrics>,
}

impl ReconciliationSweep {
  pub fn new(store: Arc<dyn LedgerStore>, chain: Arc<dyn ChainClient>, decoder: EventDecoder, interval: Duration) -> Self {
    Self {
      store,
      chain,
      decoder,
      interval,
      settled: Mutex::new(HashSet::new()),
      metrics: Arc::new(NoopMetrics),
    }
  }

  pub fn with_metrics(mut self, metrics: Arc<dyn EngineMetrics>) -> Self {
    self.metrics = metrics;
    self
  }

  /// Hash of the most recent failed creation attempt for a loan.
  async fn failed_creation_hash(&self, loan: &Loan) -> Result<Option<B256>> {
    let rows = self.store.find_transactions_by_loan(&loan.loan_id).await?;
    Ok(
      rows
        .iter()
        .rev()
        .find(|row| {
          row.tx_type == TransactionType::BlockchainOrderCreation
            && row.blockchain_status == BlockchainStatus::Failed
            && !is_approval_failure(row)
        })
        .and_then(|row| row.tx_hash.as_deref())
        .and_then(|hash| B256::from_str(hash).ok()),
    )
  }

  pub async fn sweep_once(&self) -> Result<SweepReport> {
    let failed = self
      .store
      .find_loans_by_status(LoanStatus::Failed)
      .await
      .context("Failed to list FAILED loans")?;

    let mut report = SweepReport::default();
    for mut loan in failed {
      let Some(hash) = self.failed_creation_hash(&loan).await? else {
        continue;
      };
      if self.settled.lock().await.contains(&hash) {
        continue;
      }
      report.examined += 1;

      let receipt = match self.chain.transaction_receipt(hash).await {
        Ok(Some(receipt)) => receipt,
        Ok(None) => {
          report.unconfirmed += 1;
          continue;
        }
        Err(e) => {
          warn!(loan_id = %loan.loan_id, tx_hash = %hash, error = %format!("{e:#}"), "Receipt lookup failed");
          report.unconfirmed += 1;
          continue;
        }
      };

      let order_id = if receipt.status { self.decoder.created_order_id(&receipt) } else { None };
      let Some(order_id) = order_id else {
        debug!(loan_id = %loan.loan_id, tx_hash = %hash, "Mined transaction created no order");
        self.settled.lock().await.insert(hash);
        report.not_created += 1;
        continue;
      };

      let tx_hash = format!("{hash:#x}");
      loan.confirm_order(order_id.to_string(), tx_hash.clone(), Utc::now())?;
      self.store.update_loan(&loan).await?;
      let row = LedgerTransaction::confirmed(
        &loan,
        TransactionType::BlockchainLateConfirmation,
        loan.amount,
        tx_hash.clone(),
        Utc::now(),
      );
      self.store.append_transaction(&row).await?;
      self.metrics.record_event(EventKind::OrderCreated.name());
      self.metrics.record_outcome("late_confirmation", "confirmed");
      info!(loan_id = %loan.loan_id, order_id = %order_id, %tx_hash, "Late-confirmed order reconciled, loan APPROVED");
      report.reconciled += 1;
    }
    Ok(report)
  }

  #[instrument(skip_all)]
  pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    info!(interval_secs = self.interval.as_secs(), "Reconciliation sweep started");
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Reconciliation sweep shutting down");
          return Ok(());
        }
        _ = ticker.tick() => {
          match self.sweep_once().await {
            Ok(report) if report.examined > 0 => info!(?report, "Sweep finished"),
            Ok(_) => {}
            Err(e) => warn!(error = %format!("{e:#}"), "Sweep failed"),
          }
        }
      }
    }
  }
}

/// The row's hash belongs to an `approve` that failed before `createOrder` was sent.
fn is_approval_failure(row: &LedgerTransaction) -> bool {
  row
    .detail
    .as_deref()
    .is_some_and(|detail| detail.starts_with(FailureKind::Allowance.as_str()))
}
