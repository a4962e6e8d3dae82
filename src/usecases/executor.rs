//! Transaction Executor - Estimate, Buffer, Submit, Confirm
//!
//! Drives a single write call through four steps, each with its own
//! failure class:
//! 1. `eth_estimateGas` -> `EstimationFailed` (nothing is broadcast)
//! 2. apply the gas buffer and broadcast -> `SubmissionFailed`
//! 3. wait for the receipt under a timeout -> `ConfirmationFailed`
//! 4. reject status-0 receipts -> `ConfirmationFailed` (reverted)
//!
//! There is no resubmission. A write whose outcome is unknown is
//! surfaced to the caller, never retried blindly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::B256;
use tracing::{info, instrument, warn};

use crate::domain::errors::{ConfirmationFailure, ExecutionError};
use crate::ports::chain_client::{ChainCall, ChainClient, TxReceipt};
use crate::ports::metrics::{EngineMetrics, NoopMetrics};

/// Default safety margin over the node's gas estimate.
pub const DEFAULT_GAS_BUFFER_PERCENT: u32 = 20;

/// `ceil(estimate * (100 + buffer_percent) / 100)`, saturating at `u64::MAX`.
pub fn buffered_gas_limit(estimate: u64, buffer_percent: u32) -> u64 {
  let scaled = u128::from(estimate) * (100 + u128::from(buffer_percent));
  u64::try_from(scaled.div_ceil(100)).unwrap_or(u64::MAX)
}

/// A write call that was mined successfully.
#[derive(Debug, Clone)]
pub struct Confirmed {
  pub tx_hash: B256,
  /// Gas limit the transaction was submitted with.
  pub gas_limit: u64,
  pub receipt: TxReceipt,
}

pub struct TransactionExecutor {
  chain: Arc<dyn ChainClient>,
  /// Added on top of every estimate, in percent.
  gas_buffer_percent: u32,
  /// Upper bound on the receipt wait. Expiry never triggers a resend.
  receipt_timeout: Duration,
  metrics: Arc<dyn EngineMetrics>,
}

impl TransactionExecutor {
  pub fn new(chain: Arc<dyn ChainClient>, gas_buffer_percent: u32, receipt_timeout: Duration) -> Self {
    Self {
      chain,
      gas_buffer_percent,
      receipt_timeout,
      metrics: Arc::new(NoopMetrics),
    }
  }

  pub fn with_metrics(mut self, metrics: Arc<dyn EngineMetrics>) -> Self {
    self.metrics = metrics;
    self
  }

  pub fn gas_buffer_percent(&self) -> u32 {
    self.gas_buffer_percent
  }

  /// Execute one write call exactly once.
  #[instrument(skip_all, fields(method = call.method, to = %call.to))]
  pub async fn submit(&self, call: &ChainCall) -> Result<Confirmed, ExecutionError> {
    let method = call.method;

    let estimate = match self.chain.estimate_gas(call).await {
      Ok(gas) => gas,
      Err(e) => {
        warn!(method, error = %format!("{e:#}"), "Gas estimation failed");
        self.metrics.record_submission(method, "estimation_failed");
        return Err(ExecutionError::EstimationFailed {
          method,
          message: format!("{e:#}"),
        });
      }
    };

    let gas_limit = buffered_gas_limit(estimate, self.gas_buffer_percent);

    let tx_hash = match self.chain.send_transaction(call, gas_limit).await {
      Ok(hash) => hash,
      Err(e) => {
        warn!(method, gas_limit, error = %format!("{e:#}"), "Transaction submission failed");
        self.metrics.record_submission(method, "submission_failed");
        return Err(ExecutionError::SubmissionFailed {
          method,
          message: format!("{e:#}"),
        });
      }
    };
    info!(method, %tx_hash, estimate, gas_limit, "Transaction submitted");

    let started = Instant::now();
    let receipt = match tokio::time::timeout(self.receipt_timeout, self.chain.wait_for_receipt(tx_hash)).await {
      Ok(Ok(receipt)) => receipt,
      Ok(Err(e)) => {
        return Err(self.confirmation_failed(method, tx_hash, ConfirmationFailure::Rpc(format!("{e:#}"))));
      }
      Err(_) => {
        let reason = ConfirmationFailure::TimedOut {
          after_secs: self.receipt_timeout.as_secs(),
        };
        return Err(self.confirmation_failed(method, tx_hash, reason));
      }
    };
    self
      .metrics
      .observe_confirmation(method, started.elapsed().as_secs_f64());

    if !receipt.status {
      return Err(self.confirmation_failed(method, tx_hash, ConfirmationFailure::Reverted));
    }

    self.metrics.record_submission(method, "confirmed");
    info!(
      method,
      %tx_hash,
      gas_used = receipt.gas_used,
      block = receipt.block_number,
      "Transaction confirmed"
    );

    Ok(Confirmed {
      tx_hash,
      gas_limit,
      receipt,
    })
  }

  fn confirmation_failed(&self, method: &'static str, tx_hash: B256, reason: ConfirmationFailure) -> ExecutionError {
    warn!(method, %tx_hash, %reason, "Transaction not confirmed");
    self.metrics.record_submission(method, "confirmation_failed");
    ExecutionError::ConfirmationFailed {
      method,
      tx_hash,
      reason,
    }
  }
}
