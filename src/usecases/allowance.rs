//! Allowance Manager - ERC-20 Spend Precondition
//!
//! Before any value-moving call the BNPL contract must be allowed to
//! pull the required amount from the payer. The manager approves
//! exactly the amount the current operation needs, never an unlimited
//! allowance.
//!
//! Concurrent operations for the same owner are not serialised; two of
//! them may both observe a stale allowance and both approve.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{AllowanceError, ChainReadError};
use crate::domain::order::AllowanceSnapshot;
use crate::ports::metrics::{EngineMetrics, NoopMetrics};

use super::executor::{Confirmed, TransactionExecutor};
use super::gateway::ContractGateway;

/// What `ensure_allowance` had to do.
#[derive(Debug, Clone)]
pub enum AllowanceAction {
  /// Existing allowance already covered the requirement.
  Sufficient,
  /// An approval for exactly the required amount was confirmed.
  Approved(Confirmed),
}

pub struct AllowanceManager {
  gateway: ContractGateway,
  executor: Arc<TransactionExecutor>,
  metrics: Arc<dyn EngineMetrics>,
}

impl AllowanceManager {
  pub fn new(gateway: ContractGateway, executor: Arc<TransactionExecutor>) -> Self {
    Self {
      gateway,
      executor,
      metrics: Arc::new(NoopMetrics),
    }
  }

  pub fn with_metrics(mut self, metrics: Arc<dyn EngineMetrics>) -> Self {
    self.metrics = metrics;
    self
  }

  /// Read allowance and balance concurrently. Nothing is cached.
  pub async fn snapshot(&self, owner: Address, spender: Address) -> Result<AllowanceSnapshot, ChainReadError> {
    let (amount, balance) = tokio::try_join!(
      self.gateway.token_allowance(owner, spender),
      self.gateway.token_balance(owner),
    )?;
    Ok(AllowanceSnapshot::new(owner, spender, amount, balance))
  }

  /// Make sure `spender` may pull `required` from `owner`.
  ///
  /// Fails without spending gas if the owner's balance cannot cover
  /// `required`. After an approval confirms the allowance is read back,
  /// since all writes are signed by the service signer and an approval
  /// only helps when the signer is the owner.
  #[instrument(skip(self), fields(owner = %owner, spender = %spender, required = %required))]
  pub async fn ensure_allowance(
    &self,
    owner: Address,
    spender: Address,
    required: U256,
  ) -> Result<AllowanceAction, AllowanceError> {
    let snap = self.snapshot(owner, spender).await?;

    if snap.balance < required {
      warn!(balance = %snap.balance, "Balance below required amount");
      return Err(AllowanceError::InsufficientBalance {
        owner,
        balance: snap.balance,
        required,
      });
    }

    if snap.covers(required) {
      debug!(allowance = %snap.amount, "Allowance sufficient");
      return Ok(AllowanceAction::Sufficient);
    }

    info!(allowance = %snap.amount, "Allowance below requirement, approving");
    self.metrics.record_approval();
    let call = self.gateway.approve(spender, required);
    let confirmed = self
      .executor
      .submit(&call)
      .await
      .map_err(AllowanceError::Approval)?;

    let after = self.gateway.token_allowance(owner, spender).await?;
    if after < required {
      warn!(allowance = %after, signer = %self.gateway.signer_address(), "Allowance still short after approval");
      return Err(AllowanceError::StillInsufficient {
        actual: after,
        required,
      });
    }

    info!(tx_hash = %confirmed.tx_hash, allowance = %after, "Approval confirmed");
    Ok(AllowanceAction::Approved(confirmed))
  }
}
