//! Reconciliation Ledger - Intent Orchestration and Degraded-Mode Policy
//!
//! Maps one business intent (create, repay, repay in full, liquidate)
//! onto at most one allowance approval and one contract write, then
//! records the outcome locally.
//!
//! Flow for every chain-backed intent:
//! 1. Validate and persist the local record first (PENDING for loans)
//! 2. Resolve the payer wallet; none means local-only, no chain call
//! 3. Allowance -> execute -> decode, strictly in that order
//! 4. Apply the outcome: state transition plus exactly one audit row
//!
//! Failures after step 1 are absorbed into the record and the audit
//! trail. Each write happens exactly once; retrying is a new intent.

use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use crate::domain::errors::{AllowanceError, ChainReadError, ExecutionError, FailureKind, LedgerError};
use crate::domain::order::AllowanceSnapshot;
use crate::domain::outcome::{LiquidationResult, LoanOrderResult, Outcome, RepaymentResult};
use crate::domain::records::{
  LedgerTransaction, Loan, LoanIntent, LoanStatus, Repayment, RepaymentStatus, SENTINEL_ORDER_ID,
  TransactionType,
};
use crate::domain::units::{decimal_to_units, units_to_decimal};
use crate::ports::metrics::{EngineMetrics, NoopMetrics};
use crate::ports::store::LedgerStore;
use crate::ports::user_directory::{UserDirectory, WalletLookup};

use super::allowance::AllowanceManager;
use super::events::{DecodedEvent, EventDecoder, EventKind};
use super::executor::{Confirmed, TransactionExecutor};
use super::gateway::ContractGateway;

/// Loan terms applied when an intent leaves them out.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
  /// Scale between ledger decimals and token units.
  pub token_decimals: u8,
  pub default_merchant: Address,
  pub default_due_in_seconds: u64,
  pub default_installments: u32,
}

/// A chain attempt that did not confirm, classified for the audit row.
#[derive(Debug, Clone)]
struct ChainFailure {
  kind: FailureKind,
  message: String,
  tx_hash: Option<B256>,
}

impl ChainFailure {
  fn detail(&self) -> String {
    format!("{}: {}", self.kind, self.message)
  }

  fn outcome(&self) -> Outcome {
    Outcome::Failed {
      failure: self.kind,
      message: self.message.clone(),
    }
  }
}

impl From<ChainReadError> for ChainFailure {
  fn from(e: ChainReadError) -> Self {
    Self {
      kind: FailureKind::ChainRead,
      message: e.to_string(),
      tx_hash: None,
    }
  }
}

impl From<AllowanceError> for ChainFailure {
  fn from(e: AllowanceError) -> Self {
    Self {
      kind: e.kind(),
      tx_hash: e.tx_hash(),
      message: e.to_string(),
    }
  }
}

impl From<ExecutionError> for ChainFailure {
  fn from(e: ExecutionError) -> Self {
    Self {
      kind: e.kind(),
      tx_hash: e.tx_hash(),
      message: e.to_string(),
    }
  }
}

/// Order id usable for chain calls. The sentinel recorded after a
/// decode miss is not one.
fn chain_order_id(loan: &Loan) -> Option<U256> {
  loan
    .blockchain_order_id
    .as_deref()
    .filter(|id| *id != SENTINEL_ORDER_ID)
    .and_then(|id| U256::from_str(id).ok())
}

fn tx_hash_hex(hash: B256) -> String {
  format!("{hash:#x}")
}

pub struct ReconciliationLedger {
  gateway: ContractGateway,
  /// Shared with the allowance manager so approvals go through the same path.
  executor: Arc<TransactionExecutor>,
  allowance: AllowanceManager,
  /// Reads order ids and payment events out of confirmed receipts.
  decoder: EventDecoder,
  /// Source of truth for loans, repayments and the audit trail.
  store: Arc<dyn LedgerStore>,
  /// Maps user ids to payer wallets.
  users: Arc<dyn UserDirectory>,
  settings: LedgerSettings,
  metrics: Arc<dyn EngineMetrics>,
}

impl ReconciliationLedger {
  pub fn new(
    gateway: ContractGateway,
    executor: Arc<TransactionExecutor>,
    store: Arc<dyn LedgerStore>,
    users: Arc<dyn UserDirectory>,
    settings: LedgerSettings,
  ) -> Self {
    Self {
      allowance: AllowanceManager::new(gateway.clone(), Arc::clone(&executor)),
      decoder: EventDecoder::new(gateway.bnpl_address()),
      gateway,
      executor,
      store,
      users,
      settings,
      metrics: Arc::new(NoopMetrics),
    }
  }

  pub fn with_metrics(mut self, metrics: Arc<dyn EngineMetrics>) -> Self {
    self.allowance =
      AllowanceManager::new(self.gateway.clone(), Arc::clone(&self.executor)).with_metrics(Arc::clone(&metrics));
    self.metrics = metrics;
    self
  }

  pub fn gateway(&self) -> &ContractGateway {
    &self.gateway
  }

  pub fn store(&self) -> &Arc<dyn LedgerStore> {
    &self.store
  }

  // ── Loan creation ────────────────────────────────────

  /// Record a loan intent and, when a payer wallet is known, back it
  /// with an on-chain order.
  ///
  /// Returns `Err` only for request-level problems (invalid intent,
  /// unknown user, store failure). Chain failures come back as
  /// `Outcome::Failed` with the loan marked FAILED.
  #[instrument(skip_all, fields(correlation_id = %correlation_id, user_id = %intent.user_id))]
  pub async fn create_loan_order(
    &self,
    correlation_id: &str,
    intent: LoanIntent,
    payer_address: Option<Address>,
  ) -> Result<LoanOrderResult, LedgerError> {
    intent.validate()?;
    let purchase_amount = decimal_to_units(intent.amount, self.settings.token_decimals)
      .map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;
    let payer = match self.lookup_wallet(&intent.user_id).await? {
      WalletLookup::NotFound => return Err(LedgerError::UserNotFound(intent.user_id.clone())),
      WalletLookup::Linked(addr) => Some(payer_address.unwrap_or(addr)),
      WalletLookup::NoWallet => payer_address,
    };

    let now = Utc::now();
    let mut loan = Loan::pending(&intent, now);
    self.store.create_loan(&loan).await.map_err(LedgerError::store)?;
    info!(correlation_id, loan_id = %loan.loan_id, amount = %loan.amount, "Loan recorded as PENDING");

    let Some(payer) = payer else {
      info!(correlation_id, loan_id = %loan.loan_id, "No wallet on file, loan kept local-only");
      let outcome = Outcome::LocalOnly {
        reason: "no wallet address on file".into(),
      };
      self.metrics.record_outcome("create_loan_order", outcome.label());
      return Ok(LoanOrderResult { loan, outcome });
    };

    let outcome = match self.submit_create_order(correlation_id, &intent, payer, purchase_amount).await {
      Ok((confirmed, order_id)) => {
        let tx_hash = tx_hash_hex(confirmed.tx_hash);
        loan.confirm_order(order_id.clone(), tx_hash.clone(), Utc::now())?;
        self.store.update_loan(&loan).await.map_err(LedgerError::store)?;
        let row = LedgerTransaction::confirmed(
          &loan,
          TransactionType::BlockchainOrderCreation,
          loan.amount,
          tx_hash.clone(),
          Utc::now(),
        );
        self.store.append_transaction(&row).await.map_err(LedgerError::store)?;
        info!(correlation_id, loan_id = %loan.loan_id, order_id = %order_id, %tx_hash, "Loan APPROVED on-chain");
        Outcome::Confirmed { tx_hash }
      }
      Err(failure) => {
        loan.mark_failed(Utc::now())?;
        self.store.update_loan(&loan).await.map_err(LedgerError::store)?;
        self
          .append_failure(&loan, TransactionType::BlockchainOrderCreation, loan.amount, &failure)
          .await?;
        warn!(
          correlation_id,
          loan_id = %loan.loan_id,
          failure = %failure.kind,
          error = %failure.message,
          "Loan creation failed on-chain, loan marked FAILED"
        );
        failure.outcome()
      }
    };

    self.metrics.record_outcome("create_loan_order", outcome.label());
    Ok(LoanOrderResult { loan, outcome })
  }

  async fn submit_create_order(
    &self,
    correlation_id: &str,
    intent: &LoanIntent,
    payer: Address,
    purchase_amount: U256,
  ) -> Result<(Confirmed, String), ChainFailure> {
    let quote = self.gateway.quote(purchase_amount, payer).await?;
    let required = quote.upfront_amount();
    info!(
      correlation_id,
      payer = %payer,
      collateral = %quote.collateral_required,
      fee = %quote.total_fee,
      "Quote received"
    );

    self
      .allowance
      .ensure_allowance(payer, self.gateway.bnpl_address(), required)
      .await?;

    let due_in = intent.due_in_seconds.unwrap_or(self.settings.default_due_in_seconds);
    let due_at = U256::from(Utc::now().timestamp().max(0) as u64).saturating_add(U256::from(due_in));
    let installments = intent.installments.unwrap_or(self.settings.default_installments);
    let merchant = intent.merchant.unwrap_or(self.settings.default_merchant);
    let call = self
      .gateway
      .create_order(purchase_amount, merchant, due_at, U256::from(installments));

    let confirmed = self.executor.submit(&call).await?;

    let order_id = match self.decoder.created_order_id(&confirmed.receipt) {
      Some(id) => {
        self.metrics.record_event(EventKind::OrderCreated.name());
        id.to_string()
      }
      None => {
        warn!(
          correlation_id,
          tx_hash = %confirmed.tx_hash,
          "Confirmed createOrder emitted no OrderCreated event, using sentinel order id"
        );
        self.metrics.record_decode_miss(EventKind::OrderCreated.name());
        SENTINEL_ORDER_ID.to_string()
      }
    };
    Ok((confirmed, order_id))
  }

  // ── Repayment ────────────────────────────────────────

  /// Repay `amount` (human units) against a loan.
  ///
  /// A failed chain repayment still records the repayment locally as
  /// PAID without a tx hash; the message says so.
  #[instrument(skip_all, fields(correlation_id = %correlation_id, loan_id = %loan_id, amount = %amount))]
  pub async fn repay_loan(
    &self,
    correlation_id: &str,
    loan_id: &str,
    amount: Decimal,
  ) -> Result<RepaymentResult, LedgerError> {
    if amount <= Decimal::ZERO {
      return Err(LedgerError::InvalidAmount(format!("repayment must be positive, got {amount}")));
    }
    let units = decimal_to_units(amount, self.settings.token_decimals)
      .map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;
    if units.is_zero() {
      return Err(LedgerError::InvalidAmount(format!(
        "repayment {amount} rounds to zero at {} decimals",
        self.settings.token_decimals
      )));
    }
    // Record exactly what the chain call moves.
    let amount =
      units_to_decimal(units, self.settings.token_decimals).map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;
    let mut loan = self.load_repayable(loan_id, "repay").await?;

    let (order_id, payer) = match self.chain_target(&loan).await? {
      Ok(target) => target,
      Err(reason) => return self.repay_locally(correlation_id, "repay_loan", &mut loan, amount, reason).await,
    };

    let attempt = async {
      self
        .allowance
        .ensure_allowance(payer, self.gateway.bnpl_address(), units)
        .await?;
      let call = self.gateway.repay_installment(order_id, units);
      Ok::<_, ChainFailure>(self.executor.submit(&call).await?)
    };

    let result = match attempt.await {
      Ok(confirmed) => {
        if self.decoder.find_event(&confirmed.receipt, EventKind::InstallmentPaid).is_some() {
          self.metrics.record_event(EventKind::InstallmentPaid.name());
        }
        let tx_hash = tx_hash_hex(confirmed.tx_hash);
        let repayment = Repayment::paid_on_chain(&loan.loan_id, amount, tx_hash.clone(), Utc::now());
        self.store.create_repayment(&repayment).await.map_err(LedgerError::store)?;
        let row = LedgerTransaction::confirmed(
          &loan,
          TransactionType::BlockchainRepayment,
          amount,
          tx_hash.clone(),
          Utc::now(),
        );
        self.store.append_transaction(&row).await.map_err(LedgerError::store)?;
        self.advance_after_repayment(correlation_id, &mut loan, order_id).await?;
        info!(correlation_id, loan_id = %loan.loan_id, %tx_hash, status = %loan.status, "Repayment confirmed on-chain");
        RepaymentResult {
          repayment,
          outcome: Outcome::Confirmed { tx_hash },
          message: "Repayment confirmed on-chain".into(),
        }
      }
      Err(failure) => {
        self.degraded_repayment(correlation_id, &loan, TransactionType::BlockchainRepayment, amount, failure).await?
      }
    };

    self.metrics.record_outcome("repay_loan", result.outcome.label());
    Ok(result)
  }

  /// Repay everything still owed on-chain (`totalDue`) in one `repayFull`.
  ///
  /// A failed `totalDue` read is returned to the caller untouched, since
  /// no record has been written at that point.
  #[instrument(skip_all, fields(correlation_id = %correlation_id, loan_id = %loan_id))]
  pub async fn repay_loan_in_full(&self, correlation_id: &str, loan_id: &str) -> Result<RepaymentResult, LedgerError> {
    let mut loan = self.load_repayable(loan_id, "repay in full").await?;

    let (order_id, payer) = match self.chain_target(&loan).await? {
      Ok(target) => target,
      Err(reason) => {
        let outstanding = self.locally_outstanding(&loan).await?;
        if outstanding <= Decimal::ZERO {
          return Err(LedgerError::InvalidAmount(format!("nothing outstanding on loan {}", loan.loan_id)));
        }
        return self
          .repay_locally(correlation_id, "repay_loan_in_full", &mut loan, outstanding, reason)
          .await;
      }
    };

    let due = self.gateway.total_due(order_id).await?;
    if due.is_zero() {
      return Err(LedgerError::InvalidAmount(format!("nothing due on-chain for order {order_id}")));
    }
    let due_amount =
      units_to_decimal(due, self.settings.token_decimals).map_err(|e| LedgerError::InvalidAmount(e.to_string()))?;

    let attempt = async {
      self
        .allowance
        .ensure_allowance(payer, self.gateway.bnpl_address(), due)
        .await?;
      let call = self.gateway.repay_full(order_id);
      Ok::<_, ChainFailure>(self.executor.submit(&call).await?)
    };

    let result = match attempt.await {
      Ok(confirmed) => {
        let paid = match self.decoder.find_event(&confirmed.receipt, EventKind::OrderFullyRepaid) {
          Some(DecodedEvent::OrderFullyRepaid { total_paid, .. }) => {
            self.metrics.record_event(EventKind::OrderFullyRepaid.name());
            units_to_decimal(total_paid, self.settings.token_decimals).unwrap_or(due_amount)
          }
          _ => due_amount,
        };
        let tx_hash = tx_hash_hex(confirmed.tx_hash);
        let repayment = Repayment::paid_on_chain(&loan.loan_id, paid, tx_hash.clone(), Utc::now());
        self.store.create_repayment(&repayment).await.map_err(LedgerError::store)?;
        let row = LedgerTransaction::confirmed(
          &loan,
          TransactionType::BlockchainFullRepayment,
          paid,
          tx_hash.clone(),
          Utc::now(),
        );
        self.store.append_transaction(&row).await.map_err(LedgerError::store)?;
        loan.transition(LoanStatus::Repaid, Utc::now())?;
        self.store.update_loan(&loan).await.map_err(LedgerError::store)?;
        info!(correlation_id, loan_id = %loan.loan_id, %tx_hash, "Loan fully repaid on-chain");
        RepaymentResult {
          repayment,
          outcome: Outcome::Confirmed { tx_hash },
          message: "Full repayment confirmed on-chain".into(),
        }
      }
      Err(failure) => {
        self
          .degraded_repayment(correlation_id, &loan, TransactionType::BlockchainFullRepayment, due_amount, failure)
          .await?
      }
    };

    self.metrics.record_outcome("repay_loan_in_full", result.outcome.label());
    Ok(result)
  }

  async fn load_repayable(&self, loan_id: &str, action: &'static str) -> Result<Loan, LedgerError> {
    let loan = self
      .store
      .find_loan(loan_id)
      .await
      .map_err(LedgerError::store)?
      .ok_or_else(|| LedgerError::LoanNotFound(loan_id.to_string()))?;
    if !loan.accepts_repayment() {
      return Err(LedgerError::InvalidState {
        loan_id: loan.loan_id,
        status: loan.status,
        action,
      });
    }
    Ok(loan)
  }

  /// Chain order and payer for a loan, or why it has to stay local.
  async fn chain_target(&self, loan: &Loan) -> Result<Result<(U256, Address), String>, LedgerError> {
    let Some(order_id) = chain_order_id(loan) else {
      return Ok(Err("loan has no usable on-chain order".into()));
    };
    match self.lookup_wallet(&loan.user_id).await? {
      WalletLookup::Linked(payer) => Ok(Ok((order_id, payer))),
      WalletLookup::NoWallet | WalletLookup::NotFound => Ok(Err("no wallet address on file".into())),
    }
  }

  async fn repay_locally(
    &self,
    correlation_id: &str,
    operation: &'static str,
    loan: &mut Loan,
    amount: Decimal,
    reason: String,
  ) -> Result<RepaymentResult, LedgerError> {
    let repayment = Repayment::paid_locally(&loan.loan_id, amount, Utc::now());
    self.store.create_repayment(&repayment).await.map_err(LedgerError::store)?;
    if chain_order_id(loan).is_none() {
      self.settle_if_locally_repaid(loan, Utc::now()).await?;
    }
    info!(correlation_id, loan_id = %loan.loan_id, %amount, reason = %reason, "Repayment recorded locally");
    let outcome = Outcome::LocalOnly { reason: reason.clone() };
    self.metrics.record_outcome(operation, outcome.label());
    Ok(RepaymentResult {
      repayment,
      outcome,
      message: format!("Repayment recorded locally: {reason}"),
    })
  }

  /// Chain repayment failed: audit it, then record the intent locally.
  async fn degraded_repayment(
    &self,
    correlation_id: &str,
    loan: &Loan,
    tx_type: TransactionType,
    amount: Decimal,
    failure: ChainFailure,
  ) -> Result<RepaymentResult, LedgerError> {
    self.append_failure(loan, tx_type, amount, &failure).await?;
    let repayment = Repayment::paid_locally(&loan.loan_id, amount, Utc::now());
    self.store.create_repayment(&repayment).await.map_err(LedgerError::store)?;
    warn!(
      correlation_id,
      loan_id = %loan.loan_id,
      failure = %failure.kind,
      error = %failure.message,
      "Blockchain repayment failed, recorded locally"
    );
    Ok(RepaymentResult {
      repayment,
      outcome: failure.outcome(),
      message: format!(
        "Blockchain repayment failed ({}); repayment recorded locally without a transaction",
        failure.kind
      ),
    })
  }

  /// APPROVED -> ACTIVE on the first confirmed repayment, then REPAID once
  /// the contract reports nothing left due.
  async fn advance_after_repayment(
    &self,
    correlation_id: &str,
    loan: &mut Loan,
    order_id: U256,
  ) -> Result<(), LedgerError> {
    let before = loan.status;
    if loan.status == LoanStatus::Approved {
      loan.transition(LoanStatus::Active, Utc::now())?;
    }
    match self.gateway.total_due(order_id).await {
      Ok(due) if due.is_zero() => loan.transition(LoanStatus::Repaid, Utc::now())?,
      Ok(_) => {}
      Err(e) => warn!(correlation_id, loan_id = %loan.loan_id, error = %e, "Could not read totalDue after repayment"),
    }
    if loan.status != before {
      self.store.update_loan(loan).await.map_err(LedgerError::store)?;
    }
    Ok(())
  }

  async fn locally_outstanding(&self, loan: &Loan) -> Result<Decimal, LedgerError> {
    let paid: Decimal = self
      .store
      .find_repayments_by_loan(&loan.loan_id)
      .await
      .map_err(LedgerError::store)?
      .iter()
      .filter(|r| r.status == RepaymentStatus::Paid)
      .map(|r| r.amount)
      .sum();
    Ok(loan.amount - paid)
  }

  async fn settle_if_locally_repaid(&self, loan: &mut Loan, now: DateTime<Utc>) -> Result<(), LedgerError> {
    if self.locally_outstanding(loan).await? <= Decimal::ZERO {
      loan.transition(LoanStatus::Repaid, now)?;
      self.store.update_loan(loan).await.map_err(LedgerError::store)?;
    }
    Ok(())
  }

  // ── Liquidation ──────────────────────────────────────

  /// Liquidate the loan's on-chain order and mark the loan DEFAULTED.
  ///
  /// A loan without an on-chain order is defaulted locally and produces
  /// no audit row. A failed liquidation leaves the status unchanged.
  #[instrument(skip_all, fields(correlation_id = %correlation_id, loan_id = %loan_id))]
  pub async fn liquidate_loan(&self, correlation_id: &str, loan_id: &str) -> Result<LiquidationResult, LedgerError> {
    let mut loan = self
      .store
      .find_loan(loan_id)
      .await
      .map_err(LedgerError::store)?
      .ok_or_else(|| LedgerError::LoanNotFound(loan_id.to_string()))?;
    if !matches!(loan.status, LoanStatus::Pending | LoanStatus::Approved | LoanStatus::Active) {
      return Err(LedgerError::InvalidState {
        loan_id: loan.loan_id,
        status: loan.status,
        action: "liquidate",
      });
    }

    let Some(order_id) = chain_order_id(&loan) else {
      loan.transition(LoanStatus::Defaulted, Utc::now())?;
      self.store.update_loan(&loan).await.map_err(LedgerError::store)?;
      info!(correlation_id, loan_id = %loan.loan_id, "Loan without on-chain order defaulted locally");
      let outcome = Outcome::LocalOnly {
        reason: "loan has no usable on-chain order".into(),
      };
      self.metrics.record_outcome("liquidate_loan", outcome.label());
      return Ok(LiquidationResult {
        loan,
        tx_hash: None,
        outcome,
      });
    };

    let call = self.gateway.liquidate(order_id);
    let result = match self.executor.submit(&call).await {
      Ok(confirmed) => {
        let seized = match self.decoder.find_event(&confirmed.receipt, EventKind::OrderLiquidated) {
          Some(DecodedEvent::OrderLiquidated { seized_collateral, .. }) => {
            self.metrics.record_event(EventKind::OrderLiquidated.name());
            units_to_decimal(seized_collateral, self.settings.token_decimals).unwrap_or(loan.collateral_amount)
          }
          _ => {
            warn!(correlation_id, tx_hash = %confirmed.tx_hash, "Confirmed liquidate emitted no OrderLiquidated event");
            self.metrics.record_decode_miss(EventKind::OrderLiquidated.name());
            loan.collateral_amount
          }
        };
        let tx_hash = tx_hash_hex(confirmed.tx_hash);
        loan.transition(LoanStatus::Defaulted, Utc::now())?;
        self.store.update_loan(&loan).await.map_err(LedgerError::store)?;
        let row = LedgerTransaction::confirmed(
          &loan,
          TransactionType::BlockchainLiquidation,
          seized,
          tx_hash.clone(),
          Utc::now(),
        );
        self.store.append_transaction(&row).await.map_err(LedgerError::store)?;
        info!(correlation_id, loan_id = %loan.loan_id, %tx_hash, %seized, "Loan liquidated, marked DEFAULTED");
        LiquidationResult {
          loan,
          tx_hash: Some(tx_hash.clone()),
          outcome: Outcome::Confirmed { tx_hash },
        }
      }
      Err(e) => {
        let failure = ChainFailure::from(e);
        self
          .append_failure(&loan, TransactionType::BlockchainLiquidation, loan.collateral_amount, &failure)
          .await?;
        warn!(
          correlation_id,
          loan_id = %loan.loan_id,
          failure = %failure.kind,
          error = %failure.message,
          "Liquidation failed on-chain"
        );
        LiquidationResult {
          tx_hash: failure.tx_hash.map(tx_hash_hex),
          outcome: failure.outcome(),
          loan,
        }
      }
    };

    self.metrics.record_outcome("liquidate_loan", result.outcome.label());
    Ok(result)
  }

  // ── Allowance status ─────────────────────────────────

  /// Current allowance of the BNPL contract over `payer`'s tokens.
  #[instrument(skip_all, fields(correlation_id = %correlation_id, payer = %payer))]
  pub async fn check_allowance_status(
    &self,
    correlation_id: &str,
    payer: Address,
  ) -> Result<AllowanceSnapshot, LedgerError> {
    let snap = self.allowance.snapshot(payer, self.gateway.bnpl_address()).await?;
    info!(
      correlation_id,
      allowance = %snap.amount,
      balance = %snap.balance,
      has_allowance = snap.has_allowance,
      "Allowance status read"
    );
    Ok(snap)
  }

  // ── Helpers ──────────────────────────────────────────

  async fn lookup_wallet(&self, user_id: &str) -> Result<WalletLookup, LedgerError> {
    self.users.wallet_address(user_id).await.map_err(|e| {
      error!(user_id, error = %format!("{e:#}"), "User directory lookup failed");
      LedgerError::UserDirectory(format!("{e:#}"))
    })
  }

  async fn append_failure(
    &self,
    loan: &Loan,
    tx_type: TransactionType,
    amount: Decimal,
    failure: &ChainFailure,
  ) -> Result<(), LedgerError> {
    let row = LedgerTransaction::failed(
      loan,
      tx_type,
      amount,
      failure.tx_hash.map(tx_hash_hex),
      failure.detail(),
      Utc::now(),
    );
    self.store.append_transaction(&row).await.map_err(LedgerError::store)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  fn loan_with_order(order: Option<&str>) -> Loan {
    let intent = LoanIntent {
      user_id: "u".into(),
      amount: dec!(100),
      interest_rate: dec!(1),
      collateral_amount: dec!(10),
      installments: None,
      merchant: None,
      due_in_seconds: None,
    };
    let mut loan = Loan::pending(&intent, Utc::now());
    loan.blockchain_order_id = order.map(str::to_string);
    loan
  }

  #[test]
  fn test_chain_order_id_skips_sentinel() {
    assert_eq!(chain_order_id(&loan_with_order(None)), None);
    assert_eq!(chain_order_id(&loan_with_order(Some("0"))), None);
    assert_eq!(chain_order_id(&loan_with_order(Some("17"))), Some(U256::from(17u64)));
    assert_eq!(chain_order_id(&loan_with_order(Some("garbage"))), None);
  }

  #[test]
  fn test_tx_hash_is_prefixed_hex() {
    let hex = tx_hash_hex(B256::repeat_byte(0x11));
    assert!(hex.starts_with("0x"));
    assert_eq!(hex.len(), 66);
  }

  #[test]
  fn test_failure_detail_carries_kind() {
    let failure = ChainFailure::from(ExecutionError::EstimationFailed {
      method: "createOrder",
      message: "execution reverted".into(),
    });
    assert!(failure.detail().starts_with("estimation_failed:"));
    assert_eq!(failure.tx_hash, None);
  }
}
