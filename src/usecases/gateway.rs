//! Contract Gateway - Typed Facade over the BNPL and Token Contracts
//!
//! Reads go straight through the `ChainClient` and come back as domain
//! views; failures surface as `ChainReadError` and are never swallowed.
//! Writes are only *built* here: each returns a `ChainCall` that the
//! `TransactionExecutor` estimates, buffers, submits and confirms.
//!
//! All numeric values stay `U256`. Human-unit conversion happens only in
//! `domain::units`.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol_types::SolCall;
use futures_util::future::try_join_all;
use tracing::debug;

use crate::domain::abi::{IBnpl, IErc20};
use crate::domain::errors::ChainReadError;
use crate::domain::order::{BnplOrder, NetworkInfo, NominalInstallment, Quote, Tier, TokenInfo};
use crate::ports::chain_client::{ChainCall, ChainClient};

/// `"getOrder(uint256)"` -> `"getOrder"`.
fn method_name(signature: &'static str) -> &'static str {
  signature.split('(').next().unwrap_or(signature)
}

/// Typed access to one deployed BNPL contract and its settlement token.
#[derive(Clone)]
pub struct ContractGateway {
  chain: Arc<dyn ChainClient>,
  bnpl: Address,
  /// ERC-20 the BNPL contract pulls collateral and repayments in.
  token: Address,
}

impl ContractGateway {
  pub fn new(chain: Arc<dyn ChainClient>, bnpl: Address, token: Address) -> Self {
    Self { chain, bnpl, token }
  }

  pub fn chain(&self) -> &Arc<dyn ChainClient> {
    &self.chain
  }

  pub fn bnpl_address(&self) -> Address {
    self.bnpl
  }

  pub fn token_address(&self) -> Address {
    self.token
  }

  pub fn signer_address(&self) -> Address {
    self.chain.signer_address()
  }

  async fn read<T: SolCall>(&self, to: Address, call: T) -> Result<T::Return, ChainReadError> {
    let method = method_name(T::SIGNATURE);
    let request = ChainCall::new(method, to, call.abi_encode());
    let raw = self
      .chain
      .call(&request)
      .await
      .map_err(|e| ChainReadError::Rpc {
        method,
        message: format!("{e:#}"),
      })?;
    debug!(method, to = %to, bytes = raw.len(), "Contract read");
    T::abi_decode_returns(&raw, true).map_err(|e| ChainReadError::Decode {
      method,
      message: e.to_string(),
    })
  }

  fn write<T: SolCall>(&self, to: Address, call: T) -> ChainCall {
    ChainCall::new(method_name(T::SIGNATURE), to, call.abi_encode())
  }

  // ── BNPL reads ───────────────────────────────────────

  pub async fn get_order(&self, id: U256) -> Result<BnplOrder, ChainReadError> {
    let ret = self.read(self.bnpl, IBnpl::getOrderCall { id }).await?;
    Ok(ret._0.into())
  }

  pub async fn quote(&self, purchase_amount: U256, buyer: Address) -> Result<Quote, ChainReadError> {
    let ret = self
      .read(
        self.bnpl,
        IBnpl::quoteCall {
          purchaseAmount: purchase_amount,
          buyer,
        },
      )
      .await?;
    Ok(Quote {
      collateral_required: ret.collateralRequired,
      total_fee: ret.totalFee,
    })
  }

  pub async fn credit_score(&self, who: Address) -> Result<u16, ChainReadError> {
    Ok(self.read(self.bnpl, IBnpl::creditScoreCall { who }).await?._0)
  }

  pub async fn available_liquidity(&self) -> Result<U256, ChainReadError> {
    Ok(self.read(self.bnpl, IBnpl::availableLiquidityCall {}).await?._0)
  }

  pub async fn total_due(&self, id: U256) -> Result<U256, ChainReadError> {
    Ok(self.read(self.bnpl, IBnpl::totalDueCall { id }).await?._0)
  }

  pub async fn tier(&self, index: U256) -> Result<Tier, ChainReadError> {
    Ok(self.read(self.bnpl, IBnpl::tiersCall { index }).await?._0.into())
  }

  pub async fn tiers_count(&self) -> Result<U256, ChainReadError> {
    Ok(self.read(self.bnpl, IBnpl::getTiersCountCall {}).await?._0)
  }

  /// Every configured tier, read concurrently.
  pub async fn all_tiers(&self) -> Result<Vec<Tier>, ChainReadError> {
    let count = self.tiers_count().await?;
    let count = u64::try_from(count).map_err(|_| ChainReadError::Decode {
      method: "getTiersCount",
      message: format!("tier count {count} out of range"),
    })?;
    try_join_all((0..count).map(|i| self.tier(U256::from(i)))).await
  }

  pub async fn nominal_installment(&self, id: U256) -> Result<NominalInstallment, ChainReadError> {
    let ret = self.read(self.bnpl, IBnpl::nominalInstallmentCall { id }).await?;
    Ok(NominalInstallment {
      principal_part: ret.principalPart,
      fee_part: ret.feePart,
    })
  }

  // ── Token reads ──────────────────────────────────────

  pub async fn token_balance(&self, owner: Address) -> Result<U256, ChainReadError> {
    Ok(self.read(self.token, IErc20::balanceOfCall { account: owner }).await?._0)
  }

  pub async fn token_allowance(&self, owner: Address, spender: Address) -> Result<U256, ChainReadError> {
    Ok(self.read(self.token, IErc20::allowanceCall { owner, spender }).await?._0)
  }

  pub async fn token_info(&self) -> Result<TokenInfo, ChainReadError> {
    let (name, symbol, decimals, total_supply) = tokio::try_join!(
      self.read(self.token, IErc20::nameCall {}),
      self.read(self.token, IErc20::symbolCall {}),
      self.read(self.token, IErc20::decimalsCall {}),
      self.read(self.token, IErc20::totalSupplyCall {}),
    )?;
    Ok(TokenInfo {
      name: name._0,
      symbol: symbol._0,
      decimals: decimals._0,
      total_supply: total_supply._0,
    })
  }

  pub async fn network_info(&self) -> Result<NetworkInfo, ChainReadError> {
    let chain_id = self.chain.chain_id().await.map_err(|e| ChainReadError::Rpc {
      method: "eth_chainId",
      message: format!("{e:#}"),
    })?;
    Ok(NetworkInfo {
      chain_id,
      signer: self.signer_address(),
      bnpl_contract: self.bnpl,
      token_contract: self.token,
    })
  }

  // ── BNPL writes ──────────────────────────────────────

  pub fn create_order(
    &self,
    purchase_amount: U256,
    merchant: Address,
    due_at: U256,
    installments: U256,
  ) -> ChainCall {
    self.write(
      self.bnpl,
      IBnpl::createOrderCall {
        purchaseAmount: purchase_amount,
        merchant,
        dueAt: due_at,
        installments,
      },
    )
  }

  pub fn repay_installment(&self, id: U256, amount: U256) -> ChainCall {
    self.write(self.bnpl, IBnpl::repayInstallmentCall { id, amount })
  }

  pub fn repay_full(&self, id: U256) -> ChainCall {
    self.write(self.bnpl, IBnpl::repayFullCall { id })
  }

  pub fn liquidate(&self, id: U256) -> ChainCall {
    self.write(self.bnpl, IBnpl::liquidateCall { id })
  }

  // ── Admin writes ─────────────────────────────────────

  pub fn fund_liquidity(&self, amount: U256) -> ChainCall {
    self.write(self.bnpl, IBnpl::fundLiquidityCall { amount })
  }

  pub fn withdraw_liquidity(&self, to: Address, amount: U256) -> ChainCall {
    self.write(self.bnpl, IBnpl::withdrawLiquidityCall { to, amount })
  }

  pub fn set_credit_score(&self, who: Address, score: u16) -> ChainCall {
    self.write(self.bnpl, IBnpl::setCreditScoreCall { who, score })
  }

  pub fn set_tier(
    &self,
    idx: U256,
    min_score: U256,
    collateral_bps: u16,
    fee_bps: u16,
    max_loan: U256,
  ) -> ChainCall {
    self.write(
      self.bnpl,
      IBnpl::setTierCall {
        idx,
        minScore: min_score,
        collateralBps: collateral_bps,
        feeBps: fee_bps,
        maxLoan: max_loan,
      },
    )
  }

  // ── Token writes ─────────────────────────────────────

  pub fn approve(&self, spender: Address, amount: U256) -> ChainCall {
    self.write(self.token, IErc20::approveCall { spender, amount })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_method_name_strips_arguments() {
    assert_eq!(method_name("getOrder(uint256)"), "getOrder");
    assert_eq!(method_name("availableLiquidity()"), "availableLiquidity");
    assert_eq!(method_name("noparens"), "noparens");
  }
}
