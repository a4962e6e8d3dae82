//! On-chain Views - Authoritative Contract State
//!
//! Rust-native mirrors of what the BNPL and token contracts return.
//! Every numeric field stays a `U256`; the only conversion to human
//! units goes through `domain::units`.

use alloy::primitives::{Address, U256};
use serde::Serialize;

use super::abi::IBnpl;
use super::errors::ConfigurationError;

/// A single BNPL order as stored by the contract.
///
/// Owned exclusively by the contract. The engine only reads it and
/// changes it through transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BnplOrder {
    pub buyer: Address,
    pub merchant: Address,
    pub principal: U256,
    pub collateral: U256,
    pub total_fee: U256,
    pub created_at: U256,
    pub due_at: U256,
    pub installments: U256,
    pub nominal_principal: U256,
    pub nominal_fee: U256,
    pub paid_principal: U256,
    pub paid_fee: U256,
    pub paid_installments: U256,
    pub closed: bool,
}

impl BnplOrder {
    /// Principal plus fee still owed, saturating at zero.
    pub fn outstanding(&self) -> U256 {
        let owed = self.principal.saturating_add(self.total_fee);
        let paid = self.paid_principal.saturating_add(self.paid_fee);
        owed.saturating_sub(paid)
    }
}

impl From<IBnpl::Order> for BnplOrder {
    fn from(o: IBnpl::Order) -> Self {
        Self {
            buyer: o.buyer,
            merchant: o.merchant,
            principal: o.principal,
            collateral: o.collateral,
            total_fee: o.totalFee,
            created_at: o.createdAt,
            due_at: o.dueAt,
            installments: o.installments,
            nominal_principal: o.nominalPrincipal,
            nominal_fee: o.nominalFee,
            paid_principal: o.paidPrincipal,
            paid_fee: o.paidFee,
            paid_installments: o.paidInstallments,
            closed: o.closed,
        }
    }
}

/// Collateral and fee the contract would charge for a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub collateral_required: U256,
    pub total_fee: U256,
}

impl Quote {
    /// Amount the contract pulls from the buyer when the order is created.
    pub fn upfront_amount(&self) -> U256 {
        self.collateral_required.saturating_add(self.total_fee)
    }
}

/// Credit tier (collateral/fee basis points by minimum score).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tier {
    pub min_score: U256,
    pub collateral_bps: u16,
    pub fee_bps: u16,
    pub max_loan: U256,
}

impl From<IBnpl::Tier> for Tier {
    fn from(t: IBnpl::Tier) -> Self {
        Self {
            min_score: t.minScore,
            collateral_bps: t.collateralBps,
            fee_bps: t.feeBps,
            max_loan: t.maxLoan,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NominalInstallment {
    pub principal_part: U256,
    pub fee_part: U256,
}

/// Allowance state for one owner/spender pair.
///
/// Recomputed before every value-moving call and never cached,
/// since the owner can change it out-of-band at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowanceSnapshot {
    pub owner: Address,
    pub spender: Address,
    pub amount: U256,
    pub balance: U256,
    pub has_allowance: bool,
    pub has_balance: bool,
}

impl AllowanceSnapshot {
    pub fn new(owner: Address, spender: Address, amount: U256, balance: U256) -> Self {
        Self {
            owner,
            spender,
            amount,
            balance,
            has_allowance: amount > U256::ZERO,
            has_balance: balance > U256::ZERO,
        }
    }

    /// Whether the current allowance already covers `required`.
    pub fn covers(&self, required: U256) -> bool {
        self.amount >= required
    }
}

/// ERC-20 metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

impl TokenInfo {
    /// Amounts are scaled with the configured decimals, so they must match the token.
    pub fn ensure_decimals(&self, configured: u8) -> Result<(), ConfigurationError> {
        if self.decimals == configured {
            Ok(())
        } else {
            Err(ConfigurationError::TokenDecimalsMismatch {
                configured,
                actual: self.decimals,
            })
        }
    }
}

/// Node and deployment identity, as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub chain_id: u64,
    pub signer: Address,
    pub bnpl_contract: Address,
    pub token_contract: Address,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(principal: u64, fee: u64, paid_p: u64, paid_f: u64) -> BnplOrder {
        BnplOrder {
            buyer: Address::ZERO,
            merchant: Address::ZERO,
            principal: U256::from(principal),
            collateral: U256::ZERO,
            total_fee: U256::from(fee),
            created_at: U256::ZERO,
            due_at: U256::ZERO,
            installments: U256::from(1u64),
            nominal_principal: U256::from(principal),
            nominal_fee: U256::from(fee),
            paid_principal: U256::from(paid_p),
            paid_fee: U256::from(paid_f),
            paid_installments: U256::ZERO,
            closed: false,
        }
    }

    #[test]
    fn test_outstanding_subtracts_payments() {
        assert_eq!(order(1000, 50, 400, 20).outstanding(), U256::from(630u64));
    }

    #[test]
    fn test_outstanding_saturates_on_overpayment() {
        assert_eq!(order(100, 0, 150, 0).outstanding(), U256::ZERO);
    }

    #[test]
    fn test_quote_upfront_amount() {
        let q = Quote {
            collateral_required: U256::from(400u64),
            total_fee: U256::from(100u64),
        };
        assert_eq!(q.upfront_amount(), U256::from(500u64));
    }

    #[test]
    fn test_allowance_snapshot_flags() {
        let snap = AllowanceSnapshot::new(Address::ZERO, Address::ZERO, U256::ZERO, U256::from(5u64));
        assert!(!snap.has_allowance);
        assert!(snap.has_balance);
        assert!(!snap.covers(U256::from(1u64)));
        assert!(snap.covers(U256::ZERO));
    }

    #[test]
    fn test_token_decimals_must_match_config() {
        let usdc = TokenInfo {
            name: "USD Coin".into(),
            symbol: "USDC".into(),
            decimals: 6,
            total_supply: U256::ZERO,
        };
        assert!(usdc.ensure_decimals(6).is_ok());
        assert!(matches!(
            usdc.ensure_decimals(18),
            Err(ConfigurationError::TokenDecimalsMismatch {
                configured: 18,
                actual: 6
            })
        ));
    }
}
