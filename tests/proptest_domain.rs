//! Property-Based Tests - Domain Layer Invariants
//!
//! Uses `proptest` to check the arithmetic and state rules the ledger
//! relies on across random inputs.

use alloy::primitives::{Address, Log, U256};
use alloy::sol_types::SolEvent;
use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;

use bnpl_ledger::domain::abi::IBnpl;
use bnpl_ledger::domain::records::{LoanIntent, LoanStatus};
use bnpl_ledger::domain::units::{decimal_to_units, format_token_amount, parse_token_amount, units_to_decimal};
use bnpl_ledger::ports::TxReceipt;
use bnpl_ledger::usecases::{EventDecoder, buffered_gas_limit};

const ALL_STATUSES: [LoanStatus; 6] = [
    LoanStatus::Pending,
    LoanStatus::Approved,
    LoanStatus::Active,
    LoanStatus::Repaid,
    LoanStatus::Defaulted,
    LoanStatus::Failed,
];

// ── Gas Buffer Properties ───────────────────────────────────

proptest! {
    /// The 20% buffer is exactly ceil(estimate * 1.2).
    #[test]
    fn gas_buffer_is_ceiling_of_twenty_percent(estimate in 0u64..10_000_000_000) {
        let limit = buffered_gas_limit(estimate, 20);
        let expected = (u128::from(estimate) * 120).div_ceil(100);
        prop_assert_eq!(u128::from(limit), expected);
    }

    /// Buffered limit never undercuts the estimate, for any buffer.
    #[test]
    fn gas_buffer_never_below_estimate(estimate in any::<u64>(), buffer in 0u32..500) {
        prop_assert!(buffered_gas_limit(estimate, buffer) >= estimate);
    }
}

// ── Unit Conversion Properties ──────────────────────────────

proptest! {
    /// Rendering then parsing a raw amount gives the same amount back.
    #[test]
    fn formatted_amount_parses_back(raw in any::<u64>(), decimals in 1u8..=18) {
        let rendered = format_token_amount(U256::from(raw), decimals).unwrap();
        prop_assert_eq!(parse_token_amount(&rendered, decimals).unwrap(), U256::from(raw));
    }

    /// Whole-cent ledger amounts convert to units without loss.
    #[test]
    fn cent_amounts_are_exact_at_six_decimals(cents in 0i64..1_000_000_000_000) {
        let amount = Decimal::new(cents, 2);
        let units = decimal_to_units(amount, 6).unwrap();
        prop_assert_eq!(units, U256::from(cents as u64) * U256::from(10_000u64));
        prop_assert_eq!(units_to_decimal(units, 6).unwrap(), amount);
    }
}

// ── Loan Lifecycle Properties ───────────────────────────────

proptest! {
    /// REPAID and DEFAULTED have no way out.
    #[test]
    fn terminal_statuses_have_no_exits(from in 0usize..6, to in 0usize..6) {
        let (from, to) = (ALL_STATUSES[from], ALL_STATUSES[to]);
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
    }

    /// FAILED only ever leads back to APPROVED.
    #[test]
    fn failed_only_reopens_to_approved(to in 0usize..6) {
        let to = ALL_STATUSES[to];
        prop_assert_eq!(LoanStatus::Failed.can_transition_to(to), to == LoanStatus::Approved);
    }

    /// A validated intent always produces a PENDING loan without an order.
    #[test]
    fn valid_intents_open_pending_loans(
        amount_cents in 2i64..100_000_000,
        collateral_pct in 1i64..99,
        rate in 0i64..100,
    ) {
        let amount = Decimal::new(amount_cents, 2);
        let collateral = (amount * Decimal::new(collateral_pct, 2)).round_dp(2);
        prop_assume!(collateral >= Decimal::new(1, 2) && collateral < amount);
        let intent = LoanIntent {
            user_id: "prop".into(),
            amount,
            interest_rate: Decimal::from(rate),
            collateral_amount: collateral,
            installments: None,
            merchant: None,
            due_in_seconds: None,
        };
        prop_assert!(intent.validate().is_ok());

        let loan = bnpl_ledger::domain::records::Loan::pending(&intent, Utc::now());
        prop_assert_eq!(loan.status, LoanStatus::Pending);
        prop_assert!(loan.blockchain_order_id.is_none());
    }
}

// ── Event Decoding Properties ───────────────────────────────

proptest! {
    /// The order id is read from the first OrderCreated log emitted by
    /// the watched contract, whatever other contracts log around it.
    #[test]
    fn created_order_id_ignores_foreign_logs(id in any::<u64>(), noise in 0usize..5) {
        let contract = Address::repeat_byte(0x11);
        let foreign = Address::repeat_byte(0x22);
        let event = IBnpl::OrderCreated {
            id: U256::from(id),
            buyer: Address::repeat_byte(0x33),
            merchant: Address::repeat_byte(0x44),
            principal: U256::from(1_000u64),
            collateral: U256::from(200u64),
            totalFee: U256::from(50u64),
            dueAt: U256::from(1_700_000_000u64),
            installments: U256::from(4u64),
        };
        let decoy = IBnpl::OrderCreated { id: U256::from(id) + U256::from(1u64), ..event.clone() };
        let mut logs: Vec<Log> = (0..noise)
            .map(|_| Log { address: foreign, data: decoy.encode_log_data() })
            .collect();
        logs.push(Log { address: contract, data: event.encode_log_data() });

        let receipt = TxReceipt {
            tx_hash: Default::default(),
            status: true,
            gas_used: 0,
            block_number: None,
            logs,
        };
        prop_assert_eq!(EventDecoder::new(contract).created_order_id(&receipt), Some(U256::from(id)));
    }
}
