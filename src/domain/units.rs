//! Token-unit conversion.
//!
//! On-chain amounts are integers in the token's smallest unit. The local
//! ledger keeps `Decimal` amounts in human units. These helpers are the
//! only place the two representations meet.

use std::str::FromStr;

use alloy::primitives::U256;
use alloy::primitives::utils::{format_units, parse_units};
use rust_decimal::Decimal;
use thiserror::Error;

/// Decimals of the stablecoin the BNPL contract settles in.
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount must not be negative: {0}")]
    Negative(String),
    #[error("invalid token amount {amount:?}: {reason}")]
    Invalid { amount: String, reason: String },
    #[error("amount {0} does not fit a decimal")]
    Overflow(String),
}

/// Render a raw on-chain amount in human units.
///
/// Trailing zeros are trimmed but at least one fractional digit is kept,
/// so `1_500_000` with 6 decimals renders as `"1.5"` and `2_000_000` as `"2.0"`.
pub fn format_token_amount(raw: U256, decimals: u8) -> Result<String, AmountError> {
    let rendered = format_units(raw, decimals).map_err(|e| AmountError::Invalid {
        amount: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(trim_fraction(rendered))
}

/// Parse a human amount (e.g. `"12.34"`) into the smallest token unit.
pub fn parse_token_amount(human: &str, decimals: u8) -> Result<U256, AmountError> {
    let trimmed = human.trim();
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative(trimmed.to_string()));
    }
    let parsed = parse_units(trimmed, decimals).map_err(|e| AmountError::Invalid {
        amount: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    Ok(parsed.get_absolute())
}

/// Convert a ledger amount to smallest units, rounding to the token's precision.
pub fn decimal_to_units(amount: Decimal, decimals: u8) -> Result<U256, AmountError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative(amount.to_string()));
    }
    let rounded = amount.round_dp(u32::from(decimals)).normalize();
    parse_token_amount(&rounded.to_string(), decimals)
}

/// Convert a raw on-chain amount to a ledger `Decimal`.
pub fn units_to_decimal(raw: U256, decimals: u8) -> Result<Decimal, AmountError> {
    let rendered = format_token_amount(raw, decimals)?;
    Decimal::from_str(&rendered).map_err(|_| AmountError::Overflow(rendered))
}

fn trim_fraction(rendered: String) -> String {
    match rendered.split_once('.') {
        Some((int, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{int}.0")
            } else {
                format!("{int}.{frac}")
            }
        }
        None => format!("{rendered}.0"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_trims_trailing_zeros() {
        assert_eq!(format_token_amount(U256::from(1_500_000u64), 6).unwrap(), "1.5");
        assert_eq!(format_token_amount(U256::from(2_000_000u64), 6).unwrap(), "2.0");
        assert_eq!(format_token_amount(U256::ZERO, 6).unwrap(), "0.0");
        assert_eq!(format_token_amount(U256::from(1u64), 6).unwrap(), "0.000001");
    }

    #[test]
    fn test_parse_human_amount() {
        assert_eq!(parse_token_amount("500", 6).unwrap(), U256::from(500_000_000u64));
        assert_eq!(parse_token_amount("0.01", 6).unwrap(), U256::from(10_000u64));
    }

    #[test]
    fn test_parse_rejects_negative_and_garbage() {
        assert!(matches!(parse_token_amount("-1", 6), Err(AmountError::Negative(_))));
        assert!(matches!(parse_token_amount("abc", 6), Err(AmountError::Invalid { .. })));
    }

    #[test]
    fn test_decimal_rounds_to_token_precision() {
        assert_eq!(
            decimal_to_units(dec!(1.2345678), 6).unwrap(),
            U256::from(1_234_568u64)
        );
        assert_eq!(decimal_to_units(dec!(250), 6).unwrap(), U256::from(250_000_000u64));
    }

    #[test]
    fn test_units_to_decimal() {
        assert_eq!(units_to_decimal(U256::from(12_340_000u64), 6).unwrap(), dec!(12.34));
    }
}
