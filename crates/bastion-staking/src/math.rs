// crates/bastion-staking/src/math.rs
//
// Fixed-precision share arithmetic.
//
// Shares are `Decimal`s truncated to SHARE_PRECISION fractional digits after
// every conversion; token amounts are whole base units. Conversions
// that credit shares or pay out tokens round toward zero, so a conversion
// never credits more than was paid in. Token-denominated unbond requests
// round to the nearest share instead and are then capped at the delegation.
//
// `Decimal` carries at most 28 to 29 significant digits (a 96-bit mantissa).
// Truncation to 18 digits is exact only while a quotient stays below about
// 7.9e9, where the division still produces a 19th fractional digit. Above
// that the 18th digit comes from the division's own rounding and may sit
// one unit (1e-18 share) high.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use bastion_core::Amount;

use crate::error::StakingError;

/// Number of fractional digits kept on share quantities.
pub const SHARE_PRECISION: u32 = 18;

/// Truncate a decimal to `SHARE_PRECISION` fractional digits.
pub fn truncate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SHARE_PRECISION, RoundingStrategy::ToZero)
}

/// Round a decimal to `SHARE_PRECISION` fractional digits, ties to even.
pub fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SHARE_PRECISION, RoundingStrategy::MidpointNearestEven)
}

/// `value * numerator / denominator`, multiplying first when the product fits
/// and dividing first otherwise. The result is not truncated.
pub fn mul_div(
    value: Decimal,
    numerator: Decimal,
    denominator: Decimal,
) -> Result<Decimal, StakingError> {
    if denominator.is_zero() {
        return Err(StakingError::ArithmeticOverflow("division by zero"));
    }
    if let Some(product) = value.checked_mul(numerator) {
        return product
            .checked_div(denominator)
            .ok_or(StakingError::ArithmeticOverflow("mul_div"));
    }
    numerator
        .checked_div(denominator)
        .and_then(|ratio| value.checked_mul(ratio))
        .ok_or(StakingError::ArithmeticOverflow("mul_div"))
}

/// Floor a non-negative decimal into a token amount.
pub fn floor_amount(value: Decimal) -> Result<Amount, StakingError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(StakingError::Corrupted(format!(
            "negative token quantity {}",
            value
        )));
    }
    value
        .trunc()
        .to_u64()
        .ok_or(StakingError::ArithmeticOverflow("decimal to amount"))
}

pub fn checked_add(a: Amount, b: Amount, what: &'static str) -> Result<Amount, StakingError> {
    a.checked_add(b).ok_or(StakingError::ArithmeticOverflow(what))
}

pub fn checked_sub(a: Amount, b: Amount, what: &'static str) -> Result<Amount, StakingError> {
    a.checked_sub(b).ok_or(StakingError::ArithmeticOverflow(what))
}
