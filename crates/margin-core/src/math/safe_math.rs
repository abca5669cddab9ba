//! # Safe Math Operations
//!
//! Overflow-checked arithmetic on normalized amounts. Every failure maps to
//! `PrecisionOverflow` so callers abort instead of wrapping.

use ethnum::U256;

use crate::constants::BPS_DENOMINATOR;
use crate::errors::{LedgerError, LedgerResult};

/// Macro to generate safe arithmetic functions
macro_rules! safe_arith {
    // Division operations with zero check
    (div, $fn_name:ident, $type:ty) => {
        pub fn $fn_name(a: $type, b: $type) -> LedgerResult<$type> {
            if b == 0 {
                return Err(LedgerError::PrecisionOverflow);
            }
            Ok(a / b)
        }
    };

    // Binary operations with checked methods
    ($fn_name:ident, $type:ty, $checked_method:ident) => {
        pub fn $fn_name(a: $type, b: $type) -> LedgerResult<$type> {
            a.$checked_method(b).ok_or(LedgerError::PrecisionOverflow)
        }
    };
}

safe_arith!(safe_add, u128, checked_add);
safe_arith!(safe_sub, u128, checked_sub);
safe_arith!(safe_mul, u128, checked_mul);
safe_arith!(div, safe_div, u128);

/// Rounding mode for division operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round down (towards zero)
    Down,
    /// Round up (away from zero)
    Up,
}

/// `a * b / denominator` with a 256-bit intermediate product
pub fn mul_div(a: u128, b: u128, denominator: u128, rounding: Rounding) -> LedgerResult<u128> {
    if denominator == 0 {
        return Err(LedgerError::PrecisionOverflow);
    }

    let product = U256::from(a) * U256::from(b);
    let denom = U256::from(denominator);
    let mut quotient = product / denom;

    if rounding == Rounding::Up && product % denom != U256::ZERO {
        quotient += U256::ONE;
    }

    if quotient > U256::from(u128::MAX) {
        return Err(LedgerError::PrecisionOverflow);
    }
    Ok(quotient.as_u128())
}

/// Apply basis points to an amount, rounding down
pub fn apply_bps(amount: u128, bps: u128) -> LedgerResult<u128> {
    mul_div(amount, bps, BPS_DENOMINATOR, Rounding::Down)
}

/// Convert an unsigned amount to a signed one
pub fn to_signed(value: u128) -> LedgerResult<i128> {
    i128::try_from(value).map_err(|_| LedgerError::PrecisionOverflow)
}
