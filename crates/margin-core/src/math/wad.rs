//! # Wad Fixed-Point Arithmetic
//!
//! Amounts and prices are `u128` values scaled by 10^18. Prices are quoted
//! as units of quote token per unit of base token.

use crate::constants::WAD;
use crate::errors::{LedgerError, LedgerResult};
use crate::math::safe_math::{mul_div, Rounding};

/// Convert an integer to a wad
pub fn to_wad(value: u128) -> LedgerResult<u128> {
    value.checked_mul(WAD).ok_or(LedgerError::PrecisionOverflow)
}

/// Multiply two wads
pub fn mul_wad(a: u128, b: u128) -> LedgerResult<u128> {
    mul_div(a, b, WAD, Rounding::Down)
}

/// Divide two wads
pub fn div_wad(a: u128, b: u128) -> LedgerResult<u128> {
    mul_div(a, WAD, b, Rounding::Down)
}

/// Price from pool reserves: `reserve_quote / reserve_base` as a wad
pub fn price_from_reserves(reserve_base: u128, reserve_quote: u128) -> LedgerResult<u128> {
    if reserve_base == 0 || reserve_quote == 0 {
        return Err(LedgerError::StalePrice);
    }
    let price = mul_div(reserve_quote, WAD, reserve_base, Rounding::Down)?;
    if price == 0 {
        return Err(LedgerError::StalePrice);
    }
    Ok(price)
}

/// Value of a base-token amount in quote units at `price`
pub fn base_to_quote(base_amount: u128, price: u128) -> LedgerResult<u128> {
    mul_wad(base_amount, price)
}

/// Amount of base token worth `quote_amount` at `price`
pub fn quote_to_base(quote_amount: u128, price: u128) -> LedgerResult<u128> {
    if price == 0 {
        return Err(LedgerError::StalePrice);
    }
    div_wad(quote_amount, price)
}
