//! # Leverage Math
//!
//! Entry fee, exposure, liquidation threshold, PnL and holding fee formulas
//! shared by the isolated and cross-margin ledgers. Margin amounts are in
//! quote units, exposure (`leverage_amount`) in base units, prices are wads.

use crate::constants::{BPS_DENOMINATOR, ENTRY_FEE_DIVISOR, SECONDS_PER_HOUR, WAD};
use crate::errors::{LedgerError, LedgerResult};
use crate::math::safe_math::{mul_div, safe_add, safe_div, safe_mul, safe_sub, to_signed, Rounding};
use crate::math::wad::{div_wad, mul_wad, quote_to_base};
use crate::types::Direction;

/// Split an initial margin into `(entry_fee, taxed_margin)`
///
/// `entry_fee = initial_margin * (leverage - 1) / 100`
pub fn entry_fee_split(initial_margin: u128, leverage: u32) -> LedgerResult<(u128, u128)> {
    if leverage == 0 {
        return Err(LedgerError::InvalidParameter("leverage must be at least 1"));
    }
    let multiplier = u128::from(leverage - 1);
    let fee = mul_div(initial_margin, multiplier, ENTRY_FEE_DIVISOR, Rounding::Down)?;
    let taxed = safe_sub(initial_margin, fee)?;
    Ok((fee, taxed))
}

/// Exposure in base units: `taxed_margin * leverage / entry_price`
pub fn leverage_amount(taxed_margin: u128, leverage: u32, entry_price: u128) -> LedgerResult<u128> {
    let notional = safe_mul(taxed_margin, u128::from(leverage))?;
    quote_to_base(notional, entry_price)
}

/// Margin ratio of an isolated position as a wad
///
/// `(taxed + excess) / (taxed * leverage)`; equals `1 / leverage` without excess.
pub fn isolated_margin_ratio(taxed_margin: u128, excess_margin: u128, leverage: u32) -> LedgerResult<u128> {
    let backing = safe_add(taxed_margin, excess_margin)?;
    let notional = safe_mul(taxed_margin, u128::from(leverage))?;
    mul_div(backing, WAD, notional, Rounding::Down)
}

/// Margin ratio of a cross position against the account's available margin
///
/// `available` is quote units (account margin plus the position's taxed
/// margin), converted to position units at `entry_price` and divided by the
/// exposure.
pub fn cross_margin_ratio(available: u128, entry_price: u128, leverage_amount: u128) -> LedgerResult<u128> {
    if leverage_amount == 0 {
        return Err(LedgerError::PrecisionOverflow);
    }
    let available_units = quote_to_base(available, entry_price)?;
    div_wad(available_units, leverage_amount)
}

/// Price at which the margin ratio is exhausted
pub fn liquidation_price(direction: Direction, entry_price: u128, margin_ratio: u128) -> LedgerResult<u128> {
    let delta = mul_wad(entry_price, margin_ratio)?;
    match direction {
        Direction::Long => Ok(entry_price.saturating_sub(delta)),
        Direction::Short => safe_add(entry_price, delta),
    }
}

/// Signed PnL in quote units of `leverage_amount` opened at `entry_price`
pub fn unrealized_pnl(
    direction: Direction,
    leverage_amount: u128,
    entry_price: u128,
    price: u128,
) -> LedgerResult<i128> {
    let (gain, magnitude) = if price >= entry_price {
        (direction == Direction::Long, price - entry_price)
    } else {
        (direction == Direction::Short, entry_price - price)
    };
    let value = to_signed(mul_wad(leverage_amount, magnitude)?)?;
    Ok(if gain { value } else { -value })
}

/// Linear holding fee over whole elapsed hours, capped at `remaining`
pub fn holding_fee(remaining: u128, bps_per_hour: u32, elapsed_seconds: i64) -> LedgerResult<u128> {
    let hours = safe_div(elapsed_seconds.max(0) as u128, SECONDS_PER_HOUR as u128)?;
    let rate = safe_mul(u128::from(bps_per_hour), hours)?;
    if rate >= BPS_DENOMINATOR {
        return Ok(remaining);
    }
    mul_div(remaining, rate, BPS_DENOMINATOR, Rounding::Down)
}

impl Direction {
    /// A limit entry fills once price is at or better than `entry_price`
    pub fn entry_reached(&self, price: u128, entry_price: u128) -> bool {
        match self {
            Direction::Long => price <= entry_price,
            Direction::Short => price >= entry_price,
        }
    }

    pub fn liquidation_reached(&self, price: u128, liquidation_price: u128) -> bool {
        match self {
            Direction::Long => price <= liquidation_price,
            Direction::Short => price >= liquidation_price,
        }
    }

    pub fn take_profit_reached(&self, price: u128, target: u128) -> bool {
        match self {
            Direction::Long => price >= target,
            Direction::Short => price <= target,
        }
    }

    pub fn stop_loss_reached(&self, price: u128, stop: u128) -> bool {
        match self {
            Direction::Long => price <= stop,
            Direction::Short => price >= stop,
        }
    }

    /// Take-profit must sit on the winning side of the entry price
    pub fn valid_take_profit(&self, entry_price: u128, target: u128) -> bool {
        match self {
            Direction::Long => target > entry_price,
            Direction::Short => target < entry_price,
        }
    }

    /// Stop-loss must sit on the losing side of the entry price
    pub fn valid_stop_loss(&self, entry_price: u128, stop: u128) -> bool {
        match self {
            Direction::Long => stop < entry_price,
            Direction::Short => stop > entry_price,
        }
    }
}
