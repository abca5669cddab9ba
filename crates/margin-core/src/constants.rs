//! # Ledger Constants
//!
//! Fundamental constants for the margin ledger including:
//! - Fixed-point scale (wad) and decimal bounds
//! - Leverage and entry fee parameters
//! - Holding fee and compensation defaults

// ============================================================================
// Fixed-Point Constants
// ============================================================================

/// Number of fractional decimal digits in a normalized amount
pub const WAD_DECIMALS: u8 = 18;

/// Wad scale factor: 10^18
pub const WAD: u128 = 1_000_000_000_000_000_000;

/// Largest native precision a token may declare
pub const MAX_TOKEN_DECIMALS: u8 = WAD_DECIMALS;

/// Basis points denominator (10,000 = 100%)
pub const BPS_DENOMINATOR: u128 = 10_000;

// ============================================================================
// Leverage Constants
// ============================================================================

/// Smallest accepted leverage multiplier
pub const MIN_LEVERAGE: u32 = 1;

/// Default upper bound on leverage; entry fee reaches 99% of margin here
pub const DEFAULT_MAX_LEVERAGE: u32 = 100;

/// Entry fee is `margin * (leverage - 1) / ENTRY_FEE_DIVISOR`
pub const ENTRY_FEE_DIVISOR: u128 = 100;

// ============================================================================
// Fee and Time Constants
// ============================================================================

/// Holding fee charged on close of an active position: 0.1% per hour
pub const DEFAULT_HOLDING_FEE_BPS_PER_HOUR: u32 = 10;

/// Seconds per hour for holding fee accrual
pub const SECONDS_PER_HOUR: i64 = 3_600;

/// Default share of the paired token's surplus usable for withdrawal compensation
pub const DEFAULT_MAX_COMPENSATION_BPS: u32 = 10_000;
