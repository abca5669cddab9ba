//! # Decimal Normalization
//!
//! Conversion between a token's native precision and the 18-digit wad unit
//! used by all internal math. Only the custody boundary calls these.

use crate::constants::{MAX_TOKEN_DECIMALS, WAD_DECIMALS};
use crate::errors::{LedgerError, LedgerResult};

/// 10^(18 - decimals)
fn scale_for(decimals: u8) -> LedgerResult<u128> {
    if decimals > MAX_TOKEN_DECIMALS {
        return Err(LedgerError::PrecisionOverflow);
    }
    Ok(10u128.pow(u32::from(WAD_DECIMALS - decimals)))
}

/// Native amount to wad
pub fn normalize(amount: u128, decimals: u8) -> LedgerResult<u128> {
    let scale = scale_for(decimals)?;
    amount.checked_mul(scale).ok_or(LedgerError::PrecisionOverflow)
}

/// Wad to native amount, truncating sub-native dust
pub fn denormalize(amount: u128, decimals: u8) -> LedgerResult<u128> {
    let scale = scale_for(decimals)?;
    Ok(amount / scale)
}

/// Wad to native amount; fails if the wad carries sub-native dust
pub fn denormalize_exact(amount: u128, decimals: u8) -> LedgerResult<u128> {
    let scale = scale_for(decimals)?;
    if amount % scale != 0 {
        return Err(LedgerError::PrecisionOverflow);
    }
    Ok(amount / scale)
}

/// Part of a wad amount that cannot be represented natively
pub fn dust(amount: u128, decimals: u8) -> LedgerResult<u128> {
    let scale = scale_for(decimals)?;
    Ok(amount % scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WAD;

    #[test]
    fn test_normalize_six_decimals() {
        // 1.5 USDC
        assert_eq!(normalize(1_500_000, 6).unwrap(), 3 * WAD / 2);
        assert_eq!(denormalize(3 * WAD / 2, 6).unwrap(), 1_500_000);
    }

    #[test]
    fn test_zero_and_full_precision() {
        assert_eq!(normalize(7, 0).unwrap(), 7 * WAD);
        assert_eq!(normalize(7, 18).unwrap(), 7);
        assert_eq!(denormalize(7, 18).unwrap(), 7);
    }

    #[test]
    fn test_dust_handling() {
        let amount = WAD + 1;
        assert_eq!(denormalize(amount, 6).unwrap(), 1_000_000);
        assert_eq!(dust(amount, 6).unwrap(), 1);
        assert_eq!(
            denormalize_exact(amount, 6),
            Err(LedgerError::PrecisionOverflow)
        );
    }

    #[test]
    fn test_rejects_excess_decimals() {
        assert_eq!(normalize(1, 19), Err(LedgerError::PrecisionOverflow));
        assert_eq!(
            normalize(u128::MAX, 0),
            Err(LedgerError::PrecisionOverflow)
        );
    }
}
