//! # Price Oracle
//!
//! Prices come from a constant-product pool's reserves: `price = quote / base`
//! as a wad. Zero reserves or a missing pool surface as `StalePrice` and
//! abort the calling operation.

use std::collections::BTreeMap;

use margin_core::math::{base_to_quote, price_from_reserves};
use margin_core::{LedgerError, LedgerResult, TokenId};

/// Source of pool reserves
pub trait PriceOracle {
    /// Reserves `(base, quote)` of the pool pricing `base` in `quote`, both wads
    fn reserves(&self, base: TokenId, quote: TokenId) -> LedgerResult<(u128, u128)>;

    /// Price of one `base` in `quote` as a wad
    fn price(&self, base: TokenId, quote: TokenId) -> LedgerResult<u128> {
        let (reserve_base, reserve_quote) = self.reserves(base, quote)?;
        price_from_reserves(reserve_base, reserve_quote)
    }

    /// Value of `amount` of `from` expressed in `to`
    fn convert(&self, amount: u128, from: TokenId, to: TokenId) -> LedgerResult<u128> {
        if from == to {
            return Ok(amount);
        }
        base_to_quote(amount, self.price(from, to)?)
    }
}

/// Oracle backed by a table of reserves, readable in either orientation
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    reserves: BTreeMap<(TokenId, TokenId), (u128, u128)>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reserves of the `base`/`quote` pool
    pub fn set_reserves(&mut self, base: TokenId, quote: TokenId, reserve_base: u128, reserve_quote: u128) {
        self.reserves.remove(&(quote, base));
        self.reserves.insert((base, quote), (reserve_base, reserve_quote));
    }

    /// Drop a pool so reads fail as stale
    pub fn remove(&mut self, base: TokenId, quote: TokenId) {
        self.reserves.remove(&(base, quote));
        self.reserves.remove(&(quote, base));
    }
}

impl PriceOracle for StaticOracle {
    fn reserves(&self, base: TokenId, quote: TokenId) -> LedgerResult<(u128, u128)> {
        if let Some(&(reserve_base, reserve_quote)) = self.reserves.get(&(base, quote)) {
            return Ok((reserve_base, reserve_quote));
        }
        self.reserves
            .get(&(quote, base))
            .map(|&(reserve_quote, reserve_base)| (reserve_base, reserve_quote))
            .ok_or(LedgerError::StalePrice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use margin_core::WAD;

    const ETH: TokenId = TokenId(1);
    const USDC: TokenId = TokenId(2);

    #[test]
    fn test_price_in_both_orientations() {
        let mut oracle = StaticOracle::new();
        oracle.set_reserves(ETH, USDC, 10 * WAD, 1_000 * WAD);

        assert_eq!(oracle.price(ETH, USDC).unwrap(), 100 * WAD);
        assert_eq!(oracle.price(USDC, ETH).unwrap(), WAD / 100);
        assert_eq!(oracle.convert(2 * WAD, ETH, USDC).unwrap(), 200 * WAD);
    }

    #[test]
    fn test_missing_or_empty_pool_is_stale() {
        let mut oracle = StaticOracle::new();
        assert_eq!(oracle.price(ETH, USDC), Err(LedgerError::StalePrice));

        oracle.set_reserves(ETH, USDC, 0, 1_000 * WAD);
        assert_eq!(oracle.price(ETH, USDC), Err(LedgerError::StalePrice));

        oracle.set_reserves(ETH, USDC, 10 * WAD, 1_000 * WAD);
        oracle.remove(USDC, ETH);
        assert_eq!(oracle.price(ETH, USDC), Err(LedgerError::StalePrice));
    }
}
