//! # Token Custody
//!
//! Abstraction over the token transfer layer. Amounts crossing this trait
//! are wads; native precision only matters where funds enter or leave the
//! system through an external account:
//!
//! - Inbound transfers (account to pool or fee vault) must be exactly
//!   representable in native units, otherwise `PrecisionOverflow`
//! - Outbound transfers (to an account) are truncated to native precision;
//!   the dust stays with the sender
//! - Pool and fee vault balances are kept at full wad precision

use std::collections::BTreeMap;

use margin_core::math::{denormalize, dust, normalize, safe_add, safe_sub};
use margin_core::{Holder, LedgerError, LedgerResult, RecordKind, TokenId, MAX_TOKEN_DECIMALS};
use tracing::trace;

/// Token movement primitives used by the liquidity pool
pub trait Custody {
    /// Native precision of `token`
    fn decimals(&self, token: TokenId) -> LedgerResult<u8>;

    /// Balance of `holder` in wads
    fn balance_of(&self, holder: Holder, token: TokenId) -> u128;

    /// Check that `transfer` with the same arguments would succeed
    fn check_transfer(&self, from: Holder, to: Holder, token: TokenId, amount: u128) -> LedgerResult<()>;

    /// Move `amount` wads of `token`; returns the wad amount actually credited to `to`
    fn transfer(&mut self, from: Holder, to: Holder, token: TokenId, amount: u128) -> LedgerResult<u128>;
}

/// In-memory custody with per-token native precision
#[derive(Debug, Clone, Default)]
pub struct Bank {
    decimals: BTreeMap<TokenId, u8>,
    balances: BTreeMap<(Holder, TokenId), u128>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token and its native precision
    pub fn register_token(&mut self, token: TokenId, decimals: u8) -> LedgerResult<()> {
        if decimals > MAX_TOKEN_DECIMALS {
            return Err(LedgerError::PrecisionOverflow);
        }
        self.decimals.insert(token, decimals);
        Ok(())
    }

    /// Credit `native_amount` of `token` to an external account
    pub fn mint(&mut self, holder: Holder, token: TokenId, native_amount: u128) -> LedgerResult<()> {
        let wad = normalize(native_amount, self.decimals(token)?)?;
        let balance = self.balances.entry((holder, token)).or_default();
        *balance = safe_add(*balance, wad)?;
        Ok(())
    }

    /// Balance of `holder` in native units, truncated
    pub fn native_balance_of(&self, holder: Holder, token: TokenId) -> LedgerResult<u128> {
        denormalize(self.balance_of(holder, token), self.decimals(token)?)
    }

    /// Wad amount that `to` receives for a transfer of `amount`
    fn credited_amount(&self, to: Holder, token: TokenId, amount: u128) -> LedgerResult<u128> {
        match to {
            Holder::Account(_) => {
                let decimals = self.decimals(token)?;
                safe_sub(amount, dust(amount, decimals)?)
            }
            Holder::Pool | Holder::FeeVault => Ok(amount),
        }
    }
}

impl Custody for Bank {
    fn decimals(&self, token: TokenId) -> LedgerResult<u8> {
        self.decimals
            .get(&token)
            .copied()
            .ok_or_else(|| LedgerError::not_found(RecordKind::Token, token.0))
    }

    fn balance_of(&self, holder: Holder, token: TokenId) -> u128 {
        self.balances.get(&(holder, token)).copied().unwrap_or_default()
    }

    fn check_transfer(&self, from: Holder, to: Holder, token: TokenId, amount: u128) -> LedgerResult<()> {
        let decimals = self.decimals(token)?;
        if matches!(from, Holder::Account(_)) && dust(amount, decimals)? != 0 {
            return Err(LedgerError::PrecisionOverflow);
        }
        let debit = self.credited_amount(to, token, amount)?;
        let available = self.balance_of(from, token);
        if available < debit {
            return Err(LedgerError::InsufficientBalance {
                required: debit,
                available,
            });
        }
        Ok(())
    }

    fn transfer(&mut self, from: Holder, to: Holder, token: TokenId, amount: u128) -> LedgerResult<u128> {
        self.check_transfer(from, to, token, amount)?;
        let moved = self.credited_amount(to, token, amount)?;
        if moved == 0 || from == to {
            return Ok(moved);
        }

        let source = self.balances.entry((from, token)).or_default();
        *source = safe_sub(*source, moved)?;
        let target = self.balances.entry((to, token)).or_default();
        *target = safe_add(*target, moved)?;

        trace!(?from, ?to, %token, amount = moved, "custody transfer");
        Ok(moved)
    }
}
