//! # Fee Accumulator
//!
//! Per-pair fee accounting. Every `(pair, fee token)` key tracks:
//!
//! 1. `withdrawable_fees` - fees held in the fee vault and not yet paid out
//! 2. `cumulative_fees_acc` - monotonically increasing total ever credited
//! 3. `fees_per_allocation` - cumulative fees per wad of LP allocation,
//!    grown at credit time against the allocation earning at that moment
//!
//! Liquidity slots snapshot both counters when they are created and on every
//! claim. A slot's share is the per-allocation growth since its snapshot
//! times its allocation, so later deposits and withdrawals by other slots
//! never change what a slot has already earned.

use std::collections::BTreeMap;

use margin_core::math::{mul_div, safe_add, safe_sub, Rounding};
use margin_core::{
    AccountId, Holder, LedgerError, LedgerResult, Pair, RecordKind, TokenId, WAD,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::access::RouterRegistry;
use crate::custody::Custody;

/// Fee counters for one `(pair, fee token)` key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeState {
    pub withdrawable_fees: u128,
    pub cumulative_fees_acc: u128,
    /// Wad-scaled fees credited per unit of earning allocation
    pub fees_per_allocation: u128,
    /// Sum of slot allocations earning under this key
    pub allocation: u128,
}

/// Key identifying a fee bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeeKey {
    pub pair: Pair,
    pub token: TokenId,
}

impl FeeKey {
    /// Canonical key for `fee_token` fees of the `token_a`/`token_b` pair
    pub fn new(token_a: TokenId, token_b: TokenId, fee_token: TokenId) -> LedgerResult<Self> {
        let pair = Pair::new(token_a, token_b)?;
        Self::for_pair(pair, fee_token)
    }

    pub fn for_pair(pair: Pair, fee_token: TokenId) -> LedgerResult<Self> {
        if !pair.contains(fee_token) {
            return Err(LedgerError::InvalidParameter("fee token must belong to the pair"));
        }
        Ok(Self {
            pair,
            token: fee_token,
        })
    }
}

/// Snapshot of the cumulative counter taken for one liquidity slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    pub key: FeeKey,
    pub fees_acc_snapshot: u128,
    pub per_allocation_snapshot: u128,
}

#[derive(Debug, Clone)]
pub struct FeeAccumulator {
    routers: RouterRegistry,
    states: BTreeMap<FeeKey, FeeState>,
    snapshots: BTreeMap<u64, SlotSnapshot>,
}

impl FeeAccumulator {
    pub fn new(owner: AccountId) -> Self {
        Self {
            routers: RouterRegistry::new(owner),
            states: BTreeMap::new(),
            snapshots: BTreeMap::new(),
        }
    }

    pub fn routers(&self) -> &RouterRegistry {
        &self.routers
    }

    pub fn routers_mut(&mut self) -> &mut RouterRegistry {
        &mut self.routers
    }

    /// Pull `amount` of `fee_token` from `payer` into the fee vault and credit it
    #[allow(clippy::too_many_arguments)]
    pub fn add_fees<C: Custody>(
        &mut self,
        custody: &mut C,
        caller: AccountId,
        payer: AccountId,
        token_a: TokenId,
        token_b: TokenId,
        fee_token: TokenId,
        amount: u128,
    ) -> LedgerResult<()> {
        self.routers.ensure_router(caller)?;
        if amount == 0 {
            return Err(LedgerError::InvalidParameter("fee amount must be positive"));
        }
        let key = FeeKey::new(token_a, token_b, fee_token)?;

        custody.transfer(Holder::Account(payer), Holder::FeeVault, fee_token, amount)?;
        self.credit(key, amount)?;

        info!(%caller, %payer, pair = %key.pair, token = %fee_token, amount, "fees added");
        Ok(())
    }

    /// Credit fees whose custody the caller already moved into the fee vault
    ///
    /// Fees credited while nothing is allocated stay withdrawable but accrue
    /// to no slot.
    pub(crate) fn credit(&mut self, key: FeeKey, amount: u128) -> LedgerResult<()> {
        let state = self.states.entry(key).or_default();
        let withdrawable = safe_add(state.withdrawable_fees, amount)?;
        let cumulative = safe_add(state.cumulative_fees_acc, amount)?;
        let per_allocation = if state.allocation > 0 {
            let growth = mul_div(amount, WAD, state.allocation, Rounding::Down)?;
            safe_add(state.fees_per_allocation, growth)?
        } else {
            state.fees_per_allocation
        };
        state.withdrawable_fees = withdrawable;
        state.cumulative_fees_acc = cumulative;
        state.fees_per_allocation = per_allocation;
        debug!(pair = %key.pair, token = %key.token, amount, cumulative, per_allocation, "fees credited");
        Ok(())
    }

    /// Record the current counters for a new slot and start it earning on `allocation`
    pub fn initialize_snapshot(&mut self, slot: u64, key: FeeKey, allocation: u128) -> LedgerResult<u128> {
        if self.snapshots.contains_key(&slot) {
            return Err(LedgerError::AlreadyInitialized("fee snapshot"));
        }
        let state = self.states.entry(key).or_default();
        state.allocation = safe_add(state.allocation, allocation)?;
        let cumulative = state.cumulative_fees_acc;
        let per_allocation = state.fees_per_allocation;
        self.snapshots.insert(
            slot,
            SlotSnapshot {
                key,
                fees_acc_snapshot: cumulative,
                per_allocation_snapshot: per_allocation,
            },
        );
        Ok(cumulative)
    }

    /// Stop `amount` of a slot's allocation from earning; claim first or the growth is lost
    pub fn release_allocation(&mut self, slot: u64, amount: u128) -> LedgerResult<()> {
        let key = self.snapshot(slot)?.key;
        let state = self.states.entry(key).or_default();
        state.allocation = safe_sub(state.allocation, amount)?;
        Ok(())
    }

    /// Pay `amount` of withdrawable fees out of the fee vault
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw_fees<C: Custody>(
        &mut self,
        custody: &mut C,
        caller: AccountId,
        token_a: TokenId,
        token_b: TokenId,
        fee_token: TokenId,
        recipient: AccountId,
        amount: u128,
    ) -> LedgerResult<u128> {
        self.routers.ensure_router(caller)?;
        let key = FeeKey::new(token_a, token_b, fee_token)?;
        let available = self.state(key).withdrawable_fees;
        if amount > available {
            return Err(LedgerError::InsufficientFees {
                required: amount,
                available,
            });
        }

        let paid = custody.transfer(Holder::FeeVault, Holder::Account(recipient), fee_token, amount)?;
        // Sub-native dust left in the vault stays withdrawable
        let state = self.states.entry(key).or_default();
        state.withdrawable_fees = safe_sub(state.withdrawable_fees, paid)?;

        debug!(%caller, %recipient, pair = %key.pair, token = %fee_token, amount, paid, "fees withdrawn");
        Ok(paid)
    }

    /// Fees a slot holding `allocation` has earned since its snapshot
    pub fn claimable(&self, slot: u64, allocation: u128) -> LedgerResult<u128> {
        let snapshot = self.snapshot(slot)?;
        let growth = self
            .state(snapshot.key)
            .fees_per_allocation
            .saturating_sub(snapshot.per_allocation_snapshot);
        mul_div(growth, allocation, WAD, Rounding::Down)
    }

    /// Move a slot's snapshot up to the current counters
    pub fn reset_snapshot(&mut self, slot: u64) -> LedgerResult<()> {
        let key = self.snapshot(slot)?.key;
        let state = self.state(key);
        if let Some(snapshot) = self.snapshots.get_mut(&slot) {
            snapshot.fees_acc_snapshot = state.cumulative_fees_acc;
            snapshot.per_allocation_snapshot = state.fees_per_allocation;
        }
        Ok(())
    }

    pub fn snapshot(&self, slot: u64) -> LedgerResult<SlotSnapshot> {
        self.snapshots
            .get(&slot)
            .copied()
            .ok_or_else(|| LedgerError::not_found(RecordKind::Slot, slot))
    }

    /// Counters for a key; untouched keys read as zero
    pub fn state(&self, key: FeeKey) -> FeeState {
        self.states.get(&key).copied().unwrap_or_default()
    }

    pub fn states(&self) -> impl Iterator<Item = (FeeKey, FeeState)> + '_ {
        self.states.iter().map(|(key, state)| (*key, *state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::Bank;
    use margin_core::WAD;

    const OWNER: AccountId = AccountId(1);
    const ROUTER: AccountId = AccountId(2);
    const PAYER: AccountId = AccountId(3);
    const ETH: TokenId = TokenId(10);
    const USDC: TokenId = TokenId(20);

    fn setup() -> (FeeAccumulator, Bank) {
        let mut fees = FeeAccumulator::new(OWNER);
        fees.routers_mut().add_router(OWNER, ROUTER).unwrap();

        let mut bank = Bank::new();
        bank.register_token(ETH, 18).unwrap();
        bank.register_token(USDC, 6).unwrap();
        bank.mint(Holder::Account(PAYER), USDC, 1_000_000_000).unwrap();
        (fees, bank)
    }

    #[test]
    fn test_add_fees_uses_canonical_pair() {
        let (mut fees, mut bank) = setup();
        fees.add_fees(&mut bank, ROUTER, PAYER, USDC, ETH, USDC, 10 * WAD).unwrap();

        let key = FeeKey::new(ETH, USDC, USDC).unwrap();
        assert_eq!(fees.state(key).withdrawable_fees, 10 * WAD);
        assert_eq!(fees.state(key).cumulative_fees_acc, 10 * WAD);
        assert_eq!(bank.balance_of(Holder::FeeVault, USDC), 10 * WAD);
    }

    #[test]
    fn test_add_fees_requires_router() {
        let (mut fees, mut bank) = setup();
        let err = fees
            .add_fees(&mut bank, PAYER, PAYER, ETH, USDC, USDC, WAD)
            .unwrap_err();
        assert_eq!(err, LedgerError::Unauthorized { caller: PAYER });
    }

    #[test]
    fn test_fee_token_outside_pair_rejected() {
        let (mut fees, mut bank) = setup();
        let err = fees
            .add_fees(&mut bank, ROUTER, PAYER, ETH, USDC, TokenId(99), WAD)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidParameter(_)));
    }

    #[test]
    fn test_pro_rata_claim_since_snapshot() {
        let (mut fees, mut bank) = setup();
        let key = FeeKey::new(ETH, USDC, USDC).unwrap();
        fees.add_fees(&mut bank, ROUTER, PAYER, ETH, USDC, USDC, 10 * WAD).unwrap();

        // Slots join with cumulative = 10
        assert_eq!(fees.initialize_snapshot(7, key, 500 * WAD).unwrap(), 10 * WAD);
        fees.initialize_snapshot(8, key, 500 * WAD).unwrap();
        fees.add_fees(&mut bank, ROUTER, PAYER, ETH, USDC, USDC, 90 * WAD).unwrap();

        // (100 - 10) * 500 / 1000
        assert_eq!(fees.claimable(7, 500 * WAD).unwrap(), 45 * WAD);

        fees.reset_snapshot(7).unwrap();
        assert_eq!(fees.claimable(7, 500 * WAD).unwrap(), 0);
        assert_eq!(fees.claimable(8, 500 * WAD).unwrap(), 45 * WAD);
    }

    #[test]
    fn test_earned_fees_survive_allocation_changes() {
        let (mut fees, mut bank) = setup();
        let key = FeeKey::new(ETH, USDC, USDC).unwrap();
        fees.initialize_snapshot(1, key, 500 * WAD).unwrap();
        fees.add_fees(&mut bank, ROUTER, PAYER, ETH, USDC, USDC, 100 * WAD).unwrap();
        assert_eq!(fees.claimable(1, 500 * WAD).unwrap(), 100 * WAD);

        // A later depositor shares only what comes after it
        fees.initialize_snapshot(2, key, 500 * WAD).unwrap();
        assert_eq!(fees.claimable(1, 500 * WAD).unwrap(), 100 * WAD);
        assert_eq!(fees.claimable(2, 500 * WAD).unwrap(), 0);

        fees.add_fees(&mut bank, ROUTER, PAYER, ETH, USDC, USDC, 50 * WAD).unwrap();
        assert_eq!(fees.claimable(1, 500 * WAD).unwrap(), 125 * WAD);
        assert_eq!(fees.claimable(2, 500 * WAD).unwrap(), 25 * WAD);

        // Slot 2 leaves; slot 1 keeps its share and earns alone afterwards
        fees.reset_snapshot(2).unwrap();
        fees.release_allocation(2, 500 * WAD).unwrap();
        assert_eq!(fees.claimable(1, 500 * WAD).unwrap(), 125 * WAD);
        fees.add_fees(&mut bank, ROUTER, PAYER, ETH, USDC, USDC, 10 * WAD).unwrap();
        assert_eq!(fees.claimable(1, 500 * WAD).unwrap(), 135 * WAD);
        assert_eq!(fees.state(key).allocation, 500 * WAD);
    }

    #[test]
    fn test_snapshot_initialized_once() {
        let (mut fees, _) = setup();
        let key = FeeKey::new(ETH, USDC, USDC).unwrap();
        fees.initialize_snapshot(1, key, WAD).unwrap();
        assert_eq!(
            fees.initialize_snapshot(1, key, WAD),
            Err(LedgerError::AlreadyInitialized("fee snapshot"))
        );
    }

    #[test]
    fn test_withdraw_bounded_by_withdrawable() {
        let (mut fees, mut bank) = setup();
        fees.add_fees(&mut bank, ROUTER, PAYER, ETH, USDC, USDC, 10 * WAD).unwrap();

        let err = fees
            .withdraw_fees(&mut bank, ROUTER, ETH, USDC, USDC, PAYER, 11 * WAD)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFees {
                required: 11 * WAD,
                available: 10 * WAD
            }
        );

        let paid = fees
            .withdraw_fees(&mut bank, ROUTER, ETH, USDC, USDC, PAYER, 4 * WAD)
            .unwrap();
        assert_eq!(paid, 4 * WAD);
        let key = FeeKey::new(ETH, USDC, USDC).unwrap();
        assert_eq!(fees.state(key).withdrawable_fees, 6 * WAD);
        // Cumulative never decreases
        assert_eq!(fees.state(key).cumulative_fees_acc, 10 * WAD);
    }

    #[test]
    fn test_withdraw_dust_stays_withdrawable() {
        let (mut fees, mut bank) = setup();
        fees.add_fees(&mut bank, ROUTER, PAYER, ETH, USDC, USDC, 10 * WAD).unwrap();

        // USDC has 6 decimals: the last 1e-18 cannot leave the vault
        let paid = fees
            .withdraw_fees(&mut bank, ROUTER, ETH, USDC, USDC, PAYER, 4 * WAD + 1)
            .unwrap();
        assert_eq!(paid, 4 * WAD);
        let key = FeeKey::new(ETH, USDC, USDC).unwrap();
        assert_eq!(fees.state(key).withdrawable_fees, 6 * WAD);
        assert_eq!(bank.balance_of(Holder::FeeVault, USDC), 6 * WAD);
    }

    #[test]
    fn test_claimable_unknown_slot() {
        let (fees, _) = setup();
        assert_eq!(
            fees.claimable(42, WAD),
            Err(LedgerError::not_found(RecordKind::Slot, 42))
        );
    }
}
