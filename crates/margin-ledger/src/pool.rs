//! # Liquidity Pool
//!
//! Custodian of trader margin and LP liquidity. Per listed token the pool
//! tracks:
//!
//! - `liquid_balance`: everything the pool holds in that token
//! - `reserved`: trader margin currently escrowed for open positions
//! - `total_allocation`: the sum of LP slot claims
//!
//! LP claims are always covered: `total_allocation <= liquid_balance` after
//! every operation. Ledgers move value only through [`LiquidityPool::settle`],
//! which validates a whole batch before applying any of it.

use std::collections::BTreeMap;

use margin_core::math::{apply_bps, safe_add, safe_sub};
use margin_core::{
    AccountId, Holder, LedgerError, LedgerResult, Pair, RecordKind, SettlementUpdate, TokenId,
    BPS_DENOMINATOR, MAX_TOKEN_DECIMALS,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::access::RouterRegistry;
use crate::context::CallContext;
use crate::custody::Custody;
use crate::fees::{FeeAccumulator, FeeKey};
use crate::oracle::PriceOracle;
use crate::reentrancy::{ReentrancyGuard, ReentrancyStatus};
use crate::settlement::{FeeSink, SettlementSink};

/// Listing parameters of a token the pool accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenListing {
    pub decimals: u8,
    /// Token used for withdrawal compensation and fee pairing
    pub paired_with: TokenId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalances {
    pub liquid_balance: u128,
    pub reserved: u128,
    pub total_allocation: u128,
}

impl TokenBalances {
    /// Liquidity not escrowed for traders
    pub fn free(&self) -> u128 {
        self.liquid_balance.saturating_sub(self.reserved)
    }

    /// Free liquidity beyond all LP claims
    pub fn surplus(&self) -> u128 {
        self.free().saturating_sub(self.total_allocation)
    }
}

/// One LP deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquiditySlot {
    pub id: u64,
    pub depositor: AccountId,
    pub token: TokenId,
    pub allocation: u128,
    pub deposited_at: i64,
}

/// Shortfall paid in the paired token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compensation {
    pub token: TokenId,
    pub amount: u128,
}

/// Outcome of a withdrawal; amounts are those debited from pool accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawReceipt {
    pub slot_id: u64,
    pub token: TokenId,
    pub primary: u128,
    pub compensation: Option<Compensation>,
    pub fees_claimed: u128,
}

/// Balances and inbound pulls computed by the validation pass
#[derive(Debug, Default)]
struct SettlementPlan {
    balances: BTreeMap<TokenId, TokenBalances>,
    inbound: BTreeMap<(AccountId, TokenId), u128>,
}

#[derive(Debug, Clone)]
pub struct LiquidityPool<C> {
    /// Identity the pool uses toward the fee accumulator
    id: AccountId,
    routers: RouterRegistry,
    listings: BTreeMap<TokenId, TokenListing>,
    balances: BTreeMap<TokenId, TokenBalances>,
    slots: BTreeMap<u64, LiquiditySlot>,
    next_slot_id: u64,
    max_compensation_bps: u32,
    fees: FeeAccumulator,
    custody: C,
    status: ReentrancyStatus,
}

impl<C: Custody> LiquidityPool<C> {
    pub fn new(owner: AccountId, id: AccountId, custody: C, max_compensation_bps: u32) -> LedgerResult<Self> {
        if u128::from(max_compensation_bps) > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidParameter("max_compensation_bps above 10000"));
        }
        let mut fees = FeeAccumulator::new(owner);
        fees.routers_mut().add_router(owner, id)?;

        Ok(Self {
            id,
            routers: RouterRegistry::new(owner),
            listings: BTreeMap::new(),
            balances: BTreeMap::new(),
            slots: BTreeMap::new(),
            next_slot_id: 0,
            max_compensation_bps,
            fees,
            custody,
            status: ReentrancyStatus::default(),
        })
    }

    // ========================================================================
    // Guard
    // ========================================================================

    fn locked<T>(&mut self, op: impl FnOnce(&mut Self) -> LedgerResult<T>) -> LedgerResult<T> {
        ReentrancyGuard::acquire(&mut self.status)?;
        let result = op(self);
        ReentrancyGuard::release(&mut self.status);
        result
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub fn add_router(&mut self, caller: AccountId, router: AccountId) -> LedgerResult<()> {
        self.locked(|pool| {
            pool.routers.add_router(caller, router)?;
            pool.fees.routers_mut().add_router(caller, router)
        })
    }

    pub fn remove_router(&mut self, caller: AccountId, router: AccountId) -> LedgerResult<()> {
        self.locked(|pool| {
            pool.routers.remove_router(caller, router)?;
            pool.fees.routers_mut().remove_router(caller, router)
        })
    }

    /// Accept deposits of `token`, compensating shortfalls in `paired_with`
    pub fn list_token(&mut self, caller: AccountId, token: TokenId, decimals: u8, paired_with: TokenId) -> LedgerResult<()> {
        self.locked(|pool| {
            pool.routers.ensure_owner(caller)?;
            Pair::new(token, paired_with)?;
            if decimals > MAX_TOKEN_DECIMALS {
                return Err(LedgerError::PrecisionOverflow);
            }
            if pool.custody.decimals(token)? != decimals {
                return Err(LedgerError::InvalidParameter("listing decimals disagree with custody"));
            }
            if pool.listings.contains_key(&token) {
                return Err(LedgerError::AlreadyInitialized("token listing"));
            }
            pool.listings.insert(token, TokenListing { decimals, paired_with });
            info!(%token, decimals, %paired_with, "token listed");
            Ok(())
        })
    }

    // ========================================================================
    // LP Operations
    // ========================================================================

    /// Deposit `amount` of `token` into a new slot; returns the slot id
    pub fn deposit(&mut self, ctx: &CallContext, token: TokenId, amount: u128) -> LedgerResult<u64> {
        self.locked(|pool| {
            let key = pool.fee_key(token)?;
            if amount == 0 {
                return Err(LedgerError::InvalidParameter("deposit amount must be positive"));
            }

            let mut balances = pool.balances(token);
            balances.liquid_balance = safe_add(balances.liquid_balance, amount)?;
            balances.total_allocation = safe_add(balances.total_allocation, amount)?;

            pool.custody.transfer(Holder::Account(ctx.caller), Holder::Pool, token, amount)?;

            let id = pool.next_slot_id;
            pool.fees.initialize_snapshot(id, key, amount)?;
            pool.next_slot_id += 1;
            pool.balances.insert(token, balances);
            pool.slots.insert(
                id,
                LiquiditySlot {
                    id,
                    depositor: ctx.caller,
                    token,
                    allocation: amount,
                    deposited_at: ctx.timestamp,
                },
            );

            info!(slot = id, depositor = %ctx.caller, %token, amount, "liquidity deposited");
            Ok(id)
        })
    }

    /// Withdraw `amount` from a slot, compensating any shortfall in the paired token
    pub fn withdraw<O: PriceOracle>(
        &mut self,
        oracle: &O,
        ctx: &CallContext,
        slot_id: u64,
        amount: u128,
    ) -> LedgerResult<WithdrawReceipt> {
        self.locked(|pool| {
            let slot = pool.slot(slot_id)?;
            if slot.depositor != ctx.caller {
                return Err(LedgerError::Unauthorized { caller: ctx.caller });
            }
            if amount == 0 {
                return Err(LedgerError::InvalidParameter("withdraw amount must be positive"));
            }
            if amount > slot.allocation {
                return Err(LedgerError::InsufficientBalance {
                    required: amount,
                    available: slot.allocation,
                });
            }

            let token = slot.token;
            let mut balances = pool.balances(token);
            let free = balances.free();
            let other_claims = safe_sub(balances.total_allocation, slot.allocation)?;
            let primary = amount.min(free.saturating_sub(other_claims));
            let shortfall = amount - primary;

            let compensation = if shortfall > 0 {
                Some(pool.plan_compensation(oracle, token, shortfall)?)
            } else {
                None
            };

            // Pending fees are paid against the pre-withdrawal allocation
            let fees_claimed = pool.claim_slot_fees(slot_id)?;
            pool.fees.release_allocation(slot_id, amount)?;

            balances.liquid_balance = safe_sub(balances.liquid_balance, primary)?;
            balances.total_allocation = safe_sub(balances.total_allocation, amount)?;
            pool.balances.insert(token, balances);
            if let Some(slot) = pool.slots.get_mut(&slot_id) {
                slot.allocation -= amount;
            }
            pool.custody.transfer(Holder::Pool, Holder::Account(ctx.caller), token, primary)?;

            if let Some(comp) = compensation {
                let mut paired = pool.balances(comp.token);
                paired.liquid_balance = safe_sub(paired.liquid_balance, comp.amount)?;
                pool.balances.insert(comp.token, paired);
                pool.custody
                    .transfer(Holder::Pool, Holder::Account(ctx.caller), comp.token, comp.amount)?;
            }

            info!(slot = slot_id, %token, amount, primary, fees_claimed, "liquidity withdrawn");
            Ok(WithdrawReceipt {
                slot_id,
                token,
                primary,
                compensation,
                fees_claimed,
            })
        })
    }

    /// Pay a slot's earned fees to its depositor; returns the amount paid
    pub fn claim_fees(&mut self, ctx: &CallContext, slot_id: u64) -> LedgerResult<u128> {
        self.locked(|pool| {
            let slot = pool.slot(slot_id)?;
            if slot.depositor != ctx.caller {
                return Err(LedgerError::Unauthorized { caller: ctx.caller });
            }
            pool.claim_slot_fees(slot_id)
        })
    }

    /// Router-only payout of accumulated fees
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw_fees(
        &mut self,
        caller: AccountId,
        token_a: TokenId,
        token_b: TokenId,
        fee_token: TokenId,
        recipient: AccountId,
        amount: u128,
    ) -> LedgerResult<u128> {
        self.locked(|pool| {
            pool.fees
                .withdraw_fees(&mut pool.custody, caller, token_a, token_b, fee_token, recipient, amount)
        })
    }

    fn claim_slot_fees(&mut self, slot_id: u64) -> LedgerResult<u128> {
        let slot = self.slot(slot_id)?;
        let earned = self.fees.claimable(slot_id, slot.allocation)?;
        let key = self.fees.snapshot(slot_id)?.key;

        let withdrawable = self.fees.state(key).withdrawable_fees;
        let amount = earned.min(withdrawable);
        if amount < earned {
            warn!(slot = slot_id, earned, withdrawable, "fee claim capped at withdrawable balance");
        }

        let mut paid = 0;
        if amount > 0 {
            paid = self.fees.withdraw_fees(
                &mut self.custody,
                self.id,
                key.pair.low(),
                key.pair.high(),
                key.token,
                slot.depositor,
                amount,
            )?;
        }
        self.fees.reset_snapshot(slot_id)?;

        debug!(slot = slot_id, amount, paid, "fees claimed");
        Ok(paid)
    }

    fn plan_compensation<O: PriceOracle>(&self, oracle: &O, token: TokenId, shortfall: u128) -> LedgerResult<Compensation> {
        let paired_token = self.listing(token)?.paired_with;
        let amount = oracle.convert(shortfall, token, paired_token)?;
        let surplus = self.balances(paired_token).surplus();
        let cap = apply_bps(surplus, u128::from(self.max_compensation_bps))?;
        if amount > cap {
            return Err(LedgerError::insufficient_liquidity(paired_token, amount, cap));
        }

        warn!(%token, shortfall, %paired_token, amount, "withdrawal compensated in paired token");
        Ok(Compensation {
            token: paired_token,
            amount,
        })
    }

    // ========================================================================
    // Settlement
    // ========================================================================

    /// Apply a ledger's settlement batch all-or-nothing
    pub fn settle(&mut self, router: AccountId, updates: &[SettlementUpdate]) -> LedgerResult<()> {
        self.locked(|pool| {
            pool.routers.ensure_router(router)?;
            let plan = pool.plan_settlement(updates)?;
            pool.commit_settlement(updates, plan)?;
            debug!(%router, legs = updates.len(), "settlement applied");
            Ok(())
        })
    }

    /// Validation pass against a scratch copy of the touched balances
    fn plan_settlement(&self, updates: &[SettlementUpdate]) -> LedgerResult<SettlementPlan> {
        let mut plan = SettlementPlan::default();

        for update in updates {
            let token = update.token();
            self.listing(token)?;
            let balances = plan.balances.entry(token).or_insert_with(|| self.balances(token));

            match *update {
                SettlementUpdate::Reserve { from, amount, .. } => {
                    balances.liquid_balance = safe_add(balances.liquid_balance, amount)?;
                    balances.reserved = safe_add(balances.reserved, amount)?;
                    let pulled = plan.inbound.entry((from, token)).or_default();
                    *pulled = safe_add(*pulled, amount)?;
                }
                SettlementUpdate::Release { amount, .. } => {
                    balances.reserved = balances
                        .reserved
                        .checked_sub(amount)
                        .ok_or(LedgerError::insufficient_liquidity(token, amount, balances.reserved))?;
                }
                SettlementUpdate::Payout { amount, .. } | SettlementUpdate::Fee { amount, .. } => {
                    if let SettlementUpdate::Fee { pair, .. } = update {
                        FeeKey::for_pair(*pair, token)?;
                    }
                    balances.liquid_balance = balances
                        .liquid_balance
                        .checked_sub(amount)
                        .ok_or(LedgerError::insufficient_liquidity(token, amount, balances.liquid_balance))?;
                }
            }
        }

        for (&(from, token), &amount) in &plan.inbound {
            self.custody.check_transfer(Holder::Account(from), Holder::Pool, token, amount)?;
        }
        for (&token, balances) in &plan.balances {
            if balances.liquid_balance < balances.reserved {
                return Err(LedgerError::insufficient_liquidity(
                    token,
                    balances.reserved,
                    balances.liquid_balance,
                ));
            }
            if balances.liquid_balance < balances.total_allocation {
                return Err(LedgerError::insufficient_liquidity(
                    token,
                    balances.total_allocation,
                    balances.liquid_balance,
                ));
            }
        }
        Ok(plan)
    }

    fn commit_settlement(&mut self, updates: &[SettlementUpdate], plan: SettlementPlan) -> LedgerResult<()> {
        for (&(from, token), &amount) in &plan.inbound {
            self.custody.transfer(Holder::Account(from), Holder::Pool, token, amount)?;
        }
        for update in updates {
            match *update {
                SettlementUpdate::Payout {
                    recipient,
                    token,
                    amount,
                } => {
                    self.custody.transfer(Holder::Pool, Holder::Account(recipient), token, amount)?;
                }
                SettlementUpdate::Fee { pair, token, amount } => {
                    self.custody.transfer(Holder::Pool, Holder::FeeVault, token, amount)?;
                    self.fees.credit(FeeKey::for_pair(pair, token)?, amount)?;
                }
                SettlementUpdate::Reserve { .. } | SettlementUpdate::Release { .. } => {}
            }
        }
        self.balances.extend(plan.balances);
        Ok(())
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn owner(&self) -> AccountId {
        self.routers.owner()
    }

    pub fn routers(&self) -> &RouterRegistry {
        &self.routers
    }

    pub fn listing(&self, token: TokenId) -> LedgerResult<TokenListing> {
        self.listings
            .get(&token)
            .copied()
            .ok_or_else(|| LedgerError::not_found(RecordKind::Token, token.0))
    }

    pub fn listings(&self) -> impl Iterator<Item = (TokenId, TokenListing)> + '_ {
        self.listings.iter().map(|(token, listing)| (*token, *listing))
    }

    /// Canonical pair a token's LP fees accrue under
    pub fn pair_of(&self, token: TokenId) -> LedgerResult<Pair> {
        Pair::new(token, self.listing(token)?.paired_with)
    }

    fn fee_key(&self, token: TokenId) -> LedgerResult<FeeKey> {
        FeeKey::for_pair(self.pair_of(token)?, token)
    }

    /// Balances of a token; unlisted or untouched tokens read as zero
    pub fn balances(&self, token: TokenId) -> TokenBalances {
        self.balances.get(&token).copied().unwrap_or_default()
    }

    pub fn all_balances(&self) -> impl Iterator<Item = (TokenId, TokenBalances)> + '_ {
        self.balances.iter().map(|(token, balances)| (*token, *balances))
    }

    pub fn slot(&self, slot_id: u64) -> LedgerResult<LiquiditySlot> {
        self.slots
            .get(&slot_id)
            .copied()
            .ok_or_else(|| LedgerError::not_found(RecordKind::Slot, slot_id))
    }

    pub fn slots(&self) -> impl Iterator<Item = &LiquiditySlot> {
        self.slots.values()
    }

    /// Fees a slot could claim right now
    pub fn claimable(&self, slot_id: u64) -> LedgerResult<u128> {
        let slot = self.slot(slot_id)?;
        self.fees.claimable(slot_id, slot.allocation)
    }

    pub fn fees(&self) -> &FeeAccumulator {
        &self.fees
    }

    pub fn custody(&self) -> &C {
        &self.custody
    }

    pub fn custody_mut(&mut self) -> &mut C {
        &mut self.custody
    }

    /// LP claims covered and slot allocations summing to the booked total
    pub fn is_consistent(&self) -> bool {
        self.balances.iter().all(|(token, balances)| {
            let allocated: u128 = self
                .slots
                .values()
                .filter(|slot| slot.token == *token)
                .map(|slot| slot.allocation)
                .sum();
            allocated == balances.total_allocation
                && balances.total_allocation <= balances.liquid_balance
                && balances.reserved <= balances.liquid_balance
        })
    }
}

impl<C: Custody> SettlementSink for LiquidityPool<C> {
    fn apply(&mut self, router: AccountId, updates: &[SettlementUpdate]) -> LedgerResult<()> {
        self.settle(router, updates)
    }
}

impl<C: Custody> FeeSink for LiquidityPool<C> {
    fn add_fees(
        &mut self,
        router: AccountId,
        payer: AccountId,
        token_a: TokenId,
        token_b: TokenId,
        fee_token: TokenId,
        amount: u128,
    ) -> LedgerResult<()> {
        self.locked(|pool| {
            pool.fees
                .add_fees(&mut pool.custody, router, payer, token_a, token_b, fee_token, amount)
        })
    }
}
