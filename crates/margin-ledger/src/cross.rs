//! # Cross-Margin Position Ledger
//!
//! Positions that share one margin account per owner, posted in a single
//! namespace-wide base asset. Each Active position's liquidation price is
//! derived from the account's whole margin plus its own taxed margin and is
//! refreshed whenever the account margin changes.
//!
//! When one position is liquidated, or the account as a whole is found
//! insolvent, the account is "nuked": its margin and the taxed margin of
//! every Active position are released to the pool in a single settlement
//! batch and every Active position closes with zero payout.

use std::collections::BTreeMap;

use margin_core::math::{
    cross_margin_ratio, holding_fee, leverage_amount, liquidation_price, safe_add, safe_sub,
};
use margin_core::{
    AccountId, ExitReason, ExitRecord, LedgerError, LedgerResult, PositionStatus, RecordKind,
    SettlementBatch, TokenId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::CallContext;
use crate::oracle::PriceOracle;
use crate::position::{margin_after_pnl, LedgerParams, OpenRequest, Position};
use crate::settlement::SettlementSink;

/// Shared margin of one owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossAccount {
    pub owner: AccountId,
    pub base_asset: TokenId,
    pub user_base_margin: u128,
    /// Number of times the account was nuked
    pub liquidations: u32,
}

/// Outcome of an account-wide liquidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NukeReport {
    pub owner: AccountId,
    /// Account margin plus taxed margin released to the pool
    pub seized: u128,
    pub closed: Vec<u64>,
}

/// Outcome of a cross position exit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossExit {
    pub record: ExitRecord,
    /// Set when the exit liquidated the whole account
    pub nuke: Option<NukeReport>,
}

/// Liquidation price of a cross position backed by `account_margin`
fn derived_liquidation_price(position: &Position, account_margin: u128) -> LedgerResult<u128> {
    let exposure = position
        .leverage_amount
        .ok_or(LedgerError::state_mismatch(PositionStatus::Active, position.status))?;
    let available = safe_add(account_margin, position.taxed_margin)?;
    let ratio = cross_margin_ratio(available, position.entry_price, exposure)?;
    liquidation_price(position.direction, position.entry_price, ratio)
}

#[derive(Debug, Clone)]
pub struct CrossLedger {
    /// Router identity used when settling against the pool
    router: AccountId,
    /// May set the base asset
    admin: AccountId,
    base_asset: Option<TokenId>,
    params: LedgerParams,
    accounts: BTreeMap<AccountId, CrossAccount>,
    positions: BTreeMap<u64, Position>,
    next_id: u64,
}

impl CrossLedger {
    pub fn new(router: AccountId, admin: AccountId, params: LedgerParams) -> Self {
        Self {
            router,
            admin,
            base_asset: None,
            params,
            accounts: BTreeMap::new(),
            positions: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn router(&self) -> AccountId {
        self.router
    }

    pub(crate) fn set_params(&mut self, params: LedgerParams) {
        self.params = params;
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn base_asset(&self) -> LedgerResult<TokenId> {
        self.base_asset
            .ok_or(LedgerError::InvalidParameter("cross base asset not set"))
    }

    pub fn account(&self, owner: AccountId) -> LedgerResult<&CrossAccount> {
        self.accounts
            .get(&owner)
            .ok_or_else(|| LedgerError::not_found(RecordKind::CrossAccount, owner.0))
    }

    pub fn accounts(&self) -> impl Iterator<Item = &CrossAccount> {
        self.accounts.values()
    }

    pub fn position(&self, id: u64) -> LedgerResult<&Position> {
        self.positions
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::CrossPosition, id))
    }

    fn position_mut(&mut self, id: u64) -> LedgerResult<&mut Position> {
        self.positions
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::CrossPosition, id))
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    fn active_positions(&self, owner: AccountId) -> impl Iterator<Item = &Position> {
        self.positions
            .values()
            .filter(move |position| position.owner == owner && position.status == PositionStatus::Active)
    }

    fn account_margin(&self, owner: AccountId) -> u128 {
        self.accounts
            .get(&owner)
            .map_or(0, |account| account.user_base_margin)
    }

    /// Sum over Active positions of losses not covered by their taxed margin
    pub fn shortfall<O: PriceOracle>(&self, oracle: &O, owner: AccountId) -> LedgerResult<u128> {
        let mut total = 0u128;
        for position in self.active_positions(owner) {
            let price = oracle.price(position.base_token, position.quote_token)?;
            let pnl = position.pnl(price)?;
            if pnl < 0 {
                let uncovered = pnl.unsigned_abs().saturating_sub(position.taxed_margin);
                total = safe_add(total, uncovered)?;
            }
        }
        Ok(total)
    }

    /// Whether the account stays solvent with `margin` at current prices
    fn is_solvent_with<O: PriceOracle>(&self, oracle: &O, owner: AccountId, margin: u128) -> LedgerResult<bool> {
        for position in self.active_positions(owner) {
            let price = oracle.price(position.base_token, position.quote_token)?;
            let liquidation = derived_liquidation_price(position, margin)?;
            if position.direction.liquidation_reached(price, liquidation) {
                return Ok(false);
            }
        }
        Ok(self.shortfall(oracle, owner)? <= margin)
    }

    pub fn is_solvent<O: PriceOracle>(&self, oracle: &O, owner: AccountId) -> LedgerResult<bool> {
        self.is_solvent_with(oracle, owner, self.account_margin(owner))
    }

    // ========================================================================
    // Account Margin
    // ========================================================================

    /// Fix the namespace base asset; allowed once
    pub fn set_base_asset(&mut self, caller: AccountId, token: TokenId) -> LedgerResult<()> {
        if caller != self.admin {
            return Err(LedgerError::Unauthorized { caller });
        }
        if self.base_asset.is_some() {
            return Err(LedgerError::AlreadyInitialized("cross base asset"));
        }
        self.base_asset = Some(token);
        info!(%token, "cross base asset set");
        Ok(())
    }

    fn account_entry(&mut self, owner: AccountId) -> LedgerResult<&mut CrossAccount> {
        let base_asset = self.base_asset()?;
        Ok(self.accounts.entry(owner).or_insert_with(|| CrossAccount {
            owner,
            base_asset,
            user_base_margin: 0,
            liquidations: 0,
        }))
    }

    /// Escrow base asset into the caller's account; returns the new margin
    pub fn add_margin<S: SettlementSink>(&mut self, sink: &mut S, ctx: &CallContext, amount: u128) -> LedgerResult<u128> {
        if amount == 0 {
            return Err(LedgerError::InvalidParameter("margin amount must be positive"));
        }
        let base = self.base_asset()?;
        let batch = SettlementBatch::new().reserve(ctx.caller, base, amount);
        sink.apply(self.router, batch.updates())?;

        let account = self.account_entry(ctx.caller)?;
        account.user_base_margin = safe_add(account.user_base_margin, amount)?;
        let margin = account.user_base_margin;
        self.refresh_liquidation_prices(ctx.caller)?;

        info!(owner = %ctx.caller, amount, margin, "cross margin added");
        Ok(margin)
    }

    /// Return margin to the owner if the account stays solvent; returns the new margin
    pub fn pull_margin<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        ctx: &CallContext,
        amount: u128,
    ) -> LedgerResult<u128> {
        let owner = ctx.caller;
        let account = self.account(owner)?;
        let current = account.user_base_margin;
        let base = account.base_asset;
        if amount == 0 {
            return Err(LedgerError::InvalidParameter("margin amount must be positive"));
        }
        if amount > current {
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: current,
            });
        }

        let remaining = current - amount;
        if !self.is_solvent_with(oracle, owner, remaining)? {
            let shortfall = self.shortfall(oracle, owner)?;
            warn!(%owner, amount, current, shortfall, "margin pull would leave account insolvent");
            return Err(LedgerError::InsufficientBalance {
                required: amount,
                available: current.saturating_sub(shortfall),
            });
        }

        let batch = SettlementBatch::new()
            .release(base, amount)
            .payout(owner, base, amount);
        sink.apply(self.router, batch.updates())?;

        if let Some(account) = self.accounts.get_mut(&owner) {
            account.user_base_margin = remaining;
        }
        self.refresh_liquidation_prices(owner)?;

        info!(%owner, amount, margin = remaining, "cross margin pulled");
        Ok(remaining)
    }

    /// Re-derive liquidation prices of the owner's Active positions
    fn refresh_liquidation_prices(&mut self, owner: AccountId) -> LedgerResult<()> {
        let margin = self.account_margin(owner);
        let ids: Vec<u64> = self.active_positions(owner).map(|position| position.id).collect();
        for id in ids {
            let position = self.position_mut(id)?;
            let liquidation = derived_liquidation_price(position, margin)?;
            position.liquidation_price = Some(liquidation);
            debug!(position = id, margin, liquidation, "cross liquidation price refreshed");
        }
        Ok(())
    }

    // ========================================================================
    // Position Lifecycle
    // ========================================================================

    /// Escrow margin and record a Pending cross position; market orders execute immediately
    pub fn open_position<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        ctx: &CallContext,
        request: OpenRequest,
    ) -> LedgerResult<u64> {
        if request.quote_token != self.base_asset()? {
            return Err(LedgerError::InvalidParameter("cross margin must be posted in the base asset"));
        }
        let id = self.next_id;
        let position = Position::pending(id, ctx.caller, &request, &self.params, ctx.timestamp)?;

        let market_price = if position.entry_price == 0 {
            Some(oracle.price(position.base_token, position.quote_token)?)
        } else {
            None
        };

        let batch = SettlementBatch::new().reserve(position.owner, position.quote_token, position.escrow()?);
        sink.apply(self.router, batch.updates())?;

        info!(
            position = id,
            owner = %position.owner,
            direction = ?position.direction,
            margin = position.initial_margin,
            leverage = position.leverage,
            "cross position opened"
        );
        self.positions.insert(id, position);
        self.next_id += 1;

        if let Some(price) = market_price {
            self.activate(sink, oracle, id, price, ctx.timestamp)?;
        }
        Ok(id)
    }

    /// Limit-order form of `open_position`
    pub fn create_wind_order<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        ctx: &CallContext,
        request: OpenRequest,
    ) -> LedgerResult<u64> {
        if request.entry_price == 0 {
            return Err(LedgerError::InvalidParameter("limit order needs an entry price"));
        }
        self.open_position(sink, oracle, ctx, request)
    }

    /// Activate a Pending limit order once the oracle price crosses its entry
    ///
    /// The fill happens at the order's entry price. If the oracle has already
    /// moved through the derived liquidation price the account is nuked in
    /// the same call and the report is returned.
    pub fn execute_position<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        ctx: &CallContext,
        id: u64,
    ) -> LedgerResult<Option<NukeReport>> {
        let position = self.position(id)?;
        position.ensure_status(PositionStatus::Pending)?;
        let price = oracle.price(position.base_token, position.quote_token)?;
        if !position.entry_reached(price) {
            return Err(LedgerError::TriggerNotReached);
        }
        self.activate(sink, oracle, id, price, ctx.timestamp)
    }

    fn activate<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        id: u64,
        price: u128,
        now: i64,
    ) -> LedgerResult<Option<NukeReport>> {
        let position = self.position(id)?;
        position.ensure_status(PositionStatus::Pending)?;
        let entry = if position.entry_price == 0 {
            price
        } else {
            position.entry_price
        };
        position.validate_levels(entry)?;
        let exposure = leverage_amount(position.taxed_margin, position.leverage, entry)?;

        let batch = SettlementBatch::new()
            .release(position.quote_token, position.entry_fee)
            .fee(position.pair()?, position.quote_token, position.entry_fee);
        sink.apply(self.router, batch.updates())?;

        let owner = position.owner;
        let excess = position.excess_margin;
        let account = self.account_entry(owner)?;
        account.user_base_margin = safe_add(account.user_base_margin, excess)?;

        let position = self.position_mut(id)?;
        position.excess_margin = 0;
        // Placeholder threshold until the refresh below prices it against the account
        position.activate(entry, exposure, entry, now);
        self.refresh_liquidation_prices(owner)?;

        let position = self.position(id)?;
        let liquidation = position.liquidation_price;
        info!(position = id, entry, exposure, folded = excess, ?liquidation, "cross position active");

        if self.is_solvent(oracle, owner)? {
            return Ok(None);
        }
        let trigger = liquidation
            .filter(|&threshold| position.direction.liquidation_reached(price, threshold))
            .map(|_| (id, price));
        warn!(position = id, %owner, price, "account insolvent at activation");
        self.nuke(sink, owner, trigger, now).map(Some)
    }

    /// Close an Active cross position; a liquidation nukes the whole account
    pub fn exit_position<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        ctx: &CallContext,
        id: u64,
    ) -> LedgerResult<CrossExit> {
        let position = self.position(id)?;
        position.ensure_status(PositionStatus::Active)?;
        let owner = position.owner;
        let price = oracle.price(position.base_token, position.quote_token)?;
        let margin = self.account_margin(owner);

        let exposure = position.leverage_amount.unwrap_or_default();
        let ratio_exhausted = cross_margin_ratio(
            safe_add(margin, position.taxed_margin)?,
            position.entry_price,
            exposure,
        )? == 0;
        let reason = match position.exit_trigger(price) {
            _ if ratio_exhausted => ExitReason::Liquidation,
            Some(reason) => reason,
            None if ctx.caller == owner => ExitReason::ManualClose,
            None => return Err(LedgerError::TriggerNotReached),
        };

        if reason == ExitReason::Liquidation {
            let nuke = self.nuke(sink, owner, Some((id, price)), ctx.timestamp)?;
            let record = self
                .position(id)?
                .exit
                .ok_or(LedgerError::state_mismatch(PositionStatus::Closed, PositionStatus::Active))?;
            return Ok(CrossExit {
                record,
                nuke: Some(nuke),
            });
        }

        let taxed = position.taxed_margin;
        let quote = position.quote_token;
        let pnl = position.pnl(price)?;
        let mut batch = SettlementBatch::new();
        let mut deficit = 0;

        let (status, payout, fee) = if reason == ExitReason::TakeProfit {
            let payout = margin_after_pnl(taxed, pnl)?;
            batch = batch.release(quote, taxed).payout(owner, quote, payout);
            (PositionStatus::Closed, payout, 0)
        } else if pnl < 0 && pnl.unsigned_abs() > taxed {
            deficit = pnl.unsigned_abs() - taxed;
            if deficit > margin {
                // Loss exceeds everything the account holds
                let nuke = self.nuke(sink, owner, Some((id, price)), ctx.timestamp)?;
                let record = self
                    .position(id)?
                    .exit
                    .ok_or(LedgerError::state_mismatch(PositionStatus::Closed, PositionStatus::Active))?;
                return Ok(CrossExit {
                    record,
                    nuke: Some(nuke),
                });
            }
            batch = batch.release(quote, safe_add(taxed, deficit)?);
            (PositionStatus::Cancelled, 0, 0)
        } else {
            let remaining = margin_after_pnl(taxed, pnl)?;
            let fee = holding_fee(remaining, self.params.holding_fee_bps_per_hour, position.active_for(ctx.timestamp))?;
            let refund = safe_sub(remaining, fee)?;
            batch = batch
                .release(quote, taxed)
                .payout(owner, quote, refund)
                .fee(position.pair()?, quote, fee);
            (PositionStatus::Cancelled, refund, fee)
        };
        sink.apply(self.router, batch.updates())?;

        let record = ExitRecord {
            reason,
            price: Some(price),
            payout,
            fee,
            timestamp: ctx.timestamp,
        };
        self.position_mut(id)?.finish(status, record);
        if deficit > 0 {
            if let Some(account) = self.accounts.get_mut(&owner) {
                account.user_base_margin = safe_sub(account.user_base_margin, deficit)?;
            }
            warn!(position = id, %owner, deficit, "cross loss covered from account margin");
        }
        self.refresh_liquidation_prices(owner)?;
        info!(position = id, ?reason, price, payout, fee, "cross position exited");

        // A deficit may leave the remaining positions uncovered
        let nuke = if !self.is_solvent(oracle, owner)? {
            Some(self.nuke(sink, owner, None, ctx.timestamp)?)
        } else {
            None
        };
        Ok(CrossExit { record, nuke })
    }

    /// Nuke an account found insolvent at current prices
    pub fn liquidate_account<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        ctx: &CallContext,
        owner: AccountId,
    ) -> LedgerResult<NukeReport> {
        self.account(owner)?;
        if self.active_positions(owner).next().is_none() || self.is_solvent(oracle, owner)? {
            return Err(LedgerError::TriggerNotReached);
        }
        self.nuke(sink, owner, None, ctx.timestamp)
    }

    /// Release all of the account's margin to the pool and close every Active position
    fn nuke<S: SettlementSink>(
        &mut self,
        sink: &mut S,
        owner: AccountId,
        trigger: Option<(u64, u128)>,
        now: i64,
    ) -> LedgerResult<NukeReport> {
        let account = self.account(owner)?;
        let base = account.base_asset;
        let mut seized = account.user_base_margin;
        let mut closed = Vec::new();
        for position in self.active_positions(owner) {
            seized = safe_add(seized, position.taxed_margin)?;
            closed.push(position.id);
        }

        let batch = SettlementBatch::new().release(base, seized);
        sink.apply(self.router, batch.updates())?;

        for &id in &closed {
            let (reason, price) = match trigger {
                Some((trigger_id, price)) if trigger_id == id => (ExitReason::Liquidation, Some(price)),
                _ => (ExitReason::AccountLiquidation, None),
            };
            let record = ExitRecord {
                reason,
                price,
                payout: 0,
                fee: 0,
                timestamp: now,
            };
            self.position_mut(id)?.finish(PositionStatus::Closed, record);
        }
        if let Some(account) = self.accounts.get_mut(&owner) {
            account.user_base_margin = 0;
            account.liquidations += 1;
        }

        warn!(%owner, seized, positions = closed.len(), "cross account liquidated");
        Ok(NukeReport {
            owner,
            seized,
            closed,
        })
    }

    /// Refund a Pending order in full
    pub fn cancel_position<S: SettlementSink>(
        &mut self,
        sink: &mut S,
        ctx: &CallContext,
        id: u64,
    ) -> LedgerResult<ExitRecord> {
        let position = self.position(id)?;
        position.ensure_status(PositionStatus::Pending)?;
        position.ensure_owner(ctx.caller)?;

        let refund = position.escrow()?;
        let batch = SettlementBatch::new()
            .release(position.quote_token, refund)
            .payout(position.owner, position.quote_token, refund);
        sink.apply(self.router, batch.updates())?;

        let record = ExitRecord {
            reason: ExitReason::Cancelled,
            price: None,
            payout: refund,
            fee: 0,
            timestamp: ctx.timestamp,
        };
        self.position_mut(id)?.finish(PositionStatus::Cancelled, record);
        info!(position = id, refund, "cross order cancelled");
        Ok(record)
    }

    pub fn set_take_profit(&mut self, ctx: &CallContext, id: u64, price: u128) -> LedgerResult<()> {
        self.position_mut(id)?.set_take_profit(ctx.caller, price)
    }

    pub fn set_stop_loss(&mut self, ctx: &CallContext, id: u64, price: u128) -> LedgerResult<()> {
        self.position_mut(id)?.set_stop_loss(ctx.caller, price)
    }
}
