//! # Isolated Position Ledger
//!
//! Positions whose margin backs only themselves. Each state transition
//! computes its figures from the oracle price, submits exactly one settlement
//! batch to the pool and only then updates the record.

use std::collections::BTreeMap;

use margin_core::math::{holding_fee, isolated_margin_ratio, leverage_amount, liquidation_price, safe_sub};
use margin_core::{
    AccountId, ExitReason, ExitRecord, LedgerError, LedgerResult, PositionStatus, RecordKind,
    SettlementBatch,
};
use tracing::{debug, info, warn};

use crate::context::CallContext;
use crate::oracle::PriceOracle;
use crate::position::{margin_after_pnl, LedgerParams, OpenRequest, Position};
use crate::settlement::SettlementSink;

#[derive(Debug, Clone)]
pub struct IsolatedLedger {
    /// Router identity used when settling against the pool
    router: AccountId,
    params: LedgerParams,
    positions: BTreeMap<u64, Position>,
    next_id: u64,
}

impl IsolatedLedger {
    pub fn new(router: AccountId, params: LedgerParams) -> Self {
        Self {
            router,
            params,
            positions: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn router(&self) -> AccountId {
        self.router
    }

    pub fn params(&self) -> &LedgerParams {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: LedgerParams) {
        self.params = params;
    }

    pub fn position(&self, id: u64) -> LedgerResult<&Position> {
        self.positions
            .get(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::Position, id))
    }

    fn position_mut(&mut self, id: u64) -> LedgerResult<&mut Position> {
        self.positions
            .get_mut(&id)
            .ok_or_else(|| LedgerError::not_found(RecordKind::Position, id))
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    // ========================================================================
    // Open
    // ========================================================================

    /// Escrow margin and record a Pending position; market orders execute immediately
    pub fn open_position<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        ctx: &CallContext,
        request: OpenRequest,
    ) -> LedgerResult<u64> {
        let id = self.next_id;
        let position = Position::pending(id, ctx.caller, &request, &self.params, ctx.timestamp)?;

        // Market orders read the price before anything is escrowed
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
            "isolated position opened"
        );
        self.positions.insert(id, position);
        self.next_id += 1;

        if let Some(price) = market_price {
            self.activate(sink, id, price, ctx.timestamp)?;
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

    // ========================================================================
    // Execute
    // ========================================================================

    /// Activate a Pending limit order once the oracle price crosses its entry
    pub fn execute_position<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        ctx: &CallContext,
        id: u64,
    ) -> LedgerResult<()> {
        let position = self.position(id)?;
        position.ensure_status(PositionStatus::Pending)?;
        let price = oracle.price(position.base_token, position.quote_token)?;
        if !position.entry_reached(price) {
            return Err(LedgerError::TriggerNotReached);
        }
        self.activate(sink, id, price, ctx.timestamp)
    }

    fn activate<S: SettlementSink>(&mut self, sink: &mut S, id: u64, price: u128, now: i64) -> LedgerResult<()> {
        let position = self.position(id)?;
        position.ensure_status(PositionStatus::Pending)?;

        let entry = if position.entry_price == 0 {
            price
        } else {
            position.entry_price
        };
        position.validate_levels(entry)?;

        let exposure = leverage_amount(position.taxed_margin, position.leverage, entry)?;
        let ratio = isolated_margin_ratio(position.taxed_margin, position.excess_margin, position.leverage)?;
        let liquidation = liquidation_price(position.direction, entry, ratio)?;
        debug!(position = id, entry, exposure, ratio, liquidation, "isolated position priced");

        let batch = SettlementBatch::new()
            .release(position.quote_token, position.entry_fee)
            .fee(position.pair()?, position.quote_token, position.entry_fee);
        sink.apply(self.router, batch.updates())?;

        let position = self.position_mut(id)?;
        position.activate(entry, exposure, liquidation, now);
        info!(position = id, entry, liquidation, "isolated position active");
        Ok(())
    }

    // ========================================================================
    // Exit
    // ========================================================================

    /// Close an Active position on liquidation, take-profit, stop-loss or owner request
    pub fn exit_position<S: SettlementSink, O: PriceOracle>(
        &mut self,
        sink: &mut S,
        oracle: &O,
        ctx: &CallContext,
        id: u64,
    ) -> LedgerResult<ExitRecord> {
        let position = self.position(id)?;
        position.ensure_status(PositionStatus::Active)?;
        let price = oracle.price(position.base_token, position.quote_token)?;

        let reason = match position.exit_trigger(price) {
            Some(reason) => reason,
            None if ctx.caller == position.owner => ExitReason::ManualClose,
            None => return Err(LedgerError::TriggerNotReached),
        };

        let margin = position.margin()?;
        let pnl = position.pnl(price)?;
        let quote = position.quote_token;
        let mut batch = SettlementBatch::new().release(quote, margin);

        let (status, payout, fee) = match reason {
            ExitReason::Liquidation => (PositionStatus::Closed, 0, 0),
            ExitReason::TakeProfit => {
                let payout = margin_after_pnl(margin, pnl)?;
                batch = batch.payout(position.owner, quote, payout);
                (PositionStatus::Closed, payout, 0)
            }
            _ => {
                let remaining = margin_after_pnl(margin, pnl)?;
                let fee = holding_fee(remaining, self.params.holding_fee_bps_per_hour, position.active_for(ctx.timestamp))?;
                let refund = safe_sub(remaining, fee)?;
                batch = batch
                    .payout(position.owner, quote, refund)
                    .fee(position.pair()?, quote, fee);
                (PositionStatus::Cancelled, refund, fee)
            }
        };
        sink.apply(self.router, batch.updates())?;

        let record = ExitRecord {
            reason,
            price: Some(price),
            payout,
            fee,
            timestamp: ctx.timestamp,
        };
        if reason == ExitReason::Liquidation {
            warn!(position = id, owner = %position.owner, price, margin, "isolated position liquidated");
        } else {
            info!(position = id, ?reason, price, payout, fee, "isolated position exited");
        }
        self.position_mut(id)?.finish(status, record);
        Ok(record)
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
        info!(position = id, refund, "isolated order cancelled");
        Ok(record)
    }

    pub fn set_take_profit(&mut self, ctx: &CallContext, id: u64, price: u128) -> LedgerResult<()> {
        self.position_mut(id)?.set_take_profit(ctx.caller, price)?;
        debug!(position = id, price, "take-profit set");
        Ok(())
    }

    pub fn set_stop_loss(&mut self, ctx: &CallContext, id: u64, price: u128) -> LedgerResult<()> {
        self.position_mut(id)?.set_stop_loss(ctx.caller, price)?;
        debug!(position = id, price, "stop-loss set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::StaticOracle;
    use crate::settlement::RecordingSink;
    use margin_core::{Direction, Pair, SettlementUpdate, TokenId, WAD};

    const ROUTER: AccountId = AccountId(100);
    const TRADER: AccountId = AccountId(7);
    const KEEPER: AccountId = AccountId(8);
    const ETH: TokenId = TokenId(1);
    const USDC: TokenId = TokenId(2);

    fn setup(price: u128) -> (IsolatedLedger, RecordingSink, StaticOracle) {
        let ledger = IsolatedLedger::new(
            ROUTER,
            LedgerParams {
                max_leverage: 100,
                holding_fee_bps_per_hour: 10,
            },
        );
        let mut oracle = StaticOracle::new();
        oracle.set_reserves(ETH, USDC, WAD, price);
        (ledger, RecordingSink::default(), oracle)
    }

    fn ctx(caller: AccountId, timestamp: i64) -> CallContext {
        CallContext::new(caller, timestamp)
    }

    fn long(margin: u128, leverage: u32) -> OpenRequest {
        OpenRequest::market(ETH, USDC, Direction::Long, margin, leverage)
    }

    #[test]
    fn test_market_open_activates_and_forwards_fee() {
        let (mut ledger, mut sink, oracle) = setup(100 * WAD);
        let id = ledger
            .open_position(&mut sink, &oracle, &ctx(TRADER, 0), long(1_000 * WAD, 5))
            .unwrap();

        let position = ledger.position(id).unwrap();
        assert_eq!(position.status, PositionStatus::Active);
        assert_eq!(position.entry_price, 100 * WAD);
        assert_eq!(position.leverage_amount, Some(48 * WAD));
        assert_eq!(position.liquidation_price, Some(80 * WAD));

        let pair = Pair::new(ETH, USDC).unwrap();
        assert_eq!(sink.batches.len(), 2);
        assert_eq!(
            sink.batches[0].1,
            vec![SettlementUpdate::Reserve {
                from: TRADER,
                token: USDC,
                amount: 1_000 * WAD
            }]
        );
        assert_eq!(
            sink.batches[1].1,
            vec![
                SettlementUpdate::Release {
                    token: USDC,
                    amount: 40 * WAD
                },
                SettlementUpdate::Fee {
                    pair,
                    token: USDC,
                    amount: 40 * WAD
                },
            ]
        );
        assert!(sink.batches.iter().all(|(router, _)| *router == ROUTER));
    }

    #[test]
    fn test_limit_order_waits_for_trigger() {
        let (mut ledger, mut sink, mut oracle) = setup(100 * WAD);
        let id = ledger
            .create_wind_order(&mut sink, &oracle, &ctx(TRADER, 0), long(1_000 * WAD, 5).with_entry_price(95 * WAD))
            .unwrap();
        assert_eq!(ledger.position(id).unwrap().status, PositionStatus::Pending);

        assert_eq!(
            ledger.execute_position(&mut sink, &oracle, &ctx(KEEPER, 10), id),
            Err(LedgerError::TriggerNotReached)
        );

        oracle.set_reserves(ETH, USDC, WAD, 94 * WAD);
        ledger.execute_position(&mut sink, &oracle, &ctx(KEEPER, 10), id).unwrap();
        let position = ledger.position(id).unwrap();
        assert_eq!(position.status, PositionStatus::Active);
        // Fills at the limit price
        assert_eq!(position.entry_price, 95 * WAD);
        assert_eq!(position.activated_at, Some(10));
    }

    #[test]
    fn test_wind_order_requires_entry_price() {
        let (mut ledger, mut sink, oracle) = setup(100 * WAD);
        assert!(ledger
            .create_wind_order(&mut sink, &oracle, &ctx(TRADER, 0), long(WAD, 2))
            .is_err());
        assert!(sink.batches.is_empty());
    }

    #[test]
    fn test_execute_twice_rejected() {
        let (mut ledger, mut sink, oracle) = setup(100 * WAD);
        let id = ledger
            .open_position(&mut sink, &oracle, &ctx(TRADER, 0), long(1_000 * WAD, 5))
            .unwrap();
        let before = ledger.position(id).unwrap().clone();

        for _ in 0..2 {
            assert_eq!(
                ledger.execute_position(&mut sink, &oracle, &ctx(KEEPER, 5), id),
                Err(LedgerError::state_mismatch(PositionStatus::Pending, PositionStatus::Active))
            );
        }
        assert_eq!(ledger.position(id).unwrap(), &before);
    }

    #[test]
    fn test_liquidation_releases_margin_without_payout() {
        let (mut ledger, mut sink, mut oracle) = setup(100 * WAD);
        let id = ledger
            .open_position(&mut sink, &oracle, &ctx(TRADER, 0), long(1_000 * WAD, 5))
            .unwrap();

        oracle.set_reserves(ETH, USDC, WAD, 80 * WAD);
        let record = ledger.exit_position(&mut sink, &oracle, &ctx(KEEPER, 60), id).unwrap();
        assert_eq!(record.reason, ExitReason::Liquidation);
        assert_eq!(record.payout, 0);
        assert_eq!(ledger.position(id).unwrap().status, PositionStatus::Closed);
        assert_eq!(
            sink.batches.last().unwrap().1,
            vec![SettlementUpdate::Release {
                token: USDC,
                amount: 960 * WAD
            }]
        );
    }

    #[test]
    fn test_take_profit_pays_margin_plus_profit() {
        let (mut ledger, mut sink, mut oracle) = setup(100 * WAD);
        let id = ledger
            .open_position(
                &mut sink,
                &oracle,
                &ctx(TRADER, 0),
                long(1_000 * WAD, 5).with_take_profit(110 * WAD),
            )
            .unwrap();

        oracle.set_reserves(ETH, USDC, WAD, 110 * WAD);
        let record = ledger.exit_position(&mut sink, &oracle, &ctx(KEEPER, 60), id).unwrap();
        assert_eq!(record.reason, ExitReason::TakeProfit);
        // 960 margin + 48 ETH * 10 USDC
        assert_eq!(record.payout, 1_440 * WAD);
        assert_eq!(ledger.position(id).unwrap().status, PositionStatus::Closed);
    }

    #[test]
    fn test_manual_close_charges_holding_fee() {
        let (mut ledger, mut sink, oracle) = setup(100 * WAD);
        let id = ledger
            .open_position(&mut sink, &oracle, &ctx(TRADER, 0), long(1_000 * WAD, 5))
            .unwrap();

        // Only the owner may close without a trigger
        assert_eq!(
            ledger.exit_position(&mut sink, &oracle, &ctx(KEEPER, 7_200), id),
            Err(LedgerError::TriggerNotReached)
        );

        let record = ledger.exit_position(&mut sink, &oracle, &ctx(TRADER, 7_200), id).unwrap();
        assert_eq!(record.reason, ExitReason::ManualClose);
        // Two hours at 0.1% of 960
        assert_eq!(record.fee, 1_920_000_000_000_000_000);
        assert_eq!(record.payout + record.fee, 960 * WAD);
        assert_eq!(ledger.position(id).unwrap().status, PositionStatus::Cancelled);
    }

    #[test]
    fn test_stop_loss_refunds_remaining_margin() {
        let (mut ledger, mut sink, mut oracle) = setup(100 * WAD);
        let id = ledger
            .open_position(
                &mut sink,
                &oracle,
                &ctx(TRADER, 0),
                long(1_000 * WAD, 5).with_stop_loss(90 * WAD),
            )
            .unwrap();

        oracle.set_reserves(ETH, USDC, WAD, 90 * WAD);
        let record = ledger.exit_position(&mut sink, &oracle, &ctx(KEEPER, 100), id).unwrap();
        assert_eq!(record.reason, ExitReason::StopLoss);
        // 960 - 48 * 10, no whole hour elapsed
        assert_eq!(record.payout, 480 * WAD);
        assert_eq!(record.fee, 0);
    }

    #[test]
    fn test_cancel_pending_refunds_in_full() {
        let (mut ledger, mut sink, oracle) = setup(100 * WAD);
        let id = ledger
            .create_wind_order(
                &mut sink,
                &oracle,
                &ctx(TRADER, 0),
                long(1_000 * WAD, 5).with_entry_price(90 * WAD).with_excess_margin(100 * WAD),
            )
            .unwrap();

        assert_eq!(
            ledger.cancel_position(&mut sink, &ctx(KEEPER, 1), id),
            Err(LedgerError::Unauthorized { caller: KEEPER })
        );

        let record = ledger.cancel_position(&mut sink, &ctx(TRADER, 1), id).unwrap();
        assert_eq!(record.payout, 1_100 * WAD);
        assert_eq!(ledger.position(id).unwrap().status, PositionStatus::Cancelled);
        assert_eq!(
            ledger.cancel_position(&mut sink, &ctx(TRADER, 2), id),
            Err(LedgerError::state_mismatch(PositionStatus::Pending, PositionStatus::Cancelled))
        );
    }

    #[test]
    fn test_stale_price_aborts_market_open() {
        let (mut ledger, mut sink, mut oracle) = setup(100 * WAD);
        oracle.remove(ETH, USDC);
        assert_eq!(
            ledger.open_position(&mut sink, &oracle, &ctx(TRADER, 0), long(WAD, 2)),
            Err(LedgerError::StalePrice)
        );
        assert!(sink.batches.is_empty());
        assert_eq!(ledger.positions().count(), 0);
    }

    #[test]
    fn test_rejected_settlement_leaves_no_record() {
        let (mut ledger, mut sink, oracle) = setup(100 * WAD);
        sink.reject_with = Some(LedgerError::Unauthorized { caller: ROUTER });
        assert!(ledger
            .open_position(&mut sink, &oracle, &ctx(TRADER, 0), long(WAD, 2))
            .is_err());
        assert!(ledger.position(0).is_err());
    }
}
