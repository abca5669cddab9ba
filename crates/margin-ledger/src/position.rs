//! # Position Records
//!
//! The record shared by the isolated and cross-margin ledgers together with
//! the lifecycle checks both apply: `Pending -> Active -> {Closed, Cancelled}`
//! and `Pending -> Cancelled`. Records are never removed; terminal records
//! carry an [`ExitRecord`].

use margin_core::math::{entry_fee_split, safe_add, unrealized_pnl};
use margin_core::{
    AccountId, Direction, ExitReason, ExitRecord, LedgerError, LedgerResult, Pair,
    PositionStatus, TokenId, MIN_LEVERAGE,
};
use serde::{Deserialize, Serialize};

/// Parameters of a new position or limit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    /// Traded token
    pub base_token: TokenId,
    /// Margin and settlement token
    pub quote_token: TokenId,
    pub direction: Direction,
    pub initial_margin: u128,
    pub excess_margin: u128,
    pub leverage: u32,
    /// Limit price; zero executes at the oracle price
    pub entry_price: u128,
    pub take_profit: Option<u128>,
    pub stop_loss: Option<u128>,
}

impl OpenRequest {
    /// Market order without excess margin or exit levels
    pub fn market(base_token: TokenId, quote_token: TokenId, direction: Direction, initial_margin: u128, leverage: u32) -> Self {
        Self {
            base_token,
            quote_token,
            direction,
            initial_margin,
            excess_margin: 0,
            leverage,
            entry_price: 0,
            take_profit: None,
            stop_loss: None,
        }
    }

    pub fn with_entry_price(mut self, entry_price: u128) -> Self {
        self.entry_price = entry_price;
        self
    }

    pub fn with_excess_margin(mut self, excess_margin: u128) -> Self {
        self.excess_margin = excess_margin;
        self
    }

    pub fn with_take_profit(mut self, price: u128) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, price: u128) -> Self {
        self.stop_loss = Some(price);
        self
    }
}

/// Ledger-wide risk parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerParams {
    pub max_leverage: u32,
    pub holding_fee_bps_per_hour: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub owner: AccountId,
    pub direction: Direction,
    pub base_token: TokenId,
    pub quote_token: TokenId,
    pub initial_margin: u128,
    pub entry_fee: u128,
    pub taxed_margin: u128,
    pub excess_margin: u128,
    pub leverage: u32,
    /// Exposure in base units, known once active
    pub leverage_amount: Option<u128>,
    /// Zero for a market order until it executes
    pub entry_price: u128,
    pub liquidation_price: Option<u128>,
    pub take_profit: Option<u128>,
    pub stop_loss: Option<u128>,
    pub status: PositionStatus,
    pub opened_at: i64,
    pub activated_at: Option<i64>,
    pub closed_at: Option<i64>,
    pub exit: Option<ExitRecord>,
}

impl Position {
    /// Validate a request and build the Pending record
    pub(crate) fn pending(
        id: u64,
        owner: AccountId,
        request: &OpenRequest,
        params: &LedgerParams,
        now: i64,
    ) -> LedgerResult<Self> {
        if request.leverage < MIN_LEVERAGE || request.leverage > params.max_leverage {
            return Err(LedgerError::InvalidParameter("leverage out of range"));
        }
        if request.initial_margin == 0 {
            return Err(LedgerError::InvalidParameter("initial margin must be positive"));
        }
        Pair::new(request.base_token, request.quote_token)?;
        safe_add(request.initial_margin, request.excess_margin)?;

        let (entry_fee, taxed_margin) = entry_fee_split(request.initial_margin, request.leverage)?;
        let position = Self {
            id,
            owner,
            direction: request.direction,
            base_token: request.base_token,
            quote_token: request.quote_token,
            initial_margin: request.initial_margin,
            entry_fee,
            taxed_margin,
            excess_margin: request.excess_margin,
            leverage: request.leverage,
            leverage_amount: None,
            entry_price: request.entry_price,
            liquidation_price: None,
            take_profit: request.take_profit,
            stop_loss: request.stop_loss,
            status: PositionStatus::Pending,
            opened_at: now,
            activated_at: None,
            closed_at: None,
            exit: None,
        };
        if position.entry_price > 0 {
            position.validate_levels(position.entry_price)?;
        }
        Ok(position)
    }

    pub fn pair(&self) -> LedgerResult<Pair> {
        Pair::new(self.base_token, self.quote_token)
    }

    /// Margin backing the position after the entry fee
    pub fn margin(&self) -> LedgerResult<u128> {
        safe_add(self.taxed_margin, self.excess_margin)
    }

    /// Amount escrowed at open
    pub fn escrow(&self) -> LedgerResult<u128> {
        safe_add(self.initial_margin, self.excess_margin)
    }

    pub fn ensure_status(&self, expected: PositionStatus) -> LedgerResult<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(LedgerError::state_mismatch(expected, self.status))
        }
    }

    pub fn ensure_owner(&self, caller: AccountId) -> LedgerResult<()> {
        if self.owner == caller {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { caller })
        }
    }

    /// Whether a Pending order fills at `price`
    pub fn entry_reached(&self, price: u128) -> bool {
        self.entry_price == 0 || self.direction.entry_reached(price, self.entry_price)
    }

    /// Trigger an Active position hits at `price`, in exit priority order
    pub fn exit_trigger(&self, price: u128) -> Option<ExitReason> {
        if self.status != PositionStatus::Active {
            return None;
        }
        if let Some(liquidation) = self.liquidation_price {
            if self.direction.liquidation_reached(price, liquidation) {
                return Some(ExitReason::Liquidation);
            }
        }
        if let Some(target) = self.take_profit {
            if self.direction.take_profit_reached(price, target) {
                return Some(ExitReason::TakeProfit);
            }
        }
        if let Some(stop) = self.stop_loss {
            if self.direction.stop_loss_reached(price, stop) {
                return Some(ExitReason::StopLoss);
            }
        }
        None
    }

    /// Signed PnL in quote units; zero while pending
    pub fn pnl(&self, price: u128) -> LedgerResult<i128> {
        match self.leverage_amount {
            Some(amount) => unrealized_pnl(self.direction, amount, self.entry_price, price),
            None => Ok(0),
        }
    }

    /// Exit levels must sit on the correct side of `entry_price`
    pub(crate) fn validate_levels(&self, entry_price: u128) -> LedgerResult<()> {
        if let Some(target) = self.take_profit {
            if !self.direction.valid_take_profit(entry_price, target) {
                return Err(LedgerError::InvalidParameter("take-profit on the wrong side of entry"));
            }
        }
        if let Some(stop) = self.stop_loss {
            if !self.direction.valid_stop_loss(entry_price, stop) {
                return Err(LedgerError::InvalidParameter("stop-loss on the wrong side of entry"));
            }
        }
        Ok(())
    }

    fn ensure_open(&self, caller: AccountId) -> LedgerResult<()> {
        self.ensure_owner(caller)?;
        if self.status.is_terminal() {
            return Err(LedgerError::state_mismatch(PositionStatus::Active, self.status));
        }
        Ok(())
    }

    /// Set or clear (`price == 0`) the take-profit level
    pub(crate) fn set_take_profit(&mut self, caller: AccountId, price: u128) -> LedgerResult<()> {
        self.ensure_open(caller)?;
        let previous = self.take_profit;
        self.take_profit = (price > 0).then_some(price);
        if self.entry_price > 0 {
            if let Err(err) = self.validate_levels(self.entry_price) {
                self.take_profit = previous;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Set or clear (`price == 0`) the stop-loss level
    pub(crate) fn set_stop_loss(&mut self, caller: AccountId, price: u128) -> LedgerResult<()> {
        self.ensure_open(caller)?;
        let previous = self.stop_loss;
        self.stop_loss = (price > 0).then_some(price);
        if self.entry_price > 0 {
            if let Err(err) = self.validate_levels(self.entry_price) {
                self.stop_loss = previous;
                return Err(err);
            }
        }
        Ok(())
    }

    pub(crate) fn activate(&mut self, entry_price: u128, leverage_amount: u128, liquidation_price: u128, now: i64) {
        self.entry_price = entry_price;
        self.leverage_amount = Some(leverage_amount);
        self.liquidation_price = Some(liquidation_price);
        self.status = PositionStatus::Active;
        self.activated_at = Some(now);
    }

    pub(crate) fn finish(&mut self, status: PositionStatus, record: ExitRecord) {
        self.status = status;
        self.closed_at = Some(record.timestamp);
        self.exit = Some(record);
    }

    /// Seconds the position has been active at `now`
    pub fn active_for(&self, now: i64) -> i64 {
        self.activated_at.map_or(0, |at| now.saturating_sub(at))
    }
}

/// Margin left after applying a signed PnL, floored at zero
pub(crate) fn margin_after_pnl(margin: u128, pnl: i128) -> LedgerResult<u128> {
    if pnl >= 0 {
        safe_add(margin, pnl.unsigned_abs())
    } else {
        Ok(margin.saturating_sub(pnl.unsigned_abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use margin_core::WAD;

    const OWNER: AccountId = AccountId(7);
    const ETH: TokenId = TokenId(1);
    const USDC: TokenId = TokenId(2);

    fn params() -> LedgerParams {
        LedgerParams {
            max_leverage: 100,
            holding_fee_bps_per_hour: 10,
        }
    }

    #[test]
    fn test_pending_splits_entry_fee() {
        let request = OpenRequest::market(ETH, USDC, Direction::Long, 1_000 * WAD, 5);
        let position = Position::pending(0, OWNER, &request, &params(), 0).unwrap();
        assert_eq!(position.entry_fee, 40 * WAD);
        assert_eq!(position.taxed_margin, 960 * WAD);
        assert_eq!(position.status, PositionStatus::Pending);
        assert_eq!(position.leverage_amount, None);
    }

    #[test]
    fn test_pending_rejects_bad_requests() {
        let request = OpenRequest::market(ETH, USDC, Direction::Long, 1_000 * WAD, 101);
        assert!(Position::pending(0, OWNER, &request, &params(), 0).is_err());

        let request = OpenRequest::market(ETH, USDC, Direction::Long, 0, 5);
        assert!(Position::pending(0, OWNER, &request, &params(), 0).is_err());

        let request = OpenRequest::market(ETH, ETH, Direction::Long, WAD, 5);
        assert!(Position::pending(0, OWNER, &request, &params(), 0).is_err());

        let request = OpenRequest::market(ETH, USDC, Direction::Short, WAD, 5)
            .with_entry_price(100 * WAD)
            .with_take_profit(120 * WAD);
        assert_eq!(
            Position::pending(0, OWNER, &request, &params(), 0).unwrap_err(),
            LedgerError::InvalidParameter("take-profit on the wrong side of entry")
        );
    }

    #[test]
    fn test_exit_trigger_priority() {
        let request = OpenRequest::market(ETH, USDC, Direction::Long, 1_000 * WAD, 5)
            .with_take_profit(120 * WAD)
            .with_stop_loss(90 * WAD);
        let mut position = Position::pending(0, OWNER, &request, &params(), 0).unwrap();
        assert_eq!(position.exit_trigger(50 * WAD), None);

        position.activate(100 * WAD, 48 * WAD, 80 * WAD, 0);
        assert_eq!(position.exit_trigger(100 * WAD), None);
        assert_eq!(position.exit_trigger(125 * WAD), Some(ExitReason::TakeProfit));
        assert_eq!(position.exit_trigger(85 * WAD), Some(ExitReason::StopLoss));
        assert_eq!(position.exit_trigger(80 * WAD), Some(ExitReason::Liquidation));
    }

    #[test]
    fn test_levels_restored_on_rejection() {
        let request = OpenRequest::market(ETH, USDC, Direction::Long, WAD, 2).with_entry_price(100 * WAD);
        let mut position = Position::pending(0, OWNER, &request, &params(), 0).unwrap();

        position.set_stop_loss(OWNER, 90 * WAD).unwrap();
        assert!(position.set_stop_loss(OWNER, 110 * WAD).is_err());
        assert_eq!(position.stop_loss, Some(90 * WAD));

        assert_eq!(
            position.set_take_profit(AccountId(8), 120 * WAD),
            Err(LedgerError::Unauthorized { caller: AccountId(8) })
        );
        position.set_stop_loss(OWNER, 0).unwrap();
        assert_eq!(position.stop_loss, None);
    }

    #[test]
    fn test_margin_after_pnl_floors_at_zero() {
        assert_eq!(margin_after_pnl(100, 20).unwrap(), 120);
        assert_eq!(margin_after_pnl(100, -30).unwrap(), 70);
        assert_eq!(margin_after_pnl(100, -300).unwrap(), 0);
    }
}
