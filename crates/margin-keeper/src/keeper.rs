use margin_core::{AccountId, LedgerError, PositionStatus};
use margin_ledger::{CallContext, Custody, Engine, Position, PriceOracle};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Ledger record a scan acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanTarget {
    Isolated(u64),
    Cross(u64),
    Account(AccountId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub target: ScanTarget,
    pub error: LedgerError,
}

/// Outcome of one pass over the ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub executed: usize,
    pub exited: usize,
    pub accounts_liquidated: usize,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    pub fn actions(&self) -> usize {
        self.executed + self.exited + self.accounts_liquidated
    }
}

enum Action {
    Execute,
    Exit,
}

/// Off-chain caller that fires every trigger the oracle price has reached
#[derive(Debug, Clone, Copy)]
pub struct Keeper {
    id: AccountId,
}

impl Keeper {
    pub fn new(id: AccountId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Execute reached limit orders, exit triggered positions and nuke insolvent accounts
    pub fn scan<O: PriceOracle, C: Custody + Clone>(&self, engine: &mut Engine<O, C>, now: i64) -> ScanReport {
        let ctx = CallContext::new(self.id, now);
        let mut report = ScanReport::default();

        let isolated: Vec<u64> = engine.isolated().positions().map(|p| p.id).collect();
        for id in isolated {
            let action = match engine.isolated().position(id) {
                Ok(position) => self.due(engine, position),
                Err(_) => continue,
            };
            let result = match action {
                Some(Action::Execute) => engine.execute_position(&ctx, id).map(|_| Action::Execute),
                Some(Action::Exit) => engine.exit_position(&ctx, id).map(|_| Action::Exit),
                None => continue,
            };
            report.record(ScanTarget::Isolated(id), result);
        }

        // Positions are re-read before acting: a nuke may close later ones
        let cross: Vec<u64> = engine.cross().positions().map(|p| p.id).collect();
        for id in cross {
            let action = match engine.cross().position(id) {
                Ok(position) => self.due(engine, position),
                Err(_) => continue,
            };
            let result = match action {
                Some(Action::Execute) => engine.cross_execute_position(&ctx, id).map(|nuke| {
                    if let Some(nuke) = nuke {
                        debug!(owner = %nuke.owner, seized = nuke.seized, "fill left account insolvent");
                        report.accounts_liquidated += 1;
                    }
                    Action::Execute
                }),
                Some(Action::Exit) => engine.cross_exit_position(&ctx, id).map(|_| Action::Exit),
                None => continue,
            };
            report.record(ScanTarget::Cross(id), result);
        }

        let owners: Vec<AccountId> = engine
            .cross()
            .accounts()
            .map(|account| account.owner)
            .filter(|owner| {
                engine
                    .cross()
                    .positions()
                    .any(|p| p.owner == *owner && p.status == PositionStatus::Active)
            })
            .collect();
        for owner in owners {
            match engine.is_account_solvent(owner) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(error) => {
                    report.fail(ScanTarget::Account(owner), error);
                    continue;
                }
            }
            match engine.liquidate_account(&ctx, owner) {
                Ok(nuke) => {
                    debug!(%owner, seized = nuke.seized, "insolvent account liquidated");
                    report.accounts_liquidated += 1;
                }
                Err(error) => report.fail(ScanTarget::Account(owner), error),
            }
        }

        if report.actions() > 0 || !report.failures.is_empty() {
            info!(
                executed = report.executed,
                exited = report.exited,
                accounts_liquidated = report.accounts_liquidated,
                failures = report.failures.len(),
                "scan complete"
            );
        } else {
            debug!(now, "scan found nothing to do");
        }
        report
    }

    /// Trigger due on `position` at the current oracle price
    fn due<O: PriceOracle, C: Custody + Clone>(&self, engine: &Engine<O, C>, position: &Position) -> Option<Action> {
        if position.status.is_terminal() {
            return None;
        }
        let price = match engine.price(position.base_token, position.quote_token) {
            Ok(price) => price,
            Err(error) => {
                warn!(position = position.id, %error, "no price for position");
                return None;
            }
        };
        match position.status {
            PositionStatus::Pending if position.entry_reached(price) => Some(Action::Execute),
            PositionStatus::Active if position.exit_trigger(price).is_some() => Some(Action::Exit),
            _ => None,
        }
    }
}

impl ScanReport {
    fn record(&mut self, target: ScanTarget, result: Result<Action, LedgerError>) {
        match result {
            Ok(Action::Execute) => self.executed += 1,
            Ok(Action::Exit) => self.exited += 1,
            Err(error) => self.fail(target, error),
        }
    }

    fn fail(&mut self, target: ScanTarget, error: LedgerError) {
        warn!(?target, %error, "keeper action failed");
        self.failures.push(ScanFailure { target, error });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use margin_core::{Direction, ExitReason, Holder, TokenId, WAD};
    use margin_ledger::{Bank, LedgerConfig, OpenRequest, StaticOracle};

    const ETH: TokenId = TokenId(1);
    const USDC: TokenId = TokenId(2);
    const TRADER: AccountId = AccountId(20);

    fn engine() -> Engine<StaticOracle, Bank> {
        let config = LedgerConfig::default();
        let mut bank = config.bank().unwrap();
        bank.mint(Holder::Account(TRADER), USDC, 10_000_000_000).unwrap();
        let mut oracle = StaticOracle::new();
        oracle.set_reserves(ETH, USDC, WAD, 100 * WAD);
        Engine::new(&config, oracle, bank).unwrap()
    }

    #[test]
    fn test_scan_executes_then_liquidates() {
        let mut engine = engine();
        let keeper = Keeper::new(AccountId(9));
        let ctx = CallContext::new(TRADER, 0);
        let id = engine
            .create_wind_order(
                &ctx,
                OpenRequest::market(ETH, USDC, Direction::Long, 1_000 * WAD, 5).with_entry_price(95 * WAD),
            )
            .unwrap();

        assert_eq!(keeper.scan(&mut engine, 10), ScanReport::default());

        engine.oracle_mut().set_reserves(ETH, USDC, WAD, 95 * WAD);
        let report = keeper.scan(&mut engine, 20);
        assert_eq!(report.executed, 1);
        assert_eq!(engine.isolated().position(id).unwrap().liquidation_price, Some(76 * WAD));

        engine.oracle_mut().set_reserves(ETH, USDC, WAD, 70 * WAD);
        let report = keeper.scan(&mut engine, 30);
        assert_eq!(report.exited, 1);
        let exit = engine.isolated().position(id).unwrap().exit.unwrap();
        assert_eq!(exit.reason, ExitReason::Liquidation);
    }

    #[test]
    fn test_scan_counts_liquidation_on_gapped_cross_fill() {
        let mut engine = engine();
        let keeper = Keeper::new(AccountId(9));
        let id = engine
            .cross_create_wind_order(
                &CallContext::new(TRADER, 0),
                OpenRequest::market(ETH, USDC, Direction::Long, 1_000 * WAD, 5).with_entry_price(100 * WAD),
            )
            .unwrap();

        engine.oracle_mut().set_reserves(ETH, USDC, WAD, 60 * WAD);
        let report = keeper.scan(&mut engine, 10);
        assert_eq!(report.executed, 1);
        assert_eq!(report.accounts_liquidated, 1);
        assert!(report.failures.is_empty());
        assert_eq!(engine.cross().position(id).unwrap().status, PositionStatus::Closed);
    }

    #[test]
    fn test_scan_records_failures_and_continues() {
        let mut engine = engine();
        let keeper = Keeper::new(AccountId(9));
        let ctx = CallContext::new(TRADER, 0);
        // Profitable take-profit with no surplus in the pool to pay it
        let winner = engine
            .open_position(
                &ctx,
                OpenRequest::market(ETH, USDC, Direction::Long, 1_000 * WAD, 5).with_take_profit(110 * WAD),
            )
            .unwrap();
        let loser = engine
            .open_position(&ctx, OpenRequest::market(ETH, USDC, Direction::Short, 100 * WAD, 10))
            .unwrap();

        engine.oracle_mut().set_reserves(ETH, USDC, WAD, 120 * WAD);
        let report = keeper.scan(&mut engine, 60);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, ScanTarget::Isolated(winner));
        assert_eq!(report.exited, 1);
        assert_eq!(engine.isolated().position(loser).unwrap().status, PositionStatus::Closed);
        assert_eq!(engine.isolated().position(winner).unwrap().status, PositionStatus::Active);
    }
}
