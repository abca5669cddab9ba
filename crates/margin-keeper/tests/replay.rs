//! Replays the sample configuration tick by tick, the way the binary does.

use margin_core::{AccountId, ExitReason, Holder, PositionStatus, TokenId};
use margin_keeper::{apply_prices, bootstrap, Keeper, KeeperConfig, LedgerEngine, ScanReport};
use margin_ledger::LedgerSnapshot;

const SAMPLE: &str = include_str!("../keeper.toml");
const USDC: TokenId = TokenId(2);

fn run(config: &KeeperConfig, ticks: usize) -> (LedgerEngine, Vec<ScanReport>) {
    let mut engine = bootstrap(config, 0).unwrap();
    let keeper = Keeper::new(config.keeper);
    let mut reports = Vec::new();
    for tick in 1..=ticks {
        apply_prices(&mut engine, config, tick).unwrap();
        reports.push(keeper.scan(&mut engine, config.tick_seconds * tick as i64));
    }
    (engine, reports)
}

#[test]
fn test_sample_replay() {
    let config = KeeperConfig::from_toml_str(SAMPLE).unwrap();
    let (engine, reports) = run(&config, config.path_len());

    // Dip buyer fills at 90
    assert_eq!(reports[2].executed, 1);
    // Market long liquidated at 79
    assert_eq!(reports[4].exited, 1);
    // Take-profit at 105
    assert_eq!(reports[6].exited, 1);
    assert!(reports.iter().all(|report| report.failures.is_empty()));

    let liquidated = engine.isolated().position(0).unwrap();
    assert_eq!(liquidated.exit.unwrap().reason, ExitReason::Liquidation);
    let winner = engine.isolated().position(1).unwrap();
    assert_eq!(winner.status, PositionStatus::Closed);
    assert_eq!(winner.exit.unwrap().reason, ExitReason::TakeProfit);

    assert_eq!(engine.cross().position(0).unwrap().status, PositionStatus::Active);
    assert!(engine.is_account_solvent(AccountId(22)).unwrap());

    let winnings = engine
        .pool()
        .custody()
        .native_balance_of(Holder::Account(AccountId(21)), USDC)
        .unwrap();
    assert!(winnings > 10_000_000_000);
    assert!(engine.pool().is_consistent());
}

#[test]
fn test_scan_is_idempotent_between_price_moves() {
    let config = KeeperConfig::from_toml_str(SAMPLE).unwrap();
    let (mut engine, _) = run(&config, 5);
    let keeper = Keeper::new(config.keeper);
    assert_eq!(keeper.scan(&mut engine, 5 * 3_600), ScanReport::default());
}

#[test]
fn test_snapshot_dump_round_trips() {
    let config = KeeperConfig::from_toml_str(SAMPLE).unwrap();
    let (engine, _) = run(&config, 3);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, engine.snapshot().to_json().unwrap()).unwrap();

    let restored: LedgerSnapshot = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(restored, engine.snapshot());
    assert_eq!(restored.slots.len(), 1);
    assert_eq!(restored.cross_accounts[0].user_base_margin, 300 * margin_core::WAD);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keeper.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    let config = KeeperConfig::load(&path).unwrap();
    assert_eq!(config.orders.len(), 3);
    assert!(KeeperConfig::load(dir.path().join("missing.toml")).is_err());
}
