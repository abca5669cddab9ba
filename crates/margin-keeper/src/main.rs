use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use margin_keeper::{apply_prices, bootstrap, Keeper, KeeperConfig};

#[derive(Parser, Debug)]
#[command(name = "margin-keeper")]
#[command(about = "Reference keeper replaying a price path against the margin ledger")]
struct Args {
    /// Path to keeper configuration file
    #[arg(short, long, default_value = "keeper.toml")]
    config: PathBuf,

    /// Number of ticks to run; defaults to the longest price path
    #[arg(short, long)]
    ticks: Option<usize>,

    /// Override the configured tick interval in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Write the final ledger snapshot as JSON to this path
    #[arg(long)]
    dump_state: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting margin keeper");

    let config = KeeperConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let ticks = args.ticks.unwrap_or_else(|| config.path_len());
    let interval = Duration::from_millis(args.interval_ms.unwrap_or(config.interval_ms));
    info!(markets = config.markets.len(), ticks, interval_ms = interval.as_millis() as u64, "Loaded configuration");

    let start = chrono::Utc::now().timestamp();
    let engine = Arc::new(Mutex::new(bootstrap(&config, start)?));
    let keeper = Keeper::new(config.keeper);

    let mut interval_timer = time::interval(interval);
    let mut total_actions = 0usize;
    let mut total_failures = 0usize;

    for tick in 1..=ticks {
        interval_timer.tick().await;
        let now = start + config.tick_seconds * tick as i64;

        let mut engine = engine.lock().await;
        apply_prices(&mut *engine, &config, tick)?;
        let report = keeper.scan(&mut *engine, now);
        total_actions += report.actions();
        total_failures += report.failures.len();

        if report.failures.is_empty() {
            debug!(tick, actions = report.actions(), "Tick complete");
        } else {
            warn!(tick, failures = report.failures.len(), "Tick completed with failures");
        }
    }

    let engine = engine.lock().await;
    for (token, balances) in engine.pool().all_balances() {
        info!(
            %token,
            liquid = balances.liquid_balance,
            reserved = balances.reserved,
            allocated = balances.total_allocation,
            "Pool balances"
        );
    }
    info!(ticks, actions = total_actions, failures = total_failures, "Keeper finished");

    if let Some(path) = args.dump_state {
        let json = engine.snapshot().to_json()?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write snapshot to {}", path.display()))?;
        info!(path = %path.display(), "Ledger snapshot written");
    }

    Ok(())
}
