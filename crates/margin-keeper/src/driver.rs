//! # Price Path Driver
//!
//! Builds an in-memory ledger from a [`KeeperConfig`], seeds it with the
//! configured balances, deposits and orders, and moves the oracle along each
//! market's price path.

use margin_core::math::{denormalize, safe_mul, to_wad};
use margin_core::{Holder, TokenId};
use margin_ledger::{Bank, CallContext, Engine, OpenRequest, StaticOracle};
use tracing::{debug, info, warn};

use crate::config::{KeeperConfig, MarginMode, OrderConfig};
use crate::error::{KeeperError, KeeperResult};

pub type LedgerEngine = Engine<StaticOracle, Bank>;

/// Whole units to wad
fn wad(amount: u64) -> KeeperResult<u128> {
    Ok(to_wad(u128::from(amount))?)
}

/// Set every market's reserves to the price in effect at `tick`
pub fn apply_prices(engine: &mut LedgerEngine, config: &KeeperConfig, tick: usize) -> KeeperResult<()> {
    for market in &config.markets {
        let price = market.price_at(tick);
        let reserve_base = wad(market.depth)?;
        let reserve_quote = safe_mul(reserve_base, u128::from(price))?;
        engine
            .oracle_mut()
            .set_reserves(market.base, market.quote, reserve_base, reserve_quote);
        debug!(market = %market.name, tick, price, "oracle price set");
    }
    Ok(())
}

/// Build the engine at `now` and apply every configured seed
pub fn bootstrap(config: &KeeperConfig, now: i64) -> KeeperResult<LedgerEngine> {
    config.validate()?;

    let mut bank = config.ledger.bank()?;
    for funding in &config.funding {
        let native = native_amount(config, funding.token, funding.amount)?;
        bank.mint(Holder::Account(funding.account), funding.token, native)?;
    }

    let mut engine = Engine::new(&config.ledger, StaticOracle::new(), bank)?;
    apply_prices(&mut engine, config, 0)?;

    for deposit in &config.deposits {
        let ctx = CallContext::new(deposit.account, now);
        let slot = engine.deposit(&ctx, deposit.token, wad(deposit.amount)?)?;
        debug!(slot, account = %deposit.account, "seed deposit placed");
    }
    for margin in &config.margins {
        let ctx = CallContext::new(margin.account, now);
        engine.add_margin(&ctx, wad(margin.amount)?)?;
    }

    // A rejected order is part of the scenario, not a setup failure
    let mut placed = 0;
    for order in &config.orders {
        match place_order(&mut engine, order, now) {
            Ok(id) => {
                placed += 1;
                debug!(position = id, account = %order.account, mode = ?order.mode, "seed order placed");
            }
            Err(KeeperError::Ledger(error)) => {
                warn!(account = %order.account, %error, "seed order rejected");
            }
            Err(other) => return Err(other),
        }
    }

    info!(
        deposits = config.deposits.len(),
        orders = placed,
        rejected = config.orders.len() - placed,
        "ledger seeded"
    );
    Ok(engine)
}

fn native_amount(config: &KeeperConfig, token: TokenId, amount: u64) -> KeeperResult<u128> {
    let decimals = config
        .ledger
        .token(token)
        .map(|token| token.decimals)
        .ok_or_else(|| KeeperError::InvalidConfig(format!("token {} is not listed", token)))?;
    Ok(denormalize(wad(amount)?, decimals)?)
}

fn place_order(engine: &mut LedgerEngine, order: &OrderConfig, now: i64) -> KeeperResult<u64> {
    let mut request = OpenRequest::market(order.base, order.quote, order.direction, wad(order.margin)?, order.leverage)
        .with_excess_margin(wad(order.excess_margin)?);
    if let Some(price) = order.take_profit {
        request = request.with_take_profit(wad(price)?);
    }
    if let Some(price) = order.stop_loss {
        request = request.with_stop_loss(wad(price)?);
    }

    let ctx = CallContext::new(order.account, now);
    let id = match (order.mode, order.entry_price) {
        (MarginMode::Isolated, None) => engine.open_position(&ctx, request)?,
        (MarginMode::Isolated, Some(entry)) => engine.create_wind_order(&ctx, request.with_entry_price(wad(entry)?))?,
        (MarginMode::Cross, None) => engine.cross_open_position(&ctx, request)?,
        (MarginMode::Cross, Some(entry)) => {
            engine.cross_create_wind_order(&ctx, request.with_entry_price(wad(entry)?))?
        }
    };
    Ok(id)
}
