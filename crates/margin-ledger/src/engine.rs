//! # Ledger Engine
//!
//! Caller-facing facade over the pool and both position ledgers. Every entry
//! point runs inside [`Engine::transactional`]: the mutable state is
//! checkpointed before the call and restored if the call fails, so a failed
//! call never leaves partial effects behind.

use margin_core::{AccountId, ExitRecord, LedgerError, LedgerResult, TokenId, DEFAULT_MAX_LEVERAGE, MIN_LEVERAGE};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::context::CallContext;
use crate::cross::{CrossExit, CrossLedger, NukeReport};
use crate::custody::Custody;
use crate::isolated::IsolatedLedger;
use crate::oracle::PriceOracle;
use crate::pool::{LiquidityPool, WithdrawReceipt};
use crate::position::{LedgerParams, OpenRequest};
use crate::settlement::FeeSink;
use crate::snapshot::LedgerSnapshot;

/// Everything a call may mutate
#[derive(Debug, Clone)]
struct LedgerState<C> {
    pool: LiquidityPool<C>,
    isolated: IsolatedLedger,
    cross: CrossLedger,
}

#[derive(Debug)]
pub struct Engine<O, C> {
    oracle: O,
    state: LedgerState<C>,
}

impl<O: PriceOracle, C: Custody + Clone> Engine<O, C> {
    /// Build the pool and ledgers, list the configured tokens and register both ledgers as routers
    pub fn new(config: &LedgerConfig, oracle: O, custody: C) -> LedgerResult<Self> {
        config.validate()?;
        let roles = config.roles;
        let params = config.params();

        let mut pool = LiquidityPool::new(roles.admin, roles.pool, custody, config.max_compensation_bps)?;
        for token in &config.tokens {
            pool.list_token(roles.admin, token.id, token.decimals, token.paired_with)?;
        }
        pool.add_router(roles.admin, roles.isolated_router)?;
        pool.add_router(roles.admin, roles.cross_router)?;

        let isolated = IsolatedLedger::new(roles.isolated_router, params);
        let mut cross = CrossLedger::new(roles.cross_router, roles.admin, params);
        if let Some(base) = config.cross_base_asset {
            cross.set_base_asset(roles.admin, base)?;
        }

        info!(
            tokens = config.tokens.len(),
            max_leverage = params.max_leverage,
            "ledger engine initialized"
        );
        Ok(Self {
            oracle,
            state: LedgerState { pool, isolated, cross },
        })
    }

    /// Run `call` against the ledger state, restoring it if the call fails
    fn transactional<T>(
        &mut self,
        operation: &'static str,
        call: impl FnOnce(&mut LedgerState<C>, &O) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let checkpoint = self.state.clone();
        match call(&mut self.state, &self.oracle) {
            Ok(value) => {
                debug!(operation, "call committed");
                Ok(value)
            }
            Err(err) => {
                self.state = checkpoint;
                warn!(operation, error = %err, "call rolled back");
                Err(err)
            }
        }
    }

    // ========================================================================
    // Isolated Positions
    // ========================================================================

    pub fn open_position(&mut self, ctx: &CallContext, request: OpenRequest) -> LedgerResult<u64> {
        self.transactional("open_position", |s, oracle| {
            s.isolated.open_position(&mut s.pool, oracle, ctx, request)
        })
    }

    pub fn create_wind_order(&mut self, ctx: &CallContext, request: OpenRequest) -> LedgerResult<u64> {
        self.transactional("create_wind_order", |s, oracle| {
            s.isolated.create_wind_order(&mut s.pool, oracle, ctx, request)
        })
    }

    pub fn execute_position(&mut self, ctx: &CallContext, id: u64) -> LedgerResult<()> {
        self.transactional("execute_position", |s, oracle| {
            s.isolated.execute_position(&mut s.pool, oracle, ctx, id)
        })
    }

    pub fn exit_position(&mut self, ctx: &CallContext, id: u64) -> LedgerResult<ExitRecord> {
        self.transactional("exit_position", |s, oracle| {
            s.isolated.exit_position(&mut s.pool, oracle, ctx, id)
        })
    }

    pub fn cancel_position(&mut self, ctx: &CallContext, id: u64) -> LedgerResult<ExitRecord> {
        self.transactional("cancel_position", |s, _| s.isolated.cancel_position(&mut s.pool, ctx, id))
    }

    pub fn set_take_profit(&mut self, ctx: &CallContext, id: u64, price: u128) -> LedgerResult<()> {
        self.transactional("set_take_profit", |s, _| s.isolated.set_take_profit(ctx, id, price))
    }

    pub fn set_stop_loss(&mut self, ctx: &CallContext, id: u64, price: u128) -> LedgerResult<()> {
        self.transactional("set_stop_loss", |s, _| s.isolated.set_stop_loss(ctx, id, price))
    }

    // ========================================================================
    // Cross-Margin Positions
    // ========================================================================

    pub fn add_margin(&mut self, ctx: &CallContext, amount: u128) -> LedgerResult<u128> {
        self.transactional("add_margin", |s, _| s.cross.add_margin(&mut s.pool, ctx, amount))
    }

    pub fn pull_margin(&mut self, ctx: &CallContext, amount: u128) -> LedgerResult<u128> {
        self.transactional("pull_margin", |s, oracle| {
            s.cross.pull_margin(&mut s.pool, oracle, ctx, amount)
        })
    }

    pub fn cross_open_position(&mut self, ctx: &CallContext, request: OpenRequest) -> LedgerResult<u64> {
        self.transactional("cross_open_position", |s, oracle| {
            s.cross.open_position(&mut s.pool, oracle, ctx, request)
        })
    }

    pub fn cross_create_wind_order(&mut self, ctx: &CallContext, request: OpenRequest) -> LedgerResult<u64> {
        self.transactional("cross_create_wind_order", |s, oracle| {
            s.cross.create_wind_order(&mut s.pool, oracle, ctx, request)
        })
    }

    /// Fill a cross limit order; returns the nuke report if the fill left the account insolvent
    pub fn cross_execute_position(&mut self, ctx: &CallContext, id: u64) -> LedgerResult<Option<NukeReport>> {
        self.transactional("cross_execute_position", |s, oracle| {
            s.cross.execute_position(&mut s.pool, oracle, ctx, id)
        })
    }

    pub fn cross_exit_position(&mut self, ctx: &CallContext, id: u64) -> LedgerResult<CrossExit> {
        self.transactional("cross_exit_position", |s, oracle| {
            s.cross.exit_position(&mut s.pool, oracle, ctx, id)
        })
    }

    pub fn cross_cancel_position(&mut self, ctx: &CallContext, id: u64) -> LedgerResult<ExitRecord> {
        self.transactional("cross_cancel_position", |s, _| s.cross.cancel_position(&mut s.pool, ctx, id))
    }

    pub fn cross_set_take_profit(&mut self, ctx: &CallContext, id: u64, price: u128) -> LedgerResult<()> {
        self.transactional("cross_set_take_profit", |s, _| s.cross.set_take_profit(ctx, id, price))
    }

    pub fn cross_set_stop_loss(&mut self, ctx: &CallContext, id: u64, price: u128) -> LedgerResult<()> {
        self.transactional("cross_set_stop_loss", |s, _| s.cross.set_stop_loss(ctx, id, price))
    }

    pub fn liquidate_account(&mut self, ctx: &CallContext, owner: AccountId) -> LedgerResult<NukeReport> {
        self.transactional("liquidate_account", |s, oracle| {
            s.cross.liquidate_account(&mut s.pool, oracle, ctx, owner)
        })
    }

    // ========================================================================
    // Liquidity and Fees
    // ========================================================================

    pub fn deposit(&mut self, ctx: &CallContext, token: TokenId, amount: u128) -> LedgerResult<u64> {
        self.transactional("deposit", |s, _| s.pool.deposit(ctx, token, amount))
    }

    pub fn withdraw(&mut self, ctx: &CallContext, slot_id: u64, amount: u128) -> LedgerResult<WithdrawReceipt> {
        self.transactional("withdraw", |s, oracle| s.pool.withdraw(oracle, ctx, slot_id, amount))
    }

    pub fn claim_fees(&mut self, ctx: &CallContext, slot_id: u64) -> LedgerResult<u128> {
        self.transactional("claim_fees", |s, _| s.pool.claim_fees(ctx, slot_id))
    }

    /// Router-paid fees, pulled from `payer`
    pub fn add_fees(
        &mut self,
        ctx: &CallContext,
        payer: AccountId,
        token_a: TokenId,
        token_b: TokenId,
        fee_token: TokenId,
        amount: u128,
    ) -> LedgerResult<()> {
        self.transactional("add_fees", |s, _| {
            s.pool.add_fees(ctx.caller, payer, token_a, token_b, fee_token, amount)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn withdraw_fees(
        &mut self,
        ctx: &CallContext,
        token_a: TokenId,
        token_b: TokenId,
        fee_token: TokenId,
        recipient: AccountId,
        amount: u128,
    ) -> LedgerResult<u128> {
        self.transactional("withdraw_fees", |s, _| {
            s.pool
                .withdraw_fees(ctx.caller, token_a, token_b, fee_token, recipient, amount)
        })
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub fn add_router(&mut self, ctx: &CallContext, router: AccountId) -> LedgerResult<()> {
        self.transactional("add_router", |s, _| s.pool.add_router(ctx.caller, router))
    }

    pub fn remove_router(&mut self, ctx: &CallContext, router: AccountId) -> LedgerResult<()> {
        self.transactional("remove_router", |s, _| s.pool.remove_router(ctx.caller, router))
    }

    pub fn list_token(&mut self, ctx: &CallContext, token: TokenId, decimals: u8, paired_with: TokenId) -> LedgerResult<()> {
        self.transactional("list_token", |s, _| {
            s.pool.list_token(ctx.caller, token, decimals, paired_with)
        })
    }

    pub fn set_cross_base_asset(&mut self, ctx: &CallContext, token: TokenId) -> LedgerResult<()> {
        self.transactional("set_cross_base_asset", |s, _| {
            s.pool.listing(token)?;
            s.cross.set_base_asset(ctx.caller, token)
        })
    }

    /// Update risk parameters; applies to positions opened or closed afterwards
    pub fn set_params(&mut self, ctx: &CallContext, params: LedgerParams) -> LedgerResult<()> {
        self.transactional("set_params", |s, _| {
            s.pool.routers().ensure_owner(ctx.caller)?;
            if params.max_leverage < MIN_LEVERAGE || params.max_leverage > DEFAULT_MAX_LEVERAGE {
                return Err(LedgerError::InvalidParameter("max_leverage must be within 1..=100"));
            }
            if params.holding_fee_bps_per_hour > 10_000 {
                return Err(LedgerError::InvalidParameter("holding_fee_bps_per_hour above 10000"));
            }
            s.isolated.set_params(params);
            s.cross.set_params(params);
            info!(?params, "ledger parameters updated");
            Ok(())
        })
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn pool(&self) -> &LiquidityPool<C> {
        &self.state.pool
    }

    pub fn isolated(&self) -> &IsolatedLedger {
        &self.state.isolated
    }

    pub fn cross(&self) -> &CrossLedger {
        &self.state.cross
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    /// Custody handle, e.g. to fund accounts of an in-memory bank
    pub fn custody_mut(&mut self) -> &mut C {
        self.state.pool.custody_mut()
    }

    pub fn price(&self, base: TokenId, quote: TokenId) -> LedgerResult<u128> {
        self.oracle.price(base, quote)
    }

    pub fn is_account_solvent(&self, owner: AccountId) -> LedgerResult<bool> {
        self.state.cross.is_solvent(&self.oracle, owner)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::capture(&self.state.pool, &self.state.isolated, &self.state.cross)
    }
}
