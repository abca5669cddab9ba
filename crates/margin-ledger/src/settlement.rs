//! # Settlement Protocol
//!
//! The narrow interfaces ledgers use to move value. A ledger never transfers
//! funds itself: each logical event builds one batch of
//! [`SettlementUpdate`]s and hands it to a [`SettlementSink`] exactly once.

use margin_core::{AccountId, LedgerResult, SettlementUpdate, TokenId};

/// Applies a settlement batch all-or-nothing
pub trait SettlementSink {
    fn apply(&mut self, router: AccountId, updates: &[SettlementUpdate]) -> LedgerResult<()>;
}

/// Accepts fees paid directly by a router
pub trait FeeSink {
    #[allow(clippy::too_many_arguments)]
    fn add_fees(
        &mut self,
        router: AccountId,
        payer: AccountId,
        token_a: TokenId,
        token_b: TokenId,
        fee_token: TokenId,
        amount: u128,
    ) -> LedgerResult<()>;
}

/// Sink that records batches instead of settling them
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    pub batches: Vec<(AccountId, Vec<SettlementUpdate>)>,
    pub reject_with: Option<margin_core::LedgerError>,
}

#[cfg(test)]
impl SettlementSink for RecordingSink {
    fn apply(&mut self, router: AccountId, updates: &[SettlementUpdate]) -> LedgerResult<()> {
        if let Some(err) = self.reject_with.clone() {
            return Err(err);
        }
        self.batches.push((router, updates.to_vec()));
        Ok(())
    }
}
