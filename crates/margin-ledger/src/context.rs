use margin_core::AccountId;
use serde::{Deserialize, Serialize};

/// Caller identity and block time for one ledger call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: AccountId,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

impl CallContext {
    pub fn new(caller: AccountId, timestamp: i64) -> Self {
        Self { caller, timestamp }
    }
}
