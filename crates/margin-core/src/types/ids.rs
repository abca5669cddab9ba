//! # Identifiers
//!
//! Token and account handles plus the canonically ordered token pair.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{LedgerError, LedgerResult};

/// Token identifier; ordering defines canonical pair order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller / holder identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token pair stored as `(low, high)` with `low < high`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pair {
    low: TokenId,
    high: TokenId,
}

impl Pair {
    /// Build a pair from tokens in any order
    pub fn new(a: TokenId, b: TokenId) -> LedgerResult<Self> {
        match a.cmp(&b) {
            std::cmp::Ordering::Less => Ok(Self { low: a, high: b }),
            std::cmp::Ordering::Greater => Ok(Self { low: b, high: a }),
            std::cmp::Ordering::Equal => Err(LedgerError::InvalidParameter("pair tokens must differ")),
        }
    }

    pub fn low(&self) -> TokenId {
        self.low
    }

    pub fn high(&self) -> TokenId {
        self.high
    }

    pub fn contains(&self, token: TokenId) -> bool {
        self.low == token || self.high == token
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.low, self.high)
    }
}

/// Party that can hold custody of tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Holder {
    Account(AccountId),
    Pool,
    FeeVault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_is_order_independent() {
        let a = TokenId(9);
        let b = TokenId(2);
        let p1 = Pair::new(a, b).unwrap();
        let p2 = Pair::new(b, a).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(p1.low(), b);
        assert_eq!(p1.high(), a);
        assert!(p1.contains(a));
        assert!(!p1.contains(TokenId(5)));
    }

    #[test]
    fn test_pair_rejects_same_token() {
        assert!(Pair::new(TokenId(1), TokenId(1)).is_err());
    }
}
