//! # Router Registry
//!
//! Owner-managed allow-list of callers permitted to settle value against the
//! pool or add and withdraw accumulated fees.

use std::collections::BTreeSet;

use margin_core::{AccountId, LedgerError, LedgerResult};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterRegistry {
    /// Authority that can add/remove routers
    owner: AccountId,
    routers: BTreeSet<AccountId>,
}

impl RouterRegistry {
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            routers: BTreeSet::new(),
        }
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    /// Check if a router is authorized
    pub fn is_router(&self, caller: AccountId) -> bool {
        self.routers.contains(&caller)
    }

    pub fn ensure_router(&self, caller: AccountId) -> LedgerResult<()> {
        if self.is_router(caller) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { caller })
        }
    }

    pub fn ensure_owner(&self, caller: AccountId) -> LedgerResult<()> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { caller })
        }
    }

    /// Add a new router
    pub fn add_router(&mut self, caller: AccountId, router: AccountId) -> LedgerResult<()> {
        self.ensure_owner(caller)?;
        if !self.routers.insert(router) {
            return Err(LedgerError::InvalidParameter("router already registered"));
        }
        info!(%router, "router added");
        Ok(())
    }

    /// Remove a router
    pub fn remove_router(&mut self, caller: AccountId, router: AccountId) -> LedgerResult<()> {
        self.ensure_owner(caller)?;
        if !self.routers.remove(&router) {
            return Err(LedgerError::InvalidParameter("router not registered"));
        }
        info!(%router, "router removed");
        Ok(())
    }

    pub fn routers(&self) -> impl Iterator<Item = AccountId> + '_ {
        self.routers.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: AccountId = AccountId(1);
    const ROUTER: AccountId = AccountId(2);

    #[test]
    fn test_owner_manages_routers() {
        let mut registry = RouterRegistry::new(OWNER);
        assert!(registry.ensure_router(ROUTER).is_err());

        registry.add_router(OWNER, ROUTER).unwrap();
        assert!(registry.ensure_router(ROUTER).is_ok());
        assert!(registry.add_router(OWNER, ROUTER).is_err());

        registry.remove_router(OWNER, ROUTER).unwrap();
        assert!(!registry.is_router(ROUTER));
    }

    #[test]
    fn test_non_owner_rejected() {
        let mut registry = RouterRegistry::new(OWNER);
        assert_eq!(
            registry.add_router(ROUTER, ROUTER),
            Err(LedgerError::Unauthorized { caller: ROUTER })
        );
    }
}
