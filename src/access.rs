//! Access Gate
//!
//! Per-vault whitelists of swappers and end users. Default deny: a vault
//! with no entries authorizes nobody. Only the owner mutates the lists.

use alloy_primitives::Address;
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::errors::{LeverageError, Result};

#[derive(Debug, Clone)]
pub struct AccessGate {
    owner: Address,
    swappers: HashMap<Address, HashSet<Address>>,
    users: HashMap<Address, HashSet<Address>>,
}

impl AccessGate {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            swappers: HashMap::new(),
            users: HashMap::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    fn only_owner(&self, caller: Address) -> Result<()> {
        if caller != self.owner {
            return Err(LeverageError::NotOwner(caller));
        }
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: Address, new_owner: Address) -> Result<()> {
        self.only_owner(caller)?;
        info!("access gate ownership {} -> {}", self.owner, new_owner);
        self.owner = new_owner;
        Ok(())
    }

    pub fn set_swapper_whitelist(&mut self, caller: Address, vault: Address, swapper: Address, allowed: bool) -> Result<()> {
        self.only_owner(caller)?;
        Self::set(&mut self.swappers, vault, swapper, allowed);
        info!("vault {} swapper {} whitelisted: {}", vault, swapper, allowed);
        Ok(())
    }

    pub fn set_user_whitelist(&mut self, caller: Address, vault: Address, user: Address, allowed: bool) -> Result<()> {
        self.only_owner(caller)?;
        Self::set(&mut self.users, vault, user, allowed);
        info!("vault {} user {} whitelisted: {}", vault, user, allowed);
        Ok(())
    }

    fn set(lists: &mut HashMap<Address, HashSet<Address>>, vault: Address, subject: Address, allowed: bool) {
        if allowed {
            lists.entry(vault).or_default().insert(subject);
        } else if let Some(list) = lists.get_mut(&vault) {
            list.remove(&subject);
        }
    }

    pub fn is_whitelisted_swapper(&self, vault: Address, swapper: Address) -> bool {
        self.swappers.get(&vault).is_some_and(|s| s.contains(&swapper))
    }

    pub fn is_whitelisted_user(&self, vault: Address, user: Address) -> bool {
        self.users.get(&vault).is_some_and(|u| u.contains(&user))
    }

    /// Both the swapper and the user must be whitelisted for `vault`
    pub fn ensure_authorized(&self, vault: Address, swapper: Address, user: Address) -> Result<()> {
        if !self.is_whitelisted_swapper(vault, swapper) {
            return Err(LeverageError::NotWhitelisted { vault, subject: swapper });
        }
        if !self.is_whitelisted_user(vault, user) {
            return Err(LeverageError::NotWhitelisted { vault, subject: user });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const OWNER: Address = address!("0000000000000000000000000000000000000001");
    const VAULT: Address = address!("00000000000000000000000000000000000000a1");
    const SWAPPER: Address = address!("00000000000000000000000000000000000000b1");
    const USER: Address = address!("00000000000000000000000000000000000000e1");

    #[test]
    fn test_default_deny() {
        let gate = AccessGate::new(OWNER);
        let err = gate.ensure_authorized(VAULT, SWAPPER, USER).unwrap_err();
        assert_eq!(err.code(), "118");
    }

    #[test]
    fn test_both_lists_required() {
        let mut gate = AccessGate::new(OWNER);
        gate.set_swapper_whitelist(OWNER, VAULT, SWAPPER, true).unwrap();
        assert_eq!(gate.ensure_authorized(VAULT, SWAPPER, USER).unwrap_err().code(), "118");

        gate.set_user_whitelist(OWNER, VAULT, USER, true).unwrap();
        assert!(gate.ensure_authorized(VAULT, SWAPPER, USER).is_ok());

        gate.set_user_whitelist(OWNER, VAULT, USER, false).unwrap();
        assert!(gate.ensure_authorized(VAULT, SWAPPER, USER).is_err());
    }

    #[test]
    fn test_lists_are_per_vault() {
        let mut gate = AccessGate::new(OWNER);
        let other_vault = address!("00000000000000000000000000000000000000a2");
        gate.set_swapper_whitelist(OWNER, VAULT, SWAPPER, true).unwrap();
        gate.set_user_whitelist(OWNER, VAULT, USER, true).unwrap();
        assert!(gate.ensure_authorized(other_vault, SWAPPER, USER).is_err());
    }

    #[test]
    fn test_only_owner_mutates() {
        let mut gate = AccessGate::new(OWNER);
        let err = gate.set_user_whitelist(USER, VAULT, USER, true).unwrap_err();
        assert_eq!(err.code(), "119");
        assert!(!gate.is_whitelisted_user(VAULT, USER));

        gate.transfer_ownership(OWNER, USER).unwrap();
        assert!(gate.set_user_whitelist(USER, VAULT, USER, true).is_ok());
        assert!(gate.set_user_whitelist(OWNER, VAULT, USER, false).is_err());
    }
}
