//! Swapper Registry
//!
//! Maps each collateral asset to the one swapper that levers it.
//! Registration is owner-only; lookups for an unknown collateral fail with 111.

use alloy_primitives::Address;
use std::collections::HashMap;
use tracing::info;

use crate::engine::LeverageSwapper;
use crate::errors::{LeverageError, Result};

#[derive(Debug, Clone)]
pub struct SwapperRegistry {
    owner: Address,
    swappers: HashMap<Address, LeverageSwapper>,
}

impl SwapperRegistry {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            swappers: HashMap::new(),
        }
    }

    fn ensure_owner(&self, caller: Address) -> Result<()> {
        if caller != self.owner {
            return Err(LeverageError::NotOwner(caller));
        }
        Ok(())
    }

    /// Registers `swapper` for its collateral, replacing any previous one
    pub fn register(&mut self, caller: Address, swapper: LeverageSwapper) -> Result<()> {
        self.ensure_owner(caller)?;
        info!(
            "registered swapper {} for {}",
            swapper.address(),
            crate::tokens::label(&swapper.collateral())
        );
        self.swappers.insert(swapper.collateral(), swapper);
        Ok(())
    }

    pub fn remove(&mut self, caller: Address, collateral: Address) -> Result<LeverageSwapper> {
        self.ensure_owner(caller)?;
        self.swappers
            .remove(&collateral)
            .ok_or(LeverageError::UnsupportedCollateral(collateral))
    }

    pub fn swapper(&self, collateral: Address) -> Result<&LeverageSwapper> {
        self.swappers
            .get(&collateral)
            .ok_or(LeverageError::UnsupportedCollateral(collateral))
    }

    pub fn collaterals(&self) -> Vec<Address> {
        let mut all: Vec<Address> = self.swappers.keys().copied().collect();
        all.sort();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::tokens::{BPT_USDC_DAI, CRV_FRAX};
    use alloy_primitives::address;

    const OWNER: Address = address!("0000000000000000000000000000000000000001");
    const STRANGER: Address = address!("0000000000000000000000000000000000000002");

    fn swapper(collateral: Address, at: Address) -> LeverageSwapper {
        LeverageSwapper::new(at, collateral, Address::ZERO, EngineConfig::default())
    }

    #[test]
    fn test_lookup_by_collateral() {
        let mut registry = SwapperRegistry::new(OWNER);
        let at = address!("00000000000000000000000000000000000000c1");
        registry.register(OWNER, swapper(CRV_FRAX, at)).unwrap();

        assert_eq!(registry.swapper(CRV_FRAX).unwrap().address(), at);
        assert_eq!(registry.swapper(BPT_USDC_DAI).unwrap_err().code(), "111");
    }

    #[test]
    fn test_only_owner_registers() {
        let mut registry = SwapperRegistry::new(OWNER);
        let err = registry.register(STRANGER, swapper(CRV_FRAX, Address::ZERO)).unwrap_err();
        assert_eq!(err.code(), "119");
        assert!(registry.collaterals().is_empty());
    }

    #[test]
    fn test_remove_then_lookup_fails() {
        let mut registry = SwapperRegistry::new(OWNER);
        registry.register(OWNER, swapper(CRV_FRAX, Address::ZERO)).unwrap();
        registry.remove(OWNER, CRV_FRAX).unwrap();
        assert_eq!(registry.swapper(CRV_FRAX).unwrap_err().code(), "111");
        assert_eq!(registry.remove(OWNER, CRV_FRAX).unwrap_err().code(), "111");
    }
}
