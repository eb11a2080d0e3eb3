//! Collateral vaults
//!
//! Each vault wraps its collateral 1:1 into an internal asset and deposits
//! that into the ledger on the depositor's behalf.

use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::{LeverageError, Result};
use crate::externals::{CollateralVault, LendingLedger, PriceOracle, TokenBank, VaultDirectory};
use crate::sizing::{mul_div, PERCENTAGE_FACTOR};

#[derive(Debug, Clone)]
pub struct WrappingVault {
    address: Address,
    collateral: Address,
    internal: Address,
}

impl WrappingVault {
    pub fn new(address: Address, collateral: Address, internal: Address) -> Self {
        Self {
            address,
            collateral,
            internal,
        }
    }
}

impl CollateralVault for WrappingVault {
    fn address(&self) -> Address {
        self.address
    }

    fn collateral_asset(&self) -> Address {
        self.collateral
    }

    fn internal_asset(&self) -> Address {
        self.internal
    }

    fn deposit_collateral(
        &mut self,
        tokens: &mut dyn TokenBank,
        ledger: &mut dyn LendingLedger,
        from: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(LeverageError::ZeroAmount("vault deposit"));
        }
        tokens.transfer(self.collateral, from, self.address, amount)?;
        tokens.mint(self.internal, self.address, amount)?;
        ledger.deposit(tokens, self.internal, amount, self.address, on_behalf_of, 0)?;

        debug!("vault {} took {} collateral for {}", self.address, amount, on_behalf_of);
        Ok(())
    }

    fn withdraw_collateral(
        &mut self,
        tokens: &mut dyn TokenBank,
        ledger: &mut dyn LendingLedger,
        oracle: &dyn PriceOracle,
        owner: Address,
        amount: U256,
        slippage_bps: u64,
        to: Address,
    ) -> Result<U256> {
        if amount.is_zero() {
            return Err(LeverageError::ZeroAmount("vault withdraw"));
        }
        let unwrapped = ledger.withdraw(tokens, oracle, self.internal, amount, owner, self.address)?;
        tokens.burn(self.internal, self.address, unwrapped)?;

        let floor = mul_div(
            amount,
            U256::from(PERCENTAGE_FACTOR.saturating_sub(slippage_bps)),
            U256::from(PERCENTAGE_FACTOR),
        )?;
        if unwrapped < floor {
            return Err(LeverageError::SlippageExceeded {
                pool: self.address,
                minimum: floor,
                realized: unwrapped,
            });
        }

        tokens.transfer(self.collateral, self.address, to, unwrapped)?;
        debug!("vault {} released {} collateral of {} to {}", self.address, unwrapped, owner, to);
        Ok(unwrapped)
    }
}

/// Vaults keyed by address
#[derive(Debug, Clone, Default)]
pub struct VaultSet {
    vaults: BTreeMap<Address, WrappingVault>,
}

impl VaultSet {
    pub fn insert(&mut self, vault: WrappingVault) {
        self.vaults.insert(vault.address, vault);
    }
}

impl VaultDirectory for VaultSet {
    fn vault(&self, address: Address) -> Option<&dyn CollateralVault> {
        self.vaults.get(&address).map(|v| v as &dyn CollateralVault)
    }

    fn vault_mut(&mut self, address: Address) -> Option<&mut dyn CollateralVault> {
        self.vaults.get_mut(&address).map(|v| v as &mut dyn CollateralVault)
    }
}
