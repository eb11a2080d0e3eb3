//! In-memory token balances and allowances

use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;

use crate::errors::{LeverageError, Result};
use crate::externals::TokenBank;

#[derive(Debug, Clone, Default)]
pub struct InMemoryBank {
    decimals: BTreeMap<Address, u8>,
    balances: BTreeMap<(Address, Address), U256>,
    allowances: BTreeMap<(Address, Address, Address), U256>,
}

impl InMemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, asset: Address, decimals: u8) {
        self.decimals.insert(asset, decimals);
    }

    pub fn total_supply(&self, asset: Address) -> U256 {
        self.balances
            .iter()
            .filter(|((a, _), _)| *a == asset)
            .fold(U256::ZERO, |acc, (_, b)| acc + *b)
    }

    /// Every non-zero balance `holder` carries
    pub fn holdings(&self, holder: Address) -> Vec<(Address, U256)> {
        self.balances
            .iter()
            .filter(|((_, h), b)| *h == holder && !b.is_zero())
            .map(|((a, _), b)| (*a, *b))
            .collect()
    }

    fn known(&self, asset: Address) -> Result<()> {
        if self.decimals.contains_key(&asset) {
            Ok(())
        } else {
            Err(LeverageError::External(format!("unknown token {}", asset)))
        }
    }

    fn debit(&mut self, asset: Address, holder: Address, amount: U256) -> Result<()> {
        let balance = self.balance_of(asset, holder);
        if balance < amount {
            return Err(LeverageError::InsufficientFunds {
                what: "balance",
                asset,
                holder,
                needed: amount,
                available: balance,
            });
        }
        self.balances.insert((asset, holder), balance - amount);
        Ok(())
    }

    fn credit(&mut self, asset: Address, holder: Address, amount: U256) {
        *self.balances.entry((asset, holder)).or_insert(U256::ZERO) += amount;
    }
}

impl TokenBank for InMemoryBank {
    fn balance_of(&self, asset: Address, holder: Address) -> U256 {
        self.balances.get(&(asset, holder)).copied().unwrap_or_default()
    }

    fn decimals(&self, asset: Address) -> Result<u8> {
        self.decimals
            .get(&asset)
            .copied()
            .ok_or_else(|| LeverageError::External(format!("unknown token {}", asset)))
    }

    fn transfer(&mut self, asset: Address, from: Address, to: Address, amount: U256) -> Result<()> {
        self.known(asset)?;
        if amount.is_zero() || from == to {
            return Ok(());
        }
        self.debit(asset, from, amount)?;
        self.credit(asset, to, amount);
        Ok(())
    }

    fn approve(&mut self, asset: Address, owner: Address, spender: Address, amount: U256) {
        self.allowances.insert((asset, owner, spender), amount);
    }

    fn allowance(&self, asset: Address, owner: Address, spender: Address) -> U256 {
        self.allowances.get(&(asset, owner, spender)).copied().unwrap_or_default()
    }

    fn transfer_from(
        &mut self,
        asset: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let allowed = self.allowance(asset, from, spender);
        if allowed < amount {
            return Err(LeverageError::InsufficientFunds {
                what: "allowance",
                asset,
                holder: from,
                needed: amount,
                available: allowed,
            });
        }
        self.transfer(asset, from, to, amount)?;
        // Infinite approvals are never spent down
        if allowed != U256::MAX {
            self.allowances.insert((asset, from, spender), allowed - amount);
        }
        Ok(())
    }

    fn mint(&mut self, asset: Address, to: Address, amount: U256) -> Result<()> {
        self.known(asset)?;
        self.credit(asset, to, amount);
        Ok(())
    }

    fn burn(&mut self, asset: Address, from: Address, amount: U256) -> Result<()> {
        self.known(asset)?;
        self.debit(asset, from, amount)
    }
}
