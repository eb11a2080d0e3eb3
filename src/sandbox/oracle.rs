//! Fixed-price oracle

use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;

use crate::errors::{LeverageError, Result};
use crate::externals::PriceOracle;

/// Prices in base currency with 8 decimals, set by hand
#[derive(Debug, Clone, Default)]
pub struct StaticOracle {
    prices: BTreeMap<Address, U256>,
}

impl StaticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&mut self, asset: Address, price: U256) {
        self.prices.insert(asset, price);
    }
}

impl PriceOracle for StaticOracle {
    fn asset_price(&self, asset: Address) -> Result<U256> {
        self.prices
            .get(&asset)
            .copied()
            .ok_or_else(|| LeverageError::External(format!("no price for {}", asset)))
    }
}
