//! Fixed-price liquidity pools
//!
//! Every family is modelled by the same fixed-price pool: outputs are the
//! input's value at reference prices less a fee. `shortfall_bps` makes
//! `execute` deliver less than `quote` promised, which is how tests force
//! a slippage failure.

use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;

use crate::errors::{LeverageError, Result};
use crate::externals::{
    CurveOperation, LiquidityPool, PoolCall, PoolDirectory, PoolFamily, TokenBank, WeightedOperation,
};
use crate::sizing::{convert, mul_div, AssetQuote, PERCENTAGE_FACTOR};

#[derive(Debug, Clone)]
pub struct PricedPool {
    address: Address,
    family: PoolFamily,
    coins: Vec<Address>,
    share_token: Option<Address>,
    quotes: BTreeMap<Address, AssetQuote>,
    /// Share of exit value paid out per coin, bps
    weights_bps: Vec<u64>,
    fee_bps: u64,
    shortfall_bps: u64,
}

impl PricedPool {
    pub fn new(address: Address, family: PoolFamily, fee_bps: u64) -> Self {
        Self {
            address,
            family,
            coins: Vec::new(),
            share_token: None,
            quotes: BTreeMap::new(),
            weights_bps: Vec::new(),
            fee_bps,
            shortfall_bps: 0,
        }
    }

    /// Adds a constituent with its exit weight
    pub fn with_coin(mut self, coin: Address, quote: AssetQuote, weight_bps: u64) -> Self {
        self.coins.push(coin);
        self.quotes.insert(coin, quote);
        self.weights_bps.push(weight_bps);
        self
    }

    pub fn with_share(mut self, share: Address, quote: AssetQuote) -> Self {
        self.share_token = Some(share);
        self.quotes.insert(share, quote);
        self
    }

    pub fn set_shortfall_bps(&mut self, shortfall_bps: u64) {
        self.shortfall_bps = shortfall_bps;
    }

    fn coin(&self, index: u8) -> Result<Address> {
        self.coins.get(index as usize).copied().ok_or_else(|| {
            LeverageError::InvalidSwapPath(format!("pool {} has no coin slot {}", self.address, index))
        })
    }

    fn share(&self) -> Result<Address> {
        self.share_token
            .ok_or_else(|| LeverageError::InvalidSwapPath(format!("pool {} issues no share token", self.address)))
    }

    fn quote_of(&self, asset: Address) -> Result<AssetQuote> {
        self.quotes
            .get(&asset)
            .copied()
            .ok_or_else(|| LeverageError::InvalidSwapPath(format!("pool {} does not trade {}", self.address, asset)))
    }

    fn ensure_coin(&self, asset: Address) -> Result<Address> {
        if self.coins.contains(&asset) {
            Ok(asset)
        } else {
            Err(LeverageError::InvalidSwapPath(format!(
                "{} is not a coin of pool {}",
                asset, self.address
            )))
        }
    }

    fn ensure_share(&self, asset: Address) -> Result<Address> {
        if self.share_token == Some(asset) {
            Ok(asset)
        } else {
            Err(LeverageError::InvalidSwapPath(format!(
                "{} is not the share of pool {}",
                asset, self.address
            )))
        }
    }

    /// Input and output asset of `call`
    fn legs(&self, call: &PoolCall) -> Result<(Address, Address)> {
        match *call {
            PoolCall::StableSwap { i, j, operation } => match operation {
                CurveOperation::Exchange | CurveOperation::ExchangeUnderlying => Ok((self.coin(i)?, self.coin(j)?)),
                CurveOperation::AddLiquidity => Ok((self.coin(i)?, self.share()?)),
                CurveOperation::RemoveLiquidityOneCoin => Ok((self.share()?, self.coin(j)?)),
            },
            PoolCall::Weighted {
                asset_in,
                asset_out,
                operation,
            } => match operation {
                WeightedOperation::Swap => Ok((self.ensure_coin(asset_in)?, self.ensure_coin(asset_out)?)),
                WeightedOperation::Join => Ok((self.ensure_coin(asset_in)?, self.ensure_share(asset_out)?)),
                WeightedOperation::Exit => Ok((self.ensure_share(asset_in)?, self.ensure_coin(asset_out)?)),
            },
            PoolCall::ConstantProduct { token_in, token_out } => {
                Ok((self.ensure_coin(token_in)?, self.ensure_coin(token_out)?))
            }
            PoolCall::Passthrough { asset_in, asset_out } => {
                let share = self.share()?;
                if asset_in == share {
                    Ok((share, self.ensure_coin(asset_out)?))
                } else {
                    Ok((self.ensure_coin(asset_in)?, self.ensure_share(asset_out)?))
                }
            }
        }
    }

    fn less_bps(amount: U256, bps: u64) -> Result<U256> {
        mul_div(
            amount,
            U256::from(PERCENTAGE_FACTOR.saturating_sub(bps)),
            U256::from(PERCENTAGE_FACTOR),
        )
    }

    fn pay_in(&self, tokens: &mut dyn TokenBank, caller: Address, asset: Address, amount: U256) -> Result<()> {
        if Some(asset) == self.share_token {
            tokens.burn(asset, caller, amount)
        } else {
            tokens.transfer(asset, caller, self.address, amount)
        }
    }

    fn pay_out(&self, tokens: &mut dyn TokenBank, caller: Address, asset: Address, amount: U256) -> Result<()> {
        if Some(asset) == self.share_token {
            tokens.mint(asset, caller, amount)
        } else {
            tokens.transfer(asset, self.address, caller, amount)
        }
    }
}

impl LiquidityPool for PricedPool {
    fn address(&self) -> Address {
        self.address
    }

    fn family(&self) -> PoolFamily {
        self.family
    }

    fn coins(&self) -> &[Address] {
        &self.coins
    }

    fn share_token(&self) -> Option<Address> {
        self.share_token
    }

    fn quote(&self, call: &PoolCall, amount_in: U256) -> Result<U256> {
        let (asset_in, asset_out) = self.legs(call)?;
        let (from, to) = (self.quote_of(asset_in)?, self.quote_of(asset_out)?);

        if call.is_passthrough() {
            // 1:1 in whole units, decimals only
            let unit = AssetQuote { price: U256::from(1u64), ..from };
            let target = AssetQuote { price: U256::from(1u64), ..to };
            return convert(amount_in, unit, target);
        }
        Self::less_bps(convert(amount_in, from, to)?, self.fee_bps)
    }

    fn execute(&mut self, tokens: &mut dyn TokenBank, caller: Address, call: &PoolCall, amount_in: U256) -> Result<U256> {
        let (asset_in, asset_out) = self.legs(call)?;
        let quoted = self.quote(call, amount_in)?;
        let delivered = if call.is_passthrough() {
            quoted
        } else {
            Self::less_bps(quoted, self.shortfall_bps)?
        };

        self.pay_in(tokens, caller, asset_in, amount_in)?;
        self.pay_out(tokens, caller, asset_out, delivered)?;
        Ok(delivered)
    }

    fn join(&mut self, tokens: &mut dyn TokenBank, caller: Address, amounts: &[U256]) -> Result<U256> {
        if amounts.len() != self.coins.len() {
            return Err(LeverageError::InvalidSwapPath(format!(
                "join of pool {} takes {} amounts, got {}",
                self.address,
                self.coins.len(),
                amounts.len()
            )));
        }
        let share = self.share()?;
        let share_quote = self.quote_of(share)?;

        let mut value = U256::ZERO;
        for (coin, amount) in self.coins.iter().zip(amounts) {
            value += self.quote_of(*coin)?.value_of(*amount)?;
        }
        let minted = Self::less_bps(share_quote.amount_for(value)?, self.fee_bps + self.shortfall_bps)?;

        for (coin, amount) in self.coins.clone().into_iter().zip(amounts) {
            self.pay_in(tokens, caller, coin, *amount)?;
        }
        self.pay_out(tokens, caller, share, minted)?;
        Ok(minted)
    }

    fn exit(&mut self, tokens: &mut dyn TokenBank, caller: Address, shares: U256) -> Result<Vec<U256>> {
        let share = self.share()?;
        let value = self.quote_of(share)?.value_of(shares)?;

        let mut outputs = Vec::with_capacity(self.coins.len());
        for (coin, weight) in self.coins.iter().zip(&self.weights_bps) {
            let portion = mul_div(value, U256::from(*weight), U256::from(PERCENTAGE_FACTOR))?;
            let amount = self.quote_of(*coin)?.amount_for(portion)?;
            outputs.push(Self::less_bps(amount, self.fee_bps + self.shortfall_bps)?);
        }

        self.pay_in(tokens, caller, share, shares)?;
        for (coin, amount) in self.coins.clone().into_iter().zip(&outputs) {
            self.pay_out(tokens, caller, coin, *amount)?;
        }
        Ok(outputs)
    }
}

/// Pools keyed by address
#[derive(Debug, Clone, Default)]
pub struct PoolSet {
    pools: BTreeMap<Address, PricedPool>,
}

impl PoolSet {
    pub fn insert(&mut self, pool: PricedPool) {
        self.pools.insert(pool.address, pool);
    }

    pub fn get_mut(&mut self, address: Address) -> Option<&mut PricedPool> {
        self.pools.get_mut(&address)
    }
}

impl PoolDirectory for PoolSet {
    fn pool(&self, address: Address) -> Option<&dyn LiquidityPool> {
        self.pools.get(&address).map(|p| p as &dyn LiquidityPool)
    }

    fn pool_mut(&mut self, address: Address) -> Option<&mut dyn LiquidityPool> {
        self.pools.get_mut(&address).map(|p| p as &mut dyn LiquidityPool)
    }

    fn pool_for_share(&self, share: Address) -> Option<Address> {
        self.pools
            .values()
            .find(|p| p.share_token == Some(share))
            .map(|p| p.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::InMemoryBank;
    use alloy_primitives::address;

    const POOL: Address = address!("00000000000000000000000000000000000000a1");
    const USDC: Address = address!("00000000000000000000000000000000000000c1");
    const DAI: Address = address!("00000000000000000000000000000000000000c2");
    const BPT: Address = address!("00000000000000000000000000000000000000c3");
    const ALICE: Address = address!("00000000000000000000000000000000000000e1");

    fn dollar(decimals: u8) -> AssetQuote {
        AssetQuote::new(U256::from(100_000_000u64), decimals).unwrap()
    }

    fn setup() -> (PricedPool, InMemoryBank) {
        let pool = PricedPool::new(POOL, PoolFamily::Weighted, 0)
            .with_coin(USDC, dollar(6), 5_000)
            .with_coin(DAI, dollar(18), 5_000)
            .with_share(BPT, dollar(18));
        let mut bank = InMemoryBank::new();
        bank.register(USDC, 6);
        bank.register(DAI, 18);
        bank.register(BPT, 18);
        bank.mint(USDC, POOL, U256::from(1_000_000_000u64)).unwrap();
        bank.mint(DAI, POOL, U256::from(1_000u64) * U256::from(10u64).pow(U256::from(18u64))).unwrap();
        bank.mint(USDC, ALICE, U256::from(100_000_000u64)).unwrap();
        (pool, bank)
    }

    #[test]
    fn test_swap_scales_decimals() {
        let (mut pool, mut bank) = setup();
        let call = PoolCall::Weighted {
            asset_in: USDC,
            asset_out: DAI,
            operation: WeightedOperation::Swap,
        };
        let out = pool.execute(&mut bank, ALICE, &call, U256::from(1_000_000u64)).unwrap();
        assert_eq!(out, U256::from(10u64).pow(U256::from(18u64)));
        assert_eq!(bank.balance_of(DAI, ALICE), out);
    }

    #[test]
    fn test_shortfall_undercuts_quote() {
        let (mut pool, mut bank) = setup();
        pool.set_shortfall_bps(100);
        let call = PoolCall::Weighted {
            asset_in: USDC,
            asset_out: BPT,
            operation: WeightedOperation::Join,
        };
        let quoted = pool.quote(&call, U256::from(1_000_000u64)).unwrap();
        let got = pool.execute(&mut bank, ALICE, &call, U256::from(1_000_000u64)).unwrap();
        assert!(got < quoted);
    }

    #[test]
    fn test_join_then_exit_returns_constituents() {
        let (mut pool, mut bank) = setup();
        let shares = pool
            .join(&mut bank, ALICE, &[U256::from(10_000_000u64), U256::ZERO])
            .unwrap();
        assert_eq!(shares, U256::from(10u64) * U256::from(10u64).pow(U256::from(18u64)));

        let out = pool.exit(&mut bank, ALICE, shares).unwrap();
        assert_eq!(out[0], U256::from(5_000_000u64));
        assert_eq!(bank.balance_of(BPT, ALICE), U256::ZERO);
    }

    #[test]
    fn test_wrong_asset_rejected() {
        let (pool, _) = setup();
        let call = PoolCall::ConstantProduct {
            token_in: BPT,
            token_out: USDC,
        };
        assert_eq!(pool.quote(&call, U256::from(1u64)).unwrap_err().code(), "116");
    }
}
