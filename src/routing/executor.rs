//! SwapPath Executor
//!
//! Runs one path hop by hop against live pools. The amount handed to each
//! hop is what the previous hop actually delivered (measured as a balance
//! delta on the holder), never the declared estimate. The declared per-hop
//! minimum is the only thing the estimate controls.

use alloy_primitives::{Address, U256};
use tracing::{debug, trace, warn};

use super::types::{SwapHop, SwapPath};
use crate::errors::{LeverageError, Result};
use crate::externals::{PoolDirectory, TokenBank};

/// Outcome of one executed hop
#[derive(Debug, Clone)]
pub struct HopResult {
    pub pool: Address,
    pub asset_in: Address,
    pub asset_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// Outcome of one executed path
#[derive(Debug, Clone)]
pub struct PathResult {
    pub hops: Vec<HopResult>,
    pub asset_out: Address,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// Executes paths on behalf of `holder`, the account that owns the input
pub struct SwapPathExecutor<'a> {
    tokens: &'a mut dyn TokenBank,
    pools: &'a mut dyn PoolDirectory,
    holder: Address,
}

impl<'a> SwapPathExecutor<'a> {
    pub fn new(tokens: &'a mut dyn TokenBank, pools: &'a mut dyn PoolDirectory, holder: Address) -> Self {
        Self { tokens, pools, holder }
    }

    pub fn holder(&self) -> Address {
        self.holder
    }

    pub fn tokens(&mut self) -> &mut dyn TokenBank {
        &mut *self.tokens
    }

    pub fn pools(&mut self) -> &mut dyn PoolDirectory {
        &mut *self.pools
    }

    /// Runs every non-sentinel hop of `path` starting from `amount_in` of `path.swap_from`
    pub fn execute(&mut self, path: &SwapPath, amount_in: U256) -> Result<PathResult> {
        if amount_in.is_zero() {
            return Err(LeverageError::ZeroAmount("swap input"));
        }
        path.validate()?;

        let mut running_asset = path.swap_from;
        let mut amount = amount_in;
        let mut hops = Vec::with_capacity(path.hops.len());

        for (n, hop) in path.hops.iter().enumerate() {
            if hop.is_sentinel() {
                trace!("hop {} is a sentinel, skipping", n);
                continue;
            }
            if hop.from_asset != running_asset {
                return Err(LeverageError::InvalidSwapPath(format!(
                    "hop {} expects {} but holder carries {}",
                    n, hop.from_asset, running_asset
                )));
            }

            let received = self.execute_hop(hop, amount)?;
            debug!(
                "hop {} via {} ({}): {} {} -> {} {}",
                n, hop.pool, hop.kind, amount, hop.from_asset, received, hop.to_asset
            );

            hops.push(HopResult {
                pool: hop.pool,
                asset_in: hop.from_asset,
                asset_out: hop.to_asset,
                amount_in: amount,
                amount_out: received,
            });
            running_asset = hop.to_asset;
            amount = received;
        }

        if running_asset != path.swap_to {
            return Err(LeverageError::InvalidSwapPath(format!(
                "path ended in {} instead of {}",
                running_asset, path.swap_to
            )));
        }
        if amount < path.min_amount_out {
            let pool = hops.last().map(|h| h.pool).unwrap_or_default();
            return Err(LeverageError::SlippageExceeded {
                pool,
                minimum: path.min_amount_out,
                realized: amount,
            });
        }

        Ok(PathResult {
            hops,
            asset_out: running_asset,
            amount_in,
            amount_out: amount,
        })
    }

    fn execute_hop(&mut self, hop: &SwapHop, amount_in: U256) -> Result<U256> {
        let call = hop.pool_call()?;
        let pool = self
            .pools
            .pool_mut(hop.pool)
            .ok_or_else(|| LeverageError::InvalidSwapPath(format!("unknown pool {}", hop.pool)))?;

        if let Some(family) = call.family() {
            if pool.family() != family {
                return Err(LeverageError::InvalidSwapPath(format!(
                    "pool {} is {} but hop is {}",
                    hop.pool,
                    pool.family(),
                    hop.kind
                )));
            }
        }

        let before = self.tokens.balance_of(hop.to_asset, self.holder);
        let reported = pool.execute(&mut *self.tokens, self.holder, &call, amount_in)?;
        let after = self.tokens.balance_of(hop.to_asset, self.holder);
        let received = after.saturating_sub(before);

        if reported != received {
            warn!(
                "pool {} reported {} but holder received {}",
                hop.pool, reported, received
            );
        }

        // Join/exit without swap is 1:1 with what is held; no price to check
        if !call.is_passthrough() && received < hop.min_amount_out {
            return Err(LeverageError::SlippageExceeded {
                pool: hop.pool,
                minimum: hop.min_amount_out,
                realized: received,
            });
        }

        Ok(received)
    }

    /// Chains pool quotes along `path` without moving funds
    pub fn quote(&self, path: &SwapPath, amount_in: U256) -> Result<U256> {
        quote_path(&*self.pools, path, amount_in)
    }

    /// Pool issuing `share` and its constituent coins
    pub fn share_pool(&self, share: Address) -> Result<(Address, Vec<Address>)> {
        let address = self
            .pools
            .pool_for_share(share)
            .ok_or_else(|| LeverageError::InvalidSwapPath(format!("no pool issues {}", share)))?;
        let pool = self
            .pools
            .pool(address)
            .ok_or_else(|| LeverageError::InvalidSwapPath(format!("unknown pool {}", address)))?;
        Ok((address, pool.coins().to_vec()))
    }

    /// Joins `pool` with `amounts` (indexed like its coins), returns shares received
    pub fn join(&mut self, pool: Address, share: Address, amounts: &[U256]) -> Result<U256> {
        let target = self
            .pools
            .pool_mut(pool)
            .ok_or_else(|| LeverageError::InvalidSwapPath(format!("unknown pool {}", pool)))?;

        let before = self.tokens.balance_of(share, self.holder);
        target.join(&mut *self.tokens, self.holder, amounts)?;
        let received = self.tokens.balance_of(share, self.holder).saturating_sub(before);

        debug!("joined {} with {:?}: {} shares", pool, amounts, received);
        Ok(received)
    }

    /// Exits `pool` with `shares`, returns constituents received (indexed like its coins)
    pub fn exit(&mut self, pool: Address, shares: U256) -> Result<Vec<U256>> {
        let target = self
            .pools
            .pool_mut(pool)
            .ok_or_else(|| LeverageError::InvalidSwapPath(format!("unknown pool {}", pool)))?;
        let coins = target.coins().to_vec();

        let before: Vec<U256> = coins.iter().map(|c| self.tokens.balance_of(*c, self.holder)).collect();
        target.exit(&mut *self.tokens, self.holder, shares)?;
        let received: Vec<U256> = coins
            .iter()
            .zip(before)
            .map(|(c, b)| self.tokens.balance_of(*c, self.holder).saturating_sub(b))
            .collect();

        debug!("exited {} with {} shares: {:?}", pool, shares, received);
        Ok(received)
    }
}

/// Expected output of `path` for `amount_in`, from pool quotes only
pub fn quote_path(pools: &dyn PoolDirectory, path: &SwapPath, amount_in: U256) -> Result<U256> {
    path.validate()?;
    let mut amount = amount_in;
    for hop in path.active_hops() {
        let call = hop.pool_call()?;
        let pool = pools
            .pool(hop.pool)
            .ok_or_else(|| LeverageError::InvalidSwapPath(format!("unknown pool {}", hop.pool)))?;
        amount = pool.quote(&call, amount)?;
    }
    Ok(amount)
}
