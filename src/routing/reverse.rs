//! Reverse-Path Engine
//!
//! Unwinds collateral back into the borrow asset on exit. Reverse paths
//! either start at the collateral itself, or at constituents of the pool
//! that issues it; in the latter case the collateral is first exited from
//! that pool and each constituent is routed on its own path. A constituent
//! that already is the target asset needs no path.

use alloy_primitives::{Address, U256};
use tracing::{info, warn};

use super::aggregator::{split_by_declared, AggregateResult};
use super::executor::SwapPathExecutor;
use super::types::SwapPath;
use crate::errors::{LeverageError, Result};

/// Swaps `amount` of `collateral` into `asset_out` over `paths`
pub fn unwind_collateral(
    exec: &mut SwapPathExecutor<'_>,
    paths: &[&SwapPath],
    collateral: Address,
    amount: U256,
    asset_out: Address,
) -> Result<AggregateResult> {
    if amount.is_zero() {
        return Err(LeverageError::ZeroAmount("collateral to unwind"));
    }
    if paths.is_empty() {
        return Err(LeverageError::InvalidSwapPath(format!(
            "no reverse path from {} to {}",
            collateral, asset_out
        )));
    }
    if let Some(stray) = paths.iter().find(|p| p.swap_to != asset_out) {
        return Err(LeverageError::InvalidSwapPath(format!(
            "reverse path ends at {} instead of {}",
            stray.swap_to, asset_out
        )));
    }

    let declared: Vec<U256> = paths.iter().map(|p| p.in_amount).collect();
    let shares = split_by_declared(&declared, amount)?;

    let mut result = AggregateResult {
        amount_in: amount,
        ..Default::default()
    };

    // Paths that take the collateral as is
    let mut to_exit = U256::ZERO;
    for (path, share) in paths.iter().zip(shares.iter()) {
        if path.swap_from != collateral {
            to_exit += *share;
            continue;
        }
        if share.is_zero() {
            continue;
        }
        let run = exec.execute(path, *share)?;
        result.amount_out += run.amount_out;
        result.paths.push(run);
    }

    if !to_exit.is_zero() {
        let (pool, coins) = exec.share_pool(collateral)?;
        if let Some(stray) = paths
            .iter()
            .find(|p| p.swap_from != collateral && !coins.contains(&p.swap_from))
        {
            return Err(LeverageError::InvalidSwapPath(format!(
                "reverse path starts at {}, neither {} nor a constituent of {}",
                stray.swap_from, collateral, pool
            )));
        }

        let released = exec.exit(pool, to_exit)?;
        result.joined_pool = Some(pool);

        for (coin, received) in coins.iter().zip(released) {
            let routes: Vec<&&SwapPath> = paths.iter().filter(|p| p.swap_from == *coin).collect();
            if routes.is_empty() {
                if *coin == asset_out {
                    result.amount_out += received;
                } else if !received.is_zero() {
                    warn!("{} of constituent {} has no reverse path, left for sweep", received, coin);
                }
                continue;
            }

            let weights: Vec<U256> = routes.iter().map(|p| p.in_amount).collect();
            for (path, part) in routes.into_iter().zip(split_by_declared(&weights, received)?) {
                if part.is_zero() {
                    continue;
                }
                let run = exec.execute(path, part)?;
                result.amount_out += run.amount_out;
                result.paths.push(run);
            }
        }
    }

    info!(
        "unwound {} {} -> {} {} over {} paths",
        amount,
        collateral,
        result.amount_out,
        asset_out,
        result.paths.len()
    );

    Ok(result)
}
