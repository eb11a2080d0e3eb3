//! MultiPath Aggregator
//!
//! Runs up to three forward paths in parallel and combines their outputs
//! into the collateral asset. Input is split in proportion to each path's
//! declared `in_amount`; the last path absorbs rounding.
//!
//! Paths either end in the collateral itself (outputs are summed) or in
//! constituents of the pool that issues the collateral (outputs are joined
//! into that pool in one call).

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use super::executor::{PathResult, SwapPathExecutor};
use super::types::SwapPath;
use crate::errors::{LeverageError, Result};

/// Combined outcome of a multi-path run
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub paths: Vec<PathResult>,
    /// Pool joined to produce the collateral, if any
    pub joined_pool: Option<Address>,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// Splits `amount` across `declared` proportionally.
/// A zero total splits evenly; the last slot takes the remainder.
pub fn split_by_declared(declared: &[U256], amount: U256) -> Result<Vec<U256>> {
    if declared.is_empty() {
        return Ok(Vec::new());
    }

    let total = declared
        .iter()
        .try_fold(U256::ZERO, |acc, d| acc.checked_add(*d))
        .ok_or_else(|| LeverageError::InvalidParameter("declared path amounts overflow".to_string()))?;
    let count = U256::from(declared.len());
    let mut shares = Vec::with_capacity(declared.len());
    let mut assigned = U256::ZERO;

    for (k, weight) in declared.iter().enumerate() {
        let share = if k + 1 == declared.len() {
            amount
                .checked_sub(assigned)
                .ok_or_else(|| LeverageError::InvalidParameter("path split exceeds the input".to_string()))?
        } else if total.is_zero() {
            amount / count
        } else {
            amount
                .checked_mul(*weight)
                .map(|p| p / total)
                .unwrap_or_else(|| scaled_share(amount, *weight, total))
        };
        assigned += share;
        shares.push(share);
    }

    Ok(shares)
}

/// amount * weight / total for declarations too large to multiply directly;
/// both weight and total drop their low bits until the product fits
fn scaled_share(amount: U256, weight: U256, total: U256) -> U256 {
    let shift = (amount.bit_len() + weight.bit_len()).saturating_sub(256);
    let total = total >> shift;
    if total.is_zero() {
        return U256::ZERO;
    }
    amount * (weight >> shift) / total
}

/// Swaps `amount` of `asset_in` into `collateral` over `paths`
pub fn produce_collateral(
    exec: &mut SwapPathExecutor<'_>,
    paths: &[&SwapPath],
    asset_in: Address,
    amount: U256,
    collateral: Address,
) -> Result<AggregateResult> {
    if amount.is_zero() {
        return Err(LeverageError::ZeroAmount("aggregate swap input"));
    }
    if paths.is_empty() {
        return Err(LeverageError::InvalidSwapPath(format!(
            "no forward path from {} to {}",
            asset_in, collateral
        )));
    }
    if let Some(stray) = paths.iter().find(|p| p.swap_from != asset_in) {
        return Err(LeverageError::InvalidSwapPath(format!(
            "forward path starts at {} instead of {}",
            stray.swap_from, asset_in
        )));
    }

    let declared: Vec<U256> = paths.iter().map(|p| p.in_amount).collect();
    let shares = split_by_declared(&declared, amount)?;

    let needs_join = paths.iter().any(|p| p.swap_to != collateral);
    let join_target = if needs_join {
        Some(exec.share_pool(collateral)?)
    } else {
        None
    };

    let mut result = AggregateResult {
        amount_in: amount,
        ..Default::default()
    };
    let mut direct = U256::ZERO;
    let mut constituents = join_target
        .as_ref()
        .map(|(_, coins)| vec![U256::ZERO; coins.len()])
        .unwrap_or_default();

    for (path, share) in paths.iter().zip(shares) {
        if share.is_zero() {
            debug!("path to {} got no input, skipping", path.swap_to);
            continue;
        }
        let run = exec.execute(path, share)?;

        if path.swap_to == collateral {
            direct += run.amount_out;
        } else {
            let (pool, coins) = join_target
                .as_ref()
                .ok_or_else(|| LeverageError::InvalidSwapPath("join pool missing".to_string()))?;
            let slot = coins.iter().position(|c| *c == path.swap_to).ok_or_else(|| {
                LeverageError::InvalidSwapPath(format!(
                    "path output {} is not a constituent of {}",
                    path.swap_to, pool
                ))
            })?;
            constituents[slot] += run.amount_out;
        }
        result.paths.push(run);
    }

    let mut joined = U256::ZERO;
    if let Some((pool, _)) = join_target {
        if constituents.iter().any(|a| !a.is_zero()) {
            joined = exec.join(pool, collateral, &constituents)?;
            result.joined_pool = Some(pool);
        }
    }

    result.amount_out = direct + joined;
    info!(
        "aggregated {} paths: {} {} -> {} {}",
        result.paths.len(),
        amount,
        asset_in,
        result.amount_out,
        collateral
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_proportional_with_remainder() {
        let declared = vec![U256::from(1u64), U256::from(2u64)];
        let shares = split_by_declared(&declared, U256::from(100u64)).unwrap();
        assert_eq!(shares, vec![U256::from(33u64), U256::from(67u64)]);
    }

    #[test]
    fn test_split_zero_declared_is_even() {
        let declared = vec![U256::ZERO; 3];
        let shares = split_by_declared(&declared, U256::from(10u64)).unwrap();
        assert_eq!(shares, vec![U256::from(3u64), U256::from(3u64), U256::from(4u64)]);
    }

    #[test]
    fn test_split_overflowing_declarations_rejected() {
        let declared = vec![U256::MAX, U256::MAX, U256::from(1u64)];
        let err = split_by_declared(&declared, U256::from(1u64)).unwrap_err();
        assert_eq!(err.code(), "122");
    }

    #[test]
    fn test_split_huge_weights_stay_within_input() {
        let declared = vec![U256::MAX / U256::from(2u64), U256::MAX / U256::from(2u64)];
        let amount = U256::from(1_000_001u64);
        let shares = split_by_declared(&declared, amount).unwrap();
        assert_eq!(shares.iter().fold(U256::ZERO, |acc, s| acc + *s), amount);
        assert_eq!(shares[0], U256::from(500_000u64));
    }

    #[test]
    fn test_split_single_path_takes_all() {
        let shares = split_by_declared(&[U256::from(5u64)], U256::from(1_000u64)).unwrap();
        assert_eq!(shares, vec![U256::from(1_000u64)]);
    }
}
