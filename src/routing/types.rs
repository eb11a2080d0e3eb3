//! Route data model
//!
//! A `SwapInfo` carries up to three forward `SwapPath`s (borrow asset ->
//! collateral) and up to three reverse ones (collateral -> borrow asset).
//! Each path is up to four hops. Unused slots hold the canonical sentinel
//! (zero pool, kind `None`) and are skipped.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::{LeverageError, Result};
use crate::externals::{CurveOperation, PoolCall, PoolFamily, WeightedOperation};

/// Hop capacity of one path
pub const MAX_HOPS: usize = 4;

/// Path capacity of one direction of a `SwapInfo`
pub const MAX_PATHS: usize = 3;

/// How a hop reaches its pool
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapKind {
    /// Unused slot
    None = 0,
    /// Join/exit a pool share 1:1 without a price
    NoSwap = 1,
    Curve = 2,
    Balancer = 3,
    UniswapV2 = 4,
}

impl SwapKind {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(SwapKind::None),
            1 => Ok(SwapKind::NoSwap),
            2 => Ok(SwapKind::Curve),
            3 => Ok(SwapKind::Balancer),
            4 => Ok(SwapKind::UniswapV2),
            other => Err(LeverageError::InvalidSwapPath(format!("unknown swap kind {}", other))),
        }
    }

    /// Pool family this kind dispatches to
    pub fn family(&self) -> Option<PoolFamily> {
        match self {
            SwapKind::Curve => Some(PoolFamily::StableSwap),
            SwapKind::Balancer => Some(PoolFamily::Weighted),
            SwapKind::UniswapV2 => Some(PoolFamily::ConstantProduct),
            SwapKind::None | SwapKind::NoSwap => None,
        }
    }
}

impl std::fmt::Display for SwapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwapKind::None => write!(f, "none"),
            SwapKind::NoSwap => write!(f, "no-swap"),
            SwapKind::Curve => write!(f, "curve"),
            SwapKind::Balancer => write!(f, "balancer"),
            SwapKind::UniswapV2 => write!(f, "uniswap-v2"),
        }
    }
}

/// Pool operation code carried by a hop
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolOperation {
    None = 0,
    Exchange = 1,
    ExchangeUnderlying = 2,
    AddLiquidity = 3,
    RemoveLiquidityOneCoin = 4,
    Join = 5,
    Exit = 6,
}

impl PoolOperation {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(PoolOperation::None),
            1 => Ok(PoolOperation::Exchange),
            2 => Ok(PoolOperation::ExchangeUnderlying),
            3 => Ok(PoolOperation::AddLiquidity),
            4 => Ok(PoolOperation::RemoveLiquidityOneCoin),
            5 => Ok(PoolOperation::Join),
            6 => Ok(PoolOperation::Exit),
            other => Err(LeverageError::InvalidSwapPath(format!("unknown pool operation {}", other))),
        }
    }
}

// ============================================
// HOP
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapHop {
    pub pool: Address,
    pub kind: SwapKind,
    pub from_asset: Address,
    pub to_asset: Address,
    /// Coin slot of `from_asset` in the pool
    pub from_index: u8,
    /// Coin slot of `to_asset` in the pool
    pub to_index: u8,
    pub operation: PoolOperation,
    /// Smallest acceptable realized output; ignored for `NoSwap`
    pub min_amount_out: U256,
}

impl SwapHop {
    pub const SENTINEL: SwapHop = SwapHop {
        pool: Address::ZERO,
        kind: SwapKind::None,
        from_asset: Address::ZERO,
        to_asset: Address::ZERO,
        from_index: 0,
        to_index: 0,
        operation: PoolOperation::None,
        min_amount_out: U256::ZERO,
    };

    pub fn new(pool: Address, kind: SwapKind, from_asset: Address, to_asset: Address, operation: PoolOperation) -> Self {
        Self {
            pool,
            kind,
            from_asset,
            to_asset,
            from_index: 0,
            to_index: 0,
            operation,
            min_amount_out: U256::ZERO,
        }
    }

    pub fn with_indices(mut self, from_index: u8, to_index: u8) -> Self {
        self.from_index = from_index;
        self.to_index = to_index;
        self
    }

    pub fn with_min_out(mut self, min_amount_out: U256) -> Self {
        self.min_amount_out = min_amount_out;
        self
    }

    pub fn is_sentinel(&self) -> bool {
        self.pool == Address::ZERO && self.kind == SwapKind::None
    }

    /// Family-tagged pool call for this hop
    pub fn pool_call(&self) -> Result<PoolCall> {
        let unsupported = || {
            LeverageError::InvalidSwapPath(format!(
                "{} hop on {} cannot run {:?}",
                self.kind, self.pool, self.operation
            ))
        };

        match self.kind {
            SwapKind::None => Err(LeverageError::InvalidSwapPath(
                "sentinel hop is not executable".to_string(),
            )),
            SwapKind::NoSwap => match self.operation {
                PoolOperation::None | PoolOperation::Join | PoolOperation::Exit => Ok(PoolCall::Passthrough {
                    asset_in: self.from_asset,
                    asset_out: self.to_asset,
                }),
                _ => Err(unsupported()),
            },
            SwapKind::Curve => {
                let operation = match self.operation {
                    PoolOperation::Exchange => CurveOperation::Exchange,
                    PoolOperation::ExchangeUnderlying => CurveOperation::ExchangeUnderlying,
                    PoolOperation::AddLiquidity => CurveOperation::AddLiquidity,
                    PoolOperation::RemoveLiquidityOneCoin => CurveOperation::RemoveLiquidityOneCoin,
                    _ => return Err(unsupported()),
                };
                Ok(PoolCall::StableSwap {
                    i: self.from_index,
                    j: self.to_index,
                    operation,
                })
            }
            SwapKind::Balancer => {
                let operation = match self.operation {
                    PoolOperation::Exchange => WeightedOperation::Swap,
                    PoolOperation::Join => WeightedOperation::Join,
                    PoolOperation::Exit => WeightedOperation::Exit,
                    _ => return Err(unsupported()),
                };
                Ok(PoolCall::Weighted {
                    asset_in: self.from_asset,
                    asset_out: self.to_asset,
                    operation,
                })
            }
            SwapKind::UniswapV2 => match self.operation {
                PoolOperation::Exchange => Ok(PoolCall::ConstantProduct {
                    token_in: self.from_asset,
                    token_out: self.to_asset,
                }),
                _ => Err(unsupported()),
            },
        }
    }
}

impl Default for SwapHop {
    fn default() -> Self {
        Self::SENTINEL
    }
}

// ============================================
// PATH
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapPath {
    pub hops: Vec<SwapHop>,
    pub swap_from: Address,
    pub swap_to: Address,
    /// Declared input; used to split input across parallel paths
    pub in_amount: U256,
    /// Smallest acceptable output of the whole path
    pub min_amount_out: U256,
}

impl SwapPath {
    /// Builds a path whose endpoints are taken from its first and last hop
    pub fn new(hops: Vec<SwapHop>, in_amount: U256, min_amount_out: U256) -> Self {
        let swap_from = hops.iter().find(|h| !h.is_sentinel()).map(|h| h.from_asset).unwrap_or_default();
        let swap_to = hops.iter().rev().find(|h| !h.is_sentinel()).map(|h| h.to_asset).unwrap_or_default();
        Self {
            hops,
            swap_from,
            swap_to,
            in_amount,
            min_amount_out,
        }
    }

    pub fn sentinel() -> Self {
        Self {
            hops: Vec::new(),
            swap_from: Address::ZERO,
            swap_to: Address::ZERO,
            in_amount: U256::ZERO,
            min_amount_out: U256::ZERO,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.swap_from == Address::ZERO && self.hops.iter().all(SwapHop::is_sentinel)
    }

    pub fn active_hops(&self) -> impl Iterator<Item = &SwapHop> {
        self.hops.iter().filter(|h| !h.is_sentinel())
    }

    pub fn validate(&self) -> Result<()> {
        if self.hops.len() > MAX_HOPS {
            return Err(LeverageError::InvalidSwapPath(format!(
                "{} hops exceed capacity {}",
                self.hops.len(),
                MAX_HOPS
            )));
        }
        if self.is_sentinel() {
            return Ok(());
        }

        let active: Vec<&SwapHop> = self.active_hops().collect();
        let (first, last) = match (active.first(), active.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => {
                return Err(LeverageError::InvalidSwapPath(format!(
                    "path {} -> {} has no hops",
                    self.swap_from, self.swap_to
                )))
            }
        };

        if first.from_asset != self.swap_from {
            return Err(LeverageError::InvalidSwapPath(format!(
                "path starts at {} but declares swap_from {}",
                first.from_asset, self.swap_from
            )));
        }
        if last.to_asset != self.swap_to {
            return Err(LeverageError::InvalidSwapPath(format!(
                "path ends at {} but declares swap_to {}",
                last.to_asset, self.swap_to
            )));
        }

        for pair in active.windows(2) {
            if pair[0].to_asset != pair[1].from_asset {
                return Err(LeverageError::InvalidSwapPath(format!(
                    "hop into {} does not chain with hop from {}",
                    pair[0].to_asset, pair[1].from_asset
                )));
            }
        }

        for hop in &active {
            if hop.pool == Address::ZERO || hop.kind == SwapKind::None {
                return Err(LeverageError::InvalidSwapPath(
                    "half-empty hop: pool and kind must both be set".to_string(),
                ));
            }
            hop.pool_call()?;
        }

        Ok(())
    }
}

// ============================================
// SWAP INFO
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapInfo {
    pub paths: Vec<SwapPath>,
    pub reverse_paths: Vec<SwapPath>,
    /// Number of leading slots in use, in both directions
    pub path_length: usize,
}

impl SwapInfo {
    pub fn single(path: SwapPath, reverse: SwapPath) -> Self {
        Self {
            paths: vec![path],
            reverse_paths: vec![reverse],
            path_length: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.path_length > MAX_PATHS {
            return Err(LeverageError::InvalidSwapPath(format!(
                "path length {} exceeds capacity {}",
                self.path_length, MAX_PATHS
            )));
        }
        if self.paths.len() > MAX_PATHS || self.reverse_paths.len() > MAX_PATHS {
            return Err(LeverageError::InvalidSwapPath(format!(
                "{} forward / {} reverse paths exceed capacity {}",
                self.paths.len(),
                self.reverse_paths.len(),
                MAX_PATHS
            )));
        }
        for path in self.paths.iter().chain(self.reverse_paths.iter()) {
            path.validate()?;
        }
        Ok(())
    }

    /// Copy with every path and hop minimum cleared; declared inputs stay as split weights
    pub fn without_minimums(&self) -> SwapInfo {
        let clear = |paths: &[SwapPath]| -> Vec<SwapPath> {
            paths
                .iter()
                .map(|p| SwapPath {
                    hops: p.hops.iter().map(|h| h.with_min_out(U256::ZERO)).collect(),
                    min_amount_out: U256::ZERO,
                    ..p.clone()
                })
                .collect()
        };
        SwapInfo {
            paths: clear(&self.paths),
            reverse_paths: clear(&self.reverse_paths),
            path_length: self.path_length,
        }
    }

    /// Every asset a hop of this route touches
    pub fn assets(&self) -> Vec<Address> {
        let mut assets: Vec<Address> = self
            .paths
            .iter()
            .chain(self.reverse_paths.iter())
            .flat_map(|p| p.active_hops().flat_map(|h| [h.from_asset, h.to_asset]))
            .collect();
        assets.sort();
        assets.dedup();
        assets
    }

    pub fn active_paths(&self) -> Vec<&SwapPath> {
        Self::active(&self.paths, self.path_length)
    }

    pub fn active_reverse_paths(&self) -> Vec<&SwapPath> {
        Self::active(&self.reverse_paths, self.path_length)
    }

    fn active(paths: &[SwapPath], path_length: usize) -> Vec<&SwapPath> {
        paths.iter().take(path_length).filter(|p| !p.is_sentinel()).collect()
    }
}
