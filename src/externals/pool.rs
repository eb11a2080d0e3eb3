//! Liquidity pool seam
//!
//! One `PoolCall` variant per pool family. The engine never prices a trade
//! itself: it asks the pool for a `quote` and trusts the amount `execute`
//! reports as actually delivered.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use super::TokenBank;
use crate::errors::Result;

/// Pool math family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolFamily {
    /// Curve-style stable math
    StableSwap,
    /// Balancer-style weighted math
    Weighted,
    /// Uniswap-V2-style x*y=k
    ConstantProduct,
}

impl std::fmt::Display for PoolFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolFamily::StableSwap => write!(f, "StableSwap"),
            PoolFamily::Weighted => write!(f, "Weighted"),
            PoolFamily::ConstantProduct => write!(f, "ConstantProduct"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurveOperation {
    Exchange,
    ExchangeUnderlying,
    /// Single coin in, pool share out
    AddLiquidity,
    /// Pool share in, single coin out
    RemoveLiquidityOneCoin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightedOperation {
    Swap,
    /// Single-token join, pool share out
    Join,
    /// Single-token exit, pool share in
    Exit,
}

/// A single pool invocation, tagged by family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolCall {
    StableSwap {
        i: u8,
        j: u8,
        operation: CurveOperation,
    },
    Weighted {
        asset_in: Address,
        asset_out: Address,
        operation: WeightedOperation,
    },
    ConstantProduct {
        token_in: Address,
        token_out: Address,
    },
    /// Mints or burns a pool share 1:1 against a constituent already held
    Passthrough {
        asset_in: Address,
        asset_out: Address,
    },
}

impl PoolCall {
    /// Family a pool must belong to for this call; `None` for passthrough
    pub fn family(&self) -> Option<PoolFamily> {
        match self {
            PoolCall::StableSwap { .. } => Some(PoolFamily::StableSwap),
            PoolCall::Weighted { .. } => Some(PoolFamily::Weighted),
            PoolCall::ConstantProduct { .. } => Some(PoolFamily::ConstantProduct),
            PoolCall::Passthrough { .. } => None,
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, PoolCall::Passthrough { .. })
    }
}

pub trait LiquidityPool {
    fn address(&self) -> Address;

    fn family(&self) -> PoolFamily;

    fn coins(&self) -> &[Address];

    /// Share token minted by liquidity operations, if any
    fn share_token(&self) -> Option<Address>;

    /// View-only estimate of `call`'s output for `amount_in`
    fn quote(&self, call: &PoolCall, amount_in: U256) -> Result<U256>;

    /// Pulls `amount_in` from `caller`, credits the output to `caller`, returns it
    fn execute(
        &mut self,
        tokens: &mut dyn TokenBank,
        caller: Address,
        call: &PoolCall,
        amount_in: U256,
    ) -> Result<U256>;

    /// Deposits `amounts[k]` of `coins()[k]` together, returns shares minted
    fn join(&mut self, tokens: &mut dyn TokenBank, caller: Address, amounts: &[U256]) -> Result<U256>;

    /// Burns `shares` and returns every constituent proportionally, indexed like `coins()`
    fn exit(&mut self, tokens: &mut dyn TokenBank, caller: Address, shares: U256) -> Result<Vec<U256>>;
}

pub trait PoolDirectory {
    fn pool(&self, address: Address) -> Option<&dyn LiquidityPool>;

    fn pool_mut(&mut self, address: Address) -> Option<&mut dyn LiquidityPool>;

    /// Pool whose share token is `share`
    fn pool_for_share(&self, share: Address) -> Option<Address>;
}
