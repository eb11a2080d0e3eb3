//! The Leverage Swapper
//!
//! One swapper per collateral asset. It owns no positions: every call
//! reads and writes the borrower's records in the vault and the ledger,
//! and ends holding none of the assets it touched.
//!
//! Entry points (all atomic under the enclosing transaction):
//! - `enter_position_with_flashloan` / `enter_position`
//! - `withdraw_with_flashloan` / `leave_position_with_flashloan` / `leave_position`

mod enter;
mod leave;
mod state;

#[cfg(test)]
mod tests;

pub use state::{FlowDirection, FlowState, FlowTrail};

use alloy_primitives::{Address, U256};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::config::{EngineConfig, PositionLog};
use crate::errors::{LeverageError, Result};
use crate::externals::{Externals, LendingLedger, PoolDirectory, PriceOracle, TokenBank};
use crate::routing::SwapInfo;
use crate::sizing::{mul_div, AssetQuote, PERCENTAGE_FACTOR, WAD};

// ============================================
// CALL PARAMETERS
// ============================================

/// `enter_position_with_flashloan` arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterParams {
    /// Collateral the caller contributes
    pub principal: U256,
    /// Target leverage, 10000 = 1x
    pub leverage_bps: u64,
    pub borrow_asset: Address,
    pub referral_code: u16,
    pub swap_info: SwapInfo,
}

/// `withdraw_with_flashloan` arguments; `U256::MAX` repays or withdraws everything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawParams {
    pub repay_amount: U256,
    /// Collateral to hand back on top of what is sold to cover the flashloan
    pub withdraw_amount: U256,
    pub slippage_bps: u64,
    pub repay_asset: Address,
    pub receipt_token: Address,
    pub referral_code: u16,
    pub swap_info: SwapInfo,
}

/// `leave_position_with_flashloan` arguments: repays all debt, withdraws all collateral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveParams {
    pub slippage_bps: u64,
    pub repay_asset: Address,
    pub receipt_token: Address,
    pub referral_code: u16,
    pub swap_info: SwapInfo,
}

/// `enter_position` arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterativeEnterParams {
    pub principal: U256,
    pub iterations: u32,
    /// Share of each round's deposit borrowed in the next round
    pub ltv_bps: u64,
    pub borrow_asset: Address,
}

/// `leave_position` arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterativeLeaveParams {
    pub withdraw_amount: U256,
    pub slippage_bps: u64,
    pub iterations: u32,
    pub repay_asset: Address,
    pub receipt_token: Address,
}

// ============================================
// RESULTS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    EnterWithFlashloan,
    EnterIterative,
    WithdrawWithFlashloan,
    LeaveWithFlashloan,
    LeaveIterative,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::EnterWithFlashloan => write!(f, "enter-flashloan"),
            Operation::EnterIterative => write!(f, "enter-iterative"),
            Operation::WithdrawWithFlashloan => write!(f, "withdraw-flashloan"),
            Operation::LeaveWithFlashloan => write!(f, "leave-flashloan"),
            Operation::LeaveIterative => write!(f, "leave-iterative"),
        }
    }
}

/// What one successful call moved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub operation: Operation,
    pub user: Address,
    pub collateral: Address,
    pub borrow_asset: Address,
    pub flashloan_amount: U256,
    pub flashloan_premium: U256,
    /// Collateral credited to the borrower in the ledger
    pub collateral_deposited: U256,
    /// Collateral released from the vault
    pub collateral_withdrawn: U256,
    /// Collateral produced by forward swaps, or sold by reverse swaps
    pub collateral_swapped: U256,
    /// Collateral handed back to the borrower
    pub collateral_returned: U256,
    pub debt_borrowed: U256,
    pub debt_repaid: U256,
    /// Rounds executed by the iterative variants
    pub rounds: u32,
    /// Leftover balances sent to the borrower, collateral included
    pub swept: Vec<(Address, U256)>,
    pub trail: Vec<FlowState>,
    pub health_factor: U256,
}

impl ExecutionReport {
    fn new(operation: Operation, user: Address, collateral: Address, borrow_asset: Address) -> Self {
        Self {
            operation,
            user,
            collateral,
            borrow_asset,
            flashloan_amount: U256::ZERO,
            flashloan_premium: U256::ZERO,
            collateral_deposited: U256::ZERO,
            collateral_withdrawn: U256::ZERO,
            collateral_swapped: U256::ZERO,
            collateral_returned: U256::ZERO,
            debt_borrowed: U256::ZERO,
            debt_repaid: U256::ZERO,
            rounds: 0,
            swept: Vec::new(),
            trail: Vec::new(),
            health_factor: U256::MAX,
        }
    }
}

/// Borrower's position as the ledger sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub user: Address,
    pub collateral: Address,
    pub debt_asset: Address,
    /// Receipt-token balance, in collateral units
    pub collateral_amount: U256,
    pub debt_amount: U256,
    pub collateral_value: U256,
    pub debt_value: U256,
    /// Debt over equity, bps; `U256::MAX` when equity is gone
    pub leverage_bps: U256,
    pub health_factor: U256,
}

impl Position {
    pub fn is_empty(&self) -> bool {
        self.collateral_amount.is_zero() && self.debt_amount.is_zero()
    }
}

/// Sizing a flashloan entry would use right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnterPreview {
    pub flashloan_amount: U256,
    pub flashloan_premium: U256,
    /// Oracle-implied collateral from the flashloan, less default slippage
    pub min_collateral_out: U256,
}

// ============================================
// SWAPPER
// ============================================

#[derive(Debug, Clone)]
pub struct LeverageSwapper {
    address: Address,
    collateral: Address,
    vault: Address,
    /// Enabled borrow assets and the route template used by the iterative variants
    routes: BTreeMap<Address, SwapInfo>,
    config: EngineConfig,
}

impl LeverageSwapper {
    pub fn new(address: Address, collateral: Address, vault: Address, config: EngineConfig) -> Self {
        Self {
            address,
            collateral,
            vault,
            routes: BTreeMap::new(),
            config,
        }
    }

    /// Enables `asset` for borrowing/repaying with `route` as its default template
    pub fn with_borrow_asset(mut self, asset: Address, route: SwapInfo) -> Result<Self> {
        route.validate()?;
        self.routes.insert(asset, route);
        Ok(self)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn collateral(&self) -> Address {
        self.collateral
    }

    pub fn vault(&self) -> Address {
        self.vault
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn borrow_assets(&self) -> Vec<Address> {
        self.routes.keys().copied().collect()
    }

    pub fn default_route(&self, asset: Address) -> Result<&SwapInfo> {
        self.ensure_borrow_asset(asset)?;
        self.routes
            .get(&asset)
            .ok_or(LeverageError::UnsupportedAsset(asset))
    }

    fn ensure_live(&self) -> Result<()> {
        if self.config.emergency_stop {
            warn!("swapper {} rejected a call: emergency stop", self.address);
            return Err(LeverageError::InvalidParameter("emergency stop is active".to_string()));
        }
        Ok(())
    }

    fn ensure_borrow_asset(&self, asset: Address) -> Result<()> {
        if !self.routes.contains_key(&asset) {
            return Err(LeverageError::UnsupportedAsset(asset));
        }
        Ok(())
    }

    fn ensure_slippage(&self, slippage_bps: u64) -> Result<()> {
        if slippage_bps > self.config.max_slippage_bps {
            return Err(LeverageError::InvalidParameter(format!(
                "slippage {} bps above limit {}",
                slippage_bps, self.config.max_slippage_bps
            )));
        }
        Ok(())
    }

    fn ensure_iterations(&self, iterations: u32) -> Result<()> {
        if iterations == 0 {
            return Err(LeverageError::ZeroAmount("iterations"));
        }
        if iterations > self.config.max_iterations {
            return Err(LeverageError::InvalidParameter(format!(
                "{} iterations above limit {}",
                iterations, self.config.max_iterations
            )));
        }
        Ok(())
    }

    /// Vault-internal asset and the receipt token the ledger mints for it
    fn collateral_reserve(&self, ext: &Externals<'_>) -> Result<(Address, Address)> {
        let internal = ext
            .vaults
            .vault(self.vault)
            .ok_or_else(|| LeverageError::External(format!("vault {} is not deployed", self.vault)))?
            .internal_asset();
        let receipt = ext
            .ledger
            .reserve_data(internal)
            .ok_or_else(|| LeverageError::External(format!("ledger has no reserve for {}", internal)))?
            .receipt_token;
        Ok((internal, receipt))
    }

    /// Fails with 112 / 123 unless `receipt_token` is this collateral's receipt
    fn ensure_receipt_token(&self, ext: &Externals<'_>, receipt_token: Address) -> Result<Address> {
        if receipt_token == Address::ZERO {
            return Err(LeverageError::ZeroReceiptToken);
        }
        let (_, expected) = self.collateral_reserve(ext)?;
        if receipt_token != expected {
            return Err(LeverageError::ReceiptTokenMismatch(receipt_token));
        }
        Ok(expected)
    }

    fn quote(tokens: &dyn TokenBank, oracle: &dyn PriceOracle, asset: Address) -> Result<AssetQuote> {
        AssetQuote::new(oracle.asset_price(asset)?, tokens.decimals(asset)?)
    }

    /// Flashloan size and expected collateral for a flashloan entry
    pub fn preview_enter(
        &self,
        ext: &Externals<'_>,
        principal: U256,
        leverage_bps: u64,
        borrow_asset: Address,
    ) -> Result<EnterPreview> {
        self.ensure_borrow_asset(borrow_asset)?;
        let collateral_q = Self::quote(&*ext.tokens, &*ext.oracle, self.collateral)?;
        let borrow_q = Self::quote(&*ext.tokens, &*ext.oracle, borrow_asset)?;

        let flashloan_amount =
            self.config
                .sizing_policy()
                .flashloan_amount(principal, leverage_bps, collateral_q, borrow_q)?;
        Ok(EnterPreview {
            flashloan_amount,
            flashloan_premium: ext.lender.premium(flashloan_amount),
            min_collateral_out: crate::sizing::min_amount_out(
                flashloan_amount,
                borrow_q,
                collateral_q,
                self.config.default_slippage_bps,
            )?,
        })
    }

    /// Current position of `user` against `debt_asset`
    pub fn position(&self, ext: &Externals<'_>, user: Address, debt_asset: Address) -> Result<Position> {
        let (_, receipt) = self.collateral_reserve(ext)?;
        let account = ext.ledger.user_account_data(&*ext.tokens, &*ext.oracle, user)?;

        let equity = account.total_collateral_base.saturating_sub(account.total_debt_base);
        let leverage_bps = if account.total_debt_base.is_zero() {
            U256::ZERO
        } else if equity.is_zero() {
            U256::MAX
        } else {
            mul_div(account.total_debt_base, U256::from(PERCENTAGE_FACTOR), equity)?
        };

        Ok(Position {
            user,
            collateral: self.collateral,
            debt_asset,
            collateral_amount: ext.tokens.balance_of(receipt, user),
            debt_amount: ext.ledger.debt_of(debt_asset, user),
            collateral_value: account.total_collateral_base,
            debt_value: account.total_debt_base,
            leverage_bps,
            health_factor: account.health_factor,
        })
    }

    /// Assets this swapper may be left holding after a call through `route`
    fn touched_assets(&self, pools: &dyn PoolDirectory, borrow_asset: Address, route: &SwapInfo) -> Vec<Address> {
        let mut assets = vec![self.collateral, borrow_asset];
        assets.extend(route.assets());
        if let Some(pool) = pools.pool_for_share(self.collateral).and_then(|a| pools.pool(a)) {
            assets.extend(pool.coins().iter().copied());
        }
        assets.sort();
        assets.dedup();
        assets
    }

    /// Sends every leftover balance in `assets` to `user`; the swapper must end holding none of them
    fn sweep(&self, tokens: &mut dyn TokenBank, user: Address, assets: &[Address]) -> Result<Vec<(Address, U256)>> {
        let mut swept = Vec::new();
        for asset in assets {
            let held = tokens.balance_of(*asset, self.address);
            if held.is_zero() {
                continue;
            }
            tokens.transfer(*asset, self.address, user, held)?;
            swept.push((*asset, held));
        }

        if let Some(asset) = assets.iter().find(|a| !tokens.balance_of(**a, self.address).is_zero()) {
            warn!("swapper {} still holds {} after the sweep", self.address, asset);
            return Err(LeverageError::External(format!(
                "swapper {} still holds {} of {}",
                self.address,
                tokens.balance_of(*asset, self.address),
                asset
            )));
        }
        Ok(swept)
    }

    /// Health factor of `user`; fails below 1, exactly 1 is solvent
    fn ensure_solvent(
        &self,
        ledger: &dyn LendingLedger,
        tokens: &dyn TokenBank,
        oracle: &dyn PriceOracle,
        user: Address,
    ) -> Result<U256> {
        let account = ledger.user_account_data(tokens, oracle, user)?;
        if account.health_factor < WAD {
            warn!("position of {} would be insolvent: hf {}", user, account.health_factor);
            return Err(LeverageError::SolvencyViolation {
                user,
                health_factor: account.health_factor,
            });
        }
        Ok(account.health_factor)
    }

    /// Appends `report` to the position log when enabled
    fn record(&self, report: &ExecutionReport, debt_after: U256) {
        if !self.config.position_log {
            return;
        }
        let entry = PositionLog {
            timestamp: Utc::now(),
            operation: report.operation.to_string(),
            user: format!("{:?}", report.user),
            collateral: crate::tokens::label(&report.collateral),
            borrow_asset: crate::tokens::label(&report.borrow_asset),
            flashloan_amount: report.flashloan_amount,
            collateral_deposited: report.collateral_deposited,
            collateral_returned: report.collateral_returned,
            debt_after,
            health_factor: report.health_factor,
        };
        if let Err(e) = entry.append_to_file(&self.config.position_log_path) {
            warn!("failed to write position log: {}", e);
        }
    }
}
