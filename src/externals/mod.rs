//! External Collaborators
//!
//! Seams for every system the engine calls but does not own:
//! - Token balances and allowances (`TokenBank`)
//! - The base lending ledger (`LendingLedger`)
//! - The price oracle (`PriceOracle`)
//! - Collateral vaults (`CollateralVault` via `VaultDirectory`)
//! - Liquidity pools routed through by swap hops (`LiquidityPool` via `PoolDirectory`)
//! - The flashloan liquidity source (`FlashLender` + `FlashLoanReceiver`)
//!
//! All calls are synchronous. The enclosing transaction, not the engine,
//! owns rollback: an `Err` from any call must abort the whole call.

mod pool;

pub use pool::{CurveOperation, LiquidityPool, PoolCall, PoolDirectory, PoolFamily, WeightedOperation};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::errors::Result;

// ============================================
// TOKENS
// ============================================

/// Fungible token balances for every asset in the world
pub trait TokenBank {
    fn balance_of(&self, asset: Address, holder: Address) -> U256;

    fn decimals(&self, asset: Address) -> Result<u8>;

    fn transfer(&mut self, asset: Address, from: Address, to: Address, amount: U256) -> Result<()>;

    fn approve(&mut self, asset: Address, owner: Address, spender: Address, amount: U256);

    fn allowance(&self, asset: Address, owner: Address, spender: Address) -> U256;

    /// Moves `amount` from `from` to `to`, spending `spender`'s allowance
    fn transfer_from(
        &mut self,
        asset: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()>;

    /// Issuer-side: ledgers, vaults and pools mint their own share/receipt tokens
    fn mint(&mut self, asset: Address, to: Address, amount: U256) -> Result<()>;

    /// Issuer-side counterpart of `mint`
    fn burn(&mut self, asset: Address, from: Address, amount: U256) -> Result<()>;
}

// ============================================
// PRICE ORACLE
// ============================================

/// Asset prices in base currency, 8 decimals
pub trait PriceOracle {
    fn asset_price(&self, asset: Address) -> Result<U256>;
}

// ============================================
// BASE LENDING LEDGER
// ============================================

/// Aggregated account state, all values in base currency (8 decimals)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountData {
    pub total_collateral_base: U256,
    pub total_debt_base: U256,
    pub available_borrows_base: U256,
    /// Weighted liquidation threshold, bps
    pub current_liquidation_threshold: U256,
    /// Weighted loan-to-value, bps
    pub ltv: U256,
    /// WAD; `U256::MAX` when there is no debt
    pub health_factor: U256,
}

/// Reserve configuration as the ledger exposes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveData {
    pub asset: Address,
    /// Collateral receipt token minted on deposit
    pub receipt_token: Address,
    pub decimals: u8,
    pub ltv_bps: u64,
    pub liquidation_threshold_bps: u64,
    pub borrowing_enabled: bool,
}

pub trait LendingLedger {
    /// Pulls `amount` of `asset` from `from` and credits receipt tokens to `on_behalf_of`
    fn deposit(
        &mut self,
        tokens: &mut dyn TokenBank,
        asset: Address,
        amount: U256,
        from: Address,
        on_behalf_of: Address,
        referral_code: u16,
    ) -> Result<()>;

    /// Burns `owner`'s receipt tokens and sends the underlying to `to`.
    /// Fails with a solvency violation if `owner`'s health factor drops below 1.
    fn withdraw(
        &mut self,
        tokens: &mut dyn TokenBank,
        oracle: &dyn PriceOracle,
        asset: Address,
        amount: U256,
        owner: Address,
        to: Address,
    ) -> Result<U256>;

    /// Opens debt for `on_behalf_of` and sends the asset to `receiver`.
    /// A receiver other than the debtor needs a credit-delegation allowance.
    fn borrow(
        &mut self,
        tokens: &mut dyn TokenBank,
        oracle: &dyn PriceOracle,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
        receiver: Address,
        referral_code: u16,
    ) -> Result<()>;

    /// Repays up to `amount` of `on_behalf_of`'s debt from `payer`.
    /// Returns the amount actually repaid, capped at the outstanding debt.
    fn repay(
        &mut self,
        tokens: &mut dyn TokenBank,
        asset: Address,
        amount: U256,
        payer: Address,
        on_behalf_of: Address,
    ) -> Result<U256>;

    fn approve_delegation(&mut self, asset: Address, delegator: Address, delegatee: Address, amount: U256);

    fn borrow_allowance(&self, asset: Address, delegator: Address, delegatee: Address) -> U256;

    fn debt_of(&self, asset: Address, user: Address) -> U256;

    fn user_account_data(
        &self,
        tokens: &dyn TokenBank,
        oracle: &dyn PriceOracle,
        user: Address,
    ) -> Result<AccountData>;

    fn reserve_data(&self, asset: Address) -> Option<ReserveData>;
}

// ============================================
// COLLATERAL VAULT
// ============================================

/// Custody layer in front of the ledger for one collateral asset
pub trait CollateralVault {
    fn address(&self) -> Address;

    fn collateral_asset(&self) -> Address;

    /// Asset the vault actually deposits into the ledger
    fn internal_asset(&self) -> Address;

    /// Pulls `amount` collateral from `from` and deposits the internal asset
    /// into the ledger on behalf of `on_behalf_of`
    fn deposit_collateral(
        &mut self,
        tokens: &mut dyn TokenBank,
        ledger: &mut dyn LendingLedger,
        from: Address,
        amount: U256,
        on_behalf_of: Address,
    ) -> Result<()>;

    /// Burns `amount` receipt tokens held by `owner` and sends collateral to `to`.
    /// Returns the collateral actually delivered.
    fn withdraw_collateral(
        &mut self,
        tokens: &mut dyn TokenBank,
        ledger: &mut dyn LendingLedger,
        oracle: &dyn PriceOracle,
        owner: Address,
        amount: U256,
        slippage_bps: u64,
        to: Address,
    ) -> Result<U256>;
}

pub trait VaultDirectory {
    fn vault(&self, address: Address) -> Option<&dyn CollateralVault>;

    fn vault_mut(&mut self, address: Address) -> Option<&mut dyn CollateralVault>;
}

// ============================================
// FLASHLOAN LIQUIDITY SOURCE
// ============================================

/// Continuation the lender resumes while the loan is outstanding
pub trait FlashLoanReceiver {
    fn address(&self) -> Address;

    /// Called with `amount` already credited to `address()`.
    /// `amount + premium` must be held by `address()` when this returns.
    fn on_flash_loan(
        &mut self,
        tokens: &mut dyn TokenBank,
        lender: Address,
        asset: Address,
        amount: U256,
        premium: U256,
    ) -> Result<()>;
}

pub trait FlashLender {
    fn address(&self) -> Address;

    fn premium(&self, amount: U256) -> U256;

    /// Lends `amount`, runs the receiver synchronously, then collects principal + premium
    fn flash_loan(
        &mut self,
        tokens: &mut dyn TokenBank,
        receiver: &mut dyn FlashLoanReceiver,
        asset: Address,
        amount: U256,
    ) -> Result<()>;
}

// ============================================
// BUNDLE
// ============================================

/// Handles to every external system one leverage call touches
pub struct Externals<'a> {
    pub tokens: &'a mut dyn TokenBank,
    pub ledger: &'a mut dyn LendingLedger,
    pub oracle: &'a dyn PriceOracle,
    pub vaults: &'a mut dyn VaultDirectory,
    pub pools: &'a mut dyn PoolDirectory,
    pub lender: &'a mut dyn FlashLender,
}
