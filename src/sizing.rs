//! Position Sizing Calculator
//!
//! Turns oracle prices, a leverage target and ledger solvency data into the
//! amounts a leverage call moves:
//!
//! FLASHLOAN PRINCIPAL (entry):
//! principal * leverage / 10000 * collateral_price / borrow_price,
//! scaled up by the policy's safety multiplier and fee buffer.
//!
//! MAX WITHDRAWAL (exit):
//! largest W with (C - W) * LT / 10000 >= D - R, floored and clamped to
//! the position's receipt-token balance.
//!
//! Rounding always goes against the borrower: amounts the engine must cover
//! round up, amounts it may take out round down.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::errors::{LeverageError, Result};
use crate::externals::AccountData;

/// Basis-point denominator
pub const PERCENTAGE_FACTOR: u64 = 10_000;

/// 1e18 fixed point, used for health factors
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

fn bps() -> U256 {
    U256::from(PERCENTAGE_FACTOR)
}

fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// floor(a * b / c)
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256> {
    if c.is_zero() {
        return Err(LeverageError::External("division by zero in sizing".to_string()));
    }
    let product = a
        .checked_mul(b)
        .ok_or_else(|| LeverageError::InvalidParameter("amount overflows sizing math".to_string()))?;
    Ok(product / c)
}

/// ceil(a * b / c)
pub fn mul_div_up(a: U256, b: U256, c: U256) -> Result<U256> {
    let floor = mul_div(a, b, c)?;
    if (a * b) % c == U256::ZERO {
        Ok(floor)
    } else {
        Ok(floor + U256::from(1u64))
    }
}

// ============================================
// PRICED ASSET
// ============================================

/// Oracle price (8 decimals) and token decimals of one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetQuote {
    pub price: U256,
    pub decimals: u8,
}

impl AssetQuote {
    pub fn new(price: U256, decimals: u8) -> Result<Self> {
        if price.is_zero() {
            return Err(LeverageError::External("oracle returned a zero price".to_string()));
        }
        Ok(Self { price, decimals })
    }

    /// Base-currency value of `amount`, floored
    pub fn value_of(&self, amount: U256) -> Result<U256> {
        mul_div(amount, self.price, pow10(self.decimals))
    }

    /// Token amount worth `value`, floored
    pub fn amount_for(&self, value: U256) -> Result<U256> {
        mul_div(value, pow10(self.decimals), self.price)
    }
}

fn checked_product(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b)
        .ok_or_else(|| LeverageError::InvalidParameter("amount overflows sizing math".to_string()))
}

/// Numerator and denominator of a `from` -> `to` conversion
fn conversion_terms(amount: U256, from: AssetQuote, to: AssetQuote) -> Result<(U256, U256)> {
    let numerator = checked_product(checked_product(amount, from.price)?, pow10(to.decimals))?;
    let denominator = checked_product(to.price, pow10(from.decimals))?;
    Ok((numerator, denominator))
}

/// `amount` of `from` expressed in `to` units, floored
pub fn convert(amount: U256, from: AssetQuote, to: AssetQuote) -> Result<U256> {
    let (numerator, denominator) = conversion_terms(amount, from, to)?;
    mul_div(numerator, U256::from(1u64), denominator)
}

/// `amount` of `from` expressed in `to` units, rounded up
pub fn convert_up(amount: U256, from: AssetQuote, to: AssetQuote) -> Result<U256> {
    let (numerator, denominator) = conversion_terms(amount, from, to)?;
    mul_div_up(numerator, U256::from(1u64), denominator)
}

// ============================================
// POLICY
// ============================================

/// Tunable multipliers applied on top of the raw price math
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingPolicy {
    /// Multiplier on the raw flashloan principal, bps (10000 = 1x)
    pub safety_multiplier_bps: u64,
    /// Extra headroom for flashloan fee and swap loss, bps
    pub fee_buffer_bps: u64,
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            safety_multiplier_bps: PERCENTAGE_FACTOR,
            fee_buffer_bps: 0,
        }
    }
}

impl SizingPolicy {
    /// Borrow-asset amount to flash-borrow for `principal` collateral at `leverage_bps`
    pub fn flashloan_amount(
        &self,
        principal: U256,
        leverage_bps: u64,
        collateral: AssetQuote,
        borrow: AssetQuote,
    ) -> Result<U256> {
        let levered = mul_div(principal, U256::from(leverage_bps), bps())?;
        let raw = convert_up(levered, collateral, borrow)?;
        let safe = mul_div_up(raw, U256::from(self.safety_multiplier_bps), bps())?;
        mul_div_up(safe, U256::from(PERCENTAGE_FACTOR + self.fee_buffer_bps), bps())
    }
}

// ============================================
// SIZING HELPERS
// ============================================

/// Oracle-implied output of swapping `amount_in`, less `slippage_bps`, floored
pub fn min_amount_out(amount_in: U256, from: AssetQuote, to: AssetQuote, slippage_bps: u64) -> Result<U256> {
    let fair = convert(amount_in, from, to)?;
    mul_div(fair, U256::from(PERCENTAGE_FACTOR.saturating_sub(slippage_bps)), bps())
}

/// Collateral that must be sold to raise `debt` of the borrow asset
/// when each unit may realize `slippage_bps` less than the oracle price
pub fn collateral_for_debt(debt: U256, borrow: AssetQuote, collateral: AssetQuote, slippage_bps: u64) -> Result<U256> {
    if slippage_bps >= PERCENTAGE_FACTOR {
        return Err(LeverageError::InvalidParameter(format!(
            "slippage {} bps leaves nothing to sell",
            slippage_bps
        )));
    }
    let fair = convert_up(debt, borrow, collateral)?;
    mul_div_up(fair, bps(), U256::from(PERCENTAGE_FACTOR - slippage_bps))
}

/// Borrow-asset amount worth `ltv_bps` of `collateral_amount`, floored
pub fn borrow_for_collateral(
    collateral_amount: U256,
    ltv_bps: u64,
    collateral: AssetQuote,
    borrow: AssetQuote,
) -> Result<U256> {
    let backed = mul_div(collateral_amount, U256::from(ltv_bps), bps())?;
    convert(backed, collateral, borrow)
}

/// Largest collateral amount withdrawable while keeping
/// `(C - W) * LT / 10000 >= D - R`, clamped to `balance`
pub fn max_withdrawable(
    account: &AccountData,
    repaid_value: U256,
    collateral: AssetQuote,
    balance: U256,
) -> Result<U256> {
    let remaining_debt = account.total_debt_base.saturating_sub(repaid_value);
    if remaining_debt.is_zero() {
        return Ok(balance);
    }
    if account.current_liquidation_threshold.is_zero() {
        return Ok(U256::ZERO);
    }

    let required_collateral = mul_div_up(remaining_debt, bps(), account.current_liquidation_threshold)?;
    if account.total_collateral_base <= required_collateral {
        return Ok(U256::ZERO);
    }

    let free_value = account.total_collateral_base - required_collateral;
    Ok(collateral.amount_for(free_value)?.min(balance))
}

/// WAD health factor for the given totals; `U256::MAX` without debt
pub fn health_factor(total_collateral_base: U256, total_debt_base: U256, liquidation_threshold_bps: U256) -> Result<U256> {
    if total_debt_base.is_zero() {
        return Ok(U256::MAX);
    }
    let adjusted = mul_div(total_collateral_base, liquidation_threshold_bps, bps())?;
    mul_div(adjusted, WAD, total_debt_base)
}
