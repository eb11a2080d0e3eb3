//! In-memory lending ledger
//!
//! Aave-style accounting without interest: deposits mint receipt tokens 1:1,
//! debt is tracked per (asset, user), account data is valued through the
//! oracle. Liquidity lent out is whatever the ledger address holds.

use alloy_primitives::{Address, U256};
use std::collections::BTreeMap;
use tracing::debug;

use crate::errors::{LeverageError, Result};
use crate::externals::{AccountData, LendingLedger, PriceOracle, ReserveData, TokenBank};
use crate::sizing::{health_factor, mul_div, AssetQuote, PERCENTAGE_FACTOR, WAD};

#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    address: Address,
    reserves: BTreeMap<Address, ReserveData>,
    debts: BTreeMap<(Address, Address), U256>,
    delegations: BTreeMap<(Address, Address, Address), U256>,
}

impl InMemoryLedger {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            reserves: BTreeMap::new(),
            debts: BTreeMap::new(),
            delegations: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn init_reserve(&mut self, reserve: ReserveData) {
        self.reserves.insert(reserve.asset, reserve);
    }

    fn reserve(&self, asset: Address) -> Result<&ReserveData> {
        self.reserves
            .get(&asset)
            .ok_or_else(|| LeverageError::External(format!("ledger has no reserve for {}", asset)))
    }

    fn ensure_healthy(&self, tokens: &dyn TokenBank, oracle: &dyn PriceOracle, user: Address) -> Result<AccountData> {
        let account = self.user_account_data(tokens, oracle, user)?;
        if account.health_factor < WAD {
            return Err(LeverageError::SolvencyViolation {
                user,
                health_factor: account.health_factor,
            });
        }
        Ok(account)
    }
}

impl LendingLedger for InMemoryLedger {
    fn deposit(
        &mut self,
        tokens: &mut dyn TokenBank,
        asset: Address,
        amount: U256,
        from: Address,
        on_behalf_of: Address,
        referral_code: u16,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(LeverageError::ZeroAmount("ledger deposit"));
        }
        let receipt = self.reserve(asset)?.receipt_token;
        tokens.transfer(asset, from, self.address, amount)?;
        tokens.mint(receipt, on_behalf_of, amount)?;
        debug!("ledger deposit {} of {} for {} (ref {})", amount, asset, on_behalf_of, referral_code);
        Ok(())
    }

    fn withdraw(
        &mut self,
        tokens: &mut dyn TokenBank,
        oracle: &dyn PriceOracle,
        asset: Address,
        amount: U256,
        owner: Address,
        to: Address,
    ) -> Result<U256> {
        let receipt = self.reserve(asset)?.receipt_token;
        let balance = tokens.balance_of(receipt, owner);
        let amount = if amount == U256::MAX { balance } else { amount };
        if amount.is_zero() {
            return Err(LeverageError::ZeroAmount("ledger withdraw"));
        }

        tokens.burn(receipt, owner, amount)?;
        tokens.transfer(asset, self.address, to, amount)?;
        self.ensure_healthy(&*tokens, oracle, owner)?;

        debug!("ledger withdraw {} of {} from {} to {}", amount, asset, owner, to);
        Ok(amount)
    }

    fn borrow(
        &mut self,
        tokens: &mut dyn TokenBank,
        oracle: &dyn PriceOracle,
        asset: Address,
        amount: U256,
        on_behalf_of: Address,
        receiver: Address,
        referral_code: u16,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(LeverageError::ZeroAmount("ledger borrow"));
        }
        if !self.reserve(asset)?.borrowing_enabled {
            return Err(LeverageError::UnsupportedAsset(asset));
        }

        if receiver != on_behalf_of {
            let key = (asset, on_behalf_of, receiver);
            let allowed = self.delegations.get(&key).copied().unwrap_or_default();
            if allowed < amount {
                return Err(LeverageError::InsufficientFunds {
                    what: "borrow allowance",
                    asset,
                    holder: on_behalf_of,
                    needed: amount,
                    available: allowed,
                });
            }
            if allowed != U256::MAX {
                self.delegations.insert(key, allowed - amount);
            }
        }

        *self.debts.entry((asset, on_behalf_of)).or_insert(U256::ZERO) += amount;
        tokens.transfer(asset, self.address, receiver, amount)?;

        let account = self.ensure_healthy(&*tokens, oracle, on_behalf_of)?;
        let borrowable = mul_div(account.total_collateral_base, account.ltv, U256::from(PERCENTAGE_FACTOR))?;
        if account.total_debt_base > borrowable {
            return Err(LeverageError::SolvencyViolation {
                user: on_behalf_of,
                health_factor: account.health_factor,
            });
        }

        debug!("ledger borrow {} of {} for {} (ref {})", amount, asset, on_behalf_of, referral_code);
        Ok(())
    }

    fn repay(
        &mut self,
        tokens: &mut dyn TokenBank,
        asset: Address,
        amount: U256,
        payer: Address,
        on_behalf_of: Address,
    ) -> Result<U256> {
        let debt = self.debt_of(asset, on_behalf_of);
        if debt.is_zero() {
            return Err(LeverageError::External(format!("{} has no {} debt to repay", on_behalf_of, asset)));
        }
        let paid = amount.min(debt);
        if paid.is_zero() {
            return Err(LeverageError::ZeroAmount("ledger repay"));
        }

        tokens.transfer(asset, payer, self.address, paid)?;
        self.debts.insert((asset, on_behalf_of), debt - paid);

        debug!("ledger repay {} of {} for {}", paid, asset, on_behalf_of);
        Ok(paid)
    }

    fn approve_delegation(&mut self, asset: Address, delegator: Address, delegatee: Address, amount: U256) {
        self.delegations.insert((asset, delegator, delegatee), amount);
    }

    fn borrow_allowance(&self, asset: Address, delegator: Address, delegatee: Address) -> U256 {
        self.delegations
            .get(&(asset, delegator, delegatee))
            .copied()
            .unwrap_or_default()
    }

    fn debt_of(&self, asset: Address, user: Address) -> U256 {
        self.debts.get(&(asset, user)).copied().unwrap_or_default()
    }

    fn user_account_data(&self, tokens: &dyn TokenBank, oracle: &dyn PriceOracle, user: Address) -> Result<AccountData> {
        let mut collateral = U256::ZERO;
        let mut debt = U256::ZERO;
        let mut weighted_lt = U256::ZERO;
        let mut weighted_ltv = U256::ZERO;

        for reserve in self.reserves.values() {
            let supplied = tokens.balance_of(reserve.receipt_token, user);
            let owed = self.debt_of(reserve.asset, user);
            if supplied.is_zero() && owed.is_zero() {
                continue;
            }

            let quote = AssetQuote::new(oracle.asset_price(reserve.asset)?, reserve.decimals)?;
            if !supplied.is_zero() && reserve.liquidation_threshold_bps > 0 {
                let value = quote.value_of(supplied)?;
                collateral += value;
                weighted_lt += value * U256::from(reserve.liquidation_threshold_bps);
                weighted_ltv += value * U256::from(reserve.ltv_bps);
            }
            if !owed.is_zero() {
                // Debt rounds up against the borrower
                let value = quote.value_of(owed)?;
                debt += if quote.amount_for(value)? < owed { value + U256::from(1u64) } else { value };
            }
        }

        let (lt, ltv) = if collateral.is_zero() {
            (U256::ZERO, U256::ZERO)
        } else {
            (weighted_lt / collateral, weighted_ltv / collateral)
        };
        let max_borrow = mul_div(collateral, ltv, U256::from(PERCENTAGE_FACTOR))?;

        Ok(AccountData {
            total_collateral_base: collateral,
            total_debt_base: debt,
            available_borrows_base: max_borrow.saturating_sub(debt),
            current_liquidation_threshold: lt,
            ltv,
            health_factor: health_factor(collateral, debt, lt)?,
        })
    }

    fn reserve_data(&self, asset: Address) -> Option<ReserveData> {
        self.reserves.get(&asset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{InMemoryBank, StaticOracle};
    use alloy_primitives::address;

    const LEDGER: Address = address!("00000000000000000000000000000000000001ed");
    const USDC: Address = address!("00000000000000000000000000000000000000c1");
    const S_USDC: Address = address!("00000000000000000000000000000000000000d1");
    const LP: Address = address!("00000000000000000000000000000000000000c3");
    const S_LP: Address = address!("00000000000000000000000000000000000000d3");
    const ALICE: Address = address!("00000000000000000000000000000000000000e1");
    const SWAPPER: Address = address!("00000000000000000000000000000000000000b1");

    fn setup() -> (InMemoryLedger, InMemoryBank, StaticOracle) {
        let mut bank = InMemoryBank::new();
        for (asset, decimals) in [(USDC, 6), (S_USDC, 6), (LP, 18), (S_LP, 18)] {
            bank.register(asset, decimals);
        }
        bank.mint(USDC, LEDGER, U256::from(1_000_000_000_000u64)).unwrap();
        bank.mint(LP, ALICE, U256::from(1_000u64) * WAD).unwrap();

        let mut oracle = StaticOracle::new();
        oracle.set_price(USDC, U256::from(100_000_000u64));
        oracle.set_price(LP, U256::from(100_000_000u64));

        let mut ledger = InMemoryLedger::new(LEDGER);
        ledger.init_reserve(ReserveData {
            asset: USDC,
            receipt_token: S_USDC,
            decimals: 6,
            ltv_bps: 0,
            liquidation_threshold_bps: 0,
            borrowing_enabled: true,
        });
        ledger.init_reserve(ReserveData {
            asset: LP,
            receipt_token: S_LP,
            decimals: 18,
            ltv_bps: 9_000,
            liquidation_threshold_bps: 9_300,
            borrowing_enabled: false,
        });
        (ledger, bank, oracle)
    }

    #[test]
    fn test_borrow_bounded_by_ltv() {
        let (mut ledger, mut bank, oracle) = setup();
        ledger
            .deposit(&mut bank, LP, U256::from(1_000u64) * WAD, ALICE, ALICE, 0)
            .unwrap();

        // $900 against $1000 at 90% ltv is the limit
        ledger
            .borrow(&mut bank, &oracle, USDC, U256::from(900_000_000u64), ALICE, ALICE, 0)
            .unwrap();
        let err = ledger
            .borrow(&mut bank, &oracle, USDC, U256::from(1u64), ALICE, ALICE, 0)
            .unwrap_err();
        assert_eq!(err.code(), "120");

        let account = ledger.user_account_data(&bank, &oracle, ALICE).unwrap();
        assert_eq!(account.current_liquidation_threshold, U256::from(9_300u64));
        assert!(account.health_factor > WAD);
    }

    #[test]
    fn test_delegated_borrow_needs_allowance() {
        let (mut ledger, mut bank, oracle) = setup();
        ledger
            .deposit(&mut bank, LP, U256::from(1_000u64) * WAD, ALICE, ALICE, 0)
            .unwrap();

        let err = ledger
            .borrow(&mut bank, &oracle, USDC, U256::from(10u64), ALICE, SWAPPER, 0)
            .unwrap_err();
        assert_eq!(err.code(), "121");

        ledger.approve_delegation(USDC, ALICE, SWAPPER, U256::from(10u64));
        ledger
            .borrow(&mut bank, &oracle, USDC, U256::from(10u64), ALICE, SWAPPER, 0)
            .unwrap();
        assert_eq!(bank.balance_of(USDC, SWAPPER), U256::from(10u64));
        assert_eq!(ledger.debt_of(USDC, ALICE), U256::from(10u64));
        assert_eq!(ledger.borrow_allowance(USDC, ALICE, SWAPPER), U256::ZERO);
    }

    #[test]
    fn test_repay_caps_at_debt() {
        let (mut ledger, mut bank, oracle) = setup();
        ledger
            .deposit(&mut bank, LP, U256::from(1_000u64) * WAD, ALICE, ALICE, 0)
            .unwrap();
        ledger
            .borrow(&mut bank, &oracle, USDC, U256::from(100u64), ALICE, ALICE, 0)
            .unwrap();
        bank.mint(USDC, ALICE, U256::from(1_000u64)).unwrap();

        let paid = ledger.repay(&mut bank, USDC, U256::from(500u64), ALICE, ALICE).unwrap();
        assert_eq!(paid, U256::from(100u64));
        assert_eq!(ledger.debt_of(USDC, ALICE), U256::ZERO);
    }

    #[test]
    fn test_withdraw_keeps_health() {
        let (mut ledger, mut bank, oracle) = setup();
        ledger
            .deposit(&mut bank, LP, U256::from(1_000u64) * WAD, ALICE, ALICE, 0)
            .unwrap();
        ledger
            .borrow(&mut bank, &oracle, USDC, U256::from(900_000_000u64), ALICE, ALICE, 0)
            .unwrap();

        let err = ledger
            .withdraw(&mut bank, &oracle, LP, U256::from(100u64) * WAD, ALICE, ALICE)
            .unwrap_err();
        assert_eq!(err.code(), "120");
    }

    #[test]
    fn test_health_factor_of_exactly_one_is_solvent() {
        let (mut ledger, mut bank, oracle) = setup();
        bank.mint(LP, ALICE, U256::from(100u64) * WAD).unwrap();
        ledger
            .deposit(&mut bank, LP, U256::from(1_100u64) * WAD, ALICE, ALICE, 0)
            .unwrap();
        ledger
            .borrow(&mut bank, &oracle, USDC, U256::from(930_000_000u64), ALICE, ALICE, 0)
            .unwrap();

        // $1000 at 93% threshold against $930 of debt
        ledger
            .withdraw(&mut bank, &oracle, LP, U256::from(100u64) * WAD, ALICE, ALICE)
            .unwrap();
        let account = ledger.user_account_data(&bank, &oracle, ALICE).unwrap();
        assert_eq!(account.health_factor, WAD);

        let err = ledger
            .withdraw(&mut bank, &oracle, LP, U256::from(1u64), ALICE, ALICE)
            .unwrap_err();
        assert_eq!(err.code(), "120");
    }
}
