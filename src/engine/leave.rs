//! Position exit
//!
//! Flashloan variant: borrow the debt asset, repay the caller's ledger
//! debt, pull the caller's receipt tokens, withdraw enough collateral to
//! cover the flashloan plus whatever the caller asked for, sell the part
//! owed back through the reverse paths, settle, return the rest.
//!
//! Iterative variant: withdraw what the position can spare, sell it,
//! repay, repeat.

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use super::enter::swept_amount;
use super::{
    ExecutionReport, FlowDirection, FlowState, FlowTrail, IterativeLeaveParams, LeaveParams, LeverageSwapper,
    Operation, WithdrawParams,
};
use crate::access::AccessGate;
use crate::errors::{LeverageError, Result};
use crate::externals::{
    Externals, FlashLoanReceiver, LendingLedger, PoolDirectory, PriceOracle, TokenBank, VaultDirectory,
};
use crate::routing::{unwind_collateral, SwapInfo, SwapPathExecutor};
use crate::sizing::{collateral_for_debt, max_withdrawable, min_amount_out};

/// Flashloan continuation for an exit
struct LeaveFlow<'a> {
    swapper: &'a LeverageSwapper,
    ledger: &'a mut dyn LendingLedger,
    oracle: &'a dyn PriceOracle,
    vaults: &'a mut dyn VaultDirectory,
    pools: &'a mut dyn PoolDirectory,
    lender: Address,
    user: Address,
    repay_asset: Address,
    flashloan_amount: U256,
    withdraw_amount: U256,
    slippage_bps: u64,
    receipt_token: Address,
    swap_info: &'a SwapInfo,
    trail: FlowTrail,
    report: ExecutionReport,
}

impl FlashLoanReceiver for LeaveFlow<'_> {
    fn address(&self) -> Address {
        self.swapper.address
    }

    fn on_flash_loan(
        &mut self,
        tokens: &mut dyn TokenBank,
        lender: Address,
        asset: Address,
        amount: U256,
        premium: U256,
    ) -> Result<()> {
        if lender != self.lender || asset != self.repay_asset || amount != self.flashloan_amount {
            return Err(LeverageError::UnexpectedFlashLoan(format!(
                "{} of {} from {}",
                amount, asset, lender
            )));
        }
        self.trail.advance(FlowState::Borrowed)?;

        let swapper = self.swapper.address;
        let collateral = self.swapper.collateral;

        let repaid = self.ledger.repay(tokens, asset, amount, swapper, self.user)?;
        self.trail.advance(FlowState::DebtRepaid)?;

        // Collateral to sell so the flashloan can be settled
        let owed = amount + premium;
        let borrow_q = LeverageSwapper::quote(&*tokens, self.oracle, asset)?;
        let collateral_q = LeverageSwapper::quote(&*tokens, self.oracle, collateral)?;
        let needed = collateral_for_debt(owed, borrow_q, collateral_q, self.slippage_bps)?;

        let vault = self
            .vaults
            .vault_mut(self.swapper.vault)
            .ok_or_else(|| LeverageError::External(format!("vault {} is not deployed", self.swapper.vault)))?;
        let internal_q = LeverageSwapper::quote(&*tokens, self.oracle, vault.internal_asset())?;

        let account = self.ledger.user_account_data(&*tokens, self.oracle, self.user)?;
        let balance = tokens.balance_of(self.receipt_token, self.user);
        let free = max_withdrawable(&account, U256::ZERO, internal_q, balance)?;
        let target = self.withdraw_amount.saturating_add(needed).min(free);
        if target < needed {
            return Err(LeverageError::SolvencyViolation {
                user: self.user,
                health_factor: account.health_factor,
            });
        }

        tokens.transfer_from(self.receipt_token, swapper, self.user, swapper, target)?;
        let withdrawn = vault.withdraw_collateral(
            tokens,
            &mut *self.ledger,
            self.oracle,
            swapper,
            target,
            self.slippage_bps,
            swapper,
        )?;
        self.trail.advance(FlowState::Withdrawn)?;

        let sell = needed.min(withdrawn);
        let paths = self.swap_info.active_reverse_paths();
        let mut exec = SwapPathExecutor::new(&mut *tokens, &mut *self.pools, swapper);
        let unwound = unwind_collateral(&mut exec, &paths, collateral, sell, asset)?;
        self.trail.advance(FlowState::Swapped)?;

        let held = tokens.balance_of(asset, swapper);
        if held < owed {
            return Err(LeverageError::InsufficientFunds {
                what: "flashloan repayment",
                asset,
                holder: swapper,
                needed: owed,
                available: held,
            });
        }
        debug!(
            "sold {} collateral for {} {}, owe {}",
            sell, unwound.amount_out, asset, owed
        );

        self.report.flashloan_premium = premium;
        self.report.debt_repaid = repaid;
        self.report.collateral_withdrawn = withdrawn;
        self.report.collateral_swapped = sell;
        Ok(())
    }
}

impl LeverageSwapper {
    /// Repays up to `repay_amount` of debt and withdraws `withdraw_amount`
    /// collateral on top of what is sold to cover the flashloan
    pub fn withdraw_with_flashloan(
        &self,
        ext: &mut Externals<'_>,
        gate: &AccessGate,
        user: Address,
        params: &WithdrawParams,
    ) -> Result<ExecutionReport> {
        self.withdraw_flow(ext, gate, user, params, Operation::WithdrawWithFlashloan)
    }

    /// Repays all debt and withdraws all collateral
    pub fn leave_position_with_flashloan(
        &self,
        ext: &mut Externals<'_>,
        gate: &AccessGate,
        user: Address,
        params: &LeaveParams,
    ) -> Result<ExecutionReport> {
        let full = WithdrawParams {
            repay_amount: U256::MAX,
            withdraw_amount: U256::MAX,
            slippage_bps: params.slippage_bps,
            repay_asset: params.repay_asset,
            receipt_token: params.receipt_token,
            referral_code: params.referral_code,
            swap_info: params.swap_info.clone(),
        };
        self.withdraw_flow(ext, gate, user, &full, Operation::LeaveWithFlashloan)
    }

    fn withdraw_flow(
        &self,
        ext: &mut Externals<'_>,
        gate: &AccessGate,
        user: Address,
        params: &WithdrawParams,
        operation: Operation,
    ) -> Result<ExecutionReport> {
        self.ensure_live()?;
        if params.receipt_token == Address::ZERO {
            return Err(LeverageError::ZeroReceiptToken);
        }
        if params.repay_amount.is_zero() {
            return Err(LeverageError::ZeroAmount("repay amount"));
        }
        if params.withdraw_amount.is_zero() {
            return Err(LeverageError::ZeroAmount("withdraw amount"));
        }
        self.ensure_borrow_asset(params.repay_asset)?;
        let receipt = self.ensure_receipt_token(ext, params.receipt_token)?;
        self.ensure_slippage(params.slippage_bps)?;
        params.swap_info.validate()?;
        if params.swap_info.active_reverse_paths().is_empty() {
            return Err(LeverageError::InvalidSwapPath("no active reverse path".to_string()));
        }
        gate.ensure_authorized(self.vault, self.address, user)?;

        let debt = ext.ledger.debt_of(params.repay_asset, user);
        if debt.is_zero() {
            return Err(LeverageError::ZeroAmount("outstanding debt"));
        }
        let flashloan_amount = params.repay_amount.min(debt);
        info!(
            "{} {}: repay {} of {} debt, slippage {} bps",
            operation, user, flashloan_amount, debt, params.slippage_bps
        );

        let Externals {
            tokens,
            ledger,
            oracle,
            vaults,
            pools,
            lender,
        } = ext;

        let mut report = ExecutionReport::new(operation, user, self.collateral, params.repay_asset);
        report.flashloan_amount = flashloan_amount;

        let mut flow = LeaveFlow {
            swapper: self,
            ledger: &mut **ledger,
            oracle: *oracle,
            vaults: &mut **vaults,
            pools: &mut **pools,
            lender: lender.address(),
            user,
            repay_asset: params.repay_asset,
            flashloan_amount,
            withdraw_amount: params.withdraw_amount,
            slippage_bps: params.slippage_bps,
            receipt_token: receipt,
            swap_info: &params.swap_info,
            trail: FlowTrail::new(FlowDirection::Exit),
            report,
        };
        lender.flash_loan(&mut **tokens, &mut flow, params.repay_asset, flashloan_amount)?;

        let LeaveFlow {
            mut trail, mut report, ..
        } = flow;
        trail.advance(FlowState::Repaid)?;

        let mut touched = self.touched_assets(&**pools, params.repay_asset, &params.swap_info);
        touched.push(receipt);
        report.swept = self.sweep(&mut **tokens, user, &touched)?;
        report.collateral_returned = swept_amount(&report.swept, self.collateral);
        report.health_factor = self.ensure_solvent(&**ledger, &**tokens, *oracle, user)?;
        trail.advance(FlowState::Idle)?;
        report.trail = trail.states().to_vec();

        info!(
            "{} {}: repaid {}, returned {} collateral, hf {}",
            operation, user, report.debt_repaid, report.collateral_returned, report.health_factor
        );
        self.record(&report, ledger.debt_of(params.repay_asset, user));
        Ok(report)
    }

    /// Unwinds a position by repeated withdraw, sell and repay, then
    /// returns up to `withdraw_amount` of the freed collateral
    pub fn leave_position(
        &self,
        ext: &mut Externals<'_>,
        gate: &AccessGate,
        user: Address,
        params: &IterativeLeaveParams,
    ) -> Result<ExecutionReport> {
        self.ensure_live()?;
        if params.receipt_token == Address::ZERO {
            return Err(LeverageError::ZeroReceiptToken);
        }
        if params.withdraw_amount.is_zero() {
            return Err(LeverageError::ZeroAmount("withdraw amount"));
        }
        self.ensure_iterations(params.iterations)?;
        self.ensure_borrow_asset(params.repay_asset)?;
        let receipt = self.ensure_receipt_token(ext, params.receipt_token)?;
        self.ensure_slippage(params.slippage_bps)?;
        let route = self.default_route(params.repay_asset)?.without_minimums();
        if route.active_reverse_paths().is_empty() {
            return Err(LeverageError::InvalidSwapPath("no active reverse path".to_string()));
        }
        gate.ensure_authorized(self.vault, self.address, user)?;

        let (internal, _) = self.collateral_reserve(ext)?;
        let collateral_q = Self::quote(&*ext.tokens, ext.oracle, self.collateral)?;
        let internal_q = Self::quote(&*ext.tokens, ext.oracle, internal)?;
        let borrow_q = Self::quote(&*ext.tokens, ext.oracle, params.repay_asset)?;

        let Externals {
            tokens,
            ledger,
            oracle,
            vaults,
            pools,
            ..
        } = ext;
        let vault = vaults
            .vault_mut(self.vault)
            .ok_or_else(|| LeverageError::External(format!("vault {} is not deployed", self.vault)))?;

        let mut report = ExecutionReport::new(Operation::LeaveIterative, user, self.collateral, params.repay_asset);
        let paths = route.active_reverse_paths();

        for round in 0..params.iterations {
            let debt = ledger.debt_of(params.repay_asset, user);
            if debt.is_zero() {
                break;
            }

            let account = ledger.user_account_data(&**tokens, *oracle, user)?;
            let balance = tokens.balance_of(receipt, user);
            let free = max_withdrawable(&account, U256::ZERO, internal_q, balance)?;
            let take = free.min(collateral_for_debt(debt, borrow_q, collateral_q, params.slippage_bps)?);
            if take.is_zero() {
                return Err(LeverageError::SolvencyViolation {
                    user,
                    health_factor: account.health_factor,
                });
            }

            tokens.transfer_from(receipt, self.address, user, self.address, take)?;
            let withdrawn = vault.withdraw_collateral(
                &mut **tokens,
                &mut **ledger,
                *oracle,
                self.address,
                take,
                params.slippage_bps,
                self.address,
            )?;

            let mut exec = SwapPathExecutor::new(&mut **tokens, &mut **pools, self.address);
            let unwound = unwind_collateral(&mut exec, &paths, self.collateral, withdrawn, params.repay_asset)?;

            let floor = min_amount_out(withdrawn, collateral_q, borrow_q, params.slippage_bps)?;
            if unwound.amount_out < floor {
                let pool = unwound
                    .paths
                    .last()
                    .and_then(|p| p.hops.last())
                    .map(|h| h.pool)
                    .or(unwound.joined_pool)
                    .unwrap_or_default();
                return Err(LeverageError::SlippageExceeded {
                    pool,
                    minimum: floor,
                    realized: unwound.amount_out,
                });
            }

            let repaid = ledger.repay(
                &mut **tokens,
                params.repay_asset,
                unwound.amount_out.min(debt),
                self.address,
                user,
            )?;
            debug!("round {}: sold {} collateral, repaid {}", round, withdrawn, repaid);

            report.collateral_withdrawn += withdrawn;
            report.collateral_swapped += withdrawn;
            report.debt_repaid += repaid;
            report.rounds += 1;
        }

        // Hand back what the caller asked for, within what the position can spare
        let account = ledger.user_account_data(&**tokens, *oracle, user)?;
        let balance = tokens.balance_of(receipt, user);
        let free = max_withdrawable(&account, U256::ZERO, internal_q, balance)?;
        let returned = params.withdraw_amount.min(free);
        if !returned.is_zero() {
            tokens.transfer_from(receipt, self.address, user, self.address, returned)?;
            report.collateral_withdrawn += vault.withdraw_collateral(
                &mut **tokens,
                &mut **ledger,
                *oracle,
                self.address,
                returned,
                params.slippage_bps,
                self.address,
            )?;
        }

        let mut touched = self.touched_assets(&**pools, params.repay_asset, &route);
        touched.push(receipt);
        report.swept = self.sweep(&mut **tokens, user, &touched)?;
        report.collateral_returned = swept_amount(&report.swept, self.collateral);
        report.health_factor = self.ensure_solvent(&**ledger, &**tokens, *oracle, user)?;

        info!(
            "left {} in {} rounds: repaid {}, returned {} collateral, hf {}",
            user, report.rounds, report.debt_repaid, report.collateral_returned, report.health_factor
        );
        self.record(&report, ledger.debt_of(params.repay_asset, user));
        Ok(report)
    }
}
