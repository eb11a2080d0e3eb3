//! Position entry
//!
//! Flashloan variant: borrow the leverage amount up front, swap it into
//! collateral, deposit it together with the caller's principal, then draw
//! ledger debt on the caller's behalf to settle the flashloan.
//!
//! Iterative variant: deposit, borrow against it, swap, deposit again,
//! for a bounded number of rounds.

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use super::{EnterParams, ExecutionReport, FlowDirection, FlowState, FlowTrail, IterativeEnterParams, LeverageSwapper, Operation};
use crate::access::AccessGate;
use crate::errors::{LeverageError, Result};
use crate::externals::{
    Externals, FlashLoanReceiver, LendingLedger, PoolDirectory, PriceOracle, TokenBank, VaultDirectory,
};
use crate::routing::{produce_collateral, SwapInfo, SwapPathExecutor};
use crate::sizing::{borrow_for_collateral, min_amount_out};

/// Flashloan continuation for an entry
struct EnterFlow<'a> {
    swapper: &'a LeverageSwapper,
    ledger: &'a mut dyn LendingLedger,
    oracle: &'a dyn PriceOracle,
    vaults: &'a mut dyn VaultDirectory,
    pools: &'a mut dyn PoolDirectory,
    lender: Address,
    user: Address,
    principal: U256,
    borrow_asset: Address,
    flashloan_amount: U256,
    referral_code: u16,
    swap_info: &'a SwapInfo,
    trail: FlowTrail,
    report: ExecutionReport,
}

impl FlashLoanReceiver for EnterFlow<'_> {
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
        if lender != self.lender || asset != self.borrow_asset || amount != self.flashloan_amount {
            return Err(LeverageError::UnexpectedFlashLoan(format!(
                "{} of {} from {}",
                amount, asset, lender
            )));
        }
        self.trail.advance(FlowState::Borrowed)?;

        let swapper = self.swapper.address;
        let collateral = self.swapper.collateral;

        let paths = self.swap_info.active_paths();
        let mut exec = SwapPathExecutor::new(&mut *tokens, &mut *self.pools, swapper);
        let swapped = produce_collateral(&mut exec, &paths, asset, amount, collateral)?;
        self.trail.advance(FlowState::Swapped)?;

        let deposit = self.principal + swapped.amount_out;
        let vault = self
            .vaults
            .vault_mut(self.swapper.vault)
            .ok_or_else(|| LeverageError::External(format!("vault {} is not deployed", self.swapper.vault)))?;
        vault.deposit_collateral(tokens, &mut *self.ledger, swapper, deposit, self.user)?;
        self.trail.advance(FlowState::Deposited)?;

        // Debt covers the flashloan and its premium exactly
        let owed = amount + premium;
        self.ledger
            .borrow(tokens, self.oracle, asset, owed, self.user, swapper, self.referral_code)?;
        debug!("borrowed {} {} for {} to settle the flashloan", owed, asset, self.user);

        self.report.flashloan_premium = premium;
        self.report.collateral_swapped = swapped.amount_out;
        self.report.collateral_deposited = deposit;
        self.report.debt_borrowed = owed;
        Ok(())
    }
}

impl LeverageSwapper {
    /// Opens or grows a leveraged position in one flashloan
    pub fn enter_position_with_flashloan(
        &self,
        ext: &mut Externals<'_>,
        gate: &AccessGate,
        user: Address,
        params: &EnterParams,
    ) -> Result<ExecutionReport> {
        self.ensure_live()?;
        if params.principal.is_zero() {
            return Err(LeverageError::ZeroAmount("principal"));
        }
        if params.leverage_bps == 0 {
            return Err(LeverageError::ZeroAmount("leverage"));
        }
        if params.leverage_bps > self.config.max_leverage_bps {
            return Err(LeverageError::InvalidParameter(format!(
                "leverage {} bps above limit {}",
                params.leverage_bps, self.config.max_leverage_bps
            )));
        }
        self.ensure_borrow_asset(params.borrow_asset)?;
        params.swap_info.validate()?;
        if params.swap_info.active_paths().is_empty() {
            return Err(LeverageError::InvalidSwapPath("no active forward path".to_string()));
        }
        gate.ensure_authorized(self.vault, self.address, user)?;

        let preview = self.preview_enter(ext, params.principal, params.leverage_bps, params.borrow_asset)?;
        info!(
            "enter {}: principal {}, leverage {} bps, flashloan {} {}",
            user, params.principal, params.leverage_bps, preview.flashloan_amount, params.borrow_asset
        );

        let Externals {
            tokens,
            ledger,
            oracle,
            vaults,
            pools,
            lender,
        } = ext;

        tokens.transfer_from(self.collateral, self.address, user, self.address, params.principal)?;

        let mut report = ExecutionReport::new(Operation::EnterWithFlashloan, user, self.collateral, params.borrow_asset);
        report.flashloan_amount = preview.flashloan_amount;

        let mut flow = EnterFlow {
            swapper: self,
            ledger: &mut **ledger,
            oracle: *oracle,
            vaults: &mut **vaults,
            pools: &mut **pools,
            lender: lender.address(),
            user,
            principal: params.principal,
            borrow_asset: params.borrow_asset,
            flashloan_amount: preview.flashloan_amount,
            referral_code: params.referral_code,
            swap_info: &params.swap_info,
            trail: FlowTrail::new(FlowDirection::Enter),
            report,
        };
        lender.flash_loan(&mut **tokens, &mut flow, params.borrow_asset, preview.flashloan_amount)?;

        let EnterFlow {
            mut trail, mut report, ..
        } = flow;
        trail.advance(FlowState::Repaid)?;

        let touched = self.touched_assets(&**pools, params.borrow_asset, &params.swap_info);
        report.swept = self.sweep(&mut **tokens, user, &touched)?;
        report.collateral_returned = swept_amount(&report.swept, self.collateral);
        report.health_factor = self.ensure_solvent(&**ledger, &**tokens, *oracle, user)?;
        trail.advance(FlowState::Idle)?;
        report.trail = trail.states().to_vec();

        info!(
            "entered {}: deposited {}, debt +{}, hf {}",
            user, report.collateral_deposited, report.debt_borrowed, report.health_factor
        );
        self.record(&report, ledger.debt_of(params.borrow_asset, user));
        Ok(report)
    }

    /// Opens or grows a position by repeated borrow, swap and deposit
    pub fn enter_position(
        &self,
        ext: &mut Externals<'_>,
        gate: &AccessGate,
        user: Address,
        params: &IterativeEnterParams,
    ) -> Result<ExecutionReport> {
        self.ensure_live()?;
        if params.principal.is_zero() {
            return Err(LeverageError::ZeroAmount("principal"));
        }
        self.ensure_iterations(params.iterations)?;
        if params.ltv_bps == 0 {
            return Err(LeverageError::ZeroAmount("ltv"));
        }
        let route = self.default_route(params.borrow_asset)?.without_minimums();
        if route.active_paths().is_empty() {
            return Err(LeverageError::InvalidSwapPath("no active forward path".to_string()));
        }

        let (internal, _) = self.collateral_reserve(ext)?;
        let reserve_ltv = ext.ledger.reserve_data(internal).map(|r| r.ltv_bps).unwrap_or_default();
        let ltv_cap = self.config.max_ltv_bps.min(reserve_ltv);
        if params.ltv_bps > ltv_cap {
            return Err(LeverageError::InvalidParameter(format!(
                "ltv {} bps above limit {}",
                params.ltv_bps, ltv_cap
            )));
        }
        gate.ensure_authorized(self.vault, self.address, user)?;

        let collateral_q = Self::quote(&*ext.tokens, ext.oracle, self.collateral)?;
        let borrow_q = Self::quote(&*ext.tokens, ext.oracle, params.borrow_asset)?;

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

        let mut report = ExecutionReport::new(Operation::EnterIterative, user, self.collateral, params.borrow_asset);

        tokens.transfer_from(self.collateral, self.address, user, self.address, params.principal)?;
        vault.deposit_collateral(&mut **tokens, &mut **ledger, self.address, params.principal, user)?;
        report.collateral_deposited = params.principal;

        let paths = route.active_paths();
        let mut last_deposit = params.principal;
        for round in 0..params.iterations {
            let borrow = borrow_for_collateral(last_deposit, params.ltv_bps, collateral_q, borrow_q)?;
            if borrow.is_zero() {
                debug!("round {}: nothing left to borrow", round);
                break;
            }
            ledger.borrow(&mut **tokens, *oracle, params.borrow_asset, borrow, user, self.address, 0)?;

            let mut exec = SwapPathExecutor::new(&mut **tokens, &mut **pools, self.address);
            let swapped = produce_collateral(&mut exec, &paths, params.borrow_asset, borrow, self.collateral)?;

            let floor = min_amount_out(borrow, borrow_q, collateral_q, self.config.default_slippage_bps)?;
            if swapped.amount_out < floor {
                let pool = swapped
                    .joined_pool
                    .or_else(|| swapped.paths.last().and_then(|p| p.hops.last()).map(|h| h.pool))
                    .unwrap_or_default();
                return Err(LeverageError::SlippageExceeded {
                    pool,
                    minimum: floor,
                    realized: swapped.amount_out,
                });
            }

            vault.deposit_collateral(&mut **tokens, &mut **ledger, self.address, swapped.amount_out, user)?;
            debug!(
                "round {}: borrowed {}, deposited {}",
                round, borrow, swapped.amount_out
            );

            report.debt_borrowed += borrow;
            report.collateral_swapped += swapped.amount_out;
            report.collateral_deposited += swapped.amount_out;
            report.rounds += 1;
            last_deposit = swapped.amount_out;
        }

        let touched = self.touched_assets(&**pools, params.borrow_asset, &route);
        report.swept = self.sweep(&mut **tokens, user, &touched)?;
        report.collateral_returned = swept_amount(&report.swept, self.collateral);
        report.health_factor = self.ensure_solvent(&**ledger, &**tokens, *oracle, user)?;

        info!(
            "entered {} in {} rounds: deposited {}, debt +{}, hf {}",
            user, report.rounds, report.collateral_deposited, report.debt_borrowed, report.health_factor
        );
        self.record(&report, ledger.debt_of(params.borrow_asset, user));
        Ok(report)
    }
}

/// Amount of `asset` in a sweep list
pub(super) fn swept_amount(swept: &[(Address, U256)], asset: Address) -> U256 {
    swept
        .iter()
        .filter(|(a, _)| *a == asset)
        .fold(U256::ZERO, |acc, (_, amount)| acc + *amount)
}
