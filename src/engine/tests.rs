use alloy_primitives::{Address, U256};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::*;
use crate::config::EngineConfig;
use crate::routing::{PoolOperation, SwapHop, SwapKind, SwapPath, MAX_PATHS};
use crate::sandbox::{
    crv_frax_usdc_route, Deployment, InMemoryBank, ALICE, BOB, CURVE_FRAXBP, FLASH_LENDER, OWNER, SWAPPER_CRV_FRAX,
    VAULT_FRAXBP,
};
use crate::tokens::{BPT_USDC_DAI, CRV_FRAX, DAI, FRAX, RECEIPT_CRV_FRAX, RECEIPT_USDC, USDC};

fn e18(n: u64) -> U256 {
    U256::from(n) * WAD
}

fn usdc(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000u64)
}

/// `WAD * num / den`
fn wad_ratio(num: u64, den: u64) -> U256 {
    WAD * U256::from(num) / U256::from(den)
}

fn deployment_with(config: EngineConfig) -> Deployment {
    let mut d = Deployment::new(config).unwrap();
    d.authorize_swapper(ALICE, CRV_FRAX).unwrap();
    d.authorize_swapper(ALICE, BPT_USDC_DAI).unwrap();
    d.authorize_swapper(BOB, CRV_FRAX).unwrap();
    d
}

fn deployment() -> Deployment {
    deployment_with(EngineConfig::default())
}

fn enter_params(d: &Deployment, collateral: Address, principal: U256, leverage_bps: u64, asset: Address) -> EnterParams {
    EnterParams {
        principal,
        leverage_bps,
        borrow_asset: asset,
        referral_code: 0,
        swap_info: d.route(collateral, asset).unwrap(),
    }
}

fn withdraw_params(
    d: &Deployment,
    collateral: Address,
    repay_amount: U256,
    withdraw_amount: U256,
    slippage_bps: u64,
    asset: Address,
) -> WithdrawParams {
    WithdrawParams {
        repay_amount,
        withdraw_amount,
        slippage_bps,
        repay_asset: asset,
        receipt_token: d.receipt_token(collateral).unwrap(),
        referral_code: 0,
        swap_info: d.route(collateral, asset).unwrap(),
    }
}

fn leave_params(d: &Deployment, collateral: Address, slippage_bps: u64, asset: Address) -> LeaveParams {
    LeaveParams {
        slippage_bps,
        repay_asset: asset,
        receipt_token: d.receipt_token(collateral).unwrap(),
        referral_code: 0,
        swap_info: d.route(collateral, asset).unwrap(),
    }
}

// ============================================
// ENTRY
// ============================================

#[test]
fn test_enter_sizes_flashloan_and_debt() {
    let mut d = deployment();
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    let report = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();

    // 2000 crvFRAX at $1.02, premium 5 bps
    assert_eq!(report.flashloan_amount, usdc(2_040));
    assert_eq!(report.flashloan_premium, U256::from(1_020_000u64));
    assert_eq!(report.debt_borrowed, U256::from(2_041_020_000u64));
    // Curve fee 4 bps on 2000 crvFRAX
    assert_eq!(report.collateral_swapped, e18(19_992) / U256::from(10u64));
    assert_eq!(report.collateral_deposited, e18(29_992) / U256::from(10u64));
    assert!(report.swept.is_empty());

    let position = d.position(ALICE, CRV_FRAX, USDC).unwrap();
    assert_eq!(position.collateral_amount, report.collateral_deposited);
    assert_eq!(position.debt_amount, report.debt_borrowed);
    assert!(position.leverage_bps > U256::from(20_000u64));
    assert!(position.leverage_bps < U256::from(20_100u64));
    assert!(position.health_factor > wad_ratio(139, 100));
    assert!(position.health_factor < wad_ratio(140, 100));

    // Swapper holds nothing afterwards
    assert!(d.world.bank.holdings(SWAPPER_CRV_FRAX).is_empty());
    assert_eq!(d.balance(CRV_FRAX, ALICE), e18(999_000));
}

#[test]
fn test_enter_trail_visits_every_state() {
    let mut d = deployment();
    let params = enter_params(&d, CRV_FRAX, e18(500), 15_000, USDC);
    let report = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();
    assert_eq!(
        report.trail,
        vec![
            FlowState::Idle,
            FlowState::Borrowed,
            FlowState::Swapped,
            FlowState::Deposited,
            FlowState::Repaid,
            FlowState::Idle
        ]
    );
}

#[test]
fn test_flashloan_settled_with_premium() {
    let mut d = deployment();
    let before = d.balance(USDC, FLASH_LENDER);
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    let report = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();
    assert_eq!(d.balance(USDC, FLASH_LENDER), before + report.flashloan_premium);
}

#[test]
fn test_enter_over_two_hop_route() {
    let mut d = deployment();
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, DAI);
    let report = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();

    // 0.30% on Uniswap, then 0.04% on Curve
    assert!(report.collateral_swapped > e18(1_990));
    assert!(report.collateral_swapped < e18(1_995));
    assert_eq!(d.world.ledger.debt_of(DAI, ALICE), report.debt_borrowed);
    assert!(report.health_factor > WAD);
}

#[test]
fn test_enter_over_parallel_paths_joins_constituents() {
    let mut d = deployment();
    let params = enter_params(&d, BPT_USDC_DAI, e18(1_000), 20_000, USDC);
    let report = d.enter_with_flashloan(ALICE, BPT_USDC_DAI, &params).unwrap();

    // Half joins directly, half goes through DAI first
    assert!(report.collateral_swapped > e18(1_990));
    assert!(report.collateral_swapped < e18(1_999));
    assert!(report.health_factor > wad_ratio(138, 100));
    assert!(d.world.bank.holdings(crate::sandbox::SWAPPER_BPT).is_empty());
}

#[test]
fn test_too_much_leverage_is_insolvent_and_reverts() {
    let mut d = deployment();
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 90_000, USDC);
    let err = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap_err();

    assert_eq!(err.code(), "120");
    assert_eq!(d.balance(CRV_FRAX, ALICE), e18(1_000_000));
    assert!(d.position(ALICE, CRV_FRAX, USDC).unwrap().is_empty());
}

// ============================================
// EXIT
// ============================================

#[test]
fn test_full_exit_returns_most_of_principal() {
    let mut d = deployment();
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();

    let leave = leave_params(&d, CRV_FRAX, 30, USDC);
    let report = d.leave_with_flashloan(ALICE, CRV_FRAX, &leave).unwrap();

    assert_eq!(report.health_factor, U256::MAX);
    assert!(d.position(ALICE, CRV_FRAX, USDC).unwrap().is_empty());
    // ~991 crvFRAX back, the slippage reserve comes back as USDC
    assert!(report.collateral_returned > e18(990));
    assert!(report.collateral_returned < e18(1_000));
    assert!(report.swept.iter().any(|(asset, _)| *asset == USDC));
    assert!(d.world.bank.holdings(SWAPPER_CRV_FRAX).is_empty());
    assert_eq!(
        report.trail,
        vec![
            FlowState::Idle,
            FlowState::Borrowed,
            FlowState::DebtRepaid,
            FlowState::Withdrawn,
            FlowState::Swapped,
            FlowState::Repaid,
            FlowState::Idle
        ]
    );
}

#[test]
fn test_round_trip_over_random_positions() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..12 {
        let principal = e18(rng.gen_range(100..=10_000));
        let leverage = rng.gen_range(10_000..=40_000);

        let mut d = deployment();
        let start = d.balance(CRV_FRAX, ALICE);
        let params = enter_params(&d, CRV_FRAX, principal, leverage, USDC);
        d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();

        let debt = d.world.ledger.debt_of(USDC, ALICE);
        let exit = withdraw_params(&d, CRV_FRAX, debt, principal, 30, USDC);
        d.withdraw_with_flashloan(ALICE, CRV_FRAX, &exit).unwrap();

        let back = d.balance(CRV_FRAX, ALICE) + principal - start;
        assert!(
            back * U256::from(100u64) >= principal * U256::from(97u64),
            "principal {} leverage {} returned {}",
            principal,
            leverage,
            back
        );
        let position = d.position(ALICE, CRV_FRAX, USDC).unwrap();
        assert!(position.debt_amount.is_zero());
        assert!(position.collateral_amount.is_zero());
    }
}

#[test]
fn test_partial_exits_keep_position_healthy() {
    let mut d = deployment();
    let principal = e18(1_000);
    let params = enter_params(&d, CRV_FRAX, principal, 20_000, USDC);
    d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();
    let initial_debt = d.world.ledger.debt_of(USDC, ALICE);

    let mut returned = U256::ZERO;
    for pct in [10u64, 20, 30] {
        let repay = initial_debt * U256::from(pct) / U256::from(100u64);
        let withdraw = principal * U256::from(pct) / U256::from(100u64);
        let exit = withdraw_params(&d, CRV_FRAX, repay, withdraw, 30, USDC);
        let report = d.withdraw_with_flashloan(ALICE, CRV_FRAX, &exit).unwrap();

        assert_eq!(report.debt_repaid, repay);
        assert_eq!(report.collateral_returned, withdraw);
        assert!(report.health_factor > wad_ratio(138, 100));
        assert!(report.health_factor < wad_ratio(140, 100));
        returned += report.collateral_returned;
    }

    // Last step clears the remaining debt
    let exit = withdraw_params(&d, CRV_FRAX, U256::MAX, principal * U256::from(4u64) / U256::from(10u64), 30, USDC);
    let report = d.withdraw_with_flashloan(ALICE, CRV_FRAX, &exit).unwrap();
    returned += report.collateral_returned;

    assert_eq!(report.health_factor, U256::MAX);
    assert!(d.position(ALICE, CRV_FRAX, USDC).unwrap().is_empty());
    assert!(returned * U256::from(100u64) >= principal * U256::from(98u64));
}

#[test]
fn test_exit_over_two_hop_route() {
    let mut d = deployment();
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, DAI);
    d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();

    let leave = leave_params(&d, CRV_FRAX, 50, DAI);
    let report = d.leave_with_flashloan(ALICE, CRV_FRAX, &leave).unwrap();
    assert!(report.collateral_returned > e18(975));
    assert!(d.world.ledger.debt_of(DAI, ALICE).is_zero());
}

#[test]
fn test_exit_through_pool_constituents() {
    let mut d = deployment();
    let params = enter_params(&d, BPT_USDC_DAI, e18(1_000), 20_000, USDC);
    d.enter_with_flashloan(ALICE, BPT_USDC_DAI, &params).unwrap();

    let leave = leave_params(&d, BPT_USDC_DAI, 50, USDC);
    let report = d.leave_with_flashloan(ALICE, BPT_USDC_DAI, &leave).unwrap();

    assert!(report.collateral_returned > e18(975));
    assert!(d.position(ALICE, BPT_USDC_DAI, USDC).unwrap().is_empty());
    assert!(d.world.bank.holdings(crate::sandbox::SWAPPER_BPT).is_empty());
}

#[test]
fn test_exit_without_debt_rejected() {
    let mut d = deployment();
    let exit = withdraw_params(&d, CRV_FRAX, usdc(100), e18(1), 30, USDC);
    let err = d.withdraw_with_flashloan(ALICE, CRV_FRAX, &exit).unwrap_err();
    assert_eq!(err.code(), "113");
}

// ============================================
// ITERATIVE
// ============================================

#[test]
fn test_iterative_round_trip() {
    let mut d = deployment();
    let enter = IterativeEnterParams {
        principal: e18(1_000),
        iterations: 3,
        ltv_bps: 7_000,
        borrow_asset: USDC,
    };
    let report = d.enter_iterative(ALICE, CRV_FRAX, &enter).unwrap();
    assert_eq!(report.rounds, 3);
    // 714 + ~500 + ~350 USDC
    assert!(report.debt_borrowed > usdc(1_550));
    assert!(report.debt_borrowed < usdc(1_570));
    assert!(report.health_factor > wad_ratio(150, 100));

    let position = d.position(ALICE, CRV_FRAX, USDC).unwrap();
    assert_eq!(position.collateral_amount, report.collateral_deposited);
    assert_eq!(position.debt_amount, report.debt_borrowed);

    let leave = IterativeLeaveParams {
        withdraw_amount: U256::MAX,
        slippage_bps: 30,
        iterations: 10,
        repay_asset: USDC,
        receipt_token: RECEIPT_CRV_FRAX,
    };
    let report = d.leave_iterative(ALICE, CRV_FRAX, &leave).unwrap();
    assert!(report.rounds >= 2);
    assert!(report.collateral_returned * U256::from(100u64) >= e18(1_000) * U256::from(97u64));
    assert!(d.position(ALICE, CRV_FRAX, USDC).unwrap().is_empty());
    assert!(d.world.bank.holdings(SWAPPER_CRV_FRAX).is_empty());
}

#[test]
fn test_iterative_limits() {
    let mut d = deployment();
    let mut enter = IterativeEnterParams {
        principal: e18(1_000),
        iterations: 0,
        ltv_bps: 7_000,
        borrow_asset: USDC,
    };
    assert_eq!(d.enter_iterative(ALICE, CRV_FRAX, &enter).unwrap_err().code(), "113");

    enter.iterations = 11;
    assert_eq!(d.enter_iterative(ALICE, CRV_FRAX, &enter).unwrap_err().code(), "122");

    enter.iterations = 3;
    enter.ltv_bps = 9_500;
    assert_eq!(d.enter_iterative(ALICE, CRV_FRAX, &enter).unwrap_err().code(), "122");

    enter.ltv_bps = 7_000;
    enter.borrow_asset = FRAX;
    assert_eq!(d.enter_iterative(ALICE, CRV_FRAX, &enter).unwrap_err().code(), "114");
}

// ============================================
// ACCESS AND VALIDATION
// ============================================

#[test]
fn test_unlisted_user_rejected_until_whitelisted() {
    let mut d = deployment();
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);

    let err = d.enter_with_flashloan(BOB, CRV_FRAX, &params).unwrap_err();
    assert_eq!(err.code(), "118");
    assert_eq!(d.balance(CRV_FRAX, BOB), e18(1_000_000));

    d.gate.set_user_whitelist(OWNER, VAULT_FRAXBP, BOB, true).unwrap();
    d.enter_with_flashloan(BOB, CRV_FRAX, &params).unwrap();
    assert!(!d.position(BOB, CRV_FRAX, USDC).unwrap().is_empty());
}

#[test]
fn test_unlisted_swapper_rejected() {
    let mut d = deployment();
    d.gate
        .set_swapper_whitelist(OWNER, VAULT_FRAXBP, SWAPPER_CRV_FRAX, false)
        .unwrap();
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    let err = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap_err();
    assert_eq!(err.code(), "118");
}

#[test]
fn test_input_validation_codes() {
    let mut d = deployment();

    let zero = enter_params(&d, CRV_FRAX, U256::ZERO, 20_000, USDC);
    assert_eq!(d.enter_with_flashloan(ALICE, CRV_FRAX, &zero).unwrap_err().code(), "113");

    let mut frax = enter_params(&d, CRV_FRAX, e18(1), 20_000, USDC);
    frax.borrow_asset = FRAX;
    assert_eq!(d.enter_with_flashloan(ALICE, CRV_FRAX, &frax).unwrap_err().code(), "114");

    let greedy = enter_params(&d, CRV_FRAX, e18(1), 100_000, USDC);
    assert_eq!(d.enter_with_flashloan(ALICE, CRV_FRAX, &greedy).unwrap_err().code(), "122");

    let mut pathless = enter_params(&d, CRV_FRAX, e18(1), 20_000, USDC);
    pathless.swap_info.path_length = 0;
    assert_eq!(d.enter_with_flashloan(ALICE, CRV_FRAX, &pathless).unwrap_err().code(), "116");

    let unknown = enter_params(&d, CRV_FRAX, e18(1), 20_000, USDC);
    assert_eq!(d.enter_with_flashloan(ALICE, FRAX, &unknown).unwrap_err().code(), "111");
}

#[test]
fn test_receipt_token_checks() {
    let mut d = deployment();
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();

    let mut exit = withdraw_params(&d, CRV_FRAX, U256::MAX, e18(100), 30, USDC);
    exit.receipt_token = Address::ZERO;
    assert_eq!(d.withdraw_with_flashloan(ALICE, CRV_FRAX, &exit).unwrap_err().code(), "112");

    exit.receipt_token = RECEIPT_USDC;
    assert_eq!(d.withdraw_with_flashloan(ALICE, CRV_FRAX, &exit).unwrap_err().code(), "123");

    exit.receipt_token = RECEIPT_CRV_FRAX;
    exit.repay_amount = U256::ZERO;
    assert_eq!(d.withdraw_with_flashloan(ALICE, CRV_FRAX, &exit).unwrap_err().code(), "113");

    exit.repay_amount = U256::MAX;
    exit.slippage_bps = 2_000;
    assert_eq!(d.withdraw_with_flashloan(ALICE, CRV_FRAX, &exit).unwrap_err().code(), "122");
}

#[test]
fn test_emergency_stop_blocks_every_entry_point() {
    let config = EngineConfig {
        emergency_stop: true,
        ..EngineConfig::default()
    };
    let mut d = deployment_with(config);

    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    assert_eq!(d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap_err().code(), "122");

    let leave = leave_params(&d, CRV_FRAX, 30, USDC);
    assert_eq!(d.leave_with_flashloan(ALICE, CRV_FRAX, &leave).unwrap_err().code(), "122");
}

// ============================================
// SLIPPAGE AND ROUTES
// ============================================

#[test]
fn test_slipped_hop_reverts_everything() {
    let mut d = deployment();
    let mut params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    // 2040 USDC quotes 1999.2 crvFRAX
    params.swap_info.paths[0].hops[0] = params.swap_info.paths[0].hops[0].with_min_out(e18(1_995));

    d.world.pools.get_mut(CURVE_FRAXBP).unwrap().set_shortfall_bps(100);
    let lender_before = d.balance(USDC, FLASH_LENDER);
    let err = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap_err();

    assert_eq!(err.code(), "117");
    assert_eq!(d.balance(CRV_FRAX, ALICE), e18(1_000_000));
    assert_eq!(d.balance(USDC, FLASH_LENDER), lender_before);
    assert!(d.position(ALICE, CRV_FRAX, USDC).unwrap().is_empty());

    d.world.pools.get_mut(CURVE_FRAXBP).unwrap().set_shortfall_bps(0);
    d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();
}

#[test]
fn test_slipped_reverse_hop_reverts_exit() {
    let mut d = deployment();
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();

    let mut leave = leave_params(&d, CRV_FRAX, 30, USDC);
    // Selling ~2007 crvFRAX cannot deliver 100k USDC
    leave.swap_info.reverse_paths[0].hops[0] = leave.swap_info.reverse_paths[0].hops[0].with_min_out(usdc(100_000));

    let debt_before = d.debt(USDC, ALICE);
    let lender_before = d.balance(USDC, FLASH_LENDER);
    let receipts_before = d.balance(RECEIPT_CRV_FRAX, ALICE);
    let err = d.leave_with_flashloan(ALICE, CRV_FRAX, &leave).unwrap_err();

    assert_eq!(err.code(), "117");
    assert_eq!(d.debt(USDC, ALICE), debt_before);
    assert_eq!(d.balance(USDC, FLASH_LENDER), lender_before);
    assert_eq!(d.balance(RECEIPT_CRV_FRAX, ALICE), receipts_before);
    assert_eq!(d.balance(CRV_FRAX, ALICE), e18(999_000));

    let leave = leave_params(&d, CRV_FRAX, 30, USDC);
    d.leave_with_flashloan(ALICE, CRV_FRAX, &leave).unwrap();
    assert!(d.position(ALICE, CRV_FRAX, USDC).unwrap().is_empty());
}

#[test]
fn test_passthrough_hop_ignores_min_out() {
    let mut d = deployment();
    let mut params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    let mint = SwapHop::new(CURVE_FRAXBP, SwapKind::NoSwap, USDC, CRV_FRAX, PoolOperation::Join).with_min_out(U256::MAX);
    params.swap_info.paths[0] = SwapPath::new(vec![mint], U256::ZERO, U256::ZERO);

    let report = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();
    // 1:1 in whole units
    assert_eq!(report.collateral_swapped, e18(2_040));
    assert_eq!(report.collateral_deposited, e18(3_040));

    // The same minimum on a priced hop is enforced
    let mut d = deployment();
    let mut params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    params.swap_info.paths[0].hops[0] = params.swap_info.paths[0].hops[0].with_min_out(U256::MAX);
    assert_eq!(d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap_err().code(), "117");
}

#[test]
fn test_sentinel_padding_matches_fewer_paths() {
    let single = crv_frax_usdc_route();
    let mut padded = single.clone();
    while padded.paths.len() < MAX_PATHS {
        padded.paths.push(SwapPath::sentinel());
        padded.reverse_paths.push(SwapPath::sentinel());
    }
    padded.path_length = MAX_PATHS;

    let mut reports = Vec::new();
    for route in [single, padded] {
        let mut d = deployment();
        let mut params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
        params.swap_info = route;
        reports.push(d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap());
    }
    assert_eq!(reports[0].collateral_deposited, reports[1].collateral_deposited);
    assert_eq!(reports[0].debt_borrowed, reports[1].debt_borrowed);
}

#[test]
fn test_preview_matches_execution() {
    let mut d = deployment();
    let preview = {
        let swapper = d.registry.swapper(CRV_FRAX).unwrap().clone();
        let ext = d.world.externals();
        swapper.preview_enter(&ext, e18(1_000), 20_000, USDC).unwrap()
    };
    let params = enter_params(&d, CRV_FRAX, e18(1_000), 20_000, USDC);
    let report = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();

    assert_eq!(preview.flashloan_amount, report.flashloan_amount);
    assert_eq!(preview.flashloan_premium, report.flashloan_premium);
    assert!(report.collateral_swapped >= preview.min_collateral_out);
}

#[test]
fn test_health_factor_never_below_one_after_success() {
    let mut d = deployment();
    for leverage in [10_000u64, 25_000, 40_000] {
        let params = enter_params(&d, CRV_FRAX, e18(500), leverage, USDC);
        let report = d.enter_with_flashloan(ALICE, CRV_FRAX, &params).unwrap();
        assert!(report.health_factor >= WAD);
        assert!(d.position(ALICE, CRV_FRAX, USDC).unwrap().health_factor >= WAD);
    }
}

/// Bank whose plain transfers report success without moving anything
struct StuckBank(InMemoryBank);

impl TokenBank for StuckBank {
    fn balance_of(&self, asset: Address, holder: Address) -> U256 {
        self.0.balance_of(asset, holder)
    }

    fn decimals(&self, asset: Address) -> crate::Result<u8> {
        self.0.decimals(asset)
    }

    fn transfer(&mut self, _asset: Address, _from: Address, _to: Address, _amount: U256) -> crate::Result<()> {
        Ok(())
    }

    fn approve(&mut self, asset: Address, owner: Address, spender: Address, amount: U256) {
        self.0.approve(asset, owner, spender, amount)
    }

    fn allowance(&self, asset: Address, owner: Address, spender: Address) -> U256 {
        self.0.allowance(asset, owner, spender)
    }

    fn transfer_from(
        &mut self,
        asset: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> crate::Result<()> {
        self.0.transfer_from(asset, spender, from, to, amount)
    }

    fn mint(&mut self, asset: Address, to: Address, amount: U256) -> crate::Result<()> {
        self.0.mint(asset, to, amount)
    }

    fn burn(&mut self, asset: Address, from: Address, amount: U256) -> crate::Result<()> {
        self.0.burn(asset, from, amount)
    }
}

#[test]
fn test_sweep_leaves_swapper_empty() {
    let d = deployment();
    let swapper = d.registry.swapper(CRV_FRAX).unwrap().clone();
    let mut bank = d.world.bank.clone();
    bank.mint(USDC, SWAPPER_CRV_FRAX, usdc(5)).unwrap();
    bank.mint(CRV_FRAX, SWAPPER_CRV_FRAX, e18(1)).unwrap();

    let swept = swapper.sweep(&mut bank, ALICE, &[CRV_FRAX, USDC]).unwrap();
    assert_eq!(swept, vec![(CRV_FRAX, e18(1)), (USDC, usdc(5))]);
    assert!(bank.holdings(SWAPPER_CRV_FRAX).is_empty());
}

#[test]
fn test_sweep_rejects_balance_left_behind() {
    let d = deployment();
    let swapper = d.registry.swapper(CRV_FRAX).unwrap().clone();
    let mut bank = StuckBank(d.world.bank.clone());
    bank.mint(USDC, SWAPPER_CRV_FRAX, usdc(5)).unwrap();

    let err = swapper.sweep(&mut bank, ALICE, &[CRV_FRAX, USDC]).unwrap_err();
    assert_eq!(err.code(), "124");
}
