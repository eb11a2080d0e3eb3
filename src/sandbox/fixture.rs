//! Sandbox deployment
//!
//! Two leverage markets on one ledger:
//! - crvFRAX (Curve FRAX/USDC share), borrowable against USDC or DAI
//! - B-50USDC-50DAI (Balancer weighted share), borrowable against USDC,
//!   entered over two parallel paths
//!
//! All pools price at the oracle's reference prices less their fee.

use alloy_primitives::{address, Address, U256};
use tracing::info;

use super::{
    InMemoryBank, InMemoryLedger, PoolFlashLender, PoolSet, PricedPool, StaticOracle, VaultSet, World, WrappingVault,
};
use crate::access::AccessGate;
use crate::config::EngineConfig;
use crate::engine::{
    EnterParams, ExecutionReport, IterativeEnterParams, IterativeLeaveParams, LeaveParams, LeverageSwapper, Position,
    WithdrawParams,
};
use crate::errors::{LeverageError, Result};
use crate::externals::{LendingLedger, PoolFamily, ReserveData, TokenBank, VaultDirectory};
use crate::registry::SwapperRegistry;
use crate::routing::{PoolOperation, SwapHop, SwapInfo, SwapKind, SwapPath};
use crate::sizing::AssetQuote;
use crate::tokens::{
    self, BPT_USDC_DAI, CRV_FRAX, DAI, FRAX, RECEIPT_BPT_USDC_DAI, RECEIPT_CRV_FRAX, RECEIPT_DAI, RECEIPT_USDC, USDC,
    VAULT_BPT_USDC_DAI, VAULT_CRV_FRAX,
};

// ============================================
// ADDRESSES
// ============================================

pub const CURVE_FRAXBP: Address = address!("DcEF968d416a41Cdac0ED8702fAC8128A64241A2");
pub const UNIV2_USDC_DAI: Address = address!("AE461cA67B15dc8dc81CE7615e0320dA1A9aB8D5");
pub const BALANCER_USDC_DAI: Address = address!("00000000000000000000000000000000000b9700");

pub const LEDGER: Address = address!("00000000000000000000000000000000000c0001");
pub const FLASH_LENDER: Address = address!("00000000000000000000000000000000000c0002");
pub const VAULT_FRAXBP: Address = address!("00000000000000000000000000000000000c0101");
pub const VAULT_BPT: Address = address!("00000000000000000000000000000000000c0102");
pub const SWAPPER_CRV_FRAX: Address = address!("00000000000000000000000000000000000c0201");
pub const SWAPPER_BPT: Address = address!("00000000000000000000000000000000000c0202");

pub const OWNER: Address = address!("00000000000000000000000000000000000e0001");
/// Whitelisted on both vaults
pub const ALICE: Address = address!("00000000000000000000000000000000000e0002");
/// Funded, never whitelisted
pub const BOB: Address = address!("00000000000000000000000000000000000e0003");

const ONE_DOLLAR: u64 = 100_000_000;
const CRV_FRAX_PRICE: u64 = 102_000_000;

/// Whole-unit amount in `decimals`
fn units(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(decimals))
}

// ============================================
// DEPLOYMENT
// ============================================

/// Sandbox world plus the owner-side contracts that sit outside it
pub struct Deployment {
    pub world: World,
    pub gate: AccessGate,
    pub registry: SwapperRegistry,
    pub config: EngineConfig,
}

impl Deployment {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let mut bank = InMemoryBank::new();
        for token in tokens::all_tokens() {
            bank.register(token.address, token.decimals);
        }

        let mut oracle = StaticOracle::new();
        for asset in [USDC, DAI, FRAX, BPT_USDC_DAI, VAULT_BPT_USDC_DAI] {
            oracle.set_price(asset, U256::from(ONE_DOLLAR));
        }
        for asset in [CRV_FRAX, VAULT_CRV_FRAX] {
            oracle.set_price(asset, U256::from(CRV_FRAX_PRICE));
        }

        let dollar = |decimals| AssetQuote::new(U256::from(ONE_DOLLAR), decimals);

        let mut pools = PoolSet::default();
        pools.insert(
            PricedPool::new(CURVE_FRAXBP, PoolFamily::StableSwap, 4)
                .with_coin(FRAX, dollar(18)?, 5_000)
                .with_coin(USDC, dollar(6)?, 5_000)
                .with_share(CRV_FRAX, AssetQuote::new(U256::from(CRV_FRAX_PRICE), 18)?),
        );
        pools.insert(
            PricedPool::new(BALANCER_USDC_DAI, PoolFamily::Weighted, 10)
                .with_coin(USDC, dollar(6)?, 5_000)
                .with_coin(DAI, dollar(18)?, 5_000)
                .with_share(BPT_USDC_DAI, dollar(18)?),
        );
        pools.insert(
            PricedPool::new(UNIV2_USDC_DAI, PoolFamily::ConstantProduct, 30)
                .with_coin(USDC, dollar(6)?, 5_000)
                .with_coin(DAI, dollar(18)?, 5_000),
        );

        for (pool, coins) in [
            (CURVE_FRAXBP, [(FRAX, 18), (USDC, 6)]),
            (BALANCER_USDC_DAI, [(USDC, 6), (DAI, 18)]),
            (UNIV2_USDC_DAI, [(USDC, 6), (DAI, 18)]),
        ] {
            for (coin, decimals) in coins {
                bank.mint(coin, pool, units(10_000_000, decimals))?;
            }
        }

        let mut ledger = InMemoryLedger::new(LEDGER);
        for (asset, receipt, decimals) in [(USDC, RECEIPT_USDC, 6), (DAI, RECEIPT_DAI, 18)] {
            ledger.init_reserve(ReserveData {
                asset,
                receipt_token: receipt,
                decimals,
                ltv_bps: 0,
                liquidation_threshold_bps: 0,
                borrowing_enabled: true,
            });
            bank.mint(asset, LEDGER, units(10_000_000, decimals))?;
            bank.mint(asset, FLASH_LENDER, units(10_000_000, decimals))?;
        }
        for (asset, receipt) in [
            (VAULT_CRV_FRAX, RECEIPT_CRV_FRAX),
            (VAULT_BPT_USDC_DAI, RECEIPT_BPT_USDC_DAI),
        ] {
            ledger.init_reserve(ReserveData {
                asset,
                receipt_token: receipt,
                decimals: 18,
                ltv_bps: 9_000,
                liquidation_threshold_bps: 9_300,
                borrowing_enabled: false,
            });
        }

        let mut vaults = VaultSet::default();
        vaults.insert(WrappingVault::new(VAULT_FRAXBP, CRV_FRAX, VAULT_CRV_FRAX));
        vaults.insert(WrappingVault::new(VAULT_BPT, BPT_USDC_DAI, VAULT_BPT_USDC_DAI));

        for user in [ALICE, BOB] {
            bank.mint(CRV_FRAX, user, units(1_000_000, 18))?;
            bank.mint(BPT_USDC_DAI, user, units(1_000_000, 18))?;
        }

        let world = World {
            bank,
            ledger,
            oracle,
            vaults,
            pools,
            lender: PoolFlashLender::new(FLASH_LENDER, config.flash_loan_provider),
        };

        let mut gate = AccessGate::new(OWNER);
        for (vault, swapper) in [(VAULT_FRAXBP, SWAPPER_CRV_FRAX), (VAULT_BPT, SWAPPER_BPT)] {
            gate.set_swapper_whitelist(OWNER, vault, swapper, true)?;
            gate.set_user_whitelist(OWNER, vault, ALICE, true)?;
        }

        let mut registry = SwapperRegistry::new(OWNER);
        registry.register(
            OWNER,
            LeverageSwapper::new(SWAPPER_CRV_FRAX, CRV_FRAX, VAULT_FRAXBP, config.clone())
                .with_borrow_asset(USDC, crv_frax_usdc_route())?
                .with_borrow_asset(DAI, crv_frax_dai_route())?,
        )?;
        registry.register(
            OWNER,
            LeverageSwapper::new(SWAPPER_BPT, BPT_USDC_DAI, VAULT_BPT, config.clone())
                .with_borrow_asset(USDC, bpt_usdc_route())?,
        )?;

        info!("sandbox deployed: {} collaterals", registry.collaterals().len());
        Ok(Self {
            world,
            gate,
            registry,
            config,
        })
    }

    pub fn balance(&self, asset: Address, holder: Address) -> U256 {
        self.world.bank.balance_of(asset, holder)
    }

    pub fn debt(&self, asset: Address, user: Address) -> U256 {
        self.world.ledger.debt_of(asset, user)
    }

    /// Route the swapper for `collateral` uses for `borrow_asset`
    pub fn route(&self, collateral: Address, borrow_asset: Address) -> Result<SwapInfo> {
        Ok(self
            .registry
            .swapper(collateral)?
            .default_route(borrow_asset)?
            .clone())
    }

    /// Receipt token the ledger mints for `collateral`'s vault
    pub fn receipt_token(&self, collateral: Address) -> Result<Address> {
        let vault = self.registry.swapper(collateral)?.vault();
        let internal = self
            .world
            .vaults
            .vault(vault)
            .map(|v| v.internal_asset())
            .ok_or_else(|| LeverageError::External(format!("vault {} is not deployed", vault)))?;
        self.world
            .ledger
            .reserve_data(internal)
            .map(|r| r.receipt_token)
            .ok_or_else(|| LeverageError::External(format!("ledger has no reserve for {}", internal)))
    }

    /// Approvals a user grants before the swapper can act for them:
    /// collateral and receipt allowances, credit delegation on every borrow asset
    pub fn authorize_swapper(&mut self, user: Address, collateral: Address) -> Result<()> {
        let receipt = self.receipt_token(collateral)?;
        let swapper = self.registry.swapper(collateral)?;
        let bank = &mut self.world.bank;
        bank.approve(collateral, user, swapper.address(), U256::MAX);
        bank.approve(receipt, user, swapper.address(), U256::MAX);
        for asset in swapper.borrow_assets() {
            self.world
                .ledger
                .approve_delegation(asset, user, swapper.address(), U256::MAX);
        }
        Ok(())
    }

    pub fn enter_with_flashloan(
        &mut self,
        user: Address,
        collateral: Address,
        params: &EnterParams,
    ) -> Result<ExecutionReport> {
        let swapper = self.registry.swapper(collateral)?;
        let gate = &self.gate;
        self.world
            .transact(|ext| swapper.enter_position_with_flashloan(ext, gate, user, params))
    }

    pub fn withdraw_with_flashloan(
        &mut self,
        user: Address,
        collateral: Address,
        params: &WithdrawParams,
    ) -> Result<ExecutionReport> {
        let swapper = self.registry.swapper(collateral)?;
        let gate = &self.gate;
        self.world
            .transact(|ext| swapper.withdraw_with_flashloan(ext, gate, user, params))
    }

    pub fn leave_with_flashloan(
        &mut self,
        user: Address,
        collateral: Address,
        params: &LeaveParams,
    ) -> Result<ExecutionReport> {
        let swapper = self.registry.swapper(collateral)?;
        let gate = &self.gate;
        self.world
            .transact(|ext| swapper.leave_position_with_flashloan(ext, gate, user, params))
    }

    pub fn enter_iterative(
        &mut self,
        user: Address,
        collateral: Address,
        params: &IterativeEnterParams,
    ) -> Result<ExecutionReport> {
        let swapper = self.registry.swapper(collateral)?;
        let gate = &self.gate;
        self.world.transact(|ext| swapper.enter_position(ext, gate, user, params))
    }

    pub fn leave_iterative(
        &mut self,
        user: Address,
        collateral: Address,
        params: &IterativeLeaveParams,
    ) -> Result<ExecutionReport> {
        let swapper = self.registry.swapper(collateral)?;
        let gate = &self.gate;
        self.world.transact(|ext| swapper.leave_position(ext, gate, user, params))
    }

    pub fn position(&mut self, user: Address, collateral: Address, debt_asset: Address) -> Result<Position> {
        let swapper = self.registry.swapper(collateral)?;
        let ext = self.world.externals();
        swapper.position(&ext, user, debt_asset)
    }
}

// ============================================
// ROUTES
// ============================================

/// USDC -> crvFRAX by single-sided Curve deposit, and back
pub fn crv_frax_usdc_route() -> SwapInfo {
    let add = SwapHop::new(CURVE_FRAXBP, SwapKind::Curve, USDC, CRV_FRAX, PoolOperation::AddLiquidity).with_indices(1, 0);
    let remove = SwapHop::new(CURVE_FRAXBP, SwapKind::Curve, CRV_FRAX, USDC, PoolOperation::RemoveLiquidityOneCoin)
        .with_indices(0, 1);
    SwapInfo::single(
        SwapPath::new(vec![add], U256::ZERO, U256::ZERO),
        SwapPath::new(vec![remove], U256::ZERO, U256::ZERO),
    )
}

/// DAI -> USDC on Uniswap, then into crvFRAX; reversed on the way out
pub fn crv_frax_dai_route() -> SwapInfo {
    let dai_to_usdc = SwapHop::new(UNIV2_USDC_DAI, SwapKind::UniswapV2, DAI, USDC, PoolOperation::Exchange);
    let add = SwapHop::new(CURVE_FRAXBP, SwapKind::Curve, USDC, CRV_FRAX, PoolOperation::AddLiquidity).with_indices(1, 0);
    let remove = SwapHop::new(CURVE_FRAXBP, SwapKind::Curve, CRV_FRAX, USDC, PoolOperation::RemoveLiquidityOneCoin)
        .with_indices(0, 1);
    let usdc_to_dai = SwapHop::new(UNIV2_USDC_DAI, SwapKind::UniswapV2, USDC, DAI, PoolOperation::Exchange);
    SwapInfo::single(
        SwapPath::new(vec![dai_to_usdc, add], U256::ZERO, U256::ZERO),
        SwapPath::new(vec![remove, usdc_to_dai], U256::ZERO, U256::ZERO),
    )
}

/// Half the USDC joins the weighted pool directly, half becomes DAI and
/// is joined with it. On exit the share is split out of the pool and the
/// DAI leg swapped back to USDC.
pub fn bpt_usdc_route() -> SwapInfo {
    let join = SwapHop::new(BALANCER_USDC_DAI, SwapKind::Balancer, USDC, BPT_USDC_DAI, PoolOperation::Join);
    let usdc_to_dai = SwapHop::new(UNIV2_USDC_DAI, SwapKind::UniswapV2, USDC, DAI, PoolOperation::Exchange);
    let dai_to_usdc = SwapHop::new(UNIV2_USDC_DAI, SwapKind::UniswapV2, DAI, USDC, PoolOperation::Exchange);
    let even = U256::from(1u64);
    SwapInfo {
        paths: vec![
            SwapPath::new(vec![join], even, U256::ZERO),
            SwapPath::new(vec![usdc_to_dai], even, U256::ZERO),
        ],
        reverse_paths: vec![SwapPath::new(vec![dai_to_usdc], even, U256::ZERO), SwapPath::sentinel()],
        path_length: 2,
    }
}
