//! In-Memory Sandbox
//!
//! Reference implementations of every external seam, plus a deployment
//! fixture wiring them into a working two-collateral market. Used by the
//! `leverage-sim` binary and by the scenario tests.

mod bank;
mod fixture;
mod ledger;
mod lender;
mod oracle;
mod pools;
mod vault;
mod world;

pub use bank::InMemoryBank;
pub use fixture::{
    bpt_usdc_route, crv_frax_dai_route, crv_frax_usdc_route, Deployment, ALICE, BALANCER_USDC_DAI, BOB,
    CURVE_FRAXBP, FLASH_LENDER, LEDGER, OWNER, SWAPPER_BPT, SWAPPER_CRV_FRAX, UNIV2_USDC_DAI, VAULT_BPT,
    VAULT_FRAXBP,
};
pub use ledger::InMemoryLedger;
pub use lender::PoolFlashLender;
pub use oracle::StaticOracle;
pub use pools::{PoolSet, PricedPool};
pub use vault::{VaultSet, WrappingVault};
pub use world::World;
