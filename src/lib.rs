//! Leverage Engine
//!
//! Opens, resizes and closes leveraged positions on pool-share collateral
//! in one atomic call, using a flashloan to front the borrowed leg.
//!
//! Layout:
//! - `routing`: swap path model, ABI codec, executor, multi-path aggregation
//! - `sizing`: flashloan principal, minimum outputs, safe withdrawals
//! - `engine`: the per-collateral swapper and its flashloan state machine
//! - `access` / `registry`: whitelists and the collateral → swapper map
//! - `externals`: seams for tokens, ledger, oracle, vaults, pools, lender
//! - `sandbox`: in-memory implementations of those seams

pub mod access;
pub mod config;
pub mod engine;
pub mod errors;
pub mod externals;
pub mod registry;
pub mod routing;
pub mod sandbox;
pub mod sizing;
pub mod tokens;

pub use errors::{LeverageError, Result};
