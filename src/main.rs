//! Leverage Simulator
//!
//! Runs the leverage engine against the in-memory sandbox.
//!
//! Run with:
//!   cargo run -- simulate --collateral crvFRAX --asset USDC --principal 1000 --leverage-bps 20000
//!   cargo run -- simulate --steps 10,20,30
//!   cargo run -- simulate --iterative --iterations 3 --ltv-bps 7000
//!   cargo run -- encode-route --collateral B-50USDC-50DAI --asset USDC
//!   cargo run -- decode-route 0x...
//!   cargo run -- show-config

use alloy_primitives::U256;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leverage_engine::config::EngineConfig;
use leverage_engine::engine::{
    EnterParams, ExecutionReport, IterativeEnterParams, IterativeLeaveParams, LeaveParams, Position, WithdrawParams,
};
use leverage_engine::routing::{decode_swap_info_hex, encode_swap_info_hex};
use leverage_engine::sandbox::{Deployment, ALICE};
use leverage_engine::tokens::{self, Token};

#[derive(Parser)]
#[command(name = "leverage-sim")]
#[command(about = "Flashloan leverage engine sandbox")]
struct Cli {
    /// TOML config file; environment / .env when absent
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enter a position, then exit it in steps
    Simulate {
        #[arg(long, default_value = "crvFRAX")]
        collateral: String,

        /// Borrow / repay asset
        #[arg(long, default_value = "USDC")]
        asset: String,

        /// Principal in whole collateral units
        #[arg(long, default_value = "1000")]
        principal: String,

        #[arg(long, default_value = "20000")]
        leverage_bps: u64,

        #[arg(long, default_value = "30")]
        slippage_bps: u64,

        /// Partial exits as percentages of the opening position; the rest is closed at the end
        #[arg(long, value_delimiter = ',')]
        steps: Vec<u64>,

        /// Use the loop variants instead of a flashloan
        #[arg(long, default_value = "false")]
        iterative: bool,

        #[arg(long, default_value = "3")]
        iterations: u32,

        #[arg(long, default_value = "7000")]
        ltv_bps: u64,
    },

    /// Print the ABI-encoded default route of a swapper
    EncodeRoute {
        #[arg(long, default_value = "crvFRAX")]
        collateral: String,

        #[arg(long, default_value = "USDC")]
        asset: String,
    },

    /// Decode an ABI-encoded route to JSON
    DecodeRoute {
        /// Hex, with or without 0x
        data: String,
    },

    /// Show the engine configuration
    ShowConfig,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" ⚖  LEVERAGE SIM - Flashloan Leverage Engine Sandbox").cyan().bold()
    );
    println!(
        "{}",
        style("    Curve | Balancer | Uniswap V2 | Aave-style ledger").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn token(symbol: &str) -> Result<Token> {
    tokens::get_token_by_symbol(symbol).ok_or_else(|| eyre!("unknown token {}", symbol))
}

fn load_config(path: Option<&str>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env()?,
    };
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e);
    }
    Ok(config)
}

fn print_report(report: &ExecutionReport, collateral: &Token, asset: &Token) {
    println!(
        "  {} {}",
        style("✓").green().bold(),
        style(report.operation.to_string()).bold()
    );
    if !report.flashloan_amount.is_zero() {
        println!(
            "    flashloan:  {} {} (premium {})",
            tokens::format_amount(report.flashloan_amount, asset.decimals),
            asset.symbol,
            tokens::format_amount(report.flashloan_premium, asset.decimals)
        );
    }
    if report.rounds > 0 {
        println!("    rounds:     {}", report.rounds);
    }
    println!(
        "    collateral: +{} / -{} {}",
        tokens::format_amount(report.collateral_deposited, collateral.decimals),
        tokens::format_amount(report.collateral_withdrawn, collateral.decimals),
        collateral.symbol
    );
    println!(
        "    debt:       +{} / -{} {}",
        tokens::format_amount(report.debt_borrowed, asset.decimals),
        tokens::format_amount(report.debt_repaid, asset.decimals),
        asset.symbol
    );
    for (swept, amount) in &report.swept {
        let decimals = tokens::get_token(swept).map(|t| t.decimals).unwrap_or(18);
        println!(
            "    returned:   {} {}",
            tokens::format_amount(*amount, decimals),
            tokens::label(swept)
        );
    }
    let trail: Vec<String> = report.trail.iter().map(|s| s.to_string()).collect();
    if !trail.is_empty() {
        println!("    flow:       {}", style(trail.join(" → ")).dim());
    }
}

fn print_position(position: &Position, collateral: &Token, asset: &Token) {
    let hf = if position.health_factor == U256::MAX {
        "∞".to_string()
    } else {
        tokens::format_amount(position.health_factor, 18)
    };
    let leverage = if position.leverage_bps == U256::MAX {
        "∞".to_string()
    } else {
        tokens::format_amount(position.leverage_bps, 4)
    };
    println!(
        "    position:   {} {} / {} {} debt, leverage {}x, hf {}",
        tokens::format_amount(position.collateral_amount, collateral.decimals),
        collateral.symbol,
        tokens::format_amount(position.debt_amount, asset.decimals),
        asset.symbol,
        leverage,
        style(hf).yellow()
    );
}

#[allow(clippy::too_many_arguments)]
fn simulate(
    config: EngineConfig,
    collateral: &str,
    asset: &str,
    principal: &str,
    leverage_bps: u64,
    slippage_bps: u64,
    steps: &[u64],
    iterative: bool,
    iterations: u32,
    ltv_bps: u64,
) -> Result<()> {
    let collateral = token(collateral)?;
    let asset = token(asset)?;
    let principal =
        tokens::parse_amount(principal, collateral.decimals).ok_or_else(|| eyre!("bad principal {}", principal))?;
    if steps.iter().sum::<u64>() >= 100 {
        return Err(eyre!("partial steps must leave something to close"));
    }

    let mut deployment = Deployment::new(config)?;
    deployment.authorize_swapper(ALICE, collateral.address)?;
    let start = deployment.balance(collateral.address, ALICE);
    let receipt_token = deployment.receipt_token(collateral.address)?;
    let route = deployment.route(collateral.address, asset.address)?;

    println!("{}", style("═══ ENTER ═══").blue().bold());
    let report = if iterative {
        let params = IterativeEnterParams {
            principal,
            iterations,
            ltv_bps,
            borrow_asset: asset.address,
        };
        deployment.enter_iterative(ALICE, collateral.address, &params)?
    } else {
        let params = EnterParams {
            principal,
            leverage_bps,
            borrow_asset: asset.address,
            referral_code: deployment.config.referral_code,
            swap_info: route.clone(),
        };
        deployment.enter_with_flashloan(ALICE, collateral.address, &params)?
    };
    print_report(&report, &collateral, &asset);
    print_position(&deployment.position(ALICE, collateral.address, asset.address)?, &collateral, &asset);

    let opening_debt = deployment.debt(asset.address, ALICE);
    for pct in steps {
        println!();
        println!("{}", style(format!("═══ EXIT {}% ═══", pct)).blue().bold());
        let params = WithdrawParams {
            repay_amount: opening_debt * U256::from(*pct) / U256::from(100u64),
            withdraw_amount: principal * U256::from(*pct) / U256::from(100u64),
            slippage_bps,
            repay_asset: asset.address,
            receipt_token,
            referral_code: deployment.config.referral_code,
            swap_info: route.clone(),
        };
        let report = deployment.withdraw_with_flashloan(ALICE, collateral.address, &params)?;
        print_report(&report, &collateral, &asset);
        print_position(&deployment.position(ALICE, collateral.address, asset.address)?, &collateral, &asset);
    }

    println!();
    println!("{}", style("═══ CLOSE ═══").blue().bold());
    let report = if iterative {
        let params = IterativeLeaveParams {
            withdraw_amount: U256::MAX,
            slippage_bps,
            iterations: deployment.config.max_iterations,
            repay_asset: asset.address,
            receipt_token,
        };
        deployment.leave_iterative(ALICE, collateral.address, &params)?
    } else {
        let params = LeaveParams {
            slippage_bps,
            repay_asset: asset.address,
            receipt_token,
            referral_code: deployment.config.referral_code,
            swap_info: route,
        };
        deployment.leave_with_flashloan(ALICE, collateral.address, &params)?
    };
    print_report(&report, &collateral, &asset);

    let end = deployment.balance(collateral.address, ALICE);
    let lost = start.saturating_sub(end);
    println!();
    println!(
        "{} {} {} returned of {} ({} lost to fees and slippage, plus {} {} swept)",
        style("Result:").green().bold(),
        tokens::format_amount(principal.saturating_sub(lost), collateral.decimals),
        collateral.symbol,
        tokens::format_amount(principal, collateral.decimals),
        tokens::format_amount(lost, collateral.decimals),
        tokens::format_amount(deployment.balance(asset.address, ALICE), asset.decimals),
        asset.symbol
    );
    info!("simulation finished");
    Ok(())
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("leverage_engine=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            collateral,
            asset,
            principal,
            leverage_bps,
            slippage_bps,
            steps,
            iterative,
            iterations,
            ltv_bps,
        } => {
            print_banner();
            let config = load_config(cli.config.as_deref())?;
            simulate(
                config,
                &collateral,
                &asset,
                &principal,
                leverage_bps,
                slippage_bps,
                &steps,
                iterative,
                iterations,
                ltv_bps,
            )?;
        }
        Commands::EncodeRoute { collateral, asset } => {
            let config = load_config(cli.config.as_deref())?;
            let deployment = Deployment::new(config)?;
            let route = deployment.route(token(&collateral)?.address, token(&asset)?.address)?;
            println!("{}", encode_swap_info_hex(&route)?);
        }
        Commands::DecodeRoute { data } => {
            let route = decode_swap_info_hex(&data)?;
            println!("{}", serde_json::to_string_pretty(&route)?);
        }
        Commands::ShowConfig => {
            let config = load_config(cli.config.as_deref())?;
            config.print_summary();
        }
    }

    Ok(())
}
