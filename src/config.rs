//! Engine configuration
//!
//! Sizing multipliers, slippage and leverage limits, the flashloan provider
//! and the position log. Loaded from the environment (with a `.env` file)
//! or a TOML file, and validated before any swapper is built from it.

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::sizing::{SizingPolicy, PERCENTAGE_FACTOR};

// ============================================
// FLASH LOAN PROVIDER
// ============================================

/// Flashloan liquidity source and its premium
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashLoanProvider {
    /// Aave V3 - 0.05% premium
    #[default]
    AaveV3,

    /// Balancer V2 - no premium
    BalancerV2,
}

impl FlashLoanProvider {
    pub fn premium_bps(&self) -> u64 {
        match self {
            FlashLoanProvider::AaveV3 => 5,
            FlashLoanProvider::BalancerV2 => 0,
        }
    }
}

impl std::fmt::Display for FlashLoanProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlashLoanProvider::AaveV3 => write!(f, "Aave V3 (0.05% fee)"),
            FlashLoanProvider::BalancerV2 => write!(f, "Balancer V2 (0% fee)"),
        }
    }
}

// ============================================
// ENGINE CONFIGURATION
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // ========== Sizing ==========
    /// Multiplier on the raw flashloan principal (10000 = 1x)
    pub safety_multiplier_bps: u64,

    /// Extra flashloan headroom for premium and swap loss
    pub flashloan_fee_buffer_bps: u64,

    // ========== Limits ==========
    /// Slippage applied to oracle-derived minimum outputs
    pub default_slippage_bps: u64,

    /// Largest slippage a caller may request
    pub max_slippage_bps: u64,

    /// Largest leverage a caller may request (10000 = 1x)
    pub max_leverage_bps: u64,

    /// Round cap for the iterative variants
    pub max_iterations: u32,

    /// Largest per-round ltv the iterative entry accepts
    pub max_ltv_bps: u64,

    // ========== Flash Loan ==========
    pub flash_loan_provider: FlashLoanProvider,

    /// Referral code forwarded to the ledger
    pub referral_code: u16,

    // ========== Safety ==========
    /// Kill switch: every entry point fails while set
    pub emergency_stop: bool,

    // ========== Logging ==========
    /// Append one JSON line per executed call
    pub position_log: bool,

    pub position_log_path: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl EngineConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            safety_multiplier_bps: env_or("SAFETY_MULTIPLIER_BPS", defaults.safety_multiplier_bps),
            flashloan_fee_buffer_bps: env_or("FLASHLOAN_FEE_BUFFER_BPS", defaults.flashloan_fee_buffer_bps),
            default_slippage_bps: env_or("DEFAULT_SLIPPAGE_BPS", defaults.default_slippage_bps),
            max_slippage_bps: env_or("MAX_SLIPPAGE_BPS", defaults.max_slippage_bps),
            max_leverage_bps: env_or("MAX_LEVERAGE_BPS", defaults.max_leverage_bps),
            max_iterations: env_or("MAX_ITERATIONS", defaults.max_iterations),
            max_ltv_bps: env_or("MAX_LTV_BPS", defaults.max_ltv_bps),
            flash_loan_provider: match env::var("FLASH_LOAN_PROVIDER")
                .unwrap_or_else(|_| "aave".to_string())
                .to_lowercase()
                .as_str()
            {
                "balancer" | "balancerv2" => FlashLoanProvider::BalancerV2,
                _ => FlashLoanProvider::AaveV3,
            },
            referral_code: env_or("REFERRAL_CODE", defaults.referral_code),
            emergency_stop: env_or("EMERGENCY_STOP", defaults.emergency_stop),
            position_log: env_or("POSITION_LOG", defaults.position_log),
            position_log_path: env::var("POSITION_LOG_PATH").unwrap_or(defaults.position_log_path),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn sizing_policy(&self) -> SizingPolicy {
        SizingPolicy {
            safety_multiplier_bps: self.safety_multiplier_bps,
            fee_buffer_bps: self.flashloan_fee_buffer_bps,
        }
    }

    /// Validate configuration before building swappers from it
    pub fn validate(&self) -> Result<()> {
        if self.safety_multiplier_bps < PERCENTAGE_FACTOR || self.safety_multiplier_bps > 2 * PERCENTAGE_FACTOR {
            return Err(eyre::eyre!(
                "SAFETY_MULTIPLIER_BPS must be between 10000 and 20000 (currently {})",
                self.safety_multiplier_bps
            ));
        }
        if self.flashloan_fee_buffer_bps > 1_000 {
            return Err(eyre::eyre!(
                "FLASHLOAN_FEE_BUFFER_BPS above 10% (currently {})",
                self.flashloan_fee_buffer_bps
            ));
        }
        if self.max_slippage_bps >= PERCENTAGE_FACTOR {
            return Err(eyre::eyre!("MAX_SLIPPAGE_BPS must be below 10000"));
        }
        if self.default_slippage_bps > self.max_slippage_bps {
            return Err(eyre::eyre!(
                "DEFAULT_SLIPPAGE_BPS ({}) exceeds MAX_SLIPPAGE_BPS ({})",
                self.default_slippage_bps,
                self.max_slippage_bps
            ));
        }
        if self.max_leverage_bps == 0 {
            return Err(eyre::eyre!("MAX_LEVERAGE_BPS must be positive"));
        }
        if self.max_iterations == 0 || self.max_iterations > 32 {
            return Err(eyre::eyre!(
                "MAX_ITERATIONS must be between 1 and 32 (currently {})",
                self.max_iterations
            ));
        }
        if self.max_ltv_bps == 0 || self.max_ltv_bps >= PERCENTAGE_FACTOR {
            return Err(eyre::eyre!(
                "MAX_LTV_BPS must be between 1 and 9999 (currently {})",
                self.max_ltv_bps
            ));
        }
        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              LEVERAGE ENGINE - CONFIGURATION               ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SIZING                                                     ║");
        println!("║ • Safety Multiplier: {:>33} bps ║", self.safety_multiplier_bps);
        println!("║ • Fee Buffer:        {:>33} bps ║", self.flashloan_fee_buffer_bps);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ LIMITS                                                     ║");
        println!("║ • Default Slippage:  {:>33} bps ║", self.default_slippage_bps);
        println!("║ • Max Slippage:      {:>33} bps ║", self.max_slippage_bps);
        println!("║ • Max Leverage:      {:>33} bps ║", self.max_leverage_bps);
        println!("║ • Max Iterations:    {:^38} ║", self.max_iterations);
        println!("║ • Max LTV:           {:>33} bps ║", self.max_ltv_bps);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ FLASH LOAN                                                 ║");
        println!("║ • Provider:          {:^38} ║", self.flash_loan_provider);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SAFETY                                                     ║");
        println!("║ • Emergency Stop:    {:^38} ║",
            if self.emergency_stop { "🛑 ACTIVE" } else { "✓ Inactive" }
        );
        println!("║ • Position Log:      {:^38} ║",
            if self.position_log { "✓ Enabled" } else { "✗ Disabled" }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            safety_multiplier_bps: PERCENTAGE_FACTOR,
            flashloan_fee_buffer_bps: 0,
            default_slippage_bps: 50,
            max_slippage_bps: 1_000,
            max_leverage_bps: 90_000,
            max_iterations: 10,
            max_ltv_bps: 9_000,
            flash_loan_provider: FlashLoanProvider::AaveV3,
            referral_code: 0,
            emergency_stop: false,
            position_log: false,
            position_log_path: "./logs/positions.log".to_string(),
        }
    }
}

// ============================================
// POSITION LOGGER
// ============================================

/// One executed leverage call, as appended to the position log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLog {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub user: String,
    pub collateral: String,
    pub borrow_asset: String,
    pub flashloan_amount: U256,
    pub collateral_deposited: U256,
    pub collateral_returned: U256,
    pub debt_after: U256,
    pub health_factor: U256,
}

impl PositionLog {
    /// Append this log to a file
    pub fn append_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)?;

        Ok(())
    }
}

// ============================================
// TESTS
// ============================================
