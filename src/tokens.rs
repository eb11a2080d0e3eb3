//! Asset catalogue for the leverage engine
//!
//! Covers:
//! - Borrowable stablecoins (USDC, DAI) and the FRAX constituent
//! - Pool-share collaterals (Curve FRAXBP, a Balancer USDC/DAI share)
//! - Vault-internal wrappers the ledger actually holds
//! - Ledger receipt tokens
//!
//! Public mainnet addresses are used where the asset exists on mainnet;
//! wrapper and receipt tokens use fixed local addresses.

use alloy_primitives::{address, Address, U256};
use std::collections::HashMap;

/// One tracked asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub symbol: &'static str,
    pub address: Address,
    pub decimals: u8,
    pub category: TokenCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCategory {
    /// Borrowable or swappable stablecoin
    Stable,
    /// Share token of a liquidity pool, used as collateral
    PoolShare,
    /// Wrapper a vault deposits into the ledger
    VaultInternal,
    /// Ledger-issued receipt
    Receipt,
}

// ============================================
// ADDRESSES
// ============================================

pub const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
pub const DAI: Address = address!("6B175474E89094C44Da98b954EedcdeCB5BE3830");
pub const FRAX: Address = address!("853d955aCEf822Db058eb8505911ED77F175b99e");

/// Curve FRAX/USDC pool share
pub const CRV_FRAX: Address = address!("3175Df0976dFA876431C2E9eE6Bc45b65d3473CC");
/// Balancer 50USDC-50DAI pool share
pub const BPT_USDC_DAI: Address = address!("00000000000000000000000000000000000b9701");

pub const VAULT_CRV_FRAX: Address = address!("00000000000000000000000000000000000a1101");
pub const VAULT_BPT_USDC_DAI: Address = address!("00000000000000000000000000000000000a1102");

pub const RECEIPT_USDC: Address = address!("00000000000000000000000000000000000a7101");
pub const RECEIPT_DAI: Address = address!("00000000000000000000000000000000000a7102");
pub const RECEIPT_CRV_FRAX: Address = address!("00000000000000000000000000000000000a7103");
pub const RECEIPT_BPT_USDC_DAI: Address = address!("00000000000000000000000000000000000a7104");

// ============================================
// CATALOGUE
// ============================================

pub fn stable_tokens() -> Vec<Token> {
    vec![
        Token { symbol: "USDC", address: USDC, decimals: 6, category: TokenCategory::Stable },
        Token { symbol: "DAI", address: DAI, decimals: 18, category: TokenCategory::Stable },
        Token { symbol: "FRAX", address: FRAX, decimals: 18, category: TokenCategory::Stable },
    ]
}

pub fn collateral_tokens() -> Vec<Token> {
    vec![
        Token { symbol: "crvFRAX", address: CRV_FRAX, decimals: 18, category: TokenCategory::PoolShare },
        Token { symbol: "B-50USDC-50DAI", address: BPT_USDC_DAI, decimals: 18, category: TokenCategory::PoolShare },
    ]
}

pub fn vault_internal_tokens() -> Vec<Token> {
    vec![
        Token { symbol: "vcrvFRAX", address: VAULT_CRV_FRAX, decimals: 18, category: TokenCategory::VaultInternal },
        Token { symbol: "vB-50USDC-50DAI", address: VAULT_BPT_USDC_DAI, decimals: 18, category: TokenCategory::VaultInternal },
    ]
}

pub fn receipt_tokens() -> Vec<Token> {
    vec![
        Token { symbol: "sUSDC", address: RECEIPT_USDC, decimals: 6, category: TokenCategory::Receipt },
        Token { symbol: "sDAI", address: RECEIPT_DAI, decimals: 18, category: TokenCategory::Receipt },
        Token { symbol: "svcrvFRAX", address: RECEIPT_CRV_FRAX, decimals: 18, category: TokenCategory::Receipt },
        Token { symbol: "svB-50USDC-50DAI", address: RECEIPT_BPT_USDC_DAI, decimals: 18, category: TokenCategory::Receipt },
    ]
}

pub fn all_tokens() -> Vec<Token> {
    let mut all = stable_tokens();
    all.extend(collateral_tokens());
    all.extend(vault_internal_tokens());
    all.extend(receipt_tokens());
    all
}

/// Build a symbol lookup map
pub fn build_symbol_map() -> HashMap<Address, &'static str> {
    all_tokens().into_iter().map(|t| (t.address, t.symbol)).collect()
}

pub fn get_token(address: &Address) -> Option<Token> {
    all_tokens().into_iter().find(|t| t.address == *address)
}

/// Case-insensitive symbol lookup
pub fn get_token_by_symbol(symbol: &str) -> Option<Token> {
    all_tokens().into_iter().find(|t| t.symbol.eq_ignore_ascii_case(symbol))
}

/// Symbol if known, shortened hex otherwise
pub fn label(address: &Address) -> String {
    match get_token(address) {
        Some(token) => token.symbol.to_string(),
        None => {
            let hex = format!("{:?}", address);
            format!("{}…{}", &hex[..6], &hex[hex.len() - 4..])
        }
    }
}

/// Renders `amount` with `decimals` as a decimal string, trimmed to 6 places
pub fn format_amount(amount: U256, decimals: u8) -> String {
    let unit = U256::from(10u64).pow(U256::from(decimals));
    let whole = amount / unit;
    let frac = amount % unit;
    if frac.is_zero() {
        return whole.to_string();
    }

    let digits = format!("{:0>width$}", frac.to_string(), width = decimals as usize);
    let shown: String = digits.chars().take(6).collect();
    let shown = shown.trim_end_matches('0');
    if shown.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, shown)
    }
}

/// Parses a decimal string (`"1250.5"`) into raw units
pub fn parse_amount(text: &str, decimals: u8) -> Option<U256> {
    let (whole, frac) = match text.trim().split_once('.') {
        Some((w, f)) => (w, f),
        None => (text.trim(), ""),
    };
    if frac.len() > decimals as usize {
        return None;
    }
    let unit = U256::from(10u64).pow(U256::from(decimals));
    let whole: U256 = if whole.is_empty() { U256::ZERO } else { whole.parse().ok()? };
    let frac_units: U256 = if frac.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{:0<width$}", frac, width = decimals as usize);
        padded.parse().ok()?
    };
    whole.checked_mul(unit)?.checked_add(frac_units)
}
