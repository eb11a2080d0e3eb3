//! Leverage Engine Errors
//!
//! Every failure surfaced to a caller carries a short, stable code.
//! Callers and tests match on `code()`, never on the message text.
//!
//! | Code | Meaning                                        |
//! |------|------------------------------------------------|
//! | 111  | collateral has no registered swapper           |
//! | 112  | zero collateral receipt-token address          |
//! | 113  | zero amount                                    |
//! | 114  | unsupported borrow / repay asset               |
//! | 115  | unexpected flashloan callback                  |
//! | 116  | malformed swap path                            |
//! | 117  | hop output below declared minimum              |
//! | 118  | caller or vault not whitelisted                |
//! | 119  | caller is not the owner                        |
//! | 120  | health factor would drop below 1               |
//! | 121  | insufficient balance or allowance              |
//! | 122  | parameter out of bounds / engine stopped       |
//! | 123  | receipt token does not match the collateral    |
//! | 124  | external collaborator failure                  |

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Failure classes. All of them are fatal to the enclosing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any external call
    InputValidation,
    /// Rejected before any value transfer
    AuthorizationDenied,
    /// A hop realized less than its declared minimum
    SlippageExceeded,
    /// The base ledger refused the resulting position
    SolvencyViolation,
    /// A collaborator (token, pool, vault, lender) failed on its own
    External,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::InputValidation => write!(f, "input-validation"),
            ErrorClass::AuthorizationDenied => write!(f, "authorization-denied"),
            ErrorClass::SlippageExceeded => write!(f, "slippage-exceeded"),
            ErrorClass::SolvencyViolation => write!(f, "solvency-violation"),
            ErrorClass::External => write!(f, "external"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeverageError {
    #[error("111: no swapper registered for collateral {0}")]
    UnsupportedCollateral(Address),

    #[error("112: collateral receipt token is the zero address")]
    ZeroReceiptToken,

    #[error("113: zero amount ({0})")]
    ZeroAmount(&'static str),

    #[error("114: asset {0} is not enabled for borrowing/repaying")]
    UnsupportedAsset(Address),

    #[error("115: unexpected flashloan callback: {0}")]
    UnexpectedFlashLoan(String),

    #[error("116: invalid swap path: {0}")]
    InvalidSwapPath(String),

    #[error("117: slippage exceeded on pool {pool}: minimum {minimum}, realized {realized}")]
    SlippageExceeded {
        pool: Address,
        minimum: U256,
        realized: U256,
    },

    #[error("118: vault {vault} does not whitelist {subject}")]
    NotWhitelisted { vault: Address, subject: Address },

    #[error("119: {0} is not the owner")]
    NotOwner(Address),

    #[error("120: health factor {health_factor} below 1e18 for {user}")]
    SolvencyViolation { user: Address, health_factor: U256 },

    #[error("121: insufficient {what} of {asset} for {holder}: need {needed}, have {available}")]
    InsufficientFunds {
        what: &'static str,
        asset: Address,
        holder: Address,
        needed: U256,
        available: U256,
    },

    #[error("122: invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("123: receipt token {0} does not belong to the collateral reserve")]
    ReceiptTokenMismatch(Address),

    #[error("124: {0}")]
    External(String),
}

impl LeverageError {
    /// Stable machine-checkable code
    pub fn code(&self) -> &'static str {
        match self {
            LeverageError::UnsupportedCollateral(_) => "111",
            LeverageError::ZeroReceiptToken => "112",
            LeverageError::ZeroAmount(_) => "113",
            LeverageError::UnsupportedAsset(_) => "114",
            LeverageError::UnexpectedFlashLoan(_) => "115",
            LeverageError::InvalidSwapPath(_) => "116",
            LeverageError::SlippageExceeded { .. } => "117",
            LeverageError::NotWhitelisted { .. } => "118",
            LeverageError::NotOwner(_) => "119",
            LeverageError::SolvencyViolation { .. } => "120",
            LeverageError::InsufficientFunds { .. } => "121",
            LeverageError::InvalidParameter(_) => "122",
            LeverageError::ReceiptTokenMismatch(_) => "123",
            LeverageError::External(_) => "124",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            LeverageError::UnsupportedCollateral(_)
            | LeverageError::ZeroReceiptToken
            | LeverageError::ZeroAmount(_)
            | LeverageError::UnsupportedAsset(_)
            | LeverageError::InvalidSwapPath(_)
            | LeverageError::InvalidParameter(_)
            | LeverageError::ReceiptTokenMismatch(_) => ErrorClass::InputValidation,
            LeverageError::NotWhitelisted { .. } | LeverageError::NotOwner(_) => {
                ErrorClass::AuthorizationDenied
            }
            LeverageError::SlippageExceeded { .. } => ErrorClass::SlippageExceeded,
            LeverageError::SolvencyViolation { .. } => ErrorClass::SolvencyViolation,
            LeverageError::UnexpectedFlashLoan(_)
            | LeverageError::InsufficientFunds { .. }
            | LeverageError::External(_) => ErrorClass::External,
        }
    }
}

pub type Result<T, E = LeverageError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(LeverageError::ZeroReceiptToken.code(), "112");
        assert_eq!(LeverageError::ZeroAmount("principal").code(), "113");
        assert_eq!(LeverageError::UnsupportedAsset(Address::ZERO).code(), "114");
        let denied = LeverageError::NotWhitelisted {
            vault: Address::ZERO,
            subject: Address::ZERO,
        };
        assert_eq!(denied.code(), "118");
        assert_eq!(denied.class(), ErrorClass::AuthorizationDenied);
    }

    #[test]
    fn test_message_leads_with_code() {
        let err = LeverageError::ZeroAmount("repay amount");
        assert!(err.to_string().starts_with("113:"));
    }
}
