//! Flashloan liquidity source

use alloy_primitives::{Address, U256};
use tracing::debug;

use crate::config::FlashLoanProvider;
use crate::errors::{LeverageError, Result};
use crate::externals::{FlashLender, FlashLoanReceiver, TokenBank};
use crate::sizing::{mul_div_up, PERCENTAGE_FACTOR};

/// Lends whatever its address holds, charging the provider's premium
#[derive(Debug, Clone)]
pub struct PoolFlashLender {
    address: Address,
    provider: FlashLoanProvider,
}

impl PoolFlashLender {
    pub fn new(address: Address, provider: FlashLoanProvider) -> Self {
        Self { address, provider }
    }

    pub fn provider(&self) -> FlashLoanProvider {
        self.provider
    }
}

impl FlashLender for PoolFlashLender {
    fn address(&self) -> Address {
        self.address
    }

    fn premium(&self, amount: U256) -> U256 {
        // Rounds up, saturates on overflow
        mul_div_up(
            amount,
            U256::from(self.provider.premium_bps()),
            U256::from(PERCENTAGE_FACTOR),
        )
        .unwrap_or(U256::MAX)
    }

    fn flash_loan(
        &mut self,
        tokens: &mut dyn TokenBank,
        receiver: &mut dyn FlashLoanReceiver,
        asset: Address,
        amount: U256,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(LeverageError::ZeroAmount("flashloan"));
        }
        let available = tokens.balance_of(asset, self.address);
        if available < amount {
            return Err(LeverageError::InsufficientFunds {
                what: "flashloan liquidity",
                asset,
                holder: self.address,
                needed: amount,
                available,
            });
        }

        let premium = self.premium(amount);
        let borrower = receiver.address();
        tokens.transfer(asset, self.address, borrower, amount)?;
        debug!("flashloan {} of {} to {} (premium {})", amount, asset, borrower, premium);

        receiver.on_flash_loan(tokens, self.address, asset, amount, premium)?;

        tokens.transfer(asset, borrower, self.address, amount + premium)?;
        debug!("flashloan settled by {}", borrower);
        Ok(())
    }
}
