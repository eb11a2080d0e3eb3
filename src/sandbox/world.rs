//! All-or-nothing transactions over the sandbox collaborators

use tracing::warn;

use super::{InMemoryBank, InMemoryLedger, PoolFlashLender, PoolSet, StaticOracle, VaultSet};
use crate::errors::Result;
use crate::externals::Externals;

/// Every external system, owned in one place so a call can be rolled back
#[derive(Debug, Clone)]
pub struct World {
    pub bank: InMemoryBank,
    pub ledger: InMemoryLedger,
    pub oracle: StaticOracle,
    pub vaults: VaultSet,
    pub pools: PoolSet,
    pub lender: PoolFlashLender,
}

impl World {
    pub fn externals(&mut self) -> Externals<'_> {
        Externals {
            tokens: &mut self.bank,
            ledger: &mut self.ledger,
            oracle: &self.oracle,
            vaults: &mut self.vaults,
            pools: &mut self.pools,
            lender: &mut self.lender,
        }
    }

    /// Runs `call` against the world; on `Err` every effect is undone
    pub fn transact<T>(&mut self, call: impl FnOnce(&mut Externals<'_>) -> Result<T>) -> Result<T> {
        let snapshot = self.clone();
        let outcome = call(&mut self.externals());
        if let Err(e) = &outcome {
            warn!("transaction reverted: {}", e);
            *self = snapshot;
        }
        outcome
    }
}
