//! Flashloan flow state machine
//!
//! ENTER: Idle → Borrowed → Swapped → Deposited → Repaid → Idle
//! EXIT:  Idle → Borrowed → DebtRepaid → Withdrawn → Swapped → Repaid → Idle
//!
//! Only the success path is ever recorded: a failed call reverts with the
//! enclosing transaction and leaves no trail.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{LeverageError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowState {
    Idle,
    /// Flashloan principal received
    Borrowed,
    Swapped,
    /// Collateral credited to the borrower in the ledger
    Deposited,
    /// Borrower's ledger debt paid down (exit only)
    DebtRepaid,
    /// Collateral released from the vault (exit only)
    Withdrawn,
    /// Flashloan settled
    Repaid,
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlowState::Idle => "Idle",
            FlowState::Borrowed => "Borrowed",
            FlowState::Swapped => "Swapped",
            FlowState::Deposited => "Deposited",
            FlowState::DebtRepaid => "DebtRepaid",
            FlowState::Withdrawn => "Withdrawn",
            FlowState::Repaid => "Repaid",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowDirection {
    Enter,
    Exit,
}

impl FlowDirection {
    fn sequence(&self) -> &'static [FlowState] {
        use FlowState::*;
        match self {
            FlowDirection::Enter => &[Idle, Borrowed, Swapped, Deposited, Repaid, Idle],
            FlowDirection::Exit => &[Idle, Borrowed, DebtRepaid, Withdrawn, Swapped, Repaid, Idle],
        }
    }
}

/// States visited so far by one flashloan call
#[derive(Debug, Clone)]
pub struct FlowTrail {
    direction: FlowDirection,
    visited: Vec<FlowState>,
}

impl FlowTrail {
    pub fn new(direction: FlowDirection) -> Self {
        Self {
            direction,
            visited: vec![FlowState::Idle],
        }
    }

    pub fn current(&self) -> FlowState {
        self.visited.last().copied().unwrap_or(FlowState::Idle)
    }

    /// True once the flow has left `Idle` and come back
    pub fn is_complete(&self) -> bool {
        self.visited.len() == self.direction.sequence().len()
    }

    pub fn advance(&mut self, next: FlowState) -> Result<()> {
        let expected = self.direction.sequence().get(self.visited.len()).copied();
        if expected != Some(next) {
            return Err(LeverageError::UnexpectedFlashLoan(format!(
                "{:?} flow cannot move from {} to {}",
                self.direction,
                self.current(),
                next
            )));
        }
        debug!("{:?} flow: {} -> {}", self.direction, self.current(), next);
        self.visited.push(next);
        Ok(())
    }

    pub fn states(&self) -> &[FlowState] {
        &self.visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_sequence_completes() {
        let mut trail = FlowTrail::new(FlowDirection::Enter);
        for state in [
            FlowState::Borrowed,
            FlowState::Swapped,
            FlowState::Deposited,
            FlowState::Repaid,
            FlowState::Idle,
        ] {
            trail.advance(state).unwrap();
        }
        assert!(trail.is_complete());
        assert_eq!(trail.current(), FlowState::Idle);
    }

    #[test]
    fn test_skipping_a_state_rejected() {
        let mut trail = FlowTrail::new(FlowDirection::Exit);
        trail.advance(FlowState::Borrowed).unwrap();
        let err = trail.advance(FlowState::Withdrawn).unwrap_err();
        assert_eq!(err.code(), "115");
        assert_eq!(trail.current(), FlowState::Borrowed);
    }

    #[test]
    fn test_second_callback_rejected() {
        let mut trail = FlowTrail::new(FlowDirection::Enter);
        trail.advance(FlowState::Borrowed).unwrap();
        assert!(trail.advance(FlowState::Borrowed).is_err());
        assert!(!trail.is_complete());
    }
}
