//! Action Space
//!
//! Closed set of trading actions and their numeric ids.

use serde::{Deserialize, Serialize};

use crate::error::TraderError;

/// Number of discrete actions
pub const NUM_ACTIONS: usize = 3;

/// Discrete trading action
///
/// The numeric id of each variant is the column index of its value in the
/// estimator's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TradingAction {
    /// Do nothing. Always legal, used as the last-resort fallback.
    Hold = 0,
    /// Open a long position
    Buy = 1,
    /// Close the current position
    Sell = 2,
}

impl TradingAction {
    /// Convert from action index
    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Hold),
            1 => Some(Self::Buy),
            2 => Some(Self::Sell),
            _ => None,
        }
    }

    /// Convert to action index
    pub fn to_index(self) -> usize {
        self as usize
    }

    /// Get all possible actions
    pub fn all() -> &'static [TradingAction] {
        &[Self::Hold, Self::Buy, Self::Sell]
    }
}

impl Default for TradingAction {
    fn default() -> Self {
        Self::Hold
    }
}

impl TryFrom<usize> for TradingAction {
    type Error = TraderError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::from_index(index).ok_or(TraderError::InvalidAction(index))
    }
}

impl From<TradingAction> for usize {
    fn from(action: TradingAction) -> Self {
        action.to_index()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_index_roundtrip() {
        for action in TradingAction::all() {
            let recovered = TradingAction::from_index(action.to_index()).unwrap();
            assert_eq!(*action, recovered);
        }
        assert_eq!(TradingAction::all().len(), NUM_ACTIONS);
    }

    #[test]
    fn test_out_of_range_id_is_rejected() {
        assert!(TradingAction::from_index(NUM_ACTIONS).is_none());
        assert!(matches!(
            TradingAction::try_from(7),
            Err(TraderError::InvalidAction(7))
        ));
    }

    #[test]
    fn test_hold_is_default() {
        assert_eq!(TradingAction::default(), TradingAction::Hold);
        assert_eq!(usize::from(TradingAction::Hold), 0);
    }
}
