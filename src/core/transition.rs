//! Transitions
//!
//! One recorded interaction step, and the column-wise view of a sampled batch.

use serde::{Deserialize, Serialize};

use crate::core::action::TradingAction;
use crate::error::{Result, TraderError};

/// A single transition in the environment
///
/// `next_state` is `None` exactly when the episode terminated on this step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    state: Vec<f32>,
    action: TradingAction,
    next_state: Option<Vec<f32>>,
    reward: f32,
}

impl Transition {
    /// Create a new transition
    pub fn new(
        state: Vec<f32>,
        action: TradingAction,
        next_state: Option<Vec<f32>>,
        reward: f32,
    ) -> Self {
        Self {
            state,
            action,
            next_state,
            reward,
        }
    }

    pub fn state(&self) -> &[f32] {
        &self.state
    }

    pub fn action(&self) -> TradingAction {
        self.action
    }

    pub fn next_state(&self) -> Option<&[f32]> {
        self.next_state.as_deref()
    }

    pub fn reward(&self) -> f32 {
        self.reward
    }

    /// Whether the episode ended on this step
    pub fn is_terminal(&self) -> bool {
        self.next_state.is_none()
    }
}

/// Column-wise partition of a batch of transitions
///
/// States, actions and rewards cover the whole batch. Next states are stacked
/// only for non-terminal entries; `non_final_indices[k]` is the batch row the
/// k-th stacked next state belongs to.
#[derive(Debug, Clone)]
pub struct TransitionBatch {
    /// Row-major states [len, state_dim]
    pub states: Vec<f32>,
    /// Action ids [len]
    pub actions: Vec<i32>,
    /// Rewards [len]
    pub rewards: Vec<f32>,
    /// True where the transition has a next state
    pub non_final_mask: Vec<bool>,
    /// Batch rows of the stacked next states
    pub non_final_indices: Vec<usize>,
    /// Row-major next states [non_final_indices.len(), state_dim]
    pub non_final_next_states: Vec<f32>,
    /// Width of every state vector
    pub state_dim: usize,
}

impl TransitionBatch {
    /// Transpose a batch of transitions into stacked columns
    pub fn from_transitions(transitions: &[Transition]) -> Result<Self> {
        let first = transitions.first().ok_or(TraderError::EmptyBatch)?;
        let state_dim = first.state.len();
        let len = transitions.len();

        let mut states = Vec::with_capacity(len * state_dim);
        let mut actions = Vec::with_capacity(len);
        let mut rewards = Vec::with_capacity(len);
        let mut non_final_mask = Vec::with_capacity(len);
        let mut non_final_indices = Vec::new();
        let mut non_final_next_states = Vec::new();

        for (row, transition) in transitions.iter().enumerate() {
            check_width(state_dim, transition.state.len())?;
            states.extend_from_slice(&transition.state);
            actions.push(transition.action.to_index() as i32);
            rewards.push(transition.reward);

            match &transition.next_state {
                Some(next) => {
                    check_width(state_dim, next.len())?;
                    non_final_mask.push(true);
                    non_final_indices.push(row);
                    non_final_next_states.extend_from_slice(next);
                }
                None => non_final_mask.push(false),
            }
        }

        Ok(Self {
            states,
            actions,
            rewards,
            non_final_mask,
            non_final_indices,
            non_final_next_states,
            state_dim,
        })
    }

    /// Number of transitions in the batch
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Number of transitions with a next state
    pub fn non_final_len(&self) -> usize {
        self.non_final_indices.len()
    }
}

fn check_width(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(TraderError::DimensionMismatch { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_transition_has_no_next_state() {
        let t = Transition::new(vec![1.0, 2.0], TradingAction::Sell, None, 5.0);
        assert!(t.is_terminal());
        assert_eq!(t.next_state(), None);
        assert_eq!(t.reward(), 5.0);
    }

    #[test]
    fn test_batch_partition() {
        let batch = TransitionBatch::from_transitions(&[
            Transition::new(vec![1.0, 0.0], TradingAction::Buy, Some(vec![0.0, 1.0]), 1.0),
            Transition::new(vec![0.0, 1.0], TradingAction::Sell, None, 5.0),
            Transition::new(vec![2.0, 2.0], TradingAction::Hold, Some(vec![3.0, 3.0]), -1.0),
        ])
        .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.state_dim, 2);
        assert_eq!(batch.states, vec![1.0, 0.0, 0.0, 1.0, 2.0, 2.0]);
        assert_eq!(batch.actions, vec![1, 2, 0]);
        assert_eq!(batch.rewards, vec![1.0, 5.0, -1.0]);
        assert_eq!(batch.non_final_mask, vec![true, false, true]);
        assert_eq!(batch.non_final_indices, vec![0, 2]);
        assert_eq!(batch.non_final_next_states, vec![0.0, 1.0, 3.0, 3.0]);
    }

    #[test]
    fn test_batch_rejects_ragged_states() {
        let result = TransitionBatch::from_transitions(&[
            Transition::new(vec![1.0, 0.0], TradingAction::Buy, None, 1.0),
            Transition::new(vec![0.0], TradingAction::Sell, None, 5.0),
        ]);
        assert!(matches!(
            result,
            Err(TraderError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        assert!(matches!(
            TransitionBatch::from_transitions(&[]),
            Err(TraderError::EmptyBatch)
        ));
    }
}
