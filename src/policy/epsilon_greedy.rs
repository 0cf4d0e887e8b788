//! Epsilon-Greedy Policy
//!
//! Picks a random valid action with probability ε and the estimator's best
//! legal action otherwise. ε decays exponentially with completed episodes.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{TradingAction, NUM_ACTIONS};
use crate::error::{Result, TraderError};

/// Anything that can score every action for a single state
pub trait QFunction {
    /// Action values for `state`, one per action id
    fn q_values(&self, state: &[f32]) -> Result<Vec<f32>>;
}

/// Exploration schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Exploration rate before any episode has completed
    pub eps_start: f64,
    /// Asymptotic exploration rate
    pub eps_end: f64,
    /// Decay time constant, in episodes
    pub eps_decay: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            eps_start: 0.95,
            eps_end: 0.05,
            eps_decay: 200.0,
        }
    }
}

impl PolicyConfig {
    /// Validate the schedule parameters
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.eps_end >= 0.0) {
            errors.push("eps_end must be non-negative".to_string());
        }
        if !(self.eps_start > self.eps_end) {
            errors.push("eps_start must be greater than eps_end".to_string());
        }
        if self.eps_start > 1.0 {
            errors.push("eps_start must not exceed 1".to_string());
        }
        if !(self.eps_decay > 0.0) {
            errors.push("eps_decay must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Exploration rate after `episodes_done` completed episodes
    pub fn epsilon_at(&self, episodes_done: usize) -> f64 {
        self.eps_end
            + (self.eps_start - self.eps_end) * (-(episodes_done as f64) / self.eps_decay).exp()
    }
}

/// Epsilon-greedy action selector restricted to valid moves
#[derive(Debug)]
pub struct EpsilonGreedyPolicy<R = StdRng> {
    config: PolicyConfig,
    /// Completed episodes, advanced only through `next_episode`
    episodes_done: usize,
    rng: R,
}

impl EpsilonGreedyPolicy<StdRng> {
    /// Create a policy with a seeded generator
    pub fn with_seed(config: PolicyConfig, seed: u64) -> Result<Self> {
        Self::new(config, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> EpsilonGreedyPolicy<R> {
    /// Create a new policy
    pub fn new(config: PolicyConfig, rng: R) -> Result<Self> {
        config
            .validate()
            .map_err(|errors| TraderError::InvalidConfig(errors.join("; ")))?;

        Ok(Self {
            config,
            episodes_done: 0,
            rng,
        })
    }

    /// Current exploration probability
    pub fn epsilon(&self) -> f64 {
        self.config.epsilon_at(self.episodes_done)
    }

    /// Number of completed episodes seen by this policy
    pub fn episodes_done(&self) -> usize {
        self.episodes_done
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Mark one episode as completed
    pub fn next_episode(&mut self) {
        self.episodes_done += 1;
    }

    /// Choose an action for `state`
    ///
    /// Explores by sampling uniformly from `valid_moves` (the estimator is not
    /// queried), otherwise defers to [`Self::predict_action`].
    pub fn decide<Q: QFunction>(
        &mut self,
        q: &Q,
        state: &[f32],
        valid_moves: &[TradingAction],
    ) -> Result<TradingAction> {
        if valid_moves.is_empty() {
            return Err(TraderError::EmptyValidMoves);
        }

        let eps_threshold = self.epsilon();
        let sample: f64 = self.rng.gen();

        if sample > eps_threshold {
            self.predict_action(q, state, valid_moves)
        } else {
            valid_moves
                .choose(&mut self.rng)
                .copied()
                .ok_or(TraderError::EmptyValidMoves)
        }
    }

    /// Greedy action with a two-strikes-then-hold legality fallback
    ///
    /// Only the two best-scoring actions are considered. If neither is legal
    /// the result is [`TradingAction::Hold`].
    pub fn predict_action<Q: QFunction>(
        &self,
        q: &Q,
        state: &[f32],
        valid_moves: &[TradingAction],
    ) -> Result<TradingAction> {
        if valid_moves.is_empty() {
            return Err(TraderError::EmptyValidMoves);
        }

        let mut values = q.q_values(state)?;
        if values.len() != NUM_ACTIONS {
            return Err(TraderError::DimensionMismatch {
                expected: NUM_ACTIONS,
                actual: values.len(),
            });
        }

        let first_choice = argmax(&values);
        let first_action = TradingAction::try_from(first_choice)?;
        if valid_moves.contains(&first_action) {
            return Ok(first_action);
        }

        // The first action is not legal, so take the next best one.
        values[first_choice] = 0.0;
        let second_action = TradingAction::try_from(argmax(&values))?;
        if valid_moves.contains(&second_action) {
            return Ok(second_action);
        }

        debug!(
            first = ?first_action,
            second = ?second_action,
            "no legal action among top two choices, holding"
        );
        Ok(TradingAction::Hold)
    }
}

/// Index of the largest value, first one on ties
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = i;
        }
    }
    best
}
