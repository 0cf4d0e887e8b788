//! Environments
//!
//! The environment capability consumed by the trainer, plus a simulated
//! market used to run training end to end.

mod market;
mod trading;

pub use market::{MarketConfig, MarketState, SimulatedMarket};
pub use trading::{TradingEnvConfig, TradingEnvironment, TradingInfo};

use crate::core::TradingAction;
use crate::error::Result;

/// Result of taking a step in the environment
#[derive(Debug, Clone)]
pub struct StepResult<I> {
    /// New observation after action
    pub observation: Vec<f32>,
    /// Reward signal
    pub reward: f32,
    /// Whether episode is done
    pub done: bool,
    /// Environment-specific diagnostics
    pub info: I,
}

/// Gym-like interface for an episodic trading simulator
pub trait Environment {
    /// Opaque per-step diagnostics
    type Info;

    /// Start a new episode and return its initial observation
    fn reset(&mut self) -> Result<Vec<f32>>;

    /// Execute `action`
    fn step(&mut self, action: TradingAction) -> Result<StepResult<Self::Info>>;

    /// Actions legal in the current state
    ///
    /// Must be non-empty while the episode has not terminated.
    fn valid_moves(&self) -> Vec<TradingAction>;
}
