//! Action Selection
//!
//! Exploration/exploitation policies over the valid-move set.

pub mod epsilon_greedy;

pub use epsilon_greedy::{EpsilonGreedyPolicy, PolicyConfig, QFunction};
