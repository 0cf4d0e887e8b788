//! Core RL abstractions
//!
//! Fundamental types for actions and recorded interaction steps.

pub mod action;
pub mod transition;

pub use action::{TradingAction, NUM_ACTIONS};
pub use transition::{Transition, TransitionBatch};
