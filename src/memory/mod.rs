//! Experience Memory
//!
//! Replay memory for storing and sampling transitions.

pub mod replay_memory;

pub use replay_memory::ReplayMemory;
