//! Replay Memory
//!
//! Fixed-capacity experience pool for off-policy learning.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::Transition;
use crate::error::{Result, SampleError, TraderError};

/// Circular buffer of transitions with uniform sampling
///
/// Once full, each push overwrites the oldest stored transition. Sampling
/// draws without replacement and never removes anything.
#[derive(Debug)]
pub struct ReplayMemory<R = StdRng> {
    /// Storage for transitions
    buffer: Vec<Transition>,
    /// Maximum capacity
    capacity: usize,
    /// Next slot to write
    position: usize,
    rng: R,
}

impl ReplayMemory<StdRng> {
    /// Create a replay memory with a seeded generator
    pub fn with_seed(capacity: usize, seed: u64) -> Result<Self> {
        Self::new(capacity, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> ReplayMemory<R> {
    /// Create a new replay memory with given capacity
    pub fn new(capacity: usize, rng: R) -> Result<Self> {
        if capacity == 0 {
            return Err(TraderError::InvalidConfig(
                "replay memory capacity must be positive".to_string(),
            ));
        }

        Ok(Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
            position: 0,
            rng,
        })
    }

    /// Add a transition, overwriting the oldest one when full
    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(transition);
        } else {
            self.buffer[self.position] = transition;
        }
        self.position = (self.position + 1) % self.capacity;
    }

    /// Sample `batch_size` distinct transitions uniformly at random
    pub fn sample(&mut self, batch_size: usize) -> std::result::Result<Vec<Transition>, SampleError> {
        let available = self.buffer.len();
        if batch_size > available {
            return Err(SampleError::NotEnough {
                requested: batch_size,
                available,
            });
        }

        let indices = rand::seq::index::sample(&mut self.rng, available, batch_size);
        Ok(indices
            .into_iter()
            .map(|i| self.buffer[i].clone())
            .collect())
    }

    /// Get current number of transitions
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if memory is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check if memory has enough samples for a batch
    pub fn has_enough_samples(&self, min_samples: usize) -> bool {
        self.buffer.len() >= min_samples
    }

    /// Get memory capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f32 {
        self.buffer.len() as f32 / self.capacity as f32
    }

    /// Iterate over stored transitions in slot order
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TradingAction;
    use std::collections::HashSet;

    fn make_transition(reward: f32) -> Transition {
        Transition::new(vec![reward; 4], TradingAction::Hold, Some(vec![0.0; 4]), reward)
    }

    fn stored_rewards(memory: &ReplayMemory) -> HashSet<i64> {
        memory.iter().map(|t| t.reward() as i64).collect()
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(ReplayMemory::with_seed(0, 1).is_err());
    }

    #[test]
    fn test_push_below_capacity() {
        let mut memory = ReplayMemory::with_seed(10, 1).unwrap();
        for i in 0..7 {
            memory.push(make_transition(i as f32));
        }
        assert_eq!(memory.len(), 7);
        assert!((memory.fill_ratio() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_push_evicts_oldest() {
        let capacity = 10;
        for extra in 0..capacity {
            let mut memory = ReplayMemory::with_seed(capacity, 3).unwrap();
            for i in 0..capacity + extra {
                memory.push(make_transition(i as f32));
            }

            assert_eq!(memory.len(), capacity);
            let expected: HashSet<i64> = (extra..capacity + extra).map(|i| i as i64).collect();
            assert_eq!(stored_rewards(&memory), expected);
        }
    }

    #[test]
    fn test_sample_all_returns_each_once() {
        let mut memory = ReplayMemory::with_seed(8, 11).unwrap();
        for i in 0..5 {
            memory.push(make_transition(i as f32));
        }

        let batch = memory.sample(5).unwrap();
        assert_eq!(batch.len(), 5);
        let rewards: HashSet<i64> = batch.iter().map(|t| t.reward() as i64).collect();
        assert_eq!(rewards, (0..5).collect());
    }

    #[test]
    fn test_sample_is_without_replacement_and_non_destructive() {
        let mut memory = ReplayMemory::with_seed(100, 5).unwrap();
        for i in 0..50 {
            memory.push(make_transition(i as f32));
        }

        for _ in 0..20 {
            let batch = memory.sample(10).unwrap();
            let distinct: HashSet<i64> = batch.iter().map(|t| t.reward() as i64).collect();
            assert_eq!(distinct.len(), 10);
        }
        assert_eq!(memory.len(), 50);
    }

    #[test]
    fn test_sample_more_than_stored_is_an_error() {
        let mut memory = ReplayMemory::with_seed(10, 1).unwrap();
        memory.push(make_transition(1.0));

        assert_eq!(
            memory.sample(2),
            Err(SampleError::NotEnough {
                requested: 2,
                available: 1
            })
        );
    }

    #[test]
    fn test_same_seed_same_samples() {
        let mut a = ReplayMemory::with_seed(32, 42).unwrap();
        let mut b = ReplayMemory::with_seed(32, 42).unwrap();
        for i in 0..32 {
            a.push(make_transition(i as f32));
            b.push(make_transition(i as f32));
        }
        assert_eq!(a.sample(8).unwrap(), b.sample(8).unwrap());
    }
}
