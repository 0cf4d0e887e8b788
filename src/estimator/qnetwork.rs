//! Q-Network
//!
//! Feed-forward action-value network for discrete trading actions.

use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use super::ActionValueEstimator;
use crate::core::NUM_ACTIONS;

/// Q-network configuration
#[derive(Config, Debug)]
pub struct QNetworkConfig {
    /// Width of the state vector
    pub input_dim: usize,
    /// Hidden layer dimension
    #[config(default = "128")]
    pub hidden_dim: usize,
    /// Number of discrete actions
    #[config(default = "NUM_ACTIONS")]
    pub num_actions: usize,
}

/// Two hidden ReLU layers followed by a linear head with one output per action
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    q_head: Linear<B>,
    activation: Relu,
}

impl QNetworkConfig {
    /// Initialize the Q-network
    pub fn init<B: Backend>(&self, device: &B::Device) -> QNetwork<B> {
        let fc1 = LinearConfig::new(self.input_dim, self.hidden_dim).init(device);
        let fc2 = LinearConfig::new(self.hidden_dim, self.hidden_dim / 2).init(device);
        let q_head = LinearConfig::new(self.hidden_dim / 2, self.num_actions).init(device);

        QNetwork {
            fc1,
            fc2,
            q_head,
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> QNetwork<B> {
    /// Forward pass returning action values
    pub fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(states);
        let x = self.activation.forward(x);
        let x = self.fc2.forward(x);
        let x = self.activation.forward(x);
        self.q_head.forward(x)
    }
}

impl<B: Backend> ActionValueEstimator<B> for QNetwork<B> {
    fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2> {
        QNetwork::forward(self, states)
    }
}
