//! Action-Value Estimators
//!
//! Neural networks mapping a batch of states to one value per action.

pub mod qnetwork;

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::error::{Result, TraderError};
use crate::policy::QFunction;

pub use qnetwork::{QNetwork, QNetworkConfig};

/// A module that scores every action for a batch of states
///
/// Input is `[batch, state_dim]`, output is `[batch, NUM_ACTIONS]`.
pub trait ActionValueEstimator<B: Backend>: Module<B> {
    fn forward(&self, states: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// Single-state queries against an estimator
pub struct EstimatorView<'a, B: Backend, M> {
    model: &'a M,
    device: &'a B::Device,
}

impl<'a, B: Backend, M: ActionValueEstimator<B>> EstimatorView<'a, B, M> {
    pub fn new(model: &'a M, device: &'a B::Device) -> Self {
        Self { model, device }
    }
}

impl<B: Backend, M: ActionValueEstimator<B>> QFunction for EstimatorView<'_, B, M> {
    fn q_values(&self, state: &[f32]) -> Result<Vec<f32>> {
        let input = rows_to_tensor::<B>(state.to_vec(), 1, state.len(), self.device);
        tensor_to_vec(self.model.forward(input))
    }
}

/// Build a `[rows, cols]` float tensor from row-major values
pub fn rows_to_tensor<B: Backend>(
    values: Vec<f32>,
    rows: usize,
    cols: usize,
    device: &B::Device,
) -> Tensor<B, 2> {
    Tensor::from_data(
        TensorData::new(values, [rows, cols]).convert::<B::FloatElem>(),
        device,
    )
}

/// Flatten a tensor into host memory
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| TraderError::Tensor(format!("{e:?}")))
}
