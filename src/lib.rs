pub mod cli;
pub mod config;
pub mod core;
pub mod environment;
pub mod error;
pub mod estimator;
pub mod memory;
pub mod policy;
pub mod training;

pub use config::AppConfig;
pub use core::{TradingAction, Transition, TransitionBatch, NUM_ACTIONS};
pub use environment::{Environment, StepResult, TradingEnvConfig, TradingEnvironment};
pub use error::{Result, SampleError, TraderError};
pub use estimator::{ActionValueEstimator, EstimatorView, QNetwork, QNetworkConfig};
pub use memory::ReplayMemory;
pub use policy::{EpsilonGreedyPolicy, PolicyConfig, QFunction};
pub use training::{DqnTrainer, DqnTrainerParameters, EpisodeReport, StopSignal, TrainingSummary};
