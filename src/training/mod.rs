//! Training
//!
//! The DQN training loop and its stop flag.

pub mod stop;
pub mod trainer;

pub use stop::StopSignal;
pub use trainer::{
    clamp_gradients, huber_loss, DqnTrainer, DqnTrainerParameters, EpisodeReport,
    TrainingSummary,
};
