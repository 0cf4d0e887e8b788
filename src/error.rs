use thiserror::Error;

/// Main error type for the trainer
#[derive(Error, Debug)]
pub enum TraderError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Collaborator precondition violations
    #[error("Environment reported an empty valid-move set")]
    EmptyValidMoves,

    #[error("Insufficient samples: requested {requested}, available {available}")]
    InsufficientSamples { requested: usize, available: usize },

    #[error("Invalid action id: {0}")]
    InvalidAction(usize),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cannot optimize on an empty batch")]
    EmptyBatch,

    // Numeric backend errors
    #[error("Tensor data error: {0}")]
    Tensor(String),

    // Environment collaborator failures
    #[error("Environment error: {0}")]
    Environment(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for TraderError
pub type Result<T> = std::result::Result<T, TraderError>;

/// Specific error types for sampling from replay memory
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("Requested {requested} transitions but only {available} are stored")]
    NotEnough { requested: usize, available: usize },
}

impl From<SampleError> for TraderError {
    fn from(err: SampleError) -> Self {
        match err {
            SampleError::NotEnough {
                requested,
                available,
            } => TraderError::InsufficientSamples {
                requested,
                available,
            },
        }
    }
}
