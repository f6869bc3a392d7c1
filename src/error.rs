use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no latent factors for user {0}")]
    UnknownUser(String),

    #[error("invalid fusion config: {0}")]
    InvalidFusionConfig(String),

    #[error("vector index not loaded")]
    IndexUnavailable,

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
