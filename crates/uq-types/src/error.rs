use crate::state::ExpansionKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UqError {
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Configuration conflict: {0}")]
    ConfigConflict(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Coefficient storage does not mirror the index-set hierarchy: {0}")]
    StructureMismatch(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Unknown expansion key {0}")]
    UnknownKey(ExpansionKey),

    #[error("No popped index set {multi_index:?} stored for key {key}")]
    PoppedSetNotFound {
        key: ExpansionKey,
        multi_index: Vec<usize>,
    },

    #[error("Index set {0:?} is not admissible")]
    Inadmissible(Vec<usize>),

    #[error("Level {level} exceeds the basis table limit {max_level}")]
    LevelOutOfRange { level: usize, max_level: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type UqResult<T> = Result<T, UqError>;
