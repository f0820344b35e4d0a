//! Error types for the estimator library

use thiserror::Error;

/// Errors raised by the estimation pipeline and its collaborators
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// The SQLite telemetry store could not be opened or queried
    #[error("telemetry store error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("telemetry store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store handed back a timestamp we could not parse
    #[error("unparseable timestamp {value:?}")]
    TimestampParse { value: String },

    /// A fitted model was asked to predict on a matrix of a different width
    #[error("feature shape mismatch: model fitted on {expected} features, got {actual}")]
    FeatureShapeMismatch { expected: usize, actual: usize },

    #[error("feature matrix has {rows} rows but {targets} targets were given")]
    TargetLengthMismatch { rows: usize, targets: usize },

    /// A regressor was asked to fit on zero rows
    #[error("cannot fit a model on an empty training set")]
    EmptyTrainingSet,

    /// The regression backend rejected its input
    #[error("model error: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Blocking store or training work panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<linfa::error::Error> for EstimatorError {
    fn from(e: linfa::error::Error) -> Self {
        EstimatorError::Model(e.to_string())
    }
}

pub type EstimatorResult<T> = std::result::Result<T, EstimatorError>;
