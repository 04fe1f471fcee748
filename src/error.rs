//! Error taxonomy for the encoding pipeline.
//!
//! Schema and configuration problems abort a batch immediately (fail fast, no
//! partial output). Data-quality anomalies — degenerate bins, unseen symbols —
//! are *not* errors: they are tolerated, counted, and logged (see
//! [`crate::encoder::EncodeReport`]).

use thiserror::Error;

/// Invalid column-role declaration, detected at encoder construction.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("column '{0}' is declared both categorical and numeric")]
    RoleOverlap(String),

    #[error("label column '{0}' collides with a declared feature column")]
    LabelCollision(String),

    #[error("column '{0}' is declared more than once")]
    DuplicateColumn(String),

    #[error("bin count must be at least 1")]
    ZeroBins,

    #[error("thresrate must lie in [0, 1], got {0}")]
    ThresrateOutOfRange(f64),
}

/// Input data does not match the declared schema, detected at transform time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("input is missing declared column '{0}'")]
    MissingColumn(String),

    #[error("column '{0}' is present but does not have its declared role")]
    RoleMismatch(String),
}

/// Top-level error for all encoder operations.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("encoder has not been fitted; call fit_transform first")]
    NotFitted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
