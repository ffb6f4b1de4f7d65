//! Error taxonomy for sfcmend-core.
//!
//! Per-iteration failures never surface here: the repair loop folds them
//! into a [`crate::repair_loop::FailureReason`]. `RepairError` covers
//! configuration, batch-level IO and artifact integrity.

use std::path::PathBuf;

use oracle_gateway::OracleError;
use sfc_model::ModelError;

/// Errors from run configuration, classification and batch IO.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error on {}: {source}", .path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepairError {
    pub(crate) fn io_at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> RepairError {
        let path = path.into();
        move |source| RepairError::IoAt { path, source }
    }
}

/// Result type for sfcmend-core operations.
pub type Result<T> = std::result::Result<T, RepairError>;
