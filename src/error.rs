//! Error types for the dermaclass service

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dermaclass operations
pub type Result<T> = std::result::Result<T, DermaError>;

/// Which of the two model artifacts a path refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Architecture,
    Weights,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Architecture => write!(f, "architecture"),
            ArtifactKind::Weights => write!(f, "weights"),
        }
    }
}

/// Main error type for the service.
///
/// `MissingArtifact`, `IncompatibleWeights` and `ConfigError` only occur during
/// startup and abort initialization. `InvalidImage` and `InferenceFault` are
/// per-request and never touch the shared model.
#[derive(Error, Debug)]
pub enum DermaError {
    #[error("Missing {kind} artifact: {}", path.display())]
    MissingArtifact { kind: ArtifactKind, path: PathBuf },

    #[error("Incompatible weights: {0}")]
    IncompatibleWeights(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Inference fault: {0}")]
    InferenceFault(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DermaError {
    /// Short machine-readable category name, used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            DermaError::MissingArtifact { .. } => "missing_artifact",
            DermaError::IncompatibleWeights(_) => "incompatible_weights",
            DermaError::InvalidImage(_) => "invalid_image",
            DermaError::InferenceFault(_) => "inference_fault",
            DermaError::ConfigError(_) => "config_error",
            DermaError::IoError(_) => "io_error",
        }
    }

    /// Whether the error is caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, DermaError::InvalidImage(_))
    }
}

impl From<image::ImageError> for DermaError {
    fn from(err: image::ImageError) -> Self {
        DermaError::InvalidImage(err.to_string())
    }
}

impl From<ndarray::ShapeError> for DermaError {
    fn from(err: ndarray::ShapeError) -> Self {
        DermaError::InferenceFault(format!("tensor shape error: {}", err))
    }
}
