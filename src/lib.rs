//! Dermaclass - Skin-condition image classification service
//!
//! Loads one trained convolutional classifier at startup and serves
//! predictions for uploaded images:
//! - Model artifacts: a JSON architecture plus a binary weights file
//! - Image preprocessing pinned to the model's training contract
//! - A pure-Rust forward pass over `ndarray` tensors
//! - HTTP server and CLI front ends
//!
//! # Modules
//!
//! - [`model`] - Artifact formats, loading, and the forward pass
//! - [`preprocessing`] - Image decoding, resizing, normalization
//! - [`inference`] - Prediction pipeline and result shaping
//! - [`server`] - HTTP server with REST API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core modules
pub mod model;
pub mod preprocessing;
pub mod inference;

// Services
pub mod server;
pub mod cli;

pub use error::{ArtifactKind, DermaError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ArtifactKind, DermaError, Result};

    // Model
    pub use crate::model::{
        Architecture, ArtifactPaths, ClassLabels, LayerSpec, ModelHandle, ModelLoader, ScoreModel,
        WeightFile,
    };

    // Preprocessing
    pub use crate::preprocessing::{ImagePreprocessor, InputTensor, ModelFamily, PreprocessingConfig};

    // Inference
    pub use crate::inference::{InferenceConfig, InferenceEngine, PredictionResult};

    // Server
    pub use crate::server::{create_router, run_server, AppState, ServerConfig};
}
