//! Inference pipeline module
//!
//! Turns uploaded image bytes into a classification:
//! - Preprocessing pinned to the loaded model's training contract
//! - A read-only forward pass through the shared model
//! - First-maximum top-1 selection
//! - Scores rounded to a fixed precision, keyed by label in output order

mod config;
mod engine;
mod result;

pub use config::{InferenceConfig, DEFAULT_SCORE_DECIMALS};
pub use engine::InferenceEngine;
pub use result::{round_score, top1_index, PredictionResult};
