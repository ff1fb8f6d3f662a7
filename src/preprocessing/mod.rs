//! Image preprocessing module
//!
//! Converts uploaded image bytes into the fixed-shape tensor the model expects:
//! - Format-sniffing decode (PNG, JPEG, GIF, BMP, WebP, TIFF, ...)
//! - Total color-mode normalization to 3-channel RGB
//! - Resize (no crop) to the model's square training resolution
//! - Per-channel normalization pinned to the network family
//! - Leading batch dimension of size 1

mod config;
mod pipeline;

pub use config::{
    ModelFamily, Normalization, PreprocessingConfig, ResizeFilter, DEFAULT_IMAGE_SIZE,
    PREPROCESSING_VERSION,
};
pub use pipeline::{decode_image, ImagePreprocessor};

use ndarray::{Array4, ArrayView4};

use crate::error::{DermaError, Result};

/// A `(batch, height, width, 3)` float tensor ready for a forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor(Array4<f32>);

impl InputTensor {
    /// Wrap an NHWC array, checking it carries exactly three channels
    pub fn new(array: Array4<f32>) -> Result<Self> {
        let shape = array.shape();
        if shape[0] == 0 || shape[3] != 3 {
            return Err(DermaError::InferenceFault(format!(
                "input tensor must have shape (N, H, W, 3) with N > 0, got {:?}",
                shape
            )));
        }
        Ok(Self(array))
    }

    /// All-zero tensor with batch size 1
    pub fn zeros(height: usize, width: usize) -> Self {
        Self(Array4::zeros((1, height, width, 3)))
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    pub fn into_inner(self) -> Array4<f32> {
        self.0
    }
}
