//! Image decoding and tensor conversion

use std::io::Cursor;

use image::{DynamicImage, ImageReader, Limits, RgbImage};
use ndarray::Array4;
use tracing::debug;

use super::{InputTensor, PreprocessingConfig};
use crate::error::{DermaError, Result};

/// Largest accepted decoded width or height
const MAX_IMAGE_DIMENSION: u32 = 16_384;

/// Upper bound on decoder allocations
const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

/// Turns uploaded image bytes into the model's input tensor.
///
/// Stateless: the same bytes always produce the same tensor.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    config: PreprocessingConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Decode, convert to RGB, resize, normalize and batch
    pub fn transform(&self, bytes: &[u8]) -> Result<InputTensor> {
        let decoded = decode_image(bytes)?;
        debug!(
            width = decoded.width(),
            height = decoded.height(),
            color = ?decoded.color(),
            "Decoded upload"
        );
        let rgb = decoded.into_rgb8();
        Ok(self.transform_rgb(&rgb))
    }

    /// Resize and normalize an already decoded RGB image
    pub fn transform_rgb(&self, rgb: &RgbImage) -> InputTensor {
        let size = self.config.image_size;
        let resized = if rgb.width() == size && rgb.height() == size {
            rgb.clone()
        } else {
            image::imageops::resize(rgb, size, size, self.config.resize_filter.filter_type())
        };

        let side = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, side, side, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let values = self.config.normalization.apply(pixel.0);
            let (x, y) = (x as usize, y as usize);
            for (c, value) in values.into_iter().enumerate() {
                tensor[[0, y, x, c]] = value;
            }
        }
        InputTensor(tensor)
    }
}

/// Decode bytes of any supported image format, sniffing the format from content
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(DermaError::InvalidImage("empty upload".to_string()));
    }

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DermaError::InvalidImage(e.to_string()))?;

    if reader.format().is_none() {
        return Err(DermaError::InvalidImage(
            "unrecognized image format".to_string(),
        ));
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    reader.limits(limits);

    Ok(reader.decode()?)
}
