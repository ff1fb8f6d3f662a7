//! Preprocessing configuration
//!
//! The resize target, resize filter and channel normalization are a contract
//! with the training pipeline of the loaded network. They travel with the
//! architecture artifact instead of living as free-standing constants.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

/// Current version of the preprocessing contract
pub const PREPROCESSING_VERSION: u32 = 1;

/// Input resolution the default network was trained at
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

/// Channel means used by "caffe" mode networks, in BGR order
const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// ImageNet channel statistics used by "torch" mode networks, in RGB order
const TORCH_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const TORCH_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resampling filter used when resizing to the model resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Bilinear,
    /// Keys cubic with a = -0.5, the default filter of PIL's `Image.resize`
    Bicubic,
    Lanczos3,
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::Bicubic
    }
}

impl ResizeFilter {
    pub(crate) fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
            ResizeFilter::Bicubic => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Per-channel numeric normalization applied to RGB pixel values in `0..=255`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Normalization {
    /// Raw pixel values as floats; the network rescales internally
    Identity,
    /// `x * scale + offset`
    Scale { scale: f32, offset: f32 },
    /// `(x / 255 - mean) / std`, per channel in RGB order
    MeanStd { mean: [f32; 3], std: [f32; 3] },
    /// RGB to BGR, then subtract the per-channel BGR means
    Caffe,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::Identity
    }
}

impl Normalization {
    /// Normalize one RGB pixel. Output is in the channel order the network expects.
    #[inline]
    pub fn apply(&self, rgb: [u8; 3]) -> [f32; 3] {
        let [r, g, b] = [rgb[0] as f32, rgb[1] as f32, rgb[2] as f32];
        match self {
            Normalization::Identity => [r, g, b],
            Normalization::Scale { scale, offset } => {
                [r * scale + offset, g * scale + offset, b * scale + offset]
            }
            Normalization::MeanStd { mean, std } => [
                (r / 255.0 - mean[0]) / std[0],
                (g / 255.0 - mean[1]) / std[1],
                (b / 255.0 - mean[2]) / std[2],
            ],
            Normalization::Caffe => [
                b - CAFFE_MEAN_BGR[0],
                g - CAFFE_MEAN_BGR[1],
                r - CAFFE_MEAN_BGR[2],
            ],
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if let Normalization::MeanStd { std, .. } = self {
            if std.iter().any(|s| *s == 0.0 || !s.is_finite()) {
                return Err(format!("mean_std normalization has invalid std {:?}", std));
            }
        }
        Ok(())
    }
}

/// Network families with a pinned preprocessing convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFamily {
    EfficientNet,
    MobileNet,
    Inception,
    ResNet,
    Vgg,
    DenseNet,
}

impl ModelFamily {
    /// Channel normalization the family was trained with
    pub fn normalization(self) -> Normalization {
        match self {
            ModelFamily::EfficientNet => Normalization::Identity,
            ModelFamily::MobileNet | ModelFamily::Inception => Normalization::Scale {
                scale: 1.0 / 127.5,
                offset: -1.0,
            },
            ModelFamily::ResNet | ModelFamily::Vgg => Normalization::Caffe,
            ModelFamily::DenseNet => Normalization::MeanStd {
                mean: TORCH_MEAN,
                std: TORCH_STD,
            },
        }
    }

    /// Full preprocessing contract for this family at the given resolution
    pub fn preprocessing(self, image_size: u32) -> PreprocessingConfig {
        PreprocessingConfig {
            version: PREPROCESSING_VERSION,
            image_size,
            resize_filter: ResizeFilter::Bicubic,
            normalization: self.normalization(),
        }
    }
}

/// Preprocessing contract paired with a model artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Contract version, bumped whenever the meaning of a field changes
    #[serde(default = "default_version")]
    pub version: u32,

    /// Square side length images are resized to
    #[serde(default = "default_image_size")]
    pub image_size: u32,

    /// Resampling filter for the resize step
    #[serde(default)]
    pub resize_filter: ResizeFilter,

    /// Per-channel normalization
    #[serde(default)]
    pub normalization: Normalization,
}

fn default_version() -> u32 {
    PREPROCESSING_VERSION
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        ModelFamily::EfficientNet.preprocessing(DEFAULT_IMAGE_SIZE)
    }
}

impl PreprocessingConfig {
    /// Create the default (EfficientNet, 224x224) configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the target resolution
    pub fn with_image_size(mut self, size: u32) -> Self {
        self.image_size = size;
        self
    }

    /// Builder method to set the resize filter
    pub fn with_resize_filter(mut self, filter: ResizeFilter) -> Self {
        self.resize_filter = filter;
        self
    }

    /// Builder method to set the channel normalization
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    /// Check the contract is usable
    pub fn validate(&self) -> Result<(), String> {
        if self.version != PREPROCESSING_VERSION {
            return Err(format!(
                "unsupported preprocessing version {} (expected {})",
                self.version, PREPROCESSING_VERSION
            ));
        }
        if self.image_size == 0 {
            return Err("image_size must be positive".to_string());
        }
        self.normalization.validate()
    }
}
