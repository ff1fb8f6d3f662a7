//! Architecture artifact: a sequential layer stack described in JSON
//!
//! The document follows Keras naming (`class_name`, `kernel_size`, `strides`,
//! `padding`, ...) so exported models map onto it one layer at a time. Only the
//! inference-relevant parts are read; training configuration is ignored.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::weights::NamedTensor;
use crate::error::{DermaError, Result};
use crate::preprocessing::{ModelFamily, PreprocessingConfig};

/// Current version of the architecture document layout
pub const ARCHITECTURE_FORMAT_VERSION: u32 = 1;

/// Element-wise (or, for softmax, channel-wise) activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Relu6,
    Sigmoid,
    Tanh,
    #[serde(alias = "silu")]
    Swish,
    Softmax,
}

impl Default for Activation {
    fn default() -> Self {
        Self::Linear
    }
}

/// Spatial padding mode, TensorFlow semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    Valid,
    Same,
}

impl Default for Padding {
    fn default() -> Self {
        Self::Valid
    }
}

/// Axis order of spatial tensors; only channels-last is executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    ChannelsLast,
    ChannelsFirst,
}

impl Default for DataFormat {
    fn default() -> Self {
        Self::ChannelsLast
    }
}

fn default_strides() -> [usize; 2] {
    [1, 1]
}

fn default_one() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_bn_epsilon() -> f32 {
    1e-3
}

/// Shared fields of `Conv2D` and `DepthwiseConv2D`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvSpec {
    pub name: String,
    /// Output channels; ignored for depthwise convolutions
    #[serde(default)]
    pub filters: usize,
    pub kernel_size: [usize; 2],
    #[serde(default = "default_strides")]
    pub strides: [usize; 2],
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_true")]
    pub use_bias: bool,
    /// Read so that dilated kernels are rejected instead of run undilated
    #[serde(default = "default_strides")]
    pub dilation_rate: [usize; 2],
    #[serde(default = "default_one")]
    pub groups: usize,
    #[serde(default = "default_one")]
    pub depth_multiplier: usize,
    #[serde(default)]
    pub data_format: DataFormat,
}

impl Default for ConvSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            filters: 0,
            kernel_size: [1, 1],
            strides: default_strides(),
            padding: Padding::default(),
            activation: Activation::default(),
            use_bias: true,
            dilation_rate: default_strides(),
            groups: 1,
            depth_multiplier: 1,
            data_format: DataFormat::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub name: String,
    pub pool_size: [usize; 2],
    /// Defaults to `pool_size`
    #[serde(default)]
    pub strides: Option<[usize; 2]>,
    #[serde(default)]
    pub padding: Padding,
    #[serde(default)]
    pub data_format: DataFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchNormSpec {
    pub name: String,
    #[serde(default = "default_bn_epsilon")]
    pub epsilon: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationSpec {
    pub name: String,
    pub activation: Activation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropoutSpec {
    pub name: String,
    #[serde(default)]
    pub rate: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseSpec {
    pub name: String,
    pub units: usize,
    #[serde(default)]
    pub activation: Activation,
    #[serde(default = "default_true")]
    pub use_bias: bool,
}

/// Layers with no parameters beyond their name and axis order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedSpec {
    pub name: String,
    #[serde(default)]
    pub data_format: DataFormat,
}

impl NamedSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_format: DataFormat::default(),
        }
    }
}

/// One layer of the sequential stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class_name")]
pub enum LayerSpec {
    Conv2D(ConvSpec),
    DepthwiseConv2D(ConvSpec),
    BatchNormalization(BatchNormSpec),
    Activation(ActivationSpec),
    MaxPooling2D(PoolSpec),
    AveragePooling2D(PoolSpec),
    GlobalAveragePooling2D(NamedSpec),
    Flatten(NamedSpec),
    Dropout(DropoutSpec),
    Dense(DenseSpec),
}

impl LayerSpec {
    pub fn name(&self) -> &str {
        match self {
            LayerSpec::Conv2D(s) | LayerSpec::DepthwiseConv2D(s) => &s.name,
            LayerSpec::BatchNormalization(s) => &s.name,
            LayerSpec::Activation(s) => &s.name,
            LayerSpec::MaxPooling2D(s) | LayerSpec::AveragePooling2D(s) => &s.name,
            LayerSpec::GlobalAveragePooling2D(s) | LayerSpec::Flatten(s) => &s.name,
            LayerSpec::Dropout(s) => &s.name,
            LayerSpec::Dense(s) => &s.name,
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            LayerSpec::Conv2D(_) => "Conv2D",
            LayerSpec::DepthwiseConv2D(_) => "DepthwiseConv2D",
            LayerSpec::BatchNormalization(_) => "BatchNormalization",
            LayerSpec::Activation(_) => "Activation",
            LayerSpec::MaxPooling2D(_) => "MaxPooling2D",
            LayerSpec::AveragePooling2D(_) => "AveragePooling2D",
            LayerSpec::GlobalAveragePooling2D(_) => "GlobalAveragePooling2D",
            LayerSpec::Flatten(_) => "Flatten",
            LayerSpec::Dropout(_) => "Dropout",
            LayerSpec::Dense(_) => "Dense",
        }
    }
}

/// How the preprocessing contract is declared in the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreprocessingSpec {
    /// Pinned convention of a known network family at the model's input size
    Family { family: ModelFamily },
    /// Fully spelled-out contract
    Explicit(PreprocessingConfig),
}

/// Parsed architecture artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub name: String,

    #[serde(default = "default_format_version")]
    pub format_version: u32,

    /// `[height, width, channels]` of one input sample
    pub input_shape: [usize; 3],

    /// Absent means the EfficientNet convention
    #[serde(default)]
    pub preprocessing: Option<PreprocessingSpec>,

    pub layers: Vec<LayerSpec>,

    /// Weights bundled with the architecture; the weights artifact overrides them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub weights: Vec<NamedTensor>,
}

fn default_format_version() -> u32 {
    ARCHITECTURE_FORMAT_VERSION
}

impl Architecture {
    pub fn new(name: impl Into<String>, input_shape: [usize; 3], layers: Vec<LayerSpec>) -> Self {
        Self {
            name: name.into(),
            format_version: ARCHITECTURE_FORMAT_VERSION,
            input_shape,
            preprocessing: None,
            layers,
            weights: Vec::new(),
        }
    }

    /// Builder method to declare the preprocessing contract
    pub fn with_preprocessing(mut self, spec: PreprocessingSpec) -> Self {
        self.preprocessing = Some(spec);
        self
    }

    /// Resolve the preprocessing contract the network was trained with
    pub fn preprocessing_config(&self) -> PreprocessingConfig {
        let image_size = self.input_shape[0] as u32;
        match &self.preprocessing {
            Some(PreprocessingSpec::Explicit(config)) => config.clone(),
            Some(PreprocessingSpec::Family { family }) => family.preprocessing(image_size),
            None => ModelFamily::EfficientNet.preprocessing(image_size),
        }
    }

    /// Parse an architecture document
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_slice(json.as_bytes())
    }

    /// Parse an architecture document from raw bytes; binary or non-UTF-8
    /// input is a malformed artifact, not an I/O failure
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arch: Self = serde_json::from_slice(bytes).map_err(|e| {
            DermaError::IncompatibleWeights(format!("malformed architecture artifact: {}", e))
        })?;
        if arch.format_version != ARCHITECTURE_FORMAT_VERSION {
            return Err(DermaError::IncompatibleWeights(format!(
                "unsupported architecture format version {} (expected {})",
                arch.format_version, ARCHITECTURE_FORMAT_VERSION
            )));
        }
        Ok(arch)
    }

    /// Load an architecture artifact from disk
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_slice(&bytes)
    }

    /// Save the architecture artifact to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DermaError::ConfigError(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::Normalization;

    const DOC: &str = r#"{
        "name": "tiny",
        "input_shape": [8, 8, 3],
        "preprocessing": {"family": "mobilenet"},
        "optimizer": {"class_name": "Adam"},
        "layers": [
            {"class_name": "Conv2D", "name": "stem", "filters": 4, "kernel_size": [3, 3], "strides": [2, 2], "padding": "same", "activation": "silu"},
            {"class_name": "BatchNormalization", "name": "stem_bn"},
            {"class_name": "GlobalAveragePooling2D", "name": "pool"},
            {"class_name": "Dropout", "name": "drop", "rate": 0.3},
            {"class_name": "Dense", "name": "head", "units": 2, "activation": "softmax"}
        ]
    }"#;

    #[test]
    fn test_parse_keras_style_document() {
        let arch = Architecture::from_json(DOC).unwrap();
        assert_eq!(arch.layers.len(), 5);
        assert_eq!(arch.layers[0].class_name(), "Conv2D");
        match &arch.layers[0] {
            LayerSpec::Conv2D(conv) => {
                assert_eq!(conv.activation, Activation::Swish);
                assert_eq!(conv.padding, Padding::Same);
                assert!(conv.use_bias);
            }
            other => panic!("unexpected layer {:?}", other),
        }
        match &arch.layers[1] {
            LayerSpec::BatchNormalization(bn) => assert!((bn.epsilon - 1e-3).abs() < 1e-9),
            other => panic!("unexpected layer {:?}", other),
        }
    }

    #[test]
    fn test_family_preprocessing_uses_input_size() {
        let arch = Architecture::from_json(DOC).unwrap();
        let config = arch.preprocessing_config();
        assert_eq!(config.image_size, 8);
        assert!(matches!(config.normalization, Normalization::Scale { .. }));
    }

    #[test]
    fn test_default_preprocessing_is_efficientnet() {
        let arch = Architecture::new("m", [224, 224, 3], vec![]);
        let config = arch.preprocessing_config();
        assert_eq!(config.image_size, 224);
        assert_eq!(config.normalization, Normalization::Identity);
    }

    #[test]
    fn test_unknown_layer_is_incompatible() {
        let doc = r#"{"name": "x", "input_shape": [4, 4, 3], "layers": [{"class_name": "LSTM", "name": "l"}]}"#;
        let err = Architecture::from_json(doc).unwrap_err();
        assert!(matches!(err, DermaError::IncompatibleWeights(_)));
    }

    #[test]
    fn test_unsupported_keras_keys_are_read() {
        let doc = r#"{"name": "x", "input_shape": [5, 5, 3], "layers": [
            {"class_name": "Conv2D", "name": "c", "filters": 1, "kernel_size": [3, 3], "dilation_rate": [2, 2], "groups": 1},
            {"class_name": "DepthwiseConv2D", "name": "d", "kernel_size": [3, 3], "depth_multiplier": 2},
            {"class_name": "MaxPooling2D", "name": "p", "pool_size": [2, 2], "data_format": "channels_first"},
            {"class_name": "Flatten", "name": "f"}
        ]}"#;
        let arch = Architecture::from_json(doc).unwrap();
        match &arch.layers[0] {
            LayerSpec::Conv2D(conv) => {
                assert_eq!(conv.dilation_rate, [2, 2]);
                assert_eq!(conv.groups, 1);
                assert_eq!(conv.data_format, DataFormat::ChannelsLast);
            }
            other => panic!("unexpected layer {:?}", other),
        }
        match &arch.layers[1] {
            LayerSpec::DepthwiseConv2D(conv) => assert_eq!(conv.depth_multiplier, 2),
            other => panic!("unexpected layer {:?}", other),
        }
        match &arch.layers[2] {
            LayerSpec::MaxPooling2D(pool) => assert_eq!(pool.data_format, DataFormat::ChannelsFirst),
            other => panic!("unexpected layer {:?}", other),
        }
        assert_eq!(arch.layers[3], LayerSpec::Flatten(NamedSpec::new("f")));
    }

    #[test]
    fn test_binary_document_is_incompatible() {
        let err = Architecture::from_slice(b"\x89HDF\r\n\x1a\n\xff\xfe\x00").unwrap_err();
        assert!(matches!(err, DermaError::IncompatibleWeights(_)));
    }

    #[test]
    fn test_rejects_future_format_version() {
        let doc = r#"{"name": "x", "format_version": 9, "input_shape": [4, 4, 3], "layers": []}"#;
        assert!(Architecture::from_json(doc).is_err());
    }
}
