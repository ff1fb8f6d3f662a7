//! Model loading and forward passes
//!
//! - [`architecture`]: JSON layer-stack description (Keras naming)
//! - [`weights`]: bincode tensor file bound onto the architecture
//! - [`ModelLoader`]: fail-fast, load-once construction of a [`ModelHandle`]
//! - [`ScoreModel`]: the read-only seam the inference engine calls through

pub mod architecture;
mod labels;
mod layers;
mod loader;
mod network;
pub mod weights;

pub use architecture::{Activation, Architecture, DataFormat, LayerSpec, Padding, PreprocessingSpec};
pub use labels::{ClassLabels, DEFAULT_CLASS_NAMES};
pub use layers::TensorShape;
pub use loader::{ArtifactPaths, ModelHandle, ModelLoader, DEFAULT_MODEL_PATH, DEFAULT_WEIGHTS_PATH};
pub use network::{LayerSummary, Network};
pub use weights::{NamedTensor, WeightFile};

use crate::error::Result;
use crate::preprocessing::InputTensor;

/// Anything that maps one input tensor to one score vector.
///
/// Implementations take `&self` and must be safe to call from many requests at
/// once; a forward pass never changes model state.
pub trait ScoreModel: Send + Sync {
    /// Length of the returned score vector
    fn output_width(&self) -> usize;

    /// Score a `(1, H, W, 3)` tensor
    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>>;
}
