//! Model loader: the only code that reads model artifacts

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::architecture::Architecture;
use super::labels::ClassLabels;
use super::network::{LayerSummary, Network};
use super::weights::{WeightFile, WeightStore};
use super::ScoreModel;
use crate::error::{ArtifactKind, DermaError, Result};
use crate::preprocessing::{InputTensor, PreprocessingConfig};

/// Default architecture artifact, relative to the working directory
pub const DEFAULT_MODEL_PATH: &str = "model.json";

/// Default weights artifact, relative to the working directory
pub const DEFAULT_WEIGHTS_PATH: &str = "weights.bin";

/// Locations of the two model artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub architecture: PathBuf,
    pub weights: PathBuf,
}

impl ArtifactPaths {
    pub fn new(architecture: impl Into<PathBuf>, weights: impl Into<PathBuf>) -> Self {
        Self {
            architecture: architecture.into(),
            weights: weights.into(),
        }
    }

    /// Both artifacts must exist as regular files before anything is parsed
    pub fn ensure_present(&self) -> Result<()> {
        ensure_file(&self.architecture, ArtifactKind::Architecture)?;
        ensure_file(&self.weights, ArtifactKind::Weights)
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_PATH, DEFAULT_WEIGHTS_PATH)
    }
}

fn ensure_file(path: &Path, kind: ArtifactKind) -> Result<()> {
    let missing = || DermaError::MissingArtifact {
        kind,
        path: path.to_path_buf(),
    };
    let meta = std::fs::metadata(path).map_err(|_| missing())?;
    if !meta.is_file() {
        return Err(missing());
    }
    std::fs::File::open(path).map_err(|_| missing())?;
    Ok(())
}

#[derive(Debug)]
struct LoadedModel {
    network: Network,
    labels: ClassLabels,
    preprocessing: PreprocessingConfig,
}

/// Shared, read-only handle to the loaded network.
///
/// Cloning is cheap and every clone refers to the same weights. There is no
/// way to mutate or reload the model through a handle.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    inner: Arc<LoadedModel>,
}

impl ModelHandle {
    pub fn name(&self) -> &str {
        self.inner.network.name()
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.inner.labels
    }

    /// Preprocessing contract declared by the architecture artifact
    pub fn preprocessing(&self) -> &PreprocessingConfig {
        &self.inner.preprocessing
    }

    pub fn input_shape(&self) -> [usize; 3] {
        self.inner.network.input_shape()
    }

    pub fn parameter_count(&self) -> usize {
        self.inner.network.parameter_count()
    }

    pub fn summary(&self) -> Vec<LayerSummary> {
        self.inner.network.summary()
    }
}

impl ScoreModel for ModelHandle {
    fn output_width(&self) -> usize {
        self.inner.network.output_width()
    }

    fn forward(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let scores = self.inner.network.forward(input.view())?;
        if scores.nrows() != 1 {
            return Err(DermaError::InferenceFault(format!(
                "expected a single sample, got a batch of {}",
                scores.nrows()
            )));
        }
        Ok(scores.row(0).to_vec())
    }
}

/// Builds the process-wide [`ModelHandle`]
pub struct ModelLoader;

impl ModelLoader {
    /// Load architecture then weights, validate them against each other and
    /// against the label list, and run one warm-up pass.
    pub fn load(paths: &ArtifactPaths, labels: ClassLabels) -> Result<ModelHandle> {
        paths.ensure_present()?;
        let start = Instant::now();

        info!(path = %paths.architecture.display(), "Loading model architecture");
        let mut arch = Architecture::load(&paths.architecture)?;

        info!(path = %paths.weights.display(), "Loading weights");
        let weights = WeightFile::load(&paths.weights)?;

        let mut store = WeightStore::default();
        store.extend(std::mem::take(&mut arch.weights));
        store.extend(weights.tensors);

        let handle = Self::from_parts(&arch, store, labels)?;
        info!(
            model = %handle.name(),
            layers = handle.summary().len(),
            parameters = handle.parameter_count(),
            classes = handle.labels().len(),
            image_size = handle.preprocessing().image_size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Model loaded successfully"
        );
        Ok(handle)
    }

    /// Build a handle from an in-memory architecture and weights
    pub fn from_memory(arch: &Architecture, weights: WeightFile, labels: ClassLabels) -> Result<ModelHandle> {
        let mut store = WeightStore::default();
        store.extend(arch.weights.iter().cloned());
        store.extend(weights.tensors);
        Self::from_parts(arch, store, labels)
    }

    fn from_parts(arch: &Architecture, store: WeightStore, labels: ClassLabels) -> Result<ModelHandle> {
        let preprocessing = arch.preprocessing_config();
        preprocessing
            .validate()
            .map_err(DermaError::IncompatibleWeights)?;

        let [height, width, channels] = arch.input_shape;
        if channels != 3 {
            return Err(DermaError::IncompatibleWeights(format!(
                "network expects {} input channels, preprocessing produces 3",
                channels
            )));
        }
        let size = preprocessing.image_size as usize;
        if height != size || width != size {
            return Err(DermaError::IncompatibleWeights(format!(
                "network input is {}x{} but preprocessing resizes to {}x{}",
                height, width, size, size
            )));
        }

        let network = Network::build(arch, store)?;
        if network.output_width() != labels.len() {
            return Err(DermaError::IncompatibleWeights(format!(
                "model produces {} scores but {} class labels are configured",
                network.output_width(),
                labels.len()
            )));
        }

        for layer in network.summary() {
            debug!(
                layer = %layer.name,
                class = layer.class_name,
                output = %layer.output_shape,
                parameters = layer.parameters,
                "Bound layer"
            );
        }

        let handle = ModelHandle {
            inner: Arc::new(LoadedModel {
                network,
                labels,
                preprocessing,
            }),
        };

        handle
            .forward(&InputTensor::zeros(height, width))
            .map_err(|e| DermaError::IncompatibleWeights(format!("warm-up pass failed: {}", e)))?;

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_architecture_reported_first() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path().join("model.json"), dir.path().join("weights.bin"));
        let err = paths.ensure_present().unwrap_err();
        assert!(matches!(
            err,
            DermaError::MissingArtifact { kind: ArtifactKind::Architecture, .. }
        ));
    }

    #[test]
    fn test_directory_is_not_an_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let arch = dir.path().join("model.json");
        std::fs::write(&arch, "{}").unwrap();
        let paths = ArtifactPaths::new(&arch, dir.path());
        let err = paths.ensure_present().unwrap_err();
        assert!(matches!(err, DermaError::MissingArtifact { kind: ArtifactKind::Weights, .. }));
    }

    #[test]
    fn test_default_paths() {
        let paths = ArtifactPaths::default();
        assert_eq!(paths.architecture, PathBuf::from("model.json"));
        assert_eq!(paths.weights, PathBuf::from("weights.bin"));
    }
}
