//! Inference engine: preprocessing, forward pass and response shaping
//!
//! One engine is built at startup and shared by every request. It holds no
//! mutable state, so `predict` can run concurrently on any number of threads.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::result::PredictionResult;
use super::InferenceConfig;
use crate::error::{DermaError, Result};
use crate::model::{ClassLabels, ModelHandle, ScoreModel};
use crate::preprocessing::{ImagePreprocessor, InputTensor, PreprocessingConfig};

/// Image classification pipeline over a shared model
pub struct InferenceEngine {
    config: InferenceConfig,
    model: Arc<dyn ScoreModel>,
    labels: ClassLabels,
    preprocessor: ImagePreprocessor,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("config", &self.config)
            .field("labels", &self.labels)
            .field("preprocessing", self.preprocessor.config())
            .finish()
    }
}

impl InferenceEngine {
    /// Create an engine over any score model.
    ///
    /// Fails if the model's output width differs from the number of labels.
    pub fn new(
        config: InferenceConfig,
        model: Arc<dyn ScoreModel>,
        labels: ClassLabels,
        preprocessing: PreprocessingConfig,
    ) -> Result<Self> {
        if model.output_width() != labels.len() {
            return Err(DermaError::IncompatibleWeights(format!(
                "model produces {} scores but {} class labels are configured",
                model.output_width(),
                labels.len()
            )));
        }
        preprocessing
            .validate()
            .map_err(DermaError::ConfigError)?;

        Ok(Self {
            config,
            model,
            labels,
            preprocessor: ImagePreprocessor::new(preprocessing),
        })
    }

    /// Create an engine over a loaded model, using the labels and
    /// preprocessing contract that were validated at load time
    pub fn from_handle(config: InferenceConfig, handle: ModelHandle) -> Result<Self> {
        let labels = handle.labels().clone();
        let preprocessing = handle.preprocessing().clone();
        Self::new(config, Arc::new(handle), labels, preprocessing)
    }

    pub fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    pub fn preprocessing(&self) -> &PreprocessingConfig {
        self.preprocessor.config()
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Decode and preprocess raw image bytes
    pub fn preprocess(&self, bytes: &[u8]) -> Result<InputTensor> {
        self.preprocessor.transform(bytes)
    }

    /// Classify raw image bytes
    pub fn predict(&self, bytes: &[u8]) -> Result<PredictionResult> {
        let start = Instant::now();
        let tensor = self.preprocess(bytes)?;
        let preprocess_ms = start.elapsed().as_secs_f64() * 1000.0;

        let result = self.predict_tensor(&tensor)?;
        debug!(
            bytes = bytes.len(),
            class = %result.label,
            confidence = result.confidence,
            preprocess_ms,
            total_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Prediction complete"
        );
        Ok(result)
    }

    /// Classify an already preprocessed tensor
    pub fn predict_tensor(&self, tensor: &InputTensor) -> Result<PredictionResult> {
        let size = self.preprocessor.config().image_size as usize;
        if tensor.shape() != [1, size, size, 3] {
            return Err(DermaError::InferenceFault(format!(
                "expected input tensor (1, {}, {}, 3), got {:?}",
                size,
                size,
                tensor.shape()
            )));
        }

        let raw = self.model.forward(tensor).map_err(|e| match e {
            DermaError::InferenceFault(_) => e,
            other => DermaError::InferenceFault(other.to_string()),
        })?;
        if self.config.log_scores {
            debug!(scores = ?raw, "Raw scores");
        }

        PredictionResult::from_scores(&raw, &self.labels, self.config.score_decimals).inspect_err(|e| {
            warn!(error = %e, "Model output could not be mapped to labels");
        })
    }
}
