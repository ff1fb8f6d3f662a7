//! Application state management

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::inference::InferenceEngine;

use super::ServerConfig;

/// Application state shared across handlers.
///
/// Read-only after startup; handlers never take a lock.
pub struct AppState {
    pub config: ServerConfig,
    pub engine: Arc<InferenceEngine>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, engine: InferenceEngine) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
            started_at: Utc::now(),
        }
    }

    /// Time since the state was created
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.started_at)
    }

    /// Short id used to correlate the log lines of one request
    pub fn generate_request_id() -> String {
        Uuid::new_v4().to_string()[..8].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::InferenceConfig;
    use crate::model::{ClassLabels, ScoreModel};
    use crate::preprocessing::{InputTensor, PreprocessingConfig};

    struct Uniform;

    impl ScoreModel for Uniform {
        fn output_width(&self) -> usize {
            2
        }

        fn forward(&self, _input: &InputTensor) -> crate::Result<Vec<f32>> {
            Ok(vec![0.5, 0.5])
        }
    }

    #[test]
    fn test_uptime_counts_from_creation() {
        let engine = InferenceEngine::new(
            InferenceConfig::default(),
            Arc::new(Uniform),
            ClassLabels::default(),
            PreprocessingConfig::new().with_image_size(8),
        )
        .unwrap();
        let before = Utc::now();
        let state = AppState::new(ServerConfig::default(), engine);
        assert!(state.started_at >= before);
        assert!(state.uptime() >= chrono::Duration::zero());
        assert!(state.started_at <= Utc::now());
    }

    #[test]
    fn test_request_ids_are_short_and_distinct() {
        let a = AppState::generate_request_id();
        let b = AppState::generate_request_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }
}
