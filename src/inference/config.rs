//! Inference configuration

use serde::{Deserialize, Serialize};

/// Decimal places scores are rounded to in responses
pub const DEFAULT_SCORE_DECIMALS: u32 = 4;

/// Upper bound for `SCORE_DECIMALS`; `f64` carries no more meaningful digits
pub const MAX_SCORE_DECIMALS: u32 = 12;

/// Configuration for the inference engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Decimal places for `confidence` and `all_scores`
    pub score_decimals: u32,

    /// Emit the full score vector in the per-request debug log
    pub log_scores: bool,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            score_decimals: DEFAULT_SCORE_DECIMALS,
            log_scores: false,
        }
    }
}

impl InferenceConfig {
    /// Create a new inference configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `SCORE_DECIMALS` and `LOG_SCORES` from the environment
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(decimals) = var("SCORE_DECIMALS")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|d| *d <= MAX_SCORE_DECIMALS)
        {
            config = config.with_score_decimals(decimals);
        }
        let log_scores = var("LOG_SCORES")
            .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        if log_scores {
            config = config.with_score_logging();
        }
        config
    }

    /// Builder method to set score precision
    pub fn with_score_decimals(mut self, decimals: u32) -> Self {
        self.score_decimals = decimals;
        self
    }

    /// Builder method to log raw score vectors
    pub fn with_score_logging(mut self) -> Self {
        self.log_scores = true;
        self
    }
}
