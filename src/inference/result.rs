//! Prediction result and score post-processing

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::error::{DermaError, Result};
use crate::model::ClassLabels;

/// Round to a fixed number of decimal places, half away from zero.
///
/// Idempotent: rounding an already rounded value returns the same `f64`.
pub fn round_score(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Index of the largest score; the first one wins on ties
pub fn top1_index<T: PartialOrd + Copy>(scores: &[T]) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Classification of one image.
///
/// Serializes as `{"class", "confidence", "all_scores"}` with `all_scores`
/// keys in label order.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// Top-1 label
    pub label: String,
    /// Position of the top-1 label
    pub index: usize,
    /// Rounded score of the top-1 label
    pub confidence: f64,
    /// `(label, rounded score)` for every class, in label order
    pub scores: Vec<(String, f64)>,
}

impl PredictionResult {
    /// Map a raw score vector onto the labels
    pub fn from_scores(raw: &[f32], labels: &ClassLabels, decimals: u32) -> Result<Self> {
        if raw.len() != labels.len() {
            return Err(DermaError::InferenceFault(format!(
                "model returned {} scores for {} labels",
                raw.len(),
                labels.len()
            )));
        }
        if raw.iter().any(|s| !s.is_finite()) {
            return Err(DermaError::InferenceFault(
                "model returned non-finite scores".to_string(),
            ));
        }

        let scores: Vec<(String, f64)> = labels
            .iter()
            .zip(raw)
            .map(|(label, &score)| (label.to_string(), round_score(score as f64, decimals)))
            .collect();

        // `class` is always a maximal entry of the reported `all_scores`
        let rounded: Vec<f64> = scores.iter().map(|(_, s)| *s).collect();
        let index = top1_index(&rounded)
            .ok_or_else(|| DermaError::InferenceFault("model returned no scores".to_string()))?;

        Ok(Self {
            label: scores[index].0.clone(),
            index,
            confidence: scores[index].1,
            scores,
        })
    }

    /// Rounded score for a label
    pub fn score(&self, label: &str) -> Option<f64> {
        self.scores.iter().find(|(l, _)| l == label).map(|(_, s)| *s)
    }
}

struct OrderedScores<'a>(&'a [(String, f64)]);

impl Serialize for OrderedScores<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, score) in self.0 {
            map.serialize_entry(label, score)?;
        }
        map.end()
    }
}

impl Serialize for PredictionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PredictionResult", 3)?;
        state.serialize_field("class", &self.label)?;
        state.serialize_field("confidence", &self.confidence)?;
        state.serialize_field("all_scores", &OrderedScores(&self.scores))?;
        state.end()
    }
}
