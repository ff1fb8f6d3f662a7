//! Ordered class labels

use serde::{Deserialize, Serialize};

use crate::error::{DermaError, Result};

/// Labels served by the default deployment, in model output order
pub const DEFAULT_CLASS_NAMES: [&str; 2] = ["Acne", "Atropic Dermatitis"];

/// Ordered, non-empty, duplicate-free class names.
///
/// Position `i` names output `i` of the network's final layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ClassLabels(Vec<String>);

impl ClassLabels {
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(DermaError::ConfigError("class label list is empty".to_string()));
        }
        for (i, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(DermaError::ConfigError(format!("class label {} is blank", i)));
            }
            if labels[..i].contains(label) {
                return Err(DermaError::ConfigError(format!(
                    "class label '{}' appears more than once",
                    label
                )));
            }
        }
        Ok(Self(labels))
    }

    /// Parse a comma-separated list, trimming whitespace around each name
    pub fn parse_list(list: &str) -> Result<Self> {
        Self::new(list.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for ClassLabels {
    fn default() -> Self {
        Self(DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

impl TryFrom<Vec<String>> for ClassLabels {
    type Error = DermaError;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::new(labels)
    }
}

impl From<ClassLabels> for Vec<String> {
    fn from(labels: ClassLabels) -> Self {
        labels.0
    }
}
