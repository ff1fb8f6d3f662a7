//! Weights artifact: named float tensors, bincode-encoded

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DermaError, Result};

/// Current version of the weights file layout
pub const WEIGHTS_FORMAT_VERSION: u32 = 1;

/// One parameter tensor of one layer, row-major
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub layer: String,
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl NamedTensor {
    pub fn new(layer: impl Into<String>, name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self {
            layer: layer.into(),
            name: name.into(),
            shape,
            values,
        }
    }

    /// `layer/name`, the Keras-style weight path
    pub fn path(&self) -> String {
        format!("{}/{}", self.layer, self.name)
    }
}

/// Contents of the weights artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightFile {
    pub format_version: u32,
    pub tensors: Vec<NamedTensor>,
}

impl WeightFile {
    pub fn new(tensors: Vec<NamedTensor>) -> Self {
        Self {
            format_version: WEIGHTS_FORMAT_VERSION,
            tensors,
        }
    }

    /// Load a weights artifact from disk
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let file: Self = bincode::deserialize_from(reader).map_err(|e| {
            DermaError::IncompatibleWeights(format!("malformed weights artifact: {}", e))
        })?;
        if file.format_version != WEIGHTS_FORMAT_VERSION {
            return Err(DermaError::IncompatibleWeights(format!(
                "unsupported weights format version {} (expected {})",
                file.format_version, WEIGHTS_FORMAT_VERSION
            )));
        }
        Ok(file)
    }

    /// Save the weights artifact to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(&mut writer, self)
            .map_err(|e| DermaError::ConfigError(format!("failed to write weights: {}", e)))?;
        writer.flush()?;
        Ok(())
    }
}

/// Pool of tensors waiting to be bound to layers.
///
/// Binding consumes entries; whatever is left once every layer has taken its
/// parameters does not belong to the architecture.
#[derive(Debug, Default)]
pub(crate) struct WeightStore {
    tensors: HashMap<(String, String), NamedTensor>,
}

impl WeightStore {
    /// Add tensors, replacing any already present under the same path
    pub fn extend(&mut self, tensors: impl IntoIterator<Item = NamedTensor>) {
        for tensor in tensors {
            self.tensors
                .insert((tensor.layer.clone(), tensor.name.clone()), tensor);
        }
    }

    /// Remove and return the values of `layer/name`, requiring an exact shape match
    pub fn take(&mut self, layer: &str, name: &str, expected: &[usize]) -> Result<Vec<f32>> {
        let tensor = self
            .tensors
            .remove(&(layer.to_string(), name.to_string()))
            .ok_or_else(|| {
                DermaError::IncompatibleWeights(format!("missing tensor '{}/{}'", layer, name))
            })?;

        if tensor.shape != expected {
            return Err(DermaError::IncompatibleWeights(format!(
                "tensor '{}' has shape {:?}, layer expects {:?}",
                tensor.path(),
                tensor.shape,
                expected
            )));
        }
        let len: usize = expected.iter().product();
        if tensor.values.len() != len {
            return Err(DermaError::IncompatibleWeights(format!(
                "tensor '{}' declares {} values but holds {}",
                tensor.path(),
                len,
                tensor.values.len()
            )));
        }
        Ok(tensor.values)
    }

    /// Fail if any tensor was never bound
    pub fn ensure_consumed(&self) -> Result<()> {
        if self.tensors.is_empty() {
            return Ok(());
        }
        let mut leftover: Vec<String> = self.tensors.values().map(NamedTensor::path).collect();
        leftover.sort();
        Err(DermaError::IncompatibleWeights(format!(
            "unexpected tensors not used by any layer: {}",
            leftover.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_checks_shape() {
        let mut store = WeightStore::default();
        store.extend(vec![NamedTensor::new("dense", "kernel", vec![2, 3], vec![0.0; 6])]);
        let err = store.take("dense", "kernel", &[3, 2]).unwrap_err();
        assert!(matches!(err, DermaError::IncompatibleWeights(_)));
    }

    #[test]
    fn test_take_checks_value_count() {
        let mut store = WeightStore::default();
        store.extend(vec![NamedTensor::new("dense", "bias", vec![4], vec![0.0; 3])]);
        assert!(store.take("dense", "bias", &[4]).is_err());
    }

    #[test]
    fn test_later_tensors_override() {
        let mut store = WeightStore::default();
        store.extend(vec![NamedTensor::new("d", "bias", vec![1], vec![1.0])]);
        store.extend(vec![NamedTensor::new("d", "bias", vec![1], vec![2.0])]);
        assert_eq!(store.take("d", "bias", &[1]).unwrap(), vec![2.0]);
        assert!(store.ensure_consumed().is_ok());
    }

    #[test]
    fn test_leftovers_are_reported() {
        let mut store = WeightStore::default();
        store.extend(vec![NamedTensor::new("ghost", "kernel", vec![1], vec![0.0])]);
        let err = store.ensure_consumed().unwrap_err();
        assert!(err.to_string().contains("ghost/kernel"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        let file = WeightFile::new(vec![NamedTensor::new("d", "kernel", vec![2], vec![0.5, -0.5])]);
        file.save(&path).unwrap();
        assert_eq!(WeightFile::load(&path).unwrap(), file);
    }

    #[test]
    fn test_garbage_is_incompatible() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        std::fs::write(&path, b"\x01\x00").unwrap();
        let err = WeightFile::load(&path).unwrap_err();
        assert!(matches!(err, DermaError::IncompatibleWeights(_)));
    }
}
