//! Auxiliary artifacts that travel with the classifiers: the image label map,
//! and the audio scaler and label encoder. All three are JSON files written at
//! training time and validated once when the registry loads.

use std::{collections::HashMap, collections::HashSet, fs, path::Path};

use ndarray::Array2;
use serde::Deserialize;
use thiserror::Error;

use crate::model::types::UNKNOWN_LABEL;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid artifact: {0}")]
    Invalid(String),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ArtifactError> {
    let raw = fs::read_to_string(path).map_err(|source| ArtifactError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Index → class name lookup for the image classifier.
#[derive(Debug, Clone)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    /// Loads a `{"label": index}` file and inverts it.
    pub fn from_path(path: &Path) -> Result<Self, ArtifactError> {
        let indices: HashMap<String, i64> = read_json(path)?;
        Self::from_class_indices(indices)
    }

    /// Inverts a class-name → index map, rejecting anything that is not a
    /// bijection onto `0..n`.
    pub fn from_class_indices(indices: HashMap<String, i64>) -> Result<Self, ArtifactError> {
        if indices.is_empty() {
            return Err(ArtifactError::Invalid("label map is empty".into()));
        }
        let n = indices.len();
        let mut slots: Vec<Option<String>> = vec![None; n];
        for (label, index) in indices {
            let slot = usize::try_from(index)
                .ok()
                .and_then(|i| slots.get_mut(i))
                .ok_or_else(|| {
                    ArtifactError::Invalid(format!(
                        "label '{label}' has index {index} outside 0..{n}"
                    ))
                })?;
            if let Some(existing) = slot.as_ref() {
                return Err(ArtifactError::Invalid(format!(
                    "index {index} is assigned to both '{existing}' and '{label}'"
                )));
            }
            *slot = Some(label);
        }
        // n distinct keys filling n slots without collision leaves no holes.
        let labels = slots.into_iter().flatten().collect();
        Ok(Self { labels })
    }

    pub fn from_labels(labels: Vec<String>) -> Result<Self, ArtifactError> {
        ensure_unique(&labels)?;
        if labels.is_empty() {
            return Err(ArtifactError::Invalid("label map is empty".into()));
        }
        Ok(Self { labels })
    }

    /// Resolves an index, falling back to [`UNKNOWN_LABEL`].
    pub fn label(&self, index: usize) -> &str {
        self.labels
            .get(index)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Per-feature standardisation fitted on the training embeddings.
#[derive(Debug, Clone, Deserialize)]
pub struct Scaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl Scaler {
    pub fn from_path(path: &Path, expected_dim: usize) -> Result<Self, ArtifactError> {
        let scaler: Scaler = read_json(path)?;
        scaler.validate(expected_dim)?;
        Ok(scaler)
    }

    pub fn new(mean: Vec<f32>, scale: Vec<f32>) -> Result<Self, ArtifactError> {
        let scaler = Self { mean, scale };
        scaler.validate(scaler.mean.len())?;
        Ok(scaler)
    }

    fn validate(&self, expected_dim: usize) -> Result<(), ArtifactError> {
        if self.mean.len() != self.scale.len() {
            return Err(ArtifactError::Invalid(format!(
                "scaler mean has {} entries but scale has {}",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if self.mean.len() != expected_dim {
            return Err(ArtifactError::Invalid(format!(
                "scaler expects {} features, embedding has {expected_dim}",
                self.mean.len()
            )));
        }
        if self
            .mean
            .iter()
            .chain(self.scale.iter())
            .any(|v| !v.is_finite())
        {
            return Err(ArtifactError::Invalid("scaler contains non-finite values".into()));
        }
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Applies `(x - mean) / scale` to every row. A zero scale is treated as 1.
    pub fn transform(&self, rows: &Array2<f32>) -> Result<Array2<f32>, ArtifactError> {
        if rows.ncols() != self.dim() {
            return Err(ArtifactError::Invalid(format!(
                "scaler expects {} features, got {}",
                self.dim(),
                rows.ncols()
            )));
        }
        let mut out = rows.clone();
        for mut row in out.rows_mut() {
            for ((value, mean), scale) in row.iter_mut().zip(&self.mean).zip(&self.scale) {
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                *value = (*value - mean) / scale;
            }
        }
        Ok(out)
    }
}

/// Integer class → original label string, as fitted during training.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn from_path(path: &Path) -> Result<Self, ArtifactError> {
        let encoder: LabelEncoder = read_json(path)?;
        Self::new(encoder.classes)
    }

    pub fn new(classes: Vec<String>) -> Result<Self, ArtifactError> {
        if classes.is_empty() {
            return Err(ArtifactError::Invalid("label encoder has no classes".into()));
        }
        ensure_unique(&classes)?;
        Ok(Self { classes })
    }

    pub fn inverse_transform(&self, index: usize) -> &str {
        self.classes
            .get(index)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn ensure_unique(labels: &[String]) -> Result<(), ArtifactError> {
    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels {
        if !seen.insert(label.as_str()) {
            return Err(ArtifactError::Invalid(format!("duplicate label '{label}'")));
        }
    }
    Ok(())
}
