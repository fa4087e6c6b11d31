//! # Model Artifact
//!
//! The trained model as it lives on disk (a TOML file) and in memory. The
//! file is validated once at load; after that the artifact is read-only and
//! can be shared across threads.
//!
//! - Schema Validation: an empty or duplicated column list, scaler statistics
//!   of the wrong length, non-positive scales, an out-of-range threshold or
//!   an inconsistent classifier all fail the load.
//! - Fallback: when no artifact can be loaded, a rule-based classifier stands
//!   in and every result it produces is marked as reduced fidelity.

use crate::features::missingness::{MISSINGNESS_FEATURES, REQUIRED_FEATURES};
use crate::features::vector::{ColumnTransform, Scaling};
use crate::model::classifier::{Classifier, ClassifierError, ClassifierSpec, build_classifier};
use crate::model::decision::{
    DEFAULT_THRESHOLD, DecisionBands, DecisionResult, PerformanceMetrics, interpret,
};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

// --- On-Disk Format ---

/// The complete contents of a model TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub model_name: String,
    pub version: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Ordered model inputs. Position `i` of every feature vector is `feature_columns[i]`.
    pub feature_columns: Vec<String>,
    #[serde(default)]
    pub decision_bands: DecisionBands,
    #[serde(default)]
    pub metadata: ArtifactMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler: Option<ScalerSection>,
    pub classifier: ClassifierSpec,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// Scaling as persisted. Raw statistics take precedence over the column transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalerSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_column: Option<ColumnTransform>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub test_metrics: PerformanceMetrics,
}

/// Custom error type for model loading, saving, and validation.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The model artifact declares no feature columns.")]
    EmptySchema,
    #[error("Feature column '{0}' appears more than once in the model artifact.")]
    DuplicateColumn(String),
    #[error("Scaler {which} has {found} entries, but the model has {expected} feature columns.")]
    ScalerLengthMismatch {
        which: &'static str,
        found: usize,
        expected: usize,
    },
    #[error("Scaler provides a {0} vector without its counterpart; both mean and scale are required.")]
    IncompleteScaler(&'static str),
    #[error("Scaler entry for column '{column}' is invalid (mean {mean}, scale {scale}).")]
    InvalidScalerEntry {
        column: String,
        mean: f64,
        scale: f64,
    },
    #[error("Decision threshold {0} is outside the range [0, 1].")]
    ThresholdOutOfRange(f64),
    #[error(
        "Decision bands must satisfy 0 <= moderate ({moderate}) <= elevated ({elevated}) <= 1."
    )]
    InvalidBands { moderate: f64, elevated: f64 },
    #[error(
        "The rule-based fallback reads raw clinical values; a [scaler] section cannot be combined with it."
    )]
    ScalerOnFallback,
    #[error("Invalid classifier section: {0}")]
    Classifier(#[from] ClassifierError),
}

impl ArtifactFile {
    /// Saves the artifact to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }

    /// Reads an artifact file without validating it.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let file = toml::from_str(&toml_string)?;
        Ok(file)
    }
}

// --- In-Memory Artifact ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fidelity {
    Full,
    /// Produced by the rule-based fallback, not a trained model.
    Reduced,
}

/// A validated, immutable model ready to score feature vectors.
#[derive(Debug)]
pub struct ModelArtifact {
    model_name: String,
    version: String,
    columns: Vec<String>,
    scaling: Scaling,
    classifier: Box<dyn Classifier>,
    threshold: f64,
    bands: DecisionBands,
    metadata: ArtifactMetadata,
    fidelity: Fidelity,
}

/// Description of the loaded model for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub model_type: String,
    pub version: String,
    pub fidelity: Fidelity,
    pub features_count: usize,
    pub threshold: f64,
    pub decision_bands: DecisionBands,
    pub required_features: Vec<String>,
    pub missingness_features: Vec<String>,
    pub missing_value_strategy: String,
    pub performance: PerformanceMetrics,
    pub training_data: Option<String>,
    pub last_updated: Option<String>,
}

impl ModelArtifact {
    /// Validates a parsed artifact file and builds its classifier.
    pub fn from_file(file: ArtifactFile) -> Result<Self, ModelError> {
        // --- 1. Validate Schema ---
        if file.feature_columns.is_empty() {
            return Err(ModelError::EmptySchema);
        }
        let mut seen = HashSet::with_capacity(file.feature_columns.len());
        for column in &file.feature_columns {
            if !seen.insert(column.as_str()) {
                return Err(ModelError::DuplicateColumn(column.clone()));
            }
        }

        // --- 2. Validate Decision Parameters ---
        if !(0.0..=1.0).contains(&file.threshold) {
            return Err(ModelError::ThresholdOutOfRange(file.threshold));
        }
        let bands = file.decision_bands;
        if !(0.0 <= bands.moderate_below
            && bands.moderate_below <= bands.elevated_below
            && bands.elevated_below <= 1.0)
        {
            return Err(ModelError::InvalidBands {
                moderate: bands.moderate_below,
                elevated: bands.elevated_below,
            });
        }

        // --- 3. Resolve Scaling And Classifier ---
        if matches!(file.classifier, ClassifierSpec::Fallback) && file.scaler.is_some() {
            return Err(ModelError::ScalerOnFallback);
        }
        let scaling = internal::resolve_scaling(file.scaler, &file.feature_columns)?;
        let classifier = build_classifier(&file.classifier, &file.feature_columns)?;
        let fidelity = match file.classifier {
            ClassifierSpec::Fallback => Fidelity::Reduced,
            _ => Fidelity::Full,
        };

        Ok(Self {
            model_name: file.model_name,
            version: file.version,
            columns: file.feature_columns,
            scaling,
            classifier,
            threshold: file.threshold,
            bands,
            metadata: file.metadata,
            fidelity,
        })
    }

    /// Loads and validates a model TOML file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        log::info!("Loading PE model from {}", path.display());
        let artifact = Self::from_file(ArtifactFile::load(path)?)?;
        log::info!(
            "Model loaded: {} (version {}, {} features, threshold {:.4})",
            artifact.model_name,
            artifact.version,
            artifact.columns.len(),
            artifact.threshold
        );
        Ok(artifact)
    }

    /// The rule-based stand-in, laid out over the required features only.
    pub fn fallback() -> Self {
        let columns: Vec<String> = REQUIRED_FEATURES.iter().map(|s| s.to_string()).collect();
        let classifier = Box::new(crate::model::classifier::FallbackClassifier::for_columns(&columns));
        Self {
            model_name: "Rule-based fallback".to_string(),
            version: "fallback".to_string(),
            columns,
            scaling: Scaling::None,
            classifier,
            threshold: DEFAULT_THRESHOLD,
            bands: DecisionBands::default(),
            metadata: ArtifactMetadata::default(),
            fidelity: Fidelity::Reduced,
        }
    }

    /// Loads `path` if given, substituting the fallback when there is no path
    /// or the file cannot be loaded. Never fails.
    pub fn load_or_fallback(path: Option<&Path>) -> Self {
        match path {
            None => {
                log::warn!("No PE model configured. Using rule-based fallback (reduced fidelity).");
                Self::fallback()
            }
            Some(path) => match Self::load(path) {
                Ok(artifact) => artifact,
                Err(e) => {
                    log::warn!(
                        "Failed to load PE model from {}: {}. Using rule-based fallback (reduced fidelity).",
                        path.display(),
                        e
                    );
                    Self::fallback()
                }
            },
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn scaling(&self) -> &Scaling {
        &self.scaling
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn fidelity(&self) -> Fidelity {
        self.fidelity
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metadata.test_metrics
    }

    /// Probability of PE for a vector laid out per `columns()`.
    pub fn predict_probability(&self, vector: ArrayView1<f64>) -> f64 {
        self.classifier.predict_probability(vector)
    }

    /// Interprets a probability with this artifact's threshold, bands and metrics.
    pub fn interpret(&self, probability: f64) -> DecisionResult {
        let mut result = interpret(
            probability,
            self.threshold,
            &self.bands,
            &self.metadata.test_metrics,
        );
        if self.fidelity == Fidelity::Reduced {
            result.reduced_fidelity = true;
            result.warnings.push(
                "No trained model is loaded; this probability comes from a rule-based fallback."
                    .to_string(),
            );
        }
        result
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            model_name: self.model_name.clone(),
            model_type: self.classifier.describe(),
            version: self.version.clone(),
            fidelity: self.fidelity,
            features_count: self.columns.len(),
            threshold: self.threshold,
            decision_bands: self.bands,
            required_features: REQUIRED_FEATURES.iter().map(|s| s.to_string()).collect(),
            missingness_features: MISSINGNESS_FEATURES.iter().map(|s| s.to_string()).collect(),
            missing_value_strategy: "hybrid".to_string(),
            performance: self.metadata.test_metrics,
            training_data: self.metadata.training_data.clone(),
            last_updated: self.metadata.last_updated.clone(),
        }
    }
}

/// Internal module for load-time validation details.
mod internal {
    use super::{ModelError, ScalerSection};
    use crate::features::vector::Scaling;
    use ndarray::Array1;

    /// Picks the scaling path. Statistics must cover every column with a
    /// finite mean and a positive, finite scale; the column transform is only
    /// checked when it is applied.
    pub(super) fn resolve_scaling(
        scaler: Option<ScalerSection>,
        columns: &[String],
    ) -> Result<Scaling, ModelError> {
        let Some(scaler) = scaler else {
            return Ok(Scaling::None);
        };

        match (scaler.mean, scaler.scale) {
            (Some(mean), Some(scale)) => {
                for (which, values) in [("mean", &mean), ("scale", &scale)] {
                    if values.len() != columns.len() {
                        return Err(ModelError::ScalerLengthMismatch {
                            which,
                            found: values.len(),
                            expected: columns.len(),
                        });
                    }
                }
                for ((column, &m), &s) in columns.iter().zip(&mean).zip(&scale) {
                    if !m.is_finite() || !s.is_finite() || s <= 0.0 {
                        return Err(ModelError::InvalidScalerEntry {
                            column: column.clone(),
                            mean: m,
                            scale: s,
                        });
                    }
                }
                Ok(Scaling::Statistics {
                    mean: Array1::from(mean),
                    scale: Array1::from(scale),
                })
            }
            (Some(_), None) => Err(ModelError::IncompleteScaler("mean")),
            (None, Some(_)) => Err(ModelError::IncompleteScaler("scale")),
            (None, None) => Ok(scaler
                .by_column
                .map(Scaling::Transform)
                .unwrap_or(Scaling::None)),
        }
    }
}
