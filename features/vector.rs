//! # Feature Vector Builder
//!
//! Lays the processed feature map out in the column order the model expects
//! and applies the stored scaling.
//!
//! - Tolerance: a value that cannot be read as a finite number becomes `0`,
//!   and so does a column the pipeline never produced. Both are recorded in
//!   `VectorDiagnostics` rather than raised.
//! - Scaling chain: stored mean/scale statistics are preferred. A per-column
//!   transform is the secondary path; if it cannot be applied the vector is
//!   passed through unscaled and the failure is logged.
//! - Gender: a `gender` column is encoded as 1 for male and 0 otherwise,
//!   the single-column encoding the model was trained with.

use crate::features::mapper::Gender;
use crate::features::values::{FeatureMap, FeatureValue};
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Per-column centre and scale, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnTransform {
    #[serde(default)]
    pub center: HashMap<String, f64>,
    #[serde(default)]
    pub scale: HashMap<String, f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScalingError {
    #[error("The scaling transform has no entry for column '{0}'.")]
    MissingColumn(String),
    #[error("The scaling transform has a non-positive or non-finite scale ({scale}) for column '{column}'.")]
    InvalidScale { column: String, scale: f64 },
}

impl ColumnTransform {
    /// Applies `(x - center) / scale` column by column. Any column without a
    /// usable entry fails the whole transform.
    pub fn transform(
        &self,
        columns: &[String],
        values: ArrayView1<f64>,
    ) -> Result<Array1<f64>, ScalingError> {
        let mut out = Array1::zeros(values.len());
        for (i, column) in columns.iter().enumerate() {
            let center = self
                .center
                .get(column)
                .ok_or_else(|| ScalingError::MissingColumn(column.clone()))?;
            let scale = self
                .scale
                .get(column)
                .ok_or_else(|| ScalingError::MissingColumn(column.clone()))?;
            if !scale.is_finite() || *scale <= 0.0 {
                return Err(ScalingError::InvalidScale {
                    column: column.clone(),
                    scale: *scale,
                });
            }
            out[i] = (values[i] - center) / scale;
        }
        Ok(out)
    }
}

/// How a vector is rescaled before it reaches the classifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Scaling {
    /// Raw statistics, one entry per column, validated when the artifact loads.
    Statistics {
        mean: Array1<f64>,
        scale: Array1<f64>,
    },
    Transform(ColumnTransform),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingApplied {
    Statistics,
    Transform,
    Unscaled,
}

/// What happened while the vector was assembled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorDiagnostics {
    /// Columns whose value was present but not a finite number.
    pub malformed: Vec<String>,
    /// Columns the feature pipeline never produced.
    pub absent: Vec<String>,
    pub scaling: ScalingApplied,
    /// Set when the transform path failed and the vector went through unscaled.
    pub scaling_error: Option<String>,
}

impl VectorDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty() && self.absent.is_empty() && self.scaling_error.is_none()
    }

    /// Human-readable notes for anything that degraded the vector.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.malformed.is_empty() {
            warnings.push(format!(
                "Non-numeric values were replaced with 0 for: {}",
                self.malformed.join(", ")
            ));
        }
        if !self.absent.is_empty() {
            warnings.push(format!(
                "{} model column(s) were not produced from the input and defaulted to 0: {}",
                self.absent.len(),
                self.absent.join(", ")
            ));
        }
        if let Some(error) = &self.scaling_error {
            warnings.push(format!("Scaling unavailable, values used unscaled: {error}"));
        }
        warnings
    }
}

fn column_number(column: &str, value: &FeatureValue) -> Option<f64> {
    match value {
        FeatureValue::Text(text) if column == "gender" => Gender::parse(text).map(Gender::indicator),
        other => other.as_f64(),
    }
}

/// Builds the ordered vector for `columns` from a fully processed feature map.
pub fn build_feature_vector(
    features: &FeatureMap,
    columns: &[String],
    scaling: &Scaling,
) -> (Array1<f64>, VectorDiagnostics) {
    // --- 1. Lay Out Columns ---
    let mut malformed = Vec::new();
    let mut absent = Vec::new();
    let raw: Array1<f64> = columns
        .iter()
        .map(|column| {
            if !features.contains_key(column) {
                absent.push(column.clone());
                return 0.0;
            }
            match features.get(column) {
                None => 0.0,
                Some(value) => match column_number(column, value) {
                    Some(v) if v.is_finite() => v,
                    _ => {
                        malformed.push(column.clone());
                        0.0
                    }
                },
            }
        })
        .collect();

    // --- 2. Apply Scaling ---
    let (vector, applied, scaling_error) = match scaling {
        Scaling::Statistics { mean, scale } => {
            let mut scaled = raw;
            Zip::from(&mut scaled)
                .and(mean)
                .and(scale)
                .for_each(|x, &m, &s| *x = (*x - m) / s);
            (scaled, ScalingApplied::Statistics, None)
        }
        Scaling::Transform(transform) => match transform.transform(columns, raw.view()) {
            Ok(scaled) => (scaled, ScalingApplied::Transform, None),
            Err(e) => {
                log::warn!("Scaler failed ({}), skipping scaling", e);
                (raw, ScalingApplied::Unscaled, Some(e.to_string()))
            }
        },
        Scaling::None => (raw, ScalingApplied::Unscaled, None),
    };

    if !absent.is_empty() {
        log::debug!("{} model columns absent from features: {:?}", absent.len(), absent);
    }

    (
        vector,
        VectorDiagnostics {
            malformed,
            absent,
            scaling: applied,
            scaling_error,
        },
    )
}
