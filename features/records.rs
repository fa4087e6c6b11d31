//! # Clinical Record Types
//!
//! This module defines the shape of the data handed to the engine by the
//! record-fetching layer. Records arrive already tagged with a category and in
//! the order the caller wants them prioritised (most recent first); nothing in
//! here reorders, deduplicates or fetches anything.
//!
//! - Lenient Values: an observation value may be a quantity, a bare integer or
//!   decimal, a string, or a panel of components. Every shape is accepted at
//!   parse time; whether a numeric value can be pulled out is decided later by
//!   the feature mapper.
//! - Strict Envelope: the input file itself must be valid JSON in the expected
//!   layout. `InputError` reports which file could not be read or parsed.

use crate::features::values::FeatureMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Coding system URI for LOINC observation codes.
pub const LOINC_SYSTEM: &str = "http://loinc.org";

/// One `(system, code)` pair attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default)]
    pub system: Option<String>,
    pub code: String,
    #[serde(default)]
    pub display: Option<String>,
}

impl Coding {
    pub fn loinc(code: &str) -> Self {
        Self {
            system: Some(LOINC_SYSTEM.to_string()),
            code: code.to_string(),
            display: None,
        }
    }

    /// Codings without a system are trusted as LOINC; anything else must say so.
    pub fn is_loinc(&self) -> bool {
        match &self.system {
            None => true,
            Some(system) => system == LOINC_SYSTEM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordCategory {
    #[serde(alias = "vital-signs")]
    Vital,
    #[serde(alias = "laboratory")]
    Lab,
    Condition,
    Medication,
    Imaging,
}

impl RecordCategory {
    /// Vitals and labs carry measured values; the other categories carry history.
    pub fn is_observation(self) -> bool {
        matches!(self, RecordCategory::Vital | RecordCategory::Lab)
    }
}

/// A sub-measurement of a panel observation (e.g. the systolic half of a blood pressure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationComponent {
    #[serde(default)]
    pub codes: Vec<Coding>,
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub value: Option<ObservationValue>,
    #[serde(default)]
    pub unit: Option<String>,
}

/// The value carried by an observation. Variant order matters for untagged
/// parsing: panels first, then quantities, then bare numbers, then text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservationValue {
    Composite {
        components: Vec<ObservationComponent>,
    },
    Quantity {
        #[serde(default)]
        value: Option<f64>,
        #[serde(default)]
        unit: Option<String>,
    },
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl ObservationValue {
    /// Numeric reading of a scalar value. Panels never yield a value here; the
    /// mapper decides which component to read.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ObservationValue::Quantity { value, .. } => *value,
            ObservationValue::Integer(v) => Some(*v as f64),
            ObservationValue::Decimal(v) => Some(*v),
            ObservationValue::Text(text) => text.trim().parse::<f64>().ok(),
            ObservationValue::Composite { .. } => None,
        }
    }

    pub fn components(&self) -> &[ObservationComponent] {
        match self {
            ObservationValue::Composite { components } => components,
            _ => &[],
        }
    }
}

/// One lab, vital, condition, medication or imaging entry from the external record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalObservationRecord {
    #[serde(default)]
    pub codes: Vec<Coding>,
    #[serde(default)]
    pub display: Option<String>,
    pub category: RecordCategory,
    #[serde(default)]
    pub value: Option<ObservationValue>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Medication or condition status (e.g. "active", "resolved").
    #[serde(default)]
    pub status: Option<String>,
}

impl ClinicalObservationRecord {
    pub fn new(category: RecordCategory) -> Self {
        Self {
            codes: Vec::new(),
            display: None,
            category,
            value: None,
            unit: None,
            timestamp: None,
            status: None,
        }
    }

    /// Convenience constructor for a single LOINC-coded quantity.
    pub fn quantity(category: RecordCategory, loinc: &str, value: f64, unit: &str) -> Self {
        Self {
            codes: vec![Coding::loinc(loinc)],
            value: Some(ObservationValue::Quantity {
                value: Some(value),
                unit: Some(unit.to_string()),
            }),
            unit: Some(unit.to_string()),
            ..Self::new(category)
        }
    }

    pub fn with_display(mut self, display: &str) -> Self {
        self.display = Some(display.to_string());
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: &str) -> Self {
        self.timestamp = Some(timestamp.to_string());
        self
    }

    /// LOINC codes attached directly to this record.
    pub fn loinc_codes(&self) -> impl Iterator<Item = &str> {
        self.codes
            .iter()
            .filter(|c| c.is_loinc())
            .map(|c| c.code.as_str())
    }

    /// Every code string regardless of system, in declaration order.
    pub fn code_strings(&self) -> Vec<&str> {
        self.codes.iter().map(|c| c.code.as_str()).collect()
    }

    /// Display text, falling back to the first coding's display.
    pub fn display_text(&self) -> Option<&str> {
        self.display
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or_else(|| self.codes.iter().find_map(|c| c.display.as_deref()))
    }

    /// First ten characters of the timestamp, i.e. the calendar date.
    pub fn date(&self) -> Option<&str> {
        let ts = self.timestamp.as_deref()?;
        ts.get(..10).or(Some(ts))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDemographics {
    /// Birth date as `YYYY-MM-DD`.
    #[serde(default, alias = "birthDate")]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
}

/// Everything needed to assess one patient: demographics, records, and any
/// features the caller already knows (history flags, monitored aggregates).
/// Features given here override values mapped from records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInput {
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub demographics: Option<PatientDemographics>,
    #[serde(default)]
    pub records: Vec<ClinicalObservationRecord>,
    #[serde(default)]
    pub features: FeatureMap,
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Failed to read input file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Input file '{path}' is not a valid assessment document: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AssessmentInput {
    /// Reads a single assessment document.
    pub fn from_json_file(path: &Path) -> Result<Self, InputError> {
        let text = read_input(path)?;
        serde_json::from_str(&text).map_err(|source| InputError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Reads a JSON array of assessment documents.
    pub fn batch_from_json_file(path: &Path) -> Result<Vec<Self>, InputError> {
        let text = read_input(path)?;
        serde_json::from_str(&text).map_err(|source| InputError::Json {
            path: path.display().to_string(),
            source,
        })
    }
}

fn read_input(path: &Path) -> Result<String, InputError> {
    fs::read_to_string(path).map_err(|source| InputError::Io {
        path: path.display().to_string(),
        source,
    })
}
