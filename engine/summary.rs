//! Display-ready view of the mapped features and a report of what is missing.

use crate::features::mapper::{CANONICAL_FEATURES, RawFeatures};
use itertools::Itertools;
use serde::Serialize;

/// Features whose absence makes the assessment unreliable.
pub const CRITICAL_FIELDS: [&str; 5] = [
    "age",
    "triage_hr",
    "triage_rr",
    "triage_o2sat",
    "triage_sbp",
];

pub const OPTIONAL_FIELDS: [&str; 6] = [
    "d_dimer",
    "triage_dbp",
    "triage_temp",
    "troponin_t",
    "creatinine",
    "bmi",
];

pub const NOT_AVAILABLE: &str = "Not available";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemographicsSummary {
    pub age: String,
    pub gender: String,
    pub bmi: String,
    pub height: String,
    pub weight: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalSignsSummary {
    pub heart_rate: String,
    pub respiratory_rate: String,
    pub oxygen_saturation: String,
    pub temperature: String,
    pub blood_pressure: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaboratorySummary {
    pub d_dimer: String,
    pub troponin_t: String,
    pub nt_probnp: String,
    pub creatinine: String,
    pub hemoglobin: String,
    pub wbc: String,
    pub platelet: String,
    pub sodium: String,
    pub potassium: String,
    pub bun: String,
    pub glucose: String,
    pub lactate: String,
    pub po2: String,
    pub pco2: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataCompleteness {
    pub total_features: usize,
    pub available_features: usize,
    pub missing_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub demographics: DemographicsSummary,
    pub vital_signs: VitalSignsSummary,
    pub laboratory: LaboratorySummary,
    pub data_completeness: DataCompleteness,
}

/// `"{value:.1} {unit}"`, or `"Not available"`.
pub fn format_value(value: Option<f64>, unit: &str) -> String {
    match value {
        None => NOT_AVAILABLE.to_string(),
        Some(v) => format!("{v:.1} {unit}").trim_end().to_string(),
    }
}

pub fn feature_summary(raw: &RawFeatures) -> FeatureSummary {
    let available = raw.available_count();
    FeatureSummary {
        demographics: DemographicsSummary {
            age: format_value(raw.age, "years"),
            gender: raw
                .gender
                .map(|g| g.code().to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            bmi: format_value(raw.bmi, "kg/m²"),
            height: format_value(raw.height_cm, "cm"),
            weight: format_value(raw.weight_lbs, "lbs"),
        },
        vital_signs: VitalSignsSummary {
            heart_rate: format_value(raw.triage_hr, "bpm"),
            respiratory_rate: format_value(raw.triage_rr, "/min"),
            oxygen_saturation: format_value(raw.triage_o2sat, "%"),
            temperature: format_value(raw.triage_temp, "°C"),
            blood_pressure: format!(
                "{}/{} mmHg",
                format_value(raw.triage_sbp, ""),
                format_value(raw.triage_dbp, "")
            ),
        },
        laboratory: LaboratorySummary {
            d_dimer: format_value(raw.d_dimer, "ng/mL"),
            troponin_t: format_value(raw.troponin_t, "ng/mL"),
            nt_probnp: format_value(raw.ntprobnp, "pg/mL"),
            creatinine: format_value(raw.creatinine, "mg/dL"),
            hemoglobin: format_value(raw.hemoglobin, "g/dL"),
            wbc: format_value(raw.wbc, "K/µL"),
            platelet: format_value(raw.platelet, "K/µL"),
            sodium: format_value(raw.sodium, "mEq/L"),
            potassium: format_value(raw.potassium, "mEq/L"),
            bun: format_value(raw.bun, "mg/dL"),
            glucose: format_value(raw.glucose, "mg/dL"),
            lactate: format_value(raw.lactate, "mmol/L"),
            po2: format_value(raw.po2, "mmHg"),
            pco2: format_value(raw.pco2, "mmHg"),
        },
        data_completeness: DataCompleteness {
            total_features: CANONICAL_FEATURES.len(),
            available_features: available,
            missing_features: CANONICAL_FEATURES.len() - available,
        },
    }
}

/// Gaps in the mapped record, reported alongside the decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQuality {
    pub missing_critical: Vec<&'static str>,
    pub missing_optional: Vec<&'static str>,
    pub warnings: Vec<String>,
    pub features_available: usize,
    pub features_total: usize,
}

pub fn data_quality(raw: &RawFeatures) -> DataQuality {
    let missing = |fields: &[&'static str]| {
        fields
            .iter()
            .copied()
            .filter(|name| !raw.is_present(name))
            .collect_vec()
    };

    // A zero reading is treated the same as no reading here.
    let mut warnings = Vec::new();
    if raw.d_dimer.is_none_or(|v| v == 0.0) {
        warnings.push("D-dimer not found in FHIR data".to_string());
    }
    if raw.triage_o2sat.is_none_or(|v| v == 0.0) {
        warnings.push("SpO2 not found - critical for PE assessment".to_string());
    }

    DataQuality {
        missing_critical: missing(&CRITICAL_FIELDS),
        missing_optional: missing(&OPTIONAL_FIELDS),
        warnings,
        features_available: raw.available_count(),
        features_total: CANONICAL_FEATURES.len(),
    }
}
