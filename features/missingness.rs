//! Two-tier missing-data policy.
//!
//! Required features must be present or the assessment is refused. Optional
//! features are neutralised to `0` and paired with a `<name>_missing`
//! indicator, which is how the model was trained to see gaps.

use crate::features::values::FeatureMap;
use serde::Serialize;

/// Features without which no prediction is made, in schema order.
pub const REQUIRED_FEATURES: [&str; 6] = [
    "age",
    "triage_hr",
    "triage_rr",
    "triage_o2sat",
    "triage_sbp",
    "triage_dbp",
];

/// Features whose absence is encoded as an indicator.
pub const MISSINGNESS_FEATURES: [&str; 41] = [
    // Labs
    "wbc",
    "hemoglobin",
    "hematocrit",
    "platelet",
    "creatinine",
    "bun",
    "glucose",
    "sodium",
    "potassium",
    "lactate",
    "troponin",
    "bnp",
    "d_dimer",
    // Blood gas
    "po2",
    "pco2",
    "ph",
    "base_excess",
    // Monitored vitals
    "hr_mean",
    "hr_max",
    "hr_min",
    "hr_std",
    "sbp_mean",
    "sbp_max",
    "sbp_min",
    "sbp_std",
    "dbp_mean",
    "dbp_max",
    "dbp_min",
    "dbp_std",
    "rr_mean",
    "rr_max",
    "rr_min",
    "rr_std",
    "spo2_mean",
    "spo2_max",
    "spo2_min",
    "spo2_std",
    "temp_mean",
    "temp_max",
    "temp_min",
    "temp_std",
];

pub const MISSING_SUFFIX: &str = "_missing";

/// Outcome of the required-feature check. `missing` keeps schema order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredFeatureCheck {
    missing: Vec<&'static str>,
}

impl RequiredFeatureCheck {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn missing(&self) -> &[&'static str] {
        &self.missing
    }

    pub fn into_missing(self) -> Vec<String> {
        self.missing.into_iter().map(str::to_string).collect()
    }
}

/// Checks the required features. Absent, unknown and NaN values all count as missing.
pub fn validate_required_features(features: &FeatureMap) -> RequiredFeatureCheck {
    let missing = REQUIRED_FEATURES
        .iter()
        .copied()
        .filter(|name| features.is_missing(name))
        .collect();
    RequiredFeatureCheck { missing }
}

pub fn indicator_name(feature: &str) -> String {
    format!("{feature}{MISSING_SUFFIX}")
}

/// Returns a copy of `features` with every optional feature filled and its
/// indicator set. Applying it to its own output changes nothing.
pub fn apply_missingness_features(features: &FeatureMap) -> FeatureMap {
    let mut enhanced = features.clone();
    for feature in MISSINGNESS_FEATURES {
        if features.is_missing(feature) {
            enhanced.set_number(indicator_name(feature), 1.0);
            enhanced.set_number(feature, 0.0);
        } else {
            enhanced.set_number(indicator_name(feature), 0.0);
        }
    }
    enhanced
}
