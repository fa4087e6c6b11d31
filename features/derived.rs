//! Composite clinical indices computed from the raw feature map.
//!
//! Missing inputs fall back to neutral readings for the purpose of scoring
//! only; the raw values in the map are never touched. Every derived feature is
//! always present in the output.

use crate::features::values::FeatureMap;
use serde::Serialize;

/// Reading substituted for an absent age when scoring.
pub const DEFAULT_AGE: f64 = 50.0;
pub const DEFAULT_HEART_RATE: f64 = 80.0;
pub const DEFAULT_SYSTOLIC_BP: f64 = 120.0;
pub const DEFAULT_O2_SATURATION: f64 = 98.0;

pub const DERIVED_FEATURES: [&str; 19] = [
    "wells_tachycardia",
    "wells_dvt_signs",
    "wells_score",
    "wells_high_risk",
    "perc_age_50",
    "perc_hr_100",
    "perc_hypoxia",
    "perc_leg_swelling",
    "perc_score",
    "perc_negative",
    "shock_index",
    "shock_index_elevated",
    "vte_risk_score",
    "high_vte_risk",
    "pe_mimic_score",
    "comorbidity_burden",
    "prior_pe_with_dyspnea",
    "cancer_with_dyspnea",
    "dyspnea_hypoxia",
];

const VTE_FACTORS: [&str; 4] = [
    "prior_pe_diagnosis",
    "prior_dvt_diagnosis",
    "prior_cancer",
    "prior_thrombophilia",
];

const MIMIC_FACTORS: [&str; 6] = [
    "prior_mi",
    "prior_angina",
    "prior_heart_failure",
    "prior_pneumonia",
    "prior_asthma",
    "prior_copd",
];

const COMORBIDITIES: [&str; 6] = [
    "prior_hypertension",
    "prior_diabetes",
    "prior_heart_failure",
    "prior_copd",
    "prior_ckd",
    "prior_cancer",
];

/// All derived indices for one patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedScores {
    pub wells_tachycardia: f64,
    pub wells_dvt_signs: f64,
    pub wells_score: f64,
    pub wells_high_risk: f64,
    pub perc_age_50: f64,
    pub perc_hr_100: f64,
    pub perc_hypoxia: f64,
    pub perc_leg_swelling: f64,
    pub perc_score: f64,
    pub perc_negative: f64,
    pub shock_index: f64,
    pub shock_index_elevated: f64,
    pub vte_risk_score: f64,
    pub high_vte_risk: f64,
    pub pe_mimic_score: f64,
    pub comorbidity_burden: f64,
    pub prior_pe_with_dyspnea: f64,
    pub cancer_with_dyspnea: f64,
    pub dyspnea_hypoxia: f64,
}

impl DerivedScores {
    pub fn compute(features: &FeatureMap) -> Self {
        // --- 1. Readings with scoring defaults ---
        let age = reading(features, "age").unwrap_or(DEFAULT_AGE);
        let hr = reading(features, "triage_hr").unwrap_or(DEFAULT_HEART_RATE);
        let hr_mean = reading(features, "hr_mean").unwrap_or(hr);
        let sbp = reading(features, "triage_sbp").unwrap_or(DEFAULT_SYSTOLIC_BP);
        let sbp_mean = reading(features, "sbp_mean").unwrap_or(sbp);
        let o2sat = reading(features, "triage_o2sat").unwrap_or(DEFAULT_O2_SATURATION);
        let spo2_min = reading(features, "spo2_min").unwrap_or(o2sat);

        let leg_swelling = flag(features, "cc_leg_pain_swelling");
        let dyspnea = flag(features, "cc_dyspnea");
        let prior_pe = flag(features, "prior_pe_diagnosis");
        let prior_dvt = flag(features, "prior_dvt_diagnosis");
        let prior_cancer = flag(features, "prior_cancer");

        // --- 2. Wells ---
        let tachycardia = indicator(hr > 100.0 || hr_mean > 100.0);
        let wells_score = tachycardia + 3.0 * prior_pe + 3.0 * prior_dvt;

        // --- 3. PERC ---
        let perc_age_50 = indicator(age >= 50.0);
        let hypoxia = indicator(o2sat < 95.0 || spo2_min < 95.0);
        let perc_score = perc_age_50 + tachycardia + hypoxia + leg_swelling;

        // --- 4. Hemodynamics ---
        let shock_index = if sbp_mean > 0.0 { hr_mean / sbp_mean } else { 0.0 };

        // --- 5. History counts ---
        let vte_risk_score = count_flags(features, &VTE_FACTORS);

        Self {
            wells_tachycardia: tachycardia,
            wells_dvt_signs: leg_swelling,
            wells_score,
            wells_high_risk: indicator(wells_score >= 4.0),
            perc_age_50,
            perc_hr_100: tachycardia,
            perc_hypoxia: hypoxia,
            perc_leg_swelling: leg_swelling,
            perc_score,
            perc_negative: indicator(perc_score == 0.0),
            shock_index,
            shock_index_elevated: indicator(shock_index > 0.7),
            vte_risk_score,
            high_vte_risk: indicator(vte_risk_score >= 2.0),
            pe_mimic_score: count_flags(features, &MIMIC_FACTORS),
            comorbidity_burden: count_flags(features, &COMORBIDITIES),
            prior_pe_with_dyspnea: prior_pe * dyspnea,
            cancer_with_dyspnea: prior_cancer * dyspnea,
            dyspnea_hypoxia: dyspnea * hypoxia,
        }
    }

    /// Pairs in `DERIVED_FEATURES` order.
    pub fn entries(&self) -> [(&'static str, f64); 19] {
        [
            ("wells_tachycardia", self.wells_tachycardia),
            ("wells_dvt_signs", self.wells_dvt_signs),
            ("wells_score", self.wells_score),
            ("wells_high_risk", self.wells_high_risk),
            ("perc_age_50", self.perc_age_50),
            ("perc_hr_100", self.perc_hr_100),
            ("perc_hypoxia", self.perc_hypoxia),
            ("perc_leg_swelling", self.perc_leg_swelling),
            ("perc_score", self.perc_score),
            ("perc_negative", self.perc_negative),
            ("shock_index", self.shock_index),
            ("shock_index_elevated", self.shock_index_elevated),
            ("vte_risk_score", self.vte_risk_score),
            ("high_vte_risk", self.high_vte_risk),
            ("pe_mimic_score", self.pe_mimic_score),
            ("comorbidity_burden", self.comorbidity_burden),
            ("prior_pe_with_dyspnea", self.prior_pe_with_dyspnea),
            ("cancer_with_dyspnea", self.cancer_with_dyspnea),
            ("dyspnea_hypoxia", self.dyspnea_hypoxia),
        ]
    }
}

/// Returns a copy of `features` with every derived index added.
pub fn compute_derived_features(features: &FeatureMap) -> FeatureMap {
    let scores = DerivedScores::compute(features);
    let mut enhanced = features.clone();
    for (name, value) in scores.entries() {
        enhanced.set_number(name, value);
    }
    enhanced
}

/// A reading counts only when it is a finite, non-zero number.
fn reading(features: &FeatureMap, name: &str) -> Option<f64> {
    features
        .number(name)
        .filter(|v| v.is_finite() && *v != 0.0)
}

fn flag(features: &FeatureMap, name: &str) -> f64 {
    indicator(reading(features, name).is_some())
}

fn count_flags(features: &FeatureMap, names: &[&str]) -> f64 {
    names.iter().map(|name| flag(features, name)).sum()
}

fn indicator(condition: bool) -> f64 {
    if condition { 1.0 } else { 0.0 }
}
