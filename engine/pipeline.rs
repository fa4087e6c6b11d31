//! # Assessment Pipeline
//!
//! Runs one patient through every stage, in order:
//!
//! 1. Required-feature validation. A gap here rejects the request and no
//!    prediction is made.
//! 2. Derived indices.
//! 3. Missingness indicators for optional features.
//! 4. Vector layout and scaling against the artifact's schema.
//! 5. Prediction and interpretation.
//!
//! Each call is independent. The artifact is only ever borrowed, so one
//! loaded model can serve any number of threads.

use crate::clinical::{ClinicalContext, clinical_context};
use crate::features::derived::compute_derived_features;
use crate::features::mapper::{map_features, supplementary_features};
use crate::features::missingness::{apply_missingness_features, validate_required_features};
use crate::features::records::{AssessmentInput, ClinicalObservationRecord, PatientDemographics};
use crate::features::values::FeatureMap;
use crate::features::vector::{VectorDiagnostics, build_feature_vector};
use crate::model::artifact::ModelArtifact;
use crate::model::decision::{Decision, DecisionResult};
use crate::summary::{DataQuality, FeatureSummary, data_quality, feature_summary};
use chrono::NaiveDate;
use ndarray::Array1;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssessmentError {
    #[error(
        "Cannot assess PE risk: required features are missing: {}. Please ensure vital signs are recorded.",
        missing.join(", ")
    )]
    RequiredFeatureMissing { missing: Vec<String> },
}

/// A completed prediction and what happened to the vector on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub result: DecisionResult,
    pub diagnostics: VectorDiagnostics,
}

/// Validates, enriches and lays out `features` for `artifact`.
pub fn prepare_feature_vector(
    artifact: &ModelArtifact,
    features: &FeatureMap,
) -> Result<(Array1<f64>, VectorDiagnostics), AssessmentError> {
    // --- 1. Validate Required Features ---
    let check = validate_required_features(features);
    if !check.is_complete() {
        return Err(AssessmentError::RequiredFeatureMissing {
            missing: check.into_missing(),
        });
    }

    // --- 2. Derive And Encode Missingness ---
    let enhanced = compute_derived_features(features);
    let enhanced = apply_missingness_features(&enhanced);

    // --- 3. Lay Out The Vector ---
    Ok(build_feature_vector(
        &enhanced,
        artifact.columns(),
        artifact.scaling(),
    ))
}

/// Scores a feature map and interprets the probability.
pub fn assess(
    artifact: &ModelArtifact,
    features: &FeatureMap,
) -> Result<Assessment, AssessmentError> {
    let (vector, diagnostics) = prepare_feature_vector(artifact, features)?;
    let probability = artifact.predict_probability(vector.view());

    let mut result = artifact.interpret(probability);
    result.warnings.extend(diagnostics.warnings());

    log::info!(
        "PE assessment complete: probability {:.4}, threshold {:.4}, decision {}",
        result.probability,
        result.threshold,
        result.decision.as_str()
    );
    Ok(Assessment {
        result,
        diagnostics,
    })
}

// --- Record-Level Assessment ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Assessed {
        result: DecisionResult,
        diagnostics: VectorDiagnostics,
    },
    Rejected {
        missing_features: Vec<String>,
        message: String,
    },
}

/// Everything reported for one patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientReport {
    pub patient_id: Option<String>,
    pub outcome: Outcome,
    pub feature_summary: FeatureSummary,
    pub data_quality: DataQuality,
    pub clinical_context: ClinicalContext,
}

impl PatientReport {
    pub fn is_rejected(&self) -> bool {
        matches!(self.outcome, Outcome::Rejected { .. })
    }

    pub fn result(&self) -> Option<&DecisionResult> {
        match &self.outcome {
            Outcome::Assessed { result, .. } => Some(result),
            Outcome::Rejected { .. } => None,
        }
    }

    pub fn decision(&self) -> Option<Decision> {
        self.result().map(|r| r.decision)
    }
}

/// Maps records to features, overlays `extra` (which wins on conflicts), and
/// assesses the result. A rejection is reported in the outcome rather than
/// returned as an error, so the summary and context are always available.
pub fn assess_records(
    artifact: &ModelArtifact,
    demographics: Option<&PatientDemographics>,
    records: &[ClinicalObservationRecord],
    extra: &FeatureMap,
    as_of: NaiveDate,
) -> PatientReport {
    let mut raw = map_features(demographics, records, as_of);

    let mut features = raw.to_feature_map();
    features.merge(&supplementary_features(records));
    features.merge(extra);
    // The summary describes the values that were actually scored.
    raw.overlay(extra);

    let outcome = match assess(artifact, &features) {
        Ok(Assessment {
            result,
            diagnostics,
        }) => Outcome::Assessed {
            result,
            diagnostics,
        },
        Err(e) => {
            log::warn!("{}", e);
            let message = e.to_string();
            let AssessmentError::RequiredFeatureMissing { missing } = e;
            Outcome::Rejected {
                missing_features: missing,
                message,
            }
        }
    };

    PatientReport {
        patient_id: None,
        outcome,
        feature_summary: feature_summary(&raw),
        data_quality: data_quality(&raw),
        clinical_context: clinical_context(records),
    }
}

pub fn assess_patient(
    artifact: &ModelArtifact,
    input: &AssessmentInput,
    as_of: NaiveDate,
) -> PatientReport {
    let mut report = assess_records(
        artifact,
        input.demographics.as_ref(),
        &input.records,
        &input.features,
        as_of,
    );
    report.patient_id = input.patient_id.clone();
    report
}
