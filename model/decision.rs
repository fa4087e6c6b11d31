//! Turns a probability and the model's threshold into a decision, an
//! explanation and the performance figures a clinician needs to weigh it.

use serde::{Deserialize, Serialize};

pub const DISCLAIMER: &str = "This is a decision support tool, not a diagnostic test. \
Clinical judgment should always take precedence.";

/// Threshold used when the artifact does not state one.
pub const DEFAULT_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    RuleOut,
    ContinueWorkup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Moderate,
    High,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::RuleOut => "rule_out",
            Decision::ContinueWorkup => "continue_workup",
        }
    }
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Moderate => "moderate",
            Confidence::High => "high",
        }
    }
}

/// Probability cutoffs for the continue-workup explanation. They are tied to
/// the operating points of the study the model came from, so an artifact may
/// override them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionBands {
    /// Below this the probability is "moderate".
    pub moderate_below: f64,
    /// Below this (and at or above `moderate_below`) it is "elevated"; above, "high".
    pub elevated_below: f64,
}

impl Default for DecisionBands {
    fn default() -> Self {
        Self {
            moderate_below: 0.25,
            elevated_below: 0.50,
        }
    }
}

/// Test-set performance of the model, as stored with the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    #[serde(default = "defaults::sensitivity")]
    pub sensitivity: f64,
    #[serde(default = "defaults::specificity")]
    pub specificity: f64,
    #[serde(default = "defaults::npv")]
    pub npv: f64,
    #[serde(default = "defaults::ppv")]
    pub ppv: f64,
    #[serde(default = "defaults::rule_out_rate")]
    pub rule_out_rate: f64,
    #[serde(default = "defaults::roc_auc")]
    pub roc_auc: f64,
    #[serde(default = "defaults::missed_pe_rate")]
    pub missed_pe_rate: f64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            sensitivity: defaults::sensitivity(),
            specificity: defaults::specificity(),
            npv: defaults::npv(),
            ppv: defaults::ppv(),
            rule_out_rate: defaults::rule_out_rate(),
            roc_auc: defaults::roc_auc(),
            missed_pe_rate: defaults::missed_pe_rate(),
        }
    }
}

mod defaults {
    pub fn sensitivity() -> f64 {
        0.99
    }
    pub fn specificity() -> f64 {
        0.067
    }
    pub fn npv() -> f64 {
        0.976
    }
    pub fn ppv() -> f64 {
        0.15
    }
    pub fn rule_out_rate() -> f64 {
        0.058
    }
    pub fn roc_auc() -> f64 {
        0.68
    }
    pub fn missed_pe_rate() -> f64 {
        0.001
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub probability: f64,
    pub threshold: f64,
    pub decision: Decision,
    pub explanation: String,
    pub confidence: Confidence,
    pub sensitivity: f64,
    pub npv: f64,
    pub rule_out_rate: f64,
    pub disclaimer: String,
    /// True when the probability came from the rule-based fallback.
    pub reduced_fidelity: bool,
    pub warnings: Vec<String>,
}

/// Rounds to four decimal places, half away from zero.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Applies the strict `probability < threshold` rule and writes the explanation.
///
/// A NaN probability is treated as certain PE so that it can never rule out.
pub fn interpret(
    probability: f64,
    threshold: f64,
    bands: &DecisionBands,
    metrics: &PerformanceMetrics,
) -> DecisionResult {
    let probability = if probability.is_nan() {
        1.0
    } else {
        probability.clamp(0.0, 1.0)
    };
    let percent = probability * 100.0;

    let (decision, confidence, explanation) = if probability < threshold {
        (
            Decision::RuleOut,
            Confidence::High,
            format!(
                "Low PE probability ({percent:.1}%). Based on the model, PE can be ruled out with ~{:.0}% NPV. \
                 Consider avoiding CT pulmonary angiography if clinically appropriate. \
                 Always use clinical judgment.",
                metrics.npv * 100.0
            ),
        )
    } else if probability < bands.moderate_below {
        (
            Decision::ContinueWorkup,
            Confidence::Moderate,
            format!(
                "Moderate PE probability ({percent:.1}%). Continue with standard PE workup. Consider imaging."
            ),
        )
    } else if probability < bands.elevated_below {
        (
            Decision::ContinueWorkup,
            Confidence::High,
            format!("Elevated PE probability ({percent:.1}%). Imaging strongly recommended."),
        )
    } else {
        (
            Decision::ContinueWorkup,
            Confidence::High,
            format!("High PE probability ({percent:.1}%). Urgent imaging indicated."),
        )
    };

    DecisionResult {
        probability: round4(probability),
        threshold: round4(threshold),
        decision,
        explanation,
        confidence,
        sensitivity: metrics.sensitivity,
        npv: metrics.npv,
        rule_out_rate: metrics.rule_out_rate,
        disclaimer: DISCLAIMER.to_string(),
        reduced_fidelity: false,
        warnings: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(probability: f64, threshold: f64) -> DecisionResult {
        interpret(
            probability,
            threshold,
            &DecisionBands::default(),
            &PerformanceMetrics::default(),
        )
    }

    #[test]
    fn test_below_threshold_rules_out() {
        let result = decide(0.05, 0.08);
        assert_eq!(result.decision, Decision::RuleOut);
        assert_eq!(result.confidence, Confidence::High);
        assert!(result.explanation.starts_with("Low PE probability (5.0%)"));
        assert!(result.explanation.contains("~98% NPV"));
    }

    #[test]
    fn test_probability_equal_to_threshold_continues() {
        let result = decide(0.08, 0.08);
        assert_eq!(result.decision, Decision::ContinueWorkup);
        assert_eq!(result.confidence, Confidence::Moderate);
    }

    #[test]
    fn test_bands() {
        let moderate = decide(0.20, 0.08);
        assert_eq!(moderate.confidence, Confidence::Moderate);
        assert!(moderate.explanation.starts_with("Moderate PE probability (20.0%)"));

        let elevated = decide(0.30, 0.08);
        assert_eq!(elevated.decision, Decision::ContinueWorkup);
        assert_eq!(elevated.confidence, Confidence::High);
        assert!(elevated.explanation.starts_with("Elevated"));

        let at_cutoff = decide(0.25, 0.08);
        assert!(at_cutoff.explanation.starts_with("Elevated"));

        let high = decide(0.50, 0.08);
        assert_eq!(high.confidence, Confidence::High);
        assert!(high.explanation.contains("Urgent imaging indicated."));
    }

    #[test]
    fn test_bands_are_configurable() {
        let bands = DecisionBands {
            moderate_below: 0.15,
            elevated_below: 0.35,
        };
        let result = interpret(0.20, 0.08, &bands, &PerformanceMetrics::default());
        assert!(result.explanation.starts_with("Elevated"));
    }

    #[test]
    fn test_decision_matches_strict_comparison_across_grid() {
        let threshold = 0.0813;
        for i in 0..=1000 {
            let p = i as f64 / 1000.0;
            let result = decide(p, threshold);
            assert_eq!(result.decision == Decision::RuleOut, p < threshold, "p = {p}");
            assert!((0.0..=1.0).contains(&result.probability));
        }
    }

    #[test]
    fn test_rounding_and_out_of_range_inputs() {
        let result = decide(0.123456, 0.0812345);
        assert_eq!(result.probability, 0.1235);
        assert_eq!(result.threshold, 0.0812);

        assert_eq!(decide(1.7, 0.08).probability, 1.0);
        assert_eq!(decide(-0.2, 0.08).probability, 0.0);

        let nan = decide(f64::NAN, 0.08);
        assert_eq!(nan.decision, Decision::ContinueWorkup);
        assert_eq!(nan.probability, 1.0);
    }

    #[test]
    fn test_metrics_and_disclaimer_are_attached() {
        let result = decide(0.5, 0.08);
        assert_eq!(result.sensitivity, 0.99);
        assert_eq!(result.npv, 0.976);
        assert_eq!(result.rule_out_rate, 0.058);
        assert_eq!(result.disclaimer, DISCLAIMER);
        assert!(!result.reduced_fidelity);
    }

    #[test]
    fn test_result_serializes_with_snake_case_labels() {
        let json = serde_json::to_value(decide(0.05, 0.08)).unwrap();
        assert_eq!(json["decision"], "rule_out");
        assert_eq!(json["confidence"], "high");
        assert_eq!(json["probability"], 0.05);
    }
}
