use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A frozen binary model that scores one feature vector.
///
/// Implementations return the probability of the positive ("PE present")
/// class; callers never see raw class columns.
pub trait Classifier: fmt::Debug + Send + Sync {
    fn predict_probability(&self, vector: ArrayView1<f64>) -> f64;

    /// Short human-readable model type.
    fn describe(&self) -> String;
}

// --- Artifact Sections ---
// The `[classifier]` table of the model TOML file.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierSpec {
    Logistic(LogisticSpec),
    SoftVoting {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weights: Option<Vec<f64>>,
        members: Vec<LogisticSpec>,
    },
    Fallback,
}

/// A fitted logistic model. `coefficients` follow the artifact's feature
/// columns; the linear predictor is the log-odds of `classes[1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticSpec {
    pub intercept: f64,
    #[serde(default = "default_classes")]
    pub classes: Vec<i64>,
    #[serde(default = "default_positive_class")]
    pub positive_class: i64,
    pub coefficients: Vec<f64>,
}

fn default_classes() -> Vec<i64> {
    vec![0, 1]
}

fn default_positive_class() -> i64 {
    1
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error(
        "Classifier has {found} coefficients, but the artifact declares {expected} feature columns."
    )]
    CoefficientMismatch { found: usize, expected: usize },
    #[error("Classifier coefficient at position {0} is not a finite number.")]
    NonFiniteCoefficient(usize),
    #[error(
        "Classifier classes {classes:?} must be two distinct labels that include the positive class {positive}."
    )]
    BadClasses { classes: Vec<i64>, positive: i64 },
    #[error("A soft-voting ensemble needs at least one member.")]
    EmptyEnsemble,
    #[error("Ensemble has {found} weights for {expected} members.")]
    WeightCountMismatch { found: usize, expected: usize },
    #[error("Ensemble weights must be finite, non-negative, and not all zero.")]
    InvalidWeights,
}

/// Builds the classifier described by `spec` for the given column layout.
pub fn build_classifier(
    spec: &ClassifierSpec,
    columns: &[String],
) -> Result<Box<dyn Classifier>, ClassifierError> {
    match spec {
        ClassifierSpec::Logistic(logistic) => {
            Ok(Box::new(LogisticClassifier::from_spec(logistic, columns.len())?))
        }
        ClassifierSpec::SoftVoting { weights, members } => Ok(Box::new(
            SoftVotingClassifier::from_spec(members, weights.as_deref(), columns.len())?,
        )),
        ClassifierSpec::Fallback => Ok(Box::new(FallbackClassifier::for_columns(columns))),
    }
}

// --- Logistic ---

#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    intercept: f64,
    coefficients: Array1<f64>,
    /// False when the positive class is `classes[0]`, i.e. the linear
    /// predictor models the negative class.
    positive_is_modelled: bool,
}

impl LogisticClassifier {
    pub fn from_spec(spec: &LogisticSpec, n_columns: usize) -> Result<Self, ClassifierError> {
        // --- 1. Validate Shape ---
        if spec.coefficients.len() != n_columns {
            return Err(ClassifierError::CoefficientMismatch {
                found: spec.coefficients.len(),
                expected: n_columns,
            });
        }
        if let Some(index) = std::iter::once(spec.intercept)
            .chain(spec.coefficients.iter().copied())
            .position(|c| !c.is_finite())
        {
            // Position 0 is the intercept.
            return Err(ClassifierError::NonFiniteCoefficient(index));
        }

        // --- 2. Resolve The Positive Class ---
        let bad_classes = || ClassifierError::BadClasses {
            classes: spec.classes.clone(),
            positive: spec.positive_class,
        };
        if spec.classes.len() != 2 || spec.classes[0] == spec.classes[1] {
            return Err(bad_classes());
        }
        let positive_index = spec
            .classes
            .iter()
            .position(|&c| c == spec.positive_class)
            .ok_or_else(bad_classes)?;

        Ok(Self {
            intercept: spec.intercept,
            coefficients: Array1::from(spec.coefficients.clone()),
            positive_is_modelled: positive_index == 1,
        })
    }
}

impl Classifier for LogisticClassifier {
    fn predict_probability(&self, vector: ArrayView1<f64>) -> f64 {
        let eta = self.intercept + vector.dot(&self.coefficients);
        let p = sigmoid(eta);
        if self.positive_is_modelled { p } else { 1.0 - p }
    }

    fn describe(&self) -> String {
        "Logistic regression".to_string()
    }
}

/// Logistic function with the same guards as model fitting: the linear
/// predictor is clamped to avoid overflow in `exp`, and the result is kept
/// strictly inside (0, 1).
fn sigmoid(eta: f64) -> f64 {
    let eta = eta.clamp(-700.0, 700.0);
    let p = 1.0 / (1.0 + f64::exp(-eta));
    p.clamp(1e-8, 1.0 - 1e-8)
}

// --- Soft Voting ---

/// Weighted average of member probabilities.
#[derive(Debug, Clone)]
pub struct SoftVotingClassifier {
    members: Vec<LogisticClassifier>,
    weights: Array1<f64>,
}

impl SoftVotingClassifier {
    pub fn from_spec(
        members: &[LogisticSpec],
        weights: Option<&[f64]>,
        n_columns: usize,
    ) -> Result<Self, ClassifierError> {
        if members.is_empty() {
            return Err(ClassifierError::EmptyEnsemble);
        }
        let members = members
            .iter()
            .map(|m| LogisticClassifier::from_spec(m, n_columns))
            .collect::<Result<Vec<_>, _>>()?;

        let weights = match weights {
            None => Array1::from_elem(members.len(), 1.0),
            Some(w) if w.len() != members.len() => {
                return Err(ClassifierError::WeightCountMismatch {
                    found: w.len(),
                    expected: members.len(),
                });
            }
            Some(w) => Array1::from(w.to_vec()),
        };
        let total = weights.sum();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || total <= 0.0 {
            return Err(ClassifierError::InvalidWeights);
        }

        Ok(Self {
            members,
            weights: weights / total,
        })
    }
}

impl Classifier for SoftVotingClassifier {
    fn predict_probability(&self, vector: ArrayView1<f64>) -> f64 {
        self.members
            .iter()
            .zip(self.weights.iter())
            .map(|(member, w)| w * member.predict_probability(vector))
            .sum()
    }

    fn describe(&self) -> String {
        format!("Soft-voting ensemble ({} members)", self.members.len())
    }
}

// --- Fallback ---

const FALLBACK_BASE_RATE: f64 = 0.08;
const FALLBACK_CAP: f64 = 0.85;

/// Rule-based stand-in used when no trained artifact is available.
///
/// Starts from a base rate and adds bounded amounts for age over 50, heart
/// rate over 100 and saturation under 95. Reads unscaled values by column
/// name; a column that is not in the layout reads as its neutral value.
#[derive(Debug, Clone)]
pub struct FallbackClassifier {
    age: Option<usize>,
    heart_rate: Option<usize>,
    o2_saturation: Option<usize>,
}

impl FallbackClassifier {
    pub fn for_columns(columns: &[String]) -> Self {
        let index = |name: &str| columns.iter().position(|c| c == name);
        Self {
            age: index("age"),
            heart_rate: index("triage_hr"),
            o2_saturation: index("triage_o2sat"),
        }
    }

    /// The rule itself, on raw readings.
    pub fn risk(age: f64, heart_rate: f64, o2_saturation: f64) -> f64 {
        let mut risk = FALLBACK_BASE_RATE;
        if age > 50.0 {
            risk += ((age - 50.0) / 100.0).min(0.15);
        }
        if heart_rate > 100.0 {
            risk += ((heart_rate - 100.0) / 150.0).min(0.20);
        }
        // Zero means "no reading" here, not a saturation of zero.
        if o2_saturation != 0.0 && o2_saturation < 95.0 {
            risk += ((95.0 - o2_saturation) / 20.0).min(0.30);
        }
        risk.min(FALLBACK_CAP)
    }
}

impl Classifier for FallbackClassifier {
    fn predict_probability(&self, vector: ArrayView1<f64>) -> f64 {
        let read = |index: Option<usize>, neutral: f64| {
            index
                .and_then(|i| vector.get(i).copied())
                .filter(|v| v.is_finite())
                .unwrap_or(neutral)
        };
        Self::risk(
            read(self.age, 50.0),
            read(self.heart_rate, 80.0),
            read(self.o2_saturation, 98.0),
        )
    }

    fn describe(&self) -> String {
        "Rule-based fallback (reduced fidelity)".to_string()
    }
}
