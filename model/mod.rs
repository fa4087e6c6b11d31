pub mod artifact;
pub mod classifier;
pub mod decision;

pub use artifact::{ArtifactFile, Fidelity, ModelArtifact, ModelError, ModelInfo};
pub use classifier::{Classifier, ClassifierSpec, LogisticSpec};
pub use decision::{
    Confidence, DISCLAIMER, Decision, DecisionBands, DecisionResult, PerformanceMetrics, interpret,
};
