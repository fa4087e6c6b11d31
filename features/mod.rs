pub mod derived;
pub mod dictionaries;
pub mod mapper;
pub mod missingness;
pub mod records;
pub mod values;
pub mod vector;

pub use mapper::{CANONICAL_FEATURES, Gender, RawFeatures, map_features};
pub use records::{
    AssessmentInput, ClinicalObservationRecord, Coding, InputError, ObservationComponent,
    ObservationValue, PatientDemographics, RecordCategory,
};
pub use values::{FeatureMap, FeatureValue};
