//! # Feature Mapper
//!
//! Turns a patient's demographics and clinical records into the 25 raw
//! features the model was trained on.
//!
//! - Priority: records are scanned in the order given. The first record whose
//!   LOINC code identifies a feature, and which yields a number, supplies it.
//! - Fallback: when no record carries a recognised code for a feature, the
//!   record's display text is matched against the text table, restricted to
//!   records of the same category that carry no recognised code at all.
//! - Units: height arrives in metres and weight in kilograms. They are
//!   reported as centimetres and pounds, while BMI is computed from the
//!   original metric values.

use crate::features::dictionaries::{self, LABORATORY, ObservationKind, VITAL_SIGNS};
use crate::features::records::{
    ClinicalObservationRecord, ObservationComponent, ObservationValue, PatientDemographics,
    RecordCategory,
};
use crate::features::values::{FeatureMap, FeatureValue};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// The raw feature schema, in the order the mapper reports it.
pub const CANONICAL_FEATURES: [&str; 25] = [
    "age",
    "gender",
    "bmi",
    "height_cm",
    "weight_lbs",
    "triage_hr",
    "triage_rr",
    "triage_o2sat",
    "triage_temp",
    "triage_sbp",
    "triage_dbp",
    "d_dimer",
    "troponin_t",
    "ntprobnp",
    "creatinine",
    "hemoglobin",
    "wbc",
    "platelet",
    "sodium",
    "potassium",
    "bun",
    "glucose",
    "lactate",
    "po2",
    "pco2",
];

/// Laboratory values the model can consume that are not part of the raw schema.
pub const SUPPLEMENTARY_LABS: [&str; 1] = ["ph"];

const KG_TO_LBS: f64 = 2.20462;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    Other,
}

impl Gender {
    /// Maps an administrative gender string. Anything outside the fixed
    /// vocabulary (including "unknown") is treated as absent.
    pub fn from_administrative(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }

    /// Accepts either the short code this crate emits ("M", "F", "Other") or
    /// an administrative gender string.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "M" | "m" => Some(Gender::Male),
            "F" | "f" => Some(Gender::Female),
            other => Self::from_administrative(other),
        }
    }

    /// Numeric encoding for a `gender` model column: male is 1, anything else 0.
    pub fn indicator(self) -> f64 {
        match self {
            Gender::Male => 1.0,
            Gender::Female | Gender::Other => 0.0,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "Other",
        }
    }
}

/// Typed view of the raw schema. Every field is optional; absence is data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFeatures {
    pub age: Option<f64>,
    pub gender: Option<Gender>,
    pub bmi: Option<f64>,
    pub height_cm: Option<f64>,
    pub weight_lbs: Option<f64>,
    pub triage_hr: Option<f64>,
    pub triage_rr: Option<f64>,
    pub triage_o2sat: Option<f64>,
    pub triage_temp: Option<f64>,
    pub triage_sbp: Option<f64>,
    pub triage_dbp: Option<f64>,
    pub d_dimer: Option<f64>,
    pub troponin_t: Option<f64>,
    pub ntprobnp: Option<f64>,
    pub creatinine: Option<f64>,
    pub hemoglobin: Option<f64>,
    pub wbc: Option<f64>,
    pub platelet: Option<f64>,
    pub sodium: Option<f64>,
    pub potassium: Option<f64>,
    pub bun: Option<f64>,
    pub glucose: Option<f64>,
    pub lactate: Option<f64>,
    pub po2: Option<f64>,
    pub pco2: Option<f64>,
}

impl RawFeatures {
    /// Numeric value of a raw feature by canonical name. Gender is text and
    /// has no numeric value here.
    pub fn number(&self, name: &str) -> Option<f64> {
        match name {
            "age" => self.age,
            "bmi" => self.bmi,
            "height_cm" => self.height_cm,
            "weight_lbs" => self.weight_lbs,
            "triage_hr" => self.triage_hr,
            "triage_rr" => self.triage_rr,
            "triage_o2sat" => self.triage_o2sat,
            "triage_temp" => self.triage_temp,
            "triage_sbp" => self.triage_sbp,
            "triage_dbp" => self.triage_dbp,
            "d_dimer" => self.d_dimer,
            "troponin_t" => self.troponin_t,
            "ntprobnp" => self.ntprobnp,
            "creatinine" => self.creatinine,
            "hemoglobin" => self.hemoglobin,
            "wbc" => self.wbc,
            "platelet" => self.platelet,
            "sodium" => self.sodium,
            "potassium" => self.potassium,
            "bun" => self.bun,
            "glucose" => self.glucose,
            "lactate" => self.lactate,
            "po2" => self.po2,
            "pco2" => self.pco2,
            _ => None,
        }
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Option<f64>> {
        let slot = match name {
            "age" => &mut self.age,
            "bmi" => &mut self.bmi,
            "height_cm" => &mut self.height_cm,
            "weight_lbs" => &mut self.weight_lbs,
            "triage_hr" => &mut self.triage_hr,
            "triage_rr" => &mut self.triage_rr,
            "triage_o2sat" => &mut self.triage_o2sat,
            "triage_temp" => &mut self.triage_temp,
            "triage_sbp" => &mut self.triage_sbp,
            "triage_dbp" => &mut self.triage_dbp,
            "d_dimer" => &mut self.d_dimer,
            "troponin_t" => &mut self.troponin_t,
            "ntprobnp" => &mut self.ntprobnp,
            "creatinine" => &mut self.creatinine,
            "hemoglobin" => &mut self.hemoglobin,
            "wbc" => &mut self.wbc,
            "platelet" => &mut self.platelet,
            "sodium" => &mut self.sodium,
            "potassium" => &mut self.potassium,
            "bun" => &mut self.bun,
            "glucose" => &mut self.glucose,
            "lactate" => &mut self.lactate,
            "po2" => &mut self.po2,
            "pco2" => &mut self.pco2,
            _ => return None,
        };
        Some(slot)
    }

    /// Whether `name` holds a value. Works for gender as well.
    pub fn is_present(&self, name: &str) -> bool {
        match name {
            "gender" => self.gender.is_some(),
            other => self.number(other).is_some(),
        }
    }

    pub fn available_count(&self) -> usize {
        CANONICAL_FEATURES
            .iter()
            .filter(|name| self.is_present(name))
            .count()
    }

    /// Applies caller-supplied values over the mapped ones. Any canonical key
    /// present in `overrides` wins, including one whose value is absent.
    pub fn overlay(&mut self, overrides: &FeatureMap) {
        for name in CANONICAL_FEATURES {
            if !overrides.contains_key(name) {
                continue;
            }
            let value = overrides.get(name);
            if name == "gender" {
                self.gender = value.and_then(|v| match v {
                    FeatureValue::Text(text) => Gender::parse(text),
                    _ => None,
                });
            } else if let Some(slot) = self.slot_mut(name) {
                *slot = value.and_then(FeatureValue::as_f64).filter(|v| !v.is_nan());
            }
        }
    }

    /// Generic map with every canonical key present; absent values are `None`.
    pub fn to_feature_map(&self) -> FeatureMap {
        CANONICAL_FEATURES
            .iter()
            .map(|&name| {
                let value = match name {
                    "gender" => self.gender.map(|g| FeatureValue::from(g.code())),
                    other => self.number(other).map(FeatureValue::Number),
                };
                (name, value)
            })
            .collect()
    }
}

/// Maps demographics and records to the raw feature schema.
///
/// `as_of` is the date ages are computed against; callers normally pass today.
pub fn map_features(
    demographics: Option<&PatientDemographics>,
    records: &[ClinicalObservationRecord],
    as_of: NaiveDate,
) -> RawFeatures {
    let mut raw = RawFeatures::default();

    // --- 1. Demographics ---
    if let Some(demographics) = demographics {
        raw.age = demographics
            .birth_date
            .as_deref()
            .and_then(|birth| age_on(birth, as_of));
        raw.gender = demographics
            .gender
            .as_deref()
            .and_then(Gender::from_administrative);
    }

    // --- 2. Vitals and labs ---
    for (table, category) in [
        (VITAL_SIGNS, RecordCategory::Vital),
        (LABORATORY, RecordCategory::Lab),
    ] {
        for kind in table {
            if let Some(slot) = raw.slot_mut(kind.feature) {
                *slot = find_value(records, kind, table, category);
            }
        }
    }

    // --- 3. Anthropometrics ---
    let positive = |v: &f64| v.is_finite() && *v > 0.0;
    let height_m = lookup(records, VITAL_SIGNS, RecordCategory::Vital, "height").filter(positive);
    let weight_kg = lookup(records, VITAL_SIGNS, RecordCategory::Vital, "weight").filter(positive);
    raw.height_cm = height_m.map(|m| m * 100.0);
    raw.weight_lbs = weight_kg.map(|kg| kg * KG_TO_LBS);
    if let (Some(m), Some(kg)) = (height_m, weight_kg) {
        raw.bmi = Some(kg / (m * m));
    }

    log::debug!(
        "Mapped {}/{} features from {} records",
        raw.available_count(),
        CANONICAL_FEATURES.len(),
        records.len()
    );
    raw
}

/// Laboratory values outside the raw schema that the model may still use.
/// Every name in `SUPPLEMENTARY_LABS` is present as a key.
pub fn supplementary_features(records: &[ClinicalObservationRecord]) -> FeatureMap {
    SUPPLEMENTARY_LABS
        .iter()
        .map(|&name| {
            let value = lookup(records, LABORATORY, RecordCategory::Lab, name).map(FeatureValue::Number);
            (name, value)
        })
        .collect()
}

/// Whole years between `birth_date` (`YYYY-MM-DD`) and `as_of`, one less if
/// the birthday has not yet come round. Unparseable or future dates give `None`.
pub fn age_on(birth_date: &str, as_of: NaiveDate) -> Option<f64> {
    let birth = match NaiveDate::parse_from_str(birth_date.trim(), "%Y-%m-%d") {
        Ok(date) => date,
        Err(e) => {
            log::warn!("Failed to parse birth date '{}': {}", birth_date, e);
            return None;
        }
    };

    let mut age = as_of.year() - birth.year();
    if (as_of.month(), as_of.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    if age < 0 {
        log::warn!("Birth date '{}' is after {}", birth_date, as_of);
        return None;
    }
    Some(age as f64)
}

fn lookup(
    records: &[ClinicalObservationRecord],
    table: &'static [ObservationKind],
    category: RecordCategory,
    feature: &str,
) -> Option<f64> {
    let kind = dictionaries::kind_for_feature(table, feature)?;
    find_value(records, kind, table, category)
}

/// Code pass over every record, then the text pass.
fn find_value(
    records: &[ClinicalObservationRecord],
    kind: &ObservationKind,
    table: &'static [ObservationKind],
    category: RecordCategory,
) -> Option<f64> {
    records
        .iter()
        .filter(|r| r.category.is_observation())
        .find_map(|r| coded_value(r, kind))
        .or_else(|| {
            records
                .iter()
                .filter(|r| r.category == category)
                .find_map(|r| text_value(r, kind, table))
        })
}

/// Value of `record` for `kind` when a code on the record or one of its
/// components identifies it.
pub(crate) fn coded_value(record: &ClinicalObservationRecord, kind: &ObservationKind) -> Option<f64> {
    let own_match = record.loinc_codes().any(|code| kind.matches_code(code));
    match record.value.as_ref()? {
        ObservationValue::Composite { components } => components
            .iter()
            .filter(|c| component_matches(c, kind))
            .find_map(component_number)
            .or_else(|| {
                if own_match {
                    components.iter().find_map(component_number)
                } else {
                    None
                }
            }),
        scalar if own_match => scalar.as_number(),
        _ => None,
    }
}

/// Value of `record` for `kind` by display text. Only records with no
/// recognised code in `table` take part.
pub(crate) fn text_value(
    record: &ClinicalObservationRecord,
    kind: &ObservationKind,
    table: &'static [ObservationKind],
) -> Option<f64> {
    if has_recognised_code(record, table) {
        return None;
    }
    match record.value.as_ref()? {
        ObservationValue::Composite { components } => components.iter().find_map(|c| {
            let label = c.display.as_deref()?;
            let matched = dictionaries::match_text(table, label)?;
            if matched.feature == kind.feature {
                component_number(c)
            } else {
                None
            }
        }),
        scalar => {
            let matched = dictionaries::match_text(table, record.display_text()?)?;
            if matched.feature == kind.feature {
                scalar.as_number()
            } else {
                None
            }
        }
    }
}

fn has_recognised_code(record: &ClinicalObservationRecord, table: &'static [ObservationKind]) -> bool {
    let mut codes: Vec<&str> = record.loinc_codes().collect();
    for component in record.value.iter().flat_map(|v| v.components()) {
        codes.extend(component_loinc(component));
    }
    dictionaries::match_code(table, &codes).is_some()
}

fn component_loinc(component: &ObservationComponent) -> impl Iterator<Item = &str> {
    component
        .codes
        .iter()
        .filter(|c| c.is_loinc())
        .map(|c| c.code.as_str())
}

fn component_matches(component: &ObservationComponent, kind: &ObservationKind) -> bool {
    component_loinc(component).any(|code| kind.matches_code(code))
}

fn component_number(component: &ObservationComponent) -> Option<f64> {
    component.value.as_ref().and_then(ObservationValue::as_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::records::Coding;
    use approx::assert_abs_diff_eq;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn vital(loinc: &str, value: f64) -> ClinicalObservationRecord {
        ClinicalObservationRecord::quantity(RecordCategory::Vital, loinc, value, "")
    }

    fn lab(loinc: &str, value: f64) -> ClinicalObservationRecord {
        ClinicalObservationRecord::quantity(RecordCategory::Lab, loinc, value, "")
    }

    fn blood_pressure_panel(systolic: f64, diastolic: f64) -> ClinicalObservationRecord {
        let component = |code: &str, value: f64| ObservationComponent {
            codes: vec![Coding::loinc(code)],
            display: None,
            value: Some(ObservationValue::Quantity {
                value: Some(value),
                unit: Some("mm[Hg]".to_string()),
            }),
            unit: None,
        };
        ClinicalObservationRecord {
            codes: vec![Coding::loinc("85354-9")],
            value: Some(ObservationValue::Composite {
                components: vec![component("8480-6", systolic), component("8462-4", diastolic)],
            }),
            ..ClinicalObservationRecord::new(RecordCategory::Vital)
        }
    }

    #[test]
    fn test_every_canonical_key_is_present() {
        let raw = map_features(None, &[], as_of());
        let map = raw.to_feature_map();
        assert_eq!(map.len(), CANONICAL_FEATURES.len());
        for name in CANONICAL_FEATURES {
            assert!(map.contains_key(name), "missing key {name}");
            assert!(map.is_missing(name));
        }
        assert_eq!(raw.available_count(), 0);
    }

    #[test]
    fn test_first_matching_record_wins() {
        let records = vec![vital("8867-4", 112.0), vital("8867-4", 80.0)];
        let raw = map_features(None, &records, as_of());
        assert_eq!(raw.triage_hr, Some(112.0));
    }

    #[test]
    fn test_record_without_number_does_not_block_later_match() {
        let mut empty = vital("8867-4", 0.0);
        empty.value = Some(ObservationValue::Text("irregular".to_string()));
        let records = vec![empty, vital("8867-4", 96.0)];
        let raw = map_features(None, &records, as_of());
        assert_eq!(raw.triage_hr, Some(96.0));
    }

    #[test]
    fn test_value_shapes() {
        let mut integer = lab("2951-2", 0.0);
        integer.value = Some(ObservationValue::Integer(139));
        let mut decimal = lab("2823-3", 0.0);
        decimal.value = Some(ObservationValue::Decimal(4.1));
        let mut text = lab("2524-7", 0.0);
        text.value = Some(ObservationValue::Text(" 2.3 ".to_string()));

        let raw = map_features(None, &[integer, decimal, text], as_of());
        assert_eq!(raw.sodium, Some(139.0));
        assert_eq!(raw.potassium, Some(4.1));
        assert_eq!(raw.lactate, Some(2.3));
    }

    #[test]
    fn test_blood_pressure_components() {
        let raw = map_features(None, &[blood_pressure_panel(132.0, 84.0)], as_of());
        assert_eq!(raw.triage_sbp, Some(132.0));
        assert_eq!(raw.triage_dbp, Some(84.0));
    }

    #[test]
    fn test_own_code_composite_takes_first_numeric_component() {
        let record = ClinicalObservationRecord {
            codes: vec![Coding::loinc("8867-4")],
            value: Some(ObservationValue::Composite {
                components: vec![
                    ObservationComponent {
                        codes: vec![],
                        display: None,
                        value: None,
                        unit: None,
                    },
                    ObservationComponent {
                        codes: vec![],
                        display: None,
                        value: Some(ObservationValue::Integer(77)),
                        unit: None,
                    },
                ],
            }),
            ..ClinicalObservationRecord::new(RecordCategory::Vital)
        };
        let raw = map_features(None, &[record], as_of());
        assert_eq!(raw.triage_hr, Some(77.0));
    }

    #[test]
    fn test_non_loinc_codes_are_ignored() {
        let mut record = vital("8867-4", 130.0);
        record.codes[0].system = Some("urn:oid:1.2.840.114350".to_string());
        let raw = map_features(None, &[record], as_of());
        assert_eq!(raw.triage_hr, None);
    }

    #[test]
    fn test_text_fallback_is_category_restricted() {
        let coded_elsewhere = |category, display: &str, value: f64| {
            ClinicalObservationRecord {
                display: Some(display.to_string()),
                value: Some(ObservationValue::Decimal(value)),
                ..ClinicalObservationRecord::new(category)
            }
        };

        let records = vec![
            coded_elsewhere(RecordCategory::Lab, "Heart rate", 140.0),
            coded_elsewhere(RecordCategory::Vital, "Heart rate", 101.0),
            coded_elsewhere(RecordCategory::Lab, "D-Dimer, quantitative", 620.0),
        ];
        let raw = map_features(None, &records, as_of());
        assert_eq!(raw.triage_hr, Some(101.0));
        assert_eq!(raw.d_dimer, Some(620.0));
    }

    #[test]
    fn test_code_match_beats_earlier_text_match() {
        let text_only = ClinicalObservationRecord {
            display: Some("Pulse".to_string()),
            value: Some(ObservationValue::Decimal(150.0)),
            ..ClinicalObservationRecord::new(RecordCategory::Vital)
        };
        let records = vec![text_only, vital("8867-4", 88.0)];
        let raw = map_features(None, &records, as_of());
        assert_eq!(raw.triage_hr, Some(88.0));
    }

    #[test]
    fn test_recognised_code_excludes_record_from_text_fallback() {
        // Coded as respiratory rate, labelled with a heart-rate phrase.
        let record = vital("9279-1", 22.0).with_display("Heart rate (resp)");
        let raw = map_features(None, &[record], as_of());
        assert_eq!(raw.triage_rr, Some(22.0));
        assert_eq!(raw.triage_hr, None);
    }

    #[test]
    fn test_unit_conversions_and_bmi() {
        let records = vec![vital("8302-2", 1.8), vital("29463-7", 81.0)];
        let raw = map_features(None, &records, as_of());
        assert_abs_diff_eq!(raw.height_cm.unwrap(), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(raw.weight_lbs.unwrap(), 81.0 * 2.20462, epsilon = 1e-9);
        assert_abs_diff_eq!(raw.bmi.unwrap(), 81.0 / (1.8 * 1.8), epsilon = 1e-9);
    }

    #[test]
    fn test_bmi_requires_both_measurements() {
        let raw = map_features(None, &[vital("29463-7", 70.0)], as_of());
        assert!(raw.weight_lbs.is_some());
        assert_eq!(raw.height_cm, None);
        assert_eq!(raw.bmi, None);

        let raw = map_features(None, &[vital("8302-2", 0.0), vital("29463-7", 70.0)], as_of());
        assert_eq!(raw.height_cm, None);
        assert_eq!(raw.bmi, None);
    }

    #[test]
    fn test_age_rule() {
        assert_eq!(age_on("1959-06-15", as_of()), Some(65.0));
        assert_eq!(age_on("1959-06-16", as_of()), Some(64.0));
        assert_eq!(age_on("1959-12-31", as_of()), Some(64.0));
        assert_eq!(age_on("not-a-date", as_of()), None);
        assert_eq!(age_on("2030-01-01", as_of()), None);
    }

    #[test]
    fn test_gender_vocabulary() {
        let map = |g: &str| {
            let demographics = PatientDemographics {
                birth_date: None,
                gender: Some(g.to_string()),
            };
            map_features(Some(&demographics), &[], as_of()).gender
        };
        assert_eq!(map("male"), Some(Gender::Male));
        assert_eq!(map("Female"), Some(Gender::Female));
        assert_eq!(map("other"), Some(Gender::Other));
        assert_eq!(map("unknown"), None);

        let demographics = PatientDemographics {
            birth_date: Some("1970-01-01".to_string()),
            gender: Some("male".to_string()),
        };
        let features = map_features(Some(&demographics), &[], as_of()).to_feature_map();
        assert_eq!(features.get("gender"), Some(&FeatureValue::from("M")));
        assert_eq!(features.number("age"), Some(54.0));
    }

    #[test]
    fn test_gender_codes_and_indicator() {
        assert_eq!(Gender::parse("M"), Some(Gender::Male));
        assert_eq!(Gender::parse(" f "), Some(Gender::Female));
        assert_eq!(Gender::parse("Other"), Some(Gender::Other));
        assert_eq!(Gender::parse("female"), Some(Gender::Female));
        assert_eq!(Gender::parse("X"), None);
        assert_eq!(Gender::Male.indicator(), 1.0);
        assert_eq!(Gender::Female.indicator(), 0.0);
        assert_eq!(Gender::Other.indicator(), 0.0);
    }

    #[test]
    fn test_overlay_replaces_mapped_values() {
        let mut raw = map_features(None, &[vital("8867-4", 88.0), vital("9279-1", 16.0)], as_of());
        let overrides: FeatureMap = [
            ("age", Some(FeatureValue::from(61.0))),
            ("triage_hr", Some(FeatureValue::from(120.0))),
            ("triage_rr", None),
            ("gender", Some(FeatureValue::from("F"))),
            ("triage_o2sat", Some(FeatureValue::Number(f64::NAN))),
            ("prior_pe_diagnosis", Some(FeatureValue::from(1.0))),
        ]
        .into_iter()
        .collect();
        raw.overlay(&overrides);

        assert_eq!(raw.age, Some(61.0));
        assert_eq!(raw.triage_hr, Some(120.0));
        assert_eq!(raw.triage_rr, None);
        assert_eq!(raw.triage_o2sat, None);
        assert_eq!(raw.gender, Some(Gender::Female));
        assert_eq!(raw.available_count(), 3);
    }

    #[test]
    fn test_supplementary_ph() {
        let features = supplementary_features(&[lab("2744-1", 7.31)]);
        assert_eq!(features.number("ph"), Some(7.31));
        let features = supplementary_features(&[]);
        assert!(features.contains_key("ph"));
        assert!(features.is_missing("ph"));
    }
}
