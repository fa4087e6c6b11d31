//! # Clinical Context
//!
//! Information that does not feed the classifier but that a clinician reads
//! next to the decision: current anticoagulation, PE-mimic diagnoses, prior
//! PE-relevant imaging, vital-sign trends, and the INR and D-dimer series.
//!
//! Everything here is derived from the same record list the feature mapper
//! consumes, using the same dictionaries. Input order is preserved; records
//! are expected most recent first.

use crate::features::dictionaries::{
    self, ImagingType, LABORATORY, MedicationClass, MimicCategory, SNIPPET_LENGTH, VITAL_SIGNS,
};
use crate::features::mapper::{coded_value, text_value};
use crate::features::records::{ClinicalObservationRecord, ObservationValue, RecordCategory};
use serde::Serialize;

/// Imaging studies reported, most recent first.
pub const MAX_IMAGING_STUDIES: usize = 3;
pub const MAX_TOP_CONDITIONS: usize = 10;
/// Longer vital-sign series are thinned to at most this many points.
pub const MAX_SERIES_POINTS: usize = 200;

// --- Anticoagulation ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnticoagulationStatus {
    OnAnticoagulant,
    /// Relevant medication history exists but nothing is active.
    Unknown,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MedicationEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub class: MedicationClass,
    pub status: String,
    pub start: Option<String>,
}

impl MedicationEntry {
    fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anticoagulation {
    pub status: AnticoagulationStatus,
    pub medications: Vec<MedicationEntry>,
    pub has_warfarin: bool,
    /// Names of the active entries in `medications`.
    pub active_medications: Vec<String>,
}

/// Anticoagulant and antiplatelet history from medication records. Other
/// medications are dropped.
pub fn anticoagulation_status(records: &[ClinicalObservationRecord]) -> Anticoagulation {
    let medications: Vec<MedicationEntry> = records
        .iter()
        .filter(|r| r.category == RecordCategory::Medication)
        .filter_map(|r| {
            let name = r.display_text()?;
            let class = dictionaries::classify_medication(name);
            if class == MedicationClass::Other {
                return None;
            }
            Some(MedicationEntry {
                name: name.to_string(),
                class,
                status: r.status.clone().unwrap_or_else(|| "unknown".to_string()),
                start: r.date().map(str::to_string),
            })
        })
        .collect();

    let active = || medications.iter().filter(|m| m.is_active());
    let has_warfarin = active().any(|m| m.class == MedicationClass::Warfarin);
    let active_medications: Vec<String> = active().map(|m| m.name.clone()).collect();
    let status = if active().any(|m| m.class.is_anticoagulant()) {
        AnticoagulationStatus::OnAnticoagulant
    } else if !medications.is_empty() {
        AnticoagulationStatus::Unknown
    } else {
        AnticoagulationStatus::None
    };

    Anticoagulation {
        status,
        medications,
        has_warfarin,
        active_medications,
    }
}

// --- Diagnoses ---

/// One flag per PE-mimic category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosisFlags {
    pub asthma: bool,
    pub anxiety: bool,
    pub copd: bool,
    pub chf: bool,
    pub pneumonia: bool,
}

impl DiagnosisFlags {
    fn set(&mut self, category: MimicCategory) {
        match category {
            MimicCategory::Asthma => self.asthma = true,
            MimicCategory::Anxiety => self.anxiety = true,
            MimicCategory::Copd => self.copd = true,
            MimicCategory::Chf => self.chf = true,
            MimicCategory::Pneumonia => self.pneumonia = true,
        }
    }

    pub fn any(&self) -> bool {
        self.asthma || self.anxiety || self.copd || self.chf || self.pneumonia
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionEntry {
    pub display: String,
    pub code: Option<String>,
    pub clinical_status: String,
    pub onset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnoses {
    pub flags: DiagnosisFlags,
    pub top_conditions: Vec<ConditionEntry>,
}

/// Flags every mimic category any condition record falls into. Conditions
/// without display text are skipped entirely.
pub fn diagnosis_summary(records: &[ClinicalObservationRecord]) -> Diagnoses {
    let mut flags = DiagnosisFlags::default();
    let mut conditions = Vec::new();

    for record in records
        .iter()
        .filter(|r| r.category == RecordCategory::Condition)
    {
        let Some(display) = record.display_text() else {
            continue;
        };
        if let Some(category) =
            dictionaries::classify_diagnosis(record.code_strings(), Some(display))
        {
            flags.set(category);
        }
        conditions.push(ConditionEntry {
            display: display.to_string(),
            code: record.codes.first().map(|c| c.code.clone()),
            clinical_status: record
                .status
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            onset: record.date().map(str::to_string),
        });
    }

    conditions.truncate(MAX_TOP_CONDITIONS);
    Diagnoses {
        flags,
        top_conditions: conditions,
    }
}

// --- Imaging ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImagingStudy {
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub imaging_type: ImagingType,
    pub title: String,
    pub snippet: String,
}

/// PE-relevant studies among the imaging records. The report body, when the
/// record carries one as text, is cut down to a snippet.
pub fn imaging_studies(records: &[ClinicalObservationRecord]) -> Vec<ImagingStudy> {
    records
        .iter()
        .filter(|r| r.category == RecordCategory::Imaging)
        .filter_map(|r| {
            let title = r.display_text().unwrap_or_default();
            let imaging_type = dictionaries::classify_imaging(title);
            if !imaging_type.is_pe_relevant() {
                return None;
            }
            let body = match &r.value {
                Some(ObservationValue::Text(text)) => text.as_str(),
                _ => "",
            };
            Some(ImagingStudy {
                date: r.date().map(str::to_string),
                imaging_type,
                title: title.to_string(),
                snippet: dictionaries::imaging_snippet(body, SNIPPET_LENGTH),
            })
        })
        .take(MAX_IMAGING_STUDIES)
        .collect()
}

// --- Lab Series ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabPoint {
    pub time: String,
    pub value: f64,
    pub unit: Option<String>,
    pub code: Option<String>,
}

/// Timestamped values of one laboratory feature, in input order. Records
/// without a timestamp cannot be placed on a trend and are skipped.
pub fn lab_series(records: &[ClinicalObservationRecord], feature: &str) -> Vec<LabPoint> {
    let Some(kind) = dictionaries::kind_for_feature(LABORATORY, feature) else {
        return Vec::new();
    };
    records
        .iter()
        .filter(|r| r.category == RecordCategory::Lab)
        .filter_map(|r| {
            let time = r.timestamp.clone()?;
            let value = coded_value(r, kind).or_else(|| text_value(r, kind, LABORATORY))?;
            Some(LabPoint {
                time,
                value,
                unit: r.unit.clone(),
                code: r.codes.first().map(|c| c.code.clone()),
            })
        })
        .collect()
}

// --- Vital Series ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalPoint {
    pub time: String,
    pub value: f64,
}

/// Timestamped readings of one vital-sign feature, in input order. A blood
/// pressure panel contributes its matching component. Records without a
/// timestamp are skipped, and the series is thinned to `MAX_SERIES_POINTS`.
pub fn vital_series(records: &[ClinicalObservationRecord], feature: &str) -> Vec<VitalPoint> {
    let Some(kind) = dictionaries::kind_for_feature(VITAL_SIGNS, feature) else {
        return Vec::new();
    };
    let points = records
        .iter()
        .filter(|r| r.category == RecordCategory::Vital)
        .filter_map(|r| {
            let time = r.timestamp.clone()?;
            let value = coded_value(r, kind).or_else(|| text_value(r, kind, VITAL_SIGNS))?;
            Some(VitalPoint { time, value })
        })
        .collect();
    downsample(points, MAX_SERIES_POINTS)
}

/// Keeps every `len / max_points`-th point, then at most `max_points` of them.
fn downsample<T>(points: Vec<T>, max_points: usize) -> Vec<T> {
    if points.len() <= max_points || max_points == 0 {
        return points;
    }
    let step = points.len() / max_points;
    points.into_iter().step_by(step).take(max_points).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalSeries {
    pub hr: Vec<VitalPoint>,
    pub spo2: Vec<VitalPoint>,
    pub rr: Vec<VitalPoint>,
    pub sbp: Vec<VitalPoint>,
}

/// Which trends have at least one reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VitalsAvailable {
    pub hr: bool,
    pub spo2: bool,
    pub rr: bool,
    pub sbp: bool,
}

impl VitalSeries {
    pub fn from_records(records: &[ClinicalObservationRecord]) -> Self {
        Self {
            hr: vital_series(records, "triage_hr"),
            spo2: vital_series(records, "triage_o2sat"),
            rr: vital_series(records, "triage_rr"),
            sbp: vital_series(records, "triage_sbp"),
        }
    }

    pub fn available(&self) -> VitalsAvailable {
        VitalsAvailable {
            hr: !self.hr.is_empty(),
            spo2: !self.spo2.is_empty(),
            rr: !self.rr.is_empty(),
            sbp: !self.sbp.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClinicalContext {
    pub anticoagulation: Anticoagulation,
    pub diagnoses: Diagnoses,
    pub imaging: Vec<ImagingStudy>,
    pub vitals: VitalSeries,
    pub vitals_available: VitalsAvailable,
    pub inr_series: Vec<LabPoint>,
    pub d_dimer_series: Vec<LabPoint>,
}

pub fn clinical_context(records: &[ClinicalObservationRecord]) -> ClinicalContext {
    let vitals = VitalSeries::from_records(records);
    ClinicalContext {
        anticoagulation: anticoagulation_status(records),
        diagnoses: diagnosis_summary(records),
        imaging: imaging_studies(records),
        vitals_available: vitals.available(),
        vitals,
        inr_series: lab_series(records, "inr"),
        d_dimer_series: lab_series(records, "d_dimer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::records::{Coding, ObservationComponent};

    fn medication(name: &str, status: &str) -> ClinicalObservationRecord {
        ClinicalObservationRecord::new(RecordCategory::Medication)
            .with_display(name)
            .with_status(status)
            .with_timestamp("2024-03-01T08:00:00Z")
    }

    fn condition(code: &str, display: &str) -> ClinicalObservationRecord {
        let mut record = ClinicalObservationRecord::new(RecordCategory::Condition)
            .with_display(display)
            .with_status("active");
        record.codes.push(Coding {
            system: Some("http://hl7.org/fhir/sid/icd-10-cm".to_string()),
            code: code.to_string(),
            display: None,
        });
        record
    }

    #[test]
    fn test_active_doac_means_on_anticoagulant() {
        let records = vec![
            medication("Apixaban 5 MG Oral Tablet", "active"),
            medication("Aspirin 81 mg", "active"),
            medication("Lisinopril 10 mg", "active"),
        ];
        let status = anticoagulation_status(&records);
        assert_eq!(status.status, AnticoagulationStatus::OnAnticoagulant);
        assert!(!status.has_warfarin);
        assert_eq!(
            status.active_medications,
            vec!["Apixaban 5 MG Oral Tablet", "Aspirin 81 mg"]
        );
        // Lisinopril is not reported.
        assert_eq!(status.medications.len(), 2);
        assert_eq!(status.medications[0].class, MedicationClass::Doac);
        assert_eq!(status.medications[0].start.as_deref(), Some("2024-03-01"));
    }

    #[test]
    fn test_inactive_history_is_unknown() {
        let records = vec![
            medication("Warfarin 5 mg", "stopped"),
            medication("Clopidogrel", "active"),
        ];
        let status = anticoagulation_status(&records);
        assert_eq!(status.status, AnticoagulationStatus::Unknown);
        assert!(!status.has_warfarin);
        assert_eq!(status.active_medications, vec!["Clopidogrel"]);
    }

    #[test]
    fn test_active_warfarin_is_flagged() {
        let status = anticoagulation_status(&[medication("Coumadin", "ACTIVE")]);
        assert_eq!(status.status, AnticoagulationStatus::OnAnticoagulant);
        assert!(status.has_warfarin);
    }

    #[test]
    fn test_no_relevant_medications() {
        let status = anticoagulation_status(&[medication("Metformin", "active")]);
        assert_eq!(status.status, AnticoagulationStatus::None);
        assert!(status.medications.is_empty());
    }

    #[test]
    fn test_diagnosis_flags() {
        let records = vec![
            condition("J45.909", "Pneumonia, unspecified"),
            condition("Z00.00", "Generalized anxiety disorder"),
            condition("E11.9", "Type 2 diabetes"),
        ];
        let diagnoses = diagnosis_summary(&records);
        assert!(diagnoses.flags.asthma);
        assert!(!diagnoses.flags.pneumonia);
        assert!(diagnoses.flags.anxiety);
        assert!(!diagnoses.flags.copd);
        assert_eq!(diagnoses.top_conditions.len(), 3);
        assert_eq!(diagnoses.top_conditions[0].code.as_deref(), Some("J45.909"));
    }

    #[test]
    fn test_top_conditions_are_capped() {
        let records: Vec<_> = (0..15)
            .map(|i| condition("E11.9", &format!("Condition {i}")))
            .collect();
        let diagnoses = diagnosis_summary(&records);
        assert_eq!(diagnoses.top_conditions.len(), MAX_TOP_CONDITIONS);
        assert!(!diagnoses.flags.any());
    }

    #[test]
    fn test_imaging_keeps_relevant_studies_only() {
        let mut ctpa = ClinicalObservationRecord::new(RecordCategory::Imaging)
            .with_display("CT Pulmonary Angiogram")
            .with_timestamp("2023-11-02T14:00:00Z");
        ctpa.value = Some(ObservationValue::Text(
            "IMPRESSION:   No evidence of\npulmonary embolism.".to_string(),
        ));
        let knee = ClinicalObservationRecord::new(RecordCategory::Imaging)
            .with_display("XR Knee 2 views");

        let studies = imaging_studies(&[knee, ctpa]);
        assert_eq!(studies.len(), 1);
        assert_eq!(studies[0].imaging_type, ImagingType::Ctpa);
        assert_eq!(studies[0].date.as_deref(), Some("2023-11-02"));
        assert_eq!(studies[0].snippet, "IMPRESSION: No evidence of pulmonary embolism.");
    }

    #[test]
    fn test_imaging_is_capped() {
        let records: Vec<_> = (0..5)
            .map(|_| ClinicalObservationRecord::new(RecordCategory::Imaging).with_display("V/Q scan"))
            .collect();
        assert_eq!(imaging_studies(&records).len(), MAX_IMAGING_STUDIES);
    }

    #[test]
    fn test_lab_series() {
        let records = vec![
            ClinicalObservationRecord::quantity(RecordCategory::Lab, "6301-6", 2.4, "{INR}")
                .with_timestamp("2024-03-03T09:00:00Z"),
            ClinicalObservationRecord::quantity(RecordCategory::Lab, "48065-7", 620.0, "ng/mL")
                .with_timestamp("2024-03-03T09:00:00Z"),
            // No timestamp.
            ClinicalObservationRecord::quantity(RecordCategory::Lab, "6301-6", 3.1, "{INR}"),
            ClinicalObservationRecord::quantity(RecordCategory::Lab, "34714-6", 2.0, "{INR}")
                .with_timestamp("2024-02-20T09:00:00Z"),
        ];
        let inr = lab_series(&records, "inr");
        assert_eq!(inr.len(), 2);
        assert_eq!(inr[0].value, 2.4);
        assert_eq!(inr[1].code.as_deref(), Some("34714-6"));

        let d_dimer = lab_series(&records, "d_dimer");
        assert_eq!(d_dimer.len(), 1);
        assert_eq!(d_dimer[0].value, 620.0);

        assert!(lab_series(&records, "not_a_lab").is_empty());
    }

    fn vital_at(loinc: &str, value: f64, time: &str) -> ClinicalObservationRecord {
        ClinicalObservationRecord::quantity(RecordCategory::Vital, loinc, value, "")
            .with_timestamp(time)
    }

    fn blood_pressure_panel(systolic: f64, diastolic: f64, time: &str) -> ClinicalObservationRecord {
        let component = |code: &str, value: f64| ObservationComponent {
            codes: vec![Coding::loinc(code)],
            display: None,
            value: Some(ObservationValue::Quantity {
                value: Some(value),
                unit: Some("mm[Hg]".to_string()),
            }),
            unit: None,
        };
        let mut panel =
            ClinicalObservationRecord::new(RecordCategory::Vital).with_timestamp(time);
        panel.codes.push(Coding::loinc("85354-9"));
        panel.value = Some(ObservationValue::Composite {
            components: vec![component("8480-6", systolic), component("8462-4", diastolic)],
        });
        panel
    }

    #[test]
    fn test_vital_series_reads_panels_and_text() {
        let mut pulse = ClinicalObservationRecord::new(RecordCategory::Vital)
            .with_display("Pulse")
            .with_timestamp("2024-03-03T10:00:00Z");
        pulse.value = Some(ObservationValue::Decimal(96.0));
        let records = vec![
            vital_at("8867-4", 104.0, "2024-03-03T11:00:00Z"),
            pulse,
            // No timestamp.
            ClinicalObservationRecord::quantity(RecordCategory::Vital, "8867-4", 99.0, "/min"),
            blood_pressure_panel(132.0, 84.0, "2024-03-03T11:00:00Z"),
            vital_at("59408-5", 93.0, "2024-03-03T11:00:00Z"),
        ];

        let hr = vital_series(&records, "triage_hr");
        assert_eq!(
            hr,
            vec![
                VitalPoint {
                    time: "2024-03-03T11:00:00Z".to_string(),
                    value: 104.0
                },
                VitalPoint {
                    time: "2024-03-03T10:00:00Z".to_string(),
                    value: 96.0
                },
            ]
        );
        let sbp = vital_series(&records, "triage_sbp");
        assert_eq!(sbp.len(), 1);
        assert_eq!(sbp[0].value, 132.0);
        assert!(vital_series(&records, "not_a_vital").is_empty());

        let series = VitalSeries::from_records(&records);
        assert_eq!(
            series.available(),
            VitalsAvailable {
                hr: true,
                spo2: true,
                rr: false,
                sbp: true,
            }
        );
    }

    #[test]
    fn test_long_vital_series_is_thinned() {
        let records: Vec<_> = (0..450)
            .map(|i| vital_at("9279-1", i as f64, &format!("2024-03-03T00:{:02}:00Z", i % 60)))
            .collect();
        let rr = vital_series(&records, "triage_rr");
        assert_eq!(rr.len(), MAX_SERIES_POINTS);
        // Step of 450 / 200 = 2.
        assert_eq!(rr[0].value, 0.0);
        assert_eq!(rr[1].value, 2.0);
        assert_eq!(rr[199].value, 398.0);

        let short: Vec<_> = (0..200).map(|i| vital_at("9279-1", i as f64, "t")).collect();
        assert_eq!(vital_series(&short, "triage_rr").len(), 200);
    }

    #[test]
    fn test_empty_context() {
        let context = clinical_context(&[]);
        assert_eq!(context.anticoagulation.status, AnticoagulationStatus::None);
        assert!(context.anticoagulation.active_medications.is_empty());
        assert!(!context.diagnoses.flags.any());
        assert!(context.imaging.is_empty());
        assert!(context.vitals.hr.is_empty());
        assert_eq!(context.vitals_available, VitalsAvailable::default());
        assert!(context.inr_series.is_empty());
    }
}
