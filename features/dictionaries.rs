//! Static code and text tables used to recognise clinical records.
//!
//! Every lookup here is total: an unrecognised code or string yields `None`
//! (or the `Other` class), never an error. Codes are always consulted before
//! free text, and within a text table the first entry in declaration order
//! wins.

use serde::{Deserialize, Serialize};

/// One observation kind: the LOINC codes that identify it (synonyms across
/// coding revisions) and the display-text fragments used when no code matches.
#[derive(Clone, Debug)]
pub struct ObservationKind {
    /// Feature name the measurement feeds, before any unit conversion.
    pub feature: &'static str,
    pub loinc: &'static [&'static str],
    /// Lowercase substrings matched against the record's display text.
    pub patterns: &'static [&'static str],
}

impl ObservationKind {
    pub fn matches_code(&self, code: &str) -> bool {
        self.loinc.contains(&code)
    }
}

/// Vital-sign table. Oxygen saturation precedes heart rate so that
/// "pulse ox" is not read as a pulse.
pub const VITAL_SIGNS: &[ObservationKind] = &[
    ObservationKind {
        feature: "triage_o2sat",
        loinc: &["59408-5", "2708-6"],
        patterns: &["oxygen saturation", "spo2", "o2 sat", "pulse ox"],
    },
    ObservationKind {
        feature: "triage_hr",
        loinc: &["8867-4"],
        patterns: &["heart rate", "pulse", "hr"],
    },
    ObservationKind {
        feature: "triage_rr",
        loinc: &["9279-1"],
        patterns: &["respiratory rate", "resp rate", "rr", "breathing rate"],
    },
    ObservationKind {
        feature: "triage_sbp",
        loinc: &["8480-6"],
        patterns: &["systolic", "sbp"],
    },
    ObservationKind {
        feature: "triage_dbp",
        loinc: &["8462-4"],
        patterns: &["diastolic", "dbp"],
    },
    ObservationKind {
        feature: "triage_temp",
        loinc: &["8310-5", "8331-1"],
        patterns: &["temperature", "temp"],
    },
    ObservationKind {
        feature: "height",
        loinc: &["8302-2"],
        patterns: &["body height", "height"],
    },
    ObservationKind {
        feature: "weight",
        loinc: &["29463-7", "3141-9"],
        patterns: &["body weight", "weight"],
    },
];

/// Laboratory table. INR is not a model feature; it is kept here so the
/// clinical context can build its series from the same codes.
pub const LABORATORY: &[ObservationKind] = &[
    ObservationKind {
        feature: "d_dimer",
        loinc: &["48065-7", "48066-5", "48067-3", "3246-6", "48058-2"],
        patterns: &["d-dimer", "ddimer", "d dimer"],
    },
    ObservationKind {
        feature: "troponin_t",
        loinc: &["6598-7", "89579-7", "10839-9", "49563-0"],
        patterns: &["troponin"],
    },
    ObservationKind {
        feature: "ntprobnp",
        loinc: &["33762-6", "30934-4"],
        patterns: &["bnp", "natriuretic"],
    },
    ObservationKind {
        feature: "creatinine",
        loinc: &["2160-0", "38483-4"],
        patterns: &["creatinine"],
    },
    ObservationKind {
        feature: "hemoglobin",
        loinc: &["718-7"],
        patterns: &["hemoglobin", "haemoglobin", "hgb"],
    },
    ObservationKind {
        feature: "wbc",
        loinc: &["6690-2"],
        patterns: &["white blood", "leukocyte", "wbc"],
    },
    ObservationKind {
        feature: "platelet",
        loinc: &["777-3"],
        patterns: &["platelet", "plt"],
    },
    ObservationKind {
        feature: "sodium",
        loinc: &["2951-2"],
        patterns: &["sodium"],
    },
    ObservationKind {
        feature: "potassium",
        loinc: &["2823-3"],
        patterns: &["potassium"],
    },
    ObservationKind {
        feature: "bun",
        loinc: &["3094-0"],
        patterns: &["urea nitrogen", "bun"],
    },
    ObservationKind {
        feature: "glucose",
        loinc: &["2345-7", "2339-0"],
        patterns: &["glucose"],
    },
    ObservationKind {
        feature: "lactate",
        loinc: &["2524-7"],
        patterns: &["lactate", "lactic acid"],
    },
    ObservationKind {
        feature: "po2",
        loinc: &["2703-7"],
        patterns: &["po2", "oxygen partial pressure"],
    },
    ObservationKind {
        feature: "pco2",
        loinc: &["2019-8"],
        patterns: &["pco2", "carbon dioxide partial pressure"],
    },
    ObservationKind {
        feature: "ph",
        loinc: &["2744-1"],
        patterns: &["blood ph", "arterial ph", "venous ph", "ph of"],
    },
    ObservationKind {
        feature: "inr",
        loinc: &["6301-6", "34714-6", "46418-0"],
        patterns: &["inr", "international normalized"],
    },
];

/// Looks up a table entry by the feature it feeds.
pub fn kind_for_feature(
    table: &'static [ObservationKind],
    feature: &str,
) -> Option<&'static ObservationKind> {
    table.iter().find(|kind| kind.feature == feature)
}

/// Entry whose code list contains any of `codes`. Table order decides ties.
pub fn match_code(table: &'static [ObservationKind], codes: &[&str]) -> Option<&'static ObservationKind> {
    table
        .iter()
        .find(|kind| codes.iter().any(|code| kind.matches_code(code)))
}

/// First entry, in declaration order, with a pattern contained in `display`.
pub fn match_text(table: &'static [ObservationKind], display: &str) -> Option<&'static ObservationKind> {
    let lower = display.to_lowercase();
    if lower.trim().is_empty() {
        return None;
    }
    table
        .iter()
        .find(|kind| kind.patterns.iter().any(|p| lower.contains(p)))
}

// --- Medications ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MedicationClass {
    #[serde(rename = "DOAC")]
    Doac,
    Warfarin,
    #[serde(rename = "Heparin_LMWH")]
    HeparinLmwh,
    Antiplatelet,
    Other,
}

impl MedicationClass {
    pub fn label(self) -> &'static str {
        match self {
            MedicationClass::Doac => "DOAC",
            MedicationClass::Warfarin => "Warfarin",
            MedicationClass::HeparinLmwh => "Heparin_LMWH",
            MedicationClass::Antiplatelet => "Antiplatelet",
            MedicationClass::Other => "Other",
        }
    }

    /// Anticoagulants proper; antiplatelets do not count.
    pub fn is_anticoagulant(self) -> bool {
        matches!(
            self,
            MedicationClass::Doac | MedicationClass::Warfarin | MedicationClass::HeparinLmwh
        )
    }
}

const MEDICATION_PATTERNS: &[(MedicationClass, &[&str])] = &[
    (
        MedicationClass::Doac,
        &[
            "apixaban",
            "eliquis",
            "rivaroxaban",
            "xarelto",
            "dabigatran",
            "pradaxa",
            "edoxaban",
            "savaysa",
            "lixiana",
            "betrixaban",
            "bevyxxa",
        ],
    ),
    (MedicationClass::Warfarin, &["warfarin", "coumadin", "jantoven"]),
    (
        MedicationClass::HeparinLmwh,
        &[
            "heparin",
            "enoxaparin",
            "lovenox",
            "dalteparin",
            "fragmin",
            "tinzaparin",
            "innohep",
            "fondaparinux",
            "arixtra",
        ],
    ),
    (
        MedicationClass::Antiplatelet,
        &[
            "aspirin",
            "asa",
            "acetylsalicylic",
            "clopidogrel",
            "plavix",
            "ticagrelor",
            "brilinta",
            "prasugrel",
            "effient",
            "dipyridamole",
            "aggrenox",
            "ticlopidine",
            "ticlid",
            "cangrelor",
            "kengreal",
            "vorapaxar",
            "zontivity",
        ],
    ),
];

/// Classifies a medication name by case-insensitive substring match.
pub fn classify_medication(name: &str) -> MedicationClass {
    let lower = name.to_lowercase();
    MEDICATION_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(class, _)| *class)
        .unwrap_or(MedicationClass::Other)
}

// --- PE-mimic diagnoses ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimicCategory {
    Asthma,
    Anxiety,
    Copd,
    Chf,
    Pneumonia,
}

impl MimicCategory {
    pub const ALL: [MimicCategory; 5] = [
        MimicCategory::Asthma,
        MimicCategory::Anxiety,
        MimicCategory::Copd,
        MimicCategory::Chf,
        MimicCategory::Pneumonia,
    ];

    fn icd10_prefixes(self) -> &'static [&'static str] {
        match self {
            MimicCategory::Asthma => &["J45"],
            MimicCategory::Anxiety => &["F40", "F41"],
            MimicCategory::Copd => &["J44", "J43"],
            MimicCategory::Chf => &["I50", "I11.0", "I13.0", "I13.2"],
            MimicCategory::Pneumonia => &["J12", "J13", "J14", "J15", "J16", "J17", "J18"],
        }
    }

    fn patterns(self) -> &'static [&'static str] {
        match self {
            MimicCategory::Asthma => &["asthma", "reactive airway", "bronchospasm"],
            MimicCategory::Anxiety => &[
                "anxiety",
                "panic",
                "hyperventilation syndrome",
                "generalized anxiety",
                "panic disorder",
                "gad",
            ],
            MimicCategory::Copd => &[
                "copd",
                "chronic obstructive",
                "emphysema",
                "chronic bronchitis",
                "obstructive lung disease",
            ],
            MimicCategory::Chf => &[
                "heart failure",
                "chf",
                "congestive heart",
                "cardiomyopathy",
                "systolic dysfunction",
                "diastolic dysfunction",
                "hfref",
                "hfpef",
                "left ventricular failure",
                "right heart failure",
            ],
            MimicCategory::Pneumonia => &[
                "pneumonia",
                "pneumonitis",
                "lower respiratory infection",
                "community acquired pneumonia",
                "cap",
                "hap",
                "aspiration pneumonia",
            ],
        }
    }
}

/// Classifies a diagnosis. Any ICD-10 prefix match wins over text.
pub fn classify_diagnosis<'a, I>(codes: I, display: Option<&str>) -> Option<MimicCategory>
where
    I: IntoIterator<Item = &'a str>,
{
    for code in codes {
        let upper = code.trim().to_uppercase();
        if upper.is_empty() {
            continue;
        }
        let by_code = MimicCategory::ALL
            .into_iter()
            .find(|category| category.icd10_prefixes().iter().any(|p| upper.starts_with(p)));
        if by_code.is_some() {
            return by_code;
        }
    }

    let lower = display?.to_lowercase();
    MimicCategory::ALL
        .into_iter()
        .find(|category| category.patterns().iter().any(|p| lower.contains(p)))
}

// --- Imaging ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImagingType {
    #[serde(rename = "CTPA")]
    Ctpa,
    #[serde(rename = "CTA Chest")]
    CtaChest,
    #[serde(rename = "VQ")]
    Vq,
    Other,
}

impl ImagingType {
    pub fn is_pe_relevant(self) -> bool {
        self != ImagingType::Other
    }
}

/// Classifies a radiology description by the study it most likely is.
pub fn classify_imaging(description: &str) -> ImagingType {
    let lower = description.to_lowercase();
    let any = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    if any(&["ctpa", "ct pulmonary", "cta chest", "pe protocol"]) {
        ImagingType::Ctpa
    } else if any(&["ct angiography chest", "ct angio chest"]) {
        ImagingType::CtaChest
    } else if any(&["v/q", "ventilation perfusion", "lung scan"]) {
        ImagingType::Vq
    } else if lower.contains("pulmonary embol") {
        ImagingType::Ctpa
    } else {
        ImagingType::Other
    }
}

pub const SNIPPET_LENGTH: usize = 200;

/// Collapses whitespace and cuts `text` to at most `max_chars` characters,
/// preferring a word boundary in the last 30% of the window.
pub fn imaging_snippet(text: &str, max_chars: usize) -> String {
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.chars().count() <= max_chars {
        return cleaned;
    }

    let mut truncated: String = cleaned.chars().take(max_chars).collect();
    if let Some(last_space) = truncated.rfind(' ') {
        let space_chars = truncated[..last_space].chars().count();
        if space_chars as f64 > max_chars as f64 * 0.7 {
            truncated.truncate(last_space);
        }
    }
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medication_classes() {
        assert_eq!(classify_medication("Eliquis 5mg"), MedicationClass::Doac);
        assert_eq!(classify_medication("Coumadin"), MedicationClass::Warfarin);
        assert_eq!(classify_medication("Tylenol"), MedicationClass::Other);
        assert_eq!(classify_medication("ENOXAPARIN 40 MG/0.4ML"), MedicationClass::HeparinLmwh);
        assert_eq!(classify_medication("Plavix 75 mg"), MedicationClass::Antiplatelet);
        assert_eq!(classify_medication(""), MedicationClass::Other);
    }

    #[test]
    fn test_anticoagulant_excludes_antiplatelets() {
        assert!(MedicationClass::Warfarin.is_anticoagulant());
        assert!(!MedicationClass::Antiplatelet.is_anticoagulant());
        assert!(!MedicationClass::Other.is_anticoagulant());
    }

    #[test]
    fn test_diagnosis_code_wins_over_text() {
        // Code says asthma, text says pneumonia.
        let category = classify_diagnosis(["j45.909"], Some("Pneumonia, unspecified"));
        assert_eq!(category, Some(MimicCategory::Asthma));
        assert_eq!(
            classify_diagnosis(["I13.0"], None),
            Some(MimicCategory::Chf)
        );
    }

    #[test]
    fn test_diagnosis_text_fallback_and_no_match() {
        assert_eq!(
            classify_diagnosis(["Z00.00"], Some("Chronic obstructive pulmonary disease")),
            Some(MimicCategory::Copd)
        );
        assert_eq!(
            classify_diagnosis(std::iter::empty(), Some("Panic attack")),
            Some(MimicCategory::Anxiety)
        );
        assert_eq!(classify_diagnosis(std::iter::empty(), Some("Fracture of wrist")), None);
        assert_eq!(classify_diagnosis(std::iter::empty(), None), None);
    }

    #[test]
    fn test_vital_text_prefers_saturation_over_pulse() {
        let kind = match_text(VITAL_SIGNS, "Pulse Oximetry").unwrap();
        assert_eq!(kind.feature, "triage_o2sat");
        let kind = match_text(VITAL_SIGNS, "Pulse").unwrap();
        assert_eq!(kind.feature, "triage_hr");
        assert!(match_text(VITAL_SIGNS, "   ").is_none());
    }

    #[test]
    fn test_code_lookup_covers_synonyms() {
        let kind = match_code(LABORATORY, &["3246-6"]).unwrap();
        assert_eq!(kind.feature, "d_dimer");
        let kind = match_code(VITAL_SIGNS, &["unknown", "2708-6"]).unwrap();
        assert_eq!(kind.feature, "triage_o2sat");
        assert!(match_code(LABORATORY, &["0000-0"]).is_none());
        assert_eq!(kind_for_feature(LABORATORY, "inr").unwrap().loinc.len(), 3);
    }

    #[test]
    fn test_imaging_classification() {
        assert_eq!(classify_imaging("CT Pulmonary Angiogram"), ImagingType::Ctpa);
        assert_eq!(classify_imaging("CT Angio Chest w contrast"), ImagingType::CtaChest);
        assert_eq!(classify_imaging("NM Lung Scan V/Q"), ImagingType::Vq);
        assert_eq!(classify_imaging("Evaluate for pulmonary embolism"), ImagingType::Ctpa);
        assert_eq!(classify_imaging("XR Wrist 2 views"), ImagingType::Other);
        assert!(!ImagingType::Other.is_pe_relevant());
    }

    #[test]
    fn test_snippet_breaks_on_word_boundary() {
        assert_eq!(imaging_snippet("  short\n report ", SNIPPET_LENGTH), "short report");

        let text = "word ".repeat(60);
        let snippet = imaging_snippet(&text, SNIPPET_LENGTH);
        assert!(snippet.ends_with("..."));
        let body = snippet.trim_end_matches("...");
        assert!(body.chars().count() <= SNIPPET_LENGTH);
        assert!(body.ends_with("word"));

        // No space late enough in the window: hard cut.
        let unbroken = "x".repeat(250);
        let snippet = imaging_snippet(&unbroken, SNIPPET_LENGTH);
        assert_eq!(snippet.chars().count(), SNIPPET_LENGTH + 3);
    }
}
