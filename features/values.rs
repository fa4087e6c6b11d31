use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single feature value as it travels between pipeline stages.
///
/// Most features are numbers. Gender is carried as text, and callers may hand
/// in history flags as booleans. Nothing is coerced until the vector builder
/// needs a float.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl FeatureValue {
    /// Numeric reading of the value. Text is parsed; unparseable text has no number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) => Some(*v),
            FeatureValue::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Text(text) => text.trim().parse::<f64>().ok(),
        }
    }

    /// NaN counts as absent, matching how the training data encoded gaps.
    pub fn is_nan(&self) -> bool {
        matches!(self, FeatureValue::Number(v) if v.is_nan())
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        FeatureValue::Number(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        FeatureValue::Flag(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        FeatureValue::Text(value.to_string())
    }
}

/// Feature name to optional value.
///
/// A key that is present with `None` means "known to the schema, value absent";
/// a key that is not present at all means the feature was never produced.
/// Stages rely on that distinction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMap {
    values: HashMap<String, Option<FeatureValue>, RandomState>,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<FeatureValue>) {
        self.values.insert(name.into(), value);
    }

    pub fn set_number(&mut self, name: impl Into<String>, value: f64) {
        self.insert(name, Some(FeatureValue::Number(value)));
    }

    pub fn set_absent(&mut self, name: impl Into<String>) {
        self.insert(name, None);
    }

    /// The present value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name).and_then(Option::as_ref)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Numeric reading of `name`; `None` when absent or not a number.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FeatureValue::as_f64)
    }

    /// True when the value is absent, the key is unknown, or the value is NaN.
    pub fn is_missing(&self, name: &str) -> bool {
        match self.get(name) {
            None => true,
            Some(value) => value.is_nan(),
        }
    }

    /// Overlays `other` on top of `self`; entries in `other` win.
    pub fn merge(&mut self, other: &FeatureMap) {
        for (name, value) in &other.values {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&FeatureValue>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
}

impl<K: Into<String>> FromIterator<(K, Option<FeatureValue>)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (K, Option<FeatureValue>)>>(iter: I) -> Self {
        let mut map = FeatureMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}
