//! Feature record model

use serde_json::{Map, Value};

use crate::{AppError, AppResult};

pub const FEATURE_COUNT: usize = 13;

/// Required request fields, in the column order the classifier was trained on
pub const REQUIRED_FIELDS: [&str; FEATURE_COUNT] = [
    "age", "sex", "cp", "trestbps",
    "chol", "fbs", "restecg",
    "thalach", "exang", "oldpeak", "slope", "ca", "thal",
];

/// Single-row classifier input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRecord {
    pub age: f64,
    pub sex: f64,
    pub cp: f64,
    pub trestbps: f64,
    pub chol: f64,
    pub fbs: f64,
    pub restecg: f64,
    pub thalach: f64,
    pub exang: f64,
    pub oldpeak: f64,
    pub slope: f64,
    pub ca: f64,
    pub thal: f64,
}

/// Required fields absent from the body, in canonical order
pub fn missing_fields(body: &Map<String, Value>) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !body.contains_key(*field))
        .collect()
}

impl FeatureRecord {
    /// Build the record from a request body. Values are coerced to numbers
    /// only as far as the classifier would coerce them itself; ranges are
    /// left for the classifier to judge.
    pub fn from_body(body: &Map<String, Value>) -> AppResult<Self> {
        let mut row = [0.0f64; FEATURE_COUNT];

        for (slot, field) in row.iter_mut().zip(REQUIRED_FIELDS) {
            let value = body
                .get(field)
                .ok_or_else(|| AppError::MissingKey(field.to_string()))?;
            *slot = coerce(field, value)?;
        }

        Ok(Self::from_row(row))
    }

    pub fn from_row(row: [f64; FEATURE_COUNT]) -> Self {
        let [age, sex, cp, trestbps, chol, fbs, restecg, thalach, exang, oldpeak, slope, ca, thal] = row;
        Self { age, sex, cp, trestbps, chol, fbs, restecg, thalach, exang, oldpeak, slope, ca, thal }
    }

    /// Canonical-order row as fed to the model
    pub fn to_row(&self) -> [f32; FEATURE_COUNT] {
        [
            self.age, self.sex, self.cp, self.trestbps,
            self.chol, self.fbs, self.restecg,
            self.thalach, self.exang, self.oldpeak, self.slope, self.ca, self.thal,
        ]
        .map(|v| v as f32)
    }
}

fn coerce(field: &str, value: &Value) -> AppResult<f64> {
    match value {
        Value::Null => Err(AppError::MissingKey(field.to_string())),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => n.as_f64().ok_or_else(|| {
            AppError::InvalidValue(format!("field '{}' is not representable as a float: {}", field, n))
        }),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            AppError::InvalidValue(format!("field '{}': could not convert string to float: '{}'", field, s))
        }),
        Value::Array(_) | Value::Object(_) => Err(AppError::InvalidValue(format!(
            "field '{}' must be a number, got {}",
            field,
            if value.is_array() { "an array" } else { "an object" }
        ))),
    }
}
