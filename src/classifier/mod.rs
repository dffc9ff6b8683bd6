//! Classifier Module - pre-trained model behind a trait
//!
//! The artifact is loaded once at startup and shared read-only by every
//! request. Handlers only see the [`Classifier`] trait, so the ONNX backend
//! can be swapped (or stubbed in tests) without touching the HTTP layer.

pub mod onnx;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::FeatureRecord;

pub use onnx::OnnxClassifier;

/// Tolerance on `p_negative + p_positive == 1.0` for f32 model outputs
const PROBABILITY_SUM_TOLERANCE: f64 = 1e-3;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Binary class emitted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Negative = 0,
    Positive = 1,
}

impl Label {
    pub fn from_class(class: i64) -> Result<Self, ClassifierError> {
        match class {
            0 => Ok(Label::Negative),
            1 => Ok(Label::Positive),
            other => Err(ClassifierError::Runtime(format!(
                "classifier returned unknown class {}",
                other
            ))),
        }
    }
}

/// Per-row class probabilities, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities {
    pub negative: f64,
    pub positive: f64,
}

impl ClassProbabilities {
    /// Build from the model's `[p_negative, p_positive]` output row
    pub fn from_pair(row: &[f32]) -> Result<Self, ClassifierError> {
        let [negative, positive] = row else {
            return Err(ClassifierError::Runtime(format!(
                "expected 2 class probabilities, got {}",
                row.len()
            )));
        };
        let (negative, positive) = (f64::from(*negative), f64::from(*positive));

        let in_range = |p: f64| p.is_finite() && (0.0..=1.0).contains(&p);
        if !in_range(negative) || !in_range(positive) {
            return Err(ClassifierError::Runtime(format!(
                "class probabilities out of range: [{}, {}]",
                negative, positive
            )));
        }
        if ((negative + positive) - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
            return Err(ClassifierError::Runtime(format!(
                "class probabilities do not sum to 1: [{}, {}]",
                negative, positive
            )));
        }

        Ok(Self { negative, positive })
    }
}

/// Artifact metadata captured at load time
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub path: String,
    pub sha256: String,
    pub loaded_at: DateTime<Utc>,
}

// ============================================================================
// ERROR HANDLING
// ============================================================================

/// Startup-fatal artifact failures
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("classifier artifact file not found: {0}. Ensure '{0}' exists.")]
    NotFound(String),

    #[error("failed to load the classifier artifact: {0}")]
    Load(String),
}

/// Per-request classifier failures
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The classifier rejected a feature value
    #[error("{0}")]
    InvalidValue(String),

    /// Anything else that went wrong while running the model
    #[error("{0}")]
    Runtime(String),
}

// ============================================================================
// CLASSIFIER TRAIT
// ============================================================================

pub trait Classifier: Send + Sync {
    fn classify(&self, record: &FeatureRecord) -> Result<Label, ClassifierError>;

    fn class_probabilities(&self, record: &FeatureRecord) -> Result<ClassProbabilities, ClassifierError>;

    /// Label and probabilities for one record. Backends that produce both
    /// from a single evaluation override this so the pair always comes from
    /// the same run.
    fn predict(&self, record: &FeatureRecord) -> Result<(Label, ClassProbabilities), ClassifierError> {
        Ok((self.classify(record)?, self.class_probabilities(record)?))
    }

    /// Metadata of the loaded artifact, if backed by one
    fn info(&self) -> Option<&ModelInfo> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_from_class() {
        assert_eq!(Label::from_class(0).unwrap(), Label::Negative);
        assert_eq!(Label::from_class(1).unwrap(), Label::Positive);
        assert!(matches!(Label::from_class(2), Err(ClassifierError::Runtime(_))));
    }

    #[test]
    fn test_probabilities_from_pair() {
        let probs = ClassProbabilities::from_pair(&[0.25, 0.75]).unwrap();
        assert_eq!(probs.negative, 0.25);
        assert_eq!(probs.positive, 0.75);
    }

    #[test]
    fn test_probabilities_reject_bad_rows() {
        assert!(ClassProbabilities::from_pair(&[1.0]).is_err());
        assert!(ClassProbabilities::from_pair(&[0.2, 0.3, 0.5]).is_err());
        assert!(ClassProbabilities::from_pair(&[0.6, 0.6]).is_err());
        assert!(ClassProbabilities::from_pair(&[-0.5, 1.5]).is_err());
        assert!(ClassProbabilities::from_pair(&[f32::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_model_error_messages() {
        let err = ModelError::NotFound("heart_disease.onnx".to_string());
        assert!(err.to_string().contains("file not found"));
        assert!(err.to_string().contains("Ensure 'heart_disease.onnx' exists."));

        let err = ModelError::Load("bad header".to_string());
        assert_eq!(err.to_string(), "failed to load the classifier artifact: bad header");
    }

    struct FixedClassifier;

    impl Classifier for FixedClassifier {
        fn classify(&self, _record: &FeatureRecord) -> Result<Label, ClassifierError> {
            Ok(Label::Positive)
        }

        fn class_probabilities(&self, _record: &FeatureRecord) -> Result<ClassProbabilities, ClassifierError> {
            Ok(ClassProbabilities { negative: 0.3, positive: 0.7 })
        }
    }

    #[test]
    fn test_default_predict_combines_both_calls() {
        let record = FeatureRecord::from_row([1.0; crate::models::FEATURE_COUNT]);
        let (label, probs) = FixedClassifier.predict(&record).unwrap();
        assert_eq!(label, Label::Positive);
        assert_eq!(probs, ClassProbabilities { negative: 0.3, positive: 0.7 });
        assert!(FixedClassifier.info().is_none());
    }
}
