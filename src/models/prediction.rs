//! Prediction response model

use serde::Serialize;

use crate::classifier::{ClassProbabilities, Label};

pub const LOW_RISK_VERDICT: &str = "You are at low risk for heart disease.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResponse {
    pub prediction: String,
    pub probabilities: ProbabilityStrings,
}

/// Percentages formatted as `NN.NN%`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityStrings {
    pub negative: String,
    pub positive: String,
}

impl PredictionResponse {
    pub fn new(label: Label, probabilities: ClassProbabilities) -> Self {
        let negative = probabilities.negative * 100.0;
        let positive = probabilities.positive * 100.0;

        Self {
            prediction: verdict(label, positive),
            probabilities: ProbabilityStrings {
                negative: format!("{:.2}%", negative),
                positive: format!("{:.2}%", positive),
            },
        }
    }
}

/// Human-readable sentence; `positive_pct` is already scaled to 0-100
pub fn verdict(label: Label, positive_pct: f64) -> String {
    match label {
        Label::Positive => format!(
            "You have a higher likelihood of heart disease. The probability is {:.2}%.",
            positive_pct
        ),
        Label::Negative => LOW_RISK_VERDICT.to_string(),
    }
}
