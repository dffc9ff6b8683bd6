//! Prediction handler

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{Map, Value};

use crate::{AppState, AppError, AppResult};
use crate::models::{missing_fields, FeatureRecord, PredictionResponse};

/// Validate the body, run the classifier, format the verdict
pub async fn predict(
    State(state): State<AppState>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> AppResult<Json<PredictionResponse>> {
    let Json(data) = body.map_err(|rejection| {
        tracing::debug!("Unreadable request body: {}", rejection);
        AppError::InvalidValue("request body must be a JSON object".to_string())
    })?;

    let missing = missing_fields(&data);
    if !missing.is_empty() {
        return Err(AppError::MissingFields(missing));
    }

    let record = FeatureRecord::from_body(&data)?;

    // Inference is CPU-bound; keep it off the async workers
    let classifier = Arc::clone(&state.classifier);
    let (label, probabilities) = tokio::task::spawn_blocking(move || classifier.predict(&record))
        .await
        .map_err(|e| AppError::Unexpected(format!("Task failed: {}", e)))??;

    tracing::debug!(
        "Prediction: {:?} (positive {:.4})",
        label, probabilities.positive
    );

    Ok(Json(PredictionResponse::new(label, probabilities)))
}
