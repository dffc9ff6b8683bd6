//! Error handling

use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde_json::json;

use crate::classifier::ClassifierError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Validation errors
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Missing key in input data: '{0}'")]
    MissingKey(String),

    #[error("Invalid input value: {0}")]
    InvalidValue(String),

    // Generic errors
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingFields(_)
            | AppError::MissingKey(_)
            | AppError::InvalidValue(_) => StatusCode::BAD_REQUEST,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::Unexpected(msg) => {
                tracing::error!("Unexpected error: {}", msg);
                "An unexpected error occurred while processing the request".to_string()
            }
            other => {
                tracing::debug!("Rejected request: {}", other);
                other.to_string()
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<ClassifierError> for AppError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::InvalidValue(msg) => AppError::InvalidValue(msg),
            ClassifierError::Runtime(msg) => AppError::Unexpected(msg),
        }
    }
}
