use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: None,
    }
  }

  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  MetricsError(srcds_metrics::MetricsError),
  ValidationError(String),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    match self {
      AppError::MetricsError(err) => {
        tracing::error!(?err, "Failed to render metrics");
        let error_response = ErrorResponse::with_details(
          "Failed to render metrics",
          "Check the exporter logs for details.",
        );
        (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response)).into_response()
      }
      AppError::ValidationError(msg) => {
        tracing::warn!(validation_error = %msg, "Status rejected");
        let error_response = ErrorResponse::new(msg);
        (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
      }
    }
  }
}

impl From<srcds_metrics::MetricsError> for AppError {
  fn from(err: srcds_metrics::MetricsError) -> Self {
    AppError::MetricsError(err)
  }
}

impl From<crate::validation::ValidationError> for AppError {
  fn from(err: crate::validation::ValidationError) -> Self {
    AppError::ValidationError(err.to_string())
  }
}
