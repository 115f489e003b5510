//! HTTP handlers for the server.

pub mod batches;
pub mod render;
pub mod templates;
pub mod uploads;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::error::CertError;

/// JSON error body `{ "error": ..., "details"?: ... }` with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    /// Mapping for generate: bad input and unknown templates are the caller's
    /// fault, anything else is a generation failure with the cause in `details`.
    pub fn generation(err: CertError) -> Self {
        match err {
            CertError::InvalidRequest(message) => Self::bad_request(message),
            CertError::TemplateNotFound(_) => Self::bad_request(err.to_string()),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error: "Generation failed".to_string(),
                details: Some(other.to_string()),
            },
        }
    }
}

impl From<CertError> for ApiError {
    fn from(err: CertError) -> Self {
        let status = match &err {
            CertError::InvalidRequest(_)
            | CertError::InvalidTemplate(_)
            | CertError::UnsupportedOutput(_)
            | CertError::RowSource(_) => StatusCode::BAD_REQUEST,
            CertError::TemplateNotFound(_) | CertError::BatchNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.error,
            details: self.details.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

/// GET / - liveness message.
pub async fn index() -> Json<serde_json::Value> {
    Json(json!({ "message": "certpress API is running" }))
}
