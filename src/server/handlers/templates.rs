//! Template collection handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::sync::Arc;

use crate::error::CertError;
use crate::template::TemplateDocument;

use super::super::state::AppState;
use super::ApiError;

/// GET /api/templates
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<TemplateDocument>>, ApiError> {
    Ok(Json(state.templates.list().await?))
}

/// POST /api/templates
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(doc): Json<TemplateDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.templates.create(doc).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/templates/:id
pub async fn fetch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TemplateDocument>, ApiError> {
    state
        .templates
        .get_document(&id)
        .await?
        .map(Json)
        .ok_or_else(|| CertError::TemplateNotFound(id).into())
}

/// PUT /api/templates/:id - shallow-merge the body over the stored template.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<TemplateDocument>, ApiError> {
    Ok(Json(state.templates.update(&id, patch).await?))
}
