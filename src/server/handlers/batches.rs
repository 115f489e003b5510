//! Batch API handlers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::batch::{Batch, BatchParams, GenerateRequest, GenerateSummary};
use crate::error::CertError;

use super::super::state::AppState;
use super::ApiError;

async fn load(state: &AppState, id: &str) -> Result<Batch, ApiError> {
    state
        .batches
        .get(id)
        .await?
        .ok_or_else(|| CertError::BatchNotFound(id.to_string()).into())
}

/// POST /api/batches - register a pending batch.
pub async fn create(
    State(state): State<Arc<AppState>>,
    params: Option<Json<BatchParams>>,
) -> Result<impl IntoResponse, ApiError> {
    let params = params.map(|Json(p)| p).unwrap_or_default();
    let batch = state.batches.create(params).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Batch created", "batchId": batch.id })),
    ))
}

/// POST /api/batches/:id/generate - run the batch to a terminal state.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    request: Option<Json<GenerateRequest>>,
) -> Result<Json<GenerateSummary>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    state
        .orchestrator
        .generate(&id, request)
        .await
        .map(Json)
        .map_err(ApiError::generation)
}

/// GET /api/batches/:id/status - the current batch record.
pub async fn status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Batch>, ApiError> {
    load(&state, &id).await.map(Json)
}

/// GET /api/batches/:id/download - the batch archive.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = load(&state, &id).await?;
    let zip_file = batch
        .zip_file
        .ok_or_else(|| ApiError::not_found("Archive not available"))?;
    let bytes = tokio::fs::read(state.settings.generated_dir().join(&zip_file))
        .await
        .map_err(|_| ApiError::not_found("Archive not available"))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", zip_file),
            ),
        ],
        bytes,
    ))
}

/// GET /api/batches/:id/files/:name - one generated certificate.
pub async fn file(
    State(state): State<Arc<AppState>>,
    Path((id, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = load(&state, &id).await?;
    if !batch.generated_files().iter().any(|f| *f == name) {
        return Err(ApiError::not_found(format!("File not found: {}", name)));
    }
    let bytes = tokio::fs::read(state.settings.generated_dir().join(&name))
        .await
        .map_err(|_| ApiError::not_found(format!("File not found: {}", name)))?;
    let mime = mime_guess::from_path(&name).first_or_octet_stream();

    Ok(([(header::CONTENT_TYPE, mime.essence_str().to_string())], bytes))
}
