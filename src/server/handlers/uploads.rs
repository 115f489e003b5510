//! Spreadsheet upload handler.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::rows::Row;

use super::super::state::AppState;
use super::ApiError;

const ACCEPTED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

/// Response from the upload endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Stored name, used as `filename` when creating batches.
    pub filename: String,
    pub original_name: String,
    pub row_count: usize,
    pub headers: Vec<String>,
    pub preview: Vec<Row>,
}

/// POST /api/uploads - store a spreadsheet and report its shape.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload.csv").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
        upload = Some((original_name, bytes.to_vec()));
        break;
    }

    let (original_name, bytes) = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    let extension = Path::new(&original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::bad_request(
            "Only CSV and Excel files (.csv, .xlsx, .xls) are allowed",
        ));
    }

    let filename = format!("{}.{}", Uuid::new_v4(), extension);
    let uploads_dir = state.settings.uploads_dir();
    tokio::fs::create_dir_all(&uploads_dir)
        .await
        .map_err(crate::error::CertError::from)?;
    tokio::fs::write(uploads_dir.join(&filename), &bytes)
        .await
        .map_err(crate::error::CertError::from)?;

    let summary = state.uploads.describe(&filename).await?;
    info!(file = %filename, original = %original_name, rows = summary.row_count, "spreadsheet uploaded");

    Ok(Json(UploadResponse {
        filename,
        original_name,
        row_count: summary.row_count,
        headers: summary.headers,
        preview: summary.preview,
    }))
}
