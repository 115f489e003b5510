//! Live preview handler.

use axum::{extract::State, http::header, response::IntoResponse, Json};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::CertError;
use crate::render::RenderOutput;
use crate::rows::Row;
use crate::template::{Template, TemplateDocument};

use super::super::state::AppState;
use super::ApiError;

/// Request body for the preview endpoint. An inline `template` wins over
/// `templateId`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template: Option<TemplateDocument>,
    #[serde(default)]
    pub row_data: Row,
}

/// POST /api/render/preview - render one row in memory and return PNG bytes.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let template = match (req.template, req.template_id) {
        (Some(doc), _) => Template::from_document(&doc)?,
        (None, Some(id)) => state
            .templates
            .get(&id)
            .await?
            .ok_or(CertError::TemplateNotFound(id))?,
        (None, None) => {
            return Err(ApiError::bad_request("templateId or template is required"));
        }
    };

    let timeout = state.settings.render_timeout();
    let output = tokio::time::timeout(timeout, state.renderer.render(&template, &req.row_data, None))
        .await
        .map_err(|_| CertError::timeout("Preview render", timeout))??;
    let bytes = match output {
        RenderOutput::Bytes(bytes) => bytes,
        RenderOutput::File(path) => tokio::fs::read(&path).await.map_err(CertError::from)?,
    };
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}
