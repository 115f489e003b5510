//! Batch orchestration: rows in, certificates and an archive out.
//!
//! Rows are rendered one after another, in source order, each under its own
//! deadline. Progress is written back to the [`BatchStore`] so status polls
//! observe a batch while it runs. Row failures follow the configured
//! [`FailurePolicy`]:
//!
//! | Policy | A row fails | Batch outcome |
//! |--------|-------------|---------------|
//! | `Abort` | stop immediately | `failed` with the row's error |
//! | `Skip` | record error on the item, continue | `completed` unless nothing rendered |

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::archive::Archiver;
use super::store::BatchStore;
use super::{Batch, BatchItem, OutputFormat};
use crate::config::{FailurePolicy, Settings};
use crate::error::CertError;
use crate::render::ItemRenderer;
use crate::rows::{FieldMapping, Row, RowSource, resolve_row};
use crate::template::{TemplateKind, TemplateStore};

/// Row keys tried, in order, for the human part of an output file name.
const NAME_KEYS: [&str; 5] = ["name", "full_name", "fullName", "Name", "recipient_name"];

/// Per-request overrides of the stored batch parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub mapping: Option<FieldMapping>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

/// Result of a completed batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSummary {
    pub batch_id: String,
    pub generated_count: usize,
    pub total_count: usize,
    pub zip_file: String,
    pub zip_url: String,
    pub sample: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub render_timeout: Duration,
    pub max_rows: usize,
    pub progress_every: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl OrchestratorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            render_timeout: settings.render_timeout(),
            max_rows: settings.max_rows,
            progress_every: settings.progress_every,
            failure_policy: settings.failure_policy,
        }
    }
}

/// Public URL of a file in the generated directory.
pub fn generated_url(file: &str) -> String {
    format!("/generated/{}", file)
}

/// Deterministic output name for row `index` of a batch.
///
/// The first non-empty name-like field is made filesystem safe by replacing
/// every character that is not an ASCII letter or digit with `_`.
pub fn output_file_name(batch_id: &str, row: &Row, index: usize, extension: &str) -> String {
    let safe_name = NAME_KEYS
        .iter()
        .filter_map(|key| row.get(*key))
        .find(|value| !value.is_empty())
        .map(|value| {
            value
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect()
        })
        .unwrap_or_else(|| "cert".to_string());
    format!("cert_{}_{}_{}.{}", batch_id, safe_name, index, extension)
}

/// Drives batches from `pending` to a terminal state.
pub struct BatchOrchestrator {
    store: Arc<dyn BatchStore>,
    rows: Arc<dyn RowSource>,
    templates: TemplateStore,
    renderer: Arc<dyn ItemRenderer>,
    archiver: Archiver,
    options: OrchestratorOptions,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn BatchStore>,
        rows: Arc<dyn RowSource>,
        templates: TemplateStore,
        renderer: Arc<dyn ItemRenderer>,
        archiver: Archiver,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            store,
            rows,
            templates,
            renderer,
            archiver,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn BatchStore> {
        &self.store
    }

    /// Run the whole pipeline for batch `id`.
    ///
    /// An unknown id creates the batch. Missing template or file parameters are
    /// rejected before the record is touched. Any later error leaves the batch
    /// `failed` with the message recorded, and is also returned.
    pub async fn generate(
        &self,
        id: &str,
        request: GenerateRequest,
    ) -> Result<GenerateSummary, CertError> {
        let mut batch = match self.store.get(id).await? {
            Some(batch) => batch,
            None => Batch::new(id),
        };

        if let Some(template_id) = request.template_id {
            batch.template_id = Some(template_id);
        }
        if let Some(filename) = request.filename {
            batch.filename = Some(filename);
        }
        if let Some(mapping) = request.mapping {
            batch.mapping = mapping;
        }
        if let Some(format) = request.format {
            batch.format = format;
        }

        let template_id = batch
            .template_id
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CertError::InvalidRequest("templateId is required".to_string()))?;
        let filename = batch
            .filename
            .clone()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| CertError::InvalidRequest("filename is required".to_string()))?;

        batch.start_processing();
        self.store.put(batch.clone()).await?;
        info!(batch_id = %batch.id, template = %template_id, file = %filename, "batch processing");

        let started = Instant::now();
        match self.run(&mut batch, &template_id, &filename).await {
            Ok(zip_file) => {
                batch.complete(zip_file.clone());
                self.store.put(batch.clone()).await?;
                info!(
                    batch_id = %batch.id,
                    generated = batch.generated_count,
                    total = batch.total_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "batch completed"
                );
                let sample = batch.generated_files().first().map(|f| generated_url(f));
                Ok(GenerateSummary {
                    batch_id: batch.id.clone(),
                    generated_count: batch.generated_count,
                    total_count: batch.total_count,
                    zip_url: generated_url(&zip_file),
                    zip_file,
                    sample,
                })
            }
            Err(e) => {
                error!(batch_id = %batch.id, error = %e, "batch failed");
                batch.fail(e.to_string());
                self.store.put(batch).await?;
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        batch: &mut Batch,
        template_id: &str,
        filename: &str,
    ) -> Result<String, CertError> {
        let template = self
            .templates
            .get(template_id)
            .await?
            .ok_or_else(|| CertError::TemplateNotFound(template_id.to_string()))?;

        let rows = self.rows.read_rows(filename).await?;
        batch.total_count = rows.len();
        self.store.put(batch.clone()).await?;

        let extension = match template.kind {
            TemplateKind::PdfOverlay => "pdf",
            TemplateKind::Canvas => batch.format.extension(),
        };
        let limit = rows.len().min(self.options.max_rows);
        if limit < rows.len() {
            warn!(batch_id = %batch.id, total = rows.len(), limit, "row cap reached, extra rows ignored");
        }

        for (index, raw) in rows.iter().take(limit).enumerate() {
            let data = resolve_row(raw, &batch.mapping);
            let target = output_file_name(&batch.id, &data, index, extension);

            let outcome = match tokio::time::timeout(
                self.options.render_timeout,
                self.renderer.render(&template, &data, Some(target.as_str())),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CertError::timeout(
                    format!("Render of row {}", index),
                    self.options.render_timeout,
                )),
            };

            match outcome {
                Ok(output) => {
                    let file = output.file_name().unwrap_or(target);
                    batch.items.push(BatchItem {
                        index,
                        file: Some(file),
                        data,
                        error: None,
                    });
                    batch.generated_count += 1;
                }
                Err(e) => match self.options.failure_policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Skip => {
                        warn!(batch_id = %batch.id, row = index, error = %e, "row failed, skipping");
                        batch.items.push(BatchItem {
                            index,
                            file: None,
                            data,
                            error: Some(e.to_string()),
                        });
                    }
                },
            }

            let done = index + 1;
            if self.options.progress_every > 0 && done % self.options.progress_every == 0 {
                info!(batch_id = %batch.id, done, limit, generated = batch.generated_count, "batch progress");
                self.store.put(batch.clone()).await?;
            }
        }

        if limit > 0 && batch.generated_count == 0 {
            return Err(CertError::Render(format!(
                "no certificates were generated ({} rows failed)",
                limit
            )));
        }

        self.archiver.archive(&batch.generated_files(), &batch.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(
            output_file_name("batch_1", &row(&[("name", "Ann O'Neil")]), 0, "png"),
            "cert_batch_1_Ann_O_Neil_0.png"
        );
        assert_eq!(
            output_file_name("b", &row(&[("name", ""), ("fullName", "Zoë Li")]), 4, "pdf"),
            "cert_b_Zo__Li_4.pdf"
        );
        assert_eq!(output_file_name("b", &Row::new(), 2, "png"), "cert_b_cert_2.png");
    }

    #[test]
    fn test_generate_request_parsing() {
        let req: GenerateRequest = serde_json::from_str(r#"{"templateId":"default-1","format":"pdf"}"#).unwrap();
        assert_eq!(req.template_id.as_deref(), Some("default-1"));
        assert_eq!(req.format, Some(OutputFormat::Pdf));
        assert!(req.filename.is_none());
    }

    #[test]
    fn test_summary_wire_format() {
        let summary = GenerateSummary {
            batch_id: "b".to_string(),
            generated_count: 1,
            total_count: 2,
            zip_file: "certificates_b.zip".to_string(),
            zip_url: generated_url("certificates_b.zip"),
            sample: Some(generated_url("cert_b_cert_0.png")),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["zipUrl"], "/generated/certificates_b.zip");
        assert_eq!(json["generatedCount"], 1);
        assert_eq!(json["sample"], "/generated/cert_b_cert_0.png");
    }
}
