//! # Batch Generation
//!
//! A batch renders one certificate per spreadsheet row and packs the results
//! into a zip archive.
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──► processing ──┬──► completed   (zip_file set)
//!                          └──► failed      (error set)
//! ```
//!
//! Terminal batches are never resumed automatically, but calling generate
//! again re-runs the whole pipeline under the same id and overwrites the
//! previous outputs.
//!
//! ## Components
//!
//! - [`store`]: the [`BatchStore`] port and its in-memory implementation
//! - [`orchestrator`]: drives a batch through its lifecycle
//! - [`archive`]: zips the generated files under a deadline

pub mod archive;
pub mod orchestrator;
pub mod store;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::rows::{FieldMapping, Row};

pub use archive::Archiver;
pub use orchestrator::{BatchOrchestrator, GenerateRequest, GenerateSummary, OrchestratorOptions};
pub use store::{BatchStore, InMemoryBatchStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

/// Output format of batch items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
    Pdf,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Pdf => "pdf",
        }
    }
}

/// Outcome of one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// The resolved row the certificate was rendered from.
    pub data: Row,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Caller-supplied batch parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchParams {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub mapping: FieldMapping,
    #[serde(default)]
    pub format: OutputFormat,
}

/// One generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub status: BatchStatus,
    pub filename: Option<String>,
    pub template_id: Option<String>,
    pub mapping: FieldMapping,
    pub format: OutputFormat,
    pub generated_count: usize,
    pub total_count: usize,
    pub items: Vec<BatchItem>,
    pub zip_file: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// A pending batch with no parameters.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_params(id, BatchParams::default())
    }

    pub fn with_params(id: impl Into<String>, params: BatchParams) -> Self {
        Self {
            id: id.into(),
            status: BatchStatus::Pending,
            filename: params.filename,
            template_id: params.template_id,
            mapping: params.mapping,
            format: params.format,
            generated_count: 0,
            total_count: 0,
            items: Vec::new(),
            zip_file: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Clear results of a previous run and enter `processing`.
    pub(crate) fn start_processing(&mut self) {
        self.status = BatchStatus::Processing;
        self.generated_count = 0;
        self.total_count = 0;
        self.items.clear();
        self.zip_file = None;
        self.error = None;
        self.completed_at = None;
    }

    pub(crate) fn complete(&mut self, zip_file: String) {
        self.status = BatchStatus::Completed;
        self.zip_file = Some(zip_file);
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: String) {
        self.status = BatchStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Files generated so far, in row order.
    pub fn generated_files(&self) -> Vec<String> {
        self.items.iter().filter_map(|item| item.file.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_wire_format() {
        let mut batch = Batch::new("batch_1");
        batch.fail("boom".to_string());
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
        assert_eq!(json["generatedCount"], 0);
        assert_eq!(json["format"], "png");
        assert!(json["completedAt"].is_string());
    }

    #[test]
    fn test_params_from_json() {
        let params: BatchParams =
            serde_json::from_str(r#"{"filename":"a.csv","templateId":"default-1","mapping":{"name":"Full Name"},"format":"pdf"}"#)
                .unwrap();
        assert_eq!(params.template_id.as_deref(), Some("default-1"));
        assert_eq!(params.mapping.get("name").map(String::as_str), Some("Full Name"));
        assert_eq!(params.format, OutputFormat::Pdf);
    }

    #[test]
    fn test_start_processing_resets_previous_run() {
        let mut batch = Batch::new("b");
        batch.generated_count = 3;
        batch.complete("certificates_b.zip".to_string());
        batch.start_processing();
        assert_eq!(batch.status, BatchStatus::Processing);
        assert_eq!(batch.generated_count, 0);
        assert!(batch.zip_file.is_none());
        assert!(!batch.status.is_terminal());
    }
}
