//! Server state shared across handlers.

use std::sync::Arc;

use crate::batch::{Archiver, BatchOrchestrator, BatchStore, InMemoryBatchStore, OrchestratorOptions};
use crate::config::Settings;
use crate::error::CertError;
use crate::render::{ItemRenderer, Renderer};
use crate::rows::{RowSource, SpreadsheetRowSource};
use crate::template::TemplateStore;

/// Application state shared across handlers.
pub struct AppState {
    pub settings: Settings,
    pub templates: TemplateStore,
    pub uploads: SpreadsheetRowSource,
    pub renderer: Arc<dyn ItemRenderer>,
    pub batches: Arc<dyn BatchStore>,
    pub orchestrator: BatchOrchestrator,
}

impl AppState {
    /// State wired with the production renderer.
    pub fn new(settings: Settings) -> Result<Self, CertError> {
        let renderer = Renderer::from_settings(&settings)?;
        Ok(Self::with_renderer(settings, Arc::new(renderer)))
    }

    /// State around a caller-supplied renderer.
    pub fn with_renderer(settings: Settings, renderer: Arc<dyn ItemRenderer>) -> Self {
        let templates = TemplateStore::new(settings.templates_path());
        let uploads = SpreadsheetRowSource::new(settings.uploads_dir());
        let batches: Arc<dyn BatchStore> = match settings.batch_capacity {
            Some(capacity) => Arc::new(InMemoryBatchStore::with_capacity(capacity)),
            None => Arc::new(InMemoryBatchStore::new()),
        };
        let rows: Arc<dyn RowSource> = Arc::new(uploads.clone());
        let orchestrator = BatchOrchestrator::new(
            Arc::clone(&batches),
            rows,
            templates.clone(),
            Arc::clone(&renderer),
            Archiver::new(settings.generated_dir(), settings.archive_timeout()),
            OrchestratorOptions::from_settings(&settings),
        );

        Self {
            settings,
            templates,
            uploads,
            renderer,
            batches,
            orchestrator,
        }
    }
}
