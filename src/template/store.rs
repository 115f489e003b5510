//! File-backed template collection.
//!
//! The collection is a flat JSON array re-read on every call, so edits made
//! to the file by hand are picked up by the next render without a restart.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use super::schema::{BackgroundDocument, FontWeightValue, LayerDocument, TextLayerDocument};
use super::{Template, TemplateDocument};
use crate::error::CertError;

/// Template collection persisted at a single JSON path.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the built-in template if the collection file does not exist yet.
    pub async fn seed_if_missing(&self) -> Result<(), CertError> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        info!(path = %self.path.display(), "seeding template collection");
        self.save(&[default_template()]).await
    }

    /// All stored templates. A missing file is an empty collection; a file
    /// that does not parse is an `InvalidTemplate` error.
    pub async fn list(&self) -> Result<Vec<TemplateDocument>, CertError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "template collection unreadable");
            CertError::InvalidTemplate(format!("{}: {}", self.path.display(), e))
        })
    }

    pub async fn get_document(&self, id: &str) -> Result<Option<TemplateDocument>, CertError> {
        Ok(self.list().await?.into_iter().find(|t| t.id == id))
    }

    /// Look up and normalize a template.
    pub async fn get(&self, id: &str) -> Result<Option<Template>, CertError> {
        match self.get_document(id).await? {
            Some(doc) => Template::from_document(&doc).map(Some),
            None => Ok(None),
        }
    }

    /// Append a template. An empty id is replaced with a millisecond timestamp.
    pub async fn create(&self, mut doc: TemplateDocument) -> Result<TemplateDocument, CertError> {
        if doc.id.is_empty() {
            doc.id = timestamp_id();
        }
        Template::from_document(&doc)?;

        let mut templates = self.list().await?;
        if templates.iter().any(|t| t.id == doc.id) {
            return Err(CertError::InvalidRequest(format!(
                "template '{}' already exists",
                doc.id
            )));
        }
        templates.push(doc.clone());
        self.save(&templates).await?;
        Ok(doc)
    }

    /// Shallow-merge `patch` over the stored template. The id is never changed.
    pub async fn update(&self, id: &str, patch: Value) -> Result<TemplateDocument, CertError> {
        let mut templates = self.list().await?;
        let index = templates
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| CertError::TemplateNotFound(id.to_string()))?;

        let mut merged = serde_json::to_value(&templates[index])?;
        if let (Value::Object(base), Value::Object(patch)) = (&mut merged, patch) {
            for (key, value) in patch {
                base.insert(key, value);
            }
            base.insert("id".to_string(), Value::String(id.to_string()));
        } else {
            return Err(CertError::InvalidRequest(
                "template update must be a JSON object".to_string(),
            ));
        }

        let updated: TemplateDocument = serde_json::from_value(merged)?;
        Template::from_document(&updated)?;
        templates[index] = updated.clone();
        self.save(&templates).await?;
        Ok(updated)
    }

    async fn save(&self, templates: &[TemplateDocument]) -> Result<(), CertError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(templates)
            .map_err(|e| CertError::InvalidTemplate(e.to_string()))?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

fn timestamp_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string()
}

fn text_layer(text: &str, x: f32, y: f32, size: f32, bold: bool, color: &str, align: &str) -> LayerDocument {
    LayerDocument::Text(TextLayerDocument {
        x,
        y,
        font_size: Some(size),
        font_weight: Some(FontWeightValue::Name(
            if bold { "bold" } else { "normal" }.to_string(),
        )),
        color: Some(color.to_string()),
        align: Some(align.to_string()),
        text: Some(text.to_string()),
        ..Default::default()
    })
}

/// The built-in `default-1` certificate.
pub fn default_template() -> TemplateDocument {
    let mut id_layer = text_layer("ID: {certificate_id}", 750.0, 580.0, 12.0, false, "#999999", "right");
    if let LayerDocument::Text(layer) = &mut id_layer {
        layer.pinned_footer = true;
    }

    TemplateDocument {
        id: "default-1".to_string(),
        name: Some("Simple Certificate".to_string()),
        width: Some(800),
        height: Some(600),
        background: Some(BackgroundDocument::Plain("#f0f0f0".to_string())),
        layers: vec![
            text_layer("CERTIFICATE OF ACHIEVEMENT", 400.0, 100.0, 40.0, true, "#000000", "center"),
            text_layer("This is presented to", 400.0, 200.0, 24.0, false, "#333333", "center"),
            text_layer("{name}", 400.0, 300.0, 48.0, true, "#2c3e50", "center"),
            text_layer("For participating in {event}", 400.0, 400.0, 20.0, false, "#555555", "center"),
            text_layer("Date: {date}", 400.0, 500.0, 16.0, false, "#555555", "center"),
            id_layer,
        ],
        kind: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(dir: &tempfile::TempDir) -> TemplateStore {
        TemplateStore::new(dir.path().join("data").join("templates.json"))
    }

    #[tokio::test]
    async fn test_seed_and_get_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.list().await.unwrap().is_empty());

        store.seed_if_missing().await.unwrap();
        let template = store.get("default-1").await.unwrap().unwrap();
        assert_eq!(template.width, 800);
        assert_eq!(template.layers.len(), 6);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seed_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .create(TemplateDocument {
                id: "mine".to_string(),
                name: None,
                width: None,
                height: None,
                background: None,
                layers: vec![],
                kind: None,
            })
            .await
            .unwrap();
        store.seed_if_missing().await.unwrap();
        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["mine"]);
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let doc: TemplateDocument = serde_json::from_value(json!({"width": 300, "height": 200})).unwrap();
        let created = store.create(doc.clone()).await.unwrap();
        assert!(!created.id.is_empty());

        let mut dup = doc;
        dup.id = created.id.clone();
        assert!(matches!(store.create(dup).await, Err(CertError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_update_merges_and_keeps_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.seed_if_missing().await.unwrap();

        let updated = store
            .update("default-1", json!({"id": "hijack", "name": "Renamed", "width": 1000}))
            .await
            .unwrap();
        assert_eq!(updated.id, "default-1");
        assert_eq!(updated.name.as_deref(), Some("Renamed"));
        assert_eq!(updated.width, Some(1000));
        assert_eq!(updated.layers.len(), 6);

        assert!(matches!(
            store.update("nope", json!({})).await,
            Err(CertError::TemplateNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        tokio::fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        tokio::fs::write(store.path(), b"{not json").await.unwrap();
        assert!(matches!(store.list().await, Err(CertError::InvalidTemplate(_))));
        assert!(matches!(store.get("default-1").await, Err(CertError::InvalidTemplate(_))));
    }

    #[tokio::test]
    async fn test_unparseable_collection_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        tokio::fs::create_dir_all(store.path().parent().unwrap()).await.unwrap();
        let original = br#"[{"id":"keep-me"},{"id":"x","layers":[{"type":"shape"}]}]"#;
        tokio::fs::write(store.path(), original).await.unwrap();

        let doc: TemplateDocument = serde_json::from_value(json!({"id": "new"})).unwrap();
        assert!(matches!(store.create(doc).await, Err(CertError::InvalidTemplate(_))));
        assert!(matches!(
            store.update("keep-me", json!({"name": "Renamed"})).await,
            Err(CertError::InvalidTemplate(_))
        ));
        assert!(store.seed_if_missing().await.is_ok());

        assert_eq!(tokio::fs::read(store.path()).await.unwrap(), original.to_vec());
    }
}
