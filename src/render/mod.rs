//! # Rendering
//!
//! Turns a normalized [`Template`] plus one data row into a certificate.
//!
//! Rendering happens in two phases. [`Renderer::prepare`] resolves every
//! layer against the row and loads images, producing a [`PreparedPage`] that
//! holds only concrete values. A backend then paints that page:
//!
//! | Output | Backend |
//! |--------|---------|
//! | `.png`, `.jpg`, `.jpeg`, or no target | [`raster`] |
//! | `.pdf` | [`pdf`] (single fixed-size page) |
//! | `pdf-overlay` template kind | [`overlay`] helper process |
//!
//! Painting is CPU-bound and runs on the blocking pool.

pub mod assets;
pub mod color;
pub mod font;
pub mod overlay;
pub mod pdf;
pub mod raster;

use async_trait::async_trait;
use image::{DynamicImage, Rgba};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::CertError;
use crate::rows::Row;
use crate::template::{Align, Background, Layer, Template, TemplateKind};

use assets::AssetResolver;
use color::{BLACK, WHITE, color_or};
use font::FontBook;
use overlay::{DocumentOverlayRenderer, OverlayLayer, SubprocessOverlay};
use pdf::PageMargins;
use raster::RasterFormat;

/// Default overlay text box size when a layer gives none.
const OVERLAY_BOX_WIDTH: f32 = 200.0;
const OVERLAY_BOX_HEIGHT: f32 = 50.0;

/// Page background after asset loading.
#[derive(Debug, Clone)]
pub enum PreparedBackground {
    Fill(Rgba<u8>),
    Image(DynamicImage),
}

/// Text layer with its content resolved for one row.
#[derive(Debug, Clone)]
pub struct PreparedText {
    pub x: f32,
    pub y: f32,
    pub content: String,
    pub font_size: f32,
    pub bold: bool,
    pub font_family: String,
    pub color: Rgba<u8>,
    pub align: Align,
    pub pinned_footer: bool,
}

/// Image layer with its pixels loaded.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub image: DynamicImage,
}

#[derive(Debug, Clone)]
pub enum PreparedLayer {
    Text(PreparedText),
    Image(PreparedImage),
}

/// Everything a backend needs to paint one certificate.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    pub width: u32,
    pub height: u32,
    pub background: PreparedBackground,
    pub layers: Vec<PreparedLayer>,
}

/// Result of a render: in-memory bytes or a file written to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutput {
    Bytes(Vec<u8>),
    File(PathBuf),
}

impl RenderOutput {
    /// File name of a written output.
    pub fn file_name(&self) -> Option<String> {
        match self {
            RenderOutput::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            RenderOutput::Bytes(_) => None,
        }
    }
}

/// Renders one row of a batch.
#[async_trait]
pub trait ItemRenderer: Send + Sync {
    /// Render `row` through `template`. With a `target` file name the result is
    /// written into the output directory, otherwise PNG bytes are returned.
    async fn render(
        &self,
        template: &Template,
        row: &Row,
        target: Option<&str>,
    ) -> Result<RenderOutput, CertError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Raster(RasterFormat),
    Paginated,
    Overlay,
}

fn extension(target: &str) -> String {
    Path::new(target)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Pick the backend for a template and target before any work is done.
fn select_backend(template: &Template, target: Option<&str>) -> Result<Backend, CertError> {
    let ext = target.map(extension);
    if template.kind == TemplateKind::PdfOverlay {
        return match ext.as_deref() {
            None | Some("pdf") | Some("png") => Ok(Backend::Overlay),
            Some(other) => Err(CertError::UnsupportedOutput(format!(
                ".{} (templated PDFs produce .pdf or .png)",
                other
            ))),
        };
    }
    match ext.as_deref() {
        None | Some("png") => Ok(Backend::Raster(RasterFormat::Png)),
        Some("jpg") | Some("jpeg") => Ok(Backend::Raster(RasterFormat::Jpeg)),
        Some("pdf") => Ok(Backend::Paginated),
        Some(other) => Err(CertError::UnsupportedOutput(format!(".{}", other))),
    }
}

/// The production renderer.
#[derive(Clone)]
pub struct Renderer {
    assets: AssetResolver,
    fonts: Arc<FontBook>,
    overlay: Arc<dyn DocumentOverlayRenderer>,
    output_dir: PathBuf,
    margins: PageMargins,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("output_dir", &self.output_dir)
            .field("fonts", &self.fonts)
            .finish_non_exhaustive()
    }
}

impl Renderer {
    pub fn new(
        assets: AssetResolver,
        fonts: FontBook,
        overlay: Arc<dyn DocumentOverlayRenderer>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            assets,
            fonts: Arc::new(fonts),
            overlay,
            output_dir: output_dir.into(),
            margins: PageMargins::default(),
        }
    }

    /// Renderer wired from settings: uploads for assets, generated/ for output.
    pub fn from_settings(settings: &Settings) -> Result<Self, CertError> {
        let assets = AssetResolver::new(settings.uploads_dir())?;
        let fonts = FontBook::load_dir(&settings.fonts_dir());
        let (program, args) = settings.overlay_program()?;
        let overlay = SubprocessOverlay::new(program, args, settings.overlay_timeout());
        Ok(Self::new(
            assets,
            fonts,
            Arc::new(overlay),
            settings.generated_dir(),
        ))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Resolve every layer against `row` and load images.
    ///
    /// A background image that cannot be loaded falls back to white. An image
    /// layer that cannot be loaded is skipped. Neither fails the render.
    pub async fn prepare(&self, template: &Template, row: &Row) -> PreparedPage {
        let background = match &template.background {
            Background::Color(value) => PreparedBackground::Fill(color_or(value, WHITE)),
            Background::Image(reference) => match self.assets.load_image(reference).await {
                Ok(image) => PreparedBackground::Image(image),
                Err(e) => {
                    warn!(template = %template.id, error = %e, "background image unavailable, using white");
                    PreparedBackground::Fill(WHITE)
                }
            },
            Background::Pdf(_) => PreparedBackground::Fill(WHITE),
        };

        let mut layers = Vec::with_capacity(template.layers.len());
        for layer in &template.layers {
            match layer {
                Layer::Text(text) => layers.push(PreparedLayer::Text(PreparedText {
                    x: text.x,
                    y: text.y,
                    content: text.content_for(row),
                    font_size: text.font_size,
                    bold: text.bold,
                    font_family: text.font_family.clone(),
                    color: color_or(&text.color, BLACK),
                    align: text.align,
                    pinned_footer: text.pinned_footer,
                })),
                Layer::Image(image) => {
                    let source = image.source_for(row);
                    if source.is_empty() {
                        continue;
                    }
                    match self.assets.load_image(&source).await {
                        Ok(pixels) => layers.push(PreparedLayer::Image(PreparedImage {
                            x: image.x,
                            y: image.y,
                            w: image.w,
                            h: image.h,
                            image: pixels,
                        })),
                        Err(e) => {
                            warn!(template = %template.id, source = %source, error = %e, "skipping image layer");
                        }
                    }
                }
            }
        }

        PreparedPage {
            width: template.width,
            height: template.height,
            background,
            layers,
        }
    }

    async fn finish(&self, bytes: Vec<u8>, target: Option<&str>) -> Result<RenderOutput, CertError> {
        match target {
            Some(name) => {
                tokio::fs::create_dir_all(&self.output_dir).await?;
                let path = self.output_dir.join(name);
                tokio::fs::write(&path, bytes).await?;
                Ok(RenderOutput::File(path))
            }
            None => Ok(RenderOutput::Bytes(bytes)),
        }
    }

    async fn render_page(
        &self,
        template: &Template,
        row: &Row,
        backend: Backend,
    ) -> Result<Vec<u8>, CertError> {
        let page = self.prepare(template, row).await;
        let fonts = Arc::clone(&self.fonts);
        let margins = self.margins;
        tokio::task::spawn_blocking(move || match backend {
            Backend::Raster(format) => raster::render(&page, &fonts, format),
            _ => pdf::render(&page, margins),
        })
        .await
        .map_err(|e| CertError::Render(format!("render task failed: {}", e)))?
    }

    async fn render_overlay(
        &self,
        template: &Template,
        row: &Row,
        target: Option<&str>,
    ) -> Result<RenderOutput, CertError> {
        let reference = template
            .source_pdf()
            .ok_or_else(|| CertError::InvalidTemplate("templated PDF has no source document".to_string()))?;
        let source = self.assets.local_path(reference)?;

        let layers: Vec<OverlayLayer> = template
            .layers
            .iter()
            .filter_map(|layer| match layer {
                Layer::Text(text) => Some(OverlayLayer {
                    text: text.content_for(row),
                    x: text.x,
                    y: text.y,
                    w: text.w.unwrap_or(OVERLAY_BOX_WIDTH),
                    h: text.h.unwrap_or(OVERLAY_BOX_HEIGHT),
                    font_size: text.font_size,
                    color: text.color.clone(),
                    align: text.align.as_str().to_string(),
                    cover: text.cover,
                }),
                Layer::Image(_) => None,
            })
            .collect();

        tokio::fs::create_dir_all(&self.output_dir).await?;
        match target {
            Some(name) => {
                let destination = self.output_dir.join(name);
                self.overlay.overlay(&source, &destination, &layers).await?;
                Ok(RenderOutput::File(destination))
            }
            None => {
                let destination = overlay::preview_path(&self.output_dir);
                let result = self.overlay.overlay(&source, &destination, &layers).await;
                let bytes = match result {
                    Ok(()) => tokio::fs::read(&destination).await.map_err(CertError::from),
                    Err(e) => Err(e),
                };
                let _ = tokio::fs::remove_file(&destination).await;
                Ok(RenderOutput::Bytes(bytes?))
            }
        }
    }
}

#[async_trait]
impl ItemRenderer for Renderer {
    async fn render(
        &self,
        template: &Template,
        row: &Row,
        target: Option<&str>,
    ) -> Result<RenderOutput, CertError> {
        let backend = select_backend(template, target)?;
        debug!(template = %template.id, ?backend, target = target.unwrap_or("<preview>"), "rendering");
        match backend {
            Backend::Overlay => self.render_overlay(template, row, target).await,
            backend => {
                let bytes = self.render_page(template, row, backend).await?;
                self.finish(bytes, target).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateDocument;
    use crate::template::store::default_template;
    use std::time::Duration;

    fn renderer(dir: &Path) -> Renderer {
        Renderer::new(
            AssetResolver::new(dir.join("uploads")).unwrap(),
            FontBook::empty(),
            Arc::new(SubprocessOverlay::new("false", vec![], Duration::from_secs(1))),
            dir.join("generated"),
        )
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn template(json: &str) -> Template {
        let doc: TemplateDocument = serde_json::from_str(json).unwrap();
        Template::from_document(&doc).unwrap()
    }

    #[test]
    fn test_backend_selection() {
        let canvas = Template::from_document(&default_template()).unwrap();
        assert_eq!(select_backend(&canvas, None).unwrap(), Backend::Raster(RasterFormat::Png));
        assert_eq!(select_backend(&canvas, Some("a.JPG")).unwrap(), Backend::Raster(RasterFormat::Jpeg));
        assert_eq!(select_backend(&canvas, Some("a.pdf")).unwrap(), Backend::Paginated);
        assert!(matches!(
            select_backend(&canvas, Some("a.gif")),
            Err(CertError::UnsupportedOutput(_))
        ));

        let overlay = template(r#"{"id":"t","type":"pdf","background":{"type":"pdf","value":"form.pdf"},"layers":[]}"#);
        assert_eq!(select_backend(&overlay, Some("a.pdf")).unwrap(), Backend::Overlay);
        assert!(select_backend(&overlay, Some("a.jpg")).is_err());
    }

    #[tokio::test]
    async fn test_prepare_resolves_text_and_skips_broken_images() {
        let dir = tempfile::tempdir().unwrap();
        let t = template(
            r#"{"id":"t","width":100,"height":50,"background":"missing-bg.png","layers":[
                {"type":"text","x":1,"y":2,"text":"Hi {name}"},
                {"type":"image","x":0,"y":0,"src":"missing.png"},
                {"type":"image","x":0,"y":0,"key":"photo"}
            ]}"#,
        );
        let page = renderer(dir.path()).prepare(&t, &row(&[("name", "Ann")])).await;

        assert!(matches!(page.background, PreparedBackground::Fill(c) if c == WHITE));
        assert_eq!(page.layers.len(), 1);
        match &page.layers[0] {
            PreparedLayer::Text(text) => assert_eq!(text.content, "Hi Ann"),
            other => panic!("unexpected layer {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_render_bytes_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let r = renderer(dir.path());
        let t = Template::from_document(&default_template()).unwrap();
        let data = row(&[("name", "Ann"), ("course", "Rust")]);

        let preview = r.render(&t, &data, None).await.unwrap();
        let RenderOutput::Bytes(bytes) = preview else {
            panic!("expected bytes");
        };
        assert_eq!(&bytes[1..4], b"PNG");

        let written = r.render(&t, &data, Some("cert.pdf")).await.unwrap();
        assert_eq!(written, RenderOutput::File(dir.path().join("generated/cert.pdf")));
        assert_eq!(written.file_name().as_deref(), Some("cert.pdf"));
        let pdf = std::fs::read(dir.path().join("generated/cert.pdf")).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_unsupported_target_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let t = Template::from_document(&default_template()).unwrap();
        let err = renderer(dir.path())
            .render(&t, &Row::new(), Some("cert.bmp"))
            .await
            .unwrap_err();
        assert!(matches!(err, CertError::UnsupportedOutput(_)));
        assert!(!dir.path().join("generated/cert.bmp").exists());
    }
}
