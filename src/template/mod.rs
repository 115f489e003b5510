//! # Template Model
//!
//! A template is a fixed-size canvas, a background and an ordered list of
//! layers. Paint order is list order: later layers draw over earlier ones.
//!
//! ```text
//! TemplateDocument (JSON, loose)  ──from_document──►  Template (tagged, validated)
//!                                                          │
//!                                     render::Renderer ◄───┘
//! ```
//!
//! Every shape-shifting field of the stored form is resolved here exactly once:
//! the background becomes a [`Background`] variant, and each layer's content
//! source becomes either a key binding or a placeholder template.

pub mod format;
pub mod placeholder;
pub mod schema;
pub mod store;

pub use schema::TemplateDocument;
pub use store::TemplateStore;

use crate::error::CertError;
use crate::rows::Row;
use schema::{BackgroundDocument, ImageLayerDocument, LayerDocument, TextLayerDocument};

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 600;
/// Largest accepted canvas side, in pixels or points.
pub const MAX_CANVAS_DIM: u32 = 10_000;
pub const DEFAULT_FONT_SIZE: f32 = 20.0;
pub const DEFAULT_FONT_FAMILY: &str = "Arial";
pub const DEFAULT_TEXT_COLOR: &str = "#000000";
pub const DEFAULT_BACKGROUND: &str = "#ffffff";
pub const DEFAULT_IMAGE_SIZE: f32 = 100.0;

/// How the template produces its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Painted from scratch (raster or paginated backend).
    Canvas,
    /// Text overlaid onto an existing PDF file.
    PdfOverlay,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    /// Hex color fill.
    Color(String),
    /// Image stretched to the canvas.
    Image(String),
    /// Source PDF for the templated-PDF path.
    Pdf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "center" | "centre" | "middle" => Align::Center,
            "right" | "end" => Align::Right,
            _ => Align::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
        }
    }

    /// Horizontal offset from the anchor to the left edge of a run `width` wide.
    pub fn offset(self, width: f32) -> f32 {
        match self {
            Align::Left => 0.0,
            Align::Center => width / 2.0,
            Align::Right => width,
        }
    }
}

/// Where a text layer's content comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextContent {
    /// `row[key]`, empty when absent. Never falls back to literal text.
    KeyBound(String),
    /// Literal text with `{field}` placeholders.
    Template(String),
}

/// Where an image layer's source reference comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    KeyBound(String),
    Template(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextLayer {
    pub x: f32,
    /// Alphabetic baseline.
    pub y: f32,
    pub font_size: f32,
    pub bold: bool,
    pub font_family: String,
    pub color: String,
    pub align: Align,
    pub content: TextContent,
    pub uppercase: bool,
    pub normalize_dates: bool,
    /// Anchored bottom-right inside the safe margin in paginated output.
    pub pinned_footer: bool,
    pub w: Option<f32>,
    pub h: Option<f32>,
    pub cover: bool,
}

impl TextLayer {
    /// Resolve and format this layer's text for one row.
    pub fn content_for(&self, row: &Row) -> String {
        let raw = match &self.content {
            TextContent::KeyBound(key) => row.get(key).cloned().unwrap_or_default(),
            TextContent::Template(text) => placeholder::resolve(Some(text), row),
        };
        format::format(&raw, self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageLayer {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub source: ImageSource,
}

impl ImageLayer {
    /// Image reference for one row; empty means the layer is skipped.
    pub fn source_for(&self, row: &Row) -> String {
        match &self.source {
            ImageSource::KeyBound(key) => row.get(key).cloned().unwrap_or_default(),
            ImageSource::Template(src) => placeholder::resolve(Some(src), row),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Text(TextLayer),
    Image(ImageLayer),
}

/// A validated, normalized template. Immutable for the duration of a render.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub id: String,
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub background: Background,
    pub layers: Vec<Layer>,
    pub kind: TemplateKind,
}

impl Template {
    /// Normalize a stored document into the render model.
    pub fn from_document(doc: &TemplateDocument) -> Result<Self, CertError> {
        let width = doc.width.unwrap_or(DEFAULT_WIDTH);
        let height = doc.height.unwrap_or(DEFAULT_HEIGHT);
        if width == 0 || height == 0 {
            return Err(CertError::InvalidTemplate(format!(
                "template '{}' has non-positive size {}x{}",
                doc.id, width, height
            )));
        }
        if width > MAX_CANVAS_DIM || height > MAX_CANVAS_DIM {
            return Err(CertError::InvalidTemplate(format!(
                "template '{}' size {}x{} exceeds the {} limit",
                doc.id, width, height, MAX_CANVAS_DIM
            )));
        }

        let background = normalize_background(doc.background.as_ref());

        let kind = match doc.kind.as_deref() {
            Some(k) if k.eq_ignore_ascii_case("pdf") => TemplateKind::PdfOverlay,
            _ if matches!(background, Background::Pdf(_)) => TemplateKind::PdfOverlay,
            _ => TemplateKind::Canvas,
        };
        if kind == TemplateKind::PdfOverlay && !matches!(background, Background::Pdf(_)) {
            return Err(CertError::InvalidTemplate(format!(
                "template '{}' is a PDF template but its background is not a .pdf file",
                doc.id
            )));
        }

        let layers = doc.layers.iter().map(normalize_layer).collect();

        Ok(Template {
            id: doc.id.clone(),
            name: doc.name.clone(),
            width,
            height,
            background,
            layers,
            kind,
        })
    }

    /// Source PDF of a templated-PDF template.
    pub fn source_pdf(&self) -> Option<&str> {
        match &self.background {
            Background::Pdf(path) => Some(path),
            _ => None,
        }
    }
}

fn is_pdf_reference(value: &str) -> bool {
    value.to_ascii_lowercase().ends_with(".pdf")
}

fn normalize_background(doc: Option<&BackgroundDocument>) -> Background {
    let (kind, value) = match doc {
        None => return Background::Color(DEFAULT_BACKGROUND.to_string()),
        Some(BackgroundDocument::Plain(value)) => {
            let kind = if value.starts_with('#') { "color" } else { "image" };
            (kind.to_string(), value.clone())
        }
        Some(BackgroundDocument::Typed { kind, value }) => (
            kind.clone().unwrap_or_else(|| "color".to_string()),
            value.clone().unwrap_or_else(|| DEFAULT_BACKGROUND.to_string()),
        ),
    };

    match kind.to_ascii_lowercase().as_str() {
        "pdf" => Background::Pdf(value),
        "image" if is_pdf_reference(&value) => Background::Pdf(value),
        "image" => Background::Image(value),
        _ => Background::Color(value),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn normalize_layer(doc: &LayerDocument) -> Layer {
    match doc {
        LayerDocument::Text(text) => Layer::Text(normalize_text(text)),
        LayerDocument::Image(image) => Layer::Image(normalize_image(image)),
    }
}

fn normalize_text(doc: &TextLayerDocument) -> TextLayer {
    let content = match non_empty(&doc.key) {
        Some(key) => TextContent::KeyBound(key.to_string()),
        None => TextContent::Template(doc.text.clone().unwrap_or_default()),
    };
    TextLayer {
        x: doc.x,
        y: doc.y,
        font_size: doc
            .font_size
            .filter(|s| *s > 0.0)
            .unwrap_or(DEFAULT_FONT_SIZE),
        bold: doc.font_weight.as_ref().is_some_and(|w| w.is_bold()),
        font_family: non_empty(&doc.font_family)
            .unwrap_or(DEFAULT_FONT_FAMILY)
            .to_string(),
        color: non_empty(&doc.color).unwrap_or(DEFAULT_TEXT_COLOR).to_string(),
        align: doc.align.as_deref().map(Align::parse).unwrap_or_default(),
        content,
        uppercase: doc.uppercase,
        normalize_dates: doc.date_format.as_ref().is_some_and(|d| d.is_enabled()),
        pinned_footer: doc.pinned_footer,
        w: doc.w,
        h: doc.h,
        cover: doc.cover,
    }
}

fn normalize_image(doc: &ImageLayerDocument) -> ImageLayer {
    let source = match non_empty(&doc.key) {
        Some(key) => ImageSource::KeyBound(key.to_string()),
        None => ImageSource::Template(doc.src.clone().unwrap_or_default()),
    };
    ImageLayer {
        x: doc.x,
        y: doc.y,
        w: doc.w.filter(|w| *w > 0.0).unwrap_or(DEFAULT_IMAGE_SIZE),
        h: doc.h.filter(|h| *h > 0.0).unwrap_or(DEFAULT_IMAGE_SIZE),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Template, CertError> {
        let doc: TemplateDocument = serde_json::from_str(json).unwrap();
        Template::from_document(&doc)
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let t = parse(r#"{"id":"t"}"#).unwrap();
        assert_eq!(t.width, 800);
        assert_eq!(t.height, 600);
        assert_eq!(t.background, Background::Color("#ffffff".to_string()));
        assert_eq!(t.kind, TemplateKind::Canvas);
    }

    #[test]
    fn test_oversized_canvas_rejected() {
        assert!(matches!(
            parse(r#"{"id":"t","width":100000,"height":100000}"#),
            Err(CertError::InvalidTemplate(_))
        ));
        assert!(matches!(
            parse(r#"{"id":"t","width":800,"height":10001}"#),
            Err(CertError::InvalidTemplate(_))
        ));
        let t = parse(r#"{"id":"t","width":10000,"height":10000}"#).unwrap();
        assert_eq!((t.width, t.height), (MAX_CANVAS_DIM, MAX_CANVAS_DIM));
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            parse(r#"{"id":"t","width":0}"#),
            Err(CertError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_background_variants() {
        let t = parse(r#"{"id":"t","background":"frame.png"}"#).unwrap();
        assert_eq!(t.background, Background::Image("frame.png".to_string()));

        let t = parse(r#"{"id":"t","background":{"type":"image","value":"base.PDF"}}"#).unwrap();
        assert_eq!(t.background, Background::Pdf("base.PDF".to_string()));
        assert_eq!(t.kind, TemplateKind::PdfOverlay);

        let t = parse(r##"{"id":"t","background":{"type":"color","value":"#123456"}}"##).unwrap();
        assert_eq!(t.background, Background::Color("#123456".to_string()));
    }

    #[test]
    fn test_pdf_kind_requires_pdf_background() {
        assert!(parse(r##"{"id":"t","type":"pdf","background":"#fff"}"##).is_err());
        let t = parse(r#"{"id":"t","type":"pdf","background":"form.pdf"}"#).unwrap();
        assert_eq!(t.source_pdf(), Some("form.pdf"));
    }

    #[test]
    fn test_key_takes_precedence_without_fallback() {
        let t = parse(
            r#"{"id":"t","layers":[{"type":"text","key":"name","text":"fallback {name}"}]}"#,
        )
        .unwrap();
        let Layer::Text(layer) = &t.layers[0] else {
            panic!("expected text layer");
        };
        assert_eq!(layer.content, TextContent::KeyBound("name".to_string()));
        assert_eq!(layer.content_for(&row(&[("name", "Ann")])), "Ann");
        assert_eq!(layer.content_for(&row(&[])), "");
    }

    #[test]
    fn test_template_text_and_format() {
        let t = parse(
            r#"{"id":"t","layers":[{"type":"text","text":"hello {name}","uppercase":true}]}"#,
        )
        .unwrap();
        let Layer::Text(layer) = &t.layers[0] else {
            panic!("expected text layer");
        };
        assert_eq!(layer.content_for(&row(&[("name", "ann")])), "HELLO ANN");
    }

    #[test]
    fn test_image_source() {
        let t = parse(
            r#"{"id":"t","layers":[{"type":"image","src":"{photo}"},{"type":"image","key":"logo"}]}"#,
        )
        .unwrap();
        let Layer::Image(first) = &t.layers[0] else {
            panic!("expected image layer");
        };
        assert_eq!(first.w, 100.0);
        assert_eq!(first.source_for(&row(&[("photo", "a.png")])), "a.png");
        let Layer::Image(second) = &t.layers[1] else {
            panic!("expected image layer");
        };
        assert_eq!(second.source_for(&row(&[])), "");
    }

    #[test]
    fn test_align_offsets() {
        assert_eq!(Align::parse("CENTER").offset(10.0), 5.0);
        assert_eq!(Align::parse("right").offset(10.0), 10.0);
        assert_eq!(Align::parse("bogus"), Align::Left);
    }
}
