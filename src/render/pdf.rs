//! Paginated backend: one fixed-size PDF page per certificate.
//!
//! The page is exactly `width × height` points. Template coordinates are
//! top-down with text `y` on the baseline, so every placement is flipped
//! into PDF space (`pdf_y = height - y`).
//!
//! ## Layout rules
//!
//! Content must never spill past the page, since a spill silently becomes a
//! second page in most viewers and printers:
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │                                           │
//! │   text baselines clamped above ─────────┐ │
//! │                                         │ │
//! │- - - - - - - - - - - - - - - [ID-0042] -│-│ ← height - bottom - fontSize
//! │                                 right ─►│ │
//! │                           bottom margin   │
//! └───────────────────────────────────────────┘
//! ```
//!
//! - layers flagged `pinned_footer` are anchored at
//!   `(width - right - textWidth, height - bottom - fontSize)`, ignoring their
//!   declared position
//! - every other text layer keeps its `x` but has `y` clamped to
//!   `height - bottom - fontSize`

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream, StringFormat, dictionary};
use std::collections::BTreeSet;
use std::io::Write;

use super::color::to_unit_rgb;
use super::{PreparedBackground, PreparedLayer, PreparedPage, PreparedText};
use crate::error::CertError;

/// Safe margins of the paginated layout, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMargins {
    pub right: f32,
    pub bottom: f32,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            right: 40.0,
            bottom: 30.0,
        }
    }
}

/// Standard PDF fonts used for text layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PdfFont {
    Helvetica,
    HelveticaBold,
    TimesRoman,
    TimesBold,
    Courier,
    CourierBold,
}

impl PdfFont {
    /// Closest standard font for a CSS-style family list.
    pub fn for_family(family: &str, bold: bool) -> Self {
        let family = family.to_ascii_lowercase();
        let serif = family.contains("times") || family.contains("georgia") || family.contains("garamond")
            || (family.contains("serif") && !family.contains("sans"));
        let mono = family.contains("courier") || family.contains("mono");
        match (mono, serif, bold) {
            (true, _, false) => PdfFont::Courier,
            (true, _, true) => PdfFont::CourierBold,
            (false, true, false) => PdfFont::TimesRoman,
            (false, true, true) => PdfFont::TimesBold,
            (false, false, false) => PdfFont::Helvetica,
            (false, false, true) => PdfFont::HelveticaBold,
        }
    }

    pub fn base_name(self) -> &'static str {
        match self {
            PdfFont::Helvetica => "Helvetica",
            PdfFont::HelveticaBold => "Helvetica-Bold",
            PdfFont::TimesRoman => "Times-Roman",
            PdfFont::TimesBold => "Times-Bold",
            PdfFont::Courier => "Courier",
            PdfFont::CourierBold => "Courier-Bold",
        }
    }

    fn resource_name(self) -> &'static str {
        match self {
            PdfFont::Helvetica => "F1",
            PdfFont::HelveticaBold => "F2",
            PdfFont::TimesRoman => "F3",
            PdfFont::TimesBold => "F4",
            PdfFont::Courier => "F5",
            PdfFont::CourierBold => "F6",
        }
    }

    /// Advance of `ch` in 1/1000 em.
    fn glyph_width(self, ch: char) -> f32 {
        let code = ch as u32;
        let table = match self {
            PdfFont::Courier | PdfFont::CourierBold => return 600.0,
            PdfFont::HelveticaBold | PdfFont::TimesBold => &HELVETICA_BOLD_WIDTHS,
            PdfFont::Helvetica | PdfFont::TimesRoman => &HELVETICA_WIDTHS,
        };
        let width = if (32..=126).contains(&code) {
            table[(code - 32) as usize] as f32
        } else {
            556.0
        };
        match self {
            PdfFont::TimesRoman | PdfFont::TimesBold => width * 0.9,
            _ => width,
        }
    }

    /// Width of `text` at `size` points.
    pub fn text_width(self, text: &str, size: f32) -> f32 {
        text.chars().map(|c| self.glyph_width(c)).sum::<f32>() * size / 1000.0
    }
}

/// Helvetica advances for ASCII 32..=126.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667,
    611, 722, 667, 944, 667, 667, 611, // 'A'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333, 500,
    278, 556, 500, 722, 500, 500, 500, // 'a'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Helvetica-Bold advances for ASCII 32..=126.
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    333, 333, 584, 584, 584, 611, 975, // ':'..'@'
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667,
    611, 722, 667, 944, 667, 667, 611, // 'A'..'Z'
    333, 278, 333, 584, 556, 333, // '['..'`'
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, 611, 611, 389, 556,
    333, 611, 556, 778, 556, 556, 500, // 'a'..'z'
    389, 280, 389, 584, // '{'..'~'
];

/// Left edge and top-down baseline of a text layer on the page.
pub fn place_text(
    text: &PreparedText,
    font: PdfFont,
    page_width: f32,
    page_height: f32,
    margins: PageMargins,
) -> (f32, f32) {
    let text_width = font.text_width(&text.content, text.font_size);
    let max_y = page_height - margins.bottom - text.font_size;

    if text.pinned_footer {
        let x = (page_width - margins.right - text_width).max(0.0);
        (x, max_y)
    } else {
        let x = text.x - text.align.offset(text_width);
        (x, text.y.min(max_y))
    }
}

/// WinAnsi bytes for a string; characters outside Latin-1 become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ 0x20..=0x7E | code @ 0xA0..=0xFF => code as u8,
            _ => b'?',
        })
        .collect()
}

/// Flate-compressed RGB image XObject, flattened onto white.
fn image_xobject(image: &DynamicImage) -> Result<Stream, CertError> {
    let rgba = image.to_rgba8();
    let mut rgb = Vec::with_capacity((rgba.width() * rgba.height() * 3) as usize);
    for pixel in rgba.pixels() {
        let alpha = pixel[3] as f32 / 255.0;
        for c in 0..3 {
            let v = pixel[c] as f32 * alpha + 255.0 * (1.0 - alpha);
            rgb.push(v.round() as u8);
        }
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&rgb)
        .map_err(|e| CertError::Pdf(format!("Failed to compress image: {}", e)))?;
    let data = encoder
        .finish()
        .map_err(|e| CertError::Pdf(format!("Failed to compress image: {}", e)))?;

    Ok(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => rgba.width() as i64,
            "Height" => rgba.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
            "Filter" => "FlateDecode",
        },
        data,
    ))
}

fn draw_xobject(ops: &mut Vec<Operation>, name: &str, x: f32, y: f32, w: f32, h: f32) {
    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "cm",
        vec![w.into(), 0.into(), 0.into(), h.into(), x.into(), y.into()],
    ));
    ops.push(Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]));
    ops.push(Operation::new("Q", vec![]));
}

/// Build a single-page PDF for the prepared page.
pub fn render(page: &PreparedPage, margins: PageMargins) -> Result<Vec<u8>, CertError> {
    let width = page.width as f32;
    let height = page.height as f32;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut ops: Vec<Operation> = Vec::new();
    let mut fonts: BTreeSet<PdfFont> = BTreeSet::new();
    let mut xobjects = Dictionary::new();

    match &page.background {
        PreparedBackground::Fill(color) => {
            let [r, g, b] = to_unit_rgb(*color);
            ops.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
            ops.push(Operation::new(
                "re",
                vec![0.into(), 0.into(), width.into(), height.into()],
            ));
            ops.push(Operation::new("f", vec![]));
        }
        PreparedBackground::Image(image) => {
            let id = doc.add_object(image_xobject(image)?);
            xobjects.set("Bg", id);
            draw_xobject(&mut ops, "Bg", 0.0, 0.0, width, height);
        }
    }

    let mut image_count = 0;
    for layer in &page.layers {
        match layer {
            PreparedLayer::Text(text) => {
                if text.content.is_empty() {
                    continue;
                }
                let font = PdfFont::for_family(&text.font_family, text.bold);
                fonts.insert(font);
                let (x, baseline) = place_text(text, font, width, height, margins);
                let [r, g, b] = to_unit_rgb(text.color);

                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new(
                    "Tf",
                    vec![font.resource_name().into(), text.font_size.into()],
                ));
                ops.push(Operation::new("rg", vec![r.into(), g.into(), b.into()]));
                ops.push(Operation::new("Td", vec![x.into(), (height - baseline).into()]));
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::String(
                        encode_win_ansi(&text.content),
                        StringFormat::Literal,
                    )],
                ));
                ops.push(Operation::new("ET", vec![]));
            }
            PreparedLayer::Image(image) => {
                image_count += 1;
                let name = format!("Im{}", image_count);
                let id = doc.add_object(image_xobject(&image.image)?);
                xobjects.set(name.as_str(), id);
                draw_xobject(
                    &mut ops,
                    &name,
                    image.x,
                    height - image.y - image.h,
                    image.w,
                    image.h,
                );
            }
        }
    }

    let mut font_dict = Dictionary::new();
    for font in &fonts {
        font_dict.set(
            font.resource_name(),
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_name(),
                "Encoding" => "WinAnsiEncoding",
            },
        );
    }

    let content = Content { operations: ops };
    let encoded = content
        .encode()
        .map_err(|e| CertError::Pdf(format!("Failed to encode content stream: {}", e)))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

    let resources_id = doc.add_object(dictionary! {
        "Font" => font_dict,
        "XObject" => xobjects,
    });

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1_i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| CertError::Pdf(format!("Failed to write PDF: {}", e)))?;
    Ok(bytes)
}
