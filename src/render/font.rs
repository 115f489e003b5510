//! Text rasterization for template text layers.
//!
//! Renders text to an anti-aliased f32 coverage buffer. Families are looked up
//! in a [`FontBook`] built from TTF/OTF files on disk and rendered with
//! ab_glyph; when no file matches, the embedded Spleen 12x24 bitmap font is
//! scaled to the requested size so a render never fails for lack of fonts.
//!
//! ## Coordinate model
//!
//! ```text
//!   (0,0) ┌──────────────────────┐
//!         │   ascent             │
//! baseline├──H─e─l─l─o───────────┤  ← layer `y`
//!         │   descent            │
//!         └──────────────────────┘
//!         ↑ caret starts at 0, `advance` is the pen travel used for alignment
//! ```

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use spleen_font::{FONT_12X24, PSF2Font};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

const SPLEEN_WIDTH: usize = 12;
const SPLEEN_HEIGHT: usize = 24;
/// Rows above the baseline in the Spleen 12x24 cell.
const SPLEEN_ASCENT: usize = 19;

/// Rendered text as an anti-aliased coverage buffer.
#[derive(Debug, Clone)]
pub struct TextRaster {
    pub width: usize,
    pub height: usize,
    /// Distance from the buffer top to the baseline.
    pub ascent: f32,
    /// Pen advance of the whole run, used for alignment.
    pub advance: f32,
    /// Coverage values: 0.0 = transparent, 1.0 = fully inked.
    pub data: Vec<f32>,
}

impl TextRaster {
    fn empty(ascent: f32) -> Self {
        Self {
            width: 0,
            height: 0,
            ascent,
            advance: 0.0,
            data: Vec::new(),
        }
    }
}

/// Font faces available to the raster backend, keyed by lower-cased file stem.
#[derive(Clone, Default)]
pub struct FontBook {
    faces: HashMap<String, FontArc>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.faces.keys().collect();
        names.sort();
        f.debug_struct("FontBook").field("faces", &names).finish()
    }
}

impl FontBook {
    /// A book with no faces; every family renders with the bitmap fallback.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index every `.ttf`/`.otf` file in `dir`. A missing directory is an empty book.
    pub fn load_dir(dir: &Path) -> Self {
        let mut book = Self::empty();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => {
                debug!(dir = %dir.display(), "no font directory, using bitmap fallback");
                return book;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase);
            if !matches!(ext.as_deref(), Some("ttf") | Some("otf")) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read(&path)
                .map_err(|e| e.to_string())
                .and_then(|bytes| FontArc::try_from_vec(bytes).map_err(|e| e.to_string()))
            {
                Ok(font) => {
                    book.faces.insert(stem.to_ascii_lowercase(), font);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable font"),
            }
        }
        debug!(count = book.faces.len(), "font book loaded");
        book
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Find a face for a CSS-style family list such as `"Open Sans", serif`.
    fn lookup(&self, family: &str, bold: bool) -> Option<&FontArc> {
        for name in family.split(',') {
            let name = name.trim().trim_matches(|c| c == '"' || c == '\'');
            let key = name.to_ascii_lowercase();
            let compact: String = key.chars().filter(|c| !c.is_whitespace()).collect();
            let candidates: Vec<String> = if bold {
                vec![
                    format!("{}-bold", key),
                    format!("{}-bold", compact),
                    format!("{}bold", compact),
                    format!("{} bold", key),
                    key.clone(),
                    compact.clone(),
                ]
            } else {
                vec![
                    format!("{}-regular", key),
                    format!("{}-regular", compact),
                    key.clone(),
                    compact.clone(),
                ]
            };
            if let Some(face) = candidates.iter().find_map(|c| self.faces.get(c)) {
                return Some(face);
            }
        }
        None
    }

    /// Render `text` at `pixel_size` with the best face for `family`.
    pub fn rasterize(&self, text: &str, family: &str, bold: bool, pixel_size: f32) -> TextRaster {
        let pixel_size = pixel_size.max(1.0);
        match self.lookup(family, bold) {
            Some(font) => render_ttf(font, text, pixel_size),
            None => render_bitmap(text, bold, pixel_size),
        }
    }
}

fn render_ttf(font: &FontArc, text: &str, pixel_size: f32) -> TextRaster {
    let scale = PxScale::from(pixel_size);
    let scaled = font.as_scaled(scale);
    let ascent = scaled.ascent();
    if text.is_empty() {
        return TextRaster::empty(ascent);
    }

    let mut glyphs = Vec::new();
    let mut caret_x = 0.0f32;
    let mut previous = None;
    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = previous {
            caret_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, caret_x));
        caret_x += scaled.h_advance(glyph_id);
        previous = Some(glyph_id);
    }

    let pad = (pixel_size / 4.0).ceil() as usize;
    let width = caret_x.ceil().max(1.0) as usize + pad;
    let height = ((ascent - scaled.descent()).ceil() as usize).max(1);
    let mut data = vec![0.0f32; width * height];

    for &(glyph_id, glyph_x) in &glyphs {
        let glyph = glyph_id.with_scale_and_position(scale, ab_glyph::point(glyph_x, ascent));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, coverage| {
                let x = px as i32 + bounds.min.x as i32;
                let y = py as i32 + bounds.min.y as i32;
                if x >= 0 && x < width as i32 && y >= 0 && y < height as i32 {
                    let idx = y as usize * width + x as usize;
                    data[idx] = (data[idx] + coverage).min(1.0);
                }
            });
        }
    }

    TextRaster {
        width,
        height,
        ascent,
        advance: caret_x,
        data,
    }
}

/// Spleen glyph as a 12x24 on/off grid; unknown characters draw a box.
fn spleen_glyph(font: &mut PSF2Font, ch: char) -> Vec<bool> {
    let mut cell = vec![false; SPLEEN_WIDTH * SPLEEN_HEIGHT];
    if ch == ' ' {
        return cell;
    }
    let mut buf = [0u8; 4];
    match font.glyph_for_utf8(ch.encode_utf8(&mut buf).as_bytes()) {
        Some(glyph) => {
            for (row_y, row) in glyph.enumerate() {
                for (col_x, on) in row.enumerate() {
                    let idx = row_y * SPLEEN_WIDTH + col_x;
                    if idx < cell.len() && col_x < SPLEEN_WIDTH {
                        cell[idx] = on;
                    }
                }
            }
        }
        None => {
            for y in 4..SPLEEN_ASCENT {
                for x in 2..SPLEEN_WIDTH - 2 {
                    if y == 4 || y == SPLEEN_ASCENT - 1 || x == 2 || x == SPLEEN_WIDTH - 3 {
                        cell[y * SPLEEN_WIDTH + x] = true;
                    }
                }
            }
        }
    }
    cell
}

fn render_bitmap(text: &str, bold: bool, pixel_size: f32) -> TextRaster {
    let scale = pixel_size / SPLEEN_HEIGHT as f32;
    let ascent = SPLEEN_ASCENT as f32 * scale;
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return TextRaster::empty(ascent);
    }

    let mut font = match PSF2Font::new(FONT_12X24) {
        Ok(font) => font,
        Err(_) => return TextRaster::empty(ascent),
    };
    let mut cache: HashMap<char, Vec<bool>> = HashMap::new();

    let cell_width = SPLEEN_WIDTH as f32 * scale;
    let advance = cell_width * chars.len() as f32;
    let smear = if bold { scale.round().max(1.0) as usize } else { 0 };
    let width = advance.ceil() as usize + smear;
    let height = (SPLEEN_HEIGHT as f32 * scale).ceil().max(1.0) as usize;
    let mut data = vec![0.0f32; width * height];

    for (i, ch) in chars.iter().enumerate() {
        let cell = cache
            .entry(*ch)
            .or_insert_with(|| spleen_glyph(&mut font, *ch));
        let origin = (i as f32 * cell_width).floor() as usize;
        let cell_px = cell_width.ceil() as usize;

        for dy in 0..height {
            let sy = ((dy as f32 / scale) as usize).min(SPLEEN_HEIGHT - 1);
            for dx in 0..cell_px {
                let sx = ((dx as f32 / scale) as usize).min(SPLEEN_WIDTH - 1);
                if !cell[sy * SPLEEN_WIDTH + sx] {
                    continue;
                }
                for extra in 0..=smear {
                    let x = origin + dx + extra;
                    if x < width {
                        data[dy * width + x] = 1.0;
                    }
                }
            }
        }
    }

    TextRaster {
        width,
        height,
        ascent,
        advance,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_fallback_renders() {
        let book = FontBook::empty();
        let run = book.rasterize("Hello", "Arial", false, 24.0);
        assert_eq!(run.width, 60);
        assert_eq!(run.height, 24);
        assert_eq!(run.data.len(), run.width * run.height);
        assert!(run.data.iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_bitmap_scales_with_size() {
        let book = FontBook::empty();
        let small = book.rasterize("Hi", "Arial", false, 24.0);
        let large = book.rasterize("Hi", "Arial", false, 48.0);
        assert_eq!(large.height, small.height * 2);
        assert_eq!(large.advance, small.advance * 2.0);
    }

    #[test]
    fn test_bold_inks_more() {
        let book = FontBook::empty();
        let ink = |bold| {
            book.rasterize("Bold", "Arial", bold, 24.0)
                .data
                .iter()
                .filter(|&&v| v > 0.0)
                .count()
        };
        assert!(ink(true) > ink(false));
    }

    #[test]
    fn test_empty_text() {
        let run = FontBook::empty().rasterize("", "Arial", false, 20.0);
        assert_eq!(run.width, 0);
        assert_eq!(run.advance, 0.0);
    }

    #[test]
    fn test_missing_font_dir() {
        let book = FontBook::load_dir(Path::new("/definitely/not/here"));
        assert!(book.is_empty());
    }
}
