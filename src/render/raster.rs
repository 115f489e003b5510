//! Raster backend: paints a prepared page onto an RGBA canvas.
//!
//! Compositing is plain source-over. Text coverage from [`super::font`] is
//! multiplied by the layer color's alpha and blended into the canvas, images
//! are stretched to their layer box and overlaid.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage, imageops};
use std::io::Cursor;

use super::font::FontBook;
use super::{PreparedBackground, PreparedLayer, PreparedPage, PreparedText};
use crate::error::CertError;

/// Encodings the raster backend can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    fn image_format(self) -> ImageFormat {
        match self {
            RasterFormat::Png => ImageFormat::Png,
            RasterFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Paint the page and return the canvas.
pub fn paint(page: &PreparedPage, fonts: &FontBook) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(page.width, page.height, super::color::WHITE);

    match &page.background {
        PreparedBackground::Fill(color) => {
            for pixel in canvas.pixels_mut() {
                blend(pixel, *color, 1.0);
            }
        }
        PreparedBackground::Image(image) => {
            let stretched = image.resize_exact(
                page.width,
                page.height,
                imageops::FilterType::Triangle,
            );
            imageops::overlay(&mut canvas, &stretched.to_rgba8(), 0, 0);
        }
    }

    for layer in &page.layers {
        match layer {
            PreparedLayer::Text(text) => paint_text(&mut canvas, text, fonts),
            PreparedLayer::Image(image) => {
                let w = (image.w.round().max(1.0) as u32).min(page.width);
                let h = (image.h.round().max(1.0) as u32).min(page.height);
                let scaled = image
                    .image
                    .resize_exact(w, h, imageops::FilterType::Triangle)
                    .to_rgba8();
                imageops::overlay(
                    &mut canvas,
                    &scaled,
                    image.x.round() as i64,
                    image.y.round() as i64,
                );
            }
        }
    }

    canvas
}

/// Paint and encode in one step.
pub fn render(
    page: &PreparedPage,
    fonts: &FontBook,
    format: RasterFormat,
) -> Result<Vec<u8>, CertError> {
    let canvas = paint(page, fonts);
    let image = match format {
        RasterFormat::Png => DynamicImage::ImageRgba8(canvas),
        RasterFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8()),
    };
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format.image_format())
        .map_err(|e| CertError::Render(format!("Failed to encode image: {}", e)))?;
    Ok(bytes)
}

fn paint_text(canvas: &mut RgbaImage, text: &PreparedText, fonts: &FontBook) {
    if text.content.is_empty() {
        return;
    }
    let run = fonts.rasterize(&text.content, &text.font_family, text.bold, text.font_size);
    if run.width == 0 {
        return;
    }

    let left = (text.x - text.align.offset(run.advance)).round() as i64;
    let top = (text.y - run.ascent).round() as i64;
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);

    for ry in 0..run.height {
        let y = top + ry as i64;
        if y < 0 || y >= ch {
            continue;
        }
        for rx in 0..run.width {
            let x = left + rx as i64;
            if x < 0 || x >= cw {
                continue;
            }
            let coverage = run.data[ry * run.width + rx];
            if coverage <= 0.0 {
                continue;
            }
            blend(canvas.get_pixel_mut(x as u32, y as u32), text.color, coverage);
        }
    }
}

/// Source-over blend of `color` at `coverage` onto an opaque destination.
fn blend(dst: &mut Rgba<u8>, color: Rgba<u8>, coverage: f32) {
    let alpha = coverage.clamp(0.0, 1.0) * color[3] as f32 / 255.0;
    if alpha <= 0.0 {
        return;
    }
    for c in 0..3 {
        let mixed = color[c] as f32 * alpha + dst[c] as f32 * (1.0 - alpha);
        dst[c] = mixed.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::color::{BLACK, WHITE};
    use crate::template::Align;

    fn page(background: PreparedBackground, layers: Vec<PreparedLayer>) -> PreparedPage {
        PreparedPage {
            width: 200,
            height: 100,
            background,
            layers,
        }
    }

    fn text(content: &str, x: f32, y: f32, align: Align) -> PreparedLayer {
        PreparedLayer::Text(PreparedText {
            x,
            y,
            content: content.to_string(),
            font_size: 24.0,
            bold: false,
            font_family: "Arial".to_string(),
            color: BLACK,
            align,
            pinned_footer: false,
        })
    }

    fn inked_columns(canvas: &RgbaImage) -> (u32, u32) {
        let mut min = u32::MAX;
        let mut max = 0;
        for (x, _, p) in canvas.enumerate_pixels() {
            if p[0] < 128 {
                min = min.min(x);
                max = max.max(x);
            }
        }
        (min, max)
    }

    #[test]
    fn test_color_background() {
        let canvas = paint(
            &page(PreparedBackground::Fill(Rgba([10, 20, 30, 255])), vec![]),
            &FontBook::empty(),
        );
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([10, 20, 30, 255]));
        assert_eq!(*canvas.get_pixel(199, 99), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_image_background_stretched() {
        let bg = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255])));
        let canvas = paint(&page(PreparedBackground::Image(bg), vec![]), &FontBook::empty());
        assert_eq!(*canvas.get_pixel(150, 80), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_text_alignment() {
        let fonts = FontBook::empty();
        let left = paint(&page(PreparedBackground::Fill(WHITE), vec![text("ab", 100.0, 50.0, Align::Left)]), &fonts);
        let right = paint(&page(PreparedBackground::Fill(WHITE), vec![text("ab", 100.0, 50.0, Align::Right)]), &fonts);
        let center = paint(&page(PreparedBackground::Fill(WHITE), vec![text("ab", 100.0, 50.0, Align::Center)]), &fonts);

        assert!(inked_columns(&left).0 >= 100);
        assert!(inked_columns(&right).1 < 100);
        let (cmin, cmax) = inked_columns(&center);
        assert!(cmin < 100 && cmax > 100);
    }

    #[test]
    fn test_image_layer_box_clamped_to_canvas() {
        let red = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255])));
        let layer = PreparedLayer::Image(super::super::PreparedImage {
            x: 0.0,
            y: 0.0,
            w: 1.0e9,
            h: 1.0e9,
            image: red,
        });
        let canvas = paint(&page(PreparedBackground::Fill(WHITE), vec![layer]), &FontBook::empty());
        assert_eq!(canvas.dimensions(), (200, 100));
        assert_eq!(*canvas.get_pixel(199, 99), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_later_layers_paint_over() {
        let red = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255])));
        let blue = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 255, 255])));
        let layer = |image| {
            PreparedLayer::Image(super::super::PreparedImage {
                x: 10.0,
                y: 10.0,
                w: 20.0,
                h: 20.0,
                image,
            })
        };
        let canvas = paint(
            &page(PreparedBackground::Fill(WHITE), vec![layer(red), layer(blue)]),
            &FontBook::empty(),
        );
        assert_eq!(*canvas.get_pixel(15, 15), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_png_is_deterministic() {
        let p = page(PreparedBackground::Fill(WHITE), vec![text("Same", 10.0, 40.0, Align::Left)]);
        let a = render(&p, &FontBook::empty(), RasterFormat::Png).unwrap();
        let b = render(&p, &FontBook::empty(), RasterFormat::Png).unwrap();
        assert_eq!(a, b);
        assert_eq!(&a[1..4], b"PNG");
    }

    #[test]
    fn test_jpeg_encoding() {
        let p = page(PreparedBackground::Fill(WHITE), vec![]);
        let bytes = render(&p, &FontBook::empty(), RasterFormat::Jpeg).unwrap();
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8]);
    }
}
