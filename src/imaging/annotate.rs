//! Text overlay drawing.
//!
//! Annotations are drawn in semi-transparent white so they read on both
//! light and dark images. When the computed font size is large (> 20) a
//! dark outline stroke is added underneath for extra contrast, emulated
//! by stamping the text in the stroke color at one-pixel offsets before
//! the fill pass.

use super::calculations::annotation_font_size;
use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgba};
use imageproc::drawing::{Blend, draw_text_mut, text_size};

/// Anchor point for annotation placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gravity {
    /// Centered horizontally, flush with the bottom edge.
    South,
    /// Centered on both axes.
    Center,
}

/// Fill color: white at ~50% opacity.
const FILL: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0x80]);
/// Stroke color: black at ~31% opacity, used only for large text.
const STROKE: Rgba<u8> = Rgba([0x00, 0x00, 0x00, 0x50]);

/// Stroke is only worth the extra passes once glyphs are big enough for
/// a one-pixel outline to register.
const STROKE_MIN_FONT_SIZE: f64 = 20.0;

/// Draw `text` onto the image at the given gravity.
///
/// The font size comes from [`annotation_font_size`] using the image's
/// current (post-resize) dimensions and the text's byte length. Empty
/// text is a no-op; callers don't need to guard.
pub fn annotate(image: &mut DynamicImage, font: &FontVec, text: &str, gravity: Gravity) {
    if text.is_empty() {
        return;
    }

    let font_size = annotation_font_size(image.width(), image.height(), text.len());
    let scale = PxScale::from(font_size as f32);

    let (text_w, text_h) = text_size(scale, font, text);
    let x = (image.width() as i32 - text_w as i32) / 2;
    let y = match gravity {
        Gravity::South => image.height() as i32 - text_h as i32,
        Gravity::Center => (image.height() as i32 - text_h as i32) / 2,
    };

    let mut canvas = Blend(image.to_rgba8());
    if font_size > STROKE_MIN_FONT_SIZE {
        for (dx, dy) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            draw_text_mut(&mut canvas, STROKE, x + dx, y + dy, scale, font, text);
        }
    }
    draw_text_mut(&mut canvas, FILL, x, y, scale, font, text);

    *image = DynamicImage::ImageRgba8(canvas.0);
}
