//! Pure calculation functions for dimension planning and annotation sizing.
//!
//! All functions here are pure and testable without any I/O or images.

/// Planned target dimensions for a resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionPlan {
    pub width: u32,
    pub height: u32,
    pub should_resize: bool,
}

/// Compute target dimensions for an aspect-ratio-preserving shrink.
///
/// `requested_*` of 0 means "unconstrained on that axis". When exactly one
/// axis is constrained the bounding box is squared off from the other.
/// Images already inside the box are left alone — this function never
/// upscales.
///
/// The shrink is sequential: the width constraint is applied first, then
/// the height constraint against the already-shrunk height. For extreme
/// aspect ratios this can undershoot one axis compared to a simultaneous
/// best-fit. Callers depend on these exact numbers, so the two-step order
/// is part of the contract.
///
/// # Examples
/// ```
/// # use imgrelay::imaging::{DimensionPlan, plan_dimensions};
/// assert_eq!(
///     plan_dimensions(1000, 500, 200, 1000),
///     DimensionPlan { width: 200, height: 100, should_resize: true },
/// );
/// ```
pub fn plan_dimensions(
    original_width: u32,
    original_height: u32,
    requested_width: u32,
    requested_height: u32,
) -> DimensionPlan {
    let mut width = requested_width;
    let mut height = requested_height;

    if width == 0 && height == 0 {
        return DimensionPlan {
            width: 0,
            height: 0,
            should_resize: false,
        };
    }

    if width == 0 {
        width = height;
    } else if height == 0 {
        height = width;
    }

    let mut ow = original_width;
    let mut oh = original_height;

    if ow <= width && oh <= height {
        return DimensionPlan {
            width: ow,
            height: oh,
            should_resize: false,
        };
    }

    if ow > width {
        oh = (oh as f64 * width as f64 / ow as f64) as u32;
        ow = width;
    }

    if oh > height {
        ow = (ow as f64 * height as f64 / oh as f64) as u32;
        oh = height;
    }

    DimensionPlan {
        width: ow,
        height: oh,
        should_resize: true,
    }
}

/// Compute the font size for an annotation drawn onto an image.
///
/// Starts at 80 and shrinks to fit: first against the image width divided
/// across the text length (the 0.55 factor approximates average glyph
/// width relative to the em size), then against the image height. Floored
/// at 10 so tiny images still get legible text.
///
/// Always returns a value in `[10, 80]` for non-empty text.
pub fn annotation_font_size(image_width: u32, image_height: u32, text_len: usize) -> f64 {
    let mut font_size = 80.0_f64;

    let by_width = image_width as f64 / text_len as f64 / 0.55;
    if by_width < font_size {
        font_size = by_width;
    }

    let by_height = image_height as f64 / 1.2;
    if by_height < font_size {
        font_size = by_height;
    }

    if font_size < 10.0 {
        font_size = 10.0;
    }
    font_size
}
