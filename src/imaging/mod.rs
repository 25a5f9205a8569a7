//! Image math and overlay drawing.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Dimension planning** | pure arithmetic ([`plan_dimensions`]) |
//! | **Annotation sizing** | pure arithmetic ([`annotation_font_size`]) |
//! | **Text overlay** | `imageproc::drawing::draw_text_mut` + `ab_glyph` |
//!
//! Decode, resize, sharpen, and encode live in [`crate::pipeline`], which
//! consumes the plans produced here.

mod annotate;
mod calculations;

pub use annotate::{Gravity, annotate};
pub use calculations::{DimensionPlan, annotation_font_size, plan_dimensions};
