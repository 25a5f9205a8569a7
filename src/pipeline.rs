//! The transform pipeline: decode → resize → annotate → sharpen → encode.
//!
//! Stages run strictly in order; the first failure aborts the rest and
//! the decoded pixel data is dropped on the way out. All stages run
//! inline on the calling task — transforms are CPU-bound and the request
//! holds its task for the duration.
//!
//! The output is serialized in the same format the source decoded as.
//! Re-encoding goes through fresh pixel buffers, so EXIF/IPTC/ICC
//! payloads from the origin never reach the client.

use crate::imaging::{Gravity, annotate, plan_dimensions};
use crate::params::RequestParameters;
use ab_glyph::FontVec;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

/// Transform-stage failure; the server maps every variant to 503.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("cannot parse image: {0}")]
    Decode(image::ImageError),
    #[error("annotation requested but no font is loaded")]
    FontUnavailable,
    #[error("cannot encode image as {format:?}: {source}")]
    Encode {
        format: ImageFormat,
        source: image::ImageError,
    },
}

/// Final bytes plus the format tag the response content type is built from.
#[derive(Debug, Clone)]
pub struct TransformedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
}

impl TransformedImage {
    /// `image/<lowercased format>`, e.g. `image/jpeg`.
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

/// Run the full pipeline over raw origin bytes.
///
/// `default_quality` fills in when the request supplied 0. The font is
/// optional at the process level: a request that asks for annotations
/// while no font is loaded fails, everything else is unaffected.
pub fn transform(
    raw: &[u8],
    params: &RequestParameters,
    default_quality: u32,
    font: Option<&FontVec>,
) -> Result<TransformedImage, TransformError> {
    let format = image::guess_format(raw).map_err(TransformError::Decode)?;
    let mut image =
        image::load_from_memory_with_format(raw, format).map_err(TransformError::Decode)?;

    let plan = plan_dimensions(image.width(), image.height(), params.width, params.height);
    if plan.should_resize {
        image = image.thumbnail_exact(plan.width, plan.height);
    }

    apply_annotation(&mut image, &params.bottom_annotation, Gravity::South, font)?;
    apply_annotation(&mut image, &params.center_annotation, Gravity::Center, font)?;

    // Sigma 0 is an identity sharpen; the blur kernel rejects it, so it
    // is skipped along with negative values.
    if params.sharp_factor > 0.0 {
        image = image.unsharpen(params.sharp_factor as f32, 0);
    }

    let quality = if params.compression_quality == 0 {
        default_quality
    } else {
        params.compression_quality
    };

    let bytes = encode(&image, format, quality)?;
    Ok(TransformedImage { bytes, format })
}

fn apply_annotation(
    image: &mut DynamicImage,
    text: &str,
    gravity: Gravity,
    font: Option<&FontVec>,
) -> Result<(), TransformError> {
    if text.is_empty() {
        return Ok(());
    }
    let font = font.ok_or(TransformError::FontUnavailable)?;
    annotate(image, font, text, gravity);
    Ok(())
}

/// Serialize in the decoded format, honoring quality where the codec has
/// the knob (JPEG). Annotation leaves RGBA buffers behind, which JPEG
/// cannot carry, so JPEG output is flattened to RGB first.
fn encode(
    image: &DynamicImage,
    format: ImageFormat,
    quality: u32,
) -> Result<Vec<u8>, TransformError> {
    let failed = |source: image::ImageError| TransformError::Encode { format, source };
    let mut out = Cursor::new(Vec::new());

    match format {
        ImageFormat::Jpeg => {
            let quality = quality.clamp(1, 100) as u8;
            let encoder = JpegEncoder::new_with_quality(&mut out, quality);
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(failed)?;
        }
        _ => {
            image.write_to(&mut out, format).map_err(failed)?;
        }
    }
    Ok(out.into_inner())
}
