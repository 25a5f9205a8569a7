//! Request parameter resolution.
//!
//! Two mutually exclusive input forms resolve to the same
//! [`RequestParameters`]:
//!
//! 1. **Explicit** — `?imageUrl=<url>&width=..&height=..`: the URL is the
//!    source identifier verbatim and may point at any HTTP origin.
//! 2. **Compact** — `/<prefix>_w<width>_h<height>_<key>`: the path encodes
//!    an object-store source. The `w`/`h` segments are consumed for the
//!    dimensions and then *dropped* from the identifier, which is
//!    reconstructed as `s3:<prefix>_<key>`. The compact form can only
//!    address object-store origins.
//!
//! Error policy is two-tier. A request that cannot produce a non-empty
//! source identifier is rejected outright (the caller answers 400 without
//! contacting any origin). Individually malformed numeric fields are
//! *not* hard errors: they log a warning and resolve to 0 ("unconstrained"
//! / "use default"), so a bad `width` still serves the image.

use serde::Deserialize;
use tracing::warn;

/// Marker prefix identifying object-store source identifiers.
pub const OBJECT_STORE_PREFIX: &str = "s3:";

/// Raw query values, all optional and unparsed.
///
/// Everything is carried as a string so that malformed numerics stay a
/// per-field soft failure instead of a deserialization rejection.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawQuery {
    pub image_url: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub compression_quality: Option<String>,
    pub sharp_factor: Option<String>,
    pub bottom_annotation: Option<String>,
    pub center_annotation: Option<String>,
}

/// Canonical transformation parameters for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParameters {
    /// Origin identifier: an `s3:`-prefixed object key or an HTTP URL.
    /// Always non-empty; requests that cannot produce one never construct
    /// this type.
    pub source_id: String,
    /// Bounding-box width in pixels; 0 = unconstrained.
    pub width: u32,
    /// Bounding-box height in pixels; 0 = unconstrained.
    pub height: u32,
    /// Output quality 0..100; 0 = use the configured default.
    pub compression_quality: u32,
    /// Unsharp sigma; zero and negative values leave the image untouched.
    pub sharp_factor: f64,
    /// Text drawn at the bottom edge; empty = none.
    pub bottom_annotation: String,
    /// Text drawn at the image center; empty = none.
    pub center_annotation: String,
}

/// Resolve a request path and query into parameters.
///
/// Returns `None` when no source identifier can be produced — the
/// "missing source" signal the server maps to 400.
pub fn resolve(path: &str, query: &RawQuery) -> Option<RequestParameters> {
    let (source_id, width, height) = match query.image_url.as_deref() {
        Some(url) if !url.is_empty() => (
            url.to_string(),
            parse_dimension("width", query.width.as_deref()),
            parse_dimension("height", query.height.as_deref()),
        ),
        _ => resolve_compact(path)?,
    };

    Some(RequestParameters {
        source_id,
        width,
        height,
        compression_quality: parse_dimension(
            "compressionQuality",
            query.compression_quality.as_deref(),
        ),
        sharp_factor: parse_sharp_factor(query.sharp_factor.as_deref()),
        bottom_annotation: query.bottom_annotation.clone().unwrap_or_default(),
        center_annotation: query.center_annotation.clone().unwrap_or_default(),
    })
}

/// Parse the compact path form into `(source_id, width, height)`.
///
/// The path must split on `_` into exactly four segments
/// `[prefix, wSeg, hSeg, key]`. The first character of the `w`/`h`
/// segments is the conventional marker and is dropped without being
/// validated — `/bucket_x300_y200_key` parses the same as
/// `/bucket_w300_h200_key`. Keys containing `_` survive intact because
/// the split is capped at four pieces.
fn resolve_compact(path: &str) -> Option<(String, u32, u32)> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let parts: Vec<&str> = trimmed.splitn(4, '_').collect();
    if parts.len() != 4 {
        warn!(
            path = trimmed,
            "compact path must contain four parts delimited by '_'"
        );
        return None;
    }

    let source_id = format!("{OBJECT_STORE_PREFIX}{}_{}", parts[0], parts[3]);
    let width = parse_dimension("width", parts[1].get(1..));
    let height = parse_dimension("height", parts[2].get(1..));
    Some((source_id, width, height))
}

/// Parse a non-negative integer field, defaulting to 0 on any failure.
fn parse_dimension(key: &str, value: Option<&str>) -> u32 {
    let Some(value) = value else { return 0 };
    if value.is_empty() {
        return 0;
    }
    match value.parse::<i64>() {
        Ok(n) if (0..=i64::from(u32::MAX)).contains(&n) => n as u32,
        Ok(_) => {
            warn!(key, value, "value out of range, using 0");
            0
        }
        Err(err) => {
            warn!(key, value, %err, "cannot parse value, using 0");
            0
        }
    }
}

/// Parse the sharpen sigma, defaulting to 0.0 on any failure.
///
/// Negative values are deliberately allowed through — they mean "do not
/// sharpen" downstream.
fn parse_sharp_factor(value: Option<&str>) -> f64 {
    let Some(value) = value else { return 0.0 };
    if value.is_empty() {
        return 0.0;
    }
    match value.parse::<f64>() {
        Ok(f) => f,
        Err(err) => {
            warn!(key = "sharpFactor", value, %err, "cannot parse value, using 0.0");
            0.0
        }
    }
}
