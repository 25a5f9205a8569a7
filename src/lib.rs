//! # imgrelay
//!
//! A caching image-delivery accelerator. One GET endpoint takes a source
//! image — an HTTP URL, an S3 object key, or a compact path-encoded form —
//! fetches the raw bytes (local cache first, origin on a miss), applies a
//! bounded set of transformations, and streams the result back. Repeated
//! requests for the same source never touch the origin twice.
//!
//! # Architecture: one request, one pass
//!
//! ```text
//! request → params (resolve source + knobs)
//!         → origin (cache-aside: cache → S3 | HTTP → cache write-back)
//!         → pipeline (decode → resize → annotate → sharpen → encode)
//!         → response (200 + image/<format>)
//! ```
//!
//! Each stage can short-circuit to an error the server maps to a status:
//! an unresolvable source is 400 before any fetch; everything downstream
//! of a resolved source is 503.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`params`] | Dual-form parameter resolution: explicit query string or compact `_`-delimited path |
//! | [`origin`] | Cache-aside fetch: cache → object store / HTTP origin → cache write-back |
//! | [`cache`] | moka-backed upstream byte cache with optional snapshot persistence |
//! | [`imaging`] | Pure dimension/font-size math and text overlay drawing |
//! | [`pipeline`] | Ordered transform stages over decoded pixels |
//! | [`server`] | axum handler, status mapping, request-context logging |
//! | [`config`] | CLI flags, startup validation |
//!
//! # Design Decisions
//!
//! ## Two parameter forms, one canonical shape
//!
//! The verbose `?imageUrl=...&width=...` form can address any origin. The
//! compact `/<prefix>_w300_h200_<key>` form exists for short, cacheable
//! CDN paths and can only address the object store: its segments are
//! folded into `s3:<prefix>_<key>` and the size markers are dropped from
//! the identifier. Both forms resolve to the same
//! [`params::RequestParameters`] before anything downstream runs.
//!
//! ## Cache-aside, no coalescing
//!
//! The cache stores raw origin bytes, not transformed output, so one
//! cached fetch serves every size/quality variant. Concurrent misses on
//! the same key each hit the origin — a deliberate simplicity trade-off
//! documented in [`origin`].
//!
//! ## Shrink-only resizing
//!
//! The planner ([`imaging::plan_dimensions`]) only ever shrinks,
//! preserving aspect ratio with a fixed sequential two-step constraint
//! order. Upscaling a source image is never worth the bytes.
//!
//! ## Soft numeric parsing
//!
//! A request with a malformed `width` still serves the image at original
//! size. Only a missing source identifier is a hard rejection. Operators
//! get a warn log either way.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod origin;
pub mod params;
pub mod pipeline;
pub mod server;

#[cfg(test)]
pub(crate) mod test_helpers;
