//! HTTP surface: one GET endpoint serving both parameter forms, plus the
//! `/favicon.ico` special case.
//!
//! # Status mapping
//!
//! | Outcome | Status |
//! |---|---|
//! | missing / unparseable source | 400 |
//! | origin fetch, decode, or transform failure | 503 |
//! | success | 200 with `Content-Type: image/<format>` |
//!
//! Every per-request failure is logged with the request context (remote
//! address, URI, referer, user agent). A fatal-class cache failure
//! terminates the process — serving traffic on a cache that fails writes
//! for unknown reasons would quietly turn every request into an origin
//! hit.
//!
//! The handler returns the full body to the transport; hyper performs the
//! actual socket writes after the status line is committed. A client that
//! disconnects mid-body shows up as a connection-level log line and never
//! causes a second status write.

use crate::cache::ByteCache;
use crate::config::Config;
use crate::origin::{FetchError, ObjectStore, OriginResolver};
use crate::params::{self, RawQuery};
use crate::pipeline::{self, TransformedImage};
use ab_glyph::FontVec;
use axum::Router;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Process-wide request-handling dependencies, constructed once at
/// startup and never mutated. Tests build one over fakes.
pub struct AppContext {
    pub resolver: OriginResolver,
    pub default_compression_quality: u32,
    pub font: Option<FontVec>,
}

impl AppContext {
    pub fn new(config: &Config, cache: Arc<dyn ByteCache>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            resolver: OriginResolver::new(cache, store, config.max_image_size),
            default_compression_quality: config.default_compression_quality,
            font: load_font(&config.annotation_font),
        }
    }
}

/// Load the annotation font. Missing fonts are not fatal: the server
/// runs, and only requests that ask for annotations fail.
pub fn load_font(path: &str) -> Option<FontVec> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(err) => {
            warn!(path, %err, "cannot read annotation font, annotations disabled");
            return None;
        }
    };
    match FontVec::try_from_vec(data) {
        Ok(font) => Some(font),
        Err(err) => {
            warn!(path, %err, "cannot parse annotation font, annotations disabled");
            None
        }
    }
}

pub fn router(context: Arc<AppContext>) -> Router {
    // Static routes win over the wildcard, so the favicon special case
    // never reaches the image handler.
    Router::new()
        .route("/favicon.ico", get(favicon))
        .route("/", get(handle))
        .route("/*path", get(handle))
        .with_state(context)
}

async fn favicon() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Request context attached to every log line.
struct RequestLog {
    remote: String,
    uri: String,
    referer: String,
    user_agent: String,
}

impl RequestLog {
    fn new(remote: Option<SocketAddr>, uri: &Uri, headers: &HeaderMap) -> Self {
        let header = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string()
        };
        Self {
            remote: remote.map(|a| a.to_string()).unwrap_or_default(),
            uri: uri.to_string(),
            referer: header(header::REFERER),
            user_agent: header(header::USER_AGENT),
        }
    }

    fn error(&self, cause: &str) {
        error!(
            remote = %self.remote,
            uri = %self.uri,
            referer = %self.referer,
            user_agent = %self.user_agent,
            "{cause}"
        );
    }

    fn success(&self) {
        info!(remote = %self.remote, uri = %self.uri, "SUCCESS");
    }
}

async fn handle(
    State(context): State<Arc<AppContext>>,
    remote: Option<ConnectInfo<SocketAddr>>,
    uri: Uri,
    query: Option<Query<RawQuery>>,
    headers: HeaderMap,
) -> Response {
    let log = RequestLog::new(remote.map(|ConnectInfo(a)| a), &uri, &headers);
    let raw = query.map(|Query(q)| q).unwrap_or_default();

    let Some(request) = params::resolve(uri.path(), &raw) else {
        log.error("cannot resolve an image source from the request");
        return StatusCode::BAD_REQUEST.into_response();
    };

    let blob = match context.resolver.fetch(&request.source_id).await {
        Ok(blob) => blob,
        Err(err @ FetchError::CacheFatal { .. }) => {
            log.error(&err.to_string());
            // The cache is shared process state; an unexplained write
            // failure poisons every future request.
            std::process::exit(1);
        }
        Err(err) => {
            log.error(&err.to_string());
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    // Decode and transform run inline: the request's task is the unit of
    // concurrency, and a slow transform holds only this request.
    let transformed = match pipeline::transform(
        &blob,
        &request,
        context.default_compression_quality,
        context.font.as_ref(),
    ) {
        Ok(image) => image,
        Err(err) => {
            log.error(&format!(
                "cannot transform image from {}: {err}",
                request.source_id
            ));
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    };

    log.success();
    emit(transformed)
}

/// Build the success response: content type from the format tag, body
/// from the transformed bytes.
fn emit(image: TransformedImage) -> Response {
    ([(header::CONTENT_TYPE, image.content_type())], image.bytes).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeCache, FakeStore};
    use axum::body::Body;
    use axum::http::Request;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 0])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    fn app(cache: Arc<FakeCache>, store: Arc<FakeStore>) -> Router {
        use clap::Parser;
        // Font path that never resolves, so tests are independent of
        // installed fonts.
        let config = Config::parse_from(["imgrelay", "--annotation-font", "/nonexistent.ttf"]);
        let context = AppContext::new(&config, cache, store);
        router(Arc::new(context))
    }

    async fn get_response(router: Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (parts.status, parts.headers, bytes)
    }

    #[tokio::test]
    async fn favicon_is_always_404() {
        let app = app(Arc::new(FakeCache::default()), Arc::new(FakeStore::default()));
        let (status, _, _) = get_response(app, "/favicon.ico?imageUrl=http://o/x.jpg").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn missing_source_is_400_without_any_fetch() {
        let cache = Arc::new(FakeCache::default());
        let store = Arc::new(FakeStore::default());
        let (status, _, _) = get_response(app(cache.clone(), store.clone()), "/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.call_count(), 0);
        assert_eq!(cache.write_count(), 0);
    }

    #[tokio::test]
    async fn compact_path_serves_resized_image_from_store() {
        let store = Arc::new(FakeStore::with_object("bucket_key1", test_jpeg(600, 400)));
        let (status, headers, body) =
            get_response(app(Arc::new(FakeCache::default()), store), "/bucket_w300_h200_key1")
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
        let img = image::load_from_memory_with_format(&body, ImageFormat::Jpeg).unwrap();
        assert_eq!((img.width(), img.height()), (300, 200));
    }

    #[tokio::test]
    async fn explicit_form_reaches_object_store_via_prefix() {
        let store = Arc::new(FakeStore::with_object("bucket_pic", test_jpeg(40, 40)));
        let (status, _, _) = get_response(
            app(Arc::new(FakeCache::default()), store.clone()),
            "/?imageUrl=s3:bucket_pic",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn cached_source_skips_the_store() {
        let cache = Arc::new(FakeCache::default());
        cache
            .set("s3:bucket_key1", Bytes::from(test_jpeg(60, 60)))
            .unwrap();
        let store = Arc::new(FakeStore::default());

        let (status, _, _) =
            get_response(app(cache, store.clone()), "/bucket_w30_h30_key1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn store_failure_is_503() {
        let app = app(Arc::new(FakeCache::default()), Arc::new(FakeStore::default()));
        let (status, _, _) = get_response(app, "/bucket_w30_h30_missing").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn undecodable_bytes_are_503() {
        let store = Arc::new(FakeStore::with_object("bucket_key1", &b"not an image"[..]));
        let app = app(Arc::new(FakeCache::default()), store);
        let (status, _, _) = get_response(app, "/bucket_w30_h30_key1").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn malformed_numerics_still_serve() {
        let store = Arc::new(FakeStore::with_object("bucket_key1", test_jpeg(50, 50)));
        let (status, _, body) = get_response(
            app(Arc::new(FakeCache::default()), store),
            "/bucket_wABC_hXYZ_key1?compressionQuality=nope",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        // Width/height fell back to "unconstrained": no resize happened.
        let img = image::load_from_memory(&body).unwrap();
        assert_eq!((img.width(), img.height()), (50, 50));
    }

    #[tokio::test]
    async fn annotation_request_without_font_is_503() {
        let store = Arc::new(FakeStore::with_object("bucket_key1", test_jpeg(50, 50)));
        let (status, _, _) = get_response(
            app(Arc::new(FakeCache::default()), store),
            "/bucket_w0_h0_key1?bottomAnnotation=hi",
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
