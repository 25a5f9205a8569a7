//! Origin resolution — the cache-aside read path.
//!
//! Given a source identifier, [`OriginResolver::fetch`] returns raw image
//! bytes:
//!
//! 1. cache lookup — a hit returns immediately, no origin contact;
//! 2. on a miss, `s3:`-prefixed identifiers go to the object store (marker
//!    stripped), everything else is treated as a generic HTTP URL;
//! 3. fetched bytes are written back to the cache with unbounded TTL
//!    before being returned.
//!
//! A no-space cache write is logged and otherwise ignored — the request
//! still succeeds with the bytes in hand. Any other cache write failure
//! is surfaced as [`FetchError::CacheFatal`], which the server treats as
//! an unrecoverable process fault.
//!
//! There is deliberately no single-flight de-duplication: concurrent
//! misses for the same identifier each contact the origin and each write
//! the cache. A stampede on a cold key is an accepted cost; adding
//! coalescing here would change observable behavior (origin hit counts)
//! that operators alarm on.

use crate::cache::{ByteCache, CacheWriteError};
use crate::config::Config;
use crate::params::OBJECT_STORE_PREFIX;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Why an origin fetch failed. All variants map to 503 except
/// [`FetchError::CacheFatal`], which terminates the process.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot fetch key [{key}] from object store: {message}")]
    Store { key: String, message: String },
    #[error("unexpected status {status} returned from {url}")]
    UpstreamStatus { url: String, status: u16 },
    #[error("cannot load image from {url}: {message}")]
    Upstream { url: String, message: String },
    #[error("unrecoverable cache write failure for key [{key}]: {source}")]
    CacheFatal {
        key: String,
        source: CacheWriteError,
    },
}

/// Object-store failure, opaque to callers beyond its message.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

/// Read-only object-store client.
///
/// The production implementation is [`S3Store`]; tests substitute fakes
/// that count invocations.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes by key.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;
}

/// S3-backed object store using static credentials from the CLI flags.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub fn new(config: &Config) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            config.s3_access_key.clone(),
            config.s3_secret_key.clone(),
            None,
            None,
            "imgrelay-flags",
        );
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.s3_region.clone()))
            .credentials_provider(credentials)
            .build();
        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.s3_bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StoreError(e.to_string()))?;
        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StoreError(format!("cannot read object body: {e}")))?;
        Ok(data.into_bytes())
    }
}

/// Cache-aside orchestrator over the cache, object store, and HTTP client.
///
/// Constructed once at startup and shared by every request; holds no
/// per-request state.
pub struct OriginResolver {
    cache: Arc<dyn ByteCache>,
    store: Arc<dyn ObjectStore>,
    http: reqwest::Client,
    max_image_size: u64,
}

impl OriginResolver {
    pub fn new(cache: Arc<dyn ByteCache>, store: Arc<dyn ObjectStore>, max_image_size: u64) -> Self {
        Self {
            cache,
            store,
            http: reqwest::Client::new(),
            max_image_size,
        }
    }

    /// Return the raw bytes for a source identifier, cache-aside.
    pub async fn fetch(&self, source_id: &str) -> Result<Bytes, FetchError> {
        if let Some(bytes) = self.cache.get(source_id) {
            return Ok(bytes);
        }

        let bytes = match source_id.strip_prefix(OBJECT_STORE_PREFIX) {
            Some(key) => self.store.get(key).await.map_err(|e| FetchError::Store {
                key: key.to_string(),
                message: e.to_string(),
            })?,
            None => self.fetch_http(source_id).await?,
        };

        match self.cache.set(source_id, bytes.clone()) {
            Ok(()) => {}
            Err(err @ CacheWriteError::NoSpace { .. }) => {
                warn!(source_id, %err, "cannot store fetched image in upstream cache");
            }
            Err(source) => {
                return Err(FetchError::CacheFatal {
                    key: source_id.to_string(),
                    source,
                });
            }
        }
        Ok(bytes)
    }

    /// GET a generic HTTP origin, requiring status 200 exactly.
    ///
    /// The body is streamed and truncated at `max_image_size` — excess
    /// bytes are dropped rather than failing the request, matching a
    /// capped reader over the response body.
    async fn fetch_http(&self, url: &str) -> Result<Bytes, FetchError> {
        let upstream = |e: reqwest::Error| FetchError::Upstream {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut response = self.http.get(url).send().await.map_err(upstream)?;
        if response.status().as_u16() != 200 {
            return Err(FetchError::UpstreamStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let cap = usize::try_from(self.max_image_size).unwrap_or(usize::MAX);
        let mut body: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(upstream)? {
            let remaining = cap - body.len();
            if remaining == 0 {
                break;
            }
            let take = chunk.len().min(remaining);
            body.extend_from_slice(&chunk[..take]);
            if take < chunk.len() {
                break;
            }
        }
        Ok(Bytes::from(body))
    }
}
