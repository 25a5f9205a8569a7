//! Process configuration.
//!
//! Everything is read once from CLI flags at startup; the resulting
//! [`Config`] is immutable for the life of the process. Validation
//! failures here are fatal — the process logs and exits before binding
//! the listen socket.

use clap::Parser;
use thiserror::Error;

/// Regions the S3 client may be pointed at. The region flag is validated
/// against this table up front so a typo fails at startup instead of on
/// the first cache miss.
const S3_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "ca-central-1",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-central-1",
    "eu-north-1",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-south-1",
    "sa-east-1",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown s3-region: {0}")]
    UnknownRegion(String),
    #[error("default-compression-quality must be in 0..=100, got {0}")]
    QualityOutOfRange(u32),
}

/// CLI flags. Defaults serve a small deployment out of the box.
#[derive(Debug, Clone, Parser)]
#[command(name = "imgrelay")]
#[command(about = "Caching image-delivery accelerator")]
#[command(version)]
pub struct Config {
    /// TCP address to listen on
    #[arg(long, default_value = "0.0.0.0:8081")]
    pub listen_addr: String,

    /// Compression quality applied when the request does not supply one
    #[arg(long, default_value_t = 75)]
    pub default_compression_quality: u32,

    /// Maximum bytes read from a generic HTTP origin; longer bodies are truncated
    #[arg(long, default_value_t = 10 * 1024 * 1024)]
    pub max_image_size: u64,

    /// Sizing hint for the number of cached upstream images
    #[arg(long, default_value_t = 10_000)]
    pub max_cached_images_count: u64,

    /// Total upstream cache budget in megabytes
    #[arg(long, default_value_t = 100)]
    pub max_cache_size_mb: u64,

    /// Path prefix for cache persistence; empty means anonymous, in-memory only
    #[arg(long, default_value = "")]
    pub cache_filename: String,

    /// Access key for the S3 object store
    #[arg(long, default_value = "foobar")]
    pub s3_access_key: String,

    /// Secret key for the S3 object store
    #[arg(long, default_value = "foobaz")]
    pub s3_secret_key: String,

    /// Region to route S3 requests to
    #[arg(long, default_value = "eu-west-1")]
    pub s3_region: String,

    /// S3 bucket images are loaded from
    #[arg(long, default_value = "bucket")]
    pub s3_bucket: String,

    /// TrueType font used for annotations
    #[arg(
        long,
        default_value = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"
    )]
    pub annotation_font: String,
}

impl Config {
    /// Validate startup-fatal invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !S3_REGIONS.contains(&self.s3_region.as_str()) {
            return Err(ConfigError::UnknownRegion(self.s3_region.clone()));
        }
        if self.default_compression_quality > 100 {
            return Err(ConfigError::QualityOutOfRange(
                self.default_compression_quality,
            ));
        }
        Ok(())
    }
}
