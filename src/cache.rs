//! Upstream byte cache.
//!
//! Raw origin bytes are cached under their source identifier so repeated
//! requests for the same image skip the origin entirely. The cache engine
//! is [moka](https://docs.rs/moka) — it owns concurrency, TTL, and
//! eviction; this module only adds the cache-aside seam and optional
//! snapshot persistence.
//!
//! # Capacity
//!
//! Entries are weighed by byte size (key + value) against a single
//! megabyte budget. The item-count setting from the CLI is passed to the
//! engine as a pre-sizing hint; the weighted byte budget is what actually
//! bounds the cache. An entry larger than the whole budget can never be
//! admitted and is reported as [`CacheWriteError::NoSpace`] — callers
//! treat that as a soft failure and serve the bytes they already hold.
//!
//! # Persistence
//!
//! When a persistence prefix is configured, the cache contents are loaded
//! from `<prefix>.imgrelay.data` at startup and written back on graceful
//! shutdown. The file is a length-prefixed record list; a missing file
//! means a cold start, but an unreadable one is a startup error so a
//! half-written snapshot never silently serves as an empty cache.
//!
//! The [`ByteCache`] trait exists so tests can substitute fakes that
//! count invocations or inject write failures.

use bytes::Bytes;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Suffix appended to the persistence prefix to form the snapshot path.
pub const SNAPSHOT_SUFFIX: &str = ".imgrelay.data";

const SNAPSHOT_MAGIC: &[u8; 8] = b"IMGRSNAP";
const SNAPSHOT_VERSION: u32 = 1;

/// Write failure classification for the cache.
#[derive(Debug, Error)]
pub enum CacheWriteError {
    /// The entry can never fit within the configured capacity. Soft:
    /// the caller keeps the bytes it fetched and the request succeeds.
    #[error("entry of {size} bytes cannot fit in cache capacity of {capacity} bytes")]
    NoSpace { size: u64, capacity: u64 },
    /// Anything else. Fatal-class: the process must not keep serving on
    /// a cache that fails writes for unknown reasons.
    #[error("cache backend failure: {0}")]
    Backend(String),
}

/// Key-value byte cache shared by all requests.
pub trait ByteCache: Send + Sync {
    /// Look up raw bytes by source identifier.
    fn get(&self, key: &str) -> Option<Bytes>;

    /// Store raw bytes with unbounded TTL, subject to the engine's own
    /// capacity policy.
    fn set(&self, key: &str, value: Bytes) -> Result<(), CacheWriteError>;
}

/// Snapshot load/save failures. Load failures are startup-fatal.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot IO error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed snapshot {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// moka-backed in-process cache.
pub struct MemoryCache {
    inner: moka::sync::Cache<String, Bytes>,
    capacity_bytes: u64,
}

impl MemoryCache {
    /// Create an anonymous cache with the given byte budget.
    ///
    /// `max_items` pre-sizes the engine's internal tables; the byte
    /// budget is the enforced bound.
    pub fn new(max_items: u64, max_size_mb: u64) -> Self {
        let capacity_bytes = max_size_mb * 1024 * 1024;
        let inner = moka::sync::Cache::builder()
            .initial_capacity(usize::try_from(max_items).unwrap_or(usize::MAX))
            .max_capacity(capacity_bytes)
            .weigher(|key: &String, value: &Bytes| {
                u32::try_from(key.len() + value.len()).unwrap_or(u32::MAX)
            })
            .build();
        Self {
            inner,
            capacity_bytes,
        }
    }

    /// Create a cache and warm it from the snapshot at
    /// `<prefix>.imgrelay.data`, if that file exists.
    pub fn open(max_items: u64, max_size_mb: u64, prefix: &str) -> Result<Self, SnapshotError> {
        let cache = Self::new(max_items, max_size_mb);
        let path = snapshot_path(prefix);
        if path.exists() {
            let count = cache.load_snapshot(&path)?;
            info!(path = %path.display(), entries = count, "warmed cache from snapshot");
        }
        Ok(cache)
    }

    /// Write the current contents to `<prefix>.imgrelay.data`.
    ///
    /// Written to a sibling temp file first and renamed into place so a
    /// crash mid-write leaves the previous snapshot intact.
    pub fn save_snapshot(&self, prefix: &str) -> Result<(), SnapshotError> {
        let path = snapshot_path(prefix);
        let tmp = path.with_extension("tmp");

        // Flush pending engine maintenance so iter() sees recent inserts.
        self.inner.run_pending_tasks();
        let entries: Vec<(String, Bytes)> = self
            .inner
            .iter()
            .map(|(k, v)| (k.as_ref().clone(), v))
            .collect();

        let mut w = BufWriter::new(File::create(&tmp)?);
        w.write_all(SNAPSHOT_MAGIC)?;
        w.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
        w.write_all(&(entries.len() as u32).to_le_bytes())?;
        for (key, value) in &entries {
            w.write_all(&(key.len() as u32).to_le_bytes())?;
            w.write_all(key.as_bytes())?;
            w.write_all(&(value.len() as u32).to_le_bytes())?;
            w.write_all(value)?;
        }
        w.flush()?;
        drop(w);
        std::fs::rename(&tmp, &path)?;
        info!(path = %path.display(), entries = entries.len(), "wrote cache snapshot");
        Ok(())
    }

    fn load_snapshot(&self, path: &Path) -> Result<u64, SnapshotError> {
        let malformed = |reason: &str| SnapshotError::Malformed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let mut r = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic)?;
        if &magic != SNAPSHOT_MAGIC {
            return Err(malformed("bad magic"));
        }
        let version = read_u32(&mut r)?;
        if version != SNAPSHOT_VERSION {
            return Err(malformed(&format!("unsupported version {version}")));
        }

        let count = read_u32(&mut r)?;
        let mut loaded = 0u64;
        for _ in 0..count {
            let key_len = read_u32(&mut r)? as usize;
            let mut key = vec![0u8; key_len];
            r.read_exact(&mut key)?;
            let key = String::from_utf8(key).map_err(|_| malformed("non-utf8 key"))?;

            let val_len = read_u32(&mut r)? as usize;
            let mut value = vec![0u8; val_len];
            r.read_exact(&mut value)?;

            // Entries that outgrew the configured capacity are skipped,
            // same as a no-space write at runtime.
            if self.set(&key, Bytes::from(value)).is_ok() {
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}

impl ByteCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Bytes) -> Result<(), CacheWriteError> {
        let size = (key.len() + value.len()) as u64;
        if size > self.capacity_bytes {
            return Err(CacheWriteError::NoSpace {
                size,
                capacity: self.capacity_bytes,
            });
        }
        self.inner.insert(key.to_string(), value);
        Ok(())
    }
}

/// Snapshot file path for a persistence prefix.
pub fn snapshot_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}{SNAPSHOT_SUFFIX}"))
}

fn read_u32(r: &mut impl Read) -> Result<u32, SnapshotError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache = MemoryCache::new(100, 10);
        cache.set("s3:bucket_key", Bytes::from_static(b"pixels")).unwrap();
        assert_eq!(cache.get("s3:bucket_key").unwrap(), &b"pixels"[..]);
    }

    #[test]
    fn get_missing_key_is_none() {
        let cache = MemoryCache::new(100, 10);
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn oversized_entry_is_no_space() {
        // 1 MB budget, 2 MB value.
        let cache = MemoryCache::new(100, 1);
        let big = Bytes::from(vec![0u8; 2 * 1024 * 1024]);
        let err = cache.set("huge", big).unwrap_err();
        assert!(matches!(err, CacheWriteError::NoSpace { .. }));
    }

    #[test]
    fn snapshot_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prefix = tmp.path().join("cache").to_string_lossy().into_owned();

        let cache = MemoryCache::new(100, 10);
        cache.set("s3:b_one", Bytes::from_static(b"first")).unwrap();
        cache
            .set("http://origin/two.jpg", Bytes::from_static(b"second"))
            .unwrap();
        cache.save_snapshot(&prefix).unwrap();

        let restored = MemoryCache::open(100, 10, &prefix).unwrap();
        assert_eq!(restored.get("s3:b_one").unwrap(), &b"first"[..]);
        assert_eq!(restored.get("http://origin/two.jpg").unwrap(), &b"second"[..]);
    }

    #[test]
    fn open_without_snapshot_is_cold() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prefix = tmp.path().join("absent").to_string_lossy().into_owned();
        let cache = MemoryCache::open(100, 10, &prefix).unwrap();
        assert!(cache.get("anything").is_none());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prefix = tmp.path().join("cache").to_string_lossy().into_owned();
        std::fs::write(snapshot_path(&prefix), b"not a snapshot").unwrap();

        assert!(MemoryCache::open(100, 10, &prefix).is_err());
    }

    #[test]
    fn truncated_snapshot_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let prefix = tmp.path().join("cache").to_string_lossy().into_owned();

        let cache = MemoryCache::new(100, 10);
        cache.set("key", Bytes::from_static(b"value")).unwrap();
        cache.save_snapshot(&prefix).unwrap();

        let path = snapshot_path(&prefix);
        let full = std::fs::read(&path).unwrap();
        std::fs::write(&path, &full[..full.len() - 2]).unwrap();

        assert!(MemoryCache::open(100, 10, &prefix).is_err());
    }
}
