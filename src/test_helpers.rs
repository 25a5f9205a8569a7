//! Shared test fakes for the cache and object-store collaborators.
//!
//! Both fakes record invocations so tests can assert on *how* the
//! cache-aside path touched them, not just on the bytes returned.

use crate::cache::{ByteCache, CacheWriteError};
use crate::origin::{ObjectStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory cache fake with invocation counters and injectable write
/// failures.
#[derive(Default)]
pub(crate) struct FakeCache {
    pub entries: Mutex<HashMap<String, Bytes>>,
    pub writes: AtomicUsize,
    pub fail_with_no_space: bool,
    pub fail_with_backend: bool,
}

impl FakeCache {
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ByteCache for FakeCache {
    fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: Bytes) -> Result<(), CacheWriteError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_with_no_space {
            return Err(CacheWriteError::NoSpace {
                size: value.len() as u64,
                capacity: 0,
            });
        }
        if self.fail_with_backend {
            return Err(CacheWriteError::Backend("disk on fire".into()));
        }
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }
}

/// Object-store fake recording every requested key.
#[derive(Default)]
pub(crate) struct FakeStore {
    pub calls: Mutex<Vec<String>>,
    pub objects: HashMap<String, Bytes>,
}

impl FakeStore {
    pub fn with_object(key: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            objects: HashMap::from([(key.to_string(), bytes.into())]),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.calls.lock().unwrap().push(key.to_string());
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError(format!("no such key: {key}")))
    }
}
