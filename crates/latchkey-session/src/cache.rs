//! Per-session scratch space for the cache-backed session variant.
//!
//! The storage behind a [`SessionCache`] is somebody else's business (an
//! in-process map, a Redis hash, a row in a table). The session only needs
//! a handle scoped to itself: read, write and destroy string values by key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Key/value storage scoped to one session.
pub trait SessionCache: Send + Sync + fmt::Debug {
    fn read(&self, key: &str) -> Option<String>;

    fn write(&self, key: &str, value: &str);

    /// Removes a key. Returns `true` if it was present.
    fn destroy(&self, key: &str) -> bool;

    /// Removes every key. Called when the owning session closes.
    fn clear(&self);
}

/// Builds the scratch space for a new session.
pub type CacheFactory = Arc<dyn Fn() -> Arc<dyn SessionCache> + Send + Sync>;

/// A [`SessionCache`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory producing an independent `MemoryCache` per session.
    pub fn factory() -> CacheFactory {
        Arc::new(|| Arc::new(MemoryCache::new()) as Arc<dyn SessionCache>)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SessionCache for MemoryCache {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn write(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    fn destroy(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}
