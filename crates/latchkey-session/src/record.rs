//! Session variants.
//!
//! Every variant wraps a [`SessionCore`] and decides what else it carries.
//! The store keeps one immutable copy per token; callers work on their own
//! copy and swap a fresh clone into the store on every update. That is why
//! [`SessionRecord`] requires `Clone`: cloning *is* the save path.
//!
//! | Variant          | Extra state                           |
//! |------------------|---------------------------------------|
//! | [`PlainRecord`]  | none                                  |
//! | [`CachedRecord`] | a [`SessionCache`] scratch space      |

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use latchkey_protocol::SessionSnapshot;

use crate::{
    CacheFactory, CloseCallbacks, MapRoles, RoleFactory, SessionCache, SessionCore,
    SessionSettings,
};

/// What the store and the session handle need from a session variant.
pub trait SessionRecord: Clone + Send + Sync + fmt::Debug + 'static {
    fn core(&self) -> &SessionCore;

    fn core_mut(&mut self) -> &mut SessionCore;

    /// An unbound record with the same configuration and fresh
    /// per-session state (roles, auxiliary storage).
    fn blank(&self, now: DateTime<Utc>) -> Self;

    /// Whether the sweeper should reclaim this record.
    fn is_garbage(&self, now: DateTime<Utc>) -> bool {
        self.core().is_garbage(now)
    }

    /// Variant-specific teardown, run after the close callbacks.
    fn on_close(&self) {}

    fn snapshot(&self) -> SessionSnapshot {
        self.core().snapshot()
    }
}

// ---------------------------------------------------------------------------
// PlainRecord
// ---------------------------------------------------------------------------

/// A session with nothing but the base state.
#[derive(Debug, Clone)]
pub struct PlainRecord {
    core: SessionCore,
}

impl PlainRecord {
    /// An unbound record using [`MapRoles`].
    pub fn new(settings: &SessionSettings, callbacks: Arc<CloseCallbacks>, now: DateTime<Utc>) -> Self {
        Self::with_roles(settings, callbacks, MapRoles::factory(), now)
    }

    pub fn with_roles(
        settings: &SessionSettings,
        callbacks: Arc<CloseCallbacks>,
        roles: RoleFactory,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            core: SessionCore::new(settings, callbacks, roles, now),
        }
    }
}

impl SessionRecord for PlainRecord {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SessionCore {
        &mut self.core
    }

    fn blank(&self, now: DateTime<Utc>) -> Self {
        Self {
            core: self.core.blank(now),
        }
    }
}

// ---------------------------------------------------------------------------
// CachedRecord
// ---------------------------------------------------------------------------

/// A session that owns a key/value scratch space for its lifetime.
///
/// The scratch space is shared by every copy of the session, so a value
/// written during one request is visible on the next load. It is cleared
/// when the session closes.
#[derive(Clone)]
pub struct CachedRecord {
    core: SessionCore,
    cache: Arc<dyn SessionCache>,
    cache_factory: CacheFactory,
}

impl CachedRecord {
    pub fn new(
        settings: &SessionSettings,
        callbacks: Arc<CloseCallbacks>,
        cache_factory: CacheFactory,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            core: SessionCore::new(settings, callbacks, MapRoles::factory(), now),
            cache: cache_factory(),
            cache_factory,
        }
    }

    pub fn cache(&self) -> &Arc<dyn SessionCache> {
        &self.cache
    }

    pub fn read(&self, key: &str) -> Option<String> {
        self.cache.read(key)
    }

    pub fn write(&self, key: &str, value: &str) {
        self.cache.write(key, value);
    }

    pub fn destroy(&self, key: &str) -> bool {
        self.cache.destroy(key)
    }
}

impl SessionRecord for CachedRecord {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut SessionCore {
        &mut self.core
    }

    fn blank(&self, now: DateTime<Utc>) -> Self {
        Self {
            core: self.core.blank(now),
            cache: (self.cache_factory)(),
            cache_factory: Arc::clone(&self.cache_factory),
        }
    }

    fn on_close(&self) {
        self.cache.clear();
    }
}

impl fmt::Debug for CachedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedRecord")
            .field("core", &self.core)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
