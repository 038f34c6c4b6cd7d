//! The concurrent in-memory session store.
//!
//! # Concurrency
//!
//! One `parking_lot::Mutex` guards the `token -> Arc<R>` map and nothing
//! else. It is held only for a lookup, insert or removal, never across a
//! close callback and never across a sleep. The sweep therefore runs in
//! two steps: collect garbage under the lock, then close each collected
//! session with the lock released. A close callback may open sessions or
//! touch the store without deadlocking.
//!
//! Stored values are immutable. Saving replaces the `Arc` in the map;
//! loading clones the value out. Callers never get a reference into the
//! map, so there is nothing to tear.
//!
//! # Known race
//!
//! A session updated between the sweep's scan and its close is closed
//! anyway (the sweep closes by token). The cost is a premature logout for
//! a session that was about to expire; the close itself still runs once.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use latchkey_protocol::token_prefix;
use latchkey_sweep::{Sweep, SweepError, SweepHandle, SweepStats};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    Clock, RandomTokenGenerator, SessionHandler, SessionRecord, StoreSettings, SystemClock,
    TokenGenerator, close_record,
};

/// Thread-safe map of live sessions with optional background sweeping.
///
/// Always handled through an `Arc`; the background loop keeps only a weak
/// reference, so dropping the last `Arc` also stops the loop.
pub struct SharedMapStore<R: SessionRecord> {
    sessions: Mutex<HashMap<String, Arc<R>>>,
    generator: Arc<dyn TokenGenerator>,
    clock: Arc<dyn Clock>,
    settings: StoreSettings,
    sweeper: Mutex<Option<SweepHandle>>,
}

impl<R: SessionRecord> SharedMapStore<R> {
    /// Starts building a store with default settings, random tokens and the
    /// system clock.
    pub fn builder() -> SharedMapStoreBuilder<R> {
        SharedMapStoreBuilder::new()
    }

    /// A store with default collaborators and the given settings.
    pub fn new(settings: StoreSettings) -> Arc<Self> {
        Self::builder().settings(settings).build()
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Number of stored sessions, valid or not.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Tokens currently stored, in no particular order.
    pub fn tokens(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Counters of the background loop, if one is running.
    pub fn sweep_stats(&self) -> Option<SweepStats> {
        self.sweeper.lock().as_ref().map(SweepHandle::stats)
    }

    /// Whether a background loop was started and hasn't been shut down.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stops the background loop and waits for it. Sessions stay in the
    /// store; sweeping is manual from here on.
    pub async fn shutdown(&self) -> Result<(), SweepError> {
        let handle = self.sweeper.lock().take();
        match handle {
            Some(mut handle) => handle.shutdown().await,
            None => Ok(()),
        }
    }

    fn start_sweeper(self: &Arc<Self>) {
        let config = self.settings.sweep_config();
        if !config.is_enabled() {
            debug!("background sweeping disabled");
            return;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("no Tokio runtime at store construction, background sweeping disabled");
            return;
        }
        *self.sweeper.lock() = SweepHandle::spawn(Arc::downgrade(self), config);
    }
}

impl<R: SessionRecord> SessionHandler<R> for SharedMapStore<R> {
    fn session_exists(&self, token: &str) -> bool {
        !token.is_empty() && self.sessions.lock().contains_key(token)
    }

    fn generate_token(&self) -> String {
        self.generator.generate(self.settings.token_length)
    }

    fn load_session(&self, token: &str) -> Option<R> {
        if token.is_empty() {
            return None;
        }
        let now = self.clock.now();
        let sessions = self.sessions.lock();
        let stored = sessions.get(token)?;
        if !stored.core().is_valid(now) {
            trace!(token = token_prefix(token), "stored session timed out, not loadable");
            return None;
        }
        Some(R::clone(stored))
    }

    fn reserve_session(&self, record: &R) -> bool {
        let token = record.core().token();
        if token.is_empty() {
            return false;
        }
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(token) {
            return false;
        }
        sessions.insert(token.to_string(), Arc::new(record.clone()));
        true
    }

    fn save_session(&self, record: &R) {
        let token = record.core().token();
        if token.is_empty() {
            return;
        }
        let value = Arc::new(record.clone());
        self.sessions.lock().insert(token.to_string(), value);
        trace!(token = token_prefix(token), "session saved");
    }

    fn refresh_session(&self, record: &R) -> bool {
        let token = record.core().token();
        if token.is_empty() {
            return false;
        }
        let value = Arc::new(record.clone());
        match self.sessions.lock().get_mut(token) {
            Some(slot) => {
                *slot = value;
                trace!(token = token_prefix(token), "session refreshed");
                true
            }
            None => false,
        }
    }

    fn delete_session(&self, record: &R) -> bool {
        let token = record.core().token();
        !token.is_empty() && self.sessions.lock().remove(token).is_some()
    }

    fn clean_sessions(&self) -> usize {
        let now = self.clock.now();
        let garbage: Vec<Arc<R>> = {
            let sessions = self.sessions.lock();
            sessions
                .values()
                .filter(|s| s.is_garbage(now))
                .cloned()
                .collect()
        };

        let scanned = garbage.len();
        let closed = garbage
            .iter()
            .filter(|record| close_record(self, record.as_ref()))
            .count();

        if scanned > 0 {
            debug!(scanned, closed, "garbage sessions reclaimed");
        }
        closed
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn max_token_attempts(&self) -> u32 {
        self.settings.token_attempts
    }
}

impl<R: SessionRecord> Sweep for SharedMapStore<R> {
    fn sweep(&self) -> usize {
        self.clean_sessions()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`SharedMapStore`].
pub struct SharedMapStoreBuilder<R> {
    settings: StoreSettings,
    generator: Arc<dyn TokenGenerator>,
    clock: Arc<dyn Clock>,
    _record: PhantomData<fn() -> R>,
}

impl<R: SessionRecord> SharedMapStoreBuilder<R> {
    pub fn new() -> Self {
        Self {
            settings: StoreSettings::default(),
            generator: Arc::new(RandomTokenGenerator),
            clock: Arc::new(SystemClock),
            _record: PhantomData,
        }
    }

    pub fn settings(mut self, settings: StoreSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TokenGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the store and, if the settings enable it and a Tokio runtime
    /// is available, starts the background sweep.
    pub fn build(self) -> Arc<SharedMapStore<R>> {
        let store = Arc::new(SharedMapStore {
            sessions: Mutex::new(HashMap::new()),
            generator: self.generator,
            clock: self.clock,
            settings: self.settings.validated(),
            sweeper: Mutex::new(None),
        });
        store.start_sweeper();
        store
    }
}

impl<R: SessionRecord> Default for SharedMapStoreBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}
