//! The per-request session handle and its state machine.
//!
//! ```text
//!            open()                 time passes            close()
//!  Unbound ─────────→ Open ───────────────────→ TimedOut ──────────→ Closed
//!     │                ↑ │  update() / load()       │                  ↑
//!     │                └─┘                          └──────────────────┤
//!     └──── load(token) ─→ Open                     sweeper ───────────┘
//! ```
//!
//! A [`Session`] owns its own copy of the state (a [`SessionRecord`]). The
//! store keeps another. Every successful `update` pushes a fresh clone to
//! the store; `load` pulls one back. Nothing is ever shared mutably
//! between the two sides.
//!
//! `Closed` is terminal for a handle. Open a new session through a new
//! handle (see [`Sessions::open`](crate::Sessions::open)).

use std::sync::Arc;

use latchkey_protocol::{SessionSnapshot, TokenPlacement, token_prefix};
use tracing::{debug, info, warn};

use crate::{CachedRecord, RoleContainer, SessionError, SessionHandler, SessionRecord, close_record};

/// Where a session handle is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No token yet.
    Unbound,
    /// Bound and within its timeout.
    Open,
    /// Bound but the timeout elapsed. The store may still hold it.
    TimedOut,
    /// Closed through this handle. Terminal.
    Closed,
}

/// A session as seen by one request.
pub struct Session<R: SessionRecord> {
    record: R,
    handler: Arc<dyn SessionHandler<R>>,
    closed: bool,
}

impl<R: SessionRecord> Session<R> {
    /// Wraps an unbound `record`. Nothing is stored until `open` or `load`.
    pub fn new(record: R, handler: Arc<dyn SessionHandler<R>>) -> Self {
        Self {
            record,
            handler,
            closed: false,
        }
    }

    /// Empty while unbound.
    pub fn token(&self) -> &str {
        self.record.core().token()
    }

    pub fn is_bound(&self) -> bool {
        self.record.core().is_bound()
    }

    pub fn status(&self) -> SessionStatus {
        if self.closed {
            SessionStatus::Closed
        } else if !self.is_bound() {
            SessionStatus::Unbound
        } else if self.is_timed_out(0) {
            SessionStatus::TimedOut
        } else {
            SessionStatus::Open
        }
    }

    /// Binds this handle to a new unique token and stores it.
    ///
    /// If the handle is already bound, the old session is closed first (a
    /// token rotation). Candidate tokens that collide with a stored entry
    /// are discarded and regenerated, up to the store's attempt limit.
    pub fn open(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if self.is_bound() {
            debug!(token = token_prefix(self.token()), "rotating bound session");
            close_record(self.handler.as_ref(), &self.record);
        }

        let now = self.handler.now();
        self.record = self.record.blank(now);

        let attempts = self.handler.max_token_attempts().max(1);
        for attempt in 1..=attempts {
            let candidate = self.handler.generate_token();
            if candidate.is_empty() {
                warn!(attempt, "token generator returned an empty token");
                continue;
            }
            self.record.core_mut().bind(candidate, now);
            if self.handler.reserve_session(&self.record) {
                info!(token = token_prefix(self.token()), attempt, "session opened");
                return Ok(());
            }
            warn!(
                token = token_prefix(self.token()),
                attempt, "token collision, regenerating"
            );
            self.record.core_mut().unbind();
        }

        self.record.core_mut().unbind();
        warn!(attempts, "gave up generating a unique token");
        Err(SessionError::TokenExhausted { attempts })
    }

    /// Refreshes `update_time` and stores a copy of the current state.
    ///
    /// Fails with [`SessionError::NotOpen`] if the stored session is gone
    /// (closed through another handle or reclaimed by the sweeper). The
    /// handle is then unbound; the store is left untouched.
    pub fn update(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if !self.is_bound() {
            return Err(SessionError::NotOpen);
        }
        let now = self.handler.now();
        self.record.core_mut().touch(now);
        if !self.handler.refresh_session(&self.record) {
            debug!(token = token_prefix(self.token()), "session gone from store, unbinding");
            self.record.core_mut().unbind();
            return Err(SessionError::NotOpen);
        }
        Ok(())
    }

    /// Replaces this handle's state with the stored session under `token`
    /// and refreshes it.
    ///
    /// Returns `false` (leaving the handle as it was) when the token is
    /// empty, unknown, or its session has timed out, or when the session
    /// closes between the lookup and the refresh.
    pub fn load(&mut self, token: &str) -> bool {
        if self.closed || token.is_empty() {
            return false;
        }
        let Some(stored) = self.handler.load_session(token) else {
            debug!(token = token_prefix(token), "no loadable session");
            return false;
        };
        let previous = std::mem::replace(&mut self.record, stored);
        if self.update().is_ok() {
            return true;
        }
        self.record = previous;
        false
    }

    /// Closes the session: removes it from the store, then runs close
    /// callbacks and clears roles.
    ///
    /// Returns `true` if this call did the closing. Closing an unbound
    /// handle, or one whose entry the sweeper already reclaimed, still
    /// makes the handle terminal but returns `false`.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        close_record(self.handler.as_ref(), &self.record)
    }

    pub fn is_timed_out(&self, extra_secs: i64) -> bool {
        self.record.core().is_timed_out(self.handler.now(), extra_secs)
    }

    pub fn is_valid(&self) -> bool {
        self.record.core().is_valid(self.handler.now())
    }

    pub fn is_garbage(&self) -> bool {
        self.record.is_garbage(self.handler.now())
    }

    pub fn roles(&self) -> &Arc<dyn RoleContainer> {
        self.record.core().roles()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.record.snapshot()
    }

    /// How to hand the token back to the client, or `None` while unbound.
    pub fn placement(&self) -> Option<TokenPlacement> {
        if self.closed || !self.is_bound() {
            return None;
        }
        let core = self.record.core();
        Some(core.transport().place(core.token_label(), core.token()))
    }

    pub fn record(&self) -> &R {
        &self.record
    }
}

impl Session<CachedRecord> {
    pub fn read(&self, key: &str) -> Option<String> {
        self.record.read(key)
    }

    pub fn write(&self, key: &str, value: &str) {
        self.record.write(key, value);
    }

    pub fn destroy(&self, key: &str) -> bool {
        self.record.destroy(key)
    }
}

impl<R: SessionRecord> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("record", &self.record)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use latchkey_protocol::TokenTransport;

    use super::*;
    use crate::{
        Clock, CloseCallbacks, ManualClock, PlainRecord, SessionSettings, SharedMapStore, StoreSettings,
    };

    struct Fixture {
        store: Arc<SharedMapStore<PlainRecord>>,
        clock: Arc<ManualClock>,
        callbacks: Arc<CloseCallbacks>,
        settings: SessionSettings,
    }

    impl Fixture {
        fn new(timeout_secs: i64) -> Self {
            let clock = Arc::new(ManualClock::at_secs(0));
            let store = SharedMapStore::builder()
                .settings(StoreSettings::manual())
                .clock(clock.clone())
                .build();
            Self {
                store,
                clock,
                callbacks: Arc::new(CloseCallbacks::new()),
                settings: SessionSettings::default().with_timeout_secs(timeout_secs),
            }
        }

        fn session(&self) -> Session<PlainRecord> {
            let record = PlainRecord::new(&self.settings, self.callbacks.clone(), self.clock.now());
            Session::new(record, self.store.clone())
        }

        fn close_counter(&self) -> Arc<AtomicUsize> {
            let count = Arc::new(AtomicUsize::new(0));
            let inner = count.clone();
            self.callbacks.add("count", move |_snap: &SessionSnapshot| {
                inner.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            count
        }
    }

    // =====================================================================
    // open
    // =====================================================================

    #[test]
    fn test_open_binds_and_stores() {
        let fx = Fixture::new(60);
        let mut session = fx.session();
        assert_eq!(session.status(), SessionStatus::Unbound);

        session.open().unwrap();

        assert_eq!(session.status(), SessionStatus::Open);
        assert_eq!(session.token().len(), 32);
        assert!(fx.store.session_exists(session.token()));
        assert!(!session.is_timed_out(0));
    }

    #[test]
    fn test_open_on_bound_session_rotates_token() {
        let fx = Fixture::new(60);
        let closes = fx.close_counter();
        let mut session = fx.session();
        session.open().unwrap();
        let old = session.token().to_string();
        session.roles().add("admin");

        session.open().unwrap();

        assert_ne!(session.token(), old);
        assert!(!fx.store.session_exists(&old));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(session.roles().names().is_empty());
        assert_eq!(fx.store.len(), 1);
    }

    #[test]
    fn test_open_after_close_is_rejected() {
        let fx = Fixture::new(60);
        let mut session = fx.session();
        session.open().unwrap();
        session.close();

        assert!(matches!(session.open(), Err(SessionError::Closed)));
        assert_eq!(session.status(), SessionStatus::Closed);
    }

    // =====================================================================
    // update / load
    // =====================================================================

    #[test]
    fn test_update_requires_open_session() {
        let fx = Fixture::new(60);
        let mut session = fx.session();

        assert!(matches!(session.update(), Err(SessionError::NotOpen)));
    }

    #[test]
    fn test_update_refreshes_stored_copy() {
        let fx = Fixture::new(60);
        let mut session = fx.session();
        session.open().unwrap();

        fx.clock.advance_secs(50);
        session.update().unwrap();
        fx.clock.advance_secs(50);

        let stored = fx.store.load_session(session.token()).expect("still valid");
        assert_eq!(stored.core().update_time(), session.record().core().update_time());
    }

    #[test]
    fn test_load_known_token_brings_session_to_open() {
        let fx = Fixture::new(60);
        let mut first = fx.session();
        first.open().unwrap();
        first.roles().add("reader");

        fx.clock.advance_secs(30);
        let mut second = fx.session();
        assert!(second.load(first.token()));

        assert_eq!(second.token(), first.token());
        assert_eq!(second.status(), SessionStatus::Open);
        assert!(second.roles().contains("reader"));
        assert_eq!(second.record().core().update_time(), fx.clock.now());
    }

    #[test]
    fn test_load_unknown_or_empty_token_leaves_session_unbound() {
        let fx = Fixture::new(60);
        let mut session = fx.session();

        assert!(!session.load(""));
        assert!(!session.load("nope"));
        assert_eq!(session.status(), SessionStatus::Unbound);
    }

    #[test]
    fn test_load_timed_out_token_is_not_found() {
        let fx = Fixture::new(60);
        let mut first = fx.session();
        first.open().unwrap();

        fx.clock.advance_secs(61);
        assert_eq!(first.status(), SessionStatus::TimedOut);

        let mut second = fx.session();
        assert!(!second.load(first.token()));
    }

    #[test]
    fn test_update_after_close_elsewhere_does_not_resurrect() {
        let fx = Fixture::new(60);
        let closes = fx.close_counter();
        let mut first = fx.session();
        first.open().unwrap();
        let token = first.token().to_string();
        let mut second = fx.session();
        assert!(second.load(&token));

        assert!(first.close());
        assert!(matches!(second.update(), Err(SessionError::NotOpen)));

        assert!(!fx.store.session_exists(&token));
        assert!(fx.store.is_empty());
        assert_eq!(second.status(), SessionStatus::Unbound);
        assert!(!second.close());
        assert_eq!(fx.store.clean_sessions(), 0);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_after_sweep_reclaimed_session_is_not_open() {
        let fx = Fixture::new(60);
        let closes = fx.close_counter();
        let mut session = fx.session();
        session.open().unwrap();
        let token = session.token().to_string();

        fx.clock.advance_secs(61);
        assert_eq!(fx.store.clean_sessions(), 1);

        assert!(matches!(session.update(), Err(SessionError::NotOpen)));
        assert!(!fx.store.session_exists(&token));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_load_into_bound_handle_keeps_state_when_token_unknown() {
        let fx = Fixture::new(60);
        let mut session = fx.session();
        session.open().unwrap();
        let token = session.token().to_string();

        assert!(!session.load("nope"));

        assert_eq!(session.token(), token);
        assert_eq!(session.status(), SessionStatus::Open);
    }

    // =====================================================================
    // close
    // =====================================================================

    #[test]
    fn test_close_runs_callbacks_clears_roles_and_removes_entry() {
        let fx = Fixture::new(60);
        let closes = fx.close_counter();
        let mut session = fx.session();
        session.open().unwrap();
        let roles = Arc::clone(session.roles());
        roles.add("admin");

        assert!(session.close());

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(roles.names().is_empty());
        assert!(fx.store.is_empty());
    }

    #[test]
    fn test_close_twice_fires_callbacks_once() {
        let fx = Fixture::new(60);
        let closes = fx.close_counter();
        let mut session = fx.session();
        session.open().unwrap();

        assert!(session.close());
        assert!(!session.close());

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_from_two_handles_fires_callbacks_once() {
        let fx = Fixture::new(60);
        let closes = fx.close_counter();
        let mut first = fx.session();
        first.open().unwrap();
        let mut second = fx.session();
        assert!(second.load(first.token()));

        assert!(first.close());
        assert!(!second.close());

        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_unbound_session_is_terminal_without_callbacks() {
        let fx = Fixture::new(60);
        let closes = fx.close_counter();
        let mut session = fx.session();

        assert!(!session.close());

        assert_eq!(session.status(), SessionStatus::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    // =====================================================================
    // placement
    // =====================================================================

    #[test]
    fn test_placement_uses_configured_transport_and_label() {
        let mut fx = Fixture::new(60);
        fx.settings = fx
            .settings
            .clone()
            .with_transport(TokenTransport::Query)
            .with_token_label("sid");
        let mut session = fx.session();
        assert!(session.placement().is_none());

        session.open().unwrap();

        match session.placement() {
            Some(TokenPlacement::Query { pair }) => {
                assert_eq!(pair, format!("sid={}", session.token()));
            }
            other => panic!("expected query placement, got {other:?}"),
        }
    }
}
