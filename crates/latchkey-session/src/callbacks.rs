//! Callbacks fired when a session closes.
//!
//! Applications hook into session teardown here: release a lock held on
//! behalf of the user, write an audit record, notify another service.
//! Callbacks are registered by name and invoked in registration order with
//! a [`SessionSnapshot`] of the closing session.
//!
//! # Failure isolation
//!
//! A callback that returns an error or panics is logged and skipped; the
//! remaining callbacks still run, and the session is still torn down.
//!
//! # Re-entrancy
//!
//! The registry lock is released before any callback runs, and the store
//! lock is never held while closing. A callback may therefore register
//! other callbacks or open a new session without deadlocking.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use latchkey_protocol::{SessionSnapshot, token_prefix};
use parking_lot::RwLock;
use tracing::warn;

/// Error type close callbacks may return.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

type CloseFn = Arc<dyn Fn(&SessionSnapshot) -> Result<(), CallbackError> + Send + Sync>;

/// Ordered, named registry of close callbacks.
///
/// One registry is usually shared (through an `Arc`) by every session of a
/// variant, including the copies held by the store, so that the sweeper
/// fires the same callbacks as an explicit logout.
#[derive(Default)]
pub struct CloseCallbacks {
    entries: RwLock<Vec<(String, CloseFn)>>,
}

impl CloseCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` under `name`.
    ///
    /// Registering a name twice replaces the earlier callback but keeps its
    /// original position in the call order.
    pub fn add<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn(&SessionSnapshot) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let name = name.into();
        let callback: CloseFn = Arc::new(callback);
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = callback,
            None => entries.push((name, callback)),
        }
    }

    /// Unregisters a callback. Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| existing != name);
        entries.len() != before
    }

    /// Registered names in call order.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invokes every callback with `snapshot`, in registration order.
    ///
    /// Returns how many callbacks failed (error or panic).
    pub fn call_all(&self, snapshot: &SessionSnapshot) -> usize {
        // Copy the list so the lock is not held while user code runs.
        let entries: Vec<(String, CloseFn)> = self.entries.read().clone();
        let mut failures = 0;

        for (name, callback) in entries {
            match catch_unwind(AssertUnwindSafe(|| callback(snapshot))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(
                        callback = %name,
                        token = token_prefix(&snapshot.token),
                        error = %e,
                        "close callback failed"
                    );
                }
                Err(_) => {
                    failures += 1;
                    warn!(
                        callback = %name,
                        token = token_prefix(&snapshot.token),
                        "close callback panicked"
                    );
                }
            }
        }

        failures
    }
}

impl fmt::Debug for CloseCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseCallbacks")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use latchkey_protocol::TokenTransport;
    use parking_lot::Mutex;

    use super::*;

    fn snapshot(token: &str) -> SessionSnapshot {
        SessionSnapshot {
            token: token.into(),
            update_time: Utc::now(),
            timeout_secs: 60,
            token_label: "token".into(),
            transport: TokenTransport::Cookie,
            roles: Vec::new(),
        }
    }

    /// Builds a callback that appends `tag` to a shared log.
    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        tag: &'static str,
    ) -> impl Fn(&SessionSnapshot) -> Result<(), CallbackError> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |snap: &SessionSnapshot| {
            log.lock().push(format!("{tag}:{}", snap.token));
            Ok(())
        }
    }

    #[test]
    fn test_call_all_runs_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let callbacks = CloseCallbacks::new();
        callbacks.add("first", recorder(&log, "a"));
        callbacks.add("second", recorder(&log, "b"));
        callbacks.add("third", recorder(&log, "c"));

        let failures = callbacks.call_all(&snapshot("T"));

        assert_eq!(failures, 0);
        assert_eq!(*log.lock(), vec!["a:T", "b:T", "c:T"]);
    }

    #[test]
    fn test_add_same_name_replaces_in_place() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let callbacks = CloseCallbacks::new();
        callbacks.add("audit", recorder(&log, "old"));
        callbacks.add("metrics", recorder(&log, "m"));
        callbacks.add("audit", recorder(&log, "new"));

        callbacks.call_all(&snapshot("T"));

        assert_eq!(callbacks.names(), vec!["audit", "metrics"]);
        assert_eq!(*log.lock(), vec!["new:T", "m:T"]);
    }

    #[test]
    fn test_failing_callback_does_not_stop_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let callbacks = CloseCallbacks::new();
        callbacks.add("before", recorder(&log, "a"));
        callbacks.add("broken", |_snap: &SessionSnapshot| Err("disk full".into()));
        callbacks.add("after", recorder(&log, "b"));

        let failures = callbacks.call_all(&snapshot("T"));

        assert_eq!(failures, 1);
        assert_eq!(*log.lock(), vec!["a:T", "b:T"]);
    }

    #[test]
    fn test_panicking_callback_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let callbacks = CloseCallbacks::new();
        callbacks.add("panics", |_snap: &SessionSnapshot| -> Result<(), CallbackError> {
            panic!("callback bug")
        });
        callbacks.add("after", recorder(&log, "b"));

        let failures = callbacks.call_all(&snapshot("T"));

        assert_eq!(failures, 1);
        assert_eq!(*log.lock(), vec!["b:T"]);
    }

    #[test]
    fn test_callback_may_register_another_callback() {
        let callbacks = Arc::new(CloseCallbacks::new());
        let inner = Arc::clone(&callbacks);
        callbacks.add("registrar", move |_snap: &SessionSnapshot| {
            inner.add("late", |_snap: &SessionSnapshot| Ok(()));
            Ok(())
        });

        callbacks.call_all(&snapshot("T"));

        assert_eq!(callbacks.names(), vec!["registrar", "late"]);
    }

    #[test]
    fn test_remove_unregisters() {
        let callbacks = CloseCallbacks::new();
        callbacks.add("a", |_snap: &SessionSnapshot| Ok(()));

        assert!(callbacks.remove("a"));
        assert!(!callbacks.remove("a"));
        assert!(callbacks.is_empty());
        assert_eq!(callbacks.len(), 0);
    }
}
