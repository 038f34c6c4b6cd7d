//! The storage capability every session depends on.
//!
//! Sessions never touch a map directly. They talk to a [`SessionHandler`],
//! which decides where sessions live. [`SharedMapStore`] is the in-process
//! implementation; anything else (a shared cache, a database) would
//! implement the same trait.
//!
//! [`SharedMapStore`]: crate::SharedMapStore

use chrono::{DateTime, Utc};
use latchkey_protocol::token_prefix;
use tracing::{info, trace};

use crate::SessionRecord;

/// Storage operations for sessions of type `R`.
///
/// All operations are synchronous and cheap. Implementations must make the
/// per-token operations linearizable: once `save_session` returns, every
/// later `load_session` or `session_exists` for that token, from any
/// thread, sees the save (or something newer).
pub trait SessionHandler<R: SessionRecord>: Send + Sync {
    /// Whether an entry exists for `token`, valid or not.
    fn session_exists(&self, token: &str) -> bool;

    /// A new candidate token. Not checked for uniqueness.
    fn generate_token(&self) -> String;

    /// A copy of the stored session, if present *and valid*.
    ///
    /// Timed-out entries still waiting for the sweeper load as `None`.
    fn load_session(&self, token: &str) -> Option<R>;

    /// Stores `record` only if no entry exists under its token.
    ///
    /// Returns `false` on collision (or an unbound record). This is the
    /// check-and-insert `open` relies on to keep tokens unique.
    fn reserve_session(&self, record: &R) -> bool;

    /// Inserts or replaces the entry under the record's token. No-op for
    /// an unbound record.
    fn save_session(&self, record: &R);

    /// Replaces the entry under the record's token only if one exists.
    ///
    /// Returns `false` when the entry is gone (closed or reclaimed in the
    /// meantime). Existing handles refresh through this, so a stale handle
    /// can never bring a closed session back.
    fn refresh_session(&self, record: &R) -> bool;

    /// Removes the entry under the record's token. Returns `true` if an
    /// entry was removed.
    fn delete_session(&self, record: &R) -> bool;

    /// Closes every garbage session once. Returns how many were closed.
    fn clean_sessions(&self) -> usize;

    /// Current time according to the store's clock.
    fn now(&self) -> DateTime<Utc>;

    /// How many tokens `open` may try before giving up.
    fn max_token_attempts(&self) -> u32;
}

/// Removes `record` from the store and runs its teardown.
///
/// The store entry is removed *first*: whoever removes it owns the
/// teardown, so callbacks fire exactly once even when an explicit logout
/// races the sweeper. If the entry is already gone nothing happens.
///
/// After removal: close callbacks with a snapshot, then roles are
/// cleared, then the variant's own `on_close`.
pub fn close_record<R: SessionRecord>(handler: &dyn SessionHandler<R>, record: &R) -> bool {
    let core = record.core();
    if !core.is_bound() {
        return false;
    }
    if !handler.delete_session(record) {
        trace!(token = token_prefix(core.token()), "close skipped, entry already gone");
        return false;
    }

    let snapshot = record.snapshot();
    let failures = core.callbacks().call_all(&snapshot);
    core.roles().remove_all();
    record.on_close();

    info!(token = token_prefix(core.token()), failures, "session closed");
    true
}
