//! The fields every session carries, and the timeout rules over them.
//!
//! A session is "stale" once more than `timeout_secs` seconds have passed
//! since its `update_time`:
//!
//! ```text
//!   update_time            update_time + timeout          + extra (grace)
//!        │───────── valid ─────────│──── timed out, kept ─────│── garbage ──→
//! ```
//!
//! A negative timeout switches expiry off entirely: the session is valid
//! until someone closes it.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use latchkey_protocol::{SessionSnapshot, TokenTransport};

use crate::{CloseCallbacks, RoleContainer, RoleFactory, SessionSettings};

/// Base state shared by every session variant.
///
/// Cloning is cheap-ish: strings are copied, roles and callbacks are
/// shared through `Arc`. Every copy of one session (the caller's and the
/// store's) therefore sees the same roles.
#[derive(Clone)]
pub struct SessionCore {
    token: String,
    update_time: DateTime<Utc>,
    timeout_secs: i64,
    extra_timeout_secs: i64,
    token_label: String,
    transport: TokenTransport,
    roles: Arc<dyn RoleContainer>,
    callbacks: Arc<CloseCallbacks>,
    role_factory: RoleFactory,
}

impl SessionCore {
    /// An unbound core configured from `settings`.
    pub fn new(
        settings: &SessionSettings,
        callbacks: Arc<CloseCallbacks>,
        role_factory: RoleFactory,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token: String::new(),
            update_time: now,
            timeout_secs: settings.timeout_secs,
            // A grace window only ever delays reclamation.
            extra_timeout_secs: settings.extra_timeout_secs.max(0),
            token_label: settings.token_label.clone(),
            transport: settings.transport,
            roles: role_factory(),
            callbacks,
            role_factory,
        }
    }

    /// Same configuration, no token, empty roles.
    pub fn blank(&self, now: DateTime<Utc>) -> Self {
        Self {
            token: String::new(),
            update_time: now,
            roles: (self.role_factory)(),
            ..self.clone()
        }
    }

    /// Empty when the session is unbound.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_bound(&self) -> bool {
        !self.token.is_empty()
    }

    pub fn update_time(&self) -> DateTime<Utc> {
        self.update_time
    }

    pub fn timeout_secs(&self) -> i64 {
        self.timeout_secs
    }

    pub fn extra_timeout_secs(&self) -> i64 {
        self.extra_timeout_secs
    }

    pub fn token_label(&self) -> &str {
        &self.token_label
    }

    pub fn transport(&self) -> TokenTransport {
        self.transport
    }

    pub fn roles(&self) -> &Arc<dyn RoleContainer> {
        &self.roles
    }

    pub fn callbacks(&self) -> &Arc<CloseCallbacks> {
        &self.callbacks
    }

    /// Whether more than `timeout + extra_secs` seconds passed since the
    /// last update. Always `false` for a negative timeout.
    pub fn is_timed_out(&self, now: DateTime<Utc>, extra_secs: i64) -> bool {
        if self.timeout_secs < 0 {
            return false;
        }
        let limit = self.timeout_secs.saturating_add(extra_secs);
        match TimeDelta::try_seconds(limit) {
            Some(limit) => now.signed_duration_since(self.update_time) > limit,
            // Beyond chrono's range: effectively never.
            None => false,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_timed_out(now, 0)
    }

    /// Timed out by more than the grace window.
    pub fn is_garbage(&self, now: DateTime<Utc>) -> bool {
        self.is_timed_out(now, self.extra_timeout_secs)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.token.clone(),
            update_time: self.update_time,
            timeout_secs: self.timeout_secs,
            token_label: self.token_label.clone(),
            transport: self.transport,
            roles: self.roles.names(),
        }
    }

    pub(crate) fn bind(&mut self, token: String, now: DateTime<Utc>) {
        self.token = token;
        self.update_time = now;
    }

    pub(crate) fn unbind(&mut self) {
        self.token.clear();
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.update_time = now;
    }
}

impl fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCore")
            .field("token", &latchkey_protocol::token_prefix(&self.token))
            .field("update_time", &self.update_time)
            .field("timeout_secs", &self.timeout_secs)
            .field("extra_timeout_secs", &self.extra_timeout_secs)
            .field("token_label", &self.token_label)
            .field("transport", &self.transport)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}
