//! Entry point for request handling: hands out session handles.
//!
//! A [`Sessions`] holds a store and a prototype record carrying the
//! variant's configuration. Every handle it creates starts as a blank copy
//! of the prototype, so settings are read from properties once rather than
//! on every request.

use std::sync::Arc;

use tracing::debug;

use crate::{
    CacheFactory, CachedRecord, CloseCallbacks, PlainRecord, PropertySource, Session,
    SessionError, SessionHandler, SessionRecord, SessionSettings,
};

/// How [`Sessions::load_or_open`] obtained its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// The presented token resolved to a live session.
    Loaded,
    /// No usable token; a new session was opened.
    Opened,
}

/// Factory for session handles of one variant over one store.
pub struct Sessions<R: SessionRecord> {
    handler: Arc<dyn SessionHandler<R>>,
    prototype: R,
}

impl<R: SessionRecord> Sessions<R> {
    pub fn new(handler: Arc<dyn SessionHandler<R>>, prototype: R) -> Self {
        Self { handler, prototype }
    }

    /// A fresh unbound handle.
    pub fn unbound(&self) -> Session<R> {
        let record = self.prototype.blank(self.handler.now());
        Session::new(record, Arc::clone(&self.handler))
    }

    /// A handle bound to a newly opened session.
    pub fn open(&self) -> Result<Session<R>, SessionError> {
        let mut session = self.unbound();
        session.open()?;
        Ok(session)
    }

    /// A handle for the live session under `token`, refreshed.
    pub fn load(&self, token: &str) -> Option<Session<R>> {
        let mut session = self.unbound();
        session.load(token).then_some(session)
    }

    /// Resolves the token a request presented, opening a new session when
    /// there is none or it no longer resolves.
    pub fn load_or_open(&self, token: Option<&str>) -> Result<(Session<R>, Acquired), SessionError> {
        if let Some(session) = token.and_then(|t| self.load(t)) {
            return Ok((session, Acquired::Loaded));
        }
        if token.is_some_and(|t| !t.is_empty()) {
            debug!("presented token did not resolve, opening a new session");
        }
        Ok((self.open()?, Acquired::Opened))
    }

    /// The close callbacks shared by every session this factory creates.
    pub fn close_callbacks(&self) -> &Arc<CloseCallbacks> {
        self.prototype.core().callbacks()
    }

    pub fn handler(&self) -> &Arc<dyn SessionHandler<R>> {
        &self.handler
    }
}

impl Sessions<PlainRecord> {
    /// Plain sessions configured from `props`.
    pub fn plain(
        handler: Arc<dyn SessionHandler<PlainRecord>>,
        props: &dyn PropertySource,
        callbacks: Arc<CloseCallbacks>,
    ) -> Self {
        let settings = SessionSettings::from_properties(props);
        let prototype = PlainRecord::new(&settings, callbacks, handler.now());
        Self::new(handler, prototype)
    }
}

impl Sessions<CachedRecord> {
    /// Cache-backed sessions configured from `props`, each with its own
    /// scratch space from `cache_factory`.
    pub fn cached(
        handler: Arc<dyn SessionHandler<CachedRecord>>,
        props: &dyn PropertySource,
        callbacks: Arc<CloseCallbacks>,
        cache_factory: CacheFactory,
    ) -> Self {
        let settings = SessionSettings::from_properties(props);
        let prototype = CachedRecord::new(&settings, callbacks, cache_factory, handler.now());
        Self::new(handler, prototype)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{MemoryCache, SessionStatus, SharedMapStore, StoreSettings, keys};

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn plain(pairs: &[(&str, &str)]) -> Sessions<PlainRecord> {
        let store = SharedMapStore::<PlainRecord>::new(StoreSettings::manual());
        Sessions::plain(store, &props(pairs), Arc::new(CloseCallbacks::new()))
    }

    #[test]
    fn test_plain_reads_settings_from_properties() {
        let sessions = plain(&[(keys::TIMEOUT, "120"), (keys::TOKEN_LABEL, "sid")]);

        let session = sessions.open().unwrap();

        assert_eq!(session.record().core().timeout_secs(), 120);
        assert_eq!(session.record().core().token_label(), "sid");
    }

    #[test]
    fn test_load_or_open_without_token_opens() {
        let sessions = plain(&[]);

        let (session, how) = sessions.load_or_open(None).unwrap();

        assert_eq!(how, Acquired::Opened);
        assert_eq!(session.status(), SessionStatus::Open);
    }

    #[test]
    fn test_load_or_open_with_live_token_loads() {
        let sessions = plain(&[]);
        let first = sessions.open().unwrap();

        let (second, how) = sessions.load_or_open(Some(first.token())).unwrap();

        assert_eq!(how, Acquired::Loaded);
        assert_eq!(second.token(), first.token());
    }

    #[test]
    fn test_load_or_open_with_stale_token_opens_new() {
        let sessions = plain(&[]);

        let (session, how) = sessions.load_or_open(Some("forged")).unwrap();

        assert_eq!(how, Acquired::Opened);
        assert_ne!(session.token(), "forged");
    }

    #[test]
    fn test_unbound_handles_do_not_share_roles() {
        let sessions = plain(&[]);
        let a = sessions.unbound();
        let b = sessions.unbound();

        a.roles().add("admin");

        assert!(!b.roles().contains("admin"));
    }

    #[test]
    fn test_cached_sessions_share_scratch_space_across_loads() {
        let store = SharedMapStore::<CachedRecord>::new(StoreSettings::manual());
        let sessions = Sessions::cached(
            store,
            &props(&[]),
            Arc::new(CloseCallbacks::new()),
            MemoryCache::factory(),
        );
        let first = sessions.open().unwrap();
        first.write("cart", "2");

        let second = sessions.load(first.token()).unwrap();

        assert_eq!(second.read("cart").as_deref(), Some("2"));
        assert_eq!(sessions.open().unwrap().read("cart"), None);
    }
}
