//! `SessionService` builder: one place that wires properties, store,
//! background sweep and the session factory together.
//!
//! ```text
//!  PropertySource ──→ StoreSettings ──→ SharedMapStore ──→ SweepHandle
//!        │                                   │
//!        └─────────→ SessionSettings ──→ Sessions<R> ──→ Session<R> per request
//! ```

use std::sync::Arc;

use latchkey_protocol::{Codec, SessionSnapshot};
use latchkey_session::{
    Acquired, CacheFactory, CachedRecord, CallbackError, CloseCallbacks, Clock, NoProperties,
    PlainRecord, PropertySource, Session, SessionRecord, Sessions, SharedMapStore, StoreSettings,
    TokenGenerator,
};
use serde::Serialize;
use tracing::info;

use crate::LatchkeyError;

/// Builder for a [`SessionService`].
///
/// # Example
///
/// ```rust,no_run
/// use latchkey::prelude::*;
///
/// # async fn run() -> Result<(), LatchkeyError> {
/// let service = SessionService::builder()
///     .properties(EnvProperties::default())
///     .on_close("audit", |snap| {
///         tracing::info!(token = token_prefix(&snap.token), "logged out");
///         Ok(())
///     })
///     .build_plain();
///
/// let (session, _) = service.begin(None)?;
/// # drop(session);
/// service.shutdown().await
/// # }
/// ```
pub struct SessionServiceBuilder {
    properties: Arc<dyn PropertySource>,
    store_settings: Option<StoreSettings>,
    callbacks: Arc<CloseCallbacks>,
    generator: Option<Arc<dyn TokenGenerator>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SessionServiceBuilder {
    /// Creates a builder where every setting takes its default.
    pub fn new() -> Self {
        Self {
            properties: Arc::new(NoProperties),
            store_settings: None,
            callbacks: Arc::new(CloseCallbacks::new()),
            generator: None,
            clock: None,
        }
    }

    /// Sets where session and store settings are read from.
    pub fn properties(mut self, properties: impl PropertySource + 'static) -> Self {
        self.properties = Arc::new(properties);
        self
    }

    /// Overrides the store settings read from properties.
    pub fn store_settings(mut self, settings: StoreSettings) -> Self {
        self.store_settings = Some(settings);
        self
    }

    /// Registers a close callback.
    pub fn on_close<F>(self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&SessionSnapshot) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.callbacks.add(name, callback);
        self
    }

    /// Registers a close callback that receives the snapshot encoded with
    /// `codec`.
    pub fn on_close_encoded<C, F>(self, name: impl Into<String>, codec: C, sink: F) -> Self
    where
        C: Codec,
        F: Fn(Vec<u8>) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.on_close(name, move |snapshot: &SessionSnapshot| {
            sink(codec.encode(snapshot)?)
        })
    }

    /// Replaces the random token generator.
    pub fn generator(mut self, generator: Arc<dyn TokenGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replaces the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds a service handing out plain sessions.
    ///
    /// Starts the background sweep if it is enabled and this is called
    /// inside a Tokio runtime.
    pub fn build_plain(self) -> SessionService<PlainRecord> {
        let store = self.build_store();
        let sessions = Sessions::plain(store.clone(), self.properties.as_ref(), self.callbacks);
        SessionService::new(store, sessions)
    }

    /// Builds a service handing out cache-backed sessions.
    pub fn build_cached(self, cache_factory: CacheFactory) -> SessionService<CachedRecord> {
        let store = self.build_store();
        let sessions = Sessions::cached(
            store.clone(),
            self.properties.as_ref(),
            self.callbacks,
            cache_factory,
        );
        SessionService::new(store, sessions)
    }

    fn build_store<R: SessionRecord>(&self) -> Arc<SharedMapStore<R>> {
        let settings = self
            .store_settings
            .clone()
            .unwrap_or_else(|| StoreSettings::from_properties(self.properties.as_ref()));

        let mut builder = SharedMapStore::<R>::builder().settings(settings);
        if let Some(generator) = &self.generator {
            builder = builder.generator(Arc::clone(generator));
        }
        if let Some(clock) = &self.clock {
            builder = builder.clock(Arc::clone(clock));
        }
        builder.build()
    }
}

impl Default for SessionServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of a service's store and sweep, suitable for a health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    pub sessions: usize,
    pub sweeping: bool,
    pub sweep_passes: u64,
    pub reclaimed: u64,
    pub overruns: u64,
}

/// A session store together with the factory for its sessions.
pub struct SessionService<R: SessionRecord> {
    store: Arc<SharedMapStore<R>>,
    sessions: Sessions<R>,
}

impl SessionService<PlainRecord> {
    pub fn builder() -> SessionServiceBuilder {
        SessionServiceBuilder::new()
    }
}

impl<R: SessionRecord> SessionService<R> {
    fn new(store: Arc<SharedMapStore<R>>, sessions: Sessions<R>) -> Self {
        info!(
            sweeping = store.is_sweeping(),
            token_length = store.settings().token_length,
            "session service ready"
        );
        Self { store, sessions }
    }

    pub fn sessions(&self) -> &Sessions<R> {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<SharedMapStore<R>> {
        &self.store
    }

    pub fn close_callbacks(&self) -> &Arc<CloseCallbacks> {
        self.sessions.close_callbacks()
    }

    /// Resolves the token a request presented, opening a session when it
    /// does not resolve. This is the usual start of request handling.
    pub fn begin(&self, token: Option<&str>) -> Result<(Session<R>, Acquired), LatchkeyError> {
        Ok(self.sessions.load_or_open(token)?)
    }

    pub fn status(&self) -> ServiceStatus {
        let stats = self.store.sweep_stats().unwrap_or_default();
        ServiceStatus {
            sessions: self.store.len(),
            sweeping: self.store.is_sweeping(),
            sweep_passes: stats.passes,
            reclaimed: stats.reclaimed,
            overruns: stats.overruns,
        }
    }

    /// Stops the background sweep. Live sessions stay in the store.
    pub async fn shutdown(&self) -> Result<(), LatchkeyError> {
        self.store.shutdown().await?;
        info!(remaining = self.store.len(), "session service stopped");
        Ok(())
    }
}
