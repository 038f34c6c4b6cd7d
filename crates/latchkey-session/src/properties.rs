//! Property lookup and the settings derived from it.
//!
//! Sessions and stores are configured from flat `name -> string`
//! properties, typically an application config file or the environment.
//! Values are read once, at construction. Anything missing, empty or
//! unparsable falls back to a default; a bad value is logged but never
//! surfaced as an error, because a typo in a timeout must not take the
//! login path down.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

use latchkey_protocol::TokenTransport;
use latchkey_sweep::SweepConfig;
use tracing::warn;

// ---------------------------------------------------------------------------
// Property names and defaults
// ---------------------------------------------------------------------------

/// Property names understood by [`SessionSettings`] and [`StoreSettings`].
pub mod keys {
    /// Name of the cookie, query parameter or JSON field carrying the token.
    pub const TOKEN_LABEL: &str = "session_token_label";
    /// `cookie`, `query` or `json`.
    pub const TOKEN_TRANSPORT: &str = "session_token_support";
    /// Seconds of inactivity before a session times out. Negative: never.
    pub const TIMEOUT: &str = "session_timeout";
    /// Seconds between background sweeps. Negative: no background sweeping.
    /// Values below [`StoreSettings::MIN_CLEAN_INTERVAL_SECS`] are raised to it.
    pub const CLEAN_INTERVAL: &str = "session_clean_frequency";
    /// Grace seconds after timeout before a session counts as garbage.
    pub const EXTRA_TIMEOUT: &str = "session_clean_extra_timeout";
    /// Length of generated tokens.
    pub const TOKEN_LENGTH: &str = "session_token_length";
    /// Collision retries before giving up on `open`.
    pub const TOKEN_ATTEMPTS: &str = "session_token_attempts";
}

/// Fallback values for every property.
pub mod defaults {
    use latchkey_protocol::TokenTransport;

    pub const TOKEN_LABEL: &str = "token";
    pub const TOKEN_TRANSPORT: TokenTransport = TokenTransport::Cookie;
    pub const TIMEOUT_SECS: i64 = 3_600;
    pub const CLEAN_INTERVAL_SECS: f64 = 60.0;
    pub const EXTRA_TIMEOUT_SECS: i64 = 0;
    pub const TOKEN_LENGTH: usize = 32;
    pub const TOKEN_ATTEMPTS: u32 = 8;
}

// ---------------------------------------------------------------------------
// PropertySource
// ---------------------------------------------------------------------------

/// Looks up a configuration property by name.
///
/// Returning `Some("")` is treated the same as `None`.
pub trait PropertySource: Send + Sync {
    fn property(&self, name: &str) -> Option<String>;
}

impl PropertySource for HashMap<String, String> {
    fn property(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl PropertySource for BTreeMap<String, String> {
    fn property(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<T: PropertySource + ?Sized> PropertySource for &T {
    fn property(&self, name: &str) -> Option<String> {
        (**self).property(name)
    }
}

/// A source with nothing in it: every setting takes its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProperties;

impl PropertySource for NoProperties {
    fn property(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Reads properties from environment variables.
///
/// `session_timeout` with prefix `LATCHKEY_` is looked up as
/// `LATCHKEY_SESSION_TIMEOUT`.
#[derive(Debug, Clone)]
pub struct EnvProperties {
    prefix: String,
}

impl EnvProperties {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name).to_ascii_uppercase()
    }
}

impl Default for EnvProperties {
    fn default() -> Self {
        Self::with_prefix("LATCHKEY_")
    }
}

impl PropertySource for EnvProperties {
    fn property(&self, name: &str) -> Option<String> {
        std::env::var(self.var_name(name)).ok()
    }
}

/// Consults the first source, then the second for anything the first
/// does not define.
#[derive(Debug, Clone)]
pub struct Layered<A, B>(pub A, pub B);

impl<A: PropertySource, B: PropertySource> PropertySource for Layered<A, B> {
    fn property(&self, name: &str) -> Option<String> {
        lookup(&self.0, name).or_else(|| lookup(&self.1, name))
    }
}

/// Trimmed, non-empty value of a property.
fn lookup(props: &dyn PropertySource, name: &str) -> Option<String> {
    props
        .property(name)
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parses a property, logging and falling back to `default` on failure.
fn parse_or<T: FromStr>(props: &dyn PropertySource, name: &str, default: T) -> T {
    match lookup(props, name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(property = name, value = %raw, "unparsable property, using default");
            default
        }),
    }
}

// ---------------------------------------------------------------------------
// SessionSettings
// ---------------------------------------------------------------------------

/// Per-session configuration, shared by every session of one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Seconds of inactivity before a session times out. Negative values
    /// mean the session never times out.
    pub timeout_secs: i64,

    /// Grace window: a timed-out session stays in the store for this many
    /// extra seconds before the sweeper treats it as garbage. It is not
    /// loadable during that window.
    pub extra_timeout_secs: i64,

    /// Name the token travels under at the boundary.
    pub token_label: String,

    /// Where the token travels.
    pub transport: TokenTransport,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::TIMEOUT_SECS,
            extra_timeout_secs: defaults::EXTRA_TIMEOUT_SECS,
            token_label: defaults::TOKEN_LABEL.to_string(),
            transport: defaults::TOKEN_TRANSPORT,
        }
    }
}

impl SessionSettings {
    /// Reads every session property, using defaults for anything missing
    /// or malformed.
    pub fn from_properties(props: &dyn PropertySource) -> Self {
        let transport = match lookup(props, keys::TOKEN_TRANSPORT) {
            None => defaults::TOKEN_TRANSPORT,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(property = keys::TOKEN_TRANSPORT, error = %e, "using default transport");
                defaults::TOKEN_TRANSPORT
            }),
        };

        Self {
            timeout_secs: parse_or(props, keys::TIMEOUT, defaults::TIMEOUT_SECS),
            extra_timeout_secs: parse_or(props, keys::EXTRA_TIMEOUT, defaults::EXTRA_TIMEOUT_SECS),
            token_label: lookup(props, keys::TOKEN_LABEL)
                .unwrap_or_else(|| defaults::TOKEN_LABEL.to_string()),
            transport,
        }
        .validated()
    }

    pub fn with_timeout_secs(mut self, secs: i64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_extra_timeout_secs(mut self, secs: i64) -> Self {
        self.extra_timeout_secs = secs;
        self
    }

    pub fn with_token_label(mut self, label: impl Into<String>) -> Self {
        self.token_label = label.into();
        self
    }

    pub fn with_transport(mut self, transport: TokenTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Clamps values that would break the garbage rule.
    ///
    /// A negative grace window would make valid sessions collectable, so
    /// it is raised to zero.
    pub fn validated(mut self) -> Self {
        if self.extra_timeout_secs < 0 {
            warn!(
                extra_timeout_secs = self.extra_timeout_secs,
                "negative grace window, using 0"
            );
            self.extra_timeout_secs = 0;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// StoreSettings
// ---------------------------------------------------------------------------

/// Store-wide configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    /// Seconds between background sweeps; negative disables the loop.
    /// [`validated`](Self::validated) raises `0..MIN_CLEAN_INTERVAL_SECS`
    /// to the minimum.
    pub clean_interval_secs: f64,
    /// Characters per generated token.
    pub token_length: usize,
    /// How many tokens `open` tries before failing with
    /// [`SessionError::TokenExhausted`](crate::SessionError::TokenExhausted).
    pub token_attempts: u32,
    /// Random delay added before the first sweep.
    pub sweep_jitter: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            clean_interval_secs: defaults::CLEAN_INTERVAL_SECS,
            token_length: defaults::TOKEN_LENGTH,
            token_attempts: defaults::TOKEN_ATTEMPTS,
            sweep_jitter: Duration::ZERO,
        }
    }
}

impl StoreSettings {
    /// Longest token the store will ask for.
    pub const MAX_TOKEN_LENGTH: usize = 512;
    /// Shortest pause between two background sweeps.
    pub const MIN_CLEAN_INTERVAL_SECS: f64 = 1.0;

    pub fn from_properties(props: &dyn PropertySource) -> Self {
        Self {
            clean_interval_secs: parse_or(
                props,
                keys::CLEAN_INTERVAL,
                defaults::CLEAN_INTERVAL_SECS,
            ),
            token_length: parse_or(props, keys::TOKEN_LENGTH, defaults::TOKEN_LENGTH),
            token_attempts: parse_or(props, keys::TOKEN_ATTEMPTS, defaults::TOKEN_ATTEMPTS),
            sweep_jitter: Duration::ZERO,
        }
        .validated()
    }

    /// Settings with background sweeping turned off.
    pub fn manual() -> Self {
        Self {
            clean_interval_secs: -1.0,
            ..Default::default()
        }
    }

    pub fn with_clean_interval_secs(mut self, secs: f64) -> Self {
        self.clean_interval_secs = secs;
        self
    }

    pub fn with_token_length(mut self, length: usize) -> Self {
        self.token_length = length;
        self
    }

    pub fn with_token_attempts(mut self, attempts: u32) -> Self {
        self.token_attempts = attempts;
        self
    }

    pub fn with_sweep_jitter(mut self, jitter: Duration) -> Self {
        self.sweep_jitter = jitter;
        self
    }

    /// Clamps out-of-range values so the settings are safe to use.
    ///
    /// - `clean_interval_secs`, when not negative, is at least
    ///   `MIN_CLEAN_INTERVAL_SECS`.
    /// - `token_length` is kept within `1..=MAX_TOKEN_LENGTH`.
    /// - `token_attempts` is at least 1.
    pub fn validated(mut self) -> Self {
        if (0.0..Self::MIN_CLEAN_INTERVAL_SECS).contains(&self.clean_interval_secs) {
            warn!(
                clean_interval_secs = self.clean_interval_secs,
                min = Self::MIN_CLEAN_INTERVAL_SECS,
                "sweep interval too short, raising to the minimum"
            );
            self.clean_interval_secs = Self::MIN_CLEAN_INTERVAL_SECS;
        }
        if self.token_length == 0 || self.token_length > Self::MAX_TOKEN_LENGTH {
            let clamped = self.token_length.clamp(1, Self::MAX_TOKEN_LENGTH);
            warn!(
                token_length = self.token_length,
                clamped, "token length out of range, clamping"
            );
            self.token_length = clamped;
        }
        if self.token_attempts == 0 {
            warn!("token attempts must be at least 1");
            self.token_attempts = 1;
        }
        self
    }

    /// The background loop configuration these settings describe.
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig::from_secs_f64(self.clean_interval_secs).with_initial_jitter(self.sweep_jitter)
    }
}
