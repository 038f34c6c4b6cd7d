//! Codec trait and implementations for serializing session snapshots.
//!
//! Close callbacks frequently need to ship a [`SessionSnapshot`] somewhere
//! else: an audit log, a message queue, another process that mirrors
//! logins. The [`Codec`] trait keeps that hand-off independent of the
//! serialization format.
//!
//! [`SessionSnapshot`]: crate::SessionSnapshot

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts serde-capable values to bytes and back.
///
/// `Send + Sync + 'static` because codecs are stored next to close
/// callbacks, which run on request threads and on the sweeper worker.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do
    /// not describe a `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// A snapshot encodes as a flat JSON object with the token, the last
/// update time and the role names.
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use latchkey_protocol::{Codec, JsonCodec, SessionSnapshot, TokenTransport};
///
/// let snapshot = SessionSnapshot {
///     token: "abc123".into(),
///     update_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
///     timeout_secs: 60,
///     token_label: "token".into(),
///     transport: TokenTransport::Cookie,
///     roles: vec!["admin".into()],
/// };
///
/// let bytes = JsonCodec.encode(&snapshot).unwrap();
/// let decoded: SessionSnapshot = JsonCodec.decode(&bytes).unwrap();
/// assert_eq!(snapshot, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl JsonCodec {
    /// Converts a value into a `serde_json::Value` tree instead of bytes.
    ///
    /// Handy for callbacks that want to merge the snapshot into a larger
    /// JSON document.
    pub fn to_value<T: Serialize>(&self, value: &T) -> Result<serde_json::Value, ProtocolError> {
        serde_json::to_value(value).map_err(ProtocolError::Encode)
    }
}

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
