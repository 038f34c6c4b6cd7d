//! Error types for the protocol layer.

/// Errors raised while encoding snapshots or interpreting boundary
/// configuration.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A value could not be serialized.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Bytes could not be turned back into the requested type.
    ///
    /// Usually malformed JSON or a snapshot written by an incompatible
    /// version.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A token transport name other than `cookie`, `query` or `json`.
    #[error("unknown token transport: {0:?}")]
    InvalidTransport(String),
}
