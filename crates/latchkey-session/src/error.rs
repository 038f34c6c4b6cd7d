//! Error types for the session layer.
//!
//! Most things that go wrong with a session are not errors at all: an
//! unknown or expired token simply loads nothing, and the caller opens a
//! fresh session. What remains is listed here.

/// Errors that can occur while driving a session through its lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Every generated token collided with a live session (or came back
    /// empty). Either the generator is broken or the token length is far
    /// too short for the number of live sessions.
    #[error("no unique session token after {attempts} attempts")]
    TokenExhausted { attempts: u32 },

    /// The session was closed. A closed session handle is terminal; build
    /// a new one to open another session.
    #[error("session is closed")]
    Closed,

    /// The operation needs a bound session, but this one has no token yet.
    #[error("session is not open")]
    NotOpen,
}
