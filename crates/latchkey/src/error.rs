//! Unified error type for Latchkey.

use latchkey_protocol::ProtocolError;
use latchkey_session::SessionError;
use latchkey_sweep::SweepError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `latchkey` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum LatchkeyError {
    /// Snapshot encoding or token transport parsing failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session could not be opened or updated.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The background sweep could not be stopped cleanly.
    #[error(transparent)]
    Sweep(#[from] SweepError),
}
