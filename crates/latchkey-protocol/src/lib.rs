//! Boundary types for Latchkey sessions.
//!
//! The session core never parses requests or writes responses. What it
//! does hand across that boundary lives here:
//!
//! - **Types** ([`SessionSnapshot`], [`TokenTransport`], [`TokenPlacement`]):
//!   the final state of a session as seen by close callbacks, and a
//!   description of where a freshly issued token has to be written.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): turns snapshots into bytes
//!   for audit logs or hand-off to other services.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Request boundary (cookie / query / json) → token string → Session core
//! Session core → TokenPlacement → response boundary
//! Session core → SessionSnapshot → close callbacks
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{SessionSnapshot, TokenPlacement, TokenTransport, token_prefix};
