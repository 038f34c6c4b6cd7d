//! # Latchkey
//!
//! Token-addressed session management.
//!
//! Latchkey keeps track of who is logged in: it issues unique session
//! tokens, refreshes sessions as requests present their token, expires
//! them after a configurable timeout, and reclaims expired sessions in the
//! background, firing close callbacks exactly once per session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use latchkey::prelude::*;
//!
//! # async fn run() -> Result<(), LatchkeyError> {
//! latchkey::telemetry::init();
//!
//! let service = SessionService::builder()
//!     .properties(EnvProperties::default())
//!     .build_plain();
//!
//! // Per request: resolve the presented token (or open a new session).
//! let (session, _how) = service.begin(None)?;
//! if let Some(placement) = session.placement() {
//!     println!("{placement:?}");
//! }
//!
//! service.shutdown().await
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate               | Role                                           |
//! |---------------------|------------------------------------------------|
//! | `latchkey-protocol` | snapshots, token placement, codecs             |
//! | `latchkey-sweep`    | the periodic reclamation task                  |
//! | `latchkey-session`  | sessions, store, settings, roles, callbacks    |
//! | `latchkey`          | this facade: one error type, service builder   |

mod error;
mod service;
pub mod telemetry;

pub use error::LatchkeyError;
pub use service::{ServiceStatus, SessionService, SessionServiceBuilder};

pub use latchkey_protocol as protocol;
pub use latchkey_session as session;
pub use latchkey_sweep as sweep;

/// Everything a typical application needs, in one import.
pub mod prelude {
    pub use crate::{LatchkeyError, ServiceStatus, SessionService, SessionServiceBuilder};
    pub use latchkey_protocol::{
        Codec, JsonCodec, SessionSnapshot, TokenPlacement, TokenTransport, token_prefix,
    };
    pub use latchkey_session::{
        Acquired, CachedRecord, CallbackError, CloseCallbacks, EnvProperties, Layered,
        MemoryCache, NoProperties, PlainRecord, PropertySource, RoleContainer, Session,
        SessionError, SessionStatus, Sessions, StoreSettings, keys,
    };
}
