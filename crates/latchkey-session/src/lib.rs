//! Token-addressed sessions for Latchkey.
//!
//! This crate handles the lifecycle of a session from the first request
//! to its reclamation:
//!
//! 1. **Opening**: a unique token is generated and a session stored under it
//! 2. **Refreshing**: every request that presents the token loads and
//!    touches the session ([`Session::load`], [`Session::update`])
//! 3. **Closing**: on logout, or when the background sweep finds it
//!    expired, the session is removed and its close callbacks fire
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← extracts tokens from requests, calls Sessions
//!     ↕
//! Session Layer (this crate)  ← Session handles, SharedMapStore, settings
//!     ↕                 ↘
//! Protocol Layer        Sweep Layer  ← periodic reclamation task
//! ```
//!
//! # Quick look
//!
//! ```
//! use std::sync::Arc;
//! use latchkey_session::{CloseCallbacks, NoProperties, PlainRecord, Sessions, SharedMapStore, StoreSettings};
//!
//! let store = SharedMapStore::<PlainRecord>::new(StoreSettings::manual());
//! let sessions = Sessions::plain(store, &NoProperties, Arc::new(CloseCallbacks::new()));
//!
//! let mut session = sessions.open().unwrap();
//! let token = session.token().to_string();
//!
//! let again = sessions.load(&token).expect("live session");
//! assert_eq!(again.token(), token);
//!
//! assert!(session.close());
//! assert!(sessions.load(&token).is_none());
//! ```

mod cache;
mod callbacks;
mod clock;
mod error;
mod handler;
mod properties;
mod record;
mod roles;
mod session;
mod sessions;
mod state;
mod store;
mod token;

pub use cache::{CacheFactory, MemoryCache, SessionCache};
pub use callbacks::{CallbackError, CloseCallbacks};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SessionError;
pub use handler::{SessionHandler, close_record};
pub use properties::{
    EnvProperties, Layered, NoProperties, PropertySource, SessionSettings, StoreSettings,
    defaults, keys,
};
pub use record::{CachedRecord, PlainRecord, SessionRecord};
pub use roles::{MapRoles, RoleContainer, RoleFactory};
pub use session::{Session, SessionStatus};
pub use sessions::{Acquired, Sessions};
pub use state::SessionCore;
pub use store::{SharedMapStore, SharedMapStoreBuilder};
pub use token::{RandomTokenGenerator, TokenGenerator};
