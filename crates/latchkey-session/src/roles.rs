//! Role containers attached to sessions.
//!
//! The session layer doesn't decide what a role means. It only guarantees
//! that a session's roles are emptied when the session closes, so a
//! reclaimed token can never carry privileges into a later life.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A set of named roles, shared by every copy of one session.
pub trait RoleContainer: Send + Sync + fmt::Debug {
    fn add(&self, role: &str);

    /// Returns `true` if the role was present.
    fn remove(&self, role: &str) -> bool;

    fn contains(&self, role: &str) -> bool;

    /// Role names in sorted order.
    fn names(&self) -> Vec<String>;

    /// Drops every role. Called when the session closes.
    fn remove_all(&self);
}

/// Builds an empty container for a new session.
pub type RoleFactory = Arc<dyn Fn() -> Arc<dyn RoleContainer> + Send + Sync>;

/// In-memory roles with optional string properties per role.
#[derive(Debug, Default)]
pub struct MapRoles {
    roles: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl MapRoles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory producing a fresh `MapRoles` per session.
    pub fn factory() -> RoleFactory {
        Arc::new(|| Arc::new(MapRoles::new()) as Arc<dyn RoleContainer>)
    }

    /// Attaches a property to a role the session holds.
    ///
    /// Returns `false` (and stores nothing) if the role is absent.
    pub fn set_property(&self, role: &str, key: &str, value: &str) -> bool {
        match self.roles.lock().get_mut(role) {
            Some(props) => {
                props.insert(key.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn property(&self, role: &str, key: &str) -> Option<String> {
        self.roles.lock().get(role)?.get(key).cloned()
    }
}

impl RoleContainer for MapRoles {
    fn add(&self, role: &str) {
        self.roles.lock().entry(role.to_string()).or_default();
    }

    fn remove(&self, role: &str) -> bool {
        self.roles.lock().remove(role).is_some()
    }

    fn contains(&self, role: &str) -> bool {
        self.roles.lock().contains_key(role)
    }

    fn names(&self) -> Vec<String> {
        self.roles.lock().keys().cloned().collect()
    }

    fn remove_all(&self) {
        self.roles.lock().clear();
    }
}
