use std::collections::HashMap;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{AuthError, AuthResult};

/// Name-keyed plugin table. Entries are collected while open; `seal` freezes
/// them into a read-only map exactly once, after which lookups are lock-free
/// and registration fails.
pub struct Registry<V> {
    kind: &'static str,
    pending: Mutex<HashMap<String, V>>,
    sealed: OnceCell<HashMap<String, V>>,
}

impl<V: Clone> Registry<V> {
    pub fn new(kind: &'static str) -> Self {
        Self { kind, pending: Mutex::new(HashMap::new()), sealed: OnceCell::new() }
    }

    pub fn kind(&self) -> &'static str { self.kind }

    /// Bind `name`. An existing binding is never replaced.
    pub fn register(&self, name: &str, value: V) -> AuthResult<()> {
        let mut pending = self.pending.lock();
        // Checked under the lock so a concurrent seal cannot drop the entry.
        if self.sealed.get().is_some() {
            return Err(AuthError::RegistryFrozen { kind: self.kind.to_string(), name: name.to_string() });
        }
        if pending.contains_key(name) {
            return Err(AuthError::DuplicatePluginName { kind: self.kind.to_string(), name: name.to_string() });
        }
        pending.insert(name.to_string(), value);
        debug!(target: "meshgate::registry", kind = self.kind, plugin = name, "registered");
        Ok(())
    }

    /// Freeze the registry. Returns true for the one caller that sealed it.
    pub fn seal(&self) -> bool {
        let mut pending = self.pending.lock();
        if self.sealed.get().is_some() { return false; }
        let frozen = std::mem::take(&mut *pending);
        let count = frozen.len();
        let won = self.sealed.set(frozen).is_ok();
        if won {
            info!(target: "meshgate::registry", kind = self.kind, plugins = count, "sealed");
        }
        won
    }

    pub fn is_sealed(&self) -> bool { self.sealed.get().is_some() }

    pub fn lookup(&self, name: &str) -> AuthResult<V> {
        let Some(map) = self.sealed.get() else {
            return Err(AuthError::NotInitialized { kind: self.kind.to_string() });
        };
        map.get(name)
            .cloned()
            .ok_or_else(|| AuthError::UnknownPlugin { kind: self.kind.to_string(), name: name.to_string() })
    }

    /// Registered names, sorted. Works before and after sealing.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.sealed.get() {
            Some(map) => map.keys().cloned().collect(),
            None => self.pending.lock().keys().cloned().collect(),
        };
        names.sort();
        names
    }
}
