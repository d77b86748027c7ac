//! User registry
//!
//! The single source of truth for who is online: a concurrency-safe mapping
//! from display name to session handle. All operations are short critical
//! sections with no I/O inside, so a stalled socket can never hold up a
//! registration. Message delivery always happens on a snapshot taken after
//! the lock is released.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::error::ChatError;
use crate::session::SessionHandle;

/// Concurrency-safe name → session mapping
///
/// Names are case-sensitive and unique among live sessions. Entries are
/// non-owning: removing one only makes the user undiscoverable, the
/// connection itself belongs to its handler task.
#[derive(Debug, Default)]
pub struct Registry {
    inner: Mutex<HashMap<String, SessionHandle>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check-and-insert a name
    ///
    /// Fails with `InvalidName` for empty or whitespace-only names and with
    /// `NameTaken` if another live session already holds the name.
    pub fn register(&self, name: &str, handle: SessionHandle) -> Result<(), ChatError> {
        if name.trim().is_empty() {
            return Err(ChatError::InvalidName(name.to_string()));
        }

        let mut inner = self.lock();
        match inner.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ChatError::NameTaken(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                debug!("registered '{}', {} online", name, inner.len());
                Ok(())
            }
        }
    }

    /// Remove a name; idempotent, a no-op if the name is absent
    ///
    /// Returns whether the name was present.
    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let removed = inner.remove(name).is_some();
        if removed {
            debug!("unregistered '{}', {} online", name, inner.len());
        }
        removed
    }

    /// Look up the session holding a name
    pub fn lookup(&self, name: &str) -> Option<SessionHandle> {
        self.lock().get(name).cloned()
    }

    /// Sorted snapshot of all current names at a single point in time
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Atomic snapshot of every entry, for fan-out delivery
    pub fn snapshot(&self) -> Vec<(String, SessionHandle)> {
        self.lock()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect()
    }

    /// Number of registered users
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nobody is registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.inner.lock().expect("registry lock poisoned")
    }
}
