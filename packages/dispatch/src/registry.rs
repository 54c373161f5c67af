//! Thread registry for naming threads in diagnostics.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use parking_lot::RwLock;

/// Maps thread identities to human-readable names.
///
/// Only used for logs and events; nothing in the scheduling path depends
/// on a thread being registered.
pub struct ThreadRegistry {
    names: RwLock<HashMap<ThreadId, String>>,
}

impl ThreadRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Register a name for a thread.
    pub fn register(&self, id: ThreadId, name: impl Into<String>) {
        self.names.write().insert(id, name.into());
    }

    /// Register a name for the calling thread.
    pub fn register_current(&self, name: impl Into<String>) {
        self.register(thread::current().id(), name);
    }

    /// Remove a thread from the registry.
    pub fn unregister(&self, id: ThreadId) {
        self.names.write().remove(&id);
    }

    /// Get the registered name of a thread.
    pub fn name_of(&self, id: ThreadId) -> Option<String> {
        self.names.read().get(&id).cloned()
    }

    /// Name of the calling thread.
    ///
    /// Falls back to the OS thread name, then to `"unnamed"`.
    pub fn current_name(&self) -> String {
        let current = thread::current();
        self.name_of(current.id())
            .or_else(|| current.name().map(str::to_string))
            .unwrap_or_else(|| "unnamed".to_string())
    }

    /// List all registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.read().values().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}
