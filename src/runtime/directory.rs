//! Path directory for named entities
//!
//! Every named entity is entered under its hierarchical path when spawned and
//! removed when it exits, so callers can reach a device as
//! `/<system>/<manager>/<group>/<device>` without asking each registry on the
//! way down. The directory belongs to the runtime, never to an entity; entity
//! state is still only reachable through messages.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;

use super::actor::{ActorId, ActorRef};

struct DirectoryEntry {
    id: ActorId,
    handle: Box<dyn Any + Send + Sync>,
}

/// Runtime-wide map from entity path to type-erased handle
pub struct Directory {
    entries: RwLock<HashMap<String, DirectoryEntry>>,
}

impl Directory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Enter `handle` under its path, replacing any earlier instance at that path
    pub fn register<M: Send + 'static>(&self, handle: &ActorRef<M>) {
        let mut entries = self.entries.write();
        entries.insert(
            handle.path().to_string(),
            DirectoryEntry {
                id: handle.id(),
                handle: Box::new(handle.clone()),
            },
        );
    }

    /// Remove the entry at `path` if it still belongs to `id`
    pub fn unregister(&self, path: &str, id: ActorId) -> bool {
        let mut entries = self.entries.write();
        match entries.get(path) {
            Some(entry) if entry.id == id => {
                entries.remove(path);
                true
            }
            _ => false,
        }
    }

    /// Look up a live entity at `path` accepting messages of type `M`
    pub fn resolve<M: Send + 'static>(&self, path: &str) -> Option<ActorRef<M>> {
        let entries = self.entries.read();
        entries
            .get(path)
            .and_then(|entry| entry.handle.downcast_ref::<ActorRef<M>>())
            .filter(|handle| handle.is_alive())
            .cloned()
    }

    /// All registered paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let entries = self.entries.read();
        let mut paths: Vec<String> = entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}
