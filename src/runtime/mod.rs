//! Entity runtime and public API
//!
//! This module provides the `Runtime` handle that spawns entities, and the
//! building blocks entities are made of: handles, contexts, liveness
//! watches, timers, child tables, and the path directory.

use std::sync::Arc;

// Submodules
pub mod actor;
pub mod config;
pub mod directory;
pub mod error;
pub mod probe;
pub mod registry;

use actor::spawn_entity;
use directory::Directory;

/// Handle to a running entity runtime
///
/// Cheap to clone. Every entity spawned through the same runtime shares one
/// path directory. Spawning requires a tokio runtime to be current.
#[derive(Clone)]
pub struct Runtime {
    directory: Arc<Directory>,
}

impl Runtime {
    /// Create a runtime with an empty directory
    pub fn new() -> Self {
        Self {
            directory: Arc::new(Directory::new()),
        }
    }

    /// Spawn a top-level entity registered under `path`
    pub fn spawn<E: Entity>(&self, path: impl Into<String>, entity: E) -> ActorRef<E::Message> {
        spawn_entity(&self.directory, path.into(), true, entity)
    }

    /// Spawn a top-level entity that is not entered in the directory
    pub fn spawn_anonymous<E: Entity>(
        &self,
        path: impl Into<String>,
        entity: E,
    ) -> ActorRef<E::Message> {
        spawn_entity(&self.directory, path.into(), false, entity)
    }

    /// Resolve a live entity by path
    ///
    /// Returns `None` for unknown paths, exited entities, or when the entity
    /// at `path` does not accept messages of type `M`.
    pub fn resolve<M: Send + 'static>(&self, path: &str) -> Option<ActorRef<M>> {
        self.directory.resolve(path)
    }

    /// Get the path directory
    pub fn directory(&self) -> &Directory {
        &self.directory
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

// Re-export commonly used types
pub use actor::{ActorId, ActorRef, Context, Entity, Reply, ReplyTo, TimerHandle};
pub use probe::Probe;
pub use registry::ChildRegistry;
pub use config::RuntimeConfig;
pub use error::{ActorError, ActorResult, AskError, Result, RuntimeError};
