//! Id-keyed child tables shared by every registry level
//!
//! Supervisor, manager, and group registries all own a dynamic set of
//! children keyed by id. [`ChildRegistry`] keeps the forward (`id -> handle`)
//! and reverse (`handle -> id`) tables as one unit: every insert and remove
//! touches both, so they can never disagree. The tables live inside the
//! owning entity and are only mutated from its handlers.

use std::collections::{HashMap, HashSet};

use super::actor::{ActorId, ActorRef, Context};

/// Bidirectional child table owned by a registry entity
pub struct ChildRegistry<C: Send + 'static> {
    id_to_handle: HashMap<String, ActorRef<C>>,
    handle_to_id: HashMap<ActorRef<C>, String>,
}

impl<C: Send + 'static> ChildRegistry<C> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            id_to_handle: HashMap::new(),
            handle_to_id: HashMap::new(),
        }
    }

    /// Handle registered for `child_id`
    pub fn get(&self, child_id: &str) -> Option<&ActorRef<C>> {
        self.id_to_handle.get(child_id)
    }

    /// Id registered for the child with identity `handle`
    pub fn id_of(&self, handle: &ActorId) -> Option<&str> {
        self.handle_to_id.get(handle).map(String::as_str)
    }

    /// Map `child_id` to `handle`, dropping any previous mapping of either side
    pub fn insert(&mut self, child_id: String, handle: ActorRef<C>) {
        if let Some(previous) = self.id_to_handle.remove(&child_id) {
            self.handle_to_id.remove(&previous);
        }
        if let Some(previous_id) = self.handle_to_id.remove(&handle) {
            self.id_to_handle.remove(&previous_id);
        }

        self.handle_to_id.insert(handle.clone(), child_id.clone());
        self.id_to_handle.insert(child_id, handle);
    }

    /// Remove the child with identity `handle`; unknown handles are a no-op
    pub fn remove(&mut self, handle: &ActorId) -> Option<String> {
        let child_id = self.handle_to_id.remove(handle)?;
        self.id_to_handle.remove(&child_id);
        Some(child_id)
    }

    /// Return the live child for `child_id`, spawning and watching a new one if needed
    ///
    /// `spawn` runs only when no live child is registered. The new child is
    /// watched so that its exit reaches the registry as `on_exit(child id)`.
    pub fn get_or_spawn<M, S>(
        &mut self,
        ctx: &mut Context<M>,
        child_id: &str,
        spawn: S,
        on_exit: fn(ActorId) -> M,
    ) -> ActorRef<C>
    where
        M: Send + 'static,
        S: FnOnce(&mut Context<M>) -> ActorRef<C>,
    {
        if let Some(existing) = self.id_to_handle.get(child_id) {
            if existing.is_alive() {
                return existing.clone();
            }

            // Exited, but the notification has not been handled yet.
            let stale = existing.id();
            self.remove(&stale);
            ctx.unwatch(stale);
        }

        let child = spawn(ctx);
        ctx.watch(&child, on_exit);
        self.insert(child_id.to_string(), child.clone());
        child
    }

    /// Current set of child ids
    pub fn ids(&self) -> HashSet<String> {
        self.id_to_handle.keys().cloned().collect()
    }

    /// Point-in-time copy of the reverse table, for handing to a query coordinator
    pub fn snapshot(&self) -> HashMap<ActorRef<C>, String> {
        self.handle_to_id.clone()
    }

    /// Number of registered children
    pub fn len(&self) -> usize {
        self.id_to_handle.len()
    }

    /// Whether no child is registered
    pub fn is_empty(&self) -> bool {
        self.id_to_handle.is_empty()
    }

    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        self.id_to_handle.len() == self.handle_to_id.len()
            && self
                .id_to_handle
                .iter()
                .all(|(id, handle)| self.handle_to_id.get(handle) == Some(id))
    }
}

impl<C: Send + 'static> Default for ChildRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
