//! Mapping between network ids and local entity handles.

use crate::entity::{EntityHandle, NetworkEntityId};
use std::collections::HashMap;

/// Resolves entity references embedded in snapshots.
///
/// Lookups may legitimately fail: a snapshot can reference an entity whose
/// creation has not reached this peer yet. Callers treat `None` as "no
/// reference" and pick it up again from a later snapshot.
pub trait EntityResolver {
    fn resolve(&self, id: NetworkEntityId) -> Option<EntityHandle>;
    fn network_id_of(&self, handle: EntityHandle) -> Option<NetworkEntityId>;
}

/// Bidirectional map between [`NetworkEntityId`]s and [`EntityHandle`]s.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    by_id: HashMap<NetworkEntityId, EntityHandle>,
    by_handle: HashMap<EntityHandle, NetworkEntityId>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `id` with `handle`, replacing any previous binding of either.
    pub fn register(&mut self, id: NetworkEntityId, handle: EntityHandle) {
        if let Some(old_handle) = self.by_id.insert(id, handle) {
            self.by_handle.remove(&old_handle);
        }
        if let Some(old_id) = self.by_handle.insert(handle, id) {
            if old_id != id {
                self.by_id.remove(&old_id);
            }
        }
    }

    pub fn lookup(&self, id: NetworkEntityId) -> Option<EntityHandle> {
        self.by_id.get(&id).copied()
    }

    /// Removes the binding for `id`. Returns the handle it pointed at.
    pub fn unregister(&mut self, id: NetworkEntityId) -> Option<EntityHandle> {
        let handle = self.by_id.remove(&id)?;
        self.by_handle.remove(&handle);
        Some(handle)
    }

    pub fn ids(&self) -> impl Iterator<Item = NetworkEntityId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl EntityResolver for EntityRegistry {
    fn resolve(&self, id: NetworkEntityId) -> Option<EntityHandle> {
        self.lookup(id)
    }

    fn network_id_of(&self, handle: EntityHandle) -> Option<NetworkEntityId> {
        self.by_handle.get(&handle).copied()
    }
}
