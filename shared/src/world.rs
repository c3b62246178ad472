//! Entity storage shared by host and client.
//!
//! A [`World`] owns every local entity, an index from tag to entities that is
//! kept up to date on spawn and despawn, and the [`EntityRegistry`] that maps
//! network ids onto local handles.

use crate::components::{ComponentSnapshot, Components};
use crate::entity::{EntityHandle, NetworkEntityId, PlayerId, Tag};
use crate::prefab::PrefabKind;
use crate::registry::{EntityRegistry, EntityResolver};
use crate::snapshot::SnapshotError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct Entity {
    pub name: &'static str,
    pub tags: Vec<Tag>,
    /// Set for entities created from a prefab.
    pub prefab: Option<PrefabKind>,
    pub components: Components,
}

impl Entity {
    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Full replicated state of one networked entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: NetworkEntityId,
    pub prefab: PrefabKind,
    pub components: Vec<ComponentSnapshot>,
}

#[derive(Debug, Default)]
pub struct World {
    entities: BTreeMap<EntityHandle, Entity>,
    next_handle: u32,
    tags: HashMap<Tag, BTreeSet<EntityHandle>>,
    registry: EntityRegistry,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a local entity. It is not visible to any other peer.
    pub fn spawn(&mut self, name: &'static str, tags: &[Tag], components: Components) -> EntityHandle {
        let handle = EntityHandle(self.next_handle);
        self.next_handle += 1;

        for tag in tags {
            self.tags.entry(*tag).or_default().insert(handle);
        }
        self.entities.insert(
            handle,
            Entity {
                name,
                tags: tags.to_vec(),
                prefab: None,
                components,
            },
        );
        handle
    }

    /// Instantiates `prefab` and binds it to `id` in the registry.
    pub fn spawn_networked(&mut self, id: NetworkEntityId, prefab: PrefabKind) -> EntityHandle {
        let handle = self.spawn(prefab.name(), prefab.tags(), prefab.instantiate());
        if let Some(entity) = self.entities.get_mut(&handle) {
            entity.prefab = Some(prefab);
        }
        self.registry.register(id, handle);
        handle
    }

    /// Removes an entity, its tag index entries and its registry binding.
    ///
    /// Players holding the removed entity lose the reference, so no component
    /// is left pointing at a dead handle.
    pub fn despawn(&mut self, handle: EntityHandle) -> Option<Entity> {
        let entity = self.entities.remove(&handle)?;

        for tag in &entity.tags {
            if let Some(set) = self.tags.get_mut(tag) {
                set.remove(&handle);
            }
        }
        if let Some(id) = self.registry.network_id_of(handle) {
            self.registry.unregister(id);
        }
        for other in self.entities.values_mut() {
            if let Some(player) = other.components.player.as_mut() {
                if player.held_ball == Some(handle) {
                    player.held_ball = None;
                }
            }
        }

        Some(entity)
    }

    pub fn despawn_networked(&mut self, id: NetworkEntityId) -> Option<Entity> {
        let handle = self.registry.lookup(id)?;
        self.despawn(handle)
    }

    pub fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        self.entities.get(&handle)
    }

    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        self.entities.get_mut(&handle)
    }

    /// All entities carrying `tag`, in creation order.
    pub fn with_tag(&self, tag: Tag) -> Vec<EntityHandle> {
        self.tags
            .get(&tag)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn lookup(&self, id: NetworkEntityId) -> Option<EntityHandle> {
        self.registry.lookup(id)
    }

    pub fn network_id_of(&self, handle: EntityHandle) -> Option<NetworkEntityId> {
        self.registry.network_id_of(handle)
    }

    /// Handle of the player entity owned by `player_id`.
    pub fn player_entity(&self, player_id: PlayerId) -> Option<EntityHandle> {
        self.with_tag(Tag::Player).into_iter().find(|handle| {
            self.get(*handle)
                .and_then(|entity| entity.components.player.as_ref())
                .map_or(false, |player| player.id == player_id)
        })
    }

    /// Player currently holding `ball`, if any.
    pub fn holder_of(&self, ball: EntityHandle) -> Option<EntityHandle> {
        self.with_tag(Tag::Player).into_iter().find(|handle| {
            self.get(*handle)
                .and_then(|entity| entity.components.player.as_ref())
                .map_or(false, |player| player.held_ball == Some(ball))
        })
    }

    /// Snapshot of one networked entity.
    pub fn capture(&self, handle: EntityHandle) -> Option<EntitySnapshot> {
        let entity = self.entities.get(&handle)?;
        let id = self.registry.network_id_of(handle)?;
        let prefab = entity.prefab?;

        Some(EntitySnapshot {
            id,
            prefab,
            components: entity.components.capture(&self.registry),
        })
    }

    /// Snapshots of every networked entity, ordered by network id.
    pub fn capture_all(&self) -> Vec<EntitySnapshot> {
        let mut ids: Vec<NetworkEntityId> = self.registry.ids().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| self.registry.lookup(id))
            .filter_map(|handle| self.capture(handle))
            .collect()
    }

    /// Applies a received entity snapshot, creating the entity from its prefab
    /// when the id is not known yet.
    pub fn apply_snapshot(&mut self, snapshot: &EntitySnapshot) -> Result<EntityHandle, SnapshotError> {
        let handle = match self.registry.lookup(snapshot.id) {
            Some(handle) => handle,
            None => self.spawn_networked(snapshot.id, snapshot.prefab),
        };

        if let Some(entity) = self.entities.get_mut(&handle) {
            entity
                .components
                .apply(&snapshot.components, &self.registry)?;
        }
        Ok(handle)
    }
}
