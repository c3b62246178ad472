//! Replica world
//!
//! The client never simulates. It applies whatever the host sends: creation
//! and destruction events, remote calls and full world snapshots. Level
//! geometry is rebuilt locally from the level index, so platforms never cross
//! the wire.

use log::{debug, info, warn};
use shared::components::PlayerState;
use shared::level::{self, Level};
use shared::snapshot::SnapshotError;
use shared::{
    EntityHandle, EntitySnapshot, NetworkEntityId, Packet, PlayerId, RemoteCall, RemoteMethod, Tag,
    World,
};
use std::collections::{HashSet, VecDeque};

/// How many remote call sequence numbers are remembered for duplicate
/// detection.
const SEEN_CALL_CAPACITY: usize = 256;

/// A one-shot animation trigger addressed to a local entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Animation {
    pub target: EntityHandle,
    pub method: RemoteMethod,
}

pub struct ClientGame {
    world: World,
    player_id: Option<PlayerId>,
    current_level_index: Option<usize>,
    current_level: Option<Level>,
    camera_y_max: Option<f32>,
    last_tick: Option<u32>,
    seen_calls: VecDeque<u64>,
    seen_set: HashSet<u64>,
    animations: Vec<Animation>,
    load_count: u32,
}

impl ClientGame {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            player_id: None,
            current_level_index: None,
            current_level: None,
            camera_y_max: None,
            last_tick: None,
            seen_calls: VecDeque::with_capacity(SEEN_CALL_CAPACITY),
            seen_set: HashSet::with_capacity(SEEN_CALL_CAPACITY),
            animations: Vec::new(),
            load_count: 0,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn set_player_id(&mut self, player_id: PlayerId) {
        self.player_id = Some(player_id);
    }

    pub fn current_level(&self) -> Option<&Level> {
        self.current_level.as_ref()
    }

    pub fn current_level_index(&self) -> Option<usize> {
        self.current_level_index
    }

    pub fn camera_y_max(&self) -> Option<f32> {
        self.camera_y_max
    }

    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }

    /// Number of level loads that actually rebuilt the scene.
    pub fn load_count(&self) -> u32 {
        self.load_count
    }

    pub fn apply_packet(&mut self, packet: Packet) -> Result<(), SnapshotError> {
        match packet {
            Packet::Connected { player_id } => {
                self.player_id = Some(player_id);
                Ok(())
            }
            Packet::EntityCreated { id, prefab } => {
                if self.world.lookup(id).is_none() {
                    self.world.spawn_networked(id, prefab);
                }
                Ok(())
            }
            Packet::EntityDestroyed { id } => {
                self.world.despawn_networked(id);
                Ok(())
            }
            Packet::Call(call) => {
                self.handle_call(call);
                Ok(())
            }
            Packet::WorldSnapshot {
                tick,
                level_index,
                entities,
                ..
            } => self.apply_world_snapshot(tick, level_index, &entities),
            other => {
                debug!("Ignoring packet {:?}", other);
                Ok(())
            }
        }
    }

    fn handle_call(&mut self, call: RemoteCall) {
        if self.seen_set.contains(&call.seq) {
            debug!("Dropping duplicate call {}", call.seq);
            return;
        }
        if self.seen_calls.len() == SEEN_CALL_CAPACITY {
            if let Some(oldest) = self.seen_calls.pop_front() {
                self.seen_set.remove(&oldest);
            }
        }
        self.seen_calls.push_back(call.seq);
        self.seen_set.insert(call.seq);

        match call.method {
            RemoteMethod::LoadLevel { level_index } => {
                self.load_level(level_index as usize);
            }
            method => match self.world.lookup(call.target) {
                Some(target) => self.animations.push(Animation { target, method }),
                None => debug!("{} for unknown entity {}", method.name(), call.target),
            },
        }
    }

    fn apply_world_snapshot(
        &mut self,
        tick: u32,
        level_index: Option<u32>,
        entities: &[EntitySnapshot],
    ) -> Result<(), SnapshotError> {
        if let Some(last) = self.last_tick {
            if tick < last {
                debug!("Dropping stale snapshot {} (last {})", tick, last);
                return Ok(());
            }
        }
        self.last_tick = Some(tick);

        if let Some(index) = level_index {
            self.load_level(index as usize);
        }

        // Create first so references between entities of this snapshot
        // resolve regardless of order.
        for snapshot in entities {
            if self.world.lookup(snapshot.id).is_none() {
                self.world.spawn_networked(snapshot.id, snapshot.prefab);
            }
        }

        let mut first_error = None;
        for snapshot in entities {
            if let Err(e) = self.world.apply_snapshot(snapshot) {
                warn!("Failed to apply snapshot for {}: {}", snapshot.id, e);
                first_error.get_or_insert(e);
            }
        }

        let present: HashSet<NetworkEntityId> = entities.iter().map(|s| s.id).collect();
        let missing: Vec<NetworkEntityId> = self
            .world
            .registry()
            .ids()
            .filter(|id| !present.contains(id))
            .collect();
        for id in missing {
            debug!("{} no longer present, removing", id);
            self.world.despawn_networked(id);
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Rebuilds the level geometry. Loading the level that is already
    /// current does nothing and returns false.
    pub fn load_level(&mut self, index: usize) -> bool {
        if self.current_level_index == Some(index) {
            return false;
        }
        let Some(level) = level::level(index) else {
            warn!("Host asked for unknown level {}", index);
            return false;
        };

        level::load_platforms(&mut self.world, &level);
        self.camera_y_max = Some(level.camera_y_max());
        self.current_level = Some(level);
        self.current_level_index = Some(index);
        self.load_count += 1;

        info!("Loaded level {}", index + 1);
        true
    }

    pub fn local_player(&self) -> Option<EntityHandle> {
        self.player_id.and_then(|id| self.world.player_entity(id))
    }

    pub fn player_state(&self, handle: EntityHandle) -> Option<&PlayerState> {
        self.world
            .get(handle)
            .and_then(|entity| entity.components.player.as_ref())
    }

    /// Scores ordered by slot.
    pub fn scores(&self) -> Vec<(PlayerId, u32)> {
        let mut players: Vec<&PlayerState> = self
            .world
            .with_tag(Tag::Player)
            .into_iter()
            .filter_map(|handle| self.player_state(handle))
            .collect();
        players.sort_by_key(|player| player.slot_position);
        players
            .into_iter()
            .map(|player| (player.id, player.score))
            .collect()
    }

    pub fn take_animations(&mut self) -> Vec<Animation> {
        std::mem::take(&mut self.animations)
    }

    /// Clamps a camera center so the bottom edge of a view `view_height` tall
    /// stays above the level's camera bound.
    pub fn clamp_camera_y(&self, center_y: f32, view_height: f32) -> f32 {
        match self.camera_y_max {
            Some(max) => center_y.min(max - view_height / 2.0),
            None => center_y,
        }
    }
}

impl Default for ClientGame {
    fn default() -> Self {
        Self::new()
    }
}
