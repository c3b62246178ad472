//! Session controller
//!
//! Owns the player roster and the current level, and orchestrates everything
//! that happens when either changes: spawning and despawning player entities,
//! tearing down and rebuilding the level, and telling clients which level to
//! load.
//!
//! Level loading is idempotent by index. Every join re-broadcasts the current
//! level so the joining peer can load it; peers that already have it ignore
//! the call, and the host ignores its own copy the same way.

use crate::replicator::HostReplicator;
use crate::slots::{PlayerSlot, SlotError, SlotManager};
use log::{debug, info, warn};
use shared::level::{self, Level};
use shared::{EntityHandle, NetworkEntityId, PlayerId, PrefabKind, RemoteMethod, Tag, World};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No level has been loaded yet.
    Uninitialized,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Slot(#[from] SlotError),
    #[error("no level with index {0}")]
    UnknownLevel(usize),
}

pub struct SessionController {
    phase: SessionPhase,
    session_entity: EntityHandle,
    session_id: NetworkEntityId,
    slots: SlotManager,
    current_level: Option<Level>,
    current_level_index: Option<usize>,
    camera_y_max: Option<f32>,
}

impl SessionController {
    /// Creates the networked session entity that remote calls are addressed to.
    pub fn new(world: &mut World, replicator: &mut HostReplicator) -> Self {
        Self::with_slots(world, replicator, SlotManager::new())
    }

    pub fn with_slots(world: &mut World, replicator: &mut HostReplicator, slots: SlotManager) -> Self {
        let (session_entity, session_id) = replicator.create(world, PrefabKind::Session);

        Self {
            phase: SessionPhase::Uninitialized,
            session_entity,
            session_id,
            slots,
            current_level: None,
            current_level_index: None,
            camera_y_max: None,
        }
    }

    /// Loads the first level.
    pub fn start(&mut self, world: &mut World, replicator: &mut HostReplicator) -> Result<(), SessionError> {
        self.load_level(0, world, replicator)?;
        Ok(())
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session_entity(&self) -> EntityHandle {
        self.session_entity
    }

    pub fn session_id(&self) -> NetworkEntityId {
        self.session_id
    }

    pub fn current_level(&self) -> Option<&Level> {
        self.current_level.as_ref()
    }

    pub fn current_level_index(&self) -> Option<usize> {
        self.current_level_index
    }

    /// Lowest y the camera may scroll to for the current level.
    pub fn camera_y_max(&self) -> Option<f32> {
        self.camera_y_max
    }

    pub fn slots(&self) -> &SlotManager {
        &self.slots
    }

    /// Handles a new peer: takes a slot, re-broadcasts the current level and
    /// spawns the player's entity.
    ///
    /// When every slot is taken the join is rejected and nothing changes.
    pub fn on_player_joined(
        &mut self,
        player: PlayerId,
        world: &mut World,
        replicator: &mut HostReplicator,
    ) -> Result<PlayerSlot, SessionError> {
        let slot = self.slots.add_player(player)?;

        if let Some(index) = self.current_level_index {
            replicator.send_remote_call(
                self.session_id,
                RemoteMethod::LoadLevel {
                    level_index: index as u32,
                },
            );
        }

        if world.player_entity(player).is_none() {
            self.spawn_player(player, slot, world, replicator);
        }
        Ok(slot)
    }

    /// Removes the player's entity and frees their slot. A ball the player
    /// was holding is dropped where the player was and stays in the world.
    pub fn on_player_left(&mut self, player: PlayerId, world: &mut World, replicator: &mut HostReplicator) -> bool {
        let mut removed = false;

        if let Some(handle) = world.player_entity(player) {
            release_held_ball(world, handle);
            removed = replicator.destroy(world, handle);
        }

        if self.slots.remove_player(player).is_some() {
            removed = true;
        }
        if removed {
            info!("{} left the session", player);
        }
        removed
    }

    /// Switches to level `index`. Returns `Ok(false)` without touching
    /// anything when it is already the current level.
    pub fn load_level(
        &mut self,
        index: usize,
        world: &mut World,
        replicator: &mut HostReplicator,
    ) -> Result<bool, SessionError> {
        if self.current_level_index == Some(index) {
            debug!("Level {} already loaded", index);
            return Ok(false);
        }
        let level = level::level(index).ok_or(SessionError::UnknownLevel(index))?;

        for handle in world.with_tag(Tag::Player) {
            replicator.destroy(world, handle);
        }
        for handle in world.with_tag(Tag::Ball) {
            replicator.destroy(world, handle);
        }

        level::load_platforms(world, &level);
        self.camera_y_max = Some(level.camera_y_max());
        self.current_level_index = Some(index);
        self.phase = SessionPhase::Active;

        replicator.send_remote_call(
            self.session_id,
            RemoteMethod::LoadLevel {
                level_index: index as u32,
            },
        );

        let (ball, _) = replicator.create(world, PrefabKind::Ball);
        if let Some(physical) = world
            .get_mut(ball)
            .and_then(|entity| entity.components.physical.as_mut())
        {
            physical.center = level.ball_spawn;
        }

        self.current_level = Some(level);
        for player in self.slots.assigned_player_ids() {
            if let Some(slot) = self.slots.slot_for(player) {
                self.spawn_player(player, slot, world, replicator);
            }
        }

        info!(
            "Loaded level {} with {} players",
            index,
            self.slots.len()
        );
        Ok(true)
    }

    /// Operator level selection: digit `n` loads level `n - 1`. Other keys and
    /// digits without a level are ignored.
    pub fn select_level_from_key(
        &mut self,
        key: char,
        world: &mut World,
        replicator: &mut HostReplicator,
    ) -> Result<bool, SessionError> {
        let digit = match key.to_digit(10) {
            Some(digit) if digit > 0 => digit as usize,
            _ => return Ok(false),
        };
        if digit > level::level_count() {
            warn!("No level bound to key {}", key);
            return Ok(false);
        }
        self.load_level(digit - 1, world, replicator)
    }

    fn spawn_player(
        &self,
        player: PlayerId,
        slot: PlayerSlot,
        world: &mut World,
        replicator: &mut HostReplicator,
    ) -> Option<EntityHandle> {
        let spawn = self.current_level.as_ref()?.spawn_for_slot(slot.position)?;

        let (handle, _) = replicator.create(world, PrefabKind::Player);
        if let Some(entity) = world.get_mut(handle) {
            if let Some(state) = entity.components.player.as_mut() {
                state.id = player;
                state.color = slot.color;
                state.spawn = spawn;
                state.slot_position = slot.position;
            }
            if let Some(physical) = entity.components.physical.as_mut() {
                physical.center = spawn;
            }
        }

        debug!("Spawned {} at ({}, {})", player, spawn.x, spawn.y);
        Some(handle)
    }
}

pub(crate) fn release_held_ball(world: &mut World, player: EntityHandle) {
    let Some((ball, center, vel)) = world.get(player).and_then(|entity| {
        let state = entity.components.player.as_ref()?;
        let physical = entity.components.physical.as_ref()?;
        Some((state.held_ball?, physical.center, state.vel))
    }) else {
        return;
    };

    if let Some(entity) = world.get_mut(ball) {
        if let Some(physical) = entity.components.physical.as_mut() {
            physical.center = center;
        }
        if let Some(ball_state) = entity.components.ball.as_mut() {
            ball_state.vel = vel;
        }
    }
    if let Some(state) = world
        .get_mut(player)
        .and_then(|entity| entity.components.player.as_mut())
    {
        state.held_ball = None;
    }
}
