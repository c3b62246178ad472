//! Authoritative game simulation
//!
//! [`HostGame`] owns the host world together with the replicator and the
//! session controller, and advances the simulation one tick at a time:
//!
//! 1. Fold the inputs received since the last tick into each player's held keys
//! 2. Advance player timers, movement and throws
//! 3. Resolve player stomps and ball catches
//! 4. Move free balls; held balls follow their holder
//!
//! After a tick the network loop drains the replication events and then
//! broadcasts [`HostGame::snapshot_packet`], so every mutation of a tick is
//! visible in that tick's snapshot.

use crate::physics::{self, ball_bounds, penetration, player_bounds};
use crate::replicator::{HostReplicator, ReplicationEvent};
use crate::session::{release_held_ball, SessionController, SessionError};
use crate::slots::PlayerSlot;
use log::{debug, info};
use shared::components::LifeState;
use shared::math::Aabb;
use shared::{
    timestamp_millis, EntityHandle, InputState, Packet, PlayerId, RemoteMethod, Tag, Vec2, World,
};
use std::collections::{HashMap, HashSet};

/// Length of the death animation before a player respawns.
pub const DIE_TIME_MS: f32 = 1000.0;
/// Length of the spawn animation before a respawned player is live again.
pub const SPAWN_TIME_MS: f32 = 1000.0;
/// A player cannot catch for this long after throwing.
pub const CATCH_COOLDOWN_MS: f32 = 100.0;

/// Keys a player is holding, as of the newest input received.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeldKeys {
    pub left: bool,
    pub right: bool,
    pub throw_held: bool,
    /// Latched until the next tick consumes it.
    pub slam: bool,
    pub last_sequence: u32,
}

impl HeldKeys {
    fn x_direction(&self) -> f32 {
        let mut direction = 0.0;
        if self.right {
            direction += 1.0;
        }
        if self.left {
            direction -= 1.0;
        }
        direction
    }
}

pub struct HostGame {
    world: World,
    replicator: HostReplicator,
    session: SessionController,
    inputs: HashMap<PlayerId, HeldKeys>,
    tick: u32,
}

impl HostGame {
    /// Creates the session entity. Nothing is loaded until [`HostGame::start`].
    pub fn new() -> Self {
        let mut world = World::new();
        let mut replicator = HostReplicator::new();
        let session = SessionController::new(&mut world, &mut replicator);

        Self {
            world,
            replicator,
            session,
            inputs: HashMap::new(),
            tick: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.session.start(&mut self.world, &mut self.replicator)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn add_player(&mut self, player: PlayerId) -> Result<PlayerSlot, SessionError> {
        let slot = self
            .session
            .on_player_joined(player, &mut self.world, &mut self.replicator)?;
        self.inputs.entry(player).or_default();
        Ok(slot)
    }

    pub fn remove_player(&mut self, player: PlayerId) -> bool {
        self.inputs.remove(&player);
        self.session
            .on_player_left(player, &mut self.world, &mut self.replicator)
    }

    pub fn load_level(&mut self, index: usize) -> Result<bool, SessionError> {
        self.session
            .load_level(index, &mut self.world, &mut self.replicator)
    }

    pub fn select_level_from_key(&mut self, key: char) -> Result<bool, SessionError> {
        self.session
            .select_level_from_key(key, &mut self.world, &mut self.replicator)
    }

    /// Records an input from `player`. Inputs older than the newest one seen
    /// are ignored, except that a slam press is never lost.
    pub fn apply_input(&mut self, player: PlayerId, input: &InputState) -> bool {
        let keys = self.inputs.entry(player).or_default();
        keys.slam |= input.slam;

        if input.sequence <= keys.last_sequence && keys.last_sequence != 0 {
            return false;
        }

        keys.left = input.left;
        keys.right = input.right;
        keys.throw_held = input.throw_held;
        keys.last_sequence = input.sequence;
        true
    }

    pub fn held_keys(&self, player: PlayerId) -> Option<HeldKeys> {
        self.inputs.get(&player).copied()
    }

    /// Advances the simulation by `dt` milliseconds.
    pub fn update(&mut self, dt: f32) {
        self.tick = self.tick.wrapping_add(1);

        let platforms: Vec<Aabb> = self
            .world
            .with_tag(Tag::Platform)
            .into_iter()
            .filter_map(|handle| self.world.get(handle))
            .filter_map(|entity| entity.components.platform.as_ref())
            .map(|shape| shape.bounds())
            .collect();

        for handle in self.world.with_tag(Tag::Player) {
            self.update_player(handle, dt, &platforms);
        }
        self.resolve_player_contacts();
        self.update_catches();
        self.update_balls(dt, &platforms);

        for keys in self.inputs.values_mut() {
            keys.slam = false;
        }
    }

    fn update_player(&mut self, handle: EntityHandle, dt: f32, platforms: &[Aabb]) {
        let Some(entity) = self.world.get_mut(handle) else {
            return;
        };
        let components = &mut entity.components;
        let (Some(physical), Some(state)) = (components.physical.as_mut(), components.player.as_mut())
        else {
            return;
        };

        state.catch_cooldown_ms = (state.catch_cooldown_ms - dt).max(0.0);
        physics::update_slam(state, dt);

        match state.state {
            LifeState::Dead => {
                state.state_ms -= dt;
                if state.state_ms <= 0.0 {
                    physical.center = state.spawn;
                    state.vel = Vec2::ZERO;
                    state.state = LifeState::Spawning;
                    state.state_ms = SPAWN_TIME_MS;
                    debug!("{} respawning", state.id);
                    self.call(handle, RemoteMethod::AnimateSpawn);
                }
                return;
            }
            LifeState::Spawning => {
                state.state_ms -= dt;
                if state.state_ms <= 0.0 {
                    state.state = LifeState::Alive;
                    state.state_ms = 0.0;
                }
                return;
            }
            LifeState::Alive => {}
        }

        let keys = self.inputs.get(&state.id).copied().unwrap_or_default();
        let x_direction = keys.x_direction();
        if x_direction != 0.0 {
            state.facing_x = x_direction;
        }
        if keys.slam {
            physics::start_slam(state);
        }
        physics::step_player(physical, state, x_direction, dt, platforms);

        let Some(ball) = state.held_ball else {
            return;
        };
        let Some(throw) = components.player_throw.as_mut() else {
            return;
        };
        if let Some(charge) = physics::update_throw(throw, keys.throw_held, dt) {
            let vel = physics::throw_vector(state.vel, charge);
            let origin = physical.center;
            state.held_ball = None;
            state.catch_cooldown_ms = CATCH_COOLDOWN_MS;
            debug!("{} threw the ball with charge {:.2}", state.id, charge);

            if let Some(ball_entity) = self.world.get_mut(ball) {
                if let Some(ball_physical) = ball_entity.components.physical.as_mut() {
                    ball_physical.center = origin;
                }
                if let Some(ball_state) = ball_entity.components.ball.as_mut() {
                    ball_state.vel = vel;
                }
            }
        }
    }

    /// A player landing on another stomps them: the upper one scores and the
    /// lower one dies. Side contacts push both players apart.
    fn resolve_player_contacts(&mut self) {
        let alive: Vec<(EntityHandle, Vec2)> = self
            .world
            .with_tag(Tag::Player)
            .into_iter()
            .filter_map(|handle| {
                let entity = self.world.get(handle)?;
                let state = entity.components.player.as_ref()?;
                let physical = entity.components.physical.as_ref()?;
                (state.state == LifeState::Alive).then_some((handle, physical.center))
            })
            .collect();

        let mut centers: HashMap<EntityHandle, Vec2> = alive.iter().copied().collect();
        let mut dead: HashSet<EntityHandle> = HashSet::new();

        for (i, (a, _)) in alive.iter().enumerate() {
            for (b, _) in alive.iter().skip(i + 1) {
                if dead.contains(a) || dead.contains(b) {
                    continue;
                }
                let (Some(center_a), Some(center_b)) = (centers.get(a), centers.get(b)) else {
                    continue;
                };
                let Some(overlap) = penetration(&player_bounds(*center_a), &player_bounds(*center_b))
                else {
                    continue;
                };

                if overlap.y < 0.0 {
                    self.stomp(*b, *a);
                    dead.insert(*a);
                } else if overlap.y > 0.0 {
                    self.stomp(*a, *b);
                    dead.insert(*b);
                } else {
                    let half = overlap.scale(0.5);
                    let pushed_a = center_a.sub(&half);
                    let pushed_b = center_b.add(&half);
                    centers.insert(*a, pushed_a);
                    centers.insert(*b, pushed_b);
                }
            }
        }

        for (handle, center) in centers {
            if dead.contains(&handle) {
                continue;
            }
            if let Some(physical) = self
                .world
                .get_mut(handle)
                .and_then(|entity| entity.components.physical.as_mut())
            {
                physical.center = center;
            }
        }
    }

    fn stomp(&mut self, winner: EntityHandle, loser: EntityHandle) {
        if let Some(state) = self
            .world
            .get_mut(winner)
            .and_then(|entity| entity.components.player.as_mut())
        {
            state.score += 1;
            info!("{} scored ({} total)", state.id, state.score);
        }
        self.kill(loser);
    }

    fn kill(&mut self, handle: EntityHandle) {
        let Some(entity) = self.world.get_mut(handle) else {
            return;
        };
        if let Some(state) = entity.components.player.as_mut() {
            state.vel = Vec2::ZERO;
            state.state = LifeState::Dead;
            state.state_ms = DIE_TIME_MS;
            state.is_slamming = false;
            state.slam_ms = 0.0;
        }
        if let Some(throw) = entity.components.player_throw.as_mut() {
            throw.is_charging = false;
            throw.charge = 0.0;
            throw.charge_ms = 0.0;
        }

        release_held_ball(&mut self.world, handle);
        self.call(handle, RemoteMethod::AnimateDie);
    }

    fn update_catches(&mut self) {
        for player in self.world.with_tag(Tag::Player) {
            let Some((center, can_catch)) = self.world.get(player).and_then(|entity| {
                let state = entity.components.player.as_ref()?;
                let physical = entity.components.physical.as_ref()?;
                let can_catch = state.state == LifeState::Alive
                    && state.held_ball.is_none()
                    && state.can_catch();
                Some((physical.center, can_catch))
            }) else {
                continue;
            };
            if !can_catch {
                continue;
            }

            let catchable = self.world.with_tag(Tag::Ball).into_iter().find(|ball| {
                self.world.holder_of(*ball).is_none()
                    && self
                        .world
                        .get(*ball)
                        .and_then(|entity| entity.components.physical.as_ref())
                        .map_or(false, |physical| {
                            player_bounds(center).intersects(&ball_bounds(physical.center))
                        })
            });

            if let Some(ball) = catchable {
                if let Some(state) = self
                    .world
                    .get_mut(player)
                    .and_then(|entity| entity.components.player.as_mut())
                {
                    state.held_ball = Some(ball);
                    debug!("{} caught the ball", state.id);
                }
            }
        }
    }

    fn update_balls(&mut self, dt: f32, platforms: &[Aabb]) {
        for ball in self.world.with_tag(Tag::Ball) {
            let holder_center = self
                .world
                .holder_of(ball)
                .and_then(|holder| self.world.get(holder))
                .and_then(|entity| entity.components.physical.as_ref())
                .map(|physical| physical.center);

            let Some(entity) = self.world.get_mut(ball) else {
                continue;
            };
            let (Some(physical), Some(state)) = (
                entity.components.physical.as_mut(),
                entity.components.ball.as_mut(),
            ) else {
                continue;
            };

            match holder_center {
                Some(center) => physical.center = center,
                None => physics::step_ball(physical, state, dt, platforms),
            }
        }
    }

    fn call(&mut self, handle: EntityHandle, method: RemoteMethod) {
        if let Some(id) = self.world.network_id_of(handle) {
            self.replicator.send_remote_call(id, method);
        }
    }

    /// Replication events produced since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<ReplicationEvent> {
        self.replicator.drain()
    }

    /// Full state of every networked entity for this tick.
    pub fn snapshot_packet(&self) -> Packet {
        Packet::WorldSnapshot {
            tick: self.tick,
            timestamp: timestamp_millis(),
            level_index: self.session.current_level_index().map(|index| index as u32),
            entities: self.world.capture_all(),
        }
    }

    /// Packets that bring a newly connected peer up to date.
    pub fn sync_packets(&self) -> Vec<Packet> {
        let mut packets: Vec<Packet> = HostReplicator::creation_events(&self.world)
            .iter()
            .map(ReplicationEvent::to_packet)
            .collect();
        packets.push(self.snapshot_packet());
        packets
    }

    /// Scores of every player in the world, by slot position.
    pub fn scores(&self) -> Vec<(PlayerId, u32)> {
        let mut scores: Vec<(u32, PlayerId, u32)> = self
            .world
            .with_tag(Tag::Player)
            .into_iter()
            .filter_map(|handle| self.world.get(handle))
            .filter_map(|entity| entity.components.player.as_ref())
            .map(|state| (state.slot_position, state.id, state.score))
            .collect();
        scores.sort();
        scores
            .into_iter()
            .map(|(_, player, score)| (player, score))
            .collect()
    }
}

impl Default for HostGame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::components::PlayerState;

    fn game_with_players(count: u32) -> HostGame {
        let mut game = HostGame::new();
        game.start().unwrap();
        for id in 1..=count {
            game.add_player(PlayerId(id)).unwrap();
        }
        game.drain_events();
        game
    }

    fn handle(game: &HostGame, id: u32) -> EntityHandle {
        game.world().player_entity(PlayerId(id)).unwrap()
    }

    fn state(game: &HostGame, id: u32) -> PlayerState {
        game.world()
            .get(handle(game, id))
            .and_then(|e| e.components.player.clone())
            .unwrap()
    }

    fn set_center(game: &mut HostGame, handle: EntityHandle, center: Vec2) {
        game.world_mut()
            .get_mut(handle)
            .and_then(|e| e.components.physical.as_mut())
            .unwrap()
            .center = center;
    }

    fn center(game: &HostGame, handle: EntityHandle) -> Vec2 {
        game.world()
            .get(handle)
            .and_then(|e| e.components.physical)
            .unwrap()
            .center
    }

    fn calls(events: &[ReplicationEvent]) -> Vec<RemoteMethod> {
        events
            .iter()
            .filter_map(|event| match event {
                ReplicationEvent::Call(call) => Some(call.method),
                _ => None,
            })
            .collect()
    }

    fn input(sequence: u32) -> InputState {
        InputState {
            sequence,
            ..InputState::default()
        }
    }

    #[test]
    fn test_stale_input_is_ignored() {
        let mut game = game_with_players(1);
        let player = PlayerId(1);

        assert!(game.apply_input(
            player,
            &InputState {
                right: true,
                ..input(5)
            }
        ));
        assert!(!game.apply_input(
            player,
            &InputState {
                left: true,
                slam: true,
                ..input(3)
            }
        ));

        let keys = game.held_keys(player).unwrap();
        assert!(keys.right);
        assert!(!keys.left);
        assert!(keys.slam);
        assert_eq!(keys.last_sequence, 5);
    }

    #[test]
    fn test_slam_latch_cleared_after_tick() {
        let mut game = game_with_players(1);
        game.apply_input(
            PlayerId(1),
            &InputState {
                slam: true,
                ..input(1)
            },
        );

        game.update(16.0);
        assert!(!game.held_keys(PlayerId(1)).unwrap().slam);
    }

    #[test]
    fn test_input_moves_player_and_sets_facing() {
        let mut game = game_with_players(1);
        let start = center(&game, handle(&game, 1));

        game.apply_input(
            PlayerId(1),
            &InputState {
                left: true,
                ..input(1)
            },
        );
        for _ in 0..5 {
            game.update(16.0);
        }

        assert!(center(&game, handle(&game, 1)).x < start.x);
        assert_eq!(state(&game, 1).facing_x, -1.0);
    }

    #[test]
    fn test_stomp_scores_and_kills() {
        let mut game = game_with_players(2);
        let upper = handle(&game, 1);
        let lower = handle(&game, 2);
        set_center(&mut game, lower, Vec2::new(160.0, 60.0));
        set_center(&mut game, upper, Vec2::new(160.0, 52.0));

        game.resolve_player_contacts();

        assert_eq!(state(&game, 1).score, 1);
        assert_eq!(state(&game, 2).state, LifeState::Dead);
        assert_eq!(calls(&game.drain_events()), vec![RemoteMethod::AnimateDie]);
    }

    #[test]
    fn test_side_contact_pushes_apart() {
        let mut game = game_with_players(2);
        let a = handle(&game, 1);
        let b = handle(&game, 2);
        set_center(&mut game, a, Vec2::new(100.0, 60.0));
        set_center(&mut game, b, Vec2::new(106.0, 60.0));

        game.resolve_player_contacts();

        assert!(center(&game, b).x - center(&game, a).x >= 10.0 - 1e-4);
        assert_eq!(state(&game, 1).state, LifeState::Alive);
        assert_eq!(state(&game, 2).state, LifeState::Alive);
    }

    #[test]
    fn test_dead_player_respawns_then_comes_alive() {
        let mut game = game_with_players(2);
        let victim = handle(&game, 2);
        set_center(&mut game, victim, Vec2::new(10.0, 10.0));
        game.kill(victim);
        game.drain_events();

        game.update(DIE_TIME_MS);
        let respawned = state(&game, 2);
        assert_eq!(respawned.state, LifeState::Spawning);
        assert_eq!(center(&game, victim), respawned.spawn);
        assert_eq!(calls(&game.drain_events()), vec![RemoteMethod::AnimateSpawn]);

        game.update(SPAWN_TIME_MS / 2.0);
        assert_eq!(state(&game, 2).state, LifeState::Spawning);
        game.update(SPAWN_TIME_MS / 2.0);
        assert_eq!(state(&game, 2).state, LifeState::Alive);
    }

    #[test]
    fn test_catch_hold_and_throw() {
        let mut game = game_with_players(1);
        let player = handle(&game, 1);
        let ball = game.world().with_tag(Tag::Ball)[0];
        let player_center = center(&game, player);
        set_center(&mut game, ball, player_center);

        game.update_catches();
        assert_eq!(game.world().holder_of(ball), Some(player));

        game.update(16.0);
        assert_eq!(center(&game, ball), center(&game, player));

        game.apply_input(
            PlayerId(1),
            &InputState {
                throw_held: true,
                ..input(1)
            },
        );
        game.update(16.0);
        game.update(250.0);
        game.apply_input(PlayerId(1), &input(2));
        game.update(16.0);

        assert_eq!(game.world().holder_of(ball), None);
        let thrower = state(&game, 1);
        assert!(!thrower.can_catch());

        // Cooldown keeps the thrower from catching the ball straight back.
        game.update_catches();
        assert_eq!(game.world().holder_of(ball), None);
    }

    #[test]
    fn test_death_drops_held_ball() {
        let mut game = game_with_players(1);
        let player = handle(&game, 1);
        let ball = game.world().with_tag(Tag::Ball)[0];
        game.world_mut()
            .get_mut(player)
            .and_then(|e| e.components.player.as_mut())
            .unwrap()
            .held_ball = Some(ball);

        game.kill(player);

        assert_eq!(game.world().holder_of(ball), None);
        assert!(game.world().get(ball).is_some());
    }

    #[test]
    fn test_snapshot_packet_covers_networked_entities() {
        let mut game = game_with_players(2);
        game.update(16.0);

        match game.snapshot_packet() {
            Packet::WorldSnapshot {
                tick,
                level_index,
                entities,
                ..
            } => {
                assert_eq!(tick, 1);
                assert_eq!(level_index, Some(0));
                // Session, ball and two players.
                assert_eq!(entities.len(), 4);
            }
            _ => panic!("Expected world snapshot"),
        }
    }

    #[test]
    fn test_sync_packets_create_before_snapshot() {
        let game = game_with_players(1);
        let packets = game.sync_packets();

        let created = packets
            .iter()
            .filter(|p| matches!(p, Packet::EntityCreated { .. }))
            .count();
        assert_eq!(created, 3);
        assert!(matches!(packets.last(), Some(Packet::WorldSnapshot { .. })));
    }

    #[test]
    fn test_scores_in_slot_order() {
        let mut game = game_with_players(3);
        game.remove_player(PlayerId(1));
        game.add_player(PlayerId(4)).unwrap();

        let ids: Vec<PlayerId> = game.scores().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![PlayerId(4), PlayerId(2), PlayerId(3)]);
    }
}
