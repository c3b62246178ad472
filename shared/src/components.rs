//! Component storage and the networked components' snapshot formats.
//!
//! Every entity stores its components in a [`Components`] record with one
//! slot per kind, so an entity can never carry two instances of the same
//! kind and accessors are checked at compile time.

use crate::entity::{EntityHandle, PlayerId};
use crate::level::PlatformShape;
use crate::math::{Rgb, Vec2};
use crate::registry::EntityResolver;
use crate::snapshot::{NetworkedComponent, Snapshot, SnapshotError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Physical,
    Player,
    PlayerThrow,
    Ball,
}

/// Position and rotation of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Physical {
    pub center: Vec2,
    pub angle: f32,
}

impl NetworkedComponent for Physical {
    const KIND: ComponentKind = ComponentKind::Physical;

    fn serialize(&self, _resolver: &dyn EntityResolver) -> Snapshot {
        Snapshot::new()
            .with("center", self.center)
            .with("angle", self.angle)
    }

    fn deserialize(
        &mut self,
        snapshot: &Snapshot,
        _resolver: &dyn EntityResolver,
    ) -> Result<(), SnapshotError> {
        let center = snapshot.read_vec2("center")?;
        let angle = snapshot.read_f32("angle")?;
        self.center = center;
        self.angle = angle;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Spawning,
    Alive,
    Dead,
}

impl LifeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifeState::Spawning => "spawning",
            LifeState::Alive => "alive",
            LifeState::Dead => "dead",
        }
    }

    pub fn parse(value: &str) -> Option<LifeState> {
        match value {
            "spawning" => Some(LifeState::Spawning),
            "alive" => Some(LifeState::Alive),
            "dead" => Some(LifeState::Dead),
            _ => None,
        }
    }
}

/// Per-player game state.
///
/// `slam_ms` and `catch_cooldown_ms` only drive host-side timers and are not
/// replicated.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub color: Rgb,
    pub spawn: Vec2,
    pub slot_position: u32,
    pub vel: Vec2,
    pub state: LifeState,
    /// Time left in the current spawning or dead phase.
    pub state_ms: f32,
    pub score: u32,
    pub is_slamming: bool,
    pub slam_ms: f32,
    pub held_ball: Option<EntityHandle>,
    pub catch_cooldown_ms: f32,
    pub facing_x: f32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            id: PlayerId(0),
            color: [255, 255, 255],
            spawn: Vec2::ZERO,
            slot_position: 0,
            vel: Vec2::ZERO,
            state: LifeState::Alive,
            state_ms: 0.0,
            score: 0,
            is_slamming: false,
            slam_ms: 0.0,
            held_ball: None,
            catch_cooldown_ms: 0.0,
            facing_x: 1.0,
        }
    }
}

impl PlayerState {
    pub fn can_catch(&self) -> bool {
        self.catch_cooldown_ms <= 0.0
    }
}

impl NetworkedComponent for PlayerState {
    const KIND: ComponentKind = ComponentKind::Player;

    fn serialize(&self, resolver: &dyn EntityResolver) -> Snapshot {
        let held_ball = self
            .held_ball
            .and_then(|handle| resolver.network_id_of(handle));

        Snapshot::new()
            .with("id", self.id.0)
            .with("color", self.color)
            .with("spawn", self.spawn)
            .with("slotPosition", self.slot_position)
            .with("vel", self.vel)
            .with("state", self.state.as_str())
            .with("stateMs", self.state_ms)
            .with("score", self.score)
            .with("isSlamming", self.is_slamming)
            .with("heldBall", held_ball)
            .with("facingX", self.facing_x)
    }

    fn deserialize(
        &mut self,
        snapshot: &Snapshot,
        resolver: &dyn EntityResolver,
    ) -> Result<(), SnapshotError> {
        let state_text = snapshot.read_text("state")?;
        let state = LifeState::parse(state_text).ok_or_else(|| SnapshotError::UnknownVariant {
            field: "state".to_string(),
            value: state_text.to_string(),
        })?;

        let id = PlayerId(snapshot.read_u32("id")?);
        let color = snapshot.read_rgb("color")?;
        let spawn = snapshot.read_vec2("spawn")?;
        let slot_position = snapshot.read_u32("slotPosition")?;
        let vel = snapshot.read_vec2("vel")?;
        let state_ms = snapshot.read_f32("stateMs")?;
        let score = snapshot.read_u32("score")?;
        let is_slamming = snapshot.read_bool("isSlamming")?;
        // An id this peer has not seen yet resolves to no reference; a later
        // snapshot fills it in.
        let held_ball = snapshot
            .read_entity_ref("heldBall")?
            .and_then(|id| resolver.resolve(id));
        let facing_x = snapshot.read_f32("facingX")?;

        self.id = id;
        self.color = color;
        self.spawn = spawn;
        self.slot_position = slot_position;
        self.vel = vel;
        self.state = state;
        self.state_ms = state_ms;
        self.score = score;
        self.is_slamming = is_slamming;
        self.held_ball = held_ball;
        self.facing_x = facing_x;
        Ok(())
    }
}

/// Throw charging state of a player holding the ball.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerThrow {
    pub is_charging: bool,
    /// 0 when idle, 0.3..=1 while charging.
    pub charge: f32,
    pub charge_ms: f32,
}

impl NetworkedComponent for PlayerThrow {
    const KIND: ComponentKind = ComponentKind::PlayerThrow;

    fn serialize(&self, _resolver: &dyn EntityResolver) -> Snapshot {
        Snapshot::new().with("throwCharge", self.charge)
    }

    fn deserialize(
        &mut self,
        snapshot: &Snapshot,
        _resolver: &dyn EntityResolver,
    ) -> Result<(), SnapshotError> {
        self.charge = snapshot.read_f32("throwCharge")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallState {
    pub vel: Vec2,
}

impl Default for BallState {
    fn default() -> Self {
        Self {
            vel: Vec2::new(0.0, -0.1),
        }
    }
}

impl NetworkedComponent for BallState {
    const KIND: ComponentKind = ComponentKind::Ball;

    fn serialize(&self, _resolver: &dyn EntityResolver) -> Snapshot {
        Snapshot::new().with("vel", self.vel)
    }

    fn deserialize(
        &mut self,
        snapshot: &Snapshot,
        _resolver: &dyn EntityResolver,
    ) -> Result<(), SnapshotError> {
        self.vel = snapshot.read_vec2("vel")?;
        Ok(())
    }
}

/// Snapshot of one component, labelled with its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub kind: ComponentKind,
    pub snapshot: Snapshot,
}

/// All components of one entity, at most one per kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Components {
    pub physical: Option<Physical>,
    pub player: Option<PlayerState>,
    pub player_throw: Option<PlayerThrow>,
    pub ball: Option<BallState>,
    /// Platforms are built locally from level data and never replicated.
    pub platform: Option<PlatformShape>,
}

fn capture_one<C: NetworkedComponent>(
    component: &Option<C>,
    resolver: &dyn EntityResolver,
    out: &mut Vec<ComponentSnapshot>,
) {
    if let Some(component) = component {
        out.push(ComponentSnapshot {
            kind: C::KIND,
            snapshot: component.serialize(resolver),
        });
    }
}

fn apply_one<C: NetworkedComponent>(
    component: &mut Option<C>,
    snapshot: &Snapshot,
    resolver: &dyn EntityResolver,
) -> Result<(), SnapshotError> {
    match component {
        Some(component) => component.deserialize(snapshot, resolver),
        None => Err(SnapshotError::MissingComponent(C::KIND)),
    }
}

impl Components {
    /// Serializes every networked component present.
    pub fn capture(&self, resolver: &dyn EntityResolver) -> Vec<ComponentSnapshot> {
        let mut out = Vec::with_capacity(4);
        capture_one(&self.physical, resolver, &mut out);
        capture_one(&self.player, resolver, &mut out);
        capture_one(&self.player_throw, resolver, &mut out);
        capture_one(&self.ball, resolver, &mut out);
        out
    }

    /// Applies component snapshots. Stops at the first malformed snapshot;
    /// components applied before it keep their new state.
    pub fn apply(
        &mut self,
        snapshots: &[ComponentSnapshot],
        resolver: &dyn EntityResolver,
    ) -> Result<(), SnapshotError> {
        for ComponentSnapshot { kind, snapshot } in snapshots {
            match kind {
                ComponentKind::Physical => apply_one(&mut self.physical, snapshot, resolver)?,
                ComponentKind::Player => apply_one(&mut self.player, snapshot, resolver)?,
                ComponentKind::PlayerThrow => {
                    apply_one(&mut self.player_throw, snapshot, resolver)?
                }
                ComponentKind::Ball => apply_one(&mut self.ball, snapshot, resolver)?,
            }
        }
        Ok(())
    }
}
