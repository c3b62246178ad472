//! # Shared replication core
//!
//! Everything both peers need to agree on: entity ids and the registry that
//! maps them to local entities, the component snapshot codec, prefabs, level
//! geometry and the wire protocol. Nothing in this crate performs I/O.

pub mod components;
pub mod entity;
pub mod level;
pub mod math;
pub mod prefab;
pub mod registry;
pub mod snapshot;
pub mod world;

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use entity::{EntityHandle, NetworkEntityId, PlayerId, Tag};
pub use math::{Rgb, Vec2};
pub use prefab::PrefabKind;
pub use world::{EntitySnapshot, World};

pub const PROTOCOL_VERSION: u32 = 1;

/// Number of player slots in a session.
pub const MAX_PLAYERS: usize = 4;

/// Receive buffer size. A full world snapshot for four players and a ball
/// fits comfortably.
pub const MAX_PACKET_SIZE: usize = 16 * 1024;

/// Side length of the player box collider.
pub const PLAYER_SIZE: f32 = 10.0;
/// Radius of the ball collider.
pub const BALL_RADIUS: f32 = 5.0;

/// One-shot events delivered to a networked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemoteMethod {
    LoadLevel { level_index: u32 },
    AnimateSpawn,
    AnimateDie,
}

impl RemoteMethod {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteMethod::LoadLevel { .. } => "level-load",
            RemoteMethod::AnimateSpawn => "animate-spawn",
            RemoteMethod::AnimateDie => "animate-die",
        }
    }
}

/// A remote call addressed to one entity. `seq` is unique per host session so
/// receivers can recognise duplicate deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCall {
    pub seq: u64,
    pub target: NetworkEntityId,
    pub method: RemoteMethod,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
        room_code: String,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        left: bool,
        right: bool,
        slam: bool,
        throw_held: bool,
    },
    Disconnect,

    Connected {
        player_id: PlayerId,
    },
    EntityCreated {
        id: NetworkEntityId,
        prefab: PrefabKind,
    },
    EntityDestroyed {
        id: NetworkEntityId,
    },
    Call(RemoteCall),
    WorldSnapshot {
        tick: u32,
        timestamp: u64,
        level_index: Option<u32>,
        entities: Vec<EntitySnapshot>,
    },
    Disconnected {
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    pub sequence: u32,
    pub timestamp: u64,
    pub left: bool,
    pub right: bool,
    /// Edge-triggered: set only on the input that pressed the key.
    pub slam: bool,
    pub throw_held: bool,
}

impl InputState {
    pub fn to_packet(&self) -> Packet {
        Packet::Input {
            sequence: self.sequence,
            timestamp: self.timestamp,
            left: self.left,
            right: self.right,
            slam: self.slam,
            throw_held: self.throw_held,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}
