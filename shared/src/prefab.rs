//! Named component recipes. Creating a prefab on the host is the only entity
//! creation path that is visible to clients.

use crate::components::{BallState, Components, Physical, PlayerState, PlayerThrow};
use crate::entity::Tag;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrefabKind {
    Player,
    Ball,
    Session,
}

impl PrefabKind {
    pub fn name(&self) -> &'static str {
        match self {
            PrefabKind::Player => "player",
            PrefabKind::Ball => "ball",
            PrefabKind::Session => "session",
        }
    }

    pub fn tags(&self) -> &'static [Tag] {
        match self {
            PrefabKind::Player => &[Tag::Player],
            PrefabKind::Ball => &[Tag::Ball],
            PrefabKind::Session => &[Tag::Session],
        }
    }

    /// Fresh components for a new instance.
    pub fn instantiate(&self) -> Components {
        match self {
            PrefabKind::Player => Components {
                physical: Some(Physical::default()),
                player: Some(PlayerState::default()),
                player_throw: Some(PlayerThrow::default()),
                ..Components::default()
            },
            PrefabKind::Ball => Components {
                physical: Some(Physical::default()),
                ball: Some(BallState::default()),
                ..Components::default()
            },
            PrefabKind::Session => Components::default(),
        }
    }
}
