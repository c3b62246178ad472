//! Static level geometry and platform loading.
//!
//! Levels are never sent over the wire. Host and clients build the same
//! platforms from the level index, so only the index is replicated.

use crate::components::Components;
use crate::entity::{EntityHandle, Tag};
use crate::math::{Aabb, Vec2};
use crate::world::World;
use log::debug;

pub const LEVEL_WIDTH: f32 = 320.0;
pub const LEVEL_HEIGHT: f32 = 240.0;

/// Thickness of the boundary walls placed outside each horizontal edge.
pub const WALL_THICKNESS: f32 = 50.0;

/// Added below the lowest platform top to cap downward camera scroll.
pub const CAMERA_BOTTOM_MARGIN: f32 = 20.0;

/// A rectangular platform. `angle` (degrees) is kept for rendering; contact
/// tests use the unrotated box.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformShape {
    pub center: Vec2,
    pub size: Vec2,
    pub angle: f32,
}

impl PlatformShape {
    pub fn rect(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self::rotated_rect(x, y, w, h, 0.0)
    }

    pub fn rotated_rect(x: f32, y: f32, w: f32, h: f32, angle: f32) -> Self {
        PlatformShape {
            center: Vec2::new(x, y),
            size: Vec2::new(w, h),
            angle,
        }
    }

    /// Axis-aligned bounds used for contact tests. Rotation is ignored.
    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.center, self.size)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub size: Vec2,
    /// Indexed by slot position.
    pub spawns: [Vec2; 4],
    pub platforms: Vec<PlatformShape>,
    pub ball_spawn: Vec2,
}

impl Level {
    /// Walls just outside the left and right edges, tall enough that players
    /// cannot escape horizontally.
    pub fn walls(&self) -> [PlatformShape; 2] {
        let height = self.size.y * 4.0;
        let y = self.size.y / 2.0;
        [
            PlatformShape::rect(-WALL_THICKNESS / 2.0, y, WALL_THICKNESS, height),
            PlatformShape::rect(
                self.size.x + WALL_THICKNESS / 2.0,
                y,
                WALL_THICKNESS,
                height,
            ),
        ]
    }

    /// Lowest platform top edge plus [`CAMERA_BOTTOM_MARGIN`].
    pub fn camera_y_max(&self) -> f32 {
        let lowest_top = self
            .platforms
            .iter()
            .map(|platform| platform.bounds().top())
            .fold(0.0f32, f32::max);

        lowest_top + CAMERA_BOTTOM_MARGIN
    }

    pub fn spawn_for_slot(&self, slot_position: u32) -> Option<Vec2> {
        self.spawns.get(slot_position as usize).copied()
    }
}

fn ground() -> PlatformShape {
    PlatformShape::rect(LEVEL_WIDTH / 2.0, LEVEL_HEIGHT + 10.0, LEVEL_WIDTH, 50.0)
}

fn level_one() -> Level {
    Level {
        size: Vec2::new(LEVEL_WIDTH, LEVEL_HEIGHT),
        spawns: [
            Vec2::new(20.0, 120.0),
            Vec2::new(80.0, 120.0),
            Vec2::new(240.0, 120.0),
            Vec2::new(300.0, 120.0),
        ],
        platforms: vec![
            ground(),
            PlatformShape::rotated_rect(120.0, LEVEL_HEIGHT - 80.0, 40.0, 20.0, 45.0),
            PlatformShape::rotated_rect(
                LEVEL_WIDTH - 120.0,
                LEVEL_HEIGHT - 120.0,
                40.0,
                20.0,
                -45.0,
            ),
            PlatformShape::rotated_rect(120.0, LEVEL_HEIGHT - 160.0, 40.0, 20.0, 45.0),
            PlatformShape::rect(LEVEL_WIDTH - 120.0, LEVEL_HEIGHT - 200.0, 40.0, 20.0),
        ],
        ball_spawn: Vec2::new(LEVEL_WIDTH / 2.0, 100.0),
    }
}

fn level_two() -> Level {
    Level {
        size: Vec2::new(LEVEL_WIDTH, LEVEL_HEIGHT),
        spawns: [
            Vec2::new(20.0, 120.0),
            Vec2::new(100.0, 120.0),
            Vec2::new(220.0, 120.0),
            Vec2::new(300.0, 120.0),
        ],
        platforms: vec![
            ground(),
            PlatformShape::rect(60.0, 160.0, 60.0, 20.0),
            PlatformShape::rect(LEVEL_WIDTH - 60.0, 160.0, 60.0, 20.0),
            PlatformShape::rotated_rect(146.0, 80.0, 60.0, 20.0, -45.0),
            PlatformShape::rotated_rect(LEVEL_WIDTH - 146.0, 80.0, 60.0, 20.0, 45.0),
            PlatformShape::rect(LEVEL_WIDTH / 2.0, 0.0, 20.0, 150.0),
        ],
        ball_spawn: Vec2::new(LEVEL_WIDTH / 2.0, 120.0),
    }
}

pub fn level_count() -> usize {
    2
}

/// Returns the built-in level at `index`, if any.
pub fn level(index: usize) -> Option<Level> {
    match index {
        0 => Some(level_one()),
        1 => Some(level_two()),
        _ => None,
    }
}

/// Replaces every platform in `world` with the platforms and walls of `level`.
pub fn load_platforms(world: &mut World, level: &Level) -> Vec<EntityHandle> {
    for handle in world.with_tag(Tag::Platform) {
        world.despawn(handle);
    }

    let walls = level.walls();
    let handles: Vec<EntityHandle> = level
        .platforms
        .iter()
        .chain(walls.iter())
        .map(|shape| {
            world.spawn(
                "platform",
                &[Tag::Platform],
                Components {
                    platform: Some(shape.clone()),
                    ..Components::default()
                },
            )
        })
        .collect();

    debug!("Loaded {} platforms", handles.len());
    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_builtin_levels() {
        assert_eq!(level_count(), 2);
        assert!(level(0).is_some());
        assert!(level(1).is_some());
        assert!(level(2).is_none());
    }

    #[test]
    fn test_walls_outside_edges() {
        let level = level(0).unwrap();
        let [left, right] = level.walls();

        let left = left.bounds();
        let right = right.bounds();
        assert_approx_eq!(left.right(), 0.0);
        assert_approx_eq!(right.left(), LEVEL_WIDTH);
        assert_approx_eq!(left.size.y, LEVEL_HEIGHT * 4.0);
        assert_approx_eq!(left.center.y, LEVEL_HEIGHT / 2.0);
    }

    #[test]
    fn test_camera_bound_uses_lowest_platform_top() {
        let level = level(0).unwrap();
        // Ground is centred at 250 with height 50.
        assert_approx_eq!(level.camera_y_max(), 225.0 + CAMERA_BOTTOM_MARGIN);
    }

    #[test]
    fn test_camera_bound_ignores_rotation() {
        let level = Level {
            size: Vec2::new(100.0, 100.0),
            spawns: [Vec2::ZERO; 4],
            platforms: vec![PlatformShape::rotated_rect(50.0, 60.0, 40.0, 20.0, 45.0)],
            ball_spawn: Vec2::ZERO,
        };
        assert_approx_eq!(level.camera_y_max(), 50.0 + CAMERA_BOTTOM_MARGIN);
    }

    #[test]
    fn test_load_platforms_replaces_previous() {
        let mut world = World::new();
        let first = load_platforms(&mut world, &level(0).unwrap());
        assert_eq!(first.len(), 5 + 2);

        let second = load_platforms(&mut world, &level(1).unwrap());
        assert_eq!(second.len(), 6 + 2);
        assert_eq!(world.with_tag(Tag::Platform), second);
        assert!(first.iter().all(|handle| world.get(*handle).is_none()));
    }
}
