//! Host-side movement and contact resolution.
//!
//! All times are in milliseconds and all velocities in pixels per
//! millisecond. The y axis points down, so gravity is positive.
//!
//! Contacts are axis-aligned box tests. A contact is reported as the overlap
//! vector pointing from the moving body into the obstacle; pushing the body by
//! the negated overlap separates them.

use shared::components::{BallState, Physical, PlayerState, PlayerThrow};
use shared::math::Aabb;
use shared::{Vec2, BALL_RADIUS, PLAYER_SIZE};

pub const GRAVITY: f32 = 0.0003;
/// Horizontal acceleration while a direction is held.
pub const PLAYER_ACCEL: f32 = 0.002;
/// Horizontal speed above which input no longer accelerates.
pub const TOP_SPEED: f32 = 0.1;
/// Horizontal air friction.
pub const FRICTION: f32 = 0.0003;
pub const MIN_BOUNCE: f32 = 0.25;
pub const MAX_BOUNCE: f32 = 0.35;
pub const BOUNCE_COEFFICIENT: f32 = 0.85;
pub const SLAM_BOOST: f32 = 0.1;
pub const SLAM_DURATION_MS: f32 = 200.0;

pub const THROW_CHARGE_MAX_MS: f32 = 500.0;
pub const MIN_THROW_CHARGE: f32 = 0.3;
/// Scales the charge into throw speed.
pub const THROW_STRENGTH: f32 = 0.2;

pub fn player_bounds(center: Vec2) -> Aabb {
    Aabb::new(center, Vec2::new(PLAYER_SIZE, PLAYER_SIZE))
}

pub fn ball_bounds(center: Vec2) -> Aabb {
    Aabb::new(center, Vec2::new(BALL_RADIUS * 2.0, BALL_RADIUS * 2.0))
}

/// Overlap of `body` into `obstacle` along the axis of shallowest
/// penetration, or `None` if they do not intersect.
pub fn penetration(body: &Aabb, obstacle: &Aabb) -> Option<Vec2> {
    if !body.intersects(obstacle) {
        return None;
    }

    let overlap_x = body.right().min(obstacle.right()) - body.left().max(obstacle.left());
    let overlap_y = body.bottom().min(obstacle.bottom()) - body.top().max(obstacle.top());

    if overlap_x < overlap_y {
        let sign = if body.center.x < obstacle.center.x { 1.0 } else { -1.0 };
        Some(Vec2::new(overlap_x * sign, 0.0))
    } else {
        let sign = if body.center.y < obstacle.center.y { 1.0 } else { -1.0 };
        Some(Vec2::new(0.0, overlap_y * sign))
    }
}

/// Moves a box by `delta` and pushes it out of every obstacle it ends up
/// overlapping, in order. Returns the overlap of each resolved contact.
pub fn move_and_slide(center: &mut Vec2, size: Vec2, delta: Vec2, obstacles: &[Aabb]) -> Vec<Vec2> {
    *center = center.add(&delta);

    let mut contacts = Vec::new();
    for obstacle in obstacles {
        let body = Aabb::new(*center, size);
        if let Some(overlap) = penetration(&body, obstacle) {
            *center = center.sub(&overlap);
            contacts.push(overlap);
        }
    }
    contacts
}

/// Starts a slam if the player is falling and not already slamming.
pub fn start_slam(player: &mut PlayerState) -> bool {
    if player.is_slamming || player.vel.y <= 0.0 {
        return false;
    }

    player.is_slamming = true;
    player.slam_ms = SLAM_DURATION_MS;
    player.vel.y += SLAM_BOOST;
    true
}

/// Counts down an active slam and removes the boost when it runs out. A slam
/// cut short by a bounce keeps the bounce velocity.
pub fn update_slam(player: &mut PlayerState, dt: f32) {
    if player.slam_ms <= 0.0 {
        return;
    }

    player.slam_ms -= dt;
    if player.slam_ms <= 0.0 {
        player.slam_ms = 0.0;
        if player.is_slamming {
            player.is_slamming = false;
            player.vel.y -= SLAM_BOOST;
        }
    }
}

/// Advances a live player by `dt` and resolves platform contacts.
pub fn step_player(
    physical: &mut Physical,
    player: &mut PlayerState,
    x_direction: f32,
    dt: f32,
    platforms: &[Aabb],
) {
    let accel_x = if player.vel.x.abs() > TOP_SPEED {
        0.0
    } else {
        x_direction * PLAYER_ACCEL
    };
    player.vel = player.vel.add(&Vec2::new(accel_x, GRAVITY).scale(dt));

    // Friction brings horizontal speed to zero, never past it.
    if player.vel.x > 0.0 {
        player.vel.x = (player.vel.x - FRICTION * dt).max(0.0);
    } else if player.vel.x < 0.0 {
        player.vel.x = (player.vel.x + FRICTION * dt).min(0.0);
    }

    let contacts = move_and_slide(
        &mut physical.center,
        Vec2::new(PLAYER_SIZE, PLAYER_SIZE),
        player.vel.scale(dt),
        platforms,
    );
    handle_player_contacts(player, &contacts);
}

fn handle_player_contacts(player: &mut PlayerState, contacts: &[Vec2]) {
    if contacts
        .iter()
        .any(|overlap| overlap.x != 0.0 && overlap.x.signum() == player.vel.x.signum())
    {
        player.vel.x = 0.0;
    }

    if player.vel.y > 0.0 {
        if let Some(overlap) = contacts.iter().find(|overlap| overlap.y > 0.0) {
            bounce(player, *overlap);
        }
    } else if player.vel.y < 0.0 && contacts.iter().any(|overlap| overlap.y < 0.0) {
        player.vel.y = 0.0;
    }
}

/// Replaces the player's velocity with a clamped bounce away from the surface.
fn bounce(player: &mut PlayerState, overlap: Vec2) {
    let normal = overlap.scale(-1.0).normalize();
    let impulse = (player.vel.y * BOUNCE_COEFFICIENT).clamp(MIN_BOUNCE, MAX_BOUNCE);

    player.vel = normal.scale(impulse);
    player.is_slamming = false;
}

/// Advances a free ball and reflects it off the first platform it touches.
pub fn step_ball(physical: &mut Physical, ball: &mut BallState, dt: f32, platforms: &[Aabb]) {
    ball.vel.y += GRAVITY * dt;

    let contacts = move_and_slide(
        &mut physical.center,
        Vec2::new(BALL_RADIUS * 2.0, BALL_RADIUS * 2.0),
        ball.vel.scale(dt),
        platforms,
    );

    if let Some(overlap) = contacts.iter().find(|overlap| overlap.magnitude() > 0.0) {
        ball.vel = ball.vel.reflect(&overlap.scale(-1.0));
    }
}

/// Advances throw charging for a player holding the ball. Returns the charge
/// to throw with when the throw key is released.
pub fn update_throw(throw: &mut PlayerThrow, throw_held: bool, dt: f32) -> Option<f32> {
    if throw.is_charging {
        if throw_held {
            throw.charge_ms += dt;
            let t = throw.charge_ms / THROW_CHARGE_MAX_MS;
            throw.charge = (MIN_THROW_CHARGE + (1.0 - MIN_THROW_CHARGE) * t).min(1.0);
            None
        } else {
            let charge = throw.charge;
            throw.is_charging = false;
            throw.charge = 0.0;
            throw.charge_ms = 0.0;
            Some(charge)
        }
    } else {
        if throw_held {
            throw.is_charging = true;
            throw.charge = 0.0;
            throw.charge_ms = 0.0;
        }
        None
    }
}

/// Launch velocity for a ball thrown with `charge`: up and out at 45 degrees
/// in the direction of travel, on top of the player's own velocity.
pub fn throw_vector(player_vel: Vec2, charge: f32) -> Vec2 {
    let x_direction = if player_vel.x > 0.0 { 1.0 } else { -1.0 };
    let y_direction = (-45f32).to_radians().sin();

    player_vel.add(&Vec2::new(x_direction, y_direction).scale(charge * THROW_STRENGTH))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn ground() -> Aabb {
        Aabb::new(Vec2::new(0.0, 100.0), Vec2::new(200.0, 20.0))
    }

    fn falling_player(vel_y: f32) -> (Physical, PlayerState) {
        let physical = Physical {
            center: Vec2::new(0.0, 80.0),
            angle: 0.0,
        };
        let player = PlayerState {
            vel: Vec2::new(0.0, vel_y),
            ..PlayerState::default()
        };
        (physical, player)
    }

    #[test]
    fn test_penetration_picks_shallow_axis() {
        let body = Aabb::new(Vec2::new(0.0, 88.0), Vec2::new(10.0, 10.0));
        let overlap = penetration(&body, &ground()).unwrap();

        assert_approx_eq!(overlap.x, 0.0);
        assert_approx_eq!(overlap.y, 3.0);

        let side = Aabb::new(Vec2::new(-103.0, 100.0), Vec2::new(10.0, 10.0));
        let overlap = penetration(&side, &ground()).unwrap();
        assert_approx_eq!(overlap.x, 2.0);
        assert_approx_eq!(overlap.y, 0.0);
    }

    #[test]
    fn test_penetration_none_when_apart() {
        let body = Aabb::new(Vec2::new(0.0, 50.0), Vec2::new(10.0, 10.0));
        assert!(penetration(&body, &ground()).is_none());
    }

    #[test]
    fn test_move_and_slide_resolves_overlap() {
        let mut center = Vec2::new(0.0, 80.0);
        let contacts = move_and_slide(
            &mut center,
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
            &[ground()],
        );

        assert_eq!(contacts.len(), 1);
        assert_approx_eq!(center.y, 85.0);
    }

    #[test]
    fn test_gravity_accelerates_free_player() {
        let (mut physical, mut player) = falling_player(0.0);
        step_player(&mut physical, &mut player, 0.0, 16.0, &[]);

        assert_approx_eq!(player.vel.y, GRAVITY * 16.0);
        assert!(physical.center.y > 80.0);
    }

    #[test]
    fn test_input_stops_accelerating_above_top_speed() {
        let (mut physical, mut player) = falling_player(0.0);
        player.vel.x = TOP_SPEED + 0.01;

        step_player(&mut physical, &mut player, 1.0, 10.0, &[]);

        assert_approx_eq!(player.vel.x, TOP_SPEED + 0.01 - FRICTION * 10.0);
    }

    #[test]
    fn test_friction_does_not_reverse_direction() {
        let (mut physical, mut player) = falling_player(0.0);
        player.vel.x = 0.001;

        step_player(&mut physical, &mut player, 0.0, 16.0, &[]);
        assert_eq!(player.vel.x, 0.0);

        player.vel.x = -0.001;
        step_player(&mut physical, &mut player, 0.0, 16.0, &[]);
        assert_eq!(player.vel.x, 0.0);
    }

    #[test]
    fn test_landing_bounce_is_clamped() {
        let (mut physical, mut player) = falling_player(0.1);
        physical.center.y = 84.0;

        step_player(&mut physical, &mut player, 0.0, 16.0, &[ground()]);
        assert_approx_eq!(player.vel.y, -MIN_BOUNCE);
        assert_approx_eq!(player.vel.x, 0.0);

        let (mut physical, mut player) = falling_player(1.0);
        physical.center.y = 84.0;
        step_player(&mut physical, &mut player, 0.0, 1.0, &[ground()]);
        assert_approx_eq!(player.vel.y, -MAX_BOUNCE);
    }

    #[test]
    fn test_bounce_ends_slam() {
        let (mut physical, mut player) = falling_player(0.2);
        assert!(start_slam(&mut player));
        physical.center.y = 85.0;

        step_player(&mut physical, &mut player, 0.0, 1.0, &[ground()]);
        assert!(!player.is_slamming);

        let vel_after_bounce = player.vel.y;
        update_slam(&mut player, SLAM_DURATION_MS);
        assert_approx_eq!(player.vel.y, vel_after_bounce);
    }

    #[test]
    fn test_head_bump_stops_upward_motion() {
        let ceiling = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(200.0, 20.0));
        let (mut physical, mut player) = falling_player(-0.2);
        physical.center.y = 16.0;

        step_player(&mut physical, &mut player, 0.0, 10.0, &[ceiling]);

        assert_eq!(player.vel.y, 0.0);
        assert_approx_eq!(physical.center.y, 15.0);
    }

    #[test]
    fn test_slam_requires_falling() {
        let (_, mut player) = falling_player(-0.1);
        assert!(!start_slam(&mut player));

        player.vel.y = 0.05;
        assert!(start_slam(&mut player));
        assert_approx_eq!(player.vel.y, 0.05 + SLAM_BOOST);
        assert!(!start_slam(&mut player));

        update_slam(&mut player, 100.0);
        assert!(player.is_slamming);
        update_slam(&mut player, 100.0);
        assert!(!player.is_slamming);
        assert_approx_eq!(player.vel.y, 0.05);
    }

    #[test]
    fn test_ball_reflects_off_floor() {
        let mut physical = Physical {
            center: Vec2::new(0.0, 85.0),
            angle: 0.0,
        };
        let mut ball = BallState {
            vel: Vec2::new(0.05, 0.2),
        };

        step_ball(&mut physical, &mut ball, 1.0, &[ground()]);

        assert!(ball.vel.y < 0.0);
        assert_approx_eq!(ball.vel.x, 0.05);
        assert_approx_eq!(physical.center.y, 85.0);
    }

    #[test]
    fn test_throw_charge_ramps_and_releases() {
        let mut throw = PlayerThrow::default();

        assert_eq!(update_throw(&mut throw, true, 16.0), None);
        assert!(throw.is_charging);
        assert_eq!(throw.charge, 0.0);

        update_throw(&mut throw, true, 250.0);
        assert_approx_eq!(throw.charge, 0.65);

        update_throw(&mut throw, true, 1000.0);
        assert_approx_eq!(throw.charge, 1.0);

        let released = update_throw(&mut throw, false, 16.0);
        assert_eq!(released, Some(1.0));
        assert!(!throw.is_charging);
        assert_eq!(throw.charge, 0.0);
    }

    #[test]
    fn test_throw_vector_goes_up_and_forward() {
        let forward = throw_vector(Vec2::new(0.05, 0.0), 1.0);
        assert_approx_eq!(forward.x, 0.05 + THROW_STRENGTH);
        assert!(forward.y < 0.0);

        let standing = throw_vector(Vec2::ZERO, 0.5);
        assert_approx_eq!(standing.x, -0.5 * THROW_STRENGTH);
    }
}
