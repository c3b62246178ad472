use serde::{Deserialize, Serialize};

/// A 2D vector in world space. Positive `y` points down, matching level
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the normalized vector, or zero for a zero-length input.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / mag, self.y / mag)
        }
    }

    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }

    pub fn add(&self, other: &Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }

    pub fn sub(&self, other: &Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }

    pub fn dot(&self, other: &Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Reflects the vector off a surface with the given normal.
    pub fn reflect(&self, normal: &Vec2) -> Vec2 {
        let n = normal.normalize();
        self.sub(&n.scale(2.0 * self.dot(&n)))
    }
}

/// 8-bit RGB colour triple.
pub type Rgb = [u8; 3];

/// Axis-aligned box described by its center and full size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub center: Vec2,
    pub size: Vec2,
}

impl Aabb {
    pub fn new(center: Vec2, size: Vec2) -> Self {
        Self { center, size }
    }

    pub fn left(&self) -> f32 {
        self.center.x - self.size.x / 2.0
    }

    pub fn right(&self) -> f32 {
        self.center.x + self.size.x / 2.0
    }

    pub fn top(&self) -> f32 {
        self.center.y - self.size.y / 2.0
    }

    pub fn bottom(&self) -> f32 {
        self.center.y + self.size.y / 2.0
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        !(self.right() <= other.left()
            || self.left() >= other.right()
            || self.bottom() <= other.top()
            || self.top() >= other.bottom())
    }
}
