//! Arena geometry and client-side movement integration

use rand::Rng;
use serde::{Deserialize, Serialize};

/// 2D vector used for positions, headings and movement input
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (other - self).length()
    }

    /// Unit vector in the same direction, or zero for a (near) zero vector
    pub fn normalized(self) -> Vec2 {
        let len = self.length();
        if len < f32::EPSILON {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Heading angle in radians
    pub fn angle(self) -> f32 {
        self.y.atan2(self.x)
    }

    pub fn from_angle(angle: f32) -> Vec2 {
        Vec2::new(angle.cos(), angle.sin())
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Position plus facing angle (radians)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec2,
    pub angle: f32,
}

impl Pose {
    pub fn new(position: Vec2, angle: f32) -> Self {
        Self { position, angle }
    }

    pub fn heading(&self) -> Vec2 {
        Vec2::from_angle(self.angle)
    }
}

/// Axis-aligned region of the arena
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Square region centered on the origin
    pub fn square(half_extent: f32) -> Self {
        Self::new(
            Vec2::new(-half_extent, -half_extent),
            Vec2::new(half_extent, half_extent),
        )
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }

    /// Closest point inside the region
    pub fn clamp(&self, point: Vec2) -> Vec2 {
        Vec2::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
        )
    }

    /// Uniform sample clamped to the region boundary
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec2 {
        let x = if self.max.x > self.min.x {
            rng.gen_range(self.min.x..=self.max.x)
        } else {
            self.min.x
        };
        let y = if self.max.y > self.min.y {
            rng.gen_range(self.min.y..=self.max.y)
        } else {
            self.min.y
        };
        self.clamp(Vec2::new(x, y))
    }
}

/// Movement tuning for a unit
#[derive(Debug, Clone, Copy)]
pub struct UnitStats {
    /// Acceleration applied along the normalized input (units/s²)
    pub acceleration: f32,
    /// Velocity damping per second; top speed is acceleration / damping
    pub damping: f32,
    /// Rotation easing rate per second
    pub rotate_speed: f32,
    /// Maximum health
    pub max_health: f32,
    /// Collision radius of the body
    pub body_radius: f32,
    /// Minimum separation from other entities at spawn time
    pub exclusion_radius: f32,
}

impl Default for UnitStats {
    fn default() -> Self {
        Self {
            acceleration: 20.0,
            damping: 5.0,
            rotate_speed: 10.0,
            max_health: 10.0,
            body_radius: 0.5,
            exclusion_radius: 1.0,
        }
    }
}

/// Stateless helpers for the locally simulated movement
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Apply a normalized movement force and integrate one step.
    /// Returns (new_position, new_velocity).
    pub fn apply_force(
        position: Vec2,
        velocity: Vec2,
        movement: Vec2,
        stats: &UnitStats,
        bounds: &Bounds,
        dt: f32,
    ) -> (Vec2, Vec2) {
        let direction = movement.normalized();
        let retain = (1.0 - stats.damping * dt).max(0.0);
        let velocity = (velocity + direction * stats.acceleration * dt) * retain;
        let position = bounds.clamp(position + velocity * dt);
        (position, velocity)
    }

    /// Ease `current` toward the heading of `movement`. Zero movement keeps the angle.
    pub fn rotate_towards(current: f32, movement: Vec2, stats: &UnitStats, dt: f32) -> f32 {
        if movement.is_zero() {
            return current;
        }

        let target = movement.angle();
        let delta = shortest_arc(current, target);
        let t = (stats.rotate_speed * dt).min(1.0);
        wrap_angle(current + delta * t)
    }

    /// Check overlap between two circles
    pub fn circles_overlap(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let combined = radius_a + radius_b;
        dx * dx + dy * dy <= combined * combined
    }
}

/// Signed smallest rotation from `from` to `to`, in (-π, π]
fn shortest_arc(from: f32, to: f32) -> f32 {
    let diff = (to - from).rem_euclid(std::f32::consts::TAU);
    if diff > std::f32::consts::PI {
        diff - std::f32::consts::TAU
    } else {
        diff
    }
}

/// Normalize to (-π, π]
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(std::f32::consts::TAU);
    if wrapped > std::f32::consts::PI {
        wrapped - std::f32::consts::TAU
    } else {
        wrapped
    }
}
