//! Projectiles - ghost and real variants, cooldown gating, contact resolution

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::physics::{Bounds, PhysicsSystem, Pose, Vec2};
use crate::ws::protocol::ParticipantId;

/// Weapon tuning
#[derive(Debug, Clone, Copy)]
pub struct ProjectileStats {
    /// Damage per hit
    pub damage: f32,
    /// Shots per second
    pub fire_rate: f32,
    /// Projectile speed
    pub speed: f32,
    /// Projectile hitbox radius
    pub radius: f32,
    /// Projectile lifetime (seconds)
    pub lifetime: f32,
}

impl ProjectileStats {
    /// Seconds between shots
    pub fn cooldown(&self) -> f32 {
        if self.fire_rate > 0.0 {
            1.0 / self.fire_rate
        } else {
            f32::INFINITY
        }
    }
}

impl Default for ProjectileStats {
    fn default() -> Self {
        Self {
            damage: 1.0,
            fire_rate: 10.0,
            speed: 10.0,
            radius: 0.1,
            lifetime: 3.0,
        }
    }
}

/// Fire gate: one shot per cooldown period
#[derive(Debug, Clone, Copy)]
pub struct FireCooldown {
    period: f32,
    remaining: f32,
}

impl FireCooldown {
    pub fn new(period: f32) -> Self {
        Self {
            period,
            remaining: 0.0,
        }
    }

    pub fn period(&self) -> f32 {
        self.period
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    pub fn ready(&self) -> bool {
        self.remaining <= 0.0
    }

    /// Count down by `dt` seconds
    pub fn tick(&mut self, dt: f32) {
        self.remaining = (self.remaining - dt).max(0.0);
    }

    /// Consume the gate. Returns false, leaving the countdown untouched, while cooling down.
    pub fn try_fire(&mut self) -> bool {
        if !self.ready() {
            return false;
        }
        self.remaining = self.period;
        true
    }
}

/// Projectile behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectileVariant {
    /// Local, purely visual stand-in
    Ghost,
    /// Authority-spawned, applies damage
    Real,
}

/// What a projectile touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactTarget {
    Combatant(ParticipantId),
    /// Anything that is not a combatant (arena wall, pickup, ...)
    Obstacle,
}

/// Effect of a contact
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContactOutcome {
    /// Real projectile hit a non-owner combatant; projectile is spent
    Hit { target_id: ParticipantId, damage: f32 },
    /// Projectile destroyed without effect
    Destroyed,
    /// Real projectile touching its own owner; nothing happens
    IgnoredSelfContact,
}

/// Active projectile
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub owner_id: ParticipantId,
    pub variant: ProjectileVariant,
    pub position: Vec2,
    pub velocity: Vec2,
    pub damage: f32,
    pub radius: f32,
    pub lifetime_remaining: f32,
    spent: bool,
}

impl Projectile {
    /// Create a projectile moving along the pose heading
    pub fn new(owner_id: ParticipantId, variant: ProjectileVariant, pose: Pose, stats: &ProjectileStats) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            variant,
            position: pose.position,
            velocity: pose.heading() * stats.speed,
            damage: stats.damage,
            radius: stats.radius,
            lifetime_remaining: stats.lifetime,
            spent: false,
        }
    }

    pub fn ghost(owner_id: ParticipantId, pose: Pose, stats: &ProjectileStats) -> Self {
        Self::new(owner_id, ProjectileVariant::Ghost, pose, stats)
    }

    pub fn real(owner_id: ParticipantId, pose: Pose, stats: &ProjectileStats) -> Self {
        Self::new(owner_id, ProjectileVariant::Real, pose, stats)
    }

    pub fn is_spent(&self) -> bool {
        self.spent
    }

    /// Advance at constant velocity. Returns false once expired.
    pub fn update(&mut self, dt: f32) -> bool {
        self.position = self.position + self.velocity * dt;
        self.lifetime_remaining -= dt;
        self.lifetime_remaining > 0.0 && !self.spent
    }

    /// Left the arena: counts as contact with a non-combatant
    pub fn outside(&self, bounds: &Bounds) -> bool {
        !bounds.contains(self.position)
    }

    /// Check collision with a circular target
    pub fn touches(&self, target: Vec2, target_radius: f32) -> bool {
        PhysicsSystem::circles_overlap(self.position, self.radius, target, target_radius)
    }

    /// Resolve a contact. A spent projectile has no further effect.
    pub fn resolve_contact(&mut self, target: ContactTarget) -> ContactOutcome {
        if self.spent {
            return ContactOutcome::Destroyed;
        }

        let outcome = match (self.variant, target) {
            (ProjectileVariant::Ghost, _) => ContactOutcome::Destroyed,
            (ProjectileVariant::Real, ContactTarget::Combatant(id)) if id == self.owner_id => {
                return ContactOutcome::IgnoredSelfContact;
            }
            (ProjectileVariant::Real, ContactTarget::Combatant(target_id)) => ContactOutcome::Hit {
                target_id,
                damage: self.damage,
            },
            (ProjectileVariant::Real, ContactTarget::Obstacle) => ContactOutcome::Destroyed,
        };

        self.spent = true;
        outcome
    }
}
