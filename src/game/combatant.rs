//! Combatants - authoritative health/score on the server, local control on observers

use tracing::debug;

use super::physics::{Bounds, PhysicsSystem, Pose, UnitStats, Vec2};
use super::projectile::{FireCooldown, ProjectileStats};
use super::replicated::{Authoritative, Outbox};
use crate::ws::protocol::{ParticipantId, ServerMsg};

/// Result of applying damage
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// Still standing with this much health
    Wounded { health: f32 },
    /// Health reached zero; reported exactly once
    Eliminated,
    /// Already down, nothing changed
    AlreadyEliminated,
}

/// Authoritative combatant state (server side)
#[derive(Debug)]
pub struct Combatant {
    owner_id: ParticipantId,
    stats: UnitStats,
    health: Authoritative<f32>,
    score: Authoritative<i64>,
    pose: Pose,
    fire_gate: FireCooldown,
    eliminated: bool,
}

impl Combatant {
    /// `fire_period` is the server-side gate between accepted fire requests
    pub fn spawn(
        owner_id: ParticipantId,
        pose: Pose,
        stats: UnitStats,
        starting_score: i64,
        fire_period: f32,
        outbox: Outbox,
    ) -> Self {
        let health = Authoritative::new(stats.max_health, outbox.clone(), move |h| {
            ServerMsg::HealthChanged {
                participant_id: owner_id,
                health: *h,
            }
        });
        let score = Authoritative::new(starting_score, outbox, move |s| ServerMsg::ScoreChanged {
            participant_id: owner_id,
            score: *s,
        });

        Self {
            owner_id,
            stats,
            health,
            score,
            pose,
            fire_gate: FireCooldown::new(fire_period),
            eliminated: false,
        }
    }

    pub fn owner_id(&self) -> ParticipantId {
        self.owner_id
    }

    pub fn stats(&self) -> &UnitStats {
        &self.stats
    }

    pub fn health(&self) -> f32 {
        *self.health.get()
    }

    pub fn max_health(&self) -> f32 {
        self.stats.max_health
    }

    pub fn score(&self) -> i64 {
        *self.score.get()
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn is_eliminated(&self) -> bool {
        self.eliminated
    }

    /// Movement is client-simulated; the owner's reported pose is taken as-is
    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    /// Advance per-tick timers
    pub fn tick(&mut self, dt: f32) {
        self.fire_gate.tick(dt);
    }

    /// Gate an inbound fire request
    pub fn accept_fire(&mut self) -> bool {
        !self.eliminated && self.fire_gate.try_fire()
    }

    /// Decrement health. Only the authority calls this.
    pub fn apply_damage(&mut self, damage: f32) -> DamageOutcome {
        if self.eliminated {
            return DamageOutcome::AlreadyEliminated;
        }

        let health = (self.health() - damage.max(0.0)).clamp(0.0, self.stats.max_health);
        self.health.set(health);

        if health <= 0.0 {
            self.eliminated = true;
            debug!(participant_id = %self.owner_id, "Combatant health depleted");
            DamageOutcome::Eliminated
        } else {
            DamageOutcome::Wounded { health }
        }
    }

    /// Remove from play without damage (owner departed)
    pub fn retire(&mut self) -> bool {
        let first = !self.eliminated;
        self.eliminated = true;
        first
    }

    /// Add to the score and return the new total
    pub fn credit(&mut self, value: i64) -> i64 {
        let score = self.score() + value;
        self.score.set(score);
        score
    }

    /// Re-publish health and score (identity repair)
    pub fn rebroadcast(&self) {
        self.health.rebroadcast();
        self.score.rebroadcast();
    }
}

/// One step of input from the input collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSample {
    /// Raw movement direction, normalized by the controller
    pub movement: Vec2,
    /// Fire intent held this step
    pub fire: bool,
}

/// What a controller step produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerStep {
    pub pose: Pose,
    /// Muzzle pose when a shot was fired this step
    pub fired: Option<Pose>,
}

/// Client-side control of the observer's own combatant
#[derive(Debug, Clone)]
pub struct LocalController {
    stats: UnitStats,
    weapon: ProjectileStats,
    bounds: Bounds,
    pose: Pose,
    velocity: Vec2,
    movement: Vec2,
    cooldown: FireCooldown,
}

impl LocalController {
    pub fn new(pose: Pose, stats: UnitStats, weapon: ProjectileStats, bounds: Bounds) -> Self {
        Self {
            stats,
            weapon,
            bounds,
            pose,
            velocity: Vec2::ZERO,
            movement: Vec2::ZERO,
            cooldown: FireCooldown::new(weapon.cooldown()),
        }
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    pub fn movement(&self) -> Vec2 {
        self.movement
    }

    pub fn cooldown(&self) -> &FireCooldown {
        &self.cooldown
    }

    /// Consume one input sample: cooldown, fire, then movement and rotation
    pub fn step(&mut self, input: InputSample, dt: f32) -> ControllerStep {
        self.cooldown.tick(dt);

        let fired = if input.fire && self.cooldown.try_fire() {
            Some(self.muzzle())
        } else {
            None
        };

        self.movement = input.movement.normalized();
        let (position, velocity) = PhysicsSystem::apply_force(
            self.pose.position,
            self.velocity,
            self.movement,
            &self.stats,
            &self.bounds,
            dt,
        );
        self.velocity = velocity;
        self.pose.position = position;
        self.pose.angle = PhysicsSystem::rotate_towards(self.pose.angle, self.movement, &self.stats, dt);

        ControllerStep {
            pose: self.pose,
            fired,
        }
    }

    /// Spawn pose just outside the body along the facing direction
    fn muzzle(&self) -> Pose {
        let offset = self.stats.body_radius + self.weapon.radius + 0.05;
        Pose::new(
            self.pose.position + self.pose.heading() * offset,
            self.pose.angle,
        )
    }
}
