//! Match state - combatant directory, spawn placement, win detection

use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::combatant::Combatant;
use super::physics::{Bounds, Pose, UnitStats};
use super::placement::{place, Occupant};
use super::replicated::Outbox;
use super::StaleEntity;
use crate::ws::protocol::{MatchOutcome, ParticipantId, ServerMsg};

/// Match state machine. Both ended states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Playing,
    EndedVictory,
    EndedDisconnect,
}

/// Current state plus the winner once decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSnapshot {
    status: MatchStatus,
    winner_id: Option<ParticipantId>,
}

impl Default for MatchSnapshot {
    fn default() -> Self {
        Self {
            status: MatchStatus::Playing,
            winner_id: None,
        }
    }
}

impl MatchSnapshot {
    pub fn status(&self) -> MatchStatus {
        self.status
    }

    /// Set only in `EndedVictory`
    pub fn winner_id(&self) -> Option<ParticipantId> {
        self.winner_id
    }

    pub fn is_terminal(&self) -> bool {
        self.status != MatchStatus::Playing
    }

    /// Playing -> EndedVictory. False when already terminal.
    pub fn end_with_victory(&mut self, winner_id: ParticipantId) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = MatchStatus::EndedVictory;
        self.winner_id = Some(winner_id);
        true
    }

    /// Playing -> EndedDisconnect. Never overrides an earlier ending.
    pub fn end_with_disconnect(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = MatchStatus::EndedDisconnect;
        true
    }
}

/// Authoritative match state
#[derive(Debug)]
pub struct MatchState {
    combatants: HashMap<ParticipantId, Combatant>,
    snapshot: MatchSnapshot,
    bounds: Bounds,
    unit_stats: UnitStats,
    fire_period: f32,
    outbox: Outbox,
}

impl MatchState {
    pub fn new(bounds: Bounds, unit_stats: UnitStats, fire_period: f32, outbox: Outbox) -> Self {
        Self {
            combatants: HashMap::new(),
            snapshot: MatchSnapshot::default(),
            bounds,
            unit_stats,
            fire_period,
            outbox,
        }
    }

    pub fn snapshot(&self) -> &MatchSnapshot {
        &self.snapshot
    }

    pub fn status(&self) -> MatchStatus {
        self.snapshot.status()
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Combatant> {
        self.combatants.get(&id)
    }

    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Combatant> {
        self.combatants.get_mut(&id)
    }

    pub fn combatants(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.values()
    }

    pub fn combatants_mut(&mut self) -> impl Iterator<Item = &mut Combatant> {
        self.combatants.values_mut()
    }

    pub fn active_count(&self) -> usize {
        self.combatants.len()
    }

    /// Active combatants as placement occupants
    pub fn occupants(&self) -> Vec<Occupant> {
        self.combatants
            .values()
            .map(|c| Occupant::new(c.pose().position, c.stats().exclusion_radius))
            .collect()
    }

    /// Spawn a combatant for `owner_id` clear of other combatants and `pickups`.
    /// Returns `None` if the owner already has one or the match is over.
    pub fn spawn<R: Rng + ?Sized>(
        &mut self,
        owner_id: ParticipantId,
        starting_score: i64,
        rng: &mut R,
        pickups: &[Occupant],
    ) -> Option<&Combatant> {
        if self.snapshot.is_terminal() {
            debug!(participant_id = %owner_id, "Spawn ignored, match over");
            return None;
        }
        if self.combatants.contains_key(&owner_id) {
            debug!(participant_id = %owner_id, "Spawn ignored, combatant exists");
            return None;
        }

        let mut occupants = self.occupants();
        occupants.extend_from_slice(pickups);

        let placement = place(rng, &self.bounds, self.unit_stats.exclusion_radius, &occupants);
        let facing = rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
        let pose = Pose::new(placement.position, facing);

        let combatant = Combatant::spawn(
            owner_id,
            pose,
            self.unit_stats,
            starting_score,
            self.fire_period,
            self.outbox.clone(),
        );

        self.outbox.broadcast(ServerMsg::CombatantSpawned {
            participant_id: owner_id,
            pose,
            health: combatant.health(),
            max_health: combatant.max_health(),
            score: combatant.score(),
        });

        info!(
            participant_id = %owner_id,
            x = pose.position.x,
            y = pose.position.y,
            attempts = placement.attempts,
            "Combatant spawned"
        );

        self.combatants.insert(owner_id, combatant);
        self.combatants.get(&owner_id)
    }

    /// Remove a combatant from the directory. Returns the sole survivor when
    /// exactly one combatant remains while still playing.
    pub fn eliminate(&mut self, id: ParticipantId) -> Result<Option<ParticipantId>, StaleEntity> {
        let mut combatant = self
            .combatants
            .remove(&id)
            .ok_or(StaleEntity::Combatant(id))?;
        combatant.retire();

        self.outbox.broadcast(ServerMsg::CombatantEliminated { participant_id: id });
        info!(participant_id = %id, remaining = self.combatants.len(), "Combatant eliminated");

        if self.snapshot.is_terminal() || self.combatants.len() != 1 {
            return Ok(None);
        }

        Ok(self.combatants.keys().next().copied())
    }

    /// Finalize a victory and announce it. Happens at most once.
    pub fn declare_victory(&mut self, winner_id: ParticipantId, display_name: String, score: i64) -> bool {
        if !self.snapshot.end_with_victory(winner_id) {
            return false;
        }

        info!(winner_id = %winner_id, "Match ended with victory");
        self.outbox.broadcast(ServerMsg::EndOfMatch {
            outcome: MatchOutcome::Victory {
                winner_id,
                display_name,
                score,
            },
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use uuid::Uuid;

    fn state(outbox: &Outbox) -> MatchState {
        MatchState::new(Bounds::square(10.0), UnitStats::default(), 0.1, outbox.clone())
    }

    #[test]
    fn snapshot_transitions_are_terminal() {
        let mut snapshot = MatchSnapshot::default();
        let winner = Uuid::new_v4();
        assert!(snapshot.end_with_victory(winner));
        assert!(!snapshot.end_with_disconnect());
        assert!(!snapshot.end_with_victory(Uuid::new_v4()));
        assert_eq!(snapshot.status(), MatchStatus::EndedVictory);
        assert_eq!(snapshot.winner_id(), Some(winner));

        let mut snapshot = MatchSnapshot::default();
        assert!(snapshot.end_with_disconnect());
        assert!(!snapshot.end_with_victory(winner));
        assert_eq!(snapshot.winner_id(), None);
    }

    #[test]
    fn spawns_are_separated_and_unique_per_owner() {
        let outbox = Outbox::new(64);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut m = state(&outbox);
        let ids: Vec<ParticipantId> = (0..4).map(|_| Uuid::new_v4()).collect();

        for id in &ids {
            assert!(m.spawn(*id, 0, &mut rng, &[]).is_some());
        }
        assert!(m.spawn(ids[0], 0, &mut rng, &[]).is_none());
        assert_eq!(m.active_count(), 4);

        let positions: Vec<_> = m.combatants().map(|c| c.pose().position).collect();
        for (i, a) in positions.iter().enumerate() {
            for b in positions.iter().skip(i + 1) {
                assert!(a.distance(*b) > 2.0);
            }
        }
    }

    #[test]
    fn last_one_standing_is_reported() {
        let outbox = Outbox::new(64);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut m = state(&outbox);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        for id in [a, b, c] {
            m.spawn(id, 0, &mut rng, &[]);
        }

        assert_eq!(m.eliminate(a), Ok(None));
        assert_eq!(m.eliminate(b), Ok(Some(c)));
        assert_eq!(m.eliminate(b), Err(StaleEntity::Combatant(b)));
    }

    #[test]
    fn victory_declared_once() {
        let outbox = Outbox::new(64);
        let mut rx = outbox.subscribe();
        let mut m = state(&outbox);
        let winner = Uuid::new_v4();

        assert!(m.declare_victory(winner, "w".into(), 3));
        assert!(!m.declare_victory(winner, "w".into(), 3));

        let ends = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e.msg, ServerMsg::EndOfMatch { .. }))
            .count();
        assert_eq!(ends, 1);
        assert_eq!(m.status(), MatchStatus::EndedVictory);
    }

    #[test]
    fn no_spawn_after_match_end() {
        let outbox = Outbox::new(64);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut m = state(&outbox);
        m.declare_victory(Uuid::new_v4(), "w".into(), 0);
        assert!(m.spawn(Uuid::new_v4(), 0, &mut rng, &[]).is_none());
    }
}
