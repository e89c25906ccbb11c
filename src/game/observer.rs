//! Non-authoritative view held by one connected participant

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use super::arena::GameRules;
use super::combatant::{InputSample, LocalController};
use super::identity::{Identity, IdentityAudit};
use super::physics::{PhysicsSystem, Pose, Vec2};
use super::projectile::{ContactTarget, Projectile};
use super::r#match::MatchSnapshot;
use super::replicated::Mirror;
use crate::ws::protocol::{
    ClientMsg, MatchOutcome, ParticipantId, ParticipantRecord, PickupId, RejectReason, ServerMsg,
};

/// Signals for the UI collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverEvent {
    RosterChanged(Vec<ParticipantRecord>),
    MatchStarted,
    MatchEnded(MatchOutcome),
    Rejected(RejectReason),
}

/// Replica of one combatant
#[derive(Debug, Clone)]
pub struct ObservedCombatant {
    pub participant_id: ParticipantId,
    pub pose: Pose,
    pub max_health: f32,
    pub identity: Identity,
    health: Mirror<f32>,
    score: Mirror<i64>,
    audit: IdentityAudit,
}

impl ObservedCombatant {
    pub fn health(&self) -> f32 {
        *self.health.get()
    }

    pub fn score(&self) -> i64 {
        *self.score.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservedPickup {
    pub position: Vec2,
    pub value: i64,
    /// Hidden after a local contact, until the authority removes it
    pub hidden: bool,
}

pub struct Observer {
    rules: GameRules,
    self_id: Option<ParticipantId>,
    roster: Mirror<Vec<ParticipantRecord>>,
    combatants: HashMap<ParticipantId, ObservedCombatant>,
    pickups: BTreeMap<PickupId, ObservedPickup>,
    ghosts: Vec<Projectile>,
    snapshot: MatchSnapshot,
    controller: Option<LocalController>,
    started: bool,
}

impl Observer {
    pub fn new(rules: GameRules) -> Self {
        Self {
            rules,
            self_id: None,
            roster: Mirror::new(Vec::new()),
            combatants: HashMap::new(),
            pickups: BTreeMap::new(),
            ghosts: Vec::new(),
            snapshot: MatchSnapshot::default(),
            controller: None,
            started: false,
        }
    }

    pub fn self_id(&self) -> Option<ParticipantId> {
        self.self_id
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn snapshot(&self) -> &MatchSnapshot {
        &self.snapshot
    }

    pub fn roster(&self) -> &[ParticipantRecord] {
        self.roster.get()
    }

    pub fn combatant(&self, id: ParticipantId) -> Option<&ObservedCombatant> {
        self.combatants.get(&id)
    }

    pub fn pickup(&self, id: PickupId) -> Option<&ObservedPickup> {
        self.pickups.get(&id)
    }

    pub fn pickups_visible(&self) -> usize {
        self.pickups.values().filter(|p| !p.hidden).count()
    }

    pub fn ghosts(&self) -> &[Projectile] {
        &self.ghosts
    }

    pub fn has_controller(&self) -> bool {
        self.controller.is_some()
    }

    /// Apply one inbound message. Replicas change only through here.
    pub fn apply(&mut self, msg: ServerMsg) -> Vec<ObserverEvent> {
        let mut events = Vec::new();

        match msg {
            ServerMsg::Welcome { participant_id, .. } => {
                self.self_id = Some(participant_id);
            }
            ServerMsg::Rejected { reason } => {
                info!(reason = ?reason, "Admission rejected");
                events.push(ObserverEvent::Rejected(reason));
            }
            ServerMsg::RosterChanged { roster } => {
                self.roster.apply(roster.clone());
                for combatant in self.combatants.values_mut() {
                    if let Some(identity) = identity_from(&roster, combatant.participant_id) {
                        combatant.identity = identity;
                    }
                }
                events.push(ObserverEvent::RosterChanged(roster));
            }
            ServerMsg::MatchStarted => {
                if !self.started {
                    self.started = true;
                    events.push(ObserverEvent::MatchStarted);
                }
            }
            ServerMsg::CombatantSpawned {
                participant_id,
                pose,
                health,
                max_health,
                score,
            } => self.spawn(participant_id, pose, health, max_health, score),
            ServerMsg::CombatantEliminated { participant_id } => {
                self.combatants.remove(&participant_id);
                if self.self_id == Some(participant_id) {
                    self.controller = None;
                }
            }
            ServerMsg::PoseChanged { participant_id, pose } => {
                if self.self_id != Some(participant_id) {
                    if let Some(combatant) = self.combatants.get_mut(&participant_id) {
                        combatant.pose = pose;
                    }
                }
            }
            ServerMsg::HealthChanged { participant_id, health } => {
                if let Some(combatant) = self.combatants.get_mut(&participant_id) {
                    combatant.health.apply(health);
                }
            }
            ServerMsg::ScoreChanged { participant_id, score } => {
                if let Some(combatant) = self.combatants.get_mut(&participant_id) {
                    combatant.score.apply(score);
                }
            }
            ServerMsg::SpawnGhost {
                owner_id,
                pose,
                exclude_participant_id,
            } => {
                if self.self_id != Some(exclude_participant_id) {
                    self.ghosts.push(Projectile::ghost(owner_id, pose, &self.rules.weapon));
                }
            }
            ServerMsg::IdentityRebroadcast {
                participant_id,
                display_name,
                color_index,
            } => {
                if let Some(combatant) = self.combatants.get_mut(&participant_id) {
                    combatant.identity = Identity {
                        display_name: Some(display_name),
                        color_index: Some(color_index),
                    };
                }
            }
            ServerMsg::PickupSpawned {
                pickup_id,
                position,
                value,
            } => {
                self.pickups.insert(
                    pickup_id,
                    ObservedPickup {
                        position,
                        value,
                        hidden: false,
                    },
                );
            }
            ServerMsg::PickupRemoved { pickup_id } => {
                self.pickups.remove(&pickup_id);
            }
            ServerMsg::EndOfMatch { outcome } => {
                let changed = match &outcome {
                    MatchOutcome::Victory { winner_id, .. } => self.snapshot.end_with_victory(*winner_id),
                    MatchOutcome::Disconnected => self.snapshot.end_with_disconnect(),
                };
                if changed {
                    events.push(ObserverEvent::MatchEnded(outcome));
                }
            }
            ServerMsg::Pong { .. } => {}
        }

        events
    }

    fn spawn(&mut self, participant_id: ParticipantId, pose: Pose, health: f32, max_health: f32, score: i64) {
        let identity = identity_from(self.roster.get(), participant_id).unwrap_or_default();
        self.combatants.insert(
            participant_id,
            ObservedCombatant {
                participant_id,
                pose,
                max_health,
                identity,
                health: Mirror::new(health),
                score: Mirror::new(score),
                audit: IdentityAudit::default(),
            },
        );

        if self.self_id == Some(participant_id) {
            self.controller = Some(LocalController::new(
                pose,
                self.rules.unit,
                self.rules.weapon,
                self.rules.bounds,
            ));
        }
    }

    /// One local simulation step. Returns the requests to send upstream.
    pub fn step(&mut self, input: InputSample, dt: f32) -> Vec<ClientMsg> {
        let mut requests = Vec::new();
        if self.snapshot.is_terminal() {
            return requests;
        }

        self.advance_ghosts(dt);

        if let (Some(controller), Some(me)) = (self.controller.as_mut(), self.self_id) {
            let step = controller.step(input, dt);
            if let Some(combatant) = self.combatants.get_mut(&me) {
                combatant.pose = step.pose;
            }
            requests.push(ClientMsg::PoseUpdate { pose: step.pose });

            if let Some(muzzle) = step.fired {
                self.ghosts.push(Projectile::ghost(me, muzzle, &self.rules.weapon));
                requests.push(ClientMsg::FireRequest { pose: muzzle });
            }

            let body_radius = self.rules.unit.body_radius;
            let contact_radius = self.rules.pickup.contact_radius;
            for (pickup_id, pickup) in self.pickups.iter_mut() {
                if pickup.hidden {
                    continue;
                }
                if PhysicsSystem::circles_overlap(step.pose.position, body_radius, pickup.position, contact_radius) {
                    // Visual only; the authority decides who collects.
                    pickup.hidden = true;
                    requests.push(ClientMsg::PickupContactNotice { pickup_id: *pickup_id });
                }
            }
        }

        for combatant in self.combatants.values_mut() {
            if combatant.audit.needs_repair(&combatant.identity) {
                debug!(participant_id = %combatant.participant_id, "Identity incomplete, requesting rebroadcast");
                requests.push(ClientMsg::IdentityRebroadcastRequest {
                    participant_id: combatant.participant_id,
                });
            }
        }

        requests
    }

    /// Ghosts fly until they expire or touch anything
    fn advance_ghosts(&mut self, dt: f32) {
        let bounds = self.rules.bounds;
        let body_radius = self.rules.unit.body_radius;
        let contact_radius = self.rules.pickup.contact_radius;
        let combatants = &self.combatants;
        let pickups = &self.pickups;

        self.ghosts.retain_mut(|ghost| {
            if !ghost.update(dt) {
                return false;
            }
            if ghost.outside(&bounds) {
                ghost.resolve_contact(ContactTarget::Obstacle);
                return false;
            }
            if let Some(hit) = combatants
                .values()
                .find(|c| ghost.touches(c.pose.position, body_radius))
            {
                ghost.resolve_contact(ContactTarget::Combatant(hit.participant_id));
                return false;
            }
            if pickups
                .values()
                .any(|p| !p.hidden && ghost.touches(p.position, contact_radius))
            {
                ghost.resolve_contact(ContactTarget::Obstacle);
                return false;
            }
            true
        });
    }

    /// Connectivity to the authority is gone. Never overrides a victory.
    pub fn connection_lost(&mut self) -> Option<ObserverEvent> {
        self.controller = None;
        if self.snapshot.end_with_disconnect() {
            info!("Connection lost, match ended");
            Some(ObserverEvent::MatchEnded(MatchOutcome::Disconnected))
        } else {
            None
        }
    }
}

fn identity_from(roster: &[ParticipantRecord], participant_id: ParticipantId) -> Option<Identity> {
    roster
        .iter()
        .find(|r| r.participant_id == participant_id)
        .map(|r| Identity {
            display_name: Some(r.display_name.clone()),
            color_index: Some(r.color_index),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::r#match::MatchStatus;
    use crate::util::time::tick_delta;
    use uuid::Uuid;

    fn joined() -> (Observer, ParticipantId) {
        let me = Uuid::new_v4();
        let mut view = Observer::new(GameRules::default());
        view.apply(ServerMsg::Welcome {
            participant_id: me,
            server_time: 0,
        });
        (view, me)
    }

    fn spawned(view: &mut Observer, id: ParticipantId, x: f32, y: f32) {
        view.apply(ServerMsg::CombatantSpawned {
            participant_id: id,
            pose: Pose::new(Vec2::new(x, y), 0.0),
            health: 10.0,
            max_health: 10.0,
            score: 0,
        });
    }

    fn idle() -> InputSample {
        InputSample::default()
    }

    fn fire() -> InputSample {
        InputSample {
            movement: Vec2::ZERO,
            fire: true,
        }
    }

    #[test]
    fn only_own_spawn_creates_controller() {
        let (mut view, me) = joined();
        spawned(&mut view, Uuid::new_v4(), 5.0, 5.0);
        assert!(!view.has_controller());
        spawned(&mut view, me, 0.0, 0.0);
        assert!(view.has_controller());

        view.apply(ServerMsg::CombatantEliminated { participant_id: me });
        assert!(!view.has_controller());
    }

    #[test]
    fn replicas_follow_inbound_diffs() {
        let (mut view, _) = joined();
        let other = Uuid::new_v4();
        spawned(&mut view, other, 5.0, 5.0);

        view.apply(ServerMsg::HealthChanged {
            participant_id: other,
            health: 7.0,
        });
        view.apply(ServerMsg::ScoreChanged {
            participant_id: other,
            score: 3,
        });
        let combatant = view.combatant(other).expect("combatant");
        assert_eq!(combatant.health(), 7.0);
        assert_eq!(combatant.score(), 3);
    }

    #[test]
    fn roster_and_start_events_surface_once() {
        let (mut view, me) = joined();
        let record = ParticipantRecord {
            participant_id: me,
            color_index: 0,
            display_name: "Ace".into(),
            score: 0,
        };
        let events = view.apply(ServerMsg::RosterChanged {
            roster: vec![record.clone()],
        });
        assert_eq!(events, vec![ObserverEvent::RosterChanged(vec![record])]);

        assert_eq!(view.apply(ServerMsg::MatchStarted), vec![ObserverEvent::MatchStarted]);
        assert!(view.apply(ServerMsg::MatchStarted).is_empty());
    }

    #[test]
    fn local_fire_spawns_ghost_and_request_with_cooldown() {
        let (mut view, me) = joined();
        spawned(&mut view, me, 0.0, 0.0);

        let requests = view.step(fire(), tick_delta());
        assert_eq!(view.ghosts().len(), 1);
        assert!(requests.iter().any(|r| matches!(r, ClientMsg::FireRequest { .. })));
        assert!(requests.iter().any(|r| matches!(r, ClientMsg::PoseUpdate { .. })));

        let requests = view.step(fire(), 0.05);
        assert!(!requests.iter().any(|r| matches!(r, ClientMsg::FireRequest { .. })));
    }

    #[test]
    fn spawn_ghost_skipped_for_excluded_requester() {
        let (mut view, me) = joined();
        view.apply(ServerMsg::SpawnGhost {
            owner_id: me,
            pose: Pose::default(),
            exclude_participant_id: me,
        });
        assert!(view.ghosts().is_empty());

        let other = Uuid::new_v4();
        view.apply(ServerMsg::SpawnGhost {
            owner_id: other,
            pose: Pose::default(),
            exclude_participant_id: other,
        });
        assert_eq!(view.ghosts().len(), 1);
    }

    #[test]
    fn ghost_destroyed_on_contact_without_damage() {
        let (mut view, me) = joined();
        let other = Uuid::new_v4();
        spawned(&mut view, me, 0.0, 0.0);
        spawned(&mut view, other, 1.5, 0.0);

        view.step(fire(), tick_delta());
        assert_eq!(view.ghosts().len(), 1);
        view.step(idle(), tick_delta());

        assert!(view.ghosts().is_empty());
        assert_eq!(view.combatant(other).expect("other").health(), 10.0);
    }

    #[test]
    fn pickup_contact_hides_without_scoring() {
        let (mut view, me) = joined();
        spawned(&mut view, me, 0.0, 0.0);
        view.apply(ServerMsg::PickupSpawned {
            pickup_id: 4,
            position: Vec2::new(0.5, 0.0),
            value: 1,
        });

        let requests = view.step(idle(), tick_delta());
        assert!(requests.contains(&ClientMsg::PickupContactNotice { pickup_id: 4 }));
        assert!(view.pickup(4).expect("pickup").hidden);
        assert_eq!(view.combatant(me).expect("me").score(), 0);

        let requests = view.step(idle(), tick_delta());
        assert!(!requests.contains(&ClientMsg::PickupContactNotice { pickup_id: 4 }));

        view.apply(ServerMsg::PickupRemoved { pickup_id: 4 });
        assert!(view.pickup(4).is_none());
    }

    #[test]
    fn identity_audit_requests_until_repaired() {
        let (mut view, _) = joined();
        let other = Uuid::new_v4();
        spawned(&mut view, other, 5.0, 5.0);

        let requests = view.step(idle(), tick_delta());
        assert_eq!(
            requests,
            vec![ClientMsg::IdentityRebroadcastRequest { participant_id: other }]
        );

        view.apply(ServerMsg::IdentityRebroadcast {
            participant_id: other,
            display_name: "Bee".into(),
            color_index: 1,
        });
        let repeats = (0..30)
            .flat_map(|_| view.step(idle(), tick_delta()))
            .filter(|r| matches!(r, ClientMsg::IdentityRebroadcastRequest { .. }))
            .count();
        assert_eq!(repeats, 0);
    }

    #[test]
    fn lost_connectivity_ends_match_unless_won() {
        let (mut view, _) = joined();
        assert_eq!(
            view.connection_lost(),
            Some(ObserverEvent::MatchEnded(MatchOutcome::Disconnected))
        );
        assert_eq!(view.snapshot().status(), MatchStatus::EndedDisconnect);
        assert!(view.step(fire(), tick_delta()).is_empty());

        let (mut view, _) = joined();
        let winner = Uuid::new_v4();
        let events = view.apply(ServerMsg::EndOfMatch {
            outcome: MatchOutcome::Victory {
                winner_id: winner,
                display_name: "w".into(),
                score: 0,
            },
        });
        assert_eq!(events.len(), 1);
        assert_eq!(view.connection_lost(), None);
        assert_eq!(view.snapshot().status(), MatchStatus::EndedVictory);
        assert_eq!(view.snapshot().winner_id(), Some(winner));
    }
}
