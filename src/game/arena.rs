//! Authoritative arena: single writer for roster, combatants, pickups and match state

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::{AdmissionRejected, SessionConfig, SessionCoordinator, StartGate};
use crate::util::time::{tick_delta, unix_millis, TICK_DURATION_MICROS};
use crate::ws::protocol::{ClientMsg, Envelope, ParticipantId, PickupId, ServerMsg};

use super::combatant::DamageOutcome;
use super::currency::{CurrencyDirector, PickupStats};
use super::physics::{Bounds, Pose, UnitStats};
use super::projectile::{ContactOutcome, ContactTarget, Projectile, ProjectileStats};
use super::r#match::{MatchState, MatchStatus};
use super::replicated::Outbox;

/// Shared gameplay definition, identical on the authority and every observer
#[derive(Debug, Clone, Copy)]
pub struct GameRules {
    pub bounds: Bounds,
    pub unit: UnitStats,
    pub weapon: ProjectileStats,
    pub pickup: PickupStats,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            bounds: Bounds::square(10.0),
            unit: UnitStats::default(),
            weapon: ProjectileStats::default(),
            pickup: PickupStats::default(),
        }
    }
}

/// Everything needed to open an arena
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub session: SessionConfig,
    pub rules: GameRules,
    pub pickup_count: usize,
    pub seed: u64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            rules: GameRules::default(),
            pickup_count: 7,
            seed: 0,
        }
    }
}

/// Commands from socket tasks to the arena loop
#[derive(Debug)]
pub enum ArenaCommand {
    Connect {
        display_name: String,
        reply: oneshot::Sender<Result<Admitted, AdmissionRejected>>,
    },
    Request {
        participant_id: ParticipantId,
        msg: ClientMsg,
    },
    Disconnect {
        participant_id: ParticipantId,
    },
}

/// Accepted connection: identity plus the outbound feed
#[derive(Debug)]
pub struct Admitted {
    pub participant_id: ParticipantId,
    pub outbound: broadcast::Receiver<Envelope>,
}

/// Read-only summary for health checks
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArenaStatus {
    pub roster_size: usize,
    pub started: bool,
    pub status: MatchStatus,
}

/// Request-only handle to a running arena
#[derive(Clone)]
pub struct ArenaHandle {
    pub id: Uuid,
    command_tx: mpsc::Sender<ArenaCommand>,
    status: Arc<RwLock<ArenaStatus>>,
}

impl ArenaHandle {
    pub fn status(&self) -> ArenaStatus {
        *self.status.read()
    }

    /// Ask for admission. A closed arena counts as an ended match.
    pub async fn connect(&self, display_name: String) -> Result<Admitted, AdmissionRejected> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(ArenaCommand::Connect { display_name, reply })
            .await
            .map_err(|_| AdmissionRejected::MatchEnded)?;
        rx.await.unwrap_or(Err(AdmissionRejected::MatchEnded))
    }

    /// Fire-and-forget request; lost if the arena is gone
    pub async fn request(&self, participant_id: ParticipantId, msg: ClientMsg) -> bool {
        self.command_tx
            .send(ArenaCommand::Request { participant_id, msg })
            .await
            .is_ok()
    }

    pub async fn disconnect(&self, participant_id: ParticipantId) {
        let _ = self
            .command_tx
            .send(ArenaCommand::Disconnect { participant_id })
            .await;
    }
}

/// Holds the currently open arena and replaces it after teardown
#[derive(Default)]
pub struct ArenaSlot {
    current: RwLock<Option<ArenaHandle>>,
}

impl ArenaSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<ArenaHandle> {
        self.current.read().clone()
    }

    pub fn install(&self, handle: ArenaHandle) {
        *self.current.write() = Some(handle);
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// Open arenas back to back for the life of the process
    pub async fn supervise(self: Arc<Self>, config: ArenaConfig, fixed_seed: Option<u64>) {
        loop {
            let seed = fixed_seed.unwrap_or_else(rand::random);
            let (arena, handle) = Arena::new(ArenaConfig {
                seed,
                ..config.clone()
            });
            let arena_id = handle.id;
            self.install(handle);

            arena.run().await;

            self.clear();
            info!(arena_id = %arena_id, "Arena torn down");
        }
    }
}

/// The authoritative arena
pub struct Arena {
    id: Uuid,
    rules: GameRules,
    coordinator: SessionCoordinator,
    match_state: MatchState,
    currency: CurrencyDirector,
    projectiles: Vec<Projectile>,
    rng: ChaCha8Rng,
    outbox: Outbox,
    command_rx: mpsc::Receiver<ArenaCommand>,
    status: Arc<RwLock<ArenaStatus>>,
    tick: u64,
}

impl Arena {
    /// Wire up a fresh arena and its handle
    pub fn new(config: ArenaConfig) -> (Self, ArenaHandle) {
        let id = Uuid::new_v4();
        let (command_tx, command_rx) = mpsc::channel(256);
        let outbox = Outbox::new(256);
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let rules = config.rules;

        let fire_period = rules.weapon.cooldown();

        let coordinator = SessionCoordinator::new(
            config.session,
            ChaCha8Rng::seed_from_u64(rng.gen()),
            outbox.clone(),
        );
        let match_state = MatchState::new(rules.bounds, rules.unit, fire_period, outbox.clone());
        let currency = CurrencyDirector::new(config.pickup_count, rules.pickup, rules.bounds, outbox.clone());

        let status = Arc::new(RwLock::new(ArenaStatus {
            roster_size: 0,
            started: false,
            status: MatchStatus::Playing,
        }));

        let handle = ArenaHandle {
            id,
            command_tx,
            status: status.clone(),
        };

        let arena = Self {
            id,
            rules,
            coordinator,
            match_state,
            currency,
            projectiles: Vec::new(),
            rng,
            outbox,
            command_rx,
            status,
            tick: 0,
        };

        (arena, handle)
    }

    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    pub fn match_state(&self) -> &MatchState {
        &self.match_state
    }

    pub fn currency(&self) -> &CurrencyDirector {
        &self.currency
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    /// Terminal match, or everyone gone after the start
    pub fn is_finished(&self) -> bool {
        self.match_state.snapshot().is_terminal()
            || (self.coordinator.is_started() && self.coordinator.roster().is_empty())
    }

    /// Run the authoritative tick loop until the arena is finished
    pub async fn run(mut self) {
        info!(arena_id = %self.id, "Arena open");

        let mut tick_interval = interval(Duration::from_micros(TICK_DURATION_MICROS));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let dt = tick_delta();

        loop {
            tick_interval.tick().await;

            while let Ok(command) = self.command_rx.try_recv() {
                self.handle_command(command);
            }

            self.step(dt);
            self.publish_status();

            if self.is_finished() {
                break;
            }
        }

        info!(
            arena_id = %self.id,
            ticks = self.tick,
            status = ?self.match_state.status(),
            "Arena closed"
        );
    }

    pub fn handle_command(&mut self, command: ArenaCommand) {
        match command {
            ArenaCommand::Connect { display_name, reply } => {
                let result = self.connect(&display_name);
                if let Err(Ok(admitted)) = reply.send(result) {
                    // Socket went away while waiting for the reply.
                    self.disconnect(admitted.participant_id);
                }
            }
            ArenaCommand::Request { participant_id, msg } => self.handle_request(participant_id, msg),
            ArenaCommand::Disconnect { participant_id } => self.disconnect(participant_id),
        }
    }

    /// Admission plus catch-up for the newcomer
    pub fn connect(&mut self, display_name: &str) -> Result<Admitted, AdmissionRejected> {
        let participant_id = Uuid::new_v4();
        let admission = self
            .coordinator
            .admit(participant_id, display_name, self.match_state.status())?;

        let outbound = self.outbox.subscribe();
        self.send_catch_up(participant_id);

        match admission.gate {
            StartGate::Waiting => {}
            StartGate::MatchStarted => {
                let occupants = self.match_state.occupants();
                self.currency.initialize(&mut self.rng, &occupants);
            }
            StartGate::LateJoin => {
                info!(participant_id = %participant_id, "Late join, spawning immediately");
                self.spawn_combatant(participant_id);
            }
        }

        self.publish_status();
        Ok(Admitted {
            participant_id,
            outbound,
        })
    }

    /// Unicast the current world to a participant that just subscribed
    fn send_catch_up(&self, participant_id: ParticipantId) {
        self.outbox.send_to(
            participant_id,
            ServerMsg::Welcome {
                participant_id,
                server_time: unix_millis(),
            },
        );
        self.outbox.send_to(
            participant_id,
            ServerMsg::RosterChanged {
                roster: self.coordinator.roster().to_vec(),
            },
        );
        if self.coordinator.is_started() {
            self.outbox.send_to(participant_id, ServerMsg::MatchStarted);
        }
        for combatant in self.match_state.combatants() {
            self.outbox.send_to(
                participant_id,
                ServerMsg::CombatantSpawned {
                    participant_id: combatant.owner_id(),
                    pose: combatant.pose(),
                    health: combatant.health(),
                    max_health: combatant.max_health(),
                    score: combatant.score(),
                },
            );
        }
        for pickup in self.currency.pickups() {
            self.outbox.send_to(participant_id, pickup.spawned_msg());
        }
    }

    /// Inbound request from an admitted participant
    pub fn handle_request(&mut self, participant_id: ParticipantId, msg: ClientMsg) {
        if !self.coordinator.contains(participant_id) {
            debug!(participant_id = %participant_id, "Request from unknown participant ignored");
            return;
        }

        match msg {
            ClientMsg::SceneReady => {
                if self.coordinator.is_started() {
                    self.spawn_combatant(participant_id);
                } else {
                    debug!(participant_id = %participant_id, "Scene ready before start, ignored");
                }
            }
            ClientMsg::PoseUpdate { pose } => {
                if let Some(combatant) = self.match_state.get_mut(participant_id) {
                    combatant.set_pose(pose);
                    self.outbox
                        .send_except(participant_id, ServerMsg::PoseChanged { participant_id, pose });
                }
            }
            ClientMsg::FireRequest { pose } => self.fire(participant_id, pose),
            ClientMsg::SetDisplayName { name } => {
                if let Err(e) = self.coordinator.set_display_name(participant_id, &name) {
                    warn!(participant_id = %participant_id, error = %e, "Display name rejected");
                }
            }
            ClientMsg::IdentityRebroadcastRequest {
                participant_id: subject,
            } => self.rebroadcast_identity(subject),
            ClientMsg::PickupContactNotice { pickup_id } => {
                debug!(participant_id = %participant_id, pickup_id, "Pickup contact notice (visual only)");
            }
            ClientMsg::Ping { t } => self.outbox.send_to(participant_id, ServerMsg::Pong { t }),
        }
    }

    /// Connection lost or closed
    pub fn disconnect(&mut self, participant_id: ParticipantId) {
        if self.coordinator.remove(participant_id).is_none() {
            return;
        }

        if self.match_state.get(participant_id).is_some() {
            self.eliminate(participant_id);
        }
        self.publish_status();
    }

    fn spawn_combatant(&mut self, participant_id: ParticipantId) {
        let starting_score = self
            .coordinator
            .record(participant_id)
            .map(|r| r.score)
            .unwrap_or(0);
        let pickups = self.currency.occupants();
        self.match_state
            .spawn(participant_id, starting_score, &mut self.rng, &pickups);
    }

    fn fire(&mut self, participant_id: ParticipantId, pose: Pose) {
        if self.match_state.snapshot().is_terminal() {
            return;
        }

        let accepted = self
            .match_state
            .get_mut(participant_id)
            .map(|c| c.accept_fire())
            .unwrap_or(false);

        if !accepted {
            debug!(participant_id = %participant_id, "Fire request rejected");
            return;
        }

        self.projectiles
            .push(Projectile::real(participant_id, pose, &self.rules.weapon));
        self.outbox.send_except(
            participant_id,
            ServerMsg::SpawnGhost {
                owner_id: participant_id,
                pose,
                exclude_participant_id: participant_id,
            },
        );
    }

    fn rebroadcast_identity(&mut self, subject: ParticipantId) {
        let Some(record) = self.coordinator.record(subject) else {
            debug!(participant_id = %subject, "Identity rebroadcast for unknown participant");
            return;
        };

        self.outbox.broadcast(ServerMsg::IdentityRebroadcast {
            participant_id: subject,
            display_name: record.display_name.clone(),
            color_index: record.color_index,
        });
        if let Some(combatant) = self.match_state.get(subject) {
            combatant.rebroadcast();
        }
    }

    /// One simulation tick
    pub fn step(&mut self, dt: f32) {
        self.tick += 1;

        if self.match_state.snapshot().is_terminal() {
            return;
        }

        for combatant in self.match_state.combatants_mut() {
            combatant.tick(dt);
        }

        for (target_id, damage) in self.update_projectiles(dt) {
            self.apply_hit(target_id, damage);
        }

        self.collect_pickups();
    }

    /// Move Real projectiles and resolve their contacts
    fn update_projectiles(&mut self, dt: f32) -> Vec<(ParticipantId, f32)> {
        let mut hits = Vec::new();
        let bounds = *self.match_state.bounds();
        let bodies: Vec<(ParticipantId, Pose, f32)> = self
            .match_state
            .combatants()
            .map(|c| (c.owner_id(), c.pose(), c.stats().body_radius))
            .collect();

        self.projectiles.retain_mut(|projectile| {
            if !projectile.update(dt) {
                return false;
            }

            if projectile.outside(&bounds) {
                projectile.resolve_contact(ContactTarget::Obstacle);
                return false;
            }

            for (id, pose, radius) in &bodies {
                if !projectile.touches(pose.position, *radius) {
                    continue;
                }

                match projectile.resolve_contact(ContactTarget::Combatant(*id)) {
                    ContactOutcome::IgnoredSelfContact => {
                        debug!(projectile_id = %projectile.id, "Projectile touching its owner ignored");
                    }
                    ContactOutcome::Hit { target_id, damage } => {
                        hits.push((target_id, damage));
                        return false;
                    }
                    ContactOutcome::Destroyed => return false,
                }
            }

            true
        });

        hits
    }

    fn apply_hit(&mut self, target_id: ParticipantId, damage: f32) {
        let Some(target) = self.match_state.get_mut(target_id) else {
            debug!(participant_id = %target_id, "Hit on a combatant that is already gone");
            return;
        };

        match target.apply_damage(damage) {
            DamageOutcome::Eliminated => self.eliminate(target_id),
            DamageOutcome::Wounded { health } => {
                debug!(participant_id = %target_id, health, "Combatant hit");
            }
            DamageOutcome::AlreadyEliminated => {}
        }
    }

    /// Remove a combatant and run win detection
    fn eliminate(&mut self, participant_id: ParticipantId) {
        let survivor = match self.match_state.eliminate(participant_id) {
            Ok(survivor) => survivor,
            Err(stale) => {
                debug!(error = %stale, "Elimination ignored");
                return;
            }
        };

        let Some(winner_id) = survivor else {
            return;
        };

        // Admission closes before the snapshot turns terminal.
        self.coordinator.close_admission();

        let (display_name, score) = self
            .coordinator
            .record(winner_id)
            .map(|r| (r.display_name.clone(), r.score))
            .unwrap_or_default();
        self.match_state.declare_victory(winner_id, display_name, score);
        self.publish_status();
    }

    /// Authoritative combatant/pickup overlap
    fn collect_pickups(&mut self) {
        let bodies: Vec<(ParticipantId, Pose, f32)> = self
            .match_state
            .combatants()
            .map(|c| (c.owner_id(), c.pose(), c.stats().body_radius))
            .collect();

        for (collector, pose, radius) in bodies {
            for pickup_id in self.currency.contacts(pose.position, radius) {
                self.collect(collector, pickup_id);
            }
        }
    }

    fn collect(&mut self, collector: ParticipantId, pickup_id: PickupId) {
        let occupants = self.match_state.occupants();
        let collection = match self.currency.collect(pickup_id, &mut self.rng, &occupants) {
            Ok(collection) => collection,
            Err(stale) => {
                debug!(participant_id = %collector, error = %stale, "Collection ignored");
                return;
            }
        };

        let Some(combatant) = self.match_state.get_mut(collector) else {
            return;
        };
        let score = combatant.credit(collection.value);

        if let Err(e) = self.coordinator.update_score(collector, score) {
            warn!(participant_id = %collector, error = %e, "Score update failed");
        }
    }

    fn publish_status(&self) {
        let mut status = self.status.write();
        status.roster_size = self.coordinator.roster().len();
        status.started = self.coordinator.is_started();
        status.status = self.match_state.status();
    }
}
