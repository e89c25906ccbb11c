//! Session coordinator - roster, admission, start gating, end-of-match lock

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::game::r#match::MatchStatus;
use crate::game::replicated::Outbox;
use crate::ws::protocol::{ParticipantId, ParticipantRecord, RejectReason, ServerMsg};

/// Hard cap on participants per match
pub const MAX_PLAYERS: usize = 4;

/// Longest display name, in bytes
pub const MAX_DISPLAY_NAME_BYTES: usize = 64;

/// How colors are picked for new participants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPolicy {
    /// Lowest unused index
    FirstFit,
    /// Random unused index, bounded retries, then first fit
    Random,
}

/// Coordinator settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_players: usize,
    /// Roster size that opens the start gate
    pub min_players: usize,
    /// Palette size; at least `max_players`
    pub color_count: u8,
    pub color_policy: ColorPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: MAX_PLAYERS,
            min_players: 2,
            color_count: 6,
            color_policy: ColorPolicy::FirstFit,
        }
    }
}

/// Connection refused by admission policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionRejected {
    #[error("roster is full")]
    RosterFull,

    #[error("match has ended")]
    MatchEnded,
}

impl AdmissionRejected {
    pub fn reason(&self) -> RejectReason {
        match self {
            AdmissionRejected::RosterFull => RejectReason::RosterFull,
            AdmissionRejected::MatchEnded => RejectReason::MatchEnded,
        }
    }
}

/// Invalid observer request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("participant {0} is not on the roster")]
    UnknownParticipant(ParticipantId),

    #[error("display name must not be blank")]
    BlankDisplayName,
}

/// Where the start gate stands after an admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartGate {
    /// Not enough participants yet
    Waiting,
    /// This admission opened the gate
    MatchStarted,
    /// Match already running; the newcomer joins late
    LateJoin,
}

/// Accepted connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub record: ParticipantRecord,
    pub gate: StartGate,
}

/// Outward notifications for the UI collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RosterChanged(Vec<ParticipantRecord>),
    MatchStarted,
    LateJoin(ParticipantId),
    AdmissionClosed,
}

/// Owns the roster on the authoritative role
#[derive(Debug)]
pub struct SessionCoordinator {
    config: SessionConfig,
    roster: Vec<ParticipantRecord>,
    started: bool,
    ended: bool,
    rng: ChaCha8Rng,
    outbox: Outbox,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionCoordinator {
    pub fn new(config: SessionConfig, rng: ChaCha8Rng, outbox: Outbox) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            config,
            roster: Vec::with_capacity(MAX_PLAYERS),
            started: false,
            ended: false,
            rng,
            outbox,
            events,
        }
    }

    /// Register for outward events; dropping the receiver unsubscribes
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn roster(&self) -> &[ParticipantRecord] {
        &self.roster
    }

    pub fn record(&self, participant_id: ParticipantId) -> Option<&ParticipantRecord> {
        self.roster.iter().find(|r| r.participant_id == participant_id)
    }

    pub fn contains(&self, participant_id: ParticipantId) -> bool {
        self.record(participant_id).is_some()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Admission policy. `status` is the current match snapshot state.
    pub fn admit(
        &mut self,
        participant_id: ParticipantId,
        display_name: &str,
        status: MatchStatus,
    ) -> Result<Admission, AdmissionRejected> {
        let limit = self.config.max_players.min(MAX_PLAYERS);
        if self.roster.len() >= limit {
            info!(participant_id = %participant_id, "Admission rejected, roster full");
            return Err(AdmissionRejected::RosterFull);
        }

        if self.ended || status != MatchStatus::Playing {
            info!(participant_id = %participant_id, "Admission rejected, match ended");
            return Err(AdmissionRejected::MatchEnded);
        }

        let color_index = match self.config.color_policy {
            ColorPolicy::FirstFit => self.first_available_color(),
            ColorPolicy::Random => self.random_available_color(),
        };

        let display_name = sanitize_display_name(display_name)
            .unwrap_or_else(|| format!("Player{}", self.roster.len() + 1));

        let record = ParticipantRecord {
            participant_id,
            color_index,
            display_name,
            score: 0,
        };
        self.roster.push(record.clone());
        self.publish_roster();

        info!(
            participant_id = %participant_id,
            color_index,
            roster_size = self.roster.len(),
            "Participant admitted"
        );

        let gate = self.evaluate_start(participant_id);
        Ok(Admission { record, gate })
    }

    /// Start gate: opens at most once, later arrivals are late joins
    fn evaluate_start(&mut self, participant_id: ParticipantId) -> StartGate {
        if self.started {
            let _ = self.events.send(SessionEvent::LateJoin(participant_id));
            return StartGate::LateJoin;
        }

        if self.roster.len() < self.config.min_players {
            return StartGate::Waiting;
        }

        self.started = true;
        self.outbox.broadcast(ServerMsg::MatchStarted);
        let _ = self.events.send(SessionEvent::MatchStarted);
        info!(roster_size = self.roster.len(), "Match started");
        StartGate::MatchStarted
    }

    /// Drop a departed participant
    pub fn remove(&mut self, participant_id: ParticipantId) -> Option<ParticipantRecord> {
        let index = self
            .roster
            .iter()
            .position(|r| r.participant_id == participant_id)?;
        let record = self.roster.remove(index);
        self.publish_roster();
        info!(participant_id = %participant_id, "Participant removed from roster");
        Some(record)
    }

    /// Validate and apply a display-name change requested by its owner
    pub fn set_display_name(
        &mut self,
        participant_id: ParticipantId,
        name: &str,
    ) -> Result<(), RequestError> {
        let name = sanitize_display_name(name).ok_or(RequestError::BlankDisplayName)?;
        let record = self
            .roster
            .iter_mut()
            .find(|r| r.participant_id == participant_id)
            .ok_or(RequestError::UnknownParticipant(participant_id))?;

        if record.display_name == name {
            return Ok(());
        }
        record.display_name = name;
        self.publish_roster();
        Ok(())
    }

    /// Score-update path; the only writer of a record's score
    pub fn update_score(&mut self, participant_id: ParticipantId, score: i64) -> Result<(), RequestError> {
        let record = self
            .roster
            .iter_mut()
            .find(|r| r.participant_id == participant_id)
            .ok_or(RequestError::UnknownParticipant(participant_id))?;

        if record.score == score {
            return Ok(());
        }
        record.score = score;
        self.publish_roster();
        Ok(())
    }

    /// Permanently block admission. Set before the match snapshot is finalized.
    pub fn close_admission(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        let _ = self.events.send(SessionEvent::AdmissionClosed);
        info!("Admission closed");
    }

    /// Lowest color index no active record uses
    pub fn first_available_color(&self) -> u8 {
        (0..self.config.color_count)
            .find(|c| self.is_color_available(*c))
            .unwrap_or(0)
    }

    /// Random unused color, bounded to color_count² samples before falling back to first fit
    pub fn random_available_color(&mut self) -> u8 {
        let count = self.config.color_count;
        if count == 0 {
            return 0;
        }

        let max_attempts = usize::from(count) * usize::from(count);
        for _ in 0..max_attempts {
            let candidate = self.rng.gen_range(0..count);
            if self.is_color_available(candidate) {
                return candidate;
            }
        }

        debug!("Random color sampling exhausted, using first fit");
        self.first_available_color()
    }

    pub fn is_color_available(&self, color_index: u8) -> bool {
        self.roster.iter().all(|r| r.color_index != color_index)
    }

    fn publish_roster(&self) {
        let roster = self.roster.clone();
        self.outbox.broadcast(ServerMsg::RosterChanged {
            roster: roster.clone(),
        });
        if self.events.send(SessionEvent::RosterChanged(roster)).is_err() {
            debug!("No roster subscribers");
        }
    }
}

/// Trim and cap a display name; `None` when blank
pub fn sanitize_display_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.len() <= MAX_DISPLAY_NAME_BYTES {
        return Some(trimmed.to_string());
    }

    let mut end = MAX_DISPLAY_NAME_BYTES;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    warn!(len = trimmed.len(), "Display name truncated");
    Some(trimmed[..end].to_string())
}
