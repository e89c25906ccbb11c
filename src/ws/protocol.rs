//! WebSocket protocol message definitions
//! These are the wire types for observer <-> authority communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::physics::{Pose, Vec2};

/// Stable participant identifier for the lifetime of a session
pub type ParticipantId = Uuid;

/// Pickup handle; never reused within an arena
pub type PickupId = u32;

/// Messages sent from an observer to the authoritative role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Scene finished loading; the authority may spawn this participant's combatant
    SceneReady,

    /// Client-simulated pose of the sender's own combatant (trusted as-is)
    PoseUpdate { pose: Pose },

    /// Fire from the given muzzle pose
    FireRequest { pose: Pose },

    /// Ask to change the sender's display name
    SetDisplayName { name: String },

    /// Locally displayed identity of a combatant is missing
    IdentityRebroadcastRequest { participant_id: ParticipantId },

    /// Sender saw its combatant touch a pickup. Visual only, never a collection claim.
    PickupContactNotice { pickup_id: PickupId },

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },
}

/// Messages sent from the authoritative role to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after admission
    Welcome {
        participant_id: ParticipantId,
        server_time: u64,
    },

    /// Connection refused
    Rejected { reason: RejectReason },

    /// Full roster after any add/remove/rename/score mutation
    RosterChanged { roster: Vec<ParticipantRecord> },

    /// Start gate passed; sent at most once per arena
    MatchStarted,

    /// A combatant entered the arena
    CombatantSpawned {
        participant_id: ParticipantId,
        pose: Pose,
        health: f32,
        max_health: f32,
        score: i64,
    },

    /// A combatant left the arena (killed or departed)
    CombatantEliminated { participant_id: ParticipantId },

    /// Relay of an owner's client-simulated pose
    PoseChanged {
        participant_id: ParticipantId,
        pose: Pose,
    },

    HealthChanged {
        participant_id: ParticipantId,
        health: f32,
    },

    ScoreChanged {
        participant_id: ParticipantId,
        score: i64,
    },

    /// Spawn a non-damaging ghost projectile at this pose
    SpawnGhost {
        owner_id: ParticipantId,
        pose: Pose,
        exclude_participant_id: ParticipantId,
    },

    /// Authoritative identity for a combatant
    IdentityRebroadcast {
        participant_id: ParticipantId,
        display_name: String,
        color_index: u8,
    },

    PickupSpawned {
        pickup_id: PickupId,
        position: Vec2,
        value: i64,
    },

    PickupRemoved { pickup_id: PickupId },

    /// Match is over
    EndOfMatch { outcome: MatchOutcome },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Why a connection attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    RosterFull,
    MatchEnded,
}

/// Replicated participant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub participant_id: ParticipantId,
    pub color_index: u8,
    pub display_name: String,
    pub score: i64,
}

/// How the match ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOutcome {
    Victory {
        winner_id: ParticipantId,
        display_name: String,
        score: i64,
    },
    /// Observed locally when connectivity to the authority is lost
    Disconnected,
}

/// Delivery scope of an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Only(ParticipantId),
    AllExcept(ParticipantId),
}

impl Audience {
    pub fn includes(&self, participant_id: ParticipantId) -> bool {
        match self {
            Audience::All => true,
            Audience::Only(id) => *id == participant_id,
            Audience::AllExcept(id) => *id != participant_id,
        }
    }
}

/// Outbound message plus its audience
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub msg: ServerMsg,
}
