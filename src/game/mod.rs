//! Arena simulation modules

pub mod arena;
pub mod combatant;
pub mod currency;
pub mod identity;
pub mod r#match;
pub mod observer;
pub mod physics;
pub mod placement;
pub mod projectile;
pub mod replicated;

pub use arena::{Arena, ArenaConfig, ArenaHandle, ArenaSlot};

use crate::ws::protocol::{ParticipantId, PickupId};

/// Request referencing an entity that no longer exists. Resolves to a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StaleEntity {
    #[error("pickup {0} no longer exists")]
    Pickup(PickupId),

    #[error("combatant for participant {0} no longer exists")]
    Combatant(ParticipantId),
}
