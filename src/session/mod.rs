//! Participant roster and admission

pub mod coordinator;

pub use coordinator::{
    AdmissionRejected, ColorPolicy, RequestError, SessionConfig, SessionCoordinator, SessionEvent, StartGate,
    MAX_PLAYERS,
};
