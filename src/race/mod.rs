//! Race simulation: catalog, world state, effect engine, resolver,
//! lifecycle state machine, and outcome recording.
//!
//! One [`state::RaceState`] instance exists per race and is threaded
//! explicitly through every call; there is no process-wide race state.

pub mod catalog;
pub mod effect;
pub mod events;
pub mod outcome;
pub mod resolver;
pub mod state;
pub mod tick;

use crate::race::state::RaceId;

/// Errors from the race lifecycle and catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RaceError {
    /// A placement request referenced a power-up kind this build does
    /// not know. The placement is rejected; the tick is unaffected.
    #[error("unknown power-up kind `{0}`")]
    UnknownKind(String),

    /// Start commanded below the minimum entrant count; the race stays
    /// in the lobby.
    #[error("race needs at least {need} entrants, has {have}")]
    InsufficientEntrants {
        /// Entrants currently registered
        have: usize,
        /// Minimum required by the race config
        need: usize,
    },

    /// Start commanded on a race that already left the lobby.
    #[error("race already started")]
    AlreadyStarted,

    /// Outcome requested before the race reached its terminal phase.
    #[error("race is not finished")]
    RaceNotFinished,

    /// The race was aborted before the gate opened; it will never have
    /// an outcome. Stakes are refunded instead.
    #[error("race was voided before the gate opened")]
    RaceVoided,

    /// Second finalize attempt for the same race. This is a
    /// double-finalize bug in the caller, not a recoverable condition.
    #[error("outcome for race {} is already finalized", .0.to_uuid_string())]
    OutcomeAlreadyFinalized(RaceId),

    /// Operation on a race that already reached its terminal phase.
    #[error("race is already over")]
    RaceOver,
}
