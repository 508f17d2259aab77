//! Betting: bet intake while the window is open, and exactly-once
//! settlement against a finalized outcome.

pub mod book;
pub mod settlement;

use crate::race::state::{EntityId, RaceId};

/// Monetary amount in minor units (e.g. cents). Integer arithmetic
/// keeps settlement exact and replayable.
pub type Credits = u64;

/// Errors from bet intake and settlement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BettingError {
    /// The betting window closed when the gate opened.
    #[error("betting is closed for this race")]
    BettingClosed,

    /// Bet amount must be greater than zero.
    #[error("bet stake must be greater than zero")]
    ZeroStake,

    /// Odds must be positive.
    #[error("bet odds must be positive")]
    InvalidOdds,

    /// The selected entrant is not registered in this race.
    #[error("entity {0} is not entered in this race")]
    UnknownEntity(EntityId),

    /// The bet references a different race than the one offered.
    #[error("bet is for a different race")]
    RaceMismatch,

    /// A bet with this id was already placed.
    #[error("a bet with this id already exists")]
    DuplicateBet,

    /// No finalized outcome exists for the referenced race yet.
    /// Settlement must wait and retry; this is not a permanent failure.
    #[error("no outcome recorded for race {}", .0.to_uuid_string())]
    UnknownRace(RaceId),

    /// Refunds are only defined for voided races.
    #[error("race {} was not voided; settle it against its outcome", .0.to_uuid_string())]
    NotVoided(RaceId),
}
