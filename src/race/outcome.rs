//! Outcome Recording
//!
//! Freezes the finishing order of a race exactly once. Every later read
//! observes the same record; a second finalize attempt is a bug in the
//! caller and fails loudly.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::race::state::{EntityId, EntityStatus, RaceId, RaceState};
use crate::race::RaceError;

/// The single authoritative finishing order for one race.
///
/// Immutable once produced. The `mode` tag rides along so the
/// persistence collaborator can store it on the race row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Race this outcome belongs to
    pub race_id: RaceId,
    /// Game-mode tag for the race row
    pub mode: String,
    /// Every entrant exactly once, best placement first
    pub ordered_finishers: Vec<EntityId>,
    /// Finish tick per entrant that crossed the line; entrants ranked
    /// by position at timeout have no entry
    pub finish_ticks: BTreeMap<EntityId, u32>,
}

impl Outcome {
    /// The winning entrant.
    pub fn winner(&self) -> Option<EntityId> {
        self.ordered_finishers.first().copied()
    }
}

/// Rank all entrants of a (possibly still running) race.
///
/// Finishers order by ascending finish tick, simultaneous crossings by
/// ascending entity id. Entrants still on the track rank after every
/// finisher, by descending position, ties again by ascending id.
pub fn ranking(state: &RaceState) -> Vec<EntityId> {
    let mut finishers: Vec<(u32, EntityId)> = Vec::new();
    let mut stragglers: Vec<(i32, EntityId)> = Vec::new();

    for entity in state.entities.values() {
        match (entity.status, entity.finish_tick) {
            (EntityStatus::Finished, Some(tick)) => finishers.push((tick, entity.id)),
            _ => stragglers.push((entity.position.x, entity.id)),
        }
    }

    finishers.sort_by_key(|(tick, id)| (*tick, *id));
    // Descending position; entity id ascends within equal positions
    stragglers.sort_by_key(|(x, id)| (std::cmp::Reverse(*x), *id));

    finishers
        .into_iter()
        .map(|(_, id)| id)
        .chain(stragglers.into_iter().map(|(_, id)| id))
        .collect()
}

/// Records one outcome per race, exactly once.
#[derive(Clone, Debug, Default)]
pub struct OutcomeRecorder {
    outcomes: BTreeMap<RaceId, Outcome>,
}

impl OutcomeRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the outcome of a finished race.
    ///
    /// Fails with [`RaceError::RaceNotFinished`] before the terminal
    /// phase, [`RaceError::RaceVoided`] for a race aborted before the
    /// gate, and [`RaceError::OutcomeAlreadyFinalized`] on a second
    /// write - the latter indicates a double-finalize bug upstream.
    pub fn finalize(&mut self, state: &RaceState) -> Result<&Outcome, RaceError> {
        if !state.is_over() {
            return Err(RaceError::RaceNotFinished);
        }
        if state.voided {
            return Err(RaceError::RaceVoided);
        }
        if self.outcomes.contains_key(&state.id) {
            return Err(RaceError::OutcomeAlreadyFinalized(state.id));
        }

        let ordered_finishers = ranking(state);
        let finish_ticks = state
            .entities
            .values()
            .filter_map(|e| e.finish_tick.map(|t| (e.id, t)))
            .collect();

        let outcome = Outcome {
            race_id: state.id,
            mode: state.mode.clone(),
            ordered_finishers,
            finish_ticks,
        };

        Ok(self.outcomes.entry(state.id).or_insert(outcome))
    }

    /// Read a frozen outcome.
    pub fn get(&self, race_id: RaceId) -> Option<&Outcome> {
        self.outcomes.get(&race_id)
    }
}

// =============================================================================
// TESTS
// =============================================================================
