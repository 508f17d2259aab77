//! Bet Book
//!
//! Accepts bet placements while the race still allows them and hands
//! the accepted set to settlement. The book validates against the race
//! state it is offered; it never mutates the race.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::betting::{BettingError, Credits};
use crate::core::fixed::Fixed;
use crate::race::state::{EntityId, RaceId, RaceState};

/// Unique bet identifier (UUID as bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BetId(pub [u8; 16]);

impl BetId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Generate a fresh random id.
    ///
    /// Intake only - nothing inside the deterministic core calls this.
    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }
}

impl fmt::Display for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uuid_string())
    }
}

/// A placed bet. Read-only input to settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    /// Bet identifier
    pub id: BetId,
    /// Race the bet is against
    pub race_id: RaceId,
    /// Selected entrant
    pub entity_id: EntityId,
    /// Stake in minor units
    pub stake: Credits,
    /// Decimal odds as Q16.16 (3.0 pays 3x the stake)
    pub odds: Fixed,
}

/// Ledger of accepted bets, keyed by bet id.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BetBook {
    bets: BTreeMap<BetId, Bet>,
}

impl BetBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a bet against the given race.
    ///
    /// Placements are accepted only while the race is in lobby or
    /// countdown; the window closes the moment the gate opens.
    pub fn place(&mut self, race: &RaceState, bet: Bet) -> Result<(), BettingError> {
        if bet.race_id != race.id {
            return Err(BettingError::RaceMismatch);
        }
        if !race.phase.accepts_bets() {
            return Err(BettingError::BettingClosed);
        }
        if bet.stake == 0 {
            return Err(BettingError::ZeroStake);
        }
        if bet.odds <= 0 {
            return Err(BettingError::InvalidOdds);
        }
        if race.entity(bet.entity_id).is_none() {
            return Err(BettingError::UnknownEntity(bet.entity_id));
        }
        if self.bets.contains_key(&bet.id) {
            return Err(BettingError::DuplicateBet);
        }

        self.bets.insert(bet.id, bet);
        Ok(())
    }

    /// All accepted bets for a race, in ascending bet-id order.
    pub fn bets_for(&self, race_id: RaceId) -> Vec<Bet> {
        self.bets
            .values()
            .filter(|b| b.race_id == race_id)
            .cloned()
            .collect()
    }

    /// Number of accepted bets across all races.
    pub fn len(&self) -> usize {
        self.bets.len()
    }

    /// Is the book empty?
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{to_fixed, BASE_RACE_SPEED};
    use crate::race::state::RacePhase;

    fn lobby_race() -> RaceState {
        let mut state = RaceState::new(RaceId::new([1; 16]), "classic", 5);
        state.add_entrant(EntityId(1), "a", BASE_RACE_SPEED);
        state.add_entrant(EntityId(2), "b", BASE_RACE_SPEED);
        state
    }

    fn bet_on(race: &RaceState, n: u8, entity: EntityId) -> Bet {
        Bet {
            id: BetId::new([n; 16]),
            race_id: race.id,
            entity_id: entity,
            stake: 100,
            odds: to_fixed(3.0),
        }
    }

    #[test]
    fn test_place_in_lobby_and_countdown() {
        let mut race = lobby_race();
        let mut book = BetBook::new();

        book.place(&race, bet_on(&race, 1, EntityId(1))).unwrap();

        race.phase = RacePhase::Countdown { ticks_remaining: 10 };
        book.place(&race, bet_on(&race, 2, EntityId(2))).unwrap();

        assert_eq!(book.len(), 2);
    }

    #[test]
    fn test_rejected_once_gate_opens() {
        let mut race = lobby_race();
        let mut book = BetBook::new();

        race.phase = RacePhase::Running;
        let err = book.place(&race, bet_on(&race, 1, EntityId(1))).unwrap_err();
        assert_eq!(err, BettingError::BettingClosed);

        race.phase = RacePhase::Finished;
        let err = book.place(&race, bet_on(&race, 2, EntityId(1))).unwrap_err();
        assert_eq!(err, BettingError::BettingClosed);
    }

    #[test]
    fn test_zero_stake_rejected() {
        let race = lobby_race();
        let mut book = BetBook::new();

        let mut bet = bet_on(&race, 1, EntityId(1));
        bet.stake = 0;
        assert_eq!(book.place(&race, bet).unwrap_err(), BettingError::ZeroStake);
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let race = lobby_race();
        let mut book = BetBook::new();

        let err = book.place(&race, bet_on(&race, 1, EntityId(99))).unwrap_err();
        assert_eq!(err, BettingError::UnknownEntity(EntityId(99)));
    }

    #[test]
    fn test_duplicate_bet_rejected() {
        let race = lobby_race();
        let mut book = BetBook::new();

        book.place(&race, bet_on(&race, 1, EntityId(1))).unwrap();
        let err = book.place(&race, bet_on(&race, 1, EntityId(2))).unwrap_err();
        assert_eq!(err, BettingError::DuplicateBet);
    }

    #[test]
    fn test_race_mismatch_rejected() {
        let race = lobby_race();
        let mut book = BetBook::new();

        let mut bet = bet_on(&race, 1, EntityId(1));
        bet.race_id = RaceId::new([9; 16]);
        assert_eq!(book.place(&race, bet).unwrap_err(), BettingError::RaceMismatch);
    }

    #[test]
    fn test_bets_for_ascending_id_order() {
        let race = lobby_race();
        let mut book = BetBook::new();

        book.place(&race, bet_on(&race, 7, EntityId(1))).unwrap();
        book.place(&race, bet_on(&race, 2, EntityId(2))).unwrap();
        book.place(&race, bet_on(&race, 5, EntityId(1))).unwrap();

        let ids: Vec<BetId> = book.bets_for(race.id).iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![BetId::new([2; 16]), BetId::new([5; 16]), BetId::new([7; 16])]);
    }
}
