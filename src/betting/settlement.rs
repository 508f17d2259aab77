//! Bet Settlement
//!
//! Computes payouts against a finalized outcome, exactly once per
//! `(race, bet)`. Idempotence comes from recording the settlement
//! marker before anything else observes the result: a retry - or a
//! concurrent attempt on another copy of the same inputs - converges on
//! the stored record rather than recomputing. No mutual exclusion is
//! needed for correctness.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tracing::{info, warn};

use crate::betting::book::{Bet, BetId};
use crate::betting::{BettingError, Credits};
use crate::core::fixed::{Fixed, FIXED_SCALE};
use crate::race::outcome::{Outcome, OutcomeRecorder};
use crate::race::state::{RaceId, RaceState};

/// Payout for a winning bet: stake x odds, computed wide and truncated.
///
/// Odds are Q16.16, so the result stays in minor units.
#[inline]
pub fn payout_for(stake: Credits, odds: Fixed) -> Credits {
    if odds <= 0 {
        return 0;
    }
    ((stake as u128 * odds as u128) >> FIXED_SCALE) as Credits
}

/// The settled result of one bet. Produced exactly once per bet per
/// race; re-settlement returns this record unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Bet this record settles
    pub bet_id: BetId,
    /// Race the bet was against
    pub race_id: RaceId,
    /// Amount paid out in minor units; zero for losing selections
    pub payout: Credits,
    /// When settlement was recorded. Supplied by the caller and stored
    /// on first settlement, so retries return the original timestamp.
    pub settled_at: DateTime<Utc>,
}

/// Per-race money movement totals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSummary {
    /// Race the summary covers
    pub race_id: RaceId,
    /// Sum of stakes across settled bets
    pub total_staked: Credits,
    /// Sum of payouts across settled bets
    pub total_paid: Credits,
    /// Stakes retained minus payouts funded; negative when winners were
    /// paid more than the losers staked
    pub house_net: i64,
}

/// Settles bets and remembers every record it produced.
#[derive(Clone, Debug, Default)]
pub struct SettlementEngine {
    records: BTreeMap<(RaceId, BetId), SettlementRecord>,
}

impl SettlementEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle every bet for a race against its finalized outcome.
    ///
    /// Fails with [`BettingError::UnknownRace`] while no outcome exists;
    /// the caller should retry after finalization rather than treat
    /// this as permanent. Already-settled bets return their stored
    /// records unchanged, so partial settlement is resumable and a full
    /// retry is byte-identical. Records return in ascending bet-id
    /// order.
    pub fn settle_race(
        &mut self,
        recorder: &OutcomeRecorder,
        race_id: RaceId,
        bets: &[Bet],
        settled_at: DateTime<Utc>,
    ) -> Result<Vec<SettlementRecord>, BettingError> {
        let outcome = recorder
            .get(race_id)
            .ok_or(BettingError::UnknownRace(race_id))?;

        let mut sorted: Vec<&Bet> = bets.iter().collect();
        sorted.sort_by_key(|b| b.id);

        let mut records = Vec::with_capacity(sorted.len());
        for bet in sorted {
            if bet.race_id != race_id {
                warn!(bet = %bet.id, "bet references another race; skipping");
                continue;
            }
            records.push(self.settle_bet(outcome, bet, settled_at));
        }

        info!(
            race = %race_id.to_uuid_string(),
            bets = records.len(),
            "race settled"
        );
        Ok(records)
    }

    /// Settle a single bet against a finalized outcome.
    ///
    /// The settlement marker is checked and recorded before the payout
    /// leaves this function, which is what makes retries safe.
    pub fn settle_bet(
        &mut self,
        outcome: &Outcome,
        bet: &Bet,
        settled_at: DateTime<Utc>,
    ) -> SettlementRecord {
        let key = (outcome.race_id, bet.id);
        if let Some(existing) = self.records.get(&key) {
            return existing.clone();
        }

        let payout = if outcome.winner() == Some(bet.entity_id) {
            payout_for(bet.stake, bet.odds)
        } else {
            0
        };

        let record = SettlementRecord {
            bet_id: bet.id,
            race_id: outcome.race_id,
            payout,
            settled_at,
        };
        self.records.insert(key, record.clone());
        record
    }

    /// Refund every bet on a voided race: payout equals stake.
    ///
    /// Only defined for races aborted before the gate opened; a
    /// finished race settles against its outcome instead. Same
    /// idempotence guarantee as [`Self::settle_race`].
    pub fn refund_race(
        &mut self,
        race: &RaceState,
        bets: &[Bet],
        settled_at: DateTime<Utc>,
    ) -> Result<Vec<SettlementRecord>, BettingError> {
        if !race.voided {
            return Err(BettingError::NotVoided(race.id));
        }

        let mut sorted: Vec<&Bet> = bets.iter().collect();
        sorted.sort_by_key(|b| b.id);

        let mut records = Vec::with_capacity(sorted.len());
        for bet in sorted {
            if bet.race_id != race.id {
                warn!(bet = %bet.id, "bet references another race; skipping");
                continue;
            }

            let key = (race.id, bet.id);
            let record = match self.records.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let record = SettlementRecord {
                        bet_id: bet.id,
                        race_id: race.id,
                        payout: bet.stake,
                        settled_at,
                    };
                    self.records.insert(key, record.clone());
                    record
                }
            };
            records.push(record);
        }

        info!(race = %race.id.to_uuid_string(), bets = records.len(), "voided race refunded");
        Ok(records)
    }

    /// Read the stored record for one bet, if it settled.
    pub fn record_for(&self, race_id: RaceId, bet_id: BetId) -> Option<&SettlementRecord> {
        self.records.get(&(race_id, bet_id))
    }

    /// Money movement totals for a race's settled bets.
    pub fn summary(&self, race_id: RaceId, bets: &[Bet]) -> SettlementSummary {
        let mut total_staked: Credits = 0;
        let mut total_paid: Credits = 0;

        for bet in bets.iter().filter(|b| b.race_id == race_id) {
            if let Some(record) = self.record_for(race_id, bet.id) {
                total_staked += bet.stake;
                total_paid += record.payout;
            }
        }

        SettlementSummary {
            race_id,
            total_staked,
            total_paid,
            house_net: total_staked as i64 - total_paid as i64,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
