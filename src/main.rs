//! Derby Server
//!
//! Demo entry point: runs one complete race with bets end to end and
//! emits the outcome and settlement rows the persistence collaborator
//! would store.

use anyhow::Context;
use chrono::Utc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use derby::{
    core::fixed::{to_fixed, BASE_RACE_SPEED},
    core::rng::derive_race_seed,
    race::events::RaceEventData,
    race::tick::{self, RaceConfig},
    Bet, BetBook, BetId, EntityId, OutcomeRecorder, RaceId, RaceState, SettlementEngine, VERSION,
};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    info!("Derby Server v{}", VERSION);

    demo_race()
}

/// Run a demo race: four entrants, a handful of bets, settlement.
fn demo_race() -> anyhow::Result<()> {
    info!("=== Starting Demo Race ===");

    let race_id = RaceId::new(*uuid::Uuid::new_v4().as_bytes());
    let entrant_ids: Vec<u32> = (1..=4).collect();
    let seed = derive_race_seed(&race_id.0, &entrant_ids);

    let mut state = RaceState::new(race_id, "classic", seed);
    info!("Race ID: {}", race_id.to_uuid_string());
    info!("RNG Seed: {}", seed);

    let labels = ["Copper Gate", "Night Ledger", "Salt Flat", "Western Wire"];
    for (i, label) in entrant_ids.iter().zip(labels) {
        state.add_entrant(EntityId(*i), label, BASE_RACE_SPEED);
        info!("Entered {} as #{i}", label);
    }

    // Bets come in while the lobby is open
    let mut book = BetBook::new();
    let wagers = [
        (EntityId(1), 100, 3.0),
        (EntityId(2), 250, 2.2),
        (EntityId(3), 80, 5.0),
        (EntityId(4), 40, 7.5),
    ];
    for (entity_id, stake, odds) in wagers {
        let bet = Bet {
            id: BetId::generate(),
            race_id,
            entity_id,
            stake,
            odds: to_fixed(odds),
        };
        info!(
            "Bet {} on {}: {} at {:.1}",
            hex::encode(&bet.id.0[..4]),
            entity_id,
            stake,
            odds
        );
        book.place(&state, bet)
            .context("bet rejected during lobby")?;
    }
    info!("{} bets accepted", book.len());

    // Start and run to the finish
    let config = RaceConfig::default();
    tick::start(&mut state, &config).context("start command rejected")?;

    let events = tick::run_to_finish(&mut state, &config);
    for event in &events {
        match &event.data {
            RaceEventData::PickupConsumed { entity_id, kind, .. } => {
                info!("tick {}: {} collected {}", event.tick, entity_id, kind);
            }
            RaceEventData::EntityFinished { entity_id, finish_tick } => {
                info!("tick {}: {} finished", finish_tick, entity_id);
            }
            _ => {}
        }
    }

    // Freeze the outcome and settle
    let mut recorder = OutcomeRecorder::new();
    let outcome = recorder.finalize(&state)?.clone();
    info!(
        "Winner: {}",
        outcome
            .winner()
            .map(|w| w.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    let bets = book.bets_for(race_id);
    let mut engine = SettlementEngine::new();
    let records = engine.settle_race(&recorder, race_id, &bets, Utc::now())?;
    let summary = engine.summary(race_id, &bets);

    // Rows for the persistence collaborator
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!("{}", serde_json::to_string_pretty(&records)?);
    info!(
        "staked {} / paid {} / house net {}",
        summary.total_staked, summary.total_paid, summary.house_net
    );

    Ok(())
}
