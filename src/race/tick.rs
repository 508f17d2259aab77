//! Race State Machine
//!
//! Drives the race through its lifecycle and owns the simulation clock;
//! nothing else mutates canonical race time. Per running tick: advance
//! positions from a consistent snapshot, resolve pickups and contacts,
//! expire effects, spawn new pickups, detect finishes, check end
//! conditions.

use tracing::{debug, info};

use crate::core::fixed::{fixed_mul, Fixed, ENTITY_INTERACTION_RADIUS, LANE_SPACING, TRACK_LENGTH};
use crate::core::vec2::FixedVec2;
use crate::race::catalog::roll_kind;
use crate::race::events::RaceEvent;
use crate::race::outcome::ranking;
use crate::race::resolver;
use crate::race::state::{EntityId, RacePhase, RaceState};
use crate::race::{effect, RaceError};

/// Configuration for pickup spawning.
#[derive(Clone, Copy, Debug)]
pub struct PickupSpawnConfig {
    /// Ticks between spawn waves
    pub spawn_interval: u32,
    /// Pickups per wave
    pub spawn_count: u32,
    /// Maximum unconsumed pickups on the track
    pub max_on_track: u32,
}

impl Default for PickupSpawnConfig {
    fn default() -> Self {
        Self {
            spawn_interval: 20, // every 2 seconds at 100ms ticks
            spawn_count: 2,
            max_on_track: 12,
        }
    }
}

/// Configuration for one race.
#[derive(Clone, Debug)]
pub struct RaceConfig {
    /// Entrants required before the start command is accepted
    pub min_entrants: usize,
    /// Countdown length in ticks before the gate opens
    pub countdown_ticks: u32,
    /// Simulated wall time per tick, in milliseconds
    pub tick_delta_ms: u32,
    /// Hard cap on running ticks; stragglers are ranked by position
    pub max_duration_ticks: u32,
    /// Distance to the finish line
    pub track_length: Fixed,
    /// Entity-to-entity contact radius for ram interactions
    pub interaction_radius: Fixed,
    /// Pickup spawning parameters
    pub spawn: PickupSpawnConfig,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            min_entrants: 2,
            countdown_ticks: 30,     // 3 seconds at 100ms ticks
            tick_delta_ms: 100,      // 10 Hz simulation
            max_duration_ticks: 6000, // 10 minutes
            track_length: TRACK_LENGTH,
            interaction_radius: ENTITY_INTERACTION_RADIUS,
            spawn: PickupSpawnConfig::default(),
        }
    }
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<RaceEvent>,
    /// Whether the race reached its terminal phase this tick
    pub race_ended: bool,
    /// Winner (first of the final ranking), once the race ends
    pub winner: Option<EntityId>,
}

/// Distance covered in one tick at `speed` units/sec.
///
/// Exact integer arithmetic: speed * delta_ms / 1000, computed wide.
#[inline]
fn step_distance(speed: Fixed, tick_delta_ms: u32) -> Fixed {
    ((speed as i64 * tick_delta_ms as i64) / 1000) as Fixed
}

/// Apply the external start command.
///
/// Legal only from the lobby with enough entrants; the countdown begins
/// on the next tick.
pub fn start(state: &mut RaceState, config: &RaceConfig) -> Result<(), RaceError> {
    match state.phase {
        RacePhase::Lobby => {
            let have = state.entities.len();
            if have < config.min_entrants {
                return Err(RaceError::InsufficientEntrants {
                    have,
                    need: config.min_entrants,
                });
            }
            state.phase = RacePhase::Countdown {
                ticks_remaining: config.countdown_ticks,
            };
            state.push_event(RaceEvent::phase_changed(state.tick, "lobby", "countdown"));
            info!(race = %state.id.to_uuid_string(), entrants = have, "race start commanded");
            Ok(())
        }
        _ => Err(RaceError::AlreadyStarted),
    }
}

/// Abort a race.
///
/// From lobby or countdown the race is voided outright: no outcome will
/// ever exist and stakes are refunded. Once running, bets are exposed to
/// outcome risk, so abort instead forces an immediate finish ranked by
/// current positions.
pub fn abort(state: &mut RaceState) -> Result<(), RaceError> {
    match state.phase {
        RacePhase::Lobby | RacePhase::Countdown { .. } => {
            let from = state.phase.name();
            state.voided = true;
            state.phase = RacePhase::Finished;
            state.push_event(RaceEvent::race_voided(state.tick, state.id));
            state.push_event(RaceEvent::phase_changed(state.tick, from, "finished"));
            info!(race = %state.id.to_uuid_string(), "race voided before the gate");
            Ok(())
        }
        RacePhase::Running => {
            info!(race = %state.id.to_uuid_string(), tick = state.tick, "abort while running: forcing finish");
            end_race(state);
            Ok(())
        }
        RacePhase::Finished => Err(RaceError::RaceOver),
    }
}

/// Run one simulation tick.
///
/// # Determinism
///
/// This function is 100% deterministic: fixed-point math only, BTreeMap
/// iteration order, randomness only from the race's seeded RNG, and no
/// reads of system time.
pub fn tick(state: &mut RaceState, config: &RaceConfig) -> TickResult {
    let mut result = TickResult::default();

    match state.phase {
        RacePhase::Lobby => {
            // Nothing moves before the start command
            return result;
        }
        RacePhase::Countdown { ticks_remaining } => {
            if ticks_remaining == 0 {
                // Gate opens
                state.phase = RacePhase::Running;
                state.push_event(RaceEvent::phase_changed(state.tick, "countdown", "running"));
                info!(race = %state.id.to_uuid_string(), "gate open");
            } else {
                state.phase = RacePhase::Countdown {
                    ticks_remaining: ticks_remaining - 1,
                };
            }
            result.events = state.take_events();
            return result;
        }
        RacePhase::Finished => {
            result.race_ended = true;
            result.winner = ranking(state).first().copied();
            return result;
        }
        RacePhase::Running => {
            // Continue with the main simulation
        }
    }

    // 0. Advance the clock (strictly monotonic while running)
    state.tick += 1;

    // 1. Advance positions from a consistent snapshot of this tick's
    //    speeds, then commit - no entity observes another's in-progress
    //    move.
    advance_positions(state, config);

    // 2. Resolve pickups and ram contacts
    let events = resolver::resolve(state, config.interaction_radius, config.tick_delta_ms);
    for event in events {
        state.push_event(event);
    }

    // 3. Expire effects
    let events = effect::tick_expire(state);
    for event in events {
        state.push_event(event);
    }

    // 4. Spawn new pickups
    maybe_spawn_pickups(state, &config.spawn, config.track_length);

    // 5. Detect finish line crossings
    detect_finishes(state, config);

    // 6. Check end conditions
    if state.all_finished() || state.tick >= config.max_duration_ticks {
        end_race(state);
        result.race_ended = true;
        result.winner = ranking(state).first().copied();
    }

    result.events = state.take_events();
    result
}

/// Compute every racing entity's step from the pre-tick state, then
/// commit all positions at once.
fn advance_positions(state: &mut RaceState, config: &RaceConfig) {
    let steps: Vec<(EntityId, Fixed)> = state
        .entities
        .values()
        .filter(|e| e.is_racing())
        .map(|e| {
            let mut speed = e.effective_speed();
            if let Some(factor) = state.frozen_factor_for(e.id) {
                speed = fixed_mul(speed, factor);
            }
            (e.id, step_distance(speed, config.tick_delta_ms))
        })
        .collect();

    for (id, dx) in steps {
        if let Some(entity) = state.entity_mut(id) {
            entity.position.x = entity.position.x.wrapping_add(dx);
        }
    }
}

/// Spawn a wave of pickups if the interval elapsed and the track is not
/// saturated. Positions and kinds draw from the race's seeded RNG.
fn maybe_spawn_pickups(state: &mut RaceState, config: &PickupSpawnConfig, track_length: Fixed) {
    if config.spawn_interval == 0 || state.tick % config.spawn_interval != 0 {
        return;
    }

    let live = state.live_pickup_count() as u32;
    if live >= config.max_on_track {
        return;
    }

    let lane_count = state.entities.len().max(1) as u32;
    let spawn_count = config.spawn_count.min(config.max_on_track - live);

    for _ in 0..spawn_count {
        let x = state.rng.next_fixed_range(0, track_length);
        let lane = state.rng.next_int(lane_count);
        let y = (lane as Fixed).wrapping_mul(LANE_SPACING);
        let kind = roll_kind(&mut state.rng);

        let id = state.place_pickup(kind, FixedVec2::new(x, y));
        state.push_event(RaceEvent::pickup_spawned(state.tick, id, kind));
        debug!(race = %state.id.to_uuid_string(), pickup = id, kind = %kind, "pickup spawned");
    }
}

/// Mark entities that crossed the finish line this tick.
///
/// Each crossing records `finish_tick` exactly once and never blocks
/// the others.
fn detect_finishes(state: &mut RaceState, config: &RaceConfig) {
    let now = state.tick;
    let mut finished = Vec::new();

    for entity in state.entities.values_mut() {
        if entity.is_racing() && entity.position.x >= config.track_length {
            entity.mark_finished(now);
            finished.push(entity.id);
        }
    }

    for id in finished {
        state.push_event(RaceEvent::entity_finished(now, id, now));
        info!(race = %state.id.to_uuid_string(), entity = %id, tick = now, "crossed the finish line");
    }
}

/// Move the race to its terminal phase and freeze the clock.
fn end_race(state: &mut RaceState) {
    let from = state.phase.name();
    state.phase = RacePhase::Finished;
    state.timefreeze = None;

    let winner = ranking(state).first().copied();
    state.push_event(RaceEvent::phase_changed(state.tick, from, "finished"));
    state.push_event(RaceEvent::race_ended(state.tick, winner));
    info!(
        race = %state.id.to_uuid_string(),
        tick = state.tick,
        winner = winner.map(|w| w.0),
        "race ended"
    );
}

/// Drive a started race to its terminal phase, collecting all events.
///
/// Convenience for the demo binary and tests; production callers own
/// the tick cadence themselves.
pub fn run_to_finish(state: &mut RaceState, config: &RaceConfig) -> Vec<RaceEvent> {
    let mut all_events = Vec::new();

    // Countdown plus running plus slack; the max-duration cap ends the
    // race well before this loop bound.
    let bound = config.countdown_ticks + config.max_duration_ticks + 2;
    for _ in 0..=bound {
        let result = tick(state, config);
        all_events.extend(result.events);
        if result.race_ended {
            break;
        }
    }

    all_events
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{to_fixed, BASE_RACE_SPEED};
    use crate::race::catalog::PowerUpKind;
    use crate::race::state::{EntityStatus, RaceId};

    /// Config with spawning disabled for closed-form arithmetic tests.
    fn quiet_config() -> RaceConfig {
        RaceConfig {
            spawn: PickupSpawnConfig {
                spawn_interval: 0,
                spawn_count: 0,
                max_on_track: 0,
            },
            ..RaceConfig::default()
        }
    }

    fn lobby_race(n: u32) -> RaceState {
        let mut state = RaceState::new(RaceId::new([3; 16]), "classic", 99);
        for i in 1..=n {
            state.add_entrant(EntityId(i), format!("stable-{i}"), BASE_RACE_SPEED);
        }
        state
    }

    #[test]
    fn test_start_requires_min_entrants() {
        let config = quiet_config();
        let mut state = lobby_race(1);

        let err = start(&mut state, &config).unwrap_err();
        assert!(matches!(err, RaceError::InsufficientEntrants { have: 1, need: 2 }));
        assert_eq!(state.phase, RacePhase::Lobby);
    }

    #[test]
    fn test_start_enters_countdown() {
        let config = quiet_config();
        let mut state = lobby_race(2);

        start(&mut state, &config).unwrap();
        assert_eq!(state.phase, RacePhase::Countdown { ticks_remaining: 30 });

        // Second start command is rejected
        assert!(matches!(start(&mut state, &config), Err(RaceError::AlreadyStarted)));
    }

    #[test]
    fn test_countdown_opens_gate() {
        let config = quiet_config();
        let mut state = lobby_race(2);
        start(&mut state, &config).unwrap();

        for _ in 0..=config.countdown_ticks {
            tick(&mut state, &config);
        }
        assert_eq!(state.phase, RacePhase::Running);
        // The clock has not advanced during countdown
        assert_eq!(state.tick, 0);
    }

    #[test]
    fn test_lobby_tick_is_inert() {
        let config = quiet_config();
        let mut state = lobby_race(2);

        let result = tick(&mut state, &config);
        assert!(result.events.is_empty());
        assert_eq!(state.tick, 0);
        assert_eq!(state.phase, RacePhase::Lobby);
    }

    #[test]
    fn test_positions_advance_while_running() {
        let config = quiet_config();
        let mut state = lobby_race(2);
        state.phase = RacePhase::Running;

        tick(&mut state, &config);

        // 10 units/sec at 100ms per tick = 1 unit
        for entity in state.entities.values() {
            assert_eq!(entity.position.x, to_fixed(1.0));
        }
        assert_eq!(state.tick, 1);
    }

    #[test]
    fn test_boost_scenario_closed_form() {
        // 4 entrants, track 1000, A picks up boost (2x, 3000ms) at tick
        // 10, tick delta 100ms, base speed 10: position at tick 40 is
        // 10 normal ticks + 30 doubled ticks = 10 + 60 = 70 units.
        let config = quiet_config();
        let mut state = lobby_race(4);
        state.phase = RacePhase::Running;

        for _ in 0..10 {
            tick(&mut state, &config);
        }
        assert_eq!(state.tick, 10);
        assert_eq!(state.entity(EntityId(1)).unwrap().position.x, to_fixed(10.0));

        // Pickup lands on A at tick 10
        effect::apply(&mut state, EntityId(1), PowerUpKind::Boost, config.tick_delta_ms);

        for _ in 0..30 {
            tick(&mut state, &config);
        }
        assert_eq!(state.tick, 40);
        assert_eq!(state.entity(EntityId(1)).unwrap().position.x, to_fixed(70.0));

        // Effect has expired; the next tick runs at base speed
        tick(&mut state, &config);
        assert_eq!(state.entity(EntityId(1)).unwrap().position.x, to_fixed(71.0));

        // The other entrants never left base speed
        assert_eq!(state.entity(EntityId(2)).unwrap().position.x, to_fixed(41.0));
    }

    #[test]
    fn test_finish_detection_and_race_end() {
        let mut config = quiet_config();
        config.track_length = to_fixed(5.0);
        let mut state = lobby_race(2);
        state.phase = RacePhase::Running;

        let mut ended = false;
        for _ in 0..10 {
            let result = tick(&mut state, &config);
            if result.race_ended {
                ended = true;
                break;
            }
        }

        assert!(ended);
        assert!(state.is_over());
        for entity in state.entities.values() {
            assert_eq!(entity.status, EntityStatus::Finished);
            // Both cross on tick 5 (5 units at 1 unit/tick)
            assert_eq!(entity.finish_tick, Some(5));
        }
    }

    #[test]
    fn test_clock_frozen_after_finish() {
        let mut config = quiet_config();
        config.track_length = to_fixed(3.0);
        let mut state = lobby_race(2);
        state.phase = RacePhase::Running;

        run_to_finish(&mut state, &config);
        let frozen = state.tick;

        for _ in 0..5 {
            let result = tick(&mut state, &config);
            assert!(result.race_ended);
        }
        assert_eq!(state.tick, frozen);
    }

    #[test]
    fn test_max_duration_timeout_ranks_stragglers() {
        let mut config = quiet_config();
        config.max_duration_ticks = 20;
        config.track_length = to_fixed(100.0);
        let mut state = lobby_race(3);
        // Entity 3 is quick enough to finish; 1 and 2 will not reach
        // the line in 20 ticks
        state.entity_mut(EntityId(3)).unwrap().base_speed = to_fixed(60.0);
        state.phase = RacePhase::Running;

        // Give entity 2 a head start over entity 1 among the stragglers
        state.entity_mut(EntityId(2)).unwrap().position.x = to_fixed(5.0);

        let mut winner = None;
        for _ in 0..25 {
            let result = tick(&mut state, &config);
            if result.race_ended {
                winner = result.winner;
                break;
            }
        }

        assert_eq!(state.tick, 20);
        assert!(state.is_over());
        let order = ranking(&state);
        // 3 finished; stragglers by descending position: 2 then 1
        assert_eq!(winner, Some(EntityId(3)));
        assert_eq!(order, vec![EntityId(3), EntityId(2), EntityId(1)]);
    }

    #[test]
    fn test_timefreeze_slows_everyone_else() {
        let config = quiet_config();
        let mut state = lobby_race(3);
        state.phase = RacePhase::Running;

        effect::apply(&mut state, EntityId(2), PowerUpKind::Timefreeze, config.tick_delta_ms);
        tick(&mut state, &config);

        // Holder at full speed, others at half
        assert_eq!(state.entity(EntityId(2)).unwrap().position.x, to_fixed(1.0));
        assert_eq!(state.entity(EntityId(1)).unwrap().position.x, to_fixed(0.5));
        assert_eq!(state.entity(EntityId(3)).unwrap().position.x, to_fixed(0.5));
    }

    #[test]
    fn test_abort_from_lobby_voids_race() {
        let mut state = lobby_race(2);

        abort(&mut state).unwrap();
        assert!(state.voided);
        assert!(state.is_over());

        // Aborting again is an error
        assert!(matches!(abort(&mut state), Err(RaceError::RaceOver)));
    }

    #[test]
    fn test_abort_while_running_forces_finish() {
        let config = quiet_config();
        let mut state = lobby_race(2);
        state.phase = RacePhase::Running;
        state.entity_mut(EntityId(2)).unwrap().position.x = to_fixed(10.0);

        for _ in 0..3 {
            tick(&mut state, &config);
        }
        abort(&mut state).unwrap();

        assert!(!state.voided);
        assert!(state.is_over());
        // Ranked by current position: 2 leads
        assert_eq!(ranking(&state), vec![EntityId(2), EntityId(1)]);
    }

    #[test]
    fn test_tick_determinism() {
        let config = RaceConfig::default();

        let build = || {
            let mut s = RaceState::new(RaceId::new([8; 16]), "classic", 4242);
            for i in 1..=4 {
                s.add_entrant(EntityId(i), format!("stable-{i}"), BASE_RACE_SPEED);
            }
            s.phase = RacePhase::Running;
            s
        };
        let mut state1 = build();
        let mut state2 = build();

        for _ in 0..500 {
            tick(&mut state1, &config);
            tick(&mut state2, &config);
        }

        assert_eq!(state1.tick, state2.tick);
        assert_eq!(state1.pickups.len(), state2.pickups.len());
        for (id, e1) in &state1.entities {
            let e2 = state2.entities.get(id).unwrap();
            assert_eq!(e1.position, e2.position);
            assert_eq!(e1.status, e2.status);
            assert_eq!(e1.finish_tick, e2.finish_tick);
        }
    }

    #[test]
    fn test_spawned_pickups_respect_cap() {
        let mut config = RaceConfig::default();
        config.spawn = PickupSpawnConfig {
            spawn_interval: 1,
            spawn_count: 5,
            max_on_track: 8,
        };
        let mut state = lobby_race(4);
        state.phase = RacePhase::Running;

        for _ in 0..50 {
            tick(&mut state, &config);
        }

        assert!(state.live_pickup_count() <= 8);
    }
}
