//! Race State Definitions
//!
//! All state types for one race instance.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, fixed_mul, LANE_SPACING};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::race::catalog::{definition_for, PowerUpKind};
use crate::race::events::RaceEvent;

// =============================================================================
// ENTITY ID
// =============================================================================

/// Unique entrant identifier within a race.
///
/// Small integer ids keep tie-breaks ("ascending entity id") trivially
/// deterministic and readable in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// RACE ID
// =============================================================================

/// Unique race identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RaceId(pub [u8; 16]);

impl RaceId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }
}

// =============================================================================
// EFFECTS
// =============================================================================

/// Effect slot an applied power-up occupies.
///
/// Boost and turbo share the Speed slot (same mechanism, last applied
/// wins); ram occupies two distinct slots: the armed charge on the
/// source and the slow on the victim. Timefreeze is race-scoped and has
/// no per-entity slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EffectSlot {
    /// Speed multiplier (boost or turbo)
    Speed,
    /// Held in place, cannot move or collect
    Trap,
    /// One-shot absorption of the next trap or ram
    Shield,
    /// Immune to ram contact, both directions
    Ghost,
    /// Enlarged pickup radius
    Magnet,
    /// Armed ram charge, spent on first contact
    RamCharge,
    /// Slowed after being rammed
    Slow,
}

/// A live effect occupying one slot on an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEffect {
    /// Kind that produced the effect (distinguishes boost from turbo)
    pub kind: PowerUpKind,
    /// Strength, copied from the catalog definition at apply time
    pub magnitude: Fixed,
    /// Tick at which the effect is removed (`expires_at <= tick` expires)
    pub expires_at: u32,
}

// =============================================================================
// ENTITY STATE
// =============================================================================

/// Lifecycle status of one entrant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
pub enum EntityStatus {
    /// On the track and moving
    #[default]
    Racing,
    /// Held by a trap; does not advance and cannot collect
    Trapped,
    /// Crossed the finish line
    Finished,
}

/// State of a single entrant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityState {
    /// Unique entrant id
    pub id: EntityId,

    /// Display label of the owner/stable
    pub owner_label: String,

    /// Position: x along the track, y is the lane offset
    pub position: FixedVec2,

    /// Unmodified baseline speed (units/sec). Never mutated by effects;
    /// every tick derives the effective speed from this.
    pub base_speed: Fixed,

    /// Active effects, keyed by slot (BTreeMap for deterministic iteration)
    pub effects: BTreeMap<EffectSlot, ActiveEffect>,

    /// Current lifecycle status
    pub status: EntityStatus,

    /// Tick the finish line was crossed. Set at most once.
    pub finish_tick: Option<u32>,
}

impl EntityState {
    /// Create a new entrant in the given lane.
    pub fn new(id: EntityId, owner_label: impl Into<String>, base_speed: Fixed, lane: u32) -> Self {
        Self {
            id,
            owner_label: owner_label.into(),
            position: FixedVec2::new(0, (lane as Fixed).wrapping_mul(LANE_SPACING)),
            base_speed,
            effects: BTreeMap::new(),
            status: EntityStatus::Racing,
            finish_tick: None,
        }
    }

    /// Is the entrant eligible to move and collect pickups?
    #[inline]
    pub fn is_racing(&self) -> bool {
        self.status == EntityStatus::Racing
    }

    /// Look up a live effect by slot.
    #[inline]
    pub fn effect(&self, slot: EffectSlot) -> Option<&ActiveEffect> {
        self.effects.get(&slot)
    }

    /// Does a slot currently hold a live effect?
    #[inline]
    pub fn has_effect(&self, slot: EffectSlot) -> bool {
        self.effects.contains_key(&slot)
    }

    /// Pickup radius multiplier from an active magnet, or 1x.
    pub fn pickup_radius_for(&self, kind: PowerUpKind) -> Fixed {
        let base = definition_for(kind).pickup_radius;
        match self.effect(EffectSlot::Magnet) {
            Some(magnet) => fixed_mul(base, magnet.magnitude),
            None => base,
        }
    }

    /// Effective speed this tick, before the race-scoped timefreeze.
    ///
    /// Derived from the baseline and the live slots; expiry therefore
    /// restores the baseline with no snapshot bookkeeping.
    pub fn effective_speed(&self) -> Fixed {
        if !self.is_racing() {
            return 0;
        }
        let mut speed = self.base_speed;
        if let Some(boost) = self.effect(EffectSlot::Speed) {
            speed = fixed_mul(speed, boost.magnitude);
        }
        if let Some(slow) = self.effect(EffectSlot::Slow) {
            speed = fixed_mul(speed, slow.magnitude);
        }
        speed
    }

    /// Record crossing the finish line. The tick is written once and
    /// never overwritten.
    pub fn mark_finished(&mut self, tick: u32) {
        if self.finish_tick.is_none() {
            self.finish_tick = Some(tick);
            self.status = EntityStatus::Finished;
            self.effects.clear();
        }
    }
}

// =============================================================================
// PICKUP STATE
// =============================================================================

/// A placed power-up pickup on the track.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PickupInstance {
    /// Unique pickup id (monotonic counter). Ascending id is the
    /// tie-break order when one entity reaches several pickups at once.
    pub id: u32,

    /// Kind of power-up
    pub kind: PowerUpKind,

    /// Position on the track
    pub position: FixedVec2,

    /// Has this pickup been consumed?
    pub consumed: bool,

    /// Tick when consumed (if consumed)
    pub consumed_tick: Option<u32>,

    /// Who consumed it (if consumed)
    pub consumed_by: Option<EntityId>,
}

impl PickupInstance {
    /// Create a fresh pickup.
    pub fn new(id: u32, kind: PowerUpKind, position: FixedVec2) -> Self {
        Self {
            id,
            kind,
            position,
            consumed: false,
            consumed_tick: None,
            consumed_by: None,
        }
    }
}

// =============================================================================
// RACE PHASE
// =============================================================================

/// Lifecycle phase of the race. Transitions are linearized; no phase is
/// ever re-entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[derive(Default)]
pub enum RacePhase {
    /// Accepting entrants and bets
    #[default]
    Lobby,
    /// Start commanded; gate opens when the countdown elapses
    Countdown {
        /// Ticks until the gate opens
        ticks_remaining: u32,
    },
    /// Entities advance; the clock is strictly monotonic here
    Running,
    /// Terminal. The clock is frozen and the outcome can be recorded.
    Finished,
}

impl RacePhase {
    /// Name for logging and phase-change events.
    pub fn name(&self) -> &'static str {
        match self {
            RacePhase::Lobby => "lobby",
            RacePhase::Countdown { .. } => "countdown",
            RacePhase::Running => "running",
            RacePhase::Finished => "finished",
        }
    }

    /// Are bet placements still accepted in this phase?
    ///
    /// The window closes the moment the gate opens.
    pub fn accepts_bets(&self) -> bool {
        matches!(self, RacePhase::Lobby | RacePhase::Countdown { .. })
    }
}

// =============================================================================
// TIMEFREEZE
// =============================================================================

/// Race-scoped timefreeze marker.
///
/// The one effect that reaches outside its own entity: while live, every
/// entrant except the holder moves at the stored factor. The state
/// machine reads this flag when advancing positions; the effect engine
/// only sets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimefreezeState {
    /// Entity holding the freeze
    pub holder: EntityId,
    /// Speed factor applied to everyone else
    pub factor: Fixed,
    /// Tick at which the freeze lifts
    pub expires_at: u32,
}

// =============================================================================
// RACE STATE
// =============================================================================

/// Complete state of one race.
///
/// Exactly one instance exists per race and it is passed by reference
/// into every component call; nothing in this crate holds process-wide
/// race state. Races therefore run concurrently without sharing anything
/// mutable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RaceState {
    /// Race identifier
    pub id: RaceId,

    /// Game-mode tag persisted alongside the race row
    pub mode: String,

    /// Current lifecycle phase
    pub phase: RacePhase,

    /// Current tick. Strictly monotonic while running, frozen afterward.
    pub tick: u32,

    /// All entrants (BTreeMap for deterministic iteration)
    pub entities: BTreeMap<EntityId, EntityState>,

    /// All pickups (BTreeMap keyed by monotonic id)
    pub pickups: BTreeMap<u32, PickupInstance>,

    /// Next pickup id
    pub next_pickup_id: u32,

    /// Deterministic RNG for pickup spawning
    #[serde(skip)]
    pub rng: DeterministicRng,

    /// Live race-scoped timefreeze, if any
    pub timefreeze: Option<TimefreezeState>,

    /// True when the race was aborted out of lobby/countdown. A voided
    /// race never produces an outcome; stakes are refunded instead.
    pub voided: bool,

    /// Events generated this tick (drained each tick)
    #[serde(skip)]
    pub pending_events: Vec<RaceEvent>,
}

impl RaceState {
    /// Create a new race in the lobby phase.
    pub fn new(id: RaceId, mode: impl Into<String>, seed: u64) -> Self {
        Self {
            id,
            mode: mode.into(),
            phase: RacePhase::Lobby,
            tick: 0,
            entities: BTreeMap::new(),
            pickups: BTreeMap::new(),
            next_pickup_id: 0,
            rng: DeterministicRng::new(seed),
            timefreeze: None,
            voided: false,
            pending_events: Vec::new(),
        }
    }

    /// Register an entrant. Lane assignment follows registration order.
    pub fn add_entrant(&mut self, id: EntityId, owner_label: impl Into<String>, base_speed: Fixed) {
        let lane = self.entities.len() as u32;
        let entity = EntityState::new(id, owner_label, base_speed, lane);
        self.entities.insert(id, entity);
    }

    /// Get an entrant by id.
    pub fn entity(&self, id: EntityId) -> Option<&EntityState> {
        self.entities.get(&id)
    }

    /// Get an entrant mutably by id.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut EntityState> {
        self.entities.get_mut(&id)
    }

    /// Place a pickup on the track. Returns the new pickup id.
    ///
    /// Externally supplied placements go through
    /// [`PowerUpKind::from_str`] first, so the kind is always known
    /// here.
    pub fn place_pickup(&mut self, kind: PowerUpKind, position: FixedVec2) -> u32 {
        let id = self.next_pickup_id;
        self.next_pickup_id += 1;
        self.pickups.insert(id, PickupInstance::new(id, kind, position));
        id
    }

    /// Place a pickup from an externally supplied kind tag.
    ///
    /// A tag this build does not know fails with
    /// [`crate::race::RaceError::UnknownKind`] and leaves the race
    /// untouched; the current tick is unaffected.
    pub fn place_pickup_tag(
        &mut self,
        tag: &str,
        position: FixedVec2,
    ) -> Result<u32, crate::race::RaceError> {
        let kind: PowerUpKind = tag.parse()?;
        Ok(self.place_pickup(kind, position))
    }

    /// Count pickups still on the track.
    pub fn live_pickup_count(&self) -> usize {
        self.pickups.values().filter(|p| !p.consumed).count()
    }

    /// Have all entrants finished?
    pub fn all_finished(&self) -> bool {
        self.entities.values().all(|e| e.status == EntityStatus::Finished)
    }

    /// Is the race in its terminal phase?
    pub fn is_over(&self) -> bool {
        matches!(self.phase, RacePhase::Finished)
    }

    /// Is the race-scoped timefreeze live against this entity?
    pub fn frozen_factor_for(&self, id: EntityId) -> Option<Fixed> {
        self.timefreeze
            .filter(|tf| tf.holder != id)
            .map(|tf| tf.factor)
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<RaceEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Push a race event.
    pub fn push_event(&mut self, event: RaceEvent) {
        self.pending_events.push(event);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{to_fixed, BASE_RACE_SPEED};

    #[test]
    fn test_entity_lane_assignment() {
        let mut state = RaceState::new(RaceId::new([0; 16]), "classic", 1);
        for i in 0..3 {
            state.add_entrant(EntityId(i), format!("stable-{i}"), BASE_RACE_SPEED);
        }

        assert_eq!(state.entity(EntityId(0)).unwrap().position.y, 0);
        assert_eq!(state.entity(EntityId(1)).unwrap().position.y, LANE_SPACING);
        assert_eq!(state.entity(EntityId(2)).unwrap().position.y, 2 * LANE_SPACING);
    }

    #[test]
    fn test_effective_speed_baseline() {
        let entity = EntityState::new(EntityId(1), "a", to_fixed(10.0), 0);
        assert_eq!(entity.effective_speed(), to_fixed(10.0));
    }

    #[test]
    fn test_effective_speed_with_boost_and_slow() {
        let mut entity = EntityState::new(EntityId(1), "a", to_fixed(10.0), 0);
        entity.effects.insert(EffectSlot::Speed, ActiveEffect {
            kind: PowerUpKind::Boost,
            magnitude: to_fixed(2.0),
            expires_at: 100,
        });
        assert_eq!(entity.effective_speed(), to_fixed(20.0));

        entity.effects.insert(EffectSlot::Slow, ActiveEffect {
            kind: PowerUpKind::Ram,
            magnitude: to_fixed(0.5),
            expires_at: 100,
        });
        assert_eq!(entity.effective_speed(), to_fixed(10.0));
    }

    #[test]
    fn test_trapped_entity_does_not_move() {
        let mut entity = EntityState::new(EntityId(1), "a", to_fixed(10.0), 0);
        entity.status = EntityStatus::Trapped;
        assert_eq!(entity.effective_speed(), 0);
    }

    #[test]
    fn test_finish_tick_written_once() {
        let mut entity = EntityState::new(EntityId(1), "a", to_fixed(10.0), 0);
        entity.mark_finished(50);
        entity.mark_finished(99);

        assert_eq!(entity.finish_tick, Some(50));
        assert_eq!(entity.status, EntityStatus::Finished);
    }

    #[test]
    fn test_magnet_enlarges_pickup_radius() {
        let mut entity = EntityState::new(EntityId(1), "a", to_fixed(10.0), 0);
        let base = entity.pickup_radius_for(PowerUpKind::Boost);

        entity.effects.insert(EffectSlot::Magnet, ActiveEffect {
            kind: PowerUpKind::Magnet,
            magnitude: to_fixed(2.5),
            expires_at: 100,
        });
        assert_eq!(entity.pickup_radius_for(PowerUpKind::Boost), fixed_mul(base, to_fixed(2.5)));
    }

    #[test]
    fn test_timefreeze_spares_holder() {
        let mut state = RaceState::new(RaceId::new([0; 16]), "classic", 1);
        state.add_entrant(EntityId(1), "a", BASE_RACE_SPEED);
        state.add_entrant(EntityId(2), "b", BASE_RACE_SPEED);

        state.timefreeze = Some(TimefreezeState {
            holder: EntityId(1),
            factor: to_fixed(0.5),
            expires_at: 100,
        });

        assert_eq!(state.frozen_factor_for(EntityId(1)), None);
        assert_eq!(state.frozen_factor_for(EntityId(2)), Some(to_fixed(0.5)));
    }

    #[test]
    fn test_betting_window_by_phase() {
        assert!(RacePhase::Lobby.accepts_bets());
        assert!(RacePhase::Countdown { ticks_remaining: 5 }.accepts_bets());
        assert!(!RacePhase::Running.accepts_bets());
        assert!(!RacePhase::Finished.accepts_bets());
    }

    #[test]
    fn test_place_pickup_tag_validates_kind() {
        let mut state = RaceState::new(RaceId::new([0; 16]), "classic", 1);

        let id = state.place_pickup_tag("boost", FixedVec2::ZERO).unwrap();
        assert_eq!(state.pickups.get(&id).unwrap().kind, PowerUpKind::Boost);

        let err = state.place_pickup_tag("rocket", FixedVec2::ZERO).unwrap_err();
        assert!(matches!(err, crate::race::RaceError::UnknownKind(_)));
        assert_eq!(state.pickups.len(), 1);
    }

    #[test]
    fn test_race_id_uuid_round_trip() {
        let id = RaceId::new([7; 16]);
        let s = id.to_uuid_string();
        assert_eq!(RaceId::from_uuid_str(&s), Some(id));
    }
}
