//! Race Events
//!
//! Events generated during simulation, for replay and audit. The
//! ordering is total so event logs from identically seeded races compare
//! equal.

use serde::{Serialize, Deserialize};

use crate::core::fixed::Fixed;
use crate::race::catalog::PowerUpKind;
use crate::race::state::{EntityId, RaceId};

/// Priority for event processing order within one tick.
///
/// Lower value = processed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Phase changes come first
    PhaseChange = 0,
    /// Then finishes
    Finish = 1,
    /// Then pickup consumption
    Pickup = 2,
    /// Then effect application and expiry
    Effect = 3,
    /// Lowest priority
    Other = 255,
}

/// Race event data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RaceEventData {
    /// Lifecycle phase changed
    PhaseChanged {
        /// Previous phase name
        from: String,
        /// New phase name
        to: String,
    },

    /// A pickup appeared on the track
    PickupSpawned {
        /// Pickup id
        pickup_id: u32,
        /// Kind spawned
        kind: PowerUpKind,
    },

    /// An entity consumed a pickup
    PickupConsumed {
        /// Collector
        entity_id: EntityId,
        /// Pickup consumed
        pickup_id: u32,
        /// Kind consumed
        kind: PowerUpKind,
    },

    /// An effect landed on an entity
    EffectApplied {
        /// Affected entity
        entity_id: EntityId,
        /// Kind applied
        kind: PowerUpKind,
    },

    /// An effect ran out
    EffectExpired {
        /// Affected entity
        entity_id: EntityId,
        /// Kind that expired
        kind: PowerUpKind,
    },

    /// A shield soaked an incoming trap or ram
    ShieldAbsorbed {
        /// Shield holder
        entity_id: EntityId,
        /// Kind that was blocked
        blocked: PowerUpKind,
    },

    /// A ram charge connected
    RamHit {
        /// Initiating entity
        source: EntityId,
        /// Victim
        target: EntityId,
    },

    /// A teleport displaced an entity forward
    Teleported {
        /// Affected entity
        entity_id: EntityId,
        /// Forward displacement (Q16.16 units)
        distance: Fixed,
    },

    /// An entity crossed the finish line
    EntityFinished {
        /// Finisher
        entity_id: EntityId,
        /// Tick of the crossing
        finish_tick: u32,
    },

    /// The race reached its terminal phase
    RaceEnded {
        /// Winning entity, if the race produced one
        winner: Option<EntityId>,
        /// Total ticks run
        duration_ticks: u32,
    },

    /// The race was voided from lobby or countdown
    RaceVoided {
        /// Race that was voided
        race_id: RaceId,
    },
}

/// A race event with timing and priority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RaceEvent {
    /// Tick when the event occurred
    pub tick: u32,

    /// Processing priority
    pub priority: EventPriority,

    /// Entity involved (for tie-breaking)
    pub entity_id: Option<EntityId>,

    /// Event data
    pub data: RaceEventData,
}

impl RaceEvent {
    /// Create a new event, deriving the tie-break entity from the data.
    pub fn new(tick: u32, priority: EventPriority, data: RaceEventData) -> Self {
        let entity_id = match &data {
            RaceEventData::PickupConsumed { entity_id, .. } => Some(*entity_id),
            RaceEventData::EffectApplied { entity_id, .. } => Some(*entity_id),
            RaceEventData::EffectExpired { entity_id, .. } => Some(*entity_id),
            RaceEventData::ShieldAbsorbed { entity_id, .. } => Some(*entity_id),
            RaceEventData::RamHit { target, .. } => Some(*target),
            RaceEventData::Teleported { entity_id, .. } => Some(*entity_id),
            RaceEventData::EntityFinished { entity_id, .. } => Some(*entity_id),
            RaceEventData::RaceEnded { winner, .. } => *winner,
            _ => None,
        };

        Self { tick, priority, entity_id, data }
    }

    /// Phase change event.
    pub fn phase_changed(tick: u32, from: &str, to: &str) -> Self {
        Self::new(
            tick,
            EventPriority::PhaseChange,
            RaceEventData::PhaseChanged { from: from.to_string(), to: to.to_string() },
        )
    }

    /// Pickup spawned event.
    pub fn pickup_spawned(tick: u32, pickup_id: u32, kind: PowerUpKind) -> Self {
        Self::new(tick, EventPriority::Other, RaceEventData::PickupSpawned { pickup_id, kind })
    }

    /// Pickup consumed event.
    pub fn pickup_consumed(tick: u32, entity_id: EntityId, pickup_id: u32, kind: PowerUpKind) -> Self {
        Self::new(tick, EventPriority::Pickup, RaceEventData::PickupConsumed { entity_id, pickup_id, kind })
    }

    /// Effect applied event.
    pub fn effect_applied(tick: u32, entity_id: EntityId, kind: PowerUpKind) -> Self {
        Self::new(tick, EventPriority::Effect, RaceEventData::EffectApplied { entity_id, kind })
    }

    /// Effect expired event.
    pub fn effect_expired(tick: u32, entity_id: EntityId, kind: PowerUpKind) -> Self {
        Self::new(tick, EventPriority::Effect, RaceEventData::EffectExpired { entity_id, kind })
    }

    /// Shield absorption event.
    pub fn shield_absorbed(tick: u32, entity_id: EntityId, blocked: PowerUpKind) -> Self {
        Self::new(tick, EventPriority::Effect, RaceEventData::ShieldAbsorbed { entity_id, blocked })
    }

    /// Ram hit event.
    pub fn ram_hit(tick: u32, source: EntityId, target: EntityId) -> Self {
        Self::new(tick, EventPriority::Effect, RaceEventData::RamHit { source, target })
    }

    /// Teleport event.
    pub fn teleported(tick: u32, entity_id: EntityId, distance: Fixed) -> Self {
        Self::new(tick, EventPriority::Effect, RaceEventData::Teleported { entity_id, distance })
    }

    /// Finish line crossing event.
    pub fn entity_finished(tick: u32, entity_id: EntityId, finish_tick: u32) -> Self {
        Self::new(tick, EventPriority::Finish, RaceEventData::EntityFinished { entity_id, finish_tick })
    }

    /// Race ended event.
    pub fn race_ended(tick: u32, winner: Option<EntityId>) -> Self {
        Self::new(tick, EventPriority::Other, RaceEventData::RaceEnded { winner, duration_ticks: tick })
    }

    /// Race voided event.
    pub fn race_voided(tick: u32, race_id: RaceId) -> Self {
        Self::new(tick, EventPriority::PhaseChange, RaceEventData::RaceVoided { race_id })
    }
}

impl PartialEq for RaceEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick
            && self.priority == other.priority
            && self.entity_id == other.entity_id
    }
}

impl Eq for RaceEvent {}

impl PartialOrd for RaceEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RaceEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by: tick, then priority, then entity id
        self.tick
            .cmp(&other.tick)
            .then(self.priority.cmp(&other.priority))
            .then(self.entity_id.cmp(&other.entity_id))
    }
}
