//! Collision and Pickup Resolution
//!
//! Per tick, turns proximity into effect applications: entity-to-pickup
//! consumption and entity-to-entity ram contacts. Scanning runs over an
//! immutable snapshot in ascending id order, application commits
//! afterward, so no entity observes another's in-progress mutation from
//! the same tick.
//!
//! This module mutates pickup `consumed` flags and entity effect slots
//! only; it never touches `phase` or `tick`.

use tracing::warn;

use crate::core::fixed::{fixed_mul, Fixed};
use crate::race::effect;
use crate::race::events::RaceEvent;
use crate::race::state::{EffectSlot, EntityId, RaceState};

/// A pickup an entity reached this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PickupHit {
    /// Collector
    pub entity_id: EntityId,
    /// Pickup reached
    pub pickup_id: u32,
}

/// A ram contact between an armed entity and a victim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamHit {
    /// Armed initiator
    pub source: EntityId,
    /// Entity in contact range
    pub target: EntityId,
}

/// Scan for entity-to-pickup proximity.
///
/// Entities iterate in ascending id order and pickups in ascending
/// pickup-id order, so an entity qualifying for several pickups in one
/// tick collects them in ascending pickup-id order - deterministic and
/// replayable. Trapped and finished entities collect nothing.
pub fn collect_pickup_hits(state: &RaceState) -> Vec<PickupHit> {
    let mut hits = Vec::new();

    for (entity_id, entity) in &state.entities {
        if !entity.is_racing() {
            continue;
        }

        for (pickup_id, pickup) in &state.pickups {
            if pickup.consumed {
                continue;
            }

            // Magnet holders check with their enlarged radius
            let radius: Fixed = entity.pickup_radius_for(pickup.kind);
            let radius_sq = fixed_mul(radius, radius);

            if entity.position.distance_squared(pickup.position) <= radius_sq {
                hits.push(PickupHit {
                    entity_id: *entity_id,
                    pickup_id: *pickup_id,
                });
            }
        }
    }

    hits
}

/// Scan for ram contacts.
///
/// Only entities holding an armed charge initiate; contact uses the
/// fixed entity interaction radius, deliberately smaller than any
/// pickup radius.
pub fn collect_ram_hits(state: &RaceState, interaction_radius: Fixed) -> Vec<RamHit> {
    let radius_sq = fixed_mul(interaction_radius, interaction_radius);
    let mut hits = Vec::new();

    for (source_id, source) in &state.entities {
        if !source.is_racing() || !source.has_effect(EffectSlot::RamCharge) {
            continue;
        }

        for (target_id, target) in &state.entities {
            if target_id == source_id || !target.is_racing() {
                continue;
            }

            if source.position.distance_squared(target.position) <= radius_sq {
                hits.push(RamHit {
                    source: *source_id,
                    target: *target_id,
                });
            }
        }
    }

    hits
}

/// Resolve one tick's proximity events.
///
/// Returns the events produced. A fault on one pickup or entity is
/// logged and skipped; it never aborts the tick for the others.
pub fn resolve(state: &mut RaceState, interaction_radius: Fixed, tick_delta_ms: u32) -> Vec<RaceEvent> {
    let mut events = Vec::new();

    // Pickups first, in scan order
    for hit in collect_pickup_hits(state) {
        let Some(pickup) = state.pickups.get_mut(&hit.pickup_id) else {
            warn!(
                pickup_id = hit.pickup_id,
                entity = %hit.entity_id,
                "pickup vanished between scan and commit; skipping"
            );
            continue;
        };

        // A slower-id entity may have consumed it earlier this tick
        if pickup.consumed {
            continue;
        }

        pickup.consumed = true;
        pickup.consumed_tick = Some(state.tick);
        pickup.consumed_by = Some(hit.entity_id);
        let kind = pickup.kind;

        events.push(RaceEvent::pickup_consumed(state.tick, hit.entity_id, hit.pickup_id, kind));
        events.extend(effect::apply(state, hit.entity_id, kind, tick_delta_ms));
    }

    // Then ram contacts; a charge is spent on its first hit
    for hit in collect_ram_hits(state, interaction_radius) {
        let Some(source) = state.entity_mut(hit.source) else {
            warn!(source = %hit.source, "ram source missing at commit; skipping");
            continue;
        };

        // Spent by an earlier contact this tick
        if source.effects.remove(&EffectSlot::RamCharge).is_none() {
            continue;
        }

        events.extend(effect::apply_ram_hit(state, hit.source, hit.target, tick_delta_ms));
    }

    events
}

// =============================================================================
// TESTS
// =============================================================================
