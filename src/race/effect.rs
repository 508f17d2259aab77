//! Effect Engine
//!
//! Owns the rules for how each power-up kind mutates an entity over
//! time: slot assignment, stacking/overriding policy, one-shot
//! semantics, and expiry. Dispatch is a single match over the kind, so
//! the timefreeze exception (the one effect that reaches outside its
//! own entity) is explicit rather than a side channel.
//!
//! Baselines are never snapshotted: `base_speed` and the `Racing`
//! status are the unmodified baseline, and effective values are derived
//! from the live slots each tick. Removing a slot therefore restores
//! the baseline exactly, regardless of what else was applied in
//! between.

use crate::race::catalog::{definition_for, PowerUpKind};
use crate::race::events::RaceEvent;
use crate::race::state::{
    ActiveEffect, EffectSlot, EntityId, EntityStatus, RaceState, TimefreezeState,
};

/// Convert a catalog duration to an absolute expiry tick.
///
/// Durations are specified in milliseconds; the race clock runs at
/// `tick_delta_ms` per tick. A zero duration marks a one-shot effect
/// and never reaches a slot.
#[inline]
fn expiry_tick(now: u32, duration_ms: u32, tick_delta_ms: u32) -> u32 {
    now + duration_ms / tick_delta_ms.max(1)
}

/// Apply a consumed power-up to an entity.
///
/// Returns the events produced, already stamped with the current tick.
/// The caller (the resolver) has verified the entity is racing.
pub fn apply(
    state: &mut RaceState,
    entity_id: EntityId,
    kind: PowerUpKind,
    tick_delta_ms: u32,
) -> Vec<RaceEvent> {
    let def = *definition_for(kind);
    let now = state.tick;
    let expires_at = expiry_tick(now, def.duration_ms, tick_delta_ms);
    let mut events = Vec::new();

    match kind {
        // Boost and turbo share the Speed slot: same mechanism, the
        // later application replaces the remaining duration outright.
        PowerUpKind::Boost | PowerUpKind::Turbo => {
            if let Some(entity) = state.entity_mut(entity_id) {
                entity.effects.insert(EffectSlot::Speed, ActiveEffect {
                    kind,
                    magnitude: def.magnitude,
                    expires_at,
                });
                events.push(RaceEvent::effect_applied(now, entity_id, kind));
            }
        }

        PowerUpKind::Trap => {
            if let Some(entity) = state.entity_mut(entity_id) {
                if entity.effects.remove(&EffectSlot::Shield).is_some() {
                    // Shield soaks the trap and clears itself
                    events.push(RaceEvent::shield_absorbed(now, entity_id, kind));
                } else {
                    entity.status = EntityStatus::Trapped;
                    entity.effects.insert(EffectSlot::Trap, ActiveEffect {
                        kind,
                        magnitude: 0,
                        expires_at,
                    });
                    events.push(RaceEvent::effect_applied(now, entity_id, kind));
                }
            }
        }

        // Re-pickup while active refreshes the duration; absorption is
        // one-shot either way.
        PowerUpKind::Shield => {
            if let Some(entity) = state.entity_mut(entity_id) {
                entity.effects.insert(EffectSlot::Shield, ActiveEffect {
                    kind,
                    magnitude: 0,
                    expires_at,
                });
                events.push(RaceEvent::effect_applied(now, entity_id, kind));
            }
        }

        // Picking up a ram arms a charge; the slow lands on whoever the
        // holder touches (see `apply_ram_hit`).
        PowerUpKind::Ram => {
            if let Some(entity) = state.entity_mut(entity_id) {
                entity.effects.insert(EffectSlot::RamCharge, ActiveEffect {
                    kind,
                    magnitude: def.magnitude,
                    expires_at,
                });
                events.push(RaceEvent::effect_applied(now, entity_id, kind));
            }
        }

        PowerUpKind::Ghost => {
            if let Some(entity) = state.entity_mut(entity_id) {
                entity.effects.insert(EffectSlot::Ghost, ActiveEffect {
                    kind,
                    magnitude: 0,
                    expires_at,
                });
                events.push(RaceEvent::effect_applied(now, entity_id, kind));
            }
        }

        // One-shot: immediate forward displacement, no slot, no expiry.
        PowerUpKind::Teleport => {
            if let Some(entity) = state.entity_mut(entity_id) {
                entity.position.x = entity.position.x.wrapping_add(def.magnitude);
                events.push(RaceEvent::teleported(now, entity_id, def.magnitude));
            }
        }

        PowerUpKind::Magnet => {
            if let Some(entity) = state.entity_mut(entity_id) {
                entity.effects.insert(EffectSlot::Magnet, ActiveEffect {
                    kind,
                    magnitude: def.magnitude,
                    expires_at,
                });
                events.push(RaceEvent::effect_applied(now, entity_id, kind));
            }
        }

        // Race-scoped: the flag lives on the race, and the state machine
        // reads it when advancing everyone else's position.
        PowerUpKind::Timefreeze => {
            state.timefreeze = Some(TimefreezeState {
                holder: entity_id,
                factor: def.magnitude,
                expires_at,
            });
            events.push(RaceEvent::effect_applied(now, entity_id, kind));
        }
    }

    events
}

/// Apply a ram contact from `source` to `target`.
///
/// Ghost on either side cancels the contact entirely; a shield on the
/// target is consumed instead of the slow landing. The caller spends
/// the source's charge.
pub fn apply_ram_hit(
    state: &mut RaceState,
    source: EntityId,
    target: EntityId,
    tick_delta_ms: u32,
) -> Vec<RaceEvent> {
    let now = state.tick;

    // Ghost is immunity as source or target
    let source_ghost = state
        .entity(source)
        .is_some_and(|e| e.has_effect(EffectSlot::Ghost));
    let target_ghost = state
        .entity(target)
        .is_some_and(|e| e.has_effect(EffectSlot::Ghost));
    if source_ghost || target_ghost {
        return Vec::new();
    }

    let def = *definition_for(PowerUpKind::Ram);
    let expires_at = expiry_tick(now, def.duration_ms, tick_delta_ms);
    let mut events = Vec::new();

    if let Some(victim) = state.entity_mut(target) {
        if victim.effects.remove(&EffectSlot::Shield).is_some() {
            // Shield consumed; the ram has no further effect
            events.push(RaceEvent::shield_absorbed(now, target, PowerUpKind::Ram));
        } else {
            victim.effects.insert(EffectSlot::Slow, ActiveEffect {
                kind: PowerUpKind::Ram,
                magnitude: def.magnitude,
                expires_at,
            });
            events.push(RaceEvent::ram_hit(now, source, target));
        }
    }

    events
}

/// Remove expired effects from every entity and lift an expired
/// timefreeze. Trap expiry restores the `Racing` status.
///
/// An effect with `expires_at <= now` is gone; this runs after movement
/// within the tick, so an effect expiring at tick T still shapes tick
/// T's movement.
pub fn tick_expire(state: &mut RaceState) -> Vec<RaceEvent> {
    let now = state.tick;
    let mut events = Vec::new();

    for (id, entity) in state.entities.iter_mut() {
        let expired: Vec<EffectSlot> = entity
            .effects
            .iter()
            .filter(|(_, eff)| eff.expires_at <= now)
            .map(|(slot, _)| *slot)
            .collect();

        for slot in expired {
            if let Some(eff) = entity.effects.remove(&slot) {
                if slot == EffectSlot::Trap && entity.status == EntityStatus::Trapped {
                    entity.status = EntityStatus::Racing;
                }
                events.push(RaceEvent::effect_expired(now, *id, eff.kind));
            }
        }
    }

    if let Some(tf) = state.timefreeze {
        if tf.expires_at <= now {
            state.timefreeze = None;
            events.push(RaceEvent::effect_expired(now, tf.holder, PowerUpKind::Timefreeze));
        }
    }

    events
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{to_fixed, BASE_RACE_SPEED};
    use crate::race::state::{RaceId, RacePhase};

    const DELTA_MS: u32 = 100;

    fn race_with_entities(n: u32) -> RaceState {
        let mut state = RaceState::new(RaceId::new([0; 16]), "classic", 42);
        for i in 1..=n {
            state.add_entrant(EntityId(i), format!("stable-{i}"), BASE_RACE_SPEED);
        }
        state.phase = RacePhase::Running;
        state
    }

    #[test]
    fn test_boost_occupies_speed_slot() {
        let mut state = race_with_entities(1);
        state.tick = 10;

        apply(&mut state, EntityId(1), PowerUpKind::Boost, DELTA_MS);

        let eff = state.entity(EntityId(1)).unwrap().effect(EffectSlot::Speed).unwrap();
        assert_eq!(eff.kind, PowerUpKind::Boost);
        assert_eq!(eff.magnitude, to_fixed(2.0));
        // 3000ms at 100ms/tick = 30 ticks
        assert_eq!(eff.expires_at, 40);
    }

    #[test]
    fn test_turbo_replaces_boost_last_applied_wins() {
        let mut state = race_with_entities(1);
        state.tick = 10;
        apply(&mut state, EntityId(1), PowerUpKind::Boost, DELTA_MS);

        state.tick = 20;
        apply(&mut state, EntityId(1), PowerUpKind::Turbo, DELTA_MS);

        let entity = state.entity(EntityId(1)).unwrap();
        let eff = entity.effect(EffectSlot::Speed).unwrap();
        // One slot, turbo's magnitude and a fresh expiry
        assert_eq!(entity.effects.iter().filter(|(s, _)| **s == EffectSlot::Speed).count(), 1);
        assert_eq!(eff.kind, PowerUpKind::Turbo);
        assert_eq!(eff.magnitude, to_fixed(3.0));
        assert_eq!(eff.expires_at, 40); // 2000ms / 100ms
    }

    #[test]
    fn test_trap_sets_trapped_status() {
        let mut state = race_with_entities(1);
        state.tick = 5;

        apply(&mut state, EntityId(1), PowerUpKind::Trap, DELTA_MS);

        let entity = state.entity(EntityId(1)).unwrap();
        assert_eq!(entity.status, EntityStatus::Trapped);
        assert_eq!(entity.effective_speed(), 0);
    }

    #[test]
    fn test_shield_absorbs_trap_once() {
        let mut state = race_with_entities(1);
        apply(&mut state, EntityId(1), PowerUpKind::Shield, DELTA_MS);

        // First trap: absorbed, still racing
        let events = apply(&mut state, EntityId(1), PowerUpKind::Trap, DELTA_MS);
        let entity = state.entity(EntityId(1)).unwrap();
        assert_eq!(entity.status, EntityStatus::Racing);
        assert!(!entity.has_effect(EffectSlot::Shield));
        assert!(events.iter().any(|e| matches!(
            e.data,
            crate::race::events::RaceEventData::ShieldAbsorbed { .. }
        )));

        // Second trap: lands
        apply(&mut state, EntityId(1), PowerUpKind::Trap, DELTA_MS);
        assert_eq!(state.entity(EntityId(1)).unwrap().status, EntityStatus::Trapped);
    }

    #[test]
    fn test_ram_hit_slows_target() {
        let mut state = race_with_entities(2);
        apply(&mut state, EntityId(1), PowerUpKind::Ram, DELTA_MS);

        apply_ram_hit(&mut state, EntityId(1), EntityId(2), DELTA_MS);

        let victim = state.entity(EntityId(2)).unwrap();
        let slow = victim.effect(EffectSlot::Slow).unwrap();
        assert_eq!(slow.magnitude, to_fixed(0.5));
        assert_eq!(victim.effective_speed(), to_fixed(5.0));
    }

    #[test]
    fn test_ram_against_shield_consumes_shield() {
        let mut state = race_with_entities(2);
        apply(&mut state, EntityId(2), PowerUpKind::Shield, DELTA_MS);

        apply_ram_hit(&mut state, EntityId(1), EntityId(2), DELTA_MS);

        let victim = state.entity(EntityId(2)).unwrap();
        assert!(!victim.has_effect(EffectSlot::Shield));
        assert!(!victim.has_effect(EffectSlot::Slow));
        assert_eq!(victim.effective_speed(), BASE_RACE_SPEED);
    }

    #[test]
    fn test_ram_against_ghost_is_ignored() {
        let mut state = race_with_entities(2);
        apply(&mut state, EntityId(2), PowerUpKind::Ghost, DELTA_MS);

        let events = apply_ram_hit(&mut state, EntityId(1), EntityId(2), DELTA_MS);

        assert!(events.is_empty());
        let victim = state.entity(EntityId(2)).unwrap();
        assert!(!victim.has_effect(EffectSlot::Slow));
        assert_eq!(victim.effective_speed(), BASE_RACE_SPEED);
    }

    #[test]
    fn test_ghost_source_cannot_ram() {
        let mut state = race_with_entities(2);
        apply(&mut state, EntityId(1), PowerUpKind::Ghost, DELTA_MS);

        let events = apply_ram_hit(&mut state, EntityId(1), EntityId(2), DELTA_MS);
        assert!(events.is_empty());
        assert!(!state.entity(EntityId(2)).unwrap().has_effect(EffectSlot::Slow));
    }

    #[test]
    fn test_teleport_is_one_shot() {
        let mut state = race_with_entities(1);
        let before = state.entity(EntityId(1)).unwrap().position.x;

        apply(&mut state, EntityId(1), PowerUpKind::Teleport, DELTA_MS);

        let entity = state.entity(EntityId(1)).unwrap();
        assert_eq!(entity.position.x, before + to_fixed(25.0));
        assert!(entity.effects.is_empty());
    }

    #[test]
    fn test_timefreeze_is_race_scoped() {
        let mut state = race_with_entities(3);
        state.tick = 7;

        apply(&mut state, EntityId(2), PowerUpKind::Timefreeze, DELTA_MS);

        let tf = state.timefreeze.unwrap();
        assert_eq!(tf.holder, EntityId(2));
        assert_eq!(tf.factor, to_fixed(0.5));
        assert_eq!(tf.expires_at, 27); // 2000ms / 100ms

        // No per-entity slot on anyone
        for entity in state.entities.values() {
            assert!(entity.effects.is_empty());
        }
    }

    #[test]
    fn test_expiry_restores_baseline() {
        let mut state = race_with_entities(1);
        state.tick = 10;
        apply(&mut state, EntityId(1), PowerUpKind::Boost, DELTA_MS);
        apply(&mut state, EntityId(1), PowerUpKind::Trap, DELTA_MS);

        // Trap expires at 10 + 15, boost at 10 + 30
        state.tick = 25;
        tick_expire(&mut state);
        let entity = state.entity(EntityId(1)).unwrap();
        assert_eq!(entity.status, EntityStatus::Racing);
        assert!(entity.has_effect(EffectSlot::Speed));

        state.tick = 40;
        tick_expire(&mut state);
        let entity = state.entity(EntityId(1)).unwrap();
        assert!(entity.effects.is_empty());
        assert_eq!(entity.effective_speed(), BASE_RACE_SPEED);
    }

    #[test]
    fn test_timefreeze_expiry() {
        let mut state = race_with_entities(2);
        state.tick = 0;
        apply(&mut state, EntityId(1), PowerUpKind::Timefreeze, DELTA_MS);

        state.tick = 19;
        tick_expire(&mut state);
        assert!(state.timefreeze.is_some());

        state.tick = 20;
        let events = tick_expire(&mut state);
        assert!(state.timefreeze.is_none());
        assert_eq!(events.len(), 1);
    }
}
