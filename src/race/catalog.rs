//! Power-Up Catalog
//!
//! Immutable registry of power-up kinds and their behavioral parameters.
//! The display table (name, color) lives with the configuration
//! collaborator; only kind, pickup radius, magnitude, and duration matter
//! here.
//!
//! Magnitude and duration values are tunable design constants. They are
//! not derivable from the display table and were chosen to keep a race
//! competitive over a ~1000 unit track; change them here, nowhere else.

use std::fmt;
use std::str::FromStr;
use serde::{Serialize, Deserialize};

use crate::core::fixed::{Fixed, to_fixed};
use crate::race::RaceError;

/// Power-up kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum PowerUpKind {
    /// Speed multiplier for a duration
    Boost = 0,
    /// Immunity to ram contact, both directions
    Ghost = 1,
    /// Holds the victim in place for a duration
    Trap = 2,
    /// Arms a contact charge that slows the next entity hit
    Ram = 3,
    /// Stronger boost, same slot as boost
    Turbo = 4,
    /// Absorbs the next incoming trap or ram, once
    Shield = 5,
    /// One-shot jump forward along the track
    Teleport = 6,
    /// Enlarged pickup radius for a duration
    Magnet = 7,
    /// Slows every other entrant for a duration
    Timefreeze = 8,
}

/// All kinds, in tag order. Drives catalog iteration and spawn rolls.
pub const ALL_KINDS: [PowerUpKind; 9] = [
    PowerUpKind::Boost,
    PowerUpKind::Ghost,
    PowerUpKind::Trap,
    PowerUpKind::Ram,
    PowerUpKind::Turbo,
    PowerUpKind::Shield,
    PowerUpKind::Teleport,
    PowerUpKind::Magnet,
    PowerUpKind::Timefreeze,
];

impl PowerUpKind {
    /// Stable string tag, as persisted alongside pickup rows.
    pub fn as_str(self) -> &'static str {
        match self {
            PowerUpKind::Boost => "boost",
            PowerUpKind::Ghost => "ghost",
            PowerUpKind::Trap => "trap",
            PowerUpKind::Ram => "ram",
            PowerUpKind::Turbo => "turbo",
            PowerUpKind::Shield => "shield",
            PowerUpKind::Teleport => "teleport",
            PowerUpKind::Magnet => "magnet",
            PowerUpKind::Timefreeze => "timefreeze",
        }
    }
}

impl fmt::Display for PowerUpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerUpKind {
    type Err = RaceError;

    /// Parse an externally supplied kind tag.
    ///
    /// Placement requests referencing a kind this build does not know are
    /// rejected here, before they can reach the race world.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_KINDS
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| RaceError::UnknownKind(s.to_string()))
    }
}

/// Static parameters for one power-up kind.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PowerUpDefinition {
    /// Which kind this defines
    pub kind: PowerUpKind,
    /// Trigger radius for pickup proximity (Q16.16 units)
    pub pickup_radius: Fixed,
    /// Effect strength; meaning depends on the kind (speed multiplier,
    /// slow factor, forward distance, radius multiplier)
    pub magnitude: Fixed,
    /// Effect lifetime in milliseconds; 0 for one-shot effects
    pub duration_ms: u32,
}

/// The catalog table, indexed by kind discriminant.
///
/// Read-only after process start; there is deliberately no mutation
/// surface.
static CATALOG: [PowerUpDefinition; 9] = [
    PowerUpDefinition {
        kind: PowerUpKind::Boost,
        pickup_radius: to_fixed(3.0),
        magnitude: to_fixed(2.0), // 2x speed
        duration_ms: 3000,
    },
    PowerUpDefinition {
        kind: PowerUpKind::Ghost,
        pickup_radius: to_fixed(2.5),
        magnitude: 0,
        duration_ms: 4000,
    },
    PowerUpDefinition {
        kind: PowerUpKind::Trap,
        pickup_radius: to_fixed(2.5),
        magnitude: 0,
        duration_ms: 1500,
    },
    PowerUpDefinition {
        kind: PowerUpKind::Ram,
        pickup_radius: to_fixed(2.5),
        magnitude: to_fixed(0.5), // victim speed halved
        duration_ms: 2500,
    },
    PowerUpDefinition {
        kind: PowerUpKind::Turbo,
        pickup_radius: to_fixed(3.0),
        magnitude: to_fixed(3.0), // 3x speed, strictly above boost
        duration_ms: 2000,
    },
    PowerUpDefinition {
        kind: PowerUpKind::Shield,
        pickup_radius: to_fixed(2.5),
        magnitude: 0,
        duration_ms: 5000,
    },
    PowerUpDefinition {
        kind: PowerUpKind::Teleport,
        pickup_radius: to_fixed(2.0),
        magnitude: to_fixed(25.0), // units forward
        duration_ms: 0,            // one-shot
    },
    PowerUpDefinition {
        kind: PowerUpKind::Magnet,
        pickup_radius: to_fixed(2.5),
        magnitude: to_fixed(2.5), // pickup radius multiplier
        duration_ms: 4000,
    },
    PowerUpDefinition {
        kind: PowerUpKind::Timefreeze,
        pickup_radius: to_fixed(2.0),
        magnitude: to_fixed(0.5), // everyone else at half speed
        duration_ms: 2000,
    },
];

/// Look up the definition for a kind.
///
/// Total over the enum: every kind has an entry, so this cannot fail.
/// Bad external references are rejected earlier, at tag parse time.
#[inline]
pub fn definition_for(kind: PowerUpKind) -> &'static PowerUpDefinition {
    &CATALOG[kind as usize]
}

/// Spawn weight for a kind, out of 100.
///
/// Movement effects dominate; the race-warping kinds stay rare.
pub fn spawn_weight(kind: PowerUpKind) -> u32 {
    match kind {
        PowerUpKind::Boost => 30,
        PowerUpKind::Trap => 15,
        PowerUpKind::Shield => 13,
        PowerUpKind::Ram => 12,
        PowerUpKind::Ghost => 10,
        PowerUpKind::Turbo => 8,
        PowerUpKind::Magnet => 6,
        PowerUpKind::Teleport => 4,
        PowerUpKind::Timefreeze => 2,
    }
}

/// Roll a kind from the weighted distribution.
pub fn roll_kind(rng: &mut crate::core::rng::DeterministicRng) -> PowerUpKind {
    let total: u32 = ALL_KINDS.iter().map(|k| spawn_weight(*k)).sum();
    let mut roll = rng.next_int(total);
    for kind in ALL_KINDS {
        let w = spawn_weight(kind);
        if roll < w {
            return kind;
        }
        roll -= w;
    }
    // Weights sum to `total`, so the loop always returns
    PowerUpKind::Boost
}
