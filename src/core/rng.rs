//! Deterministic Random Number Generator
//!
//! Xorshift128+ PRNG seeded per race. Given the same seed it produces
//! an identical sequence on every platform, which keeps pickup spawning
//! replayable.

use serde::{Serialize, Deserialize};
use sha2::{Sha256, Digest};

use super::fixed::Fixed;

/// Deterministic PRNG using the Xorshift128+ algorithm.
///
/// All stochastic pickup placement draws from one of these, owned by the
/// race state. Nothing else in the simulation is allowed a source of
/// randomness.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeterministicRng {
    state: [u64; 2],
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DeterministicRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // State must never be all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Create an RNG seeded from race parameters.
    ///
    /// Derives the seed from the race id and the sorted entrant ids so
    /// it is unique per race and reproducible by anyone replaying it.
    pub fn from_race_params(race_id: &[u8; 16], entrant_ids: &[u32]) -> Self {
        Self::new(derive_race_seed(race_id, entrant_ids))
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random Fixed in range [0, max).
    #[inline]
    pub fn next_fixed(&mut self, max: Fixed) -> Fixed {
        if max <= 0 {
            return 0;
        }
        // Use upper 32 bits: (raw * max) / 2^32
        let raw = (self.next_u64() >> 32) as u32;
        ((raw as i64 * max as i64) >> 32) as Fixed
    }

    /// Generate a random Fixed in range [min, max).
    #[inline]
    pub fn next_fixed_range(&mut self, min: Fixed, max: Fixed) -> Fixed {
        if min >= max {
            return min;
        }
        let range = max.wrapping_sub(min);
        min.wrapping_add(self.next_fixed(range))
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Derive a race seed from the race id and sorted entrant ids.
///
/// The entrant list is hashed in sorted order so the seed does not
/// depend on registration order.
pub fn derive_race_seed(race_id: &[u8; 16], entrant_ids: &[u32]) -> u64 {
    let mut hasher = Sha256::new();

    // Domain separator
    hasher.update(b"DERBY_SEED_V1");
    hasher.update(race_id);

    let mut sorted = entrant_ids.to_vec();
    sorted.sort_unstable();
    for id in sorted {
        hasher.update(id.to_le_bytes());
    }

    let hash = hasher.finalize();
    u64::from_le_bytes(hash[0..8].try_into().unwrap())
}

// =============================================================================
// TESTS
// =============================================================================
