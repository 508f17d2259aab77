//! # Derby Server
//!
//! Deterministic horse-race simulation with power-up pickups, plus
//! exactly-once bet settlement against the authoritative outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      DERBY SERVER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  ├── fixed.rs     - Q16.16 fixed-point arithmetic            │
//! │  ├── vec2.rs      - Track position with fixed-point          │
//! │  └── rng.rs       - Deterministic Xorshift128+ PRNG          │
//! │                                                              │
//! │  race/            - Race simulation (deterministic)          │
//! │  ├── catalog.rs   - Power-up kinds and parameters            │
//! │  ├── state.rs     - Race, entity, and pickup state           │
//! │  ├── effect.rs    - Power-up effect engine                   │
//! │  ├── resolver.rs  - Pickup and ram contact resolution        │
//! │  ├── tick.rs      - Lifecycle state machine and clock        │
//! │  ├── outcome.rs   - Exactly-once outcome recording           │
//! │  └── events.rs    - Replayable event stream                  │
//! │                                                              │
//! │  betting/         - Monetary settlement                      │
//! │  ├── book.rs      - Bet intake while the window is open      │
//! │  └── settlement.rs- Exactly-once payout computation          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/` and `race/` modules are 100% deterministic:
//! - No floating-point arithmetic in race logic
//! - No HashMap (BTreeMap for sorted iteration)
//! - No system time dependencies inside the tick loop
//! - All randomness from the race's seeded Xorshift128+
//!
//! Given identical entrants, seed, and configuration, a race produces
//! an identical outcome on any platform. Settlement is pure integer
//! arithmetic over that outcome, so payouts replay identically too.
//!
//! Races share no mutable state: each [`race::state::RaceState`] is an
//! independent instance threaded explicitly through every call, and any
//! number of them can run concurrently.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod betting;
pub mod core;
pub mod race;

// Re-export commonly used types
pub use crate::betting::book::{Bet, BetBook, BetId};
pub use crate::betting::settlement::{SettlementEngine, SettlementRecord, SettlementSummary};
pub use crate::betting::{BettingError, Credits};
pub use crate::core::fixed::{Fixed, FIXED_HALF, FIXED_ONE, FIXED_SCALE};
pub use crate::core::rng::DeterministicRng;
pub use crate::core::vec2::FixedVec2;
pub use crate::race::catalog::{definition_for, PowerUpDefinition, PowerUpKind};
pub use crate::race::outcome::{Outcome, OutcomeRecorder};
pub use crate::race::state::{EntityId, EntityState, RaceId, RacePhase, RaceState};
pub use crate::race::tick::{RaceConfig, TickResult};
pub use crate::race::RaceError;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default simulation cadence: simulated milliseconds per tick
pub const DEFAULT_TICK_DELTA_MS: u32 = 100;
