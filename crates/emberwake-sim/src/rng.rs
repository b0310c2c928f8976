//! Seeded random streams.
//!
//! Each subsystem that rolls dice owns its own stream derived from the session
//! seed, so adding a roll in one subsystem never shifts another's sequence.

use rand::Rng;
use rand_pcg::Pcg32;

/// Stream ids used to derive per-subsystem generators from one seed.
pub mod stream {
    pub const COMBAT: u64 = 1;
    pub const LOOT: u64 = 2;
    pub const WAVES: u64 = 3;
}

/// Deterministic generator for combat rolls.
#[derive(Debug, Clone)]
pub struct CombatRng {
    inner: Pcg32,
}

impl CombatRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: seeded(seed, stream::COMBAT),
        }
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        self.inner.gen::<f32>()
    }

    /// `true` with probability `chance` (clamped to `[0, 1]`).
    pub fn roll(&mut self, chance: f32) -> bool {
        if chance <= 0.0 {
            return false;
        }
        if chance >= 1.0 {
            return true;
        }
        self.next_f32() < chance
    }
}

/// A PCG generator for `seed` on `stream`.
pub fn seeded(seed: u64, stream: u64) -> Pcg32 {
    Pcg32::new(seed, stream.wrapping_mul(2).wrapping_add(1))
}
