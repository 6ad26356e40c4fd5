//! Deterministic random number generation.
//!
//! RULE: Nothing in this crate may call a platform or thread-local RNG.
//! All randomness flows through StreamRng instances derived from a
//! caller-supplied seed.
//!
//! Each consumer gets its own stream, seeded from (seed XOR slot index).
//! This means:
//!   - Splitting a dataset never shifts the generator's draws.
//!   - Every stream is fully reproducible in isolation.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::f64::consts::PI;

/// A named, deterministic RNG for a single consumer.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream from a seed and a stable slot index.
    /// The index must never change once assigned.
    pub fn new(seed: u64, slot_index: u64) -> Self {
        let derived_seed = seed ^ (slot_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Stream for a well-known slot.
    pub fn for_slot(seed: u64, slot: StreamSlot) -> Self {
        Self::new(seed, slot as u64).with_name(slot.name())
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Uniform float in [low, high).
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Standard normal draw (Box–Muller, cosine branch).
    pub fn standard_normal(&mut self) -> f64 {
        let u1 = self.next_f64().max(f64::MIN_POSITIVE);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        mean + std_dev * self.standard_normal()
    }

    /// Normal draw clipped to [min, max].
    pub fn clipped_normal(&mut self, mean: f64, std_dev: f64, min: f64, max: f64) -> f64 {
        self.normal(mean, std_dev).clamp(min, max)
    }

    /// Log-normal draw; `mu` and `sigma` parameterize the underlying normal.
    pub fn lognormal(&mut self, mu: f64, sigma: f64) -> f64 {
        self.normal(mu, sigma).exp()
    }

    /// Pick an index according to `weights` (assumed to sum to 1).
    /// Falls back to the last index when rounding leaves a gap.
    pub fn pick_weighted(&mut self, weights: &[f64]) -> usize {
        assert!(!weights.is_empty(), "weights must not be empty");
        let roll = self.next_f64();
        let mut cumulative = 0.0;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w;
            if roll < cumulative {
                return i;
            }
        }
        weights.len() - 1
    }

    /// Choose `k` distinct indices from `0..n` (partial Fisher–Yates).
    /// The returned order is the draw order.
    pub fn sample_without_replacement(&mut self, n: usize, k: usize) -> Vec<usize> {
        let k = k.min(n);
        let mut pool: Vec<usize> = (0..n).collect();
        for i in 0..k {
            let j = i + self.next_u64_below((n - i) as u64) as usize;
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }

    /// Full permutation of `0..n`.
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        self.sample_without_replacement(n, n)
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries, only append.
/// Reordering changes every stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Generator = 0,
    Split = 1,
    Boosting = 2,
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generator => "generator",
            Self::Split => "split",
            Self::Boosting => "boosting",
        }
    }
}
