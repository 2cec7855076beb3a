//! # Harrow — Core Library
//!
//! A sieve that finds prime factors of factorial, primorial and
//! compositorial prime candidates: every (p, n, c) with p prime in
//! [p_min, p_max), n in [n_min, n_max) and c ∈ {−1, +1} such that p divides
//! n!+c, n#+c or (n!/n#)+c.
//!
//! ## Module Organization
//!
//! **Arithmetic and generation:**
//! - [`montgomery`] — division-free modular multiplication for odd 64-bit moduli
//! - [`primality`] — deterministic 7-base Miller–Rabin, plus the base-2 screen
//! - [`primegen`] — mod-30 wheel candidate generator and prime sieving
//!
//! **Sieve pipeline:**
//! - [`products`] — compressed ≤ 2^64 product tables and their self-verification
//! - [`evaluator`] — the parallel batch evaluator (setup → iterate → check)
//! - [`verify`] — slow independent CPU recheck of every emitted factor
//! - [`report`] — sort, verify, primality-filter and log drained factors
//!
//! **Infrastructure:**
//! - [`checkpoint`] — dual alternating state files with a redundant checksum
//! - [`search`] — the orchestrator driving windows over [p_min, p_max)
//! - [`progress`] — atomic counters with a background reporter thread
//! - [`selftest`] — the fixed 12-case end-to-end regression
//!
//! ## Pipeline
//!
//! prime generator → candidate window → setup → iterate (emits factors) →
//! check (folds the work checksum). At checkpoint boundaries the host drains
//! the factor ring, verifies every factor on the CPU, filters 2-PRP false
//! positives with the deterministic primality test, appends survivors to the
//! results log and advances the dual-file checkpoint.

use serde::{Deserialize, Serialize};

pub mod checkpoint;
pub mod evaluator;
pub mod montgomery;
pub mod primality;
pub mod primegen;
pub mod products;
pub mod progress;
pub mod report;
pub mod search;
pub mod selftest;
pub mod verify;

/// Which product family is being sieved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// n! ± 1
    Factorial,
    /// n# ± 1 (product of primes ≤ n)
    Primorial,
    /// n!/# ± 1 (product of composites ≤ n)
    Compositorial,
}

impl Mode {
    /// The operator printed in result lines: `…!+1`, `…#-1`, `…!/#+1`.
    pub fn symbol(self) -> &'static str {
        match self {
            Mode::Factorial => "!",
            Mode::Primorial => "#",
            Mode::Compositorial => "!/#",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Factorial => "factorial",
            Mode::Primorial => "primorial",
            Mode::Compositorial => "compositorial",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
