//! # Primegen — Segmented 2-PRP Generation and Small-Prime Sieving
//!
//! Two generators live here:
//!
//! 1. **Segmented candidate generation** for the p-window: a mod-30 wheel
//!    (gap pattern {4, 2, 4, 2, 4, 6, 2, 6}) walks the residues coprime to
//!    {2, 3, 5}; survivors of trial division by the primes 7..=113 are
//!    screened with a strong base-2 probable-prime test. The output is the
//!    exact set of odd strong 2-PRPs in the window with no factor ≤ 113 —
//!    all primes, plus a thin scatter of pseudoprimes that the reporting
//!    pipeline later discards. Values below 114 cannot survive their own
//!    trial division, so windows starting below 114 inject the needed
//!    primes from a fixed table instead.
//!
//! 2. **A wheel-30 sieve of Eratosthenes** (`primes_up_to` / `primes_in`)
//!    for the 32-bit term lists consumed by the product-table builder and
//!    the CPU verifier. Stores one byte per 30 integers.
//!
//! The wheel walk uses checked increments throughout, so windows reaching
//! toward 2^64 terminate cleanly instead of wrapping; callers clamp window
//! ends to 2^64 − 1.

use rayon::prelude::*;

use crate::primality::is_strong_2prp;

/// Gaps between consecutive residues coprime to 30, cycling from index 0
/// at residue 7: 7 → 11 → 13 → 17 → 19 → 23 → 29 → 31 → 37 → …
pub const WHEEL: [u64; 8] = [4, 2, 4, 2, 4, 6, 2, 6];

/// Primes below 114, injected directly for windows the wheel path cannot
/// cover.
pub const SMALL_PRIMES: [u64; 30] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89,
    97, 101, 103, 107, 109, 113,
];

/// Trial divisors applied to wheel candidates (2, 3, 5 are excluded by the
/// wheel itself).
const TRIAL_PRIMES: [u64; 27] = [
    7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97, 101,
    103, 107, 109, 113,
];

/// Find the first value N ≥ start with N coprime to 30, and the wheel index
/// such that repeatedly adding `WHEEL[idx]` (advancing idx mod 8) walks all
/// subsequent coprime-to-30 values in order.
///
/// The search runs a mod-6 wheel forward from ⌊start/6⌋·6 − 1 skipping
/// multiples of 5, then continues until a multiple of 5 identifies the
/// mod-30 residue class, and finally back-walks to the aligned value to
/// recover its index. Returns None when no aligned value ≥ start fits in
/// u64.
pub fn wheel_align(start: u64) -> Option<(u64, usize)> {
    if start < 7 {
        // the mod-6 walk below starts at 6k - 1; seed it past the axle primes
        return Some((7, 0));
    }

    // widen: the alignment scan may step a few values past u64::MAX
    let s = u128::from(start);
    let mut n = (s / 6) * 6 - 1;
    let mut up2 = true; // next mod-6 gap is +2 when true, +4 when false
    while n < s || n % 5 == 0 {
        if up2 {
            n += 2;
            up2 = false;
        } else {
            n += 4;
            up2 = true;
        }
    }
    let aligned = n;

    // forward with the mod-6 wheel until a multiple of 5 pins the residue class
    let mut idx: usize;
    let mut m = n;
    loop {
        if up2 {
            m += 2;
            up2 = false;
            if m % 5 == 0 {
                m -= 2;
                idx = 5;
                break;
            }
        } else {
            m += 4;
            up2 = true;
            if m % 5 == 0 {
                m -= 4;
                idx = 7;
                break;
            }
        }
    }

    // back-walk to the aligned value, rotating the index with each gap
    while m != aligned {
        idx = if idx == 0 { 7 } else { idx - 1 };
        m -= u128::from(WHEEL[idx]);
    }

    u64::try_from(aligned).ok().map(|a| (a, idx))
}

/// True when n has no prime factor in 7..=113. Values ≤ 113 fail against
/// themselves, which is why the small-prime table exists.
#[inline]
fn survives_trial_division(n: u64) -> bool {
    TRIAL_PRIMES.iter().all(|&p| n % p != 0)
}

/// Collect the strong 2-PRPs among the wheel candidates in [a, b).
fn collect_range(a: u64, b: u64, out: &mut Vec<u64>) {
    let Some((mut n, mut idx)) = wheel_align(a) else {
        return;
    };
    while n < b {
        if survives_trial_division(n) && is_strong_2prp(n) {
            out.push(n);
        }
        match n.checked_add(WHEEL[idx]) {
            Some(next) => n = next,
            None => break,
        }
        idx = (idx + 1) & 7;
    }
}

/// Generate the odd strong 2-PRPs in [a, b), ascending.
///
/// The window is split into per-thread sub-ranges, each independently
/// wheel-aligned; every coprime-to-30 value lands in exactly one sub-range,
/// so the concatenated output is identical for any thread count.
pub fn segment_candidates(a: u64, b: u64) -> Vec<u64> {
    if a >= b {
        return Vec::new();
    }
    let width = b - a;
    let pieces = (rayon::current_num_threads() * 4).max(1) as u64;
    let chunk = (width / pieces).max(30);

    let bounds: Vec<(u64, u64)> = {
        let mut v = Vec::new();
        let mut lo = a;
        while lo < b {
            let hi = lo.saturating_add(chunk).min(b);
            v.push((lo, hi));
            lo = hi;
        }
        v
    };

    let parts: Vec<Vec<u64>> = bounds
        .par_iter()
        .map(|&(lo, hi)| {
            let mut v = Vec::new();
            collect_range(lo, hi, &mut v);
            v
        })
        .collect();

    let mut out = Vec::with_capacity(parts.iter().map(Vec::len).sum());
    for p in parts {
        out.extend_from_slice(&p);
    }
    out
}

/// The small primes that fall inside [a, b).
pub fn small_primes_in(a: u64, b: u64) -> Vec<u64> {
    SMALL_PRIMES
        .iter()
        .copied()
        .filter(|&p| p >= a && p < b)
        .collect()
}

/// Estimate of the candidate count in [a, b) from the prime counting
/// function, padded the way the batch evaluator sizes its arrays.
pub fn estimate_candidates(a: u64, b: u64) -> usize {
    if b <= a || b < 3 {
        return 0;
    }
    let lo = (a.max(2)) as f64;
    let hi = b as f64;
    let approx = (hi / hi.ln() - lo / lo.ln()).max(16.0);
    (1.5 * approx) as usize
}

// ── Wheel-30 sieve of Eratosthenes ─────────────────────────────────────

/// Residues coprime to 30, one bit each per 30-wide segment.
const RESIDUES: [u8; 8] = [1, 7, 11, 13, 17, 19, 23, 29];

/// Map residue mod 30 → bit index, 255 for residues the wheel skips.
const RES_TO_IDX: [u8; 30] = [
    255, 0, 255, 255, 255, 255, 255, 1, 255, 255, 255, 2, 255, 3, 255, 255, 255, 4, 255, 5, 255,
    255, 255, 6, 255, 255, 255, 255, 255, 7,
];

/// All primes ≤ limit, via a wheel-30 sieve (one byte per 30 integers).
pub fn primes_up_to(limit: u32) -> Vec<u32> {
    if limit < 2 {
        return vec![];
    }
    if limit < 7 {
        return [2u32, 3, 5].iter().copied().filter(|&p| p <= limit).collect();
    }

    let limit = limit as usize;
    let num_segments = limit / 30 + 1;
    let mut sieve = vec![0xFFu8; num_segments];

    let sqrt_limit = (limit as f64).sqrt() as usize + 1;
    for seg in 0..=(sqrt_limit / 30) {
        for &ri in &RESIDUES {
            let n = seg * 30 + ri as usize;
            if n < 7 || n > sqrt_limit {
                continue;
            }
            let idx = RES_TO_IDX[ri as usize] as usize;
            if sieve[seg] & (1 << idx) == 0 {
                continue;
            }
            // odd multiples only; even ones carry no wheel bit anyway
            let mut m = n * n;
            while m <= limit {
                let mr = m % 30;
                if RES_TO_IDX[mr] != 255 {
                    sieve[m / 30] &= !(1 << RES_TO_IDX[mr]);
                }
                m += 2 * n;
            }
        }
    }

    let mut primes = Vec::with_capacity(estimate_candidates(2, limit as u64 + 1).max(8));
    primes.extend_from_slice(&[2, 3, 5]);
    for (seg, &byte) in sieve.iter().enumerate() {
        if byte == 0 {
            continue;
        }
        for (bit_idx, &r) in RESIDUES.iter().enumerate() {
            if byte & (1 << bit_idx) != 0 {
                let n = seg * 30 + r as usize;
                if n > 5 && n <= limit {
                    primes.push(n as u32);
                }
            }
        }
    }
    primes
}

/// Primes in [lo, hi], both bounds inclusive.
pub fn primes_in(lo: u32, hi: u32) -> Vec<u32> {
    if hi < lo {
        return vec![];
    }
    let mut primes = primes_up_to(hi);
    primes.retain(|&p| p >= lo);
    primes
}
