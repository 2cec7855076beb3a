//! # Products — Compressed ≤ 2^64 Term Tables for the Setup Stage
//!
//! The setup stage must fold the whole small-term contribution of
//! base_(n_min − 1) into each candidate's residue. Feeding it every prime
//! (or composite) individually would cost one modular multiply per term per
//! candidate; instead the terms are concatenated greedily into the largest
//! products that still fit in a u64, shrinking the table by roughly the
//! average term bit-length.
//!
//! Per mode:
//! - **factorial**: base is (n_min − 1)!, expressed prime-by-prime through
//!   Legendre's formula. Consecutive primes sharing the same total exponent
//!   are concatenated; each table entry carries (product, exponent,
//!   lead bit) and the setup stage raises the combined product to the
//!   exponent with one square-and-multiply chain.
//! - **primorial**: base is (n_min − 1)#; primes below n_min compress into
//!   plain products, and a separate tail list of the primes in
//!   [n_min, n_max) feeds the iterate stage.
//! - **compositorial**: base is the product of composites below n_min;
//!   the iterate stage additionally needs the primes in
//!   [n_min, n_max + 320] so its cursor can skip prime k (320 covers the
//!   largest prime gap below 2^31).
//!
//! Before any iteration the tables are verified: the full uncompressed term
//! chain and the compressed table are folded modulo four fixed large primes
//! and compared. A mismatch means a compression bug and aborts the run.

use anyhow::{bail, Result};
use rayon::prelude::*;

use crate::montgomery::{pow_with_lead, Montgomery};
use crate::primegen::{primes_in, primes_up_to};
use crate::Mode;

/// Exponent attached to a factorial table entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Power {
    /// Total exponent shared by every prime concatenated into the entry.
    pub total: u32,
    /// Bit below the most significant bit of `total`; 0 when total ≤ 1.
    pub lead_bit: u32,
}

/// Immutable per-mode term tables, built once at first iteration and handed
/// to the batch evaluator as a flat view.
pub struct ProductTable {
    /// Compressed products, each ≤ 2^64 − 1.
    pub entries: Vec<u64>,
    /// Factorial only: exponent chain per entry (empty otherwise).
    pub powers: Vec<Power>,
    /// Primorial: primes in [n_min, n_max). Compositorial: primes in
    /// [n_min, n_max + 320]. Factorial: empty.
    pub iter_terms: Vec<u32>,
}

/// Total exponent of `prime` in (start_n)! by Legendre's formula, with the
/// lead bit for the setup stage's square-and-multiply chain.
fn legendre_power(prime: u32, start_n: u32) -> Power {
    let mut total: u32 = 0;
    let mut pk = u64::from(prime);
    let mut q = u64::from(start_n) / pk;
    loop {
        total += q as u32;
        pk *= u64::from(prime);
        if pk > u64::from(start_n) {
            break;
        }
        q = u64::from(start_n) / pk;
    }
    let lead_bit = if total > 1 {
        1u32 << (31 - total.leading_zeros() - 1)
    } else {
        0
    };
    Power { total, lead_bit }
}

/// Greedy concatenation: each output entry is the product of the longest
/// run of consecutive terms that stays ≤ 2^64 − 1.
fn compress_products(terms: &[u32]) -> Vec<u64> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < terms.len() {
        let mut prod = u64::from(terms[i]);
        i += 1;
        while i < terms.len() {
            let wide = u128::from(prod) * u128::from(terms[i]);
            if wide > u128::from(u64::MAX) {
                break;
            }
            prod = wide as u64;
            i += 1;
        }
        out.push(prod);
    }
    out
}

/// The composites in [lo, hi) in ascending order.
pub fn composites_in(lo: u32, hi: u32) -> Vec<u32> {
    if hi <= lo {
        return Vec::new();
    }
    let primes = primes_up_to(hi - 1);
    let mut cursor = primes.partition_point(|&p| p < lo);
    let mut out = Vec::with_capacity((hi - lo) as usize);
    for n in lo.max(2)..hi {
        if cursor < primes.len() && primes[cursor] == n {
            cursor += 1;
            continue;
        }
        out.push(n);
    }
    out
}

impl ProductTable {
    /// Build the table for one mode. n_min ≥ 101 and n_min < n_max are
    /// enforced upstream.
    pub fn build(mode: Mode, n_min: u32, n_max: u32) -> Self {
        let start = n_min - 1;
        match mode {
            Mode::Factorial => {
                let primes = primes_up_to(start);
                let powers: Vec<Power> =
                    primes.iter().map(|&p| legendre_power(p, start)).collect();

                // concatenate runs of equal total exponent while the product fits
                let mut entries = Vec::new();
                let mut entry_powers = Vec::new();
                let mut i = 0;
                while i < primes.len() {
                    let mut prod = u64::from(primes[i]);
                    let pw = powers[i];
                    i += 1;
                    while i < primes.len() && powers[i].total == pw.total {
                        let wide = u128::from(prod) * u128::from(primes[i]);
                        if wide > u128::from(u64::MAX) {
                            break;
                        }
                        prod = wide as u64;
                        i += 1;
                    }
                    entries.push(prod);
                    entry_powers.push(pw);
                }
                ProductTable {
                    entries,
                    powers: entry_powers,
                    iter_terms: Vec::new(),
                }
            }
            Mode::Primorial => ProductTable {
                entries: compress_products(&primes_up_to(start)),
                powers: Vec::new(),
                iter_terms: primes_in(n_min, n_max - 1),
            },
            Mode::Compositorial => ProductTable {
                entries: compress_products(&composites_in(2, n_min)),
                powers: Vec::new(),
                iter_terms: primes_in(n_min, n_max + 320),
            },
        }
    }

    /// Fold the compressed entries modulo ctx.p, in Montgomery form
    /// (result = ∏ entries · 2^64 mod p; factorial applies each exponent).
    fn fold_compressed(&self, ctx: &Montgomery) -> u64 {
        let mut acc = ctx.one;
        if self.powers.is_empty() {
            for &e in &self.entries {
                acc = ctx.mul(acc, ctx.to_mont(e));
            }
        } else {
            for (&e, pw) in self.entries.iter().zip(&self.powers) {
                let base = ctx.to_mont(e);
                acc = ctx.mul(acc, pow_with_lead(base, pw.total, pw.lead_bit, ctx.p, ctx.q));
            }
        }
        acc
    }
}

/// Fixed odd prime moduli for the table self-check. Large enough that no
/// 32-bit term ever collapses to zero.
const CHECK_MODULI: [u64; 4] = [
    2305843009213693951,  // 2^61 - 1
    4611686018427387847,  // 2^62 - 57
    9223372036854775783,  // 2^63 - 25
    18446744073709551557, // 2^64 - 59
];

/// ∏ terms · 2^64 mod p over 32-bit terms, folded in parallel chunks.
/// Montgomery products compose: (a·R)(b·R)·R⁻¹ = ab·R, so chunk partials
/// combine with one more multiply in any order.
fn fold_terms(ctx: &Montgomery, terms: &[u32]) -> u64 {
    terms
        .par_chunks(1 << 16)
        .map(|chunk| {
            let mut acc = ctx.one;
            for &t in chunk {
                acc = ctx.mul(acc, ctx.to_mont(u64::from(t)));
            }
            acc
        })
        .reduce(|| ctx.one, |a, b| ctx.mul(a, b))
}

/// ∏ k for k in [lo, hi) · 2^64 mod p, folded in parallel chunks.
fn fold_range(ctx: &Montgomery, lo: u32, hi: u32) -> u64 {
    if hi <= lo {
        return ctx.one;
    }
    let bounds: Vec<(u32, u32)> = (lo..hi)
        .step_by(1 << 16)
        .map(|a| (a, a.saturating_add(1 << 16).min(hi)))
        .collect();
    bounds
        .par_iter()
        .map(|&(a, b)| {
            let mut acc = ctx.one;
            for k in a..b {
                acc = ctx.mul(acc, ctx.to_mont(u64::from(k)));
            }
            acc
        })
        .reduce(|| ctx.one, |a, b| ctx.mul(a, b))
}

/// Independent recomputation of the full term chain against the compressed
/// table, modulo each check modulus. For primorial and compositorial this
/// covers the iterate-stage term list as well, so a hole in the tail primes
/// is caught here rather than as a wrong checksum at the end of a run.
pub fn verify_tables(
    mode: Mode,
    n_min: u32,
    n_max: u32,
    table: &ProductTable,
) -> Result<()> {
    for &m in &CHECK_MODULI {
        let ctx = Montgomery::new(m);

        let (slow, fast) = match mode {
            Mode::Factorial => {
                // (n_min - 1)! one factor at a time vs the power table
                (fold_range(&ctx, 2, n_min), table.fold_compressed(&ctx))
            }
            Mode::Primorial => {
                // every prime < n_max vs products × tail list
                let slow = fold_terms(&ctx, &primes_up_to(n_max - 1));
                let fast = ctx.mul(
                    table.fold_compressed(&ctx),
                    fold_terms(&ctx, &table.iter_terms),
                );
                (slow, fast)
            }
            Mode::Compositorial => {
                // every composite < n_max vs products × the cursor walk the
                // iterate stage will perform
                let slow = fold_terms(&ctx, &composites_in(2, n_max));
                let mut walk = ctx.one;
                let mut pos = 0usize;
                for k in n_min..n_max {
                    if pos < table.iter_terms.len() && table.iter_terms[pos] == k {
                        pos += 1;
                        continue;
                    }
                    walk = ctx.mul(walk, ctx.to_mont(u64::from(k)));
                }
                (slow, ctx.mul(table.fold_compressed(&ctx), walk))
            }
        };

        if slow != fast {
            bail!(
                "{} table verification failed modulo {}: uncompressed {:#018x} != compressed {:#018x}",
                mode,
                m,
                slow,
                fast
            );
        }
    }
    Ok(())
}
