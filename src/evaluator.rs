//! # Evaluator — The Parallel Batch Residue Pipeline
//!
//! For one candidate window this module computes, per candidate p, the
//! residue of the mode's product as n walks from n_min to n_max − 1, and
//! emits a [`Factor`] whenever the residue hits ±1 mod p. The contract is
//! three operations over shared batch state:
//!
//! - **setup(s_start, s_end)** — fold product-table entries [s_start, s_end)
//!   into every residue. Residues start at Montgomery-1 on `load`; after the
//!   full span each residue is base_(n_min − 1) mod p.
//! - **iterate(n_start, n_end, prime_pos)** — advance every residue through
//!   the per-step factors for k in [n_start, n_end): every k for factorial,
//!   the k-th tail prime for primorial, every non-prime k for compositorial
//!   (`prime_pos` seeds the skip cursor). After each multiplication,
//!   residue = Montgomery-1 emits (p, −k) and residue = Montgomery-(p−1)
//!   emits (p, +k) into the bounded factor ring.
//! - **check(last_n)** — fold per-candidate checksum terms into 256-wide
//!   group sums and accumulate them into the running batch checksum
//!   (wrapping u64, so grouping and evaluation order never change the
//!   value), and add the window's candidate count to the batch prime
//!   count. For factorial and compositorial each candidate contributes its
//!   residue plus the Montgomery form of last_n (a plain u64 sum); for
//!   primorial it contributes the residue alone.
//!
//! The realization here is a rayon thread pool: candidates are independent,
//! so each operation is a `par_iter_mut` over the window. A GPU kernel set
//! or SIMD dispatch could sit behind the same [`Evaluator`] trait.
//!
//! Factor emission goes through a fixed-capacity ring with an atomic tail:
//! producers reserve a slot with `fetch_add` and write it; a reservation
//! past the end sets the overflow flag, which is fatal at the next drain —
//! a ring too small for the range is a sizing error, not a condition to
//! recover from. Slot order is whatever the pool raced to; the reporting
//! pipeline sorts.

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};

use crate::montgomery::{m_mul, pow_with_lead, Montgomery};
use crate::products::ProductTable;
use crate::Mode;

/// One reported divisibility hit: p divides base_(|nc|) + c, where
/// nc > 0 means c = +1 and nc < 0 means c = −1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Factor {
    pub p: u64,
    pub nc: i32,
}

impl Factor {
    #[inline]
    pub fn n(&self) -> u32 {
        self.nc.unsigned_abs()
    }

    #[inline]
    pub fn c(&self) -> i32 {
        if self.nc < 0 {
            -1
        } else {
            1
        }
    }
}

struct Slot {
    p: AtomicU64,
    nc: AtomicI32,
}

/// Bounded multi-producer factor buffer with an atomic tail counter.
pub struct FactorRing {
    slots: Box<[Slot]>,
    tail: AtomicU32,
    overflow: AtomicBool,
}

impl FactorRing {
    pub fn new(capacity: u32) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                p: AtomicU64::new(0),
                nc: AtomicI32::new(0),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        FactorRing {
            slots,
            tail: AtomicU32::new(0),
            overflow: AtomicBool::new(false),
        }
    }

    /// Reserve the next slot and write one factor. Lock-free; safe from any
    /// number of producers. A reservation beyond capacity only raises the
    /// overflow flag.
    #[inline]
    pub fn push(&self, p: u64, nc: i32) {
        let idx = self.tail.fetch_add(1, Ordering::Relaxed) as usize;
        match self.slots.get(idx) {
            Some(slot) => {
                slot.p.store(p, Ordering::Relaxed);
                slot.nc.store(nc, Ordering::Relaxed);
            }
            None => self.overflow.store(true, Ordering::Relaxed),
        }
    }

    /// Number of factors currently held (clamped to capacity).
    pub fn len(&self) -> u32 {
        self.tail.load(Ordering::Relaxed).min(self.slots.len() as u32)
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == 0
    }

    pub fn overflowed(&self) -> bool {
        self.overflow.load(Ordering::Relaxed)
    }

    /// Copy the held factors out and reset. Exclusive access guarantees all
    /// producer writes are visible (the pool has quiesced by then).
    pub fn drain(&mut self) -> Vec<Factor> {
        let n = (self.tail.load(Ordering::Relaxed) as usize).min(self.slots.len());
        let out = self.slots[..n]
            .iter()
            .map(|s| Factor {
                p: s.p.load(Ordering::Relaxed),
                nc: s.nc.load(Ordering::Relaxed),
            })
            .collect();
        self.tail.store(0, Ordering::Relaxed);
        self.overflow.store(false, Ordering::Relaxed);
        out
    }
}

/// Everything the host reads back at a drain boundary.
pub struct Drain {
    pub factors: Vec<Factor>,
    /// Candidates processed since the previous drain.
    pub prime_count: u64,
    /// Check-stage checksum contribution since the previous drain
    /// (wrapping u64).
    pub checksum: u64,
    /// Largest single window seen, validated against the sizing estimate.
    pub max_segment: u32,
    pub overflowed: bool,
}

/// The narrow batch-evaluator capability the orchestrator drives.
pub trait Evaluator {
    /// Install a candidate window (odd 2-PRPs, ascending) and reset every
    /// residue to Montgomery-1.
    fn load(&mut self, window: &[u64]);
    /// Apply product-table entries [s_start, s_end) to every residue.
    fn setup(&mut self, s_start: usize, s_end: usize);
    /// Advance residues through per-step factors k in [n_start, n_end),
    /// emitting factors. `prime_pos` seeds the compositorial skip cursor
    /// (ignored by the other modes).
    fn iterate(&mut self, n_start: u32, n_end: u32, prime_pos: usize);
    /// Fold per-candidate checksum terms into the running checksum and
    /// count the window. `last_n` is n_max − 1 for factorial and
    /// compositorial (the n the residues now hold, also folded per
    /// candidate in Montgomery form) and the tail-list length for
    /// primorial.
    fn check(&mut self, last_n: u32);
    /// Read and reset the batch accumulators.
    fn drain(&mut self) -> Drain;
}

/// Per-candidate batch state: the modulus, its Montgomery constants and the
/// running residue.
struct Candidate {
    p: u64,
    q: u64,
    one: u64,
    pmo: u64,
    r2: u64,
    res: u64,
}

/// Rayon realization of [`Evaluator`].
pub struct ThreadPoolEval<'t> {
    mode: Mode,
    table: &'t ProductTable,
    cands: Vec<Candidate>,
    ring: FactorRing,
    prime_count: u64,
    checksum: u64,
    max_segment: u32,
    /// Exclusive end of the last iterate span, cross-checked by `check`.
    iterated_to: u32,
}

impl<'t> ThreadPoolEval<'t> {
    pub fn new(mode: Mode, table: &'t ProductTable, num_results: u32) -> Self {
        ThreadPoolEval {
            mode,
            table,
            cands: Vec::new(),
            ring: FactorRing::new(num_results),
            prime_count: 0,
            checksum: 0,
            max_segment: 0,
            iterated_to: 0,
        }
    }
}

impl Evaluator for ThreadPoolEval<'_> {
    fn load(&mut self, window: &[u64]) {
        self.cands = window
            .par_iter()
            .map(|&p| {
                let m = Montgomery::new(p);
                Candidate {
                    p,
                    q: m.q,
                    one: m.one,
                    pmo: m.minus_one(),
                    r2: m.r2,
                    res: m.one,
                }
            })
            .collect();
        self.max_segment = self.max_segment.max(window.len() as u32);
        self.iterated_to = 0;
    }

    fn setup(&mut self, s_start: usize, s_end: usize) {
        let entries = &self.table.entries[s_start..s_end];
        let powers = if self.table.powers.is_empty() {
            &[][..]
        } else {
            &self.table.powers[s_start..s_end]
        };

        self.cands.par_iter_mut().for_each(|c| {
            let mut res = c.res;
            for (j, &e) in entries.iter().enumerate() {
                // e reduced mod p and into Montgomery form in one step
                let mut b = m_mul(e, c.r2, c.p, c.q);
                if let Some(pw) = powers.get(j) {
                    b = pow_with_lead(b, pw.total, pw.lead_bit, c.p, c.q);
                }
                res = m_mul(res, b, c.p, c.q);
            }
            c.res = res;
        });
    }

    fn iterate(&mut self, n_start: u32, n_end: u32, prime_pos: usize) {
        let ring = &self.ring;
        let terms = &self.table.iter_terms;

        match self.mode {
            Mode::Factorial => {
                self.cands.par_iter_mut().for_each(|c| {
                    let mut res = c.res;
                    for k in n_start..n_end {
                        let mk = m_mul(u64::from(k), c.r2, c.p, c.q);
                        res = m_mul(res, mk, c.p, c.q);
                        if res == c.one {
                            ring.push(c.p, -(k as i32));
                        } else if res == c.pmo {
                            ring.push(c.p, k as i32);
                        }
                    }
                    c.res = res;
                });
            }
            Mode::Primorial => {
                self.cands.par_iter_mut().for_each(|c| {
                    let mut res = c.res;
                    for &t in &terms[n_start as usize..n_end as usize] {
                        let mt = m_mul(u64::from(t), c.r2, c.p, c.q);
                        res = m_mul(res, mt, c.p, c.q);
                        if res == c.one {
                            ring.push(c.p, -(t as i32));
                        } else if res == c.pmo {
                            ring.push(c.p, t as i32);
                        }
                    }
                    c.res = res;
                });
            }
            Mode::Compositorial => {
                self.cands.par_iter_mut().for_each(|c| {
                    let mut res = c.res;
                    let mut pos = prime_pos;
                    for k in n_start..n_end {
                        if pos < terms.len() && terms[pos] == k {
                            pos += 1;
                            continue;
                        }
                        let mk = m_mul(u64::from(k), c.r2, c.p, c.q);
                        res = m_mul(res, mk, c.p, c.q);
                        if res == c.one {
                            ring.push(c.p, -(k as i32));
                        } else if res == c.pmo {
                            ring.push(c.p, k as i32);
                        }
                    }
                    c.res = res;
                });
            }
        }
        self.iterated_to = n_end;
    }

    fn check(&mut self, last_n: u32) {
        // factorial and compositorial residues can die (k hits a multiple
        // of p once p < n_max), which would let a window contribute nothing
        // to the checksum; anchoring each candidate with the Montgomery
        // form of last_n keeps every candidate's contribution nonzero
        let group_sums: Vec<u64> = match self.mode {
            Mode::Factorial | Mode::Compositorial => {
                debug_assert_eq!(self.iterated_to, last_n.wrapping_add(1));
                self.cands
                    .par_chunks(256)
                    .map(|group| {
                        group.iter().fold(0u64, |a, c| {
                            let anchor = m_mul(u64::from(last_n), c.r2, c.p, c.q);
                            a.wrapping_add(c.res).wrapping_add(anchor)
                        })
                    })
                    .collect()
            }
            Mode::Primorial => {
                debug_assert_eq!(self.iterated_to, last_n);
                self.cands
                    .par_chunks(256)
                    .map(|group| group.iter().fold(0u64, |a, c| a.wrapping_add(c.res)))
                    .collect()
            }
        };
        for g in group_sums {
            self.checksum = self.checksum.wrapping_add(g);
        }
        self.prime_count += self.cands.len() as u64;
    }

    fn drain(&mut self) -> Drain {
        let overflowed = self.ring.overflowed();
        let d = Drain {
            factors: self.ring.drain(),
            prime_count: self.prime_count,
            checksum: self.checksum,
            max_segment: self.max_segment,
            overflowed,
        };
        self.prime_count = 0;
        self.checksum = 0;
        self.max_segment = 0;
        d
    }
}
