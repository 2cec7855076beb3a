//! # Verify — Slow Independent CPU Recheck of Emitted Factors
//!
//! The batch evaluator's word is never taken for a factor. Before anything
//! reaches the results log, the divisibility is recomputed here from scratch
//! with plain modular multiplication: a hard-coded 128-bit seed (the largest
//! product of the mode's chain that fits in a u128) reduced mod p, then one
//! multiply per remaining term up to n. The chain shares no code with the
//! Montgomery pipeline, so an arithmetic defect there cannot hide.
//!
//! Seeds per mode, all assuming n_min ≥ 101 (enforced at argument parsing):
//! - factorial: 34!
//! - primorial: 101#
//! - compositorial: 44!/# (the product of composites ≤ 44)
//!
//! Below 2^32 − 1 the chain runs in u64 (the product of a 32-bit residue
//! and a 31-bit term cannot overflow); above it, each step widens through
//! u128. A factor that fails this check is a correctness defect and kills
//! the run.

use crate::Mode;

/// 34! — seed for the factorial chain.
const FACTORIAL_SEED: u128 = 0xde1bc4d19efcac82445da75b00000000;
/// 101# — seed for the primorial chain.
const PRIMORIAL_SEED: u128 = 0xaf2fa8f8a2d02a93ae69c9f8987d5efe;
/// 44!/# — seed for the compositorial chain.
const COMPOSITORIAL_SEED: u128 = 0x98dcc10f185c0e673c93ff0000000000;

/// Terms multiplied after the seed: the ascending run of chain terms in
/// (seed_n, n_max]. Primorial: primes from 103; compositorial: composites
/// from 45; factorial needs no list (every integer from 35 is a term).
pub fn verify_terms(mode: Mode, n_max: u32) -> Vec<u32> {
    match mode {
        Mode::Factorial => Vec::new(),
        Mode::Primorial => crate::primegen::primes_in(103, n_max),
        Mode::Compositorial => crate::products::composites_in(45, n_max),
    }
}

/// True iff p divides base_n + c, recomputed the slow way.
///
/// `terms` must come from [`verify_terms`] for the same mode with
/// n_max ≥ n.
pub fn verify_factor(p: u64, n: u32, c: i32, mode: Mode, terms: &[u32]) -> bool {
    let seed = match mode {
        Mode::Factorial => FACTORIAL_SEED,
        Mode::Primorial => PRIMORIAL_SEED,
        Mode::Compositorial => COMPOSITORIAL_SEED,
    };
    let mut result = (seed % u128::from(p)) as u64;

    if mode == Mode::Factorial {
        if p < u64::from(u32::MAX) {
            for i in 35..=u64::from(n) {
                result = result * i % p;
            }
        } else {
            for i in 35..=u64::from(n) {
                result = (u128::from(result) * u128::from(i) % u128::from(p)) as u64;
            }
        }
    } else if p < u64::from(u32::MAX) {
        for &t in terms {
            if t > n {
                break;
            }
            result = result * u64::from(t) % p;
        }
    } else {
        for &t in terms {
            if t > n {
                break;
            }
            result = (u128::from(result) * u128::from(t) % u128::from(p)) as u64;
        }
    }

    (result == 1 && c == -1) || (result == p - 1 && c == 1)
}

#[cfg(test)]
mod tests {
    //! The seeds are recomputed from first principles, and the verifier is
    //! exercised with factors known from Wilson's theorem plus sign and
    //! off-by-one rejections.

    use super::*;

    // ── Seed Constants ─────────────────────────────────────────────────

    /// 34! multiplied out in u128.
    #[test]
    fn factorial_seed_is_34_factorial() {
        let mut f = 1u128;
        for k in 2..=34u128 {
            f *= k;
        }
        assert_eq!(f, FACTORIAL_SEED);
    }

    /// 101# multiplied out in u128.
    #[test]
    fn primorial_seed_is_101_primorial() {
        let mut f = 1u128;
        for &p in &crate::primegen::primes_up_to(101) {
            f *= u128::from(p);
        }
        assert_eq!(f, PRIMORIAL_SEED);
    }

    /// 44!/# multiplied out in u128.
    #[test]
    fn compositorial_seed_is_44_compositorial() {
        let mut f = 1u128;
        for &c in &crate::products::composites_in(2, 45) {
            f *= u128::from(c);
        }
        assert_eq!(f, COMPOSITORIAL_SEED);
    }

    // ── Term Lists ─────────────────────────────────────────────────────

    #[test]
    fn term_lists_start_after_seed() {
        assert!(verify_terms(Mode::Factorial, 1000).is_empty());
        let pt = verify_terms(Mode::Primorial, 1000);
        assert_eq!(pt.first(), Some(&103));
        let ct = verify_terms(Mode::Compositorial, 1000);
        assert_eq!(ct.first(), Some(&45));
        // composites list is exclusive of n_max, primes list inclusive
        assert!(!ct.contains(&1000));
    }

    // ── Known Factors (Wilson's Theorem) ───────────────────────────────

    /// For prime p: p | (p−2)! − 1 and p | (p−1)! + 1.
    #[test]
    fn accepts_wilson_factorial_factors() {
        let terms = verify_terms(Mode::Factorial, 100_000);
        for p in [103u64, 107, 997, 9973, 99991] {
            assert!(verify_factor(p, (p - 2) as u32, -1, Mode::Factorial, &terms));
            assert!(verify_factor(p, (p - 1) as u32, 1, Mode::Factorial, &terms));
        }
    }

    /// Wrong sign, wrong n, and wrong p must all be rejected.
    #[test]
    fn rejects_near_misses() {
        let terms = verify_terms(Mode::Factorial, 1000);
        // 103 | 101! - 1 holds; perturb each coordinate
        assert!(verify_factor(103, 101, -1, Mode::Factorial, &terms));
        assert!(!verify_factor(103, 101, 1, Mode::Factorial, &terms));
        assert!(!verify_factor(103, 100, -1, Mode::Factorial, &terms));
        assert!(!verify_factor(103, 102, -1, Mode::Factorial, &terms));
        assert!(!verify_factor(107, 101, -1, Mode::Factorial, &terms));
    }

    // ── Cross-Check Against Direct Computation ─────────────────────────

    /// Every factor a direct u128 chain finds in a small box must verify,
    /// for all three modes — and the sign-flipped triple must not.
    #[test]
    fn agrees_with_direct_computation() {
        for mode in [Mode::Factorial, Mode::Primorial, Mode::Compositorial] {
            let terms = verify_terms(mode, 400);
            let mut found = 0;
            for p in (101u64..4000).filter(|&p| crate::primality::is_prime(p)) {
                let mut res = 1u64;
                for k in 2..400u64 {
                    let keep = match mode {
                        Mode::Factorial => true,
                        Mode::Primorial => k == 2 || crate::primality::is_prime(k),
                        Mode::Compositorial => k != 2 && !crate::primality::is_prime(k),
                    };
                    if keep {
                        res = res * (k % p) % p;
                    } else {
                        continue;
                    }
                    if k < 101 {
                        continue;
                    }
                    if res == 1 {
                        assert!(verify_factor(p, k as u32, -1, mode, &terms), "{} {} {}", mode, p, k);
                        assert!(!verify_factor(p, k as u32, 1, mode, &terms));
                        found += 1;
                    } else if res == p - 1 {
                        assert!(verify_factor(p, k as u32, 1, mode, &terms), "{} {} {}", mode, p, k);
                        assert!(!verify_factor(p, k as u32, -1, mode, &terms));
                        found += 1;
                    }
                }
            }
            assert!(found > 0, "no factors found for {} — test box too small", mode);
        }
    }

    /// The wide path above 2^32 agrees with a direct u128 walk, both on
    /// the accept and reject side.
    #[test]
    fn wide_path_matches_direct_computation() {
        let p = 8589934609u64; // prime just above 2^33
        assert!(crate::primality::is_prime(p));
        let terms = verify_terms(Mode::Factorial, 400);
        let mut res = 1u64;
        let mut hits = 0;
        for k in 2..400u64 {
            res = (u128::from(res) * u128::from(k) % u128::from(p)) as u64;
            if k < 101 {
                continue;
            }
            let minus = verify_factor(p, k as u32, -1, Mode::Factorial, &terms);
            let plus = verify_factor(p, k as u32, 1, Mode::Factorial, &terms);
            assert_eq!(minus, res == 1, "p={} k={}", p, k);
            assert_eq!(plus, res == p - 1, "p={} k={}", p, k);
            if minus || plus {
                hits += 1;
            }
        }
        // hits are rare at 33 bits; the point is exact agreement either way
        let _ = hits;
    }
}
