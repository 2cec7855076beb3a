//! # Primality — Deterministic 64-bit Miller–Rabin
//!
//! Strong-probable-prime testing in Montgomery form with the 7-base witness
//! set {2, 325, 9375, 28178, 450775, 9780504, 1795265022}, a published
//! deterministic covering for every n < 2^64 (Jim Sinclair's set; see
//! <https://miller-rabin.appspot.com/>). The single-base variant
//! [`is_strong_2prp`] is the screen applied by the segmented candidate
//! generator; the full 7-base test is the load-bearing filter in the factor
//! reporting pipeline that removes the generator's false positives.
//!
//! Callers only ever screen odd values above 2: even inputs are rejected
//! outright and p > 2 is a precondition.

use crate::montgomery::{add, invert, m_mul};

/// Witness bases covering all 64-bit integers deterministically.
const BASES: [u32; 7] = [2, 325, 9375, 28178, 450775, 9780504, 1795265022];

/// Montgomery constants plus the decomposition p − 1 = d·2^t shared by
/// every witness round for one candidate.
struct PrpCtx {
    p: u64,
    q: u64,
    one: u64,
    pmo: u64,
    r2: u64,
    t: u32,
    /// The odd part d of p − 1.
    exp: u64,
    /// Bit below the most significant bit of `exp`; 0 when exp = 1.
    lead_bit: u64,
}

impl PrpCtx {
    fn new(p: u64) -> Self {
        let q = invert(p);
        let one = p.wrapping_neg() % p;
        let pmo = p - one;
        let two = add(one, one, p);
        let mut r2 = add(two, two, p);
        for _ in 0..5 {
            r2 = m_mul(r2, r2, p, q);
        }
        let t = (p - 1).trailing_zeros();
        let exp = p >> t;
        let lead_bit = if exp > 1 {
            1u64 << (63 - exp.leading_zeros() - 1)
        } else {
            0
        };
        PrpCtx {
            p,
            q,
            one,
            pmo,
            r2,
            t,
            exp,
            lead_bit,
        }
    }

    /// Strong-probable-prime test to one base. Returns false only when p is
    /// certainly composite.
    ///
    /// If p is prime and p − 1 = d·2^t with d odd, then either base^d ≡ 1
    /// (mod p) or base^(d·2^s) ≡ −1 (mod p) for some 0 ≤ s < t.
    fn strong_prp(&self, base: u64) -> bool {
        let mbase = m_mul(base, self.r2, self.p, self.q);
        let mut a = mbase;
        let mut bit = self.lead_bit;
        while bit != 0 {
            a = m_mul(a, a, self.p, self.q);
            if self.exp & bit != 0 {
                a = m_mul(a, mbase, self.p, self.q);
            }
            bit >>= 1;
        }
        // base^d: clause 1 and the s = 0 case of clause 2
        if a == self.one || a == self.pmo {
            return true;
        }
        for _ in 1..self.t {
            a = m_mul(a, a, self.p, self.q);
            if a == self.pmo {
                return true;
            }
        }
        false
    }
}

/// Deterministic primality for odd p > 2: true iff p is prime.
/// Even input (including 2) is rejected.
pub fn is_prime(p: u64) -> bool {
    if p < 3 || p & 1 == 0 {
        return false;
    }
    let ctx = PrpCtx::new(p);
    for &b in &BASES {
        let mut base = u64::from(b);
        // composite bases can reach or exceed small p
        if base >= p {
            base %= p;
            if base == 0 {
                continue;
            }
        }
        if !ctx.strong_prp(base) {
            return false;
        }
    }
    true
}

/// Strong probable-prime test to base 2 only — the candidate screen used by
/// the segmented generator. Accepts all odd primes and a thin scatter of
/// composites (strong 2-pseudoprimes) that the reporting pipeline discards.
pub fn is_strong_2prp(p: u64) -> bool {
    debug_assert!(p > 2 && p & 1 == 1);
    PrpCtx::new(p).strong_prp(2)
}

#[cfg(test)]
mod tests {
    //! Known-value validation: small primes and composites, Carmichael
    //! numbers, the strong base-2 pseudoprimes below 10^5 (which must pass
    //! the base-2 screen yet fail the 7-base test), and primes near the
    //! u64 boundary where the Montgomery carry paths are exercised.

    use super::*;

    /// Strong pseudoprimes to base 2 below 10^5 (OEIS A001262).
    const STRONG_2PSP: [u64; 16] = [
        2047, 3277, 4033, 4681, 8321, 15841, 29341, 42799, 49141, 52633, 65281, 74665, 80581,
        85489, 88357, 90751,
    ];

    // ── Small Known Values ─────────────────────────────────────────────

    #[test]
    fn accepts_small_primes() {
        for p in [3u64, 5, 7, 11, 13, 101, 103, 107, 109, 113, 9973, 99991] {
            assert!(is_prime(p), "{} is prime", p);
        }
    }

    #[test]
    fn rejects_small_composites() {
        for n in [9u64, 15, 21, 25, 27, 33, 49, 91, 121, 1001, 9999, 99999] {
            assert!(!is_prime(n), "{} is composite", n);
        }
    }

    /// Even input is rejected by contract, including 2 itself: the sieve
    /// only ever screens odd candidates.
    #[test]
    fn rejects_even_input() {
        for n in [2u64, 4, 100, 1 << 40] {
            assert!(!is_prime(n));
        }
    }

    /// Carmichael numbers fool Fermat tests to every coprime base but not
    /// the strong test.
    #[test]
    fn rejects_carmichael_numbers() {
        for n in [561u64, 1105, 1729, 2465, 2821, 6601, 8911, 41041, 62745] {
            assert!(!is_prime(n), "Carmichael {} is composite", n);
        }
    }

    // ── Base-2 Screen vs Full Test ─────────────────────────────────────

    /// Every strong 2-pseudoprime passes the generator's screen and fails
    /// the full 7-base test — exactly the gap the reporting pipeline's
    /// primality filter exists to close.
    #[test]
    fn strong_2psp_pass_screen_fail_full_test() {
        for &n in &STRONG_2PSP {
            assert!(is_strong_2prp(n), "{} is a strong 2-PRP", n);
            assert!(!is_prime(n), "{} is composite", n);
        }
    }

    /// The screen never rejects an odd prime.
    #[test]
    fn screen_accepts_odd_primes() {
        for p in [3u64, 127, 8191, 99991, 4294967291, 2305843009213693951] {
            assert!(is_strong_2prp(p), "{} is prime", p);
        }
    }

    // ── Large Values ───────────────────────────────────────────────────

    #[test]
    fn accepts_large_primes() {
        for p in [
            4294967291u64,         // below 2^32
            4294967311,            // above 2^32
            2305843009213693951,   // 2^61 - 1 (Mersenne)
            9223372036854775783,   // below 2^63
            18446744073709551557,  // below 2^64
        ] {
            assert!(is_prime(p), "{} is prime", p);
        }
    }

    #[test]
    fn rejects_large_composites() {
        // products of two large primes and a known hard pseudoprime
        let semiprimes = [
            4294967291u64 * 3,
            99991 * 99989,
            3825123056546413051, // strong psp to bases 2..=23
            u64::MAX,            // 3 * 5 * 17 * 257 * 641 * 65537 * 6700417
        ];
        for &n in &semiprimes {
            assert!(!is_prime(n), "{} is composite", n);
        }
    }

    /// Exhaustive agreement with trial division over an odd window, which
    /// crosses plenty of prime/composite transitions.
    #[test]
    fn matches_trial_division_on_window() {
        let is_prime_naive = |n: u64| {
            if n < 2 {
                return false;
            }
            let mut d = 2u64;
            while d * d <= n {
                if n % d == 0 {
                    return false;
                }
                d += 1;
            }
            true
        };
        for n in (10_001..12_001u64).step_by(2) {
            assert_eq!(is_prime(n), is_prime_naive(n), "disagreement at {}", n);
        }
    }
}
