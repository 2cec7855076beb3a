//! Property-based tests using proptest.
//!
//! Mathematical invariants checked across random inputs: Montgomery
//! arithmetic against naive u128 arithmetic, wheel alignment, generator
//! output, primality, and checkpoint integrity.

use proptest::prelude::*;

use harrow::checkpoint::WorkStatus;
use harrow::montgomery::{add, invert, m_mul, Montgomery};
use harrow::primegen;
use harrow::Mode;

fn naive_mul(a: u64, b: u64, p: u64) -> u64 {
    (u128::from(a) * u128::from(b) % u128::from(p)) as u64
}

/// Trial-division primality for cross-checks.
fn is_prime_naive(n: u64) -> bool {
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
}

proptest! {
    /// p · (−invert(p)) ≡ 1 (mod 2^64) for any odd p > 1.
    #[test]
    fn prop_invert_is_inverse(p in any::<u64>().prop_map(|v| v | 1).prop_filter("p > 1", |&v| v > 1)) {
        let q = invert(p);
        prop_assert_eq!(p.wrapping_mul(q.wrapping_neg()), 1);
    }

    /// Montgomery multiply round-trips against naive multiplication for
    /// arbitrary reduced operands and arbitrary odd moduli.
    #[test]
    fn prop_m_mul_matches_naive(
        p in any::<u64>().prop_map(|v| v | 1).prop_filter("p > 2", |&v| v > 2),
        a in any::<u64>(),
        b in any::<u64>(),
    ) {
        let ctx = Montgomery::new(p);
        let (a, b) = (a % p, b % p);
        let got = ctx.from_mont(m_mul(ctx.to_mont(a), ctx.to_mont(b), p, ctx.q));
        prop_assert_eq!(got, naive_mul(a, b, p));
    }

    /// Overflow-safe addition matches widened addition.
    #[test]
    fn prop_add_matches_naive(
        p in any::<u64>().prop_map(|v| v | 1).prop_filter("p > 2", |&v| v > 2),
        a in any::<u64>(),
        b in any::<u64>(),
    ) {
        let (a, b) = (a % p, b % p);
        let expected = ((u128::from(a) + u128::from(b)) % u128::from(p)) as u64;
        prop_assert_eq!(add(a, b, p), expected);
    }

    /// The first wheel emission is ≥ start and coprime to 30, no
    /// coprime-to-30 value below it is skipped, and the gaps walk exactly
    /// the coprime residues.
    #[test]
    fn prop_wheel_alignment(start in 3u64..u64::MAX - 64) {
        let (n, mut idx) = primegen::wheel_align(start).unwrap();
        prop_assert!(n >= start.max(7));
        prop_assert!(n % 2 != 0 && n % 3 != 0 && n % 5 != 0);
        for v in start.max(7)..n {
            prop_assert!(v % 2 == 0 || v % 3 == 0 || v % 5 == 0);
        }
        let mut v = n;
        for _ in 0..8 {
            let next = v + primegen::WHEEL[idx];
            idx = (idx + 1) & 7;
            for w in v + 1..next {
                prop_assert!(w % 2 == 0 || w % 3 == 0 || w % 5 == 0);
            }
            prop_assert!(next % 2 != 0 && next % 3 != 0 && next % 5 != 0);
            v = next;
        }
    }

    /// Primality agrees with trial division on arbitrary small inputs.
    #[test]
    fn prop_is_prime_matches_trial_division(n in 3u64..2_000_000) {
        prop_assert_eq!(harrow::primality::is_prime(n), n % 2 == 1 && is_prime_naive(n));
    }

    /// Every generated candidate is a strong 2-PRP with no factor ≤ 113,
    /// and no prime in the window is missed.
    #[test]
    fn prop_segment_candidates_sound_and_complete(a in 200u64..5_000_000, width in 50u64..2_000) {
        let b = a + width;
        let got = primegen::segment_candidates(a, b);
        for &c in &got {
            prop_assert!((a..b).contains(&c));
            prop_assert!(harrow::primality::is_strong_2prp(c));
        }
        for n in a..b {
            if is_prime_naive(n) && n > 113 {
                prop_assert!(got.binary_search(&n).is_ok(), "prime {} missed", n);
            }
        }
    }

    /// Checkpoint integrity: the state sum is sensitive to the progress
    /// cursor no matter what the other counters hold.
    #[test]
    fn prop_state_sum_detects_cursor_change(
        p in any::<u64>(),
        checksum in any::<u64>(),
        primes in any::<u64>(),
        factors in any::<u64>(),
        delta in 1u64..1_000_000,
    ) {
        let mut st = WorkStatus::new(Mode::Primorial, 1000, 2000, 101, 500);
        st.p = p;
        st.checksum = checksum;
        st.prime_count = primes;
        st.factor_count = factors;
        st.state_sum = st.computed_sum();

        let mut tampered = st;
        tampered.p = tampered.p.wrapping_add(delta);
        prop_assert_ne!(tampered.computed_sum(), tampered.state_sum);
    }
}
