//! # Montgomery — Division-Free Modular Arithmetic for Odd 64-bit Moduli
//!
//! Every hot loop in the sieve (candidate screening, residue setup and
//! iteration, factor verification, primality testing) multiplies repeatedly
//! modulo a fixed odd p. Montgomery form represents a as ā = a·R mod p with
//! R = 2^64, turning each modular multiplication into a 128-bit multiply, a
//! reduction by shift, and at most one subtraction — no division by p ever.
//!
//! The context precomputes three constants per modulus:
//! - `q = −p⁻¹ mod 2^64`, found as the 2-adic fixed point of x ← x·(2 − p·x);
//! - `one = (−p) mod p`, which is 2^64 mod p, the Montgomery form of 1;
//! - `r2 = 2^128 mod p`, obtained by doubling `one` twice and squaring the
//!   result five times (4^(2^5) = 2^64), used to convert into Montgomery form.
//!
//! Free-function forms (`m_mul`, `add`) exist alongside the context methods
//! because the batch evaluator keeps the constants unpacked in per-candidate
//! state and cannot afford a struct round-trip per step.
//!
//! Preconditions: p odd and > 1. `m_mul` requires at least one operand
//! already reduced below p; its result is then fully reduced. None of these
//! routines are constant-time — there are no secrets in a sieve.
//!
//! ## References
//!
//! - Peter L. Montgomery, "Modular Multiplication Without Trial Division",
//!   Mathematics of Computation, 44(170):519–521, 1985.

/// −p⁻¹ mod 2^64 for odd p, by Newton iteration over the 2-adic integers.
///
/// Starting from 1 (an inverse of any odd p mod 2), each step x ← x·(2 − p·x)
/// doubles the number of correct low bits, so the loop reaches its fixed
/// point in at most seven iterations.
pub fn invert(p: u64) -> u64 {
    debug_assert!(p & 1 == 1, "Montgomery requires an odd modulus");
    let mut inv: u64 = 1;
    let mut prev: u64 = 0;
    while inv != prev {
        prev = inv;
        inv = inv.wrapping_mul(2u64.wrapping_sub(p.wrapping_mul(inv)));
    }
    inv.wrapping_neg()
}

/// Montgomery multiplication: a·b·2^(−64) mod p, with q = −p⁻¹ mod 2^64.
///
/// CIOS-style reduction on the 128-bit product: m = (t mod 2^64)·q chosen so
/// the low 64 bits of t + m·p cancel exactly, leaving the high half plus a
/// carry. At least one operand must be < p; the result is fully reduced.
#[inline]
pub fn m_mul(a: u64, b: u64, p: u64, q: u64) -> u64 {
    let t = u128::from(a) * u128::from(b);
    let m = (t as u64).wrapping_mul(q);
    let mp = u128::from(m) * u128::from(p);
    // low halves of t and m*p sum to 0 or exactly 2^64
    let carry = u64::from(t as u64 != 0);
    let mut r = (t >> 64) + (mp >> 64) + u128::from(carry);
    if r >= u128::from(p) {
        r -= u128::from(p);
    }
    r as u64
}

/// Overflow-safe modular addition for a, b < p (a + b may exceed u64).
#[inline]
pub fn add(a: u64, b: u64, p: u64) -> u64 {
    if a >= p - b {
        a.wrapping_add(b).wrapping_sub(p)
    } else {
        a + b
    }
}

/// base^exp mod p in Montgomery form, left-to-right from the bit below the
/// most significant bit of exp. `lead_bit` must be that bit (0 when exp ≤ 1,
/// degenerating to base^1). `base` must be in Montgomery form and < p.
#[inline]
pub fn pow_with_lead(base: u64, exp: u32, lead_bit: u32, p: u64, q: u64) -> u64 {
    let mut a = base;
    let mut bit = lead_bit;
    while bit != 0 {
        a = m_mul(a, a, p, q);
        if exp & bit != 0 {
            a = m_mul(a, base, p, q);
        }
        bit >>= 1;
    }
    a
}

/// Montgomery context for a fixed odd modulus p > 1.
#[derive(Clone, Copy, Debug)]
pub struct Montgomery {
    pub p: u64,
    /// −p⁻¹ mod 2^64.
    pub q: u64,
    /// 2^64 mod p — the Montgomery form of 1.
    pub one: u64,
    /// 2^128 mod p — multiplier for conversion into Montgomery form.
    pub r2: u64,
}

impl Montgomery {
    pub fn new(p: u64) -> Self {
        debug_assert!(p > 1 && p & 1 == 1, "Montgomery requires odd p > 1");
        let q = invert(p);
        let one = p.wrapping_neg() % p;
        let two = add(one, one, p);
        let mut r2 = add(two, two, p);
        for _ in 0..5 {
            r2 = m_mul(r2, r2, p, q); // 4^(2^5) = 2^64
        }
        Montgomery { p, q, one, r2 }
    }

    /// The Montgomery form of p − 1 (i.e. of −1).
    #[inline]
    pub fn minus_one(&self) -> u64 {
        self.p - self.one
    }

    /// a·b·2^(−64) mod p for Montgomery-form operands.
    #[inline]
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        m_mul(a, b, self.p, self.q)
    }

    /// Convert an ordinary value (any u64) into Montgomery form.
    #[inline]
    pub fn to_mont(&self, a: u64) -> u64 {
        m_mul(a, self.r2, self.p, self.q)
    }

    /// Convert a Montgomery-form value back to an ordinary residue.
    #[inline]
    pub fn from_mont(&self, a: u64) -> u64 {
        m_mul(a, 1, self.p, self.q)
    }
}
