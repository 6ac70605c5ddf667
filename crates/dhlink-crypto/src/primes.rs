//! Prime pool sampling and primitive-root search.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::modexp::mul_mod;

/// An in-memory pool of candidate primes supplied by the caller.
///
/// The pool does not verify primality; it is the source both peers draw
/// moduli and private values from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimePool {
    primes: Vec<u64>,
}

impl PrimePool {
    pub const fn new(primes: Vec<u64>) -> Self {
        Self { primes }
    }

    pub fn len(&self) -> usize {
        self.primes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.primes
    }

    /// Pick a uniformly random candidate.
    ///
    /// Returns `None` when the pool is empty; this is the expected
    /// sentinel, not a failure, and callers decide how to react.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u64> {
        self.primes.choose(rng).copied()
    }
}

impl From<Vec<u64>> for PrimePool {
    fn from(primes: Vec<u64>) -> Self {
        Self::new(primes)
    }
}

/// Check whether `g` has multiplicative order `p - 1` modulo `p`.
///
/// Walks `g^1 .. g^(p-1)` and bails out at the first repeated (or zero)
/// residue. Linear in `p`.
pub fn is_generator(g: u64, p: u64) -> bool {
    if p <= 2 || g < 2 || g >= p {
        return false;
    }

    let mut seen = HashSet::new();
    let mut current = 1u64;
    for _ in 1..p {
        current = mul_mod(current, g, p);
        if current == 0 || !seen.insert(current) {
            return false;
        }
    }
    u64::try_from(seen.len()).is_ok_and(|n| n == p - 1)
}

/// Find the smallest generator of the multiplicative group modulo `p`.
///
/// Quadratic in `p` in the worst case; only meant for demo-sized moduli.
/// Returns `None` when no candidate in `2..p` qualifies.
pub fn find_generator(p: u64) -> Option<u64> {
    (2..p).find(|&g| is_generator(g, p))
}
