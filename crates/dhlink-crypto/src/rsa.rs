//! RSA key derivation over demo-sized primes.
//!
//! The initiator of the RSA transport variant builds a keypair from two
//! pool primes, publishes `(n, e)`, and decrypts the secret the responder
//! wraps with it. No padding is applied: this is textbook RSA.

use std::fmt;

use rand::Rng;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::modexp::pow_mod;
use crate::primes::PrimePool;

/// Public exponent tried before falling back to a search.
pub const DEFAULT_PUBLIC_EXPONENT: u64 = 65_537;

/// Upper bound for the odd-exponent search.
pub const DEFAULT_EXPONENT_SEARCH_LIMIT: u64 = 65_537;

/// How many draws `generate` makes looking for a second, distinct prime.
const MAX_PRIME_DRAWS: usize = 64;

/// Controls public-exponent selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentPolicy {
    pub default_exponent: u64,
    pub search_limit: u64,
}

impl Default for ExponentPolicy {
    fn default() -> Self {
        Self {
            default_exponent: DEFAULT_PUBLIC_EXPONENT,
            search_limit: DEFAULT_EXPONENT_SEARCH_LIMIT,
        }
    }
}

/// Greatest common divisor.
pub const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Modular multiplicative inverse of `a` modulo `m` via the extended
/// Euclidean algorithm. `None` when `gcd(a, m) != 1` or `m == 0`.
pub fn mod_inverse(a: u64, m: u64) -> Option<u64> {
    if m == 0 {
        return None;
    }
    let (mut old_r, mut r) = (i128::from(a % m), i128::from(m));
    let (mut old_s, mut s) = (1i128, 0i128);
    while r != 0 {
        let q = old_r / r;
        (old_r, r) = (r, old_r - q * r);
        (old_s, s) = (s, old_s - q * s);
    }
    if old_r != 1 {
        return None;
    }
    u64::try_from(old_s.rem_euclid(i128::from(m))).ok()
}

/// Pick a public exponent coprime to `totient`.
///
/// The policy's default exponent wins when it is usable; otherwise odd
/// candidates from 3 upward are tried until `search_limit`.
pub fn choose_public_exponent(totient: u64, policy: ExponentPolicy) -> Result<u64, CryptoError> {
    let usable = |e: u64| e > 1 && e < totient && gcd(e, totient) == 1;

    if usable(policy.default_exponent) {
        return Ok(policy.default_exponent);
    }

    let mut e = 3;
    while e <= policy.search_limit && e < totient {
        if gcd(e, totient) == 1 {
            return Ok(e);
        }
        e += 2;
    }

    Err(CryptoError::SearchExhausted(format!(
        "no public exponent coprime to totient {totient} below {}",
        policy.search_limit
    )))
}

/// The half of the keypair sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsaPublicKey {
    modulus: u64,
    exponent: u64,
}

impl RsaPublicKey {
    /// Validate a public key received from a peer.
    pub fn new(modulus: u64, exponent: u64) -> Result<Self, CryptoError> {
        if modulus < 2 {
            return Err(CryptoError::Argument(format!(
                "RSA modulus must be >= 2, got {modulus}"
            )));
        }
        Ok(Self { modulus, exponent })
    }

    pub const fn modulus(&self) -> u64 {
        self.modulus
    }

    pub const fn exponent(&self) -> u64 {
        self.exponent
    }

    /// Textbook encryption `m^e mod n`. `m` must already be reduced.
    pub fn encrypt(&self, message: u64) -> Result<u64, CryptoError> {
        if message >= self.modulus {
            return Err(CryptoError::Argument(format!(
                "message {message} is not below modulus {}",
                self.modulus
            )));
        }
        pow_mod(message, self.exponent, self.modulus)
    }
}

/// A full RSA keypair. The private exponent is wiped on drop.
#[derive(Clone)]
pub struct RsaKeyPair {
    p: u64,
    q: u64,
    modulus: u64,
    totient: u64,
    public_exponent: u64,
    private_exponent: u64,
}

impl Drop for RsaKeyPair {
    fn drop(&mut self) {
        self.private_exponent.zeroize();
        self.p.zeroize();
        self.q.zeroize();
        self.totient.zeroize();
    }
}

impl fmt::Debug for RsaKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeyPair")
            .field("modulus", &self.modulus)
            .field("public_exponent", &self.public_exponent)
            // Factors and private exponent stay out of logs.
            .finish_non_exhaustive()
    }
}

impl RsaKeyPair {
    /// Derive a keypair from two distinct primes.
    pub fn from_primes(p: u64, q: u64, policy: ExponentPolicy) -> Result<Self, CryptoError> {
        if p == q {
            return Err(CryptoError::Argument(format!(
                "RSA primes must be distinct, got p = q = {p}"
            )));
        }
        if p < 2 || q < 2 {
            return Err(CryptoError::Argument(format!(
                "RSA primes must be >= 2, got p={p} q={q}"
            )));
        }
        let modulus = p
            .checked_mul(q)
            .ok_or_else(|| CryptoError::Argument(format!("p*q overflows u64 (p={p} q={q})")))?;
        let totient = (p - 1) * (q - 1);

        let public_exponent = choose_public_exponent(totient, policy)?;
        let private_exponent = mod_inverse(public_exponent, totient).ok_or_else(|| {
            CryptoError::Argument(format!(
                "exponent {public_exponent} has no inverse mod {totient}"
            ))
        })?;

        Ok(Self {
            p,
            q,
            modulus,
            totient,
            public_exponent,
            private_exponent,
        })
    }

    /// Draw two distinct primes from the pool and derive a keypair.
    pub fn generate<R: Rng + ?Sized>(
        pool: &PrimePool,
        rng: &mut R,
        policy: ExponentPolicy,
    ) -> Result<Self, CryptoError> {
        let p = pool
            .sample(rng)
            .ok_or_else(|| CryptoError::Argument("prime pool is empty".into()))?;

        let q = (0..MAX_PRIME_DRAWS)
            .filter_map(|_| pool.sample(rng))
            .find(|&q| q != p)
            .ok_or_else(|| {
                CryptoError::SearchExhausted(format!(
                    "no second prime distinct from {p} after {MAX_PRIME_DRAWS} draws"
                ))
            })?;

        Self::from_primes(p, q, policy)
    }

    pub const fn modulus(&self) -> u64 {
        self.modulus
    }

    pub const fn totient(&self) -> u64 {
        self.totient
    }

    pub const fn factors(&self) -> (u64, u64) {
        (self.p, self.q)
    }

    pub const fn public_exponent(&self) -> u64 {
        self.public_exponent
    }

    pub const fn public_key(&self) -> RsaPublicKey {
        RsaPublicKey {
            modulus: self.modulus,
            exponent: self.public_exponent,
        }
    }

    /// Textbook decryption `c^d mod n`.
    pub fn decrypt(&self, ciphertext: u64) -> Result<u64, CryptoError> {
        if ciphertext >= self.modulus {
            return Err(CryptoError::Argument(format!(
                "ciphertext {ciphertext} is not below modulus {}",
                self.modulus
            )));
        }
        pow_mod(ciphertext, self.private_exponent, self.modulus)
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub const fn private_exponent(&self) -> u64 {
        self.private_exponent
    }
}
