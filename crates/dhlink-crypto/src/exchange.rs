//! Key agreement state.
//!
//! Two variants produce the same [`SharedSecret`]:
//!
//! - **Diffie-Hellman**: the initiator picks `(p, g)`, both sides draw a
//!   private value from the prime pool and exchange `g^x mod p`.
//! - **RSA transport**: the initiator publishes `(n, e)`, the responder
//!   draws a secret and returns it encrypted under that key.
//!
//! Nothing here touches the network. Each role's state is advanced by the
//! handshake driver as messages arrive.

use std::fmt;

use rand::Rng;
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::modexp::pow_mod;
use crate::primes::{PrimePool, find_generator, is_generator};
use crate::rsa::{ExponentPolicy, RsaKeyPair, RsaPublicKey};

/// Which key agreement protocol a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyAgreement {
    #[default]
    DiffieHellman,
    RsaKeyTransport,
}

impl fmt::Display for KeyAgreement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiffieHellman => f.write_str("diffie-hellman"),
            Self::RsaKeyTransport => f.write_str("rsa-transport"),
        }
    }
}

/// The agreed secret. Identical on both peers once the handshake completes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(u64);

impl SharedSecret {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Constant-time comparison against a value claimed by the peer.
    pub fn matches(&self, claimed: u64) -> bool {
        self.0.ct_eq(&claimed).into()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// Draw a value from the pool, turning the empty-pool sentinel into an error
/// for callers that cannot proceed without one.
fn require_sample<R: Rng + ?Sized>(pool: &PrimePool, rng: &mut R) -> Result<u64, CryptoError> {
    pool.sample(rng)
        .ok_or_else(|| CryptoError::Argument("prime pool is empty".into()))
}

/// Largest Diffie-Hellman modulus accepted anywhere.
///
/// Generator checks walk the whole group, so cost grows linearly with `p`.
pub const MAX_DH_MODULUS: u64 = 1 << 20;

fn check_modulus_bound(modulus: u64, limit: u64) -> Result<(), CryptoError> {
    let limit = limit.min(MAX_DH_MODULUS);
    if modulus > limit {
        return Err(CryptoError::Argument(format!(
            "DH modulus {modulus} exceeds the limit of {limit}"
        )));
    }
    Ok(())
}

/// Group parameters for Diffie-Hellman.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhParameters {
    modulus: u64,
    generator: u64,
}

impl DhParameters {
    /// Validate parameters received from a peer: `2 < p <= MAX_DH_MODULUS`,
    /// `2 <= g < p`, and `g` of order `p - 1`.
    pub fn new(modulus: u64, generator: u64) -> Result<Self, CryptoError> {
        Self::with_limit(modulus, generator, MAX_DH_MODULUS)
    }

    /// Like [`DhParameters::new`] with a tighter bound on `p`. Limits above
    /// [`MAX_DH_MODULUS`] are clamped to it.
    pub fn with_limit(modulus: u64, generator: u64, limit: u64) -> Result<Self, CryptoError> {
        check_modulus_bound(modulus, limit)?;
        if modulus <= 2 {
            return Err(CryptoError::Argument(format!(
                "DH modulus must be > 2, got {modulus}"
            )));
        }
        if generator < 2 || generator >= modulus {
            return Err(CryptoError::Argument(format!(
                "DH generator must be in [2, {modulus}), got {generator}"
            )));
        }
        if !is_generator(generator, modulus) {
            return Err(CryptoError::Argument(format!(
                "{generator} does not generate the group modulo {modulus}"
            )));
        }
        Ok(Self { modulus, generator })
    }

    /// Pick a modulus from the pool and search for its smallest generator.
    pub fn generate<R: Rng + ?Sized>(pool: &PrimePool, rng: &mut R) -> Result<Self, CryptoError> {
        let modulus = require_sample(pool, rng)?;
        check_modulus_bound(modulus, MAX_DH_MODULUS)?;
        let generator = find_generator(modulus).ok_or_else(|| {
            CryptoError::SearchExhausted(format!("no generator found for modulus {modulus}"))
        })?;
        debug!(modulus, generator, "Selected DH parameters");
        Ok(Self { modulus, generator })
    }

    pub const fn modulus(&self) -> u64 {
        self.modulus
    }

    pub const fn generator(&self) -> u64 {
        self.generator
    }
}

/// One side of a Diffie-Hellman exchange.
pub struct DhExchange {
    params: DhParameters,
    private: u64,
    public: u64,
}

impl Drop for DhExchange {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

impl DhExchange {
    /// Draw a private value from the pool and compute `g^x mod p`.
    pub fn new<R: Rng + ?Sized>(
        params: DhParameters,
        pool: &PrimePool,
        rng: &mut R,
    ) -> Result<Self, CryptoError> {
        let private = require_sample(pool, rng)?;
        Self::with_private(params, private)
    }

    /// Use a caller-chosen private value.
    pub fn with_private(params: DhParameters, private: u64) -> Result<Self, CryptoError> {
        let public = pow_mod(params.generator, private, params.modulus)?;
        Ok(Self {
            params,
            private,
            public,
        })
    }

    pub const fn params(&self) -> DhParameters {
        self.params
    }

    /// Our public value to send to the peer.
    pub const fn public_value(&self) -> u64 {
        self.public
    }

    /// Combine the peer's public value with our private one.
    pub fn complete(self, peer_public: u64) -> Result<SharedSecret, CryptoError> {
        pow_mod(peer_public, self.private, self.params.modulus).map(SharedSecret)
    }
}

/// The initiator side of RSA secret transport.
#[derive(Debug)]
pub struct RsaInitiator {
    keypair: RsaKeyPair,
}

impl RsaInitiator {
    pub fn new<R: Rng + ?Sized>(
        pool: &PrimePool,
        rng: &mut R,
        policy: ExponentPolicy,
    ) -> Result<Self, CryptoError> {
        let keypair = RsaKeyPair::generate(pool, rng, policy)?;
        debug!(
            modulus = keypair.modulus(),
            exponent = keypair.public_exponent(),
            "Generated RSA keypair"
        );
        Ok(Self { keypair })
    }

    pub const fn from_keypair(keypair: RsaKeyPair) -> Self {
        Self { keypair }
    }

    pub const fn public_key(&self) -> RsaPublicKey {
        self.keypair.public_key()
    }

    /// Recover the secret the responder wrapped under our public key.
    pub fn complete(self, ciphertext: u64) -> Result<SharedSecret, CryptoError> {
        self.keypair.decrypt(ciphertext).map(SharedSecret)
    }
}

/// The responder side of RSA secret transport: draw a secret, reduce it
/// into `[0, n)` and wrap it. Returns the secret and the ciphertext to send.
pub fn transport_secret<R: Rng + ?Sized>(
    public: &RsaPublicKey,
    pool: &PrimePool,
    rng: &mut R,
) -> Result<(SharedSecret, u64), CryptoError> {
    let secret = require_sample(pool, rng)? % public.modulus();
    let ciphertext = public.encrypt(secret)?;
    Ok((SharedSecret(secret), ciphertext))
}

/// Run both roles of a key agreement in memory and return
/// (`initiator_secret`, `responder_secret`).
///
/// Mainly useful for tests; real peers drive the roles over a channel.
#[cfg(any(test, feature = "test-utils"))]
pub fn perform_key_exchange<R: Rng + ?Sized>(
    agreement: KeyAgreement,
    pool: &PrimePool,
    rng: &mut R,
) -> Result<(SharedSecret, SharedSecret), CryptoError> {
    match agreement {
        KeyAgreement::DiffieHellman => {
            let params = DhParameters::generate(pool, rng)?;
            let initiator = DhExchange::new(params, pool, rng)?;
            let responder = DhExchange::new(params, pool, rng)?;
            let initiator_pub = initiator.public_value();
            let responder_pub = responder.public_value();
            Ok((
                initiator.complete(responder_pub)?,
                responder.complete(initiator_pub)?,
            ))
        }
        KeyAgreement::RsaKeyTransport => {
            let initiator = RsaInitiator::new(pool, rng, ExponentPolicy::default())?;
            let (responder_secret, ciphertext) =
                transport_secret(&initiator.public_key(), pool, rng)?;
            Ok((initiator.complete(ciphertext)?, responder_secret))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn demo_pool() -> PrimePool {
        PrimePool::from(vec![101, 103, 107, 109, 113, 127, 131, 137, 139, 149])
    }

    #[test]
    fn dh_symmetry_mod_23() {
        let params = DhParameters::new(23, 5).unwrap();
        for a in 1..22 {
            for b in 1..22 {
                let alice = DhExchange::with_private(params, a).unwrap();
                let bob = DhExchange::with_private(params, b).unwrap();
                let (alice_pub, bob_pub) = (alice.public_value(), bob.public_value());
                assert_eq!(
                    alice.complete(bob_pub).unwrap(),
                    bob.complete(alice_pub).unwrap(),
                    "a={a} b={b}"
                );
            }
        }
    }

    #[test]
    fn dh_textbook_values() {
        let params = DhParameters::new(23, 5).unwrap();
        let alice = DhExchange::with_private(params, 6).unwrap();
        let bob = DhExchange::with_private(params, 15).unwrap();
        assert_eq!(alice.public_value(), 8);
        assert_eq!(bob.public_value(), 19);
        assert_eq!(alice.complete(19).unwrap().value(), 2);
        assert_eq!(bob.complete(8).unwrap().value(), 2);
    }

    #[test]
    fn dh_parameters_reject_non_generator() {
        assert!(matches!(
            DhParameters::new(23, 2),
            Err(CryptoError::Argument(_))
        ));
        assert!(matches!(DhParameters::new(2, 1), Err(CryptoError::Argument(_))));
        assert!(matches!(
            DhParameters::new(23, 23),
            Err(CryptoError::Argument(_))
        ));
        // composite modulus never has a generator of order p-1
        assert!(matches!(DhParameters::new(15, 2), Err(CryptoError::Argument(_))));
    }

    #[test]
    fn oversized_modulus_is_rejected_before_generator_check() {
        // 5 is a primitive root of 1e9+7; walking that group would take ~1e9 steps
        let err = DhParameters::new(1_000_000_007, 5).unwrap_err();
        assert!(matches!(err, CryptoError::Argument(ref m) if m.contains("exceeds")));
        assert!(DhParameters::with_limit(101, 2, 100).is_err());
        assert!(DhParameters::with_limit(101, 2, 101).is_ok());
        // limits above the hard cap are clamped
        assert!(DhParameters::with_limit(MAX_DH_MODULUS + 1, 2, u64::MAX).is_err());
    }

    #[test]
    fn generate_refuses_oversized_pool_entries() {
        let mut rng = StdRng::seed_from_u64(11);
        let pool = PrimePool::from(vec![1_000_000_007]);
        assert!(matches!(
            DhParameters::generate(&pool, &mut rng),
            Err(CryptoError::Argument(_))
        ));
    }

    #[test]
    fn generated_parameters_pass_validation() {
        let mut rng = StdRng::seed_from_u64(11);
        let params = DhParameters::generate(&demo_pool(), &mut rng).unwrap();
        assert_eq!(
            DhParameters::new(params.modulus(), params.generator()).unwrap(),
            params
        );
    }

    #[test]
    fn generate_reports_missing_generator() {
        let mut rng = StdRng::seed_from_u64(11);
        let pool = PrimePool::from(vec![2]);
        assert!(matches!(
            DhParameters::generate(&pool, &mut rng),
            Err(CryptoError::SearchExhausted(_))
        ));
    }

    #[test]
    fn empty_pool_is_an_argument_error_for_required_samples() {
        let mut rng = StdRng::seed_from_u64(11);
        let params = DhParameters::new(23, 5).unwrap();
        assert!(matches!(
            DhExchange::new(params, &PrimePool::default(), &mut rng),
            Err(CryptoError::Argument(_))
        ));
    }

    #[test]
    fn in_memory_exchanges_agree() {
        let mut rng = StdRng::seed_from_u64(2024);
        for agreement in [KeyAgreement::DiffieHellman, KeyAgreement::RsaKeyTransport] {
            for _ in 0..20 {
                let (a, b) = perform_key_exchange(agreement, &demo_pool(), &mut rng).unwrap();
                assert_eq!(a, b, "{agreement}");
            }
        }
    }

    #[test]
    fn rsa_transport_secret_is_reduced() {
        let mut rng = StdRng::seed_from_u64(8);
        let public = RsaPublicKey::new(35, 5).unwrap();
        let pool = PrimePool::from(vec![101]);
        let (secret, ciphertext) = transport_secret(&public, &pool, &mut rng).unwrap();
        assert_eq!(secret.value(), 101 % 35);
        assert_eq!(ciphertext, pow_mod(101 % 35, 5, 35).unwrap());
    }

    #[test]
    fn secret_comparison_and_redaction() {
        let secret = SharedSecret::new(1234);
        assert!(secret.matches(1234));
        assert!(!secret.matches(1235));
        assert_eq!(format!("{secret:?}"), "SharedSecret(..)");
    }
}
