//! dhlink key agreement and cipher library
//!
//! Establishes a shared secret between two peers and uses it to key a small
//! block cipher for a message stream. Everything here is sized for
//! demonstration, not for real-world security.
//!
//! ## Primitives
//!
//! - **ModExp**: overflow-safe `mul_mod` / `pow_mod` on `u64`
//! - **Primes**: pool sampling, primitive-root search, textbook RSA keys
//! - **Exchange**: Diffie-Hellman and RSA secret transport, both yielding a `SharedSecret`
//! - **Cipher**: S-DES (8-bit block, 10-bit key) with ECB and CBC chaining

pub mod error;
pub mod exchange;
pub mod modes;
pub mod modexp;
pub mod primes;
pub mod rsa;
pub mod sdes;
pub mod session;

pub use error::CryptoError;
#[cfg(any(test, feature = "test-utils"))]
pub use exchange::perform_key_exchange;
pub use exchange::{
    DhExchange, DhParameters, KeyAgreement, MAX_DH_MODULUS, RsaInitiator, SharedSecret,
    transport_secret,
};
pub use modes::{Chaining, CipherMode, generate_iv};
pub use modexp::{mul_mod, pow_mod};
pub use primes::{PrimePool, find_generator, is_generator};
pub use rsa::{ExponentPolicy, RsaKeyPair, RsaPublicKey};
pub use sdes::{CipherKey, STANDARD_TABLES, Sdes, SdesTables, SubKeys};
#[cfg(any(test, feature = "test-utils"))]
pub use session::test_codec_pair;
pub use session::SessionCodec;
