//! Crypto session for the message stream.
//!
//! Reduces the agreed secret to a 10-bit S-DES key and applies the chosen
//! chaining mode to every message. The secret is consumed on construction.

use crate::exchange::SharedSecret;
use crate::modes::{self, Chaining, CipherMode};
use crate::sdes::{CipherKey, Sdes};

/// Per-session block cipher state.
#[derive(Debug, Clone, Copy)]
pub struct SessionCodec {
    cipher: Sdes<'static>,
    key: CipherKey,
    chaining: Chaining,
}

impl SessionCodec {
    /// Derive the cipher key (`secret mod 1024`) and bind the chaining mode.
    pub fn new(secret: SharedSecret, chaining: Chaining) -> Self {
        let key = CipherKey::from_secret(secret.value());
        drop(secret);
        Self::from_key(key, chaining)
    }

    pub fn from_key(key: CipherKey, chaining: Chaining) -> Self {
        Self {
            cipher: Sdes::standard(key),
            key,
            chaining,
        }
    }

    pub const fn key(&self) -> CipherKey {
        self.key
    }

    pub const fn chaining(&self) -> Chaining {
        self.chaining
    }

    pub const fn mode(&self) -> CipherMode {
        self.chaining.mode()
    }

    /// Switch chaining mode for subsequent messages, e.g. once the peer's
    /// IV arrives.
    pub const fn set_chaining(&mut self, chaining: Chaining) {
        self.chaining = chaining;
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        modes::encrypt(&self.cipher, self.chaining, plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8> {
        modes::decrypt(&self.cipher, self.chaining, ciphertext)
    }
}

/// Create a matched pair of codecs for testing.
///
/// Returns (`sender`, `receiver`) keyed from the same secret.
#[cfg(any(test, feature = "test-utils"))]
pub fn test_codec_pair(secret: u64, chaining: Chaining) -> (SessionCodec, SessionCodec) {
    (
        SessionCodec::new(SharedSecret::new(secret), chaining),
        SessionCodec::new(SharedSecret::new(secret), chaining),
    )
}
