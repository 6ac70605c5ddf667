//! Session error types.

use dhlink_crypto::CryptoError;

/// Errors surfaced while running a handshake or a message session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The peer sent something we cannot accept at this point.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The channel closed or failed before the exchange finished.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The echoed Diffie-Hellman secret did not match ours.
    #[error("Shared secret mismatch")]
    SecretMismatch,

    /// Arithmetic or key failures, passed through unchanged.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        Self::Connection(e.to_string())
    }
}
