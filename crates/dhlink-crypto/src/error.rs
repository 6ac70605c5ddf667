//! Crypto error types.

/// Errors from the number-theoretic and cipher primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// An input is outside the domain of the operation (zero modulus,
    /// equal RSA primes, a non-generator, an empty pool where a value is
    /// required).
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// A bounded search found no qualifying value.
    #[error("Search exhausted: {0}")]
    SearchExhausted(String),
}
