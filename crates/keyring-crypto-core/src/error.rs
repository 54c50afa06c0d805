//! Cryptographic error types for `keyring-crypto-core`.

use thiserror::Error;

/// Errors produced by key derivation, key expression and codec operations.
///
/// None of the variants ever carry password or key bytes.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Bad iteration count, zero-length digest or unknown cipher geometry.
    #[error("invalid derivation parameters: {0}")]
    InvalidParameters(String),

    /// The hash/cipher pair cannot be served by the chosen scheme
    /// (legacy PBE needs key + IV to fit in 16 digest bytes).
    #[error("incompatible algorithms: {hash} cannot supply key and IV for {cipher}")]
    IncompatibleAlgorithms {
        /// Hash algorithm name.
        hash: String,
        /// Cipher algorithm name.
        cipher: String,
    },

    /// Password is not valid UTF-8 where characters are required.
    #[error("invalid password: not valid UTF-8 text")]
    InvalidPassword,

    /// The primitive registry could not set up a hash/cipher context.
    #[error("crypto engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Key expression tree is not a recognized key.
    #[error("malformed key expression: {0}")]
    MalformedExpression(String),

    /// A numeric component required for the operation is absent.
    #[error("missing key component: {0}")]
    MissingComponent(String),

    /// The key algorithm is recognized but not supported by the operation.
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Hex input ended with an unpaired nibble.
    #[error("hex decode failed: odd number of digits")]
    OddLength,

    /// Hex input contained a non-hex, non-whitespace character.
    #[error("hex decode failed: invalid character {character:?} at offset {offset}")]
    InvalidCharacter {
        /// Offending character.
        character: char,
        /// Byte offset of the character in the input.
        offset: usize,
    },

    /// Secure memory allocation or CSPRNG failure.
    #[error("secure memory error: {0}")]
    SecureMemory(String),
}

impl CryptoError {
    /// Returns `true` for resource failures a caller may retry after backoff.
    ///
    /// Everything else is a contract violation that will fail the same way
    /// on every attempt.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::EngineUnavailable(_) | Self::SecureMemory(_))
    }
}
