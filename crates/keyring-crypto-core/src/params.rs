//! Stored derivation parameters.
//!
//! A password-protected collection keeps one [`DerivationParams`] record
//! next to its ciphertext. Everything in it is public; only the password
//! is secret, and it is supplied again on every unlock.

use crate::error::CryptoError;
use crate::kdf::{self, DerivationRequest, DerivationScheme, DerivedKeyMaterial};
use crate::registry::{self, CipherAlgorithm, HashAlgorithm};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Salt length for newly created collections.
pub const DEFAULT_SALT_LEN: usize = 8;

/// Lower bound of [`random_iterations`].
pub const MIN_RANDOM_ITERATIONS: u32 = 1000;

/// Derivation recipe persisted alongside a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivationParams {
    /// Derivation algorithm.
    pub scheme: DerivationScheme,
    /// Digest driving the derivation.
    pub hash: HashAlgorithm,
    /// Cipher the derived key is for.
    pub cipher: CipherAlgorithm,
    /// Iteration count, at least 1.
    pub iterations: u32,
    /// Salt, stored as hex.
    #[serde(with = "crate::hex::serde")]
    pub salt: Vec<u8>,
}

impl DerivationParams {
    /// Parameters with a fresh random [`DEFAULT_SALT_LEN`]-byte salt.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidParameters` if `iterations` is 0
    /// - `CryptoError::EngineUnavailable` if the registry failed to initialize
    /// - `CryptoError::SecureMemory` if the CSPRNG fails
    pub fn generate(
        scheme: DerivationScheme,
        hash: HashAlgorithm,
        cipher: CipherAlgorithm,
        iterations: u32,
    ) -> Result<Self, CryptoError> {
        let salt = registry::setup()?.random_bytes(DEFAULT_SALT_LEN)?;
        let params = Self {
            scheme,
            hash,
            cipher,
            iterations,
            salt,
        };
        params.validate()?;
        Ok(params)
    }

    /// Reject records no scheme can use.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidParameters` if `iterations` is 0.
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.iterations == 0 {
            return Err(CryptoError::InvalidParameters(
                "iteration count must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Run the stored scheme over `password`.
    ///
    /// # Errors
    ///
    /// [`DerivationParams::validate`] failures, then whatever
    /// [`kdf::derive`] returns for the stored scheme.
    pub fn derive(
        &self,
        password: &SecretString,
        want_key: bool,
        want_iv: bool,
    ) -> Result<DerivedKeyMaterial, CryptoError> {
        self.validate()?;
        tracing::debug!(
            scheme = %self.scheme,
            hash = %self.hash,
            cipher = %self.cipher,
            iterations = self.iterations,
            "deriving collection key"
        );
        let request = DerivationRequest {
            password: password.expose_secret().as_bytes(),
            salt: &self.salt,
            iterations: self.iterations,
            hash: self.hash,
            cipher: self.cipher,
        };
        kdf::derive(self.scheme, &request, want_key, want_iv)
    }
}

/// Iteration count for a new collection: 1000 plus up to 4095 at random.
///
/// # Errors
///
/// Returns `CryptoError::SecureMemory` if the CSPRNG fails, or
/// `CryptoError::EngineUnavailable` if the registry failed to initialize.
pub fn random_iterations() -> Result<u32, CryptoError> {
    let bytes = registry::setup()?.random_bytes(4)?;
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes);
    Ok(MIN_RANDOM_ITERATIONS.saturating_add(u32::from_be_bytes(word) & 0x0fff))
}
