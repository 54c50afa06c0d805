//! `keyring-crypto-core`: cryptographic engine of the keyring daemon.
//!
//! Password-based key derivation for protected collections, the hex codec
//! of the agent protocol, secure buffers for secrets, and the asymmetric
//! key expression model used to index and export stored keys.
//!
//! No I/O and no async: everything here is synchronous and deterministic
//! apart from the CSPRNG.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;
pub mod registry;

pub mod hex;

pub mod kdf;
pub mod params;

pub mod keys;
pub mod sexp;

pub use error::CryptoError;
pub use kdf::{
    derive, derive_pbe, derive_pbkdf2, derive_pkcs12, derive_simple, CipherTarget,
    DerivationRequest, DerivationScheme, DerivedKeyMaterial,
};
pub use keys::{
    derive_public, extract_component, identifier_of, parse, AlgorithmKey, DsaKey, ElgamalKey,
    KeyAlgorithm, KeyExpression, KeyIdentifier, Mpi, ParsedKey, RsaKey, KEY_IDENTIFIER_LEN,
};
pub use memory::{disable_core_dumps, is_secure, LockedRegion, SecretBuffer};
pub use params::{random_iterations, DerivationParams, DEFAULT_SALT_LEN};
pub use registry::{setup, CipherAlgorithm, HashAlgorithm, Hasher, HmacKey, Registry};
pub use sexp::Sexp;
