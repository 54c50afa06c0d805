//! Primitive hash/cipher registry.
//!
//! This module provides:
//! - [`HashAlgorithm`] / [`CipherAlgorithm`]: the algorithm identifiers
//!   stored alongside protected collections
//! - [`Hasher`]: incremental digest context (update / finish / reset)
//! - [`HmacKey`]: a keyed HMAC context reusable across messages
//! - [`setup`]: process-wide one-time initialization returning the
//!   [`Registry`] handle every derivation goes through
//!
//! SHA digests and HMACs come from `ring`. MD5 (still needed by legacy PBE
//! parameters) comes from `md-5`, and HMAC-MD5 from the `hmac` crate.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use ::hmac::{Mac, SimpleHmac};
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::{digest, hmac};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Hash algorithms
// ---------------------------------------------------------------------------

/// Digest algorithms known to the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// MD5, legacy PBE parameters only.
    Md5,
    /// SHA-1.
    Sha1,
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Every registered digest.
    pub const ALL: [Self; 5] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512];

    /// Digest output length in bytes.
    #[must_use]
    pub const fn digest_length(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Internal block length in bytes (HMAC pad width).
    #[must_use]
    pub const fn block_length(self) -> usize {
        match self {
            Self::Md5 | Self::Sha1 | Self::Sha256 => 64,
            Self::Sha384 | Self::Sha512 => 128,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    fn ring_digest(self) -> Option<&'static digest::Algorithm> {
        match self {
            Self::Md5 => None,
            Self::Sha1 => Some(&digest::SHA1_FOR_LEGACY_USE_ONLY),
            Self::Sha256 => Some(&digest::SHA256),
            Self::Sha384 => Some(&digest::SHA384),
            Self::Sha512 => Some(&digest::SHA512),
        }
    }

    fn ring_hmac(self) -> Option<hmac::Algorithm> {
        match self {
            Self::Md5 => None,
            Self::Sha1 => Some(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY),
            Self::Sha256 => Some(hmac::HMAC_SHA256),
            Self::Sha384 => Some(hmac::HMAC_SHA384),
            Self::Sha512 => Some(hmac::HMAC_SHA512),
        }
    }

    /// Digest of `"abc"`, used by the startup self-check.
    const fn known_answer(self) -> &'static str {
        match self {
            Self::Md5 => "900150983cd24fb0d6963f7d28e17f72",
            Self::Sha1 => "a9993e364706816aba3e25717850c26c9cd0d89d",
            Self::Sha256 => "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
            Self::Sha384 => {
                "cb00753f45a35e8bb5a03d699ac65007272c32ab0eded163\
                 1a8b605a43ff5bed8086072ba1e7cc2358baeca134c825a7"
            }
            Self::Sha512 => {
                "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
                 2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
            }
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CryptoError::InvalidParameters(format!("unknown hash algorithm: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Cipher algorithms
// ---------------------------------------------------------------------------

/// Symmetric ciphers whose key/IV geometry the engine can target.
///
/// Only the lengths matter here; encryption itself happens elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherAlgorithm {
    /// Single DES.
    #[serde(rename = "des")]
    Des,
    /// Triple DES (EDE, three keys).
    #[serde(rename = "3des")]
    TripleDes,
    /// RC2 with a 40-bit key.
    #[serde(rename = "rc2-40")]
    Rc2_40,
    /// RC2 with a 128-bit key.
    #[serde(rename = "rc2-128")]
    Rc2_128,
    /// IDEA.
    #[serde(rename = "idea")]
    Idea,
    /// CAST-128.
    #[serde(rename = "cast5")]
    Cast5,
    /// Blowfish with a 128-bit key.
    #[serde(rename = "blowfish")]
    Blowfish,
    /// AES-128.
    #[serde(rename = "aes128")]
    Aes128,
    /// AES-192.
    #[serde(rename = "aes192")]
    Aes192,
    /// AES-256.
    #[serde(rename = "aes256")]
    Aes256,
    /// Twofish with a 256-bit key.
    #[serde(rename = "twofish")]
    Twofish,
    /// RC4 stream cipher.
    #[serde(rename = "arcfour")]
    Arcfour,
}

impl CipherAlgorithm {
    /// Every registered cipher.
    pub const ALL: [Self; 12] = [
        Self::Des,
        Self::TripleDes,
        Self::Rc2_40,
        Self::Rc2_128,
        Self::Idea,
        Self::Cast5,
        Self::Blowfish,
        Self::Aes128,
        Self::Aes192,
        Self::Aes256,
        Self::Twofish,
        Self::Arcfour,
    ];

    /// Key length in bytes.
    #[must_use]
    pub const fn key_length(self) -> usize {
        match self {
            Self::Rc2_40 => 5,
            Self::Des => 8,
            Self::Rc2_128
            | Self::Idea
            | Self::Cast5
            | Self::Blowfish
            | Self::Aes128
            | Self::Arcfour => 16,
            Self::TripleDes | Self::Aes192 => 24,
            Self::Aes256 | Self::Twofish => 32,
        }
    }

    /// Block length in bytes. Stream ciphers report 1.
    #[must_use]
    pub const fn block_length(self) -> usize {
        match self {
            Self::Arcfour => 1,
            Self::Des
            | Self::TripleDes
            | Self::Rc2_40
            | Self::Rc2_128
            | Self::Idea
            | Self::Cast5
            | Self::Blowfish => 8,
            Self::Aes128 | Self::Aes192 | Self::Aes256 | Self::Twofish => 16,
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Des => "des",
            Self::TripleDes => "3des",
            Self::Rc2_40 => "rc2-40",
            Self::Rc2_128 => "rc2-128",
            Self::Idea => "idea",
            Self::Cast5 => "cast5",
            Self::Blowfish => "blowfish",
            Self::Aes128 => "aes128",
            Self::Aes192 => "aes192",
            Self::Aes256 => "aes256",
            Self::Twofish => "twofish",
            Self::Arcfour => "arcfour",
        }
    }
}

impl fmt::Display for CipherAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CipherAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                CryptoError::InvalidParameters(format!("unknown cipher algorithm: {s}"))
            })
    }
}

// ---------------------------------------------------------------------------
// Incremental hashing
// ---------------------------------------------------------------------------

#[derive(Clone)]
enum HasherState {
    Ring(digest::Context),
    Md5(Md5),
}

impl HasherState {
    fn fresh(algorithm: HashAlgorithm) -> Self {
        algorithm.ring_digest().map_or_else(
            || Self::Md5(Md5::new()),
            |alg| Self::Ring(digest::Context::new(alg)),
        )
    }
}

/// Incremental digest context.
///
/// [`Hasher::finish_into`] leaves the context reset, so one hasher can
/// serve every round of an iterated KDF.
#[derive(Clone)]
pub struct Hasher {
    algorithm: HashAlgorithm,
    state: HasherState,
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            state: HasherState::fresh(algorithm),
        }
    }

    /// Algorithm this context computes.
    #[must_use]
    pub const fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Feed more data.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Ring(ctx) => ctx.update(data),
            HasherState::Md5(ctx) => Digest::update(ctx, data),
        }
    }

    /// Discard everything fed so far.
    pub fn reset(&mut self) {
        self.state = HasherState::fresh(self.algorithm);
    }

    /// Write the digest into `out` and reset the context.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidParameters` if `out` is not exactly
    /// [`HashAlgorithm::digest_length`] bytes.
    pub fn finish_into(&mut self, out: &mut [u8]) -> Result<(), CryptoError> {
        if out.len() != self.algorithm.digest_length() {
            return Err(CryptoError::InvalidParameters(format!(
                "{} digest needs {} bytes, got {}",
                self.algorithm,
                self.algorithm.digest_length(),
                out.len()
            )));
        }
        match std::mem::replace(&mut self.state, HasherState::fresh(self.algorithm)) {
            HasherState::Ring(ctx) => out.copy_from_slice(ctx.finish().as_ref()),
            HasherState::Md5(ctx) => out.copy_from_slice(&ctx.finalize()),
        }
        Ok(())
    }
}

impl fmt::Debug for Hasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hasher({})", self.algorithm)
    }
}

// ---------------------------------------------------------------------------
// HMAC
// ---------------------------------------------------------------------------

/// HMAC context keyed once, signable many times.
#[derive(Clone)]
pub enum HmacKey {
    /// `ring` HMAC for the SHA family.
    Ring(hmac::Key),
    /// HMAC-MD5 from the `hmac` crate.
    Md5(SimpleHmac<Md5>),
}

impl HmacKey {
    fn new(algorithm: HashAlgorithm, key: &[u8]) -> Result<Self, CryptoError> {
        if let Some(alg) = algorithm.ring_hmac() {
            return Ok(Self::Ring(hmac::Key::new(alg, key)));
        }
        SimpleHmac::<Md5>::new_from_slice(key)
            .map(Self::Md5)
            .map_err(|_| CryptoError::InvalidParameters("HMAC-MD5 rejected its key".into()))
    }

    /// Compute `HMAC(key, data)` into `out` (exactly one digest long).
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidParameters` on an output length mismatch.
    pub fn sign_into(&self, data: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
        match self {
            Self::Ring(key) => copy_tag(hmac::sign(key, data).as_ref(), out),
            Self::Md5(mac) => {
                let mut mac = mac.clone();
                Mac::update(&mut mac, data);
                copy_tag(&mac.finalize().into_bytes(), out)
            }
        }
    }
}

fn copy_tag(tag: &[u8], out: &mut [u8]) -> Result<(), CryptoError> {
    if out.len() != tag.len() {
        return Err(CryptoError::InvalidParameters(format!(
            "HMAC output needs {} bytes, got {}",
            tag.len(),
            out.len()
        )));
    }
    out.copy_from_slice(tag);
    Ok(())
}

impl fmt::Debug for HmacKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HmacKey(***)")
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Handle to the initialized primitive registry.
///
/// Only obtainable through [`setup`], so holding one proves the one-time
/// initialization ran and its self-check passed.
#[derive(Debug)]
pub struct Registry {
    _initialized: (),
}

static REGISTRY: OnceLock<Result<Registry, CryptoError>> = OnceLock::new();

/// Initialize the registry once for the whole process.
///
/// Safe to call from any number of threads; the first caller runs the
/// initialization and everyone else observes its outcome.
///
/// # Errors
///
/// Returns `CryptoError::EngineUnavailable` if a registered digest fails
/// its known-answer check.
pub fn setup() -> Result<&'static Registry, CryptoError> {
    REGISTRY
        .get_or_init(Registry::initialize)
        .as_ref()
        .map_err(Clone::clone)
}

impl Registry {
    fn initialize() -> Result<Self, CryptoError> {
        let registry = Self { _initialized: () };
        for algorithm in HashAlgorithm::ALL {
            let digest = registry.hash(algorithm, b"abc")?;
            if crate::hex::encode(digest.expose()) != algorithm.known_answer() {
                tracing::warn!(%algorithm, "digest self-check failed");
                return Err(CryptoError::EngineUnavailable(format!(
                    "{algorithm} failed its self-check"
                )));
            }
        }
        tracing::debug!(
            hashes = ?HashAlgorithm::ALL,
            ciphers = CipherAlgorithm::ALL.len(),
            "crypto registry initialized"
        );
        Ok(registry)
    }

    /// Digest length of `algorithm` in bytes.
    #[must_use]
    pub const fn digest_length(&self, algorithm: HashAlgorithm) -> usize {
        algorithm.digest_length()
    }

    /// Key length of `cipher` in bytes.
    #[must_use]
    pub const fn key_length(&self, cipher: CipherAlgorithm) -> usize {
        cipher.key_length()
    }

    /// Block length of `cipher` in bytes.
    #[must_use]
    pub const fn block_length(&self, cipher: CipherAlgorithm) -> usize {
        cipher.block_length()
    }

    /// Fresh incremental context for `algorithm`.
    #[must_use]
    pub fn hasher(&self, algorithm: HashAlgorithm) -> Hasher {
        Hasher::new(algorithm)
    }

    /// One-shot digest of `data` into secure memory.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the output buffer cannot be
    /// allocated.
    pub fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<SecretBuffer, CryptoError> {
        let mut out = SecretBuffer::zeroed(algorithm.digest_length())?;
        self.hash_into(algorithm, data, out.expose_mut())?;
        Ok(out)
    }

    /// One-shot digest of `data` into `out`.
    ///
    /// `data` and `out` may not alias; rehash loops go through a
    /// [`Hasher`] instead.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidParameters` on an output length mismatch.
    pub fn hash_into(
        &self,
        algorithm: HashAlgorithm,
        data: &[u8],
        out: &mut [u8],
    ) -> Result<(), CryptoError> {
        let mut hasher = Hasher::new(algorithm);
        hasher.update(data);
        hasher.finish_into(out)
    }

    /// Key an HMAC context with `key`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidParameters` if the MAC rejects the key.
    pub fn hmac_key(&self, algorithm: HashAlgorithm, key: &[u8]) -> Result<HmacKey, CryptoError> {
        HmacKey::new(algorithm, key)
    }

    /// One-shot `HMAC(key, data)` into secure memory.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` on allocation failure.
    pub fn hmac(
        &self,
        algorithm: HashAlgorithm,
        key: &[u8],
        data: &[u8],
    ) -> Result<SecretBuffer, CryptoError> {
        let mut out = SecretBuffer::zeroed(algorithm.digest_length())?;
        self.hmac_key(algorithm, key)?
            .sign_into(data, out.expose_mut())?;
        Ok(out)
    }

    /// `n` bytes from the operating system CSPRNG. Not for secrets.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn random_bytes(&self, n: usize) -> Result<Vec<u8>, CryptoError> {
        let mut bytes = vec![0u8; n];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
        Ok(bytes)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
