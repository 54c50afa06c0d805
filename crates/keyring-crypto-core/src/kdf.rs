//! Password-based key/IV derivation.
//!
//! This module provides:
//! - [`derive`]: dispatch on a [`DerivationScheme`]
//! - [`derive_simple`]: iterated concatenate-and-rehash, multi-pass
//! - [`derive_pbe`]: PKCS#5 v1 style single digest split into key and IV
//! - [`derive_pkcs12`]: PKCS#12 appendix B derivation (diversifier 1 / 2)
//! - [`derive_pbkdf2`]: PBKDF2-HMAC key, random IV
//!
//! # Reproducibility
//!
//! The three legacy schemes re-derive the same IV from the same salt, so
//! the IV never has to be stored. PBKDF2 callers store the IV themselves:
//! it comes from the CSPRNG.
//!
//! Keys and every intermediate digest live in [`SecretBuffer`]s. IVs are
//! not secret and use ordinary memory.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use crate::registry::{self, CipherAlgorithm, HashAlgorithm, Hasher, Registry};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Legacy PBE takes key and IV from the first 16 digest bytes.
const PBE_WINDOW: usize = 16;

/// PKCS#12 `v`: block width of the salt, password and diversifier blocks.
const PKCS12_BLOCK: usize = 64;

/// PKCS#12 diversifier for key material.
const PKCS12_KEY_ID: u8 = 1;

/// PKCS#12 diversifier for IV material.
const PKCS12_IV_ID: u8 = 2;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which derivation algorithm turns a password into key material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivationScheme {
    /// Iterated `H(prev || password || salt)`, as many passes as needed.
    Simple,
    /// One iterated digest, key from the front, IV from bytes `[16 - iv, 16)`.
    Pbe,
    /// PKCS#12 appendix B.
    Pkcs12,
    /// PBKDF2-HMAC key with a random IV.
    Pbkdf2,
}

impl DerivationScheme {
    /// Lowercase scheme name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Pbe => "pbe",
            Self::Pkcs12 => "pkcs12",
            Self::Pbkdf2 => "pbkdf2",
        }
    }
}

impl fmt::Display for DerivationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key and IV lengths required by a cipher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CipherTarget {
    /// Key length in bytes.
    pub key_length: usize,
    /// IV length in bytes (the cipher block length).
    pub iv_length: usize,
}

impl CipherTarget {
    /// Look up the geometry of `cipher` in the registry.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidParameters` if the cipher reports a
    /// zero key or block length.
    pub fn resolve(registry: &Registry, cipher: CipherAlgorithm) -> Result<Self, CryptoError> {
        let key_length = registry.key_length(cipher);
        let iv_length = registry.block_length(cipher);
        if key_length == 0 || iv_length == 0 {
            return Err(CryptoError::InvalidParameters(format!(
                "cipher {cipher} has no usable key/block length"
            )));
        }
        Ok(Self {
            key_length,
            iv_length,
        })
    }

    /// `false` for stream ciphers, which take no IV.
    #[must_use]
    pub const fn has_iv(self) -> bool {
        self.iv_length > 1
    }
}

/// Inputs of a single derivation.
#[derive(Clone, Copy)]
pub struct DerivationRequest<'a> {
    /// UTF-8 password bytes, possibly empty.
    pub password: &'a [u8],
    /// Stored salt, possibly empty.
    pub salt: &'a [u8],
    /// Rounds of rehashing, at least 1.
    pub iterations: u32,
    /// Digest driving the derivation.
    pub hash: HashAlgorithm,
    /// Cipher the key and IV are destined for.
    pub cipher: CipherAlgorithm,
}

impl fmt::Debug for DerivationRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationRequest")
            .field("password", &"***")
            .field("salt_len", &self.salt.len())
            .field("iterations", &self.iterations)
            .field("hash", &self.hash)
            .field("cipher", &self.cipher)
            .finish()
    }
}

/// Output of a derivation.
#[must_use]
#[derive(Debug)]
pub struct DerivedKeyMaterial {
    /// Exactly `key_length` bytes, when requested.
    pub key: Option<SecretBuffer>,
    /// Exactly `iv_length` bytes, when requested and the cipher takes one.
    pub iv: Option<Vec<u8>>,
}

/// Everything a scheme needs once the shared preconditions hold.
struct Prepared {
    registry: &'static Registry,
    target: CipherTarget,
    digest_length: usize,
}

fn prepare(request: &DerivationRequest<'_>) -> Result<Prepared, CryptoError> {
    if request.iterations == 0 {
        return Err(CryptoError::InvalidParameters(
            "iteration count must be at least 1".into(),
        ));
    }
    let registry = registry::setup()?;
    let digest_length = registry.digest_length(request.hash);
    if digest_length == 0 {
        return Err(CryptoError::InvalidParameters(format!(
            "hash {} has a zero-length digest",
            request.hash
        )));
    }
    let target = CipherTarget::resolve(registry, request.cipher)?;
    Ok(Prepared {
        registry,
        target,
        digest_length,
    })
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Derive key and/or IV with `scheme`.
///
/// # Errors
///
/// See the per-scheme functions.
pub fn derive(
    scheme: DerivationScheme,
    request: &DerivationRequest<'_>,
    want_key: bool,
    want_iv: bool,
) -> Result<DerivedKeyMaterial, CryptoError> {
    match scheme {
        DerivationScheme::Simple => derive_simple(request, want_key, want_iv),
        DerivationScheme::Pbe => derive_pbe(request, want_key, want_iv),
        DerivationScheme::Pkcs12 => derive_pkcs12(request, want_key, want_iv),
        DerivationScheme::Pbkdf2 => derive_pbkdf2(request, want_key, want_iv),
    }
}

// ---------------------------------------------------------------------------
// Simple
// ---------------------------------------------------------------------------

/// Iterated concatenate-and-rehash derivation.
///
/// Each pass hashes `previous_digest || password || salt` (no previous
/// digest on the first pass), then rehashes the digest `iterations - 1`
/// times. Key bytes are drawn first, then IV bytes, across as many passes
/// as the cipher needs. Key bytes are counted even when the key is not
/// requested, so the IV does not depend on `want_key`.
///
/// # Errors
///
/// - `CryptoError::InvalidParameters` if `iterations` is 0
/// - `CryptoError::EngineUnavailable` if the registry failed to initialize
pub fn derive_simple(
    request: &DerivationRequest<'_>,
    want_key: bool,
    want_iv: bool,
) -> Result<DerivedKeyMaterial, CryptoError> {
    let Prepared {
        registry,
        target,
        digest_length,
    } = prepare(request)?;

    let needed_key = target.key_length;
    let needed_iv = if target.has_iv() { target.iv_length } else { 0 };

    let mut key = if want_key {
        Some(SecretBuffer::zeroed(needed_key)?)
    } else {
        None
    };
    let mut iv = (want_iv && target.has_iv()).then(|| vec![0u8; needed_iv]);

    let mut digest = SecretBuffer::zeroed(digest_length)?;
    let mut hasher = registry.hasher(request.hash);
    let mut filled_key = 0usize;
    let mut filled_iv = 0usize;
    let mut first_pass = true;

    loop {
        if !first_pass {
            hasher.update(digest.expose());
        }
        first_pass = false;
        hasher.update(request.password);
        hasher.update(request.salt);
        hasher.finish_into(digest.expose_mut())?;
        rehash(&mut hasher, &mut digest, request.iterations)?;

        let mut cursor = 0usize;
        draw(
            digest.expose(),
            &mut cursor,
            key.as_mut().map(SecretBuffer::expose_mut),
            &mut filled_key,
            needed_key,
        );
        draw(
            digest.expose(),
            &mut cursor,
            iv.as_deref_mut(),
            &mut filled_iv,
            needed_iv,
        );

        if filled_key == needed_key && filled_iv == needed_iv {
            break;
        }
    }

    Ok(DerivedKeyMaterial { key, iv })
}

// ---------------------------------------------------------------------------
// PBE
// ---------------------------------------------------------------------------

/// Legacy single-digest derivation.
///
/// One pass over `password || salt`, rehashed `iterations - 1` times. The
/// key is the first `key_length` digest bytes and the IV is bytes
/// `[16 - iv_length, 16)`. The two windows may overlap for odd algorithm
/// pairs; that is accepted.
///
/// # Errors
///
/// - `CryptoError::InvalidParameters` if `iterations` is 0
/// - `CryptoError::IncompatibleAlgorithms` if key + IV exceed 16 bytes or
///   the digest length; checked before any buffer is allocated
pub fn derive_pbe(
    request: &DerivationRequest<'_>,
    want_key: bool,
    want_iv: bool,
) -> Result<DerivedKeyMaterial, CryptoError> {
    let Prepared {
        registry,
        target,
        digest_length,
    } = prepare(request)?;

    let needed = target.key_length.saturating_add(target.iv_length);
    if needed > PBE_WINDOW || needed > digest_length || digest_length < PBE_WINDOW {
        tracing::warn!(
            hash = %request.hash,
            cipher = %request.cipher,
            "PBE derivation needs too many bytes of key and/or IV"
        );
        return Err(CryptoError::IncompatibleAlgorithms {
            hash: request.hash.to_string(),
            cipher: request.cipher.to_string(),
        });
    }

    let mut digest = SecretBuffer::zeroed(digest_length)?;
    let mut hasher = registry.hasher(request.hash);
    hasher.update(request.password);
    hasher.update(request.salt);
    hasher.finish_into(digest.expose_mut())?;
    rehash(&mut hasher, &mut digest, request.iterations)?;

    let key = if want_key {
        Some(SecretBuffer::new(&digest.expose()[..target.key_length])?)
    } else {
        None
    };
    let iv = (want_iv && target.has_iv()).then(|| {
        let start = PBE_WINDOW.saturating_sub(target.iv_length);
        digest.expose()[start..PBE_WINDOW].to_vec()
    });

    Ok(DerivedKeyMaterial { key, iv })
}

// ---------------------------------------------------------------------------
// PKCS#12
// ---------------------------------------------------------------------------

/// PKCS#12 appendix B derivation.
///
/// The key uses diversifier 1 and the IV diversifier 2; both are
/// deterministic in `(password, salt, iterations, hash)`.
///
/// Salt and password blocks are fixed at 64 bytes each, which matches the
/// standard for 160-bit digests, salts up to 64 bytes and passwords up to
/// 31 characters. Longer inputs are truncated to the block, as the stored
/// parameters this reproduces were created that way.
///
/// # Errors
///
/// - `CryptoError::InvalidParameters` if `iterations` is 0
/// - `CryptoError::InvalidPassword` if the password is not UTF-8
pub fn derive_pkcs12(
    request: &DerivationRequest<'_>,
    want_key: bool,
    want_iv: bool,
) -> Result<DerivedKeyMaterial, CryptoError> {
    let Prepared {
        registry, target, ..
    } = prepare(request)?;

    let password = std::str::from_utf8(request.password).map_err(|_| {
        tracing::warn!("rejecting non-UTF-8 password for PKCS#12 derivation");
        CryptoError::InvalidPassword
    })?;

    let key = if want_key {
        let mut key = SecretBuffer::zeroed(target.key_length)?;
        pkcs12_generate(registry, request, PKCS12_KEY_ID, password, key.expose_mut())?;
        Some(key)
    } else {
        None
    };

    let iv = if want_iv && target.has_iv() {
        let mut iv = vec![0u8; target.iv_length];
        pkcs12_generate(registry, request, PKCS12_IV_ID, password, &mut iv)?;
        Some(iv)
    } else {
        None
    };

    Ok(DerivedKeyMaterial { key, iv })
}

/// Fill `output` with PKCS#12 material for diversifier `id`.
fn pkcs12_generate(
    registry: &Registry,
    request: &DerivationRequest<'_>,
    id: u8,
    password: &str,
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let digest_length = registry.digest_length(request.hash);
    let mut digest = SecretBuffer::zeroed(digest_length)?;
    // I = salt block || password block
    let mut block_i = SecretBuffer::zeroed(PKCS12_BLOCK.saturating_mul(2))?;
    let mut block_b = SecretBuffer::zeroed(PKCS12_BLOCK)?;

    {
        let (salt_block, password_block) = block_i.expose_mut().split_at_mut(PKCS12_BLOCK);
        if !request.salt.is_empty() {
            for (dst, src) in salt_block.iter_mut().zip(request.salt.iter().cycle()) {
                *dst = *src;
            }
        }
        // BMP string: 16 bits per character, NUL terminated, repeated.
        let units = password
            .chars()
            .map(|c| {
                let [_, _, hi, lo] = u32::from(c).to_be_bytes();
                [hi, lo]
            })
            .chain(std::iter::once([0u8, 0u8]))
            .cycle();
        if !password.is_empty() {
            for (pair, unit) in password_block.chunks_exact_mut(2).zip(units) {
                pair.copy_from_slice(&unit);
            }
        }
    }

    // An empty password contributes no block at all.
    let hashed_len = if password.is_empty() {
        PKCS12_BLOCK
    } else {
        PKCS12_BLOCK.saturating_mul(2)
    };
    let diversifier = [id; PKCS12_BLOCK];
    let mut hasher = registry.hasher(request.hash);
    let wanted = output.len();
    let mut produced = 0usize;

    loop {
        hasher.update(&diversifier);
        hasher.update(&block_i.expose()[..hashed_len]);
        hasher.finish_into(digest.expose_mut())?;
        rehash(&mut hasher, &mut digest, request.iterations)?;

        let mut cursor = 0usize;
        draw(
            digest.expose(),
            &mut cursor,
            Some(&mut *output),
            &mut produced,
            wanted,
        );
        if produced == wanted {
            break;
        }

        // B = digest repeated to 64 bytes; I_j = (I_j + B + 1) mod 2^512
        for (dst, src) in block_b
            .expose_mut()
            .iter_mut()
            .zip(digest.expose().iter().cycle())
        {
            *dst = *src;
        }
        for segment in block_i.expose_mut().chunks_exact_mut(PKCS12_BLOCK) {
            add_plus_one(segment, block_b.expose());
        }
    }

    Ok(())
}

/// `acc = (acc + addend + 1) mod 2^(8 * acc.len())`, both big-endian.
fn add_plus_one(acc: &mut [u8], addend: &[u8]) {
    let mut carry = 1u16;
    for (a, b) in acc.iter_mut().rev().zip(addend.iter().rev()) {
        // At most 0xff + 0xff + 1, no overflow in u16.
        let sum = u16::from(*a)
            .wrapping_add(u16::from(*b))
            .wrapping_add(carry);
        let [high, low] = sum.to_be_bytes();
        *a = low;
        carry = u16::from(high);
    }
}

// ---------------------------------------------------------------------------
// PBKDF2
// ---------------------------------------------------------------------------

/// PBKDF2-HMAC key with a fresh random IV.
///
/// The key follows RFC 8018 §5.2. The IV is independent of password, salt
/// and iterations and differs on every call.
///
/// # Errors
///
/// - `CryptoError::InvalidParameters` if `iterations` is 0
/// - `CryptoError::SecureMemory` if the CSPRNG fails
pub fn derive_pbkdf2(
    request: &DerivationRequest<'_>,
    want_key: bool,
    want_iv: bool,
) -> Result<DerivedKeyMaterial, CryptoError> {
    let Prepared {
        registry, target, ..
    } = prepare(request)?;

    let key = if want_key {
        let mut key = SecretBuffer::zeroed(target.key_length)?;
        pbkdf2_generate(registry, request, key.expose_mut())?;
        Some(key)
    } else {
        None
    };

    let iv = if want_iv && target.has_iv() {
        Some(registry.random_bytes(target.iv_length)?)
    } else {
        None
    };

    Ok(DerivedKeyMaterial { key, iv })
}

fn pbkdf2_generate(
    registry: &Registry,
    request: &DerivationRequest<'_>,
    output: &mut [u8],
) -> Result<(), CryptoError> {
    if output.is_empty() {
        return Err(CryptoError::InvalidParameters(
            "PBKDF2 output length must be non-zero".into(),
        ));
    }

    let digest_length = registry.digest_length(request.hash);
    let prf = registry.hmac_key(request.hash, request.password)?;
    let mut u = SecretBuffer::zeroed(digest_length)?;
    let mut next = SecretBuffer::zeroed(digest_length)?;
    let mut t = SecretBuffer::zeroed(digest_length)?;
    let mut block_input = SecretBuffer::zeroed(request.salt.len().saturating_add(4))?;
    block_input.expose_mut()[..request.salt.len()].copy_from_slice(request.salt);

    for (index, chunk) in output.chunks_mut(digest_length).enumerate() {
        let block_index = index
            .checked_add(1)
            .and_then(|i| u32::try_from(i).ok())
            .ok_or_else(|| CryptoError::InvalidParameters("PBKDF2 output too long".into()))?;
        block_input.expose_mut()[request.salt.len()..].copy_from_slice(&block_index.to_be_bytes());

        prf.sign_into(block_input.expose(), u.expose_mut())?;
        t.expose_mut().copy_from_slice(u.expose());

        for _ in 1..request.iterations {
            prf.sign_into(u.expose(), next.expose_mut())?;
            std::mem::swap(&mut u, &mut next);
            xor_into(t.expose_mut(), u.expose());
        }

        chunk.copy_from_slice(&t.expose()[..chunk.len()]);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Rehash `digest` in place `iterations - 1` more times.
fn rehash(hasher: &mut Hasher, digest: &mut SecretBuffer, iterations: u32) -> Result<(), CryptoError> {
    for _ in 1..iterations {
        hasher.update(digest.expose());
        hasher.finish_into(digest.expose_mut())?;
    }
    Ok(())
}

/// Move up to `needed - filled` bytes from `src[cursor..]` into `dst`.
///
/// Advances both counters whether or not a destination is given.
fn draw(
    src: &[u8],
    cursor: &mut usize,
    dst: Option<&mut [u8]>,
    filled: &mut usize,
    needed: usize,
) {
    let available = src.len().saturating_sub(*cursor);
    let take = needed.saturating_sub(*filled).min(available);
    let src_end = cursor.saturating_add(take);
    let dst_end = filled.saturating_add(take);
    if let Some(dst) = dst {
        dst[*filled..dst_end].copy_from_slice(&src[*cursor..src_end]);
    }
    *cursor = src_end;
    *filled = dst_end;
}

fn xor_into(acc: &mut [u8], other: &[u8]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
