//! Entropy quality tests for CSPRNG outputs.
//!
//! Smoke tests that random buffers, generated salts and PBKDF2 IVs are not
//! degenerate. Shannon entropy of a finite uniform sample sits below 8.0
//! bits/byte (not every byte value appears), so thresholds scale with the
//! sample size:
//!
//! | Sample size | Expected entropy | Our threshold |
//! |-------------|------------------|---------------|
//! | 1 KB        | ~7.81            | 7.5           |
//! | 64 KB       | ~7.997           | 7.99          |

use keyring_crypto_core::kdf::{derive_pbkdf2, DerivationRequest};
use keyring_crypto_core::memory::SecretBuffer;
use keyring_crypto_core::params::DerivationParams;
use keyring_crypto_core::registry::{CipherAlgorithm, HashAlgorithm};
use keyring_crypto_core::DerivationScheme;

/// Shannon entropy of a byte slice (bits per byte).
#[allow(clippy::cast_precision_loss)]
fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut freq = [0u64; 256];
    for &b in data {
        freq[b as usize] = freq[b as usize].saturating_add(1);
    }
    let len = data.len() as f64;
    freq.iter()
        .filter(|&&f| f > 0)
        .map(|&f| {
            let p = f as f64 / len;
            -p * p.log2()
        })
        .sum()
}

#[test]
fn secret_buffer_random_1kb_entropy() {
    let buf = SecretBuffer::random(1024).expect("CSPRNG should succeed");
    let entropy = shannon_entropy(buf.expose());
    assert!(
        entropy > 7.5,
        "SecretBuffer::random(1024) entropy too low: {entropy:.4} (expected > 7.5)"
    );
}

#[test]
fn secret_buffer_random_64kb_entropy() {
    let buf = SecretBuffer::random(65536).expect("CSPRNG should succeed");
    let entropy = shannon_entropy(buf.expose());
    assert!(
        entropy > 7.99,
        "SecretBuffer::random(65536) entropy too low: {entropy:.4} (expected > 7.99)"
    );
}

/// 128 generated salts pooled into 1 KB.
#[test]
fn generated_salts_entropy() {
    let mut pool = Vec::with_capacity(1024);
    for _ in 0..128 {
        let params = DerivationParams::generate(
            DerivationScheme::Pbkdf2,
            HashAlgorithm::Sha256,
            CipherAlgorithm::Aes256,
            1,
        )
        .expect("generate should succeed");
        pool.extend_from_slice(&params.salt);
    }
    let entropy = shannon_entropy(&pool);
    assert!(entropy > 7.5, "pooled salt entropy too low: {entropy:.4}");
}

/// 64 PBKDF2 IVs pooled into 1 KB.
#[test]
fn pbkdf2_iv_entropy() {
    let request = DerivationRequest {
        password: b"pw",
        salt: b"salt",
        iterations: 1,
        hash: HashAlgorithm::Sha1,
        cipher: CipherAlgorithm::Aes128,
    };
    let mut pool = Vec::with_capacity(1024);
    for _ in 0..64 {
        let out = derive_pbkdf2(&request, false, true).expect("derive should succeed");
        pool.extend_from_slice(&out.iv.expect("iv requested"));
    }
    let entropy = shannon_entropy(&pool);
    assert!(entropy > 7.5, "pooled IV entropy too low: {entropy:.4}");
}

/// Two consecutive random buffers must be distinct.
#[test]
fn csprng_produces_distinct_outputs() {
    let a = SecretBuffer::random(256).expect("CSPRNG should succeed");
    let b = SecretBuffer::random(256).expect("CSPRNG should succeed");
    assert_ne!(a.expose(), b.expose());
}
