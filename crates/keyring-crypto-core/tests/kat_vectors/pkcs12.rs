//! PKCS#12 appendix B vectors (SHA-1, the pbeWithSHAAnd3-KeyTripleDES
//! parameters used by `openssl pkcs12`).

use super::{iv_hex, key_hex, request};
use keyring_crypto_core::hex;
use keyring_crypto_core::kdf::derive_pkcs12;
use keyring_crypto_core::registry::{CipherAlgorithm, HashAlgorithm};

#[test]
fn smeg_single_iteration() {
    let salt = hex::decode("0A58CF64530D823F").expect("salt hex");
    let out = derive_pkcs12(
        &request(b"smeg", &salt, 1, HashAlgorithm::Sha1, CipherAlgorithm::TripleDes),
        true,
        true,
    )
    .expect("derive should succeed");
    assert_eq!(key_hex(&out), "8aaae6297b6cb04642ab5b077851284eb7128f1a2a7fbca3");
    assert_eq!(iv_hex(&out), "79993dfe048d3b76");
}

#[test]
fn queeg_thousand_iterations() {
    let salt = hex::decode("05DEC959ACFF72F7").expect("salt hex");
    let out = derive_pkcs12(
        &request(b"queeg", &salt, 1000, HashAlgorithm::Sha1, CipherAlgorithm::TripleDes),
        true,
        true,
    )
    .expect("derive should succeed");
    assert_eq!(key_hex(&out), "ed2034e36328830ff09df1e1a07dd357185dac0d4f9eb3d4");
    assert_eq!(iv_hex(&out), "11dedad7758d4860");
}

/// A 32-byte key needs a second round, which exercises the I_j update.
#[test]
fn smeg_two_rounds() {
    let salt = hex::decode("0A58CF64530D823F").expect("salt hex");
    let out = derive_pkcs12(
        &request(b"smeg", &salt, 1, HashAlgorithm::Sha1, CipherAlgorithm::Aes256),
        true,
        false,
    )
    .expect("derive should succeed");
    assert_eq!(
        key_hex(&out),
        "8aaae6297b6cb04642ab5b077851284eb7128f1a2a7fbca340830d0ce0d7879d"
    );
}

#[test]
fn empty_password_hashes_salt_block_only() {
    let salt = hex::decode("0A58CF64530D823F").expect("salt hex");
    let out = derive_pkcs12(
        &request(b"", &salt, 1, HashAlgorithm::Sha1, CipherAlgorithm::Aes128),
        true,
        false,
    )
    .expect("derive should succeed");
    assert_eq!(key_hex(&out), "9985036e1a31d2812085d6cef9db2e03");
}
