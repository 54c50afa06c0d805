//! A collection's derivation record is created, persisted as JSON, read
//! back and used to re-derive the same key.

use keyring_crypto_core::hex;
use keyring_crypto_core::params::{random_iterations, DerivationParams, MIN_RANDOM_ITERATIONS};
use keyring_crypto_core::registry::{CipherAlgorithm, HashAlgorithm};
use keyring_crypto_core::{CryptoError, DerivationScheme};
use secrecy::SecretString;

fn password(text: &str) -> SecretString {
    SecretString::from(text.to_owned())
}

#[test]
fn persisted_params_rederive_same_key() {
    let iterations = random_iterations().expect("random should succeed");
    assert!(iterations >= MIN_RANDOM_ITERATIONS);

    let created = DerivationParams::generate(
        DerivationScheme::Pkcs12,
        HashAlgorithm::Sha1,
        CipherAlgorithm::Aes128,
        iterations,
    )
    .expect("generate should succeed");
    let stored = serde_json::to_string(&created).expect("serialize should succeed");

    let original = created
        .derive(&password("correct horse"), true, true)
        .expect("derive should succeed");

    let loaded: DerivationParams = serde_json::from_str(&stored).expect("deserialize should succeed");
    let unlocked = loaded
        .derive(&password("correct horse"), true, true)
        .expect("derive should succeed");

    assert_eq!(
        original.key.as_ref().expect("key").expose(),
        unlocked.key.as_ref().expect("key").expose()
    );
    assert_eq!(original.iv, unlocked.iv);

    let wrong = loaded
        .derive(&password("battery staple"), true, false)
        .expect("derive should succeed");
    assert_ne!(
        original.key.as_ref().expect("key").expose(),
        wrong.key.as_ref().expect("key").expose()
    );
}

#[test]
fn stored_record_format() {
    let params = DerivationParams {
        scheme: DerivationScheme::Pkcs12,
        hash: HashAlgorithm::Sha1,
        cipher: CipherAlgorithm::TripleDes,
        iterations: 2000,
        salt: hex::decode("0A58CF64530D823F").expect("salt hex"),
    };
    insta::assert_json_snapshot!(params, @r#"
    {
      "scheme": "pkcs12",
      "hash": "sha1",
      "cipher": "3des",
      "iterations": 2000,
      "salt": "0a58cf64530d823f"
    }
    "#);
}

#[test]
fn corrupt_records_are_rejected() {
    let bad_salt = r#"{"scheme":"pbe","hash":"md5","cipher":"des","iterations":1,"salt":"0g"}"#;
    assert!(serde_json::from_str::<DerivationParams>(bad_salt).is_err());

    let unknown_cipher = r#"{"scheme":"pbe","hash":"md5","cipher":"rot13","iterations":1,"salt":""}"#;
    assert!(serde_json::from_str::<DerivationParams>(unknown_cipher).is_err());

    let zero_rounds = r#"{"scheme":"pbe","hash":"md5","cipher":"des","iterations":0,"salt":""}"#;
    let params: DerivationParams = serde_json::from_str(zero_rounds).expect("shape is valid");
    assert!(matches!(params.validate(), Err(CryptoError::InvalidParameters(_))));
}

/// A derived key travels over the agent protocol as hex and lands back in
/// secure memory.
#[test]
fn derived_key_over_hex_channel() {
    let params = DerivationParams {
        scheme: DerivationScheme::Pbkdf2,
        hash: HashAlgorithm::Sha256,
        cipher: CipherAlgorithm::Aes256,
        iterations: 1,
        salt: b"salt".to_vec(),
    };
    let derived = params
        .derive(&password("password"), true, false)
        .expect("derive should succeed");
    let key = derived.key.expect("key requested");

    let line = hex::encode(key.expose());
    assert_eq!(
        line,
        "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
    );
    let received = hex::decode_secret(&line).expect("decode should succeed");
    assert_eq!(received.expose(), key.expose());
    assert!(keyring_crypto_core::is_secure(received.expose().as_ptr()));
}
