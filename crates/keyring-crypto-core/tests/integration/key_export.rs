//! A private key read from its canonical file form is indexed by keygrip
//! and exported as a public key.

use keyring_crypto_core::hex;
use keyring_crypto_core::keys::{
    derive_public, identifier_of, parse, KeyAlgorithm, KeyExpression, KeyIdentifier,
};
use keyring_crypto_core::sexp::Sexp;
use keyring_crypto_core::CryptoError;

/// `(private-key (rsa (n ..) (e ..) (d ..) (p ..) (q ..) (u ..)))`, tiny
/// numbers but a real layout.
fn stored_rsa_key() -> Vec<u8> {
    let mut wire = Vec::new();
    wire.extend_from_slice(b"(11:private-key(3:rsa");
    for (name, value) in [
        ("n", &[0x00, 0xb5, 0x3a, 0x91, 0xc7][..]),
        ("e", &[0x01, 0x00, 0x01][..]),
        ("d", &[0x25, 0x11][..]),
        ("p", &[0x3d][..]),
        ("q", &[0x43][..]),
        ("u", &[0x17][..]),
    ] {
        wire.extend_from_slice(format!("(1:{name}{}:", value.len()).as_bytes());
        wire.extend_from_slice(value);
        wire.push(b')');
    }
    wire.extend_from_slice(b"))");
    wire
}

fn sha1_hex(data: &[u8]) -> String {
    hex::encode(ring::digest::digest(&ring::digest::SHA1_FOR_LEGACY_USE_ONLY, data).as_ref())
}

#[test]
fn stored_key_to_public_export() {
    let tree = Sexp::parse_canonical(&stored_rsa_key()).expect("parse should succeed");
    let parsed = parse(&tree).expect("key should be recognized");
    assert_eq!(parsed.algorithm, KeyAlgorithm::Rsa);
    assert!(parsed.is_private);

    let private = KeyExpression::from_sexp(&tree).expect("from_sexp should succeed");
    let public = derive_public(&tree).expect("derive should succeed");

    let grip = identifier_of(&private);
    assert_eq!(grip, identifier_of(&public));
    assert_eq!(grip.to_string(), sha1_hex(&[0x00, 0xb5, 0x3a, 0x91, 0xc7]));

    insta::assert_snapshot!(public.to_sexp().to_advanced(), @r"
    (public-key
      (rsa
        (n #00B53A91C7#)
        (e #010001#)))
    ");

    let exported = public.to_sexp().to_canonical();
    let mut expected = b"(10:public-key(3:rsa(1:n5:".to_vec();
    expected.extend_from_slice(&[0x00, 0xb5, 0x3a, 0x91, 0xc7]);
    expected.extend_from_slice(b")(1:e3:\x01\x00\x01)))");
    assert_eq!(exported.as_slice(), expected.as_slice());
}

#[test]
fn private_key_survives_storage_roundtrip() {
    let wire = stored_rsa_key();
    let key = KeyExpression::from_canonical(&wire).expect("from_canonical should succeed");
    assert_eq!(key.to_sexp().to_canonical().as_slice(), wire.as_slice());
}

#[test]
fn identifiers_index_by_text() {
    let key = KeyExpression::from_canonical(&stored_rsa_key()).expect("from_canonical should succeed");
    let grip = key.identifier();
    let json = serde_json::to_string(&grip).expect("serialize should succeed");
    let back: KeyIdentifier = serde_json::from_str(&json).expect("deserialize should succeed");
    assert_eq!(grip, back);
    assert_eq!(grip.to_string().parse::<KeyIdentifier>(), Ok(grip));
}

#[test]
fn truncated_key_file_is_rejected() {
    let wire = stored_rsa_key();
    let truncated = &wire[..wire.len() - 3];
    assert!(matches!(
        KeyExpression::from_canonical(truncated),
        Err(CryptoError::MalformedExpression(_))
    ));
}

#[test]
fn shadowed_key_is_not_a_key() {
    let tree = Sexp::list(vec![
        Sexp::atom("shadowed-private-key"),
        Sexp::list(vec![Sexp::atom("rsa"), Sexp::pair("n", b"\x01")]),
    ]);
    assert!(matches!(
        derive_public(&tree),
        Err(CryptoError::MalformedExpression(_))
    ));
}
