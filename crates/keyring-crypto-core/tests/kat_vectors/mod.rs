mod pkcs12;

use keyring_crypto_core::hex;
use keyring_crypto_core::kdf::{DerivationRequest, DerivedKeyMaterial};
use keyring_crypto_core::registry::{CipherAlgorithm, HashAlgorithm};

pub fn request<'a>(
    password: &'a [u8],
    salt: &'a [u8],
    iterations: u32,
    hash: HashAlgorithm,
    cipher: CipherAlgorithm,
) -> DerivationRequest<'a> {
    DerivationRequest {
        password,
        salt,
        iterations,
        hash,
        cipher,
    }
}

pub fn key_hex(material: &DerivedKeyMaterial) -> String {
    hex::encode(material.key.as_ref().expect("key requested").expose())
}

pub fn iv_hex(material: &DerivedKeyMaterial) -> String {
    hex::encode(material.iv.as_ref().expect("iv requested"))
}
