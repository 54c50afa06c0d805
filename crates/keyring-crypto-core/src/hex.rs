//! Lowercase hex codec for carrying bytes over text-only protocols.
//!
//! Decoding is lenient about case and whitespace (the agent line protocol
//! wraps long values) and strict about everything else.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use ::hex::FromHexError;

/// Encode `data` as lowercase hex, two digits per byte.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    ::hex::encode(data)
}

/// Decode hex text, skipping whitespace anywhere in the input.
///
/// # Errors
///
/// - `CryptoError::InvalidCharacter` on the first character that is
///   neither a hex digit nor whitespace
/// - `CryptoError::OddLength` if a trailing unpaired digit remains
pub fn decode(text: &str) -> Result<Vec<u8>, CryptoError> {
    let mut out = vec![0u8; text.len() / 2];
    let n = decode_into(text, &mut out)?;
    out.truncate(n);
    Ok(out)
}

/// Decode hex text straight into secure memory.
///
/// For secrets arriving over a text channel, so the decoded bytes never
/// sit in ordinary heap memory.
///
/// # Errors
///
/// Same as [`decode`], plus `CryptoError::SecureMemory` on allocation
/// failure.
pub fn decode_secret(text: &str) -> Result<SecretBuffer, CryptoError> {
    let mut out = SecretBuffer::zeroed(text.len() / 2)?;
    let n = decode_into(text, out.expose_mut())?;
    if n != out.len() {
        out.resize(n)?;
    }
    Ok(out)
}

/// Decode into `out`, returning the number of bytes written.
///
/// Whitespace is squeezed out into a secure staging buffer and the digit
/// pairs go to the `hex` crate. `out` must hold at least `text.len() / 2`
/// bytes.
fn decode_into(text: &str, out: &mut [u8]) -> Result<usize, CryptoError> {
    let mut digits = SecretBuffer::zeroed(text.len())?;
    let mut count = 0usize;
    for (offset, character) in text.char_indices() {
        if is_space(character) {
            continue;
        }
        let digit = u8::try_from(character)
            .ok()
            .filter(u8::is_ascii_hexdigit)
            .ok_or(CryptoError::InvalidCharacter { character, offset })?;
        digits.expose_mut()[count] = digit;
        count = count.saturating_add(1);
    }

    let written = count / 2;
    let slot = out.get_mut(..written).ok_or(CryptoError::OddLength)?;
    ::hex::decode_to_slice(&digits.expose()[..count], slot)?;
    Ok(written)
}

impl From<FromHexError> for CryptoError {
    fn from(err: FromHexError) -> Self {
        match err {
            FromHexError::InvalidHexCharacter { c, index } => Self::InvalidCharacter {
                character: c,
                offset: index,
            },
            FromHexError::OddLength | FromHexError::InvalidStringLength => Self::OddLength,
        }
    }
}

/// C `isspace` in the "C" locale.
const fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\u{0b}' | '\u{0c}' | '\r')
}

/// Serde adapter: byte vectors as hex strings.
///
/// ```ignore
/// #[serde(with = "keyring_crypto_core::hex::serde")]
/// salt: Vec<u8>,
/// ```
pub mod serde {
    use ::serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a lowercase hex string.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    /// Deserialize bytes from a hex string.
    ///
    /// # Errors
    ///
    /// Fails on strings [`super::decode`] rejects.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::decode(&text).map_err(D::Error::custom)
    }
}
