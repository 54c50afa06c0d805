//! Asymmetric key expressions.
//!
//! This module provides:
//! - [`parse`] / [`extract_component`]: raw navigation over a [`Sexp`]
//!   key tree (`(private-key (rsa (n ..) (e ..) ..))`)
//! - [`KeyExpression`]: the typed form, one variant per root tag, with
//!   per-algorithm component sets
//! - [`identifier_of`]: the stable 20-byte keygrip used to index keys
//! - [`derive_public`]: strip a private key down to its public half
//!
//! Numeric components are held in [`Mpi`], which zeroizes on drop, so a
//! private exponent never outlives the key that owns it.

use crate::error::CryptoError;
use crate::hex;
use crate::sexp::Sexp;
use ring::digest;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Keygrip length in bytes (one SHA-1 digest).
pub const KEY_IDENTIFIER_LEN: usize = 20;

const PUBLIC_KEY_TAG: &str = "public-key";
const PRIVATE_KEY_TAG: &str = "private-key";

// ---------------------------------------------------------------------------
// Multi-precision integers
// ---------------------------------------------------------------------------

/// Unsigned big-endian integer as it is stored in a key expression.
///
/// The stored atom is kept byte for byte, because the keygrip hashes it.
/// Equality compares values, so `00 80` and `80` are the same integer
/// even though their keygrips differ. Zero is the empty magnitude.
#[derive(Clone)]
pub struct Mpi(Zeroizing<Vec<u8>>);

impl Mpi {
    /// Integer from big-endian bytes, stored in two's-complement form.
    #[must_use]
    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        let magnitude = &bytes[start..];
        let mut atom = Zeroizing::new(Vec::with_capacity(magnitude.len().saturating_add(1)));
        if magnitude.first().is_some_and(|&b| b & 0x80 != 0) {
            atom.push(0);
        }
        atom.extend_from_slice(magnitude);
        Self(atom)
    }

    /// Integer read from a key atom, keeping its exact encoding.
    #[must_use]
    pub fn from_atom(atom: &[u8]) -> Self {
        Self(Zeroizing::new(atom.to_vec()))
    }

    /// Bytes as stored in the expression.
    #[must_use]
    pub fn as_atom(&self) -> &[u8] {
        &self.0
    }

    /// Minimal big-endian magnitude.
    #[must_use]
    pub fn to_be_bytes(&self) -> &[u8] {
        let start = self.0.iter().position(|&b| b != 0).unwrap_or(self.0.len());
        &self.0[start..]
    }

    /// Two's-complement form: the magnitude, with a `0x00` prefix when its
    /// top bit is set so it cannot read as negative.
    #[must_use]
    pub fn to_signed_bytes(&self) -> Zeroizing<Vec<u8>> {
        let magnitude = self.to_be_bytes();
        let mut out = Zeroizing::new(Vec::with_capacity(magnitude.len().saturating_add(1)));
        if magnitude.first().is_some_and(|&b| b & 0x80 != 0) {
            out.push(0);
        }
        out.extend_from_slice(magnitude);
        out
    }

    /// Bit length; zero for zero.
    #[must_use]
    pub fn bits(&self) -> usize {
        let magnitude = self.to_be_bytes();
        match magnitude.first() {
            None => 0,
            Some(&top) => {
                let top_bits = 8usize.saturating_sub(top.leading_zeros() as usize);
                magnitude
                    .len()
                    .saturating_sub(1)
                    .saturating_mul(8)
                    .saturating_add(top_bits)
            }
        }
    }

    /// `true` for the value zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.to_be_bytes().is_empty()
    }
}

impl PartialEq for Mpi {
    fn eq(&self, other: &Self) -> bool {
        self.to_be_bytes() == other.to_be_bytes()
    }
}

impl Eq for Mpi {}

impl From<u64> for Mpi {
    fn from(value: u64) -> Self {
        Self::from_be_bytes(&value.to_be_bytes())
    }
}

impl fmt::Debug for Mpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mpi({} bits)", self.bits())
    }
}

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// Public-key algorithms a key expression may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    /// RSA.
    Rsa,
    /// DSA.
    Dsa,
    /// Elgamal.
    #[serde(rename = "elg")]
    Elgamal,
}

impl KeyAlgorithm {
    /// Canonical expression tag.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Dsa => "dsa",
            Self::Elgamal => "elg",
        }
    }

    /// Look up an algorithm tag, case-insensitively, including the
    /// OpenPGP-flavoured aliases found in older key files.
    #[must_use]
    pub fn from_name(name: &[u8]) -> Option<Self> {
        const ALIASES: [(&str, KeyAlgorithm); 7] = [
            ("rsa", KeyAlgorithm::Rsa),
            ("openpgp-rsa", KeyAlgorithm::Rsa),
            ("dsa", KeyAlgorithm::Dsa),
            ("openpgp-dsa", KeyAlgorithm::Dsa),
            ("elg", KeyAlgorithm::Elgamal),
            ("elg-e", KeyAlgorithm::Elgamal),
            ("openpgp-elg", KeyAlgorithm::Elgamal),
        ];
        ALIASES
            .iter()
            .find(|(alias, _)| alias.as_bytes().eq_ignore_ascii_case(name))
            .map(|&(_, algorithm)| algorithm)
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Raw navigation
// ---------------------------------------------------------------------------

/// Result of [`parse`]: what kind of key a tree holds, and where its
/// numbers live.
#[derive(Debug)]
pub struct ParsedKey<'a> {
    /// Recognized algorithm.
    pub algorithm: KeyAlgorithm,
    /// Root tag was `private-key`.
    pub is_private: bool,
    /// The algorithm sub-list, e.g. `(rsa (n ..) (e ..))`.
    pub numbers: &'a Sexp,
}

/// Classify a key tree.
///
/// # Errors
///
/// Returns `CryptoError::MalformedExpression` when the root tag is neither
/// `public-key` nor `private-key`, the second element is not a list, or
/// its tag names no known algorithm.
pub fn parse(expr: &Sexp) -> Result<ParsedKey<'_>, CryptoError> {
    let is_private = match expr.name() {
        Some(tag) if tag == PRIVATE_KEY_TAG.as_bytes() => true,
        Some(tag) if tag == PUBLIC_KEY_TAG.as_bytes() => false,
        _ => {
            return Err(CryptoError::MalformedExpression(
                "root is neither public-key nor private-key".into(),
            ))
        }
    };

    let numbers = match expr.nth(1) {
        Some(list @ Sexp::List(_)) => list,
        _ => {
            return Err(CryptoError::MalformedExpression(
                "missing algorithm list".into(),
            ))
        }
    };

    let tag = numbers
        .name()
        .ok_or_else(|| CryptoError::MalformedExpression("algorithm list has no tag".into()))?;
    let algorithm = KeyAlgorithm::from_name(tag).ok_or_else(|| {
        CryptoError::MalformedExpression(format!(
            "unknown algorithm {}",
            String::from_utf8_lossy(tag)
        ))
    })?;

    Ok(ParsedKey {
        algorithm,
        is_private,
        numbers,
    })
}

/// Read the integer stored after the tag of the list reached by `path`.
///
/// `None` if any path segment is missing or the value is not an atom.
#[must_use]
pub fn extract_component(expr: &Sexp, path: &[&str]) -> Option<Mpi> {
    expr.child(path)?.nth_data(1).map(Mpi::from_atom)
}

fn require(numbers: &Sexp, name: &str) -> Result<Mpi, CryptoError> {
    extract_component(numbers, &[name]).ok_or_else(|| CryptoError::MissingComponent(name.into()))
}

fn optional(numbers: &Sexp, name: &str) -> Option<Mpi> {
    extract_component(numbers, &[name])
}

// ---------------------------------------------------------------------------
// Typed keys
// ---------------------------------------------------------------------------

/// RSA components. The private ones are `None` in a public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsaKey {
    /// Modulus.
    pub n: Mpi,
    /// Public exponent.
    pub e: Mpi,
    /// Private exponent.
    pub d: Option<Mpi>,
    /// First prime.
    pub p: Option<Mpi>,
    /// Second prime.
    pub q: Option<Mpi>,
    /// `p^-1 mod q`.
    pub u: Option<Mpi>,
}

/// DSA components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DsaKey {
    /// Prime modulus.
    pub p: Mpi,
    /// Subgroup order.
    pub q: Mpi,
    /// Generator.
    pub g: Mpi,
    /// Public value.
    pub y: Mpi,
    /// Secret exponent.
    pub x: Option<Mpi>,
}

/// Elgamal components.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElgamalKey {
    /// Prime modulus.
    pub p: Mpi,
    /// Generator.
    pub g: Mpi,
    /// Public value.
    pub y: Mpi,
    /// Secret exponent.
    pub x: Option<Mpi>,
}

/// Per-algorithm component set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AlgorithmKey {
    /// RSA.
    Rsa(RsaKey),
    /// DSA.
    Dsa(DsaKey),
    /// Elgamal.
    Elgamal(ElgamalKey),
}

impl AlgorithmKey {
    /// Algorithm of this component set.
    #[must_use]
    pub const fn algorithm(&self) -> KeyAlgorithm {
        match self {
            Self::Rsa(_) => KeyAlgorithm::Rsa,
            Self::Dsa(_) => KeyAlgorithm::Dsa,
            Self::Elgamal(_) => KeyAlgorithm::Elgamal,
        }
    }

    fn read(algorithm: KeyAlgorithm, numbers: &Sexp, private: bool) -> Result<Self, CryptoError> {
        let secret = |name: &str| {
            if private {
                require(numbers, name).map(Some)
            } else {
                Ok(None)
            }
        };
        let extra = |name: &str| if private { optional(numbers, name) } else { None };

        Ok(match algorithm {
            KeyAlgorithm::Rsa => Self::Rsa(RsaKey {
                n: require(numbers, "n")?,
                e: require(numbers, "e")?,
                d: secret("d")?,
                p: extra("p"),
                q: extra("q"),
                u: extra("u"),
            }),
            KeyAlgorithm::Dsa => Self::Dsa(DsaKey {
                p: require(numbers, "p")?,
                q: require(numbers, "q")?,
                g: require(numbers, "g")?,
                y: require(numbers, "y")?,
                x: secret("x")?,
            }),
            KeyAlgorithm::Elgamal => Self::Elgamal(ElgamalKey {
                p: require(numbers, "p")?,
                g: require(numbers, "g")?,
                y: require(numbers, "y")?,
                x: secret("x")?,
            }),
        })
    }

    /// `(tag (name value) ..)`, secret components included only when
    /// `private` is set.
    fn write(&self, private: bool) -> Sexp {
        let mut items = vec![Sexp::atom(self.algorithm().name())];
        let mut push = |name: &str, value: Option<&Mpi>| {
            if let Some(value) = value {
                items.push(Sexp::pair(name, value.as_atom()));
            }
        };
        match self {
            Self::Rsa(k) => {
                push("n", Some(&k.n));
                push("e", Some(&k.e));
                push("d", k.d.as_ref().filter(|_| private));
                push("p", k.p.as_ref().filter(|_| private));
                push("q", k.q.as_ref().filter(|_| private));
                push("u", k.u.as_ref().filter(|_| private));
            }
            Self::Dsa(k) => {
                push("p", Some(&k.p));
                push("q", Some(&k.q));
                push("g", Some(&k.g));
                push("y", Some(&k.y));
                push("x", k.x.as_ref().filter(|_| private));
            }
            Self::Elgamal(k) => {
                push("p", Some(&k.p));
                push("g", Some(&k.g));
                push("y", Some(&k.y));
                push("x", k.x.as_ref().filter(|_| private));
            }
        }
        Sexp::list(items)
    }

    /// Same key with every secret component dropped.
    fn public_half(&self) -> Self {
        match self {
            Self::Rsa(k) => Self::Rsa(RsaKey {
                n: k.n.clone(),
                e: k.e.clone(),
                d: None,
                p: None,
                q: None,
                u: None,
            }),
            Self::Dsa(k) => Self::Dsa(DsaKey {
                p: k.p.clone(),
                q: k.q.clone(),
                g: k.g.clone(),
                y: k.y.clone(),
                x: None,
            }),
            Self::Elgamal(k) => Self::Elgamal(ElgamalKey {
                p: k.p.clone(),
                g: k.g.clone(),
                y: k.y.clone(),
                x: None,
            }),
        }
    }
}

/// A validated key tree.
///
/// A `Public` key never carries secret components: [`KeyExpression::from_sexp`]
/// drops them and [`KeyExpression::to_sexp`] never writes them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyExpression {
    /// `(public-key ...)`.
    Public(AlgorithmKey),
    /// `(private-key ...)`.
    Private(AlgorithmKey),
}

impl KeyExpression {
    /// Validate a raw tree into a typed key.
    ///
    /// # Errors
    ///
    /// - `CryptoError::MalformedExpression` if [`parse`] rejects the tree
    /// - `CryptoError::MissingComponent` naming the first absent component
    ///   the algorithm needs (`d` / `x` for private keys)
    pub fn from_sexp(expr: &Sexp) -> Result<Self, CryptoError> {
        let parsed = parse(expr)?;
        let key = AlgorithmKey::read(parsed.algorithm, parsed.numbers, parsed.is_private)?;
        Ok(if parsed.is_private {
            Self::Private(key)
        } else {
            Self::Public(key)
        })
    }

    /// Parse a canonical-encoded key.
    ///
    /// # Errors
    ///
    /// Any error of [`Sexp::parse_canonical`] or [`KeyExpression::from_sexp`].
    pub fn from_canonical(input: &[u8]) -> Result<Self, CryptoError> {
        Self::from_sexp(&Sexp::parse_canonical(input)?)
    }

    /// Raw tree form, integers in two's-complement encoding.
    #[must_use]
    pub fn to_sexp(&self) -> Sexp {
        let (tag, key, private) = match self {
            Self::Public(key) => (PUBLIC_KEY_TAG, key, false),
            Self::Private(key) => (PRIVATE_KEY_TAG, key, true),
        };
        Sexp::list(vec![Sexp::atom(tag), key.write(private)])
    }

    /// `true` for `private-key` roots.
    #[must_use]
    pub const fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }

    /// Component set regardless of visibility.
    #[must_use]
    pub const fn key(&self) -> &AlgorithmKey {
        match self {
            Self::Public(key) | Self::Private(key) => key,
        }
    }

    /// Algorithm of the key.
    #[must_use]
    pub const fn algorithm(&self) -> KeyAlgorithm {
        self.key().algorithm()
    }

    /// Keygrip. See [`identifier_of`].
    #[must_use]
    pub fn identifier(&self) -> KeyIdentifier {
        identifier_of(self)
    }

    /// The public counterpart of this key.
    ///
    /// A public key yields a copy of itself.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::UnsupportedAlgorithm` for Elgamal, whose
    /// public half this store does not track.
    pub fn to_public(&self) -> Result<Self, CryptoError> {
        match self.algorithm() {
            KeyAlgorithm::Rsa | KeyAlgorithm::Dsa => Ok(Self::Public(self.key().public_half())),
            KeyAlgorithm::Elgamal => Err(CryptoError::UnsupportedAlgorithm(
                KeyAlgorithm::Elgamal.name().into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Key identifiers
// ---------------------------------------------------------------------------

/// 20-byte keygrip: SHA-1 over the public parameters.
///
/// Public and private forms of one key share an identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyIdentifier([u8; KEY_IDENTIFIER_LEN]);

impl KeyIdentifier {
    /// Wrap raw keygrip bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw keygrip bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_IDENTIFIER_LEN] {
        &self.0
    }
}

impl fmt::Display for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl fmt::Debug for KeyIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyIdentifier({self})")
    }
}

impl FromStr for KeyIdentifier {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let grip = <[u8; KEY_IDENTIFIER_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
            CryptoError::InvalidParameters(format!(
                "key identifier must be {KEY_IDENTIFIER_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(grip))
    }
}

impl Serialize for KeyIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyIdentifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// Compute the keygrip of `key`.
///
/// - RSA: SHA-1 of the modulus `n`
/// - DSA: SHA-1 over `(1:p<len>:<p>)(1:q..)(1:g..)(1:y..)`
/// - Elgamal: the same layout over `p`, `g`, `y`
///
/// Each parameter is hashed exactly as it was stored, sign byte or not, so
/// grips agree with gpg-agent for the same key file. Only public
/// parameters are hashed.
#[must_use]
pub fn identifier_of(key: &KeyExpression) -> KeyIdentifier {
    let mut ctx = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);
    match key.key() {
        AlgorithmKey::Rsa(k) => ctx.update(k.n.as_atom()),
        AlgorithmKey::Dsa(k) => {
            for (name, value) in [("p", &k.p), ("q", &k.q), ("g", &k.g), ("y", &k.y)] {
                grip_component(&mut ctx, name, value);
            }
        }
        AlgorithmKey::Elgamal(k) => {
            for (name, value) in [("p", &k.p), ("g", &k.g), ("y", &k.y)] {
                grip_component(&mut ctx, name, value);
            }
        }
    }
    let mut grip = [0u8; KEY_IDENTIFIER_LEN];
    grip.copy_from_slice(ctx.finish().as_ref());
    KeyIdentifier(grip)
}

fn grip_component(ctx: &mut digest::Context, name: &str, value: &Mpi) {
    let data = value.as_atom();
    ctx.update(format!("(1:{name}{}:", data.len()).as_bytes());
    ctx.update(data);
    ctx.update(b")");
}

/// Build the public key matching the private key tree `private_key`.
///
/// Reads the public components straight from the tree; the private ones
/// need not be present.
///
/// # Errors
///
/// - `CryptoError::MalformedExpression` if [`parse`] rejects the tree
/// - `CryptoError::MissingComponent` naming the first absent public
///   component
/// - `CryptoError::UnsupportedAlgorithm` for anything but RSA and DSA
pub fn derive_public(private_key: &Sexp) -> Result<KeyExpression, CryptoError> {
    let parsed = parse(private_key)?;
    match parsed.algorithm {
        KeyAlgorithm::Rsa | KeyAlgorithm::Dsa => {
            AlgorithmKey::read(parsed.algorithm, parsed.numbers, false).map(KeyExpression::Public)
        }
        KeyAlgorithm::Elgamal => {
            tracing::debug!(algorithm = %parsed.algorithm, "no public derivation for algorithm");
            Err(CryptoError::UnsupportedAlgorithm(parsed.algorithm.name().into()))
        }
    }
}
