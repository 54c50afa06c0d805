//! Structured key trees exchanged with key stores.
//!
//! Keys arrive from storage and token backends as symbolic expressions:
//! `(private-key (rsa (n #00C3..#) (e #010001#) ...))`. [`Sexp`] is the
//! raw tree, with the canonical wire codec (`(`, `)`, `<len>:<bytes>`) and
//! the name-path navigation the key model builds on.
//!
//! Atom bytes may be private key material, so they are zeroized on drop
//! and never shown by `Debug`.

use crate::error::CryptoError;
use crate::hex;
use std::fmt;
use zeroize::Zeroizing;

/// Nesting limit when parsing untrusted input.
const MAX_DEPTH: usize = 32;

/// A symbolic expression: an octet-string atom or a list.
#[derive(Clone, PartialEq, Eq)]
pub enum Sexp {
    /// Octet string.
    Atom(Zeroizing<Vec<u8>>),
    /// Ordered children.
    List(Vec<Sexp>),
}

impl Sexp {
    /// Atom holding a copy of `data`.
    #[must_use]
    pub fn atom(data: impl AsRef<[u8]>) -> Self {
        Self::Atom(Zeroizing::new(data.as_ref().to_vec()))
    }

    /// List of `items`.
    #[must_use]
    pub const fn list(items: Vec<Self>) -> Self {
        Self::List(items)
    }

    /// `(name value)`.
    #[must_use]
    pub fn pair(name: &str, value: impl AsRef<[u8]>) -> Self {
        Self::List(vec![Self::atom(name), Self::atom(value)])
    }

    /// Element `index` of a list; `None` for atoms and out-of-range.
    #[must_use]
    pub fn nth(&self, index: usize) -> Option<&Self> {
        match self {
            Self::List(items) => items.get(index),
            Self::Atom(_) => None,
        }
    }

    /// Bytes of element `index` if it is an atom.
    #[must_use]
    pub fn nth_data(&self, index: usize) -> Option<&[u8]> {
        match self.nth(index)? {
            Self::Atom(data) => Some(data.as_slice()),
            Self::List(_) => None,
        }
    }

    /// The leading atom of a list, its tag.
    #[must_use]
    pub fn name(&self) -> Option<&[u8]> {
        self.nth_data(0)
    }

    /// Depth-first search for a list tagged `token`, starting with `self`.
    #[must_use]
    pub fn find_token(&self, token: &str) -> Option<&Self> {
        let Self::List(items) = self else {
            return None;
        };
        if self.name() == Some(token.as_bytes()) {
            return Some(self);
        }
        items.iter().find_map(|item| item.find_token(token))
    }

    /// Follow `path` one [`find_token`](Self::find_token) at a time.
    ///
    /// Each segment is searched for under the result of the previous one;
    /// the first miss ends the walk with `None`.
    #[must_use]
    pub fn child(&self, path: &[&str]) -> Option<&Self> {
        path.iter()
            .try_fold(self, |at, segment| at.find_token(segment))
    }

    // -----------------------------------------------------------------------
    // Canonical encoding
    // -----------------------------------------------------------------------

    /// Parse a canonical S-expression occupying all of `input`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::MalformedExpression` on truncated input,
    /// trailing bytes, bad length prefixes or excessive nesting.
    pub fn parse_canonical(input: &[u8]) -> Result<Self, CryptoError> {
        let mut parser = Parser { input, pos: 0 };
        let sexp = parser.element(0)?;
        if parser.pos != input.len() {
            return Err(malformed(format!("trailing data at offset {}", parser.pos)));
        }
        Ok(sexp)
    }

    /// Serialize to canonical form.
    #[must_use]
    pub fn to_canonical(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::new());
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut Vec<u8>) {
        match self {
            Self::Atom(data) => {
                out.extend_from_slice(data.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(data);
            }
            Self::List(items) => {
                out.push(b'(');
                for item in items {
                    item.write_canonical(out);
                }
                out.push(b')');
            }
        }
    }

    // -----------------------------------------------------------------------
    // Advanced (human readable) form
    // -----------------------------------------------------------------------

    /// Indented human-readable rendering for diagnostics.
    ///
    /// Token atoms print bare, every other atom as `#HEX#`. This prints
    /// values, so it must never be fed a private key in production logs.
    #[must_use]
    pub fn to_advanced(&self) -> String {
        let mut out = String::new();
        self.write_advanced(&mut out, 0);
        out
    }

    fn write_advanced(&self, out: &mut String, depth: usize) {
        match self {
            Self::Atom(data) => {
                if is_token(data) {
                    out.push_str(&String::from_utf8_lossy(data));
                } else {
                    out.push('#');
                    out.push_str(&hex::encode(data).to_ascii_uppercase());
                    out.push('#');
                }
            }
            Self::List(items) => {
                out.push('(');
                let inner = depth.saturating_add(1);
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Self::List(_) => {
                            out.push('\n');
                            out.push_str(&"  ".repeat(inner));
                        }
                        Self::Atom(_) if i > 0 => out.push(' '),
                        Self::Atom(_) => {}
                    }
                    item.write_advanced(out, inner);
                }
                out.push(')');
            }
        }
    }

    fn fmt_structure(&self, f: &mut fmt::Formatter<'_>, is_tag: bool) -> fmt::Result {
        match self {
            Self::Atom(data) if is_tag && is_token(data) => {
                f.write_str(&String::from_utf8_lossy(data))
            }
            Self::Atom(data) => write!(f, "<{} bytes>", data.len()),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    item.fmt_structure(f, i == 0)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Debug for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_structure(f, false)
    }
}

/// Printable without quoting: a letter or one of `-./_:*+=` first, then
/// letters, digits or the same punctuation.
fn is_token(data: &[u8]) -> bool {
    const PUNCT: &[u8] = b"-./_:*+=";
    match data.split_first() {
        Some((first, rest)) => {
            (first.is_ascii_alphabetic() || PUNCT.contains(first))
                && rest
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || PUNCT.contains(b))
        }
        None => false,
    }
}

fn malformed(msg: String) -> CryptoError {
    CryptoError::MalformedExpression(msg)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos = self.pos.saturating_add(1);
    }

    fn element(&mut self, depth: usize) -> Result<Sexp, CryptoError> {
        match self.peek() {
            Some(b'(') => {
                if depth >= MAX_DEPTH {
                    return Err(malformed(format!("nesting deeper than {MAX_DEPTH}")));
                }
                self.bump();
                let mut items = Vec::new();
                loop {
                    match self.peek() {
                        Some(b')') => {
                            self.bump();
                            return Ok(Sexp::List(items));
                        }
                        Some(_) => items.push(self.element(depth.saturating_add(1))?),
                        None => return Err(malformed("unterminated list".into())),
                    }
                }
            }
            Some(b'0'..=b'9') => self.atom(),
            Some(other) => Err(malformed(format!(
                "unexpected byte 0x{other:02x} at offset {}",
                self.pos
            ))),
            None => Err(malformed("unexpected end of input".into())),
        }
    }

    fn atom(&mut self) -> Result<Sexp, CryptoError> {
        let mut len = 0usize;
        loop {
            match self.peek() {
                Some(d @ b'0'..=b'9') => {
                    len = len
                        .checked_mul(10)
                        .and_then(|l| l.checked_add(usize::from(d.wrapping_sub(b'0'))))
                        .ok_or_else(|| malformed("atom length overflow".into()))?;
                    self.bump();
                }
                Some(b':') => {
                    self.bump();
                    break;
                }
                _ => return Err(malformed(format!("bad length prefix at offset {}", self.pos))),
            }
        }
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| malformed(format!("atom of {len} bytes runs past end of input")))?;
        let atom = Sexp::atom(&self.input[self.pos..end]);
        self.pos = end;
        Ok(atom)
    }
}
