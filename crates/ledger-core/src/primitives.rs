//! Atomic primitive cells: `Bool`, `Long`, `Char` are represented directly
//! by their Rust equivalents inside [`Cell`](crate::cell::Cell); `Keyword`
//! and `Symbol` need a small amount of their own state (a short name) and
//! live here.

use std::fmt;
use std::sync::Arc;

use crate::encoding::{tag, Encode};
use crate::error::CoreError;
use crate::limits::MAX_NAME_LEN;

/// Maps a signed `Long` onto the unsigned domain the VLC codec speaks, so a
/// negative value still gets a compact, canonical encoding.
#[must_use]
pub fn zigzag_encode(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[must_use]
pub fn zigzag_decode(v: u64) -> i64 {
    #[allow(clippy::cast_possible_wrap)]
    let unsigned_half = (v >> 1) as i64;
    unsigned_half ^ -((v & 1) as i64)
}

/// A short interned-style name, shared by [`Keyword`] and [`Symbol`].
///
/// Encoded as a one-byte length followed by UTF-8 bytes (`spec.md` §2 lists
/// keywords and symbols as primitives without detailing wire shape; this
/// crate fixes one-byte-length-prefixed UTF-8, capped at
/// [`MAX_NAME_LEN`] bytes so the name always embeds).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name(Arc<str>);

impl Name {
    fn new(s: &str) -> Result<Self, CoreError> {
        if s.len() > MAX_NAME_LEN {
            return Err(CoreError::InvalidData(format!(
                "name {s:?} exceeds {MAX_NAME_LEN} bytes"
            )));
        }
        Ok(Self(Arc::from(s)))
    }

    /// Borrow the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn encode_raw(&self, out: &mut Vec<u8>) {
        let bytes = self.0.as_bytes();
        #[allow(clippy::cast_possible_truncation)]
        out.push(bytes.len() as u8);
        out.extend_from_slice(bytes);
    }

    fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, CoreError> {
        let start = *pos;
        let Some(&len) = bytes.get(*pos) else {
            return Err(CoreError::bad_format(start, "truncated name length"));
        };
        *pos += 1;
        let len = len as usize;
        if len > MAX_NAME_LEN {
            return Err(CoreError::bad_format(start, "name length exceeds limit"));
        }
        let Some(slice) = bytes.get(*pos..*pos + len) else {
            return Err(CoreError::bad_format(start, "truncated name bytes"));
        };
        *pos += len;
        let s = std::str::from_utf8(slice)
            .map_err(|_| CoreError::bad_format(start, "name is not valid UTF-8"))?;
        Self::new(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A keyword: a short, self-evaluating name, conventionally used for map
/// keys and record field names.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Keyword(Name);

impl Keyword {
    /// Construct a keyword from a name.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidData`] if `name` exceeds [`MAX_NAME_LEN`] bytes.
    pub fn new(name: &str) -> Result<Self, CoreError> {
        Ok(Self(Name::new(name)?))
    }

    /// Borrow the keyword's name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub(crate) fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, CoreError> {
        Ok(Self(Name::read(bytes, pos)?))
    }
}

impl Encode for Keyword {
    fn encode_raw(&self, out: &mut Vec<u8>) {
        self.0.encode_raw(out);
    }

    fn tag(&self) -> u8 {
        tag::KEYWORD
    }

    fn estimated_encoding_size(&self) -> usize {
        2 + self.0.as_str().len()
    }
}

/// A symbol: a short name that, unlike a [`Keyword`], is never equal to a
/// symbol or keyword of a different kind even with identical bytes (the
/// tag byte alone distinguishes them).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Name);

impl Symbol {
    /// Construct a symbol from a name.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidData`] if `name` exceeds [`MAX_NAME_LEN`] bytes.
    pub fn new(name: &str) -> Result<Self, CoreError> {
        Ok(Self(Name::new(name)?))
    }

    /// Borrow the symbol's name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub(crate) fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, CoreError> {
        Ok(Self(Name::read(bytes, pos)?))
    }
}

impl Encode for Symbol {
    fn encode_raw(&self, out: &mut Vec<u8>) {
        self.0.encode_raw(out);
    }

    fn tag(&self) -> u8 {
        tag::SYMBOL
    }

    fn estimated_encoding_size(&self) -> usize {
        2 + self.0.as_str().len()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn zigzag_round_trip() {
        for v in [0i64, 1, -1, 63, -64, i64::MAX, i64::MIN, 12345, -98765] {
            assert_eq!(zigzag_decode(zigzag_encode(v)), v);
        }
    }

    #[test]
    fn keyword_rejects_overlong_name() {
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(Keyword::new(&long).is_err());
    }

    #[test]
    fn keyword_and_symbol_round_trip_name() {
        let kw = Keyword::new("balance").unwrap();
        let mut buf = Vec::new();
        kw.encode_raw(&mut buf);
        let mut pos = 0;
        let back = Keyword::read(&buf, &mut pos).unwrap();
        assert_eq!(kw, back);
    }
}
