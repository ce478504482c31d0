//! Canonical binary encoding: the variable-length count codec, the tag
//! table, and the `Encode`/`Decode` traits every cell kind implements.
//!
//! See `spec.md` §6 for the wire grammar and §4.1 for the canonical-form
//! rules enforced by every `read`.

use crate::error::CoreError;
use crate::record::SchemaRegistry;

/// Tag byte assignments.
///
/// This table is the crate's public contract (`spec.md` §4.1: "the complete
/// tag table is part of the implementation's public contract"). Record
/// schemas beyond the first are assigned tags starting at
/// [`RECORD_SCHEMA_TAG_BASE`] by [`crate::record::SchemaRegistry`].
pub mod tag {
    /// `Bool(false)`.
    pub const BOOL_FALSE: u8 = 0x00;
    /// `Bool(true)`.
    pub const BOOL_TRUE: u8 = 0x01;
    /// `Long` (signed 64-bit integer).
    pub const LONG: u8 = 0x02;
    /// `Char` (Unicode scalar value).
    pub const CHAR: u8 = 0x03;
    /// `CString`, flat physical variant.
    pub const CSTRING_FLAT: u8 = 0x04;
    /// `CString`, chunked physical variant.
    pub const CSTRING_CHUNKED: u8 = 0x05;
    /// `Blob`, flat physical variant.
    pub const BLOB_FLAT: u8 = 0x06;
    /// `Blob`, chunked physical variant.
    pub const BLOB_CHUNKED: u8 = 0x07;
    /// `Keyword`.
    pub const KEYWORD: u8 = 0x08;
    /// `Symbol`.
    pub const SYMBOL: u8 = 0x09;
    /// `HashMap`, `MapLeaf` physical variant.
    pub const MAP_LEAF: u8 = 0x0A;
    /// `HashMap`, `MapTree` physical variant.
    pub const MAP_TREE: u8 = 0x0B;
    /// `HashSet`, `MapLeaf`-shaped physical variant (payload is the map's
    /// bare leaf payload, inner map tag omitted).
    pub const SET_LEAF: u8 = 0x0C;
    /// `Vector`.
    pub const VECTOR: u8 = 0x0D;
    /// Reserved base tag for records; real schema tags start at
    /// [`RECORD_SCHEMA_TAG_BASE`].
    pub const RECORD_RESERVED: u8 = 0x0E;
    /// `Address`.
    pub const ADDRESS: u8 = 0x0F;
    /// `HashSet`, `MapTree`-shaped physical variant (payload is the map's
    /// bare tree payload, inner map tag omitted).
    pub const SET_TREE: u8 = 0x10;
    /// Hash-reference to a non-embedded cell.
    pub const REF: u8 = 0xF0;

    /// First tag byte assignable to a record schema by
    /// [`crate::record::SchemaRegistry`].
    pub const RECORD_SCHEMA_TAG_BASE: u8 = 0x80;
}

/// Writes `value` as a canonical variable-length count.
///
/// Groups are emitted most-significant-group first, 7 data bits per byte,
/// high bit set on every byte but the last (`spec.md` §6). `Address(127)`
/// encodes as a single byte `0x7F`; `Address(128)` encodes as `0x81 0x00`.
pub fn write_vlc(out: &mut Vec<u8>, value: u64) {
    let mut groups = Vec::with_capacity(10);
    if value == 0 {
        groups.push(0u8);
    } else {
        let mut v = value;
        while v > 0 {
            groups.push((v & 0x7f) as u8);
            v >>= 7;
        }
        groups.reverse();
    }
    let last = groups.len() - 1;
    for (i, g) in groups.into_iter().enumerate() {
        if i < last {
            out.push(g | 0x80);
        } else {
            out.push(g);
        }
    }
}

/// Reads a canonical variable-length count, failing on truncation, on
/// overflow, or on a redundant leading zero byte.
pub fn read_vlc(bytes: &[u8], pos: &mut usize) -> Result<u64, CoreError> {
    let start = *pos;
    let mut result: u64 = 0;
    let mut groups_read = 0usize;
    loop {
        let Some(&b) = bytes.get(*pos) else {
            return Err(CoreError::bad_format(start, "truncated varint"));
        };
        *pos += 1;
        let data = u64::from(b & 0x7f);
        if groups_read == 0 && data == 0 && (b & 0x80) != 0 {
            return Err(CoreError::bad_format(
                start,
                "redundant leading zero byte in varint",
            ));
        }
        groups_read += 1;
        if groups_read > 10 {
            return Err(CoreError::bad_format(start, "varint exceeds 64 bits"));
        }
        // `checked_shl` only rejects a shift amount >= the bit width (never
        // true for a fixed shift of 7), so it can't detect that shifting
        // out the top bits of `result` loses data. `checked_mul` by the
        // same factor (2^7 = 128) does: it returns `None` exactly when the
        // multiplication would overflow.
        result = result
            .checked_mul(128)
            .and_then(|shifted| shifted.checked_add(data))
            .ok_or_else(|| CoreError::bad_format(start, "varint overflow"))?;
        if b & 0x80 == 0 {
            return Ok(result);
        }
    }
}

/// Reads the next tag byte, advancing `pos`.
pub fn read_tag(bytes: &[u8], pos: &mut usize) -> Result<u8, CoreError> {
    let Some(&tag) = bytes.get(*pos) else {
        return Err(CoreError::bad_format(*pos, "truncated: expected tag byte"));
    };
    *pos += 1;
    Ok(tag)
}

/// Implemented by every cell kind to produce its canonical encoding.
///
/// Encoding a well-formed in-memory cell never fails — there is no I/O and
/// no parse step — so, unlike [`Decode::read`], these methods are
/// infallible. Failure only enters the picture when bytes are parsed back.
pub trait Encode {
    /// Writes the tag byte followed by the raw payload.
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        self.encode_raw(out);
    }

    /// Writes the payload only, assuming the tag is known from context (as
    /// for a set's underlying map payload).
    fn encode_raw(&self, out: &mut Vec<u8>);

    /// The tag byte identifying this cell's kind.
    fn tag(&self) -> u8;

    /// An upper-bound estimate of the encoded size, used for buffer
    /// pre-sizing. Need not be exact.
    fn estimated_encoding_size(&self) -> usize;
}

/// Implemented by every cell kind to parse its canonical payload.
///
/// `read` assumes the tag byte has already been consumed by the caller and
/// fails with [`CoreError::BadFormat`] on any deviation from the canonical
/// form. `registry` resolves record schema tags encountered while decoding
/// a nested [`Ref`](crate::refs::Ref) child; most kinds ignore it and pass
/// it straight through to their children.
pub trait Decode: Sized {
    /// Parses the payload starting at `*pos`, advancing `pos` past it.
    fn read(bytes: &[u8], pos: &mut usize, registry: &SchemaRegistry) -> Result<Self, CoreError>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn vlc_zero() {
        let mut out = Vec::new();
        write_vlc(&mut out, 0);
        assert_eq!(out, vec![0x00]);
    }

    #[test]
    fn vlc_127() {
        let mut out = Vec::new();
        write_vlc(&mut out, 127);
        assert_eq!(out, vec![0x7F]);
    }

    #[test]
    fn vlc_128() {
        let mut out = Vec::new();
        write_vlc(&mut out, 128);
        assert_eq!(out, vec![0x81, 0x00]);
    }

    #[test]
    fn vlc_round_trip() {
        for v in [0u64, 1, 63, 64, 127, 128, 129, 16384, u64::MAX, 12345678] {
            let mut out = Vec::new();
            write_vlc(&mut out, v);
            let mut pos = 0;
            let got = read_vlc(&out, &mut pos).expect("valid varint");
            assert_eq!(got, v);
            assert_eq!(pos, out.len());
        }
    }

    #[test]
    fn vlc_rejects_redundant_leading_zero() {
        let mut pos = 0;
        let err = read_vlc(&[0x80, 0x01], &mut pos).unwrap_err();
        assert!(matches!(err, CoreError::BadFormat { .. }));
    }

    #[test]
    fn vlc_rejects_truncation() {
        let mut pos = 0;
        let err = read_vlc(&[0x80], &mut pos).unwrap_err();
        assert!(matches!(err, CoreError::BadFormat { .. }));
    }

    #[test]
    fn vlc_rejects_overflow() {
        // 10 continuation groups, the last carrying bits past bit 63 — a
        // value a wrapping `<< 7` would silently truncate instead of
        // rejecting.
        let mut bytes = vec![0xFF; 9];
        bytes.push(0x00);
        let mut pos = 0;
        let err = read_vlc(&bytes, &mut pos).unwrap_err();
        assert!(matches!(err, CoreError::BadFormat { .. }));
    }
}
