//! [`Cell`]: the closed sum type every value in the data model is.
//!
//! `spec.md` §9 calls for "tagged variant dispatch, not open subclassing" —
//! the same shape as `warp-core`'s tagged records and `echo-cas`'s
//! single-purpose traits. A `Cell` owns no store and no registry; every
//! operation that might need to resolve a dehydrated child takes both
//! explicitly, matching [`Ref`](crate::refs::Ref).

use std::collections::HashSet;

use crate::address::Address;
use crate::blob::{Blob, CString};
use crate::encoding::{read_vlc, tag, write_vlc, Encode};
use crate::error::CoreError;
use crate::hash::Hash;
use crate::limits::EMBEDDED_LIMIT;
use crate::map::Map;
use crate::primitives::{zigzag_decode, zigzag_encode, Keyword, Symbol};
use crate::record::{Record, SchemaRegistry};
use crate::refs::Ref;
use crate::set::Set;
use crate::vector::Vector;

/// Every cell kind the data model supports.
///
/// Closed by design (`spec.md` §9): adding a new kind touches this enum and
/// the dispatch in [`Cell::decode_payload`]/[`Encode for Cell`], never an
/// open trait object hierarchy.
#[derive(Clone, Debug)]
pub enum Cell {
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Long(i64),
    /// A Unicode scalar value.
    Char(char),
    /// A short, self-evaluating name.
    Keyword(Keyword),
    /// A short name, distinct from a [`Keyword`] of the same bytes.
    Symbol(Symbol),
    /// UTF-8 text.
    CString(CString),
    /// An arbitrary byte sequence.
    Blob(Blob),
    /// A non-negative account index.
    Address(Address),
    /// A persistent hash map.
    Map(Map),
    /// A persistent hash set.
    Set(Set),
    /// A persistent radix-balanced vector.
    Vector(Vector),
    /// A fixed-schema record.
    Record(Record),
}

impl Cell {
    /// `true` iff this cell's canonical encoding is at most
    /// [`EMBEDDED_LIMIT`] bytes — the threshold at which a parent inlines
    /// the cell rather than referencing it by hash (`spec.md` §4.1).
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        // `estimated_encoding_size` is a `Vec::with_capacity` hint, not an
        // upper bound — container kinds estimate each child's contribution
        // as if it were a hash reference, which understates the payload
        // when a child is itself embedded. The only sound test is the
        // actual encoding.
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len() <= EMBEDDED_LIMIT
    }

    /// This cell's content hash: SHA3-256 of its canonical encoding
    /// (`spec.md` §3 — two cells are equal iff their hashes are equal).
    #[must_use]
    pub fn hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(self.estimated_encoding_size());
        self.encode(&mut buf);
        Hash::of(&buf)
    }

    /// This cell's memory footprint: its own encoding length plus the
    /// recursive sum of its children's, each unique hash counted once
    /// (`spec.md` §3). A post-order walk accumulating into `seen` is the
    /// natural reading of "counted once per unique hash" (`SPEC_FULL.md`
    /// §3).
    #[must_use]
    pub fn memory_size(&self) -> u64 {
        let mut seen = HashSet::new();
        self.memory_size_into(&mut seen)
    }

    fn memory_size_into(&self, seen: &mut HashSet<Hash>) -> u64 {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        let mut total = buf.len() as u64;
        for child in self.child_refs() {
            let child_hash = child.get_hash();
            if seen.insert(child_hash) {
                if let Some(cell) = child.peek() {
                    total += cell.memory_size_into(seen);
                } else {
                    // Dehydrated and unseen: we know only its hash, not its
                    // encoding length, so it contributes nothing further
                    // here. A caller that needs an exact figure for a
                    // partially-hydrated tree should hydrate first.
                }
            }
        }
        total
    }

    /// Every direct child [`Ref`] of this cell, in encoding order. Empty
    /// for a cell with no references (`Bool`, `Long`, `Char`, `Keyword`,
    /// `Symbol`, `Address`, and a flat `Blob`/`CString`).
    #[must_use]
    pub fn child_refs(&self) -> Vec<&Ref> {
        match self {
            Self::Bool(_) | Self::Long(_) | Self::Char(_) | Self::Keyword(_) | Self::Symbol(_) | Self::Address(_) => Vec::new(),
            Self::CString(s) => s.child_refs(),
            Self::Blob(b) => b.child_refs(),
            Self::Map(m) => m.child_refs(),
            Self::Set(s) => s.child_refs(),
            Self::Vector(v) => v.child_refs(),
            Self::Record(r) => r.child_refs(),
        }
    }

    /// Parses a complete cell: tag byte plus payload.
    ///
    /// # Errors
    ///
    /// [`CoreError::BadFormat`] on any deviation from the canonical form.
    pub fn decode(bytes: &[u8], pos: &mut usize, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        let t = crate::encoding::read_tag(bytes, pos)?;
        Self::decode_payload(t, bytes, pos, registry)
    }

    /// Parses a cell's payload given its already-consumed tag byte.
    ///
    /// Dispatches purely on `t`: the tag fully determines the parse path
    /// (`spec.md` §4.1, restated in `SPEC_FULL.md` §6).
    ///
    /// # Errors
    ///
    /// [`CoreError::BadFormat`] on any deviation from the canonical form.
    pub fn decode_payload(t: u8, bytes: &[u8], pos: &mut usize, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        match t {
            tag::BOOL_FALSE => Ok(Self::Bool(false)),
            tag::BOOL_TRUE => Ok(Self::Bool(true)),
            tag::LONG => {
                let v = read_vlc(bytes, pos)?;
                Ok(Self::Long(zigzag_decode(v)))
            }
            tag::CHAR => {
                let start = *pos;
                let v = read_vlc(bytes, pos)?;
                let cp = u32::try_from(v).map_err(|_| CoreError::bad_format(start, "char code point exceeds u32"))?;
                char::from_u32(cp)
                    .map(Self::Char)
                    .ok_or_else(|| CoreError::bad_format(start, "not a valid Unicode scalar value"))
            }
            tag::CSTRING_FLAT => Ok(Self::CString(CString::read_flat(bytes, pos)?)),
            tag::CSTRING_CHUNKED => Ok(Self::CString(CString::read_chunked(bytes, pos, registry)?)),
            tag::BLOB_FLAT => Ok(Self::Blob(Blob::read_flat(bytes, pos)?)),
            tag::BLOB_CHUNKED => Ok(Self::Blob(Blob::read_chunked(bytes, pos, registry)?)),
            tag::KEYWORD => Ok(Self::Keyword(Keyword::read(bytes, pos)?)),
            tag::SYMBOL => Ok(Self::Symbol(Symbol::read(bytes, pos)?)),
            tag::MAP_LEAF => Ok(Self::Map(Map::read_leaf(bytes, pos, registry)?)),
            tag::MAP_TREE => Ok(Self::Map(Map::read_tree(bytes, pos, registry)?)),
            tag::SET_LEAF => {
                let start = *pos;
                let map = Map::read_leaf(bytes, pos, registry)?;
                map.validate_as_set(start)?;
                Ok(Self::Set(Set::from_map(map)))
            }
            tag::SET_TREE => {
                let start = *pos;
                let map = Map::read_tree(bytes, pos, registry)?;
                map.validate_as_set(start)?;
                Ok(Self::Set(Set::from_map(map)))
            }
            tag::VECTOR => Ok(Self::Vector(Vector::read(bytes, pos, registry)?)),
            tag::ADDRESS => Ok(Self::Address(Address::read(bytes, pos)?)),
            schema_tag => Ok(Self::Record(Record::read(bytes, pos, schema_tag, registry)?)),
        }
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}
impl Eq for Cell {}

impl Encode for Cell {
    fn encode_raw(&self, out: &mut Vec<u8>) {
        match self {
            Self::Bool(_) => {}
            Self::Long(v) => write_vlc(out, zigzag_encode(*v)),
            Self::Char(c) => write_vlc(out, u64::from(u32::from(*c))),
            Self::Keyword(k) => k.encode_raw(out),
            Self::Symbol(s) => s.encode_raw(out),
            Self::CString(s) => s.encode_raw(out),
            Self::Blob(b) => b.encode_raw(out),
            Self::Address(a) => a.encode_raw(out),
            Self::Map(m) => m.encode_raw(out),
            Self::Set(s) => s.encode_raw(out),
            Self::Vector(v) => v.encode_raw(out),
            Self::Record(r) => r.encode_raw(out),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            Self::Bool(false) => tag::BOOL_FALSE,
            Self::Bool(true) => tag::BOOL_TRUE,
            Self::Long(_) => tag::LONG,
            Self::Char(_) => tag::CHAR,
            Self::Keyword(k) => k.tag(),
            Self::Symbol(s) => s.tag(),
            Self::CString(s) => s.tag(),
            Self::Blob(b) => b.tag(),
            Self::Address(a) => a.tag(),
            Self::Map(m) => m.tag(),
            Self::Set(s) => s.tag(),
            Self::Vector(v) => v.tag(),
            Self::Record(r) => r.tag(),
        }
    }

    fn estimated_encoding_size(&self) -> usize {
        match self {
            Self::Bool(_) => 1,
            Self::Long(_) | Self::Char(_) => 11,
            Self::Keyword(k) => k.estimated_encoding_size(),
            Self::Symbol(s) => s.estimated_encoding_size(),
            Self::CString(s) => s.estimated_encoding_size(),
            Self::Blob(b) => b.estimated_encoding_size(),
            Self::Address(a) => a.estimated_encoding_size(),
            Self::Map(m) => m.estimated_encoding_size(),
            Self::Set(s) => s.estimated_encoding_size(),
            Self::Vector(v) => v.estimated_encoding_size(),
            Self::Record(r) => r.estimated_encoding_size(),
        }
    }
}
