//! The reference layer: [`Ref`] and the [`RefStatus`] lattice.
//!
//! A `Ref` is the sole mechanism by which a parent cell refers to a
//! non-embedded child (`spec.md` §4.2). It is deliberately small: a hash,
//! an optional loaded cell, and a status. Rust realizes the spec's
//! "atomically-published optional" caches with [`OnceLock`] and the status
//! lattice with an [`AtomicU8`] — concurrent re-derivation is benign, never
//! incorrect (`spec.md` §5).
//!
//! `ledger-core` carries no global state (`spec.md` §9), so `Ref` never
//! reaches for a thread-local or ambient store: [`Ref::get_value`] and
//! [`Ref::persist`] take the [`Store`](crate::store::Store) they should
//! consult as an explicit argument.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use crate::cell::Cell;
use crate::encoding::{read_tag, tag, Decode, Encode};
use crate::error::CoreError;
use crate::hash::Hash;
use crate::record::SchemaRegistry;
use crate::store::Store;

/// Monotone lattice tracking how strong a persistence guarantee a `Ref`'s
/// target carries.
///
/// Status can only increase. [`RefStatus::Embedded`] is terminal for small
/// cells. [`RefStatus::Announced`] and [`RefStatus::Verified`] are reserved
/// for consensus-time guarantees this crate does not itself assert; it only
/// carries them so a higher layer can record them on the same lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RefStatus {
    /// No persistence guarantee is known.
    Unknown = 0,
    /// The cell is small enough to be inlined into its parent; terminal.
    Embedded = 1,
    /// The encoding is known to be in at least one store.
    Stored = 2,
    /// The full subtree rooted at this cell is reachable from the store.
    Persisted = 3,
    /// Reserved: the hash has been announced to peers.
    Announced = 4,
    /// Reserved: peers have verified the announcement.
    Verified = 5,
}

impl RefStatus {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Unknown,
            1 => Self::Embedded,
            2 => Self::Stored,
            3 => Self::Persisted,
            4 => Self::Announced,
            _ => Self::Verified,
        }
    }
}

/// A handle to a cell: a hash, an optional loaded target, and a status.
///
/// See the module docs for the concurrency model. Cloning a `Ref` is cheap
/// (it clones the `Arc`-backed caches, not the target).
#[derive(Debug)]
pub struct Ref {
    hash: OnceLock<Hash>,
    cell: OnceLock<Arc<Cell>>,
    status: AtomicU8,
}

impl Clone for Ref {
    fn clone(&self) -> Self {
        let cloned = Self {
            hash: OnceLock::new(),
            cell: OnceLock::new(),
            status: AtomicU8::new(self.status.load(Ordering::Acquire)),
        };
        if let Some(h) = self.hash.get() {
            let _ = cloned.hash.set(*h);
        }
        if let Some(c) = self.cell.get() {
            let _ = cloned.cell.set(Arc::clone(c));
        }
        cloned
    }
}

impl Ref {
    /// Wrap an in-memory cell.
    ///
    /// Status starts at [`RefStatus::Embedded`] if the cell's encoding fits
    /// the embedding threshold, else [`RefStatus::Unknown`] (in memory, not
    /// yet known to any store).
    #[must_use]
    pub fn new(cell: Cell) -> Self {
        let status = if cell.is_embedded() {
            RefStatus::Embedded
        } else {
            RefStatus::Unknown
        };
        let r = Self {
            hash: OnceLock::new(),
            cell: OnceLock::new(),
            status: AtomicU8::new(status as u8),
        };
        let _ = r.cell.set(Arc::new(cell));
        r
    }

    /// Construct a dehydrated ref: hash known, target cell absent.
    #[must_use]
    pub fn from_hash(hash: Hash, status: RefStatus) -> Self {
        let r = Self {
            hash: OnceLock::new(),
            cell: OnceLock::new(),
            status: AtomicU8::new(status as u8),
        };
        let _ = r.hash.set(hash);
        r
    }

    /// Current status. Reading never blocks and never promotes status.
    #[must_use]
    pub fn status(&self) -> RefStatus {
        RefStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// `true` iff this ref's target is inlined rather than hash-addressed.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.status() == RefStatus::Embedded
    }

    /// `true` iff the target cell is currently resident in memory.
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The target's content hash. Computed and cached on first call for a
    /// ref constructed from an in-memory cell; free for a dehydrated ref.
    #[must_use]
    pub fn get_hash(&self) -> Hash {
        if let Some(h) = self.hash.get() {
            return *h;
        }
        // Invariant: a ref without a cached hash was constructed with
        // `Ref::new`, which always populates `cell`.
        let cell = self
            .cell
            .get()
            .map_or_else(|| unreachable!("ref has neither hash nor cell"), Arc::clone);
        let mut buf = Vec::with_capacity(cell.estimated_encoding_size());
        cell.encode(&mut buf);
        let h = Hash::of(&buf);
        let _ = self.hash.set(h);
        h
    }

    /// Bump the status monotonically. A concurrent racing bump to a lower
    /// or equal value is a harmless no-op.
    fn raise_status(&self, new_status: RefStatus) {
        self.status
            .fetch_max(new_status as u8, Ordering::AcqRel);
    }

    /// Peek at the loaded cell without touching any store.
    #[must_use]
    pub fn peek(&self) -> Option<Arc<Cell>> {
        self.cell.get().cloned()
    }

    /// Returns the target cell, loading it from `store` if necessary.
    ///
    /// # Errors
    ///
    /// [`CoreError::MissingData`] if the cell is neither resident in memory
    /// nor present in `store`.
    pub fn get_value(
        &self,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Arc<Cell>, CoreError> {
        if let Some(cell) = self.cell.get() {
            return Ok(Arc::clone(cell));
        }
        let hash = *self
            .hash
            .get()
            .unwrap_or_else(|| unreachable!("dehydrated ref always carries its hash"));
        let Some(bytes) = store.read(&hash)? else {
            return Err(CoreError::MissingData(hash));
        };
        let mut pos = 0;
        let cell = Cell::decode(&bytes, &mut pos, registry)?;
        if pos != bytes.len() {
            return Err(CoreError::bad_format(
                pos,
                "trailing bytes after cell encoding",
            ));
        }
        let computed = Hash::of(&bytes);
        if computed != hash {
            return Err(CoreError::InvalidData(format!(
                "store returned bytes for {hash} that hash to {computed}"
            )));
        }
        let arc = Arc::new(cell);
        let _ = self.cell.set(Arc::clone(&arc));
        self.raise_status(RefStatus::Stored);
        Ok(arc)
    }

    /// Promotes this ref, and transitively every descendant whose status is
    /// lower, to [`RefStatus::Persisted`]. Idempotent.
    ///
    /// `on_novel` is invoked once for every hash newly written to `store`
    /// during this call (used to drive gossip at a higher layer).
    ///
    /// # Errors
    ///
    /// Propagates any [`CoreError`] from `store` or from rehydrating a
    /// dehydrated descendant that `store` cannot supply.
    pub fn persist(
        &self,
        store: &dyn Store,
        registry: &SchemaRegistry,
        on_novel: &mut dyn FnMut(&Hash, &[u8]),
    ) -> Result<RefStatus, CoreError> {
        let mut novel_count = 0usize;
        let status = crate::store::store_ref(store, self, RefStatus::Persisted, registry, &mut |h, bytes| {
            novel_count += 1;
            on_novel(h, bytes);
        })?;
        crate::logging::debug_persist_complete(&self.get_hash(), novel_count);
        Ok(status)
    }

    pub(crate) fn set_status_at_least(&self, status: RefStatus) {
        self.raise_status(status);
    }
}

impl Encode for Ref {
    fn encode(&self, out: &mut Vec<u8>) {
        if self.is_embedded() {
            // Invariant: an embedded ref always carries its target.
            let cell = self
                .cell
                .get()
                .unwrap_or_else(|| unreachable!("embedded ref without a cell"));
            cell.encode(out);
        } else {
            out.push(tag::REF);
            out.extend_from_slice(self.get_hash().as_bytes());
        }
    }

    fn encode_raw(&self, _out: &mut Vec<u8>) {
        unreachable!("a ref child is always written with its own tag, embedded or hash-ref");
    }

    fn tag(&self) -> u8 {
        if self.is_embedded() {
            self.cell
                .get()
                .map_or(tag::REF, |c| c.tag())
        } else {
            tag::REF
        }
    }

    fn estimated_encoding_size(&self) -> usize {
        if let Some(cell) = self.cell.get() {
            if self.is_embedded() {
                return cell.estimated_encoding_size();
            }
        }
        1 + crate::limits::HASH_LEN
    }
}

impl Decode for Ref {
    /// Reads a child position: either an embedded cell (any non-ref tag) or
    /// a hash-reference (`tag::REF`). Unlike other `Decode` impls, this one
    /// consumes the tag byte itself, since the tag is what distinguishes
    /// the two physical forms.
    fn read(bytes: &[u8], pos: &mut usize, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        let start = *pos;
        let t = read_tag(bytes, pos)?;
        if t == tag::REF {
            if bytes.len() - *pos < crate::limits::HASH_LEN {
                return Err(CoreError::bad_format(start, "truncated ref hash"));
            }
            let mut h = [0u8; crate::limits::HASH_LEN];
            h.copy_from_slice(&bytes[*pos..*pos + crate::limits::HASH_LEN]);
            *pos += crate::limits::HASH_LEN;
            return Ok(Self::from_hash(Hash(h), RefStatus::Unknown));
        }
        let cell = Cell::decode_payload(t, bytes, pos, registry)?;
        let mut buf = Vec::new();
        cell.encode(&mut buf);
        if buf.len() > crate::limits::EMBEDDED_LIMIT {
            return Err(CoreError::bad_format(
                start,
                "non-embeddable cell encoded inline instead of as a hash reference",
            ));
        }
        Ok(Self::new(cell))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn embedded_ref_status_is_embedded() {
        let r = Ref::new(Cell::Bool(true));
        assert_eq!(r.status(), RefStatus::Embedded);
        assert!(r.is_embedded());
    }

    #[test]
    fn status_only_increases() {
        let r = Ref::from_hash(Hash([1; 32]), RefStatus::Unknown);
        r.set_status_at_least(RefStatus::Stored);
        assert_eq!(r.status(), RefStatus::Stored);
        r.set_status_at_least(RefStatus::Unknown);
        assert_eq!(r.status(), RefStatus::Stored);
        r.set_status_at_least(RefStatus::Persisted);
        assert_eq!(r.status(), RefStatus::Persisted);
    }

    #[test]
    fn hash_is_cached() {
        let r = Ref::new(Cell::Bool(true));
        let a = r.get_hash();
        let b = r.get_hash();
        assert_eq!(a, b);
    }
}
