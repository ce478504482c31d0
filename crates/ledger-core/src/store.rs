//! The store abstraction: durable content-addressed byte storage.
//!
//! `spec.md` §4.5/§6 specifies the store interface and the
//! at-most-one-physical-write-per-hash guarantee; `ledger-core` carries no
//! global state, so every traversal that might need to fetch a dehydrated
//! cell takes its `&dyn Store` explicitly (`spec.md` §9).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::encoding::Encode;
use crate::error::CoreError;
use crate::hash::Hash;
use crate::record::SchemaRegistry;
use crate::refs::{Ref, RefStatus};

/// Durable content-addressed byte storage.
///
/// Modeled on `echo-cas::BlobStore`: `read` returns `Ok(None)` for a miss
/// (not an error), and `Err` is reserved for a genuine I/O failure a caller
/// might want to retry. `write` is expected to be idempotent — writing the
/// same hash twice is a no-op, not an error.
pub trait Store: Send + Sync {
    /// Durably stores `encoding` under `hash`. Returns `Ok(())` once the
    /// write is guaranteed visible to subsequent `read` calls.
    ///
    /// # Errors
    ///
    /// A store-level I/O failure.
    fn write(&self, hash: Hash, encoding: &[u8]) -> Result<(), CoreError>;

    /// Looks up the encoding stored under `hash`.
    ///
    /// # Errors
    ///
    /// A store-level I/O failure. Absence is `Ok(None)`, not an error.
    fn read(&self, hash: &Hash) -> Result<Option<Vec<u8>>, CoreError>;
}

/// An in-memory [`Store`], the reference implementation used by tests and
/// as the in-crate analogue of `echo-cas::MemoryTier`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<Hash, Vec<u8>>>,
}

impl MemoryStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct hashes currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// `true` iff the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryStore {
    fn write(&self, hash: Hash, encoding: &[u8]) -> Result<(), CoreError> {
        let mut guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let novel = !guard.contains_key(&hash);
        guard.entry(hash).or_insert_with(|| encoding.to_vec());
        drop(guard);
        crate::logging::trace_store_write(&hash, encoding.len(), novel);
        Ok(())
    }

    fn read(&self, hash: &Hash) -> Result<Option<Vec<u8>>, CoreError> {
        let guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let result = guard.get(hash).cloned();
        drop(guard);
        crate::logging::trace_store_read(hash, result.is_some());
        Ok(result)
    }
}

/// Promotes `r`, and transitively every descendant whose status is lower,
/// to at least `required`. Idempotent: a subtree already at `required` (or
/// higher) does no work.
///
/// `on_novel` is invoked once for every hash newly written to `store`
/// during this call, in post-order (children before parents) — the shape a
/// gossip layer wants so it never announces a hash before the hashes it
/// references.
///
/// # Errors
///
/// Propagates any [`CoreError`] from `store`, including from rehydrating a
/// dehydrated descendant `store` cannot supply.
pub fn store_ref(
    store: &dyn Store,
    r: &Ref,
    required: RefStatus,
    registry: &SchemaRegistry,
    on_novel: &mut dyn FnMut(&Hash, &[u8]),
) -> Result<RefStatus, CoreError> {
    if r.status() >= required || r.is_embedded() {
        r.set_status_at_least(required);
        return Ok(r.status());
    }
    let cell = r.get_value(store, registry)?;
    for child in cell.child_refs() {
        store_ref(store, child, required, registry, on_novel)?;
    }
    let mut buf = Vec::with_capacity(cell.estimated_encoding_size());
    cell.encode(&mut buf);
    let hash = r.get_hash();
    let was_present = store.read(&hash)?.is_some();
    store.write(hash, &buf)?;
    if !was_present {
        on_novel(&hash, &buf);
    }
    r.set_status_at_least(required);
    Ok(r.status())
}

/// Looks up `hash` in `store`, returning a dehydrated [`Ref`] at
/// [`RefStatus::Persisted`] on a hit.
///
/// # Errors
///
/// Propagates a store-level I/O failure. A miss is `Ok(None)`.
pub fn ref_for_hash(store: &dyn Store, hash: Hash) -> Result<Option<Ref>, CoreError> {
    if store.read(&hash)?.is_some() {
        Ok(Some(Ref::from_hash(hash, RefStatus::Persisted)))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::cell::Cell;
    use crate::limits::EMBEDDED_LIMIT;

    #[test]
    fn memory_store_write_then_read() {
        let store = MemoryStore::new();
        let hash = Hash::of(b"payload");
        store.write(hash, b"payload").unwrap();
        assert_eq!(store.read(&hash).unwrap().as_deref(), Some(&b"payload"[..]));
    }

    #[test]
    fn memory_store_miss_is_none_not_error() {
        let store = MemoryStore::new();
        assert!(store.read(&Hash([0; 32])).unwrap().is_none());
    }

    #[test]
    fn persist_promotes_to_persisted_and_reports_novel_hashes() {
        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();
        let big = crate::blob::Blob::from_bytes(&vec![7u8; EMBEDDED_LIMIT + 1]);
        let r = Ref::new(Cell::Blob(big));
        let mut novel = Vec::new();
        let status = store_ref(&store, &r, RefStatus::Persisted, &registry, &mut |h, _| novel.push(*h)).unwrap();
        assert_eq!(status, RefStatus::Persisted);
        assert_eq!(novel.len(), 1);
        assert!(!store.is_empty());

        novel.clear();
        let status2 = store_ref(&store, &r, RefStatus::Persisted, &registry, &mut |h, _| novel.push(*h)).unwrap();
        assert_eq!(status2, RefStatus::Persisted);
        assert!(novel.is_empty());
    }
}
