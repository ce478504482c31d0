//! `HashSet`: a [`Map`] whose values are a fixed sentinel.
//!
//! `spec.md` §4.3 specifies the set as the same trie shape as the map with
//! every value forced to a shared `TRUE` sentinel. Its wire payload is the
//! underlying map's bare leaf/tree payload with the inner map tag omitted
//! (`spec.md` §3, §4.3, §6) — [`SET_LEAF`](crate::encoding::tag::SET_LEAF)
//! and [`SET_TREE`](crate::encoding::tag::SET_TREE) carry the shape
//! distinction instead, mirroring how [`BLOB_FLAT`](crate::encoding::tag::BLOB_FLAT)/
//! [`BLOB_CHUNKED`](crate::encoding::tag::BLOB_CHUNKED) give the same
//! logical kind two tags for its two physical shapes.

use std::sync::Arc;

use crate::cell::Cell;
use crate::encoding::{tag, Encode};
use crate::error::CoreError;
use crate::map::Map;
use crate::record::SchemaRegistry;
use crate::refs::Ref;
use crate::store::Store;

/// A persistent hash set, physically a [`Map`] from member to a shared
/// sentinel value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Set(Map);

fn sentinel() -> Cell {
    Cell::Bool(true)
}

impl Set {
    /// The empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self(Map::empty())
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.0.len()
    }

    /// `true` iff the set has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` iff `member` is in the set.
    ///
    /// # Errors
    ///
    /// As [`Map::get`].
    pub fn contains(&self, member: &Cell, store: &dyn Store, registry: &SchemaRegistry) -> Result<bool, CoreError> {
        Ok(self.0.get(member, store, registry)?.is_some())
    }

    /// Returns a new set with `member` added.
    ///
    /// # Errors
    ///
    /// As [`Map::assoc`].
    pub fn include(&self, member: Cell, store: &dyn Store, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        Ok(Self(self.0.assoc(member, sentinel(), store, registry)?))
    }

    /// Returns a new set with `member` removed.
    ///
    /// # Errors
    ///
    /// As [`Map::dissoc`].
    pub fn exclude(&self, member: &Cell, store: &dyn Store, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        Ok(Self(self.0.dissoc(member, store, registry)?))
    }

    /// Returns a new set with every member of `members` added.
    ///
    /// # Errors
    ///
    /// As [`Set::include`].
    pub fn include_all(
        &self,
        members: impl IntoIterator<Item = Cell>,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        let mut result = self.clone();
        for m in members {
            result = result.include(m, store, registry)?;
        }
        Ok(result)
    }

    /// Returns a new set with every member of `members` removed.
    ///
    /// # Errors
    ///
    /// As [`Set::exclude`].
    pub fn exclude_all<'a>(
        &self,
        members: impl IntoIterator<Item = &'a Cell>,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        let mut result = self.clone();
        for m in members {
            result = result.exclude(m, store, registry)?;
        }
        Ok(result)
    }

    /// Set intersection.
    ///
    /// # Errors
    ///
    /// As [`Map::entries`] and [`Set::include`].
    pub fn intersect_all(&self, other: &Self, store: &dyn Store, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        let mut result = Self::empty();
        for e in self.0.entries(store, registry)? {
            let key = e.key.get_value(store, registry)?;
            if other.contains(key.as_ref(), store, registry)? {
                result = Self(result.0.assoc_by_ref(e.key, sentinel(), store, registry)?);
            }
        }
        Ok(result)
    }

    /// All members, in ascending hash order.
    ///
    /// # Errors
    ///
    /// As [`Map::entries`].
    pub fn members(&self, store: &dyn Store, registry: &SchemaRegistry) -> Result<Vec<Arc<Cell>>, CoreError> {
        self.0
            .entries(store, registry)?
            .into_iter()
            .map(|e| e.key.get_value(store, registry))
            .collect()
    }

    pub(crate) fn child_refs(&self) -> Vec<&Ref> {
        self.0.child_refs()
    }

    pub(crate) fn into_map(self) -> Map {
        self.0
    }

    /// Wraps an already-decoded map as a set's payload.
    pub(crate) fn from_map(map: Map) -> Self {
        Self(map)
    }
}

impl Encode for Set {
    /// The map's bare payload, inner map tag omitted — [`Set::tag`] already
    /// carries the leaf/tree distinction the map's own tag would have.
    fn encode_raw(&self, out: &mut Vec<u8>) {
        self.0.encode_raw(out);
    }

    fn tag(&self) -> u8 {
        if self.0.is_tree() {
            tag::SET_TREE
        } else {
            tag::SET_LEAF
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
    use crate::address::Address;
    use crate::store::MemoryStore;

    #[test]
    fn include_contains_exclude() {
        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();
        let s = Set::empty();
        let s = s.include(Cell::Address(Address::from_u64(1)), &store, &registry).unwrap();
        assert!(s.contains(&Cell::Address(Address::from_u64(1)), &store, &registry).unwrap());
        let s = s.exclude(&Cell::Address(Address::from_u64(1)), &store, &registry).unwrap();
        assert!(!s.contains(&Cell::Address(Address::from_u64(1)), &store, &registry).unwrap());
    }

    #[test]
    fn intersection() {
        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();
        let a = Set::empty()
            .include_all(
                [Cell::Address(Address::from_u64(1)), Cell::Address(Address::from_u64(2))],
                &store,
                &registry,
            )
            .unwrap();
        let b = Set::empty()
            .include_all(
                [Cell::Address(Address::from_u64(2)), Cell::Address(Address::from_u64(3))],
                &store,
                &registry,
            )
            .unwrap();
        let both = a.intersect_all(&b, &store, &registry).unwrap();
        assert_eq!(both.len(), 1);
        assert!(both.contains(&Cell::Address(Address::from_u64(2)), &store, &registry).unwrap());
    }
}
