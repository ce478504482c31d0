//! `HashMap`: a 16-way persistent hash-array-mapped trie.
//!
//! `spec.md` §4.3 is the design contract. Two physical variants share one
//! tag-dispatched type: [`MapLeaf`](MapRepr::Leaf) (a sorted array of up to
//! [`MAP_LEAF_MAX`] entries) and [`MapTree`](MapRepr::Tree) (16 slots keyed
//! by 4-bit fragments of the key's content hash, `shift` bits into it).
//! Collisions past the first 64 bits of hash (16 levels) fall back to an
//! over-sized leaf — a "collision list" — since no further fragment can
//! distinguish the keys.

use std::sync::Arc;

use crate::cell::Cell;
use crate::encoding::{read_vlc, tag, write_vlc, Decode, Encode};
use crate::error::CoreError;
use crate::hash::Hash;
use crate::limits::{BRANCHING, MAP_LEAF_MAX};
use crate::record::SchemaRegistry;
use crate::refs::Ref;
use crate::store::Store;

fn key_hash_u64(h: &Hash) -> u64 {
    u64::from_be_bytes(h.as_bytes()[0..8].try_into().unwrap_or_else(|_| unreachable!()))
}

fn fragment(key_u64: u64, shift: u32) -> usize {
    ((key_u64 >> shift) & 0xF) as usize
}

fn slot_index(bitmap: u16, frag: usize) -> Option<usize> {
    let bit = 1u16 << frag;
    if bitmap & bit == 0 {
        None
    } else {
        let below = bitmap & (bit - 1);
        Some(below.count_ones() as usize)
    }
}

/// One key/value pair. Both sides are [`Ref`]s so a small key or value can
/// embed and a large one is hash-addressed, exactly like any other cell
/// child.
#[derive(Clone, Debug)]
pub struct MapEntry {
    /// The entry's key.
    pub key: Ref,
    /// The entry's value.
    pub value: Ref,
}

#[derive(Clone, Debug)]
enum MapRepr {
    Leaf(Vec<MapEntry>),
    Tree {
        shift: u32,
        bitmap: u16,
        children: Vec<Ref>,
        count: u64,
    },
}

/// A persistent hash-array-mapped trie.
#[derive(Clone, Debug)]
pub struct Map(MapRepr);

impl Map {
    /// The empty map.
    #[must_use]
    pub fn empty() -> Self {
        Self::leaf_from_entries(Vec::new())
    }

    fn leaf_from_entries(mut entries: Vec<MapEntry>) -> Self {
        entries.sort_by_key(|e| e.key.get_hash());
        Self(MapRepr::Leaf(entries))
    }

    fn empty_tree(shift: u32) -> Self {
        Self(MapRepr::Tree {
            shift,
            bitmap: 0,
            children: Vec::new(),
            count: 0,
        })
    }

    /// Number of entries in this map (its own subtree).
    #[must_use]
    pub fn len(&self) -> u64 {
        match &self.0 {
            MapRepr::Leaf(e) => e.len() as u64,
            MapRepr::Tree { count, .. } => *count,
        }
    }

    /// `true` iff the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` iff this map is physically a `MapTree` rather than a
    /// `MapLeaf`.
    #[must_use]
    pub fn is_tree(&self) -> bool {
        matches!(self.0, MapRepr::Tree { .. })
    }

    /// Looks up `key`, loading trie nodes from `store` as needed.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from a dehydrated node `store` cannot
    /// supply, or [`CoreError::InvalidData`] if a trie child is not itself
    /// a map cell.
    pub fn get(
        &self,
        key: &Cell,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Option<Arc<Cell>>, CoreError> {
        let mut buf = Vec::new();
        key.encode(&mut buf);
        self.get_by_hash(&Hash::of(&buf), store, registry)
    }

    fn get_by_hash(
        &self,
        key_hash: &Hash,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Option<Arc<Cell>>, CoreError> {
        match &self.0 {
            MapRepr::Leaf(entries) => entries
                .iter()
                .find(|e| &e.key.get_hash() == key_hash)
                .map(|e| e.value.get_value(store, registry))
                .transpose(),
            MapRepr::Tree { shift, bitmap, children, .. } => {
                let frag = fragment(key_hash_u64(key_hash), *shift);
                let Some(idx) = slot_index(*bitmap, frag) else {
                    return Ok(None);
                };
                let child_cell = children[idx].get_value(store, registry)?;
                let Cell::Map(child_map) = child_cell.as_ref() else {
                    return Err(CoreError::InvalidData("map tree child is not a map".to_owned()));
                };
                child_map.get_by_hash(key_hash, store, registry)
            }
        }
    }

    /// Returns a new map with `key` associated to `value`.
    ///
    /// # Errors
    ///
    /// As [`Map::get`].
    pub fn assoc(
        &self,
        key: Cell,
        value: Cell,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        let key_ref = Ref::new(key);
        let key_hash = key_ref.get_hash();
        let value_ref = Ref::new(value);
        self.assoc_entry(0, key_ref, key_hash, value_ref, store, registry)
    }

    /// Associates a pre-built key [`Ref`] (its hash already known) with
    /// `value`. Used by [`crate::set::Set`], which already holds the member
    /// as a `Ref` and would otherwise pay to re-encode it.
    pub(crate) fn assoc_by_ref(
        &self,
        key_ref: Ref,
        value: Cell,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        let key_hash = key_ref.get_hash();
        self.assoc_entry(0, key_ref, key_hash, Ref::new(value), store, registry)
    }

    fn assoc_entry(
        &self,
        shift: u32,
        key_ref: Ref,
        key_hash: Hash,
        value_ref: Ref,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        match &self.0 {
            MapRepr::Leaf(entries) => {
                if let Some(idx) = entries.iter().position(|e| e.key.get_hash() == key_hash) {
                    let mut new_entries = entries.clone();
                    new_entries[idx] = MapEntry { key: key_ref, value: value_ref };
                    return Ok(Self::leaf_from_entries(new_entries));
                }
                let mut combined = entries.clone();
                combined.push(MapEntry { key: key_ref, value: value_ref });
                if combined.len() <= MAP_LEAF_MAX || shift >= 64 {
                    return Ok(Self::leaf_from_entries(combined));
                }
                let mut tree = Self::empty_tree(shift);
                for e in combined {
                    let h = e.key.get_hash();
                    tree = tree.assoc_entry(shift, e.key, h, e.value, store, registry)?;
                }
                Self::normalize_single_child(tree, store, registry)
            }
            MapRepr::Tree { shift: node_shift, bitmap, children, count } => {
                let node_shift = *node_shift;
                let frag = fragment(key_hash_u64(&key_hash), node_shift);
                match slot_index(*bitmap, frag) {
                    None => {
                        let new_child = Self::leaf_from_entries(vec![MapEntry { key: key_ref, value: value_ref }]);
                        let insert_at = (*bitmap & ((1u16 << frag) - 1)).count_ones() as usize;
                        let mut new_children = children.clone();
                        new_children.insert(insert_at, Ref::new(Cell::Map(new_child)));
                        let new_bitmap = bitmap | (1u16 << frag);
                        Ok(Self(MapRepr::Tree {
                            shift: node_shift,
                            bitmap: new_bitmap,
                            children: new_children,
                            count: count + 1,
                        }))
                    }
                    Some(idx) => {
                        let child_cell = children[idx].get_value(store, registry)?;
                        let Cell::Map(child_map) = child_cell.as_ref() else {
                            return Err(CoreError::InvalidData("map tree child is not a map".to_owned()));
                        };
                        let old_len = child_map.len();
                        let new_child = child_map.assoc_entry(node_shift + 4, key_ref, key_hash, value_ref, store, registry)?;
                        let delta = new_child.len().saturating_sub(old_len);
                        let mut new_children = children.clone();
                        new_children[idx] = Ref::new(Cell::Map(new_child));
                        Ok(Self(MapRepr::Tree {
                            shift: node_shift,
                            bitmap: *bitmap,
                            children: new_children,
                            count: count + delta,
                        }))
                    }
                }
            }
        }
    }

    /// Returns a new map with `key` removed, or an equal map if `key` was
    /// absent.
    ///
    /// # Errors
    ///
    /// As [`Map::get`].
    pub fn dissoc(&self, key: &Cell, store: &dyn Store, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        let mut buf = Vec::new();
        key.encode(&mut buf);
        self.dissoc_by_hash(&Hash::of(&buf), store, registry)
    }

    fn dissoc_by_hash(&self, key_hash: &Hash, store: &dyn Store, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        match &self.0 {
            MapRepr::Leaf(entries) => {
                if let Some(idx) = entries.iter().position(|e| &e.key.get_hash() == key_hash) {
                    let mut new_entries = entries.clone();
                    new_entries.remove(idx);
                    Ok(Self::leaf_from_entries(new_entries))
                } else {
                    Ok(self.clone())
                }
            }
            MapRepr::Tree { shift, bitmap, children, count } => {
                let frag = fragment(key_hash_u64(key_hash), *shift);
                let Some(idx) = slot_index(*bitmap, frag) else {
                    return Ok(self.clone());
                };
                let child_cell = children[idx].get_value(store, registry)?;
                let Cell::Map(child_map) = child_cell.as_ref() else {
                    return Err(CoreError::InvalidData("map tree child is not a map".to_owned()));
                };
                let old_len = child_map.len();
                let new_child = child_map.dissoc_by_hash(key_hash, store, registry)?;
                if new_child.len() == old_len {
                    return Ok(self.clone());
                }
                let new_count = count - 1;
                let (new_bitmap, new_children) = if new_child.is_empty() {
                    let mut cs = children.clone();
                    cs.remove(idx);
                    (bitmap & !(1u16 << frag), cs)
                } else {
                    let mut cs = children.clone();
                    cs[idx] = Ref::new(Cell::Map(new_child));
                    (*bitmap, cs)
                };
                Self::collapse_or_rebuild(*shift, new_bitmap, new_children, new_count, store, registry)
            }
        }
    }

    /// After a removal, enforces the two mandatory collapse rules
    /// (`spec.md` §4.3): shrink to a leaf at or below [`MAP_LEAF_MAX`]
    /// entries, or collapse a single-child node upward. Both are mandatory
    /// for canonicality, not an optimization.
    fn collapse_or_rebuild(
        shift: u32,
        bitmap: u16,
        children: Vec<Ref>,
        count: u64,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        if count <= MAP_LEAF_MAX as u64 {
            let mut entries = Vec::new();
            let scratch = Self(MapRepr::Tree { shift, bitmap, children, count });
            scratch.collect_entries(store, registry, &mut entries)?;
            return Ok(Self::leaf_from_entries(entries));
        }
        let tree = Self(MapRepr::Tree { shift, bitmap, children, count });
        Self::normalize_single_child(tree, store, registry)
    }

    /// Collapses a chain of single-child tree nodes up to their deepest
    /// non-trivial node. A tree with exactly one occupied slot carries no
    /// discriminating information over its child and must not appear in
    /// canonical form.
    fn normalize_single_child(mut map: Self, store: &dyn Store, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        loop {
            let MapRepr::Tree { children, .. } = &map.0 else {
                return Ok(map);
            };
            if children.len() != 1 {
                return Ok(map);
            }
            let only = children[0].get_value(store, registry)?;
            let Cell::Map(child) = only.as_ref() else {
                return Err(CoreError::InvalidData("map tree child is not a map".to_owned()));
            };
            map = child.clone();
        }
    }

    fn collect_entries(&self, store: &dyn Store, registry: &SchemaRegistry, out: &mut Vec<MapEntry>) -> Result<(), CoreError> {
        match &self.0 {
            MapRepr::Leaf(entries) => {
                out.extend(entries.iter().cloned());
                Ok(())
            }
            MapRepr::Tree { children, .. } => {
                for c in children {
                    let cell = c.get_value(store, registry)?;
                    let Cell::Map(m) = cell.as_ref() else {
                        return Err(CoreError::InvalidData("map tree child is not a map".to_owned()));
                    };
                    m.collect_entries(store, registry, out)?;
                }
                Ok(())
            }
        }
    }

    /// All entries of this map, in ascending key-hash order.
    ///
    /// # Errors
    ///
    /// As [`Map::get`].
    pub fn entries(&self, store: &dyn Store, registry: &SchemaRegistry) -> Result<Vec<MapEntry>, CoreError> {
        let mut out = Vec::new();
        self.collect_entries(store, registry, &mut out)?;
        out.sort_by_key(|e| e.key.get_hash());
        Ok(out)
    }

    /// Merges `other` into `self`. Keys unique to either side pass through
    /// unchanged; a key present in both is resolved by `combiner(a, b)`,
    /// whose `None` removes the key from the result.
    ///
    /// Implemented as a fold over `other`'s entries rather than a true
    /// parallel trie descent — simpler, and semantically identical to the
    /// contract in `spec.md` §4.3, at the cost of the performance a
    /// slot-wise merge would give for two large maps.
    ///
    /// # Errors
    ///
    /// As [`Map::get`].
    pub fn merge_with(
        &self,
        other: &Self,
        combiner: &mut dyn FnMut(&Cell, &Cell) -> Option<Cell>,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Self, CoreError> {
        let mut result = self.clone();
        for e in other.entries(store, registry)? {
            let key_hash = e.key.get_hash();
            match result.get_by_hash(&key_hash, store, registry)? {
                None => {
                    result = result.assoc_entry(0, e.key, key_hash, e.value, store, registry)?;
                }
                Some(existing) => {
                    let incoming = e.value.get_value(store, registry)?;
                    match combiner(existing.as_ref(), incoming.as_ref()) {
                        Some(merged) => {
                            result = result.assoc_entry(0, e.key, key_hash, Ref::new(merged), store, registry)?;
                        }
                        None => {
                            result = result.dissoc_by_hash(&key_hash, store, registry)?;
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    /// Checks the "every set entry's value is `TRUE`" canonical-form rule
    /// (`spec.md` §4.3) as deeply as can be done without a store: embedded
    /// values and embedded sub-map nodes are checked recursively; a
    /// dehydrated, hash-referenced value or sub-node cannot be inspected
    /// without I/O this call does not have, so it is trusted and left for a
    /// later full-tree read to catch if it is ever wrong.
    pub(crate) fn validate_as_set(&self, start: usize) -> Result<(), CoreError> {
        match &self.0 {
            MapRepr::Leaf(entries) => {
                for e in entries {
                    if e.value.is_embedded() {
                        let value = e.value.peek().unwrap_or_else(|| unreachable!("embedded ref always carries its cell"));
                        if !matches!(value.as_ref(), Cell::Bool(true)) {
                            return Err(CoreError::bad_format(start, "set entry value is not TRUE"));
                        }
                    }
                }
                Ok(())
            }
            MapRepr::Tree { children, .. } => {
                for child in children {
                    if child.is_embedded() {
                        let cell = child.peek().unwrap_or_else(|| unreachable!("embedded ref always carries its cell"));
                        let Cell::Map(sub) = cell.as_ref() else {
                            return Err(CoreError::bad_format(start, "map tree child is not a map"));
                        };
                        sub.validate_as_set(start)?;
                    }
                }
                Ok(())
            }
        }
    }

    pub(crate) fn child_refs(&self) -> Vec<&Ref> {
        match &self.0 {
            MapRepr::Leaf(entries) => entries.iter().flat_map(|e| [&e.key, &e.value]).collect(),
            MapRepr::Tree { children, .. } => children.iter().collect(),
        }
    }

    pub(crate) fn read_leaf(bytes: &[u8], pos: &mut usize, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        let start = *pos;
        let count = read_vlc(bytes, pos)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = Ref::read(bytes, pos, registry)?;
            let value = Ref::read(bytes, pos, registry)?;
            entries.push(MapEntry { key, value });
        }
        for w in entries.windows(2) {
            if w[0].key.get_hash() >= w[1].key.get_hash() {
                return Err(CoreError::bad_format(start, "map leaf entries not in ascending key-hash order"));
            }
        }
        if entries.len() > MAP_LEAF_MAX {
            let prefix0 = entries.first().map(|e| key_hash_u64(&e.key.get_hash()));
            let all_collide = entries.iter().all(|e| Some(key_hash_u64(&e.key.get_hash())) == prefix0);
            if !all_collide {
                return Err(CoreError::bad_format(
                    start,
                    "map leaf exceeds max entries without a full 64-bit hash collision",
                ));
            }
        }
        Ok(Self(MapRepr::Leaf(entries)))
    }

    pub(crate) fn read_tree(bytes: &[u8], pos: &mut usize, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        let start = *pos;
        let count = read_vlc(bytes, pos)?;
        let Some(bm) = bytes.get(*pos..*pos + 2) else {
            return Err(CoreError::bad_format(start, "truncated map tree bitmap"));
        };
        let bitmap = u16::from_be_bytes([bm[0], bm[1]]);
        *pos += 2;
        let shift = u32::try_from(read_vlc(bytes, pos)?)
            .map_err(|_| CoreError::bad_format(start, "shift exceeds u32"))?;
        let expected = bitmap.count_ones() as usize;
        if expected < 2 {
            return Err(CoreError::bad_format(start, "map tree must have at least 2 children"));
        }
        let mut children = Vec::with_capacity(expected);
        for _ in 0..expected {
            children.push(Ref::read(bytes, pos, registry)?);
        }
        Ok(Self(MapRepr::Tree { shift, bitmap, children, count }))
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        let mut a = Vec::new();
        let mut b = Vec::new();
        self.encode(&mut a);
        other.encode(&mut b);
        a == b
    }
}
impl Eq for Map {}

impl Encode for Map {
    fn encode_raw(&self, out: &mut Vec<u8>) {
        match &self.0 {
            MapRepr::Leaf(entries) => {
                write_vlc(out, entries.len() as u64);
                for e in entries {
                    e.key.encode(out);
                    e.value.encode(out);
                }
            }
            MapRepr::Tree { shift, bitmap, children, count } => {
                write_vlc(out, *count);
                out.extend_from_slice(&bitmap.to_be_bytes());
                write_vlc(out, u64::from(*shift));
                for c in children {
                    c.encode(out);
                }
            }
        }
    }

    fn tag(&self) -> u8 {
        match &self.0 {
            MapRepr::Leaf(_) => tag::MAP_LEAF,
            MapRepr::Tree { .. } => tag::MAP_TREE,
        }
    }

    fn estimated_encoding_size(&self) -> usize {
        match &self.0 {
            MapRepr::Leaf(entries) => entries.len() * 32 + 4,
            MapRepr::Tree { children, .. } => children.len() * (1 + crate::limits::HASH_LEN) + 8 + BRANCHING,
        }
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

    fn addr_key(i: u64) -> Cell {
        Cell::Address(crate::address::Address::from_u64(i))
    }

    #[test]
    fn empty_map_encoding() {
        let m = Map::empty();
        let mut buf = Vec::new();
        m.encode(&mut buf);
        assert_eq!(buf, vec![tag::MAP_LEAF, 0x00]);
    }

    #[test]
    fn assoc_then_get() {
        let store = MemoryStore::new();
        let registry = reg();
        let m = Map::empty();
        let m = m.assoc(addr_key(1), Cell::Long(42), &store, &registry).unwrap();
        let v = m.get(&addr_key(1), &store, &registry).unwrap().unwrap();
        assert_eq!(*v, Cell::Long(42));
    }

    #[test]
    fn assoc_dissoc_round_trip() {
        let store = MemoryStore::new();
        let registry = reg();
        let m = Map::empty();
        let m2 = m.assoc(addr_key(1), Cell::Bool(true), &store, &registry).unwrap();
        let m3 = m2.dissoc(&addr_key(1), &store, &registry).unwrap();
        assert_eq!(m3.len(), 0);
        assert_eq!(m3, m);
    }

    #[test]
    fn nine_entries_become_a_tree_then_collapse() {
        let store = MemoryStore::new();
        let registry = reg();
        let mut m = Map::empty();
        for i in 0..9u64 {
            m = m.assoc(addr_key(i), Cell::Long(i as i64), &store, &registry).unwrap();
        }
        assert!(m.is_tree());
        assert_eq!(m.len(), 9);

        let mut reduced = m.clone();
        for i in [0u64, 1u64] {
            reduced = reduced.dissoc(&addr_key(i), &store, &registry).unwrap();
        }
        assert_eq!(reduced.len(), 7);
        assert!(!reduced.is_tree());

        let mut fresh = Map::empty();
        for i in 2..9u64 {
            fresh = fresh.assoc(addr_key(i), Cell::Long(i as i64), &store, &registry).unwrap();
        }
        assert_eq!(fresh.hash_for_test(), reduced.hash_for_test());
    }

    impl Map {
        fn hash_for_test(&self) -> Hash {
            let mut buf = Vec::new();
            self.encode(&mut buf);
            Hash::of(&buf)
        }
    }
}
