//! `Vector`: a radix-balanced persistent array.
//!
//! `spec.md` §4.4: a 16-way trie of full interior nodes plus a partially
//! filled tail, the classic Clojure/Convex persistent-vector shape. Indexing
//! and `append` are `O(log16 n)`; `append` is amortized `O(1)` because the
//! tail absorbs pushes until it fills.

use std::sync::Arc;

use crate::cell::Cell;
use crate::encoding::{read_vlc, tag, write_vlc, Decode, Encode};
use crate::error::CoreError;
use crate::limits::{BRANCHING, SHIFT_BITS};
use crate::record::SchemaRegistry;
use crate::refs::Ref;
use crate::store::Store;

/// A persistent, radix-balanced vector.
#[derive(Clone, Debug)]
pub struct Vector {
    count: u64,
    shift: u32,
    tree: Vec<Ref>,
    tail: Vec<Ref>,
}

impl Vector {
    /// The empty vector.
    #[must_use]
    pub fn empty() -> Self {
        Self { count: 0, shift: SHIFT_BITS, tree: Vec::new(), tail: Vec::new() }
    }

    /// Builds a vector from an iterator of cells, by repeated [`Vector::append`].
    #[must_use]
    pub fn from_cells(cells: impl IntoIterator<Item = Cell>) -> Self {
        let mut v = Self::empty();
        for c in cells {
            v = v.append(c);
        }
        v
    }

    /// Number of elements.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// `true` iff the vector has no elements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    const fn tail_offset(&self) -> u64 {
        if self.count < BRANCHING as u64 {
            0
        } else {
            ((self.count - 1) / BRANCHING as u64) * BRANCHING as u64
        }
    }

    /// Returns the element at `index`, loading trie nodes from `store` as
    /// needed.
    ///
    /// # Errors
    ///
    /// [`CoreError::IndexOutOfBounds`] if `index >= count()`; otherwise
    /// propagates [`CoreError`] from a dehydrated node `store` cannot
    /// supply.
    pub fn get(&self, index: u64, store: &dyn Store, registry: &SchemaRegistry) -> Result<Arc<Cell>, CoreError> {
        if index >= self.count {
            return Err(CoreError::IndexOutOfBounds { index, len: self.count });
        }
        if index >= self.tail_offset() {
            let i = (index - self.tail_offset()) as usize;
            return self.tail[i].get_value(store, registry);
        }
        Self::get_in_node(&self.tree, self.shift, index, store, registry)
    }

    fn get_in_node(
        node_refs: &[Ref],
        level: u32,
        index: u64,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Arc<Cell>, CoreError> {
        let i = ((index >> level) & 0xF) as usize;
        let child = &node_refs[i];
        if level == 0 {
            return child.get_value(store, registry);
        }
        let child_cell = child.get_value(store, registry)?;
        let Cell::Vector(inner) = child_cell.as_ref() else {
            return Err(CoreError::InvalidData("vector trie child is not a vector node".to_owned()));
        };
        Self::get_in_node(&inner.tree, level - SHIFT_BITS, index, store, registry)
    }

    /// Returns a new vector with `value` appended.
    #[must_use]
    pub fn append(&self, value: Cell) -> Self {
        let value_ref = Ref::new(value);
        if self.tail.len() < BRANCHING {
            let mut tail = self.tail.clone();
            tail.push(value_ref);
            return Self { count: self.count + 1, shift: self.shift, tree: self.tree.clone(), tail };
        }
        let full_tail = Self::node_from_children(self.tail.clone());
        let (new_tree, new_shift) = if (self.count >> SHIFT_BITS) > (1u64 << self.shift) {
            let mut new_root_children = vec![Self::node_from_children(self.tree.clone())];
            new_root_children.push(Self::new_path(self.shift, full_tail));
            (new_root_children, self.shift + SHIFT_BITS)
        } else if self.tree.is_empty() {
            (vec![full_tail], self.shift)
        } else {
            (Self::push_tail(&self.tree, self.shift, self.count, full_tail), self.shift)
        };
        Self { count: self.count + 1, shift: new_shift, tree: new_tree, tail: vec![value_ref] }
    }

    fn node_from_children(children: Vec<Ref>) -> Ref {
        Ref::new(Cell::Vector(Self { count: 0, shift: 0, tree: children, tail: Vec::new() }))
    }

    fn new_path(shift: u32, node: Ref) -> Ref {
        if shift == 0 {
            return node;
        }
        Self::node_from_children(vec![Self::new_path(shift - SHIFT_BITS, node)])
    }

    /// Descends the trie along the path of the about-to-be-full tail and
    /// grafts `tail_node` into the first free slot, growing any interior
    /// node along the way. `count` is this vector's element count *before*
    /// the append that triggered the graft (the tail is full, so `count -
    /// 1` is the index of the tail's last element and drives the descent).
    fn push_tail(tree: &[Ref], shift: u32, count: u64, tail_node: Ref) -> Vec<Ref> {
        let subidx = (((count - 1) >> shift) & 0xF) as usize;
        let mut new_tree = tree.to_vec();
        let grafted = if shift == SHIFT_BITS {
            tail_node
        } else if let Some(child) = new_tree.get(subidx) {
            // `child` was just built by an earlier step of this same append
            // and is always hydrated; a vector freshly loaded from a store
            // only ever calls `append` after `Ref::get_value` hydrates it.
            let child_cell = child.peek().unwrap_or_else(|| unreachable!("vector trie node built this call is always hydrated"));
            let Cell::Vector(child_node) = child_cell.as_ref() else {
                unreachable!("vector trie child is always a vector node")
            };
            Self::node_from_children(Self::push_tail(&child_node.tree, shift - SHIFT_BITS, count, tail_node))
        } else {
            Self::new_path(shift - SHIFT_BITS, tail_node)
        };
        if subidx < new_tree.len() {
            new_tree[subidx] = grafted;
        } else {
            new_tree.push(grafted);
        }
        new_tree
    }

    /// Returns a new vector with the element at `index` replaced.
    ///
    /// # Errors
    ///
    /// [`CoreError::IndexOutOfBounds`] if `index >= count()`.
    pub fn update(&self, index: u64, value: Cell, store: &dyn Store, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        if index >= self.count {
            return Err(CoreError::IndexOutOfBounds { index, len: self.count });
        }
        if index >= self.tail_offset() {
            let i = (index - self.tail_offset()) as usize;
            let mut tail = self.tail.clone();
            tail[i] = Ref::new(value);
            return Ok(Self { count: self.count, shift: self.shift, tree: self.tree.clone(), tail });
        }
        let new_tree = Self::update_in(&self.tree, self.shift, index, value, store, registry)?;
        Ok(Self { count: self.count, shift: self.shift, tree: new_tree, tail: self.tail.clone() })
    }

    fn update_in(
        node_refs: &[Ref],
        level: u32,
        index: u64,
        value: Cell,
        store: &dyn Store,
        registry: &SchemaRegistry,
    ) -> Result<Vec<Ref>, CoreError> {
        let i = ((index >> level) & 0xF) as usize;
        let mut new_refs = node_refs.to_vec();
        if level == 0 {
            new_refs[i] = Ref::new(value);
        } else {
            let child_cell = node_refs[i].get_value(store, registry)?;
            let Cell::Vector(inner) = child_cell.as_ref() else {
                return Err(CoreError::InvalidData("vector trie child is not a vector node".to_owned()));
            };
            let grown = Self::update_in(&inner.tree, level - SHIFT_BITS, index, value, store, registry)?;
            new_refs[i] = Self::node_from_children(grown);
        }
        Ok(new_refs)
    }

    pub(crate) fn child_refs(&self) -> Vec<&Ref> {
        self.tree.iter().chain(self.tail.iter()).collect()
    }

    pub(crate) fn read(bytes: &[u8], pos: &mut usize, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        let start = *pos;
        let count = read_vlc(bytes, pos)?;
        let shift = u32::try_from(read_vlc(bytes, pos)?).map_err(|_| CoreError::bad_format(start, "shift exceeds u32"))?;
        let tree_len = read_vlc(bytes, pos)?;
        let mut tree = Vec::with_capacity(tree_len as usize);
        for _ in 0..tree_len {
            tree.push(Ref::read(bytes, pos, registry)?);
        }
        let tail_len = read_vlc(bytes, pos)?;
        let mut tail = Vec::with_capacity(tail_len as usize);
        for _ in 0..tail_len {
            tail.push(Ref::read(bytes, pos, registry)?);
        }
        if tail.len() > BRANCHING {
            return Err(CoreError::bad_format(start, "vector tail exceeds branching factor"));
        }
        Ok(Self { count, shift, tree, tail })
    }
}

impl PartialEq for Vector {
    fn eq(&self, other: &Self) -> bool {
        let mut a = Vec::new();
        let mut b = Vec::new();
        self.encode(&mut a);
        other.encode(&mut b);
        a == b
    }
}
impl Eq for Vector {}

impl Encode for Vector {
    fn encode_raw(&self, out: &mut Vec<u8>) {
        write_vlc(out, self.count);
        write_vlc(out, u64::from(self.shift));
        write_vlc(out, self.tree.len() as u64);
        for r in &self.tree {
            r.encode(out);
        }
        write_vlc(out, self.tail.len() as u64);
        for r in &self.tail {
            r.encode(out);
        }
    }

    fn tag(&self) -> u8 {
        tag::VECTOR
    }

    fn estimated_encoding_size(&self) -> usize {
        (self.tree.len() + self.tail.len()) * (1 + crate::limits::HASH_LEN) + 12
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn empty_vector_encoding() {
        let v = Vector::empty();
        let mut buf = Vec::new();
        v.encode(&mut buf);
        assert_eq!(buf, vec![tag::VECTOR, 0x00, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn append_and_get() {
        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();
        let mut v = Vector::empty();
        for i in 0..40i64 {
            v = v.append(Cell::Long(i));
        }
        assert_eq!(v.count(), 40);
        for i in 0..40u64 {
            let got = v.get(i, &store, &registry).unwrap();
            assert_eq!(*got, Cell::Long(i as i64));
        }
    }

    #[test]
    fn update_preserves_other_elements() {
        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();
        let mut v = Vector::empty();
        for i in 0..20i64 {
            v = v.append(Cell::Long(i));
        }
        let v2 = v.update(5, Cell::Long(999), &store, &registry).unwrap();
        assert_eq!(*v2.get(5, &store, &registry).unwrap(), Cell::Long(999));
        assert_eq!(*v2.get(4, &store, &registry).unwrap(), Cell::Long(4));
        assert_eq!(*v.get(5, &store, &registry).unwrap(), Cell::Long(5));
    }

    #[test]
    fn out_of_bounds_get() {
        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();
        let v = Vector::from_cells([Cell::Bool(true)]);
        assert!(matches!(
            v.get(1, &store, &registry),
            Err(CoreError::IndexOutOfBounds { index: 1, len: 1 })
        ));
    }
}
