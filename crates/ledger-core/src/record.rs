//! `Record`: a fixed ordered schema with no key names in the encoding.
//!
//! `spec.md` §4.6: a record's schema — an ordered list of field
//! [`Keyword`]s — is registered once with a [`SchemaRegistry`] and assigned
//! its own tag byte starting at [`tag::RECORD_SCHEMA_TAG_BASE`]. Every
//! record of that schema then encodes as just that tag followed by its
//! field values in schema order: the field names never appear on the wire.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::cell::Cell;
use crate::encoding::{tag, Decode, Encode};
use crate::error::CoreError;
use crate::map::Map;
use crate::primitives::Keyword;
use crate::refs::Ref;
use crate::store::Store;

/// Maps ordered field-keyword schemas to tag bytes.
///
/// Registration is append-only and assigns tags sequentially from
/// [`tag::RECORD_SCHEMA_TAG_BASE`]; a registry is shared (`Arc`-wrapped
/// internals behind a `RwLock`) so the same process can decode records
/// produced by code that registered the schema earlier.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    by_tag: HashMap<u8, Arc<[Keyword]>>,
    by_schema: HashMap<Vec<Keyword>, u8>,
}

impl SchemaRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `fields` as a schema if not already known, returning its
    /// tag byte.
    ///
    /// # Errors
    ///
    /// [`CoreError::Unsupported`] if every tag from
    /// [`tag::RECORD_SCHEMA_TAG_BASE`] through `0xFF` is already assigned.
    pub fn register(&self, fields: Vec<Keyword>) -> Result<u8, CoreError> {
        {
            let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(&t) = inner.by_schema.get(&fields) {
                return Ok(t);
            }
        }
        let mut inner = self.inner.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(&t) = inner.by_schema.get(&fields) {
            return Ok(t);
        }
        // The first schema a process ever registers takes the reserved
        // generic `Record` tag; every later schema overflows into the
        // 0x80+ range a `SchemaRegistry` hands out (`spec.md` §6).
        let next = if inner.by_tag.is_empty() {
            tag::RECORD_RESERVED
        } else {
            tag::RECORD_SCHEMA_TAG_BASE
                .checked_add((inner.by_tag.len() - 1) as u8)
                .ok_or_else(|| CoreError::Unsupported("record schema tag space exhausted".to_owned()))?
        };
        inner.by_tag.insert(next, Arc::from(fields.clone()));
        inner.by_schema.insert(fields, next);
        Ok(next)
    }

    /// Looks up the tag already assigned to `fields`, if any.
    #[must_use]
    pub fn tag_for(&self, fields: &[Keyword]) -> Option<u8> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.by_schema.get(fields).copied()
    }

    /// Looks up the field schema registered to `tag`, if any.
    #[must_use]
    pub fn schema_for(&self, tag: u8) -> Option<Arc<[Keyword]>> {
        let inner = self.inner.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.by_tag.get(&tag).cloned()
    }
}

/// A record: a value for each field of a registered schema, in schema
/// order. No key names appear in the encoding — only the schema's tag byte
/// and the ordered field values.
#[derive(Clone, Debug)]
pub struct Record {
    schema: Arc<[Keyword]>,
    schema_tag: u8,
    values: Vec<Ref>,
}

impl Record {
    /// Builds a record for `schema`, registering it with `registry` if
    /// needed.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidData`] if `values.len() != schema.len()`;
    /// otherwise propagates [`SchemaRegistry::register`] errors.
    pub fn new(schema: Vec<Keyword>, values: Vec<Cell>, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        if values.len() != schema.len() {
            return Err(CoreError::InvalidData(format!(
                "record has {} values for a {}-field schema",
                values.len(),
                schema.len()
            )));
        }
        let schema_tag = registry.register(schema.clone())?;
        Ok(Self {
            schema: Arc::from(schema),
            schema_tag,
            values: values.into_iter().map(Ref::new).collect(),
        })
    }

    /// The field schema, in order.
    #[must_use]
    pub fn schema(&self) -> &[Keyword] {
        &self.schema
    }

    /// Looks up a field by name.
    ///
    /// # Errors
    ///
    /// Propagates [`Ref::get_value`] errors for a dehydrated field value.
    pub fn get(&self, key: &Keyword, store: &dyn Store, registry: &SchemaRegistry) -> Result<Option<Arc<Cell>>, CoreError> {
        match self.schema.iter().position(|k| k == key) {
            Some(i) => self.values[i].get_value(store, registry).map(Some),
            None => Ok(None),
        }
    }

    /// Returns a record with field `key` set to `value`. A `key` already in
    /// the schema replaces that field's value in place, keeping this
    /// record's schema and tag. A `key` outside the schema upgrades the
    /// result to a general [`Map`] instead — a record's schema is fixed, so
    /// an unknown key cannot be added to it (`spec.md` §4.6).
    ///
    /// # Errors
    ///
    /// Propagates [`Ref::get_value`]/[`Map::assoc`] errors.
    pub fn assoc(&self, key: Keyword, value: Cell, store: &dyn Store, registry: &SchemaRegistry) -> Result<RecordOrMap, CoreError> {
        if let Some(i) = self.schema.iter().position(|k| *k == key) {
            let mut values = self.values.clone();
            values[i] = Ref::new(value);
            return Ok(RecordOrMap::Record(Self { schema: Arc::clone(&self.schema), schema_tag: self.schema_tag, values }));
        }
        let mut map = Map::empty();
        for (k, v) in self.schema.iter().zip(&self.values) {
            let field_value = v.get_value(store, registry)?;
            map = map.assoc(Cell::Keyword(k.clone()), field_value.as_ref().clone(), store, registry)?;
        }
        map = map.assoc(Cell::Keyword(key), value, store, registry)?;
        Ok(RecordOrMap::Map(map))
    }

    pub(crate) fn child_refs(&self) -> Vec<&Ref> {
        self.values.iter().collect()
    }

    pub(crate) fn read(bytes: &[u8], pos: &mut usize, schema_tag: u8, registry: &SchemaRegistry) -> Result<Self, CoreError> {
        let start = *pos;
        let Some(schema) = registry.schema_for(schema_tag) else {
            return Err(CoreError::bad_format(start, "record references an unregistered schema tag"));
        };
        let mut values = Vec::with_capacity(schema.len());
        for _ in 0..schema.len() {
            values.push(Ref::read(bytes, pos, registry)?);
        }
        Ok(Self { schema, schema_tag, values })
    }
}

/// The result of [`Record::assoc`]: either the same-schema record with one
/// field updated, or a schema-free [`Map`] when `assoc` added a field the
/// schema doesn't have.
#[derive(Clone, Debug)]
pub enum RecordOrMap {
    /// `assoc` stayed within the record's schema.
    Record(Record),
    /// `assoc` added a field outside the schema; the result no longer fits
    /// any fixed schema.
    Map(Map),
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        let mut a = Vec::new();
        let mut b = Vec::new();
        self.encode(&mut a);
        other.encode(&mut b);
        a == b
    }
}
impl Eq for Record {}

impl Encode for Record {
    fn encode_raw(&self, out: &mut Vec<u8>) {
        for v in &self.values {
            v.encode(out);
        }
    }

    fn tag(&self) -> u8 {
        self.schema_tag
    }

    fn estimated_encoding_size(&self) -> usize {
        self.values.len() * (1 + crate::limits::HASH_LEN)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::store::MemoryStore;

    fn schema() -> Vec<Keyword> {
        vec![Keyword::new("balance").unwrap(), Keyword::new("sequence").unwrap()]
    }

    #[test]
    fn register_is_idempotent() {
        let registry = SchemaRegistry::new();
        let t1 = registry.register(schema()).unwrap();
        let t2 = registry.register(schema()).unwrap();
        assert_eq!(t1, t2);
        assert_eq!(t1, tag::RECORD_RESERVED);
    }

    #[test]
    fn different_schemas_get_different_tags() {
        let registry = SchemaRegistry::new();
        let t1 = registry.register(schema()).unwrap();
        let t2 = registry.register(vec![Keyword::new("name").unwrap()]).unwrap();
        assert_ne!(t1, t2);
    }

    #[test]
    fn get_and_assoc_within_schema() {
        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();
        let record = Record::new(schema(), vec![Cell::Long(100), Cell::Long(1)], &registry).unwrap();
        let balance = record.get(&Keyword::new("balance").unwrap(), &store, &registry).unwrap().unwrap();
        assert_eq!(*balance, Cell::Long(100));

        let RecordOrMap::Record(updated) = record
            .assoc(Keyword::new("sequence").unwrap(), Cell::Long(2), &store, &registry)
            .unwrap()
        else {
            panic!("expected an in-schema update to stay a Record");
        };
        let seq = updated.get(&Keyword::new("sequence").unwrap(), &store, &registry).unwrap().unwrap();
        assert_eq!(*seq, Cell::Long(2));
    }

    #[test]
    fn assoc_outside_schema_upgrades_to_map() {
        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();
        let record = Record::new(schema(), vec![Cell::Long(100), Cell::Long(1)], &registry).unwrap();
        let result = record.assoc(Keyword::new("extra").unwrap(), Cell::Bool(true), &store, &registry).unwrap();
        assert!(matches!(result, RecordOrMap::Map(_)));
    }
}
