// After `Ref::persist` promotes a cell to `Persisted`, every hash reachable
// from it must be present in the store — the closure property `SPEC_FULL.md`
// §8 calls out as the contract a gossip layer relies on.

#![allow(clippy::unwrap_used, missing_docs)]

use ledger_core::{
    Address, Blob, Cell, Encode, Keyword, Map, MemoryStore, Record, Ref, RefStatus, SchemaRegistry, Set, Store, Vector,
};

fn reachable_hashes(cell: &Cell, store: &MemoryStore, registry: &SchemaRegistry, out: &mut Vec<ledger_core::Hash>) {
    for child in cell.child_refs() {
        if child.is_embedded() {
            if let Some(c) = child.peek() {
                reachable_hashes(&c, store, registry, out);
            }
            continue;
        }
        let hash = child.get_hash();
        out.push(hash);
        let c = child.get_value(store, registry).unwrap();
        reachable_hashes(&c, store, registry, out);
    }
}

#[test]
fn persisting_a_deep_structure_makes_every_descendant_fetchable() {
    let store = MemoryStore::new();
    let registry = SchemaRegistry::new();

    let big_blob = Blob::from_bytes(&vec![5u8; 20_000]);
    let mut set = Set::empty();
    for i in 0..20u64 {
        set = set.include(Cell::Address(Address::from_u64(i)), &store, &registry).unwrap();
    }
    let mut vector = Vector::empty();
    for i in 0..40i64 {
        vector = vector.append(Cell::Long(i));
    }
    let mut map = Map::empty();
    map = map
        .assoc(Cell::Address(Address::from_u64(1)), Cell::Blob(big_blob), &store, &registry)
        .unwrap();
    let record = Record::new(
        vec![
            Keyword::new("set").unwrap(),
            Keyword::new("vector").unwrap(),
            Keyword::new("map").unwrap(),
        ],
        vec![Cell::Set(set), Cell::Vector(vector), Cell::Map(map)],
        &registry,
    )
    .unwrap();

    let root = Ref::new(Cell::Record(record));
    let mut novel = Vec::new();
    let status = root.persist(&store, &registry, &mut |h, bytes| novel.push((*h, bytes.to_vec()))).unwrap();
    assert_eq!(status, RefStatus::Persisted);

    let top_cell = root.get_value(&store, &registry).unwrap();
    let mut reachable = Vec::new();
    reachable_hashes(&top_cell, &store, &registry, &mut reachable);

    for hash in &reachable {
        let bytes = store.read(hash).unwrap();
        assert!(bytes.is_some(), "hash {hash} reachable from the persisted root but absent from the store");
    }

    for (hash, bytes) in &novel {
        assert_eq!(store.read(hash).unwrap().as_deref(), Some(bytes.as_slice()));
    }
}

#[test]
fn persist_is_idempotent_and_reports_no_novel_hashes_on_second_call() {
    let store = MemoryStore::new();
    let registry = SchemaRegistry::new();
    let cell = Cell::Blob(Blob::from_bytes(&vec![1u8; 5000]));
    let r = Ref::new(cell);

    let mut novel_first = Vec::new();
    r.persist(&store, &registry, &mut |h, _| novel_first.push(*h)).unwrap();
    assert!(!novel_first.is_empty());

    let mut novel_second = Vec::new();
    let status = r.persist(&store, &registry, &mut |h, _| novel_second.push(*h)).unwrap();
    assert_eq!(status, RefStatus::Persisted);
    assert!(novel_second.is_empty());
}

#[test]
fn ref_for_hash_resolves_a_stored_encoding() {
    let store = MemoryStore::new();
    let registry = SchemaRegistry::new();
    let cell = Cell::Long(42);
    let mut buf = Vec::new();
    cell.encode(&mut buf);
    let hash = cell.hash();
    store.write(hash, &buf).unwrap();

    let r = ledger_core::store::ref_for_hash(&store, hash).unwrap().unwrap();
    assert_eq!(r.status(), RefStatus::Persisted);
    let fetched = r.get_value(&store, &registry).unwrap();
    assert_eq!(*fetched, cell);
}
