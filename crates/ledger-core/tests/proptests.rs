// Property-based coverage of the encoding round-trip and canonical-form
// invariants (`SPEC_FULL.md` §8): every well-formed cell round-trips through
// `encode`/`decode` unchanged, equality tracks hash equality, and a map's
// mandatory collapse rules hold regardless of insertion order.

#![allow(clippy::unwrap_used, missing_docs)]

use proptest::prelude::*;

use ledger_core::{Address, Cell, Encode, Keyword, MemoryStore, SchemaRegistry};

fn round_trip(cell: &Cell) -> Cell {
    let mut buf = Vec::new();
    cell.encode(&mut buf);
    let mut pos = 0;
    let registry = SchemaRegistry::new();
    let back = Cell::decode(&buf, &mut pos, &registry).unwrap();
    assert_eq!(pos, buf.len(), "decode must consume the full encoding");
    back
}

fn leaf_cell_strategy() -> impl Strategy<Value = Cell> {
    prop_oneof![
        Just(Cell::Bool(true)),
        Just(Cell::Bool(false)),
        any::<i64>().prop_map(Cell::Long),
        any::<u32>()
            .prop_filter_map("valid scalar value", char::from_u32)
            .prop_map(Cell::Char),
        (0u64..1_000_000).prop_map(|v| Cell::Address(Address::from_u64(v))),
        "[a-z][a-z0-9_]{0,20}".prop_map(|s| Cell::Keyword(Keyword::new(&s).unwrap())),
    ]
}

proptest! {
    #[test]
    fn vlc_round_trips_any_u64(v in any::<u64>()) {
        let mut out = Vec::new();
        ledger_core::encoding::write_vlc(&mut out, v);
        let mut pos = 0;
        let got = ledger_core::encoding::read_vlc(&out, &mut pos).unwrap();
        prop_assert_eq!(got, v);
        prop_assert_eq!(pos, out.len());
    }

    #[test]
    fn long_round_trips(v in any::<i64>()) {
        let cell = Cell::Long(v);
        prop_assert_eq!(round_trip(&cell), cell);
    }

    #[test]
    fn address_round_trips(v in 0u64..u64::MAX / 2) {
        let cell = Cell::Address(Address::from_u64(v));
        prop_assert_eq!(round_trip(&cell), cell);
    }

    #[test]
    fn keyword_round_trips(name in "[a-z][a-z0-9_]{0,40}") {
        let cell = Cell::Keyword(Keyword::new(&name).unwrap());
        prop_assert_eq!(round_trip(&cell), cell);
    }

    #[test]
    fn blob_round_trips_flat_and_chunked(bytes in prop::collection::vec(any::<u8>(), 0..9000)) {
        let cell = Cell::Blob(ledger_core::Blob::from_bytes(&bytes));
        prop_assert_eq!(round_trip(&cell), cell);
    }

    #[test]
    fn cstring_round_trips(s in "\\PC*") {
        let cell = Cell::CString(ledger_core::CString::from_str(&s));
        prop_assert_eq!(round_trip(&cell), cell);
    }

    #[test]
    fn equality_tracks_hash_equality(a in any::<i64>(), b in any::<i64>()) {
        let ca = Cell::Long(a);
        let cb = Cell::Long(b);
        prop_assert_eq!(ca == cb, ca.hash() == cb.hash());
    }

    #[test]
    fn map_assoc_order_is_insensitive(
        raw_entries in prop::collection::vec((0u64..64, any::<i64>()), 0..30)
    ) {
        // Fold duplicate keys (last one in `raw_entries` wins) so both
        // insertion orders below are associating the exact same final
        // key/value set, not racing over who wrote a shared key last.
        let mut canonical = std::collections::BTreeMap::new();
        for (k, v) in &raw_entries {
            canonical.insert(*k, *v);
        }
        let entries: Vec<(u64, i64)> = canonical.into_iter().collect();

        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();

        let mut forward = ledger_core::Map::empty();
        for (k, v) in &entries {
            forward = forward.assoc(Cell::Address(Address::from_u64(*k)), Cell::Long(*v), &store, &registry).unwrap();
        }

        let mut backward = ledger_core::Map::empty();
        for (k, v) in entries.iter().rev() {
            backward = backward.assoc(Cell::Address(Address::from_u64(*k)), Cell::Long(*v), &store, &registry).unwrap();
        }

        let mut forward_buf = Vec::new();
        forward.encode(&mut forward_buf);
        let mut backward_buf = Vec::new();
        backward.encode(&mut backward_buf);
        prop_assert_eq!(forward_buf, backward_buf);
    }

    #[test]
    fn vector_append_then_get_round_trips(values in prop::collection::vec(any::<i64>(), 0..200)) {
        let store = MemoryStore::new();
        let registry = SchemaRegistry::new();
        let v = ledger_core::Vector::from_cells(values.iter().map(|n| Cell::Long(*n)));
        prop_assert_eq!(v.count(), values.len() as u64);
        for (i, expected) in values.iter().enumerate() {
            let got = v.get(i as u64, &store, &registry).unwrap();
            prop_assert_eq!((*got).clone(), Cell::Long(*expected));
        }
    }

    #[test]
    fn embedding_dichotomy_matches_encoded_length(cell in leaf_cell_strategy()) {
        let mut buf = Vec::new();
        cell.encode(&mut buf);
        prop_assert_eq!(cell.is_embedded(), buf.len() <= ledger_core::limits::EMBEDDED_LIMIT);
    }
}
