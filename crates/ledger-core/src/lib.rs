//! Immutable, content-addressed core data model and canonical binary
//! encoding for a ledger.
//!
//! This crate is the bottom layer only: the [`Cell`] sum type, its
//! canonical encoding, the [`Ref`] indirection that lets a large cell be
//! hash-addressed instead of inlined, and the persistent collection types
//! (`HashMap`, `HashSet`, `Vector`, `Record`) built from them. It knows
//! nothing about consensus, networking, or accounts beyond the bare
//! [`Address`] index — those live in higher layers that depend on this one.
//!
//! Start at [`Cell`] for the data model, [`encoding`] for the wire format,
//! and [`store::Store`] for how a cell's non-embedded children are
//! persisted and retrieved.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]

pub mod address;
pub mod blob;
pub mod cell;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod limits;
pub mod logging;
pub mod map;
pub mod primitives;
pub mod record;
pub mod refs;
pub mod set;
pub mod store;
pub mod vector;

pub use address::Address;
pub use blob::{Blob, CString};
pub use cell::Cell;
pub use encoding::{Decode, Encode};
pub use error::CoreError;
pub use hash::Hash;
pub use limits::Limits;
pub use map::Map;
pub use primitives::{Keyword, Symbol};
pub use record::{Record, SchemaRegistry};
pub use refs::{Ref, RefStatus};
pub use set::Set;
pub use store::{MemoryStore, Store};
pub use vector::Vector;
