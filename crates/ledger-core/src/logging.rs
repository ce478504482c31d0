//! Structured logging helpers for the store boundary.
//!
//! `spec.md` §9 keeps the core's pure cell operations (encode, hash, assoc,
//! …) free of logging — they are called far too often, on far too small
//! data, for a log line per call to be anything but noise. Logging belongs
//! at the boundary where this crate actually does I/O: a [`Store`] read, a
//! write, and the top of a [`crate::refs::Ref::persist`] walk. This module
//! is the thin `tracing` wrapper those call sites share, the same division
//! the reference workspace draws between its hot transform paths and its
//! I/O-bound crates.

use tracing::{debug, trace};

use crate::hash::Hash;

/// Emits a trace event for a store read, hit or miss.
pub fn trace_store_read(hash: &Hash, hit: bool) {
    trace!(%hash, hit, "store read");
}

/// Emits a trace event for a store write.
pub fn trace_store_write(hash: &Hash, bytes: usize, novel: bool) {
    trace!(%hash, bytes, novel, "store write");
}

/// Emits a debug event summarizing a completed persist walk.
pub fn debug_persist_complete(root: &Hash, novel_count: usize) {
    debug!(%root, novel_count, "persist complete");
}
