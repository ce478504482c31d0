//! Compile-time constants and the advisory store budget.
//!
//! The embedding threshold, chunk size, and branching factors are fixed
//! constants, not configuration — `spec.md` §9 is explicit that these are
//! "compile-time constants" and that the core carries no global state. The
//! one thing a caller legitimately tunes is how much memory a [`Store`]
//! implementation is willing to hold, which is why [`Limits`] exists: it is
//! advisory only, the same way `echo-cas::MemoryTier`'s byte budget is
//! advisory rather than enforced by `put`.
//!
//! [`Store`]: crate::store::Store

/// A cell is embedded iff its encoding is at most this many bytes.
///
/// This constant must match the reference implementation exactly — an
/// off-by-one here changes every downstream hash (`spec.md` §9, Open
/// Question).
pub const EMBEDDED_LIMIT: usize = 140;

/// Size, in bytes, of a single leaf chunk of a chunked [`Blob`](crate::blob::Blob).
pub const CHUNK_SIZE: usize = 4096;

/// Maximum number of entries a `MapLeaf` may hold before it must split into
/// a `MapTree`.
pub const MAP_LEAF_MAX: usize = 8;

/// Number of slots in a `MapTree` node and in a vector tree node.
pub const BRANCHING: usize = 16;

/// Number of bits consumed by one level of map-tree or vector-tree descent.
pub const SHIFT_BITS: u32 = 4;

/// Length, in bytes, of a content hash (SHA3-256 digest).
pub const HASH_LEN: usize = 32;

/// Maximum byte length of a [`Keyword`](crate::primitives::Keyword) or
/// [`Symbol`](crate::primitives::Symbol) name.
///
/// A name this long still embeds (one length byte + up to 128 bytes of
/// UTF-8 plus a one-byte tag is well under [`EMBEDDED_LIMIT`]); a longer
/// name is rejected at construction rather than allowed to became a
/// non-embedded key, which would defeat the purpose of a lightweight name.
pub const MAX_NAME_LEN: usize = 128;

/// Advisory byte budget for a [`Store`](crate::store::Store) implementation.
///
/// Mirrors `echo-cas::MemoryTier::with_limits`: exceeding the budget never
/// fails a write, it only changes what
/// [`is_over_budget`](Limits::is_over_budget) reports. Enforcement
/// (eviction) is the job of a higher layer, not this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limits {
    max_bytes: Option<usize>,
}

impl Limits {
    /// No budget: a store configured this way never reports over-budget.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self { max_bytes: None }
    }

    /// A store configured with an advisory byte budget.
    #[must_use]
    pub const fn bounded(max_bytes: usize) -> Self {
        Self {
            max_bytes: Some(max_bytes),
        }
    }

    /// Returns `true` if `used_bytes` exceeds the configured budget.
    ///
    /// Always `false` for [`Limits::unbounded`].
    #[must_use]
    pub fn is_over_budget(&self, used_bytes: usize) -> bool {
        self.max_bytes.is_some_and(|max| used_bytes > max)
    }
}
