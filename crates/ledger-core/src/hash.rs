//! Content hashing.
//!
//! A [`Hash`] is the 32-byte SHA3-256 digest of a cell's canonical
//! encoding. It doubles as the cell's identity (`spec.md` §3: two cells are
//! equal iff their hashes are equal) and as the store's key.

use std::fmt;

use sha3::{Digest, Sha3_256};

use crate::limits::HASH_LEN;

/// A 32-byte SHA3-256 content hash.
///
/// Thin newtype over `[u8; HASH_LEN]`, following the `BlobHash`/`NodeId`
/// pattern: public inner bytes for zero-cost access, a `Display` impl that
/// renders lowercase hex for logs and error messages.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// View the hash as a byte slice.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Compute the content hash of `encoding`.
    ///
    /// `encoding` must already be a cell's canonical byte encoding; this
    /// function performs no validation of its shape.
    #[must_use]
    pub fn of(encoding: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(encoding);
        let digest = hasher.finalize();
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = Hash::of(b"hello");
        let b = Hash::of(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_distinguishes_content() {
        let a = Hash::of(b"hello");
        let b = Hash::of(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn display_renders_lowercase_hex() {
        let h = Hash([0xab; HASH_LEN]);
        let rendered = h.to_string();
        assert_eq!(rendered.len(), HASH_LEN * 2);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(&rendered[0..2], "ab");
    }
}
