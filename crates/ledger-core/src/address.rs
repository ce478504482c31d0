//! `Address`: a non-negative 64-bit account index.

use crate::encoding::{read_vlc, tag, write_vlc, Encode};
use crate::error::CoreError;

/// A non-negative 64-bit account index.
///
/// Physically a `LongBlob` (`spec.md` §3): a 64-bit long reinterpreted as
/// eight bytes, always embedded. The canonical encoding is the tag byte
/// followed by the value as a variable-length count (`spec.md` §6):
/// `Address(0)` is `[addressTag, 0x00]`, `Address(127)` is
/// `[addressTag, 0x7F]`, `Address(128)` is `[addressTag, 0x81, 0x00]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address {
    /// Construct an address from a non-negative account index.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidData`] if `value` is negative.
    pub fn new(value: i64) -> Result<Self, CoreError> {
        u64::try_from(value)
            .map(Self)
            .map_err(|_| CoreError::InvalidData(format!("address value {value} is negative")))
    }

    /// Construct an address directly from a non-negative `u64`.
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// The account index.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    pub(crate) fn read(bytes: &[u8], pos: &mut usize) -> Result<Self, CoreError> {
        let value = read_vlc(bytes, pos)?;
        Ok(Self(value))
    }
}

impl Encode for Address {
    fn encode_raw(&self, out: &mut Vec<u8>) {
        write_vlc(out, self.0);
    }

    fn tag(&self) -> u8 {
        tag::ADDRESS
    }

    fn estimated_encoding_size(&self) -> usize {
        10
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn encoded(a: Address) -> Vec<u8> {
        let mut out = Vec::new();
        a.encode(&mut out);
        out
    }

    #[test]
    fn address_zero() {
        assert_eq!(encoded(Address::from_u64(0)), vec![tag::ADDRESS, 0x00]);
    }

    #[test]
    fn address_127() {
        assert_eq!(encoded(Address::from_u64(127)), vec![tag::ADDRESS, 0x7F]);
    }

    #[test]
    fn address_128() {
        assert_eq!(
            encoded(Address::from_u64(128)),
            vec![tag::ADDRESS, 0x81, 0x00]
        );
    }

    #[test]
    fn rejects_negative() {
        assert!(Address::new(-1).is_err());
    }

    #[test]
    fn round_trip() {
        let a = Address::from_u64(128);
        let mut buf = Vec::new();
        a.encode_raw(&mut buf);
        let mut pos = 0;
        let back = Address::read(&buf, &mut pos).unwrap();
        assert_eq!(a, back);
    }
}
