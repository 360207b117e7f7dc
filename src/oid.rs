//! Object identifiers: 20-byte values serialized as 40 lowercase hex
//! characters. Grounded on the hashing crate's `ObjectId`/`hex` modules,
//! trimmed to the single fixed-width hash the specification describes (no
//! SHA-256 variant — this backend does not need to distinguish algorithms).

use std::fmt;
use std::str::FromStr;

/// Errors produced while decoding an object id from hex.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("invalid hex character at position {position}: '{character}'")]
    InvalidHex { position: usize, character: char },

    #[error("invalid hex length: expected 40, got {actual}")]
    InvalidHexLength { actual: usize },
}

const HEX_ENCODE: &[u8; 16] = b"0123456789abcdef";

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// A git object identifier: the 20-byte hash of an object's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// The all-zeros OID, used as the "old" side of a reflog entry for a
    /// ref that did not previously exist.
    pub const NULL: Self = Self([0u8; 20]);

    /// Decode a 40-character lowercase-or-uppercase hex string.
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let bytes = hex.as_bytes();
        if bytes.len() != 40 {
            return Err(HashError::InvalidHexLength { actual: bytes.len() });
        }
        let mut out = [0u8; 20];
        for i in 0..20 {
            let hi = hex_value(bytes[i * 2]).ok_or(HashError::InvalidHex {
                position: i * 2,
                character: bytes[i * 2] as char,
            })?;
            let lo = hex_value(bytes[i * 2 + 1]).ok_or(HashError::InvalidHex {
                position: i * 2 + 1,
                character: bytes[i * 2 + 1] as char,
            })?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }

    /// Construct from raw 20 bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase 40-character hex representation.
    pub fn to_hex(&self) -> String {
        let mut buf = [0u8; 40];
        for (i, &b) in self.0.iter().enumerate() {
            buf[i * 2] = HEX_ENCODE[(b >> 4) as usize];
            buf[i * 2 + 1] = HEX_ENCODE[(b & 0x0f) as usize];
        }
        // SAFETY: buf only ever contains ASCII hex digits.
        unsafe { String::from_utf8_unchecked(buf.to_vec()) }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..8])
    }
}

impl FromStr for ObjectId {
    type Err = HashError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn round_trip() {
        let oid = ObjectId::from_hex(HEX).unwrap();
        assert_eq!(oid.to_hex(), HEX);
    }

    #[test]
    fn case_insensitive() {
        let lower = ObjectId::from_hex(HEX).unwrap();
        let upper = ObjectId::from_hex(&HEX.to_uppercase()).unwrap();
        assert_eq!(lower, upper);
    }

    #[test]
    fn null_is_null() {
        assert!(ObjectId::NULL.is_null());
        assert!(!ObjectId::from_hex(HEX).unwrap().is_null());
    }

    #[test]
    fn rejects_short_hex() {
        assert!(matches!(
            ObjectId::from_hex("abcd"),
            Err(HashError::InvalidHexLength { actual: 4 })
        ));
    }

    #[test]
    fn rejects_bad_char() {
        let bad = "zz39a3ee5e6b4b0d3255bfef95601890afd80709";
        assert!(matches!(
            ObjectId::from_hex(bad),
            Err(HashError::InvalidHex { position: 0, .. })
        ));
    }

    #[test]
    fn ordering_is_byte_order() {
        let a = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        let b = ObjectId::from_hex("0000000000000000000000000000000000000002").unwrap();
        assert!(a < b);
    }
}
