use std::fmt;
use std::str::FromStr;

use amitrace_core::AmitraceError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A SHA-1 object identifier.
///
/// # Examples
///
/// ```
/// use amitrace_git::ObjectId;
///
/// let oid: ObjectId = "4b825dc642cb6eb9a060e54bf8d69288fbee4904".parse().unwrap();
/// assert_eq!(oid, ObjectId::EMPTY_TREE);
/// assert_eq!(oid.to_hex().len(), 40);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

const HEX: &[u8; 16] = b"0123456789abcdef";

impl ObjectId {
    /// Length of the raw digest.
    pub const LEN: usize = 20;
    /// Length of the hex form.
    pub const HEX_LEN: usize = 40;

    /// The all-zero id.
    pub const NULL: Self = Self([0u8; 20]);

    /// Id of the tree with no entries.
    pub const EMPTY_TREE: Self = Self([
        0x4b, 0x82, 0x5d, 0xc6, 0x42, 0xcb, 0x6e, 0xb9, 0xa0, 0x60, 0xe5, 0x4b, 0xf8, 0xd6, 0x92,
        0x88, 0xfb, 0xee, 0x49, 0x04,
    ]);

    /// Build from 20 raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AmitraceError::Decode`] if `bytes` is not 20 bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AmitraceError> {
        let arr: [u8; 20] = bytes.try_into().map_err(|_| {
            AmitraceError::Decode(format!("object id must be 20 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Parse a 40-character hex string (either case).
    pub fn from_hex(hex: &str) -> Result<Self, AmitraceError> {
        let bytes = hex.as_bytes();
        if bytes.len() != Self::HEX_LEN {
            return Err(AmitraceError::Decode(format!(
                "object id must be {} hex characters, got {}",
                Self::HEX_LEN,
                bytes.len()
            )));
        }
        let mut out = [0u8; 20];
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let hi = nibble(pair[0]);
            let lo = nibble(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out[i] = (hi << 4) | lo,
                _ => {
                    return Err(AmitraceError::Decode(format!("invalid hex in object id: {hex}")))
                }
            }
        }
        Ok(Self(out))
    }

    /// Whether `s` looks like a full hex id.
    pub fn is_valid_hex(s: &str) -> bool {
        s.len() == Self::HEX_LEN && s.bytes().all(|b| nibble(b).is_some())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if this is the all-zero id.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Lowercase hex form.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(Self::HEX_LEN);
        for &b in &self.0 {
            s.push(HEX[(b >> 4) as usize] as char);
            s.push(HEX[(b & 0x0f) as usize] as char);
        }
        s
    }

    /// First `n` hex characters.
    pub fn short(&self, n: usize) -> String {
        let hex = self.to_hex();
        hex[..n.min(Self::HEX_LEN)].to_string()
    }
}

fn nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short(8))
    }
}

impl FromStr for ObjectId {
    type Err = AmitraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s.trim())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX_ID: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";

    #[test]
    fn hex_round_trip() {
        let oid = ObjectId::from_hex(HEX_ID).unwrap();
        assert_eq!(oid.to_hex(), HEX_ID);
        assert_eq!(oid.to_string(), HEX_ID);
        assert_eq!(ObjectId::from_bytes(oid.as_bytes()).unwrap(), oid);
    }

    #[test]
    fn uppercase_is_accepted() {
        let oid = ObjectId::from_hex(&HEX_ID.to_uppercase()).unwrap();
        assert_eq!(oid.to_hex(), HEX_ID);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ObjectId::from_hex("abc").is_err());
        assert!(ObjectId::from_hex(&"g".repeat(40)).is_err());
        assert!(ObjectId::from_bytes(&[0u8; 19]).is_err());
    }

    #[test]
    fn empty_tree_constant_matches_hex() {
        assert_eq!(
            ObjectId::EMPTY_TREE.to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
        assert!(ObjectId::NULL.is_null());
        assert!(!ObjectId::EMPTY_TREE.is_null());
    }

    #[test]
    fn debug_is_abbreviated() {
        let oid = ObjectId::from_hex(HEX_ID).unwrap();
        assert_eq!(format!("{oid:?}"), "ObjectId(da39a3ee)");
    }
}
