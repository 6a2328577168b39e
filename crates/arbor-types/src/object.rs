use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of an [`ObjectId`] digest in bytes.
pub const OID_LEN: usize = 32;

/// Content identifier for a blob, tree or commit.
///
/// An `ObjectId` is a BLAKE3 digest of the object's encoded content, so two
/// objects with identical content always share one id. Ids are only minted by
/// the object store; callers treat them as opaque.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; OID_LEN]);

impl ObjectId {
    /// Hash raw bytes without any domain tag.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap a pre-computed digest.
    pub const fn from_hash(hash: [u8; OID_LEN]) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; OID_LEN] {
        &self.0
    }

    /// Full lowercase hex form (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated hex form used in logs (8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse a full 64-character hex id.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; OID_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: OID_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; OID_LEN]> for ObjectId {
    fn from(bytes: [u8; OID_LEN]) -> Self {
        Self(bytes)
    }
}
