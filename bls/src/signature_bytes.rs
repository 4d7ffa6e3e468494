use core::fmt::{Debug, Display, Formatter, Result as FmtResult};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use ssz::{Decode, DecodeError, Encode};
use tree_hash::{Hash256, PackedEncoding, TreeHash, TreeHashType};

const COMPRESSED_SIZE: usize = 96;

/// A BLS signature in its compressed wire form.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureBytes(pub [u8; COMPRESSED_SIZE]);

impl SignatureBytes {
    /// The compressed point at infinity, used as a placeholder signature.
    #[must_use]
    pub const fn empty() -> Self {
        let mut bytes = [0; COMPRESSED_SIZE];
        bytes[0] = 0xc0;
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; COMPRESSED_SIZE] {
        &self.0
    }
}

impl Default for SignatureBytes {
    #[inline]
    fn default() -> Self {
        Self::empty()
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "0x{}", hex::encode(self.0))
    }
}

impl Display for SignatureBytes {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "0x{}", hex::encode(self.0))
    }
}

impl Encode for SignatureBytes {
    #[inline]
    fn is_ssz_fixed_len() -> bool {
        true
    }

    #[inline]
    fn ssz_fixed_len() -> usize {
        COMPRESSED_SIZE
    }

    #[inline]
    fn ssz_bytes_len(&self) -> usize {
        COMPRESSED_SIZE
    }

    #[inline]
    fn ssz_append(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0);
    }
}

impl Decode for SignatureBytes {
    #[inline]
    fn is_ssz_fixed_len() -> bool {
        true
    }

    #[inline]
    fn ssz_fixed_len() -> usize {
        COMPRESSED_SIZE
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != COMPRESSED_SIZE {
            return Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: COMPRESSED_SIZE,
            });
        }

        let mut fixed = [0; COMPRESSED_SIZE];
        fixed.copy_from_slice(bytes);
        Ok(Self(fixed))
    }
}

impl TreeHash for SignatureBytes {
    fn tree_hash_type() -> TreeHashType {
        TreeHashType::Vector
    }

    fn tree_hash_packed_encoding(&self) -> PackedEncoding {
        unreachable!("signature bytes are merkleized as a vector of bytes")
    }

    fn tree_hash_packing_factor() -> usize {
        unreachable!("signature bytes are merkleized as a vector of bytes")
    }

    fn tree_hash_root(&self) -> Hash256 {
        tree_hash::merkle_root(&self.0, COMPRESSED_SIZE.div_ceil(32))
    }
}

impl Serialize for SignatureBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for SignatureBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        let stripped = string
            .strip_prefix("0x")
            .ok_or_else(|| D::Error::custom("signature must start with 0x"))?;

        let bytes = hex::decode(stripped).map_err(D::Error::custom)?;

        if bytes.len() != COMPRESSED_SIZE {
            return Err(D::Error::custom(format!(
                "signature must be {COMPRESSED_SIZE} bytes long",
            )));
        }

        let mut fixed = [0; COMPRESSED_SIZE];
        fixed.copy_from_slice(&bytes);
        Ok(Self(fixed))
    }
}
