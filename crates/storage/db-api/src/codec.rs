//! Byte encodings for table keys and values.
//!
//! Every table is defined purely in terms of byte sequences at the storage
//! boundary; these traits are the typed layer above that so a stage never
//! manipulates raw `Vec<u8>` directly except at a table's boundary.

use alloy_primitives::B256;
use esync_primitives::BlockNumber;

use crate::error::DbError;

/// A type usable as a table key: encodes to bytes whose lexicographic order
/// matches the type's own `Ord`.
pub trait Key: Sized + Ord + Clone + Send + Sync + 'static {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<Self, DbError>;
}

/// A type usable as a table value.
pub trait Value: Sized + Clone + Send + Sync + 'static {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<Self, DbError>;
}

impl Key for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DbError> {
        Ok(bytes.to_vec())
    }
}

impl Value for Vec<u8> {
    fn encode(&self) -> Vec<u8> {
        self.clone()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DbError> {
        Ok(bytes.to_vec())
    }
}

impl Key for B256 {
    fn encode(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DbError> {
        let arr: [u8; 32] =
            bytes.try_into().map_err(|_| DbError::Decode("B256", format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self::from(arr))
    }
}

impl Value for B256 {
    fn encode(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DbError> {
        <Self as Key>::decode(bytes)
    }
}

/// The big-endian 8-byte encoding of a [`BlockNumber`], used as the key for every
/// table keyed purely on block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockNumberKey(pub BlockNumber);

impl Key for BlockNumberKey {
    fn encode(&self) -> Vec<u8> {
        self.0.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DbError> {
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| DbError::Decode("BlockNumberKey", format!("expected 8 bytes, got {}", bytes.len())))?;
        Ok(Self(BlockNumber::from_be_bytes(arr)))
    }
}

impl Value for BlockNumber {
    fn encode(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, DbError> {
        let arr: [u8; 8] =
            bytes.try_into().map_err(|_| DbError::Decode("BlockNumber", format!("expected 8 bytes, got {}", bytes.len())))?;
        Ok(Self::from_be_bytes(arr))
    }
}

/// The composite key `BlockBodies` is stored under: `BlockNum_BE ∥ HeaderHash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockBodyKey {
    pub number: BlockNumber,
    pub hash: B256,
}

impl Key for BlockBodyKey {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(40);
        out.extend_from_slice(&self.number.to_be_bytes());
        out.extend_from_slice(self.hash.as_slice());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, DbError> {
        if bytes.len() != 40 {
            return Err(DbError::Decode("BlockBodyKey", format!("expected 40 bytes, got {}", bytes.len())));
        }
        let number = BlockNumber::from_be_bytes(bytes[..8].try_into().unwrap());
        let hash = B256::from_slice(&bytes[8..]);
        Ok(Self { number, hash })
    }
}
