//! Serde-based codec
//!
//! Rows are serialized with bincode and zero-padded to the declared width.
//! bincode's default encoding ignores the trailing padding on decode.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{HeapError, Result};

use super::RecordCodec;

/// Codec for any serde row type with a bounded encoded size
pub struct BincodeCodec<T> {
    width: usize,
    _row: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    /// Codec producing `width`-byte rows; larger rows fail with `RecordTooLarge`
    pub fn new(width: usize) -> Self {
        Self {
            width,
            _row: PhantomData,
        }
    }
}

impl<T: Serialize> BincodeCodec<T> {
    /// Size the codec from a representative row, e.g. a schema's default row.
    ///
    /// Only rows whose encoding never grows (fixed-size fields) fit afterwards.
    pub fn for_sample(sample: &T) -> Result<Self> {
        let width = bincode::serialized_size(sample)
            .map_err(|e| HeapError::Serialization(e.to_string()))?;
        Ok(Self::new(width as usize))
    }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self {
        Self::new(self.width)
    }
}

impl<T> fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BincodeCodec")
            .field("width", &self.width)
            .finish()
    }
}

impl<T: Serialize + DeserializeOwned> RecordCodec for BincodeCodec<T> {
    type Row = T;

    fn field_width(&self) -> usize {
        self.width
    }

    fn encode(&self, row: &T) -> Result<Vec<u8>> {
        let mut bytes =
            bincode::serialize(row).map_err(|e| HeapError::Serialization(e.to_string()))?;
        if bytes.len() > self.width {
            return Err(HeapError::RecordTooLarge {
                size: bytes.len(),
                limit: self.width,
            });
        }
        bytes.resize(self.width, 0);
        Ok(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| HeapError::Serialization(e.to_string()))
    }
}
