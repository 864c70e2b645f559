//! Raw byte rows

use crate::error::{HeapError, Result};

use super::RecordCodec;

/// Identity codec: a row is already its `width` encoded bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBytesCodec {
    width: usize,
}

impl FixedBytesCodec {
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

impl RecordCodec for FixedBytesCodec {
    type Row = Vec<u8>;

    fn field_width(&self) -> usize {
        self.width
    }

    fn encode(&self, row: &Vec<u8>) -> Result<Vec<u8>> {
        if row.len() > self.width {
            return Err(HeapError::RecordTooLarge {
                size: row.len(),
                limit: self.width,
            });
        }
        if row.len() < self.width {
            return Err(HeapError::SchemaMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }
        Ok(row.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
