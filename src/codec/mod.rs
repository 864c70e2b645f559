//! Record Codec Module
//!
//! Fixed-width encoding of a row's fields.
//!
//! The storage core never interprets field bytes. It only needs every row of
//! a table to encode to the same width, for as long as the table exists:
//!
//! ```text
//! ┌───────────────┬──────────────────────────────────────────┐
//! │ Tombstone (1) │ Fields (field_width, owned by the codec) │
//! └───────────────┴──────────────────────────────────────────┘
//! ```

mod raw;
mod serde_codec;

pub use raw::FixedBytesCodec;
pub use serde_codec::BincodeCodec;

use crate::error::Result;
use crate::storage::TOMBSTONE_WIDTH;

/// Encodes and decodes the field vector of one row
pub trait RecordCodec {
    /// Decoded row type handed to predicates and returned by scans
    type Row;

    /// Exact width of every encoded row
    fn field_width(&self) -> usize;

    /// Encode a row to exactly `field_width()` bytes
    fn encode(&self, row: &Self::Row) -> Result<Vec<u8>>;

    /// Decode `field_width()` bytes produced by `encode`
    fn decode(&self, bytes: &[u8]) -> Result<Self::Row>;

    /// Slot width a table needs for this codec (fields plus tombstone)
    fn row_record_size(&self) -> usize {
        self.field_width() + TOMBSTONE_WIDTH
    }
}
