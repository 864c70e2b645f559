//! On-disk primitives shared by every table file
//!
//! Block offsets, link encoding and the trailer record. All integers are
//! little-endian `i32` on the wire; `0` is the "no link" sentinel and never
//! appears inside a [`BlockOffset`].

use std::fmt;
use std::num::NonZeroU32;

use bytes::{Buf, BufMut};

use crate::error::{HeapError, Result};

use super::{BLOCK_HEADER_SIZE, TOMBSTONE_WIDTH};

/// Encoded value of an absent link
pub(crate) const NO_LINK: i32 = 0;

// =============================================================================
// Block Offsets
// =============================================================================

/// Absolute byte offset of a block inside its table file.
///
/// Offset 0 holds the schema blob, so a block can never live there; the type
/// makes that unrepresentable and links are modelled as `Option<BlockOffset>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct BlockOffset(NonZeroU32);

impl BlockOffset {
    /// Construct an offset; `None` for the reserved position 0
    #[inline]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Construct from a file position, `None` if it is 0 or does not fit u32
    pub fn from_position(pos: u64) -> Option<Self> {
        u32::try_from(pos).ok().and_then(Self::new)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Offset as a file position (for seeking)
    #[inline]
    pub const fn position(self) -> u64 {
        self.0.get() as u64
    }
}

impl fmt::Display for BlockOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.get())
    }
}

/// Encode a link for the wire
pub(crate) fn encode_link(link: Option<BlockOffset>) -> i32 {
    link.map_or(NO_LINK, |offset| offset.get() as i32)
}

/// Decode a link read from disk
pub(crate) fn decode_link(raw: i32, field: &str) -> Result<Option<BlockOffset>> {
    if raw < 0 {
        return Err(HeapError::Corruption(format!(
            "{} holds negative offset {}",
            field, raw
        )));
    }
    Ok(BlockOffset::new(raw as u32))
}

/// Decode a size or counter that must not be negative
pub(crate) fn decode_count(raw: i32, field: &str) -> Result<u32> {
    u32::try_from(raw)
        .map_err(|_| HeapError::Corruption(format!("{} is negative ({})", field, raw)))
}

// =============================================================================
// Trailer
// =============================================================================

/// Table metadata record, always the last [`Trailer::SIZE`] bytes of the file.
///
/// Layout (20 bytes):
/// - schema_blob_size: i32
/// - row_record_size: i32 (tombstone byte included)
/// - block_size: i32
/// - free_list_head: i32 (0 = empty)
/// - data_list_head: i32 (0 = empty)
///
/// A `Trailer` is an immutable snapshot; structural changes build a new one
/// with the `with_*` methods and hand it to `BlockStore::commit_trailer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub schema_blob_size: u32,
    pub row_record_size: u32,
    pub block_size: u32,
    pub free_list_head: Option<BlockOffset>,
    pub data_list_head: Option<BlockOffset>,
}

impl Trailer {
    /// Size of the trailer in bytes
    pub const SIZE: usize = 20;

    /// Trailer for a freshly created table: both lists empty.
    ///
    /// Fails with `Config` for unusable sizes and with `RecordTooLarge` when
    /// not even one row fits into an empty block.
    pub fn for_new_table(
        schema_blob_size: usize,
        row_record_size: usize,
        block_size: u32,
    ) -> Result<Self> {
        if schema_blob_size == 0 {
            return Err(HeapError::Config(
                "schema blob must not be empty (offset 0 is reserved)".to_string(),
            ));
        }
        let schema_blob_size = i32::try_from(schema_blob_size).map_err(|_| {
            HeapError::Config(format!("schema blob of {} bytes is too large", schema_blob_size))
        })? as u32;

        if row_record_size <= TOMBSTONE_WIDTH {
            return Err(HeapError::Config(format!(
                "row record size {} leaves no room for fields",
                row_record_size
            )));
        }
        if block_size as usize <= BLOCK_HEADER_SIZE || block_size > i32::MAX as u32 {
            return Err(HeapError::Config(format!("unusable block size {}", block_size)));
        }

        let payload = block_size as usize - BLOCK_HEADER_SIZE;
        if row_record_size > payload {
            return Err(HeapError::RecordTooLarge {
                size: row_record_size,
                limit: payload,
            });
        }

        Ok(Self {
            schema_blob_size,
            row_record_size: row_record_size as u32,
            block_size,
            free_list_head: None,
            data_list_head: None,
        })
    }

    /// Same trailer with a different free-list head
    pub fn with_free_head(self, head: Option<BlockOffset>) -> Self {
        Self {
            free_list_head: head,
            ..self
        }
    }

    /// Same trailer with a different active-list head
    pub fn with_data_head(self, head: Option<BlockOffset>) -> Self {
        Self {
            data_list_head: head,
            ..self
        }
    }

    /// Bytes available for row slots in each block
    pub fn payload_size(&self) -> usize {
        (self.block_size as usize).saturating_sub(BLOCK_HEADER_SIZE)
    }

    /// Number of row slots per block
    pub fn slot_capacity(&self) -> usize {
        self.payload_size() / self.row_record_size as usize
    }

    /// Width of the encoded fields inside one slot
    pub fn field_width(&self) -> usize {
        self.row_record_size as usize - TOMBSTONE_WIDTH
    }

    /// File position of the first block (right after the schema blob)
    pub fn first_block_position(&self) -> u64 {
        self.schema_blob_size as u64
    }

    /// Serializes the trailer.
    pub fn serialize(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(self.schema_blob_size as i32);
        buf.put_i32_le(self.row_record_size as i32);
        buf.put_i32_le(self.block_size as i32);
        buf.put_i32_le(encode_link(self.free_list_head));
        buf.put_i32_le(encode_link(self.data_list_head));
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let mut cursor = &mut buf[..];
        self.serialize(&mut cursor);
        buf
    }

    /// Deserializes a trailer, rejecting sizes no table could have been
    /// created with.
    pub fn deserialize(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::SIZE {
            return Err(HeapError::Corruption(format!(
                "trailer truncated: {} < {} bytes",
                buf.remaining(),
                Self::SIZE
            )));
        }

        let schema_blob_size = decode_count(buf.get_i32_le(), "trailer schema size")?;
        let row_record_size = decode_count(buf.get_i32_le(), "trailer row record size")?;
        let block_size = decode_count(buf.get_i32_le(), "trailer block size")?;
        let free_list_head = decode_link(buf.get_i32_le(), "trailer free-list head")?;
        let data_list_head = decode_link(buf.get_i32_le(), "trailer data-list head")?;

        if schema_blob_size == 0 {
            return Err(HeapError::Corruption("trailer records an empty schema blob".to_string()));
        }
        if row_record_size as usize <= TOMBSTONE_WIDTH {
            return Err(HeapError::Corruption(format!(
                "trailer row record size {} is too small",
                row_record_size
            )));
        }
        if block_size as usize <= BLOCK_HEADER_SIZE {
            return Err(HeapError::Corruption(format!(
                "trailer block size {} is too small",
                block_size
            )));
        }

        Ok(Self {
            schema_blob_size,
            row_record_size,
            block_size,
            free_list_head,
            data_list_head,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::deserialize(&mut &bytes[..])
    }
}
