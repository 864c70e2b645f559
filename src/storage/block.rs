//! Blocks and row slots
//!
//! A block is `block_size` bytes: a 16-byte header followed by a payload of
//! fixed-width row slots. Each slot starts with a one-byte tombstone.
//!
//! ```text
//! ┌──────────┬──────────────┬──────────┬──────────┬───────────────────────┐
//! │ Live (4) │ NotDel (4)   │ Next (4) │ Prev (4) │ Slot 0 │ Slot 1 │ ... │
//! └──────────┴──────────────┴──────────┴──────────┴───────────────────────┘
//! ```

use bytes::{Buf, BufMut};

use crate::error::{HeapError, Result};

use super::format::{decode_count, decode_link, encode_link, BlockOffset};
use super::{BLOCK_HEADER_SIZE, TOMBSTONE_WIDTH};

// =============================================================================
// Slots
// =============================================================================

/// State of one row slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Live,
    Tombstoned,
}

impl SlotState {
    pub fn as_byte(self) -> u8 {
        match self {
            SlotState::Live => 0,
            SlotState::Tombstoned => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(SlotState::Live),
            1 => Some(SlotState::Tombstoned),
            _ => None,
        }
    }
}

/// One row record as stored in a slot: tombstone + encoded fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRecord {
    pub state: SlotState,
    pub fields: Vec<u8>,
}

impl RowRecord {
    /// A row that has not been deleted
    pub fn live(fields: Vec<u8>) -> Self {
        Self {
            state: SlotState::Live,
            fields,
        }
    }

    /// Bytes the record occupies in a slot
    pub fn width(&self) -> usize {
        TOMBSTONE_WIDTH + self.fields.len()
    }
}

// =============================================================================
// Block
// =============================================================================

/// In-memory image of one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Slots ever appended since the block was last reset
    live_slots: u32,
    /// Appended slots whose tombstone is not set
    not_deleted: u32,
    next: Option<BlockOffset>,
    prev: Option<BlockOffset>,
    payload: Vec<u8>,
    record_size: usize,
}

impl Block {
    /// A zero-filled, unlinked block
    pub fn empty(block_size: usize, record_size: usize) -> Self {
        Self {
            live_slots: 0,
            not_deleted: 0,
            next: None,
            prev: None,
            payload: vec![0u8; block_size.saturating_sub(BLOCK_HEADER_SIZE)],
            record_size,
        }
    }

    /// Parse a block image read from disk
    pub fn decode(bytes: &[u8], record_size: usize) -> Result<Self> {
        if bytes.len() <= BLOCK_HEADER_SIZE {
            return Err(HeapError::Corruption(format!(
                "block image of {} bytes is shorter than its header",
                bytes.len()
            )));
        }

        let mut buf = bytes;
        let live_slots = decode_count(buf.get_i32_le(), "block live slot count")?;
        let not_deleted = decode_count(buf.get_i32_le(), "block not-deleted count")?;
        let next = decode_link(buf.get_i32_le(), "block next link")?;
        let prev = decode_link(buf.get_i32_le(), "block prev link")?;

        let block = Self {
            live_slots,
            not_deleted,
            next,
            prev,
            payload: buf.to_vec(),
            record_size,
        };

        if block.live_slots as usize > block.capacity() {
            return Err(HeapError::Corruption(format!(
                "block claims {} slots but holds at most {}",
                block.live_slots,
                block.capacity()
            )));
        }
        if block.not_deleted > block.live_slots {
            return Err(HeapError::Corruption(format!(
                "block has {} undeleted rows out of {} slots",
                block.not_deleted, block.live_slots
            )));
        }

        Ok(block)
    }

    /// Serialize to exactly `block_size` bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BLOCK_HEADER_SIZE + self.payload.len());
        buf.put_i32_le(self.live_slots as i32);
        buf.put_i32_le(self.not_deleted as i32);
        buf.put_i32_le(encode_link(self.next));
        buf.put_i32_le(encode_link(self.prev));
        buf.put_slice(&self.payload);
        buf
    }

    // -------------------------------------------------------------------------
    // Header accessors
    // -------------------------------------------------------------------------

    pub fn live_slots(&self) -> usize {
        self.live_slots as usize
    }

    pub fn not_deleted(&self) -> usize {
        self.not_deleted as usize
    }

    pub fn next(&self) -> Option<BlockOffset> {
        self.next
    }

    pub fn prev(&self) -> Option<BlockOffset> {
        self.prev
    }

    pub fn set_next(&mut self, next: Option<BlockOffset>) {
        self.next = next;
    }

    pub fn set_prev(&mut self, prev: Option<BlockOffset>) {
        self.prev = prev;
    }

    /// Row slots that fit in the payload
    pub fn capacity(&self) -> usize {
        self.payload.len() / self.record_size
    }

    pub fn is_full(&self) -> bool {
        self.live_slots() >= self.capacity()
    }

    /// True when no undeleted row remains
    pub fn is_empty(&self) -> bool {
        self.not_deleted == 0
    }

    /// Zero the counters and payload, keeping the links
    pub fn reset(&mut self) {
        self.live_slots = 0;
        self.not_deleted = 0;
        self.payload.fill(0);
    }

    // -------------------------------------------------------------------------
    // Slot access
    // -------------------------------------------------------------------------

    /// Append a record at slot `live_slots`. Returns `false` if the block is full.
    pub fn try_append(&mut self, record: &RowRecord) -> Result<bool> {
        if record.width() != self.record_size {
            return Err(HeapError::SchemaMismatch {
                expected: self.record_size - TOMBSTONE_WIDTH,
                actual: record.fields.len(),
            });
        }
        if self.is_full() {
            return Ok(false);
        }

        let slot = self.live_slots();
        let bytes = self.slot_bytes_mut(slot);
        bytes[0] = record.state.as_byte();
        bytes[TOMBSTONE_WIDTH..].copy_from_slice(&record.fields);

        self.live_slots += 1;
        if record.state == SlotState::Live {
            self.not_deleted += 1;
        }
        Ok(true)
    }

    /// Tombstone state of an appended slot
    pub fn slot_state(&self, slot: usize) -> Result<SlotState> {
        self.check_slot(slot)?;
        let byte = self.slot_bytes(slot)[0];
        SlotState::from_byte(byte).ok_or_else(|| {
            HeapError::Corruption(format!("slot {} has invalid tombstone byte 0x{:02x}", slot, byte))
        })
    }

    /// Encoded fields of an appended slot
    pub fn slot_fields(&self, slot: usize) -> Result<&[u8]> {
        self.check_slot(slot)?;
        Ok(&self.slot_bytes(slot)[TOMBSTONE_WIDTH..])
    }

    /// Replace the fields of a live slot in place
    pub fn overwrite_fields(&mut self, slot: usize, fields: &[u8]) -> Result<()> {
        if fields.len() + TOMBSTONE_WIDTH != self.record_size {
            return Err(HeapError::SchemaMismatch {
                expected: self.record_size - TOMBSTONE_WIDTH,
                actual: fields.len(),
            });
        }
        if self.slot_state(slot)? != SlotState::Live {
            return Err(HeapError::Corruption(format!(
                "cannot overwrite tombstoned slot {}",
                slot
            )));
        }
        self.slot_bytes_mut(slot)[TOMBSTONE_WIDTH..].copy_from_slice(fields);
        Ok(())
    }

    /// Set the tombstone of a live slot. Returns `true` when this was the
    /// block's last undeleted row.
    pub fn tombstone(&mut self, slot: usize) -> Result<bool> {
        if self.slot_state(slot)? != SlotState::Live {
            return Err(HeapError::Corruption(format!("slot {} is already tombstoned", slot)));
        }
        if self.not_deleted == 0 {
            return Err(HeapError::Corruption(format!(
                "live slot {} in a block with no undeleted rows",
                slot
            )));
        }
        self.slot_bytes_mut(slot)[0] = SlotState::Tombstoned.as_byte();
        self.not_deleted -= 1;
        Ok(self.is_empty())
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.live_slots() {
            return Err(HeapError::Corruption(format!(
                "slot {} is past the {} appended slots",
                slot, self.live_slots
            )));
        }
        Ok(())
    }

    fn slot_bytes(&self, slot: usize) -> &[u8] {
        let start = slot * self.record_size;
        &self.payload[start..start + self.record_size]
    }

    fn slot_bytes_mut(&mut self, slot: usize) -> &mut [u8] {
        let start = slot * self.record_size;
        &mut self.payload[start..start + self.record_size]
    }
}
