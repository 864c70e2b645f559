//! Row and Table Scanners
//!
//! [`RowScanner`] walks the appended slots of one block, skipping tombstones.
//! [`TableScanner`] chains one `RowScanner` per block along the active list
//! and yields decoded rows.
//!
//! Both are explicit cursors: reading never mutates, and overwrite/delete act
//! only on the row most recently yielded.

use crate::codec::RecordCodec;
use crate::error::{HeapError, Result};

use super::block::{Block, SlotState};
use super::block_store::BlockStore;
use super::format::BlockOffset;

// =============================================================================
// RowScanner
// =============================================================================

/// Cursor over the slots `[0, live_slots)` of one owned block
#[derive(Debug)]
pub struct RowScanner {
    block: Block,
    /// Next slot to inspect
    next_slot: usize,
    /// Slot last yielded, cleared once it has been deleted
    current: Option<usize>,
}

impl RowScanner {
    pub fn new(block: Block) -> Self {
        Self {
            block,
            next_slot: 0,
            current: None,
        }
    }

    /// Fields of the next undeleted slot, or `None` when the block is exhausted
    pub fn next_fields(&mut self) -> Result<Option<&[u8]>> {
        while self.next_slot < self.block.live_slots() {
            let slot = self.next_slot;
            self.next_slot += 1;
            if self.block.slot_state(slot)? == SlotState::Live {
                self.current = Some(slot);
                return self.block.slot_fields(slot).map(Some);
            }
        }
        self.current = None;
        Ok(None)
    }

    /// Slot index of the row last yielded
    pub fn current_slot(&self) -> Option<usize> {
        self.current
    }

    /// Re-encode the current row in place (the block is not persisted here)
    pub fn overwrite(&mut self, fields: &[u8]) -> Result<()> {
        let slot = self.current.ok_or(HeapError::NoCurrentRow)?;
        self.block.overwrite_fields(slot, fields)
    }

    /// Tombstone the current row. Returns `true` when the block has no
    /// undeleted rows left and should be reclaimed.
    pub fn mark_deleted(&mut self) -> Result<bool> {
        let slot = self.current.take().ok_or(HeapError::NoCurrentRow)?;
        self.block.tombstone(slot)
    }

    /// Restart from slot 0
    pub fn reset(&mut self) {
        self.next_slot = 0;
        self.current = None;
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn into_block(self) -> Block {
        self.block
    }
}

// =============================================================================
// TableScanner
// =============================================================================

/// Block being scanned and where it sits in the file
#[derive(Debug)]
struct BlockCursor {
    offset: BlockOffset,
    rows: RowScanner,
    /// Set once the block has been moved to the free list mid-scan
    reclaimed: bool,
}

#[derive(Debug)]
enum Position {
    /// Not started (or rewound): the next advance loads the active head
    Start,
    InBlock(BlockCursor),
    Done,
}

/// Flattened cursor over every live row of a table, head block to tail.
///
/// Within a block rows come in slot order. The block behind the cursor is
/// held in memory; mutations write it back (or reclaim it) immediately.
pub struct TableScanner<'s, C: RecordCodec> {
    store: &'s mut BlockStore,
    codec: &'s C,
    position: Position,
}

impl<'s, C: RecordCodec> TableScanner<'s, C> {
    /// Scanner positioned before the first row.
    ///
    /// Fails with `SchemaMismatch` if the codec width differs from the slot
    /// width recorded in the table's trailer.
    pub fn new(store: &'s mut BlockStore, codec: &'s C) -> Result<Self> {
        let expected = store.trailer().field_width();
        if codec.field_width() != expected {
            return Err(HeapError::SchemaMismatch {
                expected,
                actual: codec.field_width(),
            });
        }
        Ok(Self {
            store,
            codec,
            position: Position::Start,
        })
    }

    /// Move to the next live row and decode it
    pub fn advance(&mut self) -> Result<Option<C::Row>> {
        loop {
            match &mut self.position {
                Position::Start => {
                    let head = self.store.trailer().data_list_head;
                    self.position = self.enter(head, None)?;
                }
                Position::InBlock(cursor) => {
                    if let Some(fields) = cursor.rows.next_fields()? {
                        return self.codec.decode(fields).map(Some);
                    }
                    // A reclaimed block's successor now links back to the
                    // reclaimed block's predecessor.
                    let came_from = if cursor.reclaimed {
                        cursor.rows.block().prev()
                    } else {
                        Some(cursor.offset)
                    };
                    let next = cursor.rows.block().next();
                    self.position = self.enter(next, came_from)?;
                }
                Position::Done => return Ok(None),
            }
        }
    }

    /// Overwrite the row last yielded, persist its block, and advance
    pub fn replace_current_and_advance(&mut self, row: &C::Row) -> Result<Option<C::Row>> {
        let fields = self.encode(row)?;
        let cursor = current_cursor(&mut self.position)?;
        cursor.rows.overwrite(&fields)?;
        self.store.write_block(cursor.offset, cursor.rows.block())?;
        self.advance()
    }

    /// Tombstone the row last yielded and advance.
    ///
    /// A block left without undeleted rows is moved to the free list instead
    /// of being written back.
    pub fn delete_current_and_advance(&mut self) -> Result<Option<C::Row>> {
        let cursor = current_cursor(&mut self.position)?;
        if cursor.rows.mark_deleted()? {
            cursor.reclaimed = true;
            self.store.unlink_and_free(cursor.offset)?;
        } else {
            self.store.write_block(cursor.offset, cursor.rows.block())?;
        }
        self.advance()
    }

    /// Restart at the head of the active list
    pub fn rewind(&mut self) {
        self.position = Position::Start;
    }

    /// Offset of the block holding the row last yielded
    pub fn current_block_offset(&self) -> Option<BlockOffset> {
        match &self.position {
            Position::InBlock(cursor) if cursor.rows.current_slot().is_some() => {
                Some(cursor.offset)
            }
            _ => None,
        }
    }

    /// Load the block behind `link`, checking it links back to `came_from`
    fn enter(&mut self, link: Option<BlockOffset>, came_from: Option<BlockOffset>) -> Result<Position> {
        let Some(offset) = link else {
            return Ok(Position::Done);
        };
        let block = self.store.load_block(offset)?;
        if block.prev() != came_from {
            tracing::warn!(%offset, prev = ?block.prev(), expected = ?came_from, "Broken back link during scan");
            return Err(HeapError::Corruption(format!(
                "active list: block {} has prev {:?}, expected {:?}",
                offset,
                block.prev(),
                came_from
            )));
        }
        Ok(Position::InBlock(BlockCursor {
            offset,
            rows: RowScanner::new(block),
            reclaimed: false,
        }))
    }

    fn encode(&self, row: &C::Row) -> Result<Vec<u8>> {
        let fields = self.codec.encode(row)?;
        let expected = self.store.trailer().field_width();
        if fields.len() != expected {
            return Err(HeapError::SchemaMismatch {
                expected,
                actual: fields.len(),
            });
        }
        Ok(fields)
    }
}

/// The block cursor, provided it has a row to mutate
fn current_cursor(position: &mut Position) -> Result<&mut BlockCursor> {
    match position {
        Position::InBlock(cursor) if cursor.rows.current_slot().is_some() => Ok(cursor),
        _ => Err(HeapError::NoCurrentRow),
    }
}

impl<'s, C: RecordCodec> Iterator for TableScanner<'s, C> {
    type Item = Result<C::Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(row) => row.map(Ok),
            Err(e) => {
                self.position = Position::Done;
                Some(Err(e))
            }
        }
    }
}
