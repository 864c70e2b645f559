//! Block Store
//!
//! Block I/O and the two block lists of one table file.
//!
//! ## Responsibilities
//! - Read and write whole blocks at their byte offsets
//! - Keep the active list (scanned rows) and the free list (reclaimed blocks)
//!   doubly linked and consistent with the trailer
//! - Grow the file only when the free list is empty
//! - Keep the trailer as the last bytes of the file
//!
//! Every structural change ends with [`BlockStore::commit_trailer`], the only
//! place the trailer is written.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncStrategy;
use crate::error::{HeapError, Result};

use super::block::{Block, RowRecord};
use super::format::{BlockOffset, Trailer};
use super::integrity::{IntegrityReport, ListKind};

/// Owns the file handle of one table for the duration of one operation
pub struct BlockStore {
    file: File,
    path: PathBuf,
    /// Last committed trailer
    trailer: Trailer,
    /// Where the trailer currently sits (logical end of file minus its size)
    trailer_offset: u64,
    sync: SyncStrategy,
}

impl BlockStore {
    /// Create a new table file: schema blob at offset 0, then an empty trailer.
    ///
    /// Sizes are validated before the file is touched, so a rejected
    /// configuration leaves nothing behind. If writing the initial image
    /// fails, the partial file is removed again.
    pub fn create(
        path: &Path,
        schema_blob: &[u8],
        row_record_size: usize,
        block_size: u32,
        sync: SyncStrategy,
    ) -> Result<Self> {
        let trailer = Trailer::for_new_table(schema_blob.len(), row_record_size, block_size)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    HeapError::TableAlreadyExists(path.display().to_string())
                }
                _ => HeapError::Io(e),
            })?;

        let mut store = Self {
            file,
            path: path.to_path_buf(),
            trailer,
            trailer_offset: trailer.first_block_position(),
            sync,
        };

        if let Err(e) = store
            .write_at(0, schema_blob)
            .and_then(|()| store.commit_trailer(trailer))
        {
            drop(store);
            if let Err(remove_err) = fs::remove_file(path) {
                tracing::warn!(
                    path = %path.display(),
                    "Failed to remove partially created table file: {}",
                    remove_err
                );
            }
            return Err(e);
        }

        tracing::debug!(
            path = %path.display(),
            row_record_size,
            block_size,
            slots_per_block = trailer.slot_capacity(),
            "Created table file"
        );
        Ok(store)
    }

    /// Open an existing table file and load its trailer
    pub fn open(path: &Path, sync: SyncStrategy) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => HeapError::TableNotFound(path.display().to_string()),
                _ => HeapError::Io(e),
            })?;

        let file_len = file.metadata()?.len();
        if file_len < Trailer::SIZE as u64 {
            return Err(corruption(format!(
                "{}: file of {} bytes cannot hold a trailer",
                path.display(),
                file_len
            )));
        }

        let trailer_offset = file_len - Trailer::SIZE as u64;
        file.seek(SeekFrom::Start(trailer_offset))?;
        let mut bytes = [0u8; Trailer::SIZE];
        file.read_exact(&mut bytes)?;
        let trailer = Trailer::from_bytes(&bytes)?;

        let store = Self {
            file,
            path: path.to_path_buf(),
            trailer,
            trailer_offset,
            sync,
        };
        store.check_layout()?;
        Ok(store)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Last committed trailer
    pub fn trailer(&self) -> Trailer {
        self.trailer
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical file length (blob + blocks + trailer)
    pub fn file_len(&self) -> u64 {
        self.trailer_offset + Trailer::SIZE as u64
    }

    /// Number of blocks in the file, active or free
    pub fn block_count(&self) -> usize {
        ((self.trailer_offset - self.trailer.first_block_position())
            / self.trailer.block_size as u64) as usize
    }

    /// Read the schema blob stored at offset 0
    pub fn read_schema_blob(&mut self) -> Result<Vec<u8>> {
        let mut blob = vec![0u8; self.trailer.schema_blob_size as usize];
        self.read_at(0, &mut blob)?;
        Ok(blob)
    }

    // =========================================================================
    // Block I/O
    // =========================================================================

    /// Read the block behind a link; `None` for an absent link
    pub fn read_block(&mut self, link: Option<BlockOffset>) -> Result<Option<Block>> {
        match link {
            Some(offset) => self.load_block(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Read exactly `block_size` bytes at `offset`
    pub fn load_block(&mut self, offset: BlockOffset) -> Result<Block> {
        self.check_offset(offset)?;
        let mut bytes = vec![0u8; self.trailer.block_size as usize];
        self.read_at(offset.position(), &mut bytes)?;
        tracing::trace!(%offset, "Read block");
        Block::decode(&bytes, self.trailer.row_record_size as usize).map_err(|e| match e {
            HeapError::Corruption(message) => corruption(format!("block {}: {}", offset, message)),
            other => other,
        })
    }

    /// Write a block in place; durable on return under `SyncStrategy::EveryWrite`
    pub fn write_block(&mut self, offset: BlockOffset, block: &Block) -> Result<()> {
        self.check_offset(offset)?;
        let bytes = block.encode();
        if bytes.len() != self.trailer.block_size as usize {
            return Err(corruption(format!(
                "block image for {} is {} bytes, expected {}",
                offset,
                bytes.len(),
                self.trailer.block_size
            )));
        }
        self.write_at(offset.position(), &bytes)?;
        tracing::trace!(%offset, live = block.live_slots(), "Wrote block");
        Ok(())
    }

    /// Persist `trailer` at the logical end of the file and make it current
    pub fn commit_trailer(&mut self, trailer: Trailer) -> Result<()> {
        self.write_at(self.trailer_offset, &trailer.to_bytes())?;
        self.trailer = trailer;
        Ok(())
    }

    // =========================================================================
    // List Operations
    // =========================================================================

    /// Put an empty block at the head of the active list and return its offset.
    ///
    /// Recycles the free-list head when there is one; otherwise writes a new
    /// block over the trailer position and re-appends the trailer after it.
    pub fn allocate_block_for_append(&mut self) -> Result<BlockOffset> {
        match self.trailer.free_list_head {
            Some(offset) => self.recycle_free_head(offset),
            None => self.append_block(),
        }
    }

    /// Append a row to the head block, opening a new head block when the
    /// current one is full. Returns the offset of the block that took the row.
    pub fn insert_into_head_block(&mut self, record: &RowRecord) -> Result<BlockOffset> {
        // Reject before allocating so a bad row never changes the lists
        if record.width() != self.trailer.row_record_size as usize {
            return Err(HeapError::SchemaMismatch {
                expected: self.trailer.field_width(),
                actual: record.fields.len(),
            });
        }
        if self.trailer.slot_capacity() == 0 {
            return Err(HeapError::RecordTooLarge {
                size: self.trailer.row_record_size as usize,
                limit: self.trailer.payload_size(),
            });
        }

        let head = match self.trailer.data_list_head {
            Some(head) => head,
            None => self.allocate_block_for_append()?,
        };

        let mut block = self.load_block(head)?;
        if block.try_append(record)? {
            self.write_block(head, &block)?;
            return Ok(head);
        }

        let head = self.allocate_block_for_append()?;
        let mut block = self.load_block(head)?;
        if !block.try_append(record)? {
            return Err(corruption(format!("freshly allocated block {} rejected a row", head)));
        }
        self.write_block(head, &block)?;
        Ok(head)
    }

    /// Move an active block onto the free list.
    ///
    /// Neighbour links are patched (or the active head advanced), the block is
    /// zeroed and pushed at the free-list head, and the trailer is committed.
    pub fn unlink_and_free(&mut self, offset: BlockOffset) -> Result<()> {
        let mut block = self.load_block(offset)?;
        let (prev, next) = (block.prev(), block.next());

        let data_head = match prev {
            Some(prev_offset) => {
                let mut prev_block = self.load_block(prev_offset)?;
                if prev_block.next() != Some(offset) {
                    return Err(broken_link(prev_offset, "next", offset, prev_block.next()));
                }
                prev_block.set_next(next);
                self.write_block(prev_offset, &prev_block)?;
                self.trailer.data_list_head
            }
            None => {
                if self.trailer.data_list_head != Some(offset) {
                    return Err(corruption(format!(
                        "block {} has no predecessor but the active head is {:?}",
                        offset, self.trailer.data_list_head
                    )));
                }
                next
            }
        };

        if let Some(next_offset) = next {
            let mut next_block = self.load_block(next_offset)?;
            if next_block.prev() != Some(offset) {
                return Err(broken_link(next_offset, "prev", offset, next_block.prev()));
            }
            next_block.set_prev(prev);
            self.write_block(next_offset, &next_block)?;
        }

        let old_free_head = self.trailer.free_list_head;
        if let Some(free_offset) = old_free_head {
            let mut free_block = self.load_block(free_offset)?;
            if free_block.prev().is_some() {
                return Err(corruption(format!(
                    "free-list head {} has a predecessor",
                    free_offset
                )));
            }
            free_block.set_prev(Some(offset));
            self.write_block(free_offset, &free_block)?;
        }

        block.reset();
        block.set_prev(None);
        block.set_next(old_free_head);
        self.write_block(offset, &block)?;

        let trailer = self
            .trailer
            .with_data_head(data_head)
            .with_free_head(Some(offset));
        self.commit_trailer(trailer)?;

        tracing::debug!(%offset, "Reclaimed empty block onto free list");
        Ok(())
    }

    /// Offsets on the active list, head to tail
    pub fn active_offsets(&mut self) -> Result<Vec<BlockOffset>> {
        self.list_offsets(ListKind::Active)
    }

    /// Offsets on the free list, head to tail
    pub fn free_offsets(&mut self) -> Result<Vec<BlockOffset>> {
        self.list_offsets(ListKind::Free)
    }

    /// Walk both lists and verify the structural invariants of the file.
    ///
    /// Checks back links, cycles, that every block is on exactly one list, and
    /// that free blocks hold no rows.
    pub fn check_integrity(&mut self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport {
            file_len: self.file_len(),
            total_blocks: self.block_count(),
            slots_per_block: self.trailer.slot_capacity(),
            ..IntegrityReport::default()
        };
        let mut seen = HashSet::new();

        for kind in [ListKind::Active, ListKind::Free] {
            self.walk(kind, &mut seen, |offset, block| {
                match kind {
                    ListKind::Active => {
                        report.active_blocks += 1;
                        report.live_rows += block.not_deleted() as u64;
                        report.tombstoned_rows +=
                            (block.live_slots() - block.not_deleted()) as u64;
                    }
                    ListKind::Free => {
                        if block.live_slots() != 0 {
                            return Err(corruption(format!(
                                "free block {} still holds {} slots",
                                offset,
                                block.live_slots()
                            )));
                        }
                        report.free_blocks += 1;
                    }
                }
                Ok(())
            })?;
        }

        let reachable = report.active_blocks + report.free_blocks;
        if reachable != report.total_blocks {
            return Err(corruption(format!(
                "{} of {} blocks are not reachable from either list",
                report.total_blocks - reachable,
                report.total_blocks
            )));
        }
        Ok(report)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Pop `offset` off the free list and make it the active head
    fn recycle_free_head(&mut self, offset: BlockOffset) -> Result<BlockOffset> {
        let mut block = self.load_block(offset)?;
        if block.prev().is_some() {
            return Err(corruption(format!("free-list head {} has a predecessor", offset)));
        }
        let next_free = block.next();

        if let Some(next_offset) = next_free {
            let mut next_block = self.load_block(next_offset)?;
            if next_block.prev() != Some(offset) {
                return Err(broken_link(next_offset, "prev", offset, next_block.prev()));
            }
            next_block.set_prev(None);
            self.write_block(next_offset, &next_block)?;
        }

        let old_head = self.trailer.data_list_head;
        self.link_before_head(offset, old_head)?;

        block.reset();
        block.set_prev(None);
        block.set_next(old_head);
        self.write_block(offset, &block)?;

        let trailer = self
            .trailer
            .with_free_head(next_free)
            .with_data_head(Some(offset));
        self.commit_trailer(trailer)?;

        tracing::debug!(%offset, "Recycled free block as active head");
        Ok(offset)
    }

    /// Write a new block where the trailer sits and push the trailer past it
    fn append_block(&mut self) -> Result<BlockOffset> {
        let block_size = self.trailer.block_size as u64;
        let new_len = self.file_len() + block_size;
        if new_len > i32::MAX as u64 {
            return Err(HeapError::TableFull(new_len));
        }

        let offset = BlockOffset::from_position(self.trailer_offset).ok_or_else(|| {
            corruption(format!("append position {} is not a valid block offset", self.trailer_offset))
        })?;

        let old_head = self.trailer.data_list_head;
        let mut block = Block::empty(
            self.trailer.block_size as usize,
            self.trailer.row_record_size as usize,
        );
        block.set_next(old_head);

        // The new block overwrites the old trailer bytes, so it is in bounds
        // only once the trailer has moved.
        self.trailer_offset += block_size;
        self.write_block(offset, &block)?;
        self.link_before_head(offset, old_head)?;
        self.commit_trailer(self.trailer.with_data_head(Some(offset)))?;

        tracing::debug!(%offset, file_len = self.file_len(), "Appended new block");
        Ok(offset)
    }

    /// Point the current active head's `prev` at `offset`
    fn link_before_head(&mut self, offset: BlockOffset, head: Option<BlockOffset>) -> Result<()> {
        if let Some(head_offset) = head {
            let mut head_block = self.load_block(head_offset)?;
            if head_block.prev().is_some() {
                return Err(corruption(format!(
                    "active head {} has a predecessor",
                    head_offset
                )));
            }
            head_block.set_prev(Some(offset));
            self.write_block(head_offset, &head_block)?;
        }
        Ok(())
    }

    fn list_offsets(&mut self, kind: ListKind) -> Result<Vec<BlockOffset>> {
        let mut offsets = Vec::new();
        let mut seen = HashSet::new();
        self.walk(kind, &mut seen, |offset, _| {
            offsets.push(offset);
            Ok(())
        })?;
        Ok(offsets)
    }

    /// Visit one list head to tail, checking every back link.
    ///
    /// `seen` is shared across walks so a block reachable twice (a cycle, or a
    /// block on both lists) is reported as corruption.
    fn walk<F>(
        &mut self,
        kind: ListKind,
        seen: &mut HashSet<BlockOffset>,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(BlockOffset, &Block) -> Result<()>,
    {
        let mut expected_prev = None;
        let mut current = match kind {
            ListKind::Active => self.trailer.data_list_head,
            ListKind::Free => self.trailer.free_list_head,
        };

        while let Some(offset) = current {
            if !seen.insert(offset) {
                return Err(corruption(format!(
                    "block {} reached twice while walking the {} list",
                    offset, kind
                )));
            }
            let block = self.load_block(offset)?;
            if block.prev() != expected_prev {
                return Err(corruption(format!(
                    "{} list: block {} has prev {:?}, expected {:?}",
                    kind,
                    offset,
                    block.prev(),
                    expected_prev
                )));
            }
            visit(offset, &block)?;
            expected_prev = Some(offset);
            current = block.next();
        }
        Ok(())
    }

    /// Validate the file geometry implied by the trailer
    fn check_layout(&self) -> Result<()> {
        let first = self.trailer.first_block_position();
        if self.trailer_offset < first {
            return Err(corruption(format!(
                "{}: trailer at {} overlaps the {}-byte schema blob",
                self.path.display(),
                self.trailer_offset,
                first
            )));
        }
        if (self.trailer_offset - first) % self.trailer.block_size as u64 != 0 {
            return Err(corruption(format!(
                "{}: {} bytes of blocks is not a multiple of block size {}",
                self.path.display(),
                self.trailer_offset - first,
                self.trailer.block_size
            )));
        }
        for head in [self.trailer.data_list_head, self.trailer.free_list_head]
            .into_iter()
            .flatten()
        {
            self.check_offset(head)?;
        }
        if self.trailer.data_list_head.is_some()
            && self.trailer.data_list_head == self.trailer.free_list_head
        {
            return Err(corruption(format!(
                "{}: both list heads point at {:?}",
                self.path.display(),
                self.trailer.data_list_head
            )));
        }
        Ok(())
    }

    /// An offset must name a whole block between the schema blob and the trailer
    fn check_offset(&self, offset: BlockOffset) -> Result<()> {
        let pos = offset.position();
        let first = self.trailer.first_block_position();
        let block_size = self.trailer.block_size as u64;

        if pos < first || pos + block_size > self.trailer_offset {
            return Err(corruption(format!(
                "block offset {} outside [{}, {})",
                offset, first, self.trailer_offset
            )));
        }
        if (pos - first) % block_size != 0 {
            return Err(corruption(format!(
                "block offset {} is not aligned to block size {}",
                offset, block_size
            )));
        }
        Ok(())
    }

    fn read_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => corruption(format!(
                "short read of {} bytes at {} in {}",
                buf.len(),
                pos,
                self.path.display()
            )),
            _ => HeapError::Io(e),
        })
    }

    fn write_at(&mut self, pos: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(bytes)?;
        if self.sync == SyncStrategy::EveryWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

fn corruption(message: String) -> HeapError {
    tracing::warn!("Table file corruption: {}", message);
    HeapError::Corruption(message)
}

fn broken_link(
    at: BlockOffset,
    field: &str,
    expected: BlockOffset,
    found: Option<BlockOffset>,
) -> HeapError {
    corruption(format!(
        "block {} {} link is {:?}, expected {}",
        at, field, found, expected
    ))
}
