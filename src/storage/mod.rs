//! Storage Module
//!
//! One heap file per table: fixed-width rows in fixed-size blocks, with the
//! blocks chained into two doubly-linked lists that share one pool.
//!
//! ## Responsibilities
//! - Block I/O by absolute byte offset
//! - Active list (blocks scanned for rows) and free list (emptied blocks
//!   awaiting reuse), both headed from the trailer
//! - Tombstone deletion per slot, reclamation per block
//! - Growth only when no free block can be recycled
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │ Schema blob (schema_blob_size bytes, offset 0)         │
//! ├────────────────────────────────────────────────────────┤
//! │ Block (block_size bytes)                               │
//! │   Live (4) | NotDeleted (4) | Next (4) | Prev (4)      │
//! │   [Tombstone (1) | Fields] ... repeated per slot       │
//! ├────────────────────────────────────────────────────────┤
//! │ ... more blocks, active or free, in any order ...      │
//! ├────────────────────────────────────────────────────────┤
//! │ Trailer (20 bytes)                                     │
//! │   SchemaSize | RowSize | BlockSize | FreeHead | DataHead│
//! └────────────────────────────────────────────────────────┘
//! ```
//! All integers are little-endian i32. Links are absolute file offsets with
//! 0 meaning "none"; offset 0 always belongs to the schema blob.

mod block;
mod block_store;
mod format;
mod integrity;
mod scanner;

pub use block::{Block, RowRecord, SlotState};
pub use block_store::BlockStore;
pub use format::{BlockOffset, Trailer};
pub use integrity::{IntegrityReport, ListKind};
pub use scanner::{RowScanner, TableScanner};

// =============================================================================
// Shared Constants
// =============================================================================

/// Block header: LiveSlots (4) + NotDeleted (4) + Next (4) + Prev (4) = 16 bytes
pub const BLOCK_HEADER_SIZE: usize = 16;

/// Width of the tombstone flag at the start of every slot
pub const TOMBSTONE_WIDTH: usize = 1;

/// Size of the trailer at the end of every table file
pub const TRAILER_SIZE: usize = Trailer::SIZE;
