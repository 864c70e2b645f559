//! # blockheap
//!
//! Persistent heap-file storage for the tables of a small relational engine:
//! - One file per table holding fixed-width rows in fixed-size blocks
//! - Active and free block lists, doubly linked by file offset
//! - Tombstone deletion per row, reclamation per emptied block
//! - Recycled blocks reused before the file ever grows
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TableStore                              │
//! │        (one file handle per call, name → {name}.tdb)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │   insert    │          │ TableScanner │──── RecordCodec
//!   │ (head block)│          │ (update/del) │
//!   └──────┬──────┘          └──────┬───────┘
//!          │                        │ one RowScanner per block
//!          └───────────┬────────────┘
//!                      ▼
//!              ┌───────────────┐
//!              │  BlockStore   │
//!              │ (blocks+lists)│
//!              └───────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod storage;
pub mod table;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{HeapError, Result};
pub use config::{Config, SyncStrategy};
pub use codec::{BincodeCodec, FixedBytesCodec, RecordCodec};
pub use table::{TableInfo, TableStore};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of blockheap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
