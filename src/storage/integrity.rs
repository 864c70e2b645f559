//! Integrity reporting for table files

use std::fmt;

/// Which of the two block lists is being walked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Active,
    Free,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::Active => write!(f, "active"),
            ListKind::Free => write!(f, "free"),
        }
    }
}

/// Result of a successful `BlockStore::check_integrity` walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Logical file length in bytes
    pub file_len: u64,
    /// Blocks physically present in the file
    pub total_blocks: usize,
    pub active_blocks: usize,
    pub free_blocks: usize,
    pub slots_per_block: usize,
    /// Rows a scan would yield
    pub live_rows: u64,
    /// Tombstoned slots still occupying active blocks
    pub tombstoned_rows: u64,
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "file length:      {} bytes", self.file_len)?;
        writeln!(
            f,
            "blocks:           {} ({} active, {} free)",
            self.total_blocks, self.active_blocks, self.free_blocks
        )?;
        writeln!(f, "slots per block:  {}", self.slots_per_block)?;
        writeln!(f, "live rows:        {}", self.live_rows)?;
        write!(f, "tombstoned rows:  {}", self.tombstoned_rows)
    }
}
