//! Table Store
//!
//! Per-call façade over the table files of one data directory.
//!
//! ## Responsibilities
//! - Map table names to `{data_dir}/{name}.tdb`
//! - Bootstrap new table files (schema blob + empty trailer)
//! - Run inserts and predicate-driven update/delete scans
//! - Open exactly one file handle per call and release it before returning
//!
//! ## Concurrency
//! None. Two calls running at the same time against the same table can
//! interleave block and trailer writes and corrupt its lists. Callers that
//! need concurrent writers must serialize per table above this layer.
//!
//! ## Atomicity
//! Each block write is durable on return (with `SyncStrategy::EveryWrite`),
//! but a multi-block mutation is not atomic. A scan that fails midway keeps
//! the changes it already applied to earlier rows.

use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::RecordCodec;
use crate::config::Config;
use crate::error::{HeapError, Result};
use crate::storage::{BlockStore, IntegrityReport, RowRecord, TableScanner, Trailer};

/// What `TableStore::open` learns about a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    /// Externally encoded schema stored at offset 0
    pub schema: Vec<u8>,
    pub trailer: Trailer,
    pub file_len: u64,
}

impl TableInfo {
    pub fn row_record_size(&self) -> usize {
        self.trailer.row_record_size as usize
    }

    pub fn block_size(&self) -> usize {
        self.trailer.block_size as usize
    }

    pub fn rows_per_block(&self) -> usize {
        self.trailer.slot_capacity()
    }
}

/// Table files of one data directory
#[derive(Debug, Clone)]
pub struct TableStore {
    config: Config,
}

impl TableStore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const FILE_EXTENSION: &'static str = "tdb";

    /// Validate the config and create the data directory if needed
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    /// Store with default config rooted at `path`
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().data_dir(path).build();
        Self::new(config)
    }

    // =========================================================================
    // Table Lifecycle
    // =========================================================================

    /// Create a table file holding `schema_blob` and no rows.
    ///
    /// `row_record_size` is the full slot width (tombstone included), usually
    /// `codec.row_record_size()`. The block size comes from the config.
    pub fn create(
        &self,
        name: &str,
        schema_blob: &[u8],
        row_record_size: usize,
    ) -> Result<TableInfo> {
        let path = self.table_path(name)?;
        if path.exists() {
            return Err(HeapError::TableAlreadyExists(name.to_string()));
        }

        let store = BlockStore::create(
            &path,
            schema_blob,
            row_record_size,
            self.config.block_size,
            self.config.sync_strategy,
        )
        .map_err(|e| match e {
            HeapError::TableAlreadyExists(_) => HeapError::TableAlreadyExists(name.to_string()),
            other => other,
        })?;

        tracing::debug!(table = name, "Created table");
        Ok(TableInfo {
            name: name.to_string(),
            schema: schema_blob.to_vec(),
            trailer: store.trailer(),
            file_len: store.file_len(),
        })
    }

    /// Load a table's trailer and schema blob
    pub fn open(&self, name: &str) -> Result<TableInfo> {
        let mut store = self.open_store(name)?;
        Ok(TableInfo {
            name: name.to_string(),
            schema: store.read_schema_blob()?,
            trailer: store.trailer(),
            file_len: store.file_len(),
        })
    }

    /// Whether a file exists for `name`
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.table_path(name)?.is_file())
    }

    /// Delete a table file
    pub fn remove(&self, name: &str) -> Result<()> {
        let path = self.table_path(name)?;
        if !path.is_file() {
            return Err(HeapError::TableNotFound(name.to_string()));
        }
        fs::remove_file(&path)?;
        tracing::debug!(table = name, "Removed table");
        Ok(())
    }

    /// Names of the tables in the data directory, sorted
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() {
                if let Some(name) = Self::parse_table_name(&path) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    // =========================================================================
    // Row Operations
    // =========================================================================

    /// Append one row to the table's head block
    pub fn insert_row<C: RecordCodec>(&self, name: &str, codec: &C, row: &C::Row) -> Result<()> {
        let mut store = self.open_store(name)?;
        let expected = store.trailer().field_width();
        if codec.field_width() != expected {
            return Err(HeapError::SchemaMismatch {
                expected,
                actual: codec.field_width(),
            });
        }

        let fields = codec.encode(row)?;
        if fields.len() != expected {
            return Err(HeapError::SchemaMismatch {
                expected,
                actual: fields.len(),
            });
        }

        let offset = store.insert_into_head_block(&RowRecord::live(fields))?;
        tracing::trace!(table = name, %offset, "Inserted row");
        Ok(())
    }

    /// Replace every row matching `predicate` with `new_row`.
    ///
    /// The predicate sees each live row exactly once, head block to tail and
    /// slot order within a block. Returns the number of rows replaced.
    pub fn scan_and_update<C, P>(
        &self,
        name: &str,
        codec: &C,
        mut predicate: P,
        new_row: &C::Row,
    ) -> Result<usize>
    where
        C: RecordCodec,
        P: FnMut(&C::Row) -> bool,
    {
        let mut store = self.open_store(name)?;
        let mut scanner = TableScanner::new(&mut store, codec)?;

        let mut updated = 0;
        let mut next = scanner.advance()?;
        while let Some(row) = next {
            next = if predicate(&row) {
                updated += 1;
                scanner.replace_current_and_advance(new_row)?
            } else {
                scanner.advance()?
            };
        }

        tracing::debug!(table = name, updated, "Update scan finished");
        Ok(updated)
    }

    /// Delete every row matching `predicate`, reclaiming blocks that empty out.
    ///
    /// Same visiting order as [`TableStore::scan_and_update`]. Returns the
    /// number of rows deleted.
    pub fn scan_and_delete<C, P>(&self, name: &str, codec: &C, mut predicate: P) -> Result<usize>
    where
        C: RecordCodec,
        P: FnMut(&C::Row) -> bool,
    {
        let mut store = self.open_store(name)?;
        let mut scanner = TableScanner::new(&mut store, codec)?;

        let mut deleted = 0;
        let mut next = scanner.advance()?;
        while let Some(row) = next {
            next = if predicate(&row) {
                deleted += 1;
                scanner.delete_current_and_advance()?
            } else {
                scanner.advance()?
            };
        }

        tracing::debug!(table = name, deleted, "Delete scan finished");
        Ok(deleted)
    }

    /// Every live row of the table, in scan order
    pub fn load_all<C: RecordCodec>(&self, name: &str, codec: &C) -> Result<Vec<C::Row>> {
        let mut store = self.open_store(name)?;
        let scanner = TableScanner::new(&mut store, codec)?;
        scanner.collect()
    }

    /// Stream every live row through `f` without collecting them.
    ///
    /// The file handle stays inside this call; an error from `f` stops the scan.
    pub fn for_each_row<C, F>(&self, name: &str, codec: &C, mut f: F) -> Result<()>
    where
        C: RecordCodec,
        F: FnMut(C::Row) -> Result<()>,
    {
        let mut store = self.open_store(name)?;
        let mut scanner = TableScanner::new(&mut store, codec)?;
        while let Some(row) = scanner.advance()? {
            f(row)?;
        }
        Ok(())
    }

    /// Walk both block lists of a table and report on them
    pub fn verify(&self, name: &str) -> Result<IntegrityReport> {
        self.open_store(name)?.check_integrity()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// File backing table `name`
    pub fn table_path(&self, name: &str) -> Result<PathBuf> {
        Self::validate_name(name)?;
        Ok(self
            .config
            .data_dir
            .join(format!("{}.{}", name, Self::FILE_EXTENSION)))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn open_store(&self, name: &str) -> Result<BlockStore> {
        let path = self.table_path(name)?;
        if !path.is_file() {
            return Err(HeapError::TableNotFound(name.to_string()));
        }
        BlockStore::open(&path, self.config.sync_strategy).map_err(|e| match e {
            HeapError::TableNotFound(_) => HeapError::TableNotFound(name.to_string()),
            other => other,
        })
    }

    /// Names become file names, so they must stay inside the data directory
    fn validate_name(name: &str) -> Result<()> {
        let invalid = name.is_empty()
            || name.starts_with('.')
            || name.chars().any(|c| c == '/' || c == '\\' || c == '\0');
        if invalid {
            return Err(HeapError::InvalidTableName(name.to_string()));
        }
        Ok(())
    }

    /// "users.tdb" → Some("users")
    fn parse_table_name(path: &Path) -> Option<String> {
        if path.extension()? != Self::FILE_EXTENSION {
            return None;
        }
        let name = path.file_stem()?.to_str()?;
        Self::validate_name(name).ok()?;
        Some(name.to_string())
    }
}
