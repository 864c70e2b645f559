//! Tests for RowScanner and TableScanner
//!
//! These tests verify:
//! - Tombstoned slots are skipped
//! - Scan order: head block first, slot order within a block
//! - Mutations act only on the row last yielded
//! - Blocks emptied mid-scan are reclaimed without losing the cursor

use std::path::PathBuf;

use blockheap::storage::{Block, BlockOffset, BlockStore, RowRecord, RowScanner, TableScanner};
use blockheap::{FixedBytesCodec, HeapError, RecordCodec, SyncStrategy};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const WIDTH: usize = 15;
const BLOCK_SIZE: u32 = 80; // 4 slots of 16 bytes

fn codec() -> FixedBytesCodec {
    FixedBytesCodec::new(WIDTH)
}

fn value(byte: u8) -> Vec<u8> {
    vec![byte; WIDTH]
}

/// Store holding rows 0..count, four per block
fn setup_store(count: u8) -> (TempDir, PathBuf, BlockStore) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scan.tdb");
    let mut store = BlockStore::create(
        &path,
        b"schema",
        codec().row_record_size(),
        BLOCK_SIZE,
        SyncStrategy::EveryWrite,
    )
    .unwrap();
    for i in 0..count {
        store.insert_into_head_block(&RowRecord::live(value(i))).unwrap();
    }
    (temp_dir, path, store)
}

fn first_bytes(rows: &[Vec<u8>]) -> Vec<u8> {
    rows.iter().map(|row| row[0]).collect()
}

fn scan_all(store: &mut BlockStore) -> Vec<u8> {
    let codec = codec();
    let rows = TableScanner::new(store, &codec)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    first_bytes(&rows)
}

fn block_with_rows(count: u8) -> Block {
    let mut block = Block::empty(BLOCK_SIZE as usize, WIDTH + 1);
    for i in 0..count {
        block.try_append(&RowRecord::live(value(i))).unwrap();
    }
    block
}

// =============================================================================
// RowScanner Tests
// =============================================================================

#[test]
fn test_row_scanner_yields_slots_in_order() {
    let mut scanner = RowScanner::new(block_with_rows(3));

    for i in 0..3 {
        assert_eq!(scanner.next_fields().unwrap().unwrap(), &value(i)[..]);
        assert_eq!(scanner.current_slot(), Some(i as usize));
    }
    assert!(scanner.next_fields().unwrap().is_none());
    assert_eq!(scanner.current_slot(), None);
}

#[test]
fn test_row_scanner_skips_tombstones() {
    let mut block = block_with_rows(3);
    block.tombstone(1).unwrap();
    let mut scanner = RowScanner::new(block);

    assert_eq!(scanner.next_fields().unwrap().unwrap()[0], 0);
    assert_eq!(scanner.next_fields().unwrap().unwrap()[0], 2);
    assert!(scanner.next_fields().unwrap().is_none());
}

#[test]
fn test_row_scanner_empty_block() {
    let mut scanner = RowScanner::new(block_with_rows(0));

    assert!(scanner.next_fields().unwrap().is_none());
}

#[test]
fn test_row_scanner_reset() {
    let mut scanner = RowScanner::new(block_with_rows(2));
    scanner.next_fields().unwrap();
    scanner.next_fields().unwrap();

    scanner.reset();

    assert_eq!(scanner.current_slot(), None);
    assert_eq!(scanner.next_fields().unwrap().unwrap()[0], 0);
}

#[test]
fn test_row_scanner_mutation_needs_current_row() {
    let mut scanner = RowScanner::new(block_with_rows(2));

    assert!(matches!(scanner.mark_deleted(), Err(HeapError::NoCurrentRow)));
    assert!(matches!(scanner.overwrite(&value(9)), Err(HeapError::NoCurrentRow)));
}

#[test]
fn test_row_scanner_delete_clears_current() {
    let mut scanner = RowScanner::new(block_with_rows(2));
    scanner.next_fields().unwrap();

    assert!(!scanner.mark_deleted().unwrap());
    assert!(matches!(scanner.mark_deleted(), Err(HeapError::NoCurrentRow)));

    scanner.next_fields().unwrap();
    assert!(scanner.mark_deleted().unwrap());
    assert!(scanner.block().is_empty());
}

#[test]
fn test_row_scanner_overwrite_current() {
    let mut scanner = RowScanner::new(block_with_rows(2));
    scanner.next_fields().unwrap();
    scanner.next_fields().unwrap();

    scanner.overwrite(&value(42)).unwrap();

    let block = scanner.into_block();
    assert_eq!(block.slot_fields(0).unwrap(), &value(0)[..]);
    assert_eq!(block.slot_fields(1).unwrap(), &value(42)[..]);
}

// =============================================================================
// TableScanner Read Tests
// =============================================================================

#[test]
fn test_scan_empty_table() {
    let (_temp, _path, mut store) = setup_store(0);

    assert!(scan_all(&mut store).is_empty());
}

#[test]
fn test_scan_order_head_block_first() {
    let (_temp, _path, mut store) = setup_store(6);

    assert_eq!(scan_all(&mut store), vec![4, 5, 0, 1, 2, 3]);
}

#[test]
fn test_scan_rejects_codec_of_other_width() {
    let (_temp, _path, mut store) = setup_store(1);
    let wide = FixedBytesCodec::new(WIDTH + 4);

    let result = TableScanner::new(&mut store, &wide);

    assert!(matches!(
        result,
        Err(HeapError::SchemaMismatch { expected: WIDTH, actual: 19 })
    ));
}

#[test]
fn test_scan_reports_block_of_current_row() {
    let (_temp, _path, mut store) = setup_store(5);
    let codec = codec();
    let mut scanner = TableScanner::new(&mut store, &codec).unwrap();
    assert_eq!(scanner.current_block_offset(), None);

    scanner.advance().unwrap();

    assert_eq!(scanner.current_block_offset(), BlockOffset::new(86));
}

#[test]
fn test_rewind_restarts_at_head() {
    let (_temp, _path, mut store) = setup_store(5);
    let codec = codec();
    let mut scanner = TableScanner::new(&mut store, &codec).unwrap();
    while scanner.advance().unwrap().is_some() {}

    scanner.rewind();

    assert_eq!(scanner.advance().unwrap().unwrap()[0], 4);
}

#[test]
fn test_scan_detects_broken_back_link() {
    let (_temp, _path, mut store) = setup_store(5);
    let tail = BlockOffset::new(6).unwrap();
    let mut block = store.load_block(tail).unwrap();
    block.set_prev(None);
    store.write_block(tail, &block).unwrap();
    let codec = codec();

    let results: Vec<_> = TableScanner::new(&mut store, &codec).unwrap().collect();

    // Head block rows, then the error, then nothing
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(HeapError::Corruption(_))));
}

// =============================================================================
// TableScanner Mutation Tests
// =============================================================================

#[test]
fn test_mutation_before_first_row_fails() {
    let (_temp, _path, mut store) = setup_store(2);
    let codec = codec();
    let mut scanner = TableScanner::new(&mut store, &codec).unwrap();

    assert!(matches!(
        scanner.delete_current_and_advance(),
        Err(HeapError::NoCurrentRow)
    ));
    assert!(matches!(
        scanner.replace_current_and_advance(&value(1)),
        Err(HeapError::NoCurrentRow)
    ));
}

#[test]
fn test_mutation_after_exhaustion_fails() {
    let (_temp, _path, mut store) = setup_store(2);
    let codec = codec();
    let mut scanner = TableScanner::new(&mut store, &codec).unwrap();
    while scanner.advance().unwrap().is_some() {}

    assert!(matches!(
        scanner.delete_current_and_advance(),
        Err(HeapError::NoCurrentRow)
    ));
}

#[test]
fn test_replace_persists_and_advances() {
    let (_temp, _path, mut store) = setup_store(3);
    let codec = codec();
    {
        let mut scanner = TableScanner::new(&mut store, &codec).unwrap();
        scanner.advance().unwrap();
        let next = scanner.replace_current_and_advance(&value(77)).unwrap();
        assert_eq!(next.unwrap()[0], 1);
    }

    assert_eq!(scan_all(&mut store), vec![77, 1, 2]);
}

#[test]
fn test_replace_with_wrong_width_fails() {
    let (_temp, _path, mut store) = setup_store(1);
    let codec = codec();
    let mut scanner = TableScanner::new(&mut store, &codec).unwrap();
    scanner.advance().unwrap();

    let result = scanner.replace_current_and_advance(&vec![1; WIDTH + 1]);

    assert!(matches!(result, Err(HeapError::RecordTooLarge { .. })));
}

#[test]
fn test_delete_keeps_partially_filled_block() {
    let (_temp, _path, mut store) = setup_store(3);
    let codec = codec();
    {
        let mut scanner = TableScanner::new(&mut store, &codec).unwrap();
        scanner.advance().unwrap();
        scanner.advance().unwrap();
        assert_eq!(scanner.delete_current_and_advance().unwrap().unwrap()[0], 2);
    }

    assert_eq!(scan_all(&mut store), vec![0, 2]);
    let report = store.check_integrity().unwrap();
    assert_eq!(report.active_blocks, 1);
    assert_eq!(report.tombstoned_rows, 1);
}

#[test]
fn test_delete_reclaims_middle_block_mid_scan() {
    // Active list: block2 (8..11) -> block1 (4..7) -> block0 (0..3)
    let (_temp, _path, mut store) = setup_store(12);
    let codec = codec();
    let mut seen = Vec::new();
    {
        let mut scanner = TableScanner::new(&mut store, &codec).unwrap();
        let mut next = scanner.advance().unwrap();
        while let Some(row) = next {
            seen.push(row[0]);
            next = if (4..8).contains(&row[0]) {
                scanner.delete_current_and_advance().unwrap()
            } else {
                scanner.advance().unwrap()
            };
        }
    }

    assert_eq!(seen, vec![8, 9, 10, 11, 4, 5, 6, 7, 0, 1, 2, 3]);
    assert_eq!(scan_all(&mut store), vec![8, 9, 10, 11, 0, 1, 2, 3]);
    assert_eq!(store.free_offsets().unwrap(), vec![BlockOffset::new(86).unwrap()]);
    store.check_integrity().unwrap();
}

#[test]
fn test_delete_reclaims_head_block_mid_scan() {
    let (_temp, _path, mut store) = setup_store(8);
    let codec = codec();
    let mut seen = Vec::new();
    {
        let mut scanner = TableScanner::new(&mut store, &codec).unwrap();
        let mut next = scanner.advance().unwrap();
        while let Some(row) = next {
            seen.push(row[0]);
            next = if row[0] >= 4 {
                scanner.delete_current_and_advance().unwrap()
            } else {
                scanner.advance().unwrap()
            };
        }
    }

    assert_eq!(seen, vec![4, 5, 6, 7, 0, 1, 2, 3]);
    assert_eq!(store.trailer().data_list_head, BlockOffset::new(6));
    store.check_integrity().unwrap();
}

#[test]
fn test_delete_every_row_frees_every_block() {
    let (_temp, path, mut store) = setup_store(10);
    let codec = codec();
    {
        let mut scanner = TableScanner::new(&mut store, &codec).unwrap();
        let mut next = scanner.advance().unwrap();
        while next.is_some() {
            next = scanner.delete_current_and_advance().unwrap();
        }
    }

    assert!(scan_all(&mut store).is_empty());
    assert_eq!(store.trailer().data_list_head, None);
    let report = store.check_integrity().unwrap();
    assert_eq!(report.free_blocks, 3);
    assert_eq!(report.live_rows, 0);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), store.file_len());
}
