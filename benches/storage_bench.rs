//! Benchmarks for blockheap storage operations

use blockheap::{Config, FixedBytesCodec, RecordCodec, SyncStrategy, TableStore};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;

const ROW_WIDTH: usize = 64;
const ROWS: usize = 1_000;

fn setup_store() -> (TempDir, TableStore) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .block_size(4096)
        .sync_strategy(SyncStrategy::OsBuffered) // measure layout cost, not fsync
        .build();
    let store = TableStore::new(config).unwrap();
    (temp_dir, store)
}

fn filled_table(codec: &FixedBytesCodec) -> (TempDir, TableStore) {
    let (temp, store) = setup_store();
    store.create("bench", b"schema", codec.row_record_size()).unwrap();
    for i in 0..ROWS {
        store.insert_row("bench", codec, &vec![(i % 251) as u8; ROW_WIDTH]).unwrap();
    }
    (temp, store)
}

fn storage_benchmarks(c: &mut Criterion) {
    let codec = FixedBytesCodec::new(ROW_WIDTH);

    c.bench_function("insert_1000_rows", |b| {
        b.iter_batched(
            || {
                let (temp, store) = setup_store();
                store.create("bench", b"schema", codec.row_record_size()).unwrap();
                (temp, store)
            },
            |(_temp, store)| {
                for i in 0..ROWS {
                    store.insert_row("bench", &codec, &vec![(i % 251) as u8; ROW_WIDTH]).unwrap();
                }
            },
            BatchSize::PerIteration,
        )
    });

    let (_temp, store) = filled_table(&codec);
    c.bench_function("load_all_1000_rows", |b| {
        b.iter(|| store.load_all("bench", &codec).unwrap().len())
    });

    c.bench_function("delete_half_then_refill", |b| {
        b.iter_batched(
            || filled_table(&codec),
            |(_temp, store)| {
                store.scan_and_delete("bench", &codec, |row| row[0] % 2 == 0).unwrap();
                for _ in 0..ROWS / 2 {
                    store.insert_row("bench", &codec, &vec![1u8; ROW_WIDTH]).unwrap();
                }
            },
            BatchSize::PerIteration,
        )
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
