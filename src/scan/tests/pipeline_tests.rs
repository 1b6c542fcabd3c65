//! Collection and session pipelines over mock process memory.

use super::mock_memory::{MOCK_PAGE, MockMemory};
use crate::core::PointerWidth;
use crate::scan::engine::ScannerPool;
use crate::scan::{
    Constraint, ConstraintKind, Constraints, DataType, MemoryAlignment, ScalarKind, collector,
    manual,
};
use crate::session::{ScanSession, SnapshotSeed};
use crate::snapshot::{ElementIndexer, Snapshot};
use crate::task::TaskContext;
use std::sync::Arc;

fn u32_equal(value: i128) -> Constraints {
    Constraints::single(
        Constraint::equal_int(value),
        DataType::scalar(ScalarKind::U32),
        MemoryAlignment::Auto,
    )
    .unwrap()
}

#[test]
fn unreadable_groups_are_skipped_not_fatal() {
    let mem = MockMemory::new();
    let base = mem.malloc(0x7000_0000_0000, 4 * MOCK_PAGE);
    mem.write_u32(base + 0x10, 9876);
    mem.write_u32(base + 2 * MOCK_PAGE as u64 + 0x20, 9876);
    mem.set_faulty_pages(base, &[2]);

    let snapshot =
        Snapshot::from_spans([("heap".to_string(), base, 4 * MOCK_PAGE)], MOCK_PAGE).unwrap();
    assert_eq!(snapshot.read_groups().len(), 4);

    let process = MockMemory::process(PointerWidth::Eight);
    let task = TaskContext::detached();
    collector::collect_values(&mem, &process, &snapshot, &task).unwrap();

    // The value on the faulty page is invisible; the rest of the span
    // scans normally.
    let pool = ScannerPool::new();
    let result = manual::scan(&snapshot, &u32_equal(9876), &pool, &task).unwrap();
    assert_eq!(result.element_addresses(4, 4), vec![base + 0x10]);
}

#[test]
fn collection_rotates_generations_for_relative_scans() {
    let mem = MockMemory::new();
    let base = mem.malloc(0x7100_0000_0000, MOCK_PAGE);
    for i in 0u64..4 {
        mem.write_u32(base + i * 4, 10 + i as u32);
    }

    let snapshot = Snapshot::from_spans([("heap".to_string(), base, MOCK_PAGE)], MOCK_PAGE).unwrap();
    let process = MockMemory::process(PointerWidth::Eight);
    let task = TaskContext::detached();
    let pool = ScannerPool::new();

    collector::collect_values(&mem, &process, &snapshot, &task).unwrap();

    let changed = Constraints::single(
        Constraint::new(ConstraintKind::Changed),
        DataType::scalar(ScalarKind::U32),
        MemoryAlignment::Auto,
    )
    .unwrap();

    // One generation only: the relative scan has nothing to compare against.
    let result = manual::scan(&snapshot, &changed, &pool, &task).unwrap();
    assert_eq!(result.region_count(), 0);

    mem.write_u32(base + 8, 999);
    collector::collect_values(&mem, &process, &snapshot, &task).unwrap();

    let result = manual::scan(&snapshot, &changed, &pool, &task).unwrap();
    assert_eq!(result.element_addresses(4, 4), vec![base + 8]);
}

#[test]
fn session_runs_value_pipeline_as_tasks() {
    let mem = Arc::new(MockMemory::new());
    mem.add_module("libgame.so", 0x10_0000, MOCK_PAGE);
    let base = mem.malloc(0x7200_0000_0000, MOCK_PAGE);
    mem.write_u32(base + 0x40, 777);

    let session = ScanSession::new(MockMemory::process(PointerWidth::Eight), mem.clone());
    let snapshot = session.snapshot(SnapshotSeed::Heaps).unwrap();
    assert_eq!(snapshot.region_count(), 1);

    let collected = session
        .collect_values(&snapshot)
        .unwrap()
        .wait()
        .expect("collection completes");

    let narrowed = session
        .scan_values(&collected, &u32_equal(777))
        .unwrap()
        .wait()
        .expect("scan completes");

    assert_eq!(narrowed.element_addresses(4, 4), vec![base + 0x40]);
    assert_eq!(
        narrowed.value_at(base + 0x40, 4),
        Some(777u32.to_le_bytes().to_vec())
    );

    // Result enumeration through the element view.
    let indexer = ElementIndexer::new(&narrowed.regions()[0], 4, 4).unwrap();
    let listed: Vec<(u64, Vec<u8>)> = indexer.iter().map(|(a, v)| (a, v.to_vec())).collect();
    assert_eq!(listed, vec![(base + 0x40, 777u32.to_le_bytes().to_vec())]);
    drop(indexer);

    // Narrow again with live memory updated: the shared read groups carry
    // the new generation into the narrowed snapshot.
    mem.write_u32(base + 0x40, 778);
    session
        .collect_values(&narrowed)
        .unwrap()
        .wait()
        .expect("recollection completes");
    let gone = session
        .scan_values(&narrowed, &u32_equal(777))
        .unwrap()
        .wait()
        .expect("scan completes");
    assert_eq!(gone.region_count(), 0);
}

#[test]
fn snapshot_seeds_cover_the_requested_pages() {
    let mem = Arc::new(MockMemory::new());
    mem.add_module("libgame.so", 0x10_0000, MOCK_PAGE);
    mem.malloc(0x7300_0000_0000, 2 * MOCK_PAGE);

    let session = ScanSession::new(MockMemory::process(PointerWidth::Eight), mem);
    let modules = session.snapshot(SnapshotSeed::Modules).unwrap();
    assert_eq!(modules.byte_count(), MOCK_PAGE);
    assert_eq!(modules.regions()[0].name(), "libgame.so");

    let heaps = session.snapshot(SnapshotSeed::Heaps).unwrap();
    assert_eq!(heaps.byte_count(), 2 * MOCK_PAGE);

    let all = session.snapshot(SnapshotSeed::FullAddressSpace).unwrap();
    assert_eq!(all.byte_count(), 3 * MOCK_PAGE);
}
