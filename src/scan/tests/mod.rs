//! End-to-end scan and pointer pipeline tests over mock process memory.

mod mock_memory;
mod pipeline_tests;

use crate::snapshot::{ReadGroup, Region, Snapshot};

/// Single-region snapshot seeded with one generation of bytes.
pub(crate) fn seeded_snapshot(base: u64, bytes: &[u8]) -> Snapshot {
    let group = ReadGroup::shared(base, bytes.len());
    group.write().unwrap().set_current(bytes.to_vec());
    Snapshot::new(vec![Region::new("test", group, base, bytes.len())])
}

/// Single-region snapshot with both a previous and a current generation.
pub(crate) fn generational_snapshot(base: u64, previous: &[u8], current: &[u8]) -> Snapshot {
    assert_eq!(previous.len(), current.len());
    let group = ReadGroup::shared(base, current.len());
    {
        let mut guard = group.write().unwrap();
        guard.update(previous.to_vec());
        guard.update(current.to_vec());
    }
    Snapshot::new(vec![Region::new("test", group, base, current.len())])
}
