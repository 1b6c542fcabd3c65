//! Address-range data model for scan generations.
//!
//! A [`Snapshot`] is one generation of scanned memory: an ordered list of
//! [`Region`]s whose bytes live in shared [`ReadGroup`] buffers. Snapshots
//! own no I/O; the value collector fills them and the manual scanner narrows
//! them, each scan producing a new snapshot that supersedes its input.

pub mod indexer;
pub mod read_group;
pub mod region;

pub use indexer::ElementIndexer;
pub use read_group::{ReadGroup, SharedReadGroup};
pub use region::{ElementRange, Region};

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::Arc;

/// An ordered collection of regions representing one scan generation.
/// Immutable once built; superseded, never mutated, by subsequent scans.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    regions: Vec<Region>,
}

impl Snapshot {
    /// Build a snapshot; regions are kept ordered by base address.
    pub fn new(mut regions: Vec<Region>) -> Self {
        regions.sort_by_key(|r| r.base());
        Self { regions }
    }

    pub fn empty() -> Self {
        Self { regions: Vec::new() }
    }

    /// Seed a snapshot over raw `(name, base, size)` address spans, split
    /// into chunks for parallel reading. Each chunk gets its own read group
    /// so collection failures stay chunk granular.
    pub fn from_spans(
        spans: impl IntoIterator<Item = (String, u64, usize)>,
        chunk_size: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(anyhow!("chunk size must be positive"));
        }
        let mut regions = Vec::new();
        for (name, base, size) in spans {
            let mut offset = 0usize;
            while offset < size {
                let len = chunk_size.min(size - offset);
                let chunk_base = base + offset as u64;
                let group = ReadGroup::shared(chunk_base, len);
                let chunk_name = if offset == 0 && len == size {
                    name.clone()
                } else {
                    format!("{}+0x{:X}", name, offset)
                };
                regions.push(Region::new(chunk_name, group, chunk_base, len));
                offset += len;
            }
        }
        Ok(Self::new(regions))
    }

    /// Absolute addresses of every candidate element, region order.
    pub fn element_addresses(&self, element_size: usize, stride: usize) -> Vec<u64> {
        let mut addresses = Vec::new();
        for region in &self.regions {
            for range in region.element_ranges() {
                let count = range.element_count(element_size, stride);
                let start = region.base() + range.offset as u64;
                for k in 0..count {
                    addresses.push(start + (k * stride) as u64);
                }
            }
        }
        addresses
    }

    #[inline]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[inline]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.iter().all(|r| r.element_ranges().is_empty())
    }

    /// Aggregate candidate element count for an element size and stride,
    /// recomputed on demand.
    pub fn element_count(&self, element_size: usize, stride: usize) -> usize {
        self.regions
            .iter()
            .map(|r| r.element_count(element_size, stride))
            .sum()
    }

    /// Aggregate matched byte count.
    pub fn byte_count(&self) -> usize {
        self.regions.iter().map(|r| r.byte_count()).sum()
    }

    /// De-duplicated view of the read groups referenced by this snapshot's
    /// regions, for efficient re-reading. Regions sharing a group (from
    /// overlapping ranges) appear once.
    pub fn read_groups(&self) -> Vec<SharedReadGroup> {
        let mut seen: HashMap<usize, ()> = HashMap::with_capacity(self.regions.len());
        let mut groups = Vec::new();
        for region in &self.regions {
            let key = Arc::as_ptr(region.group()) as usize;
            if seen.insert(key, ()).is_none() {
                groups.push(region.group().clone());
            }
        }
        groups
    }

    /// The region containing `address`, if any (regions are base-ordered).
    pub fn region_at(&self, address: u64) -> Option<&Region> {
        let idx = self.regions.partition_point(|r| r.end() <= address);
        let region = self.regions.get(idx)?;
        (address >= region.base() && address < region.end()).then_some(region)
    }

    /// True if `address` is a candidate element start in some region's
    /// element ranges at the given stride.
    pub fn contains_element(&self, address: u64, stride: usize) -> bool {
        let Some(region) = self.region_at(address) else {
            return false;
        };
        let rel = (address - region.base()) as usize;
        region.element_ranges().iter().any(|r| {
            rel >= r.offset && rel < r.end() && stride != 0 && (rel - r.offset) % stride == 0
        })
    }

    /// Current bytes of the element starting at `address`, if the address is
    /// inside some region and its group holds current values.
    pub fn value_at(&self, address: u64, size: usize) -> Option<Vec<u8>> {
        let region = self.region_at(address)?;
        let group = region.group().read().ok()?;
        let off = (address - group.base()) as usize;
        group.current()?.get(off..off + size).map(|b| b.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_with_shared_group(group: &SharedReadGroup, base: u64, size: usize) -> Region {
        Region::new("r", group.clone(), base, size)
    }

    #[test]
    fn read_groups_are_deduplicated() {
        let shared = ReadGroup::shared(0x1000, 0x100);
        let other = ReadGroup::shared(0x3000, 0x100);
        let snapshot = Snapshot::new(vec![
            region_with_shared_group(&shared, 0x1000, 0x80),
            region_with_shared_group(&shared, 0x1080, 0x80),
            region_with_shared_group(&other, 0x3000, 0x100),
        ]);
        assert_eq!(snapshot.region_count(), 3);
        assert_eq!(snapshot.read_groups().len(), 2);
    }

    #[test]
    fn regions_are_ordered_and_addressable() {
        let a = ReadGroup::shared(0x3000, 0x10);
        let b = ReadGroup::shared(0x1000, 0x10);
        let snapshot = Snapshot::new(vec![
            region_with_shared_group(&a, 0x3000, 0x10),
            region_with_shared_group(&b, 0x1000, 0x10),
        ]);
        assert_eq!(snapshot.regions()[0].base(), 0x1000);
        assert!(snapshot.region_at(0x3008).is_some());
        assert!(snapshot.region_at(0x2000).is_none());
        assert!(snapshot.region_at(0x3010).is_none());
    }

    #[test]
    fn element_membership_respects_stride() {
        let group = ReadGroup::shared(0x1000, 0x20);
        let snapshot = Snapshot::new(vec![region_with_shared_group(&group, 0x1000, 0x20)]);
        assert!(snapshot.contains_element(0x1008, 4));
        assert!(!snapshot.contains_element(0x1006, 4));
        assert!(snapshot.contains_element(0x1006, 2));
    }
}
