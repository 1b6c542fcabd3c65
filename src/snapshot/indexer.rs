//! Read-only element views over a region.

use crate::snapshot::read_group::ReadGroup;
use crate::snapshot::region::Region;
use anyhow::{Result, anyhow};
use std::sync::RwLockReadGuard;

/// A view onto the candidate elements of one region for a given element size
/// and stride, exposing each element's absolute address, current value and
/// previous value. Holds a read lock on the backing group for its lifetime.
pub struct ElementIndexer<'a> {
    region: &'a Region,
    guard: RwLockReadGuard<'a, ReadGroup>,
    group_offset: usize,
    element_size: usize,
    stride: usize,
}

impl<'a> ElementIndexer<'a> {
    pub fn new(region: &'a Region, element_size: usize, stride: usize) -> Result<Self> {
        let guard = region
            .group()
            .read()
            .map_err(|_| anyhow!("read group lock poisoned"))?;
        let group_offset = (region.base() - guard.base()) as usize;
        Ok(Self {
            region,
            guard,
            group_offset,
            element_size,
            stride,
        })
    }

    /// Total candidate elements across the region's element ranges.
    pub fn element_count(&self) -> usize {
        self.region.element_count(self.element_size, self.stride)
    }

    /// Region-relative byte offset of the element at `index`, counting
    /// elements across ranges in order.
    fn offset_of(&self, index: usize) -> Option<usize> {
        let mut remaining = index;
        for range in self.region.element_ranges() {
            let count = range.element_count(self.element_size, self.stride);
            if remaining < count {
                return Some(range.offset + remaining * self.stride);
            }
            remaining -= count;
        }
        None
    }

    /// Absolute address of the element at `index`.
    pub fn address(&self, index: usize) -> Option<u64> {
        self.offset_of(index).map(|off| self.region.base() + off as u64)
    }

    /// Current bytes of the element at `index`.
    pub fn current_value(&self, index: usize) -> Option<&[u8]> {
        let off = self.group_offset + self.offset_of(index)?;
        let bytes = self.guard.current()?;
        bytes.get(off..off + self.element_size)
    }

    /// Previous bytes of the element at `index` (absent before the second
    /// collection).
    pub fn previous_value(&self, index: usize) -> Option<&[u8]> {
        let off = self.group_offset + self.offset_of(index)?;
        let bytes = self.guard.previous()?;
        bytes.get(off..off + self.element_size)
    }

    /// Iterate `(address, current bytes)` for every candidate element.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u8])> + '_ {
        (0..self.element_count()).filter_map(move |i| {
            let addr = self.address(i)?;
            let value = self.current_value(i)?;
            Some((addr, value))
        })
    }
}
