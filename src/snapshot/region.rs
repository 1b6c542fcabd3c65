//! Regions and their matched element ranges.

use crate::snapshot::read_group::SharedReadGroup;
use anyhow::{Result, anyhow};

/// A contiguous run of interesting bytes inside a region, offsets relative
/// to the region base. Initially the whole region; narrowed by each scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementRange {
    pub offset: usize,
    pub length: usize,
}

impl ElementRange {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Number of candidate elements at the given size and stride.
    #[inline]
    pub fn element_count(&self, element_size: usize, stride: usize) -> usize {
        if self.length < element_size || element_size == 0 || stride == 0 {
            return 0;
        }
        (self.length - element_size) / stride + 1
    }
}

/// A named sub-range of the address space, backed by one (possibly shared)
/// read group.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    group: SharedReadGroup,
    base: u64,
    size: usize,
    element_ranges: Vec<ElementRange>,
}

impl Region {
    pub fn new(name: impl Into<String>, group: SharedReadGroup, base: u64, size: usize) -> Self {
        Self {
            name: name.into(),
            group,
            base,
            size,
            element_ranges: vec![ElementRange::new(0, size)],
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn group(&self) -> &SharedReadGroup {
        &self.group
    }

    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn end(&self) -> u64 {
        self.base + self.size as u64
    }

    #[inline]
    pub fn element_ranges(&self) -> &[ElementRange] {
        &self.element_ranges
    }

    /// Byte offset of this region's base inside its read group buffer.
    pub fn group_offset(&self) -> Result<usize> {
        let group = self
            .group
            .read()
            .map_err(|_| anyhow!("read group lock poisoned"))?;
        if self.base < group.base() || self.end() > group.end() {
            return Err(anyhow!(
                "region 0x{:X}..0x{:X} outside its read group 0x{:X}..0x{:X}",
                self.base,
                self.end(),
                group.base(),
                group.end()
            ));
        }
        Ok((self.base - group.base()) as usize)
    }

    /// Replace the element ranges. Every range must lie within the region.
    pub fn set_element_ranges(&mut self, ranges: Vec<ElementRange>) -> Result<()> {
        for range in &ranges {
            if range.end() > self.size {
                return Err(anyhow!(
                    "element range {}..{} outside region of {} bytes",
                    range.offset,
                    range.end(),
                    self.size
                ));
            }
        }
        self.element_ranges = ranges;
        Ok(())
    }

    /// Shift the base forward to the next multiple of `alignment`,
    /// preserving the end address. Element ranges are remapped and clipped.
    ///
    /// Region-shaping surface for callers that pre-trim snapshots; the scan
    /// engine itself aligns by skipping to the next absolute stride boundary.
    pub fn align(&mut self, alignment: usize) {
        if alignment <= 1 {
            return;
        }
        let rem = (self.base % alignment as u64) as usize;
        if rem == 0 {
            return;
        }
        let shift = alignment - rem;
        if shift >= self.size {
            self.base += self.size as u64;
            self.size = 0;
            self.element_ranges.clear();
            return;
        }
        self.base += shift as u64;
        self.size -= shift;
        self.element_ranges = self
            .element_ranges
            .iter()
            .filter_map(|r| {
                let end = r.end();
                if end <= shift {
                    return None;
                }
                let clipped_start = r.offset.max(shift);
                Some(ElementRange::new(clipped_start - shift, end - clipped_start))
            })
            .collect();
    }

    /// Grow the region symmetrically by `margin` bytes, clamped to the read
    /// group bounds.
    ///
    /// Region-shaping surface for callers that widen a narrowed snapshot
    /// before rescanning; the scan engine takes its own over-read headroom
    /// by slicing to the end of the backing group buffer.
    pub fn expand(&self, margin: usize) -> Result<Region> {
        let (group_base, group_end) = {
            let group = self
                .group
                .read()
                .map_err(|_| anyhow!("read group lock poisoned"))?;
            (group.base(), group.end())
        };
        let new_base = self.base.saturating_sub(margin as u64).max(group_base);
        let new_end = (self.end() + margin as u64).min(group_end);
        let shift = (self.base - new_base) as usize;

        let mut expanded = Region {
            name: self.name.clone(),
            group: self.group.clone(),
            base: new_base,
            size: (new_end - new_base) as usize,
            element_ranges: Vec::with_capacity(self.element_ranges.len()),
        };
        for range in &self.element_ranges {
            expanded
                .element_ranges
                .push(ElementRange::new(range.offset + shift, range.length));
        }
        Ok(expanded)
    }

    /// Split into fixed-size chunks for parallel processing. Element ranges
    /// are intersected with each chunk.
    pub fn chunk(&self, chunk_size: usize) -> Result<Vec<Region>> {
        if chunk_size == 0 {
            return Err(anyhow!("chunk size must be positive"));
        }
        if self.size <= chunk_size {
            return Ok(vec![self.clone()]);
        }

        let mut chunks = Vec::with_capacity(self.size.div_ceil(chunk_size));
        let mut offset = 0usize;
        while offset < self.size {
            let len = chunk_size.min(self.size - offset);
            let chunk_end = offset + len;

            let ranges: Vec<ElementRange> = self
                .element_ranges
                .iter()
                .filter_map(|r| {
                    let start = r.offset.max(offset);
                    let end = r.end().min(chunk_end);
                    (start < end).then(|| ElementRange::new(start - offset, end - start))
                })
                .collect();

            chunks.push(Region {
                name: format!("{}+0x{:X}", self.name, offset),
                group: self.group.clone(),
                base: self.base + offset as u64,
                size: len,
                element_ranges: ranges,
            });
            offset = chunk_end;
        }
        Ok(chunks)
    }

    /// Total candidate elements across all element ranges.
    pub fn element_count(&self, element_size: usize, stride: usize) -> usize {
        self.element_ranges
            .iter()
            .map(|r| r.element_count(element_size, stride))
            .sum()
    }

    /// Total bytes across all element ranges.
    pub fn byte_count(&self) -> usize {
        self.element_ranges.iter().map(|r| r.length).sum()
    }
}
