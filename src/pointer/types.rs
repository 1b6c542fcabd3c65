//! Pointer scan result types.

use crate::core::PointerWidth;
use crate::scan::MemoryAlignment;
use crate::snapshot::Snapshot;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One externalized pointer chain: module anchor plus ordered hop offsets,
/// deepest hop first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    pub module_name: String,
    pub module_offset: u64,
    pub offsets: Vec<i64>,
    pub pointer_width: PointerWidth,
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+0x{:X}", self.module_name, self.module_offset)?;
        for offset in &self.offsets {
            if *offset < 0 {
                write!(f, "->-0x{:X}", -offset)?;
            } else {
                write!(f, "->0x{:X}", offset)?;
            }
        }
        Ok(())
    }
}

/// Candidate pointers for one hop depth: those found in heap memory and
/// those found in static (module) memory.
#[derive(Debug, Clone)]
pub struct Level {
    pub heap_pointers: Snapshot,
    pub static_pointers: Snapshot,
}

impl Level {
    pub fn new(heap_pointers: Snapshot, static_pointers: Snapshot) -> Self {
        Self {
            heap_pointers,
            static_pointers,
        }
    }
}

/// Multi-level pointer scan result. Levels run shallow to deep: level 0
/// candidates point (within `max_offset`) at the target, level k candidates
/// point at level k-1 heap candidates. A usable chain starts at some level's
/// static pointer.
#[derive(Debug, Clone)]
pub struct PointerBag {
    pub target: u64,
    pub levels: Vec<Level>,
    pub max_offset: u64,
    /// Candidate stride the levels were scanned at.
    pub stride: usize,
    pub pointer_width: PointerWidth,
}

impl PointerBag {
    /// Drop unusable levels: everything deeper than the first level whose
    /// heap snapshot is empty (that level itself may survive as the deepest,
    /// a chain needs no heap hop at its static end), then the deepest level
    /// while its static snapshot is empty.
    pub fn trim(&mut self) {
        if let Some(i) = self.levels.iter().position(|l| l.heap_pointers.is_empty()) {
            self.levels.truncate(i + 1);
        }
        while self
            .levels
            .last()
            .is_some_and(|l| l.static_pointers.is_empty())
        {
            self.levels.pop();
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Parameters for a pointer scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerScanConfig {
    pub target: u64,
    pub max_offset: u64,
    pub depth: usize,
    pub alignment: MemoryAlignment,
    pub pointer_width: PointerWidth,
}

impl PointerScanConfig {
    /// Fail-fast validation before any pipeline work begins.
    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(anyhow!("pointer scan depth must be positive"));
        }
        if self.max_offset == 0 {
            return Err(anyhow!("max offset must be positive"));
        }
        let stride = self.alignment.resolve(self.pointer_width.size());
        if stride > self.pointer_width.size() {
            return Err(anyhow!(
                "alignment {} wider than pointer width {}",
                stride,
                self.pointer_width.size()
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.alignment.resolve(self.pointer_width.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ReadGroup, Region};

    fn snapshot_with_elements(base: u64, size: usize) -> Snapshot {
        let group = ReadGroup::shared(base, size);
        Snapshot::new(vec![Region::new("r", group, base, size)])
    }

    fn empty_region_snapshot() -> Snapshot {
        let group = ReadGroup::shared(0x9000, 0x10);
        let mut region = Region::new("empty", group, 0x9000, 0x10);
        region.set_element_ranges(Vec::new()).expect("clear");
        Snapshot::new(vec![region])
    }

    fn level(heap_empty: bool, static_empty: bool) -> Level {
        let heap = if heap_empty {
            empty_region_snapshot()
        } else {
            snapshot_with_elements(0x1000, 0x10)
        };
        let stat = if static_empty {
            empty_region_snapshot()
        } else {
            snapshot_with_elements(0x5000, 0x10)
        };
        Level::new(heap, stat)
    }

    fn bag(levels: Vec<Level>) -> PointerBag {
        PointerBag {
            target: 0xDEAD_0000,
            levels,
            max_offset: 0x100,
            stride: 8,
            pointer_width: PointerWidth::Eight,
        }
    }

    #[test]
    fn trim_keeps_heap_empty_level_as_deepest() {
        // Scenario shape: level 0 heap non-empty, level 1 is the static
        // chain start with no heap candidates of its own.
        let mut b = bag(vec![level(false, true), level(true, false)]);
        b.trim();
        assert_eq!(b.depth(), 2);
    }

    #[test]
    fn trim_drops_levels_past_empty_heap() {
        let mut b = bag(vec![level(false, false), level(true, false), level(false, false)]);
        b.trim();
        assert_eq!(b.depth(), 2);
    }

    #[test]
    fn trim_pops_static_empty_tail() {
        let mut b = bag(vec![level(false, false), level(false, true)]);
        b.trim();
        assert_eq!(b.depth(), 1);

        // Cascading pops when several deepest levels lack static pointers.
        let mut b = bag(vec![level(false, true), level(false, true)]);
        b.trim();
        assert!(b.is_empty());
    }

    #[test]
    fn config_validation() {
        let mut config = PointerScanConfig {
            target: 0x1000,
            max_offset: 0x100,
            depth: 2,
            alignment: MemoryAlignment::Auto,
            pointer_width: PointerWidth::Eight,
        };
        assert!(config.validate().is_ok());
        config.depth = 0;
        assert!(config.validate().is_err());
        config.depth = 2;
        config.max_offset = 0;
        assert!(config.validate().is_err());
        config.max_offset = 0x100;
        config.pointer_width = PointerWidth::Four;
        config.alignment = MemoryAlignment::Alignment8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn pointer_formats_signed_offsets() {
        let pointer = Pointer {
            module_name: "libgame.so".into(),
            module_offset: 0x1234,
            offsets: vec![0x10, -0x8, 0x0],
            pointer_width: PointerWidth::Eight,
        };
        assert_eq!(pointer.to_string(), "libgame.so+0x1234->0x10->-0x8->0x0");
    }

    #[test]
    fn pointer_round_trips_through_json() {
        let pointer = Pointer {
            module_name: "libgame.so".into(),
            module_offset: 0x40,
            offsets: vec![8, -16, 0x20],
            pointer_width: PointerWidth::Four,
        };
        let json = serde_json::to_string(&pointer).expect("serialize");
        let back: Pointer = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, pointer);
    }
}
