//! Process context and the external memory-access contract.
//!
//! The engine never talks to the OS directly. Every entry point receives an
//! explicit [`MemoryAccess`] capability handle plus a [`ProcessContext`]
//! describing the opened target; platform backends (ptrace, /proc/pid/mem,
//! kernel drivers) live outside this crate.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Pointer width of the target process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerWidth {
    Four,
    Eight,
}

impl PointerWidth {
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            PointerWidth::Four => 4,
            PointerWidth::Eight => 8,
        }
    }

    pub fn from_size(size: usize) -> Option<Self> {
        match size {
            4 => Some(PointerWidth::Four),
            8 => Some(PointerWidth::Eight),
            _ => None,
        }
    }
}

/// An opened target process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    pub pid: i32,
    pub pointer_width: PointerWidth,
}

impl ProcessContext {
    pub fn new(pid: i32, pointer_width: PointerWidth) -> Self {
        Self { pid, pointer_width }
    }
}

/// One contiguous readable span of the target's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: u64,
    pub end: u64,
}

impl PageRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }
}

/// A loaded module of the target process.
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub base: u64,
    pub end: u64,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, base: u64, end: u64) -> Self {
        Self {
            name: name.into(),
            base,
            end,
        }
    }

    #[inline]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end
    }
}

/// Memory-access capability consumed by the engine.
///
/// `read` is whole-or-fail for the requested span; a failed group read is
/// skipped by the collector and never fails an overall scan.
pub trait MemoryAccess: Send + Sync {
    fn read(&self, process: &ProcessContext, address: u64, buf: &mut [u8]) -> Result<()>;

    fn write(&self, process: &ProcessContext, address: u64, bytes: &[u8]) -> Result<()>;

    /// Enumerate every committed virtual page span.
    fn virtual_pages(&self, process: &ProcessContext) -> Result<Vec<PageRange>>;

    /// Enumerate loaded modules (static memory).
    fn modules(&self, process: &ProcessContext) -> Result<Vec<ModuleInfo>>;

    /// Enumerate heap spans (dynamic memory).
    fn heaps(&self, process: &ProcessContext) -> Result<Vec<PageRange>>;

    /// Resolve an address to `(module name, offset from module base)`.
    fn resolve_module(&self, process: &ProcessContext, address: u64) -> Option<(String, u64)> {
        let modules = self.modules(process).ok()?;
        modules
            .iter()
            .find(|m| m.contains(address))
            .map(|m| (m.name.clone(), address - m.base))
    }
}
