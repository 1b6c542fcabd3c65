//! In-process stand-in for the memory-access collaborator.

use crate::core::{MemoryAccess, ModuleInfo, PageRange, PointerWidth, ProcessContext};
use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::sync::Mutex;

pub const MOCK_PAGE: usize = 4096;

enum SpanKind {
    Module(String),
    Heap,
}

struct Span {
    base: u64,
    bytes: Vec<u8>,
    kind: SpanKind,
    faulty_pages: HashSet<usize>,
}

impl Span {
    fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    fn contains(&self, address: u64, len: usize) -> bool {
        address >= self.base && address + len as u64 <= self.end()
    }

    fn has_faulty_page(&self, address: u64, len: usize) -> bool {
        if self.faulty_pages.is_empty() || len == 0 {
            return false;
        }
        let first = (address - self.base) as usize / MOCK_PAGE;
        let last = ((address - self.base) as usize + len - 1) / MOCK_PAGE;
        (first..=last).any(|page| self.faulty_pages.contains(&page))
    }
}

/// Fake target process memory: spans allocated by tests, with optional
/// per-page read faults.
pub struct MockMemory {
    spans: Mutex<Vec<Span>>,
}

impl MockMemory {
    pub fn new() -> Self {
        Self {
            spans: Mutex::new(Vec::new()),
        }
    }

    pub fn process(width: PointerWidth) -> ProcessContext {
        ProcessContext::new(4242, width)
    }

    /// Allocate a zeroed heap span at `base`.
    pub fn malloc(&self, base: u64, size: usize) -> u64 {
        self.spans.lock().unwrap().push(Span {
            base,
            bytes: vec![0u8; size],
            kind: SpanKind::Heap,
            faulty_pages: HashSet::new(),
        });
        base
    }

    /// Map a zeroed module span at `base`.
    pub fn add_module(&self, name: &str, base: u64, size: usize) -> u64 {
        self.spans.lock().unwrap().push(Span {
            base,
            bytes: vec![0u8; size],
            kind: SpanKind::Module(name.to_string()),
            faulty_pages: HashSet::new(),
        });
        base
    }

    pub fn write_bytes(&self, address: u64, bytes: &[u8]) {
        let mut spans = self.spans.lock().unwrap();
        let span = spans
            .iter_mut()
            .find(|s| s.contains(address, bytes.len()))
            .expect("write outside mock spans");
        let offset = (address - span.base) as usize;
        span.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn write_u32(&self, address: u64, value: u32) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    pub fn write_u64(&self, address: u64, value: u64) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    /// Mark span-relative page indices as unreadable.
    pub fn set_faulty_pages(&self, base: u64, pages: &[usize]) {
        let mut spans = self.spans.lock().unwrap();
        let span = spans
            .iter_mut()
            .find(|s| s.base == base)
            .expect("no span at base");
        span.faulty_pages.extend(pages.iter().copied());
    }
}

impl MemoryAccess for MockMemory {
    fn read(&self, _process: &ProcessContext, address: u64, buf: &mut [u8]) -> Result<()> {
        let spans = self.spans.lock().unwrap();
        let span = spans
            .iter()
            .find(|s| s.contains(address, buf.len()))
            .ok_or_else(|| anyhow!("read of unmapped address {:#X}", address))?;
        if span.has_faulty_page(address, buf.len()) {
            return Err(anyhow!("page fault at {:#X}", address));
        }
        let offset = (address - span.base) as usize;
        buf.copy_from_slice(&span.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&self, _process: &ProcessContext, address: u64, bytes: &[u8]) -> Result<()> {
        self.write_bytes(address, bytes);
        Ok(())
    }

    fn virtual_pages(&self, _process: &ProcessContext) -> Result<Vec<PageRange>> {
        let spans = self.spans.lock().unwrap();
        Ok(spans.iter().map(|s| PageRange::new(s.base, s.end())).collect())
    }

    fn modules(&self, _process: &ProcessContext) -> Result<Vec<ModuleInfo>> {
        let spans = self.spans.lock().unwrap();
        Ok(spans
            .iter()
            .filter_map(|s| match &s.kind {
                SpanKind::Module(name) => Some(ModuleInfo::new(name.clone(), s.base, s.end())),
                SpanKind::Heap => None,
            })
            .collect())
    }

    fn heaps(&self, _process: &ProcessContext) -> Result<Vec<PageRange>> {
        let spans = self.spans.lock().unwrap();
        Ok(spans
            .iter()
            .filter(|s| matches!(s.kind, SpanKind::Heap))
            .map(|s| PageRange::new(s.base, s.end()))
            .collect())
    }
}
