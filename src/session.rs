//! The public operation surface: a session bound to one opened process.
//!
//! Every long operation spawns a named [`TrackableTask`]; names are
//! single-flight, so a second scan of the same kind fails synchronously with
//! [`TaskError::Conflict`] while the first is outstanding. All other
//! failures resolve the task to no result instead of reaching the caller.

use crate::core::{DEFAULT_CHUNK_SIZE, MemoryAccess, ProcessContext};
use crate::pointer::{self, PointerBag, PointerScanConfig};
use crate::scan::engine::ScannerPool;
use crate::scan::{Constraints, collector, manual};
use crate::snapshot::Snapshot;
use crate::task::{TaskError, TrackableTask};
use anyhow::{Result, anyhow};
use std::sync::Arc;

/// Which virtual pages seed a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSeed {
    Modules,
    Heaps,
    FullAddressSpace,
}

pub struct ScanSession {
    process: ProcessContext,
    memory: Arc<dyn MemoryAccess>,
    pool: Arc<ScannerPool>,
    chunk_size: usize,
}

impl ScanSession {
    pub fn new(process: ProcessContext, memory: Arc<dyn MemoryAccess>) -> Self {
        Self {
            process,
            memory,
            pool: Arc::new(ScannerPool::new()),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn process(&self) -> &ProcessContext {
        &self.process
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn set_chunk_size(&mut self, chunk_size: usize) -> Result<()> {
        if chunk_size == 0 {
            return Err(anyhow!("chunk size must be positive"));
        }
        self.chunk_size = chunk_size;
        Ok(())
    }

    /// Seed a new snapshot from the chosen page set. No bytes are read;
    /// collect values to populate it.
    pub fn snapshot(&self, seed: SnapshotSeed) -> Result<Snapshot> {
        let spans: Vec<(String, u64, usize)> = match seed {
            SnapshotSeed::Modules => self
                .memory
                .modules(&self.process)?
                .into_iter()
                .map(|m| (m.name.clone(), m.base, (m.end - m.base) as usize))
                .collect(),
            SnapshotSeed::Heaps => self
                .memory
                .heaps(&self.process)?
                .into_iter()
                .enumerate()
                .map(|(i, span)| (format!("heap#{i}"), span.start, span.len()))
                .collect(),
            SnapshotSeed::FullAddressSpace => self
                .memory
                .virtual_pages(&self.process)?
                .into_iter()
                .enumerate()
                .map(|(i, span)| (format!("page#{i}"), span.start, span.len()))
                .collect(),
        };
        Snapshot::from_spans(spans, self.chunk_size)
    }

    /// Read fresh bytes into every read group of `snapshot`.
    pub fn collect_values(
        &self,
        snapshot: &Snapshot,
    ) -> Result<Arc<TrackableTask<Snapshot>>, TaskError> {
        let memory = Arc::clone(&self.memory);
        let process = self.process;
        let snapshot = snapshot.clone();
        TrackableTask::spawn("value-collect", move |task| {
            collector::collect_values(memory.as_ref(), &process, &snapshot, &task)?;
            Ok(snapshot)
        })
    }

    /// Narrow `snapshot` by `constraints`, producing the next generation.
    pub fn scan_values(
        &self,
        snapshot: &Snapshot,
        constraints: &Constraints,
    ) -> Result<Arc<TrackableTask<Snapshot>>, TaskError> {
        let pool = Arc::clone(&self.pool);
        let snapshot = snapshot.clone();
        let constraints = constraints.clone();
        TrackableTask::spawn("value-scan", move |task| {
            manual::scan(&snapshot, &constraints, &pool, &task)
        })
    }

    /// Discover pointer chains resolving to `config.target`.
    pub fn scan_pointers(
        &self,
        config: PointerScanConfig,
    ) -> Result<Arc<TrackableTask<PointerBag>>, TaskError> {
        let memory = Arc::clone(&self.memory);
        let process = self.process;
        let pool = Arc::clone(&self.pool);
        let chunk_size = self.chunk_size;
        TrackableTask::spawn("pointer-scan", move |task| {
            pointer::scan_pointers(memory.as_ref(), &process, &config, chunk_size, &pool, &task)
        })
    }

    /// Re-validate an existing bag against current memory.
    pub fn rebase_pointers(
        &self,
        bag: &PointerBag,
        reread_memory: bool,
        prune_unchanged: bool,
    ) -> Result<Arc<TrackableTask<PointerBag>>, TaskError> {
        let memory = Arc::clone(&self.memory);
        let process = self.process;
        let pool = Arc::clone(&self.pool);
        let bag = bag.clone();
        TrackableTask::spawn("pointer-rebase", move |task| {
            pointer::rebase_pointers(
                memory.as_ref(),
                &process,
                &bag,
                reread_memory,
                prune_unchanged,
                &pool,
                &task,
            )
        })
    }
}
