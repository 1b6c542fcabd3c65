//! Pointer scan pipeline: seed, collect, filter level by level, trim.

use crate::core::{MemoryAccess, ProcessContext};
use crate::pointer::kernel::{build_kernel, kernel_comparator};
use crate::pointer::types::{Level, PointerBag, PointerScanConfig};
use crate::scan::engine::ScannerPool;
use crate::scan::{collector, manual};
use crate::snapshot::Snapshot;
use crate::task::TaskContext;
use anyhow::Result;
use log::{Level as LogLevel, debug, log_enabled};

/// Seed snapshots of all static (module) and all heap memory, chunked.
pub(crate) fn seed_snapshots(
    memory: &dyn MemoryAccess,
    process: &ProcessContext,
    chunk_size: usize,
) -> Result<(Snapshot, Snapshot)> {
    let modules = memory.modules(process)?;
    let static_seed = Snapshot::from_spans(
        modules
            .into_iter()
            .map(|m| (m.name.clone(), m.base, (m.end - m.base) as usize)),
        chunk_size,
    )?;

    let heaps = memory.heaps(process)?;
    let heap_seed = Snapshot::from_spans(
        heaps
            .into_iter()
            .enumerate()
            .map(|(i, span)| (format!("heap#{i}"), span.start, span.len())),
        chunk_size,
    )?;

    Ok((static_seed, heap_seed))
}

/// Build a pointer bag for `config.target`: level 0 holds candidates
/// pointing at the target, each further level candidates pointing at the
/// previous level's heap candidates, up to `config.depth` levels.
pub fn scan_pointers(
    memory: &dyn MemoryAccess,
    process: &ProcessContext,
    config: &PointerScanConfig,
    chunk_size: usize,
    pool: &ScannerPool,
    task: &TaskContext,
) -> Result<PointerBag> {
    config.validate()?;
    let width = config.pointer_width;
    let stride = config.stride();

    let (static_seed, heap_seed) = seed_snapshots(memory, process, chunk_size)?;
    task.checkpoint()?;
    collector::collect_values(memory, process, &static_seed, task)?;
    collector::collect_values(memory, process, &heap_seed, task)?;

    let mut levels = Vec::with_capacity(config.depth);
    let mut bound = vec![config.target];

    for depth in 0..config.depth {
        task.checkpoint()?;
        let kernel = build_kernel(bound, config.max_offset);
        let comparator = kernel_comparator(kernel, width);

        let heap_pointers =
            manual::scan_with_comparator(&heap_seed, &comparator, stride, pool, task)?;
        let static_pointers =
            manual::scan_with_comparator(&static_seed, &comparator, stride, pool, task)?;

        if log_enabled!(LogLevel::Debug) {
            debug!(
                "pointer level {}: {} heap / {} static candidates",
                depth,
                heap_pointers.element_count(width.size(), stride),
                static_pointers.element_count(width.size(), stride),
            );
        }

        bound = heap_pointers.element_addresses(width.size(), stride);
        let exhausted = bound.is_empty();
        levels.push(Level::new(heap_pointers, static_pointers));
        if exhausted {
            break;
        }

        task.set_progress(((depth + 1) * 100 / config.depth) as u32);
        task.tick_heartbeat();
    }

    let mut bag = PointerBag {
        target: config.target,
        levels,
        max_offset: config.max_offset,
        stride,
        pointer_width: width,
    };
    bag.trim();
    task.set_progress(100);
    Ok(bag)
}
