//! Scan orchestration: apply a constraint tree to a snapshot and produce the
//! narrowed successor snapshot.
//!
//! Regions are scanned in parallel with pooled contexts. Results are
//! additive per region; a region whose read group lacks the needed value
//! generations contributes nothing this pass instead of failing the scan.
//! Cancellation discards all partial results.

use crate::scan::comparer::CompiledComparator;
use crate::scan::constraint::Constraints;
use crate::scan::engine::ScannerPool;
use crate::snapshot::{ElementRange, Region, Snapshot};
use crate::task::TaskContext;
use anyhow::{Result, anyhow};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

const PROGRESS_INTERVAL: usize = 32;

/// Scan `snapshot` against `constraints`, returning the next generation.
/// The input snapshot is not modified; empty regions are dropped from the
/// result. Fails fast on an invalid constraint tree and on cancellation.
pub fn scan(
    snapshot: &Snapshot,
    constraints: &Constraints,
    pool: &ScannerPool,
    task: &TaskContext,
) -> Result<Snapshot> {
    constraints.validate()?;
    let comparator = CompiledComparator::compile(constraints)?;
    scan_impl(snapshot, Some(constraints), &comparator, constraints.stride(), pool, task)
}

/// Scan with an injected comparator instead of a constraint tree; the
/// pointer engine's search kernels enter here.
pub(crate) fn scan_with_comparator(
    snapshot: &Snapshot,
    comparator: &CompiledComparator,
    stride: usize,
    pool: &ScannerPool,
    task: &TaskContext,
) -> Result<Snapshot> {
    scan_impl(snapshot, None, comparator, stride, pool, task)
}

fn scan_impl(
    snapshot: &Snapshot,
    constraints: Option<&Constraints>,
    comparator: &CompiledComparator,
    stride: usize,
    pool: &ScannerPool,
    task: &TaskContext,
) -> Result<Snapshot> {
    let total = snapshot.region_count().max(1);
    let completed = AtomicUsize::new(0);

    let narrowed: Result<Vec<Option<Region>>> = snapshot
        .regions()
        .par_iter()
        .map(|region| -> Result<Option<Region>> {
            task.checkpoint()?;
            let result = scan_region(region, constraints, comparator, stride, pool)?;

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % PROGRESS_INTERVAL == 0 {
                task.set_progress((done * 100 / total) as u32);
                task.tick_heartbeat();
            }
            Ok(result)
        })
        .collect();

    let regions: Vec<Region> = narrowed?.into_iter().flatten().collect();
    task.set_progress(100);
    task.tick_heartbeat();
    Ok(Snapshot::new(regions))
}

/// Scan one region's element ranges; `None` when the region has no matches
/// or its group lacks the value generations the tree needs.
fn scan_region(
    region: &Region,
    constraints: Option<&Constraints>,
    comparator: &CompiledComparator,
    stride: usize,
    pool: &ScannerPool,
) -> Result<Option<Region>> {
    let element_size = comparator.element_size();
    let group_offset = region.group_offset()?;

    let group = region
        .group()
        .read()
        .map_err(|_| anyhow!("read group lock poisoned"))?;
    let Some(current) = group.current() else {
        return Ok(None);
    };
    let previous = group.previous();
    if comparator.needs_previous() && previous.is_none() {
        return Ok(None);
    }

    let mut scanner = pool.checkout();
    let mut matched: Vec<ElementRange> = Vec::new();

    for range in region.element_ranges() {
        if range.length < element_size {
            continue;
        }
        // Candidate addresses are absolute multiples of the stride; skip to
        // the first aligned offset inside the range.
        let misalign = ((region.base() + range.offset as u64) % stride as u64) as usize;
        let skip = if misalign == 0 { 0 } else { stride - misalign };
        if skip + element_size > range.length {
            continue;
        }
        let start = group_offset + range.offset + skip;
        let valid_length = range.length - skip;
        if start + element_size > current.len() {
            continue;
        }

        // The slice runs to the group buffer end so block variants have
        // over-read headroom; spans past `valid_length` are discarded.
        let slice = &current[start..];
        let prev_slice = previous.map(|p| &p[start..]);
        let found = match constraints {
            Some(constraints) => {
                scanner.scan_range(constraints, comparator, slice, prev_slice, valid_length)
            },
            None => scanner.scan_kernel(comparator, slice, prev_slice, stride, valid_length),
        };

        let shift = range.offset + skip;
        matched.extend(
            found
                .into_iter()
                .map(|r| ElementRange::new(r.offset + shift, r.length)),
        );
    }

    if matched.is_empty() {
        return Ok(None);
    }
    let mut narrowed = region.clone();
    narrowed.set_element_ranges(matched)?;
    Ok(Some(narrowed))
}
