//! Rebase an existing pointer bag against the target's current heap layout.

use crate::core::{MemoryAccess, PointerWidth, ProcessContext};
use crate::pointer::kernel::{build_kernel, kernel_comparator};
use crate::pointer::types::{Level, PointerBag};
use crate::scan::engine::ScannerPool;
use crate::scan::{
    Constraint, ConstraintKind, ConstraintNode, Constraints, DataType, MemoryAlignment, ScalarKind,
    collector, manual,
};
use crate::snapshot::{Region, Snapshot};
use crate::task::TaskContext;
use anyhow::Result;

fn pointer_constraints(kind: ConstraintKind, width: PointerWidth, stride: usize) -> Result<Constraints> {
    let scalar = match width {
        PointerWidth::Four => ScalarKind::U32,
        PointerWidth::Eight => ScalarKind::U64,
    };
    let alignment = MemoryAlignment::from_size(stride).unwrap_or(MemoryAlignment::Auto);
    Constraints::new(
        ConstraintNode::leaf(Constraint::new(kind)),
        DataType::scalar(scalar),
        alignment,
    )
}

/// Drop candidates whose value moved between the two most recent reads.
/// A region whose group holds only one generation passes through unpruned;
/// nothing is known to have moved until a second read exists.
fn prune_stable(
    snapshot: &Snapshot,
    constraints: &Constraints,
    pool: &ScannerPool,
    task: &TaskContext,
) -> Result<Snapshot> {
    let (prunable, fresh): (Vec<Region>, Vec<Region>) = snapshot
        .regions()
        .iter()
        .cloned()
        .partition(|r| r.group().read().is_ok_and(|g| g.previous().is_some()));

    let mut regions = manual::scan(&Snapshot::new(prunable), constraints, pool, task)?
        .regions()
        .to_vec();
    regions.extend(fresh);
    Ok(Snapshot::new(regions))
}

/// Re-validate `bag` against current memory. `reread_memory` refreshes every
/// read group first (one read per group even when several levels share it);
/// `prune_unchanged` additionally drops candidates whose value moved between
/// the two most recent reads before the spatial filter runs. Candidates that
/// have been read only once are never pruned.
pub fn rebase_pointers(
    memory: &dyn MemoryAccess,
    process: &ProcessContext,
    bag: &PointerBag,
    reread_memory: bool,
    prune_unchanged: bool,
    pool: &ScannerPool,
    task: &TaskContext,
) -> Result<PointerBag> {
    let width = bag.pointer_width;
    let stride = bag.stride;

    if reread_memory {
        // Levels share seed read groups; collecting over the union reads
        // each group exactly once and rotates its generations exactly once.
        let mut all_regions = Vec::new();
        for level in &bag.levels {
            all_regions.extend(level.heap_pointers.regions().iter().cloned());
            all_regions.extend(level.static_pointers.regions().iter().cloned());
        }
        let union = Snapshot::new(all_regions);
        collector::collect_values(memory, process, &union, task)?;
    }

    let unchanged = prune_unchanged
        .then(|| pointer_constraints(ConstraintKind::Unchanged, width, stride))
        .transpose()?;

    let mut levels = Vec::with_capacity(bag.levels.len());
    let mut bound = vec![bag.target];

    for level in &bag.levels {
        task.checkpoint()?;

        let (heap_input, static_input) = match &unchanged {
            Some(constraints) => (
                prune_stable(&level.heap_pointers, constraints, pool, task)?,
                prune_stable(&level.static_pointers, constraints, pool, task)?,
            ),
            None => (level.heap_pointers.clone(), level.static_pointers.clone()),
        };

        let kernel = build_kernel(std::mem::take(&mut bound), bag.max_offset);
        let comparator = kernel_comparator(kernel, width);
        let heap_pointers = manual::scan_with_comparator(&heap_input, &comparator, stride, pool, task)?;
        let static_pointers =
            manual::scan_with_comparator(&static_input, &comparator, stride, pool, task)?;

        bound = heap_pointers.element_addresses(width.size(), stride);
        let exhausted = bound.is_empty();
        levels.push(Level::new(heap_pointers, static_pointers));
        if exhausted {
            break;
        }
    }

    let mut rebased = PointerBag {
        target: bag.target,
        levels,
        max_offset: bag.max_offset,
        stride,
        pointer_width: width,
    };
    rebased.trim();
    task.set_progress(100);
    Ok(rebased)
}
