//! Random path extraction and path resolution.

use crate::core::{MemoryAccess, PointerWidth, ProcessContext};
use crate::pointer::types::{Pointer, PointerBag};
use crate::snapshot::Snapshot;
use anyhow::{Result, anyhow};
use log::warn;
use rand::seq::SliceRandom;
use rand::{Rng, RngExt};

fn read_pointer_value(snapshot: &Snapshot, address: u64, width: PointerWidth) -> Option<u64> {
    let bytes = snapshot.value_at(address, width.size())?;
    Some(match width {
        PointerWidth::Four => u32::from_le(bytemuck::pod_read_unaligned::<u32>(&bytes)) as u64,
        PointerWidth::Eight => u64::from_le(bytemuck::pod_read_unaligned::<u64>(&bytes)),
    })
}

/// Candidate hop offsets, `[-max_offset, +max_offset]` in shuffled order so
/// acceptance is uniform over valid offsets instead of biased toward zero.
fn shuffled_offsets(max_offset: u64, rng: &mut impl Rng) -> Vec<i64> {
    let max = max_offset as i64;
    let mut offsets: Vec<i64> = (-max..=max).collect();
    offsets.shuffle(rng);
    offsets
}

/// Pick a uniformly random pointer chain from `bag.levels[depth]`'s static
/// snapshot down to the target. Returns `Ok(None)` when the level has no
/// static candidates or some hop has no valid offset.
pub fn extract_random_path(
    memory: &dyn MemoryAccess,
    process: &ProcessContext,
    bag: &PointerBag,
    depth: usize,
) -> Result<Option<Pointer>> {
    let level = bag
        .levels
        .get(depth)
        .ok_or_else(|| anyhow!("depth {} exceeds bag depth {}", depth, bag.depth()))?;
    let width = bag.pointer_width;
    let stride = bag.stride;
    let mut rng = rand::rng();

    let statics = level.static_pointers.element_addresses(width.size(), stride);
    if statics.is_empty() {
        warn!("level {} has no static pointers to extract from", depth);
        return Ok(None);
    }
    let start = statics[rng.random_range(0..statics.len())];

    let Some((module_name, module_offset)) = memory.resolve_module(process, start) else {
        warn!("static pointer {:#X} resolves to no module", start);
        return Ok(None);
    };

    let Some(mut value) = read_pointer_value(&level.static_pointers, start, width) else {
        warn!("static pointer {:#X} has no collected value", start);
        return Ok(None);
    };

    let mut offsets = Vec::with_capacity(depth + 1);

    // Walk back toward the target: each hop lands on a heap candidate of
    // the next shallower level.
    for hop_level in (1..=depth).rev() {
        let heap = &bag.levels[hop_level - 1].heap_pointers;
        let mut landed = None;
        for offset in shuffled_offsets(bag.max_offset, &mut rng) {
            let address = value.wrapping_add_signed(offset);
            if heap.contains_element(address, stride) {
                landed = Some((offset, address));
                break;
            }
        }
        let Some((offset, address)) = landed else {
            warn!(
                "no valid offset from value {:#X} into level {} heap candidates",
                value,
                hop_level - 1
            );
            return Ok(None);
        };
        offsets.push(offset);
        let Some(next) = read_pointer_value(heap, address, width) else {
            warn!("heap candidate {:#X} has no collected value", address);
            return Ok(None);
        };
        value = next;
    }

    // Final hop must land exactly on the target.
    let delta = bag.target.wrapping_sub(value) as i64;
    if delta.unsigned_abs() > bag.max_offset {
        warn!(
            "final hop from {:#X} to target {:#X} exceeds max offset {:#X}",
            value, bag.target, bag.max_offset
        );
        return Ok(None);
    }
    offsets.push(delta);

    Ok(Some(Pointer {
        module_name,
        module_offset,
        offsets,
        pointer_width: width,
    }))
}

/// Resolve a pointer chain against live memory, returning the address it
/// currently points at.
pub fn resolve_pointer(
    memory: &dyn MemoryAccess,
    process: &ProcessContext,
    pointer: &Pointer,
) -> Result<u64> {
    let modules = memory.modules(process)?;
    let module = modules
        .iter()
        .find(|m| m.name == pointer.module_name)
        .ok_or_else(|| anyhow!("module '{}' not loaded", pointer.module_name))?;

    let width = pointer.pointer_width;
    let mut address = module.base + pointer.module_offset;
    for offset in &pointer.offsets {
        let mut bytes = vec![0u8; width.size()];
        memory.read(process, address, &mut bytes)?;
        let value = match width {
            PointerWidth::Four => u32::from_le(bytemuck::pod_read_unaligned::<u32>(&bytes)) as u64,
            PointerWidth::Eight => u64::from_le(bytemuck::pod_read_unaligned::<u64>(&bytes)),
        };
        address = value.wrapping_add_signed(*offset);
    }
    Ok(address)
}
