//! Mask-block scan loop shared by the fast, sparse, and staggered variants;
//! the three differ only in the stride fed to it.
//!
//! Each block evaluates 64 consecutive candidates into one u64 mask with a
//! branch-free lane loop the compiler can unroll and vectorize. Full blocks
//! run over all bytes available in the buffer, including the tail past the
//! logical range end; the encoder drops any span reaching into that tail, so
//! over-read lanes can never surface as results.

use super::{VECTOR_LANES, block_span, iterative};
use crate::scan::comparer::CompiledComparator;
use crate::scan::encoder::RunLengthEncoder;

pub(super) fn scan_blocks(
    encoder: &mut RunLengthEncoder,
    comparator: &CompiledComparator,
    current: &[u8],
    previous: Option<&[u8]>,
    element_size: usize,
    stride: usize,
    valid_length: usize,
) {
    let span = block_span(element_size, stride);

    match previous {
        Some(prev) => {
            let available = current.len().min(prev.len());
            while encoder.read_offset() + span <= available {
                let base = encoder.read_offset();
                let mut mask = 0u64;
                for lane in 0..VECTOR_LANES {
                    let offset = base + lane * stride;
                    let hit = comparator.matches(
                        &current[offset..offset + element_size],
                        &prev[offset..offset + element_size],
                    );
                    mask |= (hit as u64) << lane;
                }
                encoder.encode_mask(mask, VECTOR_LANES);
            }
        },
        None => {
            while encoder.read_offset() + span <= current.len() {
                let base = encoder.read_offset();
                let mut mask = 0u64;
                for lane in 0..VECTOR_LANES {
                    let offset = base + lane * stride;
                    let hit = comparator.matches(&current[offset..offset + element_size], &[]);
                    mask |= (hit as u64) << lane;
                }
                encoder.encode_mask(mask, VECTOR_LANES);
            }
        },
    }

    // Remainder elements, strictly bounded by the logical range end.
    iterative::scan(encoder, comparator, current, previous, element_size, valid_length);
}
