//! Scalar scan loops. These never touch a byte past the logical range end,
//! which makes them the safe remainder path after the block loops.

use crate::scan::comparer::CompiledComparator;
use crate::scan::encoder::RunLengthEncoder;
use memchr::memchr_iter;

pub(super) fn scan(
    encoder: &mut RunLengthEncoder,
    comparator: &CompiledComparator,
    current: &[u8],
    previous: Option<&[u8]>,
    element_size: usize,
    valid_length: usize,
) {
    // The encoder carries the stride; each encode call advances the cursor.
    while encoder.read_offset() + element_size <= valid_length {
        let offset = encoder.read_offset();
        let cur = &current[offset..offset + element_size];
        let matched = match previous {
            Some(prev) => comparator.matches(cur, &prev[offset..offset + element_size]),
            None => comparator.matches(cur, &[]),
        };
        if matched {
            encoder.encode_match();
        } else {
            encoder.encode_miss();
        }
    }
}

/// Equality scan anchored on the needle's first byte. Offsets without the
/// anchor byte at an aligned position are skipped wholesale; candidates
/// still go through the full element compare so compound alignment and
/// endianness stay with the comparator.
pub(super) fn scan_anchored(
    encoder: &mut RunLengthEncoder,
    comparator: &CompiledComparator,
    needle: &[u8],
    current: &[u8],
    previous: Option<&[u8]>,
    element_size: usize,
    stride: usize,
    valid_length: usize,
) {
    let haystack = &current[..valid_length];
    for position in memchr_iter(needle[0], haystack) {
        if position % stride != 0 || position + element_size > valid_length {
            continue;
        }
        if position < encoder.read_offset() {
            continue;
        }
        encoder.skip_to(position);
        let cur = &current[position..position + element_size];
        let matched = match previous {
            Some(prev) => comparator.matches(cur, &prev[position..position + element_size]),
            None => comparator.matches(cur, &[]),
        };
        if matched {
            encoder.encode_match();
        } else {
            encoder.encode_miss();
        }
    }
}
