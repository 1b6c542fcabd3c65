//! Scanner variants and per-range dispatch.
//!
//! One [`ScannerContext`] carries the reusable run-length encoder; contexts
//! are checked out of a [`pool::ScannerPool`] by worker threads. Variant
//! selection is per element range: tiny ranges and unsupported targets take
//! the scalar path, everything else goes through 64-lane mask blocks, and
//! byte patterns get an anchor-accelerated search of their own.

mod iterative;
mod pattern;
pub mod pool;
mod vector;

use crate::scan::comparer::CompiledComparator;
use crate::scan::constraint::{ConstraintKind, Constraints, Literal};
use crate::scan::encoder::RunLengthEncoder;
use crate::scan::types::{DataType, Endianness};
use crate::snapshot::ElementRange;

pub use pattern::parse_pattern;
pub use pool::{PooledScanner, ScannerPool};

/// Number of elements evaluated per mask block.
pub const VECTOR_LANES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanVariant {
    /// Scalar loop, never reads past the logical range end.
    Iterative,
    /// Mask blocks at stride == element size.
    VectorFast,
    /// Mask blocks at stride > element size (aligned sparse candidates).
    VectorSparse,
    /// Mask blocks at stride < element size (overlapping candidates).
    VectorStaggered,
    /// Masked byte sequence search with a first-fixed-byte anchor.
    BytePattern,
}

/// True on targets where the mask-block loops are worth taking.
#[inline]
pub fn vector_supported() -> bool {
    cfg!(any(target_arch = "x86_64", target_arch = "aarch64"))
}

/// Pick the variant for one bound constraint tree. Range-size refinement
/// happens in [`ScannerContext::scan_range`].
pub fn select_variant(constraints: &Constraints) -> ScanVariant {
    if constraints.data_type().is_byte_array() {
        return ScanVariant::BytePattern;
    }
    if !vector_supported() {
        return ScanVariant::Iterative;
    }
    let element_size = constraints.element_size();
    let stride = constraints.stride();
    if stride == element_size {
        ScanVariant::VectorFast
    } else if stride > element_size {
        ScanVariant::VectorSparse
    } else {
        ScanVariant::VectorStaggered
    }
}

/// Byte span one mask block covers at the given stride.
#[inline]
fn block_span(element_size: usize, stride: usize) -> usize {
    (VECTOR_LANES - 1) * stride + element_size
}

/// Equality needle for the anchor fast path. Dense needles (all zero bytes)
/// anchor on nearly every offset and are slower than the plain loop.
fn anchor_needle(constraints: &Constraints) -> Option<Vec<u8>> {
    let leaf = constraints.root().sole_leaf()?;
    if leaf.kind != ConstraintKind::Equal {
        return None;
    }
    // The needle is the literal's little-endian image, so the first stored
    // byte only lines up for little-endian scalars.
    if !matches!(
        constraints.data_type(),
        DataType::Scalar { endianness: Endianness::Little, .. }
    ) {
        return None;
    }
    let needle = leaf.encoded_bytes()?;
    if needle.iter().all(|&b| b == 0) {
        return None;
    }
    Some(needle.to_vec())
}

/// Reusable scan state for one worker. Holds the run-length encoder so
/// repeated range scans do not reallocate.
#[derive(Debug)]
pub struct ScannerContext {
    encoder: RunLengthEncoder,
}

impl ScannerContext {
    pub fn new() -> Self {
        Self {
            encoder: RunLengthEncoder::new(1, 1, 0),
        }
    }

    /// Scan one element range. `current` starts at the range's first byte
    /// and may extend past `valid_length` into the rest of the read group;
    /// only those tail bytes are ever over-read, and spans touching them are
    /// discarded. `previous` must mirror `current` when the tree has a
    /// relative leaf. Returned offsets are relative to the range start.
    pub fn scan_range(
        &mut self,
        constraints: &Constraints,
        comparator: &CompiledComparator,
        current: &[u8],
        previous: Option<&[u8]>,
        valid_length: usize,
    ) -> Vec<ElementRange> {
        let element_size = constraints.element_size();
        let stride = constraints.stride();
        let valid_length = valid_length.min(current.len());
        self.encoder.reset(element_size, stride, valid_length);

        if comparator.needs_previous() && previous.is_none() {
            return Vec::new();
        }

        let mut variant = select_variant(constraints);
        // A range smaller than one block has no full block to run.
        if matches!(
            variant,
            ScanVariant::VectorFast | ScanVariant::VectorSparse | ScanVariant::VectorStaggered
        ) && current.len() < block_span(element_size, stride)
        {
            variant = ScanVariant::Iterative;
        }

        match variant {
            ScanVariant::Iterative => {
                if let Some(needle) = anchor_needle(constraints) {
                    iterative::scan_anchored(
                        &mut self.encoder,
                        comparator,
                        &needle,
                        current,
                        previous,
                        element_size,
                        stride,
                        valid_length,
                    );
                } else {
                    iterative::scan(
                        &mut self.encoder,
                        comparator,
                        current,
                        previous,
                        element_size,
                        valid_length,
                    );
                }
            },
            ScanVariant::VectorFast | ScanVariant::VectorSparse | ScanVariant::VectorStaggered => {
                vector::scan_blocks(
                    &mut self.encoder,
                    comparator,
                    current,
                    previous,
                    element_size,
                    stride,
                    valid_length,
                );
            },
            ScanVariant::BytePattern => {
                let pattern = match constraints.root().sole_leaf().and_then(|c| c.literal.as_ref()) {
                    Some(Literal::Bytes(pattern)) => Some(pattern.clone()),
                    _ => None,
                };
                match pattern {
                    Some(pattern) => pattern::scan(
                        &mut self.encoder,
                        &pattern,
                        current,
                        stride,
                        valid_length,
                    ),
                    // Composite byte trees fall back to the compiled compare.
                    None => iterative::scan(
                        &mut self.encoder,
                        comparator,
                        current,
                        previous,
                        element_size,
                        valid_length,
                    ),
                }
            },
        }

        self.encoder.finish()
    }

    /// Scan with a bare comparator, without a bound constraint tree. The
    /// pointer engine injects its search kernels through this path; element
    /// size comes from the comparator.
    pub fn scan_kernel(
        &mut self,
        comparator: &CompiledComparator,
        current: &[u8],
        previous: Option<&[u8]>,
        stride: usize,
        valid_length: usize,
    ) -> Vec<ElementRange> {
        let element_size = comparator.element_size();
        let valid_length = valid_length.min(current.len());
        self.encoder.reset(element_size, stride, valid_length);

        if comparator.needs_previous() && previous.is_none() {
            return Vec::new();
        }

        if vector_supported() && current.len() >= block_span(element_size, stride) {
            vector::scan_blocks(
                &mut self.encoder,
                comparator,
                current,
                previous,
                element_size,
                stride,
                valid_length,
            );
        } else {
            iterative::scan(
                &mut self.encoder,
                comparator,
                current,
                previous,
                element_size,
                valid_length,
            );
        }

        self.encoder.finish()
    }
}

impl Default for ScannerContext {
    fn default() -> Self {
        Self::new()
    }
}
