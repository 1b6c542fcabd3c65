//! Search kernels: "is this value within `radius` of some bounding address".
//!
//! Rebasing tests millions of candidate pointer values against one bounding
//! address set. Small sets are probed linearly; large sets amortize a
//! one-time sorted interval index over the queries. Either kernel plugs into
//! the scan engine as a plain comparator, reusing the vectorized RLE
//! machinery of value scans.

use crate::core::PointerWidth;
use crate::scan::CompiledComparator;
use itertools::Itertools;
use std::sync::Arc;

/// Bounding set size at which the interval index starts paying for itself.
const LINEAR_KERNEL_LIMIT: usize = 64;

pub trait SearchKernel: Send + Sync {
    /// True if `value` lies within the kernel radius of a bounding address.
    fn contains_near(&self, value: u64) -> bool;
}

/// Probe every bounding address per query.
pub struct LinearKernel {
    addresses: Vec<u64>,
    radius: u64,
}

impl LinearKernel {
    pub fn new(addresses: Vec<u64>, radius: u64) -> Self {
        Self { addresses, radius }
    }
}

impl SearchKernel for LinearKernel {
    #[inline]
    fn contains_near(&self, value: u64) -> bool {
        self.addresses.iter().any(|&a| a.abs_diff(value) <= self.radius)
    }
}

/// Sorted, coalesced `[address - radius, address + radius]` intervals with
/// binary-search queries.
pub struct IntervalKernel {
    /// Interval starts, ascending; `ends[i]` is the exclusive end of the
    /// interval beginning at `starts[i]`.
    starts: Vec<u64>,
    ends: Vec<u64>,
}

impl IntervalKernel {
    pub fn new(mut addresses: Vec<u64>, radius: u64) -> Self {
        addresses.sort_unstable();
        let (starts, ends): (Vec<u64>, Vec<u64>) = addresses
            .into_iter()
            .dedup()
            .map(|a| (a.saturating_sub(radius), a.saturating_add(radius).saturating_add(1)))
            .coalesce(|prev, next| {
                if next.0 <= prev.1 {
                    Ok((prev.0, prev.1.max(next.1)))
                } else {
                    Err((prev, next))
                }
            })
            .unzip();
        Self { starts, ends }
    }
}

impl SearchKernel for IntervalKernel {
    #[inline]
    fn contains_near(&self, value: u64) -> bool {
        let idx = self.starts.partition_point(|&start| start <= value);
        idx > 0 && value < self.ends[idx - 1]
    }
}

/// Pick the kernel variant for a bounding set.
pub fn build_kernel(addresses: Vec<u64>, radius: u64) -> Arc<dyn SearchKernel> {
    if addresses.len() <= LINEAR_KERNEL_LIMIT {
        Arc::new(LinearKernel::new(addresses, radius))
    } else {
        Arc::new(IntervalKernel::new(addresses, radius))
    }
}

/// Adapt a kernel into a scan comparator over pointer-sized little-endian
/// elements.
pub fn kernel_comparator(kernel: Arc<dyn SearchKernel>, width: PointerWidth) -> CompiledComparator {
    let size = width.size();
    CompiledComparator::from_fn(size, false, move |current, _| {
        let value = match width {
            PointerWidth::Four => {
                u32::from_le(bytemuck::pod_read_unaligned::<u32>(&current[..4])) as u64
            },
            PointerWidth::Eight => {
                u64::from_le(bytemuck::pod_read_unaligned::<u64>(&current[..8]))
            },
        };
        kernel.contains_near(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both_kernels(addresses: &[u64], radius: u64) -> [Box<dyn SearchKernel>; 2] {
        [
            Box::new(LinearKernel::new(addresses.to_vec(), radius)),
            Box::new(IntervalKernel::new(addresses.to_vec(), radius)),
        ]
    }

    #[test]
    fn kernels_agree_on_boundaries() {
        for kernel in both_kernels(&[0x1000, 0x5000], 0x10) {
            assert!(kernel.contains_near(0x1000));
            assert!(kernel.contains_near(0x0FF0));
            assert!(kernel.contains_near(0x1010));
            assert!(!kernel.contains_near(0x0FEF));
            assert!(!kernel.contains_near(0x1011));
            assert!(kernel.contains_near(0x4FF5));
            assert!(!kernel.contains_near(0x3000));
        }
    }

    #[test]
    fn interval_kernel_coalesces_overlaps() {
        // Radius 0x20 makes 0x1000 and 0x1030 overlap into one interval.
        let kernel = IntervalKernel::new(vec![0x1030, 0x1000], 0x20);
        assert_eq!(kernel.starts.len(), 1);
        assert!(kernel.contains_near(0x1028));
        assert!(kernel.contains_near(0x1050));
        assert!(!kernel.contains_near(0x1051));
    }

    #[test]
    fn zero_radius_is_exact_membership() {
        for kernel in both_kernels(&[0x2000], 0) {
            assert!(kernel.contains_near(0x2000));
            assert!(!kernel.contains_near(0x1FFF));
            assert!(!kernel.contains_near(0x2001));
        }
    }

    #[test]
    fn comparator_decodes_pointer_width() {
        let kernel = build_kernel(vec![0x1000], 0x10);
        let cmp = kernel_comparator(kernel, PointerWidth::Eight);
        assert_eq!(cmp.element_size(), 8);
        assert!(cmp.matches(&0x1008u64.to_le_bytes(), &[]));
        assert!(!cmp.matches(&0x2000u64.to_le_bytes(), &[]));

        let kernel = build_kernel(vec![0x1000], 0x10);
        let cmp = kernel_comparator(kernel, PointerWidth::Four);
        assert!(cmp.matches(&0x0FF0u32.to_le_bytes(), &[]));
    }
}
