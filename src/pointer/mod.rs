//! Multi-level pointer discovery, rebasing and path extraction.

pub mod extract;
pub mod kernel;
pub mod rebase;
pub mod scan;
pub mod types;

pub use extract::{extract_random_path, resolve_pointer};
pub use kernel::{IntervalKernel, LinearKernel, SearchKernel, build_kernel, kernel_comparator};
pub use rebase::rebase_pointers;
pub use scan::scan_pointers;
pub use types::{Level, Pointer, PointerBag, PointerScanConfig};
