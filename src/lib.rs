//! Memory scanning engine for live external processes: progressively
//! narrowing value scans over run-length encoded snapshots, and multi-level
//! pointer chain discovery that survives heap relocation.
//!
//! The crate owns no OS access; callers supply a [`core::MemoryAccess`]
//! implementation and drive everything through a [`session::ScanSession`].

pub mod core;
pub mod pointer;
pub mod scan;
pub mod session;
pub mod snapshot;
pub mod task;

pub use crate::core::{MemoryAccess, ModuleInfo, PageRange, PointerWidth, ProcessContext};
pub use crate::pointer::{Pointer, PointerBag, PointerScanConfig};
pub use crate::scan::{
    Constraint, ConstraintKind, ConstraintNode, Constraints, DataType, MemoryAlignment, Operator,
    ScalarKind,
};
pub use crate::session::{ScanSession, SnapshotSeed};
pub use crate::snapshot::{ElementIndexer, ElementRange, Region, Snapshot};
pub use crate::task::{TaskContext, TaskError, TrackableTask};
