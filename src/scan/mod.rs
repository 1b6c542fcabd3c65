//! Value scanning: constraint trees, compiled comparators, run-length
//! encoded results and the vectorized scan engine.

pub mod collector;
pub mod comparer;
pub mod constraint;
pub mod encoder;
pub mod engine;
pub mod manual;
pub mod types;

#[cfg(test)]
mod tests;

pub use collector::collect_values;
pub use comparer::CompiledComparator;
pub use constraint::{Constraint, ConstraintKind, ConstraintNode, Constraints, Literal, Operator};
pub use encoder::RunLengthEncoder;
pub use engine::{ScanVariant, ScannerContext, ScannerPool, parse_pattern, select_variant};
pub use types::{DataType, Endianness, MemoryAlignment, ScalarKind};
