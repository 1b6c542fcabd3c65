//! Compilation of a constraint tree into one monomorphic compare closure.
//!
//! The tree is walked once per scan, outside the hot loop; each leaf becomes
//! a closure specialized for the bound scalar type and endianness, and
//! operator nodes compose child closures. The scanner then calls a single
//! boxed function per element.

use crate::scan::constraint::{Constraint, ConstraintKind, ConstraintNode, Constraints, Literal, Operator};
use crate::scan::types::{DataType, Endianness, ScalarKind};
use anyhow::{Result, anyhow};
use std::sync::Arc;

const F32_EQ_EPSILON: f32 = 1e-3;
const F64_EQ_EPSILON: f64 = 1e-6;

type LeafFn = Box<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>;

#[inline(always)]
fn read_raw<T: bytemuck::AnyBitPattern>(bytes: &[u8]) -> T {
    bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<T>()])
}

macro_rules! int_leaf {
    ($ty:ty, $constraint:expr, $big:expr) => {{
        let big = $big;
        #[inline(always)]
        fn rd(bytes: &[u8], big: bool) -> $ty {
            let v: $ty = read_raw(bytes);
            if big { <$ty>::from_be(v) } else { <$ty>::from_le(v) }
        }
        let lit: $ty = match $constraint.literal {
            Some(Literal::Int(v)) => v as $ty,
            _ => 0,
        };
        let f: LeafFn = match $constraint.kind {
            ConstraintKind::Equal => Box::new(move |c, _| rd(c, big) == lit),
            ConstraintKind::NotEqual => Box::new(move |c, _| rd(c, big) != lit),
            ConstraintKind::GreaterThan => Box::new(move |c, _| rd(c, big) > lit),
            ConstraintKind::GreaterThanOrEqual => Box::new(move |c, _| rd(c, big) >= lit),
            ConstraintKind::LessThan => Box::new(move |c, _| rd(c, big) < lit),
            ConstraintKind::LessThanOrEqual => Box::new(move |c, _| rd(c, big) <= lit),
            ConstraintKind::Changed => Box::new(move |c, p| rd(c, big) != rd(p, big)),
            ConstraintKind::Unchanged => Box::new(move |c, p| rd(c, big) == rd(p, big)),
            ConstraintKind::Increased => Box::new(move |c, p| rd(c, big) > rd(p, big)),
            ConstraintKind::Decreased => Box::new(move |c, p| rd(c, big) < rd(p, big)),
            ConstraintKind::IncreasedByX => {
                Box::new(move |c, p| rd(c, big) == rd(p, big).wrapping_add(lit))
            },
            ConstraintKind::DecreasedByX => {
                Box::new(move |c, p| rd(c, big) == rd(p, big).wrapping_sub(lit))
            },
        };
        f
    }};
}

macro_rules! float_leaf {
    ($ty:ty, $bits:ty, $eps:expr, $constraint:expr, $big:expr) => {{
        let big = $big;
        #[inline(always)]
        fn rd(bytes: &[u8], big: bool) -> $ty {
            let raw: $bits = read_raw(bytes);
            let raw = if big { <$bits>::from_be(raw) } else { <$bits>::from_le(raw) };
            <$ty>::from_bits(raw)
        }
        let lit: $ty = match $constraint.literal {
            Some(Literal::Int(v)) => v as $ty,
            Some(Literal::Float(v)) => v as $ty,
            _ => 0.0,
        };
        let eps: $ty = $eps;
        let f: LeafFn = match $constraint.kind {
            ConstraintKind::Equal => Box::new(move |c, _| (rd(c, big) - lit).abs() <= eps),
            ConstraintKind::NotEqual => Box::new(move |c, _| (rd(c, big) - lit).abs() > eps),
            ConstraintKind::GreaterThan => Box::new(move |c, _| rd(c, big) > lit),
            ConstraintKind::GreaterThanOrEqual => Box::new(move |c, _| rd(c, big) >= lit),
            ConstraintKind::LessThan => Box::new(move |c, _| rd(c, big) < lit),
            ConstraintKind::LessThanOrEqual => Box::new(move |c, _| rd(c, big) <= lit),
            ConstraintKind::Changed => Box::new(move |c, p| (rd(c, big) - rd(p, big)).abs() > eps),
            ConstraintKind::Unchanged => Box::new(move |c, p| (rd(c, big) - rd(p, big)).abs() <= eps),
            ConstraintKind::Increased => Box::new(move |c, p| rd(c, big) > rd(p, big)),
            ConstraintKind::Decreased => Box::new(move |c, p| rd(c, big) < rd(p, big)),
            ConstraintKind::IncreasedByX => {
                Box::new(move |c, p| (rd(c, big) - rd(p, big) - lit).abs() <= eps)
            },
            ConstraintKind::DecreasedByX => {
                Box::new(move |c, p| (rd(p, big) - rd(c, big) - lit).abs() <= eps)
            },
        };
        f
    }};
}

fn compile_leaf(constraint: &Constraint, data_type: &DataType) -> Result<LeafFn> {
    match data_type {
        DataType::Scalar { kind, endianness } => {
            let big = *endianness == Endianness::Big;
            Ok(match kind {
                ScalarKind::U8 => int_leaf!(u8, constraint, big),
                ScalarKind::I8 => int_leaf!(i8, constraint, big),
                ScalarKind::U16 => int_leaf!(u16, constraint, big),
                ScalarKind::I16 => int_leaf!(i16, constraint, big),
                ScalarKind::U32 => int_leaf!(u32, constraint, big),
                ScalarKind::I32 => int_leaf!(i32, constraint, big),
                ScalarKind::U64 => int_leaf!(u64, constraint, big),
                ScalarKind::I64 => int_leaf!(i64, constraint, big),
                ScalarKind::F32 => float_leaf!(f32, u32, F32_EQ_EPSILON, constraint, big),
                ScalarKind::F64 => float_leaf!(f64, u64, F64_EQ_EPSILON, constraint, big),
            })
        },
        DataType::ByteArray { .. } => {
            let Some(Literal::Bytes(pattern)) = constraint.literal.clone() else {
                return Err(anyhow!("byte array compare needs a byte pattern literal"));
            };
            Ok(Box::new(move |c, _| {
                pattern
                    .iter()
                    .zip(c.iter())
                    .all(|(&(value, mask), &byte)| byte & mask == value & mask)
            }))
        },
    }
}

fn compile_node(node: &ConstraintNode, data_type: &DataType) -> Result<LeafFn> {
    match node {
        ConstraintNode::Leaf(constraint) => compile_leaf(constraint, data_type),
        ConstraintNode::Operation { op, left, right } => {
            let l = compile_node(left, data_type)?;
            let r = compile_node(right, data_type)?;
            Ok(match op {
                Operator::And => Box::new(move |c, p| l(c, p) && r(c, p)),
                Operator::Or => Box::new(move |c, p| l(c, p) || r(c, p)),
                Operator::Xor => Box::new(move |c, p| l(c, p) ^ r(c, p)),
            })
        },
    }
}

/// A constraint tree compiled down to one compare function. Cheap to clone
/// and share across worker threads.
#[derive(Clone)]
pub struct CompiledComparator {
    func: Arc<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>,
    needs_previous: bool,
    element_size: usize,
}

impl CompiledComparator {
    pub fn compile(constraints: &Constraints) -> Result<Self> {
        let func = compile_node(constraints.root(), constraints.data_type())?;
        Ok(Self {
            func: Arc::from(func),
            needs_previous: constraints.requires_previous(),
            element_size: constraints.element_size(),
        })
    }

    /// Wrap an arbitrary predicate, used by pointer search kernels whose
    /// accept set is an address interval rather than a literal.
    pub fn from_fn<F>(element_size: usize, needs_previous: bool, f: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> bool + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(f),
            needs_previous,
            element_size,
        }
    }

    /// Both slices must hold exactly `element_size` bytes; `previous` may be
    /// any bytes when the tree has no relative leaf.
    #[inline(always)]
    pub fn matches(&self, current: &[u8], previous: &[u8]) -> bool {
        (self.func)(current, previous)
    }

    #[inline]
    pub fn needs_previous(&self) -> bool {
        self.needs_previous
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }
}

impl std::fmt::Debug for CompiledComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledComparator")
            .field("needs_previous", &self.needs_previous)
            .field("element_size", &self.element_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::types::MemoryAlignment;

    fn compiled(constraint: Constraint, data_type: DataType) -> CompiledComparator {
        let constraints = Constraints::single(constraint, data_type, MemoryAlignment::Auto).expect("bind");
        CompiledComparator::compile(&constraints).expect("compile")
    }

    #[test]
    fn int_equal_respects_endianness() {
        let le = compiled(Constraint::equal_int(0x11223344), DataType::scalar(ScalarKind::I32));
        assert!(le.matches(&[0x44, 0x33, 0x22, 0x11], &[]));
        assert!(!le.matches(&[0x11, 0x22, 0x33, 0x44], &[]));

        let be = compiled(Constraint::equal_int(0x11223344), DataType::scalar_be(ScalarKind::I32));
        assert!(be.matches(&[0x11, 0x22, 0x33, 0x44], &[]));
        assert!(!be.matches(&[0x44, 0x33, 0x22, 0x11], &[]));
    }

    #[test]
    fn signed_ordering() {
        let cmp = compiled(
            Constraint::with_value(ConstraintKind::GreaterThan, Literal::Int(-5)),
            DataType::scalar(ScalarKind::I32),
        );
        assert!(cmp.matches(&(-4i32).to_le_bytes(), &[]));
        assert!(!cmp.matches(&(-6i32).to_le_bytes(), &[]));
    }

    #[test]
    fn increased_by_wraps() {
        let cmp = compiled(
            Constraint::with_value(ConstraintKind::IncreasedByX, Literal::Int(1)),
            DataType::scalar(ScalarKind::U8),
        );
        assert!(cmp.needs_previous());
        assert!(cmp.matches(&[6], &[5]));
        // 255 + 1 wraps to 0.
        assert!(cmp.matches(&[0], &[255]));
        assert!(!cmp.matches(&[7], &[5]));
    }

    #[test]
    fn float_equal_uses_tolerance() {
        let cmp = compiled(Constraint::equal_float(1.5), DataType::scalar(ScalarKind::F32));
        assert!(cmp.matches(&1.5f32.to_le_bytes(), &[]));
        assert!(cmp.matches(&1.5004f32.to_le_bytes(), &[]));
        assert!(!cmp.matches(&1.6f32.to_le_bytes(), &[]));
    }

    #[test]
    fn operator_composition() {
        let tree = ConstraintNode::operation(
            Operator::Xor,
            ConstraintNode::leaf(Constraint::with_value(ConstraintKind::GreaterThan, Literal::Int(10))),
            ConstraintNode::leaf(Constraint::new(ConstraintKind::Changed)),
        );
        let constraints =
            Constraints::new(tree, DataType::scalar(ScalarKind::I32), MemoryAlignment::Auto).expect("bind");
        let cmp = CompiledComparator::compile(&constraints).expect("compile");

        let v = |x: i32| x.to_le_bytes();
        // > 10 and changed: XOR fails.
        assert!(!cmp.matches(&v(20), &v(1)));
        // > 10 and unchanged: XOR holds.
        assert!(cmp.matches(&v(20), &v(20)));
        // <= 10 and changed: XOR holds.
        assert!(cmp.matches(&v(5), &v(1)));
    }

    #[test]
    fn byte_pattern_nibble_mask() {
        // Pattern "1A ?B" : high nibble of second byte is wildcard.
        let pattern = vec![(0x1A, 0xFF), (0x0B, 0x0F)];
        let cmp = compiled(
            Constraint::with_value(ConstraintKind::Equal, Literal::Bytes(pattern)),
            DataType::byte_array(2),
        );
        assert!(cmp.matches(&[0x1A, 0x7B], &[]));
        assert!(cmp.matches(&[0x1A, 0x0B], &[]));
        assert!(!cmp.matches(&[0x1A, 0x7C], &[]));
        assert!(!cmp.matches(&[0x1B, 0x7B], &[]));
    }
}
