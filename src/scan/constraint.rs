//! Predicate tree applied per scanned element.
//!
//! A [`Constraint`] is one leaf predicate (literal compare or relative to the
//! previous value). [`ConstraintNode`] composes leaves with AND/OR/XOR, and
//! [`Constraints`] binds a tree to one element type and memory alignment for
//! a scan generation.

use crate::scan::types::{DataType, MemoryAlignment, ScalarKind};
use anyhow::{Result, anyhow};

/// Leaf predicate kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Changed,
    Unchanged,
    Increased,
    Decreased,
    IncreasedByX,
    DecreasedByX,
}

impl ConstraintKind {
    /// Relative kinds compare the current value against the previous one.
    #[inline]
    pub fn is_relative(&self) -> bool {
        matches!(
            self,
            ConstraintKind::Changed
                | ConstraintKind::Unchanged
                | ConstraintKind::Increased
                | ConstraintKind::Decreased
                | ConstraintKind::IncreasedByX
                | ConstraintKind::DecreasedByX
        )
    }

    /// Valued kinds carry a literal operand.
    #[inline]
    pub fn is_valued(&self) -> bool {
        !matches!(
            self,
            ConstraintKind::Changed
                | ConstraintKind::Unchanged
                | ConstraintKind::Increased
                | ConstraintKind::Decreased
        )
    }

    /// Kinds whose literal restricts the current value to an interval,
    /// usable for conflict detection.
    #[inline]
    fn interval(&self, v: f64) -> Option<(f64, f64)> {
        match self {
            ConstraintKind::Equal => Some((v, v)),
            ConstraintKind::GreaterThan => Some((v, f64::INFINITY)),
            ConstraintKind::GreaterThanOrEqual => Some((v, f64::INFINITY)),
            ConstraintKind::LessThan => Some((f64::NEG_INFINITY, v)),
            ConstraintKind::LessThanOrEqual => Some((f64::NEG_INFINITY, v)),
            _ => None,
        }
    }

    #[inline]
    fn lower_exclusive(&self) -> bool {
        matches!(self, ConstraintKind::GreaterThan)
    }

    #[inline]
    fn upper_exclusive(&self) -> bool {
        matches!(self, ConstraintKind::LessThan)
    }
}

/// Literal operand of a valued constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i128),
    Float(f64),
    /// `(value, mask)` byte pairs; `mask == 0` nibbles are wildcards.
    Bytes(Vec<(u8, u8)>),
}

/// One leaf predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub literal: Option<Literal>,
    /// Little-endian byte image of an integer literal at the bound element
    /// size. Big-endian element types keep the same image; the scanner swaps
    /// at compare time.
    encoded: Option<Vec<u8>>,
}

impl Constraint {
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            kind,
            literal: None,
            encoded: None,
        }
    }

    pub fn with_value(kind: ConstraintKind, literal: Literal) -> Self {
        Self {
            kind,
            literal: Some(literal),
            encoded: None,
        }
    }

    pub fn equal_int(value: i128) -> Self {
        Self::with_value(ConstraintKind::Equal, Literal::Int(value))
    }

    pub fn equal_float(value: f64) -> Self {
        Self::with_value(ConstraintKind::Equal, Literal::Float(value))
    }

    /// A constraint is valid iff it is non-valued, or valued with a present,
    /// type-convertible literal.
    pub fn is_valid(&self, data_type: &DataType) -> bool {
        if !self.kind.is_valued() {
            return true;
        }
        match (&self.literal, data_type) {
            (Some(Literal::Int(v)), DataType::Scalar { kind, .. }) => {
                if kind.is_float() {
                    true
                } else {
                    int_fits(*v, *kind)
                }
            },
            (Some(Literal::Float(v)), DataType::Scalar { kind, .. }) => {
                kind.is_float() && v.is_finite()
            },
            (Some(Literal::Bytes(pattern)), DataType::ByteArray { len }) => {
                self.kind == ConstraintKind::Equal && !pattern.is_empty() && pattern.len() == *len
            },
            _ => false,
        }
    }

    /// Literal as f64 for interval reasoning; only meaningful for numeric
    /// literals.
    fn literal_as_f64(&self) -> Option<f64> {
        match self.literal {
            Some(Literal::Int(v)) => Some(v as f64),
            Some(Literal::Float(v)) => Some(v),
            _ => None,
        }
    }

    /// True when `self` and `other` can never both hold for one element,
    /// e.g. `< 5` and `> 10`.
    pub fn conflicts_with(&self, other: &Constraint) -> bool {
        let (Some(a), Some(b)) = (self.literal_as_f64(), other.literal_as_f64()) else {
            return false;
        };
        let (Some((alo, ahi)), Some((blo, bhi))) = (self.kind.interval(a), other.kind.interval(b)) else {
            return false;
        };

        let lo = alo.max(blo);
        let hi = ahi.min(bhi);
        if lo > hi {
            return true;
        }
        if lo == hi {
            // The single shared point is excluded if either side is strict
            // at that bound.
            let lo_excluded = (self.kind.lower_exclusive() && alo == lo)
                || (other.kind.lower_exclusive() && blo == lo)
                || (self.kind.upper_exclusive() && ahi == hi)
                || (other.kind.upper_exclusive() && bhi == hi);
            return lo_excluded;
        }
        false
    }

    fn encode_for(&mut self, data_type: &DataType) -> Result<()> {
        self.encoded = None;
        let Some(literal) = &self.literal else {
            return Ok(());
        };
        if let (Literal::Int(v), DataType::Scalar { kind, .. }) = (literal, data_type) {
            if !kind.is_float() {
                let size = kind.size();
                let bytes = v.to_le_bytes();
                self.encoded = Some(bytes[..size].to_vec());
            }
        }
        Ok(())
    }

    /// Little-endian byte image of the literal, present for integer scalars
    /// after the tree has been bound to an element type.
    pub fn encoded_bytes(&self) -> Option<&[u8]> {
        self.encoded.as_deref()
    }
}

fn int_fits(value: i128, kind: ScalarKind) -> bool {
    match kind {
        ScalarKind::U8 => u8::try_from(value).is_ok(),
        ScalarKind::I8 => i8::try_from(value).is_ok(),
        ScalarKind::U16 => u16::try_from(value).is_ok(),
        ScalarKind::I16 => i16::try_from(value).is_ok(),
        ScalarKind::U32 => u32::try_from(value).is_ok(),
        ScalarKind::I32 => i32::try_from(value).is_ok(),
        ScalarKind::U64 => u64::try_from(value).is_ok(),
        ScalarKind::I64 => i64::try_from(value).is_ok(),
        ScalarKind::F32 | ScalarKind::F64 => true,
    }
}

/// Binary combinators over two child constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Xor,
}

/// Predicate tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintNode {
    Leaf(Constraint),
    Operation {
        op: Operator,
        left: Box<ConstraintNode>,
        right: Box<ConstraintNode>,
    },
}

impl ConstraintNode {
    pub fn leaf(constraint: Constraint) -> Self {
        ConstraintNode::Leaf(constraint)
    }

    pub fn operation(op: Operator, left: ConstraintNode, right: ConstraintNode) -> Self {
        ConstraintNode::Operation {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_valid(&self, data_type: &DataType) -> bool {
        match self {
            ConstraintNode::Leaf(c) => c.is_valid(data_type),
            ConstraintNode::Operation { left, right, .. } => {
                left.is_valid(data_type) && right.is_valid(data_type)
            },
        }
    }

    pub fn requires_previous(&self) -> bool {
        match self {
            ConstraintNode::Leaf(c) => c.kind.is_relative(),
            ConstraintNode::Operation { left, right, .. } => {
                left.requires_previous() || right.requires_previous()
            },
        }
    }

    fn encode_for(&mut self, data_type: &DataType) -> Result<()> {
        match self {
            ConstraintNode::Leaf(c) => c.encode_for(data_type),
            ConstraintNode::Operation { left, right, .. } => {
                left.encode_for(data_type)?;
                right.encode_for(data_type)
            },
        }
    }

    /// True if any AND node joins two directly conflicting leaves.
    fn has_conflict(&self) -> bool {
        match self {
            ConstraintNode::Leaf(_) => false,
            ConstraintNode::Operation { op, left, right } => {
                if *op == Operator::And
                    && let (ConstraintNode::Leaf(a), ConstraintNode::Leaf(b)) = (left.as_ref(), right.as_ref())
                    && a.conflicts_with(b)
                {
                    return true;
                }
                left.has_conflict() || right.has_conflict()
            },
        }
    }

    /// The single leaf of a trivial tree, used by scanner fast paths.
    pub fn sole_leaf(&self) -> Option<&Constraint> {
        match self {
            ConstraintNode::Leaf(c) => Some(c),
            ConstraintNode::Operation { .. } => None,
        }
    }
}

/// A constraint tree bound to one element type and one memory alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    root: ConstraintNode,
    data_type: DataType,
    alignment: MemoryAlignment,
}

impl Constraints {
    pub fn new(root: ConstraintNode, data_type: DataType, alignment: MemoryAlignment) -> Result<Self> {
        let mut constraints = Self {
            root,
            data_type: data_type.clone(),
            alignment,
        };
        constraints.set_element_type(data_type)?;
        Ok(constraints)
    }

    pub fn single(constraint: Constraint, data_type: DataType, alignment: MemoryAlignment) -> Result<Self> {
        Self::new(ConstraintNode::leaf(constraint), data_type, alignment)
    }

    /// Re-bind the tree to a new element type, re-encoding literals into the
    /// target's little-endian byte image.
    pub fn set_element_type(&mut self, data_type: DataType) -> Result<()> {
        self.root.encode_for(&data_type)?;
        self.data_type = data_type;
        Ok(())
    }

    pub fn root(&self) -> &ConstraintNode {
        &self.root
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn alignment(&self) -> MemoryAlignment {
        self.alignment
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        self.data_type.size()
    }

    /// Resolved byte stride between candidate elements.
    #[inline]
    pub fn stride(&self) -> usize {
        self.alignment.resolve(self.data_type.size())
    }

    pub fn requires_previous(&self) -> bool {
        self.root.requires_previous()
    }

    /// Fail-fast validation before any scanning work begins.
    pub fn validate(&self) -> Result<()> {
        if self.element_size() == 0 {
            return Err(anyhow!("element size must be positive"));
        }
        if !self.root.is_valid(&self.data_type) {
            return Err(anyhow!("constraint tree is not valid for element type {}", self.data_type));
        }
        if self.root.has_conflict() {
            return Err(anyhow!("compound constraint can never match (conflicting bounds)"));
        }
        if self.data_type.is_byte_array() && self.root.requires_previous() {
            return Err(anyhow!("relative constraints are not supported for byte patterns"));
        }
        Ok(())
    }
}
