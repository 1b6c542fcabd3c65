//! Element types and alignment for scanned memory.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar element kinds the scanner can compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ScalarKind {
    #[inline]
    pub fn size(&self) -> usize {
        match self {
            ScalarKind::U8 | ScalarKind::I8 => 1,
            ScalarKind::U16 | ScalarKind::I16 => 2,
            ScalarKind::U32 | ScalarKind::I32 | ScalarKind::F32 => 4,
            ScalarKind::U64 | ScalarKind::I64 | ScalarKind::F64 => 8,
        }
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarKind::U8 => "u8",
            ScalarKind::I8 => "i8",
            ScalarKind::U16 => "u16",
            ScalarKind::I16 => "i16",
            ScalarKind::U32 => "u32",
            ScalarKind::I32 => "i32",
            ScalarKind::U64 => "u64",
            ScalarKind::I64 => "i64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
        };
        write!(f, "{name}")
    }
}

/// Stored byte order of a scalar element in target memory. Big-endian
/// elements keep their literal in little-endian form inside constraints; the
/// scanner swaps bytes at compare time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// The element type one scan generation is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Scalar {
        kind: ScalarKind,
        endianness: Endianness,
    },
    /// Fixed byte sequence with optional nibble wildcards; `len` is the
    /// pattern length in bytes.
    ByteArray { len: usize },
}

impl DataType {
    pub fn scalar(kind: ScalarKind) -> Self {
        DataType::Scalar {
            kind,
            endianness: Endianness::Little,
        }
    }

    pub fn scalar_be(kind: ScalarKind) -> Self {
        DataType::Scalar {
            kind,
            endianness: Endianness::Big,
        }
    }

    pub fn byte_array(len: usize) -> Self {
        DataType::ByteArray { len }
    }

    #[inline]
    pub fn size(&self) -> usize {
        match self {
            DataType::Scalar { kind, .. } => kind.size(),
            DataType::ByteArray { len } => *len,
        }
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Scalar { kind, .. } if kind.is_float())
    }

    #[inline]
    pub fn is_byte_array(&self) -> bool {
        matches!(self, DataType::ByteArray { .. })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Scalar { kind, endianness: Endianness::Little } => write!(f, "{kind}"),
            DataType::Scalar { kind, endianness: Endianness::Big } => write!(f, "{kind}be"),
            DataType::ByteArray { len } => write!(f, "bytes[{len}]"),
        }
    }
}

/// Required offset granularity for element candidacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemoryAlignment {
    Alignment1,
    Alignment2,
    Alignment4,
    Alignment8,
    /// Resolves to the element size.
    #[default]
    Auto,
}

impl MemoryAlignment {
    pub fn from_size(size: usize) -> Option<Self> {
        match size {
            1 => Some(MemoryAlignment::Alignment1),
            2 => Some(MemoryAlignment::Alignment2),
            4 => Some(MemoryAlignment::Alignment4),
            8 => Some(MemoryAlignment::Alignment8),
            _ => None,
        }
    }

    /// Resolve to a concrete byte stride for the given element size.
    #[inline]
    pub fn resolve(&self, element_size: usize) -> usize {
        match self {
            MemoryAlignment::Alignment1 => 1,
            MemoryAlignment::Alignment2 => 2,
            MemoryAlignment::Alignment4 => 4,
            MemoryAlignment::Alignment8 => 8,
            MemoryAlignment::Auto => element_size.max(1),
        }
    }
}
