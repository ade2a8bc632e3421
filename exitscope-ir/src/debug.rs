//! Source-level debug metadata carried by a module.
//!
//! The vocabulary is DWARF: composite and derived kinds are identified by
//! `DW_TAG_*` values, base types by `DW_ATE_*` encodings, both taken from
//! `gimli::constants`. Tags are stored as raw `u16` and encodings as `u16`
//! so the metadata serializes without custom impls.

use serde::{Deserialize, Serialize};

use crate::arena::Id;

pub type DebugTypeId = Id<DebugType>;
pub type DebugVariableId = Id<DebugVariable>;

/// Element count of one array dimension.
///
/// Variable-length dimensions name the source variable that holds the
/// count; arrays with any such dimension are not statically inspectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElementCount {
    Const(i64),
    Dynamic(String),
}

/// One member of a composite type, mirroring a `DW_TAG_member` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugMember {
    pub name: String,
    pub ty: Option<DebugTypeId>,
    pub offset_bits: u64,
}

/// A source-level type description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DebugType {
    /// Primitive type (`int`, `double`, ...), identified by a `DW_ATE_*`
    /// encoding.
    Basic {
        name: String,
        encoding: u16,
        size_bits: u64,
    },
    /// Pointer, typedef, const qualifier, member and the other
    /// `DW_TAG_*_type` wrappers around a base type.
    Derived {
        tag: u16,
        name: String,
        base: Option<DebugTypeId>,
    },
    /// Array, struct, union or enumeration.
    Composite {
        tag: u16,
        name: String,
        /// Element type for arrays; unset otherwise.
        base: Option<DebugTypeId>,
        /// Array dimensions, outermost first; empty for non-arrays.
        dims: Vec<ElementCount>,
        /// Struct/union members; empty for arrays and enums.
        members: Vec<DebugMember>,
        size_bits: u64,
    },
    /// Function type. Never inspectable.
    Subroutine,
}

impl DebugType {
    pub fn size_bits(&self) -> u64 {
        match self {
            DebugType::Basic { size_bits, .. } => *size_bits,
            DebugType::Composite { size_bits, .. } => *size_bits,
            DebugType::Derived { .. } | DebugType::Subroutine => 0,
        }
    }
}

/// Where a variable's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    Local,
    Global,
}

/// A source-level variable description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugVariable {
    pub name: String,
    /// Name of the enclosing scope: the function for locals, empty for
    /// globals.
    pub scope: String,
    pub ty: Option<DebugTypeId>,
    /// Compiler-synthesized temporaries are never reported.
    pub artificial: bool,
    pub kind: VariableKind,
}

/// Convenience constructors for the common C base types, used by tests and
/// by front-ends that build modules programmatically.
pub mod well_known {
    use super::DebugType;

    pub fn signed_int(name: &str, size_bits: u64) -> DebugType {
        DebugType::Basic {
            name: name.to_string(),
            encoding: gimli::constants::DW_ATE_signed.0 as u16,
            size_bits,
        }
    }

    pub fn unsigned_int(name: &str, size_bits: u64) -> DebugType {
        DebugType::Basic {
            name: name.to_string(),
            encoding: gimli::constants::DW_ATE_unsigned.0 as u16,
            size_bits,
        }
    }

    pub fn float(name: &str, size_bits: u64) -> DebugType {
        DebugType::Basic {
            name: name.to_string(),
            encoding: gimli::constants::DW_ATE_float.0 as u16,
            size_bits,
        }
    }

    pub fn signed_char() -> DebugType {
        DebugType::Basic {
            name: "char".to_string(),
            encoding: gimli::constants::DW_ATE_signed_char.0 as u16,
            size_bits: 8,
        }
    }

    pub fn unsigned_char() -> DebugType {
        DebugType::Basic {
            name: "unsigned char".to_string(),
            encoding: gimli::constants::DW_ATE_unsigned_char.0 as u16,
            size_bits: 8,
        }
    }
}
