//! Machine-level IR types and their C data layout.
//!
//! The layout rules mirror a 64-bit C target: natural alignment for scalars,
//! struct members padded to their alignment, union size is the largest
//! member rounded up to the union's alignment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Machine-level type of a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Ty {
    Void,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Ptr(Box<Ty>),
    Array(Box<Ty>, u64),
    /// Named aggregate, resolved through [`Module::aggregates`].
    ///
    /// [`Module::aggregates`]: crate::module::Module
    Aggregate(String),
}

impl Ty {
    pub fn ptr_to(pointee: Ty) -> Ty {
        Ty::Ptr(Box::new(pointee))
    }

    pub fn array_of(element: Ty, len: u64) -> Ty {
        Ty::Array(Box::new(element), len)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Ty::Ptr(_))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Ty::I8 | Ty::I16 | Ty::I32 | Ty::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    pub fn pointee(&self) -> Option<&Ty> {
        match self {
            Ty::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether a best-effort value cast between `self` and `to` exists.
    /// Only scalar-like types (integers, floats, pointers) are castable.
    pub fn castable_to(&self, to: &Ty) -> bool {
        let scalarish =
            |t: &Ty| t.is_integer() || t.is_float() || t.is_pointer();
        scalarish(self) && scalarish(to)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Void => write!(f, "void"),
            Ty::I8 => write!(f, "i8"),
            Ty::I16 => write!(f, "i16"),
            Ty::I32 => write!(f, "i32"),
            Ty::I64 => write!(f, "i64"),
            Ty::F32 => write!(f, "f32"),
            Ty::F64 => write!(f, "f64"),
            Ty::Ptr(inner) => write!(f, "{inner}*"),
            Ty::Array(elem, len) => write!(f, "[{len} x {elem}]"),
            Ty::Aggregate(name) => write!(f, "%{name}"),
        }
    }
}

/// Definition of a named struct or union type.
///
/// `name == None` marks a literal (unnamed) aggregate; `opaque` marks a
/// forward declaration without a body. Both are uninspectable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub name: Option<String>,
    pub is_union: bool,
    pub opaque: bool,
    pub fields: Vec<Ty>,
}

impl Aggregate {
    pub fn is_literal(&self) -> bool {
        self.name.is_none()
    }
}

/// C data layout for a registry of aggregates.
///
/// Kept separate from [`crate::module::Module`] so the runtime-independent
/// layout questions (size, alignment, field offsets) can be answered from
/// the aggregate table alone.
pub struct Layout<'a> {
    aggregates: &'a BTreeMap<String, Aggregate>,
}

impl<'a> Layout<'a> {
    pub fn new(aggregates: &'a BTreeMap<String, Aggregate>) -> Self {
        Self { aggregates }
    }

    /// Allocation size in bytes. Unknown or opaque aggregates size to 0.
    pub fn size_of(&self, ty: &Ty) -> u64 {
        match ty {
            Ty::Void => 0,
            Ty::I8 => 1,
            Ty::I16 => 2,
            Ty::I32 => 4,
            Ty::I64 => 8,
            Ty::F32 => 4,
            Ty::F64 => 8,
            Ty::Ptr(_) => 8,
            Ty::Array(elem, len) => self.size_of(elem) * len,
            Ty::Aggregate(name) => match self.aggregates.get(name) {
                Some(agg) if !agg.opaque => self.aggregate_size(agg),
                _ => 0,
            },
        }
    }

    pub fn align_of(&self, ty: &Ty) -> u64 {
        match ty {
            Ty::Void => 1,
            Ty::I8 => 1,
            Ty::I16 => 2,
            Ty::I32 => 4,
            Ty::I64 => 8,
            Ty::F32 => 4,
            Ty::F64 => 8,
            Ty::Ptr(_) => 8,
            Ty::Array(elem, _) => self.align_of(elem),
            Ty::Aggregate(name) => match self.aggregates.get(name) {
                Some(agg) if !agg.opaque => agg
                    .fields
                    .iter()
                    .map(|f| self.align_of(f))
                    .max()
                    .unwrap_or(1),
                _ => 1,
            },
        }
    }

    /// Byte offset of field `index` within the aggregate named `name`.
    pub fn field_offset(&self, name: &str, index: usize) -> Option<u64> {
        let agg = self.aggregates.get(name)?;
        if index >= agg.fields.len() {
            return None;
        }
        if agg.is_union {
            return Some(0);
        }
        let mut offset = 0u64;
        for (i, field) in agg.fields.iter().enumerate() {
            offset = align_up(offset, self.align_of(field));
            if i == index {
                return Some(offset);
            }
            offset += self.size_of(field);
        }
        None
    }

    fn aggregate_size(&self, agg: &Aggregate) -> u64 {
        let align = agg
            .fields
            .iter()
            .map(|f| self.align_of(f))
            .max()
            .unwrap_or(1);
        if agg.is_union {
            let largest = agg.fields.iter().map(|f| self.size_of(f)).max().unwrap_or(0);
            return align_up(largest, align);
        }
        let mut offset = 0u64;
        for field in &agg.fields {
            offset = align_up(offset, self.align_of(field));
            offset += self.size_of(field);
        }
        align_up(offset, align)
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align > 0);
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> BTreeMap<String, Aggregate> {
        let mut aggregates = BTreeMap::new();
        aggregates.insert(
            "Node".to_string(),
            Aggregate {
                name: Some("Node".to_string()),
                is_union: false,
                opaque: false,
                fields: vec![Ty::I32, Ty::ptr_to(Ty::Aggregate("Node".into()))],
            },
        );
        aggregates.insert(
            "U".to_string(),
            Aggregate {
                name: Some("U".to_string()),
                is_union: true,
                opaque: false,
                fields: vec![Ty::I32, Ty::array_of(Ty::I8, 4)],
            },
        );
        aggregates
    }

    #[test]
    fn struct_layout_pads_members() {
        let aggregates = registry();
        let layout = Layout::new(&aggregates);
        let node = Ty::Aggregate("Node".into());
        assert_eq!(layout.size_of(&node), 16);
        assert_eq!(layout.align_of(&node), 8);
        assert_eq!(layout.field_offset("Node", 0), Some(0));
        assert_eq!(layout.field_offset("Node", 1), Some(8));
    }

    #[test]
    fn union_layout_takes_largest_member() {
        let aggregates = registry();
        let layout = Layout::new(&aggregates);
        assert_eq!(layout.size_of(&Ty::Aggregate("U".into())), 4);
        assert_eq!(layout.field_offset("U", 1), Some(0));
    }

    #[test]
    fn array_size_is_element_times_len() {
        let aggregates = BTreeMap::new();
        let layout = Layout::new(&aggregates);
        assert_eq!(layout.size_of(&Ty::array_of(Ty::I32, 3)), 12);
        assert_eq!(layout.size_of(&Ty::ptr_to(Ty::F64)), 8);
    }
}
