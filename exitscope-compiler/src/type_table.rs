//! Type-table construction: dense index assignment over the inspectable
//! debug types, descriptor emission, and type-index resolution for IR
//! values.

use std::io::Write;

use gimli::constants as dw;
use tracing::{debug, warn};

use exitscope_ir::{DebugType, DebugTypeId, ElementCount, Module, Ty};
use exitscope_protocol::{
    truncate_name, write_descriptor, FieldRecord, FormatCode, TypeDescriptor, UNKNOWN_TYPE_INDEX,
};

use crate::type_format::{
    debug_type_name, format_of, ir_type_name, should_process, OPAQUE_AGGREGATE_NAME,
};
use crate::Result;

struct IndexedType {
    name: String,
    index: i32,
    ty: DebugTypeId,
}

/// Index assignment and serialization of the module's type table.
///
/// Index assignment is a separate first pass so that descriptor emission
/// can resolve cross-references (pointee, array element) against the
/// complete index set.
pub struct TypeTableBuilder {
    entries: Vec<IndexedType>,
}

impl TypeTableBuilder {
    /// Enumerate every inspectable debug type in traversal order and assign
    /// dense indices starting at 0.
    pub fn build(module: &Module) -> Self {
        let mut entries = Vec::new();
        let mut index = 0i32;
        for id in module.debug_types.ids() {
            if !should_process(module, Some(id)) {
                continue;
            }
            let name = truncate_name(&debug_type_name(module, Some(id)));
            entries.push(IndexedType {
                name,
                index,
                ty: id,
            });
            index += 1;
        }
        debug!(types = entries.len(), "type table indexed");
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index_of(&self, ty: DebugTypeId) -> Option<i32> {
        self.entries.iter().find(|e| e.ty == ty).map(|e| e.index)
    }

    pub fn name_of(&self, index: i32) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.index == index)
            .map(|e| e.name.as_str())
    }

    /// Serialize one record per indexed type; returns the record count the
    /// runtime must be told to read back.
    pub fn write<W: Write>(&self, module: &Module, out: &mut W) -> Result<usize> {
        let mut written = 0usize;
        for entry in &self.entries {
            match self.descriptor_for(module, entry.ty, &entry.name) {
                Some(descriptor) => {
                    write_descriptor(out, &descriptor)?;
                    written += 1;
                }
                None => {
                    debug!(name = %entry.name, "no descriptor emitted for indexed type");
                }
            }
        }
        Ok(written)
    }

    fn descriptor_for(
        &self,
        module: &Module,
        ty: DebugTypeId,
        name: &str,
    ) -> Option<TypeDescriptor> {
        let format = format_of(module, Some(ty));
        match &module.debug_types[ty] {
            DebugType::Basic { .. } => {
                Some(TypeDescriptor::synthetic(name.to_string(), format, 0, format))
            }
            DebugType::Derived { base, .. } => {
                // Pointers and qualified wrappers reference the index of
                // their base type; an unindexed referent leaves the format
                // code as a harmless self-loop.
                let base_index = base.and_then(|b| self.index_of(b)).unwrap_or(format);
                Some(TypeDescriptor::synthetic(
                    name.to_string(),
                    format,
                    0,
                    base_index,
                ))
            }
            DebugType::Composite {
                tag,
                base,
                dims,
                members,
                size_bits,
                ..
            } => {
                if *tag == dw::DW_TAG_array_type.0 {
                    let count = match dims.first() {
                        Some(ElementCount::Const(count)) => *count,
                        _ => return None,
                    };
                    Some(TypeDescriptor::synthetic(
                        name.to_string(),
                        format,
                        count as i32,
                        format,
                    ))
                } else if *tag == dw::DW_TAG_structure_type.0 {
                    let fields = members
                        .iter()
                        .map(|member| self.member_record(module, member))
                        .collect();
                    Some(TypeDescriptor {
                        name: name.to_string(),
                        fields,
                    })
                } else if *tag == dw::DW_TAG_union_type.0 {
                    Some(TypeDescriptor::synthetic(
                        name.to_string(),
                        format,
                        (*size_bits / 8) as i32,
                        format,
                    ))
                } else if *tag == dw::DW_TAG_enumeration_type.0 {
                    Some(TypeDescriptor::synthetic(name.to_string(), format, 0, format))
                } else {
                    debug!(name, tag, "not creating descriptor for composite kind");
                    None
                }
            }
            DebugType::Subroutine => None,
        }
    }

    /// Field record for a struct member, recomputing the base-type-index
    /// against the indexed set: the pointee index for pointer members, the
    /// array's own index for array-of-scalar members, and the
    /// non-inspectable code when the member's type is out of reach.
    fn member_record(&self, module: &Module, member: &exitscope_ir::DebugMember) -> FieldRecord {
        let mut format = format_of(module, member.ty);
        let mut base_index = format;
        if !should_process(module, member.ty) {
            format = FormatCode::NonInspectable as i32;
            base_index = format;
        } else if let Some(member_ty) = member.ty {
            match &module.debug_types[member_ty] {
                DebugType::Derived { base, .. } => {
                    if let Some(found) = base.and_then(|b| self.index_of(b)) {
                        base_index = found;
                    }
                }
                DebugType::Composite { tag, base, .. }
                    if *tag == dw::DW_TAG_array_type.0 =>
                {
                    let element_is_basic = base
                        .map(|b| matches!(module.debug_types[b], DebugType::Basic { .. }))
                        .unwrap_or(false);
                    if element_is_basic {
                        if let Some(found) = self.index_of(member_ty) {
                            base_index = found;
                        }
                    }
                }
                _ => {}
            }
        }
        FieldRecord {
            name: truncate_name(&member.name),
            format,
            offset: (member.offset_bits / 8) as i32,
            base_type_index: base_index,
        }
    }

    /// Resolve the type-table index for a machine-level type by name.
    ///
    /// Exact match first. Two fallbacks cover the gap between IR integer
    /// names and C spellings: an indexed `unsigned X` satisfies a query for
    /// `X`, and a query for `long` accepts any indexed name mentioning
    /// `long`. No match is the sentinel that tells the pass to skip the
    /// reporter call.
    pub fn index_for_ir_type(&self, module: &Module, ty: &Ty) -> i32 {
        let name = ir_type_name(module, ty);
        if name == OPAQUE_AGGREGATE_NAME {
            return UNKNOWN_TYPE_INDEX;
        }
        for entry in &self.entries {
            if entry.name == name {
                return entry.index;
            }
        }
        for entry in &self.entries {
            if let Some(pos) = entry.name.find("unsigned ") {
                if entry.name[pos + "unsigned ".len()..] == name {
                    return entry.index;
                }
            }
            if name == "long" && entry.name.contains("long") {
                return entry.index;
            }
        }
        warn!(%name, "no type table index for IR type");
        UNKNOWN_TYPE_INDEX
    }
}
