//! Debug-type classification: format codes, canonical names, printf-style
//! specifiers and the inspectability predicate.
//!
//! Classification is driven by the DWARF vocabulary the metadata carries:
//! `DW_ATE_*` encodings pick scalar formats, `DW_TAG_*` kinds pick the
//! composite ones. Scalar widths are told apart by the C type *name*, which
//! is what the metadata reliably preserves across producers.

use gimli::constants as dw;
use tracing::debug;

use exitscope_ir::{DebugType, DebugTypeId, ElementCount, Module, Ty};
use exitscope_protocol::FormatCode;

/// Name the C reporter used for aggregates it cannot see into.
pub const OPAQUE_AGGREGATE_NAME: &str = "Literal or opaque struct";

/// Format code of a debug type. Absent types are `void`; anything the
/// classifier does not recognize degrades to non-inspectable.
pub fn format_of(module: &Module, ty: Option<DebugTypeId>) -> i32 {
    let id = match ty {
        Some(id) => id,
        None => return FormatCode::Void as i32,
    };
    match &module.debug_types[id] {
        DebugType::Basic { name, encoding, .. } => basic_format(name, *encoding),
        DebugType::Derived { tag, base, .. } => {
            if *tag == dw::DW_TAG_pointer_type.0 {
                FormatCode::Pointer as i32
            } else if *tag == dw::DW_TAG_typedef.0 || *tag == dw::DW_TAG_const_type.0 {
                format_of(module, *base)
            } else {
                debug!(tag, "unknown derived type kind");
                FormatCode::NonInspectable as i32
            }
        }
        DebugType::Composite { tag, .. } => {
            if *tag == dw::DW_TAG_enumeration_type.0 {
                FormatCode::I32 as i32
            } else if *tag == dw::DW_TAG_array_type.0 {
                FormatCode::Array as i32
            } else if *tag == dw::DW_TAG_union_type.0 {
                FormatCode::Union as i32
            } else if *tag == dw::DW_TAG_structure_type.0 {
                FormatCode::Struct as i32
            } else {
                debug!(tag, "unknown composite type kind");
                FormatCode::NonInspectable as i32
            }
        }
        DebugType::Subroutine => FormatCode::NonInspectable as i32,
    }
}

fn basic_format(name: &str, encoding: u16) -> i32 {
    let code = if encoding == dw::DW_ATE_float.0 as u16 {
        if name == "double" {
            FormatCode::F64
        } else {
            FormatCode::F32
        }
    } else if encoding == dw::DW_ATE_signed.0 as u16 {
        match name {
            "short" => FormatCode::I16,
            "long int" => FormatCode::Long,
            "long long int" => FormatCode::I64,
            _ => FormatCode::I32,
        }
    } else if encoding == dw::DW_ATE_signed_char.0 as u16 {
        FormatCode::I8
    } else if encoding == dw::DW_ATE_unsigned_char.0 as u16 {
        FormatCode::U8
    } else if encoding == dw::DW_ATE_unsigned.0 as u16 {
        match name {
            "unsigned short" => FormatCode::U16,
            "long unsigned int" => FormatCode::ULong,
            "long long unsigned int" => FormatCode::U64,
            _ => FormatCode::U32,
        }
    } else {
        debug!(name, encoding, "unknown base type encoding");
        FormatCode::NonInspectable
    };
    code as i32
}

/// Canonical human-readable name of a debug type.
pub fn debug_type_name(module: &Module, ty: Option<DebugTypeId>) -> String {
    let id = match ty {
        Some(id) => id,
        None => return "void".to_string(),
    };
    match &module.debug_types[id] {
        DebugType::Basic { name, .. } => name.clone(),
        DebugType::Derived { tag, name, base } => {
            if *tag == dw::DW_TAG_pointer_type.0 {
                format!("pointer to {}", debug_type_name(module, *base))
            } else if *tag == dw::DW_TAG_const_type.0 {
                format!("const {}", debug_type_name(module, *base))
            } else if *tag == dw::DW_TAG_typedef.0 {
                name.clone()
            } else {
                String::new()
            }
        }
        DebugType::Composite { tag, name, base, .. } => {
            if *tag == dw::DW_TAG_array_type.0 {
                format!("array of {}", debug_type_name(module, *base))
            } else if *tag == dw::DW_TAG_structure_type.0 {
                format!("struct {name}")
            } else if *tag == dw::DW_TAG_union_type.0 {
                format!("union {name}")
            } else if *tag == dw::DW_TAG_enumeration_type.0 {
                format!("enum {name}")
            } else {
                String::new()
            }
        }
        DebugType::Subroutine => String::new(),
    }
}

/// Canonical name of a machine-level type, used to match an IR value
/// against the indexed debug types. Integer widths map onto the default C
/// names for a 64-bit target.
pub fn ir_type_name(module: &Module, ty: &Ty) -> String {
    match ty {
        Ty::Void => "void".to_string(),
        Ty::I8 => "char".to_string(),
        Ty::I16 => "short".to_string(),
        Ty::I32 => "int".to_string(),
        Ty::I64 => "long".to_string(),
        Ty::F32 => "float".to_string(),
        Ty::F64 => "double".to_string(),
        Ty::Ptr(inner) => format!("pointer to {}", ir_type_name(module, inner)),
        Ty::Array(elem, _) => format!("array of {}", ir_type_name(module, elem)),
        Ty::Aggregate(name) => match module.aggregates.get(name) {
            Some(agg) if !agg.is_literal() && !agg.opaque => {
                let tag = agg.name.as_deref().unwrap_or_default();
                if agg.is_union {
                    format!("union {tag}")
                } else {
                    format!("struct {tag}")
                }
            }
            _ => OPAQUE_AGGREGATE_NAME.to_string(),
        },
    }
}

/// Whether a debug type can appear in the type table.
///
/// Members and pointer-to-member wrappers, subroutine types, arrays whose
/// element count is not a compile-time constant and composites without
/// elements are all out.
pub fn should_process(module: &Module, ty: Option<DebugTypeId>) -> bool {
    let id = match ty {
        Some(id) => id,
        None => return true,
    };
    match &module.debug_types[id] {
        DebugType::Basic { .. } => true,
        DebugType::Derived { tag, base, .. } => {
            if *tag == dw::DW_TAG_member.0 || *tag == dw::DW_TAG_ptr_to_member_type.0 {
                false
            } else {
                should_process(module, *base)
            }
        }
        DebugType::Composite {
            tag, dims, members, ..
        } => {
            if *tag == dw::DW_TAG_array_type.0 {
                matches!(dims.first(), Some(ElementCount::Const(_)))
            } else if *tag == dw::DW_TAG_enumeration_type.0 {
                true
            } else {
                !members.is_empty()
            }
        }
        DebugType::Subroutine => false,
    }
}

/// Strip `typedef` and `const` wrappers down to the underlying type.
pub fn strip_qualifiers(module: &Module, ty: DebugTypeId) -> DebugTypeId {
    let mut current = ty;
    loop {
        match &module.debug_types[current] {
            DebugType::Derived { tag, base, .. }
                if *tag == dw::DW_TAG_typedef.0 || *tag == dw::DW_TAG_const_type.0 =>
            {
                match base {
                    Some(next) => current = *next,
                    None => return current,
                }
            }
            _ => return current,
        }
    }
}

/// The printf-style conversion used when a scalar of this type is printed
/// directly by injected code. Includes the record's trailing newline.
pub fn format_specifier(module: &Module, ty: Option<DebugTypeId>) -> String {
    let id = match ty {
        Some(id) => id,
        None => return "%d\n".to_string(),
    };
    match &module.debug_types[id] {
        DebugType::Basic { name, encoding, .. } => basic_specifier(name, *encoding),
        DebugType::Derived { base, .. } => format_specifier(module, *base),
        DebugType::Composite { tag, .. } => {
            if *tag == dw::DW_TAG_array_type.0 || *tag == dw::DW_TAG_enumeration_type.0 {
                "%d\n".to_string()
            } else {
                debug!(tag, "no scalar specifier for composite type");
                String::new()
            }
        }
        DebugType::Subroutine => String::new(),
    }
}

fn basic_specifier(name: &str, encoding: u16) -> String {
    let spec = if encoding == dw::DW_ATE_float.0 as u16 {
        if name == "double" {
            "%.2lf\n"
        } else {
            "%.2f\n"
        }
    } else if encoding == dw::DW_ATE_signed.0 as u16 {
        match name {
            "short" => "%hi\n",
            "long int" => "%ld\n",
            "long long int" => "%lld\n",
            _ => "%d\n",
        }
    } else if encoding == dw::DW_ATE_signed_char.0 as u16 {
        "%c\n"
    } else if encoding == dw::DW_ATE_unsigned_char.0 as u16 {
        "%u\n"
    } else if encoding == dw::DW_ATE_unsigned.0 as u16 {
        match name {
            "unsigned short" => "%hu\n",
            "long unsigned int" => "%lu\n",
            "long long unsigned int" => "%llu\n",
            _ => "%u\n",
        }
    } else if encoding == dw::DW_ATE_address.0 as u16 {
        "%u\n"
    } else {
        debug!(name, encoding, "unknown base type encoding for specifier");
        ""
    };
    spec.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use exitscope_ir::debug::well_known;
    use exitscope_ir::{Aggregate, DebugMember};

    fn module_with(types: Vec<DebugType>) -> (Module, Vec<DebugTypeId>) {
        let mut module = Module::new("t", "t.c");
        let ids = types
            .into_iter()
            .map(|ty| module.add_debug_type(ty))
            .collect();
        (module, ids)
    }

    #[test]
    fn basic_types_classify_by_encoding_and_name() {
        let (module, ids) = module_with(vec![
            well_known::float("double", 64),
            well_known::float("float", 32),
            well_known::signed_int("short", 16),
            well_known::signed_int("long int", 64),
            well_known::signed_int("long long int", 64),
            well_known::signed_int("int", 32),
            well_known::signed_char(),
            well_known::unsigned_char(),
            well_known::unsigned_int("unsigned short", 16),
            well_known::unsigned_int("long unsigned int", 64),
            well_known::unsigned_int("long long unsigned int", 64),
            well_known::unsigned_int("unsigned int", 32),
        ]);
        let formats: Vec<i32> = ids.iter().map(|&id| format_of(&module, Some(id))).collect();
        assert_eq!(formats, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(format_of(&module, None), 14);
    }

    #[test]
    fn composite_types_classify_by_tag() {
        let mut module = Module::new("t", "t.c");
        let int_id = module.add_debug_type(well_known::signed_int("int", 32));
        let array = module.add_debug_type(DebugType::Composite {
            tag: dw::DW_TAG_array_type.0,
            name: String::new(),
            base: Some(int_id),
            dims: vec![ElementCount::Const(4)],
            members: Vec::new(),
            size_bits: 128,
        });
        let strukt = module.add_debug_type(DebugType::Composite {
            tag: dw::DW_TAG_structure_type.0,
            name: "S".to_string(),
            base: None,
            dims: Vec::new(),
            members: vec![DebugMember {
                name: "k".to_string(),
                ty: Some(int_id),
                offset_bits: 0,
            }],
            size_bits: 32,
        });
        let e = module.add_debug_type(DebugType::Composite {
            tag: dw::DW_TAG_enumeration_type.0,
            name: "E".to_string(),
            base: None,
            dims: Vec::new(),
            members: Vec::new(),
            size_bits: 32,
        });
        let ptr = module.add_debug_type(DebugType::Derived {
            tag: dw::DW_TAG_pointer_type.0,
            name: String::new(),
            base: Some(int_id),
        });
        assert_eq!(format_of(&module, Some(array)), 15);
        assert_eq!(format_of(&module, Some(strukt)), 17);
        assert_eq!(format_of(&module, Some(e)), 6);
        assert_eq!(format_of(&module, Some(ptr)), 13);
        assert_eq!(debug_type_name(&module, Some(ptr)), "pointer to int");
        assert_eq!(debug_type_name(&module, Some(array)), "array of int");
        assert_eq!(debug_type_name(&module, Some(strukt)), "struct S");
    }

    #[test]
    fn qualified_types_recurse_to_base() {
        let mut module = Module::new("t", "t.c");
        let dbl = module.add_debug_type(well_known::float("double", 64));
        let konst = module.add_debug_type(DebugType::Derived {
            tag: dw::DW_TAG_const_type.0,
            name: String::new(),
            base: Some(dbl),
        });
        let alias = module.add_debug_type(DebugType::Derived {
            tag: dw::DW_TAG_typedef.0,
            name: "real_t".to_string(),
            base: Some(konst),
        });
        assert_eq!(format_of(&module, Some(alias)), 1);
        assert_eq!(strip_qualifiers(&module, alias), dbl);
        assert_eq!(debug_type_name(&module, Some(alias)), "real_t");
        assert_eq!(debug_type_name(&module, Some(konst)), "const double");
        assert_eq!(format_specifier(&module, Some(alias)), "%.2lf\n");
    }

    #[test]
    fn inspectability_excludes_the_usual_suspects() {
        let mut module = Module::new("t", "t.c");
        let int_id = module.add_debug_type(well_known::signed_int("int", 32));
        let subroutine = module.add_debug_type(DebugType::Subroutine);
        let member = module.add_debug_type(DebugType::Derived {
            tag: dw::DW_TAG_member.0,
            name: "m".to_string(),
            base: Some(int_id),
        });
        let vla = module.add_debug_type(DebugType::Composite {
            tag: dw::DW_TAG_array_type.0,
            name: String::new(),
            base: Some(int_id),
            dims: vec![ElementCount::Dynamic("n".to_string())],
            members: Vec::new(),
            size_bits: 0,
        });
        let empty = module.add_debug_type(DebugType::Composite {
            tag: dw::DW_TAG_structure_type.0,
            name: "Fwd".to_string(),
            base: None,
            dims: Vec::new(),
            members: Vec::new(),
            size_bits: 0,
        });
        assert!(should_process(&module, Some(int_id)));
        assert!(should_process(&module, None));
        assert!(!should_process(&module, Some(subroutine)));
        assert!(!should_process(&module, Some(member)));
        assert!(!should_process(&module, Some(vla)));
        assert!(!should_process(&module, Some(empty)));
    }

    #[test]
    fn ir_type_names_follow_c_defaults() {
        let mut module = Module::new("t", "t.c");
        module.aggregates.insert(
            "Node".to_string(),
            Aggregate {
                name: Some("Node".to_string()),
                is_union: false,
                opaque: false,
                fields: vec![Ty::I32],
            },
        );
        module.aggregates.insert(
            "anon.0".to_string(),
            Aggregate {
                name: None,
                is_union: false,
                opaque: false,
                fields: vec![Ty::I32],
            },
        );
        assert_eq!(ir_type_name(&module, &Ty::I32), "int");
        assert_eq!(ir_type_name(&module, &Ty::I64), "long");
        assert_eq!(
            ir_type_name(&module, &Ty::ptr_to(Ty::Aggregate("Node".into()))),
            "pointer to struct Node"
        );
        assert_eq!(
            ir_type_name(&module, &Ty::Aggregate("anon.0".into())),
            OPAQUE_AGGREGATE_NAME
        );
    }
}
