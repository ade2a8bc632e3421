//! Type descriptors and the serialized type-table file format.
//!
//! One record per indexed type. Wire layout, native endianness, fixed-size
//! fields:
//!
//! ```text
//! record       = name[129, NUL-padded]
//!              | field_count : i32
//!              | field_count × field_record   (structs)
//!              | 1           × field_record   (everything else)
//! field_record = name[129, NUL-padded] | format : i32 | offset : i32
//!              | base_type_index : i32
//! ```
//!
//! The `offset` of the synthetic single field is overloaded: element count
//! for arrays, size in bytes for unions, zero for scalars and pointers.

use std::io::{Read, Write};

use crate::ProtocolError;

/// Longest name stored without truncation.
pub const MAX_NAME_LEN: usize = 128;

/// On-the-wire size of a name field. One byte longer than [`MAX_NAME_LEN`]
/// to guarantee NUL termination of a maximal name.
pub const NAME_FIELD_LEN: usize = 129;

/// Sentinel index meaning "this value's type cannot be inspected".
pub const UNKNOWN_TYPE_INDEX: i32 = 50000;

/// One field of a type descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    pub name: String,
    pub format: i32,
    /// Byte offset within the parent for struct members; overloaded for
    /// synthetic fields (see module docs).
    pub offset: i32,
    pub base_type_index: i32,
}

/// A run-time reflection record for one source-level type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub fields: Vec<FieldRecord>,
}

impl TypeDescriptor {
    /// Descriptor for a non-struct type: one synthetic field.
    pub fn synthetic(name: String, format: i32, offset: i32, base_type_index: i32) -> Self {
        Self {
            name,
            fields: vec![FieldRecord {
                name: String::new(),
                format,
                offset,
                base_type_index,
            }],
        }
    }
}

/// Truncate a name to the wire limit, marking the cut with `...`.
pub fn truncate_name(name: &str) -> String {
    if name.len() > MAX_NAME_LEN {
        let mut cut = MAX_NAME_LEN - 3;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &name[..cut])
    } else {
        name.to_string()
    }
}

fn write_name<W: Write>(out: &mut W, name: &str) -> Result<(), ProtocolError> {
    let mut buf = [0u8; NAME_FIELD_LEN];
    let bytes = name.as_bytes();
    let len = bytes.len().min(MAX_NAME_LEN);
    buf[..len].copy_from_slice(&bytes[..len]);
    out.write_all(&buf)?;
    Ok(())
}

fn write_i32<W: Write>(out: &mut W, value: i32) -> Result<(), ProtocolError> {
    out.write_all(&value.to_ne_bytes())?;
    Ok(())
}

fn read_name<R: Read>(input: &mut R) -> Result<String, ProtocolError> {
    let mut buf = [0u8; NAME_FIELD_LEN];
    input.read_exact(&mut buf)?;
    let end = buf.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_LEN);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

fn read_i32<R: Read>(input: &mut R) -> Result<i32, ProtocolError> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_ne_bytes(buf))
}

/// Write one descriptor record.
pub fn write_descriptor<W: Write>(
    out: &mut W,
    descriptor: &TypeDescriptor,
) -> Result<(), ProtocolError> {
    write_name(out, &descriptor.name)?;
    write_i32(out, descriptor.fields.len() as i32)?;
    for field in &descriptor.fields {
        write_name(out, &field.name)?;
        write_i32(out, field.format)?;
        write_i32(out, field.offset)?;
        write_i32(out, field.base_type_index)?;
    }
    Ok(())
}

/// Read back `size` descriptor records.
///
/// Reads are fixed-size only; nothing beyond record arity is validated,
/// matching the loader this format was defined by.
pub fn read_table<R: Read>(input: &mut R, size: usize) -> Result<Vec<TypeDescriptor>, ProtocolError> {
    let mut table = Vec::with_capacity(size);
    for _ in 0..size {
        let name = read_name(input)?;
        let field_count = read_i32(input)?;
        if field_count < 0 {
            return Err(ProtocolError::MalformedTable(format!(
                "negative field count for type `{name}`"
            )));
        }
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let field_name = read_name(input)?;
            let format = read_i32(input)?;
            let offset = read_i32(input)?;
            let base_type_index = read_i32(input)?;
            fields.push(FieldRecord {
                name: field_name,
                format,
                offset,
                base_type_index,
            });
        }
        table.push(TypeDescriptor { name, fields });
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_table() -> Vec<TypeDescriptor> {
        vec![
            TypeDescriptor::synthetic("int".to_string(), 6, 0, 6),
            TypeDescriptor::synthetic("pointer to int".to_string(), 13, 0, 0),
            TypeDescriptor {
                name: "struct Node".to_string(),
                fields: vec![
                    FieldRecord {
                        name: "value".to_string(),
                        format: 6,
                        offset: 0,
                        base_type_index: 0,
                    },
                    FieldRecord {
                        name: "next".to_string(),
                        format: 13,
                        offset: 8,
                        base_type_index: 2,
                    },
                ],
            },
            TypeDescriptor::synthetic("array of int".to_string(), 15, 10, 0),
        ]
    }

    #[test]
    fn table_round_trips() {
        let table = sample_table();
        let mut bytes = Vec::new();
        for descriptor in &table {
            write_descriptor(&mut bytes, descriptor).unwrap();
        }
        let restored = read_table(&mut Cursor::new(bytes), table.len()).unwrap();
        assert_eq!(restored, table);
    }

    #[test]
    fn record_size_is_fixed() {
        let mut bytes = Vec::new();
        write_descriptor(
            &mut bytes,
            &TypeDescriptor::synthetic("int".to_string(), 6, 0, 6),
        )
        .unwrap();
        // name + field_count + one field record
        assert_eq!(bytes.len(), NAME_FIELD_LEN + 4 + (NAME_FIELD_LEN + 12));
    }

    #[test]
    fn long_names_truncate_with_ellipsis() {
        let name = "x".repeat(200);
        let cut = truncate_name(&name);
        assert_eq!(cut.len(), MAX_NAME_LEN);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_name("short"), "short");
    }

    #[test]
    fn truncated_read_reports_io_error() {
        let mut bytes = Vec::new();
        write_descriptor(
            &mut bytes,
            &TypeDescriptor::synthetic("int".to_string(), 6, 0, 6),
        )
        .unwrap();
        bytes.truncate(bytes.len() - 1);
        assert!(read_table(&mut Cursor::new(bytes), 1).is_err());
    }
}
