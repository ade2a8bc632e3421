//! Wire contract between the exitscope pass and its runtime.
//!
//! Defines the format codes, the type-descriptor model, the fixed-record
//! binary layout of the serialized type table, the usage-mode bits and the
//! injected runtime symbol names. Nothing here depends on the IR or on the
//! runtime; both sides depend on this crate.

mod descriptor;
mod format;
mod mode;

pub mod symbols;

pub use descriptor::{
    read_table, truncate_name, write_descriptor, FieldRecord, TypeDescriptor, MAX_NAME_LEN,
    NAME_FIELD_LEN, UNKNOWN_TYPE_INDEX,
};
pub use format::FormatCode;
pub use mode::{InstrumentOptions, RuntimeMode};

/// Errors arising while encoding or decoding protocol data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed type table: {0}")]
    MalformedTable(String),
}

/// Derive the type-table file name from a source file path: strip the
/// extension, append `_TypeTable.bin`.
pub fn type_table_file_name(source_file: &str) -> String {
    let base = match source_file.rfind('.') {
        Some(dot) => &source_file[..dot],
        None => source_file,
    };
    format!("{base}_TypeTable.bin")
}

/// Derive the transcript file name from a source file path.
pub fn output_file_name(source_file: &str) -> String {
    format!("{source_file}_Output")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_file_name_strips_extension() {
        assert_eq!(type_table_file_name("prog.c"), "prog_TypeTable.bin");
        assert_eq!(type_table_file_name("noext"), "noext_TypeTable.bin");
        assert_eq!(type_table_file_name("a.b.c"), "a.b_TypeTable.bin");
    }

    #[test]
    fn output_file_name_keeps_extension() {
        assert_eq!(output_file_name("prog.c"), "prog.c_Output");
    }
}
