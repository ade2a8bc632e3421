//! Names of the runtime entry points the pass injects calls to.
//!
//! These symbols are the ABI between instrumented modules and the runtime
//! library; renaming one breaks every previously instrumented module.

pub const OPEN_TYPE_TABLE: &str = "exitscope_open_type_table";
pub const INSERT_HEAP_ENTRY: &str = "exitscope_insert_heap_entry";
pub const UPDATE_HEAP_ENTRY_SIZE: &str = "exitscope_update_heap_entry_size";
pub const DELETE_HEAP_ENTRY: &str = "exitscope_delete_heap_entry";
pub const INSPECT_POINTER: &str = "exitscope_inspect_pointer";
pub const INSPECT_STRUCT: &str = "exitscope_inspect_struct";
pub const INSPECT_UNION: &str = "exitscope_inspect_union";
pub const INSPECT_ENTIRE_HEAP: &str = "exitscope_inspect_entire_heap";
pub const COMPUTE_HASHCODE: &str = "exitscope_compute_hashcode";

/// Every runtime symbol, for "already instrumented?" checks.
pub const ALL: &[&str] = &[
    OPEN_TYPE_TABLE,
    INSERT_HEAP_ENTRY,
    UPDATE_HEAP_ENTRY_SIZE,
    DELETE_HEAP_ENTRY,
    INSPECT_POINTER,
    INSPECT_STRUCT,
    INSPECT_UNION,
    INSPECT_ENTIRE_HEAP,
    COMPUTE_HASHCODE,
];

/// Shared prefix of all injected symbols.
pub const PREFIX: &str = "exitscope_";
