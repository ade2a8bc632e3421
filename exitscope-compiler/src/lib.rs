//! The exitscope instrumentation pass.
//!
//! Given an IR module with debug metadata whose functions each have a
//! single exit block, the pass rewrites the module so that, when executed
//! against the exitscope runtime, it writes a transcript of the values of
//! source-level variables at every function exit.
//!
//! The pass never raises on user input: unknown types degrade to the
//! non-inspectable format, functions without a unique return block are
//! skipped with a diagnostic. Only a missing `main` or an I/O failure while
//! writing the type table aborts the pass.

pub mod instrument;
pub mod resolver;
pub mod type_format;
pub mod type_table;

pub use instrument::{run, PassOutput};
pub use resolver::{Resolver, StackMap, VariableTrace};
pub use type_table::TypeTableBuilder;

// Re-export the option set so callers need not depend on the protocol
// crate directly.
pub use exitscope_protocol::InstrumentOptions;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("program has no main function")]
    MissingMain,
    #[error("module already references runtime symbols; re-instrumentation is not supported")]
    AlreadyInstrumented,
    #[error("cannot write type table: {0}")]
    TypeTable(#[from] exitscope_protocol::ProtocolError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// Counters accumulated over one run of the pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Source variables inspected.
    pub total_vars: u64,
    /// Variables whose live range was extended with a merge node.
    pub extended_vars: u64,
    /// Variables shadowed in a stack slot.
    pub shadowed_vars: u64,
    /// Allocation-primitive calls intercepted.
    pub heap_operations: u64,
    /// Functions instrumented.
    pub functions_instrumented: u64,
    /// Variables whose trace mixes differently-typed definitions.
    pub diff_typed_defs: u64,
}
