//! Execution substrate for instrumented modules.
//!
//! The VM gives a rewritten module the environment the instrumentation
//! assumes: a process-like address space with an `etext` boundary, the C
//! allocation primitives (with address recycling), a stdio subset, and the
//! `exitscope_*` runtime entry points dispatched into
//! [`exitscope_runtime::RuntimeSession`]. Running an instrumented module
//! produces its transcript under the VM's working directory.

mod machine;
mod memory;

pub use machine::{Scalar, Vm};
pub use memory::{VmMemory, ETEXT, HEAP_BASE, STACK_BASE, STATIC_BASE, TEXT_BASE};

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("program has no main function")]
    MissingMain,
    #[error("call to unknown function {0}")]
    UnknownFunction(String),
    #[error("invalid memory access at {addr:#x} ({len} bytes)")]
    InvalidMemoryAccess { addr: u64, len: usize },
    #[error("integer division by zero")]
    DivisionByZero,
    #[error("invalid file handle")]
    BadFileHandle,
    #[error("runtime entry point called before the type table was opened")]
    NoSession,
    #[error("step limit exceeded")]
    StepLimitExceeded,
    #[error("memory limit exceeded")]
    OutOfMemory,
    #[error("malformed module: {0}")]
    Malformed(String),
    #[error("runtime error: {0}")]
    Runtime(#[from] exitscope_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
