//! Runtime library of the exitscope instrumenter.
//!
//! The instrumented program calls into this crate through the entry points
//! named in `exitscope_protocol::symbols`: it loads the serialized type
//! table once at startup, keeps the heap table current around every
//! allocation primitive, and at each observation point renders variables
//! into the transcript via the reporter.
//!
//! All memory access goes through the [`Memory`] trait, so the runtime is
//! agnostic to whether it observes a VM image or a plain byte buffer.

mod fingerprint;
mod heap_table;
mod memory;
mod reporter;
mod session;

pub use fingerprint::{hashcode, hashcode_1d};
pub use heap_table::{HeapData, HeapEntry, HeapTable};
pub use memory::{BufferMemory, Memory};
pub use reporter::{render_scalar, Reporter};
pub use session::RuntimeSession;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("cannot open type table file {path}: {source}")]
    TypeTableMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(#[from] exitscope_protocol::ProtocolError),
    #[error("transcript I/O error: {0}")]
    Io(#[from] std::io::Error),
}
