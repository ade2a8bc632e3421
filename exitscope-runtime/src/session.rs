//! Runtime session: the state behind the injected entry points.
//!
//! The C ancestry of this runtime kept the type table, heap table and mode
//! bits in process-wide globals. Here they live in an explicit session
//! passed through every entry point; the ABI of the injected calls is
//! unchanged, only the receiver is explicit.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use exitscope_protocol::{read_table, RuntimeMode, TypeDescriptor};

use crate::fingerprint;
use crate::heap_table::HeapTable;
use crate::memory::Memory;
use crate::reporter::Reporter;
use crate::RuntimeError;

/// Loaded type table, heap table and mode bits for one instrumented
/// process.
#[derive(Debug)]
pub struct RuntimeSession {
    pub mode: RuntimeMode,
    pub types: Vec<TypeDescriptor>,
    pub heap: HeapTable,
}

impl RuntimeSession {
    /// Load the serialized type table and fix the usage mode. A missing
    /// table file is unrecoverable: the instrumented program cannot report
    /// anything without its type descriptors.
    pub fn open_type_table(
        path: &Path,
        size: usize,
        inspect_heap: bool,
        inspect_stack: bool,
        precise: bool,
    ) -> Result<Self, RuntimeError> {
        let file = File::open(path).map_err(|source| {
            error!(path = %path.display(), "cannot open type table file");
            RuntimeError::TypeTableMissing {
                path: PathBuf::from(path),
                source,
            }
        })?;
        let types = read_table(&mut BufReader::new(file), size)?;
        info!(
            path = %path.display(),
            size,
            inspect_heap,
            inspect_stack,
            precise,
            "type table loaded"
        );
        Ok(Self {
            mode: RuntimeMode {
                inspect_heap,
                inspect_stack,
                precise,
            },
            types,
            heap: HeapTable::new(),
        })
    }

    /// Session with an in-memory table, for tests and embedders.
    pub fn with_table(types: Vec<TypeDescriptor>, mode: RuntimeMode) -> Self {
        Self {
            mode,
            types,
            heap: HeapTable::new(),
        }
    }

    fn reporter<'a>(&'a mut self, mem: &'a dyn Memory, out: &'a mut dyn Write) -> Reporter<'a> {
        Reporter {
            types: &self.types,
            heap: &mut self.heap,
            mode: self.mode,
            mem,
            out,
        }
    }

    pub fn insert_heap_entry(&mut self, block: u64, count: i64, stride: i64, type_index: i32) {
        debug!(block, count, stride, type_index, "heap entry inserted");
        self.heap.insert(block, count, stride, type_index);
    }

    pub fn update_heap_entry_size(&mut self, block: u64, new_count: i64) {
        debug!(block, new_count, "heap entry resized");
        self.heap.update_size(block, new_count);
    }

    pub fn delete_heap_entry(&mut self, block: u64) {
        debug!(block, "heap entry marked freed");
        self.heap.mark_freed(block);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn inspect_pointer(
        &mut self,
        out: &mut dyn Write,
        mem: &dyn Memory,
        ptr: u64,
        type_index: i32,
        name: &str,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        self.reporter(mem, out)
            .inspect_pointer(ptr, type_index, name, fn_name, counter)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn inspect_struct(
        &mut self,
        out: &mut dyn Write,
        mem: &dyn Memory,
        ptr: u64,
        type_index: i32,
        name: &str,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        self.reporter(mem, out)
            .inspect_data(ptr, type_index, name, fn_name, counter)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn inspect_union(
        &mut self,
        out: &mut dyn Write,
        mem: &dyn Memory,
        ptr: u64,
        size: u64,
        name: &str,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        self.reporter(mem, out)
            .inspect_union(ptr, size, name, fn_name, counter)
    }

    pub fn inspect_entire_heap(
        &mut self,
        out: &mut dyn Write,
        mem: &dyn Memory,
        fn_name: &str,
        counter: i32,
    ) -> Result<(), RuntimeError> {
        self.reporter(mem, out).inspect_entire_heap(fn_name, counter)
    }

    pub fn compute_hashcode(
        &self,
        mem: &dyn Memory,
        ptr: u64,
        total: i64,
        step: i64,
        format: i32,
    ) -> i32 {
        fingerprint::hashcode(mem, ptr, total, step, format)
    }
}
