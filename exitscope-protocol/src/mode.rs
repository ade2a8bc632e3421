//! Usage-mode settings shared between the pass and the runtime.

/// Pass-side instrumentation options, one per command-line flag.
///
/// All default to off. With no region flag set, every memory region is
/// inspected; setting any region flag restricts inspection to the enabled
/// set. Heap inspection requires following pointers, so it implies precise
/// mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstrumentOptions {
    /// Instrument only the `main` function.
    pub only_main: bool,
    /// Inspect variables on function stacks.
    pub inspect_stack: bool,
    /// Inspect variables pointing into the heap.
    pub inspect_heap: bool,
    /// Inspect static variables.
    pub inspect_static: bool,
    /// Dereference pointers and follow them through the heap table.
    pub precise: bool,
    /// Dump every live heap entry at each observation point.
    pub full_heap: bool,
}

impl InstrumentOptions {
    /// Whether any region filter is active.
    pub fn mem_filter(&self) -> bool {
        self.inspect_stack || self.inspect_heap || self.inspect_static
    }

    /// Precise mode, accounting for the heap implication.
    pub fn effective_precise(&self) -> bool {
        self.precise || self.inspect_heap
    }
}

/// Mode bits the runtime operates under, set once by the type-table open
/// call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeMode {
    pub inspect_heap: bool,
    pub inspect_stack: bool,
    pub precise: bool,
}

impl RuntimeMode {
    pub fn mem_filter(&self) -> bool {
        self.inspect_heap || self.inspect_stack
    }
}
