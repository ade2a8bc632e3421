//! The pass driver: walks each function, accumulates debug bindings,
//! intercepts allocation primitives, and materializes one observation
//! point at every function's unique return block.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use gimli::constants as dw;
use tracing::{debug, info, warn};

use exitscope_ir::{
    BinOp, BlockId, Builder, DebugType, DebugTypeId, DebugVariable, DebugVariableId, ElementCount,
    FunctionId, Global, GlobalId, GlobalInit, InsertPoint, Inst, InstId, Module, Ty, Value,
    VariableKind,
};
use exitscope_protocol::{
    output_file_name, symbols, type_table_file_name, InstrumentOptions, UNKNOWN_TYPE_INDEX,
};

use crate::resolver::{record_binding, Resolver, StackMap, VariableTrace};
use crate::type_format::{format_of, format_specifier, strip_qualifiers};
use crate::type_table::TypeTableBuilder;
use crate::{CompileError, PassStats, Result};

/// Names of the allocation primitives the pass intercepts.
const HEAP_FUNCTIONS: &[&str] = &["malloc", "realloc", "calloc", "free"];

/// What one run of the pass produced.
#[derive(Debug)]
pub struct PassOutput {
    pub type_table_path: PathBuf,
    pub table_size: usize,
    pub stats: PassStats,
}

/// Instrument `module` in place. The serialized type table is written into
/// `table_dir`; the injected load call carries that path.
pub fn run(
    module: &mut Module,
    options: &InstrumentOptions,
    table_dir: &Path,
) -> Result<PassOutput> {
    Instrumenter::new(module, *options).run(table_dir)
}

struct Instrumenter<'m> {
    module: &'m mut Module,
    options: InstrumentOptions,
    precise: bool,
    mem_filter: bool,
    table: TypeTableBuilder,
    stats: PassStats,
    static_map: BTreeMap<String, (DebugVariableId, GlobalId)>,
    output_global: Option<GlobalId>,
    first_inspection: bool,
    stack_map: StackMap,
    shadow: HashMap<String, InstId>,
}

impl<'m> Instrumenter<'m> {
    fn new(module: &'m mut Module, options: InstrumentOptions) -> Self {
        let table = TypeTableBuilder::build(module);
        let precise = options.effective_precise();
        let mem_filter = options.mem_filter();
        Self {
            module,
            options,
            precise,
            mem_filter,
            table,
            stats: PassStats::default(),
            static_map: BTreeMap::new(),
            output_global: None,
            first_inspection: true,
            stack_map: StackMap::new(),
            shadow: HashMap::new(),
        }
    }

    fn run(mut self, table_dir: &Path) -> Result<PassOutput> {
        info!(module = %self.module.name, "instrumenting module");
        if self.already_instrumented() {
            return Err(CompileError::AlreadyInstrumented);
        }
        let main = self
            .module
            .function_by_name("main")
            .filter(|&f| {
                !self.module.functions[f].is_declaration && self.module.functions[f].entry.is_some()
            })
            .ok_or(CompileError::MissingMain)?;

        // Statics are enumerated before anything is injected, so counters
        // and the output handle never count as inspectable globals.
        self.collect_statics();

        let open_store = self.open_output_file(main);

        let table_path = table_dir.join(type_table_file_name(&self.module.source_file));
        let table_size = {
            let file = File::create(&table_path)?;
            let mut out = BufWriter::new(file);
            let written = self.table.write(&*self.module, &mut out)?;
            out.flush()?;
            written
        };
        self.emit_open_type_table(main, open_store, &table_path, table_size);

        let fids: Vec<FunctionId> = self.module.functions.ids().collect();
        for fid in fids {
            let function = &self.module.functions[fid];
            if function.is_declaration || function.entry.is_none() {
                continue;
            }
            let name = function.name.clone();
            if self.options.only_main && name != "main" {
                // Pointer tracking needs the heap table regardless of the
                // inspection granularity.
                if self.precise || self.options.full_heap {
                    self.instrument_only_heap(fid);
                }
                continue;
            }
            self.instrument_function(fid);
            self.first_inspection = true;
        }

        info!(stats = ?self.stats, "instrumentation done");
        Ok(PassOutput {
            type_table_path: table_path,
            table_size,
            stats: self.stats,
        })
    }

    fn already_instrumented(&self) -> bool {
        for (_, function) in self.module.functions.iter() {
            for (_, node) in function.insts.iter() {
                if let Inst::Call { callee, .. } = &node.inst {
                    if callee.starts_with(symbols::PREFIX) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Whether `callee` is an external service rather than a user-defined
    /// function in this module.
    fn is_extern_target(&self, callee: &str) -> bool {
        match self.module.function_by_name(callee) {
            Some(f) => self.module.functions[f].is_declaration,
            None => true,
        }
    }

    fn value_ty(&self, fid: FunctionId, value: &Value) -> Ty {
        let module = &*self.module;
        module.functions[fid].value_ty(module, value)
    }

    fn collect_statics(&mut self) {
        if self.mem_filter && !self.options.inspect_static {
            return;
        }
        let mut found = Vec::new();
        for (gid, global) in self.module.globals.iter() {
            if global.constant || global.init.is_none() {
                continue;
            }
            let var_id = match global.debug {
                Some(var_id) => var_id,
                None => continue,
            };
            found.push((self.module.debug_variables[var_id].name.clone(), var_id, gid));
        }
        for (name, var_id, gid) in found {
            self.static_map.insert(name, (var_id, gid));
            self.stats.total_vars += 1;
        }
    }

    /// Create the global output handle and open it at the top of `main`,
    /// past any leading stack slots. Returns the store instruction the
    /// type-table load call is anchored after.
    fn open_output_file(&mut self, main: FunctionId) -> InstId {
        let out_name = output_file_name(&self.module.source_file);
        let gid = self.module.add_global(Global {
            name: out_name.clone(),
            ty: Ty::ptr_to(Ty::I8),
            init: Some(GlobalInit::Zero),
            constant: false,
            debug: None,
        });
        self.output_global = Some(gid);

        let entry = self.module.functions[main]
            .entry
            .expect("main has an entry block");
        let point = {
            let function = &self.module.functions[main];
            function.blocks[entry]
                .insts
                .iter()
                .find(|&&i| !matches!(function.insts[i].inst, Inst::Alloca { .. }))
                .map(|&i| InsertPoint::Before(i))
                .unwrap_or(InsertPoint::BlockEnd)
        };
        let mut b = Builder::at(self.module, main, entry, point);
        let name_str = b.cstr(&out_name);
        let mode = b.cstr("w");
        let handle = b.call("fopen", Ty::ptr_to(Ty::I8), vec![name_str, mode]);
        b.store(Value::Inst(handle), Value::Global(gid))
    }

    fn emit_open_type_table(
        &mut self,
        main: FunctionId,
        after: InstId,
        table_path: &Path,
        table_size: usize,
    ) {
        let block = self.module.functions[main].block_of(after);
        let mut b = Builder::at(self.module, main, block, InsertPoint::After(after));
        let path_str = b.cstr(&table_path.to_string_lossy());
        let heap = Value::i32(self.options.inspect_heap as i32);
        let stack = Value::i32(self.options.inspect_stack as i32);
        let precise = Value::i32(self.precise as i32);
        b.call(
            symbols::OPEN_TYPE_TABLE,
            Ty::Void,
            vec![
                path_str,
                Value::i32(table_size as i32),
                heap,
                stack,
                precise,
            ],
        );
    }

    /// Per-function call counter: a module global incremented on entry.
    fn create_function_counter(&mut self, fid: FunctionId) -> Value {
        let fn_name = self.module.functions[fid].name.clone();
        let gid = self.module.add_global(Global {
            name: format!("{fn_name}_counter"),
            ty: Ty::I32,
            init: Some(GlobalInit::Zero),
            constant: false,
            debug: None,
        });
        let entry = self.module.functions[fid]
            .entry
            .expect("instrumented function has an entry block");
        let mut b = Builder::at(self.module, fid, entry, InsertPoint::FirstNonPhi);
        let load = b.load(Value::Global(gid), Ty::I32);
        let inc = b.bin(BinOp::Add, Ty::I32, Value::Inst(load), Value::i32(1));
        b.store(Value::Inst(inc), Value::Global(gid));
        Value::Inst(inc)
    }

    fn instrument_function(&mut self, fid: FunctionId) {
        let fn_name = self.module.functions[fid].name.clone();
        debug!(function = %fn_name, "instrumenting function");
        self.stats.functions_instrumented += 1;

        let counter = if fn_name == "main" {
            Value::i32(1)
        } else {
            self.create_function_counter(fid)
        };
        self.stack_map = StackMap::new();
        self.shadow = HashMap::new();

        let snapshot: Vec<InstId> = {
            let function = &self.module.functions[fid];
            function
                .block_ids()
                .flat_map(|b| function.blocks[b].insts.clone())
                .collect()
        };
        for inst_id in snapshot {
            let inst = self.module.functions[fid].insts[inst_id].inst.clone();
            match inst {
                Inst::DbgValue { .. } | Inst::DbgDeclare { .. } => {
                    record_binding(&*self.module, fid, &mut self.stack_map, inst_id);
                }
                Inst::Call { callee, .. } => {
                    if !self.is_extern_target(&callee) {
                        continue;
                    }
                    if HEAP_FUNCTIONS.contains(&callee.as_str()) {
                        self.handle_heap_operation(fid, inst_id);
                    } else if callee == "exit" {
                        // Observation happens right before the program
                        // halts, and the transcript is closed with it.
                        let block = self.module.functions[fid].block_of(inst_id);
                        let file = self.load_output_handle(fid, block, Some(inst_id));
                        self.create_inspection_point(
                            fid,
                            block,
                            Some(inst_id),
                            file.clone(),
                            &counter,
                            &fn_name,
                        );
                        self.emit_call(
                            fid,
                            block,
                            Some(inst_id),
                            "fclose",
                            Ty::I32,
                            vec![file],
                        );
                    }
                }
                _ => {}
            }
        }

        let exit_block = match self.find_return_block(fid) {
            Some(block) => block,
            None => {
                warn!(function = %fn_name, "could not find the return block, skipping");
                self.stack_map = StackMap::new();
                return;
            }
        };

        let file = self.load_output_handle(fid, exit_block, None);
        self.create_inspection_point(fid, exit_block, None, file.clone(), &counter, &fn_name);
        if self.options.full_heap {
            let name_str = Value::Str(self.module.intern_string(&fn_name));
            self.emit_call(
                fid,
                exit_block,
                None,
                symbols::INSPECT_ENTIRE_HEAP,
                Ty::Void,
                vec![file.clone(), name_str, counter.clone()],
            );
        }
        if fn_name == "main" {
            self.emit_call(fid, exit_block, None, "fclose", Ty::I32, vec![file]);
        }

        self.stack_map = StackMap::new();
    }

    /// Heap-table maintenance in functions that are otherwise left alone.
    fn instrument_only_heap(&mut self, fid: FunctionId) {
        let snapshot: Vec<InstId> = {
            let function = &self.module.functions[fid];
            function
                .block_ids()
                .flat_map(|b| function.blocks[b].insts.clone())
                .collect()
        };
        for inst_id in snapshot {
            let inst = self.module.functions[fid].insts[inst_id].inst.clone();
            if let Inst::Call { callee, .. } = inst {
                if HEAP_FUNCTIONS.contains(&callee.as_str()) && self.is_extern_target(&callee) {
                    self.handle_heap_operation(fid, inst_id);
                }
            }
        }
    }

    fn find_return_block(&self, fid: FunctionId) -> Option<BlockId> {
        let function = &self.module.functions[fid];
        function
            .block_ids()
            .find(|&b| function.blocks[b].returns())
    }

    fn load_output_handle(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
    ) -> Value {
        let gid = self.output_global.expect("output handle created in main");
        let point = insert_point(before);
        let load = Builder::at(self.module, fid, block, point)
            .load(Value::Global(gid), Ty::ptr_to(Ty::I8));
        Value::Inst(load)
    }

    fn emit_call(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        callee: &str,
        ret: Ty,
        args: Vec<Value>,
    ) -> InstId {
        Builder::at(self.module, fid, block, insert_point(before)).call(callee, ret, args)
    }

    /// Update the heap table around one allocation-primitive call.
    fn handle_heap_operation(&mut self, fid: FunctionId, call: InstId) {
        let (callee, args, ret_ty) = match &self.module.functions[fid].insts[call].inst {
            Inst::Call { callee, args, ret } => (callee.clone(), args.clone(), ret.clone()),
            _ => return,
        };
        let block = self.module.functions[fid].block_of(call);

        if callee == "free" {
            let ptr = match args.first() {
                Some(ptr) => ptr.clone(),
                None => return,
            };
            let mut b = Builder::at(self.module, fid, block, InsertPoint::After(call));
            b.call(symbols::DELETE_HEAP_ENTRY, Ty::Void, vec![ptr]);
            self.stats.heap_operations += 1;
            return;
        }

        // The raw allocation returns a byte pointer; when the program
        // immediately casts it, the cast target names the actual type of
        // the new block.
        let heap_ty = {
            let function = &self.module.functions[fid];
            let mut next = function.next_in_block(call);
            while let Some(n) = next {
                if function.insts[n].inst.is_debug_binding() {
                    next = function.next_in_block(n);
                } else {
                    break;
                }
            }
            match next.map(|n| &function.insts[n].inst) {
                Some(Inst::Cast { value, to })
                    if *value == Value::Inst(call) && to.is_pointer() =>
                {
                    to.clone()
                }
                _ => ret_ty.clone(),
            }
        };
        let allocated = heap_ty.pointee().cloned().unwrap_or(Ty::I8);
        let type_size = self.module.layout().size_of(&allocated);
        if type_size == 0 {
            warn!(%callee, "cannot size allocated type, skipping heap operation");
            return;
        }
        let bytes = match if callee == "realloc" {
            args.get(1)
        } else {
            args.first()
        } {
            Some(bytes) => bytes.clone(),
            None => return,
        };

        let type_index = if callee == "realloc" {
            0
        } else {
            let index = self.table.index_for_ir_type(&*self.module, &allocated);
            if index == UNKNOWN_TYPE_INDEX {
                return;
            }
            index
        };

        let mut b = Builder::at(self.module, fid, block, InsertPoint::After(call));
        // Fold the element count when the byte count is a constant.
        let quant = match &bytes {
            Value::ConstInt { value, .. } => Value::i64(value / type_size as i64),
            _ => Value::Inst(b.udiv(Ty::I64, bytes, Value::i64(type_size as i64))),
        };
        let ptr = if ret_ty == Ty::ptr_to(Ty::I8) {
            Value::Inst(call)
        } else {
            Value::Inst(b.cast(Value::Inst(call), Ty::ptr_to(Ty::I8)))
        };
        if callee == "realloc" {
            b.call(
                symbols::UPDATE_HEAP_ENTRY_SIZE,
                Ty::Void,
                vec![ptr, quant],
            );
        } else {
            b.call(
                symbols::INSERT_HEAP_ENTRY,
                Ty::Void,
                vec![ptr, quant.clone(), quant, Value::i32(type_index)],
            );
        }
        self.stats.heap_operations += 1;
    }

    /// Emit the reporter calls for every tracked variable, locals first,
    /// then statics, honoring the region filter.
    fn create_inspection_point(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        file: Value,
        counter: &Value,
        fn_name: &str,
    ) {
        debug!(function = fn_name, "creating inspection point");

        let locals: Vec<(String, VariableTrace)> = self
            .stack_map
            .iter()
            .map(|(name, trace)| (name.clone(), trace.clone()))
            .collect();
        for (name, trace) in locals {
            // With a region filter excluding both heap and stack there is
            // no local variable left to report.
            if self.mem_filter && !self.options.inspect_heap && !self.options.inspect_stack {
                break;
            }
            let var = self.module.debug_variables[trace.variable].clone();
            if var.artificial && var.kind == VariableKind::Local {
                continue;
            }
            if self.is_subroutine(var.ty) {
                continue;
            }
            let var_ty = var.ty.map(|t| strip_qualifiers(&*self.module, t));
            let is_pointer = matches!(
                var_ty.map(|t| &self.module.debug_types[t]),
                Some(DebugType::Derived { tag, .. }) if *tag == dw::DW_TAG_pointer_type.0
            );
            if self.mem_filter && !self.options.inspect_stack && !is_pointer {
                continue;
            }
            debug!(variable = %name, "inspecting variable");
            let def = {
                let mut resolver = Resolver::new(self.module, fid);
                resolver.valid_def(&trace, block, &mut self.shadow, &mut self.stats)
            };
            if self.first_inspection && var.kind == VariableKind::Local {
                self.stats.total_vars += 1;
            }
            self.inspect_variable(fid, block, before, &var, var_ty, def, &file, counter, fn_name);
        }

        if self.mem_filter && !self.options.inspect_static {
            self.first_inspection = false;
            return;
        }
        let statics: Vec<(DebugVariableId, GlobalId)> =
            self.static_map.values().copied().collect();
        for (var_id, gid) in statics {
            let var = self.module.debug_variables[var_id].clone();
            if self.is_subroutine(var.ty) {
                continue;
            }
            let var_ty = var.ty.map(|t| strip_qualifiers(&*self.module, t));
            debug!(variable = %var.name, "inspecting static variable");
            self.inspect_variable(
                fid,
                block,
                before,
                &var,
                var_ty,
                Value::Global(gid),
                &file,
                counter,
                fn_name,
            );
        }
        self.first_inspection = false;
    }

    fn is_subroutine(&self, ty: Option<DebugTypeId>) -> bool {
        matches!(
            ty.map(|t| &self.module.debug_types[t]),
            Some(DebugType::Subroutine)
        )
    }

    /// Dispatch on the variable's source-level type.
    #[allow(clippy::too_many_arguments)]
    fn inspect_variable(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        var: &DebugVariable,
        var_ty: Option<DebugTypeId>,
        def: Value,
        file: &Value,
        counter: &Value,
        fn_name: &str,
    ) {
        let node = match var_ty {
            Some(t) => self.module.debug_types[t].clone(),
            None => {
                self.inspect_scalar(fid, block, before, var, def, file, counter, fn_name, false);
                return;
            }
        };
        match node {
            DebugType::Basic { .. } => {
                self.inspect_scalar(fid, block, before, var, def, file, counter, fn_name, false);
            }
            DebugType::Derived { tag, base, .. } if tag == dw::DW_TAG_pointer_type.0 => {
                // Function pointers are out of scope.
                if self.is_subroutine(base) {
                    return;
                }
                self.inspect_pointer_var(fid, block, before, var, def, file, counter, fn_name);
            }
            DebugType::Composite {
                tag,
                base,
                dims,
                size_bits,
                ..
            } => {
                if tag == dw::DW_TAG_union_type.0 {
                    self.inspect_union_var(
                        fid, block, before, var, def, size_bits, file, counter, fn_name,
                    );
                } else if tag == dw::DW_TAG_structure_type.0 {
                    self.inspect_struct_var(fid, block, before, var, def, file, counter, fn_name);
                } else if tag == dw::DW_TAG_array_type.0 {
                    let element_is_basic = matches!(
                        base.map(|b| &self.module.debug_types[b]),
                        Some(DebugType::Basic { .. })
                    );
                    if element_is_basic {
                        self.inspect_array_var(
                            fid, block, before, var, def, base, &dims, size_bits, file, counter,
                            fn_name,
                        );
                    } else {
                        warn!(variable = %var.name, "not inspecting non-scalar arrays");
                    }
                } else if tag == dw::DW_TAG_enumeration_type.0 {
                    self.inspect_scalar(
                        fid, block, before, var, def, file, counter, fn_name, false,
                    );
                }
            }
            _ => {}
        }
    }

    fn scope_of(&self, var: &DebugVariable, fn_name: &str) -> String {
        if var.kind == VariableKind::Global {
            format!("(Static) {fn_name}")
        } else {
            var.scope.clone()
        }
    }

    /// Load through every pointer level so the reported value is the
    /// scalar itself, whether the definition was an SSA value, a stack
    /// slot or a global.
    fn load_fully(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        def: Value,
    ) -> Value {
        let mut def = def;
        loop {
            let ty = self.value_ty(fid, &def);
            match ty.pointee() {
                Some(inner) => {
                    let inner = inner.clone();
                    let load = Builder::at(self.module, fid, block, insert_point(before))
                        .load(def, inner);
                    def = Value::Inst(load);
                }
                None => return def,
            }
        }
    }

    /// Load through multi-level pointers, keeping one level: aggregate
    /// reporting wants the address of the data, not the data.
    fn peel_to_single_pointer(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        def: Value,
    ) -> Value {
        let mut def = def;
        loop {
            let ty = self.value_ty(fid, &def);
            match ty.pointee() {
                Some(inner) if inner.is_pointer() => {
                    let inner = inner.clone();
                    let load = Builder::at(self.module, fid, block, insert_point(before))
                        .load(def, inner);
                    def = Value::Inst(load);
                }
                _ => return def,
            }
        }
    }

    fn cast_to_byte_ptr(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        def: Value,
    ) -> Value {
        if self.value_ty(fid, &def) == Ty::ptr_to(Ty::I8) {
            def
        } else {
            let cast = Builder::at(self.module, fid, block, insert_point(before))
                .cast(def, Ty::ptr_to(Ty::I8));
            Value::Inst(cast)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn inspect_scalar(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        var: &DebugVariable,
        def: Value,
        file: &Value,
        counter: &Value,
        fn_name: &str,
        scalarized: bool,
    ) {
        let mut def = self.load_fully(fid, block, before, def);
        let spec = format_specifier(&*self.module, var.ty);
        let scope = self.scope_of(var, fn_name);
        let text = format!(
            "{} {} %d{} : {}",
            var.name,
            scope,
            if scalarized { " (scalarized)" } else { "" },
            spec
        );
        // Single-precision values widen to double before printing.
        if spec == "%.2f\n" {
            let cast =
                Builder::at(self.module, fid, block, insert_point(before)).cast(def, Ty::F64);
            def = Value::Inst(cast);
        }
        let mut b = Builder::at(self.module, fid, block, insert_point(before));
        let fmt = b.cstr(&text);
        b.call(
            "fprintf",
            Ty::I32,
            vec![file.clone(), fmt, counter.clone(), def],
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn inspect_pointer_var(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        var: &DebugVariable,
        def: Value,
        file: &Value,
        counter: &Value,
        fn_name: &str,
    ) {
        // A stack slot or a global holds the pointer; read it out first.
        let is_slot = match &def {
            Value::Global(_) => true,
            Value::Inst(i) => matches!(
                self.module.functions[fid].insts[*i].inst,
                Inst::Alloca { .. }
            ),
            _ => false,
        };
        let mut def = def;
        if is_slot {
            let pointee = match self.value_ty(fid, &def).pointee() {
                Some(inner) => inner.clone(),
                None => return,
            };
            let load =
                Builder::at(self.module, fid, block, insert_point(before)).load(def, pointee);
            def = Value::Inst(load);
        }

        let final_ty = self.value_ty(fid, &def);
        let pointee = final_ty.pointee().cloned().unwrap_or(final_ty);
        let type_index = self.table.index_for_ir_type(&*self.module, &pointee);
        if type_index == UNKNOWN_TYPE_INDEX {
            return;
        }

        let def = self.cast_to_byte_ptr(fid, block, before, def);
        let scope = self.scope_of(var, fn_name);
        let mut b = Builder::at(self.module, fid, block, insert_point(before));
        let name_str = b.cstr(&var.name);
        let scope_str = b.cstr(&scope);
        b.call(
            symbols::INSPECT_POINTER,
            Ty::Void,
            vec![
                file.clone(),
                def,
                Value::i32(type_index),
                name_str,
                scope_str,
                counter.clone(),
            ],
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn inspect_union_var(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        var: &DebugVariable,
        def: Value,
        size_bits: u64,
        file: &Value,
        counter: &Value,
        fn_name: &str,
    ) {
        let def = self.peel_to_single_pointer(fid, block, before, def);
        let def = self.cast_to_byte_ptr(fid, block, before, def);
        let scope = self.scope_of(var, fn_name);
        let mut b = Builder::at(self.module, fid, block, insert_point(before));
        let name_str = b.cstr(&var.name);
        let scope_str = b.cstr(&scope);
        b.call(
            symbols::INSPECT_UNION,
            Ty::Void,
            vec![
                file.clone(),
                def,
                Value::i64((size_bits / 8) as i64),
                name_str,
                scope_str,
                counter.clone(),
            ],
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn inspect_struct_var(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        var: &DebugVariable,
        def: Value,
        file: &Value,
        counter: &Value,
        fn_name: &str,
    ) {
        let def = self.peel_to_single_pointer(fid, block, before, def);
        let final_ty = self.value_ty(fid, &def);
        // A scalarized aggregate (the value, not its address) prints as a
        // scalar.
        let pointee = match final_ty.pointee() {
            Some(inner) => inner.clone(),
            None => {
                self.inspect_scalar(fid, block, before, var, def, file, counter, fn_name, true);
                return;
            }
        };
        let type_index = self.table.index_for_ir_type(&*self.module, &pointee);
        if type_index == UNKNOWN_TYPE_INDEX {
            return;
        }
        let def = self.cast_to_byte_ptr(fid, block, before, def);
        let scope = self.scope_of(var, fn_name);
        let mut b = Builder::at(self.module, fid, block, insert_point(before));
        let name_str = b.cstr(&var.name);
        let scope_str = b.cstr(&scope);
        b.call(
            symbols::INSPECT_STRUCT,
            Ty::Void,
            vec![
                file.clone(),
                def,
                Value::i32(type_index),
                name_str,
                scope_str,
                counter.clone(),
            ],
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn inspect_array_var(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        var: &DebugVariable,
        def: Value,
        element: Option<DebugTypeId>,
        dims: &[ElementCount],
        size_bits: u64,
        file: &Value,
        counter: &Value,
        fn_name: &str,
    ) {
        let def = self.peel_to_single_pointer(fid, block, before, def);
        if !self.value_ty(fid, &def).is_pointer() {
            self.inspect_scalar(fid, block, before, var, def, file, counter, fn_name, true);
            return;
        }

        // Total element count: statically from the type sizes when known,
        // otherwise computed at run time from the per-dimension counts.
        let element_bits = element
            .map(|e| self.module.debug_types[e].size_bits())
            .unwrap_or(0);
        let total = if size_bits > 0 && element_bits > 0 {
            Value::i64((size_bits / element_bits) as i64)
        } else {
            let mut acc = Value::i64(1);
            for dim in dims {
                let dim_value = self.dimension_value(fid, block, before, dim);
                let mul = Builder::at(self.module, fid, block, insert_point(before)).bin(
                    BinOp::Mul,
                    Ty::I64,
                    acc,
                    dim_value,
                );
                acc = Value::Inst(mul);
            }
            acc
        };
        // The traversal step is the size of the innermost dimension.
        let step = match dims.last() {
            Some(dim) => self.dimension_value(fid, block, before, dim),
            None => Value::i64(1),
        };

        let format = format_of(&*self.module, element);
        let def = self.cast_to_byte_ptr(fid, block, before, def);
        let hash = self.emit_call(
            fid,
            block,
            before,
            symbols::COMPUTE_HASHCODE,
            Ty::I32,
            vec![def, total, step, Value::i32(format)],
        );
        self.inspect_scalar(
            fid,
            block,
            before,
            var,
            Value::Inst(hash),
            file,
            counter,
            fn_name,
            false,
        );
    }

    /// Value of one array dimension: a constant, or the resolved current
    /// definition of the variable holding it.
    fn dimension_value(
        &mut self,
        fid: FunctionId,
        block: BlockId,
        before: Option<InstId>,
        dim: &ElementCount,
    ) -> Value {
        match dim {
            ElementCount::Const(count) => Value::i64(*count),
            ElementCount::Dynamic(name) => match self.stack_map.get(name).cloned() {
                Some(trace) => {
                    let def = {
                        let mut resolver = Resolver::new(self.module, fid);
                        resolver.valid_def(&trace, block, &mut self.shadow, &mut self.stats)
                    };
                    let def = self.load_fully(fid, block, before, def);
                    if self.value_ty(fid, &def) == Ty::I64 {
                        def
                    } else {
                        let cast = Builder::at(self.module, fid, block, insert_point(before))
                            .cast(def, Ty::I64);
                        Value::Inst(cast)
                    }
                }
                None => {
                    warn!(dimension = %name, "dimension variable not tracked, assuming 1");
                    Value::i64(1)
                }
            },
        }
    }
}

fn insert_point(before: Option<InstId>) -> InsertPoint {
    match before {
        Some(inst) => InsertPoint::Before(inst),
        None => InsertPoint::BlockEnd,
    }
}
