//! The interpreter proper: executes a module's `main`, providing the
//! allocation primitives, a C-stdio subset and the runtime entry points as
//! external services.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use exitscope_ir::{
    BinOp, BlockId, FunctionId, GlobalInit, Inst, InstId, Module, Terminator, Ty, Value,
};
use exitscope_protocol::symbols;
use exitscope_runtime::{hashcode, Memory, RuntimeSession};

use crate::memory::VmMemory;
use crate::ExecError;

/// Synthetic FILE* values returned by `fopen`.
const FILE_BASE: u64 = 0xF11E_0000;

const DEFAULT_STEP_LIMIT: u64 = 50_000_000;

/// A register value: integers and pointers share the `Int` representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn as_int(self) -> i64 {
        match self {
            Scalar::Int(v) => v,
            Scalar::Float(v) => v as i64,
        }
    }

    fn as_addr(self) -> u64 {
        self.as_int() as u64
    }

    fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }

    fn truthy(self) -> bool {
        match self {
            Scalar::Int(v) => v != 0,
            Scalar::Float(v) => v != 0.0,
        }
    }
}

/// One running instance of a module.
pub struct Vm<'m> {
    module: &'m Module,
    mem: VmMemory,
    session: Option<RuntimeSession>,
    files: Vec<Option<File>>,
    globals: Vec<u64>,
    strings: Vec<u64>,
    workdir: PathBuf,
    steps: u64,
    step_limit: u64,
    exit_code: Option<i32>,
}

impl<'m> Vm<'m> {
    /// Lay out globals and string constants and prepare an image ready to
    /// run. Output files open relative to `workdir`.
    pub fn new(module: &'m Module, workdir: impl Into<PathBuf>) -> Result<Self, ExecError> {
        let mut vm = Self {
            module,
            mem: VmMemory::new(),
            session: None,
            files: Vec::new(),
            globals: Vec::new(),
            strings: Vec::new(),
            workdir: workdir.into(),
            steps: 0,
            step_limit: DEFAULT_STEP_LIMIT,
            exit_code: None,
        };
        vm.layout_image()?;
        Ok(vm)
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn memory(&self) -> &VmMemory {
        &self.mem
    }

    pub fn session(&self) -> Option<&RuntimeSession> {
        self.session.as_ref()
    }

    fn layout_image(&mut self) -> Result<(), ExecError> {
        let module = self.module;
        for s in &module.strings {
            let bytes = s.as_bytes();
            let addr = self.mem.alloc_static(bytes.len() as u64 + 1, 1)?;
            self.mem.write_bytes(addr, bytes)?;
            self.strings.push(addr);
        }
        let layout = module.layout();
        for (_, global) in module.globals.iter() {
            let size = layout.size_of(&global.ty).max(1);
            let align = layout.align_of(&global.ty);
            let addr = self.mem.alloc_static(size, align)?;
            self.globals.push(addr);
        }
        for (id, global) in module.globals.iter() {
            if let Some(init) = &global.init {
                let addr = self.globals[id.index()];
                self.write_init(addr, &global.ty, init)?;
            }
        }
        Ok(())
    }

    fn write_init(&mut self, addr: u64, ty: &Ty, init: &GlobalInit) -> Result<(), ExecError> {
        match init {
            // Fresh static storage is already zeroed.
            GlobalInit::Zero => Ok(()),
            GlobalInit::Int(v) => self.write_scalar(addr, ty, Scalar::Int(*v)),
            GlobalInit::Float(v) => self.write_scalar(addr, ty, Scalar::Float(*v)),
            GlobalInit::Composite(items) => match ty {
                Ty::Array(elem, _) => {
                    let size = self.module.layout().size_of(elem);
                    for (i, item) in items.iter().enumerate() {
                        self.write_init(addr + i as u64 * size, elem, item)?;
                    }
                    Ok(())
                }
                Ty::Aggregate(name) => {
                    let fields = match self.module.aggregates.get(name) {
                        Some(agg) => agg.fields.clone(),
                        None => {
                            return Err(ExecError::Malformed(format!(
                                "initializer for unknown aggregate {name}"
                            )))
                        }
                    };
                    for (i, item) in items.iter().enumerate() {
                        let offset = self
                            .module
                            .layout()
                            .field_offset(name, i)
                            .ok_or_else(|| {
                                ExecError::Malformed(format!(
                                    "initializer field {i} out of range for {name}"
                                ))
                            })?;
                        let field_ty = fields[i].clone();
                        self.write_init(addr + offset, &field_ty, item)?;
                    }
                    Ok(())
                }
                other => Err(ExecError::Malformed(format!(
                    "composite initializer for scalar type {other}"
                ))),
            },
        }
    }

    /// Execute `main`. Returns the program's exit code; the transcript and
    /// any other output files appear under the VM's working directory.
    pub fn run(&mut self) -> Result<i32, ExecError> {
        let main = self
            .module
            .function_by_name("main")
            .filter(|&f| !self.module.functions[f].is_declaration)
            .ok_or(ExecError::MissingMain)?;
        let argc = self.module.functions[main].params.len();
        let args = vec![Scalar::Int(0); argc];
        let result = self.exec_function(main, args)?;
        // Dropping the handles flushes whatever the program left open.
        self.files.clear();
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        Ok(result.map(|v| v.as_int() as i32).unwrap_or(0))
    }

    fn exec_function(
        &mut self,
        fid: FunctionId,
        args: Vec<Scalar>,
    ) -> Result<Option<Scalar>, ExecError> {
        let module = self.module;
        let function = &module.functions[fid];
        let entry = function.entry.ok_or_else(|| {
            ExecError::Malformed(format!("call to bodyless function {}", function.name))
        })?;
        debug!(function = %function.name, "entering function");

        let mark = self.mem.stack_mark();
        let mut regs: HashMap<InstId, Scalar> = HashMap::new();
        let mut block = entry;
        let mut prev: Option<BlockId> = None;
        loop {
            // Phis evaluate simultaneously against the edge we arrived on.
            let insts = &function.blocks[block].insts;
            let mut phi_values = Vec::new();
            for &inst_id in insts {
                if let Inst::Phi { incomings, .. } = &function.insts[inst_id].inst {
                    let pred = prev.ok_or_else(|| {
                        ExecError::Malformed("phi in the entry block".to_string())
                    })?;
                    let incoming = incomings
                        .iter()
                        .find(|(_, b)| *b == pred)
                        .ok_or_else(|| {
                            ExecError::Malformed("phi without matching incoming".to_string())
                        })?;
                    phi_values.push((inst_id, self.eval(&regs, &args, &incoming.0)?));
                } else {
                    break;
                }
            }
            for (inst_id, value) in phi_values {
                regs.insert(inst_id, value);
            }

            for &inst_id in insts {
                if matches!(function.insts[inst_id].inst, Inst::Phi { .. }) {
                    continue;
                }
                self.steps += 1;
                if self.steps > self.step_limit {
                    return Err(ExecError::StepLimitExceeded);
                }
                self.exec_inst(fid, inst_id, &mut regs, &args)?;
                if self.exit_code.is_some() {
                    self.mem.stack_release(mark);
                    return Ok(None);
                }
            }

            match &function.blocks[block].terminator {
                Some(Terminator::Ret(value)) => {
                    let result = match value {
                        Some(v) => Some(self.eval(&regs, &args, v)?),
                        None => None,
                    };
                    self.mem.stack_release(mark);
                    return Ok(result);
                }
                Some(Terminator::Br(target)) => {
                    prev = Some(block);
                    block = *target;
                }
                Some(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }) => {
                    let taken = self.eval(&regs, &args, cond)?.truthy();
                    prev = Some(block);
                    block = if taken { *then_block } else { *else_block };
                }
                None => {
                    return Err(ExecError::Malformed(format!(
                        "block {} has no terminator",
                        function.blocks[block].label
                    )))
                }
            }
        }
    }

    fn eval(
        &self,
        regs: &HashMap<InstId, Scalar>,
        args: &[Scalar],
        value: &Value,
    ) -> Result<Scalar, ExecError> {
        match value {
            Value::Inst(id) => regs
                .get(id)
                .copied()
                .ok_or_else(|| ExecError::Malformed("use of an unevaluated value".to_string())),
            Value::Global(id) => Ok(Scalar::Int(self.globals[id.index()] as i64)),
            Value::Arg(index) => args
                .get(*index as usize)
                .copied()
                .ok_or_else(|| ExecError::Malformed("argument index out of range".to_string())),
            Value::ConstInt { value, .. } => Ok(Scalar::Int(*value)),
            Value::ConstFloat { value, .. } => Ok(Scalar::Float(*value)),
            Value::Null(_) => Ok(Scalar::Int(0)),
            Value::Str(index) => Ok(Scalar::Int(self.strings[*index as usize] as i64)),
        }
    }

    fn exec_inst(
        &mut self,
        fid: FunctionId,
        inst_id: InstId,
        regs: &mut HashMap<InstId, Scalar>,
        args: &[Scalar],
    ) -> Result<(), ExecError> {
        let module = self.module;
        let function = &module.functions[fid];
        match &function.insts[inst_id].inst {
            Inst::Alloca { ty, .. } => {
                let layout = module.layout();
                let addr = self
                    .mem
                    .alloc_stack(layout.size_of(ty).max(1), layout.align_of(ty))?;
                regs.insert(inst_id, Scalar::Int(addr as i64));
            }
            Inst::Load { ptr, ty } => {
                let addr = self.eval(regs, args, ptr)?.as_addr();
                let value = self.read_scalar(addr, ty).ok_or({
                    ExecError::InvalidMemoryAccess {
                        addr,
                        len: module.layout().size_of(ty) as usize,
                    }
                })?;
                regs.insert(inst_id, value);
            }
            Inst::Store { value, ptr } => {
                let ty = function.value_ty(module, value);
                let v = self.eval(regs, args, value)?;
                let addr = self.eval(regs, args, ptr)?.as_addr();
                self.write_scalar(addr, &ty, v)?;
            }
            Inst::Bin { op, ty, lhs, rhs } => {
                let l = self.eval(regs, args, lhs)?;
                let r = self.eval(regs, args, rhs)?;
                regs.insert(inst_id, exec_bin(*op, ty, l, r)?);
            }
            Inst::Cast { value, to } => {
                let v = self.eval(regs, args, value)?;
                regs.insert(inst_id, cast_scalar(v, to));
            }
            Inst::Call { callee, args: call_args, ret } => {
                let mut evaluated = Vec::with_capacity(call_args.len());
                for a in call_args {
                    evaluated.push(self.eval(regs, args, a)?);
                }
                let result = match module.function_by_name(callee) {
                    Some(target) if !module.functions[target].is_declaration => {
                        self.exec_function(target, evaluated)?
                    }
                    _ => self.call_external(callee, &evaluated)?,
                };
                if self.exit_code.is_some() {
                    return Ok(());
                }
                if *ret != Ty::Void {
                    regs.insert(inst_id, result.unwrap_or(Scalar::Int(0)));
                }
            }
            Inst::FieldAddr { base, field, .. } => {
                let addr = self.eval(regs, args, base)?.as_addr();
                let base_ty = function.value_ty(module, base);
                let agg_name = match base_ty.pointee() {
                    Some(Ty::Aggregate(name)) => name.clone(),
                    other => {
                        return Err(ExecError::Malformed(format!(
                            "field address into non-aggregate {other:?}"
                        )))
                    }
                };
                let offset = module
                    .layout()
                    .field_offset(&agg_name, *field as usize)
                    .ok_or_else(|| {
                        ExecError::Malformed(format!(
                            "field {field} out of range for {agg_name}"
                        ))
                    })?;
                regs.insert(inst_id, Scalar::Int((addr + offset) as i64));
            }
            Inst::IndexAddr { base, index, elem } => {
                let addr = self.eval(regs, args, base)?.as_addr();
                let i = self.eval(regs, args, index)?.as_int();
                let size = module.layout().size_of(elem);
                let target = addr.wrapping_add((i as u64).wrapping_mul(size));
                regs.insert(inst_id, Scalar::Int(target as i64));
            }
            Inst::Phi { .. } => {}
            Inst::DbgValue { .. } | Inst::DbgDeclare { .. } => {}
        }
        Ok(())
    }

    fn read_scalar(&self, addr: u64, ty: &Ty) -> Option<Scalar> {
        Some(match ty {
            Ty::I8 => Scalar::Int(self.mem.read_i8(addr)? as i64),
            Ty::I16 => Scalar::Int(self.mem.read_i16(addr)? as i64),
            Ty::I32 => Scalar::Int(self.mem.read_i32(addr)? as i64),
            Ty::I64 => Scalar::Int(self.mem.read_i64(addr)?),
            Ty::F32 => Scalar::Float(self.mem.read_f32(addr)? as f64),
            Ty::F64 => Scalar::Float(self.mem.read_f64(addr)?),
            Ty::Ptr(_) => Scalar::Int(self.mem.read_u64(addr)? as i64),
            Ty::Void | Ty::Array(..) | Ty::Aggregate(_) => return None,
        })
    }

    fn write_scalar(&mut self, addr: u64, ty: &Ty, value: Scalar) -> Result<(), ExecError> {
        let bytes: Vec<u8> = match ty {
            Ty::I8 => vec![value.as_int() as u8],
            Ty::I16 => (value.as_int() as u16).to_ne_bytes().to_vec(),
            Ty::I32 => (value.as_int() as u32).to_ne_bytes().to_vec(),
            Ty::I64 | Ty::Ptr(_) => (value.as_int() as u64).to_ne_bytes().to_vec(),
            Ty::F32 => (value.as_f64() as f32).to_bits().to_ne_bytes().to_vec(),
            Ty::F64 => value.as_f64().to_bits().to_ne_bytes().to_vec(),
            other => {
                return Err(ExecError::Malformed(format!(
                    "store of non-scalar type {other}"
                )))
            }
        };
        self.mem.write_bytes(addr, &bytes)
    }

    fn read_cstr(&self, addr: u64) -> Result<String, ExecError> {
        let mut bytes = Vec::new();
        let mut cursor = addr;
        loop {
            let byte = self
                .mem
                .read_u8(cursor)
                .ok_or(ExecError::InvalidMemoryAccess { addr: cursor, len: 1 })?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
            cursor += 1;
            if bytes.len() > 1 << 16 {
                return Err(ExecError::Malformed("unterminated string".to_string()));
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn file_index(handle: u64) -> Result<usize, ExecError> {
        handle
            .checked_sub(FILE_BASE)
            .map(|i| i as usize)
            .ok_or(ExecError::BadFileHandle)
    }

    /// External services: allocation primitives, the stdio subset, and the
    /// runtime entry points.
    fn call_external(
        &mut self,
        callee: &str,
        args: &[Scalar],
    ) -> Result<Option<Scalar>, ExecError> {
        let arg = |i: usize| -> Scalar { args.get(i).copied().unwrap_or(Scalar::Int(0)) };
        match callee {
            "malloc" => {
                let addr = self.mem.malloc(arg(0).as_int() as usize)?;
                Ok(Some(Scalar::Int(addr as i64)))
            }
            "calloc" => {
                let total = (arg(0).as_int() * arg(1).as_int()).max(0) as usize;
                let addr = self.mem.malloc(total)?;
                self.mem.zero(addr, total.max(1))?;
                Ok(Some(Scalar::Int(addr as i64)))
            }
            "realloc" => {
                let (addr, _) = self
                    .mem
                    .realloc(arg(0).as_addr(), arg(1).as_int() as usize)?;
                Ok(Some(Scalar::Int(addr as i64)))
            }
            "free" => {
                self.mem.free(arg(0).as_addr());
                Ok(None)
            }
            "exit" => {
                self.exit_code = Some(arg(0).as_int() as i32);
                Ok(None)
            }
            "fopen" => {
                let name = self.read_cstr(arg(0).as_addr())?;
                let path = self.workdir.join(name);
                let file = File::create(&path)?;
                self.files.push(Some(file));
                let handle = FILE_BASE + (self.files.len() as u64 - 1);
                Ok(Some(Scalar::Int(handle as i64)))
            }
            "fclose" => {
                let index = Self::file_index(arg(0).as_addr())?;
                match self.files.get_mut(index) {
                    Some(slot) => {
                        slot.take();
                        Ok(Some(Scalar::Int(0)))
                    }
                    None => Err(ExecError::BadFileHandle),
                }
            }
            "fprintf" => {
                let index = Self::file_index(arg(0).as_addr())?;
                let format = self.read_cstr(arg(1).as_addr())?;
                let text = self.format_printf(&format, &args[2..])?;
                let file = self
                    .files
                    .get_mut(index)
                    .and_then(Option::as_mut)
                    .ok_or(ExecError::BadFileHandle)?;
                file.write_all(text.as_bytes())?;
                Ok(Some(Scalar::Int(text.len() as i64)))
            }
            symbols::OPEN_TYPE_TABLE => {
                let path = self.read_cstr(arg(0).as_addr())?;
                let session = RuntimeSession::open_type_table(
                    Path::new(&path),
                    arg(1).as_int() as usize,
                    arg(2).as_int() != 0,
                    arg(3).as_int() != 0,
                    arg(4).as_int() != 0,
                )?;
                self.session = Some(session);
                Ok(None)
            }
            symbols::INSERT_HEAP_ENTRY => {
                let session = self.session.as_mut().ok_or(ExecError::NoSession)?;
                session.insert_heap_entry(
                    arg(0).as_addr(),
                    arg(1).as_int(),
                    arg(2).as_int(),
                    arg(3).as_int() as i32,
                );
                Ok(None)
            }
            symbols::UPDATE_HEAP_ENTRY_SIZE => {
                let session = self.session.as_mut().ok_or(ExecError::NoSession)?;
                session.update_heap_entry_size(arg(0).as_addr(), arg(1).as_int());
                Ok(None)
            }
            symbols::DELETE_HEAP_ENTRY => {
                let session = self.session.as_mut().ok_or(ExecError::NoSession)?;
                session.delete_heap_entry(arg(0).as_addr());
                Ok(None)
            }
            symbols::INSPECT_POINTER => {
                let name = self.read_cstr(arg(3).as_addr())?;
                let fn_name = self.read_cstr(arg(4).as_addr())?;
                let index = Self::file_index(arg(0).as_addr())?;
                let session = self.session.as_mut().ok_or(ExecError::NoSession)?;
                let file = self
                    .files
                    .get_mut(index)
                    .and_then(Option::as_mut)
                    .ok_or(ExecError::BadFileHandle)?;
                session.inspect_pointer(
                    file,
                    &self.mem,
                    arg(1).as_addr(),
                    arg(2).as_int() as i32,
                    &name,
                    &fn_name,
                    arg(5).as_int() as i32,
                )?;
                Ok(None)
            }
            symbols::INSPECT_STRUCT => {
                let name = self.read_cstr(arg(3).as_addr())?;
                let fn_name = self.read_cstr(arg(4).as_addr())?;
                let index = Self::file_index(arg(0).as_addr())?;
                let session = self.session.as_mut().ok_or(ExecError::NoSession)?;
                let file = self
                    .files
                    .get_mut(index)
                    .and_then(Option::as_mut)
                    .ok_or(ExecError::BadFileHandle)?;
                session.inspect_struct(
                    file,
                    &self.mem,
                    arg(1).as_addr(),
                    arg(2).as_int() as i32,
                    &name,
                    &fn_name,
                    arg(5).as_int() as i32,
                )?;
                Ok(None)
            }
            symbols::INSPECT_UNION => {
                let name = self.read_cstr(arg(3).as_addr())?;
                let fn_name = self.read_cstr(arg(4).as_addr())?;
                let index = Self::file_index(arg(0).as_addr())?;
                let session = self.session.as_mut().ok_or(ExecError::NoSession)?;
                let file = self
                    .files
                    .get_mut(index)
                    .and_then(Option::as_mut)
                    .ok_or(ExecError::BadFileHandle)?;
                session.inspect_union(
                    file,
                    &self.mem,
                    arg(1).as_addr(),
                    arg(2).as_int() as u64,
                    &name,
                    &fn_name,
                    arg(5).as_int() as i32,
                )?;
                Ok(None)
            }
            symbols::INSPECT_ENTIRE_HEAP => {
                let fn_name = self.read_cstr(arg(1).as_addr())?;
                let index = Self::file_index(arg(0).as_addr())?;
                let session = self.session.as_mut().ok_or(ExecError::NoSession)?;
                let file = self
                    .files
                    .get_mut(index)
                    .and_then(Option::as_mut)
                    .ok_or(ExecError::BadFileHandle)?;
                session.inspect_entire_heap(file, &self.mem, &fn_name, arg(2).as_int() as i32)?;
                Ok(None)
            }
            symbols::COMPUTE_HASHCODE => {
                let result = hashcode(
                    &self.mem,
                    arg(0).as_addr(),
                    arg(1).as_int(),
                    arg(2).as_int(),
                    arg(3).as_int() as i32,
                );
                Ok(Some(Scalar::Int(result as i64)))
            }
            other => Err(ExecError::UnknownFunction(other.to_string())),
        }
    }

    /// Minimal printf: exactly the conversions the pass emits.
    fn format_printf(&self, format: &str, args: &[Scalar]) -> Result<String, ExecError> {
        let mut out = String::new();
        let mut chars = format.chars().peekable();
        let mut next = 0usize;
        let take = |next: &mut usize| -> Scalar {
            let v = args.get(*next).copied().unwrap_or(Scalar::Int(0));
            *next += 1;
            v
        };
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            let mut spec = String::new();
            for s in chars.by_ref() {
                spec.push(s);
                if s.is_ascii_alphabetic() || s == '%' {
                    break;
                }
            }
            match spec.as_str() {
                "%" => out.push('%'),
                "d" | "i" => out.push_str(&(take(&mut next).as_int() as i32).to_string()),
                "u" => out.push_str(&(take(&mut next).as_int() as u32).to_string()),
                "c" => out.push(take(&mut next).as_int() as u8 as char),
                "hi" => out.push_str(&(take(&mut next).as_int() as i16).to_string()),
                "hu" => out.push_str(&(take(&mut next).as_int() as u16).to_string()),
                "ld" | "lld" => out.push_str(&take(&mut next).as_int().to_string()),
                "lu" | "llu" => {
                    out.push_str(&(take(&mut next).as_int() as u64).to_string())
                }
                ".2f" | ".2lf" => {
                    out.push_str(&format!("{:.2}", take(&mut next).as_f64()))
                }
                "s" => {
                    let addr = take(&mut next).as_addr();
                    out.push_str(&self.read_cstr(addr)?);
                }
                other => {
                    return Err(ExecError::Malformed(format!(
                        "unsupported printf conversion %{other}"
                    )))
                }
            }
        }
        Ok(out)
    }
}

fn exec_bin(op: BinOp, ty: &Ty, lhs: Scalar, rhs: Scalar) -> Result<Scalar, ExecError> {
    if ty.is_float() {
        let l = lhs.as_f64();
        let r = rhs.as_f64();
        let v = match op {
            BinOp::Add => l + r,
            BinOp::Sub => l - r,
            BinOp::Mul => l * r,
            BinOp::SDiv | BinOp::UDiv => l / r,
            BinOp::SRem => l % r,
        };
        return Ok(Scalar::Float(v));
    }
    let l = lhs.as_int();
    let r = rhs.as_int();
    let v = match op {
        BinOp::Add => l.wrapping_add(r),
        BinOp::Sub => l.wrapping_sub(r),
        BinOp::Mul => l.wrapping_mul(r),
        BinOp::SDiv => {
            if r == 0 {
                return Err(ExecError::DivisionByZero);
            }
            l.wrapping_div(r)
        }
        BinOp::UDiv => {
            if r == 0 {
                return Err(ExecError::DivisionByZero);
            }
            ((l as u64) / (r as u64)) as i64
        }
        BinOp::SRem => {
            if r == 0 {
                return Err(ExecError::DivisionByZero);
            }
            l.wrapping_rem(r)
        }
    };
    Ok(Scalar::Int(truncate_to(ty, v)))
}

fn cast_scalar(value: Scalar, to: &Ty) -> Scalar {
    match to {
        Ty::F64 => Scalar::Float(value.as_f64()),
        Ty::F32 => Scalar::Float(value.as_f64() as f32 as f64),
        Ty::Ptr(_) => Scalar::Int(value.as_int()),
        Ty::I8 | Ty::I16 | Ty::I32 | Ty::I64 => Scalar::Int(truncate_to(to, value.as_int())),
        Ty::Void | Ty::Array(..) | Ty::Aggregate(_) => value,
    }
}

fn truncate_to(ty: &Ty, value: i64) -> i64 {
    match ty {
        Ty::I8 => value as i8 as i64,
        Ty::I16 => value as i16 as i64,
        Ty::I32 => value as i32 as i64,
        _ => value,
    }
}
