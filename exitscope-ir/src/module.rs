//! Module, function, block, instruction and value definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::arena::{Arena, Id};
use crate::debug::{DebugType, DebugVariable, DebugVariableId};
use crate::types::{Aggregate, Layout, Ty};

pub type GlobalId = Id<Global>;
pub type FunctionId = Id<Function>;
pub type BlockId = Id<Block>;
pub type InstId = Id<InstNode>;

/// A whole translation unit: aggregate registry, globals, functions, the
/// C-string pool and the debug metadata arenas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    /// Path of the source file the module was produced from. Drives the
    /// names of the output transcript and the serialized type table.
    pub source_file: String,
    pub aggregates: BTreeMap<String, Aggregate>,
    /// Interned NUL-less string constants; values of kind [`Value::Str`]
    /// are pointers to these.
    pub strings: Vec<String>,
    pub globals: Arena<Global>,
    pub functions: Arena<Function>,
    pub debug_types: Arena<DebugType>,
    pub debug_variables: Arena<DebugVariable>,
}

impl Module {
    pub fn new(name: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_file: source_file.into(),
            aggregates: BTreeMap::new(),
            strings: Vec::new(),
            globals: Arena::new(),
            functions: Arena::new(),
            debug_types: Arena::new(),
            debug_variables: Arena::new(),
        }
    }

    pub fn layout(&self) -> Layout<'_> {
        Layout::new(&self.aggregates)
    }

    /// Intern a string constant, deduplicating repeats.
    pub fn intern_string(&mut self, s: &str) -> u32 {
        if let Some(pos) = self.strings.iter().position(|existing| existing == s) {
            return pos as u32;
        }
        let index = self.strings.len() as u32;
        self.strings.push(s.to_string());
        index
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(id, _)| id)
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals
            .iter()
            .find(|(_, g)| g.name == name)
            .map(|(id, _)| id)
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        self.globals.push(global)
    }

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        self.functions.push(function)
    }

    pub fn add_debug_type(&mut self, ty: DebugType) -> crate::debug::DebugTypeId {
        self.debug_types.push(ty)
    }

    pub fn add_debug_variable(&mut self, var: DebugVariable) -> DebugVariableId {
        self.debug_variables.push(var)
    }
}

/// Initializer of a global. `Composite` entries are laid out field by field
/// against the global's aggregate or array type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GlobalInit {
    Zero,
    Int(i64),
    Float(f64),
    Composite(Vec<GlobalInit>),
}

/// A module-level variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub ty: Ty,
    pub init: Option<GlobalInit>,
    pub constant: bool,
    pub debug: Option<DebugVariableId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Ty,
}

/// A function: a block arena plus an instruction arena. Blocks own ordered
/// lists of instruction ids; instructions know the block they live in, so
/// both directions of the containment query are O(1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Ty,
    /// Declarations have no body and are never instrumented.
    pub is_declaration: bool,
    pub blocks: Arena<Block>,
    pub insts: Arena<InstNode>,
    pub entry: Option<BlockId>,
}

impl Function {
    pub fn new(name: impl Into<String>, ret: Ty) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret,
            is_declaration: false,
            blocks: Arena::new(),
            insts: Arena::new(),
            entry: None,
        }
    }

    pub fn declaration(name: impl Into<String>, params: Vec<Param>, ret: Ty) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            is_declaration: true,
            blocks: Arena::new(),
            insts: Arena::new(),
            entry: None,
        }
    }

    /// Append a new empty block. The first block added becomes the entry.
    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = self.blocks.push(Block {
            label: label.into(),
            insts: Vec::new(),
            terminator: None,
        });
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        id
    }

    pub fn block_of(&self, inst: InstId) -> BlockId {
        self.insts[inst].block
    }

    /// Position of `inst` within its block's ordered list.
    pub fn index_in_block(&self, inst: InstId) -> usize {
        let block = self.insts[inst].block;
        self.blocks[block]
            .insts
            .iter()
            .position(|&i| i == inst)
            .unwrap_or_else(|| panic!("instruction {inst:?} detached from block {block:?}"))
    }

    /// The instruction after `inst` in the same block, if any.
    pub fn next_in_block(&self, inst: InstId) -> Option<InstId> {
        let block = self.insts[inst].block;
        let index = self.index_in_block(inst);
        self.blocks[block].insts.get(index + 1).copied()
    }

    /// Index of the first non-phi instruction of `block`.
    pub fn first_non_phi_index(&self, block: BlockId) -> usize {
        self.blocks[block]
            .insts
            .iter()
            .position(|&i| !matches!(self.insts[i].inst, Inst::Phi { .. }))
            .unwrap_or(self.blocks[block].insts.len())
    }

    /// Insert `inst` into `block` at `index` in its instruction list.
    pub fn insert_inst(&mut self, block: BlockId, index: usize, inst: Inst) -> InstId {
        let id = self.insts.push(InstNode { inst, block });
        let list = &mut self.blocks[block].insts;
        let index = index.min(list.len());
        list.insert(index, id);
        id
    }

    /// Append `inst` at the end of `block` (before the terminator).
    pub fn push_inst(&mut self, block: BlockId, inst: Inst) -> InstId {
        let at = self.blocks[block].insts.len();
        self.insert_inst(block, at, inst)
    }

    pub fn set_terminator(&mut self, block: BlockId, terminator: Terminator) {
        self.blocks[block].terminator = Some(terminator);
    }

    /// Block ids in arena order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks.ids()
    }

    /// The machine type of a value in the context of this function.
    pub fn value_ty(&self, module: &Module, value: &Value) -> Ty {
        match value {
            Value::Inst(id) => self.insts[*id].inst.result_ty(),
            Value::Global(id) => Ty::ptr_to(module.globals[*id].ty.clone()),
            Value::Arg(index) => self
                .params
                .get(*index as usize)
                .map(|p| p.ty.clone())
                .unwrap_or(Ty::Void),
            Value::ConstInt { ty, .. } => ty.clone(),
            Value::ConstFloat { ty, .. } => ty.clone(),
            Value::Null(ty) => ty.clone(),
            Value::Str(_) => Ty::ptr_to(Ty::I8),
        }
    }
}

/// A basic block: ordered instructions plus one terminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub label: String,
    pub insts: Vec<InstId>,
    pub terminator: Option<Terminator>,
}

impl Block {
    pub fn returns(&self) -> bool {
        matches!(self.terminator, Some(Terminator::Ret(_)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminator {
    Ret(Option<Value>),
    Br(BlockId),
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Ret(_) => Vec::new(),
            Terminator::Br(target) => vec![*target],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
}

/// An instruction together with the block it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstNode {
    pub inst: Inst,
    pub block: BlockId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Inst {
    /// Stack slot of `ty`, yielding a pointer to it.
    Alloca { ty: Ty, name: String },
    Load { ptr: Value, ty: Ty },
    Store { value: Value, ptr: Value },
    Bin {
        op: BinOp,
        ty: Ty,
        lhs: Value,
        rhs: Value,
    },
    /// Best-effort scalar cast.
    Cast { value: Value, to: Ty },
    Call {
        callee: String,
        ret: Ty,
        args: Vec<Value>,
    },
    /// Address of field `field` of the aggregate pointed to by `base`.
    /// `ty` is the field's type; the result is a pointer to it.
    FieldAddr { base: Value, field: u32, ty: Ty },
    /// Address of element `index` relative to `base`, which points at
    /// elements of type `elem`.
    IndexAddr {
        base: Value,
        index: Value,
        elem: Ty,
    },
    Phi {
        ty: Ty,
        incomings: Vec<(Value, BlockId)>,
    },
    /// Debug binding: the source variable takes `value` from here on.
    DbgValue {
        variable: DebugVariableId,
        value: Value,
    },
    /// Debug binding: the source variable lives at `addr` for its whole
    /// lifetime.
    DbgDeclare {
        variable: DebugVariableId,
        addr: Value,
    },
}

impl Inst {
    pub fn result_ty(&self) -> Ty {
        match self {
            Inst::Alloca { ty, .. } => Ty::ptr_to(ty.clone()),
            Inst::Load { ty, .. } => ty.clone(),
            Inst::Store { .. } => Ty::Void,
            Inst::Bin { ty, .. } => ty.clone(),
            Inst::Cast { to, .. } => to.clone(),
            Inst::Call { ret, .. } => ret.clone(),
            Inst::FieldAddr { ty, .. } => Ty::ptr_to(ty.clone()),
            Inst::IndexAddr { elem, .. } => Ty::ptr_to(elem.clone()),
            Inst::Phi { ty, .. } => ty.clone(),
            Inst::DbgValue { .. } | Inst::DbgDeclare { .. } => Ty::Void,
        }
    }

    /// Debug bindings are metadata, not computation.
    pub fn is_debug_binding(&self) -> bool {
        matches!(self, Inst::DbgValue { .. } | Inst::DbgDeclare { .. })
    }
}

/// An SSA value reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Inst(InstId),
    Global(GlobalId),
    /// Function parameter by position.
    Arg(u32),
    ConstInt { ty: Ty, value: i64 },
    ConstFloat { ty: Ty, value: f64 },
    /// Typed null pointer / zero value.
    Null(Ty),
    /// Pointer to an interned string constant.
    Str(u32),
}

impl Value {
    pub fn i32(value: i32) -> Value {
        Value::ConstInt {
            ty: Ty::I32,
            value: value as i64,
        }
    }

    pub fn i64(value: i64) -> Value {
        Value::ConstInt { ty: Ty::I64, value }
    }

    pub fn is_const_zero(&self) -> bool {
        match self {
            Value::Null(_) => true,
            Value::ConstInt { value, .. } => *value == 0,
            Value::ConstFloat { value, .. } => *value == 0.0,
            _ => false,
        }
    }

    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }
}
