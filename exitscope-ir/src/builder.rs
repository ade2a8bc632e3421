//! Cursor-style instruction builder.
//!
//! The builder keeps an insertion point (block + position) inside one
//! function and advances past each instruction it emits, so consecutive
//! emissions appear in program order.

use crate::debug::DebugVariableId;
use crate::module::{
    BinOp, BlockId, Function, FunctionId, Inst, InstId, Module, Terminator, Value,
};
use crate::types::Ty;

/// Where the next instruction is inserted within the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    BlockStart,
    /// After the leading phi group.
    FirstNonPhi,
    /// Before the terminator.
    BlockEnd,
    After(InstId),
    Before(InstId),
}

pub struct Builder<'m> {
    module: &'m mut Module,
    function: FunctionId,
    block: BlockId,
    point: InsertPoint,
}

impl<'m> Builder<'m> {
    /// Position a builder at the first non-phi slot of `function`'s entry
    /// block.
    pub fn at_entry(module: &'m mut Module, function: FunctionId) -> Self {
        let entry = module.functions[function]
            .entry
            .unwrap_or_else(|| panic!("function has no entry block"));
        Self {
            module,
            function,
            block: entry,
            point: InsertPoint::FirstNonPhi,
        }
    }

    pub fn at(
        module: &'m mut Module,
        function: FunctionId,
        block: BlockId,
        point: InsertPoint,
    ) -> Self {
        Self {
            module,
            function,
            block,
            point,
        }
    }

    pub fn position(&mut self, block: BlockId, point: InsertPoint) {
        self.block = block;
        self.point = point;
    }

    pub fn block(&self) -> BlockId {
        self.block
    }

    pub fn module(&mut self) -> &mut Module {
        self.module
    }

    pub fn func(&self) -> &Function {
        &self.module.functions[self.function]
    }

    fn func_mut(&mut self) -> &mut Function {
        &mut self.module.functions[self.function]
    }

    /// Insert `inst` at the current point and advance past it.
    pub fn emit(&mut self, inst: Inst) -> InstId {
        let block = self.block;
        let index = match self.point {
            InsertPoint::BlockStart => 0,
            InsertPoint::FirstNonPhi => self.func().first_non_phi_index(block),
            InsertPoint::BlockEnd => self.func().blocks[block].insts.len(),
            InsertPoint::After(prev) => {
                debug_assert_eq!(self.func().block_of(prev), block);
                self.func().index_in_block(prev) + 1
            }
            InsertPoint::Before(next) => {
                debug_assert_eq!(self.func().block_of(next), block);
                self.func().index_in_block(next)
            }
        };
        let id = self.func_mut().insert_inst(block, index, inst);
        if !matches!(self.point, InsertPoint::BlockEnd | InsertPoint::Before(_)) {
            self.point = InsertPoint::After(id);
        }
        id
    }

    pub fn alloca(&mut self, ty: Ty, name: impl Into<String>) -> InstId {
        self.emit(Inst::Alloca {
            ty,
            name: name.into(),
        })
    }

    pub fn load(&mut self, ptr: Value, ty: Ty) -> InstId {
        self.emit(Inst::Load { ptr, ty })
    }

    pub fn store(&mut self, value: Value, ptr: Value) -> InstId {
        self.emit(Inst::Store { value, ptr })
    }

    pub fn bin(&mut self, op: BinOp, ty: Ty, lhs: Value, rhs: Value) -> InstId {
        self.emit(Inst::Bin { op, ty, lhs, rhs })
    }

    pub fn udiv(&mut self, ty: Ty, lhs: Value, rhs: Value) -> InstId {
        self.bin(BinOp::UDiv, ty, lhs, rhs)
    }

    pub fn cast(&mut self, value: Value, to: Ty) -> InstId {
        self.emit(Inst::Cast { value, to })
    }

    pub fn call(&mut self, callee: impl Into<String>, ret: Ty, args: Vec<Value>) -> InstId {
        self.emit(Inst::Call {
            callee: callee.into(),
            ret,
            args,
        })
    }

    pub fn field_addr(&mut self, base: Value, field: u32, ty: Ty) -> InstId {
        self.emit(Inst::FieldAddr { base, field, ty })
    }

    pub fn index_addr(&mut self, base: Value, index: Value, elem: Ty) -> InstId {
        self.emit(Inst::IndexAddr { base, index, elem })
    }

    pub fn phi(&mut self, ty: Ty, incomings: Vec<(Value, BlockId)>) -> InstId {
        self.emit(Inst::Phi { ty, incomings })
    }

    pub fn dbg_value(&mut self, variable: DebugVariableId, value: Value) -> InstId {
        self.emit(Inst::DbgValue { variable, value })
    }

    pub fn dbg_declare(&mut self, variable: DebugVariableId, addr: Value) -> InstId {
        self.emit(Inst::DbgDeclare { variable, addr })
    }

    /// Pointer to an interned string constant.
    pub fn cstr(&mut self, s: &str) -> Value {
        Value::Str(self.module.intern_string(s))
    }

    pub fn ret(&mut self, value: Option<Value>) {
        let block = self.block;
        self.func_mut().set_terminator(block, Terminator::Ret(value));
    }

    pub fn br(&mut self, target: BlockId) {
        let block = self.block;
        self.func_mut().set_terminator(block, Terminator::Br(target));
    }

    pub fn cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        let block = self.block;
        self.func_mut().set_terminator(
            block,
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            },
        );
    }
}
