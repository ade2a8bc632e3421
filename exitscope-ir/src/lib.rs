//! In-memory IR for the exitscope instrumenter.
//!
//! A module is an arena-backed graph of functions, blocks and instructions
//! carrying a DWARF-flavored debug-metadata layer: debug types are keyed by
//! `gimli` tags and encodings, debug variables bind source names to SSA
//! values through dedicated binding instructions. The instrumentation pass
//! consumes and rewrites these modules; the VM executes them.
//!
//! Modules serialize to JSON via serde, which is the interchange format of
//! the command-line tool.

pub mod arena;
pub mod builder;
pub mod debug;
pub mod dom;
pub mod module;
pub mod types;

pub use arena::{Arena, Id};
pub use builder::{Builder, InsertPoint};
pub use debug::{
    DebugMember, DebugType, DebugTypeId, DebugVariable, DebugVariableId, ElementCount,
    VariableKind,
};
pub use dom::{Dominators, Predecessors};
pub use module::{
    BinOp, Block, BlockId, Function, FunctionId, Global, GlobalId, GlobalInit, Inst, InstId,
    InstNode, Module, Param, Terminator, Value,
};
pub use types::{Aggregate, Layout, Ty};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_round_trips_through_json() {
        let mut module = Module::new("unit", "unit.c");
        let int_ty = module.add_debug_type(debug::well_known::signed_int("int", 32));
        let var = module.add_debug_variable(DebugVariable {
            name: "x".to_string(),
            scope: "main".to_string(),
            ty: Some(int_ty),
            artificial: false,
            kind: VariableKind::Local,
        });
        let fid = module.add_function(Function::new("main", Ty::I32));
        let entry = module.functions[fid].add_block("entry");
        let mut b = Builder::at(&mut module, fid, entry, InsertPoint::BlockEnd);
        b.dbg_value(var, Value::i32(42));
        b.ret(Some(Value::i32(0)));

        let json = serde_json::to_string(&module).unwrap();
        let restored: Module = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.functions.len(), 1);
        let f = &restored.functions[restored.function_by_name("main").unwrap()];
        assert_eq!(f.blocks[f.entry.unwrap()].insts.len(), 1);
        assert_eq!(restored.debug_variables.len(), 1);
    }

    #[test]
    fn string_interning_deduplicates() {
        let mut module = Module::new("unit", "unit.c");
        let a = module.intern_string("main");
        let b = module.intern_string("other");
        let c = module.intern_string("main");
        assert_eq!(a, c);
        assert_ne!(a, b);
    }
}
