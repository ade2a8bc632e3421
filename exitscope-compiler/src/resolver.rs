//! SSA-aware variable resolution.
//!
//! For every source variable the pass keeps a trace: the debug-binding
//! instructions encountered for it, in walk order. At the function's exit
//! block the resolver must produce one value that faithfully represents the
//! variable there. Three strategies apply in order:
//!
//! 1. **select** -- prefer a stack-slot definition (a stable lvalue); else
//!    the last binding in the returning block; else the last binding whose
//!    block dominates the exit.
//! 2. **extend** -- materialize a merge node at the exit head from the last
//!    definition on each predecessor edge. Abandoned when any traced value
//!    lives in a block other than its binding's block: the binding may have
//!    been hoisted without its value, and such a definition is not actually
//!    available on the edge.
//! 3. **shadow** -- allocate one entry-block slot sized to the largest
//!    traced type and store every definition into it as it happens.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use exitscope_ir::{
    BlockId, Builder, DebugVariableId, Dominators, FunctionId, InsertPoint, Inst, InstId, Module,
    Predecessors, Ty, Value,
};

use crate::PassStats;

/// Trace of one source variable within one function.
#[derive(Debug, Clone)]
pub struct VariableTrace {
    pub variable: DebugVariableId,
    /// Debug-binding instructions in encounter order.
    pub bindings: Vec<InstId>,
}

/// Per-function map from source variable name to its trace. Ordered, so
/// observation points emit variables deterministically.
pub type StackMap = BTreeMap<String, VariableTrace>;

/// Append `binding` to the stack map if it binds a variable worth
/// tracking: local to this function, not a null or zero constant.
pub fn record_binding(
    module: &Module,
    function: FunctionId,
    stack_map: &mut StackMap,
    binding: InstId,
) {
    let func = &module.functions[function];
    let (variable, payload, is_declare) = match &func.insts[binding].inst {
        Inst::DbgValue { variable, value } => (*variable, value.clone(), false),
        Inst::DbgDeclare { variable, addr } => (*variable, addr.clone(), true),
        _ => return,
    };
    let var = &module.debug_variables[variable];
    if var.scope != func.name {
        return;
    }
    if is_declare {
        if matches!(payload, Value::Null(_)) {
            return;
        }
    } else if payload.is_const_zero() {
        return;
    }
    stack_map
        .entry(var.name.clone())
        .and_modify(|trace| trace.bindings.push(binding))
        .or_insert_with(|| VariableTrace {
            variable,
            bindings: vec![binding],
        });
}

struct BindingSite {
    binding: InstId,
    value: Value,
    block: BlockId,
}

/// Resolution engine for one function. Mutates the function when the
/// extend or shadow strategies materialize new IR.
pub struct Resolver<'m> {
    module: &'m mut Module,
    function: FunctionId,
}

impl<'m> Resolver<'m> {
    pub fn new(module: &'m mut Module, function: FunctionId) -> Self {
        Self { module, function }
    }

    /// The value reported for `trace` at `exit_block`.
    pub fn valid_def(
        &mut self,
        trace: &VariableTrace,
        exit_block: BlockId,
        shadow: &mut HashMap<String, InstId>,
        stats: &mut PassStats,
    ) -> Value {
        let sites = self.binding_sites(trace);
        if sites.is_empty() {
            return Value::Null(Ty::I64);
        }
        if let Some(value) = self.select(&sites, exit_block) {
            return value;
        }
        if let Some(phi) = self.extend_live_range(&sites, exit_block, stats) {
            return Value::Inst(phi);
        }
        let name = self.module.debug_variables[trace.variable].name.clone();
        Value::Inst(self.shadow_in_stack(&name, &sites, shadow, stats))
    }

    fn binding_sites(&self, trace: &VariableTrace) -> Vec<BindingSite> {
        let func = &self.module.functions[self.function];
        trace
            .bindings
            .iter()
            .filter_map(|&binding| {
                let value = match &func.insts[binding].inst {
                    Inst::DbgValue { value, .. } => value.clone(),
                    Inst::DbgDeclare { addr, .. } => addr.clone(),
                    _ => return None,
                };
                Some(BindingSite {
                    binding,
                    value,
                    block: func.block_of(binding),
                })
            })
            .collect()
    }

    fn value_ty(&self, value: &Value) -> Ty {
        let module = &*self.module;
        module.functions[self.function].value_ty(module, value)
    }

    /// First strategy: pick an existing definition that is valid at the
    /// exit. A stack slot wins outright; otherwise the last definition in
    /// the returning block, then the last whose block dominates the exit.
    fn select(&self, sites: &[BindingSite], exit_block: BlockId) -> Option<Value> {
        let func = &self.module.functions[self.function];
        let dom = Dominators::compute(func);
        let mut valid = None;
        for site in sites {
            if let Some(inst) = site.value.as_inst() {
                if matches!(func.insts[inst].inst, Inst::Alloca { .. }) {
                    return Some(site.value.clone());
                }
            }
            if func.blocks[site.block].returns() {
                valid = Some(site.value.clone());
            } else if dom.dominates(site.block, exit_block) {
                valid = Some(site.value.clone());
            }
        }
        valid
    }

    /// Largest type among the traced definitions, by allocation size.
    fn largest_ty(&self, sites: &[BindingSite]) -> Ty {
        let module = &*self.module;
        let layout = module.layout();
        let func = &module.functions[self.function];
        let mut largest = func.value_ty(module, &sites[0].value);
        for site in &sites[1..] {
            let ty = func.value_ty(module, &site.value);
            if layout.size_of(&ty) > layout.size_of(&largest) {
                largest = ty;
            }
        }
        largest
    }

    /// Second strategy: a merge node at the exit head whose incoming pairs
    /// are the last definition each predecessor contributes, null-filled
    /// for predecessors that contribute none.
    fn extend_live_range(
        &mut self,
        sites: &[BindingSite],
        exit_block: BlockId,
        stats: &mut PassStats,
    ) -> Option<InstId> {
        {
            let func = &self.module.functions[self.function];
            for site in sites {
                if let Some(inst) = site.value.as_inst() {
                    if func.block_of(inst) != site.block {
                        return None;
                    }
                }
            }
        }
        let largest = self.largest_ty(sites);
        let exit_preds: Vec<BlockId> = {
            let func = &self.module.functions[self.function];
            Predecessors::compute(func).of(exit_block).to_vec()
        };

        let mut incomings: Vec<(Value, BlockId)> = Vec::new();
        let mut diff = false;
        for site in sites {
            if !exit_preds.contains(&site.block) {
                continue;
            }
            if let Some(inst) = site.value.as_inst() {
                if self.module.functions[self.function].block_of(inst) != site.block {
                    return None;
                }
            }
            let mut value = site.value.clone();
            let ty = self.value_ty(&value);
            if ty != largest && ty.castable_to(&largest) {
                value = Value::Inst(self.insert_cast_near_def(site, largest.clone()));
                diff = true;
            }
            match incomings.iter_mut().find(|(_, block)| *block == site.block) {
                // The last definition from a block wins.
                Some(slot) => slot.0 = value,
                None => incomings.push((value, site.block)),
            }
        }

        if incomings.is_empty() {
            return None;
        }
        for pred in &exit_preds {
            if !incomings.iter().any(|(_, block)| block == pred) {
                incomings.push((Value::Null(largest.clone()), *pred));
            }
        }
        let phi = Builder::at(
            self.module,
            self.function,
            exit_block,
            InsertPoint::FirstNonPhi,
        )
        .phi(largest, incomings);
        stats.extended_vars += 1;
        if diff {
            stats.diff_typed_defs += 1;
        }
        debug!("live range extended with a merge node");
        Some(phi)
    }

    /// Third strategy: one zero-initialized entry-block slot mirroring
    /// every definition of the variable.
    fn shadow_in_stack(
        &mut self,
        name: &str,
        sites: &[BindingSite],
        shadow: &mut HashMap<String, InstId>,
        stats: &mut PassStats,
    ) -> InstId {
        if let Some(&slot) = shadow.get(name) {
            return slot;
        }
        debug!(var = name, "no reaching definition, shadowing in the stack");

        let largest = self.largest_ty(sites);
        let entry = self.module.functions[self.function]
            .entry
            .expect("instrumented function has an entry block");
        let slot = {
            let mut b = Builder::at(self.module, self.function, entry, InsertPoint::BlockStart);
            let slot = b.alloca(largest.clone(), name);
            b.store(Value::Null(largest.clone()), Value::Inst(slot));
            slot
        };

        let mut diff = false;
        for site in sites {
            let (block, point) = self.store_position(site);
            let ty = self.value_ty(&site.value);
            let mut b = Builder::at(self.module, self.function, block, point);
            if ty != largest {
                if ty.castable_to(&largest) {
                    let cast = b.cast(site.value.clone(), largest.clone());
                    b.store(Value::Inst(cast), Value::Inst(slot));
                    diff = true;
                }
                // An uncastable definition contributes no store; the slot
                // keeps its previous contents.
            } else {
                b.store(site.value.clone(), Value::Inst(slot));
            }
        }

        stats.shadowed_vars += 1;
        if diff {
            stats.diff_typed_defs += 1;
        }
        shadow.insert(name.to_string(), slot);
        slot
    }

    /// Where a shadow store for `site` goes: after the defining instruction
    /// when it lives in another block than the binding (after the phi group
    /// for phi definitions), after the binding itself otherwise.
    fn store_position(&self, site: &BindingSite) -> (BlockId, InsertPoint) {
        if let Some(inst) = site.value.as_inst() {
            let func = &self.module.functions[self.function];
            let def_block = func.block_of(inst);
            if def_block != site.block {
                return if matches!(func.insts[inst].inst, Inst::Phi { .. }) {
                    (def_block, InsertPoint::FirstNonPhi)
                } else {
                    (def_block, InsertPoint::After(inst))
                };
            }
        }
        (site.block, InsertPoint::After(site.binding))
    }

    /// Insert a widening cast next to the definition it widens.
    fn insert_cast_near_def(&mut self, site: &BindingSite, to: Ty) -> InstId {
        let (block, point) = if let Some(inst) = site.value.as_inst() {
            let func = &self.module.functions[self.function];
            let def_block = func.block_of(inst);
            if matches!(func.insts[inst].inst, Inst::Phi { .. }) {
                (def_block, InsertPoint::FirstNonPhi)
            } else {
                (def_block, InsertPoint::After(inst))
            }
        } else {
            (site.block, InsertPoint::BlockEnd)
        };
        Builder::at(self.module, self.function, block, point).cast(site.value.clone(), to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exitscope_ir::debug::well_known;
    use exitscope_ir::{DebugVariable, Function, Module, Terminator, VariableKind};

    fn test_module() -> (Module, FunctionId, DebugVariableId) {
        let mut module = Module::new("t", "t.c");
        let int_ty = module.add_debug_type(well_known::signed_int("int", 32));
        let var = module.add_debug_variable(DebugVariable {
            name: "x".to_string(),
            scope: "f".to_string(),
            ty: Some(int_ty),
            artificial: false,
            kind: VariableKind::Local,
        });
        let fid = module.add_function(Function::new("f", Ty::I32));
        (module, fid, var)
    }

    #[test]
    fn bindings_of_null_or_zero_values_are_skipped() {
        let (mut module, fid, var) = test_module();
        let entry = module.functions[fid].add_block("entry");
        let mut b = Builder::at(&mut module, fid, entry, InsertPoint::BlockEnd);
        let zero = b.dbg_value(var, Value::i32(0));
        let live = b.dbg_value(var, Value::i32(7));
        let null = b.dbg_value(var, Value::Null(Ty::ptr_to(Ty::I32)));
        b.ret(Some(Value::i32(0)));

        let mut map = StackMap::new();
        for binding in [zero, live, null] {
            record_binding(&module, fid, &mut map, binding);
        }
        assert_eq!(map["x"].bindings, vec![live]);
    }

    #[test]
    fn foreign_scope_bindings_are_skipped() {
        let (mut module, fid, _) = test_module();
        let other = module.add_debug_variable(DebugVariable {
            name: "y".to_string(),
            scope: "other_function".to_string(),
            ty: None,
            artificial: false,
            kind: VariableKind::Local,
        });
        let entry = module.functions[fid].add_block("entry");
        let mut b = Builder::at(&mut module, fid, entry, InsertPoint::BlockEnd);
        let binding = b.dbg_value(other, Value::i32(3));
        b.ret(None);

        let mut map = StackMap::new();
        record_binding(&module, fid, &mut map, binding);
        assert!(map.is_empty());
    }

    #[test]
    fn select_prefers_a_stack_slot() {
        let (mut module, fid, var) = test_module();
        let entry = module.functions[fid].add_block("entry");
        let mut b = Builder::at(&mut module, fid, entry, InsertPoint::BlockEnd);
        let val_binding = b.dbg_value(var, Value::i32(1));
        let slot = b.alloca(Ty::I32, "x");
        let addr_binding = b.dbg_declare(var, Value::Inst(slot));
        b.ret(None);

        let trace = VariableTrace {
            variable: var,
            bindings: vec![val_binding, addr_binding],
        };
        let mut stats = PassStats::default();
        let mut shadow = HashMap::new();
        let mut resolver = Resolver::new(&mut module, fid);
        let picked = resolver.valid_def(&trace, entry, &mut shadow, &mut stats);
        assert_eq!(picked, Value::Inst(slot));
        assert_eq!(stats.extended_vars, 0);
        assert_eq!(stats.shadowed_vars, 0);
    }

    #[test]
    fn select_takes_the_last_definition_in_the_return_block() {
        let (mut module, fid, var) = test_module();
        let entry = module.functions[fid].add_block("entry");
        let exit = module.functions[fid].add_block("exit");
        {
            let mut b = Builder::at(&mut module, fid, entry, InsertPoint::BlockEnd);
            b.dbg_value(var, Value::i32(1));
            b.br(exit);
        }
        let (first, second) = {
            let mut b = Builder::at(&mut module, fid, exit, InsertPoint::BlockEnd);
            let first = b.dbg_value(var, Value::i32(2));
            let second = b.dbg_value(var, Value::i32(3));
            b.ret(None);
            (first, second)
        };
        let entry_binding = module.functions[fid].blocks[entry].insts[0];

        let trace = VariableTrace {
            variable: var,
            bindings: vec![entry_binding, first, second],
        };
        let mut stats = PassStats::default();
        let mut shadow = HashMap::new();
        let mut resolver = Resolver::new(&mut module, fid);
        let picked = resolver.valid_def(&trace, exit, &mut shadow, &mut stats);
        assert_eq!(picked, Value::i32(3));
    }

    /// Definitions only on the two arms of a diamond: no single one
    /// dominates the merge, so a merge node is materialized.
    #[test]
    fn extension_builds_a_merge_node_from_predecessor_definitions() {
        let (mut module, fid, var) = test_module();
        let entry = module.functions[fid].add_block("entry");
        let left = module.functions[fid].add_block("left");
        let right = module.functions[fid].add_block("right");
        let merge = module.functions[fid].add_block("merge");
        {
            let mut b = Builder::at(&mut module, fid, entry, InsertPoint::BlockEnd);
            b.cond_br(Value::i32(1), left, right);
        }
        let left_binding = {
            let mut b = Builder::at(&mut module, fid, left, InsertPoint::BlockEnd);
            let binding = b.dbg_value(var, Value::i32(10));
            b.br(merge);
            binding
        };
        let right_binding = {
            let mut b = Builder::at(&mut module, fid, right, InsertPoint::BlockEnd);
            let binding = b.dbg_value(var, Value::i32(20));
            b.br(merge);
            binding
        };
        module.functions[fid].set_terminator(merge, Terminator::Ret(None));

        let trace = VariableTrace {
            variable: var,
            bindings: vec![left_binding, right_binding],
        };
        let mut stats = PassStats::default();
        let mut shadow = HashMap::new();
        let mut resolver = Resolver::new(&mut module, fid);
        let picked = resolver.valid_def(&trace, merge, &mut shadow, &mut stats);

        let phi = picked.as_inst().expect("a merge node");
        let func = &module.functions[fid];
        assert_eq!(func.block_of(phi), merge);
        assert_eq!(func.blocks[merge].insts[0], phi);
        match &func.insts[phi].inst {
            Inst::Phi { incomings, .. } => {
                assert_eq!(incomings.len(), 2);
                assert!(incomings.contains(&(Value::i32(10), left)));
                assert!(incomings.contains(&(Value::i32(20), right)));
            }
            other => panic!("expected a phi, got {other:?}"),
        }
        assert_eq!(stats.extended_vars, 1);
    }

    /// A definition whose instruction lives outside its binding's block
    /// cannot be extended; the variable is shadowed instead.
    #[test]
    fn hoisted_binding_falls_back_to_a_shadow_slot() {
        let (mut module, fid, var) = test_module();
        let entry = module.functions[fid].add_block("entry");
        let body = module.functions[fid].add_block("body");
        let exit = module.functions[fid].add_block("exit");
        let def = {
            let mut b = Builder::at(&mut module, fid, entry, InsertPoint::BlockEnd);
            let def = b.cast(Value::i32(5), Ty::I64);
            b.cond_br(Value::i32(1), body, exit);
            def
        };
        let binding = {
            // Binding in `body`, value defined in `entry`.
            let mut b = Builder::at(&mut module, fid, body, InsertPoint::BlockEnd);
            let binding = b.dbg_value(var, Value::Inst(def));
            b.br(exit);
            binding
        };
        module.functions[fid].set_terminator(exit, Terminator::Ret(None));

        let trace = VariableTrace {
            variable: var,
            bindings: vec![binding],
        };
        let mut stats = PassStats::default();
        let mut shadow = HashMap::new();
        let mut resolver = Resolver::new(&mut module, fid);
        let picked = resolver.valid_def(&trace, exit, &mut shadow, &mut stats);

        let slot = picked.as_inst().expect("a shadow slot");
        let func = &module.functions[fid];
        assert!(matches!(func.insts[slot].inst, Inst::Alloca { .. }));
        assert_eq!(func.block_of(slot), entry);
        // Slot allocated and zero-initialized at the entry head.
        assert_eq!(func.blocks[entry].insts[0], slot);
        assert!(matches!(
            func.insts[func.blocks[entry].insts[1]].inst,
            Inst::Store { .. }
        ));
        // A store follows the definition, which lives in entry.
        let def_index = func.index_in_block(def);
        let after_def = func.blocks[entry].insts[def_index + 1];
        assert!(matches!(func.insts[after_def].inst, Inst::Store { .. }));
        assert_eq!(stats.shadowed_vars, 1);

        // Resolving again reuses the same slot.
        let mut resolver = Resolver::new(&mut module, fid);
        let again = resolver.valid_def(&trace, exit, &mut shadow, &mut stats);
        assert_eq!(again, Value::Inst(slot));
        assert_eq!(stats.shadowed_vars, 1);
    }
}
