//! Predecessor and dominance queries over a function's block graph.

use std::collections::HashMap;

use crate::module::{BlockId, Function};

/// Predecessor lists, indexed by block.
pub struct Predecessors {
    preds: HashMap<BlockId, Vec<BlockId>>,
}

impl Predecessors {
    pub fn compute(function: &Function) -> Self {
        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for id in function.blocks.ids() {
            preds.entry(id).or_default();
        }
        for (id, block) in function.blocks.iter() {
            if let Some(term) = &block.terminator {
                for succ in term.successors() {
                    preds.entry(succ).or_default().push(id);
                }
            }
        }
        Self { preds }
    }

    pub fn of(&self, block: BlockId) -> &[BlockId] {
        self.preds.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Dominator sets computed by the classic iterative dataflow:
/// dom(entry) = {entry}; dom(b) = {b} ∪ ⋂ dom(p) over predecessors p.
pub struct Dominators {
    // doms[b][d] == true iff block d dominates block b
    doms: Vec<Vec<bool>>,
}

impl Dominators {
    pub fn compute(function: &Function) -> Self {
        let n = function.blocks.len();
        let entry = match function.entry {
            Some(entry) => entry.index(),
            None => return Self { doms: Vec::new() },
        };
        let preds = Predecessors::compute(function);

        let mut doms = vec![vec![true; n]; n];
        doms[entry] = vec![false; n];
        doms[entry][entry] = true;

        let mut changed = true;
        while changed {
            changed = false;
            for (id, _) in function.blocks.iter() {
                let b = id.index();
                if b == entry {
                    continue;
                }
                let mut new_set = vec![true; n];
                let mut any_pred = false;
                for pred in preds.of(id) {
                    any_pred = true;
                    for d in 0..n {
                        new_set[d] = new_set[d] && doms[pred.index()][d];
                    }
                }
                if !any_pred {
                    // Unreachable block: dominated by everything, by
                    // convention of the iterative algorithm.
                    new_set = vec![true; n];
                }
                new_set[b] = true;
                if new_set != doms[b] {
                    doms[b] = new_set;
                    changed = true;
                }
            }
        }
        Self { doms }
    }

    /// Whether `dom` dominates `block` (reflexively).
    pub fn dominates(&self, dom: BlockId, block: BlockId) -> bool {
        self.doms
            .get(block.index())
            .map(|set| set[dom.index()])
            .unwrap_or(false)
    }
}
