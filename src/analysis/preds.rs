// Copyright (c) 2017-2021 Fabian Schuiki

use crate::ir::prelude::*;
use std::collections::HashMap;

/// A table of basic block predecessors and successors.
///
/// A snapshot of the CFG edges of a function. Passes that rewrite terminators
/// while walking the CFG consult the table instead of the live use lists.
#[derive(Debug, Clone)]
pub struct PredecessorTable {
    pred: HashMap<Block, Vec<Block>>,
    succ: HashMap<Block, Vec<Block>>,
}

impl PredecessorTable {
    /// Compute the predecessor table for a function.
    pub fn new(func: &FunctionData) -> Self {
        let mut pred: HashMap<Block, Vec<Block>> = HashMap::new();
        let mut succ = HashMap::new();
        for bb in func.blocks() {
            pred.entry(bb).or_default();
        }
        for bb in func.blocks() {
            let succs = func.successors(bb);
            for &to_bb in &succs {
                pred.entry(to_bb).or_default().push(bb);
            }
            succ.insert(bb, succs);
        }
        for preds in pred.values_mut() {
            preds.sort();
            preds.dedup();
        }
        Self { pred, succ }
    }

    /// Get the predecessors of a block.
    pub fn pred_set(&self, bb: Block) -> &[Block] {
        &self.pred[&bb]
    }

    /// Get the successors of a block.
    pub fn succ_set(&self, bb: Block) -> &[Block] {
        &self.succ[&bb]
    }

    /// Get the predecessors of a block.
    pub fn pred(&self, bb: Block) -> impl Iterator<Item = Block> + Clone + '_ {
        self.pred[&bb].iter().cloned()
    }

    /// Get the successors of a block.
    pub fn succ(&self, bb: Block) -> impl Iterator<Item = Block> + Clone + '_ {
        self.succ[&bb].iter().cloned()
    }

    /// Check if a block is the sole predecessor of another block.
    pub fn is_sole_pred(&self, bb: Block, pred_of: Block) -> bool {
        self.pred(pred_of).all(|x| x == bb)
    }

    /// Check if a block is the sole successor of another block.
    pub fn is_sole_succ(&self, bb: Block, succ_of: Block) -> bool {
        self.succ(succ_of).all(|x| x == bb)
    }

    /// Check whether the edge `from -> to` is critical, i.e. `from` has
    /// multiple successors and `to` has multiple predecessors.
    pub fn is_critical_edge(&self, from: Block, to: Block) -> bool {
        self.succ[&from].len() > 1 && self.pred[&to].len() > 1
    }
}
