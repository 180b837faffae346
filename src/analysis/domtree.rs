// Copyright (c) 2017-2021 Fabian Schuiki

use crate::{analysis::PredecessorTable, ir::prelude::*, table::TableKey};
use hibitset::BitSet;
use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicU64, Ordering},
};

/// A block dominator tree.
///
/// Records for every block which other blocks in the CFG *have* to be traversed
/// to reach it, together with the dominance frontier and the depth of every
/// block in the tree. Blocks not reachable from the entry are not part of the
/// tree: they have no dominator, no children, and an empty frontier.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// Reachable blocks in reverse post-order. The entry comes first.
    rpo: Vec<Block>,
    /// Reverse post-order index for each block.
    rpo_index: Vec<u32>,
    /// Immediate dominator for each block.
    idoms: Vec<Option<Block>>,
    /// Blocks immediately dominated by each block, in reverse post-order.
    children: Vec<Vec<Block>>,
    /// Dominance frontier of each block.
    frontiers: Vec<BTreeSet<Block>>,
    /// Depth of each block in the tree.
    levels: Vec<usize>,
    /// The CFG epoch this tree was computed for.
    epoch: u64,
}

const UNDEF: u32 = std::u32::MAX;

impl DominatorTree {
    /// Compute the dominator tree of a function.
    ///
    /// Panics if the function has no entry block.
    pub fn new(func: &FunctionData) -> Self {
        let pred = PredecessorTable::new(func);
        Self::with_predtbl(func, &pred)
    }

    /// Compute the dominator tree of a function, given its predecessor table.
    ///
    /// This implementation is based on [1].
    ///
    /// [1]: https://www.cs.rice.edu/~keith/Embed/dom.pdf "Cooper, Keith D., Timothy J. Harvey, and Ken Kennedy. 'A simple, fast dominance algorithm.' Software Practice & Experience 4.1-10 (2001): 1-8."
    pub fn with_predtbl(func: &FunctionData, pred: &PredecessorTable) -> Self {
        let t0 = time::precise_time_ns();
        let entry = func.entry();
        let bound = func.block_id_bound();

        let mut rpo = Self::compute_blocks_post_order(func, pred, entry);
        rpo.reverse();
        let length = rpo.len();
        let mut rpo_index = vec![UNDEF; bound];
        for (i, &bb) in rpo.iter().enumerate() {
            rpo_index[bb.index()] = i as u32;
        }
        trace!("[DomTree] reverse post-order {:?}", rpo);

        // Immediate dominators in terms of RPO indices. The entry is its own
        // dominator during the fixpoint iteration.
        let mut doms = vec![UNDEF; length];
        doms[0] = 0;
        let mut changed = true;
        while changed {
            changed = false;
            for idx in 1..length {
                let bb = rpo[idx];
                let mut preds = pred
                    .pred(bb)
                    .map(|id| rpo_index[id.index()])
                    .filter(|&p| p != UNDEF && doms[p as usize] != UNDEF);
                let first = match preds.next() {
                    Some(p) => p,
                    None => panic!("reachable {} has no processed predecessor", bb),
                };
                let new_idom = preds.fold(first, |mut i1, mut i2| {
                    while i1 != i2 {
                        while i1 > i2 {
                            i1 = doms[i1 as usize];
                        }
                        while i2 > i1 {
                            i2 = doms[i2 as usize];
                        }
                    }
                    i1
                });
                if doms[idx] != new_idom {
                    doms[idx] = new_idom;
                    changed = true;
                }
            }
        }
        trace!("[DomTree] converged {:?}", doms);

        let mut idoms = vec![None; bound];
        let mut children = vec![vec![]; bound];
        let mut levels = vec![0; bound];
        for (idx, &bb) in rpo.iter().enumerate().skip(1) {
            let idom = rpo[doms[idx] as usize];
            idoms[bb.index()] = Some(idom);
            children[idom.index()].push(bb);
            levels[bb.index()] = levels[idom.index()] + 1;
        }

        // Walk up from every predecessor of a join point until the join's
        // immediate dominator is reached. The entry has no dominator, so the
        // walk for it runs through the root.
        let mut frontiers = vec![BTreeSet::new(); bound];
        for &bb in &rpo {
            let stop = idoms[bb.index()];
            for p in pred.pred(bb) {
                if rpo_index[p.index()] == UNDEF {
                    continue;
                }
                let mut runner = p;
                while Some(runner) != stop {
                    frontiers[runner.index()].insert(bb);
                    runner = match idoms[runner.index()] {
                        Some(up) => up,
                        None => break,
                    };
                }
            }
        }

        let t1 = time::precise_time_ns();
        DOMINATOR_TREE_TIME.fetch_add(t1 - t0, Ordering::Relaxed);
        trace!(
            "Dominator Tree of @{} constructed in {} ms",
            func.name,
            (t1 - t0) as f64 * 1.0e-6
        );

        Self {
            rpo,
            rpo_index,
            idoms,
            children,
            frontiers,
            levels,
            epoch: func.dfg.cfg_epoch(),
        }
    }

    fn compute_blocks_post_order(
        func: &FunctionData,
        pred: &PredecessorTable,
        entry: Block,
    ) -> Vec<Block> {
        let bound = func.block_id_bound();
        let mut order = Vec::with_capacity(bound);

        let mut stack = Vec::with_capacity(8);
        let mut discovered = BitSet::with_capacity(bound as u32);
        let mut finished = BitSet::with_capacity(bound as u32);

        stack.push(entry);
        while let Some(&next) = stack.last() {
            if !discovered.add(next.index() as u32) {
                // Push in reverse so the first successor is explored first.
                for succ in pred.succ_set(next).iter().rev() {
                    if !discovered.contains(succ.index() as u32) {
                        stack.push(*succ);
                    }
                }
            } else {
                stack.pop();
                if !finished.add(next.index() as u32) {
                    order.push(next);
                }
            }
        }

        order
    }

    /// Get the root of the tree, which is the function's entry block.
    pub fn root(&self) -> Block {
        self.rpo[0]
    }

    /// Get the reachable blocks in reverse post-order.
    pub fn blocks_reverse_post_order(&self) -> &[Block] {
        &self.rpo
    }

    /// Get the reverse post-order index of a block, if it is reachable.
    pub fn block_order(&self, bb: Block) -> Option<usize> {
        match self.rpo_index.get(bb.index()) {
            Some(&idx) if idx != UNDEF => Some(idx as usize),
            _ => None,
        }
    }

    /// Check if a block is reachable from the entry.
    pub fn is_reachable(&self, bb: Block) -> bool {
        self.block_order(bb).is_some()
    }

    /// Get the immediate dominator of a block.
    ///
    /// Returns `None` for the entry and for unreachable blocks.
    pub fn immediate_dominator(&self, bb: Block) -> Option<Block> {
        self.idoms.get(bb.index()).cloned().flatten()
    }

    /// Get the blocks immediately dominated by a block.
    pub fn children(&self, bb: Block) -> &[Block] {
        &self.children[bb.index()]
    }

    /// Get the dominance frontier of a block.
    pub fn frontier(&self, bb: Block) -> &BTreeSet<Block> {
        &self.frontiers[bb.index()]
    }

    /// Get the depth of a block in the tree. The entry has level 0.
    pub fn level(&self, bb: Block) -> usize {
        self.levels[bb.index()]
    }

    /// Check if a block dominates another.
    ///
    /// Every reachable block dominates itself. Unreachable blocks neither
    /// dominate nor are dominated.
    pub fn dominates(&self, dominator: Block, follower: Block) -> bool {
        if !self.is_reachable(dominator) || !self.is_reachable(follower) {
            return false;
        }
        let target = self.level(dominator);
        let mut bb = follower;
        while self.level(bb) > target {
            bb = match self.immediate_dominator(bb) {
                Some(up) => up,
                None => return false,
            };
        }
        bb == dominator
    }

    /// Check if a block dominates another, distinct block.
    pub fn strictly_dominates(&self, dominator: Block, follower: Block) -> bool {
        dominator != follower && self.dominates(dominator, follower)
    }

    /// Get the blocks of the tree in preorder.
    ///
    /// Children are visited in reverse post-order.
    pub fn preorder(&self) -> Vec<Block> {
        let mut order = Vec::with_capacity(self.rpo.len());
        let mut stack = vec![self.root()];
        while let Some(bb) = stack.pop() {
            order.push(bb);
            stack.extend(self.children(bb).iter().rev().cloned());
        }
        order
    }

    /// Check if an instruction dominates a block.
    pub fn inst_dominates_block(&self, func: &FunctionData, inst: Inst, block: Block) -> bool {
        match func.inst_block(inst) {
            Some(bb) => self.dominates(bb, block),
            None => false,
        }
    }

    /// Check if an instruction dominates another.
    ///
    /// Within a block the earlier instruction dominates the later one.
    pub fn inst_dominates_inst(&self, func: &FunctionData, inst: Inst, user: Inst) -> bool {
        let (bb, user_bb) = match (func.inst_block(inst), func.inst_block(user)) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };
        if bb != user_bb {
            return self.dominates(bb, user_bb);
        }
        func.insts(bb)
            .find(|&i| i == inst || i == user)
            .map(|i| i == inst)
            .unwrap_or(false)
    }

    /// Check if a value dominates a block.
    ///
    /// Arguments, constants, and undefined values dominate every block.
    pub fn value_dominates_block(&self, func: &FunctionData, value: Value, block: Block) -> bool {
        match func.dfg[value] {
            ValueData::Inst { inst, .. } => self.inst_dominates_block(func, inst, block),
            _ => true,
        }
    }

    /// Get the CFG epoch this tree was computed for.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Check whether the function's CFG is unchanged since this tree was
    /// computed.
    pub fn is_current(&self, func: &FunctionData) -> bool {
        self.epoch == func.dfg.cfg_epoch()
    }
}

/// Total time spent constructing dominator trees.
pub static DOMINATOR_TREE_TIME: AtomicU64 = AtomicU64::new(0);
