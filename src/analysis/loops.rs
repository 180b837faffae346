// Copyright (c) 2017-2021 Fabian Schuiki

//! Natural loop discovery.

use crate::{
    analysis::{DominatorTree, PredecessorTable},
    ir::prelude::*,
};
use std::collections::{BTreeSet, HashMap};

/// A natural loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    /// The block all back edges of the loop lead to.
    pub header: Block,
    /// The sources of the back edges.
    pub latches: Vec<Block>,
    /// The blocks of the loop, header included.
    pub body: BTreeSet<Block>,
    /// The single outside predecessor of the header, if there is one and the
    /// header has exactly two predecessors.
    pub preheader: Option<Block>,
    /// Blocks outside the loop that are targeted from within.
    pub exits: BTreeSet<Block>,
    /// The innermost loop enclosing this one.
    pub parent: Option<usize>,
    /// The nesting depth. Outermost loops have depth 1.
    pub depth: usize,
}

impl Loop {
    /// Check whether a block belongs to the loop.
    pub fn contains(&self, bb: Block) -> bool {
        self.body.contains(&bb)
    }
}

/// The natural loops of a function.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    loops: Vec<Loop>,
    headers: HashMap<Block, usize>,
    epoch: u64,
}

impl LoopInfo {
    /// Discover the natural loops of a function.
    ///
    /// A back edge is an edge `p -> h` where `h` dominates `p`. Back edges
    /// sharing a header form one loop. Loops are listed in reverse post-order
    /// of their headers, so outer loops precede the loops they contain.
    pub fn new(func: &FunctionData, domtree: &DominatorTree) -> Self {
        assert!(
            domtree.is_current(func),
            "dominator tree of @{} is stale",
            func.name
        );
        let pred = PredecessorTable::new(func);
        let mut loops = vec![];
        let mut headers = HashMap::new();

        for &header in domtree.blocks_reverse_post_order() {
            let latches: Vec<Block> = pred
                .pred(header)
                .filter(|&p| domtree.dominates(header, p))
                .collect();
            if latches.is_empty() {
                continue;
            }

            // Walk backwards from the latches until the header is hit.
            let mut body = BTreeSet::new();
            body.insert(header);
            let mut worklist: Vec<Block> = latches.clone();
            while let Some(bb) = worklist.pop() {
                if !body.insert(bb) {
                    continue;
                }
                worklist.extend(pred.pred(bb).filter(|&p| domtree.is_reachable(p)));
            }

            let outside: Vec<Block> = pred.pred(header).filter(|p| !body.contains(p)).collect();
            let preheader = if pred.pred_set(header).len() == 2 && outside.len() == 1 {
                Some(outside[0])
            } else {
                None
            };

            let exits = body
                .iter()
                .flat_map(|&bb| pred.succ(bb))
                .filter(|bb| !body.contains(bb))
                .collect();

            trace!(
                "Loop at {} with latches {:?}, body {:?}",
                header,
                latches,
                body
            );
            headers.insert(header, loops.len());
            loops.push(Loop {
                header,
                latches,
                body,
                preheader,
                exits,
                parent: None,
                depth: 1,
            });
        }

        // The parent of a loop is the smallest other loop containing its
        // header. Outer loops come first, so depths resolve in order.
        for i in 0..loops.len() {
            let header = loops[i].header;
            let parent = (0..loops.len())
                .filter(|&j| j != i && loops[j].contains(header))
                .min_by_key(|&j| loops[j].body.len());
            if let Some(parent) = parent {
                loops[i].parent = Some(parent);
                loops[i].depth = loops[parent].depth + 1;
            }
        }

        Self {
            loops,
            headers,
            epoch: func.dfg.cfg_epoch(),
        }
    }

    /// Get all loops.
    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    /// Get the number of loops.
    pub fn len(&self) -> usize {
        self.loops.len()
    }

    /// Check whether the function has no loops.
    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Get the loop headed by a block.
    pub fn loop_for_header(&self, bb: Block) -> Option<&Loop> {
        self.headers.get(&bb).map(|&i| &self.loops[i])
    }

    /// Check whether a block is a loop header.
    pub fn is_header(&self, bb: Block) -> bool {
        self.headers.contains_key(&bb)
    }

    /// Get the innermost loop containing a block.
    pub fn innermost_loop(&self, bb: Block) -> Option<&Loop> {
        self.loops
            .iter()
            .filter(|l| l.contains(bb))
            .max_by_key(|l| l.depth)
    }

    /// Get the loop nesting depth of a block. Blocks outside any loop have
    /// depth 0.
    pub fn loop_depth(&self, bb: Block) -> usize {
        self.innermost_loop(bb).map(|l| l.depth).unwrap_or(0)
    }

    /// Check whether the function's CFG is unchanged since the loops were
    /// discovered.
    pub fn is_current(&self, func: &FunctionData) -> bool {
        self.epoch == func.dfg.cfg_epoch()
    }
}
