// Copyright (c) 2017-2021 Fabian Schuiki

//! Loop Simplification

use crate::{
    analysis::{DominatorTree, LoopInfo},
    opt::prelude::*,
};

/// Loop Simplification
///
/// This pass gives every loop header that is entered from more than one
/// block outside the loop a dedicated preheader. The outside predecessors
/// branch to the preheader instead, which merges their incoming phi values
/// and branches on to the header. Other passes can then place loop-invariant
/// code at the end of the preheader.
pub struct LoopSimplify;

impl Pass for LoopSimplify {
    fn run_on_function(_ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        info!("LoopSimplify [{}]", func.name);
        if func.layout.first_block().is_none() {
            return false;
        }
        let mut modified = false;

        // Inserting a preheader changes the CFG, so the loops are rediscovered
        // after every insertion.
        loop {
            let domtree = DominatorTree::new(func);
            let loops = LoopInfo::new(func, &domtree);
            let next = loops.loops().iter().find_map(|lp| {
                let outside: Vec<Block> = func
                    .predecessors(lp.header)
                    .into_iter()
                    .filter(|&bb| !lp.contains(bb))
                    .collect();
                if outside.len() > 1 {
                    Some((lp.header, outside))
                } else {
                    None
                }
            });
            match next {
                Some((header, outside)) => insert_preheader(func, header, &outside),
                None => break,
            };
            modified = true;
        }
        modified
    }
}

/// Route the edges from `outside` to `header` through a new block.
///
/// Returns the new preheader.
pub fn insert_preheader(func: &mut FunctionBuilder, header: Block, outside: &[Block]) -> Block {
    let name = match func.block_name(header) {
        Some(name) => format!("{}.preheader", name),
        None => "preheader".to_owned(),
    };
    let preheader = match func.layout.prev_block(header) {
        Some(prev) => func.named_block_after(name, prev),
        None => func.named_block(name),
    };
    debug!(
        "Insert {} for {} entered from {}",
        preheader.dump(func),
        header.dump(func),
        outside.len()
    );

    // Split the header phis into a part merging the outside edges in the
    // preheader, and a part merging the preheader with the back edges.
    for phi in func.phis(header) {
        let edges: Vec<(Value, Block)> = func.dfg[phi]
            .phi_edges()
            .filter(|(_, bb)| outside.contains(bb))
            .collect();
        let first = edges[0].0;
        let merged = if edges.iter().all(|&(value, _)| value == first) {
            first
        } else {
            let ty = func.dfg.value_type(first);
            let (args, bbs): (Vec<Value>, Vec<Block>) = edges.iter().cloned().unzip();
            func.append_to(preheader);
            func.ins().phi_typed(ty, args, bbs)
        };
        for &(_, bb) in &edges {
            func.dfg.remove_phi_incoming(phi, bb);
        }
        func.dfg.add_phi_incoming(phi, merged, preheader);
    }

    for &bb in outside {
        if let Some(term) = func.terminator(bb) {
            func.dfg.replace_block_within_inst(header, preheader, term);
        }
    }
    func.append_to(preheader);
    func.ins().br(header);
    preheader
}
