// Copyright (c) 2017-2021 Fabian Schuiki

//! Control Flow Simplification

use crate::{
    analysis::PredecessorTable, opt::prelude::*, pass::ssa::remove_trivial_phis, table::TableKey,
};
use hibitset::BitSet;
use std::collections::HashSet;

/// Control Flow Simplification
///
/// This pass tries to do the following:
///
/// - Replace conditional branches on a constant with an unconditional branch
/// - Replace conditional branches with identical targets
/// - Remove blocks which cannot be reached from the entry
/// - Eliminate phi nodes with a single incoming edge, or which produce the
///   same value across all incoming edges
/// - Merge blocks into their predecessor if it has no other successor
///
/// The steps are repeated until none of them changes the function.
pub struct ControlFlowSimplification;

impl Pass for ControlFlowSimplification {
    fn run_on_function(_ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        info!("CFS [{}]", func.name);
        if func.layout.first_block().is_none() {
            return false;
        }
        let mut modified = false;
        loop {
            let mut changed = false;
            changed |= fold_branches(func);
            changed |= remove_unreachable_blocks(func);
            changed |= simplify_phis(func);
            changed |= merge_blocks(func);
            if !changed {
                break;
            }
            modified = true;
        }
        modified
    }
}

/// Turn conditional branches with a constant condition or identical targets
/// into unconditional ones.
fn fold_branches(func: &mut FunctionBuilder) -> bool {
    let mut modified = false;
    let blocks: Vec<Block> = func.blocks().collect();
    for bb in blocks {
        let term = match func.terminator(bb) {
            Some(term) if func.dfg[term].opcode() == Opcode::BrCond => term,
            _ => continue,
        };
        let cond = func.dfg[term].args()[0];
        let targets = func.dfg[term].blocks().to_vec();
        let (taken, dropped) = if targets[0] == targets[1] {
            (targets[0], None)
        } else {
            match func.dfg.get_const_int(cond) {
                Some(imm) if imm.is_zero() => (targets[1], Some(targets[0])),
                Some(_) => (targets[0], Some(targets[1])),
                None => continue,
            }
        };
        debug!("Replace {} with br {}", term.dump(func), taken.dump(func));
        func.insert_before(term);
        func.ins().br(taken);
        func.remove_inst(term);
        if let Some(dropped) = dropped {
            for phi in func.phis(dropped) {
                func.dfg.remove_phi_incoming(phi, bb);
            }
        }
        modified = true;
    }
    modified
}

/// Remove the blocks not reachable from the entry.
fn remove_unreachable_blocks(func: &mut FunctionBuilder) -> bool {
    let entry = func.entry();
    let mut reachable = BitSet::new();
    let mut stack = vec![entry];
    while let Some(bb) = stack.pop() {
        if reachable.add(bb.index() as u32) {
            continue;
        }
        stack.extend(func.successors(bb));
    }
    let dead: Vec<Block> = func
        .blocks()
        .filter(|bb| !reachable.contains(bb.index() as u32))
        .collect();
    if dead.is_empty() {
        return false;
    }

    // Cut the edges leaving the dead blocks first, such that no dead block is
    // still targeted when it is removed.
    for &bb in &dead {
        let succs = func.successors(bb);
        if let Some(term) = func.terminator(bb) {
            func.remove_inst(term);
        }
        for succ in succs {
            for phi in func.phis(succ) {
                func.dfg.remove_phi_incoming(phi, bb);
            }
        }
    }
    for bb in dead {
        debug!("Remove unreachable {}", bb.dump(func));
        func.remove_block(bb);
    }
    true
}

/// Replace phis with a single incoming value.
fn simplify_phis(func: &mut FunctionBuilder) -> bool {
    let phis: Vec<Inst> = func
        .blocks()
        .flat_map(|bb| func.phis(bb))
        .collect();
    remove_trivial_phis(func, &phis) > 0
}

/// Merge blocks into their predecessor if they are its only successor and it
/// is their only predecessor.
fn merge_blocks(func: &mut FunctionBuilder) -> bool {
    let entry = func.entry();
    let mut merged = HashSet::new();
    let mut modified = false;
    let blocks: Vec<Block> = func.blocks().collect();
    for bb in blocks {
        if bb == entry || merged.contains(&bb) {
            continue;
        }
        // Recomputed for every block, since each merge changes the edges.
        let pt = PredecessorTable::new(func);
        let pred = match pt.pred_set(bb) {
            &[pred] if pred != bb && pt.is_sole_succ(bb, pred) => pred,
            _ => continue,
        };
        let term = match func.terminator(pred) {
            Some(term) if func.dfg[term].opcode() == Opcode::Br => term,
            _ => continue,
        };
        debug!("Merge {} into {}", bb.dump(func), pred.dump(func));

        // With a single predecessor, every phi has a single incoming value.
        for phi in func.phis(bb) {
            let result = func.dfg.inst_result(phi);
            let with = match func.dfg[phi].phi_incoming(pred) {
                Some(value) if value != result => value,
                _ => {
                    let ty = func.dfg.value_type(result);
                    func.dfg.undef(ty)
                }
            };
            func.dfg.replace_use(result, with);
            func.remove_inst(phi);
        }

        func.remove_inst(term);
        let insts: Vec<Inst> = func.insts(bb).collect();
        for inst in insts {
            func.move_inst_to_end(inst, pred);
        }
        func.dfg.replace_block_use(bb, pred);
        func.remove_block(bb);
        merged.insert(bb);
        modified = true;
    }
    modified
}
