// Copyright (c) 2017-2021 Fabian Schuiki

//! SSA Destruction

use crate::{analysis::PredecessorTable, opt::prelude::*};
use std::collections::HashMap;

/// SSA Destruction
///
/// This pass lowers phi nodes into copies, such that a backend without a
/// notion of phi nodes can consume the function. Every phi node is given a
/// register. Each predecessor writes the incoming value into the register
/// right before branching, and the uses of the phi read the register instead.
///
/// Critical edges are split first, such that the copies for an edge only
/// execute when control actually flows along that edge. The copies at the end
/// of a block form a parallel assignment. They are ordered such that no
/// register is overwritten before all copies have read it, and cycles are
/// broken with a temporary register.
pub struct SsaDestruction;

impl Pass for SsaDestruction {
    fn run_on_function(_ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        info!("SSA Destruction [{}]", func.name);
        if func.layout.first_block().is_none() {
            return false;
        }
        let split = split_critical_edges(func);

        // Assign a register to every phi.
        let phis: Vec<Inst> = func.blocks().flat_map(|bb| func.phis(bb)).collect();
        if phis.is_empty() {
            return split;
        }
        let mut regs = HashMap::new();
        for &phi in &phis {
            let result = func.dfg.inst_result(phi);
            let ty = func.dfg.value_type(result);
            let reg = func.dfg.add_reg(ty);
            if let Some(name) = func.dfg.get_name(result).map(String::from) {
                func.dfg.set_name(reg, name);
            }
            regs.insert(result, reg);
        }

        // Gather the copies each predecessor has to perform. Phi results read
        // as incoming values refer to the register of that phi.
        let mut copies: HashMap<Block, Vec<(Value, Value)>> = HashMap::new();
        let mut order = vec![];
        for &phi in &phis {
            let dst = regs[&func.dfg.inst_result(phi)];
            for (value, pred) in func.dfg[phi].phi_edges() {
                let src = regs.get(&value).cloned().unwrap_or(value);
                let list = copies.entry(pred).or_insert_with(|| {
                    order.push(pred);
                    vec![]
                });
                list.push((dst, src));
            }
        }

        // Insert the copies.
        for pred in order {
            let parallel = &copies[&pred];
            let sequential = sequentialize(parallel, |dst| {
                let ty = func.dfg.value_type(dst);
                func.dfg.add_reg(ty)
            });
            func.insert_before_terminator(pred);
            for (dst, src) in sequential {
                let inst = func.ins().copy(dst, src);
                trace!("Insert {} in {}", inst.dump(func), pred.dump(func));
            }
        }

        // Replace the phis with their registers.
        for phi in phis {
            let result = func.dfg.inst_result(phi);
            debug!("Lower {} to {}", phi.dump(func), regs[&result].dump(func));
            func.dfg.replace_use(result, regs[&result]);
            func.remove_inst(phi);
        }
        true
    }
}

/// Split the edges from a block with several successors to a block with
/// several predecessors by inserting a block on the edge.
///
/// Returns whether any edge was split.
pub fn split_critical_edges(func: &mut FunctionBuilder) -> bool {
    let pt = PredecessorTable::new(func);
    let edges: Vec<(Block, Block)> = func
        .blocks()
        .flat_map(|from| pt.succ(from).map(move |to| (from, to)))
        .filter(|&(from, to)| pt.is_critical_edge(from, to))
        .collect();
    for &(from, to) in &edges {
        let split = func.named_block_after("split", from);
        func.append_to(split);
        func.ins().br(to);
        if let Some(term) = func.terminator(from) {
            func.dfg.replace_block_within_inst(to, split, term);
        }
        for phi in func.phis(to) {
            func.dfg.replace_block_within_inst(from, split, phi);
        }
        debug!(
            "Split edge {} -> {} with {}",
            from.dump(func),
            to.dump(func),
            split.dump(func)
        );
    }
    !edges.is_empty()
}

/// Order a parallel assignment `dst := src` into a sequence of assignments.
///
/// Every destination must appear at most once. Copies whose destination is
/// still read by another copy are delayed. If only such copies remain, they
/// form cycles; one destination is saved in a temporary obtained from `temp`,
/// and the copies reading it read the temporary instead.
pub fn sequentialize<T, F>(copies: &[(T, T)], mut temp: F) -> Vec<(T, T)>
where
    T: Copy + Eq,
    F: FnMut(T) -> T,
{
    let mut pending: Vec<(T, T)> = copies
        .iter()
        .cloned()
        .filter(|&(dst, src)| dst != src)
        .collect();
    let mut sequence = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let free = pending
            .iter()
            .position(|&(dst, _)| !pending.iter().any(|&(_, src)| src == dst));
        match free {
            Some(index) => sequence.push(pending.remove(index)),
            None => {
                let (dst, _) = pending[0];
                let saved = temp(dst);
                sequence.push((saved, dst));
                for copy in &mut pending {
                    if copy.1 == dst {
                        copy.1 = saved;
                    }
                }
            }
        }
    }
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run a sequence of copies on a register file.
    fn run(state: &mut HashMap<u32, u32>, copies: &[(u32, u32)]) {
        for &(dst, src) in copies {
            let value = state.get(&src).cloned().unwrap_or(src * 1000);
            state.insert(dst, value);
        }
    }

    fn check(parallel: &[(u32, u32)]) -> Vec<(u32, u32)> {
        let mut next = 100;
        let sequence = sequentialize(parallel, |_| {
            next += 1;
            next
        });

        // The parallel semantics read every source before writing.
        let mut expected: HashMap<u32, u32> = (0..10).map(|r| (r, r * 1000)).collect();
        let reads: Vec<u32> = parallel.iter().map(|&(_, src)| expected[&src]).collect();
        for (&(dst, _), value) in parallel.iter().zip(reads) {
            expected.insert(dst, value);
        }

        let mut actual: HashMap<u32, u32> = (0..10).map(|r| (r, r * 1000)).collect();
        run(&mut actual, &sequence);
        for r in 0..10 {
            assert_eq!(actual[&r], expected[&r], "register {} after {:?}", r, sequence);
        }
        sequence
    }

    #[test]
    fn independent_copies_keep_their_count() {
        assert_eq!(check(&[(1, 2), (3, 4)]).len(), 2);
    }

    #[test]
    fn chains_are_ordered() {
        let sequence = check(&[(1, 2), (2, 3), (3, 4)]);
        assert_eq!(sequence, vec![(1, 2), (2, 3), (3, 4)]);
        let sequence = check(&[(3, 4), (2, 3), (1, 2)]);
        assert_eq!(sequence, vec![(1, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn swap_uses_a_temporary() {
        let sequence = check(&[(1, 2), (2, 1)]);
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence[0], (101, 1));
    }

    #[test]
    fn rotation_and_self_copy() {
        let sequence = check(&[(1, 2), (2, 3), (3, 1), (4, 4)]);
        assert_eq!(sequence.len(), 4);
    }
}
