// Copyright (c) 2017-2021 Fabian Schuiki

//! Aggressive Dead Code Elimination

use crate::opt::prelude::*;
use std::collections::HashSet;

/// Aggressive Dead Code Elimination
///
/// This pass assumes every instruction to be dead until proven otherwise.
/// Instructions with an observable effect (stores, loads, calls, copies, and
/// terminators) are live, and so is every instruction that produces an
/// operand of a live instruction. Everything else is removed, including
/// cycles of phi nodes and arithmetic that only feed each other.
pub struct AggressiveDeadCodeElim;

impl Pass for AggressiveDeadCodeElim {
    fn run_on_function(_ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        info!("ADCE [{}]", func.name);

        // Mark.
        let mut live = HashSet::new();
        let mut worklist: Vec<Inst> = func
            .all_insts()
            .filter(|&inst| func.dfg[inst].opcode().has_side_effects())
            .collect();
        while let Some(inst) = worklist.pop() {
            if !live.insert(inst) {
                continue;
            }
            for &arg in func.dfg[inst].args() {
                if let Some(producer) = func.dfg.get_value_inst(arg) {
                    if !live.contains(&producer) {
                        worklist.push(producer);
                    }
                }
            }
        }
        trace!("{} live instructions", live.len());

        // Sweep. Any remaining user of a dead instruction is dead as well,
        // so the uses are cut with `undef` before removal.
        let dead: Vec<Inst> = func
            .all_insts()
            .filter(|inst| !live.contains(inst))
            .collect();
        for &inst in &dead {
            debug!("Remove dead {}", inst.dump(func));
            func.delete_inst(inst);
        }
        !dead.is_empty()
    }
}
