// Copyright (c) 2017-2021 Fabian Schuiki

//! Dead Code Elimination

use crate::opt::prelude::*;

/// Dead Code Elimination
///
/// This pass removes instructions without side effects whose result is never
/// used. Removing an instruction may leave its operands unused in turn, so
/// their producers are revisited until nothing changes.
///
/// Dead cycles, like a phi node feeding an increment that feeds the phi node
/// again, keep each other alive. See `AggressiveDeadCodeElim` for a pass that
/// removes those as well.
pub struct DeadCodeElim;

impl Pass for DeadCodeElim {
    fn run_on_function(_ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        info!("DCE [{}]", func.name);
        let mut worklist: Vec<Inst> = func
            .all_insts()
            .filter(|&inst| !func.dfg[inst].opcode().has_side_effects())
            .collect();
        let mut modified = false;
        while let Some(inst) = worklist.pop() {
            // Earlier removals may have already taken care of this one, or
            // it may have gained a use since it was enqueued.
            if !func.dfg.has_inst(inst) || !is_dead(func, inst) {
                continue;
            }
            let producers: Vec<Inst> = func.dfg[inst]
                .args()
                .iter()
                .flat_map(|&arg| func.dfg.get_value_inst(arg))
                .filter(|&producer| producer != inst)
                .collect();
            debug!("Remove dead {}", inst.dump(func));
            func.remove_inst(inst);
            worklist.extend(producers);
            modified = true;
        }
        modified
    }
}

/// Check whether an instruction has no side effects and an unused result.
pub fn is_dead(func: &FunctionData, inst: Inst) -> bool {
    if func.dfg[inst].opcode().has_side_effects() {
        return false;
    }
    match func.dfg.get_inst_result(inst) {
        Some(result) => !func.dfg.has_uses(result),
        None => true,
    }
}
