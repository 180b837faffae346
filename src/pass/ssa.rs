// Copyright (c) 2017-2021 Fabian Schuiki

//! SSA Construction

use crate::{analysis::DominatorTree, ir::prelude::*, opt::prelude::*};
use std::collections::{HashMap, HashSet};

/// SSA Construction
///
/// This pass promotes stack slots to SSA values. It tries to replace `alloca`,
/// `load`, and `store` instructions with `phi` nodes placed on the dominance
/// frontier of the blocks that store to a slot, as described in [1].
///
/// Only slots whose address never escapes are promoted: every use must be the
/// pointer operand of a `load` or `store`. A load that no store reaches yields
/// `undef`. Phi nodes that end up feeding no other instruction are pruned, and
/// phi nodes that merge a single value are replaced by it.
///
/// [1]: https://doi.org/10.1145/115372.115320 "Cytron, Ron, et al. 'Efficiently computing static single assignment form and the control dependence graph.' ACM TOPLAS 13.4 (1991): 451-490."
pub struct SsaConstruction;

impl Pass for SsaConstruction {
    fn run_on_function(_ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        info!("SSA [{}]", func.name);
        if func.layout.first_block().is_none() {
            return false;
        }

        // Find the stack slots eligible for promotion.
        let slots = find_promotable_slots(func);
        if slots.is_empty() {
            return false;
        }
        let domtree = DominatorTree::new(func);
        let mut promo = Promotion::new(func, slots);
        trace!("Promoting {} slots", promo.slots.len());

        promo.place_phis(func, &domtree);
        promo.rename(func, &domtree);
        debug_assert!(domtree.is_current(func), "CFG changed during renaming");
        promo.fill_unreachable_edges(func, &domtree);
        promo.prune_phis(func);
        promo.install(func);
        true
    }
}

/// Find the `alloca` instructions whose address does not escape.
pub fn find_promotable_slots(func: &FunctionData) -> Vec<Inst> {
    func.all_insts()
        .filter(|&inst| func.dfg[inst].opcode() == Opcode::Alloca)
        .filter(|&inst| {
            let ptr = func.dfg.inst_result(inst);
            func.dfg.uses(ptr).iter().all(|&user| {
                let data = &func.dfg[user];
                match data.opcode() {
                    Opcode::Load => true,
                    Opcode::Store => data.args()[0] == ptr && data.args()[1] != ptr,
                    _ => false,
                }
            })
        })
        .collect()
}

/// The state of promoting a set of stack slots.
struct Promotion {
    /// The `alloca` instructions being promoted.
    slots: Vec<Inst>,
    /// The pointer value of each slot, mapped to the slot index.
    ptrs: HashMap<Value, usize>,
    /// The type of the value stored in each slot.
    tys: Vec<Type>,
    /// The loads and stores accessing promoted slots.
    accesses: Vec<Inst>,
    /// The phi nodes inserted into each block, with the slot they merge.
    phis: HashMap<Block, Vec<(Inst, usize)>>,
    /// All inserted phi nodes.
    inserted: Vec<Inst>,
}

impl Promotion {
    fn new(func: &FunctionData, slots: Vec<Inst>) -> Self {
        let mut ptrs = HashMap::new();
        let mut tys = vec![];
        let mut accesses = vec![];
        for (index, &slot) in slots.iter().enumerate() {
            let ptr = func.dfg.inst_result(slot);
            ptrs.insert(ptr, index);
            tys.push(func.dfg.value_type(ptr).unwrap_pointer().clone());
            accesses.extend(func.dfg.uses(ptr).iter().cloned());
        }
        accesses.sort();
        accesses.dedup();
        Self {
            slots,
            ptrs,
            tys,
            accesses,
            phis: HashMap::new(),
            inserted: vec![],
        }
    }

    /// Return the slot a load or store accesses, if it is being promoted.
    fn accessed_slot(&self, func: &FunctionData, inst: Inst) -> Option<usize> {
        let data = &func.dfg[inst];
        match data.opcode() {
            Opcode::Load | Opcode::Store => self.ptrs.get(&data.args()[0]).cloned(),
            _ => None,
        }
    }

    /// Insert empty phi nodes on the iterated dominance frontier of each
    /// slot's defining blocks.
    fn place_phis(&mut self, func: &mut FunctionBuilder, domtree: &DominatorTree) {
        let mut def_blocks: Vec<Vec<Block>> = vec![vec![]; self.slots.len()];
        for &inst in &self.accesses {
            if func.dfg[inst].opcode() != Opcode::Store {
                continue;
            }
            let bb = match func.inst_block(inst) {
                Some(bb) if domtree.is_reachable(bb) => bb,
                _ => continue,
            };
            let slot = self.ptrs[&func.dfg[inst].args()[0]];
            if !def_blocks[slot].contains(&bb) {
                def_blocks[slot].push(bb);
            }
        }

        for (slot, defs) in def_blocks.into_iter().enumerate() {
            let name = func
                .dfg
                .get_name(func.dfg.inst_result(self.slots[slot]))
                .map(String::from);
            let mut has_phi = HashSet::new();
            let mut visited: HashSet<Block> = defs.iter().cloned().collect();
            let mut worklist = defs;
            while let Some(bb) = worklist.pop() {
                for &df in domtree.frontier(bb) {
                    if !has_phi.insert(df) {
                        continue;
                    }
                    func.prepend_to(df);
                    let ty = self.tys[slot].clone();
                    let phi = match &name {
                        Some(name) => func.ins().name(name.clone()).phi_typed(ty, vec![], vec![]),
                        None => func.ins().phi_typed(ty, vec![], vec![]),
                    };
                    let inst = func.dfg.value_inst(phi);
                    debug!("Insert phi {} in {}", phi.dump(func), df.dump(func));
                    self.phis.entry(df).or_default().push((inst, slot));
                    self.inserted.push(inst);
                    if visited.insert(df) {
                        worklist.push(df);
                    }
                }
            }
        }
    }

    /// Walk the dominator tree in preorder, replacing loads with the reaching
    /// stored value and filling in the phi nodes of successor blocks.
    fn rename(&self, func: &mut FunctionBuilder, domtree: &DominatorTree) {
        enum Walk {
            Enter(Block),
            Exit(Vec<usize>),
        }

        let mut stacks: Vec<Vec<Value>> = vec![vec![]; self.slots.len()];
        let mut work = vec![Walk::Enter(domtree.root())];
        while let Some(step) = work.pop() {
            let bb = match step {
                Walk::Enter(bb) => bb,
                Walk::Exit(pushed) => {
                    for slot in pushed {
                        stacks[slot].pop();
                    }
                    continue;
                }
            };
            let mut pushed = vec![];

            // The phis of this block define new versions.
            for &(phi, slot) in self.phis.get(&bb).into_iter().flatten() {
                stacks[slot].push(func.dfg.inst_result(phi));
                pushed.push(slot);
            }

            // Loads read the current version, stores define a new one.
            let insts: Vec<Inst> = func.insts(bb).collect();
            for inst in insts {
                let slot = match self.accessed_slot(func, inst) {
                    Some(slot) => slot,
                    None => continue,
                };
                if func.dfg[inst].opcode() == Opcode::Store {
                    stacks[slot].push(func.dfg[inst].args()[1]);
                    pushed.push(slot);
                } else {
                    let value = self.current(func, &stacks, slot);
                    let load = func.dfg.inst_result(inst);
                    debug!("Replace {} with {}", load.dump(func), value.dump(func));
                    func.dfg.replace_use(load, value);
                }
            }

            // Fill in the incoming values of the successors' phis for the
            // edge from this block.
            for succ in func.successors(bb) {
                for &(phi, slot) in self.phis.get(&succ).into_iter().flatten() {
                    let value = self.current(func, &stacks, slot);
                    func.dfg.add_phi_incoming(phi, value, bb);
                }
            }

            work.push(Walk::Exit(pushed));
            for &child in domtree.children(bb).iter().rev() {
                work.push(Walk::Enter(child));
            }
        }
    }

    /// Return the current version of a slot, or `undef` if there is none.
    fn current(&self, func: &mut FunctionBuilder, stacks: &[Vec<Value>], slot: usize) -> Value {
        match stacks[slot].last() {
            Some(&value) => value,
            None => func.dfg.undef(self.tys[slot].clone()),
        }
    }

    /// Give every phi an `undef` entry for unreachable predecessors, and
    /// resolve loads in unreachable blocks to `undef`.
    fn fill_unreachable_edges(&self, func: &mut FunctionBuilder, domtree: &DominatorTree) {
        for &phi in &self.inserted {
            let bb = func.inst_block(phi).expect("phi not inserted");
            let ty = func.dfg.value_type(func.dfg.inst_result(phi));
            for pred in func.predecessors(bb) {
                if !domtree.is_reachable(pred) {
                    let undef = func.dfg.undef(ty.clone());
                    func.dfg.add_phi_incoming(phi, undef, pred);
                }
            }
        }
        for &inst in &self.accesses {
            if func.dfg[inst].opcode() != Opcode::Load {
                continue;
            }
            let load = func.dfg.inst_result(inst);
            if func.dfg.has_uses(load) {
                let ty = func.dfg.value_type(load);
                let undef = func.dfg.undef(ty);
                func.dfg.replace_use(load, undef);
            }
        }
    }

    /// Remove the inserted phis not transitively used by any instruction
    /// that survives promotion.
    fn prune_phis(&mut self, func: &mut FunctionBuilder) {
        let inserted: HashSet<Inst> = self.inserted.iter().cloned().collect();
        let accesses: HashSet<Inst> = self.accesses.iter().cloned().collect();
        let mut live = HashSet::new();
        let mut worklist: Vec<Inst> = self
            .inserted
            .iter()
            .cloned()
            .filter(|&phi| {
                let result = func.dfg.inst_result(phi);
                func.dfg
                    .uses(result)
                    .iter()
                    .any(|user| !inserted.contains(user) && !accesses.contains(user))
            })
            .collect();
        while let Some(phi) = worklist.pop() {
            if !live.insert(phi) {
                continue;
            }
            for &arg in func.dfg[phi].args() {
                if let Some(inst) = func.dfg.get_value_inst(arg) {
                    if inserted.contains(&inst) && !live.contains(&inst) {
                        worklist.push(inst);
                    }
                }
            }
        }

        let dead: Vec<Inst> = self
            .inserted
            .iter()
            .cloned()
            .filter(|phi| !live.contains(phi))
            .collect();
        for &phi in &dead {
            trace!("Prune useless {}", phi.dump(func));
            func.delete_inst(phi);
        }
        self.inserted.retain(|phi| live.contains(phi));
    }

    /// Delete the promoted slots and their accesses, then fold phis that
    /// merge a single value.
    fn install(&mut self, func: &mut FunctionBuilder) {
        for &inst in &self.accesses {
            trace!("Remove {}", inst.dump(func));
            func.delete_inst(inst);
        }
        for &slot in &self.slots {
            debug!("Remove {}", slot.dump(func));
            func.delete_inst(slot);
        }
        remove_trivial_phis(func, &self.inserted);
    }
}

/// Replace phis whose incoming values are all the same value, ignoring
/// references to the phi itself, with that value.
///
/// Returns how many phis were removed.
pub fn remove_trivial_phis(func: &mut FunctionBuilder, phis: &[Inst]) -> usize {
    let mut removed = 0;
    let mut worklist: Vec<Inst> = phis.to_vec();
    while let Some(phi) = worklist.pop() {
        if !func.dfg.has_inst(phi) {
            continue;
        }
        let result = func.dfg.inst_result(phi);
        let mut same = None;
        let mut trivial = true;
        for &arg in func.dfg[phi].args() {
            if arg == result || Some(arg) == same {
                continue;
            }
            if same.is_some() {
                trivial = false;
                break;
            }
            same = Some(arg);
        }
        if !trivial {
            continue;
        }
        let with = match same {
            Some(v) => v,
            None => {
                let ty = func.dfg.value_type(result);
                func.dfg.undef(ty)
            }
        };
        debug!("Replace trivial {} with {}", phi.dump(func), with.dump(func));

        // Phis using this one may become trivial in turn.
        let users: Vec<Inst> = func
            .dfg
            .uses(result)
            .iter()
            .cloned()
            .filter(|&user| user != phi && func.dfg[user].opcode().is_phi())
            .collect();
        func.dfg.replace_use(result, with);
        func.remove_inst(phi);
        removed += 1;
        worklist.extend(users);
    }
    removed
}
