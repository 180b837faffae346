// Copyright (c) 2017-2021 Fabian Schuiki

//! Operator Strength Reduction

use crate::{analysis::DominatorTree, opt::prelude::*};
use std::collections::{HashMap, HashSet};

/// Operator Strength Reduction
///
/// This pass finds induction variables and replaces arithmetic on them with
/// new induction variables that compute the result incrementally, as
/// described in [1]. A multiplication of a loop counter with a constant
/// becomes an additional counter that advances by the scaled step.
///
/// The strongly connected components of the SSA graph are visited such that
/// the operands of an instruction are classified before the instruction
/// itself. A component is an induction variable if it consists of a single
/// phi node and additions or subtractions of values that are constant within
/// the loop.
///
/// [1]: https://doi.org/10.1145/504709.504710 "Cooper, Keith D., L. Taylor Simpson, and Christopher A. Vick. 'Operator strength reduction.' ACM TOPLAS 23.5 (2001): 603-625."
pub struct StrengthReduction;

impl Pass for StrengthReduction {
    fn run_on_function(_ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        info!("OSR [{}]", func.name);
        if func.layout.first_block().is_none() {
            return false;
        }
        let domtree = DominatorTree::new(func);
        let sccs = find_sccs(func, &domtree);
        trace!("{} strongly connected components", sccs.len());
        let mut reducer = Reducer {
            domtree: &domtree,
            header: HashMap::new(),
            memo: HashMap::new(),
            modified: false,
        };
        for scc in sccs {
            reducer.process(func, &scc);
            debug_assert!(domtree.is_current(func));
        }
        reducer.modified
    }
}

/// Find the strongly connected components of the graph formed by the
/// instructions in reachable blocks, with an edge from every instruction to
/// the instructions producing its operands.
///
/// The components are returned such that every component comes after the
/// components it depends on.
pub fn find_sccs(func: &FunctionData, domtree: &DominatorTree) -> Vec<Vec<Inst>> {
    let operands = |inst: Inst| -> Vec<Inst> {
        func.dfg[inst]
            .args()
            .iter()
            .flat_map(|&arg| func.dfg.get_value_inst(arg))
            .filter(|&def| {
                func.inst_block(def)
                    .map(|bb| domtree.is_reachable(bb))
                    .unwrap_or(false)
            })
            .collect()
    };

    let mut next = 0;
    let mut index: HashMap<Inst, usize> = HashMap::new();
    let mut low: HashMap<Inst, usize> = HashMap::new();
    let mut on_stack: HashSet<Inst> = HashSet::new();
    let mut stack: Vec<Inst> = vec![];
    let mut sccs = vec![];

    for &bb in domtree.blocks_reverse_post_order() {
        for root in func.insts(bb) {
            if index.contains_key(&root) {
                continue;
            }
            let mut work: Vec<(Inst, Vec<Inst>, usize)> = vec![];
            index.insert(root, next);
            low.insert(root, next);
            next += 1;
            stack.push(root);
            on_stack.insert(root);
            work.push((root, operands(root), 0));

            while let Some((node, succs, pos)) = work.last_mut() {
                let node = *node;
                if *pos < succs.len() {
                    let succ = succs[*pos];
                    *pos += 1;
                    if !index.contains_key(&succ) {
                        index.insert(succ, next);
                        low.insert(succ, next);
                        next += 1;
                        stack.push(succ);
                        on_stack.insert(succ);
                        work.push((succ, operands(succ), 0));
                    } else if on_stack.contains(&succ) {
                        let l = low[&node].min(index[&succ]);
                        low.insert(node, l);
                    }
                    continue;
                }

                work.pop();
                if let Some((parent, _, _)) = work.last() {
                    let l = low[parent].min(low[&node]);
                    low.insert(*parent, l);
                }
                if low[&node] == index[&node] {
                    let mut scc = vec![];
                    while let Some(member) = stack.pop() {
                        on_stack.remove(&member);
                        scc.push(member);
                        if member == node {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
            }
        }
    }
    sccs
}

/// The state of reducing the induction variables of a function.
struct Reducer<'a> {
    domtree: &'a DominatorTree,
    /// The loop header of each value known to be an induction variable.
    header: HashMap<Value, Block>,
    /// The values computed for `(iv, opcode, operand)` so far.
    memo: HashMap<(Value, Opcode, Value), Value>,
    modified: bool,
}

impl Reducer<'_> {
    fn process(&mut self, func: &mut FunctionBuilder, scc: &[Inst]) {
        if scc.len() > 1 {
            if let Some(header) = self.classify_iv(func, scc) {
                trace!("Induction variable in {}", header.dump(func));
                for &inst in scc {
                    let result = func.dfg.inst_result(inst);
                    self.header.insert(result, header);
                }
                return;
            }
        }
        for &inst in scc {
            if func.dfg.has_inst(inst) {
                self.process_single(func, inst);
            }
        }
    }

    /// Check whether a component forms an induction variable, and return the
    /// loop header it belongs to.
    fn classify_iv(&self, func: &FunctionData, scc: &[Inst]) -> Option<Block> {
        let mut phis = scc.iter().filter(|&&inst| func.dfg[inst].opcode().is_phi());
        let phi = *phis.next()?;
        if phis.next().is_some() {
            return None;
        }
        let header = func.inst_block(phi)?;
        self.domtree.immediate_dominator(header)?;

        let members: HashSet<Value> = scc.iter().map(|&inst| func.dfg.inst_result(inst)).collect();
        for &inst in scc {
            let data = &func.dfg[inst];
            if !func.dfg.value_type(func.dfg.inst_result(inst)).is_int() {
                return None;
            }
            let args = data.args();
            let ok = match data.opcode() {
                Opcode::Phi => args
                    .iter()
                    .all(|&arg| members.contains(&arg) || self.is_region_const(func, arg, header)),
                Opcode::Add => {
                    (members.contains(&args[0]) && self.is_region_const(func, args[1], header))
                        || (members.contains(&args[1])
                            && self.is_region_const(func, args[0], header))
                }
                Opcode::Sub => {
                    members.contains(&args[0]) && self.is_region_const(func, args[1], header)
                }
                _ => false,
            };
            if !ok {
                return None;
            }
        }
        Some(header)
    }

    /// Check whether a value does not change while the loop at `header`
    /// runs.
    fn is_region_const(&self, func: &FunctionData, value: Value, header: Block) -> bool {
        match &func.dfg[value] {
            ValueData::Const { .. } | ValueData::Arg { .. } => true,
            ValueData::Inst { inst, .. } => func
                .inst_block(*inst)
                .map(|bb| self.domtree.strictly_dominates(bb, header))
                .unwrap_or(false),
            ValueData::Undef { .. } | ValueData::Reg { .. } => false,
        }
    }

    /// Return the operands of a candidate `iv * rc`, `iv + rc`, or `iv - rc`,
    /// with the induction variable first.
    fn candidate(&self, func: &FunctionData, inst: Inst) -> Option<(Value, Value)> {
        let data = &func.dfg[inst];
        let args = data.args();
        let is_iv_with_rc = |iv: Value, rc: Value| match self.header.get(&iv) {
            Some(&header) => self.is_region_const(func, rc, header),
            None => false,
        };
        match data.opcode() {
            Opcode::Add | Opcode::Mul => {
                if is_iv_with_rc(args[0], args[1]) {
                    Some((args[0], args[1]))
                } else if is_iv_with_rc(args[1], args[0]) {
                    Some((args[1], args[0]))
                } else {
                    None
                }
            }
            Opcode::Sub if is_iv_with_rc(args[0], args[1]) => Some((args[0], args[1])),
            _ => None,
        }
    }

    fn process_single(&mut self, func: &mut FunctionBuilder, inst: Inst) {
        let (iv, rc) = match self.candidate(func, inst) {
            Some(operands) => operands,
            None => return,
        };
        let opcode = func.dfg[inst].opcode();
        let result = func.dfg.inst_result(inst);
        let reduced = self.reduce(func, opcode, iv, rc);
        debug!("Reduce {} to {}", inst.dump(func), reduced.dump(func));
        func.dfg.replace_use(result, reduced);
        func.remove_inst(inst);
        self.modified = true;
    }

    /// Create an induction variable that computes `iv <opcode> rc`.
    fn reduce(&mut self, func: &mut FunctionBuilder, opcode: Opcode, iv: Value, rc: Value) -> Value {
        if let Some(&value) = self.memo.get(&(iv, opcode, rc)) {
            return value;
        }
        let header = self.header[&iv];
        let def = func.dfg.value_inst(iv);
        let data = func.dfg[def].clone();
        let ty = func.dfg.value_type(iv);
        func.insert_after(def);
        let inst = func.build_inst(data.clone(), ty);
        let result = func.dfg.inst_result(inst);
        trace!("Clone {} as {}", def.dump(func), result.dump(func));
        self.memo.insert((iv, opcode, rc), result);
        self.header.insert(result, header);

        for (index, &operand) in data.args().iter().enumerate() {
            if self.header.get(&operand) == Some(&header) {
                let reduced = self.reduce(func, opcode, operand, rc);
                func.dfg.set_arg(inst, index, reduced);
            } else if data.opcode().is_phi() || opcode == Opcode::Mul {
                let applied = self.apply(func, opcode, operand, rc, header);
                func.dfg.set_arg(inst, index, applied);
            }
        }
        result
    }

    /// Compute `a <opcode> b` for use as a loop-invariant operand of the loop
    /// at `header`.
    fn apply(
        &mut self,
        func: &mut FunctionBuilder,
        opcode: Opcode,
        a: Value,
        b: Value,
        header: Block,
    ) -> Value {
        if let Some(&value) = self.memo.get(&(a, opcode, b)) {
            return value;
        }
        if let Some(&iv_header) = self.header.get(&a) {
            if self.is_region_const(func, b, iv_header) {
                return self.reduce(func, opcode, a, b);
            }
        }
        if opcode.is_commutative() {
            if let Some(&iv_header) = self.header.get(&b) {
                if self.is_region_const(func, a, iv_header) {
                    return self.reduce(func, opcode, b, a);
                }
            }
        }

        let folded = match (func.dfg.get_const_int(a), func.dfg.get_const_int(b)) {
            (Some(x), Some(y)) => IntValue::try_binary_op(opcode, x, y),
            _ => None,
        };
        let result = match folded {
            Some(imm) => func.dfg.const_int(imm),
            None => {
                let bb = match self.domtree.immediate_dominator(header) {
                    Some(bb) => bb,
                    None => panic!("loop header {} has no dominator", header),
                };
                func.insert_before_terminator(bb);
                let value = func.ins().binary(opcode, a, b);
                trace!("Materialize {} in {}", value.dump(func), bb.dump(func));
                value
            }
        };
        self.memo.insert((a, opcode, b), result);
        result
    }
}
