// Copyright (c) 2017-2021 Fabian Schuiki

//! Sparse Conditional Constant Propagation

use crate::opt::prelude::*;
use std::collections::{HashMap, HashSet};

/// Sparse Conditional Constant Propagation
///
/// This pass determines which values are constant and which blocks may
/// execute at all, as described in [1]. Values start out undefined and only
/// ever move up the lattice as the blocks defining or feeding them are proven
/// executable. Afterwards, constant values replace their uses and
/// conditional branches whose condition is constant become unconditional.
///
/// When run on a module, calls to functions of the same module are evaluated
/// by analyzing the callee with the call's argument values, up to the nesting
/// depth configured in the `PassContext`. Callees already under analysis are
/// assumed to return a non-constant value.
///
/// [1]: https://doi.org/10.1145/103135.103136 "Wegman, Mark N., and F. Kenneth Zadeck. 'Constant propagation with conditional branches.' ACM TOPLAS 13.2 (1991): 181-210."
pub struct SparseCondConstProp;

impl Pass for SparseCondConstProp {
    /// Analyze one function at a time, since evaluating calls reads the other
    /// functions of the module.
    fn run_on_module(ctx: &PassContext, module: &mut Module) -> bool {
        let mut modified = false;
        for id in module.func_ids() {
            let facts = {
                let func = module.function(id);
                info!("SCCP [{}]", func.name);
                if func.layout.first_block().is_none() {
                    continue;
                }
                analyze(ctx, func, Some(module))
            };
            modified |= facts.apply(&mut module.builder(id));
        }
        modified
    }

    fn run_on_function(ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        info!("SCCP [{}]", func.name);
        if func.layout.first_block().is_none() {
            return false;
        }
        let facts = analyze(ctx, func, None);
        facts.apply(func)
    }
}

/// The knowledge about a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lattice {
    /// No definition has been seen yet.
    Undef,
    /// The value is known to be this constant.
    Const(IntValue),
    /// The value may take more than one value.
    NotConst,
}

impl Lattice {
    /// Combine the knowledge of two values flowing into the same place.
    pub fn meet(&self, other: &Lattice) -> Lattice {
        match (self, other) {
            (Lattice::Undef, x) | (x, Lattice::Undef) => x.clone(),
            (Lattice::Const(a), Lattice::Const(b)) if a == b => Lattice::Const(a.clone()),
            _ => Lattice::NotConst,
        }
    }

    /// Return the constant, if the value is known to be one.
    pub fn get_const(&self) -> Option<&IntValue> {
        match self {
            Lattice::Const(imm) => Some(imm),
            _ => None,
        }
    }
}

/// Analyze a function without changing it.
///
/// Calls are evaluated if `module` is given; otherwise their results are
/// assumed to be non-constant.
pub fn analyze(ctx: &PassContext, func: &FunctionData, module: Option<&Module>) -> ConstFacts {
    let mut solver = Solver::new(ctx, func, module, vec![func.name.clone()]);
    for arg in func.args() {
        solver.facts.values.insert(arg, Lattice::NotConst);
    }
    solver.solve();
    solver.facts
}

/// The result of analyzing a function.
#[derive(Debug, Default)]
pub struct ConstFacts {
    values: HashMap<Value, Lattice>,
    blocks: HashSet<Block>,
    edges: HashSet<(Block, Block)>,
    returns: Lattice,
}

impl Default for Lattice {
    fn default() -> Self {
        Lattice::Undef
    }
}

impl ConstFacts {
    /// Return what is known about a value.
    pub fn value(&self, func: &FunctionData, value: Value) -> Lattice {
        match &func.dfg[value] {
            ValueData::Const { imm, .. } => Lattice::Const(imm.clone()),
            ValueData::Undef { .. } => Lattice::Undef,
            ValueData::Reg { .. } => Lattice::NotConst,
            _ => self.values.get(&value).cloned().unwrap_or_default(),
        }
    }

    /// Check whether a block may execute.
    pub fn is_executable(&self, bb: Block) -> bool {
        self.blocks.contains(&bb)
    }

    /// Check whether control may flow along an edge.
    pub fn is_edge_executable(&self, from: Block, to: Block) -> bool {
        self.edges.contains(&(from, to))
    }

    /// Return what is known about the values the function returns.
    pub fn returns(&self) -> &Lattice {
        &self.returns
    }

    /// Replace constant values and fold branches on constant conditions.
    ///
    /// Returns whether the function was modified.
    pub fn apply(&self, func: &mut FunctionBuilder) -> bool {
        let mut modified = false;
        let blocks: Vec<Block> = func.blocks().filter(|&bb| self.is_executable(bb)).collect();

        // Replace the constant results.
        for &bb in &blocks {
            let insts: Vec<Inst> = func.insts(bb).collect();
            for inst in insts {
                let result = match func.dfg.get_inst_result(inst) {
                    Some(result) => result,
                    None => continue,
                };
                let imm = match self.values.get(&result) {
                    Some(Lattice::Const(imm)) => imm.clone(),
                    _ => continue,
                };
                let value = func.dfg.const_int(imm);
                debug!("Replace {} with {}", inst.dump(func), value.dump(func));
                func.dfg.replace_use(result, value);
                if !func.dfg[inst].opcode().has_side_effects() {
                    func.remove_inst(inst);
                }
                modified = true;
            }
        }

        // Fold the branches with only one executable edge.
        for &bb in &blocks {
            let term = match func.terminator(bb) {
                Some(term) if func.dfg[term].opcode() == Opcode::BrCond => term,
                _ => continue,
            };
            let targets = func.dfg[term].blocks().to_vec();
            if targets[0] == targets[1] {
                continue;
            }
            let (taken, dropped) = match (
                self.is_edge_executable(bb, targets[0]),
                self.is_edge_executable(bb, targets[1]),
            ) {
                (true, false) => (targets[0], targets[1]),
                (false, true) => (targets[1], targets[0]),
                _ => continue,
            };
            debug!("Replace {} with br {}", term.dump(func), taken.dump(func));
            func.insert_before(term);
            func.ins().br(taken);
            func.remove_inst(term);
            for phi in func.phis(dropped) {
                func.dfg.remove_phi_incoming(phi, bb);
            }
            modified = true;
        }
        modified
    }
}

/// The propagation state of one function.
struct Solver<'a> {
    ctx: &'a PassContext,
    func: &'a FunctionData,
    module: Option<&'a Module>,
    /// The functions under analysis, outermost first.
    stack: Vec<String>,
    facts: ConstFacts,
    /// Edges proven executable but not yet visited. The entry has no
    /// predecessor.
    cfg_work: Vec<(Option<Block>, Block)>,
    /// Values whose lattice changed but whose users were not yet revisited.
    ssa_work: Vec<Value>,
}

impl<'a> Solver<'a> {
    fn new(
        ctx: &'a PassContext,
        func: &'a FunctionData,
        module: Option<&'a Module>,
        stack: Vec<String>,
    ) -> Self {
        Self {
            ctx,
            func,
            module,
            stack,
            facts: Default::default(),
            cfg_work: vec![],
            ssa_work: vec![],
        }
    }

    fn value(&self, value: Value) -> Lattice {
        self.facts.value(self.func, value)
    }

    /// Move a value up the lattice.
    fn update(&mut self, value: Value, lattice: Lattice) {
        let old = self.value(value);
        let new = old.meet(&lattice);
        if new != old {
            trace!("{} is {:?}", value.dump(self.func), new);
            self.facts.values.insert(value, new);
            self.ssa_work.push(value);
        }
    }

    fn mark_edge(&mut self, from: Block, to: Block) {
        if !self.facts.is_edge_executable(from, to) {
            self.cfg_work.push((Some(from), to));
        }
    }

    fn solve(&mut self) {
        let func = self.func;
        self.cfg_work.push((None, func.entry()));
        loop {
            self.propagate();
            if !self.resolve_undef_branches() {
                break;
            }
        }
    }

    /// Process the work lists until both are empty.
    fn propagate(&mut self) {
        let func = self.func;
        loop {
            if let Some((from, to)) = self.cfg_work.pop() {
                if let Some(from) = from {
                    if !self.facts.edges.insert((from, to)) {
                        continue;
                    }
                }
                trace!("Executable {}", to.dump(func));

                // Phis see a new incoming edge. The rest of the block only
                // needs a visit the first time it becomes executable.
                let first = self.facts.blocks.insert(to);
                for inst in func.insts(to) {
                    if first || func.dfg[inst].opcode().is_phi() {
                        self.visit_inst(inst);
                    }
                }
                continue;
            }
            if let Some(value) = self.ssa_work.pop() {
                for &user in func.dfg.uses(value) {
                    match func.inst_block(user) {
                        Some(bb) if self.facts.is_executable(bb) => self.visit_inst(user),
                        _ => (),
                    }
                }
                continue;
            }
            break;
        }
    }

    /// Treat branches on a condition that never became defined as going both
    /// ways.
    ///
    /// Returns whether any new edge was marked.
    fn resolve_undef_branches(&mut self) -> bool {
        let func = self.func;
        let mut marked = false;
        let blocks: Vec<Block> = func
            .blocks()
            .filter(|&bb| self.facts.is_executable(bb))
            .collect();
        for bb in blocks {
            let term = match func.terminator(bb) {
                Some(term) if func.dfg[term].opcode() == Opcode::BrCond => term,
                _ => continue,
            };
            if self.value(func.dfg[term].args()[0]) != Lattice::Undef {
                continue;
            }
            for &target in func.dfg[term].blocks() {
                if !self.facts.is_edge_executable(bb, target) {
                    self.mark_edge(bb, target);
                    marked = true;
                }
            }
        }
        marked
    }

    fn visit_inst(&mut self, inst: Inst) {
        let func = self.func;
        let data = &func.dfg[inst];
        let opcode = data.opcode();
        match opcode {
            Opcode::Phi => {
                let bb = match func.inst_block(inst) {
                    Some(bb) => bb,
                    None => return,
                };
                let mut lattice = Lattice::Undef;
                for (value, pred) in data.phi_edges() {
                    if self.facts.is_edge_executable(pred, bb) {
                        lattice = lattice.meet(&self.value(value));
                    }
                }
                self.update(func.dfg.inst_result(inst), lattice);
            }
            Opcode::Br => {
                if let Some(bb) = func.inst_block(inst) {
                    self.mark_edge(bb, data.blocks()[0]);
                }
            }
            Opcode::BrCond => {
                let bb = match func.inst_block(inst) {
                    Some(bb) => bb,
                    None => return,
                };
                let bbs = data.blocks();
                match self.value(data.args()[0]) {
                    Lattice::Undef => (),
                    Lattice::Const(imm) => {
                        let target = if imm.is_zero() { bbs[1] } else { bbs[0] };
                        self.mark_edge(bb, target);
                    }
                    Lattice::NotConst => {
                        self.mark_edge(bb, bbs[0]);
                        self.mark_edge(bb, bbs[1]);
                    }
                }
            }
            Opcode::Ret => (),
            Opcode::RetValue => {
                let value = self.value(data.args()[0]);
                self.facts.returns = self.facts.returns.meet(&value);
            }
            Opcode::Call => {
                if let Some(result) = func.dfg.get_inst_result(inst) {
                    let lattice = self.eval_call(inst);
                    self.update(result, lattice);
                }
            }
            _ if opcode.is_pure() => {
                let lattice = self.eval_pure(inst);
                self.update(func.dfg.inst_result(inst), lattice);
            }
            _ => {
                if let Some(result) = func.dfg.get_inst_result(inst) {
                    self.update(result, Lattice::NotConst);
                }
            }
        }
    }

    /// Evaluate an arithmetic, comparison, or cast instruction.
    fn eval_pure(&self, inst: Inst) -> Lattice {
        let func = self.func;
        let data = &func.dfg[inst];
        let opcode = data.opcode();
        let args: Vec<Lattice> = data.args().iter().map(|&arg| self.value(arg)).collect();
        let known = |imm: Option<IntValue>| match imm {
            Some(imm) => Lattice::Const(imm),
            None => Lattice::NotConst,
        };

        if opcode.is_binary_arith() {
            let width = func.dfg.value_type(func.dfg.inst_result(inst)).unwrap_int();
            if let Some(absorbed) = absorb(opcode, width, &args[0], &args[1]) {
                return Lattice::Const(absorbed);
            }
        }
        match (opcode, args.as_slice()) {
            (_, [Lattice::Const(a), Lattice::Const(b)]) if opcode.is_binary_arith() => {
                known(IntValue::try_binary_op(opcode, a, b))
            }
            (_, [Lattice::Const(a), Lattice::Const(b)]) if opcode.is_compare() => {
                known(IntValue::try_compare_op(opcode, a, b))
            }
            (_, [Lattice::Const(a)]) if opcode.is_unary_arith() => {
                known(IntValue::try_unary_op(opcode, a))
            }
            (_, [Lattice::Const(a)]) if opcode.is_cast() => {
                let width = func.dfg.value_type(func.dfg.inst_result(inst)).unwrap_int();
                known(IntValue::try_cast_op(opcode, a, width))
            }
            _ if args.contains(&Lattice::NotConst) => Lattice::NotConst,
            _ => Lattice::Undef,
        }
    }

    /// Evaluate a call by analyzing the callee with the argument values.
    fn eval_call(&self, inst: Inst) -> Lattice {
        let func = self.func;
        let data = &func.dfg[inst];
        let module = match self.module {
            Some(module) => module,
            None => return Lattice::NotConst,
        };
        let callee = match data
            .get_ext_unit()
            .and_then(|ext| module.resolve(func, ext))
        {
            Some(id) => module.function(id),
            None => return Lattice::NotConst,
        };
        if self.stack.len() > self.ctx.max_call_depth
            || self.stack.contains(&callee.name)
            || callee.layout.first_block().is_none()
            || callee.sig.num_args() != data.args().len()
        {
            return Lattice::NotConst;
        }

        // Wait for all arguments to be defined.
        let args: Vec<Lattice> = data.args().iter().map(|&arg| self.value(arg)).collect();
        if args.contains(&Lattice::Undef) {
            return Lattice::Undef;
        }

        let mut stack = self.stack.clone();
        stack.push(callee.name.clone());
        trace!("Evaluating call {} with {:?}", inst.dump(func), args);
        let mut nested = Solver::new(self.ctx, callee, self.module, stack);
        for (param, lattice) in callee.args().zip(args) {
            nested.facts.values.insert(param, lattice);
        }
        nested.solve();
        nested.facts.returns
    }
}

/// Evaluate a binary operation with an absorbing operand, where the result
/// does not depend on the other operand.
fn absorb(opcode: Opcode, width: usize, lhs: &Lattice, rhs: &Lattice) -> Option<IntValue> {
    let is = |check: fn(&IntValue) -> bool| {
        lhs.get_const().map(check).unwrap_or(false) || rhs.get_const().map(check).unwrap_or(false)
    };
    match opcode {
        Opcode::Mul | Opcode::And if is(IntValue::is_zero) => Some(IntValue::zero(width)),
        Opcode::Or if is(IntValue::is_all_ones) => Some(IntValue::all_ones(width)),
        _ => None,
    }
}
