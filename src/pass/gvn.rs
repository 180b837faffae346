// Copyright (c) 2017-2021 Fabian Schuiki

//! Global Value Numbering

use crate::{
    analysis::DominatorTree,
    ir::{prelude::*, DataFlowGraph},
    opt::prelude::*,
};
use itertools::Itertools;
use std::collections::HashMap;

/// Global Value Numbering
///
/// This pass walks the dominator tree and assigns every value a number, such
/// that two values with the same number are known to be equal. Instructions
/// computing an expression already available in a dominating block, or
/// folding to a constant, are replaced with the existing value. Phi nodes
/// whose incoming values all carry the same number, or which duplicate
/// another phi of the same block, are replaced as well.
///
/// The walk repeats until no more values are merged, since merging values on
/// a back edge may reveal further redundancies at the loop header.
pub struct GlobalValueNumbering;

impl Pass for GlobalValueNumbering {
    fn run_on_function(_ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        info!("GVN [{}]", func.name);
        if func.layout.first_block().is_none() {
            return false;
        }
        let mut modified = false;
        loop {
            let domtree = DominatorTree::new(func);
            let mut numbering = Numbering::default();
            numbering.walk(func, &domtree);
            if !numbering.finish(func) {
                break;
            }
            modified = true;
        }
        modified
    }
}

/// A pure expression, keyed by opcode and operand value numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Expr {
    /// Unary arithmetic and casts. Casts are keyed by their result type.
    Unary(Opcode, Value, Type),
    /// Binary arithmetic and comparisons. Commutative operands are sorted.
    Binary(Opcode, Value, Value),
}

impl Expr {
    fn new(dfg: &DataFlowGraph, inst: Inst) -> Self {
        let data = &dfg[inst];
        let opcode = data.opcode();
        match *data {
            InstData::Unary { args: [x], .. } => {
                Expr::Unary(opcode, x, dfg.value_type(dfg.inst_result(inst)))
            }
            InstData::Binary { args: [x, y], .. } if opcode.is_commutative() && y < x => {
                Expr::Binary(opcode, y, x)
            }
            InstData::Binary { args: [x, y], .. } => Expr::Binary(opcode, x, y),
            _ => panic!("{} is not a pure expression", inst),
        }
    }
}

/// The state of one numbering walk.
#[derive(Default)]
struct Numbering {
    /// The number assigned to each value that was merged into another.
    numbers: HashMap<Value, Value>,
    /// The expressions available in each block on the current dominator
    /// tree path. Inner scopes come last.
    scopes: Vec<HashMap<Expr, Value>>,
    /// Instructions replaced by their value number, deleted after the walk.
    redundant: Vec<Inst>,
}

impl Numbering {
    /// Resolve a value to its number.
    fn number(&self, mut value: Value) -> Value {
        while let Some(&n) = self.numbers.get(&value) {
            if n == value {
                break;
            }
            value = n;
        }
        value
    }

    /// Find an expression in the current scope or one of its parents.
    fn lookup(&self, expr: &Expr) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(expr).cloned())
    }

    fn merge(&mut self, func: &FunctionData, inst: Inst, with: Value) {
        let result = func.dfg.inst_result(inst);
        debug!("Replace {} with {}", inst.dump(func), with.dump(func));
        self.numbers.insert(result, with);
        self.redundant.push(inst);
    }

    /// Visit the blocks in dominator tree preorder, opening a new scope for
    /// each block and closing it once all its children are done.
    fn walk(&mut self, func: &mut FunctionBuilder, domtree: &DominatorTree) {
        enum Walk {
            Enter(Block),
            Exit,
        }

        let mut work = vec![Walk::Enter(domtree.root())];
        while let Some(step) = work.pop() {
            let bb = match step {
                Walk::Enter(bb) => bb,
                Walk::Exit => {
                    self.scopes.pop();
                    continue;
                }
            };
            trace!("Numbering {}", bb.dump(func));
            self.scopes.push(HashMap::new());
            self.number_phis(func, domtree, bb);
            self.number_insts(func, bb);
            self.fill_successor_phis(func, bb);
            work.push(Walk::Exit);
            for &child in domtree.children(bb).iter().rev() {
                work.push(Walk::Enter(child));
            }
        }
    }

    /// Merge meaningless and redundant phis.
    fn number_phis(&mut self, func: &FunctionData, domtree: &DominatorTree, bb: Block) {
        let mut seen: HashMap<Vec<(Block, Value)>, Value> = HashMap::new();
        for phi in func.phis(bb) {
            let result = func.dfg.inst_result(phi);
            let mut edges: Vec<(Block, Value)> = func.dfg[phi]
                .phi_edges()
                .filter(|&(_, pred)| domtree.is_reachable(pred))
                .map(|(value, pred)| (pred, self.number(value)))
                .collect();
            edges.sort();

            // A phi merging a single value, apart from itself, is that value.
            let mut distinct = edges
                .iter()
                .map(|&(_, value)| value)
                .filter(|&value| value != result)
                .unique();
            if let (Some(value), None) = (distinct.next(), distinct.next()) {
                self.merge(func, phi, value);
                continue;
            }

            // A phi merging the same values as an earlier one is a duplicate.
            match seen.get(&edges) {
                Some(&other) => self.merge(func, phi, other),
                None => {
                    seen.insert(edges, result);
                }
            }
        }
    }

    /// Rewrite operands to their numbers, then fold or reuse pure
    /// instructions.
    fn number_insts(&mut self, func: &mut FunctionBuilder, bb: Block) {
        let insts: Vec<Inst> = func
            .insts(bb)
            .filter(|&inst| !func.dfg[inst].opcode().is_phi())
            .collect();
        for inst in insts {
            let opcode = func.dfg[inst].opcode();
            let args = func.dfg[inst].args().to_vec();
            for (index, arg) in args.into_iter().enumerate() {
                // The destination of a copy is written, not read.
                if opcode == Opcode::Copy && index == 0 {
                    continue;
                }
                let number = self.number(arg);
                if number != arg {
                    func.dfg.set_arg(inst, index, number);
                }
            }
            if !opcode.is_pure() {
                continue;
            }

            if let Some(imm) = fold_inst(&func.dfg, inst) {
                let value = func.dfg.const_int(imm);
                self.merge(func, inst, value);
                continue;
            }

            let expr = Expr::new(&func.dfg, inst);
            match self.lookup(&expr) {
                Some(value) => self.merge(func, inst, value),
                None => {
                    let result = func.dfg.inst_result(inst);
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.insert(expr, result);
                    }
                }
            }
        }
    }

    /// Resolve the incoming values of the successors' phis for the edges
    /// leaving `bb`.
    fn fill_successor_phis(&mut self, func: &mut FunctionBuilder, bb: Block) {
        for succ in func.successors(bb) {
            for phi in func.phis(succ) {
                let value = match func.dfg[phi].phi_incoming(bb) {
                    Some(value) => value,
                    None => continue,
                };
                let number = self.number(value);
                if number != value {
                    func.dfg.set_phi_incoming(phi, bb, number);
                }
            }
        }
    }

    /// Replace the remaining uses of merged values and delete their
    /// instructions.
    ///
    /// Returns whether any instruction was deleted.
    fn finish(self, func: &mut FunctionBuilder) -> bool {
        for &inst in &self.redundant {
            let result = func.dfg.inst_result(inst);
            let number = self.number(result);
            func.dfg.replace_use(result, number);
        }
        for &inst in &self.redundant {
            func.remove_inst(inst);
        }
        !self.redundant.is_empty()
    }
}

/// Evaluate a pure instruction whose operands are all constants.
///
/// Returns `None` if an operand is not constant or the operation is undefined
/// for the operands, like a division by zero.
pub fn fold_inst(dfg: &DataFlowGraph, inst: Inst) -> Option<IntValue> {
    let data = &dfg[inst];
    let opcode = data.opcode();
    match *data {
        InstData::Unary { args: [x], .. } if opcode.is_unary_arith() => {
            IntValue::try_unary_op(opcode, dfg.get_const_int(x)?)
        }
        InstData::Unary { args: [x], .. } if opcode.is_cast() => {
            let width = dfg.value_type(dfg.inst_result(inst)).unwrap_int();
            IntValue::try_cast_op(opcode, dfg.get_const_int(x)?, width)
        }
        InstData::Binary { args: [x, y], .. } if opcode.is_binary_arith() => {
            IntValue::try_binary_op(opcode, dfg.get_const_int(x)?, dfg.get_const_int(y)?)
        }
        InstData::Binary { args: [x, y], .. } if opcode.is_compare() => {
            IntValue::try_compare_op(opcode, dfg.get_const_int(x)?, dfg.get_const_int(y)?)
        }
        _ => None,
    }
}
