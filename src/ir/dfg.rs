// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of the data flow in a `Function`.
//!
//! Each function has an associated `DataFlowGraph` which contains all the
//! values, instructions, arguments, and links between them. The graph tracks
//! the users of every value and every block, such that replacing all uses of
//! a value only touches the instructions that actually use it.

use crate::{
    impl_table_indexing,
    ir::{Arg, Block, ExtUnit, ExtUnitData, Inst, InstData, Signature, Value, ValueData},
    table::{PrimaryTable, SecondaryTable},
    ty::Type,
    value::IntValue,
};
use std::collections::{HashMap, HashSet};

/// A data flow graph.
///
/// This is the main container for instructions, values, and the relationship
/// between them.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct DataFlowGraph {
    /// The instructions in the graph.
    pub(crate) insts: PrimaryTable<Inst, InstData>,
    /// The result values produced by instructions.
    pub(crate) results: SecondaryTable<Inst, Value>,
    /// The values in the graph.
    pub(crate) values: PrimaryTable<Value, ValueData>,
    /// The argument values.
    pub(crate) args: SecondaryTable<Arg, Value>,
    /// The external units in the graph.
    pub(crate) ext_units: PrimaryTable<ExtUnit, ExtUnitData>,
    /// The names assigned to values.
    pub(crate) names: HashMap<Value, String>,
    /// How many values carry each name.
    name_counts: HashMap<String, usize>,
    /// The instructions using each value.
    value_uses: HashMap<Value, HashSet<Inst>>,
    /// The instructions referring to each block.
    block_uses: HashMap<Block, HashSet<Inst>>,
    /// Interned integer constants.
    consts: HashMap<IntValue, Value>,
    /// Interned undefined values.
    undefs: HashMap<Type, Value>,
    /// Bumped whenever an edge of the control flow graph changes.
    cfg_epoch: u64,
}

impl_table_indexing!(DataFlowGraph, insts, Inst, InstData);
impl_table_indexing!(DataFlowGraph, values, Value, ValueData);
impl_table_indexing!(DataFlowGraph, ext_units, ExtUnit, ExtUnitData);

impl DataFlowGraph {
    /// Create a new data flow graph.
    pub fn new() -> Self {
        Default::default()
    }

    fn add_value(&mut self, data: ValueData) -> Value {
        let value = self.values.add(data);
        self.value_uses.insert(value, Default::default());
        value
    }

    /// Add an instruction.
    pub fn add_inst(&mut self, data: InstData, ty: Type) -> Inst {
        if data.opcode().is_terminator() {
            self.touch_cfg();
        }
        let args: Vec<_> = data.args().to_vec();
        let bbs: Vec<_> = data.blocks().to_vec();
        let inst = self.insts.add(data);
        for arg in args {
            self.value_uses
                .get_mut(&arg)
                .unwrap_or_else(|| panic!("operand {} of {} does not exist", arg, inst))
                .insert(inst);
        }
        for bb in bbs {
            self.block_uses.entry(bb).or_default().insert(inst);
        }
        if !ty.is_void() {
            let result = self.add_value(ValueData::Inst { ty, inst });
            self.results.add(inst, result);
        }
        inst
    }

    /// Remove an instruction.
    ///
    /// Panics if the instruction's result is still in use.
    pub fn remove_inst(&mut self, inst: Inst) {
        if let Some(value) = self.get_inst_result(inst) {
            if self.has_uses(value) {
                panic!("{} removed while its result {} is still used", inst, value);
            }
            self.results.remove(inst);
            self.values.remove(value);
            self.value_uses.remove(&value);
            self.clear_name(value);
        }
        let data = self.insts.remove(inst);
        if data.opcode().is_terminator() {
            self.touch_cfg();
        }
        for arg in data.args() {
            if let Some(users) = self.value_uses.get_mut(arg) {
                users.remove(&inst);
            }
        }
        for bb in data.blocks() {
            if let Some(users) = self.block_uses.get_mut(bb) {
                users.remove(&inst);
            }
        }
    }

    /// Check whether an instruction exists.
    pub fn has_inst(&self, inst: Inst) -> bool {
        self.insts.contains(inst)
    }

    /// Check whether a value exists.
    pub fn has_value(&self, value: Value) -> bool {
        self.values.contains(value)
    }

    /// Returns whether an instruction produces a result.
    pub fn has_result(&self, inst: Inst) -> bool {
        self.results.contains(inst)
    }

    /// Returns the result of an instruction.
    pub fn inst_result(&self, inst: Inst) -> Value {
        self.results[inst]
    }

    /// Returns the result of an instruction, if it has one.
    pub fn get_inst_result(&self, inst: Inst) -> Option<Value> {
        self.results.get(inst).cloned()
    }

    /// Returns the value of an argument.
    pub fn arg_value(&self, arg: Arg) -> Value {
        self.args[arg]
    }

    /// Create values for the arguments in a signature.
    pub(crate) fn make_args_for_signature(&mut self, sig: &Signature) {
        for arg in sig.args() {
            let value = self.add_value(ValueData::Arg {
                ty: sig.arg_type(arg),
                arg,
            });
            self.args.add(arg, value);
        }
    }

    /// Get the value of an integer constant.
    ///
    /// Constants are interned, so requesting the same constant twice yields
    /// the same value.
    pub fn const_int(&mut self, imm: IntValue) -> Value {
        if let Some(&value) = self.consts.get(&imm) {
            return value;
        }
        let value = self.add_value(ValueData::Const {
            ty: imm.ty(),
            imm: imm.clone(),
        });
        self.consts.insert(imm, value);
        value
    }

    /// Get the undefined value of a type.
    pub fn undef(&mut self, ty: Type) -> Value {
        if let Some(&value) = self.undefs.get(&ty) {
            return value;
        }
        let value = self.add_value(ValueData::Undef { ty: ty.clone() });
        self.undefs.insert(ty, value);
        value
    }

    /// Add a fresh register.
    pub fn add_reg(&mut self, ty: Type) -> Value {
        self.add_value(ValueData::Reg { ty })
    }

    /// Returns the type of a value.
    pub fn value_type(&self, value: Value) -> Type {
        self[value].ty().clone()
    }

    /// Return the instruction that produces `value`.
    pub fn get_value_inst(&self, value: Value) -> Option<Inst> {
        match self[value] {
            ValueData::Inst { inst, .. } => Some(inst),
            _ => None,
        }
    }

    /// Return the instruction that produces `value`, or panic.
    pub fn value_inst(&self, value: Value) -> Inst {
        match self.get_value_inst(value) {
            Some(inst) => inst,
            None => panic!("value {} not the result of an instruction", value),
        }
    }

    /// Return the argument that produces `value`.
    pub fn get_value_arg(&self, value: Value) -> Option<Arg> {
        match self[value] {
            ValueData::Arg { arg, .. } => Some(arg),
            _ => None,
        }
    }

    /// Return the constant held by `value`, if it is one.
    pub fn get_const_int(&self, value: Value) -> Option<&IntValue> {
        match &self[value] {
            ValueData::Const { imm, .. } => Some(imm),
            _ => None,
        }
    }

    /// Check whether `value` is a constant.
    pub fn is_const(&self, value: Value) -> bool {
        self[value].is_const()
    }

    /// Check whether `value` is undefined.
    pub fn is_undef(&self, value: Value) -> bool {
        self[value].is_undef()
    }

    /// Return the name of a value.
    pub fn get_name(&self, value: Value) -> Option<&str> {
        self.names.get(&value).map(AsRef::as_ref)
    }

    /// Set the name of a value.
    pub fn set_name(&mut self, value: Value, name: String) {
        self.clear_name(value);
        *self.name_counts.entry(name.clone()).or_insert(0) += 1;
        self.names.insert(value, name);
    }

    /// Clear the name of a value.
    pub fn clear_name(&mut self, value: Value) -> Option<String> {
        let name = self.names.remove(&value)?;
        if let Some(count) = self.name_counts.get_mut(&name) {
            *count -= 1;
            if *count == 0 {
                self.name_counts.remove(&name);
            }
        }
        Some(name)
    }

    /// Check whether more than one value carries the name of `value`.
    pub fn is_name_shared(&self, value: Value) -> bool {
        self.get_name(value)
            .and_then(|name| self.name_counts.get(name))
            .map(|&count| count > 1)
            .unwrap_or(false)
    }

    /// Return the CFG epoch.
    ///
    /// The epoch changes whenever a terminator is added, removed, or
    /// retargeted. Analyses record the epoch they were computed at.
    pub fn cfg_epoch(&self) -> u64 {
        self.cfg_epoch
    }

    /// Mark the CFG as changed.
    pub(crate) fn touch_cfg(&mut self) {
        self.cfg_epoch += 1;
    }

    /// Replace all uses of a value with another.
    ///
    /// Returns how many uses were replaced.
    pub fn replace_use(&mut self, from: Value, to: Value) -> usize {
        if from == to {
            return 0;
        }
        let users: Vec<Inst> = self.uses(from).iter().cloned().collect();
        let mut count = 0;
        for inst in users {
            count += self.replace_value_within_inst(from, to, inst);
        }
        count
    }

    /// Replace the uses of a value with another, in a single instruction.
    ///
    /// Returns how many uses were replaced.
    pub fn replace_value_within_inst(&mut self, from: Value, to: Value, inst: Inst) -> usize {
        if from == to {
            return 0;
        }
        let mut count = 0;
        for arg in self.insts[inst].args_mut() {
            if *arg == from {
                *arg = to;
                count += 1;
            }
        }
        if count > 0 {
            self.unlink_value_use(from, inst);
            self.link_value_use(to, inst);
        }
        count
    }

    /// Set a single argument of an instruction.
    pub fn set_arg(&mut self, inst: Inst, index: usize, to: Value) {
        let from = std::mem::replace(&mut self.insts[inst].args_mut()[index], to);
        if !self.insts[inst].args().contains(&from) {
            self.unlink_value_use(from, inst);
        }
        self.link_value_use(to, inst);
    }

    fn link_value_use(&mut self, value: Value, inst: Inst) {
        self.value_uses
            .get_mut(&value)
            .unwrap_or_else(|| panic!("value {} does not exist", value))
            .insert(inst);
    }

    fn unlink_value_use(&mut self, value: Value, inst: Inst) {
        if let Some(users) = self.value_uses.get_mut(&value) {
            users.remove(&inst);
        }
    }

    /// Replace all uses of a block with another.
    ///
    /// Returns how many blocks were replaced.
    pub fn replace_block_use(&mut self, from: Block, to: Block) -> usize {
        let users: Vec<Inst> = self.block_users(from).collect();
        let mut count = 0;
        for inst in users {
            count += self.replace_block_within_inst(from, to, inst);
        }
        count
    }

    /// Replace all uses of a block with another, in a single instruction.
    ///
    /// Returns how many blocks were replaced.
    pub fn replace_block_within_inst(&mut self, from: Block, to: Block, inst: Inst) -> usize {
        if from == to {
            return 0;
        }
        let mut count = 0;
        for bb in self.insts[inst].blocks_mut() {
            if *bb == from {
                *bb = to;
                count += 1;
            }
        }
        if count > 0 {
            if let Some(users) = self.block_uses.get_mut(&from) {
                users.remove(&inst);
            }
            self.block_uses.entry(to).or_default().insert(inst);
            if self.insts[inst].opcode().is_terminator() {
                self.touch_cfg();
            }
        }
        count
    }

    /// Add an incoming edge to a phi node.
    pub fn add_phi_incoming(&mut self, inst: Inst, value: Value, bb: Block) {
        match &mut self.insts[inst] {
            InstData::Phi { args, bbs, .. } => {
                args.push(value);
                bbs.push(bb);
            }
            _ => panic!("{} is not a phi", inst),
        }
        self.link_value_use(value, inst);
        self.block_uses.entry(bb).or_default().insert(inst);
    }

    /// Set the incoming value of a phi node for the edge from `bb`.
    ///
    /// Adds the edge if the phi has none for `bb` yet.
    pub fn set_phi_incoming(&mut self, inst: Inst, bb: Block, value: Value) {
        let index = match &self.insts[inst] {
            InstData::Phi { bbs, .. } => bbs.iter().position(|&b| b == bb),
            _ => panic!("{} is not a phi", inst),
        };
        match index {
            Some(index) => self.set_arg(inst, index, value),
            None => self.add_phi_incoming(inst, value, bb),
        }
    }

    /// Remove the incoming edges of a phi node that come from `bb`.
    ///
    /// Returns how many edges were removed.
    pub fn remove_phi_incoming(&mut self, inst: Inst, bb: Block) -> usize {
        let mut removed = vec![];
        match &mut self.insts[inst] {
            InstData::Phi { args, bbs, .. } => {
                let mut i = 0;
                while i < bbs.len() {
                    if bbs[i] == bb {
                        bbs.remove(i);
                        removed.push(args.remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
            _ => panic!("{} is not a phi", inst),
        }
        if !removed.is_empty() {
            if let Some(users) = self.block_uses.get_mut(&bb) {
                users.remove(&inst);
            }
            for value in &removed {
                if !self.insts[inst].args().contains(value) {
                    self.unlink_value_use(*value, inst);
                }
            }
        }
        removed.len()
    }

    /// Iterate over all instructions using a value.
    pub fn uses(&self, value: Value) -> &HashSet<Inst> {
        match self.value_uses.get(&value) {
            Some(users) => users,
            None => panic!("value {} does not exist", value),
        }
    }

    /// Check if a value is used.
    pub fn has_uses(&self, value: Value) -> bool {
        !self.uses(value).is_empty()
    }

    /// Check if a value has exactly one use.
    pub fn has_one_use(&self, value: Value) -> bool {
        self.uses(value).len() == 1
    }

    /// Iterate over all instructions referring to a block.
    pub fn block_users<'a>(&'a self, bb: Block) -> impl Iterator<Item = Inst> + 'a {
        self.block_uses
            .get(&bb)
            .into_iter()
            .flat_map(|users| users.iter().cloned())
    }

    /// Check if a block is referred to by any instruction.
    pub fn has_block_uses(&self, bb: Block) -> bool {
        self.block_users(bb).next().is_some()
    }

    /// Forget the use list of a block that is being removed.
    pub(crate) fn forget_block(&mut self, bb: Block) {
        if let Some(users) = self.block_uses.remove(&bb) {
            assert!(users.is_empty(), "{} removed while still in use", bb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{int_ty, ir::Opcode, void_ty};

    #[test]
    fn use_lists_follow_replacement() {
        let mut dfg = DataFlowGraph::new();
        let a = dfg.const_int(IntValue::from_usize(32, 1));
        let b = dfg.const_int(IntValue::from_usize(32, 2));
        assert_eq!(dfg.const_int(IntValue::from_usize(32, 1)), a);
        let add = dfg.add_inst(
            InstData::Binary {
                opcode: Opcode::Add,
                args: [a, a],
            },
            int_ty(32),
        );
        assert!(dfg.uses(a).contains(&add));
        assert_eq!(dfg.replace_use(a, b), 2);
        assert!(!dfg.has_uses(a));
        assert!(dfg.has_one_use(b));
        dfg.set_arg(add, 0, a);
        assert!(dfg.uses(a).contains(&add));
        assert!(dfg.uses(b).contains(&add));
        dfg.remove_inst(add);
        assert!(!dfg.has_uses(a));
        assert!(!dfg.has_uses(b));
    }

    #[test]
    fn terminators_bump_the_epoch() {
        let mut dfg = DataFlowGraph::new();
        let e0 = dfg.cfg_epoch();
        let ret = dfg.add_inst(
            InstData::Nullary {
                opcode: Opcode::Ret,
            },
            void_ty(),
        );
        assert!(dfg.cfg_epoch() > e0);
        let e1 = dfg.cfg_epoch();
        dfg.remove_inst(ret);
        assert!(dfg.cfg_epoch() > e1);
    }
}
