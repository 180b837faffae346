// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of functions.
//!
//! A `FunctionData` owns everything that makes up a function: its signature,
//! the data flow graph, the basic blocks, and their layout. A
//! `FunctionBuilder` borrows a function mutably and adds an insertion point
//! for new instructions.

use crate::{
    analysis::DominatorTree,
    ir::{
        Block, ControlFlowGraph, DataFlowGraph, ExtUnit, ExtUnitData, FunctionInsertPos,
        FunctionLayout, Inst, InstBuilder, InstData, Signature, Value,
    },
    ty::Type,
    verifier::Verifier,
};
use itertools::Itertools;
use std::ops::{Deref, DerefMut};

/// A function.
#[derive(Clone, Serialize, Deserialize)]
pub struct FunctionData {
    /// The name of the function.
    pub name: String,
    /// The arguments and return type.
    pub sig: Signature,
    /// The values and instructions.
    pub dfg: DataFlowGraph,
    /// The basic blocks.
    pub cfg: ControlFlowGraph,
    /// The order of blocks and instructions.
    pub layout: FunctionLayout,
}

impl FunctionData {
    /// Create a new function.
    pub fn new(name: impl Into<String>, sig: Signature) -> Self {
        let mut func = Self {
            name: name.into(),
            sig,
            dfg: DataFlowGraph::new(),
            cfg: ControlFlowGraph::new(),
            layout: FunctionLayout::new(),
        };
        func.dfg.make_args_for_signature(&func.sig);
        func
    }

    /// Return the entry block.
    ///
    /// Panics if the function has no blocks.
    pub fn entry(&self) -> Block {
        match self.layout.first_block() {
            Some(bb) => bb,
            None => panic!("function @{} has no entry block", self.name),
        }
    }

    /// Return an iterator over the blocks in layout order.
    pub fn blocks<'a>(&'a self) -> impl Iterator<Item = Block> + 'a {
        self.layout.blocks()
    }

    /// Return an iterator over the instructions of a block.
    pub fn insts<'a>(&'a self, bb: Block) -> impl Iterator<Item = Inst> + 'a {
        self.layout.insts(bb)
    }

    /// Return an iterator over all instructions in layout order.
    pub fn all_insts<'a>(&'a self) -> impl Iterator<Item = Inst> + 'a {
        self.layout.all_insts()
    }

    /// Return the block containing an instruction.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.layout.inst_block(inst)
    }

    /// Return an upper bound on the block indices.
    pub fn block_id_bound(&self) -> usize {
        self.cfg.block_id_bound()
    }

    /// Return the name of a block.
    pub fn block_name(&self, bb: Block) -> Option<&str> {
        self.cfg.get_name(bb)
    }

    /// Return an iterator over the argument values.
    pub fn args<'a>(&'a self) -> impl Iterator<Item = Value> + 'a {
        self.sig.args().map(move |arg| self.dfg.arg_value(arg))
    }

    /// Return the value of the argument at position `pos`.
    pub fn arg_value_at(&self, pos: usize) -> Value {
        match self.sig.args().nth(pos) {
            Some(arg) => self.dfg.arg_value(arg),
            None => panic!("@{} has no argument {}", self.name, pos),
        }
    }

    /// Return the terminator of a block, if it has one.
    pub fn terminator(&self, bb: Block) -> Option<Inst> {
        self.layout
            .last_inst(bb)
            .filter(|&inst| self.dfg[inst].opcode().is_terminator())
    }

    /// Return the successors of a block.
    ///
    /// Derived from the block's terminator. A conditional branch with two
    /// identical targets yields the target once.
    pub fn successors(&self, bb: Block) -> Vec<Block> {
        match self.terminator(bb) {
            Some(term) => self.dfg[term].blocks().iter().cloned().unique().collect(),
            None => vec![],
        }
    }

    /// Return the predecessors of a block.
    ///
    /// Derived from the terminators that name the block as a target. The
    /// result is sorted and free of duplicates.
    pub fn predecessors(&self, bb: Block) -> Vec<Block> {
        let mut preds: Vec<Block> = self
            .dfg
            .block_users(bb)
            .filter(|&inst| self.dfg[inst].opcode().is_terminator())
            .flat_map(|inst| self.layout.inst_block(inst))
            .collect();
        preds.sort();
        preds.dedup();
        preds
    }

    /// Return the phi nodes at the head of a block.
    pub fn phis(&self, bb: Block) -> Vec<Inst> {
        self.layout
            .insts(bb)
            .take_while(|&inst| self.dfg[inst].opcode().is_phi())
            .collect()
    }

    /// Return the first instruction of a block that is not a phi node.
    pub fn first_non_phi(&self, bb: Block) -> Option<Inst> {
        self.layout
            .insts(bb)
            .find(|&inst| !self.dfg[inst].opcode().is_phi())
    }

    /// Dump the function in human-readable form, annotated with dominance
    /// information.
    pub fn dump_annotated<'a>(&'a self, domtree: &'a DominatorTree) -> AnnotatedDumper<'a> {
        AnnotatedDumper(self, Some(domtree))
    }

    /// Panic if the function is not well-formed.
    pub fn verify(&self) {
        let mut verifier = Verifier::new();
        verifier.verify_function(self);
        match verifier.finish() {
            Ok(()) => (),
            Err(errs) => {
                eprintln!("");
                eprintln!("Verified function:");
                eprintln!("{}", self);
                eprintln!("");
                eprintln!("Verification errors:");
                eprintln!("{}", errs);
                panic!("verification failed");
            }
        }
    }
}

impl std::fmt::Display for FunctionData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(&AnnotatedDumper(self, None), f)
    }
}

impl std::fmt::Debug for FunctionData {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Temporary object to dump a function with its block relationships.
pub struct AnnotatedDumper<'a>(&'a FunctionData, Option<&'a DominatorTree>);

impl std::fmt::Display for AnnotatedDumper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let func = self.0;
        let list = |bbs: &mut dyn Iterator<Item = Block>| {
            bbs.map(|bb| bb.dump(func).to_string()).join(", ")
        };
        write!(f, "func @{} (", func.name)?;
        for (i, arg) in func.args().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", func.dfg.value_type(arg), arg.dump(func))?;
        }
        write!(f, ") {} {{\n", func.sig.return_type())?;
        for bb in func.blocks() {
            write!(
                f,
                "{}:  ; preds=({}) succs=({})",
                bb.dump(func),
                list(&mut func.predecessors(bb).into_iter()),
                list(&mut func.successors(bb).into_iter()),
            )?;
            if let Some(domtree) = self.1 {
                write!(
                    f,
                    " doms=({}) df=({})",
                    list(&mut domtree.children(bb).iter().cloned()),
                    list(&mut domtree.frontier(bb).iter().cloned()),
                )?;
                if let Some(idom) = domtree.immediate_dominator(bb) {
                    write!(f, " idom={}", idom.dump(func))?;
                }
            }
            write!(f, "\n")?;
            for inst in func.insts(bb) {
                write!(f, "    {}\n", inst.dump(func))?;
            }
        }
        write!(f, "}}")?;
        Ok(())
    }
}

/// A mutable function with an insertion point for new instructions.
pub struct FunctionBuilder<'a> {
    /// The function being modified.
    func: &'a mut FunctionData,
    /// The position where we are currently inserting instructions.
    pos: FunctionInsertPos,
}

// Ensure the FunctionBuilder can be used like a FunctionData.
impl<'a> Deref for FunctionBuilder<'a> {
    type Target = FunctionData;
    fn deref(&self) -> &FunctionData {
        self.func
    }
}

impl<'a> DerefMut for FunctionBuilder<'a> {
    fn deref_mut(&mut self) -> &mut FunctionData {
        self.func
    }
}

impl<'a> FunctionBuilder<'a> {
    /// Create a new builder for a function.
    pub fn new(func: &'a mut FunctionData) -> Self {
        Self {
            func,
            pos: FunctionInsertPos::None,
        }
    }

    /// Add a new instruction using an `InstBuilder`.
    pub fn ins(&mut self) -> InstBuilder<'a, '_> {
        InstBuilder::new(self)
    }

    /// Add a new instruction at the current insertion point.
    pub fn build_inst(&mut self, data: InstData, ty: Type) -> Inst {
        let inst = self.func.dfg.add_inst(data, ty);
        self.pos.add_inst(inst, &mut self.func.layout);
        inst
    }

    /// Remove an instruction.
    ///
    /// The instruction's result must not be used anymore.
    pub fn remove_inst(&mut self, inst: Inst) {
        self.pos.remove_inst(inst, &self.func.layout);
        self.func.layout.remove_inst(inst);
        self.func.dfg.remove_inst(inst);
    }

    /// Remove an instruction, replacing any remaining uses of its result with
    /// `undef`.
    pub fn delete_inst(&mut self, inst: Inst) {
        if let Some(result) = self.func.dfg.get_inst_result(inst) {
            if self.func.dfg.has_uses(result) {
                let ty = self.func.dfg.value_type(result);
                let undef = self.func.dfg.undef(ty);
                self.func.dfg.replace_use(result, undef);
            }
        }
        self.remove_inst(inst);
    }

    /// Remove an instruction if its value is not being read, together with
    /// any operands that become unused in the process.
    ///
    /// Returns true if the instruction was removed.
    pub fn prune_if_unused(&mut self, inst: Inst) -> bool {
        if self.dfg[inst].opcode().has_side_effects() {
            return false;
        }
        if let Some(result) = self.dfg.get_inst_result(inst) {
            if self.dfg.has_uses(result) {
                return false;
            }
        }
        let inst_args: Vec<_> = self.dfg[inst]
            .args()
            .iter()
            .flat_map(|&arg| self.dfg.get_value_inst(arg))
            .collect();
        self.remove_inst(inst);
        for inst in inst_args {
            if self.dfg.has_inst(inst) {
                self.prune_if_unused(inst);
            }
        }
        true
    }

    /// Move an instruction to the end of a block.
    pub fn move_inst_to_end(&mut self, inst: Inst, bb: Block) {
        self.pos.remove_inst(inst, &self.func.layout);
        self.func.layout.remove_inst(inst);
        self.func.layout.append_inst(inst, bb);
    }

    /// Create a new BB.
    pub fn block(&mut self) -> Block {
        let bb = self.func.cfg.add_block();
        self.func.layout.append_block(bb);
        bb
    }

    /// Create a new named BB.
    pub fn named_block(&mut self, name: impl Into<String>) -> Block {
        let bb = self.block();
        self.func.cfg.set_name(bb, name.into());
        bb
    }

    /// Create a new named BB, placed right after `after` in the layout.
    pub fn named_block_after(&mut self, name: impl Into<String>, after: Block) -> Block {
        let bb = self.func.cfg.add_block();
        self.func.layout.insert_block_after(bb, after);
        self.func.cfg.set_name(bb, name.into());
        bb
    }

    /// Remove a BB and all the instructions it contains.
    ///
    /// Uses of values defined in the block are replaced with `undef`, and phi
    /// nodes elsewhere drop their incoming edge from the block. No terminator
    /// outside the block may branch to it.
    pub fn remove_block(&mut self, bb: Block) {
        let insts: Vec<_> = self.func.layout.insts(bb).collect();
        for &inst in &insts {
            if let Some(result) = self.func.dfg.get_inst_result(inst) {
                let ty = self.func.dfg.value_type(result);
                let undef = self.func.dfg.undef(ty);
                self.func.dfg.replace_use(result, undef);
            }
        }
        for inst in insts {
            self.remove_inst(inst);
        }
        let users: Vec<_> = self.func.dfg.block_users(bb).collect();
        for inst in users {
            if self.func.dfg[inst].opcode().is_phi() {
                self.func.dfg.remove_phi_incoming(inst, bb);
            } else {
                panic!(
                    "{} removed while still targeted by `{}`",
                    bb,
                    inst.dump(self.func)
                );
            }
        }
        match self.pos {
            FunctionInsertPos::Append(b) | FunctionInsertPos::Prepend(b) if b == bb => {
                self.pos = FunctionInsertPos::None
            }
            _ => (),
        }
        self.func.dfg.forget_block(bb);
        self.func.dfg.touch_cfg();
        self.func.layout.remove_block(bb);
        self.func.cfg.remove_block(bb);
    }

    /// Set the name of a BB.
    pub fn set_block_name(&mut self, bb: Block, name: impl Into<String>) {
        self.func.cfg.set_name(bb, name.into())
    }

    /// Clear the name of a BB.
    pub fn clear_block_name(&mut self, bb: Block) -> Option<String> {
        self.func.cfg.clear_name(bb)
    }

    /// Append all following instructions to the end of `bb`.
    pub fn append_to(&mut self, bb: Block) {
        self.pos = FunctionInsertPos::Append(bb);
    }

    /// Prepend all following instructions to the beginning of `bb`.
    pub fn prepend_to(&mut self, bb: Block) {
        self.pos = FunctionInsertPos::Prepend(bb);
    }

    /// Insert all following instructions after `inst`.
    pub fn insert_after(&mut self, inst: Inst) {
        self.pos = FunctionInsertPos::After(inst);
    }

    /// Insert all following instructions before `inst`.
    pub fn insert_before(&mut self, inst: Inst) {
        self.pos = FunctionInsertPos::Before(inst);
    }

    /// Insert all following instructions at the end of `bb`, but before its
    /// terminator if it has one.
    pub fn insert_before_terminator(&mut self, bb: Block) {
        self.pos = match self.func.terminator(bb) {
            Some(term) => FunctionInsertPos::Before(term),
            None => FunctionInsertPos::Append(bb),
        };
    }

    /// Insert all following instructions right after the phi nodes of `bb`.
    pub fn insert_after_phis(&mut self, bb: Block) {
        self.pos = match self.func.phis(bb).last() {
            Some(&phi) => FunctionInsertPos::After(phi),
            None => FunctionInsertPos::Prepend(bb),
        };
    }

    /// Import an external function for use within this function.
    ///
    /// Importing the same name twice yields the same handle.
    pub fn add_extern(&mut self, name: impl Into<String>, sig: Signature) -> ExtUnit {
        let name = name.into();
        if let Some((ext, _)) = self
            .func
            .dfg
            .ext_units
            .iter()
            .find(|(_, data)| data.name == name)
        {
            return ext;
        }
        self.func.dfg.ext_units.add(ExtUnitData { name, sig })
    }
}
