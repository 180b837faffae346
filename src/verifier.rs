// Copyright (c) 2017-2021 Fabian Schuiki

//! Verification of IR integrity.
//!
//! This module implements verification of the intermediate representation. It
//! checks that functions are well-formed, basic blocks have terminators, phi
//! nodes agree with the CFG, definitions dominate their uses, and types line
//! up.

use crate::{
    analysis::DominatorTree,
    ir::{prelude::*, InstData, ValueData},
    ty::{int_ty, void_ty},
};
use std::{
    fmt::Display,
    ops::{Deref, DerefMut},
};

/// An IR verifier.
///
/// The `Verifier` acts as a context to call the various IR checking functions
/// on. It keeps track of errors.
#[derive(Default)]
pub struct Verifier {
    errors: VerifierErrors,
    unit_name: Option<String>,
}

impl Verifier {
    /// Create a new verifier.
    pub fn new() -> Self {
        Default::default()
    }

    /// Verify the integrity of a `Module`.
    pub fn verify_module(&mut self, module: &Module) {
        for (_, func) in module.functions() {
            self.verify_function(func);
        }
    }

    fn push(&mut self, object: Option<String>, message: String) {
        self.errors.push(VerifierError {
            unit: self.unit_name.clone(),
            object,
            message,
        });
    }

    /// Verify the integrity of a function.
    pub fn verify_function(&mut self, func: &FunctionData) {
        self.unit_name = Some(format!("func @{}", func.name));
        if func.layout.first_block().is_none() {
            self.push(None, format!("layout has no entry block"));
            self.unit_name = None;
            return;
        }

        // Structure of blocks first. Dominance is meaningless on a CFG with
        // dangling references, so bail out early if this fails.
        let errors_before = self.errors.len();
        for bb in func.blocks() {
            self.verify_block_shape(func, bb);
        }
        for inst in func.all_insts() {
            self.verify_operands_defined(func, inst);
        }
        if self.errors.len() > errors_before {
            self.unit_name = None;
            return;
        }

        let domtree = DominatorTree::new(func);
        for bb in func.blocks() {
            for inst in func.insts(bb) {
                InstVerifier {
                    verifier: self,
                    func,
                }
                .verify_inst(inst);

                // Check that the instruction dominates all its uses.
                if !domtree.is_reachable(bb) {
                    continue;
                }
                if let Some(result) = func.dfg.get_inst_result(inst) {
                    for &user in func.dfg.uses(result) {
                        self.verify_use_dominated(func, &domtree, inst, result, user);
                    }
                }
            }
        }

        self.unit_name = None;
    }

    /// Check the placement of phis and terminators in a block.
    fn verify_block_shape(&mut self, func: &FunctionData, bb: Block) {
        // Check that the block has at least one instruction.
        let last = match func.layout.last_inst(bb) {
            Some(last) => last,
            None => {
                self.push(Some(bb.dump(func).to_string()), format!("block is empty"));
                return;
            }
        };

        let mut seen_non_phi = false;
        for inst in func.insts(bb) {
            let opcode = func.dfg[inst].opcode();

            // Check that there are no terminator instructions in the middle
            // of the block.
            if opcode.is_terminator() && inst != last {
                self.push(
                    Some(inst.dump(func).to_string()),
                    format!("terminator must be at the end of block {}", bb.dump(func)),
                );
            }

            // Check that phis are grouped at the head of the block.
            if opcode.is_phi() {
                if seen_non_phi {
                    self.push(
                        Some(inst.dump(func).to_string()),
                        format!("phi must be at the head of block {}", bb.dump(func)),
                    );
                }
                self.verify_phi_edges(func, bb, inst);
            } else {
                seen_non_phi = true;
            }
        }

        // Check that the last instruction in the block is a terminator.
        if !func.dfg[last].opcode().is_terminator() {
            self.push(
                Some(bb.dump(func).to_string()),
                format!(
                    "last instruction `{}` must be a terminator",
                    last.dump(func)
                ),
            );
        }
    }

    /// Check that a phi has exactly one incoming edge per predecessor.
    fn verify_phi_edges(&mut self, func: &FunctionData, bb: Block, inst: Inst) {
        let mut incoming: Vec<Block> = func.dfg[inst].blocks().to_vec();
        incoming.sort();
        let preds = func.predecessors(bb);
        let mut deduped = incoming.clone();
        deduped.dedup();
        if deduped.len() != incoming.len() {
            self.push(
                Some(inst.dump(func).to_string()),
                format!("phi has multiple incoming values for the same block"),
            );
        }
        if deduped != preds {
            self.push(
                Some(inst.dump(func).to_string()),
                format!(
                    "phi incoming blocks must match the predecessors of {}",
                    bb.dump(func)
                ),
            );
        }
    }

    /// Check that every operand and target of an instruction exists.
    fn verify_operands_defined(&mut self, func: &FunctionData, inst: Inst) {
        for &value in func.dfg[inst].args() {
            let defined = func.dfg.has_value(value)
                && match func.dfg[value] {
                    ValueData::Inst { inst, .. } => func.layout.inst_block(inst).is_some(),
                    _ => true,
                };
            if !defined {
                self.push(
                    Some(inst.dump(func).to_string()),
                    format!("value {} has no definition", value),
                );
            }
        }
        for &block in func.dfg[inst].blocks() {
            if !func.layout.is_block_inserted(block) {
                self.push(
                    Some(inst.dump(func).to_string()),
                    format!("block {} has no definition", block),
                );
            }
        }
    }

    /// Check that the definition of `result` by `inst` dominates its use in
    /// `user`. Phis use their operands at the end of the incoming block.
    fn verify_use_dominated(
        &mut self,
        func: &FunctionData,
        domtree: &DominatorTree,
        inst: Inst,
        result: Value,
        user: Inst,
    ) {
        let user_bb = match func.inst_block(user) {
            Some(bb) => bb,
            None => return,
        };
        if !domtree.is_reachable(user_bb) {
            return;
        }
        let dominated = if func.dfg[user].opcode().is_phi() {
            func.dfg[user]
                .phi_edges()
                .filter(|&(v, bb)| v == result && domtree.is_reachable(bb))
                .all(|(_, bb)| domtree.value_dominates_block(func, result, bb))
        } else {
            user != inst && domtree.inst_dominates_inst(func, inst, user)
        };
        if !dominated {
            self.push(
                Some(inst.dump(func).to_string()),
                format!("does not dominate use in `{}`", user.dump(func)),
            );
        }
    }

    /// Finish verification and return the result.
    ///
    /// Consumes the verifier.
    pub fn finish(self) -> Result<(), VerifierErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    /// Finish verification and panic if errors occurred.
    ///
    /// Consumes the verifier.
    pub fn finish_panic(self) {
        match self.finish() {
            Ok(()) => (),
            Err(errs) => panic!("Verification failed:\n{}", errs),
        }
    }
}

/// An instruction verifier.
struct InstVerifier<'a> {
    verifier: &'a mut Verifier,
    func: &'a FunctionData,
}

impl<'a> Deref for InstVerifier<'a> {
    type Target = Verifier;
    fn deref(&self) -> &Verifier {
        self.verifier
    }
}

impl<'a> DerefMut for InstVerifier<'a> {
    fn deref_mut(&mut self) -> &mut Verifier {
        self.verifier
    }
}

impl<'a> InstVerifier<'a> {
    fn error(&mut self, inst: Inst, message: String) {
        let object = Some(inst.dump(self.func).to_string());
        self.verifier.push(object, message);
    }

    fn ty(&self, value: Value) -> Type {
        self.func.dfg.value_type(value)
    }

    fn inst_ty(&self, inst: Inst) -> Type {
        match self.func.dfg.get_inst_result(inst) {
            Some(result) => self.ty(result),
            None => void_ty(),
        }
    }

    /// Verify the types of a single instruction.
    fn verify_inst(&mut self, inst: Inst) {
        let func = self.func;
        let data = &func.dfg[inst];
        let opcode = data.opcode();
        let args = data.args();

        // Check that the opcode has the format it expects. This match block
        // acts as the source of truth for the shape of instructions.
        let format_ok = match (opcode, data) {
            (Opcode::Alloca, InstData::Nullary { .. }) => true,
            (Opcode::Ret, InstData::Nullary { .. }) => true,
            (Opcode::Load, InstData::Unary { .. }) => true,
            (Opcode::RetValue, InstData::Unary { .. }) => true,
            (op, InstData::Unary { .. }) if op.is_unary_arith() || op.is_cast() => true,
            (Opcode::Store, InstData::Binary { .. }) => true,
            (Opcode::Copy, InstData::Binary { .. }) => true,
            (op, InstData::Binary { .. }) if op.is_binary_arith() || op.is_compare() => true,
            (Opcode::Phi, InstData::Phi { .. }) => true,
            (Opcode::Br, InstData::Jump { .. }) => true,
            (Opcode::BrCond, InstData::Branch { .. }) => true,
            (Opcode::Call, InstData::Call { .. }) => true,
            _ => false,
        };
        if !format_ok {
            panic!(
                "{0:?} ({0}) has mismatching instruction format {1:?}",
                opcode, data
            );
        }

        match opcode {
            Opcode::Alloca => {
                if !self.inst_ty(inst).is_pointer() {
                    self.error(inst, format!("alloca must produce a pointer"));
                }
            }
            Opcode::Load => {
                let ty = self.inst_ty(inst);
                let ptr_ty = self.ty(args[0]);
                if !ptr_ty.is_pointer() || *ptr_ty.unwrap_pointer() != ty {
                    self.error(
                        inst,
                        format!("type {} must be pointer of return type {}", ptr_ty, ty),
                    );
                }
            }
            Opcode::Store => {
                let ptr_ty = self.ty(args[0]);
                let ty = self.ty(args[1]);
                if !ptr_ty.is_pointer() || *ptr_ty.unwrap_pointer() != ty {
                    self.error(
                        inst,
                        format!(
                            "store target type {} must be pointer of stored value type {}",
                            ptr_ty, ty
                        ),
                    );
                }
            }
            op if op.is_unary_arith() || op.is_binary_arith() => {
                let ty = self.inst_ty(inst);
                if !ty.is_int() {
                    self.error(inst, format!("return type must be iN (but is {})", ty));
                }
                self.verify_args_match_ty(inst, &ty);
            }
            op if op.is_compare() => {
                self.verify_arg_tys_match(inst);
                let ty = self.inst_ty(inst);
                if ty != int_ty(1) {
                    self.error(inst, format!("return type must be i1 (but is {})", ty));
                }
            }
            op if op.is_cast() => {
                let ty = self.inst_ty(inst);
                let arg_ty = self.ty(args[0]);
                let ok = ty.is_int()
                    && arg_ty.is_int()
                    && match op {
                        Opcode::Trunc => ty.unwrap_int() < arg_ty.unwrap_int(),
                        _ => ty.unwrap_int() > arg_ty.unwrap_int(),
                    };
                if !ok {
                    self.error(inst, format!("cannot {} {} to {}", op, arg_ty, ty));
                }
            }
            Opcode::Phi => {
                let ty = self.inst_ty(inst);
                self.verify_args_match_ty(inst, &ty);
            }
            Opcode::Copy => {
                if !func.dfg.has_value(args[0]) || !func.dfg[args[0]].is_reg() {
                    self.error(inst, format!("copy destination must be a register"));
                }
                self.verify_arg_tys_match(inst);
            }
            Opcode::Call => {
                let unit = match data.get_ext_unit() {
                    Some(unit) => unit,
                    None => return,
                };
                let sig = &func.dfg[unit].sig;
                if sig.num_args() != args.len() {
                    self.error(
                        inst,
                        format!(
                            "call passes {} arguments to a function taking {}",
                            args.len(),
                            sig.num_args()
                        ),
                    );
                    return;
                }
                for (arg, &value) in sig.args().zip(args.iter()) {
                    let ty = sig.arg_type(arg);
                    self.verify_arg_matches_ty(inst, value, &ty);
                }
            }
            Opcode::BrCond => {
                let ty = int_ty(1);
                self.verify_args_match_ty(inst, &ty);
            }
            Opcode::Br => (),
            Opcode::Ret => self.verify_return_type(inst, &void_ty()),
            Opcode::RetValue => {
                let ty = self.ty(args[0]);
                self.verify_return_type(inst, &ty);
            }
            _ => (),
        }
    }

    /// Verify that the types of an instruction's arguments agree.
    fn verify_arg_tys_match(&mut self, inst: Inst) {
        let func = self.func;
        let args = func.dfg[inst].args();
        let ty = match args.get(0) {
            Some(&arg) => self.ty(arg),
            None => return,
        };
        if args[1..].iter().any(|&arg| self.ty(arg) != ty) {
            let tys: Vec<_> = args.iter().map(|&arg| self.ty(arg).to_string()).collect();
            let tys: String = tys.join(", ");
            self.error(
                inst,
                format!("argument types must match (but are {})", tys),
            );
        }
    }

    /// Verify that the types of an instruction's arguments match a given type.
    fn verify_args_match_ty(&mut self, inst: Inst, ty: &Type) {
        let func = self.func;
        for &arg in func.dfg[inst].args() {
            self.verify_arg_matches_ty(inst, arg, ty);
        }
    }

    /// Verify that the type of an instruction's argument matches a given type.
    fn verify_arg_matches_ty(&mut self, inst: Inst, arg: Value, ty: &Type) {
        let arg_ty = self.ty(arg);
        if arg_ty != *ty {
            self.error(
                inst,
                format!(
                    "argument {} must be of type {} (but is {})",
                    arg.dump(self.func),
                    ty,
                    arg_ty,
                ),
            );
        }
    }

    /// Verify that the return type of the enclosing function is compatible with
    /// a ret instruction.
    fn verify_return_type(&mut self, inst: Inst, ty: &Type) {
        let func_ty = self.func.sig.return_type();
        if func_ty != *ty {
            self.error(
                inst,
                format!(
                    "requires function to have return type {} (but has {})",
                    ty, func_ty
                ),
            );
        }
    }
}

/// A verification error.
#[derive(Debug)]
pub struct VerifierError {
    /// The function within which the error occurred.
    pub unit: Option<String>,
    /// The object which caused the error.
    pub object: Option<String>,
    /// The error message.
    pub message: String,
}

impl Display for VerifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(ref unit) = self.unit {
            write!(f, "{}: ", unit)?;
        }
        if let Some(ref object) = self.object {
            write!(f, "{}: ", object)?;
        }
        write!(f, "{}", self.message)?;
        Ok(())
    }
}

/// A list of verification errors.
#[derive(Debug, Default)]
pub struct VerifierErrors(pub Vec<VerifierError>);

impl Deref for VerifierErrors {
    type Target = Vec<VerifierError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for VerifierErrors {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Display for VerifierErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for err in self.iter() {
            writeln!(f, "- {}", err)?;
        }
        Ok(())
    }
}
