// Copyright (c) 2017-2021 Fabian Schuiki

//! Optimization and analysis passes on the IR.
//!
//! This module implements the passes that promote memory to SSA form,
//! optimize the SSA form, and lower it back into copies.

pub mod adce;
pub mod cfs;
pub mod dce;
pub mod gvn;
pub mod loop_simplify;
pub mod osr;
pub mod sccp;
pub mod ssa;
pub mod ssa_destruct;

pub use adce::AggressiveDeadCodeElim;
pub use cfs::ControlFlowSimplification;
pub use dce::DeadCodeElim;
pub use gvn::GlobalValueNumbering;
pub use loop_simplify::LoopSimplify;
pub use osr::StrengthReduction;
pub use sccp::SparseCondConstProp;
pub use ssa::SsaConstruction;
pub use ssa_destruct::SsaDestruction;

use crate::{
    ir::Module,
    opt::{Pass, PassContext, PassFn},
    verifier::Verifier,
};

/// The passes known by name, together with a short description.
pub static PASSES: &[(&str, &str)] = &[
    ("ssa", "SSA Construction (memory to register promotion)"),
    ("gvn", "Global Value Numbering"),
    ("sccp", "Sparse Conditional Constant Propagation"),
    ("cfs", "Control Flow Simplification"),
    ("dce", "Dead Code Elimination"),
    ("adce", "Aggressive Dead Code Elimination"),
    ("osr", "Operator Strength Reduction"),
    ("loop-simplify", "Loop Simplification (preheader insertion)"),
    ("ssa-destruct", "SSA Destruction (phi to copy lowering)"),
    ("verify", "Verify the module and log any errors"),
];

/// Find a pass by name.
pub fn lookup(name: &str) -> Option<(&'static str, PassFn)> {
    let run: PassFn = match name {
        "ssa" => SsaConstruction::run_on_module,
        "gvn" => GlobalValueNumbering::run_on_module,
        "sccp" => SparseCondConstProp::run_on_module,
        "cfs" => ControlFlowSimplification::run_on_module,
        "dce" => DeadCodeElim::run_on_module,
        "adce" => AggressiveDeadCodeElim::run_on_module,
        "osr" => StrengthReduction::run_on_module,
        "loop-simplify" => LoopSimplify::run_on_module,
        "ssa-destruct" => SsaDestruction::run_on_module,
        "verify" => verify_module,
        _ => return None,
    };
    let name = PASSES.iter().find(|&&(n, _)| n == name)?.0;
    Some((name, run))
}

/// Verify a module and log the errors, without modifying it.
fn verify_module(_ctx: &PassContext, module: &mut Module) -> bool {
    let mut verifier = Verifier::new();
    verifier.verify_module(module);
    match verifier.finish() {
        Ok(_) => (),
        Err(errs) => error!("Verification failed:\n{}", errs),
    }
    false // no changes
}
