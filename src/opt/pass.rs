// Copyright (c) 2017-2021 Fabian Schuiki

use crate::ir::prelude::*;
use rayon::prelude::*;

/// An optimization pass.
///
/// The optimization infrastructure will always call `run_on_module()`. However,
/// implementors of the trait should override the function at their desired
/// level of granularity. The `Pass` trait provides a sane default for all
/// `run_*()` functions.
pub trait Pass {
    /// Run this pass on an entire module.
    ///
    /// Functions are processed in parallel unless the context asks for
    /// sequential execution.
    fn run_on_module(ctx: &PassContext, module: &mut Module) -> bool {
        if ctx.parallel {
            module
                .par_functions_mut()
                .map(|func| Self::run_on_function(ctx, &mut FunctionBuilder::new(func)))
                .reduce(|| false, |a, b| a || b)
        } else {
            module
                .functions_mut()
                .map(|func| Self::run_on_function(ctx, &mut FunctionBuilder::new(func)))
                .fold(false, |a, b| a || b)
        }
    }

    /// Run this pass on an entire function.
    fn run_on_function(ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        Self::run_on_cfg(ctx, func)
    }

    /// Run this pass on every instruction of a function.
    fn run_on_cfg(ctx: &PassContext, func: &mut FunctionBuilder) -> bool {
        let mut modified = false;
        let insts: Vec<_> = func.all_insts().collect();
        for inst in insts {
            if func.dfg.has_inst(inst) {
                modified |= Self::run_on_inst(ctx, inst, func);
            }
        }
        modified
    }

    /// Run this pass on an instruction.
    #[allow(unused_variables)]
    fn run_on_inst(ctx: &PassContext, inst: Inst, func: &mut FunctionBuilder) -> bool {
        false
    }
}

/// Additional context and configuration for optimizations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassContext {
    /// Verify the module after every pass of a pipeline.
    pub verify_each: bool,
    /// How deep call-aware constant propagation may nest into callees.
    pub max_call_depth: usize,
    /// Whether module-level drivers may process functions in parallel.
    pub parallel: bool,
}

impl Default for PassContext {
    fn default() -> Self {
        Self {
            verify_each: false,
            max_call_depth: 4,
            parallel: true,
        }
    }
}

impl PassContext {
    /// Create a new context with the default configuration.
    pub fn new() -> Self {
        Default::default()
    }

    /// Verify the module after every pass.
    pub fn with_verify_each(mut self, verify_each: bool) -> Self {
        self.verify_each = verify_each;
        self
    }

    /// Limit how deep constant propagation nests into callees.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Allow or forbid processing functions in parallel.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
