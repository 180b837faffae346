// Copyright (c) 2017-2021 Fabian Schuiki

use crate::{
    ir::Module,
    opt::{Pass, PassContext},
    pass,
};

/// The signature of a module-level pass driver.
pub type PassFn = fn(&PassContext, &mut Module) -> bool;

/// An ordered list of passes to run over a module.
#[derive(Clone, Default)]
pub struct PassPipeline {
    passes: Vec<(&'static str, PassFn)>,
}

/// The standard order of passes.
static DEFAULT_PIPELINE: &[&str] = &[
    "ssa",
    "gvn",
    "loop-simplify",
    "osr",
    "sccp",
    "cfs",
    "gvn",
    "adce",
    "ssa-destruct",
];

impl PassPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create the standard optimization pipeline.
    pub fn default_pipeline() -> Self {
        match Self::parse(DEFAULT_PIPELINE.iter().cloned()) {
            Ok(pipeline) => pipeline,
            Err(e) => panic!("default pipeline is malformed: {}", e),
        }
    }

    /// Create a pipeline from a list of pass names.
    ///
    /// Each entry may itself be a comma-separated list, such that both
    /// `["ssa", "gvn"]` and `["ssa,gvn"]` are accepted.
    pub fn parse<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Self, UnknownPassError> {
        let mut pipeline = Self::new();
        for name in names
            .into_iter()
            .flat_map(|n| n.split(','))
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            match pass::lookup(name) {
                Some((name, run)) => pipeline.passes.push((name, run)),
                None => return Err(UnknownPassError(name.to_owned())),
            }
        }
        Ok(pipeline)
    }

    /// Append a pass to the pipeline.
    pub fn add<P: Pass>(&mut self, name: &'static str) -> &mut Self {
        let run: PassFn = P::run_on_module;
        self.passes.push((name, run));
        self
    }

    /// Return the names of the passes in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|&(name, _)| name).collect()
    }

    /// Return the number of passes.
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check whether the pipeline contains no passes.
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Run all passes over a module, in order.
    pub fn run(&self, ctx: &PassContext, module: &mut Module) -> PipelineStats {
        debug!("Running {:?}", self.names());
        let mut stats = PipelineStats::default();
        for &(name, run) in &self.passes {
            trace!("Running pass {}", name);
            let t0 = time::precise_time_ns();
            let modified = run(ctx, module);
            let t1 = time::precise_time_ns();
            debug!(
                "Pass {} {} the module",
                name,
                if modified { "modified" } else { "did not modify" }
            );
            stats.times.push((name.to_owned(), t1 - t0));
            stats.modified |= modified;
            if ctx.verify_each {
                module.verify();
            }
        }
        stats
    }
}

impl std::fmt::Debug for PassPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self.names())
    }
}

/// Statistics gathered while running a pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// The time each pass took, in nanoseconds.
    pub times: Vec<(String, u64)>,
    /// Whether any pass modified the module.
    pub modified: bool,
}

/// A pass name that does not name any known pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPassError(pub String);

impl std::fmt::Display for UnknownPassError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "unknown pass `{}`", self.0)
    }
}

impl std::error::Error for UnknownPassError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_commas() {
        let pipeline = PassPipeline::parse(vec!["ssa,gvn", "dce"]).unwrap();
        assert_eq!(pipeline.names(), vec!["ssa", "gvn", "dce"]);
    }

    #[test]
    fn parse_rejects_unknown_passes() {
        let err = PassPipeline::parse(vec!["ssa", "frobnicate"]).unwrap_err();
        assert_eq!(err, UnknownPassError("frobnicate".to_owned()));
    }

    #[test]
    fn default_pipeline_starts_with_ssa() {
        let pipeline = PassPipeline::default_pipeline();
        assert_eq!(pipeline.names()[0], "ssa");
        assert_eq!(pipeline.names().last(), Some(&"ssa-destruct"));
    }
}
