// Copyright (c) 2017-2021 Fabian Schuiki

//! Optimization infrastructure.
//!
//! This module implements the scaffolding shared by all optimization passes:
//! the `Pass` trait, the `PassContext` carrying optimization configuration,
//! and the `PassPipeline` which runs an ordered list of passes over a module.

mod pass;
mod pipeline;
pub mod prelude;

pub use self::pass::*;
pub use self::pipeline::*;
