// Copyright (c) 2017-2021 Fabian Schuiki

//! Re-exports of everything needed to implement an optimization pass.

pub use crate::ir::prelude::*;
pub use crate::opt::{Pass, PassContext, PassPipeline};
