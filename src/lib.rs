// Copyright (c) 2017-2021 Fabian Schuiki

//! An SSA intermediate representation and a suite of classical optimization
//! passes. This library provides the middle end of a small compiler: it takes
//! a control flow graph with memory-based local variables, promotes them to
//! SSA values, optimizes the result, and lowers it back out of SSA form for a
//! backend to consume.

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde;

mod ty;
pub mod analysis;
pub mod ir;
pub mod opt;
pub mod pass;
pub mod table;
mod value;
pub mod verifier;

pub use crate::{ty::*, value::*};
