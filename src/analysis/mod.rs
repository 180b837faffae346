// Copyright (c) 2017-2021 Fabian Schuiki

//! Analysis passes on the IR
//!
//! This module implements the analyses the optimization passes build upon:
//! predecessor tables, dominator trees with dominance frontiers, and natural
//! loop discovery. Analysis results are separate from the function they were
//! computed for and record the CFG epoch they are valid for.

mod domtree;
mod loops;
mod preds;

pub use self::domtree::*;
pub use self::loops::*;
pub use self::preds::*;
