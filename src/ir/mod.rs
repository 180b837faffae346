// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of functions and modules.
//!
//! This module implements the intermediate representation around which the rest
//! of the framework is built. Functions hold their instructions, values, and
//! blocks in tables addressed by opaque keys; the relationships between them
//! (operands, users, branch targets) are maintained by the `DataFlowGraph`.

use crate::{impl_table_key, ty::Type, value::IntValue};

mod cfg;
mod dfg;
mod function;
mod inst;
mod layout;
mod module;
pub mod prelude;
mod sig;

pub use self::cfg::*;
pub use self::dfg::*;
pub use self::function::*;
pub use self::inst::*;
pub use self::layout::*;
pub use self::module::*;
pub use self::sig::*;

impl_table_key! {
    /// An instruction.
    struct Inst(u32) as "i";

    /// A value.
    struct Value(u32) as "v";

    /// A basic block.
    struct Block(u32) as "bb";

    /// An argument of a `Function`.
    struct Arg(u32) as "arg";

    /// An external function referenced by a call.
    struct ExtUnit(u32) as "ext";
}

/// Internal table storage for values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ValueData {
    /// The value is the result of an instruction.
    Inst { ty: Type, inst: Inst },
    /// The value is an argument of the function.
    Arg { ty: Type, arg: Arg },
    /// The value is an integer constant.
    Const { ty: Type, imm: IntValue },
    /// The value is undefined.
    Undef { ty: Type },
    /// The value is a register written by `copy` instructions.
    ///
    /// Registers only appear after SSA destruction and are exempt from the
    /// single definition rule.
    Reg { ty: Type },
}

impl ValueData {
    /// Return the type of the value.
    pub fn ty(&self) -> &Type {
        match self {
            ValueData::Inst { ty, .. } => ty,
            ValueData::Arg { ty, .. } => ty,
            ValueData::Const { ty, .. } => ty,
            ValueData::Undef { ty } => ty,
            ValueData::Reg { ty } => ty,
        }
    }

    /// Check whether this value is a constant.
    pub fn is_const(&self) -> bool {
        match self {
            ValueData::Const { .. } => true,
            _ => false,
        }
    }

    /// Check whether this value is undefined.
    pub fn is_undef(&self) -> bool {
        match self {
            ValueData::Undef { .. } => true,
            _ => false,
        }
    }

    /// Check whether this value is a register.
    pub fn is_reg(&self) -> bool {
        match self {
            ValueData::Reg { .. } => true,
            _ => false,
        }
    }
}

/// Another function referenced within a function.
///
/// Calls refer to their target by name; `Module::link` resolves these names
/// once all functions of the module are known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtUnitData {
    /// The name of the referenced function.
    pub name: String,
    /// The signature of the referenced function.
    pub sig: Signature,
}

/// Internal table storage for blocks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockData {
    /// The name of the block.
    pub name: Option<String>,
}
