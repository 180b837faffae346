// Copyright (c) 2017-2021 Fabian Schuiki

//! Re-exports of commonly used IR data structures.

pub use crate::ir::{
    Arg, Block, ExtUnit, FuncId, FunctionBuilder, FunctionData, Inst, InstData, Module, Opcode,
    Signature, Value, ValueData,
};
pub use crate::ty::{int_ty, pointer_ty, void_ty, Type};
pub use crate::value::IntValue;
