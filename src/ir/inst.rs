// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of instructions.
//!
//! This module implements the various instructions of the intermediate
//! representation.

use crate::{
    ir::{Block, ExtUnit, FunctionBuilder, FunctionData, Inst, Value, ValueData},
    table::TableKey,
    ty::{int_ty, pointer_ty, void_ty, Type},
    value::IntValue,
};
use bitflags::bitflags;

/// A temporary object used to construct a single instruction.
pub struct InstBuilder<'a, 'b> {
    builder: &'b mut FunctionBuilder<'a>,
    name: Option<String>,
}

impl<'a, 'b> InstBuilder<'a, 'b> {
    /// Create a new instruction builder that inserts into `builder`.
    pub fn new(builder: &'b mut FunctionBuilder<'a>) -> Self {
        Self {
            builder,
            name: None,
        }
    }

    /// Assign a name to the instruction being built.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<'a, 'b> InstBuilder<'a, 'b> {
    /// Get the value of an integer constant.
    ///
    /// Constants are interned in the function and do not produce an
    /// instruction.
    pub fn const_int(&mut self, value: impl Into<IntValue>) -> Value {
        self.builder.dfg.const_int(value.into())
    }

    /// Creates alloca instruction to reserve a stack slot for a value of type
    /// `ty`.
    pub fn alloca(&mut self, ty: Type) -> Value {
        let inst = self.build(
            InstData::Nullary {
                opcode: Opcode::Alloca,
            },
            pointer_ty(ty),
        );
        self.inst_result(inst)
    }

    /// Creates load instruction to read the value behind a pointer.
    pub fn load(&mut self, ptr: Value) -> Value {
        let ty = self.value_type(ptr).unwrap_pointer().clone();
        let inst = self.build_unary(Opcode::Load, ty, ptr);
        self.inst_result(inst)
    }

    /// Creates store instruction to write `value` to the slot behind `ptr`.
    pub fn store(&mut self, ptr: Value, value: Value) -> Inst {
        self.build_binary(Opcode::Store, void_ty(), ptr, value)
    }

    /// Creates not instruction to generate the bitwise inverse of a value.
    pub fn not(&mut self, x: Value) -> Value {
        self.unary(Opcode::Not, x)
    }

    /// Creates neg instruction to compute the two's complement of a value.
    pub fn neg(&mut self, x: Value) -> Value {
        self.unary(Opcode::Neg, x)
    }

    /// Creates add instruction.
    pub fn add(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Add, x, y)
    }

    /// Creates sub instruction.
    pub fn sub(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Sub, x, y)
    }

    /// Creates mul instruction.
    pub fn mul(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Mul, x, y)
    }

    /// Creates sdiv instruction for signed division.
    pub fn sdiv(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Sdiv, x, y)
    }

    /// Creates srem instruction for the signed remainder.
    pub fn srem(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Srem, x, y)
    }

    /// Creates udiv instruction for unsigned division.
    pub fn udiv(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Udiv, x, y)
    }

    /// Creates urem instruction for the unsigned remainder.
    pub fn urem(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Urem, x, y)
    }

    /// Creates and instruction to compute bitwise AND.
    pub fn and(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::And, x, y)
    }

    /// Creates or instruction to compute bitwise OR.
    pub fn or(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Or, x, y)
    }

    /// Creates xor instruction to compute bitwise XOR.
    pub fn xor(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Xor, x, y)
    }

    /// Creates shl instruction to shift `x` left by `y` bits.
    pub fn shl(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Shl, x, y)
    }

    /// Creates shr instruction to arithmetically shift `x` right by `y` bits.
    pub fn shr(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Shr, x, y)
    }

    /// Creates eq instruction.
    pub fn eq(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Eq, x, y)
    }

    /// Creates neq instruction.
    pub fn neq(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Neq, x, y)
    }

    /// Creates slt instruction for signed less-than.
    pub fn slt(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Slt, x, y)
    }

    /// Creates sgt instruction for signed greater-than.
    pub fn sgt(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Sgt, x, y)
    }

    /// Creates sle instruction for signed less-than-or-equal.
    pub fn sle(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Sle, x, y)
    }

    /// Creates sge instruction for signed greater-than-or-equal.
    pub fn sge(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Sge, x, y)
    }

    /// Creates ult instruction for unsigned less-than.
    pub fn ult(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Ult, x, y)
    }

    /// Creates ugt instruction for unsigned greater-than.
    pub fn ugt(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Ugt, x, y)
    }

    /// Creates ule instruction for unsigned less-than-or-equal.
    pub fn ule(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Ule, x, y)
    }

    /// Creates uge instruction for unsigned greater-than-or-equal.
    pub fn uge(&mut self, x: Value, y: Value) -> Value {
        self.binary(Opcode::Uge, x, y)
    }

    /// Creates zext instruction to zero-extend `x` to `ty`.
    pub fn zext(&mut self, x: Value, ty: Type) -> Value {
        let inst = self.build_unary(Opcode::Zext, ty, x);
        self.inst_result(inst)
    }

    /// Creates sext instruction to sign-extend `x` to `ty`.
    pub fn sext(&mut self, x: Value, ty: Type) -> Value {
        let inst = self.build_unary(Opcode::Sext, ty, x);
        self.inst_result(inst)
    }

    /// Creates trunc instruction to truncate `x` to `ty`.
    pub fn trunc(&mut self, x: Value, ty: Type) -> Value {
        let inst = self.build_unary(Opcode::Trunc, ty, x);
        self.inst_result(inst)
    }

    /// Creates a unary arithmetic instruction given its opcode.
    pub fn unary(&mut self, opcode: Opcode, x: Value) -> Value {
        assert!(opcode.is_unary_arith(), "{} is not a unary op", opcode);
        let ty = self.value_type(x);
        let inst = self.build_unary(opcode, ty, x);
        self.inst_result(inst)
    }

    /// Creates a binary arithmetic or comparison instruction given its
    /// opcode.
    pub fn binary(&mut self, opcode: Opcode, x: Value, y: Value) -> Value {
        let ty = if opcode.is_compare() {
            int_ty(1)
        } else if opcode.is_binary_arith() {
            self.value_type(x)
        } else {
            panic!("{} is not a binary op", opcode)
        };
        let inst = self.build_binary(opcode, ty, x, y);
        self.inst_result(inst)
    }

    /// Creates call instruction to invoke an external function.
    ///
    /// Returns the instruction, since calls to `void` functions have no
    /// result.
    pub fn call(&mut self, unit: ExtUnit, args: Vec<Value>) -> Inst {
        let ty = self.builder.dfg[unit].sig.return_type();
        let data = InstData::Call {
            opcode: Opcode::Call,
            unit,
            args,
        };
        self.build(data, ty)
    }

    /// Creates phi instruction to merge values flowing in from multiple
    /// predecessor blocks.
    pub fn phi(&mut self, args: Vec<Value>, bbs: Vec<Block>) -> Value {
        assert!(args.len() > 0);
        let ty = self.value_type(args[0]);
        self.phi_typed(ty, args, bbs)
    }

    /// Creates phi instruction of an explicit type.
    ///
    /// The incoming lists may be empty and filled in later through the
    /// `DataFlowGraph`.
    pub fn phi_typed(&mut self, ty: Type, args: Vec<Value>, bbs: Vec<Block>) -> Value {
        assert_eq!(args.len(), bbs.len());
        let data = InstData::Phi {
            opcode: Opcode::Phi,
            args,
            bbs,
        };
        let inst = self.build(data, ty);
        self.inst_result(inst)
    }

    /// Creates copy instruction to write `src` into the register `dst`.
    pub fn copy(&mut self, dst: Value, src: Value) -> Inst {
        self.build_binary(Opcode::Copy, void_ty(), dst, src)
    }

    /// Creates br instruction to transfer control to another basic block.
    pub fn br(&mut self, bb: Block) -> Inst {
        let data = InstData::Jump {
            opcode: Opcode::Br,
            bbs: [bb],
        };
        self.build(data, void_ty())
    }

    /// Creates br instruction to transfer control to `bb_true` if `x` is
    /// non-zero, or `bb_false` otherwise.
    pub fn br_cond(&mut self, x: Value, bb_true: Block, bb_false: Block) -> Inst {
        let data = InstData::Branch {
            opcode: Opcode::BrCond,
            args: [x],
            bbs: [bb_true, bb_false],
        };
        self.build(data, void_ty())
    }

    /// Creates ret instruction to return from a void function.
    pub fn ret(&mut self) -> Inst {
        let data = InstData::Nullary {
            opcode: Opcode::Ret,
        };
        self.build(data, void_ty())
    }

    /// Creates ret instruction to return a value from a function.
    pub fn ret_value(&mut self, x: Value) -> Inst {
        self.build_unary(Opcode::RetValue, void_ty(), x)
    }
}

/// Convenience functions to construct the different instruction formats.
impl<'a, 'b> InstBuilder<'a, 'b> {
    /// `a = opcode type x`
    fn build_unary(&mut self, opcode: Opcode, ty: Type, x: Value) -> Inst {
        let data = InstData::Unary { opcode, args: [x] };
        self.build(data, ty)
    }

    /// `a = opcode type x, y`
    fn build_binary(&mut self, opcode: Opcode, ty: Type, x: Value, y: Value) -> Inst {
        let data = InstData::Binary {
            opcode,
            args: [x, y],
        };
        self.build(data, ty)
    }
}

/// Fundamental convenience forwards to the wrapped builder.
impl<'a, 'b> InstBuilder<'a, 'b> {
    /// Convenience forward to `FunctionBuilder`.
    pub(crate) fn build(&mut self, data: InstData, ty: Type) -> Inst {
        let inst = self.builder.build_inst(data, ty);
        if let Some(name) = self.name.take() {
            if let Some(value) = self.builder.dfg.get_inst_result(inst) {
                self.builder.dfg.set_name(value, name);
            }
        }
        inst
    }

    fn value_type(&self, value: Value) -> Type {
        self.builder.dfg.value_type(value)
    }

    fn inst_result(&self, inst: Inst) -> Value {
        self.builder.dfg.inst_result(inst)
    }
}

/// An instruction format.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstData {
    /// `opcode`
    Nullary { opcode: Opcode },
    /// `opcode type x`
    Unary { opcode: Opcode, args: [Value; 1] },
    /// `opcode type x, y`
    Binary { opcode: Opcode, args: [Value; 2] },
    /// `opcode type [x, bb],*`
    Phi {
        opcode: Opcode,
        args: Vec<Value>,
        bbs: Vec<Block>,
    },
    /// `opcode bb`
    Jump { opcode: Opcode, bbs: [Block; 1] },
    /// `opcode x, bb0, bb1`
    Branch {
        opcode: Opcode,
        args: [Value; 1],
        bbs: [Block; 2],
    },
    /// `a = opcode type unit (args)`
    Call {
        opcode: Opcode,
        unit: ExtUnit,
        args: Vec<Value>,
    },
}

impl InstData {
    /// Get the opcode of the instruction.
    pub fn opcode(&self) -> Opcode {
        match *self {
            InstData::Nullary { opcode, .. } => opcode,
            InstData::Unary { opcode, .. } => opcode,
            InstData::Binary { opcode, .. } => opcode,
            InstData::Phi { opcode, .. } => opcode,
            InstData::Jump { opcode, .. } => opcode,
            InstData::Branch { opcode, .. } => opcode,
            InstData::Call { opcode, .. } => opcode,
        }
    }

    /// Get the arguments of an instruction.
    pub fn args(&self) -> &[Value] {
        match self {
            InstData::Nullary { .. } => &[],
            InstData::Unary { args, .. } => args,
            InstData::Binary { args, .. } => args,
            InstData::Phi { args, .. } => args,
            InstData::Jump { .. } => &[],
            InstData::Branch { args, .. } => args,
            InstData::Call { args, .. } => args,
        }
    }

    /// Mutable access to the arguments of an instruction.
    ///
    /// Only the `DataFlowGraph` may modify arguments, since it keeps the use
    /// lists in sync.
    pub(super) fn args_mut(&mut self) -> &mut [Value] {
        match self {
            InstData::Nullary { .. } => &mut [],
            InstData::Unary { args, .. } => args,
            InstData::Binary { args, .. } => args,
            InstData::Phi { args, .. } => args,
            InstData::Jump { .. } => &mut [],
            InstData::Branch { args, .. } => args,
            InstData::Call { args, .. } => args,
        }
    }

    /// Get the BBs of an instruction.
    pub fn blocks(&self) -> &[Block] {
        match self {
            InstData::Phi { bbs, .. } => bbs,
            InstData::Jump { bbs, .. } => bbs,
            InstData::Branch { bbs, .. } => bbs,
            _ => &[],
        }
    }

    /// Mutable access to the BBs of an instruction.
    pub(super) fn blocks_mut(&mut self) -> &mut [Block] {
        match self {
            InstData::Phi { bbs, .. } => bbs,
            InstData::Jump { bbs, .. } => bbs,
            InstData::Branch { bbs, .. } => bbs,
            _ => &mut [],
        }
    }

    /// Return the external function called by this instruction.
    pub fn get_ext_unit(&self) -> Option<ExtUnit> {
        match self {
            InstData::Call { unit, .. } => Some(*unit),
            _ => None,
        }
    }

    /// Return the incoming value of a phi for the edge from `bb`.
    pub fn phi_incoming(&self, bb: Block) -> Option<Value> {
        match self {
            InstData::Phi { args, bbs, .. } => bbs
                .iter()
                .position(|&b| b == bb)
                .map(|i| args[i]),
            _ => None,
        }
    }

    /// Return the `(value, block)` pairs of a phi.
    pub fn phi_edges<'a>(&'a self) -> impl Iterator<Item = (Value, Block)> + 'a {
        let (args, bbs): (&[Value], &[Block]) = match self {
            InstData::Phi { args, bbs, .. } => (args, bbs),
            _ => (&[], &[]),
        };
        args.iter().cloned().zip(bbs.iter().cloned())
    }
}

bitflags! {
    /// A set of flags classifying an opcode.
    #[derive(Default, Serialize, Deserialize)]
    pub struct OpcodeFlags: u8 {
        /// Ends a basic block.
        const TERMINATOR = 0b0000_0001;
        /// Has an effect beyond producing its result.
        const SIDE_EFFECT = 0b0000_0010;
        /// Operands may be swapped without changing the result.
        const COMMUTATIVE = 0b0000_0100;
        /// Binary arithmetic or logic.
        const ARITH = 0b0000_1000;
        /// Comparison producing an `i1`.
        const COMPARE = 0b0001_0000;
        /// Accesses memory.
        const MEMORY = 0b0010_0000;
        /// Integer width conversion.
        const CAST = 0b0100_0000;
        /// Unary arithmetic.
        const UNARY = 0b1000_0000;
    }
}

/// An instruction opcode.
///
/// This enum represents the actual instruction, whereas `InstData` covers the
/// format and arguments of the instruction.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Alloca,
    Load,
    Store,

    Neg,
    Not,

    Add,
    Sub,
    Mul,
    Sdiv,
    Srem,
    Udiv,
    Urem,
    And,
    Or,
    Xor,
    Shl,
    Shr,

    Eq,
    Neq,
    Slt,
    Sgt,
    Sle,
    Sge,
    Ult,
    Ugt,
    Ule,
    Uge,

    Zext,
    Sext,
    Trunc,

    Call,
    Phi,
    Copy,

    Br,
    BrCond,
    Ret,
    RetValue,
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Opcode::Alloca => "alloca",
                Opcode::Load => "load",
                Opcode::Store => "store",
                Opcode::Neg => "neg",
                Opcode::Not => "not",
                Opcode::Add => "add",
                Opcode::Sub => "sub",
                Opcode::Mul => "mul",
                Opcode::Sdiv => "sdiv",
                Opcode::Srem => "srem",
                Opcode::Udiv => "udiv",
                Opcode::Urem => "urem",
                Opcode::And => "and",
                Opcode::Or => "or",
                Opcode::Xor => "xor",
                Opcode::Shl => "shl",
                Opcode::Shr => "shr",
                Opcode::Eq => "eq",
                Opcode::Neq => "neq",
                Opcode::Slt => "slt",
                Opcode::Sgt => "sgt",
                Opcode::Sle => "sle",
                Opcode::Sge => "sge",
                Opcode::Ult => "ult",
                Opcode::Ugt => "ugt",
                Opcode::Ule => "ule",
                Opcode::Uge => "uge",
                Opcode::Zext => "zext",
                Opcode::Sext => "sext",
                Opcode::Trunc => "trunc",
                Opcode::Call => "call",
                Opcode::Phi => "phi",
                Opcode::Copy => "copy",
                Opcode::Br => "br",
                Opcode::BrCond => "br",
                Opcode::Ret => "ret",
                Opcode::RetValue => "ret",
            }
        )
    }
}

impl Opcode {
    /// Return the flags classifying this opcode.
    pub fn flags(self) -> OpcodeFlags {
        use self::OpcodeFlags as F;
        match self {
            Opcode::Alloca => F::MEMORY,
            Opcode::Load => F::MEMORY | F::SIDE_EFFECT,
            Opcode::Store => F::MEMORY | F::SIDE_EFFECT,
            Opcode::Neg | Opcode::Not => F::UNARY,
            Opcode::Add | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor => {
                F::ARITH | F::COMMUTATIVE
            }
            Opcode::Sub
            | Opcode::Sdiv
            | Opcode::Srem
            | Opcode::Udiv
            | Opcode::Urem
            | Opcode::Shl
            | Opcode::Shr => F::ARITH,
            Opcode::Eq | Opcode::Neq => F::COMPARE | F::COMMUTATIVE,
            Opcode::Slt
            | Opcode::Sgt
            | Opcode::Sle
            | Opcode::Sge
            | Opcode::Ult
            | Opcode::Ugt
            | Opcode::Ule
            | Opcode::Uge => F::COMPARE,
            Opcode::Zext | Opcode::Sext | Opcode::Trunc => F::CAST,
            Opcode::Call | Opcode::Copy => F::SIDE_EFFECT,
            Opcode::Phi => F::empty(),
            Opcode::Br | Opcode::BrCond | Opcode::Ret | Opcode::RetValue => {
                F::TERMINATOR | F::SIDE_EFFECT
            }
        }
    }

    /// Check if this instruction is a phi node.
    pub fn is_phi(self) -> bool {
        self == Opcode::Phi
    }

    /// Check if this instruction is a terminator.
    pub fn is_terminator(self) -> bool {
        self.flags().contains(OpcodeFlags::TERMINATOR)
    }

    /// Check if this instruction is a return.
    pub fn is_return(self) -> bool {
        match self {
            Opcode::Ret | Opcode::RetValue => true,
            _ => false,
        }
    }

    /// Check if this instruction has an effect that must be preserved even if
    /// its result is unused.
    pub fn has_side_effects(self) -> bool {
        self.flags().contains(OpcodeFlags::SIDE_EFFECT)
    }

    /// Check if the operands of this instruction commute.
    pub fn is_commutative(self) -> bool {
        self.flags().contains(OpcodeFlags::COMMUTATIVE)
    }

    /// Check if this is a binary arithmetic or logic instruction.
    pub fn is_binary_arith(self) -> bool {
        self.flags().contains(OpcodeFlags::ARITH)
    }

    /// Check if this is a unary arithmetic instruction.
    pub fn is_unary_arith(self) -> bool {
        self.flags().contains(OpcodeFlags::UNARY)
    }

    /// Check if this is a comparison.
    pub fn is_compare(self) -> bool {
        self.flags().contains(OpcodeFlags::COMPARE)
    }

    /// Check if this is a cast.
    pub fn is_cast(self) -> bool {
        self.flags().contains(OpcodeFlags::CAST)
    }

    /// Check if this is a pure computation that may be value numbered.
    pub fn is_pure(self) -> bool {
        self.is_binary_arith() || self.is_unary_arith() || self.is_compare() || self.is_cast()
    }
}

impl Inst {
    /// Dump the instruction in human readable form.
    pub fn dump(self, func: &FunctionData) -> InstDumper {
        InstDumper(self, func)
    }
}

/// Temporary object to dump an `Inst` in human-readable form for debugging.
pub struct InstDumper<'a>(Inst, &'a FunctionData);

impl std::fmt::Display for InstDumper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let inst = self.0;
        let func = self.1;
        let data = &func.dfg[inst];
        if let Some(result) = func.dfg.get_inst_result(inst) {
            write!(
                f,
                "{} = {} {}",
                result.dump(func),
                data.opcode(),
                func.dfg.value_type(result)
            )?;
        } else {
            write!(f, "{}", data.opcode())?;
        }
        match data {
            InstData::Call { unit, args, .. } => {
                write!(f, " @{} (", func.dfg[*unit].name)?;
                let mut comma = false;
                for &arg in args {
                    if comma {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg.dump(func))?;
                    comma = true;
                }
                write!(f, ")")?;
            }
            InstData::Phi { .. } => {
                let mut comma = false;
                for (arg, block) in data.phi_edges() {
                    write!(f, "{}", if comma { ", " } else { " " })?;
                    write!(f, "[{}, {}]", arg.dump(func), block.dump(func))?;
                    comma = true;
                }
            }
            _ => {
                let mut comma = false;
                for &arg in data.args() {
                    if comma {
                        write!(f, ",")?;
                    }
                    write!(f, " {}", arg.dump(func))?;
                    comma = true;
                }
                for &block in data.blocks() {
                    if comma {
                        write!(f, ",")?;
                    }
                    write!(f, " {}", block.dump(func))?;
                    comma = true;
                }
            }
        }
        Ok(())
    }
}

impl Value {
    /// Dump the value in human readable form.
    pub fn dump(self, func: &FunctionData) -> ValueDumper {
        ValueDumper(self, func)
    }
}

/// Temporary object to dump a `Value` in human-readable form for debugging.
pub struct ValueDumper<'a>(Value, &'a FunctionData);

impl std::fmt::Display for ValueDumper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let dfg = &self.1.dfg;
        if !dfg.values.contains(self.0) {
            return write!(f, "%<invalid {}>", self.0);
        }
        match &dfg[self.0] {
            ValueData::Const { imm, .. } => write!(f, "{}", imm),
            ValueData::Undef { .. } => write!(f, "undef"),
            _ => match dfg.get_name(self.0) {
                Some(name) if dfg.is_name_shared(self.0) => {
                    write!(f, "%{}.{}", name, self.0.index())
                }
                Some(name) => write!(f, "%{}", name),
                None => write!(f, "%{}", self.0.index()),
            },
        }
    }
}

impl Block {
    /// Dump the basic block in human readable form.
    pub fn dump(self, func: &FunctionData) -> BlockDumper {
        BlockDumper(self, func)
    }
}

/// Temporary object to dump a `Block` in human-readable form for debugging.
///
/// Named blocks print as `<name>.<index>` so that blocks sharing a name stay
/// distinguishable.
pub struct BlockDumper<'a>(Block, &'a FunctionData);

impl std::fmt::Display for BlockDumper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let cfg = &self.1.cfg;
        match cfg.blocks.get(self.0).and_then(|data| data.name.as_ref()) {
            Some(name) => write!(f, "{}.{}", name, self.0.index()),
            None => write!(f, "{}", self.0),
        }
    }
}
