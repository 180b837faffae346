// Copyright (c) 2017-2021 Fabian Schuiki

//! Integer values
//!
//! This module implements the constant arithmetic shared by all passes that
//! fold instructions at compile time.

use crate::ir::Opcode;
use crate::ty::{int_ty, Type};
use num::{traits::*, BigInt, BigUint};
use std::fmt::{Debug, Display};

/// An integer value.
///
/// The value is stored as an unsigned bit pattern of `width` bits. Signed
/// operations reinterpret the pattern in two's complement.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IntValue {
    /// The width of the value in bits.
    pub width: usize,
    /// The value itself.
    pub value: BigUint,
}

impl IntValue {
    /// Create a new integer value from a `usize`.
    pub fn from_usize(width: usize, value: usize) -> Self {
        Self::from_unsigned(width, value.into())
    }

    /// Create a new integer value from an `isize`.
    pub fn from_isize(width: usize, value: isize) -> Self {
        Self::from_signed(width, value.into())
    }

    /// Create a new integer value from a signed `BigInt` value.
    pub fn from_signed(width: usize, value: BigInt) -> Self {
        let modulus = BigInt::one() << width;
        let mut v = value % &modulus;
        if v.is_negative() {
            v += modulus;
        }
        match v.to_biguint() {
            Some(v) => Self::from_unsigned(width, v),
            None => unreachable!(),
        }
    }

    /// Create a new integer value from an unsigned `BigUint` value.
    pub fn from_unsigned(width: usize, value: BigUint) -> Self {
        assert!(width > 0, "integer values must be at least one bit wide");
        let value = value % (BigUint::one() << width);
        Self { width, value }
    }

    /// Create the zero value of a given width.
    pub fn zero(width: usize) -> Self {
        Self::from_usize(width, 0)
    }

    /// Create the value with all bits set.
    pub fn all_ones(width: usize) -> Self {
        Self::from_unsigned(width, (BigUint::one() << width) - BigUint::one())
    }

    /// Convert the value to a signed `BigInt`.
    pub fn to_signed(&self) -> BigInt {
        let unsigned = BigInt::from(self.value.clone());
        if self.is_negative() {
            unsigned - (BigInt::one() << self.width)
        } else {
            unsigned
        }
    }

    /// Convert the value to a usize, if it fits.
    pub fn to_usize(&self) -> Option<usize> {
        self.value.to_usize()
    }

    /// Check if the sign bit is set.
    pub fn is_negative(&self) -> bool {
        let sign_mask = BigUint::one() << (self.width - 1);
        !(&self.value & &sign_mask).is_zero()
    }

    /// Check if the value is zero.
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Check if the value is one.
    pub fn is_one(&self) -> bool {
        self.value.is_one()
    }

    /// Check if all bits of the value are set.
    pub fn is_all_ones(&self) -> bool {
        self.value == (BigUint::one() << self.width) - BigUint::one()
    }

    /// Get the type of the value.
    pub fn ty(&self) -> Type {
        int_ty(self.width)
    }
}

impl Display for IntValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.width == 1 {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{}", self.to_signed())
        }
    }
}

impl Debug for IntValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "i{} {}", self.width, self)
    }
}

impl From<(usize, usize)> for IntValue {
    fn from(v: (usize, usize)) -> Self {
        IntValue::from_usize(v.0, v.1)
    }
}

impl From<(usize, isize)> for IntValue {
    fn from(v: (usize, isize)) -> Self {
        IntValue::from_isize(v.0, v.1)
    }
}

impl From<(usize, i32)> for IntValue {
    fn from(v: (usize, i32)) -> Self {
        IntValue::from_isize(v.0, v.1 as isize)
    }
}

impl From<(usize, BigInt)> for IntValue {
    fn from(v: (usize, BigInt)) -> Self {
        IntValue::from_signed(v.0, v.1)
    }
}

impl From<(usize, BigUint)> for IntValue {
    fn from(v: (usize, BigUint)) -> Self {
        IntValue::from_unsigned(v.0, v.1)
    }
}

/// Unary operators.
impl IntValue {
    /// Compute `not`.
    pub fn not(&self) -> IntValue {
        let max = (BigUint::one() << self.width) - BigUint::one();
        IntValue::from_unsigned(self.width, &max - &self.value)
    }

    /// Compute `neg`.
    pub fn neg(&self) -> IntValue {
        let max = BigUint::one() << self.width;
        IntValue::from_unsigned(self.width, &max - &self.value)
    }
}

/// Binary operators.
impl IntValue {
    /// Compute `add`.
    pub fn add(&self, other: &Self) -> IntValue {
        IntValue::from_unsigned(self.width, &self.value + &other.value)
    }

    /// Compute `sub`.
    pub fn sub(&self, other: &Self) -> IntValue {
        IntValue::from_signed(self.width, self.to_signed() - other.to_signed())
    }

    /// Compute `mul`.
    pub fn mul(&self, other: &Self) -> IntValue {
        IntValue::from_unsigned(self.width, &self.value * &other.value)
    }

    /// Compute `and`.
    pub fn and(&self, other: &Self) -> IntValue {
        IntValue::from_unsigned(self.width, &self.value & &other.value)
    }

    /// Compute `or`.
    pub fn or(&self, other: &Self) -> IntValue {
        IntValue::from_unsigned(self.width, &self.value | &other.value)
    }

    /// Compute `xor`.
    pub fn xor(&self, other: &Self) -> IntValue {
        IntValue::from_unsigned(self.width, &self.value ^ &other.value)
    }

    /// Compute `udiv`. Returns `None` on division by zero.
    pub fn udiv(&self, other: &Self) -> Option<IntValue> {
        if other.is_zero() {
            return None;
        }
        Some(IntValue::from_unsigned(
            self.width,
            &self.value / &other.value,
        ))
    }

    /// Compute `urem`. Returns `None` on division by zero.
    pub fn urem(&self, other: &Self) -> Option<IntValue> {
        if other.is_zero() {
            return None;
        }
        Some(IntValue::from_unsigned(
            self.width,
            &self.value % &other.value,
        ))
    }

    /// Compute `sdiv`, rounding towards zero. Returns `None` on division by
    /// zero.
    pub fn sdiv(&self, other: &Self) -> Option<IntValue> {
        if other.is_zero() {
            return None;
        }
        Some(IntValue::from_signed(
            self.width,
            self.to_signed() / other.to_signed(),
        ))
    }

    /// Compute `srem`; the result carries the sign of the dividend. Returns
    /// `None` on division by zero.
    pub fn srem(&self, other: &Self) -> Option<IntValue> {
        if other.is_zero() {
            return None;
        }
        Some(IntValue::from_signed(
            self.width,
            self.to_signed() % other.to_signed(),
        ))
    }

    /// Compute `shl`. Shifting by the width or more yields zero.
    pub fn shl(&self, amount: &Self) -> IntValue {
        match amount.to_usize() {
            Some(s) if s < self.width => {
                IntValue::from_unsigned(self.width, &self.value << s)
            }
            _ => IntValue::zero(self.width),
        }
    }

    /// Compute arithmetic `shr`. Shifting by the width or more yields the
    /// sign fill.
    pub fn shr(&self, amount: &Self) -> IntValue {
        let s = match amount.to_usize() {
            Some(s) if s < self.width => s,
            _ if self.is_negative() => return IntValue::all_ones(self.width),
            _ => return IntValue::zero(self.width),
        };
        let v = self.to_signed();
        let shifted = if v.is_negative() {
            // Floor the shift for negative numbers.
            -((-v - BigInt::one()) >> s) - BigInt::one()
        } else {
            v >> s
        };
        IntValue::from_signed(self.width, shifted)
    }
}

/// Comparisons.
impl IntValue {
    /// Compute unsigned `<`.
    pub fn ult(&self, other: &Self) -> bool {
        assert_eq!(self.width, other.width);
        self.value < other.value
    }

    /// Compute signed `<`.
    pub fn slt(&self, other: &Self) -> bool {
        assert_eq!(self.width, other.width);
        self.to_signed() < other.to_signed()
    }
}

/// Opcode implementations.
impl IntValue {
    /// Execute a unary opcode.
    pub fn try_unary_op(op: Opcode, arg: &IntValue) -> Option<IntValue> {
        Some(match op {
            Opcode::Not => arg.not(),
            Opcode::Neg => arg.neg(),
            _ => return None,
        })
    }

    /// Execute a binary opcode.
    ///
    /// Returns `None` if the opcode is not a binary arithmetic operation, or if
    /// the operation is undefined for the given operands (division by zero).
    pub fn try_binary_op(op: Opcode, lhs: &IntValue, rhs: &IntValue) -> Option<IntValue> {
        assert_eq!(lhs.width, rhs.width, "{} operands differ in width", op);
        Some(match op {
            Opcode::Add => lhs.add(rhs),
            Opcode::Sub => lhs.sub(rhs),
            Opcode::Mul => lhs.mul(rhs),
            Opcode::And => lhs.and(rhs),
            Opcode::Or => lhs.or(rhs),
            Opcode::Xor => lhs.xor(rhs),
            Opcode::Shl => lhs.shl(rhs),
            Opcode::Shr => lhs.shr(rhs),
            Opcode::Sdiv => return lhs.sdiv(rhs),
            Opcode::Srem => return lhs.srem(rhs),
            Opcode::Udiv => return lhs.udiv(rhs),
            Opcode::Urem => return lhs.urem(rhs),
            _ => return None,
        })
    }

    /// Execute a comparison opcode.
    pub fn try_compare_op(op: Opcode, lhs: &IntValue, rhs: &IntValue) -> Option<IntValue> {
        let v = match op {
            Opcode::Eq => lhs == rhs,
            Opcode::Neq => lhs != rhs,
            Opcode::Ult => lhs.ult(rhs),
            Opcode::Ugt => rhs.ult(lhs),
            Opcode::Ule => !rhs.ult(lhs),
            Opcode::Uge => !lhs.ult(rhs),
            Opcode::Slt => lhs.slt(rhs),
            Opcode::Sgt => rhs.slt(lhs),
            Opcode::Sle => !rhs.slt(lhs),
            Opcode::Sge => !lhs.slt(rhs),
            _ => return None,
        };
        Some(IntValue::from_usize(1, v as usize))
    }

    /// Execute a cast opcode, producing a value of `width` bits.
    pub fn try_cast_op(op: Opcode, arg: &IntValue, width: usize) -> Option<IntValue> {
        Some(match op {
            Opcode::Zext | Opcode::Trunc => IntValue::from_unsigned(width, arg.value.clone()),
            Opcode::Sext => IntValue::from_signed(width, arg.to_signed()),
            _ => return None,
        })
    }
}
