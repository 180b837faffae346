// Copyright (c) 2017 Fabian Schuiki

//! Types of values.

pub use self::TypeKind::*;
use std::sync::Arc;

/// A type.
///
/// Types are shared handles and compare structurally, so two independently
/// constructed `i32` types are equal.
pub type Type = Arc<TypeKind>;

/// The different kinds of types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    /// The `void` type.
    VoidType,
    /// Integer types like `i32`.
    IntType(usize),
    /// Pointer types like `i32*`.
    PointerType(Type),
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            VoidType => write!(f, "void"),
            IntType(l) => write!(f, "i{}", l),
            PointerType(ref ty) => write!(f, "{}*", ty),
        }
    }
}

impl TypeKind {
    /// Check if this is a void type.
    pub fn is_void(&self) -> bool {
        match *self {
            VoidType => true,
            _ => false,
        }
    }

    /// Check if this is an integer type.
    pub fn is_int(&self) -> bool {
        match *self {
            IntType(..) => true,
            _ => false,
        }
    }

    /// Check if this is a pointer type.
    pub fn is_pointer(&self) -> bool {
        match *self {
            PointerType(..) => true,
            _ => false,
        }
    }

    /// Unwrap the type into the bit width of the integer, or panic if the type
    /// is not an integer.
    pub fn unwrap_int(&self) -> usize {
        match *self {
            IntType(size) => size,
            _ => panic!("unwrap_int called on {}", self),
        }
    }

    /// Unwrap the type to its pointee type, or panic if the type is not a
    /// pointer.
    pub fn unwrap_pointer(&self) -> &Type {
        match *self {
            PointerType(ref ty) => ty,
            _ => panic!("unwrap_pointer called on {}", self),
        }
    }
}

/// Create a void type.
pub fn void_ty() -> Type {
    Type::new(VoidType)
}

/// Create an integer type of the requested size.
pub fn int_ty(size: usize) -> Type {
    Type::new(IntType(size))
}

/// Create a pointer type with the requested data type.
pub fn pointer_ty(ty: Type) -> Type {
    Type::new(PointerType(ty))
}
