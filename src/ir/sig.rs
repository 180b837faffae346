// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of the arguments and return type of functions.

use crate::{ir::Arg, table::PrimaryTable, ty::Type, void_ty};

/// A description of the arguments and return type of a function.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct Signature {
    args: PrimaryTable<Arg, ArgData>,
    inp: Vec<Arg>,
    retty: Option<Type>,
}

/// A single argument of a function.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ArgData {
    ty: Type,
    num: u16,
}

impl Signature {
    /// Create a new signature.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a new signature with the given argument and return types.
    pub fn with_types(args: impl IntoIterator<Item = Type>, retty: Type) -> Self {
        let mut sig = Self::new();
        for ty in args {
            sig.add_input(ty);
        }
        sig.set_return_type(retty);
        sig
    }

    /// Add an input argument.
    pub fn add_input(&mut self, ty: Type) -> Arg {
        let arg = self.args.add(ArgData {
            ty,
            num: self.inp.len() as u16,
        });
        self.inp.push(arg);
        arg
    }

    /// Set the return type of the signature.
    pub fn set_return_type(&mut self, ty: Type) {
        self.retty = Some(ty);
    }

    /// Get the return type of the signature.
    ///
    /// Signatures without an explicit return type return `void`.
    pub fn return_type(&self) -> Type {
        self.retty.clone().unwrap_or_else(void_ty)
    }

    /// Return an iterator over the arguments of the signature.
    pub fn args<'a>(&'a self) -> impl Iterator<Item = Arg> + 'a {
        self.inp.iter().cloned()
    }

    /// Return the number of arguments.
    pub fn num_args(&self) -> usize {
        self.inp.len()
    }

    /// Return the type of argument `arg`.
    pub fn arg_type(&self, arg: Arg) -> Type {
        self.args[arg].ty.clone()
    }

    /// Return the position of argument `arg`.
    pub fn arg_position(&self, arg: Arg) -> usize {
        self.args[arg].num as usize
    }
}

impl Eq for Signature {}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.return_type() == other.return_type()
            && self.args().count() == other.args().count()
            && self
                .args()
                .zip(other.args())
                .all(|(a, b)| self.args[a] == other.args[b])
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use std::iter::{once, repeat};
        write!(f, "(")?;
        for (arg, sep) in self.args().zip(once("").chain(repeat(", "))) {
            write!(f, "{}{}", sep, self.arg_type(arg))?;
        }
        write!(f, ") {}", self.return_type())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
