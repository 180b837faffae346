// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of linked functions.
//!
//! This module implements the `Module`, a collection of functions linked
//! together by name. A module acts as the root node of the intermediate
//! representation and is the unit of work handed to the pass pipeline.

use crate::{
    impl_table_indexing, impl_table_key,
    ir::{ExtUnit, FunctionBuilder, FunctionData, Signature},
    table::{PrimaryTable, TableKey},
    ty::Type,
};
use rayon::prelude::*;
use std::collections::HashMap;

impl_table_key! {
    /// A function in a module.
    struct FuncId(u32) as "f";

    /// A global variable in a module.
    struct GlobalId(u32) as "g";
}

/// A module.
///
/// Holds functions in declaration order, a name lookup table, and the
/// module-level globals.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct Module {
    /// The functions in this module.
    funcs: PrimaryTable<FuncId, FunctionData>,
    /// The order of functions in the module.
    order: Vec<FuncId>,
    /// Lookup table from names to functions.
    names: HashMap<String, FuncId>,
    /// The global variables in this module.
    globals: PrimaryTable<GlobalId, GlobalData>,
    /// Lookup table from names to globals.
    global_names: HashMap<String, GlobalId>,
}

/// A global variable declared in a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalData {
    /// The name of the global.
    pub name: String,
    /// The type of the value stored in the global.
    pub ty: Type,
}

impl_table_indexing!(Module, funcs, FuncId, FunctionData);

impl Module {
    /// Create a new empty module.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a new empty function in the module.
    pub fn create_function(&mut self, name: impl Into<String>, sig: Signature) -> FuncId {
        self.add_function(FunctionData::new(name, sig))
    }

    /// Add a function to the module.
    ///
    /// Panics if a function with the same name already exists.
    pub fn add_function(&mut self, func: FunctionData) -> FuncId {
        if self.names.contains_key(&func.name) {
            panic!("function @{} defined twice", func.name);
        }
        let name = func.name.clone();
        let id = self.funcs.add(func);
        self.order.push(id);
        self.names.insert(name, id);
        id
    }

    /// Remove a function from the module.
    pub fn remove_function(&mut self, id: FuncId) -> FunctionData {
        let func = self.funcs.remove(id);
        self.order.retain(|&f| f != id);
        self.names.remove(&func.name);
        func
    }

    /// Get a function.
    pub fn function(&self, id: FuncId) -> &FunctionData {
        &self.funcs[id]
    }

    /// Get a mutable function.
    pub fn function_mut(&mut self, id: FuncId) -> &mut FunctionData {
        &mut self.funcs[id]
    }

    /// Get a builder for a function.
    pub fn builder(&mut self, id: FuncId) -> FunctionBuilder {
        FunctionBuilder::new(&mut self.funcs[id])
    }

    /// Return an iterator over the functions in declaration order.
    pub fn functions<'a>(&'a self) -> impl Iterator<Item = (FuncId, &'a FunctionData)> + 'a {
        self.order.iter().map(move |&id| (id, &self.funcs[id]))
    }

    /// Return the function ids in declaration order.
    pub fn func_ids(&self) -> Vec<FuncId> {
        self.order.clone()
    }

    /// Return the number of functions.
    pub fn num_functions(&self) -> usize {
        self.order.len()
    }

    /// Find a function by name.
    pub fn lookup(&self, name: &str) -> Option<FuncId> {
        self.names.get(name).cloned()
    }

    /// Resolve the target of an external unit referenced in `func`.
    pub fn resolve(&self, func: &FunctionData, ext: ExtUnit) -> Option<FuncId> {
        self.lookup(&func.dfg[ext].name)
    }

    /// Declare a global variable.
    pub fn declare_global(&mut self, name: impl Into<String>, ty: Type) -> GlobalId {
        let name = name.into();
        if let Some(&id) = self.global_names.get(&name) {
            return id;
        }
        let id = self.globals.add(GlobalData {
            name: name.clone(),
            ty,
        });
        self.global_names.insert(name, id);
        id
    }

    /// Get a global variable.
    pub fn global(&self, id: GlobalId) -> &GlobalData {
        &self.globals[id]
    }

    /// Find a global variable by name.
    pub fn lookup_global(&self, name: &str) -> Option<GlobalId> {
        self.global_names.get(name).cloned()
    }

    /// Return a mutable iterator over the functions in declaration order.
    pub fn functions_mut<'a>(&'a mut self) -> impl Iterator<Item = &'a mut FunctionData> + 'a {
        let mut funcs: Vec<_> = self
            .funcs
            .iter_mut()
            .map(|(id, func)| (id.index(), func))
            .collect();
        let position: HashMap<usize, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.index(), pos))
            .collect();
        funcs.sort_by_key(|(index, _)| position[index]);
        funcs.into_iter().map(|(_, func)| func)
    }

    /// Return a parallel iterator over the functions.
    ///
    /// Functions share no state, so passes may process them concurrently.
    pub fn par_functions_mut<'a>(
        &'a mut self,
    ) -> impl ParallelIterator<Item = &'a mut FunctionData> + 'a {
        self.funcs.par_values_mut()
    }

    /// Check that every call in the module refers to a function defined in
    /// the module.
    pub fn link(&self) -> Result<(), LinkError> {
        let mut unresolved = vec![];
        for (_, func) in self.functions() {
            let mut callees: Vec<_> = func
                .dfg
                .ext_units
                .values()
                .filter(|ext| self.lookup(&ext.name).is_none())
                .map(|ext| ext.name.clone())
                .collect();
            callees.sort();
            for callee in callees {
                debug!("Unresolved call from @{} to @{}", func.name, callee);
                unresolved.push((func.name.clone(), callee));
            }
        }
        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(LinkError { unresolved })
        }
    }

    /// Panic if any function in the module is not well-formed.
    pub fn verify(&self) {
        for (_, func) in self.functions() {
            func.verify();
        }
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut newline = false;
        for (_, global) in self.globals.iter() {
            write!(f, "global @{} {}\n", global.name, global.ty)?;
            newline = true;
        }
        for (_, func) in self.functions() {
            if newline {
                write!(f, "\n")?;
            }
            write!(f, "{}\n", func)?;
            newline = true;
        }
        Ok(())
    }
}

/// Calls that could not be resolved when linking a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkError {
    /// The `(caller, callee)` pairs of all unresolved calls.
    pub unresolved: Vec<(String, String)>,
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (i, (caller, callee)) in self.unresolved.iter().enumerate() {
            if i > 0 {
                write!(f, "\n")?;
            }
            write!(f, "@{} calls undefined function @{}", caller, callee)?;
        }
        Ok(())
    }
}

impl std::error::Error for LinkError {}
