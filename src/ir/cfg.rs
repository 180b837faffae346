// Copyright (c) 2017-2021 Fabian Schuiki

//! Representation of the basic blocks in a `Function`.
//!
//! The edges between blocks are not stored here. Successors are read off a
//! block's terminator, and predecessors are found through the block users
//! tracked by the `DataFlowGraph`.

use crate::{
    impl_table_indexing,
    ir::{Block, BlockData},
    table::PrimaryTable,
};

/// A control flow graph.
///
/// This is the container for the basic blocks of a function.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    /// The basic blocks in the graph.
    pub(crate) blocks: PrimaryTable<Block, BlockData>,
}

impl_table_indexing!(ControlFlowGraph, blocks, Block, BlockData);

impl ControlFlowGraph {
    /// Create a new control flow graph.
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a BB to the graph.
    pub(super) fn add_block(&mut self) -> Block {
        self.blocks.add(BlockData { name: None })
    }

    /// Remove a BB from the graph.
    pub(super) fn remove_block(&mut self, bb: Block) {
        self.blocks.remove(bb);
    }

    /// Check whether a BB exists.
    pub fn contains(&self, bb: Block) -> bool {
        self.blocks.contains(bb)
    }

    /// Return an upper bound on the block indices.
    pub fn block_id_bound(&self) -> usize {
        self.blocks.bound()
    }

    /// Return the name of a BB.
    pub fn get_name(&self, bb: Block) -> Option<&str> {
        self[bb].name.as_ref().map(AsRef::as_ref)
    }

    /// Set the name of a BB.
    pub(super) fn set_name(&mut self, bb: Block, name: String) {
        self[bb].name = Some(name);
    }

    /// Clear the name of a BB.
    pub(super) fn clear_name(&mut self, bb: Block) -> Option<String> {
        std::mem::replace(&mut self[bb].name, None)
    }
}
