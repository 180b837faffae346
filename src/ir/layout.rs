// Copyright (c) 2017-2021 Fabian Schuiki

//! Instruction and BB ordering.

use crate::{
    ir::{Block, Inst},
    table::SecondaryTable,
};
use std::collections::HashMap;

/// Determines the order of instructions and BBs in a `Function`.
#[derive(Default, Clone, Serialize, Deserialize)]
pub struct FunctionLayout {
    /// A linked list of BBs in layout order.
    bbs: SecondaryTable<Block, BlockNode>,
    /// The first BB in the layout.
    first_bb: Option<Block>,
    /// The last BB in the layout.
    last_bb: Option<Block>,
    /// Lookup table to find the BB that contains an instruction.
    inst_map: HashMap<Inst, Block>,
}

/// A node in the layout's double-linked list of BBs.
#[derive(Default, Clone, Serialize, Deserialize)]
struct BlockNode {
    prev: Option<Block>,
    next: Option<Block>,
    layout: InstLayout,
}

/// Determines the order of instructions within a BB.
#[derive(Default, Clone, Serialize, Deserialize)]
struct InstLayout {
    /// A linked list of instructions in layout order.
    insts: SecondaryTable<Inst, InstNode>,
    /// The first instruction in the layout.
    first_inst: Option<Inst>,
    /// The last instruction in the layout.
    last_inst: Option<Inst>,
}

/// A node in the layout's double-linked list of instructions.
#[derive(Default, Clone, Serialize, Deserialize)]
struct InstNode {
    prev: Option<Inst>,
    next: Option<Inst>,
}

/// Basic block arrangement.
impl FunctionLayout {
    /// Create a new empty layout.
    pub fn new() -> Self {
        Default::default()
    }

    /// Append a BB to the end of the function.
    pub fn append_block(&mut self, bb: Block) {
        self.bbs.add(
            bb,
            BlockNode {
                prev: self.last_bb,
                next: None,
                layout: Default::default(),
            },
        );
        if let Some(prev) = self.last_bb {
            self.bbs[prev].next = Some(bb);
        }
        if self.first_bb.is_none() {
            self.first_bb = Some(bb);
        }
        self.last_bb = Some(bb);
    }

    /// Insert a BB after another BB.
    pub fn insert_block_after(&mut self, bb: Block, after: Block) {
        self.bbs.add(
            bb,
            BlockNode {
                prev: Some(after),
                next: self.bbs[after].next,
                layout: Default::default(),
            },
        );
        if let Some(next) = self.bbs[after].next {
            self.bbs[next].prev = Some(bb);
        }
        self.bbs[after].next = Some(bb);
        if self.last_bb == Some(after) {
            self.last_bb = Some(bb);
        }
    }

    /// Remove a BB from the function.
    ///
    /// The BB must not contain any instructions.
    pub fn remove_block(&mut self, bb: Block) {
        let node = match self.bbs.remove(bb) {
            Some(node) => node,
            None => panic!("{} is not inserted", bb),
        };
        assert!(
            node.layout.first_inst.is_none(),
            "{} removed while it still contains instructions",
            bb
        );
        if let Some(next) = node.next {
            self.bbs[next].prev = node.prev;
        }
        if let Some(prev) = node.prev {
            self.bbs[prev].next = node.next;
        }
        if self.first_bb == Some(bb) {
            self.first_bb = node.next;
        }
        if self.last_bb == Some(bb) {
            self.last_bb = node.prev;
        }
    }

    /// Return an iterator over all BBs in layout order.
    pub fn blocks<'a>(&'a self) -> impl Iterator<Item = Block> + 'a {
        std::iter::successors(self.first_bb, move |&bb| self.next_block(bb))
    }

    /// Get the first BB in the layout. This is the entry block.
    pub fn first_block(&self) -> Option<Block> {
        self.first_bb
    }

    /// Get the last BB in the layout.
    pub fn last_block(&self) -> Option<Block> {
        self.last_bb
    }

    /// Get the BB preceding `bb` in the layout.
    pub fn prev_block(&self, bb: Block) -> Option<Block> {
        self.bbs[bb].prev
    }

    /// Get the BB following `bb` in the layout.
    pub fn next_block(&self, bb: Block) -> Option<Block> {
        self.bbs[bb].next
    }

    /// Check whether a BB is part of the layout.
    pub fn is_block_inserted(&self, bb: Block) -> bool {
        self.bbs.contains(bb)
    }
}

/// Instruction arrangement.
impl FunctionLayout {
    fn map_inst(&mut self, inst: Inst, bb: Block) {
        if let Some(old_bb) = self.inst_map.insert(inst, bb) {
            panic!(
                "inst {} already inserted in {}, now being inserted into {}",
                inst, old_bb, bb
            );
        }
    }

    /// Append an instruction to the end of a BB.
    pub fn append_inst(&mut self, inst: Inst, bb: Block) {
        self.map_inst(inst, bb);
        self.bbs[bb].layout.append_inst(inst);
    }

    /// Prepend an instruction to the beginning of a BB.
    pub fn prepend_inst(&mut self, inst: Inst, bb: Block) {
        self.map_inst(inst, bb);
        self.bbs[bb].layout.prepend_inst(inst);
    }

    /// Insert an instruction after another instruction.
    pub fn insert_inst_after(&mut self, inst: Inst, after: Inst) {
        let bb = self.inst_block_or_panic(after);
        self.map_inst(inst, bb);
        self.bbs[bb].layout.insert_inst_after(inst, after);
    }

    /// Insert an instruction before another instruction.
    pub fn insert_inst_before(&mut self, inst: Inst, before: Inst) {
        let bb = self.inst_block_or_panic(before);
        self.map_inst(inst, bb);
        self.bbs[bb].layout.insert_inst_before(inst, before);
    }

    /// Remove an instruction from the function.
    pub fn remove_inst(&mut self, inst: Inst) {
        let bb = match self.inst_map.remove(&inst) {
            Some(bb) => bb,
            None => panic!("inst {} was not inserted", inst),
        };
        self.bbs[bb].layout.remove_inst(inst);
    }

    /// Return an iterator over all instructions in a BB in layout order.
    pub fn insts<'a>(&'a self, bb: Block) -> impl Iterator<Item = Inst> + 'a {
        let layout = &self.bbs[bb].layout;
        std::iter::successors(layout.first_inst, move |&inst| layout.insts[inst].next)
    }

    /// Return an iterator over all instructions in the function in layout
    /// order.
    pub fn all_insts<'a>(&'a self) -> impl Iterator<Item = Inst> + 'a {
        self.blocks().flat_map(move |bb| self.insts(bb))
    }

    /// Get the BB which contains `inst`, or `None` if `inst` is not inserted.
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.inst_map.get(&inst).cloned()
    }

    fn inst_block_or_panic(&self, inst: Inst) -> Block {
        match self.inst_block(inst) {
            Some(bb) => bb,
            None => panic!("inst {} was not inserted", inst),
        }
    }

    /// Get the first instruction in a BB.
    pub fn first_inst(&self, bb: Block) -> Option<Inst> {
        self.bbs[bb].layout.first_inst
    }

    /// Get the last instruction in a BB.
    pub fn last_inst(&self, bb: Block) -> Option<Inst> {
        self.bbs[bb].layout.last_inst
    }

    /// Get the instruction preceding `inst` in its BB.
    pub fn prev_inst(&self, inst: Inst) -> Option<Inst> {
        let bb = self.inst_block_or_panic(inst);
        self.bbs[bb].layout.insts[inst].prev
    }

    /// Get the instruction following `inst` in its BB.
    pub fn next_inst(&self, inst: Inst) -> Option<Inst> {
        let bb = self.inst_block_or_panic(inst);
        self.bbs[bb].layout.insts[inst].next
    }
}

impl InstLayout {
    fn append_inst(&mut self, inst: Inst) {
        self.insts.add(
            inst,
            InstNode {
                prev: self.last_inst,
                next: None,
            },
        );
        if let Some(prev) = self.last_inst {
            self.insts[prev].next = Some(inst);
        }
        if self.first_inst.is_none() {
            self.first_inst = Some(inst);
        }
        self.last_inst = Some(inst);
    }

    fn prepend_inst(&mut self, inst: Inst) {
        self.insts.add(
            inst,
            InstNode {
                prev: None,
                next: self.first_inst,
            },
        );
        if let Some(next) = self.first_inst {
            self.insts[next].prev = Some(inst);
        }
        if self.last_inst.is_none() {
            self.last_inst = Some(inst);
        }
        self.first_inst = Some(inst);
    }

    fn insert_inst_after(&mut self, inst: Inst, after: Inst) {
        self.insts.add(
            inst,
            InstNode {
                prev: Some(after),
                next: self.insts[after].next,
            },
        );
        if let Some(next) = self.insts[after].next {
            self.insts[next].prev = Some(inst);
        }
        self.insts[after].next = Some(inst);
        if self.last_inst == Some(after) {
            self.last_inst = Some(inst);
        }
    }

    fn insert_inst_before(&mut self, inst: Inst, before: Inst) {
        self.insts.add(
            inst,
            InstNode {
                prev: self.insts[before].prev,
                next: Some(before),
            },
        );
        if let Some(prev) = self.insts[before].prev {
            self.insts[prev].next = Some(inst);
        }
        self.insts[before].prev = Some(inst);
        if self.first_inst == Some(before) {
            self.first_inst = Some(inst);
        }
    }

    fn remove_inst(&mut self, inst: Inst) {
        let node = match self.insts.remove(inst) {
            Some(node) => node,
            None => panic!("inst {} not in block layout", inst),
        };
        if let Some(next) = node.next {
            self.insts[next].prev = node.prev;
        }
        if let Some(prev) = node.prev {
            self.insts[prev].next = node.next;
        }
        if self.first_inst == Some(inst) {
            self.first_inst = node.next;
        }
        if self.last_inst == Some(inst) {
            self.last_inst = node.prev;
        }
    }
}

/// An insertion point for new instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionInsertPos {
    /// No insertion point selected yet.
    None,
    /// Append to the end of a BB.
    Append(Block),
    /// Prepend to the beginning of a BB.
    Prepend(Block),
    /// Insert after an instruction.
    After(Inst),
    /// Insert before an instruction.
    Before(Inst),
}

impl FunctionInsertPos {
    /// Insert an instruction and advance the insertion point.
    pub fn add_inst(&mut self, inst: Inst, layout: &mut FunctionLayout) {
        use self::FunctionInsertPos::*;
        match *self {
            None => panic!("no block selected to insert instruction"),
            Append(bb) => layout.append_inst(inst, bb),
            Prepend(bb) => {
                layout.prepend_inst(inst, bb);
                *self = After(inst);
            }
            After(other) => {
                layout.insert_inst_after(inst, other);
                *self = After(inst);
            }
            Before(other) => layout.insert_inst_before(inst, other),
        }
    }

    /// Keep the insertion point valid when an instruction is removed.
    pub fn remove_inst(&mut self, inst: Inst, layout: &FunctionLayout) {
        use self::FunctionInsertPos::*;
        match *self {
            After(i) if i == inst => {
                *self = match layout.prev_inst(inst) {
                    Some(prev) => After(prev),
                    Option::None => Prepend(layout.inst_block_or_panic(inst)),
                }
            }
            Before(i) if i == inst => {
                *self = match layout.next_inst(inst) {
                    Some(next) => Before(next),
                    Option::None => Append(layout.inst_block_or_panic(inst)),
                }
            }
            _ => (),
        }
    }
}
