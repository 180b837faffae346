// Copyright (c) 2017-2021 Fabian Schuiki

use ssair::{analysis::DominatorTree, ir::prelude::*};
use std::collections::{BTreeSet, HashSet};

/// A small deterministic pseudo-random number generator.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as usize
    }
}

fn void_sig() -> Signature {
    Signature::with_types(vec![int_ty(1)], void_ty())
}

#[test]
fn diamond() {
    let mut module = Module::new();
    let id = module.create_function("diamond", void_sig());
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let then = func.named_block("then");
    let els = func.named_block("else");
    let join = func.named_block("join");
    let c = func.arg_value_at(0);
    func.append_to(entry);
    func.ins().br_cond(c, then, els);
    func.append_to(then);
    func.ins().br(join);
    func.append_to(els);
    func.ins().br(join);
    func.append_to(join);
    func.ins().ret();

    let func = module.function(id);
    let dt = DominatorTree::new(func);
    assert_eq!(dt.root(), entry);
    assert_eq!(dt.immediate_dominator(entry), None);
    assert_eq!(dt.immediate_dominator(then), Some(entry));
    assert_eq!(dt.immediate_dominator(els), Some(entry));
    assert_eq!(dt.immediate_dominator(join), Some(entry));
    assert!(dt.dominates(entry, join));
    assert!(dt.dominates(join, join));
    assert!(!dt.strictly_dominates(join, join));
    assert!(!dt.dominates(then, join));
    assert_eq!(dt.frontier(then).iter().cloned().collect::<Vec<_>>(), vec![join]);
    assert_eq!(dt.frontier(els).iter().cloned().collect::<Vec<_>>(), vec![join]);
    assert!(dt.frontier(entry).is_empty());
    assert_eq!(dt.level(entry), 0);
    assert_eq!(dt.level(join), 1);
    assert_eq!(dt.preorder()[0], entry);
    assert_eq!(dt.preorder().len(), 4);
}

#[test]
fn loop_and_unreachable_block() {
    let mut module = Module::new();
    let id = module.create_function("looping", void_sig());
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let header = func.named_block("header");
    let body = func.named_block("body");
    let exit = func.named_block("exit");
    let dead = func.named_block("dead");
    let c = func.arg_value_at(0);
    func.append_to(entry);
    func.ins().br(header);
    func.append_to(header);
    func.ins().br_cond(c, body, exit);
    func.append_to(body);
    func.ins().br(header);
    func.append_to(exit);
    func.ins().ret();
    func.append_to(dead);
    func.ins().br(exit);

    let func = module.function(id);
    let dt = DominatorTree::new(func);
    assert_eq!(dt.immediate_dominator(body), Some(header));
    assert_eq!(dt.immediate_dominator(exit), Some(header));
    assert!(dt.frontier(body).contains(&header));
    assert!(dt.frontier(header).contains(&header));
    assert!(!dt.is_reachable(dead));
    assert_eq!(dt.immediate_dominator(dead), None);
    assert!(!dt.dominates(dead, exit));
    assert!(!dt.dominates(entry, dead));
    assert_eq!(dt.blocks_reverse_post_order().len(), 4);
    assert!(dt.is_current(func));
}

/// Build a function with `n` blocks. Every block falls through to the next
/// one, possibly branching to a random other block as well, such that all
/// blocks are reachable.
fn random_cfg(module: &mut Module, rng: &mut Lcg, n: usize) -> (FuncId, Vec<Block>) {
    let id = module.create_function("random", void_sig());
    let mut func = module.builder(id);
    let blocks: Vec<Block> = (0..n).map(|i| func.named_block(format!("bb{}", i))).collect();
    let c = func.arg_value_at(0);
    for i in 0..n {
        func.append_to(blocks[i]);
        if i + 1 == n {
            func.ins().ret();
        } else if rng.next() % 3 == 0 {
            func.ins().br(blocks[i + 1]);
        } else {
            let other = blocks[rng.next() % n];
            func.ins().br_cond(c, blocks[i + 1], other);
        }
    }
    (id, blocks)
}

/// Find the blocks reachable from the entry without passing through `avoid`.
fn reachable_avoiding(func: &FunctionData, avoid: Option<Block>) -> HashSet<Block> {
    let mut seen = HashSet::new();
    let entry = func.entry();
    if Some(entry) == avoid {
        return seen;
    }
    let mut stack = vec![entry];
    while let Some(bb) = stack.pop() {
        if !seen.insert(bb) {
            continue;
        }
        for succ in func.successors(bb) {
            if Some(succ) != avoid {
                stack.push(succ);
            }
        }
    }
    seen
}

#[test]
fn random_cfgs_match_path_enumeration() {
    let mut rng = Lcg(42);
    for round in 0..50 {
        let n = 2 + round % 12;
        let mut module = Module::new();
        let (id, blocks) = random_cfg(&mut module, &mut rng, n);
        let func = module.function(id);
        let dt = DominatorTree::new(func);

        // `d` dominates `b` iff `b` cannot be reached once `d` is removed.
        let dominates = |d: Block, b: Block| -> bool {
            d == b || !reachable_avoiding(func, Some(d)).contains(&b)
        };
        for &d in &blocks {
            for &b in &blocks {
                assert_eq!(
                    dt.dominates(d, b),
                    dominates(d, b),
                    "dominates({}, {}) in\n{}",
                    d,
                    b,
                    func
                );
            }
        }

        // The frontier of `x` holds the blocks with a predecessor dominated
        // by `x` that `x` does not strictly dominate.
        for &x in &blocks {
            let expected: BTreeSet<Block> = blocks
                .iter()
                .cloned()
                .filter(|&y| {
                    func.predecessors(y).into_iter().any(|p| dominates(x, p))
                        && !(x != y && dominates(x, y))
                })
                .collect();
            assert_eq!(dt.frontier(x), &expected, "frontier of {} in\n{}", x, func);
        }

        // The immediate dominator is the closest strict dominator.
        for &b in &blocks[1..] {
            let idom = dt.immediate_dominator(b).unwrap();
            assert!(dominates(idom, b) && idom != b);
            for &d in &blocks {
                if d != b && dominates(d, b) {
                    assert!(dominates(d, idom), "{} skips {} above {}", idom, d, b);
                }
            }
        }
    }
}
