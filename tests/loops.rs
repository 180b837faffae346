// Copyright (c) 2017-2021 Fabian Schuiki

use ssair::{
    analysis::{DominatorTree, LoopInfo},
    ir::prelude::*,
    opt::prelude::*,
    pass::LoopSimplify,
    verifier::Verifier,
};

fn int(func: &mut FunctionBuilder, value: isize) -> Value {
    func.ins().const_int(IntValue::from_isize(32, value))
}

fn verify(func: &FunctionData) {
    let mut verifier = Verifier::new();
    verifier.verify_function(func);
    if let Err(errs) = verifier.finish() {
        panic!("verification failed:\n{}\n{}", errs, func);
    }
}

#[test]
fn nested_loops() {
    let mut module = Module::new();
    let id = module.create_function("nest", Signature::with_types(vec![int_ty(1)], void_ty()));
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let outer = func.named_block("outer");
    let inner = func.named_block("inner");
    let latch = func.named_block("outer.latch");
    let exit = func.named_block("exit");
    let c = func.arg_value_at(0);
    func.append_to(entry);
    func.ins().br(outer);
    func.append_to(outer);
    func.ins().br(inner);
    func.append_to(inner);
    func.ins().br_cond(c, inner, latch);
    func.append_to(latch);
    func.ins().br_cond(c, outer, exit);
    func.append_to(exit);
    func.ins().ret();

    let func = module.function(id);
    let dt = DominatorTree::new(func);
    let loops = LoopInfo::new(func, &dt);
    assert_eq!(loops.len(), 2);
    assert!(loops.is_header(outer));
    assert!(loops.is_header(inner));
    assert!(!loops.is_header(latch));

    let outer_loop = loops.loop_for_header(outer).unwrap();
    assert_eq!(outer_loop.latches, vec![latch]);
    assert_eq!(
        outer_loop.body.iter().cloned().collect::<Vec<_>>(),
        vec![outer, inner, latch]
    );
    assert_eq!(outer_loop.preheader, Some(entry));
    assert_eq!(outer_loop.exits.iter().cloned().collect::<Vec<_>>(), vec![exit]);
    assert_eq!(outer_loop.depth, 1);
    assert_eq!(outer_loop.parent, None);

    let inner_loop = loops.loop_for_header(inner).unwrap();
    assert_eq!(inner_loop.latches, vec![inner]);
    assert_eq!(inner_loop.body.len(), 1);
    assert_eq!(inner_loop.preheader, Some(outer));
    assert_eq!(inner_loop.exits.iter().cloned().collect::<Vec<_>>(), vec![latch]);
    assert_eq!(inner_loop.depth, 2);
    assert_eq!(loops.loops()[inner_loop.parent.unwrap()].header, outer);

    assert_eq!(loops.loop_depth(entry), 0);
    assert_eq!(loops.loop_depth(latch), 1);
    assert_eq!(loops.loop_depth(inner), 2);
    assert!(loops.is_current(func));
}

/// A loop entered from two blocks, with a phi merging different initial
/// values.
#[test]
fn preheader_merges_outside_edges() {
    let mut module = Module::new();
    let id = module.create_function(
        "two_entries",
        Signature::with_types(vec![int_ty(1)], int_ty(32)),
    );
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let a = func.named_block("a");
    let b = func.named_block("b");
    let header = func.named_block("header");
    let body = func.named_block("body");
    let exit = func.named_block("exit");
    let c = func.arg_value_at(0);

    func.append_to(entry);
    func.ins().br_cond(c, a, b);
    func.append_to(a);
    func.ins().br(header);
    func.append_to(b);
    func.ins().br(header);
    func.append_to(header);
    let one = int(&mut func, 1);
    let two = int(&mut func, 2);
    let i = func.ins().name("i").phi(vec![one, two], vec![a, b]);
    let seven = int(&mut func, 7);
    let done = func.ins().slt(i, seven);
    func.ins().br_cond(done, body, exit);
    func.append_to(body);
    let next = func.ins().add(i, one);
    let phi = func.dfg.value_inst(i);
    func.dfg.add_phi_incoming(phi, next, body);
    func.ins().br(header);
    func.append_to(exit);
    func.ins().ret_value(i);
    verify(&func);

    assert!(LoopSimplify::run_on_module(&PassContext::new(), &mut module));
    let func = module.function(id);
    verify(func);

    let dt = DominatorTree::new(func);
    let loops = LoopInfo::new(func, &dt);
    let lp = loops.loop_for_header(header).unwrap();
    let preheader = lp.preheader.expect("loop has a preheader");
    assert_eq!(func.block_name(preheader), Some("header.preheader"));
    assert_eq!(func.predecessors(preheader), vec![a, b]);
    assert_eq!(func.successors(preheader), vec![header]);

    // The initial values are merged in the preheader.
    let merged = func.phis(preheader);
    assert_eq!(merged.len(), 1);
    assert_eq!(func.dfg[phi].phi_incoming(preheader), Some(func.dfg.inst_result(merged[0])));
    assert_eq!(func.dfg[phi].phi_incoming(body), Some(next));
    assert_eq!(func.dfg[phi].phi_incoming(a), None);

    // Running again finds nothing to do.
    assert!(!LoopSimplify::run_on_module(&PassContext::new(), &mut module));
}

#[test]
fn uniform_initial_values_need_no_phi() {
    let mut module = Module::new();
    let id = module.create_function(
        "uniform",
        Signature::with_types(vec![int_ty(1)], void_ty()),
    );
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let a = func.named_block("a");
    let header = func.named_block("header");
    let exit = func.named_block("exit");
    let c = func.arg_value_at(0);
    func.append_to(entry);
    func.ins().br_cond(c, a, header);
    func.append_to(a);
    func.ins().br(header);
    func.append_to(header);
    let zero = int(&mut func, 0);
    let p = func.ins().phi(vec![zero, zero], vec![entry, a]);
    let q = func.ins().add(p, p);
    let phi = func.dfg.value_inst(p);
    func.dfg.add_phi_incoming(phi, q, header);
    func.ins().br_cond(c, header, exit);
    func.append_to(exit);
    func.ins().ret();

    assert!(LoopSimplify::run_on_module(&PassContext::new(), &mut module));
    let func = module.function(id);
    verify(func);
    let preheader = func
        .blocks()
        .find(|&bb| func.block_name(bb) == Some("header.preheader"))
        .unwrap();
    assert!(func.phis(preheader).is_empty());
    assert_eq!(func.dfg[phi].phi_incoming(preheader), Some(zero));
}
