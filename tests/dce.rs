// Copyright (c) 2017-2021 Fabian Schuiki

use ssair::{
    ir::prelude::*,
    opt::prelude::*,
    pass::{dce::is_dead, AggressiveDeadCodeElim, DeadCodeElim},
    verifier::Verifier,
};

fn int(func: &mut FunctionBuilder, value: isize) -> Value {
    func.ins().const_int(IntValue::from_isize(32, value))
}

fn verify(module: &Module) {
    let mut verifier = Verifier::new();
    verifier.verify_module(module);
    if let Err(errs) = verifier.finish() {
        panic!("verification failed:\n{}\n{}", errs, module);
    }
}

fn opcodes(func: &FunctionData) -> Vec<Opcode> {
    func.all_insts().map(|inst| func.dfg[inst].opcode()).collect()
}

#[test]
fn unused_chains_are_removed() {
    let mut module = Module::new();
    let id = module.create_function(
        "chain",
        Signature::with_types(vec![int_ty(32)], void_ty()),
    );
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let x = func.arg_value_at(0);
    func.append_to(entry);
    let slot = func.ins().alloca(int_ty(32));
    let one = int(&mut func, 1);
    let a = func.ins().add(x, one);
    let b = func.ins().mul(a, a);
    let c = func.ins().sub(x, one);
    func.ins().store(slot, c);
    func.ins().alloca(int_ty(32));
    func.ins().ret();
    assert!(is_dead(&func, func.dfg.value_inst(b)));
    assert!(!is_dead(&func, func.dfg.value_inst(a)));

    assert!(DeadCodeElim::run_on_module(&PassContext::new(), &mut module));
    verify(&module);
    let func = module.function(id);
    assert_eq!(
        opcodes(func),
        vec![Opcode::Alloca, Opcode::Sub, Opcode::Store, Opcode::Ret]
    );
    assert!(!DeadCodeElim::run_on_module(&PassContext::new(), &mut module));
}

/// A counter that is incremented in a loop but never read.
fn dead_cycle(module: &mut Module) -> FuncId {
    let id = module.create_function(
        "spin",
        Signature::with_types(vec![int_ty(1)], void_ty()),
    );
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let header = func.named_block("header");
    let exit = func.named_block("exit");
    let c = func.arg_value_at(0);
    func.append_to(entry);
    func.ins().br(header);
    func.append_to(header);
    let zero = int(&mut func, 0);
    let one = int(&mut func, 1);
    let p = func.ins().name("i").phi(vec![zero], vec![entry]);
    let q = func.ins().add(p, one);
    let phi = func.dfg.value_inst(p);
    func.dfg.add_phi_incoming(phi, q, header);
    func.ins().br_cond(c, header, exit);
    func.append_to(exit);
    func.ins().ret();
    id
}

#[test]
fn dce_keeps_dead_cycles() {
    let mut module = Module::new();
    let id = dead_cycle(&mut module);
    verify(&module);
    assert!(!DeadCodeElim::run_on_module(&PassContext::new(), &mut module));
    assert_eq!(opcodes(module.function(id)).len(), 5);
}

#[test]
fn adce_removes_dead_cycles() {
    let mut module = Module::new();
    let id = dead_cycle(&mut module);
    assert!(AggressiveDeadCodeElim::run_on_module(
        &PassContext::new(),
        &mut module
    ));
    verify(&module);
    assert_eq!(
        opcodes(module.function(id)),
        vec![Opcode::Br, Opcode::BrCond, Opcode::Ret]
    );
}

#[test]
fn adce_keeps_calls_and_their_operands() {
    let mut module = Module::new();
    let sig = Signature::with_types(vec![int_ty(32)], void_ty());
    let sink = module.create_function("sink", sig.clone());
    let mut func = module.builder(sink);
    let entry = func.named_block("entry");
    func.append_to(entry);
    func.ins().ret();

    let id = module.create_function("caller", sig.clone());
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let x = func.arg_value_at(0);
    func.append_to(entry);
    let ext = func.add_extern("sink", sig);
    let two = int(&mut func, 2);
    let y = func.ins().mul(x, two);
    func.ins().add(y, two);
    func.ins().call(ext, vec![y]);
    func.ins().ret();

    assert!(AggressiveDeadCodeElim::run_on_module(
        &PassContext::new(),
        &mut module
    ));
    verify(&module);
    assert_eq!(
        opcodes(module.function(id)),
        vec![Opcode::Mul, Opcode::Call, Opcode::Ret]
    );
}
