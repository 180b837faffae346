// Copyright (c) 2017-2021 Fabian Schuiki

use ssair::{
    ir::prelude::*,
    opt::prelude::*,
    pass::{sccp, ControlFlowSimplification, SparseCondConstProp, SsaConstruction},
};

mod common;

use common::{
    behavior, count, int, random_arith, random_slot_program, verify_module as verify, Lcg, COMPARE,
};

fn returned_const(func: &FunctionData) -> Option<isize> {
    let ret = func
        .all_insts()
        .find(|&inst| func.dfg[inst].opcode() == Opcode::RetValue)?;
    let value = func.dfg[ret].args()[0];
    func.dfg
        .get_const_int(value)
        .map(|imm| imm.to_signed().to_string().parse().unwrap())
}

/// Build `f(x)` as a diamond of random arithmetic with a random condition.
fn random_program(module: &mut Module, rng: &mut Lcg) -> FuncId {
    let id = module.create_function("random", Signature::with_types(vec![int_ty(32)], int_ty(32)));
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let then = func.named_block("then");
    let els = func.named_block("else");
    let join = func.named_block("join");
    let x = func.arg_value_at(0);

    func.append_to(entry);
    let seed = int(&mut func, (rng.next() % 5) as isize);
    let mut pool = vec![x, seed];
    let a = random_arith(&mut func, rng, &mut pool);
    let b = if rng.next() % 2 == 0 {
        int(&mut func, (rng.next() % 5) as isize)
    } else {
        rng.pick(&pool)
    };
    let cond = func.ins().binary(rng.pick(COMPARE), a, b);
    func.ins().br_cond(cond, then, els);

    func.append_to(then);
    let mut then_pool = pool.clone();
    let t = random_arith(&mut func, rng, &mut then_pool);
    func.ins().br(join);

    func.append_to(els);
    let mut else_pool = pool.clone();
    let e = random_arith(&mut func, rng, &mut else_pool);
    func.ins().br(join);

    func.append_to(join);
    let p = func.ins().phi(vec![t, e], vec![then, els]);
    pool.push(p);
    let r = random_arith(&mut func, rng, &mut pool);
    func.ins().ret_value(r);
    id
}

#[test]
fn random_programs_keep_their_behavior() {
    let mut rng = Lcg(7);
    let ctx = PassContext::new();
    for _ in 0..100 {
        let mut module = Module::new();
        let id = random_program(&mut module, &mut rng);
        verify(&module);
        let before = module.function(id).clone();
        let expected = behavior(&before);

        SparseCondConstProp::run_on_module(&ctx, &mut module);
        verify(&module);
        ControlFlowSimplification::run_on_module(&ctx, &mut module);
        verify(&module);
        let after = module.function(id);
        assert_eq!(behavior(after), expected, "changed from\n{}\nto\n{}", before, after);
    }
}

#[test]
fn random_loops_keep_their_behavior() {
    let mut rng = Lcg(19);
    let ctx = PassContext::new();
    for _ in 0..200 {
        let mut module = Module::new();
        let id = random_slot_program(&mut module, &mut rng);
        verify(&module);
        let expected = behavior(module.function(id));

        SsaConstruction::run_on_module(&ctx, &mut module);
        verify(&module);
        let before = module.function(id).clone();
        assert!(count(&before, Opcode::Phi) > 0);
        assert_eq!(behavior(&before), expected);

        SparseCondConstProp::run_on_module(&ctx, &mut module);
        verify(&module);
        ControlFlowSimplification::run_on_module(&ctx, &mut module);
        verify(&module);
        let after = module.function(id);
        assert_eq!(behavior(after), expected, "changed from\n{}\nto\n{}", before, after);
    }
}

#[test]
fn arguments_are_not_constant() {
    let mut module = Module::new();
    let id = module.create_function(
        "sign",
        Signature::with_types(vec![int_ty(32)], int_ty(32)),
    );
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let neg = func.named_block("neg");
    let pos = func.named_block("pos");
    let x = func.arg_value_at(0);
    func.append_to(entry);
    let zero = int(&mut func, 0);
    let c = func.ins().slt(x, zero);
    func.ins().br_cond(c, neg, pos);
    func.append_to(neg);
    let minus_one = int(&mut func, -1);
    func.ins().ret_value(minus_one);
    func.append_to(pos);
    let one = int(&mut func, 1);
    func.ins().ret_value(one);

    let ctx = PassContext::new();
    let func = module.function(id);
    let facts = sccp::analyze(&ctx, func, None);
    assert_eq!(facts.value(func, x), sccp::Lattice::NotConst);
    assert_eq!(facts.value(func, c), sccp::Lattice::NotConst);
    assert!(facts.is_executable(neg));
    assert!(facts.is_executable(pos));
    assert!(!SparseCondConstProp::run_on_module(&ctx, &mut module));
}

#[test]
fn constant_branch_leaves_taken_block() {
    let mut module = Module::new();
    let id = module.create_function("pick", Signature::with_types(vec![], int_ty(32)));
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let then = func.named_block("if.then");
    let els = func.named_block("if.else");
    let end = func.named_block("if.end");
    func.append_to(entry);
    let c = func.ins().const_int(IntValue::from_usize(1, 1));
    func.ins().br_cond(c, then, els);
    func.append_to(then);
    func.ins().br(end);
    func.append_to(els);
    func.ins().br(end);
    func.append_to(end);
    let ten = int(&mut func, 10);
    let twenty = int(&mut func, 20);
    let r = func.ins().phi(vec![ten, twenty], vec![then, els]);
    func.ins().ret_value(r);

    let ctx = PassContext::new();
    {
        let func = module.function(id);
        let facts = sccp::analyze(&ctx, func, None);
        assert!(facts.is_executable(then));
        assert!(!facts.is_executable(els));
        assert!(facts.is_edge_executable(entry, then));
        assert!(!facts.is_edge_executable(entry, els));
        assert_eq!(facts.value(func, r).get_const().and_then(|v| v.to_usize()), Some(10));
    }

    assert!(SparseCondConstProp::run_on_module(&ctx, &mut module));
    assert!(ControlFlowSimplification::run_on_module(&ctx, &mut module));
    verify(&module);
    let func = module.function(id);
    assert_eq!(func.blocks().count(), 1);
    assert_eq!(func.all_insts().count(), 1);
    assert_eq!(returned_const(func), Some(10));
}

#[test]
fn undefined_condition_keeps_both_targets() {
    let mut module = Module::new();
    let id = module.create_function("either", Signature::with_types(vec![], int_ty(32)));
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let then = func.named_block("then");
    let els = func.named_block("else");
    func.append_to(entry);
    let c = func.dfg.undef(int_ty(1));
    func.ins().br_cond(c, then, els);
    func.append_to(then);
    let one = int(&mut func, 1);
    func.ins().ret_value(one);
    func.append_to(els);
    let two = int(&mut func, 2);
    func.ins().ret_value(two);

    let ctx = PassContext::new();
    let facts = sccp::analyze(&ctx, module.function(id), None);
    assert!(facts.is_executable(then));
    assert!(facts.is_executable(els));
    assert_eq!(facts.returns(), &sccp::Lattice::NotConst);
    assert!(!SparseCondConstProp::run_on_module(&ctx, &mut module));
}

fn square_module() -> (Module, FuncId) {
    let mut module = Module::new();
    let sig = Signature::with_types(vec![int_ty(32)], int_ty(32));
    let square = module.create_function("square", sig.clone());
    let mut func = module.builder(square);
    let entry = func.named_block("entry");
    let x = func.arg_value_at(0);
    func.append_to(entry);
    let xx = func.ins().mul(x, x);
    func.ins().ret_value(xx);

    let caller = module.create_function("forty_nine", Signature::with_types(vec![], int_ty(32)));
    let mut func = module.builder(caller);
    let entry = func.named_block("entry");
    func.append_to(entry);
    let ext = func.add_extern("square", sig);
    let seven = int(&mut func, 7);
    let call = func.ins().call(ext, vec![seven]);
    let result = func.dfg.inst_result(call);
    func.ins().ret_value(result);
    (module, caller)
}

#[test]
fn calls_are_evaluated() {
    let (mut module, caller) = square_module();
    module.link().unwrap();
    assert!(SparseCondConstProp::run_on_module(&PassContext::new(), &mut module));
    verify(&module);
    assert_eq!(returned_const(module.function(caller)), Some(49));

    // Without the module, the callee is unknown.
    let (mut module, caller) = square_module();
    let modified = SparseCondConstProp::run_on_function(
        &PassContext::new(),
        &mut module.builder(caller),
    );
    assert!(!modified);
    assert_eq!(returned_const(module.function(caller)), None);
}

/// Build `f0() = f1(), f1() = f2(), ...` down to `f<depth>() = 1`.
fn call_chain(depth: usize) -> Module {
    let mut module = Module::new();
    let sig = Signature::with_types(vec![], int_ty(32));
    for i in 0..=depth {
        let id = module.create_function(format!("f{}", i), sig.clone());
        let mut func = module.builder(id);
        let entry = func.named_block("entry");
        func.append_to(entry);
        if i == depth {
            let one = int(&mut func, 1);
            func.ins().ret_value(one);
        } else {
            let ext = func.add_extern(format!("f{}", i + 1), sig.clone());
            let call = func.ins().call(ext, vec![]);
            let result = func.dfg.inst_result(call);
            func.ins().ret_value(result);
        }
    }
    module
}

#[test]
fn call_depth_is_limited() {
    let module = call_chain(6);
    let f0 = module.lookup("f0").unwrap();
    let shallow = PassContext::new().with_max_call_depth(4);
    let facts = sccp::analyze(&shallow, module.function(f0), Some(&module));
    assert_eq!(facts.returns(), &sccp::Lattice::NotConst);

    let deep = PassContext::new().with_max_call_depth(8);
    let facts = sccp::analyze(&deep, module.function(f0), Some(&module));
    assert_eq!(
        facts.returns(),
        &sccp::Lattice::Const(IntValue::from_isize(32, 1))
    );
}

#[test]
fn recursion_terminates() {
    let mut module = Module::new();
    let sig = Signature::with_types(vec![int_ty(32)], int_ty(32));
    let id = module.create_function("spin", sig.clone());
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let x = func.arg_value_at(0);
    func.append_to(entry);
    let ext = func.add_extern("spin", sig);
    let call = func.ins().call(ext, vec![x]);
    let result = func.dfg.inst_result(call);
    func.ins().ret_value(result);
    module.link().unwrap();

    assert!(!SparseCondConstProp::run_on_module(&PassContext::new(), &mut module));
    verify(&module);
}
