// Copyright (c) 2017-2021 Fabian Schuiki

//! Built-in sample programs, constructed the way a front end would emit them:
//! local variables live in stack slots and are accessed through loads and
//! stores.

use ssair::ir::prelude::*;

/// A sample program.
pub struct Sample {
    /// The name used to select the sample on the command line.
    pub name: &'static str,
    /// A short description in C-like syntax.
    pub description: &'static str,
    /// Adds the sample's functions to a module.
    pub build: fn(&mut Module),
}

/// All available samples.
pub static SAMPLES: &[Sample] = &[
    Sample {
        name: "while-loop",
        description: "int count() { int a = 0; while (a < 20) { a = a + 1; } return a; }",
        build: while_loop,
    },
    Sample {
        name: "redundant-mul",
        description: "int times_eight(int x) { return x * 4 + x * 4; }",
        build: redundant_mul,
    },
    Sample {
        name: "const-branch",
        description: "int pick() { int r; if (1) r = 10; else r = 20; return r; }",
        build: const_branch,
    },
    Sample {
        name: "scaled-sum",
        description: "int scaled_sum(int n) { int s = 0; for (int i = 0; i < n; i++) s += i * 4; return s; }",
        build: scaled_sum,
    },
    Sample {
        name: "const-call",
        description: "int square(int x) { return x * x; } int forty_nine() { return square(7); }",
        build: const_call,
    },
];

/// Find a sample by name.
pub fn lookup(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|s| s.name == name)
}

fn int(func: &mut FunctionBuilder, value: isize) -> Value {
    func.ins().const_int(IntValue::from_isize(32, value))
}

fn while_loop(module: &mut Module) {
    let id = module.create_function("count", Signature::with_types(vec![], int_ty(32)));
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let cond = func.named_block("while.cond");
    let body = func.named_block("while.body");
    let end = func.named_block("while.end");

    func.append_to(entry);
    let a = func.ins().name("a").alloca(int_ty(32));
    let zero = int(&mut func, 0);
    func.ins().store(a, zero);
    func.ins().br(cond);

    func.append_to(cond);
    let av = func.ins().load(a);
    let limit = int(&mut func, 20);
    let c = func.ins().slt(av, limit);
    func.ins().br_cond(c, body, end);

    func.append_to(body);
    let av = func.ins().load(a);
    let one = int(&mut func, 1);
    let inc = func.ins().add(av, one);
    func.ins().store(a, inc);
    func.ins().br(cond);

    func.append_to(end);
    let av = func.ins().load(a);
    func.ins().ret_value(av);
}

fn redundant_mul(module: &mut Module) {
    let id = module.create_function(
        "times_eight",
        Signature::with_types(vec![int_ty(32)], int_ty(32)),
    );
    let mut func = module.builder(id);
    let x = func.arg_value_at(0);
    func.dfg.set_name(x, "x".to_owned());
    let entry = func.named_block("entry");
    func.append_to(entry);
    let four = int(&mut func, 4);
    let a = func.ins().mul(x, four);
    let b = func.ins().mul(x, four);
    let sum = func.ins().add(a, b);
    func.ins().ret_value(sum);
}

fn const_branch(module: &mut Module) {
    let id = module.create_function("pick", Signature::with_types(vec![], int_ty(32)));
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let then = func.named_block("if.then");
    let els = func.named_block("if.else");
    let end = func.named_block("if.end");

    func.append_to(entry);
    let r = func.ins().name("r").alloca(int_ty(32));
    let cond = func.ins().const_int(IntValue::from_usize(1, 1));
    func.ins().br_cond(cond, then, els);

    func.append_to(then);
    let ten = int(&mut func, 10);
    func.ins().store(r, ten);
    func.ins().br(end);

    func.append_to(els);
    let twenty = int(&mut func, 20);
    func.ins().store(r, twenty);
    func.ins().br(end);

    func.append_to(end);
    let rv = func.ins().load(r);
    func.ins().ret_value(rv);
}

fn scaled_sum(module: &mut Module) {
    let id = module.create_function(
        "scaled_sum",
        Signature::with_types(vec![int_ty(32)], int_ty(32)),
    );
    let mut func = module.builder(id);
    let n = func.arg_value_at(0);
    func.dfg.set_name(n, "n".to_owned());
    let entry = func.named_block("entry");
    let cond = func.named_block("for.cond");
    let body = func.named_block("for.body");
    let end = func.named_block("for.end");

    func.append_to(entry);
    let s = func.ins().name("s").alloca(int_ty(32));
    let i = func.ins().name("i").alloca(int_ty(32));
    let zero = int(&mut func, 0);
    func.ins().store(s, zero);
    func.ins().store(i, zero);
    func.ins().br(cond);

    func.append_to(cond);
    let iv = func.ins().load(i);
    let c = func.ins().slt(iv, n);
    func.ins().br_cond(c, body, end);

    func.append_to(body);
    let iv = func.ins().load(i);
    let four = int(&mut func, 4);
    let scaled = func.ins().mul(iv, four);
    let sv = func.ins().load(s);
    let sum = func.ins().add(sv, scaled);
    func.ins().store(s, sum);
    let one = int(&mut func, 1);
    let next = func.ins().add(iv, one);
    func.ins().store(i, next);
    func.ins().br(cond);

    func.append_to(end);
    let sv = func.ins().load(s);
    func.ins().ret_value(sv);
}

fn const_call(module: &mut Module) {
    let sig = Signature::with_types(vec![int_ty(32)], int_ty(32));
    let id = module.create_function("square", sig.clone());
    {
        let mut func = module.builder(id);
        let x = func.arg_value_at(0);
        let entry = func.named_block("entry");
        func.append_to(entry);
        let sq = func.ins().mul(x, x);
        func.ins().ret_value(sq);
    }

    let id = module.create_function("forty_nine", Signature::with_types(vec![], int_ty(32)));
    let mut func = module.builder(id);
    let square = func.add_extern("square", sig);
    let entry = func.named_block("entry");
    func.append_to(entry);
    let seven = int(&mut func, 7);
    let call = func.ins().call(square, vec![seven]);
    let result = func.dfg.inst_result(call);
    func.ins().ret_value(result);
}
