// Copyright (c) 2017-2021 Fabian Schuiki

#[macro_use]
extern crate indoc;

mod common;

use common::{behavior, random_slot_program, Lcg};
use ssair::{
    ir::prelude::*,
    opt::{prelude::*, UnknownPassError},
    pass,
    table::TableKey,
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

fn count(module: &Module, opcode: Opcode) -> usize {
    module
        .functions()
        .flat_map(|(_, func)| func.all_insts().map(move |inst| func.dfg[inst].opcode()))
        .filter(|&op| op == opcode)
        .count()
}

/// Add `count()`, a loop on a stack slot, and `forty_nine()`, which calls
/// `square(7)`.
fn program(module: &mut Module) {
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

    let sig = Signature::with_types(vec![int_ty(32)], int_ty(32));
    let id = module.create_function("square", sig.clone());
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let x = func.arg_value_at(0);
    func.append_to(entry);
    let xx = func.ins().name("xx").mul(x, x);
    func.ins().ret_value(xx);

    let id = module.create_function("forty_nine", Signature::with_types(vec![], int_ty(32)));
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    func.append_to(entry);
    let ext = func.add_extern("square", sig);
    let seven = int(&mut func, 7);
    let call = func.ins().call(ext, vec![seven]);
    let result = func.dfg.inst_result(call);
    func.ins().ret_value(result);
}

#[test]
fn display() {
    let mut module = Module::new();
    let sig = Signature::with_types(vec![int_ty(32)], int_ty(32));
    let id = module.create_function("square", sig);
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let x = func.arg_value_at(0);
    func.dfg.set_name(x, "x".to_owned());
    func.append_to(entry);
    let xx = func.ins().name("xx").mul(x, x);
    func.ins().ret_value(xx);
    assert_eq!(
        format!("{}", module),
        indoc! {"
        func @square (i32 %x) i32 {
        entry.0:  ; preds=() succs=()
            %xx = mul i32 %x, %x
            ret %xx
        }
        "}
    );
}

#[test]
fn link_reports_undefined_callees() {
    let mut module = Module::new();
    program(&mut module);
    assert_eq!(module.link(), Ok(()));

    let sig = Signature::with_types(vec![], void_ty());
    let id = module.create_function("caller", sig.clone());
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    func.append_to(entry);
    let missing = func.add_extern("missing", sig.clone());
    let unknown = func.add_extern("unknown", sig);
    func.ins().call(unknown, vec![]);
    func.ins().call(missing, vec![]);
    func.ins().ret();

    let err = module.link().unwrap_err();
    assert_eq!(
        err.to_string(),
        indoc! {"
        @caller calls undefined function @missing
        @caller calls undefined function @unknown"}
    );
    assert_eq!(err.unresolved.len(), 2);
}

#[test]
fn lookup_and_resolve() {
    let mut module = Module::new();
    program(&mut module);
    assert_eq!(module.num_functions(), 3);
    let caller = module.lookup("forty_nine").unwrap();
    let square = module.lookup("square").unwrap();
    assert!(module.lookup("cube").is_none());

    let func = module.function(caller);
    let call = func
        .all_insts()
        .find(|&inst| func.dfg[inst].opcode() == Opcode::Call)
        .unwrap();
    let ext = func.dfg[call].get_ext_unit().unwrap();
    assert_eq!(module.resolve(func, ext), Some(square));
}

#[test]
fn unknown_pass_names_are_rejected() {
    let err = PassPipeline::parse(vec!["ssa", "gcse"]).unwrap_err();
    assert_eq!(err, UnknownPassError("gcse".to_owned()));
    assert_eq!(err.to_string(), "unknown pass `gcse`");
    for &(name, _) in pass::PASSES {
        assert!(pass::lookup(name).is_some(), "{} not registered", name);
    }
}

#[test]
fn default_pipeline() {
    let _ = env_logger::try_init();
    for &parallel in &[true, false] {
        let mut module = Module::new();
        program(&mut module);
        module.link().unwrap();
        verify(&module);

        let ctx = PassContext::new()
            .with_verify_each(true)
            .with_parallel(parallel);
        let pipeline = PassPipeline::default_pipeline();
        let stats = pipeline.run(&ctx, &mut module);
        verify(&module);
        assert!(stats.modified);
        assert_eq!(stats.times.len(), pipeline.len());

        assert_eq!(count(&module, Opcode::Alloca), 0);
        assert_eq!(count(&module, Opcode::Load), 0);
        assert_eq!(count(&module, Opcode::Store), 0);
        assert_eq!(count(&module, Opcode::Phi), 0);
        assert!(count(&module, Opcode::Copy) > 0);

        let func = module.function(module.lookup("forty_nine").unwrap());
        let ret = func.terminator(func.entry()).unwrap();
        let value = func.dfg[ret].args()[0];
        assert_eq!(func.dfg.get_const_int(value).and_then(|v| v.to_usize()), Some(49));
    }
}

#[test]
fn explicit_pipeline() {
    let mut module = Module::new();
    program(&mut module);
    let pipeline = PassPipeline::parse(vec!["ssa,gvn", "verify", "dce"]).unwrap();
    assert_eq!(pipeline.names(), vec!["ssa", "gvn", "verify", "dce"]);
    let stats = pipeline.run(&PassContext::new(), &mut module);
    assert!(stats.modified);
    verify(&module);
    assert_eq!(count(&module, Opcode::Phi), 1);
    assert_eq!(count(&module, Opcode::Alloca), 0);
}

#[test]
fn random_programs_survive_every_pipeline() {
    let _ = env_logger::try_init();
    let pipelines = vec![
        PassPipeline::parse(vec!["ssa"]).unwrap(),
        PassPipeline::parse(vec!["ssa,gvn"]).unwrap(),
        PassPipeline::parse(vec!["ssa,sccp,cfs"]).unwrap(),
        PassPipeline::parse(vec!["ssa,loop-simplify,osr"]).unwrap(),
        PassPipeline::parse(vec!["ssa,dce,adce"]).unwrap(),
        PassPipeline::parse(vec!["ssa,ssa-destruct"]).unwrap(),
        PassPipeline::parse(vec!["ssa,cfs,ssa-destruct"]).unwrap(),
        PassPipeline::default_pipeline(),
    ];
    let ctx = PassContext::new().with_verify_each(true);
    let mut rng = Lcg(23);
    for _ in 0..50 {
        let mut template = Module::new();
        let id = random_slot_program(&mut template, &mut rng);
        let expected = behavior(template.function(id));
        for pipeline in &pipelines {
            let mut module = template.clone();
            pipeline.run(&ctx, &mut module);
            verify(&module);
            assert_eq!(
                behavior(module.function(id)),
                expected,
                "{:?} changed the behavior of\n{}\ninto\n{}",
                pipeline.names(),
                template,
                module
            );
        }
    }
}

#[test]
fn shared_names_are_disambiguated() {
    let mut module = Module::new();
    let id = module.create_function(
        "twice",
        Signature::with_types(vec![int_ty(32)], int_ty(32)),
    );
    let mut func = module.builder(id);
    let entry = func.named_block("entry");
    let x = func.arg_value_at(0);
    func.dfg.set_name(x, "x".to_string());
    func.append_to(entry);
    let a0 = func.ins().name("a").add(x, x);
    let a1 = func.ins().name("a").mul(a0, x);
    func.ins().ret_value(a1);

    let func = module.function(id);
    assert_eq!(x.dump(func).to_string(), "%x");
    assert_eq!(a0.dump(func).to_string(), format!("%a.{}", a0.index()));
    assert_eq!(a1.dump(func).to_string(), format!("%a.{}", a1.index()));
    assert_ne!(a0.dump(func).to_string(), a1.dump(func).to_string());

    module.function_mut(id).dfg.clear_name(a0);
    let func = module.function(id);
    assert_eq!(a1.dump(func).to_string(), "%a");
}
