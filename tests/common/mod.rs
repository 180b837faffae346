// Copyright (c) 2017-2021 Fabian Schuiki

//! Random program generation and concrete execution shared by the tests.

#![allow(dead_code)]

use ssair::{ir::prelude::*, verifier::Verifier};
use std::collections::HashMap;

pub fn int(func: &mut FunctionBuilder, value: isize) -> Value {
    func.ins().const_int(IntValue::from_isize(32, value))
}

pub fn verify_module(module: &Module) {
    let mut verifier = Verifier::new();
    verifier.verify_module(module);
    if let Err(errs) = verifier.finish() {
        panic!("verification failed:\n{}\n{}", errs, module);
    }
}

pub fn count(func: &FunctionData, opcode: Opcode) -> usize {
    func.all_insts()
        .filter(|&inst| func.dfg[inst].opcode() == opcode)
        .count()
}

/// A small deterministic pseudo-random number generator.
pub struct Lcg(pub u64);

impl Lcg {
    pub fn next(&mut self) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as usize
    }

    pub fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[self.next() % items.len()]
    }
}

pub static ARITH: &[Opcode] = &[
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::And,
    Opcode::Or,
    Opcode::Xor,
];

pub static COMPARE: &[Opcode] = &[Opcode::Eq, Opcode::Neq, Opcode::Slt, Opcode::Ult, Opcode::Sge];

/// Append a few random arithmetic instructions, using values from `pool` or
/// small constants as operands. Returns the last value computed.
pub fn random_arith(func: &mut FunctionBuilder, rng: &mut Lcg, pool: &mut Vec<Value>) -> Value {
    let mut last = pool[pool.len() - 1];
    for _ in 0..1 + rng.next() % 4 {
        let operand = |func: &mut FunctionBuilder, rng: &mut Lcg| {
            if rng.next() % 2 == 0 {
                let imm = (rng.next() % 7) as isize - 2;
                int(func, imm)
            } else {
                rng.pick(&pool[..])
            }
        };
        let a = operand(func, rng);
        let b = operand(func, rng);
        let opcode = rng.pick(ARITH);
        last = func.ins().binary(opcode, a, b);
        pool.push(last);
    }
    last
}

/// Build `f(x)` as a random looping program over stack slots.
///
/// Body block `i` reads and writes the slots, then burns one unit of fuel and
/// leaves through the exit once the fuel is gone. Otherwise it moves on to a
/// choice block which branches on the slots to body `i + 1`, wrapping around
/// to the first body, or to a random other block. Every block is reachable
/// and every run terminates.
pub fn random_slot_program(module: &mut Module, rng: &mut Lcg) -> FuncId {
    let id = module.create_function(
        "random",
        Signature::with_types(vec![int_ty(32)], int_ty(32)),
    );
    let mut func = module.builder(id);
    let num_bodies = 2 + rng.next() % 4;
    let entry = func.named_block("entry");
    let mut bodies = vec![];
    let mut choices = vec![];
    for i in 0..num_bodies {
        bodies.push(func.named_block(format!("body{}", i)));
        choices.push(func.named_block(format!("choose{}", i)));
    }
    let exit = func.named_block("exit");
    let x = func.arg_value_at(0);

    func.append_to(entry);
    let fuel = func.ins().name("fuel").alloca(int_ty(32));
    let initial = int(&mut func, 4 + (rng.next() % 12) as isize);
    func.ins().store(fuel, initial);
    let mut slots = vec![];
    for i in 0..2 + rng.next() % 2 {
        slots.push(func.ins().name(format!("s{}", i)).alloca(int_ty(32)));
    }
    for &slot in &slots {
        let init = if rng.next() % 2 == 0 {
            x
        } else {
            int(&mut func, (rng.next() % 9) as isize - 4)
        };
        func.ins().store(slot, init);
    }
    func.ins().br(bodies[0]);

    for i in 0..num_bodies {
        func.append_to(bodies[i]);
        let mut pool = vec![x];
        for &slot in &slots {
            if rng.next() % 3 != 0 {
                pool.push(func.ins().load(slot));
            }
        }
        random_arith(&mut func, rng, &mut pool);
        for &slot in &slots {
            if rng.next() % 2 == 0 {
                let value = rng.pick(&pool);
                func.ins().store(slot, value);
            }
        }
        let left = func.ins().load(fuel);
        let one = int(&mut func, 1);
        let left = func.ins().sub(left, one);
        func.ins().store(fuel, left);
        let zero = int(&mut func, 0);
        let alive = func.ins().sgt(left, zero);
        func.ins().br_cond(alive, choices[i], exit);

        func.append_to(choices[i]);
        let a = func.ins().load(rng.pick(&slots));
        let b = if rng.next() % 2 == 0 {
            int(&mut func, (rng.next() % 5) as isize - 2)
        } else {
            func.ins().load(rng.pick(&slots))
        };
        let cond = func.ins().binary(rng.pick(COMPARE), a, b);
        let next = bodies[(i + 1) % num_bodies];
        let other = rng.pick(&bodies);
        let other = if other == next { exit } else { other };
        func.ins().br_cond(cond, next, other);
    }

    func.append_to(exit);
    let mut result = func.ins().load(slots[0]);
    for &slot in &slots[1..] {
        let value = func.ins().load(slot);
        result = func.ins().binary(rng.pick(ARITH), result, value);
    }
    func.ins().ret_value(result);
    id
}

/// Execute a function on concrete arguments.
pub fn interpret(func: &FunctionData, args: &[IntValue]) -> IntValue {
    let mut env: HashMap<Value, IntValue> = HashMap::new();
    let mut memory: HashMap<Value, IntValue> = HashMap::new();
    for (i, arg) in args.iter().enumerate() {
        env.insert(func.arg_value_at(i), arg.clone());
    }
    let get = |env: &HashMap<Value, IntValue>, value: Value| match func.dfg.get_const_int(value) {
        Some(imm) => imm.clone(),
        None => match env.get(&value) {
            Some(imm) => imm.clone(),
            None => panic!("{} read before it is defined", value.dump(func)),
        },
    };

    let mut bb = func.entry();
    let mut prev: Option<Block> = None;
    for _ in 0..10000 {
        // Phis read their operands before any of them is written.
        let incoming: Vec<(Value, IntValue)> = func
            .phis(bb)
            .into_iter()
            .map(|phi| {
                let from = prev.expect("phi in entry block");
                let value = func.dfg[phi].phi_incoming(from).unwrap();
                (func.dfg.inst_result(phi), get(&env, value))
            })
            .collect();
        env.extend(incoming);

        let mut next = None;
        for inst in func.insts(bb) {
            let data = &func.dfg[inst];
            let opcode = data.opcode();
            match opcode {
                Opcode::Phi => (),
                Opcode::Alloca => (),
                Opcode::Load => {
                    let value = match memory.get(&data.args()[0]) {
                        Some(imm) => imm.clone(),
                        None => panic!("{} reads uninitialized memory", inst.dump(func)),
                    };
                    env.insert(func.dfg.inst_result(inst), value);
                }
                Opcode::Store => {
                    let value = get(&env, data.args()[1]);
                    memory.insert(data.args()[0], value);
                }
                Opcode::Copy => {
                    let value = get(&env, data.args()[1]);
                    env.insert(data.args()[0], value);
                }
                Opcode::Br => next = Some(data.blocks()[0]),
                Opcode::BrCond => {
                    let cond = get(&env, data.args()[0]);
                    next = Some(data.blocks()[if cond.is_zero() { 1 } else { 0 }]);
                }
                Opcode::RetValue => return get(&env, data.args()[0]),
                _ if opcode.is_unary_arith() => {
                    let x = get(&env, data.args()[0]);
                    let result = IntValue::try_unary_op(opcode, &x).unwrap();
                    env.insert(func.dfg.inst_result(inst), result);
                }
                _ if opcode.is_binary_arith() => {
                    let (a, b) = (get(&env, data.args()[0]), get(&env, data.args()[1]));
                    let result = IntValue::try_binary_op(opcode, &a, &b).unwrap();
                    env.insert(func.dfg.inst_result(inst), result);
                }
                _ if opcode.is_compare() => {
                    let (a, b) = (get(&env, data.args()[0]), get(&env, data.args()[1]));
                    let result = IntValue::try_compare_op(opcode, &a, &b).unwrap();
                    env.insert(func.dfg.inst_result(inst), result);
                }
                _ => panic!("cannot interpret {}", inst.dump(func)),
            }
        }
        prev = Some(bb);
        bb = next.expect("block without terminator");
    }
    panic!("execution of @{} did not terminate", func.name);
}

/// Run a function on a fixed set of inputs.
pub fn behavior(func: &FunctionData) -> Vec<IntValue> {
    [-3, 0, 1, 2, 7, 100]
        .iter()
        .map(|&x| interpret(func, &[IntValue::from_isize(32, x)]))
        .collect()
}
