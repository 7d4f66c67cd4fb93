//! Hot-loop promotion properties
//!
//! Promotion must never change what a program computes: every program here
//! runs interpreted and compiled and the two results are compared.

use basalt_cli::demos;
use bytecode_system::{BinaryOp, BytecodeChunk, Opcode, RegisterId};
use core_types::{make_int, LoopState, SmallValuePool, TaggedValue};
use integration_tests::{jit_vm, run_both, run_on};

fn r(index: u32) -> RegisterId {
    RegisterId(index)
}

#[test]
fn test_sum_matches_with_and_without_promotion() {
    for n in [0, 1, 99, 100, 101, 5_000] {
        let (interpreted, compiled) = run_both(&demos::sum_below(n), 100);
        let expected: i64 = (0..n).sum();
        assert_eq!(interpreted.result.unwrap(), expected.to_string());
        assert_eq!(compiled.result.unwrap(), expected.to_string());
    }
}

#[test]
fn test_default_threshold_promotes_at_ten_thousand() {
    let mut vm = jit_vm(core_types::HOT_LOOP_THRESHOLD);
    let below = run_on(&mut vm, demos::sum_below(9_999));
    assert!(below.events.is_empty());

    let mut vm = jit_vm(core_types::HOT_LOOP_THRESHOLD);
    let at = run_on(&mut vm, demos::sum_below(10_000));
    assert_eq!(at.result.unwrap(), "49995000");
    assert_eq!(at.events.len(), 1);
    assert_eq!(at.events[0].to_string(), "JIT: Compiled loop sum at PC 3");
}

#[test]
fn test_threshold_boundary() {
    let threshold = 64;
    let mut vm = jit_vm(threshold);
    let below = vm.load(demos::sum_below(i64::from(threshold) - 1)).unwrap();
    vm.execute(&below, &[]).unwrap();
    assert_eq!(below.existing_record(3).unwrap().state(), LoopState::Counting);

    let at = vm.load(demos::sum_below(i64::from(threshold))).unwrap();
    vm.execute(&at, &[]).unwrap();
    assert_eq!(at.existing_record(3).unwrap().state(), LoopState::Installed);
    assert_eq!(vm.event_log().compiled_count(), 1);
}

#[test]
fn test_overflow_falls_back_to_big_integers() {
    let (interpreted, compiled) = run_both(&demos::power_of_three(100), 10);
    let expected = "515377520732011331036461129765621272702107522001";
    assert_eq!(interpreted.result.unwrap(), expected);
    assert_eq!(compiled.result.unwrap(), expected);
    assert!(compiled.events[0].is_compiled());
}

#[test]
fn test_generic_arithmetic_matches() {
    let (interpreted, compiled) = run_both(&demos::triple_sum(4_000), 50);
    assert_eq!(interpreted.result.unwrap(), compiled.result.unwrap());
}

#[test]
fn test_float_accumulation_matches() {
    // x = 0.0; i = 0; while i < 1000: x = x + 0.1; i += 1; return x
    let mut chunk = BytecodeChunk::new("floats").with_registers(5, 0);
    let tenth = chunk.add_constant(bytecode_system::Constant::Float(0.1));
    chunk.emit(Opcode::LoadConst { dst: r(4), index: tenth });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: 1000 });
    chunk.emit(Opcode::Binary { op: BinaryOp::Sub, dst: r(0), lhs: r(4), rhs: r(4) });
    chunk.emit(Opcode::FastIntLt { dst: r(3), lhs: r(1), rhs: r(2) });
    chunk.emit(Opcode::JumpIfFalse { cond: r(3), target: 9 });
    chunk.emit(Opcode::Binary { op: BinaryOp::Add, dst: r(0), lhs: r(0), rhs: r(4) });
    chunk.emit(Opcode::IncLocal { reg: r(1) });
    chunk.emit(Opcode::Jump { target: 4 });
    chunk.emit(Opcode::Return { src: r(0) });

    let (interpreted, compiled) = run_both(&chunk, 10);
    assert_eq!(interpreted.result.unwrap(), compiled.result.unwrap());
    assert_eq!(compiled.events.len(), 1);
}

#[test]
fn test_try_block_keeps_loop_interpreted() {
    let (interpreted, compiled) = run_both(&demos::guarded(500), 100);
    assert_eq!(interpreted.result.unwrap(), "500");
    assert_eq!(compiled.result.unwrap(), "500");
    assert_eq!(compiled.events.len(), 1);
    assert!(!compiled.events[0].is_compiled());
    assert_eq!(compiled.events[0].header(), 2);
}

#[test]
fn test_rejected_loop_is_not_retried() {
    let mut vm = jit_vm(10);
    let f = vm.load(demos::guarded(100)).unwrap();
    for _ in 0..3 {
        assert_eq!(vm.execute(&f, &[]).unwrap(), TaggedValue::Int(100));
    }
    assert_eq!(vm.jit_events().len(), 1);
    assert_eq!(f.existing_record(2).unwrap().state(), LoopState::NotPromotable);
}

#[test]
fn test_recursion_matches() {
    let (interpreted, compiled) = run_both(&demos::fib(20), 10);
    assert_eq!(interpreted.result.unwrap(), "6765");
    assert_eq!(compiled.result.unwrap(), "6765");
}

#[test]
fn test_pool_identity() {
    let pool = SmallValuePool::global();
    assert!(std::ptr::eq(pool.int(5).unwrap(), pool.int(5).unwrap()));
    assert_eq!(*pool.int(5).unwrap(), make_int(5));
    assert_eq!(make_int(5), make_int(5));
}
