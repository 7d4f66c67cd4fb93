//! Error propagation properties
//!
//! Errors raised inside compiled loops must unwind exactly like errors
//! raised by the interpreter: same kind, same handler, same register state.

use bytecode_system::{BinaryOp, BytecodeChunk, Constant, Opcode, RegisterId};
use core_types::ErrorKind;
use integration_tests::{interpreted_vm, jit_vm, run_both, run_on};
use interpreter::{Vm, VmConfig};

fn r(index: u32) -> RegisterId {
    RegisterId(index)
}

/// ```text
/// i = 0
/// try:
///     while i < 1000: 1000 // (600 - i); i += 1
/// except: return i
/// return i
/// ```
fn fails_at_600() -> BytecodeChunk {
    let mut chunk = BytecodeChunk::new("fails").with_registers(6, 0);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 1000 });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: 600 });
    chunk.emit(Opcode::PushTry { handler: 12, dst: r(5) });
    chunk.emit(Opcode::FastIntLt { dst: r(3), lhs: r(0), rhs: r(1) });
    chunk.emit(Opcode::JumpIfFalse { cond: r(3), target: 10 });
    chunk.emit(Opcode::Binary { op: BinaryOp::Sub, dst: r(4), lhs: r(2), rhs: r(0) });
    chunk.emit(Opcode::Binary { op: BinaryOp::FloorDiv, dst: r(4), lhs: r(1), rhs: r(4) });
    chunk.emit(Opcode::IncLocal { reg: r(0) });
    chunk.emit(Opcode::Jump { target: 4 });
    chunk.emit(Opcode::PopTry);
    chunk.emit(Opcode::Return { src: r(0) });
    chunk.emit(Opcode::Return { src: r(0) });
    chunk
}

/// `def f(): return f()` called from the top level
fn runaway() -> BytecodeChunk {
    let mut body = BytecodeChunk::new("f").with_registers(2, 0);
    let name = body.add_name("f");
    body.emit(Opcode::LoadGlobal { dst: r(0), name });
    body.emit(Opcode::Call { dst: r(1), callee: r(0), args: r(1), argc: 0 });
    body.emit(Opcode::Return { src: r(1) });

    let mut chunk = BytecodeChunk::new("main").with_registers(2, 0);
    let name = chunk.add_name("f");
    let function = chunk.add_nested_function(body);
    chunk.emit(Opcode::MakeFunction { dst: r(0), function });
    chunk.emit(Opcode::StoreGlobal { name, src: r(0) });
    chunk.emit(Opcode::Call { dst: r(1), callee: r(0), args: r(1), argc: 0 });
    chunk.emit(Opcode::Return { src: r(1) });
    chunk
}

/// Address of the exit branch in [`oversized_after`]
const EXIT_BRANCH: usize = 6;

/// ```text
/// i = 0
/// while i < 1000:
///     count = (i // 150) * 2**62
///     <body>
///     i += 1
/// return i
/// ```
///
/// `count` is 0 until iteration 150, long after the loop is promoted at a
/// threshold of 100. `setup` writes r4; `body` may use r6 (count), r4 and
/// r7..r11.
fn oversized_after(
    name: &str,
    setup: impl FnOnce(&mut BytecodeChunk) -> Opcode,
    body: impl FnOnce(&mut BytecodeChunk) -> Vec<Opcode>,
) -> BytecodeChunk {
    let mut chunk = BytecodeChunk::new(name).with_registers(12, 0);
    let setup = setup(&mut chunk);
    let body = body(&mut chunk);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 1000 });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: 150 });
    chunk.emit(Opcode::LoadInt { dst: r(3), value: 1 << 62 });
    chunk.emit(setup);
    chunk.emit(Opcode::FastIntLt { dst: r(5), lhs: r(0), rhs: r(1) });
    chunk.emit(Opcode::Nop);
    chunk.emit(Opcode::Binary { op: BinaryOp::FloorDiv, dst: r(6), lhs: r(0), rhs: r(2) });
    chunk.emit(Opcode::Binary { op: BinaryOp::Mul, dst: r(6), lhs: r(6), rhs: r(3) });
    for opcode in body {
        chunk.emit(opcode);
    }
    chunk.emit(Opcode::IncLocal { reg: r(0) });
    chunk.emit(Opcode::Jump { target: 5 });
    let exit = chunk.emit(Opcode::Return { src: r(0) });
    chunk.instructions[EXIT_BRANCH].opcode = Opcode::JumpIfFalse {
        cond: r(5),
        target: exit as u32,
    };
    chunk
}

/// Both modes fail with the same error at the same address, and the
/// compiled run really was in native code when it failed.
fn assert_fails_alike(chunk: BytecodeChunk, kind: ErrorKind) {
    let (interpreted, compiled) = run_both(&chunk, 100);
    let interpreted = interpreted.result.unwrap_err();
    assert_eq!(interpreted.kind, kind, "{}", interpreted);
    assert!(compiled.events.iter().any(|e| e.is_compiled()));
    let compiled = compiled.result.unwrap_err();
    assert_eq!(compiled.kind, kind, "{}", compiled);
    assert_eq!(compiled.message, interpreted.message);
    assert_eq!(compiled.trace[0].pc, interpreted.trace[0].pc);
}

#[test]
fn test_oversized_string_repetition() {
    let chunk = oversized_after(
        "repeat_str",
        |chunk| {
            let index = chunk.add_constant(Constant::Str("ab".to_string()));
            Opcode::LoadConst { dst: r(4), index }
        },
        |_| vec![Opcode::Binary { op: BinaryOp::Mul, dst: r(7), lhs: r(4), rhs: r(6) }],
    );
    assert_fails_alike(chunk, ErrorKind::ValueError);
}

#[test]
fn test_oversized_list_repetition() {
    let chunk = oversized_after(
        "repeat_list",
        |_| Opcode::BuildList { dst: r(4), start: r(0), count: 1 },
        |_| vec![Opcode::Binary { op: BinaryOp::Mul, dst: r(7), lhs: r(6), rhs: r(4) }],
    );
    assert_fails_alike(chunk, ErrorKind::ValueError);
}

#[test]
fn test_oversized_shift_and_pow() {
    for op in [BinaryOp::Shl, BinaryOp::Pow] {
        let chunk = oversized_after(
            "huge_int",
            |_| Opcode::LoadInt { dst: r(4), value: 3 },
            |_| vec![Opcode::Binary { op, dst: r(7), lhs: r(4), rhs: r(6) }],
        );
        assert_fails_alike(chunk, ErrorKind::ValueError);
    }
}

#[test]
fn test_range_longer_than_i64_has_no_len() {
    // len(range(-2 * count, 2 * count - 1))
    let chunk = oversized_after(
        "range_len",
        |_| Opcode::LoadInt { dst: r(4), value: 1 },
        |chunk| {
            let range = chunk.add_name("range");
            let len = chunk.add_name("len");
            vec![
                Opcode::LoadGlobal { dst: r(7), name: range },
                Opcode::LoadInt { dst: r(8), value: 0 },
                Opcode::Binary { op: BinaryOp::Sub, dst: r(8), lhs: r(8), rhs: r(6) },
                Opcode::Binary { op: BinaryOp::Sub, dst: r(8), lhs: r(8), rhs: r(6) },
                Opcode::Binary { op: BinaryOp::Sub, dst: r(9), lhs: r(6), rhs: r(4) },
                Opcode::Binary { op: BinaryOp::Add, dst: r(9), lhs: r(9), rhs: r(6) },
                Opcode::Call { dst: r(10), callee: r(7), args: r(8), argc: 2 },
                Opcode::LoadGlobal { dst: r(11), name: len },
                Opcode::Call { dst: r(11), callee: r(11), args: r(10), argc: 1 },
            ]
        },
    );
    assert_fails_alike(chunk, ErrorKind::ValueError);
}

#[test]
fn test_handler_outside_compiled_loop_sees_loop_state() {
    let (interpreted, compiled) = run_both(&fails_at_600(), 100);
    assert_eq!(interpreted.result.unwrap(), "600");
    assert_eq!(compiled.result.unwrap(), "600");
    assert_eq!(compiled.events.len(), 1);
    assert!(compiled.events[0].is_compiled());
    assert_eq!(compiled.events[0].header(), 4);
}

#[test]
fn test_uncaught_error_in_compiled_loop() {
    let mut chunk = fails_at_600();
    // Drop the handler: PushTry and PopTry become no-ops.
    chunk.instructions[3].opcode = Opcode::Jump { target: 4 };
    chunk.instructions[10].opcode = Opcode::Jump { target: 11 };

    for mut vm in [interpreted_vm(), jit_vm(100)] {
        let err = run_on(&mut vm, chunk.clone()).result.unwrap_err();
        assert_eq!(err.kind, ErrorKind::DivisionByZero);
        assert_eq!(err.trace.len(), 1);
        assert_eq!(err.trace[0].function_name, "fails");
        assert_eq!(err.trace[0].pc, 7);
    }
}

#[test]
fn test_runaway_recursion_overflows() {
    let mut vm = Vm::with_config(VmConfig::default().with_max_call_depth(50));
    let err = run_on(&mut vm, runaway()).result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::StackOverflow);
    assert_eq!(err.trace.len(), 50);
    assert_eq!(err.trace.last().unwrap().function_name, "main");
    assert!(err.traceback().contains("RecursionError"));
}

#[test]
fn test_vm_recovers_after_overflow() {
    let mut vm = Vm::with_config(VmConfig::default().with_max_call_depth(50));
    assert!(run_on(&mut vm, runaway()).result.is_err());
    assert_eq!(vm.call_depth(), 0);
    let outcome = run_on(&mut vm, basalt_cli::demos::fib(10));
    assert_eq!(outcome.result.unwrap(), "55");
}

#[test]
fn test_invalid_bytecode_is_rejected_at_load() {
    let mut chunk = BytecodeChunk::new("broken").with_registers(1, 0);
    chunk.emit(Opcode::Jump { target: 40 });
    let err = interpreted_vm().load(chunk).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidBytecode);
}
