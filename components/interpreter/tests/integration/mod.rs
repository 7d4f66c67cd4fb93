//! Integration tests for hot-loop promotion
//!
//! Tests the interaction between the dispatch loop, loop records, the event
//! log and a [`LoopCompiler`]. The compilers here are stand-ins: one that
//! always refuses, and one whose "native" code drives the loop through
//! `jit_rt_exec`, which exercises the whole entry/exit protocol without a
//! code generator.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytecode_system::{BytecodeChunk, Opcode, RegisterId};
use core_types::{ErrorKind, LoopState, RuntimeError, TaggedValue};
use interpreter::jit_abi::{EXIT_FAULT, JIT_BRANCH, JIT_NEXT};
use interpreter::{
    jit_rt_exec, CompiledLoop, JitContext, JitEvent, JitEventLog, JitSlot, LoopCompiler,
    LoopRequest, RegisterMap, Vm, VmConfig,
};

fn r(index: u32) -> RegisterId {
    RegisterId(index)
}

/// Header of the loop built by [`counting_loop`]
const HEADER: usize = 3;
/// Exit address of the loop built by [`counting_loop`]
const EXIT: usize = 8;

/// `total = 0; i = 0; while i < n: total += i; i += 1; return total`
///
/// The back-edge at pc 7 runs exactly `n` times.
fn counting_loop(name: &str, n: i64) -> BytecodeChunk {
    let mut chunk = BytecodeChunk::new(name).with_registers(4, 0);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: n });
    chunk.emit(Opcode::FastIntLt { dst: r(3), lhs: r(1), rhs: r(2) });
    chunk.emit(Opcode::JumpIfFalse { cond: r(3), target: EXIT as u32 });
    chunk.emit(Opcode::LoadAddStore { reg: r(0), src: r(1) });
    chunk.emit(Opcode::IncLocal { reg: r(1) });
    chunk.emit(Opcode::Jump { target: HEADER as u32 });
    chunk.emit(Opcode::Return { src: r(0) });
    chunk
}

/// Runs the body of [`counting_loop`] one helper call per instruction.
unsafe extern "C" fn helper_driven_entry(ctx: *mut JitContext, slots: *mut JitSlot) -> i64 {
    let mut pc = HEADER;
    loop {
        let status = jit_rt_exec(ctx, slots, pc as i64);
        pc = match (pc, status) {
            (_, JIT_NEXT) if pc < 7 => pc + 1,
            (4, JIT_BRANCH) => return EXIT as i64,
            (7, JIT_BRANCH) => HEADER,
            _ => return EXIT_FAULT,
        };
    }
}

#[derive(Default)]
struct HelperDriven {
    calls: AtomicUsize,
}

impl LoopCompiler for HelperDriven {
    fn name(&self) -> &str {
        "helper-driven"
    }

    fn compile(&self, request: &LoopRequest<'_>) -> Result<CompiledLoop, RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.range.header, HEADER);
        let map = RegisterMap::new(request.range.registers(request.chunk));
        // SAFETY: the entry only touches the registers of `counting_loop`
        Ok(unsafe { CompiledLoop::new(helper_driven_entry, request.range, map, Box::new(())) })
    }
}

struct Refusing;

impl LoopCompiler for Refusing {
    fn name(&self) -> &str {
        "refusing"
    }

    fn compile(&self, _request: &LoopRequest<'_>) -> Result<CompiledLoop, RuntimeError> {
        Err(RuntimeError::new(
            ErrorKind::JitCompileUnsupported,
            "nothing is supported",
        ))
    }
}

struct Panicking;

impl LoopCompiler for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn compile(&self, _request: &LoopRequest<'_>) -> Result<CompiledLoop, RuntimeError> {
        panic!("backend bug")
    }
}

fn vm_with(compiler: Arc<dyn LoopCompiler>, threshold: u32) -> Vm {
    Vm::with_compiler(VmConfig::default().with_threshold(threshold), compiler)
}

fn sum_below(n: i64) -> i64 {
    (0..n).sum()
}

#[test]
fn test_promotion_preserves_result() {
    let compiler = Arc::new(HelperDriven::default());
    let mut vm = vm_with(compiler.clone(), 10);
    let f = vm.load(counting_loop("sum", 1000)).unwrap();

    assert_eq!(vm.execute(&f, &[]).unwrap(), TaggedValue::Int(sum_below(1000)));
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);

    let events = vm.jit_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].to_string(), "JIT: Compiled loop sum at PC 3");
    assert_eq!(
        events[0],
        JitEvent::Compiled {
            function: "sum".to_string(),
            header: HEADER,
            back_edge: 7,
            registers: 4,
        }
    );
    let record = f.existing_record(HEADER).unwrap();
    assert_eq!(record.state(), LoopState::Installed);
}

#[test]
fn test_installed_code_is_reused_across_runs() {
    let compiler = Arc::new(HelperDriven::default());
    let mut vm = vm_with(compiler.clone(), 10);
    let f = vm.load(counting_loop("sum", 200)).unwrap();

    for _ in 0..3 {
        assert_eq!(vm.execute(&f, &[]).unwrap(), TaggedValue::Int(sum_below(200)));
    }
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(vm.event_log().compiled_count(), 1);
}

#[test]
fn test_threshold_is_exact() {
    let threshold = 25;

    let mut vm = vm_with(Arc::new(HelperDriven::default()), threshold);
    let below = vm.load(counting_loop("below", i64::from(threshold) - 1)).unwrap();
    assert_eq!(
        vm.execute(&below, &[]).unwrap(),
        TaggedValue::Int(sum_below(i64::from(threshold) - 1))
    );
    assert!(vm.jit_events().is_empty());
    assert_eq!(below.existing_record(HEADER).unwrap().state(), LoopState::Counting);

    let at = vm.load(counting_loop("at", i64::from(threshold))).unwrap();
    assert_eq!(
        vm.execute(&at, &[]).unwrap(),
        TaggedValue::Int(sum_below(i64::from(threshold)))
    );
    assert_eq!(vm.event_log().compiled_count(), 1);
    assert_eq!(vm.jit_events()[0].to_string(), "JIT: Compiled loop at at PC 3");
}

#[test]
fn test_rejected_loop_stays_interpreted() {
    let mut vm = vm_with(Arc::new(Refusing), 10);
    let f = vm.load(counting_loop("sum", 500)).unwrap();

    for _ in 0..2 {
        assert_eq!(vm.execute(&f, &[]).unwrap(), TaggedValue::Int(sum_below(500)));
    }

    let events = vm.jit_events();
    assert_eq!(events.len(), 1, "a rejected loop is never retried");
    assert!(!events[0].is_compiled());
    assert_eq!(
        events[0].to_string(),
        "JIT: Rejected loop sum at PC 3: nothing is supported"
    );
    assert_eq!(
        f.existing_record(HEADER).unwrap().state(),
        LoopState::NotPromotable
    );
}

#[test]
fn test_compiler_panic_is_contained() {
    let mut vm = vm_with(Arc::new(Panicking), 10);
    let f = vm.load(counting_loop("sum", 100)).unwrap();

    assert_eq!(vm.execute(&f, &[]).unwrap(), TaggedValue::Int(sum_below(100)));
    assert_eq!(
        vm.jit_events(),
        vec![JitEvent::Rejected {
            function: "sum".to_string(),
            header: HEADER,
            reason: "loop compiler panicked".to_string(),
        }]
    );
}

#[test]
fn test_disabled_jit_never_compiles() {
    let compiler = Arc::new(HelperDriven::default());
    let config = VmConfig::default().with_threshold(1).with_jit(false);
    let mut vm = Vm::with_compiler(config, compiler.clone());
    let f = vm.load(counting_loop("sum", 100)).unwrap();

    assert_eq!(vm.execute(&f, &[]).unwrap(), TaggedValue::Int(sum_below(100)));
    assert!(vm.jit_events().is_empty());
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_event_log_is_shared_with_embedder() {
    let log = JitEventLog::new();
    let compiler: Arc<dyn LoopCompiler> = Arc::new(HelperDriven::default());
    let mut vm = Vm::with_event_log(
        VmConfig::default().with_threshold(5),
        Some(compiler),
        log.clone(),
    );
    let f = vm.load(counting_loop("sum", 50)).unwrap();
    vm.execute(&f, &[]).unwrap();

    assert_eq!(log.compiled_count(), 1);
    assert_eq!(log.snapshot()[0].header(), HEADER);
}

#[test]
fn test_function_shared_between_vms_compiles_once() {
    let compiler = Arc::new(HelperDriven::default());
    let mut first = vm_with(compiler.clone(), 10);
    let f = first.load(counting_loop("sum", 100)).unwrap();
    first.execute(&f, &[]).unwrap();

    let mut second = vm_with(compiler.clone(), 10);
    assert_eq!(second.execute(&f, &[]).unwrap(), TaggedValue::Int(sum_below(100)));

    assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.jit_events().len(), 1);
    assert!(second.jit_events().is_empty());
}

#[test]
fn test_helper_error_unwinds_from_fault_pc() {
    // i starts at -1 and the body computes n / i, so the first iteration is
    // interpreted and the second divides by zero inside compiled code.
    let mut chunk = counting_loop("divide", 100);
    chunk.instructions[1].opcode = Opcode::LoadInt { dst: r(1), value: -1 };
    chunk.instructions[5].opcode = Opcode::Binary {
        op: bytecode_system::BinaryOp::Div,
        dst: r(0),
        lhs: r(2),
        rhs: r(1),
    };

    let mut vm = vm_with(Arc::new(HelperDriven::default()), 1);
    let f = vm.load(chunk).unwrap();
    let err = vm.execute(&f, &[]).unwrap_err();

    assert_eq!(err.kind, ErrorKind::DivisionByZero);
    assert_eq!(err.trace.len(), 1);
    assert_eq!(err.trace[0].function_name, "divide");
    assert_eq!(err.trace[0].pc, 5);
    assert_eq!(vm.event_log().compiled_count(), 1);
    assert_eq!(vm.call_depth(), 0);
}
