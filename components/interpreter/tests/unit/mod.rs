//! Unit tests for the dispatch loop and the embedding API

use builtins::format;
use bytecode_system::{BinaryOp, BytecodeChunk, Constant, Opcode, RegisterId};
use core_types::{ErrorKind, StackFrame, TaggedValue};
use interpreter::{Vm, VmConfig};

fn r(index: u32) -> RegisterId {
    RegisterId(index)
}

fn capturing_vm() -> Vm {
    Vm::with_config(VmConfig::default().with_capture_output(true))
}

fn run(chunk: BytecodeChunk) -> (Vm, Result<TaggedValue, core_types::RuntimeError>) {
    let mut vm = capturing_vm();
    let f = vm.load(chunk).unwrap();
    let result = vm.execute(&f, &[]);
    (vm, result)
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_complex_arithmetic() {
    // (10 + 5) * 3 - 2 = 43
    let mut chunk = BytecodeChunk::new("main").with_registers(3, 0);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 10 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 5 });
    chunk.emit(Opcode::FastIntAdd { dst: r(0), lhs: r(0), rhs: r(1) });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 3 });
    chunk.emit(Opcode::FastIntMul { dst: r(0), lhs: r(0), rhs: r(1) });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: 2 });
    chunk.emit(Opcode::FastIntSub { dst: r(0), lhs: r(0), rhs: r(2) });
    chunk.emit(Opcode::Return { src: r(0) });

    let (_, result) = run(chunk);
    assert_eq!(result.unwrap(), TaggedValue::Int(43));
}

#[test]
fn test_true_division_is_float() {
    let mut chunk = BytecodeChunk::new("main").with_registers(2, 0);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 7 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 2 });
    chunk.emit(Opcode::LoadDivStore { reg: r(0), src: r(1) });
    chunk.emit(Opcode::Return { src: r(0) });

    let (_, result) = run(chunk);
    assert_eq!(result.unwrap(), TaggedValue::Float(3.5));
}

#[test]
fn test_increment_past_i64_max_promotes_to_big_int() {
    let mut chunk = BytecodeChunk::new("main").with_registers(1, 0);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: i64::MAX });
    chunk.emit(Opcode::IncLocal { reg: r(0) });
    chunk.emit(Opcode::Return { src: r(0) });

    let (vm, result) = run(chunk);
    assert_eq!(vm.repr(result.unwrap()).unwrap(), "9223372036854775808");
}

#[test]
fn test_string_concatenation_falls_back_to_helpers() {
    let mut chunk = BytecodeChunk::new("main").with_registers(3, 0);
    let a = chunk.add_constant(Constant::Str("foo".to_string()));
    let b = chunk.add_constant(Constant::Str("bar".to_string()));
    chunk.emit(Opcode::LoadConst { dst: r(0), index: a });
    chunk.emit(Opcode::LoadConst { dst: r(1), index: b });
    chunk.emit(Opcode::LoadAddStore { reg: r(0), src: r(1) });
    chunk.emit(Opcode::Return { src: r(0) });

    let (vm, result) = run(chunk);
    assert_eq!(vm.to_str(result.unwrap()).unwrap(), "foobar");
}

#[test]
fn test_build_string() {
    let mut chunk = BytecodeChunk::new("main").with_registers(3, 0);
    let label = chunk.add_constant(Constant::Str("x=".to_string()));
    let value = chunk.add_constant(Constant::Float(1.5));
    chunk.emit(Opcode::LoadConst { dst: r(0), index: label });
    chunk.emit(Opcode::LoadConst { dst: r(1), index: value });
    chunk.emit(Opcode::BuildString { dst: r(2), start: r(0), count: 2 });
    chunk.emit(Opcode::Return { src: r(2) });

    let (vm, result) = run(chunk);
    assert_eq!(vm.to_str(result.unwrap()).unwrap(), "x=1.5");
}

// ============================================================================
// Globals, builtins, iteration
// ============================================================================

#[test]
fn test_globals_round_trip() {
    let mut chunk = BytecodeChunk::new("main").with_registers(1, 0);
    let name = chunk.add_name("answer");
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 42 });
    chunk.emit(Opcode::StoreGlobal { name, src: r(0) });
    chunk.emit(Opcode::LoadGlobal { dst: r(0), name });
    chunk.emit(Opcode::Return { src: r(0) });

    let (vm, result) = run(chunk);
    assert_eq!(result.unwrap(), TaggedValue::Int(42));
    assert_eq!(vm.get_global("answer"), Some(TaggedValue::Int(42)));
}

#[test]
fn test_undefined_name() {
    let mut chunk = BytecodeChunk::new("main").with_registers(1, 0);
    let name = chunk.add_name("nope");
    chunk.emit(Opcode::Nop);
    chunk.emit(Opcode::LoadGlobal { dst: r(0), name });
    chunk.emit(Opcode::Return { src: r(0) });

    let (_, result) = run(chunk);
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameNotFound);
    assert_eq!(err.message, "name 'nope' is not defined");
    assert_eq!(err.trace, vec![StackFrame::new("main", 1)]);
}

#[test]
fn test_print_is_captured() {
    let mut chunk = BytecodeChunk::new("main").with_registers(3, 0);
    let print = chunk.add_name("print");
    let hi = chunk.add_constant(Constant::Str("hi".to_string()));
    chunk.emit(Opcode::LoadGlobal { dst: r(0), name: print });
    chunk.emit(Opcode::LoadConst { dst: r(1), index: hi });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: 3 });
    chunk.emit(Opcode::Call { dst: r(0), callee: r(0), args: r(1), argc: 2 });
    chunk.emit(Opcode::ReturnNone);

    let (mut vm, result) = run(chunk);
    assert_eq!(result.unwrap(), TaggedValue::None);
    assert_eq!(vm.output(), "hi 3\n");
    assert_eq!(vm.take_output(), "hi 3\n");
    assert_eq!(vm.output(), "");
}

#[test]
fn test_for_iter_over_range() {
    // total = 0; for i in range(10): total += i
    let mut chunk = BytecodeChunk::new("main").with_registers(3, 0);
    let range = chunk.add_name("range");
    chunk.emit(Opcode::LoadGlobal { dst: r(0), name: range });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 10 });
    chunk.emit(Opcode::Call { dst: r(0), callee: r(0), args: r(1), argc: 1 });
    chunk.emit(Opcode::GetIter { dst: r(0), src: r(0) });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: 0 });
    chunk.emit(Opcode::ForIter { dst: r(1), iter: r(0), exit: 8 });
    chunk.emit(Opcode::LoadAddStore { reg: r(2), src: r(1) });
    chunk.emit(Opcode::Jump { target: 5 });
    chunk.emit(Opcode::Return { src: r(2) });

    let (_, result) = run(chunk);
    assert_eq!(result.unwrap(), TaggedValue::Int(45));
}

#[test]
fn test_containers() {
    let mut chunk = BytecodeChunk::new("main").with_registers(5, 0);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 1 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 2 });
    chunk.emit(Opcode::BuildList { dst: r(2), start: r(0), count: 2 });
    chunk.emit(Opcode::LoadInt { dst: r(3), value: 3 });
    chunk.emit(Opcode::Append { list: r(2), src: r(3) });
    chunk.emit(Opcode::LoadInt { dst: r(4), value: -1 });
    chunk.emit(Opcode::GetItem { dst: r(4), container: r(2), key: r(4) });
    chunk.emit(Opcode::Len { dst: r(0), src: r(2) });
    chunk.emit(Opcode::BuildTuple { dst: r(0), start: r(0), count: 1 });
    chunk.emit(Opcode::BuildList { dst: r(1), start: r(2), count: 3 });
    chunk.emit(Opcode::Return { src: r(1) });

    let (vm, result) = run(chunk);
    assert_eq!(vm.repr(result.unwrap()).unwrap(), "[[1, 2, 3], 3, 3]");
}

#[test]
fn test_dict_build_and_lookup() {
    let mut chunk = BytecodeChunk::new("main").with_registers(5, 0);
    let a = chunk.add_constant(Constant::Str("a".to_string()));
    let b = chunk.add_constant(Constant::Str("b".to_string()));
    chunk.emit(Opcode::LoadConst { dst: r(0), index: a });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 1 });
    chunk.emit(Opcode::LoadConst { dst: r(2), index: b });
    chunk.emit(Opcode::LoadInt { dst: r(3), value: 2 });
    chunk.emit(Opcode::BuildDict { dst: r(4), start: r(0), count: 2 });
    chunk.emit(Opcode::GetItem { dst: r(0), container: r(4), key: r(2) });
    chunk.emit(Opcode::Return { src: r(0) });

    let (_, result) = run(chunk);
    assert_eq!(result.unwrap(), TaggedValue::Int(2));
}

// ============================================================================
// Functions
// ============================================================================

fn fib_program(n: i64) -> BytecodeChunk {
    let mut fib = BytecodeChunk::new("fib").with_registers(6, 1);
    let name = fib.add_name("fib");
    fib.emit(Opcode::LoadInt { dst: r(1), value: 2 });
    fib.emit(Opcode::FastIntLt { dst: r(2), lhs: r(0), rhs: r(1) });
    fib.emit(Opcode::JumpIfFalse { cond: r(2), target: 4 });
    fib.emit(Opcode::Return { src: r(0) });
    fib.emit(Opcode::LoadGlobal { dst: r(3), name });
    fib.emit(Opcode::LoadInt { dst: r(1), value: 1 });
    fib.emit(Opcode::Binary { op: BinaryOp::Sub, dst: r(4), lhs: r(0), rhs: r(1) });
    fib.emit(Opcode::Call { dst: r(5), callee: r(3), args: r(4), argc: 1 });
    fib.emit(Opcode::LoadInt { dst: r(1), value: 2 });
    fib.emit(Opcode::Binary { op: BinaryOp::Sub, dst: r(4), lhs: r(0), rhs: r(1) });
    fib.emit(Opcode::Call { dst: r(4), callee: r(3), args: r(4), argc: 1 });
    fib.emit(Opcode::Binary { op: BinaryOp::Add, dst: r(5), lhs: r(5), rhs: r(4) });
    fib.emit(Opcode::Return { src: r(5) });

    let mut main = BytecodeChunk::new("main").with_registers(2, 0);
    let name = main.add_name("fib");
    let index = main.add_nested_function(fib);
    main.emit(Opcode::MakeFunction { dst: r(0), function: index });
    main.emit(Opcode::StoreGlobal { name, src: r(0) });
    main.emit(Opcode::LoadInt { dst: r(1), value: n });
    main.emit(Opcode::Call { dst: r(1), callee: r(0), args: r(1), argc: 1 });
    main.emit(Opcode::Return { src: r(1) });
    main
}

#[test]
fn test_recursive_calls() {
    let (vm, result) = run(fib_program(20));
    assert_eq!(result.unwrap(), TaggedValue::Int(6765));
    assert_eq!(vm.call_depth(), 0);
}

#[test]
fn test_call_value_on_loaded_function() {
    let (mut vm, result) = run(fib_program(1));
    assert_eq!(result.unwrap(), TaggedValue::Int(1));

    let fib = vm.get_global("fib").unwrap();
    assert_eq!(vm.repr(fib).unwrap(), "<function fib>");
    assert_eq!(
        vm.call_value(fib, &[TaggedValue::Int(10)]).unwrap(),
        TaggedValue::Int(55)
    );
}

#[test]
fn test_arity_mismatch() {
    let mut main = BytecodeChunk::new("main").with_registers(1, 0);
    let mut f = BytecodeChunk::new("f").with_registers(1, 1);
    f.emit(Opcode::Return { src: r(0) });
    let index = main.add_nested_function(f);
    main.emit(Opcode::MakeFunction { dst: r(0), function: index });
    main.emit(Opcode::Call { dst: r(0), callee: r(0), args: r(0), argc: 0 });
    main.emit(Opcode::Return { src: r(0) });

    let (_, result) = run(main);
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "f() takes 1 positional argument but 0 were given");
}

#[test]
fn test_deep_recursion_is_stack_overflow() {
    let mut down = BytecodeChunk::new("down").with_registers(2, 0);
    let name = down.add_name("down");
    down.emit(Opcode::LoadGlobal { dst: r(0), name });
    down.emit(Opcode::Call { dst: r(1), callee: r(0), args: r(1), argc: 0 });
    down.emit(Opcode::Return { src: r(1) });

    let mut main = BytecodeChunk::new("main").with_registers(1, 0);
    let name = main.add_name("down");
    let index = main.add_nested_function(down);
    main.emit(Opcode::MakeFunction { dst: r(0), function: index });
    main.emit(Opcode::StoreGlobal { name, src: r(0) });
    main.emit(Opcode::Call { dst: r(0), callee: r(0), args: r(0), argc: 0 });
    main.emit(Opcode::Return { src: r(0) });

    let mut vm = Vm::with_config(VmConfig::default().with_max_call_depth(50));
    let f = vm.load(main).unwrap();
    let err = vm.execute(&f, &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StackOverflow);
    assert_eq!(err.message, "maximum recursion depth exceeded");
    assert_eq!(err.trace.len(), 50);
    assert_eq!(err.trace[0], StackFrame::new("down", 1));
    assert_eq!(err.trace[49], StackFrame::new("main", 2));
    assert_eq!(vm.call_depth(), 0);
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn test_handler_catches_division_by_zero() {
    let mut chunk = BytecodeChunk::new("main").with_registers(4, 0);
    chunk.emit(Opcode::PushTry { handler: 6, dst: r(3) });
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 1 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 0 });
    chunk.emit(Opcode::Binary { op: BinaryOp::Div, dst: r(2), lhs: r(0), rhs: r(1) });
    chunk.emit(Opcode::PopTry);
    chunk.emit(Opcode::Return { src: r(2) });
    chunk.emit(Opcode::Return { src: r(3) });

    let (vm, result) = run(chunk);
    let exception = result.unwrap();
    assert_eq!(format::type_name(vm.heap(), exception).unwrap(), "ZeroDivisionError");
}

fn raising_function() -> BytecodeChunk {
    let mut boom = BytecodeChunk::new("boom").with_registers(2, 0);
    let value_error = boom.add_name("ValueError");
    let message = boom.add_constant(Constant::Str("bad".to_string()));
    boom.emit(Opcode::LoadGlobal { dst: r(0), name: value_error });
    boom.emit(Opcode::LoadConst { dst: r(1), index: message });
    boom.emit(Opcode::Call { dst: r(0), callee: r(0), args: r(1), argc: 1 });
    boom.emit(Opcode::Raise { src: r(0) });
    boom
}

#[test]
fn test_uncaught_raise_carries_trace() {
    let mut main = BytecodeChunk::new("main").with_registers(1, 0);
    let index = main.add_nested_function(raising_function());
    main.emit(Opcode::MakeFunction { dst: r(0), function: index });
    main.emit(Opcode::Call { dst: r(0), callee: r(0), args: r(0), argc: 0 });
    main.emit(Opcode::Return { src: r(0) });

    let (vm, result) = run(main);
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::UncaughtException);
    assert_eq!(err.message, "ValueError: bad");
    assert_eq!(
        err.trace,
        vec![StackFrame::new("boom", 3), StackFrame::new("main", 1)]
    );
    let exception = err.exception.unwrap();
    assert_eq!(vm.to_str(exception).unwrap(), "bad");
}

#[test]
fn test_caller_handler_catches_callee_error() {
    let mut main = BytecodeChunk::new("main").with_registers(2, 0);
    let index = main.add_nested_function(raising_function());
    main.emit(Opcode::PushTry { handler: 5, dst: r(1) });
    main.emit(Opcode::MakeFunction { dst: r(0), function: index });
    main.emit(Opcode::Call { dst: r(0), callee: r(0), args: r(0), argc: 0 });
    main.emit(Opcode::PopTry);
    main.emit(Opcode::ReturnNone);
    main.emit(Opcode::Return { src: r(1) });

    let (vm, result) = run(main);
    let exception = result.unwrap();
    assert_eq!(format::type_name(vm.heap(), exception).unwrap(), "ValueError");
    assert_eq!(vm.call_depth(), 0);
}

// ============================================================================
// Classes
// ============================================================================

fn point_class(main: &mut BytecodeChunk) {
    let mut init = BytecodeChunk::new("__init__").with_registers(2, 2);
    let x = init.add_name("x");
    init.emit(Opcode::SetAttr { obj: r(0), name: x, src: r(1) });
    init.emit(Opcode::ReturnNone);

    let mut get = BytecodeChunk::new("get").with_registers(2, 1);
    let x = get.add_name("x");
    get.emit(Opcode::GetAttr { dst: r(1), obj: r(0), name: x });
    get.emit(Opcode::Return { src: r(1) });

    let init_name = main.add_name("__init__");
    let get_name = main.add_name("get");
    let class_name = main.add_name("Point");
    let init = main.add_nested_function(init);
    let get = main.add_nested_function(get);
    main.emit(Opcode::LoadConst { dst: r(1), index: init_name });
    main.emit(Opcode::MakeFunction { dst: r(2), function: init });
    main.emit(Opcode::LoadConst { dst: r(3), index: get_name });
    main.emit(Opcode::MakeFunction { dst: r(4), function: get });
    main.emit(Opcode::BuildDict { dst: r(0), start: r(1), count: 2 });
    main.emit(Opcode::MakeClass { dst: r(0), name: class_name, namespace: r(0), base: None });
}

#[test]
fn test_class_init_and_method() {
    let mut main = BytecodeChunk::new("main").with_registers(5, 0);
    point_class(&mut main);
    let get = main.add_name("get");
    main.emit(Opcode::LoadInt { dst: r(1), value: 7 });
    main.emit(Opcode::Call { dst: r(1), callee: r(0), args: r(1), argc: 1 });
    main.emit(Opcode::CallMethod { dst: r(2), obj: r(1), name: get, args: r(3), argc: 0 });
    main.emit(Opcode::Return { src: r(2) });

    let (_, result) = run(main);
    assert_eq!(result.unwrap(), TaggedValue::Int(7));
}

#[test]
fn test_class_without_init_takes_no_arguments() {
    let mut main = BytecodeChunk::new("main").with_registers(2, 0);
    let name = main.add_name("Empty");
    main.emit(Opcode::BuildDict { dst: r(0), start: r(0), count: 0 });
    main.emit(Opcode::MakeClass { dst: r(0), name, namespace: r(0), base: None });
    main.emit(Opcode::LoadInt { dst: r(1), value: 1 });
    main.emit(Opcode::Call { dst: r(1), callee: r(0), args: r(1), argc: 1 });
    main.emit(Opcode::Return { src: r(1) });

    let (_, result) = run(main);
    let err = result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(err.message, "Empty() takes no arguments");
}

#[test]
fn test_call_value_instantiates_classes() {
    let mut main = BytecodeChunk::new("main").with_registers(5, 0);
    point_class(&mut main);
    main.emit(Opcode::Return { src: r(0) });

    let (mut vm, result) = run(main);
    let class = result.unwrap();
    let point = vm.call_value(class, &[TaggedValue::Int(3)]).unwrap();
    let method = builtins::attributes::get_attr(&mut vm.runtime_mut().heap, point, "get").unwrap();
    assert_eq!(vm.call_value(method, &[]).unwrap(), TaggedValue::Int(3));
}
