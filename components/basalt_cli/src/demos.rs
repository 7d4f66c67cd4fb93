//! Built-in demo programs
//!
//! Small hand-assembled programs that exercise the interpreter, hot-loop
//! promotion and the runtime helpers without needing a bytecode file.

use bytecode_system::{BinaryOp, BytecodeChunk, Constant, Opcode, RegisterId};
use clap::ValueEnum;

fn r(index: u32) -> RegisterId {
    RegisterId(index)
}

/// Demo programs selectable with `--demo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Sum of 0..50000 in a hot loop (1249975000)
    Sum,
    /// Sum of 3*i for i in 0..40000 (2399940000)
    Triple,
    /// 3 ** 100 by repeated multiplication; overflows into big integers
    Power,
    /// Recursive fib(25) (75025)
    Fib,
    /// Builds and prints a list of strings
    Strings,
    /// A hot loop with a try block, which stays interpreted (50)
    Guarded,
}

impl Demo {
    /// Bytecode of the demo
    pub fn chunk(self) -> BytecodeChunk {
        match self {
            Demo::Sum => sum_below(50_000),
            Demo::Triple => triple_sum(40_000),
            Demo::Power => power_of_three(100),
            Demo::Fib => fib(25),
            Demo::Strings => strings(5),
            Demo::Guarded => guarded(50),
        }
    }
}

/// `total = 0; i = 0; while i < n: total += i; i += 1; return total`
pub fn sum_below(n: i64) -> BytecodeChunk {
    let mut chunk = BytecodeChunk::new("sum").with_registers(4, 0);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: n });
    chunk.emit(Opcode::FastIntLt { dst: r(3), lhs: r(1), rhs: r(2) });
    chunk.emit(Opcode::JumpIfFalse { cond: r(3), target: 8 });
    chunk.emit(Opcode::LoadAddStore { reg: r(0), src: r(1) });
    chunk.emit(Opcode::IncLocal { reg: r(1) });
    chunk.emit(Opcode::Jump { target: 3 });
    chunk.emit(Opcode::Return { src: r(0) });
    chunk
}

/// `total = 0; i = 0; while i < n: total = total + i * 3; i += 1`
pub fn triple_sum(n: i64) -> BytecodeChunk {
    let mut chunk = BytecodeChunk::new("triple").with_registers(6, 0);
    let three = chunk.add_constant(Constant::Int(3));
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: n });
    chunk.emit(Opcode::LoadConst { dst: r(4), index: three });
    chunk.emit(Opcode::FastIntLt { dst: r(3), lhs: r(1), rhs: r(2) });
    chunk.emit(Opcode::JumpIfFalse { cond: r(3), target: 10 });
    chunk.emit(Opcode::Binary { op: BinaryOp::Mul, dst: r(5), lhs: r(1), rhs: r(4) });
    chunk.emit(Opcode::Binary { op: BinaryOp::Add, dst: r(0), lhs: r(0), rhs: r(5) });
    chunk.emit(Opcode::IncLocal { reg: r(1) });
    chunk.emit(Opcode::Jump { target: 4 });
    chunk.emit(Opcode::Return { src: r(0) });
    chunk
}

/// `x = 1; i = 0; while i < n: x *= 3; i += 1; return x`
pub fn power_of_three(n: i64) -> BytecodeChunk {
    let mut chunk = BytecodeChunk::new("power").with_registers(5, 0);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 1 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: n });
    chunk.emit(Opcode::LoadInt { dst: r(4), value: 3 });
    chunk.emit(Opcode::FastIntLt { dst: r(3), lhs: r(1), rhs: r(2) });
    chunk.emit(Opcode::JumpIfFalse { cond: r(3), target: 9 });
    chunk.emit(Opcode::LoadMulStore { reg: r(0), src: r(4) });
    chunk.emit(Opcode::IncLocal { reg: r(1) });
    chunk.emit(Opcode::Jump { target: 4 });
    chunk.emit(Opcode::Return { src: r(0) });
    chunk
}

/// ```text
/// def fib(n):
///     if n < 2: return n
///     return fib(n - 1) + fib(n - 2)
/// return fib(n)
/// ```
pub fn fib(n: i64) -> BytecodeChunk {
    let mut body = BytecodeChunk::new("fib").with_registers(6, 1);
    let name = body.add_name("fib");
    body.emit(Opcode::LoadInt { dst: r(1), value: 2 });
    body.emit(Opcode::FastIntLt { dst: r(2), lhs: r(0), rhs: r(1) });
    body.emit(Opcode::JumpIfFalse { cond: r(2), target: 4 });
    body.emit(Opcode::Return { src: r(0) });
    body.emit(Opcode::LoadGlobal { dst: r(3), name });
    body.emit(Opcode::LoadInt { dst: r(1), value: 1 });
    body.emit(Opcode::FastIntSub { dst: r(4), lhs: r(0), rhs: r(1) });
    body.emit(Opcode::Call { dst: r(4), callee: r(3), args: r(4), argc: 1 });
    body.emit(Opcode::LoadInt { dst: r(1), value: 2 });
    body.emit(Opcode::FastIntSub { dst: r(5), lhs: r(0), rhs: r(1) });
    body.emit(Opcode::Call { dst: r(5), callee: r(3), args: r(5), argc: 1 });
    body.emit(Opcode::Binary { op: BinaryOp::Add, dst: r(4), lhs: r(4), rhs: r(5) });
    body.emit(Opcode::Return { src: r(4) });

    let mut chunk = BytecodeChunk::new("main").with_registers(3, 0);
    let name = chunk.add_name("fib");
    let function = chunk.add_nested_function(body);
    chunk.emit(Opcode::MakeFunction { dst: r(0), function });
    chunk.emit(Opcode::StoreGlobal { name, src: r(0) });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: n });
    chunk.emit(Opcode::Call { dst: r(2), callee: r(0), args: r(1), argc: 1 });
    chunk.emit(Opcode::Return { src: r(2) });
    chunk
}

/// ```text
/// words = []
/// i = 0
/// while i < n: words.append(f"item{i}"); i += 1
/// print(len(words), words)
/// return words
/// ```
pub fn strings(n: i64) -> BytecodeChunk {
    let mut chunk = BytecodeChunk::new("strings").with_registers(10, 0);
    let item = chunk.add_constant(Constant::Str("item".to_string()));
    let print = chunk.add_name("print");
    chunk.emit(Opcode::BuildList { dst: r(0), start: r(1), count: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(2), value: n });
    chunk.emit(Opcode::FastIntLt { dst: r(3), lhs: r(1), rhs: r(2) });
    chunk.emit(Opcode::JumpIfFalse { cond: r(3), target: 11 });
    chunk.emit(Opcode::LoadConst { dst: r(5), index: item });
    chunk.emit(Opcode::MoveReg { dst: r(6), src: r(1) });
    chunk.emit(Opcode::BuildString { dst: r(4), start: r(5), count: 2 });
    chunk.emit(Opcode::Append { list: r(0), src: r(4) });
    chunk.emit(Opcode::IncLocal { reg: r(1) });
    chunk.emit(Opcode::Jump { target: 3 });
    chunk.emit(Opcode::LoadGlobal { dst: r(7), name: print });
    chunk.emit(Opcode::Len { dst: r(8), src: r(0) });
    chunk.emit(Opcode::MoveReg { dst: r(9), src: r(0) });
    chunk.emit(Opcode::Call { dst: r(7), callee: r(7), args: r(8), argc: 2 });
    chunk.emit(Opcode::Return { src: r(0) });
    chunk
}

/// ```text
/// i = 0
/// while i < n:
///     try: pass
///     except: pass
///     i += 1
/// return i
/// ```
pub fn guarded(n: i64) -> BytecodeChunk {
    let mut chunk = BytecodeChunk::new("guarded").with_registers(4, 0);
    chunk.emit(Opcode::LoadInt { dst: r(0), value: 0 });
    chunk.emit(Opcode::LoadInt { dst: r(1), value: n });
    chunk.emit(Opcode::FastIntLt { dst: r(2), lhs: r(0), rhs: r(1) });
    chunk.emit(Opcode::JumpIfFalse { cond: r(2), target: 9 });
    chunk.emit(Opcode::PushTry { handler: 7, dst: r(3) });
    chunk.emit(Opcode::PopTry);
    chunk.emit(Opcode::Jump { target: 7 });
    chunk.emit(Opcode::IncLocal { reg: r(0) });
    chunk.emit(Opcode::Jump { target: 2 });
    chunk.emit(Opcode::Return { src: r(0) });
    chunk
}
