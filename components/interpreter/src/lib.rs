//! Bytecode interpreter for the Basalt runtime
//!
//! This crate provides the register virtual machine with:
//! - A dispatch loop with inline fast paths for primitive values
//! - A shared generic executor for everything else
//! - Back-edge profiling and synchronous hot-loop promotion
//! - The native ABI compiled loops use to call back into the VM
//! - The embedding API ([`Vm`])
//!
//! Native code generation itself lives in the `jit_compiler` crate, which
//! implements [`LoopCompiler`].
//!
//! # Example
//!
//! ```
//! use interpreter::{Vm, VmConfig};
//! use bytecode_system::{BytecodeChunk, Opcode, RegisterId};
//! use core_types::TaggedValue;
//!
//! // total = 0; i = 0; while i < 100: total += i; i += 1
//! let r = RegisterId;
//! let mut chunk = BytecodeChunk::new("sum").with_registers(4, 0);
//! chunk.emit(Opcode::LoadInt { dst: r(0), value: 0 });
//! chunk.emit(Opcode::LoadInt { dst: r(1), value: 0 });
//! chunk.emit(Opcode::LoadInt { dst: r(2), value: 100 });
//! chunk.emit(Opcode::FastIntLt { dst: r(3), lhs: r(1), rhs: r(2) });
//! chunk.emit(Opcode::JumpIfFalse { cond: r(3), target: 8 });
//! chunk.emit(Opcode::LoadAddStore { reg: r(0), src: r(1) });
//! chunk.emit(Opcode::IncLocal { reg: r(1) });
//! chunk.emit(Opcode::Jump { target: 3 });
//! chunk.emit(Opcode::Return { src: r(0) });
//!
//! let mut vm = Vm::with_config(VmConfig::default().with_threshold(10));
//! let f = vm.load(chunk).unwrap();
//! assert_eq!(vm.execute(&f, &[]).unwrap(), TaggedValue::Int(4950));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dispatch;
pub mod events;
pub mod frame;
pub mod function;
pub mod jit_abi;
pub mod loops;
pub mod vm;

// Re-export main types at crate root
pub use config::{VmConfig, DEFAULT_MAX_CALL_DEPTH};
pub use dispatch::Dispatcher;
pub use events::{JitEvent, JitEventLog};
pub use frame::{CallerLink, Frame, RegisterArena, TryHandler};
pub use function::{Function, FunctionHandle};
pub use jit_abi::{
    jit_rt_exec, jit_rt_truthy, CompiledLoop, JitContext, JitSlot, LoopCompiler, LoopEntry,
    LoopRequest, RegisterMap,
};
pub use loops::LoopRecord;
pub use vm::Vm;
