//! Cranelift loop compiler for the Basalt runtime
//!
//! This crate provides:
//! - [`CraneliftBackend`]: a [`LoopCompiler`] producing native code for hot
//!   loops
//! - Loop translation with tag-guarded native arithmetic and comparisons,
//!   falling back to the runtime helpers for everything else
//! - Entry and exit state transfer between interpreter frames and native
//!   code
//!
//! # Example
//!
//! ```
//! use bytecode_system::{BytecodeChunk, Opcode, RegisterId};
//! use core_types::TaggedValue;
//! use interpreter::VmConfig;
//!
//! // i = 0; while i < 1000: i += 1
//! let r = RegisterId;
//! let mut chunk = BytecodeChunk::new("count").with_registers(3, 0);
//! chunk.emit(Opcode::LoadInt { dst: r(0), value: 0 });
//! chunk.emit(Opcode::LoadInt { dst: r(1), value: 1000 });
//! chunk.emit(Opcode::FastIntLt { dst: r(2), lhs: r(0), rhs: r(1) });
//! chunk.emit(Opcode::JumpIfFalse { cond: r(2), target: 5 });
//! chunk.emit(Opcode::Jump { target: 6 });
//! chunk.emit(Opcode::Return { src: r(0) });
//! chunk.emit(Opcode::IncLocal { reg: r(0) });
//! chunk.emit(Opcode::Jump { target: 2 });
//!
//! let mut vm = jit_compiler::vm_with_jit(VmConfig::default().with_threshold(100));
//! let f = vm.load(chunk).unwrap();
//! assert_eq!(vm.execute(&f, &[]).unwrap(), TaggedValue::Int(1000));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codegen;
pub mod cranelift_backend;
pub mod osr;

use interpreter::{LoopCompiler, Vm, VmConfig};
use std::sync::Arc;
use tracing::warn;

// Re-export main types at crate root
pub use codegen::{check_loop, LoopTranslator, RuntimeHelpers};
pub use cranelift_backend::CraneliftBackend;
pub use osr::{loop_register_map, RegisterVars};

/// A VM that promotes hot loops with the Cranelift backend
///
/// When the host is not supported by Cranelift the VM still runs, with
/// every loop interpreted.
pub fn vm_with_jit(config: VmConfig) -> Vm {
    match CraneliftBackend::shared() {
        Ok(backend) => Vm::with_compiler(config, backend as Arc<dyn LoopCompiler>),
        Err(err) => {
            warn!(error = %err, "native code generation unavailable");
            Vm::with_config(config)
        }
    }
}
