//! Integration test suite for the Basalt execution core
//!
//! This crate provides integration tests that verify components work
//! together across component boundaries, plus helpers shared by the tests.

use std::sync::Arc;

use bytecode_system::BytecodeChunk;
use core_types::RuntimeError;
use interpreter::{JitEvent, Vm, VmConfig};
use jit_compiler::CraneliftBackend;

/// Re-export components for test convenience
pub mod components {
    pub use basalt_cli;
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use jit_compiler;
}

/// Result of running one chunk
#[derive(Debug)]
pub struct Outcome {
    /// `repr()` of the returned value, or the uncaught error
    pub result: Result<String, RuntimeError>,
    /// Events produced by the run
    pub events: Vec<JitEvent>,
}

/// VM without a loop compiler
pub fn interpreted_vm() -> Vm {
    Vm::with_config(VmConfig::default().with_jit(false))
}

/// VM promoting loops with a fresh Cranelift backend
pub fn jit_vm(threshold: u32) -> Vm {
    let backend = CraneliftBackend::shared().expect("host backend");
    Vm::with_compiler(VmConfig::default().with_threshold(threshold), backend)
}

/// Load and run `chunk` on `vm`
pub fn run_on(vm: &mut Vm, chunk: BytecodeChunk) -> Outcome {
    let result = vm
        .load(chunk)
        .and_then(|f| vm.execute(&f, &[]))
        .and_then(|value| vm.repr(value));
    Outcome {
        result,
        events: vm.jit_events(),
    }
}

/// Run `chunk` interpreted and with promotion at `threshold`
pub fn run_both(chunk: &BytecodeChunk, threshold: u32) -> (Outcome, Outcome) {
    let interpreted = run_on(&mut interpreted_vm(), chunk.clone());
    let compiled = run_on(&mut jit_vm(threshold), chunk.clone());
    (interpreted, compiled)
}

/// Shared backend for VMs on several threads
pub fn shared_backend() -> Arc<CraneliftBackend> {
    CraneliftBackend::shared().expect("host backend")
}
