//! Virtual Machine for bytecode execution
//!
//! Main entry point for embedders: load verified chunks, run them, call
//! back into loaded functions and inspect the JIT diagnostics.

use std::sync::Arc;

use builtins::{format, Heap, Runtime};
use bytecode_system::BytecodeChunk;
use core_types::{ErrorKind, RuntimeError, TaggedValue};
use tracing::debug;

use crate::config::VmConfig;
use crate::dispatch::Dispatcher;
use crate::events::{JitEvent, JitEventLog};
use crate::function::{Function, FunctionHandle};
use crate::jit_abi::LoopCompiler;

/// Virtual Machine for executing bytecode
///
/// The VM owns:
/// - the global namespace and the builtin namespace
/// - the object heap and the output writer
/// - the registry of loaded functions
/// - the loop compiler used for hot-loop promotion, if any
///
/// A VM is single-threaded. Loaded [`FunctionHandle`]s are `Send + Sync`
/// and may be executed by other VMs; their loop profiles and compiled code
/// are shared.
#[derive(Debug)]
pub struct Vm {
    /// Dispatcher for bytecode execution
    dispatcher: Dispatcher,
}

impl Vm {
    /// Create a VM with the default configuration and no loop compiler
    ///
    /// Loops are profiled but never promoted.
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Create a VM without a loop compiler
    pub fn with_config(config: VmConfig) -> Self {
        Self {
            dispatcher: Dispatcher::new(config, None, JitEventLog::new()),
        }
    }

    /// Create a VM that promotes hot loops with `compiler`
    ///
    /// # Arguments
    ///
    /// * `config` - VM tunables; `jit_enabled = false` keeps every loop
    ///   interpreted
    /// * `compiler` - Native code generator for hot loops
    pub fn with_compiler(config: VmConfig, compiler: Arc<dyn LoopCompiler>) -> Self {
        Self::with_event_log(config, Some(compiler), JitEventLog::new())
    }

    /// Create a VM recording JIT events into an existing log
    pub fn with_event_log(
        config: VmConfig,
        compiler: Option<Arc<dyn LoopCompiler>>,
        events: JitEventLog,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(config, compiler, events),
        }
    }

    /// Verify `chunk` and make it executable
    ///
    /// # Arguments
    ///
    /// * `chunk` - Top-level chunk; nested function chunks are loaded with it
    ///
    /// # Returns
    ///
    /// * `Ok(FunctionHandle)` - The loaded function
    /// * `Err(RuntimeError)` - `InvalidBytecode` if verification fails
    ///
    /// # Example
    ///
    /// ```
    /// use interpreter::Vm;
    /// use bytecode_system::{BytecodeChunk, Opcode, RegisterId};
    /// use core_types::TaggedValue;
    ///
    /// let mut chunk = BytecodeChunk::new("answer").with_registers(1, 0);
    /// chunk.emit(Opcode::LoadInt { dst: RegisterId(0), value: 42 });
    /// chunk.emit(Opcode::Return { src: RegisterId(0) });
    ///
    /// let mut vm = Vm::new();
    /// let f = vm.load(chunk).unwrap();
    /// assert_eq!(vm.execute(&f, &[]).unwrap(), TaggedValue::Int(42));
    /// ```
    pub fn load(&mut self, chunk: BytecodeChunk) -> Result<FunctionHandle, RuntimeError> {
        chunk
            .verify()
            .map_err(|err| RuntimeError::new(ErrorKind::InvalidBytecode, err.to_string()))?;
        let function = Function::load(chunk);
        debug!(
            function = function.name(),
            instructions = function.chunk().instructions.len(),
            loops = function.loops().len(),
            nested = function.children().len(),
            "chunk loaded"
        );
        self.dispatcher.register(&function);
        Ok(function)
    }

    /// Run `function` with `args` in the parameter registers
    ///
    /// # Returns
    ///
    /// * `Ok(TaggedValue)` - The return value (`None` when the code falls
    ///   off its end)
    /// * `Err(RuntimeError)` - An uncaught error with its frame trace
    pub fn execute(
        &mut self,
        function: &FunctionHandle,
        args: &[TaggedValue],
    ) -> Result<TaggedValue, RuntimeError> {
        self.dispatcher.call_function(function, None, args)
    }

    /// Re-entrant call from native code at the current call depth
    ///
    /// Frames started here count towards `max_call_depth` together with the
    /// frames already active.
    pub fn call_from_native(
        &mut self,
        function: &FunctionHandle,
        args: &[TaggedValue],
    ) -> Result<TaggedValue, RuntimeError> {
        self.dispatcher.call_function(function, None, args)
    }

    /// Call any callable value: functions, bound methods, classes, builtins
    pub fn call_value(
        &mut self,
        callee: TaggedValue,
        args: &[TaggedValue],
    ) -> Result<TaggedValue, RuntimeError> {
        self.dispatcher.call_value(callee, args)
    }

    /// Events recorded so far
    pub fn jit_events(&self) -> Vec<JitEvent> {
        self.dispatcher.events().snapshot()
    }

    /// Shared event log
    pub fn event_log(&self) -> &JitEventLog {
        self.dispatcher.events()
    }

    /// Active configuration
    pub fn config(&self) -> &VmConfig {
        self.dispatcher.config()
    }

    /// Output captured so far (empty unless `capture_output` is set)
    pub fn output(&self) -> &str {
        self.dispatcher.runtime().output()
    }

    /// Take captured output
    pub fn take_output(&mut self) -> String {
        self.dispatcher.runtime_mut().take_output()
    }

    /// Python `str()` of a value
    pub fn to_str(&self, value: TaggedValue) -> Result<String, RuntimeError> {
        format::to_str(self.heap(), value)
    }

    /// Python `repr()` of a value
    pub fn repr(&self, value: TaggedValue) -> Result<String, RuntimeError> {
        format::repr(self.heap(), value)
    }

    /// Get a global variable by name
    ///
    /// # Returns
    ///
    /// * `Some(TaggedValue)` - The value if the global exists
    /// * `None` - If the global does not exist
    pub fn get_global(&self, name: &str) -> Option<TaggedValue> {
        self.dispatcher.get_global(name)
    }

    /// Set a global variable
    pub fn set_global(&mut self, name: impl Into<String>, value: TaggedValue) {
        self.dispatcher.set_global(name, value);
    }

    /// Object heap, for building arguments and inspecting results
    pub fn heap(&self) -> &Heap {
        &self.dispatcher.runtime().heap
    }

    /// Mutable helper-library state
    pub fn runtime_mut(&mut self) -> &mut Runtime {
        self.dispatcher.runtime_mut()
    }

    /// Number of active frames
    pub fn call_depth(&self) -> usize {
        self.dispatcher.depth()
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
