//! Runtime orchestration for bytecode execution
//!
//! The Runtime struct coordinates:
//! - the VM, wired to the Cranelift loop compiler unless the JIT is off
//! - loading and verification of chunks
//! - collecting the run report

use bytecode_system::BytecodeChunk;
use core_types::TaggedValue;
use interpreter::{JitEvent, Vm, VmConfig};
use serde::Serialize;
use tracing::info;

use crate::error::CliResult;

/// Outcome of one successful run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Name of the executed chunk
    pub function: String,
    /// `repr()` of the returned value
    pub result: String,
    /// Captured `print` output (empty unless output is captured)
    pub output: String,
    /// Promotion attempts, in order
    pub jit_events: Vec<JitEvent>,
}

impl RunReport {
    /// Whether the program returned `None`
    pub fn returned_none(&self) -> bool {
        self.result == "None"
    }
}

/// Main runtime that executes bytecode programs
pub struct Runtime {
    /// VM instance, kept across runs so globals persist
    vm: Vm,
}

impl Runtime {
    /// Create a runtime
    ///
    /// # Arguments
    /// * `config` - VM tunables; with `jit_enabled` the VM promotes hot
    ///   loops to native code
    ///
    /// # Example
    /// ```
    /// use basalt_cli::Runtime;
    /// use interpreter::VmConfig;
    ///
    /// let runtime = Runtime::new(VmConfig::default().with_jit(false));
    /// assert!(!runtime.is_jit_enabled());
    /// ```
    pub fn new(config: VmConfig) -> Self {
        let vm = if config.jit_enabled {
            jit_compiler::vm_with_jit(config)
        } else {
            Vm::with_config(config)
        };
        Self { vm }
    }

    /// Whether hot loops are promoted
    pub fn is_jit_enabled(&self) -> bool {
        self.vm.config().jit_enabled
    }

    /// Load and run `chunk` with no arguments
    ///
    /// # Errors
    /// Returns `CliError::Runtime` if verification fails or the program
    /// raises an uncaught error
    ///
    /// # Example
    /// ```
    /// use basalt_cli::{demos, Runtime};
    /// use interpreter::VmConfig;
    ///
    /// let mut runtime = Runtime::new(VmConfig::default().with_threshold(100));
    /// let report = runtime.run(demos::sum_below(1000)).unwrap();
    /// assert_eq!(report.result, "499500");
    /// assert_eq!(report.jit_events.len(), 1);
    /// ```
    pub fn run(&mut self, chunk: BytecodeChunk) -> CliResult<RunReport> {
        let events_before = self.vm.jit_events().len();
        let function = self.vm.load(chunk)?;
        let value = self.vm.execute(&function, &[])?;
        let report = self.report(function.name(), value, events_before)?;
        info!(
            function = %report.function,
            compiled = report.jit_events.iter().filter(|e| e.is_compiled()).count(),
            "run finished"
        );
        Ok(report)
    }

    fn report(
        &mut self,
        function: &str,
        value: TaggedValue,
        events_before: usize,
    ) -> CliResult<RunReport> {
        Ok(RunReport {
            function: function.to_string(),
            result: self.vm.repr(value)?,
            output: self.vm.take_output(),
            jit_events: self.vm.jit_events().split_off(events_before),
        })
    }

    /// Get a reference to the VM
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    /// Get a mutable reference to the VM
    pub fn vm_mut(&mut self) -> &mut Vm {
        &mut self.vm
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("jit_enabled", &self.is_jit_enabled())
            .finish()
    }
}
