//! Contract between the dispatch loop and native loop code
//!
//! A compiled loop is entered at its header with a pointer to a
//! [`JitContext`] and to an array of [`JitSlot`]s, one per register of the
//! frame. Registers listed in the loop's [`RegisterMap`] hold their current
//! values on entry and must be written back before the entry returns.
//!
//! The entry returns the bytecode address where interpretation resumes, or
//! [`EXIT_FAULT`] when a runtime helper failed; the error and the faulting
//! address are then stored in the context.
//!
//! Native code calls back into the VM through two helpers:
//!
//! - [`jit_rt_exec`] runs one instruction with the interpreter's generic
//!   semantics against the slot array
//! - [`jit_rt_truthy`] evaluates the truthiness of a heap value
//!
//! Both catch panics, so no unwind ever crosses the native frames.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bytecode_system::{BytecodeChunk, LoopRange, RegisterId};
use core_types::{ErrorKind, RuntimeError, TaggedValue};

use crate::dispatch::Dispatcher;
use crate::frame::Frame;

/// [`jit_rt_exec`]: the instruction completed, continue with the next one
pub const JIT_NEXT: i64 = 0;
/// Helper failed; the fault is recorded in the context
pub const JIT_ERROR: i64 = 1;
/// [`jit_rt_exec`]: the instruction branched to its target
pub const JIT_BRANCH: i64 = 2;
/// Entry result after a helper failure
pub const EXIT_FAULT: i64 = -1;

/// Symbol name of [`jit_rt_exec`] for native linkers
pub const RT_EXEC_SYMBOL: &str = "basalt_rt_exec";
/// Symbol name of [`jit_rt_truthy`] for native linkers
pub const RT_TRUTHY_SYMBOL: &str = "basalt_rt_truthy";

/// One register as seen by native code
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JitSlot {
    /// Value tag (see [`core_types::tag`])
    pub tag: u64,
    /// Payload bits
    pub bits: u64,
}

impl JitSlot {
    /// Size of one slot in bytes
    pub const SIZE: i32 = 16;
    /// Offset of the tag within a slot
    pub const TAG_OFFSET: i32 = 0;
    /// Offset of the payload within a slot
    pub const BITS_OFFSET: i32 = 8;

    /// Decode the slot
    pub fn to_value(self) -> Result<TaggedValue, RuntimeError> {
        TaggedValue::from_raw(self.tag, self.bits).ok_or_else(|| {
            RuntimeError::internal(format!("invalid value tag {} in native slot", self.tag))
        })
    }
}

impl From<TaggedValue> for JitSlot {
    fn from(value: TaggedValue) -> Self {
        let (tag, bits) = value.to_raw();
        JitSlot { tag, bits }
    }
}

/// Signature of a compiled loop entry
pub type LoopEntry = unsafe extern "C" fn(ctx: *mut JitContext, slots: *mut JitSlot) -> i64;

/// Error raised while native code was running
#[derive(Debug, Clone)]
pub struct JitFault {
    /// The error
    pub error: RuntimeError,
    /// Address of the instruction that raised it
    pub pc: usize,
}

/// State handed to native code and passed back to the helpers
pub struct JitContext {
    dispatcher: *mut Dispatcher,
    frame: *mut Frame,
    fault: Option<JitFault>,
}

impl JitContext {
    pub(crate) fn new(dispatcher: &mut Dispatcher, frame: &mut Frame) -> Self {
        Self {
            dispatcher,
            frame,
            fault: None,
        }
    }

    pub(crate) fn take_fault(&mut self) -> Option<JitFault> {
        self.fault.take()
    }

    fn fail(&mut self, error: RuntimeError, pc: usize) -> i64 {
        self.fault = Some(JitFault { error, pc });
        JIT_ERROR
    }
}

impl fmt::Debug for JitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitContext")
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> RuntimeError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    RuntimeError::new(
        ErrorKind::InternalError,
        format!("panic in runtime helper: {}", detail),
    )
}

/// Execute the instruction at `pc` with generic semantics.
///
/// Returns [`JIT_NEXT`], [`JIT_BRANCH`] or [`JIT_ERROR`].
///
/// # Safety
///
/// `ctx` must be the context passed to the running loop entry and `slots`
/// the slot array passed alongside it.
pub unsafe extern "C" fn jit_rt_exec(ctx: *mut JitContext, slots: *mut JitSlot, pc: i64) -> i64 {
    let Some(ctx) = ctx.as_mut() else {
        return JIT_ERROR;
    };
    let pc = pc as usize;
    let dispatcher = ctx.dispatcher;
    let frame = ctx.frame;
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: the dispatcher and frame outlive the native call that
        // handed out `ctx`, and nothing else touches them meanwhile.
        let (dispatcher, frame) = unsafe { (&mut *dispatcher, &mut *frame) };
        let slots = unsafe { std::slice::from_raw_parts_mut(slots, frame.registers.len()) };
        dispatcher.exec_for_jit(frame, slots, pc)
    }));
    match outcome {
        Ok(Ok(false)) => JIT_NEXT,
        Ok(Ok(true)) => JIT_BRANCH,
        Ok(Err(error)) => ctx.fail(error, pc),
        Err(payload) => ctx.fail(panic_error(payload), pc),
    }
}

/// Truthiness of the value `(tag, bits)`: 0 or 1, or -1 on failure.
///
/// # Safety
///
/// `ctx` must be the context passed to the running loop entry.
pub unsafe extern "C" fn jit_rt_truthy(ctx: *mut JitContext, tag: i64, bits: i64, pc: i64) -> i64 {
    let Some(ctx) = ctx.as_mut() else {
        return -1;
    };
    let dispatcher = ctx.dispatcher;
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let value = JitSlot {
            tag: tag as u64,
            bits: bits as u64,
        }
        .to_value()?;
        // SAFETY: see `jit_rt_exec`.
        unsafe { &*dispatcher }.truthy(value)
    }));
    match outcome {
        Ok(Ok(truth)) => i64::from(truth),
        Ok(Err(error)) => {
            ctx.fail(error, pc as usize);
            -1
        }
        Err(payload) => {
            ctx.fail(panic_error(payload), pc as usize);
            -1
        }
    }
}

/// Registers a compiled loop keeps in native variables, sorted
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegisterMap {
    registers: Vec<RegisterId>,
}

impl RegisterMap {
    /// Map over `registers` (duplicates are dropped)
    pub fn new(mut registers: Vec<RegisterId>) -> Self {
        registers.sort_unstable();
        registers.dedup();
        Self { registers }
    }

    /// Mapped registers in ascending order
    pub fn registers(&self) -> &[RegisterId] {
        &self.registers
    }

    /// Number of mapped registers
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Whether nothing is mapped
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Whether `reg` is mapped
    pub fn contains(&self, reg: RegisterId) -> bool {
        self.registers.binary_search(&reg).is_ok()
    }
}

/// Native code for one loop
pub struct CompiledLoop {
    entry: LoopEntry,
    range: LoopRange,
    register_map: RegisterMap,
    _code: Box<dyn Any + Send + Sync>,
}

impl CompiledLoop {
    /// Wrap a compiled entry.
    ///
    /// # Safety
    ///
    /// `entry` must follow the protocol described in the module docs for
    /// `range` and `register_map`, and must stay callable for as long as
    /// `code` is alive.
    pub unsafe fn new(
        entry: LoopEntry,
        range: LoopRange,
        register_map: RegisterMap,
        code: Box<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            entry,
            range,
            register_map,
            _code: code,
        }
    }

    /// Loop range the code covers
    pub fn range(&self) -> LoopRange {
        self.range
    }

    /// Loop header
    pub fn header(&self) -> usize {
        self.range.header
    }

    /// Registers synchronized on entry and exit
    pub fn register_map(&self) -> &RegisterMap {
        &self.register_map
    }

    pub(crate) fn entry(&self) -> LoopEntry {
        self.entry
    }
}

impl fmt::Debug for CompiledLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledLoop")
            .field("entry", &(self.entry as *const ()))
            .field("range", &self.range)
            .field("registers", &self.register_map.len())
            .finish()
    }
}

/// What the dispatcher asks a [`LoopCompiler`] to compile
#[derive(Debug, Clone, Copy)]
pub struct LoopRequest<'a> {
    /// Function name, for diagnostics
    pub function: &'a str,
    /// Bytecode of the function
    pub chunk: &'a BytecodeChunk,
    /// Loop to compile
    pub range: LoopRange,
}

/// Native code generator for hot loops.
///
/// Implementations report loops they cannot handle with
/// [`ErrorKind::JitCompileUnsupported`]; the loop then stays interpreted.
pub trait LoopCompiler: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Compile `request.range` of `request.chunk`
    fn compile(&self, request: &LoopRequest<'_>) -> Result<CompiledLoop, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::ObjectHandle;

    #[test]
    fn test_slot_layout() {
        assert_eq!(std::mem::size_of::<JitSlot>(), JitSlot::SIZE as usize);
        let value = TaggedValue::Float(-2.5);
        let slot = JitSlot::from(value);
        assert_eq!(slot.tag, core_types::tag::FLOAT);
        assert_eq!(slot.to_value().unwrap(), value);
        assert_eq!(
            JitSlot::from(TaggedValue::Object(ObjectHandle(7))).to_value().unwrap(),
            TaggedValue::Object(ObjectHandle(7))
        );
    }

    #[test]
    fn test_bad_tag() {
        let err = JitSlot { tag: 42, bits: 0 }.to_value().unwrap_err();
        assert_eq!(err.kind, ErrorKind::InternalError);
    }

    #[test]
    fn test_register_map() {
        let map = RegisterMap::new(vec![RegisterId(3), RegisterId(1), RegisterId(3)]);
        assert_eq!(map.registers(), &[RegisterId(1), RegisterId(3)]);
        assert!(map.contains(RegisterId(3)));
        assert!(!map.contains(RegisterId(2)));
    }

    #[test]
    fn test_null_context() {
        let status = unsafe { jit_rt_exec(std::ptr::null_mut(), std::ptr::null_mut(), 0) };
        assert_eq!(status, JIT_ERROR);
        let truth = unsafe { jit_rt_truthy(std::ptr::null_mut(), 0, 0, 0) };
        assert_eq!(truth, -1);
    }
}
