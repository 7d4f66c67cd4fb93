//! Activation frames and the register arena

use bytecode_system::RegisterId;
use core_types::{RuntimeError, TaggedValue};

use crate::function::FunctionHandle;

/// Free register files kept for reuse
const MAX_POOLED_FILES: usize = 128;

/// Installed `try` handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryHandler {
    /// Address of the handler code
    pub handler: usize,
    /// Register receiving the exception object
    pub dst: RegisterId,
}

/// Link from a callee frame back to the instruction that called it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallerLink {
    /// Caller register receiving the return value
    pub dst: RegisterId,
    /// Address of the call instruction in the caller
    pub call_pc: usize,
    /// Value to hand back instead of the callee's return value
    /// (the new instance when the callee is `__init__`)
    pub result: Option<TaggedValue>,
}

/// One function activation
#[derive(Debug)]
pub struct Frame {
    /// Function being executed
    pub function: FunctionHandle,
    /// Register file, exactly `register_count` slots
    pub registers: Vec<TaggedValue>,
    /// Address of the current instruction
    pub pc: usize,
    /// Innermost handler last
    pub handlers: Vec<TryHandler>,
    /// `None` for frames entered from native code
    pub caller: Option<CallerLink>,
}

impl Frame {
    /// Register value
    #[inline]
    pub fn get(&self, reg: RegisterId) -> TaggedValue {
        self.registers[reg.index()]
    }

    /// Overwrite a register
    #[inline]
    pub fn set(&mut self, reg: RegisterId, value: TaggedValue) {
        self.registers[reg.index()] = value;
    }

    /// Registers `start .. start+count`
    #[inline]
    pub fn range(&self, start: RegisterId, count: u32) -> &[TaggedValue] {
        let start = start.index();
        &self.registers[start..start + count as usize]
    }
}

/// Recycles register files between calls so that steady-state calls do not
/// allocate.
#[derive(Debug, Default)]
pub struct RegisterArena {
    free: Vec<Vec<TaggedValue>>,
}

impl RegisterArena {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Register file of `count` slots, all `None`
    pub fn take(&mut self, count: usize) -> Vec<TaggedValue> {
        let mut file = self.free.pop().unwrap_or_default();
        file.clear();
        file.resize(count, TaggedValue::None);
        file
    }

    /// Return a register file for reuse
    pub fn release(&mut self, file: Vec<TaggedValue>) {
        if self.free.len() < MAX_POOLED_FILES && file.capacity() > 0 {
            self.free.push(file);
        }
    }

    /// Files waiting for reuse
    pub fn pooled(&self) -> usize {
        self.free.len()
    }

    /// Frame for `function` with `receiver` (if any) followed by `args` in
    /// the parameter registers.
    pub fn frame(
        &mut self,
        function: &FunctionHandle,
        receiver: Option<TaggedValue>,
        args: &[TaggedValue],
    ) -> Result<Frame, RuntimeError> {
        let chunk = function.chunk();
        let given = args.len() + usize::from(receiver.is_some());
        let expected = chunk.param_count as usize;
        if given != expected {
            return Err(RuntimeError::type_error(format!(
                "{}() takes {} positional argument{} but {} {} given",
                function.name(),
                expected,
                if expected == 1 { "" } else { "s" },
                given,
                if given == 1 { "was" } else { "were" },
            )));
        }

        let mut registers = self.take(chunk.register_count as usize);
        let mut slots = registers.iter_mut();
        if let Some(receiver) = receiver {
            if let Some(slot) = slots.next() {
                *slot = receiver;
            }
        }
        for (slot, &arg) in slots.zip(args) {
            *slot = arg;
        }

        Ok(Frame {
            function: FunctionHandle::clone(function),
            registers,
            pc: 0,
            handlers: Vec::new(),
            caller: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use bytecode_system::{BytecodeChunk, Opcode};
    use core_types::ErrorKind;

    fn two_params() -> FunctionHandle {
        let mut chunk = BytecodeChunk::new("pair").with_registers(4, 2);
        chunk.emit(Opcode::ReturnNone);
        Function::load(chunk)
    }

    #[test]
    fn test_frame_arguments() {
        let f = two_params();
        let mut arena = RegisterArena::new();
        let frame = arena
            .frame(&f, Some(TaggedValue::Int(1)), &[TaggedValue::Int(2)])
            .unwrap();
        assert_eq!(
            frame.registers,
            vec![
                TaggedValue::Int(1),
                TaggedValue::Int(2),
                TaggedValue::None,
                TaggedValue::None
            ]
        );
        assert_eq!(frame.range(RegisterId(0), 2), &frame.registers[..2]);
    }

    #[test]
    fn test_arity_mismatch() {
        let f = two_params();
        let mut arena = RegisterArena::new();
        let err = arena.frame(&f, None, &[TaggedValue::Int(1)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeError);
        assert_eq!(err.message, "pair() takes 2 positional arguments but 1 was given");
    }

    #[test]
    fn test_register_files_are_recycled() {
        let f = two_params();
        let mut arena = RegisterArena::new();
        let mut frame = arena
            .frame(&f, None, &[TaggedValue::Int(1), TaggedValue::Int(2)])
            .unwrap();
        frame.set(RegisterId(3), TaggedValue::Bool(true));
        arena.release(std::mem::take(&mut frame.registers));
        assert_eq!(arena.pooled(), 1);

        let file = arena.take(3);
        assert_eq!(file, vec![TaggedValue::None; 3]);
        assert_eq!(arena.pooled(), 0);
    }
}
