//! Bytecode chunk - compiled bytecode container
//!
//! Contains instructions, constants, and metadata for one function.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constant::Constant;
use crate::instruction::{Instruction, SourcePosition};
use crate::loops::{find_loops, LoopRange};
use crate::opcode::{Opcode, RegisterId};
use crate::verifier::{self, VerifyError};

/// A compiled bytecode chunk containing instructions and constants
///
/// # Examples
///
/// ```
/// use bytecode_system::{BytecodeChunk, Opcode, RegisterId};
///
/// let mut chunk = BytecodeChunk::new("answer");
/// chunk.register_count = 1;
/// chunk.emit(Opcode::LoadInt { dst: RegisterId(0), value: 42 });
/// chunk.emit(Opcode::Return { src: RegisterId(0) });
///
/// assert!(chunk.verify().is_ok());
/// let text = chunk.to_json().unwrap();
/// assert_eq!(BytecodeChunk::from_json(&text).unwrap(), chunk);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeChunk {
    /// Function name, used in traces and JIT diagnostics
    #[serde(default = "default_name")]
    pub name: String,
    /// Sequence of bytecode instructions
    pub instructions: Vec<Instruction>,
    /// Constant pool for literal values and names
    #[serde(default)]
    pub constants: Vec<Constant>,
    /// Number of registers needed for execution
    pub register_count: u32,
    /// Number of parameters; arguments arrive in registers `0..param_count`
    #[serde(default)]
    pub param_count: u32,
    /// Nested function bytecode chunks
    #[serde(default)]
    pub nested_functions: Vec<BytecodeChunk>,
}

fn default_name() -> String {
    "<module>".to_string()
}

impl BytecodeChunk {
    /// Create a new empty bytecode chunk
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: Vec::new(),
            constants: Vec::new(),
            register_count: 0,
            param_count: 0,
            nested_functions: Vec::new(),
        }
    }

    /// Set the register and parameter counts
    pub fn with_registers(mut self, register_count: u32, param_count: u32) -> Self {
        self.register_count = register_count;
        self.param_count = param_count;
        self
    }

    /// Get a reference to nested functions
    pub fn nested_functions(&self) -> &[BytecodeChunk] {
        &self.nested_functions
    }

    /// Add a nested function and return its index
    pub fn add_nested_function(&mut self, chunk: BytecodeChunk) -> u32 {
        let idx = self.nested_functions.len();
        self.nested_functions.push(chunk);
        idx as u32
    }

    /// Emit an instruction without source position, returning its address
    pub fn emit(&mut self, opcode: Opcode) -> usize {
        self.instructions.push(Instruction::new(opcode));
        self.instructions.len() - 1
    }

    /// Emit an instruction with source position, returning its address
    pub fn emit_with_position(&mut self, opcode: Opcode, position: SourcePosition) -> usize {
        self.instructions
            .push(Instruction::with_position(opcode, position));
        self.instructions.len() - 1
    }

    /// Address the next emitted instruction will have
    pub fn next_pc(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Point the jump, `ForIter` exit or `PushTry` handler at `at` to `target`
    ///
    /// Returns `false` if the instruction at `at` has no target.
    pub fn patch_target(&mut self, at: usize, new_target: u32) -> bool {
        let Some(inst) = self.instructions.get_mut(at) else {
            return false;
        };
        match &mut inst.opcode {
            Opcode::Jump { target }
            | Opcode::JumpIfTrue { target, .. }
            | Opcode::JumpIfFalse { target, .. } => *target = new_target,
            Opcode::ForIter { exit, .. } => *exit = new_target,
            Opcode::PushTry { handler, .. } => *handler = new_target,
            _ => return false,
        }
        true
    }

    /// Add a constant to the constant pool and return its index
    pub fn add_constant(&mut self, value: Constant) -> u32 {
        let idx = self.constants.len();
        self.constants.push(value);
        idx as u32
    }

    /// Index of a string constant used as a name, adding it once
    pub fn add_name(&mut self, name: &str) -> u32 {
        match self.constants.iter().position(|c| c.as_str() == Some(name)) {
            Some(idx) => idx as u32,
            None => self.add_constant(Constant::Str(name.to_string())),
        }
    }

    /// Name stored at constant index `idx`
    pub fn name_at(&self, idx: u32) -> Option<&str> {
        self.constants.get(idx as usize).and_then(Constant::as_str)
    }

    /// Get the number of instructions
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Get the number of constants
    pub fn constant_count(&self) -> usize {
        self.constants.len()
    }

    /// Check operand validity for this chunk and all nested chunks
    pub fn verify(&self) -> Result<(), VerifyError> {
        verifier::verify(self)
    }

    /// Loops in this chunk, ordered by header address
    pub fn loops(&self) -> Vec<LoopRange> {
        find_loops(self)
    }

    /// Serialize chunk to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize chunk from JSON
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    fn fmt_operands(&self, op: &Opcode) -> String {
        let r = |reg: RegisterId| format!("r{}", reg.0);
        let range = |start: RegisterId, count: u32| {
            if count == 0 {
                "()".to_string()
            } else {
                format!("r{}..r{}", start.0, start.0 + count - 1)
            }
        };
        let name = |idx: u32| match self.name_at(idx) {
            Some(n) => n.to_string(),
            None => format!("#{}", idx),
        };
        match *op {
            Opcode::LoadConst { dst, index } => match self.constants.get(index as usize) {
                Some(c) => format!("{}, {}", r(dst), c),
                None => format!("{}, #{}", r(dst), index),
            },
            Opcode::LoadInt { dst, value } => format!("{}, {}", r(dst), value),
            Opcode::LoadBool { dst, value } => format!("{}, {}", r(dst), value),
            Opcode::LoadNone { dst } => r(dst),
            Opcode::MoveReg { dst, src } => format!("{}, {}", r(dst), r(src)),
            Opcode::LoadGlobal { dst, name: n } => format!("{}, {}", r(dst), name(n)),
            Opcode::StoreGlobal { name: n, src } => format!("{}, {}", name(n), r(src)),
            Opcode::Binary { op, dst, lhs, rhs } => {
                format!("{} = {} {} {}", r(dst), r(lhs), op.symbol(), r(rhs))
            }
            Opcode::Compare { op, dst, lhs, rhs } => {
                format!("{} = {} {} {}", r(dst), r(lhs), op.symbol(), r(rhs))
            }
            Opcode::Unary { op, dst, src } => format!("{} = {:?} {}", r(dst), op, r(src)),
            Opcode::FastIntAdd { dst, lhs, rhs }
            | Opcode::FastIntSub { dst, lhs, rhs }
            | Opcode::FastIntMul { dst, lhs, rhs }
            | Opcode::FastIntLt { dst, lhs, rhs }
            | Opcode::FastFloatAdd { dst, lhs, rhs }
            | Opcode::FastFloatSub { dst, lhs, rhs }
            | Opcode::FastFloatMul { dst, lhs, rhs }
            | Opcode::FastFloatDiv { dst, lhs, rhs } => {
                format!("{}, {}, {}", r(dst), r(lhs), r(rhs))
            }
            Opcode::IncLocal { reg } | Opcode::DecLocal { reg } => r(reg),
            Opcode::LoadAddStore { reg, src }
            | Opcode::LoadSubStore { reg, src }
            | Opcode::LoadMulStore { reg, src }
            | Opcode::LoadDivStore { reg, src } => format!("{}, {}", r(reg), r(src)),
            Opcode::Jump { target } => format!("-> {}", target),
            Opcode::JumpIfTrue { cond, target } | Opcode::JumpIfFalse { cond, target } => {
                format!("{} -> {}", r(cond), target)
            }
            Opcode::Return { src } | Opcode::Raise { src } => r(src),
            Opcode::ReturnNone | Opcode::Nop | Opcode::PopTry => String::new(),
            Opcode::BuildList { dst, start, count }
            | Opcode::BuildTuple { dst, start, count }
            | Opcode::BuildSet { dst, start, count }
            | Opcode::BuildString { dst, start, count } => {
                format!("{}, {}", r(dst), range(start, count))
            }
            Opcode::BuildDict { dst, start, count } => {
                format!("{}, {}", r(dst), range(start, count.saturating_mul(2)))
            }
            Opcode::GetItem { dst, container, key } => {
                format!("{} = {}[{}]", r(dst), r(container), r(key))
            }
            Opcode::SetItem { container, key, src } => {
                format!("{}[{}] = {}", r(container), r(key), r(src))
            }
            Opcode::Slice { dst, container, start, stop } => {
                format!("{} = {}[{}:{}]", r(dst), r(container), r(start), r(stop))
            }
            Opcode::Append { list, src } => format!("{}, {}", r(list), r(src)),
            Opcode::Len { dst, src } | Opcode::GetIter { dst, src } => {
                format!("{}, {}", r(dst), r(src))
            }
            Opcode::ForIter { dst, iter, exit } => {
                format!("{}, {} else -> {}", r(dst), r(iter), exit)
            }
            Opcode::GetAttr { dst, obj, name: n } => format!("{} = {}.{}", r(dst), r(obj), name(n)),
            Opcode::SetAttr { obj, name: n, src } => format!("{}.{} = {}", r(obj), name(n), r(src)),
            Opcode::CallMethod { dst, obj, name: n, args, argc } => format!(
                "{} = {}.{}({})",
                r(dst),
                r(obj),
                name(n),
                range(args, argc)
            ),
            Opcode::Call { dst, callee, args, argc } => {
                format!("{} = {}({})", r(dst), r(callee), range(args, argc))
            }
            Opcode::MakeFunction { dst, function } => {
                let fname = self
                    .nested_functions
                    .get(function as usize)
                    .map(|f| f.name.as_str())
                    .unwrap_or("?");
                format!("{}, <{}>", r(dst), fname)
            }
            Opcode::MakeClass { dst, name: n, namespace, base } => match base {
                Some(b) => format!("{}, {}({}), {}", r(dst), name(n), r(b), r(namespace)),
                None => format!("{}, {}, {}", r(dst), name(n), r(namespace)),
            },
            Opcode::PushTry { handler, dst } => format!("{} -> {}", r(dst), handler),
        }
    }
}

impl Default for BytecodeChunk {
    fn default() -> Self {
        Self::new(default_name())
    }
}

impl fmt::Display for BytecodeChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "function {} (params {}, registers {})",
            self.name, self.param_count, self.register_count
        )?;
        if !self.constants.is_empty() {
            writeln!(f, "  constants:")?;
            for (idx, c) in self.constants.iter().enumerate() {
                writeln!(f, "    #{:<3} {}", idx, c)?;
            }
        }
        let headers: Vec<usize> = self.loops().iter().map(|l| l.header).collect();
        for (pc, inst) in self.instructions.iter().enumerate() {
            let marker = if headers.contains(&pc) { ">>" } else { "  " };
            let operands = self.fmt_operands(&inst.opcode);
            writeln!(
                f,
                "  {}{:>4}  {:<14}{}",
                marker,
                pc,
                inst.opcode.mnemonic(),
                operands
            )?;
        }
        for nested in &self.nested_functions {
            writeln!(f)?;
            write!(f, "{}", nested)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_name_dedupes() {
        let mut chunk = BytecodeChunk::new("main");
        let a = chunk.add_name("print");
        let b = chunk.add_name("print");
        let c = chunk.add_name("len");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(chunk.name_at(c), Some("len"));
    }

    #[test]
    fn test_patch_target() {
        let mut chunk = BytecodeChunk::new("main");
        let at = chunk.emit(Opcode::Jump { target: 0 });
        chunk.emit(Opcode::ReturnNone);
        assert!(chunk.patch_target(at, 1));
        assert_eq!(chunk.instructions[at].opcode, Opcode::Jump { target: 1 });
        assert!(!chunk.patch_target(1, 0));
    }

    #[test]
    fn test_disassembly_marks_loop_headers() {
        let mut chunk = BytecodeChunk::new("spin").with_registers(1, 0);
        chunk.emit(Opcode::LoadInt { dst: RegisterId(0), value: 3 });
        chunk.emit(Opcode::DecLocal { reg: RegisterId(0) });
        chunk.emit(Opcode::JumpIfTrue { cond: RegisterId(0), target: 1 });
        chunk.emit(Opcode::ReturnNone);
        let text = chunk.to_string();
        assert!(text.contains("function spin (params 0, registers 1)"));
        assert!(text.contains(">>   1  dec"));
        assert!(text.contains("jump_if_true  r0 -> 1"));
    }

    #[test]
    fn test_json_defaults() {
        let chunk = BytecodeChunk::from_json(
            r#"{"instructions":["ReturnNone"],"register_count":0}"#,
        )
        .unwrap();
        assert_eq!(chunk.name, "<module>");
        assert_eq!(chunk.param_count, 0);
        assert!(chunk.constants.is_empty());
    }
}
