//! Load-time operand verification
//!
//! Runs once when a chunk is loaded so the dispatch loop can index
//! registers, constants and nested functions without further checks.

use thiserror::Error;

use crate::chunk::BytecodeChunk;
use crate::constant::Constant;
use crate::opcode::Opcode;

/// A verification failure, naming the function and instruction address
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Register operand outside the declared register file
    #[error("{function}@{pc}: register r{register} out of range (register_count {count})")]
    RegisterOutOfRange {
        /// Function name
        function: String,
        /// Instruction address
        pc: usize,
        /// Offending register
        register: u32,
        /// Declared register count
        count: u32,
    },
    /// Constant index outside the constant pool
    #[error("{function}@{pc}: constant #{index} out of range")]
    ConstantOutOfRange {
        /// Function name
        function: String,
        /// Instruction address
        pc: usize,
        /// Offending index
        index: u32,
    },
    /// Name operand that is not a string constant
    #[error("{function}@{pc}: name operand #{index} is not a string constant")]
    NameNotString {
        /// Function name
        function: String,
        /// Instruction address
        pc: usize,
        /// Offending index
        index: u32,
    },
    /// Jump, exit or handler target outside the instruction list
    #[error("{function}@{pc}: target {target} out of range")]
    TargetOutOfRange {
        /// Function name
        function: String,
        /// Instruction address
        pc: usize,
        /// Offending target
        target: usize,
    },
    /// `ForIter` exit or `PushTry` handler that does not point forward
    #[error("{function}@{pc}: {opcode} target {target} must point forward")]
    BackwardTarget {
        /// Function name
        function: String,
        /// Instruction address
        pc: usize,
        /// Mnemonic of the instruction
        opcode: &'static str,
        /// Offending target
        target: usize,
    },
    /// Nested function index outside the chunk's nested functions
    #[error("{function}@{pc}: nested function {index} out of range")]
    FunctionOutOfRange {
        /// Function name
        function: String,
        /// Instruction address
        pc: usize,
        /// Offending index
        index: u32,
    },
    /// More parameters than registers
    #[error("{function}: param_count {params} exceeds register_count {registers}")]
    TooManyParams {
        /// Function name
        function: String,
        /// Declared parameters
        params: u32,
        /// Declared registers
        registers: u32,
    },
}

/// Verify `chunk` and, recursively, its nested functions
pub fn verify(chunk: &BytecodeChunk) -> Result<(), VerifyError> {
    let function = || chunk.name.clone();
    if chunk.param_count > chunk.register_count {
        return Err(VerifyError::TooManyParams {
            function: function(),
            params: chunk.param_count,
            registers: chunk.register_count,
        });
    }

    let len = chunk.instructions.len();
    for (pc, inst) in chunk.instructions.iter().enumerate() {
        let op = &inst.opcode;

        let mut bad_register = None;
        op.for_each_register(|r| {
            if r.0 >= chunk.register_count && bad_register.is_none() {
                bad_register = Some(r.0);
            }
        });
        if let Some(register) = bad_register {
            return Err(VerifyError::RegisterOutOfRange {
                function: function(),
                pc,
                register,
                count: chunk.register_count,
            });
        }

        if let Opcode::LoadConst { index, .. } = *op {
            if index as usize >= chunk.constants.len() {
                return Err(VerifyError::ConstantOutOfRange {
                    function: function(),
                    pc,
                    index,
                });
            }
        }

        if let Some(index) = op.name_operand() {
            match chunk.constants.get(index as usize) {
                Some(Constant::Str(_)) => {}
                Some(_) => {
                    return Err(VerifyError::NameNotString {
                        function: function(),
                        pc,
                        index,
                    })
                }
                None => {
                    return Err(VerifyError::ConstantOutOfRange {
                        function: function(),
                        pc,
                        index,
                    })
                }
            }
        }

        if let Some(target) = op.branch_target() {
            if target >= len {
                return Err(VerifyError::TargetOutOfRange {
                    function: function(),
                    pc,
                    target,
                });
            }
            let forward_only = matches!(op, Opcode::ForIter { .. } | Opcode::PushTry { .. });
            if forward_only && target <= pc {
                return Err(VerifyError::BackwardTarget {
                    function: function(),
                    pc,
                    opcode: op.mnemonic(),
                    target,
                });
            }
        }

        if let Opcode::MakeFunction { function: index, .. } = *op {
            if index as usize >= chunk.nested_functions.len() {
                return Err(VerifyError::FunctionOutOfRange {
                    function: function(),
                    pc,
                    index,
                });
            }
        }
    }

    for nested in &chunk.nested_functions {
        verify(nested)?;
    }
    Ok(())
}
