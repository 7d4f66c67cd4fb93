//! Bytecode system for the Basalt register VM
//!
//! This crate provides the instruction set, the chunk container, load-time
//! verification and loop discovery.
//!
//! # Features
//!
//! - Register-based bytecode architecture
//! - Generic opcodes plus fused and typed fast-path opcodes
//! - Operand verification at load time
//! - Loop range discovery for hot-loop promotion
//! - JSON serialization and a textual disassembler
//!
//! # Example
//!
//! ```
//! use bytecode_system::{BinaryOp, BytecodeChunk, Opcode, RegisterId};
//!
//! let r = RegisterId;
//! let mut chunk = BytecodeChunk::new("add").with_registers(3, 2);
//! chunk.emit(Opcode::Binary { op: BinaryOp::Add, dst: r(2), lhs: r(0), rhs: r(1) });
//! chunk.emit(Opcode::Return { src: r(2) });
//!
//! chunk.verify().unwrap();
//! println!("{}", chunk);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunk;
pub mod constant;
pub mod instruction;
pub mod loops;
pub mod opcode;
pub mod verifier;

// Re-export main types at crate root
pub use chunk::BytecodeChunk;
pub use constant::Constant;
pub use instruction::{Instruction, SourcePosition};
pub use loops::{find_loops, LoopRange};
pub use opcode::{BinaryOp, CompareOp, Opcode, RegisterId, UnaryOp};
pub use verifier::VerifyError;
