//! Unit test entry point for bytecode_system

mod test_chunk;
mod test_instruction;
mod test_opcode;
