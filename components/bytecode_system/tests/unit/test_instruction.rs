//! Tests for Instruction and SourcePosition

use bytecode_system::{Instruction, Opcode, SourcePosition};

#[test]
fn test_instruction_serializes_without_empty_position() {
    let inst = Instruction::new(Opcode::ReturnNone);
    let json = serde_json::to_string(&inst).unwrap();
    assert_eq!(json, r#"{"opcode":"ReturnNone"}"#);
    let back: Instruction = serde_json::from_str(&json).unwrap();
    assert_eq!(back, inst);
}

#[test]
fn test_instruction_position_round_trip() {
    let inst = Instruction::with_position(Opcode::Nop, SourcePosition::new(7, 3));
    let json = serde_json::to_string(&inst).unwrap();
    let back: Instruction = serde_json::from_str(&json).unwrap();
    assert_eq!(back.source_position, Some(SourcePosition::new(7, 3)));
}
