//! Tests for BytecodeChunk

use bytecode_system::{BytecodeChunk, Constant, Opcode, RegisterId, VerifyError};

fn counting_loop() -> BytecodeChunk {
    let r = RegisterId;
    let mut chunk = BytecodeChunk::new("count").with_registers(3, 1);
    chunk.emit(Opcode::LoadInt { dst: r(1), value: 0 }); // 0
    let header = chunk.emit(Opcode::FastIntLt { dst: r(2), lhs: r(1), rhs: r(0) }); // 1
    let exit = chunk.emit(Opcode::JumpIfFalse { cond: r(2), target: 0 }); // 2
    chunk.emit(Opcode::IncLocal { reg: r(1) }); // 3
    chunk.emit(Opcode::Jump { target: header as u32 }); // 4
    let end = chunk.emit(Opcode::Return { src: r(1) }); // 5
    chunk.patch_target(exit, end as u32);
    chunk
}

#[test]
fn test_counting_loop_is_valid() {
    let chunk = counting_loop();
    assert_eq!(chunk.verify(), Ok(()));
    let loops = chunk.loops();
    assert_eq!(loops.len(), 1);
    assert_eq!(loops[0].header, 1);
    assert_eq!(loops[0].back_edge, 4);
}

#[test]
fn test_json_round_trip_preserves_nested_functions() {
    let mut outer = BytecodeChunk::new("outer").with_registers(1, 0);
    outer.add_nested_function(counting_loop());
    outer.add_constant(Constant::Float(2.5));
    outer.emit(Opcode::MakeFunction { dst: RegisterId(0), function: 0 });
    outer.emit(Opcode::Return { src: RegisterId(0) });

    let text = outer.to_json().unwrap();
    let back = BytecodeChunk::from_json(&text).unwrap();
    assert_eq!(back, outer);
    assert_eq!(back.nested_functions()[0].name, "count");
}

#[test]
fn test_bad_constant_index_rejected() {
    let mut chunk = BytecodeChunk::new("bad").with_registers(1, 0);
    chunk.emit(Opcode::LoadConst { dst: RegisterId(0), index: 3 });
    assert!(matches!(
        chunk.verify(),
        Err(VerifyError::ConstantOutOfRange { index: 3, pc: 0, .. })
    ));
}

#[test]
fn test_from_json_rejects_garbage() {
    assert!(BytecodeChunk::from_json("{not json").is_err());
}
