//! Tests for Opcode operand helpers

use bytecode_system::{BinaryOp, CompareOp, Opcode, RegisterId};

#[test]
fn test_terminators() {
    assert!(Opcode::Jump { target: 0 }.is_terminator());
    assert!(Opcode::ReturnNone.is_terminator());
    assert!(Opcode::Raise { src: RegisterId(0) }.is_terminator());
    assert!(!Opcode::JumpIfTrue {
        cond: RegisterId(0),
        target: 0
    }
    .is_terminator());
}

#[test]
fn test_name_operands() {
    let get = Opcode::GetAttr {
        dst: RegisterId(0),
        obj: RegisterId(1),
        name: 4,
    };
    assert_eq!(get.name_operand(), Some(4));
    assert_eq!(Opcode::Nop.name_operand(), None);
}

#[test]
fn test_operator_symbols() {
    assert_eq!(BinaryOp::FloorDiv.symbol(), "//");
    assert_eq!(BinaryOp::Pow.symbol(), "**");
    assert_eq!(CompareOp::NotIn.symbol(), "not in");
}

#[test]
fn test_make_class_registers_include_base() {
    let op = Opcode::MakeClass {
        dst: RegisterId(0),
        name: 0,
        namespace: RegisterId(1),
        base: Some(RegisterId(2)),
    };
    let mut regs = Vec::new();
    op.for_each_register(|r| regs.push(r.0));
    assert_eq!(regs, vec![0, 1, 2]);
}

#[test]
fn test_mnemonics_are_unique_for_fast_paths() {
    let r = RegisterId(0);
    let ops = [
        Opcode::FastIntAdd { dst: r, lhs: r, rhs: r },
        Opcode::FastIntSub { dst: r, lhs: r, rhs: r },
        Opcode::FastIntMul { dst: r, lhs: r, rhs: r },
        Opcode::FastFloatAdd { dst: r, lhs: r, rhs: r },
        Opcode::FastFloatDiv { dst: r, lhs: r, rhs: r },
    ];
    let mut names: Vec<_> = ops.iter().map(|o| o.mnemonic()).collect();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), ops.len());
}
