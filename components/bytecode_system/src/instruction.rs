//! Bytecode instruction representation
//!
//! Contains instruction structure and source position tracking.

use serde::{Deserialize, Serialize};

use crate::opcode::Opcode;

/// Source position for debugging information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePosition {
    /// Line number (1-based)
    pub line: u32,
    /// Column number (1-based)
    pub column: u32,
}

impl SourcePosition {
    /// Create a new source position
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A single bytecode instruction with optional source mapping
///
/// In JSON an instruction is either the full object or just its opcode:
///
/// ```
/// use bytecode_system::{Instruction, Opcode};
///
/// let bare: Instruction = serde_json::from_str(r#""Nop""#).unwrap();
/// assert_eq!(bare.opcode, Opcode::Nop);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "InstructionRepr")]
pub struct Instruction {
    /// The opcode for this instruction
    pub opcode: Opcode,
    /// Optional source position for debugging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_position: Option<SourcePosition>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InstructionRepr {
    Bare(Opcode),
    Full {
        opcode: Opcode,
        #[serde(default)]
        source_position: Option<SourcePosition>,
    },
}

impl From<InstructionRepr> for Instruction {
    fn from(repr: InstructionRepr) -> Self {
        match repr {
            InstructionRepr::Bare(opcode) => Instruction::new(opcode),
            InstructionRepr::Full {
                opcode,
                source_position,
            } => Instruction {
                opcode,
                source_position,
            },
        }
    }
}

impl Instruction {
    /// Create a new instruction without source position
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            source_position: None,
        }
    }

    /// Create a new instruction with source position
    pub fn with_position(opcode: Opcode, position: SourcePosition) -> Self {
        Self {
            opcode,
            source_position: Some(position),
        }
    }

    /// Source line, if known
    pub fn line(&self) -> Option<u32> {
        self.source_position.map(|p| p.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::RegisterId;

    #[test]
    fn test_instruction_with_position() {
        let pos = SourcePosition::new(4, 1);
        let inst = Instruction::with_position(Opcode::ReturnNone, pos);
        assert_eq!(inst.line(), Some(4));
        assert!(Instruction::new(Opcode::Nop).line().is_none());
    }

    #[test]
    fn test_bare_and_full_json_forms() {
        let bare: Instruction =
            serde_json::from_str(r#"{"Return":{"src":1}}"#).unwrap();
        assert_eq!(bare.opcode, Opcode::Return { src: RegisterId(1) });
        assert!(bare.source_position.is_none());

        let full: Instruction = serde_json::from_str(
            r#"{"opcode":{"Return":{"src":1}},"source_position":{"line":2,"column":5}}"#,
        )
        .unwrap();
        assert_eq!(full.line(), Some(2));
    }
}
