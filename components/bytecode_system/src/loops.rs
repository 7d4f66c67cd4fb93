//! Loop discovery
//!
//! A back-edge is any jump whose target is at or before its own address.
//! The target is the loop header; the loop range runs from the header to
//! the furthest back-edge that jumps to it.

use std::collections::BTreeMap;

use crate::chunk::BytecodeChunk;
use crate::opcode::RegisterId;

/// Instruction range `[header, back_edge]` of one loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopRange {
    /// Address of the loop header (target of the back-edge)
    pub header: usize,
    /// Address of the furthest back-edge jumping to `header`
    pub back_edge: usize,
}

impl LoopRange {
    /// Whether `pc` lies inside the loop
    #[inline]
    pub fn contains(&self, pc: usize) -> bool {
        self.header <= pc && pc <= self.back_edge
    }

    /// Number of instructions in the loop
    pub fn len(&self) -> usize {
        self.back_edge - self.header + 1
    }

    /// A loop always holds at least its back-edge
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Registers referenced by any instruction in the loop, sorted
    pub fn registers(&self, chunk: &BytecodeChunk) -> Vec<RegisterId> {
        let mut regs = Vec::new();
        for inst in chunk
            .instructions
            .iter()
            .skip(self.header)
            .take(self.len())
        {
            inst.opcode.for_each_register(|r| regs.push(r));
        }
        regs.sort_unstable();
        regs.dedup();
        regs
    }
}

/// Find every loop in `chunk`, ordered by header address
///
/// # Examples
///
/// ```
/// use bytecode_system::{BytecodeChunk, Opcode, RegisterId};
///
/// let mut chunk = BytecodeChunk::new("countdown").with_registers(1, 0);
/// chunk.emit(Opcode::LoadInt { dst: RegisterId(0), value: 10 });
/// chunk.emit(Opcode::DecLocal { reg: RegisterId(0) });
/// chunk.emit(Opcode::JumpIfTrue { cond: RegisterId(0), target: 1 });
/// chunk.emit(Opcode::ReturnNone);
///
/// let loops = chunk.loops();
/// assert_eq!(loops.len(), 1);
/// assert_eq!((loops[0].header, loops[0].back_edge), (1, 2));
/// ```
pub fn find_loops(chunk: &BytecodeChunk) -> Vec<LoopRange> {
    let mut furthest: BTreeMap<usize, usize> = BTreeMap::new();
    for (pc, inst) in chunk.instructions.iter().enumerate() {
        if let Some(target) = inst.opcode.jump_target() {
            if target <= pc {
                let entry = furthest.entry(target).or_insert(pc);
                if pc > *entry {
                    *entry = pc;
                }
            }
        }
    }
    furthest
        .into_iter()
        .map(|(header, back_edge)| LoopRange { header, back_edge })
        .collect()
}
