//! On-stack entry and exit for compiled loops
//!
//! The dispatcher enters a compiled loop in the middle of an interpreted
//! frame, at the loop header. Native code keeps each register of the loop in
//! two SSA variables (tag and payload) which are seeded from the frame's
//! slot array on entry and written back before every exit, so the frame is
//! always consistent when interpretation resumes.

use bytecode_system::{Opcode, RegisterId};
use core_types::{ErrorKind, RuntimeError};
use cranelift_codegen::ir::{types, InstBuilder, MemFlags, Value};
use cranelift_frontend::{FunctionBuilder, Variable};
use interpreter::{JitSlot, LoopRequest, RegisterMap};

/// Highest register index addressable with 32-bit slot offsets
const MAX_NATIVE_REGISTER: u32 = (i32::MAX / JitSlot::SIZE) as u32 - 1;

/// Registers a compiled loop must transfer
///
/// Every register referenced inside the loop range is mapped; registers the
/// loop never touches stay in the frame untouched.
pub fn loop_register_map(request: &LoopRequest<'_>) -> Result<RegisterMap, RuntimeError> {
    let registers = request.range.registers(request.chunk);
    if let Some(reg) = registers.iter().find(|r| r.0 > MAX_NATIVE_REGISTER) {
        return Err(RuntimeError::new(
            ErrorKind::JitCompileUnsupported,
            format!("register r{} is out of native slot range", reg.0),
        ));
    }
    Ok(RegisterMap::new(registers))
}

/// Byte offset of the tag of `reg` in the slot array
fn tag_offset(reg: RegisterId) -> i32 {
    reg.0 as i32 * JitSlot::SIZE + JitSlot::TAG_OFFSET
}

/// Byte offset of the payload of `reg` in the slot array
fn bits_offset(reg: RegisterId) -> i32 {
    reg.0 as i32 * JitSlot::SIZE + JitSlot::BITS_OFFSET
}

/// SSA variables holding the mapped registers of one loop
#[derive(Debug)]
pub struct RegisterVars {
    registers: Vec<RegisterId>,
    vars: Vec<(Variable, Variable)>,
}

impl RegisterVars {
    /// Declare a (tag, bits) variable pair per mapped register
    pub fn declare(builder: &mut FunctionBuilder<'_>, map: &RegisterMap) -> Self {
        let registers = map.registers().to_vec();
        let vars = (0..registers.len())
            .map(|i| {
                let tag = Variable::from_u32(2 * i as u32);
                let bits = Variable::from_u32(2 * i as u32 + 1);
                builder.declare_var(tag, types::I64);
                builder.declare_var(bits, types::I64);
                (tag, bits)
            })
            .collect();
        Self { registers, vars }
    }

    fn pair(&self, reg: RegisterId) -> Result<(Variable, Variable), RuntimeError> {
        self.registers
            .binary_search(&reg)
            .map(|i| self.vars[i])
            .map_err(|_| RuntimeError::internal(format!("register r{} is not mapped", reg.0)))
    }

    /// Current (tag, bits) of `reg`
    pub fn read(
        &self,
        builder: &mut FunctionBuilder<'_>,
        reg: RegisterId,
    ) -> Result<(Value, Value), RuntimeError> {
        let (tag, bits) = self.pair(reg)?;
        Ok((builder.use_var(tag), builder.use_var(bits)))
    }

    /// Assign `reg`
    pub fn write(
        &self,
        builder: &mut FunctionBuilder<'_>,
        reg: RegisterId,
        tag: Value,
        bits: Value,
    ) -> Result<(), RuntimeError> {
        let (tag_var, bits_var) = self.pair(reg)?;
        builder.def_var(tag_var, tag);
        builder.def_var(bits_var, bits);
        Ok(())
    }

    /// Load `regs` from the slot array into their variables
    pub fn reload(
        &self,
        builder: &mut FunctionBuilder<'_>,
        slots: Value,
        regs: &[RegisterId],
    ) -> Result<(), RuntimeError> {
        for &reg in regs {
            let tag = builder
                .ins()
                .load(types::I64, MemFlags::trusted(), slots, tag_offset(reg));
            let bits = builder
                .ins()
                .load(types::I64, MemFlags::trusted(), slots, bits_offset(reg));
            self.write(builder, reg, tag, bits)?;
        }
        Ok(())
    }

    /// Store the variables of `regs` into the slot array
    pub fn spill(
        &self,
        builder: &mut FunctionBuilder<'_>,
        slots: Value,
        regs: &[RegisterId],
    ) -> Result<(), RuntimeError> {
        for &reg in regs {
            let (tag, bits) = self.read(builder, reg)?;
            builder
                .ins()
                .store(MemFlags::trusted(), tag, slots, tag_offset(reg));
            builder
                .ins()
                .store(MemFlags::trusted(), bits, slots, bits_offset(reg));
        }
        Ok(())
    }

    /// Seed every variable from the frame
    pub fn enter(&self, builder: &mut FunctionBuilder<'_>, slots: Value) -> Result<(), RuntimeError> {
        self.reload(builder, slots, &self.registers)
    }

    /// Write every variable back to the frame
    pub fn leave(&self, builder: &mut FunctionBuilder<'_>, slots: Value) -> Result<(), RuntimeError> {
        self.spill(builder, slots, &self.registers)
    }
}

/// Registers an instruction reads or writes, sorted
pub fn instruction_registers(opcode: &Opcode) -> Vec<RegisterId> {
    let mut regs = Vec::new();
    opcode.for_each_register(|r| regs.push(r));
    regs.sort_unstable();
    regs.dedup();
    regs
}
