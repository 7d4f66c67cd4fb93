//! Loop translation from register bytecode to Cranelift IR
//!
//! Every instruction of the loop range gets its own block. Instructions
//! with a native form check the tags of their operands first and compute
//! on the raw payloads; when a guard fails, or an integer result leaves
//! `i64`, the instruction is handed to `jit_rt_exec`, which runs it with the
//! interpreter's generic semantics against the slot array.
//!
//! Control flow that stays inside the range is native. Leaving the range,
//! falling through past the back-edge or reaching a `Return` writes every
//! register back and returns the bytecode address to resume at.

use bytecode_system::{
    BinaryOp, BytecodeChunk, CompareOp, Constant, LoopRange, Opcode, RegisterId, UnaryOp,
};
use core_types::{tag, ErrorKind, RuntimeError};
use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, Block, FuncRef, InstBuilder, MemFlags, Value};
use cranelift_frontend::FunctionBuilder;
use interpreter::jit_abi::{EXIT_FAULT, JIT_BRANCH, JIT_ERROR};
use interpreter::RegisterMap;

use crate::osr::{instruction_registers, RegisterVars};

/// Runtime helpers imported into the function being built
#[derive(Debug, Clone, Copy)]
pub struct RuntimeHelpers {
    /// `jit_rt_exec(ctx, slots, pc) -> status`
    pub exec: FuncRef,
    /// `jit_rt_truthy(ctx, tag, bits, pc) -> 0 | 1 | -1`
    pub truthy: FuncRef,
}

#[derive(Debug, Clone, Copy)]
enum IntArith {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy)]
enum FloatArith {
    Add,
    Sub,
    Mul,
    Div,
}

/// Native forms of one binary operator
#[derive(Debug, Clone, Copy)]
struct NativeArith {
    int: Option<IntArith>,
    float: Option<FloatArith>,
}

impl NativeArith {
    fn of(op: BinaryOp) -> Option<Self> {
        let (int, float) = match op {
            BinaryOp::Add => (Some(IntArith::Add), Some(FloatArith::Add)),
            BinaryOp::Sub => (Some(IntArith::Sub), Some(FloatArith::Sub)),
            BinaryOp::Mul => (Some(IntArith::Mul), Some(FloatArith::Mul)),
            BinaryOp::Div => (None, Some(FloatArith::Div)),
            BinaryOp::BitAnd => (Some(IntArith::And), None),
            BinaryOp::BitOr => (Some(IntArith::Or), None),
            BinaryOp::BitXor => (Some(IntArith::Xor), None),
            BinaryOp::FloorDiv
            | BinaryOp::Mod
            | BinaryOp::Pow
            | BinaryOp::Shl
            | BinaryOp::Shr => return None,
        };
        Some(Self { int, float })
    }
}

fn condition_codes(op: CompareOp) -> Option<(IntCC, FloatCC)> {
    match op {
        CompareOp::Lt => Some((IntCC::SignedLessThan, FloatCC::LessThan)),
        CompareOp::Le => Some((IntCC::SignedLessThanOrEqual, FloatCC::LessThanOrEqual)),
        CompareOp::Gt => Some((IntCC::SignedGreaterThan, FloatCC::GreaterThan)),
        CompareOp::Ge => Some((IntCC::SignedGreaterThanOrEqual, FloatCC::GreaterThanOrEqual)),
        CompareOp::Eq => Some((IntCC::Equal, FloatCC::Equal)),
        // unordered compares as not-equal, so NaN != NaN
        CompareOp::Ne => Some((IntCC::NotEqual, FloatCC::NotEqual)),
        CompareOp::Is | CompareOp::IsNot | CompareOp::In | CompareOp::NotIn => None,
    }
}

/// Operand of a native instruction
#[derive(Debug, Clone, Copy)]
enum Operand {
    Reg(RegisterId),
    Int(i64),
}

/// Reject loops the translator cannot handle
///
/// Exception handlers need the interpreter's handler stack, so a loop that
/// pushes or pops one is never compiled.
pub fn check_loop(chunk: &BytecodeChunk, range: LoopRange) -> Result<(), RuntimeError> {
    if range.back_edge >= chunk.instructions.len() {
        return Err(RuntimeError::internal(format!(
            "loop [{}, {}] exceeds {} instructions",
            range.header,
            range.back_edge,
            chunk.instructions.len()
        )));
    }
    for pc in range.header..=range.back_edge {
        let name = match chunk.instructions[pc].opcode {
            Opcode::PushTry { .. } => "PushTry",
            Opcode::PopTry => "PopTry",
            _ => continue,
        };
        return Err(RuntimeError::new(
            ErrorKind::JitCompileUnsupported,
            format!("{} at PC {} inside the loop", name, pc),
        ));
    }
    Ok(())
}

/// Builds the native entry of one loop
pub struct LoopTranslator<'a, 'f> {
    builder: FunctionBuilder<'f>,
    chunk: &'a BytecodeChunk,
    range: LoopRange,
    vars: RegisterVars,
    helpers: RuntimeHelpers,
    ctx: Value,
    slots: Value,
    blocks: Vec<Block>,
    fault: Block,
}

impl<'a, 'f> LoopTranslator<'a, 'f> {
    /// Emit the entry block: take `(ctx, slots)`, seed the register
    /// variables and jump to the loop header.
    pub fn new(
        mut builder: FunctionBuilder<'f>,
        chunk: &'a BytecodeChunk,
        range: LoopRange,
        map: &RegisterMap,
        helpers: RuntimeHelpers,
    ) -> Result<Self, RuntimeError> {
        check_loop(chunk, range)?;

        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let (ctx, slots) = match builder.block_params(entry) {
            &[ctx, slots] => (ctx, slots),
            params => {
                return Err(RuntimeError::internal(format!(
                    "loop entry takes 2 parameters, found {}",
                    params.len()
                )))
            }
        };

        let vars = RegisterVars::declare(&mut builder, map);
        vars.enter(&mut builder, slots)?;

        let blocks: Vec<Block> = (0..range.len()).map(|_| builder.create_block()).collect();
        let fault = builder.create_block();
        builder.ins().jump(blocks[0], &[]);

        Ok(Self {
            builder,
            chunk,
            range,
            vars,
            helpers,
            ctx,
            slots,
            blocks,
            fault,
        })
    }

    /// Translate every instruction of the range and finish the function
    pub fn translate(mut self) -> Result<(), RuntimeError> {
        for pc in self.range.header..=self.range.back_edge {
            let block = self.block(pc);
            self.builder.switch_to_block(block);
            self.instruction(pc)?;
        }

        self.builder.switch_to_block(self.fault);
        self.vars.leave(&mut self.builder, self.slots)?;
        let fault = self.builder.ins().iconst(types::I64, EXIT_FAULT);
        self.builder.ins().return_(&[fault]);

        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    fn block(&self, pc: usize) -> Block {
        self.blocks[pc - self.range.header]
    }

    fn instruction(&mut self, pc: usize) -> Result<(), RuntimeError> {
        let chunk = self.chunk;
        let next = pc + 1;
        match chunk.instructions[pc].opcode {
            Opcode::Nop => self.goto(next),
            Opcode::LoadInt { dst, value } => {
                self.set_const(dst, tag::INT, value)?;
                self.goto(next)
            }
            Opcode::LoadBool { dst, value } => {
                self.set_const(dst, tag::BOOL, i64::from(value))?;
                self.goto(next)
            }
            Opcode::LoadNone { dst } => {
                self.set_const(dst, tag::NONE, 0)?;
                self.goto(next)
            }
            Opcode::LoadConst { dst, index } => {
                let raw = match chunk.constants.get(index as usize) {
                    Some(Constant::Int(i)) => Some((tag::INT, *i)),
                    Some(Constant::Float(f)) => Some((tag::FLOAT, f.to_bits() as i64)),
                    Some(Constant::Bool(b)) => Some((tag::BOOL, i64::from(*b))),
                    Some(Constant::None) => Some((tag::NONE, 0)),
                    Some(Constant::Str(_)) | None => None,
                };
                match raw {
                    Some((raw_tag, bits)) => {
                        self.set_const(dst, raw_tag, bits)?;
                        self.goto(next)
                    }
                    None => self.generic(pc),
                }
            }
            Opcode::MoveReg { dst, src } => {
                let (raw_tag, bits) = self.vars.read(&mut self.builder, src)?;
                self.vars.write(&mut self.builder, dst, raw_tag, bits)?;
                self.goto(next)
            }

            Opcode::Binary { op, dst, lhs, rhs } => match NativeArith::of(op) {
                Some(arith) => self.arith(pc, arith, dst, Operand::Reg(lhs), Operand::Reg(rhs)),
                None => self.generic(pc),
            },
            Opcode::FastIntAdd { dst, lhs, rhs } | Opcode::FastFloatAdd { dst, lhs, rhs } => {
                self.binary(pc, BinaryOp::Add, dst, Operand::Reg(lhs), Operand::Reg(rhs))
            }
            Opcode::FastIntSub { dst, lhs, rhs } | Opcode::FastFloatSub { dst, lhs, rhs } => {
                self.binary(pc, BinaryOp::Sub, dst, Operand::Reg(lhs), Operand::Reg(rhs))
            }
            Opcode::FastIntMul { dst, lhs, rhs } | Opcode::FastFloatMul { dst, lhs, rhs } => {
                self.binary(pc, BinaryOp::Mul, dst, Operand::Reg(lhs), Operand::Reg(rhs))
            }
            Opcode::FastFloatDiv { dst, lhs, rhs } => {
                self.binary(pc, BinaryOp::Div, dst, Operand::Reg(lhs), Operand::Reg(rhs))
            }
            Opcode::IncLocal { reg } => {
                self.binary(pc, BinaryOp::Add, reg, Operand::Reg(reg), Operand::Int(1))
            }
            Opcode::DecLocal { reg } => {
                self.binary(pc, BinaryOp::Sub, reg, Operand::Reg(reg), Operand::Int(1))
            }
            Opcode::LoadAddStore { reg, src } => {
                self.binary(pc, BinaryOp::Add, reg, Operand::Reg(reg), Operand::Reg(src))
            }
            Opcode::LoadSubStore { reg, src } => {
                self.binary(pc, BinaryOp::Sub, reg, Operand::Reg(reg), Operand::Reg(src))
            }
            Opcode::LoadMulStore { reg, src } => {
                self.binary(pc, BinaryOp::Mul, reg, Operand::Reg(reg), Operand::Reg(src))
            }
            Opcode::LoadDivStore { reg, src } => {
                self.binary(pc, BinaryOp::Div, reg, Operand::Reg(reg), Operand::Reg(src))
            }

            Opcode::Compare { op, dst, lhs, rhs } => match condition_codes(op) {
                Some(codes) => self.compare(pc, codes, dst, lhs, rhs),
                None => self.generic(pc),
            },
            Opcode::FastIntLt { dst, lhs, rhs } => {
                self.compare(pc, (IntCC::SignedLessThan, FloatCC::LessThan), dst, lhs, rhs)
            }
            Opcode::Unary {
                op: UnaryOp::Neg,
                dst,
                src,
            } => self.negate(pc, dst, src),

            Opcode::Jump { target } => self.goto(target as usize),
            Opcode::JumpIfTrue { cond, target } => self.cond_jump(pc, cond, target as usize, true),
            Opcode::JumpIfFalse { cond, target } => {
                self.cond_jump(pc, cond, target as usize, false)
            }
            Opcode::Return { .. } | Opcode::ReturnNone => self.exit(pc),
            Opcode::PushTry { .. } | Opcode::PopTry => Err(RuntimeError::new(
                ErrorKind::JitCompileUnsupported,
                format!("exception handler at PC {}", pc),
            )),

            _ => self.generic(pc),
        }
    }

    /// Continue at `pc`: a native jump inside the loop, an exit otherwise
    fn goto(&mut self, pc: usize) -> Result<(), RuntimeError> {
        if self.range.contains(pc) {
            let block = self.block(pc);
            self.builder.ins().jump(block, &[]);
            Ok(())
        } else {
            self.exit(pc)
        }
    }

    /// Write every register back and resume interpretation at `pc`
    fn exit(&mut self, pc: usize) -> Result<(), RuntimeError> {
        self.vars.leave(&mut self.builder, self.slots)?;
        let resume = self.builder.ins().iconst(types::I64, pc as i64);
        self.builder.ins().return_(&[resume]);
        Ok(())
    }

    /// Two-way branch where either side may leave the loop
    fn branch(&mut self, cond: Value, taken: usize, not_taken: usize) -> Result<(), RuntimeError> {
        let yes = self.builder.create_block();
        let no = self.builder.create_block();
        self.builder.ins().brif(cond, yes, &[], no, &[]);
        self.builder.switch_to_block(yes);
        self.goto(taken)?;
        self.builder.switch_to_block(no);
        self.goto(not_taken)
    }

    fn set_const(&mut self, dst: RegisterId, raw_tag: u64, bits: i64) -> Result<(), RuntimeError> {
        let tag_value = self.builder.ins().iconst(types::I64, raw_tag as i64);
        let bits_value = self.builder.ins().iconst(types::I64, bits);
        self.vars.write(&mut self.builder, dst, tag_value, bits_value)
    }

    fn operand(&mut self, operand: Operand) -> Result<(Value, Value), RuntimeError> {
        match operand {
            Operand::Reg(reg) => self.vars.read(&mut self.builder, reg),
            Operand::Int(i) => {
                let tag_value = self.builder.ins().iconst(types::I64, tag::INT as i64);
                let bits = self.builder.ins().iconst(types::I64, i);
                Ok((tag_value, bits))
            }
        }
    }

    fn has_tag(&mut self, tag_value: Value, expected: u64) -> Value {
        self.builder
            .ins()
            .icmp_imm(IntCC::Equal, tag_value, expected as i64)
    }

    fn both_tagged(&mut self, lhs: Value, rhs: Value, expected: u64) -> Value {
        let l = self.has_tag(lhs, expected);
        let r = self.has_tag(rhs, expected);
        self.builder.ins().band(l, r)
    }

    fn as_float(&mut self, bits: Value) -> Value {
        self.builder.ins().bitcast(types::F64, MemFlags::new(), bits)
    }

    fn as_bits(&mut self, float: Value) -> Value {
        self.builder.ins().bitcast(types::I64, MemFlags::new(), float)
    }

    /// Run the instruction at `pc` through `jit_rt_exec`.
    ///
    /// Registers of the instruction are spilled before the call and
    /// reloaded after it; a failed helper jumps to the fault exit.
    fn call_exec(&mut self, pc: usize) -> Result<Value, RuntimeError> {
        let regs = instruction_registers(&self.chunk.instructions[pc].opcode);
        self.vars.spill(&mut self.builder, self.slots, &regs)?;
        let pc_value = self.builder.ins().iconst(types::I64, pc as i64);
        let call = self
            .builder
            .ins()
            .call(self.helpers.exec, &[self.ctx, self.slots, pc_value]);
        let status = self.builder.inst_results(call)[0];
        self.vars.reload(&mut self.builder, self.slots, &regs)?;

        let failed = self.builder.ins().icmp_imm(IntCC::Equal, status, JIT_ERROR);
        let ok = self.builder.create_block();
        self.builder.ins().brif(failed, self.fault, &[], ok, &[]);
        self.builder.switch_to_block(ok);
        Ok(status)
    }

    /// Execute the instruction at `pc` with generic semantics and continue
    fn generic(&mut self, pc: usize) -> Result<(), RuntimeError> {
        let status = self.call_exec(pc)?;
        match self.chunk.instructions[pc].opcode.branch_target() {
            Some(target) => {
                let taken = self.builder.ins().icmp_imm(IntCC::Equal, status, JIT_BRANCH);
                self.branch(taken, target, pc + 1)
            }
            None => self.goto(pc + 1),
        }
    }

    fn binary(
        &mut self,
        pc: usize,
        op: BinaryOp,
        dst: RegisterId,
        lhs: Operand,
        rhs: Operand,
    ) -> Result<(), RuntimeError> {
        match NativeArith::of(op) {
            Some(arith) => self.arith(pc, arith, dst, lhs, rhs),
            None => self.generic(pc),
        }
    }

    /// Result and overflow flag of an `i64` operation
    fn int_op(&mut self, op: IntArith, a: Value, b: Value) -> (Value, Option<Value>) {
        match op {
            IntArith::Add => {
                let sum = self.builder.ins().iadd(a, b);
                // signs of both operands differ from the sign of the sum
                let x = self.builder.ins().bxor(a, sum);
                let y = self.builder.ins().bxor(b, sum);
                let both = self.builder.ins().band(x, y);
                let overflow = self.builder.ins().icmp_imm(IntCC::SignedLessThan, both, 0);
                (sum, Some(overflow))
            }
            IntArith::Sub => {
                let diff = self.builder.ins().isub(a, b);
                let x = self.builder.ins().bxor(a, b);
                let y = self.builder.ins().bxor(a, diff);
                let both = self.builder.ins().band(x, y);
                let overflow = self.builder.ins().icmp_imm(IntCC::SignedLessThan, both, 0);
                (diff, Some(overflow))
            }
            IntArith::Mul => {
                let low = self.builder.ins().imul(a, b);
                let high = self.builder.ins().smulhi(a, b);
                let sign = self.builder.ins().sshr_imm(low, 63);
                let overflow = self.builder.ins().icmp(IntCC::NotEqual, high, sign);
                (low, Some(overflow))
            }
            IntArith::And => (self.builder.ins().band(a, b), None),
            IntArith::Or => (self.builder.ins().bor(a, b), None),
            IntArith::Xor => (self.builder.ins().bxor(a, b), None),
        }
    }

    fn float_op(&mut self, op: FloatArith, a: Value, b: Value) -> Value {
        let x = self.as_float(a);
        let y = self.as_float(b);
        let result = match op {
            FloatArith::Add => self.builder.ins().fadd(x, y),
            FloatArith::Sub => self.builder.ins().fsub(x, y),
            FloatArith::Mul => self.builder.ins().fmul(x, y),
            FloatArith::Div => self.builder.ins().fdiv(x, y),
        };
        self.as_bits(result)
    }

    /// `dst = lhs op rhs`: integer form, then float form, then the helper
    fn arith(
        &mut self,
        pc: usize,
        arith: NativeArith,
        dst: RegisterId,
        lhs: Operand,
        rhs: Operand,
    ) -> Result<(), RuntimeError> {
        let (lhs_tag, lhs_bits) = self.operand(lhs)?;
        let (rhs_tag, rhs_bits) = self.operand(rhs)?;
        let slow = self.builder.create_block();

        if let Some(op) = arith.int {
            let int_block = self.builder.create_block();
            let otherwise = self.builder.create_block();
            let both_int = self.both_tagged(lhs_tag, rhs_tag, tag::INT);
            self.builder
                .ins()
                .brif(both_int, int_block, &[], otherwise, &[]);

            self.builder.switch_to_block(int_block);
            let (result, overflow) = self.int_op(op, lhs_bits, rhs_bits);
            if let Some(overflow) = overflow {
                let store = self.builder.create_block();
                self.builder.ins().brif(overflow, slow, &[], store, &[]);
                self.builder.switch_to_block(store);
            }
            let int_tag = self.builder.ins().iconst(types::I64, tag::INT as i64);
            self.vars.write(&mut self.builder, dst, int_tag, result)?;
            self.goto(pc + 1)?;

            self.builder.switch_to_block(otherwise);
        }

        if let Some(op) = arith.float {
            let float_block = self.builder.create_block();
            let otherwise = self.builder.create_block();
            let both_float = self.both_tagged(lhs_tag, rhs_tag, tag::FLOAT);
            self.builder
                .ins()
                .brif(both_float, float_block, &[], otherwise, &[]);

            self.builder.switch_to_block(float_block);
            let result = self.float_op(op, lhs_bits, rhs_bits);
            let float_tag = self.builder.ins().iconst(types::I64, tag::FLOAT as i64);
            self.vars.write(&mut self.builder, dst, float_tag, result)?;
            self.goto(pc + 1)?;

            self.builder.switch_to_block(otherwise);
        }

        self.builder.ins().jump(slow, &[]);
        self.builder.switch_to_block(slow);
        self.generic(pc)
    }

    fn compare(
        &mut self,
        pc: usize,
        (int_cc, float_cc): (IntCC, FloatCC),
        dst: RegisterId,
        lhs: RegisterId,
        rhs: RegisterId,
    ) -> Result<(), RuntimeError> {
        let (lhs_tag, lhs_bits) = self.vars.read(&mut self.builder, lhs)?;
        let (rhs_tag, rhs_bits) = self.vars.read(&mut self.builder, rhs)?;
        let int_block = self.builder.create_block();
        let not_int = self.builder.create_block();
        let float_block = self.builder.create_block();
        let slow = self.builder.create_block();

        let both_int = self.both_tagged(lhs_tag, rhs_tag, tag::INT);
        self.builder
            .ins()
            .brif(both_int, int_block, &[], not_int, &[]);

        self.builder.switch_to_block(int_block);
        let flag = self.builder.ins().icmp(int_cc, lhs_bits, rhs_bits);
        self.store_bool(dst, flag)?;
        self.goto(pc + 1)?;

        self.builder.switch_to_block(not_int);
        let both_float = self.both_tagged(lhs_tag, rhs_tag, tag::FLOAT);
        self.builder
            .ins()
            .brif(both_float, float_block, &[], slow, &[]);

        self.builder.switch_to_block(float_block);
        let x = self.as_float(lhs_bits);
        let y = self.as_float(rhs_bits);
        let flag = self.builder.ins().fcmp(float_cc, x, y);
        self.store_bool(dst, flag)?;
        self.goto(pc + 1)?;

        self.builder.switch_to_block(slow);
        self.generic(pc)
    }

    fn store_bool(&mut self, dst: RegisterId, flag: Value) -> Result<(), RuntimeError> {
        let bits = self.builder.ins().uextend(types::I64, flag);
        let bool_tag = self.builder.ins().iconst(types::I64, tag::BOOL as i64);
        self.vars.write(&mut self.builder, dst, bool_tag, bits)
    }

    /// `dst = -src`; `-i64::MIN` goes through the helper
    fn negate(&mut self, pc: usize, dst: RegisterId, src: RegisterId) -> Result<(), RuntimeError> {
        let (src_tag, src_bits) = self.vars.read(&mut self.builder, src)?;
        let int_block = self.builder.create_block();
        let not_int = self.builder.create_block();
        let negate_int = self.builder.create_block();
        let float_block = self.builder.create_block();
        let slow = self.builder.create_block();

        let is_int = self.has_tag(src_tag, tag::INT);
        self.builder.ins().brif(is_int, int_block, &[], not_int, &[]);

        self.builder.switch_to_block(int_block);
        let is_min = self
            .builder
            .ins()
            .icmp_imm(IntCC::Equal, src_bits, i64::MIN);
        self.builder.ins().brif(is_min, slow, &[], negate_int, &[]);

        self.builder.switch_to_block(negate_int);
        let negated = self.builder.ins().ineg(src_bits);
        let int_tag = self.builder.ins().iconst(types::I64, tag::INT as i64);
        self.vars.write(&mut self.builder, dst, int_tag, negated)?;
        self.goto(pc + 1)?;

        self.builder.switch_to_block(not_int);
        let is_float = self.has_tag(src_tag, tag::FLOAT);
        self.builder
            .ins()
            .brif(is_float, float_block, &[], slow, &[]);

        self.builder.switch_to_block(float_block);
        let x = self.as_float(src_bits);
        let negated = self.builder.ins().fneg(x);
        let bits = self.as_bits(negated);
        let float_tag = self.builder.ins().iconst(types::I64, tag::FLOAT as i64);
        self.vars.write(&mut self.builder, dst, float_tag, bits)?;
        self.goto(pc + 1)?;

        self.builder.switch_to_block(slow);
        self.generic(pc)
    }

    /// Truthiness of `cond` as a 0/1 `i64`
    ///
    /// Primitives are tested inline; heap objects call `jit_rt_truthy`.
    fn truthiness(&mut self, pc: usize, cond: RegisterId) -> Result<Value, RuntimeError> {
        let (cond_tag, cond_bits) = self.vars.read(&mut self.builder, cond)?;
        let object_block = self.builder.create_block();
        let inline_block = self.builder.create_block();
        let float_block = self.builder.create_block();
        let int_block = self.builder.create_block();
        let object_ok = self.builder.create_block();
        let join = self.builder.create_block();
        let truth = self.builder.append_block_param(join, types::I64);

        let is_object = self.has_tag(cond_tag, tag::OBJECT);
        self.builder
            .ins()
            .brif(is_object, object_block, &[], inline_block, &[]);

        self.builder.switch_to_block(object_block);
        let pc_value = self.builder.ins().iconst(types::I64, pc as i64);
        let call = self
            .builder
            .ins()
            .call(self.helpers.truthy, &[self.ctx, cond_tag, cond_bits, pc_value]);
        let result = self.builder.inst_results(call)[0];
        let failed = self
            .builder
            .ins()
            .icmp_imm(IntCC::SignedLessThan, result, 0);
        self.builder
            .ins()
            .brif(failed, self.fault, &[], object_ok, &[]);
        self.builder.switch_to_block(object_ok);
        self.builder.ins().jump(join, &[result]);

        self.builder.switch_to_block(inline_block);
        let is_float = self.has_tag(cond_tag, tag::FLOAT);
        self.builder
            .ins()
            .brif(is_float, float_block, &[], int_block, &[]);

        self.builder.switch_to_block(float_block);
        let x = self.as_float(cond_bits);
        let zero = self.builder.ins().f64const(0.0);
        // NaN is truthy; -0.0 is not
        let nonzero = self.builder.ins().fcmp(FloatCC::NotEqual, x, zero);
        let flag = self.builder.ins().uextend(types::I64, nonzero);
        self.builder.ins().jump(join, &[flag]);

        // None, Bool and Int: a zero payload is false
        self.builder.switch_to_block(int_block);
        let nonzero = self.builder.ins().icmp_imm(IntCC::NotEqual, cond_bits, 0);
        let flag = self.builder.ins().uextend(types::I64, nonzero);
        self.builder.ins().jump(join, &[flag]);

        self.builder.switch_to_block(join);
        Ok(truth)
    }

    fn cond_jump(
        &mut self,
        pc: usize,
        cond: RegisterId,
        target: usize,
        jump_if: bool,
    ) -> Result<(), RuntimeError> {
        let truth = self.truthiness(pc, cond)?;
        let is_true = self.builder.ins().icmp_imm(IntCC::NotEqual, truth, 0);
        if jump_if {
            self.branch(is_true, target, pc + 1)
        } else {
            self.branch(is_true, pc + 1, target)
        }
    }
}
