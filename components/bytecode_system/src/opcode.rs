//! Bytecode opcodes for the register VM
//!
//! Every opcode names its operands explicitly: registers are
//! [`RegisterId`]s, names and constants are indices into the chunk's
//! constant pool, jump targets are absolute instruction indices.

use serde::{Deserialize, Serialize};

/// Register identifier for local variable slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterId(pub u32);

impl RegisterId {
    /// Index into the frame's register array
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The `n`-th register after this one
    #[inline]
    pub fn offset(self, n: u32) -> RegisterId {
        RegisterId(self.0.wrapping_add(n))
    }
}

/// Generic binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` (true division)
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
}

impl BinaryOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `is`
    Is,
    /// `is not`
    IsNot,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

impl CompareOp {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Pos,
    /// `not x`
    Not,
    /// `~x`
    Invert,
}

/// Bytecode opcodes
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Opcode {
    // Loads and moves
    /// Load constant pool entry `index` into `dst`
    LoadConst { dst: RegisterId, index: u32 },
    /// Load an inline integer immediate
    LoadInt { dst: RegisterId, value: i64 },
    /// Load a boolean immediate
    LoadBool { dst: RegisterId, value: bool },
    /// Load `None`
    LoadNone { dst: RegisterId },
    /// Copy `src` into `dst`
    MoveReg { dst: RegisterId, src: RegisterId },
    /// Load a global (or builtin) by name constant
    LoadGlobal { dst: RegisterId, name: u32 },
    /// Store `src` into a global by name constant
    StoreGlobal { name: u32, src: RegisterId },

    // Generic operations
    /// `dst = lhs <op> rhs`
    Binary {
        op: BinaryOp,
        dst: RegisterId,
        lhs: RegisterId,
        rhs: RegisterId,
    },
    /// `dst = lhs <cmp> rhs`
    Compare {
        op: CompareOp,
        dst: RegisterId,
        lhs: RegisterId,
        rhs: RegisterId,
    },
    /// `dst = <op> src`
    Unary {
        op: UnaryOp,
        dst: RegisterId,
        src: RegisterId,
    },

    // Typed fast paths (same semantics as the generic op)
    /// Addition emitted where both operands are expected to be ints
    FastIntAdd { dst: RegisterId, lhs: RegisterId, rhs: RegisterId },
    /// Subtraction emitted where both operands are expected to be ints
    FastIntSub { dst: RegisterId, lhs: RegisterId, rhs: RegisterId },
    /// Multiplication emitted where both operands are expected to be ints
    FastIntMul { dst: RegisterId, lhs: RegisterId, rhs: RegisterId },
    /// `<` emitted where both operands are expected to be ints
    FastIntLt { dst: RegisterId, lhs: RegisterId, rhs: RegisterId },
    /// Addition emitted where both operands are expected to be floats
    FastFloatAdd { dst: RegisterId, lhs: RegisterId, rhs: RegisterId },
    /// Subtraction emitted where both operands are expected to be floats
    FastFloatSub { dst: RegisterId, lhs: RegisterId, rhs: RegisterId },
    /// Multiplication emitted where both operands are expected to be floats
    FastFloatMul { dst: RegisterId, lhs: RegisterId, rhs: RegisterId },
    /// Division emitted where both operands are expected to be floats
    FastFloatDiv { dst: RegisterId, lhs: RegisterId, rhs: RegisterId },

    // Fused read-modify-write on a local
    /// `reg += 1`
    IncLocal { reg: RegisterId },
    /// `reg -= 1`
    DecLocal { reg: RegisterId },
    /// `reg += src`
    LoadAddStore { reg: RegisterId, src: RegisterId },
    /// `reg -= src`
    LoadSubStore { reg: RegisterId, src: RegisterId },
    /// `reg *= src`
    LoadMulStore { reg: RegisterId, src: RegisterId },
    /// `reg /= src`
    LoadDivStore { reg: RegisterId, src: RegisterId },

    // Control flow
    /// Unconditional jump
    Jump { target: u32 },
    /// Jump when `cond` is truthy
    JumpIfTrue { cond: RegisterId, target: u32 },
    /// Jump when `cond` is falsy
    JumpIfFalse { cond: RegisterId, target: u32 },
    /// Return `src` to the caller
    Return { src: RegisterId },
    /// Return `None` to the caller
    ReturnNone,
    /// Does nothing
    Nop,

    // Containers and strings
    /// `dst = [start .. start+count]`
    BuildList { dst: RegisterId, start: RegisterId, count: u32 },
    /// `dst = (start .. start+count)`
    BuildTuple { dst: RegisterId, start: RegisterId, count: u32 },
    /// `dst = {start .. start+count}`
    BuildSet { dst: RegisterId, start: RegisterId, count: u32 },
    /// `dst = {k0: v0, ...}` from `count` key/value register pairs
    BuildDict { dst: RegisterId, start: RegisterId, count: u32 },
    /// Concatenate `str()` of `count` registers (f-strings)
    BuildString { dst: RegisterId, start: RegisterId, count: u32 },
    /// `dst = container[key]`
    GetItem { dst: RegisterId, container: RegisterId, key: RegisterId },
    /// `container[key] = src`
    SetItem { container: RegisterId, key: RegisterId, src: RegisterId },
    /// `dst = container[start:stop]`; bounds may be `None`
    Slice {
        dst: RegisterId,
        container: RegisterId,
        start: RegisterId,
        stop: RegisterId,
    },
    /// `list.append(src)`
    Append { list: RegisterId, src: RegisterId },
    /// `dst = len(src)`
    Len { dst: RegisterId, src: RegisterId },
    /// `dst = iter(src)`
    GetIter { dst: RegisterId, src: RegisterId },
    /// `dst = next(iter)`, or jump to `exit` when exhausted
    ForIter { dst: RegisterId, iter: RegisterId, exit: u32 },

    // Attributes and calls
    /// `dst = obj.<name>`
    GetAttr { dst: RegisterId, obj: RegisterId, name: u32 },
    /// `obj.<name> = src`
    SetAttr { obj: RegisterId, name: u32, src: RegisterId },
    /// `dst = obj.<name>(args .. args+argc)`
    CallMethod {
        dst: RegisterId,
        obj: RegisterId,
        name: u32,
        args: RegisterId,
        argc: u32,
    },
    /// `dst = callee(args .. args+argc)`
    Call {
        dst: RegisterId,
        callee: RegisterId,
        args: RegisterId,
        argc: u32,
    },
    /// `dst = <function object for nested chunk `function`>`
    MakeFunction { dst: RegisterId, function: u32 },
    /// `dst = class <name>(base): namespace` where `namespace` is a dict
    MakeClass {
        dst: RegisterId,
        name: u32,
        namespace: RegisterId,
        base: Option<RegisterId>,
    },

    // Exceptions
    /// Install a handler: on error, store the exception in `dst` and jump to `handler`
    PushTry { handler: u32, dst: RegisterId },
    /// Remove the innermost handler
    PopTry,
    /// Raise the exception (or exception class) in `src`
    Raise { src: RegisterId },
}

impl Opcode {
    /// Short lowercase name used by the disassembler
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::LoadConst { .. } => "load_const",
            Opcode::LoadInt { .. } => "load_int",
            Opcode::LoadBool { .. } => "load_bool",
            Opcode::LoadNone { .. } => "load_none",
            Opcode::MoveReg { .. } => "move",
            Opcode::LoadGlobal { .. } => "load_global",
            Opcode::StoreGlobal { .. } => "store_global",
            Opcode::Binary { .. } => "binary",
            Opcode::Compare { .. } => "compare",
            Opcode::Unary { .. } => "unary",
            Opcode::FastIntAdd { .. } => "int_add",
            Opcode::FastIntSub { .. } => "int_sub",
            Opcode::FastIntMul { .. } => "int_mul",
            Opcode::FastIntLt { .. } => "int_lt",
            Opcode::FastFloatAdd { .. } => "float_add",
            Opcode::FastFloatSub { .. } => "float_sub",
            Opcode::FastFloatMul { .. } => "float_mul",
            Opcode::FastFloatDiv { .. } => "float_div",
            Opcode::IncLocal { .. } => "inc",
            Opcode::DecLocal { .. } => "dec",
            Opcode::LoadAddStore { .. } => "add_store",
            Opcode::LoadSubStore { .. } => "sub_store",
            Opcode::LoadMulStore { .. } => "mul_store",
            Opcode::LoadDivStore { .. } => "div_store",
            Opcode::Jump { .. } => "jump",
            Opcode::JumpIfTrue { .. } => "jump_if_true",
            Opcode::JumpIfFalse { .. } => "jump_if_false",
            Opcode::Return { .. } => "return",
            Opcode::ReturnNone => "return_none",
            Opcode::Nop => "nop",
            Opcode::BuildList { .. } => "build_list",
            Opcode::BuildTuple { .. } => "build_tuple",
            Opcode::BuildSet { .. } => "build_set",
            Opcode::BuildDict { .. } => "build_dict",
            Opcode::BuildString { .. } => "build_string",
            Opcode::GetItem { .. } => "get_item",
            Opcode::SetItem { .. } => "set_item",
            Opcode::Slice { .. } => "slice",
            Opcode::Append { .. } => "append",
            Opcode::Len { .. } => "len",
            Opcode::GetIter { .. } => "get_iter",
            Opcode::ForIter { .. } => "for_iter",
            Opcode::GetAttr { .. } => "get_attr",
            Opcode::SetAttr { .. } => "set_attr",
            Opcode::CallMethod { .. } => "call_method",
            Opcode::Call { .. } => "call",
            Opcode::MakeFunction { .. } => "make_function",
            Opcode::MakeClass { .. } => "make_class",
            Opcode::PushTry { .. } => "push_try",
            Opcode::PopTry => "pop_try",
            Opcode::Raise { .. } => "raise",
        }
    }

    /// Target of a jump instruction that may form a loop back-edge.
    ///
    /// `ForIter` exits and `PushTry` handlers are forward-only and are not
    /// reported here.
    #[inline]
    pub fn jump_target(&self) -> Option<usize> {
        match *self {
            Opcode::Jump { target }
            | Opcode::JumpIfTrue { target, .. }
            | Opcode::JumpIfFalse { target, .. } => Some(target as usize),
            _ => None,
        }
    }

    /// Control-flow target this instruction can transfer to, other than
    /// the next instruction.
    pub fn branch_target(&self) -> Option<usize> {
        match *self {
            Opcode::ForIter { exit, .. } => Some(exit as usize),
            Opcode::PushTry { handler, .. } => Some(handler as usize),
            _ => self.jump_target(),
        }
    }

    /// Whether control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Opcode::Jump { .. } | Opcode::Return { .. } | Opcode::ReturnNone | Opcode::Raise { .. }
        )
    }

    /// Constant-pool indices used as names (must be string constants).
    pub fn name_operand(&self) -> Option<u32> {
        match *self {
            Opcode::LoadGlobal { name, .. }
            | Opcode::StoreGlobal { name, .. }
            | Opcode::GetAttr { name, .. }
            | Opcode::SetAttr { name, .. }
            | Opcode::CallMethod { name, .. }
            | Opcode::MakeClass { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Call `f` for every register this instruction reads or writes,
    /// including every register of an operand range.
    pub fn for_each_register(&self, mut f: impl FnMut(RegisterId)) {
        fn range(start: RegisterId, count: u32, f: &mut dyn FnMut(RegisterId)) {
            for n in 0..count {
                f(start.offset(n));
            }
        }
        match *self {
            Opcode::LoadConst { dst, .. }
            | Opcode::LoadInt { dst, .. }
            | Opcode::LoadBool { dst, .. }
            | Opcode::LoadNone { dst }
            | Opcode::LoadGlobal { dst, .. }
            | Opcode::MakeFunction { dst, .. } => f(dst),
            Opcode::StoreGlobal { src, .. } | Opcode::Return { src } | Opcode::Raise { src } => f(src),
            Opcode::MoveReg { dst, src }
            | Opcode::Unary { dst, src, .. }
            | Opcode::Len { dst, src }
            | Opcode::GetIter { dst, src } => {
                f(dst);
                f(src);
            }
            Opcode::Binary { dst, lhs, rhs, .. }
            | Opcode::Compare { dst, lhs, rhs, .. }
            | Opcode::FastIntAdd { dst, lhs, rhs }
            | Opcode::FastIntSub { dst, lhs, rhs }
            | Opcode::FastIntMul { dst, lhs, rhs }
            | Opcode::FastIntLt { dst, lhs, rhs }
            | Opcode::FastFloatAdd { dst, lhs, rhs }
            | Opcode::FastFloatSub { dst, lhs, rhs }
            | Opcode::FastFloatMul { dst, lhs, rhs }
            | Opcode::FastFloatDiv { dst, lhs, rhs } => {
                f(dst);
                f(lhs);
                f(rhs);
            }
            Opcode::IncLocal { reg } | Opcode::DecLocal { reg } => f(reg),
            Opcode::LoadAddStore { reg, src }
            | Opcode::LoadSubStore { reg, src }
            | Opcode::LoadMulStore { reg, src }
            | Opcode::LoadDivStore { reg, src } => {
                f(reg);
                f(src);
            }
            Opcode::JumpIfTrue { cond, .. } | Opcode::JumpIfFalse { cond, .. } => f(cond),
            Opcode::Jump { .. } | Opcode::ReturnNone | Opcode::Nop | Opcode::PopTry => {}
            Opcode::BuildList { dst, start, count }
            | Opcode::BuildTuple { dst, start, count }
            | Opcode::BuildSet { dst, start, count }
            | Opcode::BuildString { dst, start, count } => {
                f(dst);
                range(start, count, &mut f);
            }
            Opcode::BuildDict { dst, start, count } => {
                f(dst);
                range(start, count.saturating_mul(2), &mut f);
            }
            Opcode::GetItem { dst, container, key } => {
                f(dst);
                f(container);
                f(key);
            }
            Opcode::SetItem { container, key, src } => {
                f(container);
                f(key);
                f(src);
            }
            Opcode::Slice { dst, container, start, stop } => {
                f(dst);
                f(container);
                f(start);
                f(stop);
            }
            Opcode::Append { list, src } => {
                f(list);
                f(src);
            }
            Opcode::ForIter { dst, iter, .. } => {
                f(dst);
                f(iter);
            }
            Opcode::GetAttr { dst, obj, .. } => {
                f(dst);
                f(obj);
            }
            Opcode::SetAttr { obj, src, .. } => {
                f(obj);
                f(src);
            }
            Opcode::CallMethod { dst, obj, args, argc, .. } => {
                f(dst);
                f(obj);
                range(args, argc, &mut f);
            }
            Opcode::Call { dst, callee, args, argc } => {
                f(dst);
                f(callee);
                range(args, argc, &mut f);
            }
            Opcode::MakeClass { dst, namespace, base, .. } => {
                f(dst);
                f(namespace);
                if let Some(base) = base {
                    f(base);
                }
            }
            Opcode::PushTry { dst, .. } => f(dst),
        }
    }
}
