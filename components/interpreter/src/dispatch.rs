//! Dispatch loop for bytecode execution
//!
//! Primitive fast paths (loads, moves, checked integer and float arithmetic,
//! comparisons, fused read-modify-write ops and branches) run inline in
//! [`Dispatcher::step`]. Everything else, and every fast path whose operands
//! turn out not to be primitive, goes through [`Dispatcher::exec_generic`],
//! which is also what compiled loops call for instructions they cannot
//! specialize.
//!
//! Bytecode calls do not recurse on the native stack: the caller frame is
//! parked on `stack` and the callee becomes the current frame. Only entries
//! from native code (the embedding API and runtime helpers called from
//! compiled loops) start a nested [`Dispatcher::run`].

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use builtins::attributes::{self, Callable};
use builtins::{
    arith, call_builtin, containers, exceptions, iter, strings, ClassObject, FunctionId,
    FunctionObject, HeapObject, InstanceObject, Runtime,
};
use bytecode_system::{BinaryOp, CompareOp, Constant, Opcode, RegisterId, UnaryOp};
use core_types::{
    make_float, make_int, ops, ErrorKind, Hotness, ObjectHandle, RuntimeError, SmallValuePool,
    StackFrame, TaggedValue,
};
use tracing::{debug, info, trace, warn};

use crate::config::VmConfig;
use crate::events::{JitEvent, JitEventLog};
use crate::frame::{CallerLink, Frame, RegisterArena, TryHandler};
use crate::function::{Function, FunctionHandle};
use crate::jit_abi::{CompiledLoop, JitContext, JitSlot, LoopCompiler, LoopRequest, EXIT_FAULT};
use crate::loops::LoopRecord;

/// State of the current frame after one step
#[derive(Debug)]
pub(crate) enum ExecState {
    /// Keep executing the current frame
    Running,
    /// The frame returned a value
    Returned(TaggedValue),
    /// The frame called a bytecode function
    Calling(Frame),
    /// No handler in the frame caught the error
    Unwinding(RuntimeError),
}

/// Result of the generic executor
#[derive(Debug)]
pub(crate) enum Step {
    Next,
    Jump(usize),
    Return(TaggedValue),
    Call(Frame),
}

#[inline]
fn fast_binary(op: BinaryOp, a: TaggedValue, b: TaggedValue) -> ops::OpResult {
    match op {
        BinaryOp::Add => ops::add(a, b),
        BinaryOp::Sub => ops::sub(a, b),
        BinaryOp::Mul => ops::mul(a, b),
        BinaryOp::Div => ops::div(a, b),
        BinaryOp::FloorDiv => ops::floordiv(a, b),
        BinaryOp::Mod => ops::r#mod(a, b),
        BinaryOp::Pow => ops::pow(a, b),
        BinaryOp::BitAnd => ops::and_(a, b),
        BinaryOp::BitOr => ops::or_(a, b),
        BinaryOp::BitXor => ops::xor(a, b),
        BinaryOp::Shl => ops::shl(a, b),
        BinaryOp::Shr => ops::shr(a, b),
    }
}

#[inline]
fn fast_compare(op: CompareOp, a: TaggedValue, b: TaggedValue) -> ops::OpResult {
    match op {
        CompareOp::Lt => ops::lt(a, b),
        CompareOp::Le => ops::le(a, b),
        CompareOp::Gt => ops::gt(a, b),
        CompareOp::Ge => ops::ge(a, b),
        CompareOp::Eq => ops::eq(a, b),
        CompareOp::Ne => ops::ne(a, b),
        CompareOp::Is | CompareOp::IsNot | CompareOp::In | CompareOp::NotIn => {
            Err(ErrorKind::TypeMismatch)
        }
    }
}

#[inline]
fn fast_unary(op: UnaryOp, a: TaggedValue) -> ops::OpResult {
    match op {
        UnaryOp::Neg => ops::neg(a),
        UnaryOp::Pos => ops::pos(a),
        UnaryOp::Not => ops::not_(a),
        UnaryOp::Invert => ops::invert(a),
    }
}

fn name_of(function: &Function, index: u32) -> Result<&str, RuntimeError> {
    function
        .chunk()
        .name_at(index)
        .ok_or_else(|| RuntimeError::internal(format!("constant #{} is not a name", index)))
}

/// Dispatch handler for executing bytecode
pub struct Dispatcher {
    rt: Runtime,
    globals: HashMap<String, TaggedValue>,
    builtins: HashMap<&'static str, TaggedValue>,
    functions: HashMap<FunctionId, FunctionHandle>,
    function_objects: HashMap<FunctionId, TaggedValue>,
    config: VmConfig,
    compiler: Option<Arc<dyn LoopCompiler>>,
    events: JitEventLog,
    /// Suspended caller frames
    stack: Vec<Frame>,
    /// Active frames, including frames of nested runs
    depth: usize,
    arena: RegisterArena,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("rt", &self.rt)
            .field("globals", &self.globals.len())
            .field("functions", &self.functions.len())
            .field("config", &self.config)
            .field(
                "compiler",
                &self.compiler.as_ref().map(|c| c.name().to_string()),
            )
            .field("depth", &self.depth)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        config: VmConfig,
        compiler: Option<Arc<dyn LoopCompiler>>,
        events: JitEventLog,
    ) -> Self {
        SmallValuePool::init();
        let mut rt = if config.capture_output {
            Runtime::capturing()
        } else {
            Runtime::new()
        };
        let builtins = rt.builtin_namespace().into_iter().collect();
        Self {
            rt,
            globals: HashMap::new(),
            builtins,
            functions: HashMap::new(),
            function_objects: HashMap::new(),
            config,
            compiler,
            events,
            stack: Vec::with_capacity(64),
            depth: 0,
            arena: RegisterArena::new(),
        }
    }

    /// Helper-library state
    pub fn runtime(&self) -> &Runtime {
        &self.rt
    }

    /// Mutable helper-library state
    pub fn runtime_mut(&mut self) -> &mut Runtime {
        &mut self.rt
    }

    /// Active configuration
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Event log shared with the embedder
    pub fn events(&self) -> &JitEventLog {
        &self.events
    }

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Get a global variable
    pub fn get_global(&self, name: &str) -> Option<TaggedValue> {
        self.globals.get(name).copied()
    }

    /// Set a global variable
    pub fn set_global(&mut self, name: impl Into<String>, value: TaggedValue) {
        self.globals.insert(name.into(), value);
    }

    /// Make `function` and its nested functions callable by id
    pub fn register(&mut self, function: &FunctionHandle) {
        if self.functions.contains_key(&function.id()) {
            return;
        }
        self.functions
            .insert(function.id(), FunctionHandle::clone(function));
        for child in function.children() {
            self.register(child);
        }
    }

    fn function(&self, id: FunctionId) -> Result<FunctionHandle, RuntimeError> {
        self.functions
            .get(&id)
            .cloned()
            .ok_or_else(|| RuntimeError::internal(format!("unknown function id {}", id.0)))
    }

    /// Heap object standing for `function`; one per function and VM
    pub fn function_object(&mut self, function: &FunctionHandle) -> TaggedValue {
        if let Some(&value) = self.function_objects.get(&function.id()) {
            return value;
        }
        self.register(function);
        let value = self.rt.heap.alloc(HeapObject::Function(FunctionObject {
            id: function.id(),
            name: function.name().to_string(),
        }));
        self.function_objects.insert(function.id(), value);
        value
    }

    /// Truthiness with the heap consulted for objects
    #[inline]
    pub fn truthy(&self, value: TaggedValue) -> Result<bool, RuntimeError> {
        match value.primitive_truthiness() {
            Some(truth) => Ok(truth),
            None => arith::truthy(&self.rt.heap, value),
        }
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Run `function` to completion on behalf of native code
    pub fn call_function(
        &mut self,
        function: &FunctionHandle,
        receiver: Option<TaggedValue>,
        args: &[TaggedValue],
    ) -> Result<TaggedValue, RuntimeError> {
        self.register(function);
        self.check_depth()?;
        let frame = self.arena.frame(function, receiver, args)?;
        self.run(frame)
    }

    /// Call any callable value on behalf of native code
    pub fn call_value(
        &mut self,
        callee: TaggedValue,
        args: &[TaggedValue],
    ) -> Result<TaggedValue, RuntimeError> {
        match attributes::resolve_callable(&self.rt.heap, callee)? {
            Callable::Function { id, receiver } => {
                let function = self.function(id)?;
                self.call_function(&function, receiver, args)
            }
            Callable::Builtin(f) => call_builtin(&mut self.rt, f, args),
            Callable::BuiltinMethod { receiver, name } => {
                attributes::call_builtin_method(&mut self.rt.heap, receiver, &name, args)
            }
            Callable::Class(class) => {
                let instance = self.instantiate(class, args.len())?;
                if let Some(init) = self.init_method(class)? {
                    self.call_function(&init, Some(instance), args)?;
                }
                Ok(instance)
            }
            Callable::ExceptionType(kind) => exceptions::new_exception(&mut self.rt.heap, kind, args),
        }
    }

    fn check_depth(&self) -> Result<(), RuntimeError> {
        if self.depth >= self.config.max_call_depth {
            return Err(RuntimeError::new(
                ErrorKind::StackOverflow,
                "maximum recursion depth exceeded",
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Frame loop
    // ------------------------------------------------------------------

    /// Execute `entry` and every frame it calls until `entry` returns.
    pub(crate) fn run(&mut self, entry: Frame) -> Result<TaggedValue, RuntimeError> {
        let base = self.stack.len();
        let mut frame = entry;
        let mut pending: Option<RuntimeError> = None;
        self.depth += 1;

        loop {
            let state = match pending.take() {
                None => self.run_frame(&mut frame),
                Some(err) => match self.catch(&mut frame, err) {
                    Ok(()) => self.run_frame(&mut frame),
                    Err(err) => ExecState::Unwinding(err),
                },
            };

            match state {
                ExecState::Running => {}
                ExecState::Calling(callee) => {
                    self.depth += 1;
                    self.stack.push(std::mem::replace(&mut frame, callee));
                }
                ExecState::Returned(value) => {
                    let link = self.retire(&mut frame);
                    let value = link.and_then(|l| l.result).unwrap_or(value);
                    if self.stack.len() == base {
                        return Ok(value);
                    }
                    frame = self.resume_caller()?;
                    if let Some(link) = link {
                        frame.set(link.dst, value);
                    }
                }
                ExecState::Unwinding(err) => {
                    let link = self.retire(&mut frame);
                    if self.stack.len() == base {
                        return Err(err);
                    }
                    frame = self.resume_caller()?;
                    if let Some(link) = link {
                        frame.pc = link.call_pc;
                    }
                    pending = Some(err);
                }
            }
        }
    }

    fn retire(&mut self, frame: &mut Frame) -> Option<CallerLink> {
        self.depth -= 1;
        self.arena.release(std::mem::take(&mut frame.registers));
        frame.caller.take()
    }

    fn resume_caller(&mut self) -> Result<Frame, RuntimeError> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::internal("call stack underflow"))
    }

    fn run_frame(&mut self, frame: &mut Frame) -> ExecState {
        let function = FunctionHandle::clone(&frame.function);
        loop {
            match self.step(frame, &function) {
                Ok(ExecState::Running) => {}
                Ok(state) => return state,
                Err(err) => {
                    if let Err(err) = self.catch(frame, err) {
                        return ExecState::Unwinding(err);
                    }
                }
            }
        }
    }

    /// Deliver `err` to the innermost handler of `frame`, or record the
    /// frame in the trace and hand the error back.
    fn catch(&mut self, frame: &mut Frame, mut err: RuntimeError) -> Result<(), RuntimeError> {
        if let Some(handler) = frame.handlers.pop() {
            trace!(kind = %err.kind, handler = handler.handler, "exception caught");
            let exception = exceptions::exception_for_error(&mut self.rt.heap, &err);
            frame.set(handler.dst, exception);
            frame.pc = handler.handler;
            return Ok(());
        }
        let line = frame
            .function
            .chunk()
            .instructions
            .get(frame.pc)
            .and_then(|inst| inst.line());
        err.push_frame(StackFrame::new(frame.function.name(), frame.pc).with_line(line));
        Err(err)
    }

    /// Execute one instruction of `frame`
    #[inline]
    fn step(&mut self, frame: &mut Frame, function: &FunctionHandle) -> Result<ExecState, RuntimeError> {
        let pc = frame.pc;
        let Some(inst) = function.chunk().instructions.get(pc) else {
            return Ok(ExecState::Returned(TaggedValue::None));
        };

        match inst.opcode {
            Opcode::LoadInt { dst, value } => frame.set(dst, make_int(value)),
            Opcode::LoadBool { dst, value } => frame.set(dst, TaggedValue::Bool(value)),
            Opcode::LoadNone { dst } => frame.set(dst, TaggedValue::None),
            Opcode::MoveReg { dst, src } => {
                let value = frame.get(src);
                frame.set(dst, value);
            }
            Opcode::Binary { op, dst, lhs, rhs } => self.binary(frame, op, dst, lhs, rhs)?,
            Opcode::FastIntAdd { dst, lhs, rhs } | Opcode::FastFloatAdd { dst, lhs, rhs } => {
                self.binary(frame, BinaryOp::Add, dst, lhs, rhs)?
            }
            Opcode::FastIntSub { dst, lhs, rhs } | Opcode::FastFloatSub { dst, lhs, rhs } => {
                self.binary(frame, BinaryOp::Sub, dst, lhs, rhs)?
            }
            Opcode::FastIntMul { dst, lhs, rhs } | Opcode::FastFloatMul { dst, lhs, rhs } => {
                self.binary(frame, BinaryOp::Mul, dst, lhs, rhs)?
            }
            Opcode::FastFloatDiv { dst, lhs, rhs } => {
                self.binary(frame, BinaryOp::Div, dst, lhs, rhs)?
            }
            Opcode::Compare { op, dst, lhs, rhs } => self.compare(frame, op, dst, lhs, rhs)?,
            Opcode::FastIntLt { dst, lhs, rhs } => {
                self.compare(frame, CompareOp::Lt, dst, lhs, rhs)?
            }
            Opcode::Unary { op, dst, src } => {
                let a = frame.get(src);
                let value = match fast_unary(op, a) {
                    Ok(value) => value,
                    Err(_) => arith::unary_op(&mut self.rt.heap, op, a)?,
                };
                frame.set(dst, value);
            }
            Opcode::IncLocal { reg } => {
                self.update(frame, BinaryOp::Add, reg, TaggedValue::Int(1))?
            }
            Opcode::DecLocal { reg } => {
                self.update(frame, BinaryOp::Sub, reg, TaggedValue::Int(1))?
            }
            Opcode::LoadAddStore { reg, src } => {
                let (a, b) = (frame.get(reg), frame.get(src));
                let value = match ops::add(a, b) {
                    Ok(value) => value,
                    Err(_) => arith::inplace_add(&mut self.rt.heap, a, b)?,
                };
                frame.set(reg, value);
            }
            Opcode::LoadSubStore { reg, src } => {
                let rhs = frame.get(src);
                self.update(frame, BinaryOp::Sub, reg, rhs)?
            }
            Opcode::LoadMulStore { reg, src } => {
                let rhs = frame.get(src);
                self.update(frame, BinaryOp::Mul, reg, rhs)?
            }
            Opcode::LoadDivStore { reg, src } => {
                let rhs = frame.get(src);
                self.update(frame, BinaryOp::Div, reg, rhs)?
            }
            Opcode::Jump { target } => return self.branch(frame, function, target as usize),
            Opcode::JumpIfTrue { cond, target } => {
                if self.truthy(frame.get(cond))? {
                    return self.branch(frame, function, target as usize);
                }
            }
            Opcode::JumpIfFalse { cond, target } => {
                if !self.truthy(frame.get(cond))? {
                    return self.branch(frame, function, target as usize);
                }
            }
            Opcode::Return { src } => return Ok(ExecState::Returned(frame.get(src))),
            Opcode::ReturnNone => return Ok(ExecState::Returned(TaggedValue::None)),
            Opcode::Nop => {}
            _ => match self.exec_generic(frame, function, &inst.opcode)? {
                Step::Next => {}
                Step::Jump(target) => return self.branch(frame, function, target),
                Step::Return(value) => return Ok(ExecState::Returned(value)),
                Step::Call(callee) => {
                    frame.pc = pc + 1;
                    return Ok(ExecState::Calling(callee));
                }
            },
        }
        frame.pc = pc + 1;
        Ok(ExecState::Running)
    }

    #[inline]
    fn binary(
        &mut self,
        frame: &mut Frame,
        op: BinaryOp,
        dst: RegisterId,
        lhs: RegisterId,
        rhs: RegisterId,
    ) -> Result<(), RuntimeError> {
        let (a, b) = (frame.get(lhs), frame.get(rhs));
        let value = match fast_binary(op, a, b) {
            Ok(value) => value,
            Err(_) => arith::binary_op(&mut self.rt.heap, op, a, b)?,
        };
        frame.set(dst, value);
        Ok(())
    }

    #[inline]
    fn update(
        &mut self,
        frame: &mut Frame,
        op: BinaryOp,
        reg: RegisterId,
        rhs: TaggedValue,
    ) -> Result<(), RuntimeError> {
        let a = frame.get(reg);
        let value = match fast_binary(op, a, rhs) {
            Ok(value) => value,
            Err(_) => arith::binary_op(&mut self.rt.heap, op, a, rhs)?,
        };
        frame.set(reg, value);
        Ok(())
    }

    #[inline]
    fn compare(
        &mut self,
        frame: &mut Frame,
        op: CompareOp,
        dst: RegisterId,
        lhs: RegisterId,
        rhs: RegisterId,
    ) -> Result<(), RuntimeError> {
        let (a, b) = (frame.get(lhs), frame.get(rhs));
        let value = match fast_compare(op, a, b) {
            Ok(value) => value,
            Err(_) => arith::compare_op(&mut self.rt.heap, op, a, b)?,
        };
        frame.set(dst, value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Loops and promotion
    // ------------------------------------------------------------------

    /// Transfer control to `target`; backward branches feed the profiler.
    #[inline]
    fn branch(
        &mut self,
        frame: &mut Frame,
        function: &Function,
        target: usize,
    ) -> Result<ExecState, RuntimeError> {
        let pc = frame.pc;
        frame.pc = target;
        if target <= pc {
            self.back_edge(frame, function, target)?;
        }
        Ok(ExecState::Running)
    }

    fn back_edge(&mut self, frame: &mut Frame, function: &Function, header: usize) -> Result<(), RuntimeError> {
        let Some(record) = function.loop_record(header) else {
            return Ok(());
        };
        if let Some(code) = record.compiled() {
            if self.config.jit_enabled {
                return self.enter_compiled(frame, code);
            }
            return Ok(());
        }
        if record.record_backedge(self.config.hot_loop_threshold) == Hotness::ReachedThreshold {
            if let Some(code) = self.promote(function, record) {
                return self.enter_compiled(frame, &code);
            }
        }
        Ok(())
    }

    /// Compile the loop of `record`; at most one caller per loop ever gets
    /// this far.
    fn promote(&mut self, function: &Function, record: &LoopRecord) -> Option<Arc<CompiledLoop>> {
        if !self.config.jit_enabled {
            return None;
        }
        let compiler = Arc::clone(self.compiler.as_ref()?);
        if !record.try_begin_compile() {
            return None;
        }

        let range = record.range();
        debug!(
            function = function.name(),
            header = range.header,
            back_edge = range.back_edge,
            iterations = record.iterations(),
            backend = compiler.name(),
            "compiling hot loop"
        );
        let request = LoopRequest {
            function: function.name(),
            chunk: function.chunk(),
            range,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| compiler.compile(&request)))
            .unwrap_or_else(|_| {
                Err(RuntimeError::new(
                    ErrorKind::JitCompileUnsupported,
                    "loop compiler panicked",
                ))
            });

        match outcome {
            Ok(code) => {
                let registers = code.register_map().len();
                let installed = record.install(code);
                self.emit(JitEvent::Compiled {
                    function: function.name().to_string(),
                    header: range.header,
                    back_edge: range.back_edge,
                    registers,
                });
                Some(installed)
            }
            Err(err) => {
                record.reject();
                self.emit(JitEvent::Rejected {
                    function: function.name().to_string(),
                    header: range.header,
                    reason: err.message,
                });
                None
            }
        }
    }

    fn emit(&self, event: JitEvent) {
        if event.is_compiled() {
            info!(%event, "loop promoted");
        } else {
            warn!(%event, "loop stays interpreted");
        }
        if self.config.trace_jit {
            eprintln!("{}", event);
        }
        self.events.record(event);
    }

    /// Run compiled code for the loop at `frame.pc`, then continue at the
    /// address it exits to.
    fn enter_compiled(&mut self, frame: &mut Frame, code: &CompiledLoop) -> Result<(), RuntimeError> {
        let mut slots = vec![JitSlot::default(); frame.registers.len()];
        for &reg in code.register_map().registers() {
            slots[reg.index()] = JitSlot::from(frame.get(reg));
        }

        let entry = code.entry();
        let mut ctx = JitContext::new(self, frame);
        // SAFETY: `code` is kept alive by its loop record for the duration of
        // the call, and `slots` covers every register of the frame.
        let status = unsafe { entry(&mut ctx, slots.as_mut_ptr()) };
        let fault = ctx.take_fault();

        for &reg in code.register_map().registers() {
            frame.set(reg, slots[reg.index()].to_value()?);
        }

        if status == EXIT_FAULT {
            let fault = fault.ok_or_else(|| RuntimeError::internal("compiled loop failed without a fault"))?;
            frame.pc = fault.pc;
            return Err(fault.error);
        }
        match usize::try_from(status) {
            Ok(pc) if pc <= frame.function.chunk().instructions.len() => {
                frame.pc = pc;
                Ok(())
            }
            _ => Err(RuntimeError::internal(format!(
                "compiled loop exited to invalid address {}",
                status
            ))),
        }
    }

    /// Execute the instruction at `pc` for native code whose registers live
    /// in `slots`. Returns whether the instruction branched.
    pub(crate) fn exec_for_jit(
        &mut self,
        frame: &mut Frame,
        slots: &mut [JitSlot],
        pc: usize,
    ) -> Result<bool, RuntimeError> {
        let function = FunctionHandle::clone(&frame.function);
        let opcode = &function
            .chunk()
            .instructions
            .get(pc)
            .ok_or_else(|| RuntimeError::internal(format!("no instruction at {}", pc)))?
            .opcode;

        let mut bad_slot = None;
        opcode.for_each_register(|reg| match slots[reg.index()].to_value() {
            Ok(value) => frame.registers[reg.index()] = value,
            Err(err) => bad_slot = Some(err),
        });
        if let Some(err) = bad_slot {
            return Err(err);
        }

        frame.pc = pc;
        let outcome = match self.exec_generic(frame, &function, opcode) {
            Ok(Step::Next) => Ok(false),
            Ok(Step::Jump(_)) => Ok(true),
            Ok(Step::Call(callee)) => {
                let dst = callee.caller.map(|link| link.dst);
                self.run(callee).map(|value| {
                    if let Some(dst) = dst {
                        frame.set(dst, value);
                    }
                    false
                })
            }
            Ok(Step::Return(_)) => Err(RuntimeError::internal(
                "return executed by a runtime helper",
            )),
            Err(err) => Err(err),
        };

        opcode.for_each_register(|reg| slots[reg.index()] = JitSlot::from(frame.registers[reg.index()]));
        outcome
    }

    // ------------------------------------------------------------------
    // Generic executor
    // ------------------------------------------------------------------

    fn constant(&mut self, function: &Function, index: u32) -> Result<TaggedValue, RuntimeError> {
        let constant = function
            .chunk()
            .constants
            .get(index as usize)
            .ok_or_else(|| RuntimeError::internal(format!("constant #{} out of range", index)))?;
        Ok(match constant {
            Constant::Int(i) => make_int(*i),
            Constant::Float(f) => make_float(*f),
            Constant::Bool(b) => TaggedValue::Bool(*b),
            Constant::None => TaggedValue::None,
            Constant::Str(s) => self.rt.heap.intern(s),
        })
    }

    fn lookup_global(&self, name: &str) -> Result<TaggedValue, RuntimeError> {
        self.globals
            .get(name)
            .or_else(|| self.builtins.get(name))
            .copied()
            .ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::NameNotFound,
                    format!("name '{}' is not defined", name),
                )
            })
    }

    /// Execute any instruction with full (boxed, arbitrary-precision)
    /// semantics. Does not advance `frame.pc`.
    pub(crate) fn exec_generic(
        &mut self,
        frame: &mut Frame,
        function: &Function,
        opcode: &Opcode,
    ) -> Result<Step, RuntimeError> {
        match *opcode {
            Opcode::LoadConst { dst, index } => {
                let value = self.constant(function, index)?;
                frame.set(dst, value);
            }
            Opcode::LoadInt { dst, value } => frame.set(dst, make_int(value)),
            Opcode::LoadBool { dst, value } => frame.set(dst, TaggedValue::Bool(value)),
            Opcode::LoadNone { dst } => frame.set(dst, TaggedValue::None),
            Opcode::MoveReg { dst, src } => {
                let value = frame.get(src);
                frame.set(dst, value);
            }
            Opcode::LoadGlobal { dst, name } => {
                let value = self.lookup_global(name_of(function, name)?)?;
                frame.set(dst, value);
            }
            Opcode::StoreGlobal { name, src } => {
                let name = name_of(function, name)?;
                self.globals.insert(name.to_string(), frame.get(src));
            }

            Opcode::Binary { op, dst, lhs, rhs } => self.generic_binary(frame, op, dst, lhs, rhs)?,
            Opcode::FastIntAdd { dst, lhs, rhs } | Opcode::FastFloatAdd { dst, lhs, rhs } => {
                self.generic_binary(frame, BinaryOp::Add, dst, lhs, rhs)?
            }
            Opcode::FastIntSub { dst, lhs, rhs } | Opcode::FastFloatSub { dst, lhs, rhs } => {
                self.generic_binary(frame, BinaryOp::Sub, dst, lhs, rhs)?
            }
            Opcode::FastIntMul { dst, lhs, rhs } | Opcode::FastFloatMul { dst, lhs, rhs } => {
                self.generic_binary(frame, BinaryOp::Mul, dst, lhs, rhs)?
            }
            Opcode::FastFloatDiv { dst, lhs, rhs } => {
                self.generic_binary(frame, BinaryOp::Div, dst, lhs, rhs)?
            }
            Opcode::Compare { op, dst, lhs, rhs } => {
                let value = arith::compare_op(&mut self.rt.heap, op, frame.get(lhs), frame.get(rhs))?;
                frame.set(dst, value);
            }
            Opcode::FastIntLt { dst, lhs, rhs } => {
                let value =
                    arith::compare_op(&mut self.rt.heap, CompareOp::Lt, frame.get(lhs), frame.get(rhs))?;
                frame.set(dst, value);
            }
            Opcode::Unary { op, dst, src } => {
                let value = arith::unary_op(&mut self.rt.heap, op, frame.get(src))?;
                frame.set(dst, value);
            }
            Opcode::IncLocal { reg } => {
                let value = arith::binary_op(&mut self.rt.heap, BinaryOp::Add, frame.get(reg), TaggedValue::Int(1))?;
                frame.set(reg, value);
            }
            Opcode::DecLocal { reg } => {
                let value = arith::binary_op(&mut self.rt.heap, BinaryOp::Sub, frame.get(reg), TaggedValue::Int(1))?;
                frame.set(reg, value);
            }
            Opcode::LoadAddStore { reg, src } => {
                let value = arith::inplace_add(&mut self.rt.heap, frame.get(reg), frame.get(src))?;
                frame.set(reg, value);
            }
            Opcode::LoadSubStore { reg, src } => self.generic_binary(frame, BinaryOp::Sub, reg, reg, src)?,
            Opcode::LoadMulStore { reg, src } => self.generic_binary(frame, BinaryOp::Mul, reg, reg, src)?,
            Opcode::LoadDivStore { reg, src } => self.generic_binary(frame, BinaryOp::Div, reg, reg, src)?,

            Opcode::Jump { target } => return Ok(Step::Jump(target as usize)),
            Opcode::JumpIfTrue { cond, target } => {
                if self.truthy(frame.get(cond))? {
                    return Ok(Step::Jump(target as usize));
                }
            }
            Opcode::JumpIfFalse { cond, target } => {
                if !self.truthy(frame.get(cond))? {
                    return Ok(Step::Jump(target as usize));
                }
            }
            Opcode::Return { src } => return Ok(Step::Return(frame.get(src))),
            Opcode::ReturnNone => return Ok(Step::Return(TaggedValue::None)),
            Opcode::Nop => {}

            Opcode::BuildList { dst, start, count } => {
                let items = frame.range(start, count).to_vec();
                let value = self.rt.heap.alloc_list(items);
                frame.set(dst, value);
            }
            Opcode::BuildTuple { dst, start, count } => {
                let items = frame.range(start, count).to_vec();
                let value = self.rt.heap.alloc_tuple(items);
                frame.set(dst, value);
            }
            Opcode::BuildSet { dst, start, count } => {
                let value = self
                    .rt
                    .heap
                    .alloc_set(frame.range(start, count).iter().copied())?;
                frame.set(dst, value);
            }
            Opcode::BuildDict { dst, start, count } => {
                let pairs = frame.range(start, count.saturating_mul(2));
                let value = self
                    .rt
                    .heap
                    .alloc_dict(pairs.chunks_exact(2).map(|kv| (kv[0], kv[1])))?;
                frame.set(dst, value);
            }
            Opcode::BuildString { dst, start, count } => {
                let value = strings::build_string(&mut self.rt.heap, frame.range(start, count))?;
                frame.set(dst, value);
            }
            Opcode::GetItem { dst, container, key } => {
                let value = containers::get_item(&mut self.rt.heap, frame.get(container), frame.get(key))?;
                frame.set(dst, value);
            }
            Opcode::SetItem { container, key, src } => {
                containers::set_item(&mut self.rt.heap, frame.get(container), frame.get(key), frame.get(src))?;
            }
            Opcode::Slice {
                dst,
                container,
                start,
                stop,
            } => {
                let value = containers::slice(
                    &mut self.rt.heap,
                    frame.get(container),
                    frame.get(start),
                    frame.get(stop),
                )?;
                frame.set(dst, value);
            }
            Opcode::Append { list, src } => {
                containers::append(&mut self.rt.heap, frame.get(list), frame.get(src))?;
            }
            Opcode::Len { dst, src } => {
                let len = containers::len(&self.rt.heap, frame.get(src))?;
                frame.set(dst, make_int(len));
            }
            Opcode::GetIter { dst, src } => {
                let value = iter::get_iter(&mut self.rt.heap, frame.get(src))?;
                frame.set(dst, value);
            }
            Opcode::ForIter { dst, iter: it, exit } => match iter::next(&mut self.rt.heap, frame.get(it))? {
                Some(value) => frame.set(dst, value),
                None => return Ok(Step::Jump(exit as usize)),
            },

            Opcode::GetAttr { dst, obj, name } => {
                let value = attributes::get_attr(&mut self.rt.heap, frame.get(obj), name_of(function, name)?)?;
                frame.set(dst, value);
            }
            Opcode::SetAttr { obj, name, src } => {
                attributes::set_attr(&mut self.rt.heap, frame.get(obj), name_of(function, name)?, frame.get(src))?;
            }
            Opcode::CallMethod {
                dst,
                obj,
                name,
                args,
                argc,
            } => {
                let callable = attributes::resolve_method(&mut self.rt.heap, frame.get(obj), name_of(function, name)?)?;
                return self.invoke(frame, callable, dst, args, argc);
            }
            Opcode::Call {
                dst,
                callee,
                args,
                argc,
            } => {
                let callable = attributes::resolve_callable(&self.rt.heap, frame.get(callee))?;
                return self.invoke(frame, callable, dst, args, argc);
            }
            Opcode::MakeFunction { dst, function: index } => {
                let child = function.child(index).ok_or_else(|| {
                    RuntimeError::internal(format!("nested function #{} out of range", index))
                })?;
                let value = self.function_object(child);
                frame.set(dst, value);
            }
            Opcode::MakeClass {
                dst,
                name,
                namespace,
                base,
            } => {
                let name = name_of(function, name)?.to_string();
                let value = self.make_class(name, frame.get(namespace), base.map(|r| frame.get(r)))?;
                frame.set(dst, value);
            }

            Opcode::PushTry { handler, dst } => frame.handlers.push(TryHandler {
                handler: handler as usize,
                dst,
            }),
            Opcode::PopTry => {
                frame.handlers.pop();
            }
            Opcode::Raise { src } => {
                return Err(exceptions::error_from_raise(&mut self.rt.heap, frame.get(src)));
            }
        }
        Ok(Step::Next)
    }

    fn generic_binary(
        &mut self,
        frame: &mut Frame,
        op: BinaryOp,
        dst: RegisterId,
        lhs: RegisterId,
        rhs: RegisterId,
    ) -> Result<(), RuntimeError> {
        let value = arith::binary_op(&mut self.rt.heap, op, frame.get(lhs), frame.get(rhs))?;
        frame.set(dst, value);
        Ok(())
    }

    /// Call `callable` with registers `args .. args+argc`, storing the result
    /// in `dst`. Bytecode callees come back as a new frame.
    fn invoke(
        &mut self,
        frame: &mut Frame,
        callable: Callable,
        dst: RegisterId,
        args: RegisterId,
        argc: u32,
    ) -> Result<Step, RuntimeError> {
        let link = CallerLink {
            dst,
            call_pc: frame.pc,
            result: None,
        };
        let value = match callable {
            Callable::Function { id, receiver } => {
                let function = self.function(id)?;
                let callee = self.callee_frame(&function, receiver, frame.range(args, argc), link)?;
                return Ok(Step::Call(callee));
            }
            Callable::Builtin(f) => call_builtin(&mut self.rt, f, frame.range(args, argc))?,
            Callable::BuiltinMethod { receiver, name } => attributes::call_builtin_method(
                &mut self.rt.heap,
                receiver,
                &name,
                frame.range(args, argc),
            )?,
            Callable::Class(class) => {
                let instance = self.instantiate(class, argc as usize)?;
                if let Some(init) = self.init_method(class)? {
                    let link = CallerLink {
                        result: Some(instance),
                        ..link
                    };
                    let callee = self.callee_frame(&init, Some(instance), frame.range(args, argc), link)?;
                    return Ok(Step::Call(callee));
                }
                instance
            }
            Callable::ExceptionType(kind) => {
                exceptions::new_exception(&mut self.rt.heap, kind, frame.range(args, argc))?
            }
        };
        frame.set(dst, value);
        Ok(Step::Next)
    }

    fn callee_frame(
        &mut self,
        function: &FunctionHandle,
        receiver: Option<TaggedValue>,
        args: &[TaggedValue],
        link: CallerLink,
    ) -> Result<Frame, RuntimeError> {
        self.check_depth()?;
        let mut callee = self.arena.frame(function, receiver, args)?;
        callee.caller = Some(link);
        Ok(callee)
    }

    /// New instance of `class`. Without `__init__`, only exception classes
    /// accept arguments.
    fn instantiate(&mut self, class: ObjectHandle, argc: usize) -> Result<TaggedValue, RuntimeError> {
        let instance = self.rt.heap.alloc(HeapObject::Instance(InstanceObject {
            class,
            attrs: HashMap::new(),
        }));
        if argc > 0
            && attributes::lookup_class_attr(&self.rt.heap, class, "__init__")?.is_none()
            && !exceptions::exception_matches(&self.rt.heap, instance, ErrorKind::UncaughtException)?
        {
            let name = match self.rt.heap.get(class)? {
                HeapObject::Class(c) => c.name.clone(),
                other => other.type_name().to_string(),
            };
            return Err(RuntimeError::type_error(format!("{}() takes no arguments", name)));
        }
        Ok(instance)
    }

    fn init_method(&self, class: ObjectHandle) -> Result<Option<FunctionHandle>, RuntimeError> {
        let Some(init) = attributes::lookup_class_attr(&self.rt.heap, class, "__init__")? else {
            return Ok(None);
        };
        match self.rt.heap.object(init)? {
            Some(HeapObject::Function(f)) => self.function(f.id).map(Some),
            _ => Err(RuntimeError::type_error("__init__ must be a function")),
        }
    }

    fn make_class(
        &mut self,
        name: String,
        namespace: TaggedValue,
        base: Option<TaggedValue>,
    ) -> Result<TaggedValue, RuntimeError> {
        let heap = &self.rt.heap;
        let mut attrs = HashMap::new();
        match heap.object(namespace)? {
            Some(HeapObject::Dict(dict)) => {
                for &(key, value) in dict.entries() {
                    let key = heap
                        .as_str(key)
                        .ok_or_else(|| RuntimeError::type_error("class attribute names must be strings"))?;
                    attrs.insert(key.to_string(), value);
                }
            }
            _ => return Err(RuntimeError::type_error("class namespace must be a dict")),
        }
        let base = match base {
            None => None,
            Some(value) => match heap.object(value)? {
                Some(HeapObject::Class(_)) | Some(HeapObject::ExceptionType(_)) => value.as_object(),
                _ => return Err(RuntimeError::type_error("bases must be classes")),
            },
        };
        debug!(class = %name, attrs = attrs.len(), "class created");
        Ok(self
            .rt
            .heap
            .alloc(HeapObject::Class(ClassObject { name, base, attrs })))
    }
}
