//! Cranelift-based loop compiler
//!
//! Generates native code for hot loops with Cranelift. Every loop gets its
//! own [`JITModule`]; the module owns the code memory and lives as long as
//! the installed [`CompiledLoop`], which in turn lives as long as the loaded
//! function.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use core_types::{ErrorKind, RuntimeError};
use cranelift_codegen::ir::{types, AbiParam, Signature, Type};
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module};
use interpreter::jit_abi::{RT_EXEC_SYMBOL, RT_TRUTHY_SYMBOL};
use interpreter::{
    jit_rt_exec, jit_rt_truthy, CompiledLoop, LoopCompiler, LoopEntry, LoopRequest,
};
use tracing::debug;

use crate::codegen::{LoopTranslator, RuntimeHelpers};
use crate::osr::loop_register_map;

fn backend_error(context: &str, err: impl std::fmt::Display) -> RuntimeError {
    RuntimeError::new(
        ErrorKind::JitCompileUnsupported,
        format!("{}: {}", context, err),
    )
}

/// Keeps the code of one loop mapped
struct LoopCode {
    _module: JITModule,
}

// SAFETY: the module is never touched again after finalization; it only
// keeps the executable memory alive.
unsafe impl Send for LoopCode {}
unsafe impl Sync for LoopCode {}

/// Cranelift-based loop compiler
///
/// Compiles loop ranges of register bytecode to native code following the
/// entry protocol of [`interpreter::jit_abi`].
pub struct CraneliftBackend {
    isa: OwnedTargetIsa,
    compiled: AtomicU64,
}

impl CraneliftBackend {
    /// Create a backend for the host machine
    pub fn new() -> Result<Self, RuntimeError> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", "speed")
            .map_err(|e| backend_error("opt_level", e))?;
        flag_builder
            .set("is_pic", "false")
            .map_err(|e| backend_error("is_pic", e))?;

        let isa_builder =
            cranelift_native::builder().map_err(|e| backend_error("host isa", e))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| backend_error("host isa", e))?;

        debug!(triple = %isa.triple(), "cranelift backend ready");
        Ok(Self {
            isa,
            compiled: AtomicU64::new(0),
        })
    }

    /// Create a shareable backend
    pub fn shared() -> Result<Arc<Self>, RuntimeError> {
        Self::new().map(Arc::new)
    }

    /// Number of loops compiled so far
    pub fn compiled_count(&self) -> u64 {
        self.compiled.load(Ordering::Relaxed)
    }

    fn new_module(&self) -> JITModule {
        let mut builder =
            JITBuilder::with_isa(self.isa.clone(), cranelift_module::default_libcall_names());
        builder.symbol(RT_EXEC_SYMBOL, jit_rt_exec as *const u8);
        builder.symbol(RT_TRUTHY_SYMBOL, jit_rt_truthy as *const u8);
        JITModule::new(builder)
    }

    fn signature(module: &JITModule, params: &[Type]) -> Signature {
        let mut sig = module.make_signature();
        sig.params.extend(params.iter().map(|&ty| AbiParam::new(ty)));
        sig.returns.push(AbiParam::new(types::I64));
        sig
    }

    /// Import the runtime helpers into `module`
    fn declare_helpers(module: &mut JITModule) -> Result<(FuncId, FuncId), RuntimeError> {
        let pointer = module.target_config().pointer_type();

        // (ctx, slots, pc) -> status
        let exec_sig = Self::signature(module, &[pointer, pointer, types::I64]);
        let exec = module
            .declare_function(RT_EXEC_SYMBOL, Linkage::Import, &exec_sig)
            .map_err(|e| backend_error("declare exec helper", e))?;

        // (ctx, tag, bits, pc) -> truth
        let truthy_sig = Self::signature(module, &[pointer, types::I64, types::I64, types::I64]);
        let truthy = module
            .declare_function(RT_TRUTHY_SYMBOL, Linkage::Import, &truthy_sig)
            .map_err(|e| backend_error("declare truthy helper", e))?;

        Ok((exec, truthy))
    }
}

impl std::fmt::Debug for CraneliftBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CraneliftBackend")
            .field("target", &self.isa.triple().to_string())
            .field("compiled", &self.compiled_count())
            .finish()
    }
}

impl LoopCompiler for CraneliftBackend {
    fn name(&self) -> &str {
        "cranelift"
    }

    fn compile(&self, request: &LoopRequest<'_>) -> Result<CompiledLoop, RuntimeError> {
        let map = loop_register_map(request)?;
        let mut module = self.new_module();
        let (exec_id, truthy_id) = Self::declare_helpers(&mut module)?;

        // (ctx, slots) -> resume pc
        let pointer = module.target_config().pointer_type();
        let entry_sig = Self::signature(&module, &[pointer, pointer]);

        let name = format!("loop_{}_pc{}", request.function, request.range.header);
        let entry_id = module
            .declare_function(&name, Linkage::Export, &entry_sig)
            .map_err(|e| backend_error("declare loop", e))?;

        let mut ctx = module.make_context();
        ctx.func.signature = entry_sig;
        let mut builder_ctx = FunctionBuilderContext::new();
        {
            let builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
            let helpers = RuntimeHelpers {
                exec: module.declare_func_in_func(exec_id, builder.func),
                truthy: module.declare_func_in_func(truthy_id, builder.func),
            };
            LoopTranslator::new(builder, request.chunk, request.range, &map, helpers)?
                .translate()?;
        }

        module
            .define_function(entry_id, &mut ctx)
            .map_err(|e| backend_error("define loop", e))?;
        module.clear_context(&mut ctx);
        module
            .finalize_definitions()
            .map_err(|e| backend_error("finalize loop", e))?;

        let code = module.get_finalized_function(entry_id);
        // SAFETY: the function was declared with the `LoopEntry` signature.
        let entry = unsafe { std::mem::transmute::<*const u8, LoopEntry>(code) };
        self.compiled.fetch_add(1, Ordering::Relaxed);
        debug!(
            function = request.function,
            header = request.range.header,
            back_edge = request.range.back_edge,
            registers = map.len(),
            "loop compiled"
        );

        // SAFETY: the code follows the entry protocol for `range` and `map`,
        // and `LoopCode` keeps it mapped.
        Ok(unsafe {
            CompiledLoop::new(
                entry,
                request.range,
                map,
                Box::new(LoopCode { _module: module }),
            )
        })
    }
}
