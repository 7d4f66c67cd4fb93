//! Loaded functions
//!
//! [`Function`] is the immutable, verified form of a [`BytecodeChunk`] plus
//! its loop records. Handles are reference counted and `Send + Sync`, so a
//! function loaded by one VM can be executed by VMs on other threads; they
//! all share one set of counters and compiled loops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use builtins::FunctionId;
use bytecode_system::{BytecodeChunk, LoopRange};

use crate::loops::LoopRecord;

/// Shared handle to a loaded function
pub type FunctionHandle = Arc<Function>;

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(1);

/// A verified function ready for execution
#[derive(Debug)]
pub struct Function {
    id: FunctionId,
    chunk: BytecodeChunk,
    children: Vec<FunctionHandle>,
    loops: Vec<LoopRange>,
    /// Indexed by header address; only headers in `loops` are ever filled
    records: Vec<OnceLock<LoopRecord>>,
}

impl Function {
    /// Build the function tree for `chunk`.
    ///
    /// Nested chunks become child functions, addressed by their index in
    /// `MakeFunction`. The chunk must already be verified.
    pub fn load(mut chunk: BytecodeChunk) -> FunctionHandle {
        let nested = std::mem::take(&mut chunk.nested_functions);
        let children = nested.into_iter().map(Function::load).collect();
        let loops = chunk.loops();
        let records = (0..chunk.instructions.len())
            .map(|_| OnceLock::new())
            .collect();
        Arc::new(Function {
            id: FunctionId(NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed)),
            chunk,
            children,
            loops,
            records,
        })
    }

    /// Process-unique id
    pub fn id(&self) -> FunctionId {
        self.id
    }

    /// Function name
    pub fn name(&self) -> &str {
        &self.chunk.name
    }

    /// Bytecode (without nested chunks)
    pub fn chunk(&self) -> &BytecodeChunk {
        &self.chunk
    }

    /// Nested functions
    pub fn children(&self) -> &[FunctionHandle] {
        &self.children
    }

    /// Nested function `index`
    pub fn child(&self, index: u32) -> Option<&FunctionHandle> {
        self.children.get(index as usize)
    }

    /// Every loop of the function, ordered by header
    pub fn loops(&self) -> &[LoopRange] {
        &self.loops
    }

    /// Record for the loop starting at `header`, created on first use.
    ///
    /// Returns `None` when no loop starts at `header`.
    #[inline]
    pub fn loop_record(&self, header: usize) -> Option<&LoopRecord> {
        let slot = self.records.get(header)?;
        if let Some(record) = slot.get() {
            return Some(record);
        }
        let index = self
            .loops
            .binary_search_by_key(&header, |range| range.header)
            .ok()?;
        let range = self.loops[index];
        Some(slot.get_or_init(|| LoopRecord::new(range)))
    }

    /// Record for `header` if one has been created
    pub fn existing_record(&self, header: usize) -> Option<&LoopRecord> {
        self.records.get(header).and_then(OnceLock::get)
    }

    /// Records created so far
    pub fn records(&self) -> impl Iterator<Item = &LoopRecord> {
        self.records.iter().filter_map(OnceLock::get)
    }
}
