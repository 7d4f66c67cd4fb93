//! Per-loop profiling and compiled-code slots
//!
//! A [`LoopRecord`] exists for every loop header that has executed at least
//! one backward branch. It lives inside its [`Function`](crate::Function),
//! so it is shared by every VM executing that function.

use std::sync::{Arc, OnceLock};

use bytecode_system::LoopRange;
use core_types::{HotCounter, Hotness, LoopState};

use crate::jit_abi::CompiledLoop;

/// Counter, promotion state and compiled code of one loop header
#[derive(Debug)]
pub struct LoopRecord {
    range: LoopRange,
    counter: HotCounter,
    compiled: OnceLock<Arc<CompiledLoop>>,
}

impl LoopRecord {
    /// Create a record in the `Counting` state
    pub fn new(range: LoopRange) -> Self {
        Self {
            range,
            counter: HotCounter::new(),
            compiled: OnceLock::new(),
        }
    }

    /// Instruction range `[header, back_edge]`
    pub fn range(&self) -> LoopRange {
        self.range
    }

    /// Loop header address
    pub fn header(&self) -> usize {
        self.range.header
    }

    /// Record one taken backward branch
    #[inline]
    pub fn record_backedge(&self, threshold: u32) -> Hotness {
        self.counter.record_backedge(threshold)
    }

    /// Backward branches recorded so far
    pub fn iterations(&self) -> u64 {
        self.counter.count()
    }

    /// Promotion state
    pub fn state(&self) -> LoopState {
        self.counter.state()
    }

    /// Claim the right to compile this loop
    pub fn try_begin_compile(&self) -> bool {
        self.counter.try_begin_compile()
    }

    /// Compiled code, once installed
    #[inline]
    pub fn compiled(&self) -> Option<&Arc<CompiledLoop>> {
        self.compiled.get()
    }

    /// Install compiled code and publish the `Installed` state.
    ///
    /// The slot is write-once: if code is already present it is kept and
    /// returned instead of `code`.
    pub fn install(&self, code: CompiledLoop) -> Arc<CompiledLoop> {
        let installed = Arc::clone(self.compiled.get_or_init(|| Arc::new(code)));
        self.counter.mark_installed();
        installed
    }

    /// Give up on this loop for good
    pub fn reject(&self) {
        self.counter.mark_not_promotable();
    }
}
