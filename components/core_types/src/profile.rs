//! Hot-loop counters and promotion state.
//!
//! This module is placed in core_types so that both the interpreter and the
//! JIT compiler can observe loop state without depending on each other.
//!
//! State machine of one loop header:
//!
//! ```text
//! Counting --(count reaches threshold, CAS)--> Compiling --> Installed
//!                                                  \------> NotPromotable
//! ```
//!
//! The `Counting -> Compiling` transition is a compare-and-swap, so when a
//! function is shared between threads exactly one of them compiles a given
//! loop while the others keep interpreting.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Default number of backward branches before a loop is promoted.
pub const HOT_LOOP_THRESHOLD: u32 = 10_000;

/// Promotion state of a loop header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    /// Interpreted; counting backward branches
    Counting = 0,
    /// One thread is compiling the loop
    Compiling = 1,
    /// Compiled code is installed
    Installed = 2,
    /// Compilation failed; the loop stays interpreted forever
    NotPromotable = 3,
}

impl From<u8> for LoopState {
    fn from(v: u8) -> Self {
        match v {
            1 => LoopState::Compiling,
            2 => LoopState::Installed,
            3 => LoopState::NotPromotable,
            _ => LoopState::Counting,
        }
    }
}

/// Outcome of recording one backward branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotness {
    /// Keep interpreting
    Cold,
    /// The threshold was reached; the loop may now be compiled
    ReachedThreshold,
}

/// Iteration counter plus promotion state for one loop header.
///
/// # Examples
///
/// ```
/// use core_types::{HotCounter, Hotness, LoopState};
///
/// let counter = HotCounter::new();
/// assert_eq!(counter.record_backedge(2), Hotness::Cold);
/// assert_eq!(counter.record_backedge(2), Hotness::ReachedThreshold);
/// assert!(counter.try_begin_compile());
/// assert!(!counter.try_begin_compile());
/// counter.mark_installed();
/// assert_eq!(counter.state(), LoopState::Installed);
/// ```
#[derive(Debug)]
pub struct HotCounter {
    count: AtomicU64,
    state: AtomicU8,
}

impl HotCounter {
    /// Create a counter in the `Counting` state.
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            state: AtomicU8::new(LoopState::Counting as u8),
        }
    }

    /// Record one executed backward branch.
    ///
    /// Returns [`Hotness::ReachedThreshold`] when the count is at or past
    /// `threshold` and the loop is still `Counting`. Callers then race on
    /// [`HotCounter::try_begin_compile`].
    #[inline]
    pub fn record_backedge(&self, threshold: u32) -> Hotness {
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if count >= u64::from(threshold) && self.state() == LoopState::Counting {
            Hotness::ReachedThreshold
        } else {
            Hotness::Cold
        }
    }

    /// Number of backward branches recorded so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Current promotion state.
    #[inline]
    pub fn state(&self) -> LoopState {
        LoopState::from(self.state.load(Ordering::Acquire))
    }

    /// Claim the right to compile this loop. Only one caller ever wins.
    pub fn try_begin_compile(&self) -> bool {
        self.state
            .compare_exchange(
                LoopState::Counting as u8,
                LoopState::Compiling as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Publish that compiled code has been installed.
    pub fn mark_installed(&self) {
        self.state
            .store(LoopState::Installed as u8, Ordering::Release);
    }

    /// Permanently give up on promoting this loop.
    pub fn mark_not_promotable(&self) {
        self.state
            .store(LoopState::NotPromotable as u8, Ordering::Release);
    }
}

impl Default for HotCounter {
    fn default() -> Self {
        Self::new()
    }
}
