//! Core value types and error handling for the Basalt execution core.
//!
//! This crate provides the foundational types shared by every other
//! component: the tagged register value, the small-value pool, fast-path
//! arithmetic, the error taxonomy and hot-loop counters.
//!
//! # Overview
//!
//! - [`TaggedValue`] - Inline primitive or heap handle
//! - [`SmallValuePool`] - Shared pre-built small integers, booleans and `None`
//! - [`ops`] - Fast-path operations with generic-path fallback signals
//! - [`RuntimeError`] - Errors with kind and frame trace
//! - [`HotCounter`] - Per-loop backward-branch counter and promotion state
//!
//! # Examples
//!
//! ```
//! use core_types::{make_int, ops, ErrorKind, TaggedValue};
//!
//! let sum = ops::add(make_int(40), make_int(2)).unwrap();
//! assert_eq!(sum, TaggedValue::Int(42));
//!
//! // Overflow asks the caller to take the generic path
//! let big = ops::mul(make_int(i64::MAX), make_int(2));
//! assert_eq!(big, Err(ErrorKind::IntegerOverflow));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
pub mod ops;
mod pool;
mod profile;
mod source;
mod value;

pub use error::{ErrorKind, RuntimeError};
pub use pool::{SmallValuePool, POOL_MAX_INT, POOL_MIN_INT};
pub use profile::{HotCounter, Hotness, LoopState, HOT_LOOP_THRESHOLD};
pub use source::StackFrame;
pub use value::{is_fast_path, make_bool, make_float, make_int, none, tag, ObjectHandle, TaggedValue};
