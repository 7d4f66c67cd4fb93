//! Runtime helper library
//!
//! Everything the fast path cannot do inline lands here:
//! - heap objects (strings, containers, classes, instances, exceptions)
//! - arbitrary-precision integer arithmetic and structural comparison
//! - indexing, slicing, iteration and the builtin-type methods
//! - attribute lookup and method binding
//! - builtin functions and Python-style formatting
//!
//! Helpers take and return [`TaggedValue`](core_types::TaggedValue) and
//! report failures as [`RuntimeError`](core_types::RuntimeError). They never
//! call back into user code; invoking user functions is left to the
//! interpreter.
//!
//! # Example
//!
//! ```
//! use builtins::{arith, format, Runtime};
//! use bytecode_system::BinaryOp;
//! use core_types::TaggedValue;
//!
//! let mut rt = Runtime::capturing();
//! let big = arith::binary_op(
//!     &mut rt.heap,
//!     BinaryOp::Mul,
//!     TaggedValue::Int(i64::MAX),
//!     TaggedValue::Int(4),
//! )
//! .unwrap();
//!
//! assert_eq!(format::repr(&rt.heap, big).unwrap(), "36893488147419103228");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arith;
pub mod attributes;
pub mod containers;
pub mod exceptions;
pub mod format;
pub mod functions;
pub mod hash;
pub mod heap;
pub mod iter;
pub mod object;
pub mod runtime;
pub mod strings;

pub use attributes::Callable;
pub use containers::{DictMethods, ListMethods, SetMethods};
pub use functions::{call_builtin, BuiltinFn};
pub use hash::{DictObject, HashKey, SetObject};
pub use heap::Heap;
pub use object::{
    ClassObject, ExceptionObject, FunctionId, FunctionObject, HeapObject, InstanceObject,
    IteratorState, RangeObject,
};
pub use runtime::{CaptureWriter, OutputWriter, Runtime, StdoutWriter};
pub use strings::StrMethods;
