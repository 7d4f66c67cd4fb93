//! Runtime error taxonomy.
//!
//! [`ErrorKind`] classifies every failure the execution core can produce.
//! A few kinds are internal signals that never leave the core:
//! `TypeMismatch` and `IntegerOverflow` send a fast-path operation to the
//! generic helpers, and `JitCompileUnsupported` de-promotes one loop.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::source::StackFrame;
use crate::value::TaggedValue;

/// The kind of a runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Integer division or modulo by zero
    DivisionByZero,
    /// Fast-path operand was not primitive (internal)
    TypeMismatch,
    /// Fast-path integer result does not fit in 64 bits (internal)
    IntegerOverflow,
    /// Sequence index outside its bounds
    IndexOutOfRange,
    /// Missing dictionary key
    KeyNotFound,
    /// Missing attribute on an object or class
    AttributeNotFound,
    /// Unbound global name
    NameNotFound,
    /// Operation applied to a value of the wrong type
    TypeError,
    /// Argument has the right type but an invalid value
    ValueError,
    /// User-level `raise` that no handler caught
    UncaughtException,
    /// Loop body cannot be compiled (internal)
    JitCompileUnsupported,
    /// Call depth limit exceeded
    StackOverflow,
    /// Bytecode failed load-time verification
    InvalidBytecode,
    /// Violated internal invariant
    InternalError,
}

impl ErrorKind {
    /// Kinds that only signal "retry on the generic path".
    pub fn is_fallback(self) -> bool {
        matches!(self, ErrorKind::TypeMismatch | ErrorKind::IntegerOverflow)
    }

    /// Exception class name seen by user code when this error is caught.
    pub fn python_name(self) -> &'static str {
        match self {
            ErrorKind::DivisionByZero => "ZeroDivisionError",
            ErrorKind::TypeMismatch | ErrorKind::TypeError => "TypeError",
            ErrorKind::IntegerOverflow => "OverflowError",
            ErrorKind::IndexOutOfRange => "IndexError",
            ErrorKind::KeyNotFound => "KeyError",
            ErrorKind::AttributeNotFound => "AttributeError",
            ErrorKind::NameNotFound => "NameError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::UncaughtException => "Exception",
            ErrorKind::StackOverflow => "RecursionError",
            ErrorKind::JitCompileUnsupported
            | ErrorKind::InvalidBytecode
            | ErrorKind::InternalError => "RuntimeError",
        }
    }

    /// Inverse of [`ErrorKind::python_name`] for the builtin exception types.
    pub fn from_python_name(name: &str) -> Option<ErrorKind> {
        Some(match name {
            "ZeroDivisionError" => ErrorKind::DivisionByZero,
            "TypeError" => ErrorKind::TypeError,
            "OverflowError" => ErrorKind::IntegerOverflow,
            "IndexError" => ErrorKind::IndexOutOfRange,
            "KeyError" => ErrorKind::KeyNotFound,
            "AttributeError" => ErrorKind::AttributeNotFound,
            "NameError" => ErrorKind::NameNotFound,
            "ValueError" => ErrorKind::ValueError,
            "Exception" => ErrorKind::UncaughtException,
            "RecursionError" => ErrorKind::StackOverflow,
            "RuntimeError" => ErrorKind::InternalError,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An error surfaced by the execution core.
///
/// Carries the kind, a message, the frames it unwound through (innermost
/// first) and, for raised exceptions, the exception object itself.
///
/// # Examples
///
/// ```
/// use core_types::{ErrorKind, RuntimeError, StackFrame};
///
/// let mut err = RuntimeError::new(ErrorKind::DivisionByZero, "integer division by zero");
/// err.push_frame(StackFrame::new("main", 4));
///
/// assert_eq!(err.kind, ErrorKind::DivisionByZero);
/// assert_eq!(err.trace.len(), 1);
/// assert_eq!(err.to_string(), "DivisionByZero: integer division by zero");
/// ```
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    /// Error classification
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Frames unwound so far, innermost first
    pub trace: Vec<StackFrame>,
    /// Exception object, when the error originated from (or was turned
    /// into) a user-visible exception
    pub exception: Option<TaggedValue>,
}

impl RuntimeError {
    /// Create an error with an empty trace.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            trace: Vec::new(),
            exception: None,
        }
    }

    /// Attach the exception object.
    pub fn with_exception(mut self, exception: TaggedValue) -> Self {
        self.exception = Some(exception);
        self
    }

    /// Record one more unwound frame.
    pub fn push_frame(&mut self, frame: StackFrame) {
        self.trace.push(frame);
    }

    /// Shorthand for a `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Shorthand for an `InternalError`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Python-style traceback text, outermost frame first.
    pub fn traceback(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in self.trace.iter().rev() {
            out.push_str(&format!("  {}\n", frame));
        }
        out.push_str(&format!("{}: {}", self.kind.python_name(), self.message));
        out
    }
}

impl From<ErrorKind> for RuntimeError {
    fn from(kind: ErrorKind) -> Self {
        let message = match kind {
            ErrorKind::DivisionByZero => "division by zero",
            ErrorKind::TypeMismatch => "operand is not a primitive value",
            ErrorKind::IntegerOverflow => "integer overflow",
            ErrorKind::ValueError => "invalid value",
            _ => "runtime error",
        };
        RuntimeError::new(kind, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_kinds() {
        assert!(ErrorKind::TypeMismatch.is_fallback());
        assert!(ErrorKind::IntegerOverflow.is_fallback());
        assert!(!ErrorKind::DivisionByZero.is_fallback());
        assert!(!ErrorKind::JitCompileUnsupported.is_fallback());
    }

    #[test]
    fn test_python_names_round_trip() {
        for kind in [
            ErrorKind::DivisionByZero,
            ErrorKind::IndexOutOfRange,
            ErrorKind::KeyNotFound,
            ErrorKind::AttributeNotFound,
            ErrorKind::ValueError,
            ErrorKind::StackOverflow,
        ] {
            assert_eq!(ErrorKind::from_python_name(kind.python_name()), Some(kind));
        }
        assert_eq!(ErrorKind::from_python_name("NotAnError"), None);
    }

    #[test]
    fn test_traceback_order() {
        let mut err = RuntimeError::new(ErrorKind::IndexOutOfRange, "list index out of range");
        err.push_frame(StackFrame::new("inner", 3));
        err.push_frame(StackFrame::new("outer", 10));
        let text = err.traceback();
        let outer = text.find("outer").unwrap();
        let inner = text.find("inner").unwrap();
        assert!(outer < inner);
        assert!(text.ends_with("IndexError: list index out of range"));
    }
}
