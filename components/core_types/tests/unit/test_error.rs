//! Unit tests for RuntimeError and ErrorKind

use core_types::{ErrorKind, RuntimeError, StackFrame, TaggedValue};

#[test]
fn test_error_carries_kind_and_trace() {
    let mut err = RuntimeError::new(ErrorKind::AttributeNotFound, "'P' object has no attribute 'z'");
    err.push_frame(StackFrame::new("method", 2));
    err.push_frame(StackFrame::new("main", 8));
    assert_eq!(err.kind, ErrorKind::AttributeNotFound);
    assert_eq!(err.trace[0].function_name, "method");
    assert_eq!(err.trace[1].pc, 8);
}

#[test]
fn test_error_with_exception_object() {
    let err = RuntimeError::new(ErrorKind::UncaughtException, "ValueError: bad")
        .with_exception(TaggedValue::Int(1));
    assert_eq!(err.exception, Some(TaggedValue::Int(1)));
    assert_eq!(err.to_string(), "UncaughtException: ValueError: bad");
}

#[test]
fn test_from_kind_has_message() {
    let err: RuntimeError = ErrorKind::DivisionByZero.into();
    assert_eq!(err.message, "division by zero");
    assert!(err.trace.is_empty());
}
