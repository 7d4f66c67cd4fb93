//! Exception objects and their conversion to and from runtime errors

use core_types::{ErrorKind, RuntimeError, TaggedValue};

use crate::format::{to_str, type_name};
use crate::heap::Heap;
use crate::object::{ExceptionObject, HeapObject, InstanceObject};

/// Builtin exception classes visible to user code.
pub const EXCEPTION_TYPES: &[ErrorKind] = &[
    ErrorKind::UncaughtException,
    ErrorKind::ValueError,
    ErrorKind::TypeError,
    ErrorKind::IndexOutOfRange,
    ErrorKind::KeyNotFound,
    ErrorKind::DivisionByZero,
    ErrorKind::AttributeNotFound,
    ErrorKind::InternalError,
    ErrorKind::NameNotFound,
    ErrorKind::IntegerOverflow,
    ErrorKind::StackOverflow,
];

/// `ValueError("msg")` and friends.
pub fn new_exception(
    heap: &mut Heap,
    kind: ErrorKind,
    args: &[TaggedValue],
) -> Result<TaggedValue, RuntimeError> {
    let message = match args.first() {
        Some(&arg) => to_str(heap, arg)?,
        None => String::new(),
    };
    Ok(heap.alloc(HeapObject::Exception(ExceptionObject {
        kind,
        class_name: kind.python_name().to_string(),
        message,
    })))
}

/// The value a `try` handler receives for `err`.
///
/// Errors raised by user code carry their exception object; internal errors
/// are materialized as an instance of the matching builtin class.
pub fn exception_for_error(heap: &mut Heap, err: &RuntimeError) -> TaggedValue {
    if let Some(exception) = err.exception {
        return exception;
    }
    heap.alloc(HeapObject::Exception(ExceptionObject {
        kind: err.kind,
        class_name: err.kind.python_name().to_string(),
        message: err.message.clone(),
    }))
}

/// Turn the operand of `Raise` into an error.
pub fn error_from_raise(heap: &mut Heap, value: TaggedValue) -> RuntimeError {
    let exception = match heap.object(value) {
        Ok(Some(HeapObject::ExceptionType(kind))) => {
            let kind = *kind;
            match new_exception(heap, kind, &[]) {
                Ok(exc) => exc,
                Err(err) => return err,
            }
        }
        Ok(Some(HeapObject::Class(_))) => match value.as_object() {
            Some(class) => heap.alloc(HeapObject::Instance(InstanceObject {
                class,
                attrs: Default::default(),
            })),
            None => value,
        },
        Ok(Some(HeapObject::Exception(_))) | Ok(Some(HeapObject::Instance(_))) => value,
        Ok(_) => {
            return RuntimeError::type_error("exceptions must derive from BaseException")
        }
        Err(err) => return err,
    };

    let message = match heap.object(exception) {
        Ok(Some(HeapObject::Exception(exc))) if exc.message.is_empty() => exc.class_name.clone(),
        Ok(Some(HeapObject::Exception(exc))) => format!("{}: {}", exc.class_name, exc.message),
        _ => type_name(heap, exception).unwrap_or_default(),
    };
    RuntimeError::new(ErrorKind::UncaughtException, message).with_exception(exception)
}

/// Whether an exception value is an instance of the builtin class `kind`.
///
/// `Exception` matches every exception; user classes match when their
/// inheritance chain reaches the builtin class.
pub fn exception_matches(
    heap: &Heap,
    value: TaggedValue,
    kind: ErrorKind,
) -> Result<bool, RuntimeError> {
    let wanted = kind.python_name();
    let catch_all = kind == ErrorKind::UncaughtException;
    match heap.object(value)? {
        Some(HeapObject::Exception(exc)) => Ok(catch_all || exc.class_name == wanted),
        Some(HeapObject::Instance(inst)) => {
            let mut current = Some(inst.class);
            while let Some(h) = current {
                current = match heap.get(h)? {
                    HeapObject::Class(c) => c.base,
                    HeapObject::ExceptionType(k) => {
                        return Ok(catch_all || k.python_name() == wanted)
                    }
                    _ => None,
                };
            }
            Ok(false)
        }
        _ => Ok(false),
    }
}
