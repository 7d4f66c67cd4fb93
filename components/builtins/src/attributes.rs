//! Attribute access and method resolution
//!
//! Instances look up their own attributes first, then walk the class chain
//! (single inheritance). Functions found on the class are bound to the
//! receiver. Builtin types expose a fixed method table.

use core_types::{ErrorKind, ObjectHandle, RuntimeError, TaggedValue};

use crate::containers::{DictMethods, ListMethods, SetMethods};
use crate::format::type_name;
use crate::functions::BuiltinFn;
use crate::heap::Heap;
use crate::object::{FunctionId, HeapObject};
use crate::strings::StrMethods;

/// Inheritance chains longer than this are treated as cyclic.
const MAX_CLASS_DEPTH: usize = 256;

/// Something the dispatcher knows how to invoke.
#[derive(Debug, Clone, PartialEq)]
pub enum Callable {
    /// Bytecode function, optionally with a bound receiver prepended
    Function {
        /// Registry id
        id: FunctionId,
        /// Bound `self`
        receiver: Option<TaggedValue>,
    },
    /// Builtin function
    Builtin(BuiltinFn),
    /// Method of a builtin type
    BuiltinMethod {
        /// Receiver
        receiver: TaggedValue,
        /// Method name
        name: String,
    },
    /// Class instantiation
    Class(ObjectHandle),
    /// Builtin exception constructor
    ExceptionType(ErrorKind),
}

fn attribute_error(heap: &Heap, value: TaggedValue, name: &str) -> RuntimeError {
    RuntimeError::new(
        ErrorKind::AttributeNotFound,
        format!(
            "'{}' object has no attribute '{}'",
            type_name(heap, value).unwrap_or_default(),
            name
        ),
    )
}

/// Find `name` on `class` or one of its bases.
pub fn lookup_class_attr(
    heap: &Heap,
    class: ObjectHandle,
    name: &str,
) -> Result<Option<TaggedValue>, RuntimeError> {
    let mut current = Some(class);
    for _ in 0..MAX_CLASS_DEPTH {
        let Some(handle) = current else {
            return Ok(None);
        };
        match heap.get(handle)? {
            HeapObject::Class(class) => {
                if let Some(&value) = class.attrs.get(name) {
                    return Ok(Some(value));
                }
                current = class.base;
            }
            _ => return Ok(None),
        }
    }
    Err(RuntimeError::type_error("class hierarchy is too deep or cyclic"))
}

/// Whether `class` is `ancestor` or derives from it.
pub fn is_subclass(heap: &Heap, class: ObjectHandle, ancestor: ObjectHandle) -> Result<bool, RuntimeError> {
    let mut current = Some(class);
    for _ in 0..MAX_CLASS_DEPTH {
        match current {
            None => return Ok(false),
            Some(h) if h == ancestor => return Ok(true),
            Some(h) => {
                current = match heap.get(h)? {
                    HeapObject::Class(c) => c.base,
                    _ => None,
                }
            }
        }
    }
    Ok(false)
}

fn builtin_method_names(object: &HeapObject) -> &'static [&'static str] {
    match object {
        HeapObject::Str(_) => StrMethods::NAMES,
        HeapObject::List(_) => ListMethods::NAMES,
        HeapObject::Dict(_) => DictMethods::NAMES,
        HeapObject::Set(_) => SetMethods::NAMES,
        _ => &[],
    }
}

/// `obj.name`
pub fn get_attr(heap: &mut Heap, obj: TaggedValue, name: &str) -> Result<TaggedValue, RuntimeError> {
    let found = match heap.object(obj)? {
        Some(HeapObject::Instance(inst)) => match inst.attrs.get(name) {
            Some(&value) => return Ok(value),
            None => lookup_class_attr(heap, inst.class, name)?,
        },
        Some(HeapObject::Class(_)) => {
            let handle = obj.as_object().ok_or_else(|| attribute_error(heap, obj, name))?;
            return lookup_class_attr(heap, handle, name)?
                .ok_or_else(|| attribute_error(heap, obj, name));
        }
        Some(HeapObject::Exception(exc)) if name == "args" => {
            let message = exc.message.clone();
            let message = heap.alloc_str(message);
            return Ok(heap.alloc_tuple(vec![message]));
        }
        Some(object) if builtin_method_names(object).contains(&name) => {
            return Ok(heap.alloc(HeapObject::BuiltinMethod {
                receiver: obj,
                name: name.to_string(),
            }));
        }
        _ => None,
    };
    match found {
        Some(function) if matches!(heap.object(function)?, Some(HeapObject::Function(_))) => {
            Ok(heap.alloc(HeapObject::BoundMethod {
                receiver: obj,
                function,
            }))
        }
        Some(value) => Ok(value),
        None => Err(attribute_error(heap, obj, name)),
    }
}

/// `obj.name = value`
pub fn set_attr(
    heap: &mut Heap,
    obj: TaggedValue,
    name: &str,
    value: TaggedValue,
) -> Result<(), RuntimeError> {
    if let TaggedValue::Object(h) = obj {
        match heap.get_mut(h)? {
            HeapObject::Instance(inst) => {
                inst.attrs.insert(name.to_string(), value);
                return Ok(());
            }
            HeapObject::Class(class) => {
                class.attrs.insert(name.to_string(), value);
                return Ok(());
            }
            _ => {}
        }
    }
    Err(attribute_error(heap, obj, name))
}

/// Resolve `obj.name(...)` without allocating a bound method object.
pub fn resolve_method(heap: &mut Heap, obj: TaggedValue, name: &str) -> Result<Callable, RuntimeError> {
    let method = match heap.object(obj)? {
        Some(HeapObject::Instance(inst)) if !inst.attrs.contains_key(name) => {
            lookup_class_attr(heap, inst.class, name)?
        }
        Some(object) if builtin_method_names(object).contains(&name) => {
            return Ok(Callable::BuiltinMethod {
                receiver: obj,
                name: name.to_string(),
            })
        }
        _ => None,
    };
    if let Some(function) = method {
        if let Some(HeapObject::Function(f)) = heap.object(function)? {
            return Ok(Callable::Function {
                id: f.id,
                receiver: Some(obj),
            });
        }
    }
    let value = get_attr(heap, obj, name)?;
    resolve_callable(heap, value)
}

/// Classify a callee value.
pub fn resolve_callable(heap: &Heap, callee: TaggedValue) -> Result<Callable, RuntimeError> {
    let not_callable = || {
        RuntimeError::type_error(format!(
            "'{}' object is not callable",
            type_name(heap, callee).unwrap_or_default()
        ))
    };
    Ok(match heap.object(callee)? {
        Some(HeapObject::Function(f)) => Callable::Function {
            id: f.id,
            receiver: None,
        },
        Some(HeapObject::BoundMethod { receiver, function }) => match heap.object(*function)? {
            Some(HeapObject::Function(f)) => Callable::Function {
                id: f.id,
                receiver: Some(*receiver),
            },
            _ => return Err(not_callable()),
        },
        Some(HeapObject::Builtin(f)) => Callable::Builtin(*f),
        Some(HeapObject::BuiltinMethod { receiver, name }) => Callable::BuiltinMethod {
            receiver: *receiver,
            name: name.clone(),
        },
        Some(HeapObject::Class(_)) => match callee {
            TaggedValue::Object(h) => Callable::Class(h),
            _ => return Err(not_callable()),
        },
        Some(HeapObject::ExceptionType(kind)) => Callable::ExceptionType(*kind),
        _ => return Err(not_callable()),
    })
}

/// Invoke a builtin-type method on its receiver.
pub fn call_builtin_method(
    heap: &mut Heap,
    receiver: TaggedValue,
    name: &str,
    args: &[TaggedValue],
) -> Result<TaggedValue, RuntimeError> {
    match heap.object(receiver)? {
        Some(HeapObject::Str(_)) => StrMethods::call(heap, receiver, name, args),
        Some(HeapObject::List(_)) => ListMethods::call(heap, receiver, name, args),
        Some(HeapObject::Dict(_)) => DictMethods::call(heap, receiver, name, args),
        Some(HeapObject::Set(_)) => SetMethods::call(heap, receiver, name, args),
        _ => Err(attribute_error(heap, receiver, name)),
    }
}
