//! Heap object representation
//!
//! Everything that is not a primitive [`TaggedValue`] lives in the VM heap
//! as a [`HeapObject`].

use std::collections::HashMap;

use core_types::{ErrorKind, ObjectHandle, RuntimeError, TaggedValue};
use num_bigint::BigInt;

use crate::functions::BuiltinFn;
use crate::hash::{DictObject, SetObject};

/// Identity of a loaded bytecode function.
///
/// Allocated by the interpreter when a chunk is loaded; the heap only stores
/// the id and resolves calls back through the interpreter's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u64);

/// A function value created by `MakeFunction`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionObject {
    /// Registry id of the loaded function
    pub id: FunctionId,
    /// Function name, used by `repr` and tracebacks
    pub name: String,
}

/// A user class created by `MakeClass`.
#[derive(Debug, Clone)]
pub struct ClassObject {
    /// Class name
    pub name: String,
    /// Single base class, if any
    pub base: Option<ObjectHandle>,
    /// Class namespace (methods and class attributes)
    pub attrs: HashMap<String, TaggedValue>,
}

/// An instance of a user class.
#[derive(Debug, Clone)]
pub struct InstanceObject {
    /// Handle of the instance's class
    pub class: ObjectHandle,
    /// Instance attributes
    pub attrs: HashMap<String, TaggedValue>,
}

/// An exception value, either raised by user code or materialized from a
/// runtime error when a handler catches it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionObject {
    /// Error kind this exception maps to
    pub kind: ErrorKind,
    /// Python-visible class name (`ValueError`, ...)
    pub class_name: String,
    /// Message passed to the constructor
    pub message: String,
}

/// Lazy integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeObject {
    /// First value
    pub start: i64,
    /// Exclusive bound
    pub stop: i64,
    /// Step, never zero
    pub step: i64,
}

impl RangeObject {
    /// Number of values the range yields, without the `i64` limit.
    pub fn count(&self) -> i128 {
        let (lo, hi, step) = if self.step > 0 {
            (self.start as i128, self.stop as i128, self.step as i128)
        } else {
            (self.stop as i128, self.start as i128, -(self.step as i128))
        };
        if lo >= hi {
            0
        } else {
            (hi - lo + step - 1) / step
        }
    }

    /// Number of values the range yields, as `len()` reports it.
    pub fn len(&self) -> Result<i64, RuntimeError> {
        i64::try_from(self.count()).map_err(|_| {
            RuntimeError::new(ErrorKind::ValueError, "range() result has too many items")
        })
    }

    /// Whether the range is empty
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Value at position `index` (`0 <= index < count`).
    pub fn nth(&self, index: i128) -> i64 {
        (self.start as i128 + index * self.step as i128) as i64
    }

    /// Value at Python index `index`; negative indices count from the end.
    pub fn get(&self, index: i64) -> Option<i64> {
        let count = self.count();
        let i = if index < 0 { index as i128 + count } else { index as i128 };
        (0..count).contains(&i).then(|| self.nth(i))
    }

    /// Whether `value` is produced by the range.
    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            value >= self.start && value < self.stop
        } else {
            value <= self.start && value > self.stop
        };
        in_bounds && (value as i128 - self.start as i128) % self.step as i128 == 0
    }
}

/// Iteration cursor.
#[derive(Debug, Clone)]
pub enum IteratorState {
    /// Walks a list or tuple by index, observing mutation
    Sequence {
        /// The list or tuple being walked
        source: ObjectHandle,
        /// Next index
        index: usize,
    },
    /// Walks the characters of a string
    Chars {
        /// The string being walked
        source: ObjectHandle,
        /// Byte offset of the next character
        offset: usize,
    },
    /// Walks a range
    Range {
        /// Next value
        next: i64,
        /// Exclusive bound
        stop: i64,
        /// Step
        step: i64,
    },
    /// Walks a snapshot (dict keys, set members)
    Snapshot {
        /// Captured values
        values: Vec<TaggedValue>,
        /// Next index
        index: usize,
    },
}

/// A heap-allocated value.
#[derive(Debug, Clone)]
pub enum HeapObject {
    /// Immutable string
    Str(String),
    /// Integer outside the `i64` range
    BigInt(BigInt),
    /// Mutable list
    List(Vec<TaggedValue>),
    /// Immutable tuple
    Tuple(Vec<TaggedValue>),
    /// Insertion-ordered dict
    Dict(DictObject),
    /// Insertion-ordered set
    Set(SetObject),
    /// `range(...)`
    Range(RangeObject),
    /// Iterator over a container
    Iterator(IteratorState),
    /// User function
    Function(FunctionObject),
    /// User class
    Class(ClassObject),
    /// Instance of a user class
    Instance(InstanceObject),
    /// Function bound to a receiver
    BoundMethod {
        /// The `self` argument
        receiver: TaggedValue,
        /// The underlying function value
        function: TaggedValue,
    },
    /// Builtin function such as `len`
    Builtin(BuiltinFn),
    /// Method of a builtin type bound to its receiver (`"a,b".split`)
    BuiltinMethod {
        /// The receiver
        receiver: TaggedValue,
        /// Method name
        name: String,
    },
    /// Builtin exception class such as `ValueError`
    ExceptionType(ErrorKind),
    /// Exception instance
    Exception(ExceptionObject),
}

impl HeapObject {
    /// Python type name. Instances report `"object"`; use
    /// [`crate::format::type_name`] for the class name.
    pub fn type_name(&self) -> &'static str {
        match self {
            HeapObject::Str(_) => "str",
            HeapObject::BigInt(_) => "int",
            HeapObject::List(_) => "list",
            HeapObject::Tuple(_) => "tuple",
            HeapObject::Dict(_) => "dict",
            HeapObject::Set(_) => "set",
            HeapObject::Range(_) => "range",
            HeapObject::Iterator(_) => "iterator",
            HeapObject::Function(_) => "function",
            HeapObject::Class(_) | HeapObject::ExceptionType(_) => "type",
            HeapObject::Instance(_) => "object",
            HeapObject::BoundMethod { .. } => "method",
            HeapObject::Builtin(_) | HeapObject::BuiltinMethod { .. } => {
                "builtin_function_or_method"
            }
            HeapObject::Exception(_) => "Exception",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_len() {
        let r = |start, stop, step| RangeObject { start, stop, step };
        assert_eq!(r(0, 10, 1).count(), 10);
        assert_eq!(r(0, 10, 3).count(), 4);
        assert_eq!(r(10, 0, -1).count(), 10);
        assert_eq!(r(10, 0, -3).count(), 4);
        assert_eq!(r(5, 5, 1).count(), 0);
        assert_eq!(r(5, 0, 1).count(), 0);
        assert_eq!(r(i64::MIN, i64::MAX, i64::MAX).count(), 3);
    }

    #[test]
    fn test_range_longer_than_i64() {
        let full = RangeObject {
            start: i64::MIN,
            stop: i64::MAX,
            step: 1,
        };
        assert_eq!(full.count(), u64::MAX as i128);
        let err = full.len().unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
        assert!(!full.is_empty());
        assert_eq!(full.get(0), Some(i64::MIN));
        assert_eq!(full.get(-1), Some(i64::MAX - 1));
        assert_eq!(full.get(i64::MAX), Some(-1));
    }

    #[test]
    fn test_range_contains() {
        let r = RangeObject {
            start: 1,
            stop: 10,
            step: 3,
        };
        assert!(r.contains(1));
        assert!(r.contains(7));
        assert!(!r.contains(8));
        assert!(!r.contains(10));
        let back = RangeObject {
            start: 10,
            stop: 0,
            step: -5,
        };
        assert!(back.contains(5));
        assert!(!back.contains(0));
        assert_eq!(back.nth(1), 5);
        assert_eq!(back.get(-1), Some(5));
        assert_eq!(back.get(2), None);
    }
}
