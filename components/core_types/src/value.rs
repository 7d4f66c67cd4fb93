//! Tagged primitive value representation.
//!
//! Every register of the virtual machine holds a [`TaggedValue`]. Integers,
//! floats, booleans and `None` are stored inline; everything else (strings,
//! containers, functions, instances) lives on the VM heap and is referenced
//! through an [`ObjectHandle`].

use std::fmt;

use crate::pool::SmallValuePool;

/// Raw tag values used by the native-code slot encoding.
///
/// Compiled loop bodies store registers as `(tag, bits)` pairs of machine
/// words; these constants are the contract between [`TaggedValue::to_raw`]
/// and generated code.
pub mod tag {
    /// `None`
    pub const NONE: u64 = 0;
    /// `Bool`; bits are 0 or 1
    pub const BOOL: u64 = 1;
    /// `Int`; bits are the two's complement `i64`
    pub const INT: u64 = 2;
    /// `Float`; bits are the IEEE-754 encoding
    pub const FLOAT: u64 = 3;
    /// `Object`; bits are the heap handle index
    pub const OBJECT: u64 = 4;
}

/// Index of an object in the VM heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(pub u32);

impl ObjectHandle {
    /// Arena index of this handle
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A register value.
///
/// Fast-path operations work directly on the `Int`, `Float` and `Bool`
/// variants. An `Object` operand always forces the generic path.
///
/// # Examples
///
/// ```
/// use core_types::{make_int, TaggedValue};
///
/// let v = make_int(42);
/// assert_eq!(v, TaggedValue::Int(42));
/// assert!(v.is_fast_path());
/// assert_eq!(v.type_name(), "int");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TaggedValue {
    /// 64-bit signed integer
    Int(i64),
    /// IEEE-754 double
    Float(f64),
    /// Boolean
    Bool(bool),
    /// The `None` singleton
    #[default]
    None,
    /// Reference to a heap object
    Object(ObjectHandle),
}

impl TaggedValue {
    /// Whether this value can be handled by fast-path opcodes.
    #[inline]
    pub fn is_fast_path(&self) -> bool {
        matches!(
            self,
            TaggedValue::Int(_) | TaggedValue::Float(_) | TaggedValue::Bool(_)
        )
    }

    /// Integer view of `Int` and `Bool` values.
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            TaggedValue::Int(i) => Some(i),
            TaggedValue::Bool(b) => Some(b as i64),
            _ => None,
        }
    }

    /// Float view of any numeric primitive.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            TaggedValue::Int(i) => Some(i as f64),
            TaggedValue::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            TaggedValue::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Heap handle, if this is an object.
    #[inline]
    pub fn as_object(&self) -> Option<ObjectHandle> {
        match *self {
            TaggedValue::Object(h) => Some(h),
            _ => None,
        }
    }

    /// Truthiness of primitive values.
    ///
    /// Returns `None` for objects, whose truthiness depends on the heap
    /// (empty containers are false).
    #[inline]
    pub fn primitive_truthiness(&self) -> Option<bool> {
        match *self {
            TaggedValue::Int(i) => Some(i != 0),
            TaggedValue::Float(f) => Some(f != 0.0),
            TaggedValue::Bool(b) => Some(b),
            TaggedValue::None => Some(false),
            TaggedValue::Object(_) => None,
        }
    }

    /// Python type name of primitive values (`"object"` for heap values).
    pub fn type_name(&self) -> &'static str {
        match self {
            TaggedValue::Int(_) => "int",
            TaggedValue::Float(_) => "float",
            TaggedValue::Bool(_) => "bool",
            TaggedValue::None => "NoneType",
            TaggedValue::Object(_) => "object",
        }
    }

    /// Encode as a `(tag, bits)` pair for native code.
    #[inline]
    pub fn to_raw(self) -> (u64, u64) {
        match self {
            TaggedValue::None => (tag::NONE, 0),
            TaggedValue::Bool(b) => (tag::BOOL, b as u64),
            TaggedValue::Int(i) => (tag::INT, i as u64),
            TaggedValue::Float(f) => (tag::FLOAT, f.to_bits()),
            TaggedValue::Object(h) => (tag::OBJECT, h.0 as u64),
        }
    }

    /// Decode a `(tag, bits)` pair produced by [`TaggedValue::to_raw`] or by
    /// compiled code. Unknown tags yield `None`.
    #[inline]
    pub fn from_raw(raw_tag: u64, bits: u64) -> Option<TaggedValue> {
        match raw_tag {
            tag::NONE => Some(TaggedValue::None),
            tag::BOOL => Some(TaggedValue::Bool(bits != 0)),
            tag::INT => Some(TaggedValue::Int(bits as i64)),
            tag::FLOAT => Some(TaggedValue::Float(f64::from_bits(bits))),
            tag::OBJECT => u32::try_from(bits)
                .ok()
                .map(|idx| TaggedValue::Object(ObjectHandle(idx))),
            _ => None,
        }
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaggedValue::Int(i) => write!(f, "{}", i),
            TaggedValue::Float(x) => write!(f, "{:?}", x),
            TaggedValue::Bool(true) => write!(f, "True"),
            TaggedValue::Bool(false) => write!(f, "False"),
            TaggedValue::None => write!(f, "None"),
            TaggedValue::Object(h) => write!(f, "<object #{}>", h.0),
        }
    }
}

/// Build an integer value, reusing the pooled instance when in range.
#[inline]
pub fn make_int(value: i64) -> TaggedValue {
    match SmallValuePool::global().int(value) {
        Some(pooled) => *pooled,
        None => TaggedValue::Int(value),
    }
}

/// Build a float value. Floats are not pooled.
#[inline]
pub fn make_float(value: f64) -> TaggedValue {
    TaggedValue::Float(value)
}

/// Build a boolean value from the pool.
#[inline]
pub fn make_bool(value: bool) -> TaggedValue {
    *SmallValuePool::global().bool(value)
}

/// The pooled `None` value.
#[inline]
pub fn none() -> TaggedValue {
    *SmallValuePool::global().none()
}

/// Whether `value` can be handled by fast-path opcodes.
#[inline]
pub fn is_fast_path(value: TaggedValue) -> bool {
    value.is_fast_path()
}
