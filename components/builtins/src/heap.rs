//! Per-VM object arena
//!
//! Objects are appended and never freed; an [`ObjectHandle`] stays valid for
//! the lifetime of the heap that issued it.

use std::collections::HashMap;

use core_types::{make_int, ErrorKind, ObjectHandle, RuntimeError, TaggedValue};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::hash::{DictObject, SetObject};
use crate::object::HeapObject;

/// Object arena plus the string intern table.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
    interned: HashMap<String, ObjectHandle>,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing has been allocated
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Move `object` into the arena.
    pub fn alloc(&mut self, object: HeapObject) -> TaggedValue {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(object);
        TaggedValue::Object(handle)
    }

    /// Borrow an object.
    pub fn get(&self, handle: ObjectHandle) -> Result<&HeapObject, RuntimeError> {
        self.objects
            .get(handle.index())
            .ok_or_else(|| dangling(handle))
    }

    /// Mutably borrow an object.
    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut HeapObject, RuntimeError> {
        self.objects
            .get_mut(handle.index())
            .ok_or_else(|| dangling(handle))
    }

    /// Heap object behind `value`, or `None` for primitives.
    pub fn object(&self, value: TaggedValue) -> Result<Option<&HeapObject>, RuntimeError> {
        match value {
            TaggedValue::Object(h) => self.get(h).map(Some),
            _ => Ok(None),
        }
    }

    /// Allocate a fresh string.
    pub fn alloc_str(&mut self, s: impl Into<String>) -> TaggedValue {
        self.alloc(HeapObject::Str(s.into()))
    }

    /// Shared string for constants and attribute names.
    pub fn intern(&mut self, s: &str) -> TaggedValue {
        if let Some(&h) = self.interned.get(s) {
            return TaggedValue::Object(h);
        }
        let value = self.alloc_str(s);
        if let TaggedValue::Object(h) = value {
            self.interned.insert(s.to_string(), h);
        }
        value
    }

    /// Allocate a list
    pub fn alloc_list(&mut self, items: Vec<TaggedValue>) -> TaggedValue {
        self.alloc(HeapObject::List(items))
    }

    /// Allocate a tuple
    pub fn alloc_tuple(&mut self, items: Vec<TaggedValue>) -> TaggedValue {
        self.alloc(HeapObject::Tuple(items))
    }

    /// Build a dict from key/value pairs; later keys win.
    pub fn alloc_dict(
        &mut self,
        pairs: impl IntoIterator<Item = (TaggedValue, TaggedValue)>,
    ) -> Result<TaggedValue, RuntimeError> {
        let mut dict = DictObject::new();
        for (k, v) in pairs {
            let key = crate::hash::hash_key(self, k)?;
            dict.insert(key, k, v);
        }
        Ok(self.alloc(HeapObject::Dict(dict)))
    }

    /// Build a set; duplicates collapse to the first occurrence.
    pub fn alloc_set(
        &mut self,
        items: impl IntoIterator<Item = TaggedValue>,
    ) -> Result<TaggedValue, RuntimeError> {
        let mut set = SetObject::new();
        for item in items {
            let key = crate::hash::hash_key(self, item)?;
            set.insert(key, item);
        }
        Ok(self.alloc(HeapObject::Set(set)))
    }

    /// Integer value for `n`: inline when it fits in `i64`, boxed otherwise.
    pub fn int_from_big(&mut self, n: BigInt) -> TaggedValue {
        match n.to_i64() {
            Some(i) => make_int(i),
            None => self.alloc(HeapObject::BigInt(n)),
        }
    }

    /// String contents of `value`, if it is a string.
    pub fn as_str(&self, value: TaggedValue) -> Option<&str> {
        match self.object(value) {
            Ok(Some(HeapObject::Str(s))) => Some(s),
            _ => None,
        }
    }

    /// Arbitrary-precision view of `Int`, `Bool` and boxed integers.
    pub fn as_bigint(&self, value: TaggedValue) -> Option<BigInt> {
        match value {
            TaggedValue::Int(i) => Some(BigInt::from(i)),
            TaggedValue::Bool(b) => Some(BigInt::from(b as i64)),
            TaggedValue::Object(_) => match self.object(value) {
                Ok(Some(HeapObject::BigInt(n))) => Some(n.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether `value` is a boxed integer
    pub fn is_bigint(&self, value: TaggedValue) -> bool {
        matches!(self.object(value), Ok(Some(HeapObject::BigInt(_))))
    }
}

fn dangling(handle: ObjectHandle) -> RuntimeError {
    RuntimeError::new(
        ErrorKind::InternalError,
        format!("dangling object handle #{}", handle.0),
    )
}
