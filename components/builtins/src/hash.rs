//! Hashing and the insertion-ordered dict/set tables

use std::collections::HashMap;

use core_types::{ObjectHandle, RuntimeError, TaggedValue};
use num_bigint::BigInt;

use crate::heap::Heap;
use crate::object::HeapObject;

/// Normalized hash key.
///
/// Numerically equal keys collapse: `True`, `1` and `1.0` all become
/// `Int(1)`, so they address the same dict slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    /// `None`
    None,
    /// Integral numbers (including bools and integral floats)
    Int(i64),
    /// Boxed integer outside `i64`
    Big(BigInt),
    /// Non-integral float, by bit pattern
    Float(u64),
    /// String contents
    Str(String),
    /// Tuple of hashable members
    Tuple(Vec<HashKey>),
    /// Identity-hashed object (functions, classes, instances)
    Identity(ObjectHandle),
}

/// Compute the hash key for `value`.
///
/// Lists, dicts and sets are unhashable (`TypeError`).
pub fn hash_key(heap: &Heap, value: TaggedValue) -> Result<HashKey, RuntimeError> {
    Ok(match value {
        TaggedValue::None => HashKey::None,
        TaggedValue::Bool(b) => HashKey::Int(b as i64),
        TaggedValue::Int(i) => HashKey::Int(i),
        TaggedValue::Float(f) => float_key(f),
        TaggedValue::Object(h) => match heap.get(h)? {
            HeapObject::Str(s) => HashKey::Str(s.clone()),
            HeapObject::BigInt(n) => HashKey::Big(n.clone()),
            HeapObject::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(|&item| hash_key(heap, item))
                    .collect::<Result<_, _>>()?,
            ),
            obj @ (HeapObject::List(_) | HeapObject::Dict(_) | HeapObject::Set(_)) => {
                return Err(RuntimeError::type_error(format!(
                    "unhashable type: '{}'",
                    obj.type_name()
                )))
            }
            _ => HashKey::Identity(h),
        },
    })
}

fn float_key(f: f64) -> HashKey {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        HashKey::Int(f as i64)
    } else {
        HashKey::Float(f.to_bits())
    }
}

/// Insertion-ordered mapping.
#[derive(Debug, Clone, Default)]
pub struct DictObject {
    entries: Vec<(TaggedValue, TaggedValue)>,
    index: HashMap<HashKey, usize>,
}

impl DictObject {
    /// Create an empty dict
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dict is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a value.
    pub fn get(&self, key: &HashKey) -> Option<TaggedValue> {
        self.index.get(key).map(|&i| self.entries[i].1)
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &HashKey) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or overwrite. An existing entry keeps its original key object
    /// and position.
    pub fn insert(&mut self, hash: HashKey, key: TaggedValue, value: TaggedValue) {
        match self.index.get(&hash) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(hash, self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    /// Remove an entry, returning its value.
    pub fn remove(&mut self, key: &HashKey) -> Option<TaggedValue> {
        let i = self.index.remove(key)?;
        let (_, value) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(value)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<TaggedValue> {
        self.entries.iter().map(|(k, _)| *k).collect()
    }

    /// Values in insertion order
    pub fn values(&self) -> Vec<TaggedValue> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[(TaggedValue, TaggedValue)] {
        &self.entries
    }
}

/// Insertion-ordered set.
#[derive(Debug, Clone, Default)]
pub struct SetObject {
    items: Vec<TaggedValue>,
    index: HashMap<HashKey, usize>,
}

impl SetObject {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a member; returns false when it was already present.
    pub fn insert(&mut self, hash: HashKey, item: TaggedValue) -> bool {
        if self.index.contains_key(&hash) {
            return false;
        }
        self.index.insert(hash, self.items.len());
        self.items.push(item);
        true
    }

    /// Membership test
    pub fn contains(&self, hash: &HashKey) -> bool {
        self.index.contains_key(hash)
    }

    /// Members in insertion order
    pub fn items(&self) -> &[TaggedValue] {
        &self.items
    }
}
