//! List, tuple, dict and set helpers
//!
//! Indexing, slicing, membership and the methods of the builtin container
//! types. Sequence indices may be negative and count from the end.

use core_types::{make_int, none, ErrorKind, RuntimeError, TaggedValue};

use crate::arith::values_equal;
use crate::format::{repr, type_name};
use crate::functions::check_arity;
use crate::hash::hash_key;
use crate::heap::Heap;
use crate::iter;
use crate::object::HeapObject;

/// Resolve a possibly negative index against `len`.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index + len } else { index };
    if (0..len).contains(&i) {
        Some(i as usize)
    } else {
        None
    }
}

/// Clamp a slice bound the way Python does for a unit step.
fn slice_bound(bound: Option<i64>, len: usize, default: usize) -> usize {
    match bound {
        None => default,
        Some(i) if i < 0 => (len as i64 + i).max(0) as usize,
        Some(i) => (i as usize).min(len),
    }
}

fn index_operand(heap: &Heap, container: &str, key: TaggedValue) -> Result<Option<i64>, RuntimeError> {
    if let Some(i) = key.as_int() {
        return Ok(Some(i));
    }
    if heap.is_bigint(key) {
        return Ok(None);
    }
    Err(RuntimeError::type_error(format!(
        "{} indices must be integers or slices, not {}",
        container,
        type_name(heap, key)?
    )))
}

fn out_of_range(what: &str) -> RuntimeError {
    RuntimeError::new(ErrorKind::IndexOutOfRange, format!("{} index out of range", what))
}

fn key_error(heap: &Heap, key: TaggedValue) -> RuntimeError {
    RuntimeError::new(
        ErrorKind::KeyNotFound,
        repr(heap, key).unwrap_or_else(|_| "<key>".to_string()),
    )
}

/// `container[key]`
pub fn get_item(
    heap: &mut Heap,
    container: TaggedValue,
    key: TaggedValue,
) -> Result<TaggedValue, RuntimeError> {
    let char_at = match heap.object(container)? {
        Some(HeapObject::List(items)) | Some(HeapObject::Tuple(items)) => {
            let what = if matches!(heap.object(container)?, Some(HeapObject::List(_))) {
                "list"
            } else {
                "tuple"
            };
            let index = index_operand(heap, what, key)?;
            return index
                .and_then(|i| normalize_index(i, items.len()))
                .map(|i| items[i])
                .ok_or_else(|| out_of_range(what));
        }
        Some(HeapObject::Dict(dict)) => {
            let hash = hash_key(heap, key)?;
            return dict.get(&hash).ok_or_else(|| key_error(heap, key));
        }
        Some(HeapObject::Range(range)) => {
            let index = index_operand(heap, "range object", key)?;
            return index
                .and_then(|i| range.get(i))
                .map(make_int)
                .ok_or_else(|| out_of_range("range object"));
        }
        Some(HeapObject::Str(s)) => {
            let index = index_operand(heap, "string", key)?;
            let count = s.chars().count();
            index
                .and_then(|i| normalize_index(i, count))
                .and_then(|i| s.chars().nth(i))
                .ok_or_else(|| out_of_range("string"))?
        }
        _ => {
            return Err(RuntimeError::type_error(format!(
                "'{}' object is not subscriptable",
                type_name(heap, container)?
            )))
        }
    };
    Ok(heap.alloc_str(char_at.to_string()))
}

/// `container[key] = value`
pub fn set_item(
    heap: &mut Heap,
    container: TaggedValue,
    key: TaggedValue,
    value: TaggedValue,
) -> Result<(), RuntimeError> {
    match heap.object(container)? {
        Some(HeapObject::List(items)) => {
            let len = items.len();
            let index = index_operand(heap, "list", key)?
                .and_then(|i| normalize_index(i, len))
                .ok_or_else(|| out_of_range("list assignment"))?;
            if let Some(HeapObject::List(items)) = object_mut(heap, container)? {
                items[index] = value;
            }
            Ok(())
        }
        Some(HeapObject::Dict(_)) => {
            let hash = hash_key(heap, key)?;
            if let Some(HeapObject::Dict(dict)) = object_mut(heap, container)? {
                dict.insert(hash, key, value);
            }
            Ok(())
        }
        _ => Err(RuntimeError::type_error(format!(
            "'{}' object does not support item assignment",
            type_name(heap, container)?
        ))),
    }
}

fn object_mut(heap: &mut Heap, value: TaggedValue) -> Result<Option<&mut HeapObject>, RuntimeError> {
    match value {
        TaggedValue::Object(h) => heap.get_mut(h).map(Some),
        _ => Ok(None),
    }
}

fn bound_operand(heap: &Heap, bound: TaggedValue) -> Result<Option<i64>, RuntimeError> {
    match bound {
        TaggedValue::None => Ok(None),
        _ => match bound.as_int() {
            Some(i) => Ok(Some(i)),
            None => match heap.as_bigint(bound) {
                Some(n) if n.sign() == num_bigint::Sign::Minus => Ok(Some(i64::MIN)),
                Some(_) => Ok(Some(i64::MAX)),
                None => Err(RuntimeError::type_error(
                    "slice indices must be integers or None",
                )),
            },
        },
    }
}

/// `container[start:stop]`
pub fn slice(
    heap: &mut Heap,
    container: TaggedValue,
    start: TaggedValue,
    stop: TaggedValue,
) -> Result<TaggedValue, RuntimeError> {
    let start = bound_operand(heap, start)?;
    let stop = bound_operand(heap, stop)?;
    let range = |len: usize| {
        let lo = slice_bound(start, len, 0);
        let hi = slice_bound(stop, len, len);
        lo..hi.max(lo)
    };
    let result = match heap.object(container)? {
        Some(HeapObject::List(items)) => HeapObject::List(items[range(items.len())].to_vec()),
        Some(HeapObject::Tuple(items)) => HeapObject::Tuple(items[range(items.len())].to_vec()),
        Some(HeapObject::Str(s)) => {
            let chars: Vec<char> = s.chars().collect();
            HeapObject::Str(chars[range(chars.len())].iter().collect())
        }
        _ => {
            return Err(RuntimeError::type_error(format!(
                "'{}' object is not subscriptable",
                type_name(heap, container)?
            )))
        }
    };
    Ok(heap.alloc(result))
}

/// `len(value)`
pub fn len(heap: &Heap, value: TaggedValue) -> Result<i64, RuntimeError> {
    Ok(match heap.object(value)? {
        Some(HeapObject::Str(s)) => s.chars().count() as i64,
        Some(HeapObject::List(items)) | Some(HeapObject::Tuple(items)) => items.len() as i64,
        Some(HeapObject::Dict(d)) => d.len() as i64,
        Some(HeapObject::Set(s)) => s.len() as i64,
        Some(HeapObject::Range(r)) => r.len()?,
        _ => {
            return Err(RuntimeError::type_error(format!(
                "object of type '{}' has no len()",
                type_name(heap, value)?
            )))
        }
    })
}

/// `item in container`
pub fn contains(heap: &Heap, container: TaggedValue, item: TaggedValue) -> Result<bool, RuntimeError> {
    match heap.object(container)? {
        Some(HeapObject::Str(s)) => match heap.as_str(item) {
            Some(needle) => Ok(s.contains(needle)),
            None => Err(RuntimeError::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                type_name(heap, item)?
            ))),
        },
        Some(HeapObject::List(items)) | Some(HeapObject::Tuple(items)) => {
            for &candidate in items {
                if values_equal(heap, candidate, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Some(HeapObject::Dict(d)) => Ok(d.contains(&hash_key(heap, item)?)),
        Some(HeapObject::Set(s)) => Ok(s.contains(&hash_key(heap, item)?)),
        Some(HeapObject::Range(r)) => Ok(item.as_int().is_some_and(|i| r.contains(i))),
        _ => Err(RuntimeError::type_error(format!(
            "argument of type '{}' is not iterable",
            type_name(heap, container)?
        ))),
    }
}

/// Append to a list.
pub fn append(heap: &mut Heap, list: TaggedValue, value: TaggedValue) -> Result<(), RuntimeError> {
    match object_mut(heap, list)? {
        Some(HeapObject::List(items)) => {
            items.push(value);
            Ok(())
        }
        _ => Err(RuntimeError::type_error(format!(
            "'{}' object has no attribute 'append'",
            type_name(heap, list)?
        ))),
    }
}

/// Extend a list with already-collected items.
pub fn extend_list(
    heap: &mut Heap,
    list: TaggedValue,
    extra: Vec<TaggedValue>,
) -> Result<(), RuntimeError> {
    match object_mut(heap, list)? {
        Some(HeapObject::List(items)) => {
            items.extend(extra);
            Ok(())
        }
        _ => Err(RuntimeError::internal("extend target is not a list")),
    }
}

fn list_items(heap: &Heap, list: TaggedValue) -> Result<Vec<TaggedValue>, RuntimeError> {
    match heap.object(list)? {
        Some(HeapObject::List(items)) => Ok(items.clone()),
        _ => Err(RuntimeError::internal("receiver is not a list")),
    }
}

fn with_list<T>(
    heap: &mut Heap,
    list: TaggedValue,
    f: impl FnOnce(&mut Vec<TaggedValue>) -> T,
) -> Result<T, RuntimeError> {
    match object_mut(heap, list)? {
        Some(HeapObject::List(items)) => Ok(f(items)),
        _ => Err(RuntimeError::internal("receiver is not a list")),
    }
}

/// Methods of `list`.
pub struct ListMethods;

impl ListMethods {
    /// Method names resolvable on a list
    pub const NAMES: &'static [&'static str] =
        &["append", "pop", "extend", "insert", "index", "count"];

    /// Call `list.<name>(*args)`.
    pub fn call(
        heap: &mut Heap,
        list: TaggedValue,
        name: &str,
        args: &[TaggedValue],
    ) -> Result<TaggedValue, RuntimeError> {
        match name {
            "append" => {
                check_arity("append", args, 1, 1)?;
                append(heap, list, args[0])?;
                Ok(none())
            }
            "extend" => {
                check_arity("extend", args, 1, 1)?;
                let extra = iter::collect(heap, args[0])?;
                extend_list(heap, list, extra)?;
                Ok(none())
            }
            "pop" => {
                check_arity("pop", args, 0, 1)?;
                let position = match args.first() {
                    Some(&i) => Some(index_operand(heap, "list", i)?),
                    None => None,
                };
                let popped = with_list(heap, list, |items| {
                    if items.is_empty() {
                        return Err("pop from empty list");
                    }
                    let index = match position {
                        None => Some(items.len() - 1),
                        Some(i) => i.and_then(|i| normalize_index(i, items.len())),
                    };
                    index.map(|i| items.remove(i)).ok_or("pop index out of range")
                })?;
                popped.map_err(|msg| RuntimeError::new(ErrorKind::IndexOutOfRange, msg))
            }
            "insert" => {
                check_arity("insert", args, 2, 2)?;
                let at = index_operand(heap, "list", args[0])?.unwrap_or(i64::MAX);
                let value = args[1];
                with_list(heap, list, |items| {
                    let len = items.len() as i64;
                    let at = if at < 0 { (len + at).max(0) } else { at.min(len) };
                    items.insert(at as usize, value);
                })?;
                Ok(none())
            }
            "index" => {
                check_arity("index", args, 1, 1)?;
                for (i, candidate) in list_items(heap, list)?.into_iter().enumerate() {
                    if values_equal(heap, candidate, args[0])? {
                        return Ok(make_int(i as i64));
                    }
                }
                Err(RuntimeError::new(
                    ErrorKind::ValueError,
                    format!("{} is not in list", repr(heap, args[0])?),
                ))
            }
            "count" => {
                check_arity("count", args, 1, 1)?;
                let mut count = 0;
                for candidate in list_items(heap, list)? {
                    if values_equal(heap, candidate, args[0])? {
                        count += 1;
                    }
                }
                Ok(make_int(count))
            }
            _ => Err(no_attribute("list", name)),
        }
    }
}

/// Methods of `dict`.
pub struct DictMethods;

impl DictMethods {
    /// Method names resolvable on a dict
    pub const NAMES: &'static [&'static str] = &["get", "keys", "values", "items", "pop"];

    /// Call `dict.<name>(*args)`.
    pub fn call(
        heap: &mut Heap,
        dict: TaggedValue,
        name: &str,
        args: &[TaggedValue],
    ) -> Result<TaggedValue, RuntimeError> {
        match name {
            "get" => {
                check_arity("get", args, 1, 2)?;
                let hash = hash_key(heap, args[0])?;
                let found = match heap.object(dict)? {
                    Some(HeapObject::Dict(d)) => d.get(&hash),
                    _ => None,
                };
                Ok(found.unwrap_or_else(|| args.get(1).copied().unwrap_or_default()))
            }
            "keys" | "values" | "items" => {
                check_arity(name, args, 0, 0)?;
                let entries = match heap.object(dict)? {
                    Some(HeapObject::Dict(d)) => d.entries().to_vec(),
                    _ => Vec::new(),
                };
                let items = match name {
                    "keys" => entries.into_iter().map(|(k, _)| k).collect(),
                    "values" => entries.into_iter().map(|(_, v)| v).collect(),
                    _ => entries
                        .into_iter()
                        .map(|(k, v)| heap.alloc_tuple(vec![k, v]))
                        .collect(),
                };
                Ok(heap.alloc_list(items))
            }
            "pop" => {
                check_arity("pop", args, 1, 2)?;
                let hash = hash_key(heap, args[0])?;
                let removed = match object_mut(heap, dict)? {
                    Some(HeapObject::Dict(d)) => d.remove(&hash),
                    _ => None,
                };
                match (removed, args.get(1)) {
                    (Some(v), _) => Ok(v),
                    (None, Some(&default)) => Ok(default),
                    (None, None) => Err(key_error(heap, args[0])),
                }
            }
            _ => Err(no_attribute("dict", name)),
        }
    }
}

/// Methods of `set`.
pub struct SetMethods;

impl SetMethods {
    /// Method names resolvable on a set
    pub const NAMES: &'static [&'static str] = &["add"];

    /// Call `set.<name>(*args)`.
    pub fn call(
        heap: &mut Heap,
        set: TaggedValue,
        name: &str,
        args: &[TaggedValue],
    ) -> Result<TaggedValue, RuntimeError> {
        match name {
            "add" => {
                check_arity("add", args, 1, 1)?;
                let hash = hash_key(heap, args[0])?;
                if let Some(HeapObject::Set(s)) = object_mut(heap, set)? {
                    s.insert(hash, args[0]);
                }
                Ok(none())
            }
            _ => Err(no_attribute("set", name)),
        }
    }
}

fn no_attribute(type_name: &str, name: &str) -> RuntimeError {
    RuntimeError::new(
        ErrorKind::AttributeNotFound,
        format!("'{}' object has no attribute '{}'", type_name, name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> TaggedValue {
        TaggedValue::Int(v)
    }

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
    }

    #[test]
    fn test_list_indexing() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![int(10), int(20), int(30)]);
        assert_eq!(get_item(&mut heap, list, int(-1)).unwrap(), int(30));
        let err = get_item(&mut heap, list, int(3)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfRange);
        assert_eq!(err.message, "list index out of range");

        set_item(&mut heap, list, int(0), int(11)).unwrap();
        assert_eq!(get_item(&mut heap, list, TaggedValue::Bool(false)).unwrap(), int(11));

        let s = heap.alloc_str("a");
        let err = get_item(&mut heap, list, s).unwrap_err();
        assert_eq!(err.message, "list indices must be integers or slices, not str");
    }

    #[test]
    fn test_dict_missing_key() {
        let mut heap = Heap::new();
        let k = heap.alloc_str("k");
        let dict = heap.alloc_dict(vec![(k, int(1))]).unwrap();
        assert_eq!(get_item(&mut heap, dict, k).unwrap(), int(1));
        let missing = heap.alloc_str("nope");
        let err = get_item(&mut heap, dict, missing).unwrap_err();
        assert_eq!(err.kind, ErrorKind::KeyNotFound);
        assert_eq!(err.message, "'nope'");
    }

    #[test]
    fn test_tuple_is_immutable() {
        let mut heap = Heap::new();
        let tuple = heap.alloc_tuple(vec![int(1)]);
        let err = set_item(&mut heap, tuple, int(0), int(2)).unwrap_err();
        assert_eq!(err.message, "'tuple' object does not support item assignment");
    }

    #[test]
    fn test_slices() {
        let mut heap = Heap::new();
        let list = heap.alloc_list((0..5).map(int).collect());
        let part = slice(&mut heap, list, int(1), int(-1)).unwrap();
        assert_eq!(repr(&heap, part).unwrap(), "[1, 2, 3]");
        let empty = slice(&mut heap, list, int(4), int(1)).unwrap();
        assert_eq!(repr(&heap, empty).unwrap(), "[]");

        let s = heap.alloc_str("héllo");
        let tail = slice(&mut heap, s, int(1), TaggedValue::None).unwrap();
        assert_eq!(heap.as_str(tail), Some("éllo"));
    }

    #[test]
    fn test_contains() {
        let mut heap = Heap::new();
        let hay = heap.alloc_str("haystack");
        let needle = heap.alloc_str("st");
        assert!(contains(&heap, hay, needle).unwrap());
        assert!(contains(&heap, hay, int(1)).is_err());

        let list = heap.alloc_list(vec![int(1), TaggedValue::Float(2.0)]);
        assert!(contains(&heap, list, int(2)).unwrap());
        let set = heap.alloc_set(vec![int(7)]).unwrap();
        assert!(contains(&heap, set, TaggedValue::Float(7.0)).unwrap());
    }

    #[test]
    fn test_list_methods() {
        let mut heap = Heap::new();
        let list = heap.alloc_list(vec![int(1), int(2)]);
        ListMethods::call(&mut heap, list, "insert", &[int(0), int(0)]).unwrap();
        ListMethods::call(&mut heap, list, "append", &[int(2)]).unwrap();
        assert_eq!(repr(&heap, list).unwrap(), "[0, 1, 2, 2]");
        assert_eq!(ListMethods::call(&mut heap, list, "count", &[int(2)]).unwrap(), int(2));
        assert_eq!(ListMethods::call(&mut heap, list, "index", &[int(1)]).unwrap(), int(1));
        assert_eq!(ListMethods::call(&mut heap, list, "pop", &[]).unwrap(), int(2));
        assert_eq!(ListMethods::call(&mut heap, list, "pop", &[int(0)]).unwrap(), int(0));

        let err = ListMethods::call(&mut heap, list, "index", &[int(9)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
        let empty = heap.alloc_list(vec![]);
        let err = ListMethods::call(&mut heap, empty, "pop", &[]).unwrap_err();
        assert_eq!(err.message, "pop from empty list");
    }

    #[test]
    fn test_dict_methods() {
        let mut heap = Heap::new();
        let a = heap.alloc_str("a");
        let dict = heap.alloc_dict(vec![(a, int(1))]).unwrap();
        assert_eq!(DictMethods::call(&mut heap, dict, "get", &[a]).unwrap(), int(1));
        assert_eq!(
            DictMethods::call(&mut heap, dict, "get", &[int(5), int(0)]).unwrap(),
            int(0)
        );
        let items = DictMethods::call(&mut heap, dict, "items", &[]).unwrap();
        assert_eq!(repr(&heap, items).unwrap(), "[('a', 1)]");
    }
}
