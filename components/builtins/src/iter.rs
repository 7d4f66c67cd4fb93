//! Iteration protocol behind `GetIter` / `ForIter`

use core_types::{make_int, RuntimeError, TaggedValue};

use crate::format::type_name;
use crate::heap::Heap;
use crate::object::{HeapObject, IteratorState};

/// `iter(value)`: create an iterator, or return `value` if it already is one.
pub fn get_iter(heap: &mut Heap, value: TaggedValue) -> Result<TaggedValue, RuntimeError> {
    let handle = match value {
        TaggedValue::Object(h) => h,
        _ => return Err(not_iterable(heap, value)),
    };
    let state = match heap.get(handle)? {
        HeapObject::Iterator(_) => return Ok(value),
        HeapObject::List(_) | HeapObject::Tuple(_) => IteratorState::Sequence {
            source: handle,
            index: 0,
        },
        HeapObject::Str(_) => IteratorState::Chars {
            source: handle,
            offset: 0,
        },
        HeapObject::Range(r) => IteratorState::Range {
            next: r.start,
            stop: r.stop,
            step: r.step,
        },
        HeapObject::Dict(d) => IteratorState::Snapshot {
            values: d.keys(),
            index: 0,
        },
        HeapObject::Set(s) => IteratorState::Snapshot {
            values: s.items().to_vec(),
            index: 0,
        },
        _ => return Err(not_iterable(heap, value)),
    };
    Ok(heap.alloc(HeapObject::Iterator(state)))
}

fn not_iterable(heap: &Heap, value: TaggedValue) -> RuntimeError {
    RuntimeError::type_error(format!(
        "'{}' object is not iterable",
        type_name(heap, value).unwrap_or_default()
    ))
}

enum Fetched {
    Item(TaggedValue),
    Char(char),
    Done,
}

/// Advance an iterator; `Ok(None)` once exhausted.
pub fn next(heap: &mut Heap, iterator: TaggedValue) -> Result<Option<TaggedValue>, RuntimeError> {
    let handle = match iterator {
        TaggedValue::Object(h) => h,
        _ => {
            return Err(RuntimeError::type_error(format!(
                "'{}' object is not an iterator",
                iterator.type_name()
            )))
        }
    };

    let (source, position) = match heap.get_mut(handle)? {
        HeapObject::Iterator(IteratorState::Range { next, stop, step }) => {
            let exhausted = if *step > 0 { *next >= *stop } else { *next <= *stop };
            if exhausted {
                return Ok(None);
            }
            let value = *next;
            *next = next.checked_add(*step).unwrap_or(*stop);
            return Ok(Some(make_int(value)));
        }
        HeapObject::Iterator(IteratorState::Snapshot { values, index }) => {
            let item = values.get(*index).copied();
            if item.is_some() {
                *index += 1;
            }
            return Ok(item);
        }
        HeapObject::Iterator(IteratorState::Sequence { source, index }) => (*source, *index),
        HeapObject::Iterator(IteratorState::Chars { source, offset }) => (*source, *offset),
        other => {
            return Err(RuntimeError::type_error(format!(
                "'{}' object is not an iterator",
                other.type_name()
            )))
        }
    };

    let fetched = match heap.get(source)? {
        HeapObject::List(items) | HeapObject::Tuple(items) => {
            items.get(position).map_or(Fetched::Done, |&item| Fetched::Item(item))
        }
        HeapObject::Str(s) => s
            .get(position..)
            .and_then(|rest| rest.chars().next())
            .map_or(Fetched::Done, Fetched::Char),
        _ => Fetched::Done,
    };
    let (item, advance) = match fetched {
        Fetched::Item(item) => (Some(item), 1),
        Fetched::Char(c) => (Some(heap.alloc_str(c.to_string())), c.len_utf8()),
        Fetched::Done => (None, 0),
    };
    if advance > 0 {
        if let HeapObject::Iterator(
            IteratorState::Sequence { index: pos, .. } | IteratorState::Chars { offset: pos, .. },
        ) = heap.get_mut(handle)?
        {
            *pos += advance;
        }
    }
    Ok(item)
}

/// Drain any iterable into a vector.
pub fn collect(heap: &mut Heap, value: TaggedValue) -> Result<Vec<TaggedValue>, RuntimeError> {
    match heap.object(value)? {
        Some(HeapObject::List(items)) | Some(HeapObject::Tuple(items)) => return Ok(items.clone()),
        Some(HeapObject::Set(s)) => return Ok(s.items().to_vec()),
        Some(HeapObject::Dict(d)) => return Ok(d.keys()),
        _ => {}
    }
    let iterator = get_iter(heap, value)?;
    let mut items = Vec::new();
    while let Some(item) = next(heap, iterator)? {
        items.push(item);
    }
    Ok(items)
}
