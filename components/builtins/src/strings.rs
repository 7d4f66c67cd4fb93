//! String methods and `BuildString`

use core_types::{make_bool, make_int, RuntimeError, TaggedValue};

use crate::format::{to_str, type_name};
use crate::functions::check_arity;
use crate::heap::Heap;
use crate::iter;

/// Concatenate the `str()` of each part.
pub fn build_string(heap: &mut Heap, parts: &[TaggedValue]) -> Result<TaggedValue, RuntimeError> {
    let mut out = String::new();
    for &part in parts {
        match heap.as_str(part) {
            Some(s) => out.push_str(s),
            None => out.push_str(&to_str(heap, part)?),
        }
    }
    Ok(heap.alloc_str(out))
}

fn str_arg<'h>(heap: &'h Heap, method: &str, value: TaggedValue) -> Result<&'h str, RuntimeError> {
    heap.as_str(value).ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{}() argument must be str, not {}",
            method,
            type_name(heap, value).unwrap_or_default()
        ))
    })
}

/// Methods of `str`.
pub struct StrMethods;

impl StrMethods {
    /// Method names resolvable on a string
    pub const NAMES: &'static [&'static str] = &[
        "upper",
        "lower",
        "strip",
        "split",
        "join",
        "replace",
        "startswith",
        "endswith",
        "find",
    ];

    /// Call `str.<name>(*args)` on `receiver`.
    pub fn call(
        heap: &mut Heap,
        receiver: TaggedValue,
        name: &str,
        args: &[TaggedValue],
    ) -> Result<TaggedValue, RuntimeError> {
        let s = str_arg(heap, name, receiver)?.to_string();
        match name {
            "upper" => {
                check_arity(name, args, 0, 0)?;
                Ok(heap.alloc_str(s.to_uppercase()))
            }
            "lower" => {
                check_arity(name, args, 0, 0)?;
                Ok(heap.alloc_str(s.to_lowercase()))
            }
            "strip" => {
                check_arity(name, args, 0, 1)?;
                let stripped = match args.first() {
                    None | Some(TaggedValue::None) => s.trim().to_string(),
                    Some(&chars) => {
                        let chars: Vec<char> = str_arg(heap, name, chars)?.chars().collect();
                        s.trim_matches(|c| chars.contains(&c)).to_string()
                    }
                };
                Ok(heap.alloc_str(stripped))
            }
            "split" => {
                check_arity(name, args, 0, 1)?;
                let pieces: Vec<String> = match args.first() {
                    None | Some(TaggedValue::None) => {
                        s.split_whitespace().map(str::to_string).collect()
                    }
                    Some(&sep) => {
                        let sep = str_arg(heap, name, sep)?;
                        if sep.is_empty() {
                            return Err(RuntimeError::new(
                                core_types::ErrorKind::ValueError,
                                "empty separator",
                            ));
                        }
                        s.split(sep).map(str::to_string).collect()
                    }
                };
                let items = pieces.into_iter().map(|p| heap.alloc_str(p)).collect();
                Ok(heap.alloc_list(items))
            }
            "join" => {
                check_arity(name, args, 1, 1)?;
                let items = iter::collect(heap, args[0])?;
                let mut parts = Vec::with_capacity(items.len());
                for (i, &item) in items.iter().enumerate() {
                    match heap.as_str(item) {
                        Some(part) => parts.push(part),
                        None => {
                            return Err(RuntimeError::type_error(format!(
                                "sequence item {}: expected str instance, {} found",
                                i,
                                type_name(heap, item)?
                            )))
                        }
                    }
                }
                let joined = parts.join(&s);
                Ok(heap.alloc_str(joined))
            }
            "replace" => {
                check_arity(name, args, 2, 2)?;
                let old = str_arg(heap, name, args[0])?;
                let new = str_arg(heap, name, args[1])?;
                let replaced = s.replace(old, new);
                Ok(heap.alloc_str(replaced))
            }
            "startswith" => {
                check_arity(name, args, 1, 1)?;
                Ok(make_bool(s.starts_with(str_arg(heap, name, args[0])?)))
            }
            "endswith" => {
                check_arity(name, args, 1, 1)?;
                Ok(make_bool(s.ends_with(str_arg(heap, name, args[0])?)))
            }
            "find" => {
                check_arity(name, args, 1, 1)?;
                let needle = str_arg(heap, name, args[0])?;
                Ok(make_int(match s.find(needle) {
                    Some(byte) => s[..byte].chars().count() as i64,
                    None => -1,
                }))
            }
            _ => Err(RuntimeError::new(
                core_types::ErrorKind::AttributeNotFound,
                format!("'str' object has no attribute '{}'", name),
            )),
        }
    }
}
