//! Builtin functions (`print`, `len`, `range`, ...)

use std::str::FromStr;

use bytecode_system::BinaryOp;
use core_types::{make_bool, make_float, make_int, none, ErrorKind, RuntimeError, TaggedValue};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed};

use crate::arith::{as_f64, binary_op, ordering, truthy};
use crate::attributes::is_subclass;
use crate::containers;
use crate::exceptions::exception_matches;
use crate::format::{quote_str, repr, to_str, type_name};
use crate::heap::Heap;
use crate::iter;
use crate::object::{HeapObject, RangeObject};
use crate::runtime::Runtime;

/// A builtin function value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFn {
    /// `print(*args)`
    Print,
    /// `len(x)`
    Len,
    /// `range(stop)` / `range(start, stop[, step])`
    Range,
    /// `str(x)`
    Str,
    /// `repr(x)`
    Repr,
    /// `int(x)`
    Int,
    /// `float(x)`
    Float,
    /// `bool(x)`
    Bool,
    /// `abs(x)`
    Abs,
    /// `min(...)`
    Min,
    /// `max(...)`
    Max,
    /// `sum(iterable[, start])`
    Sum,
    /// `list(iterable)`
    List,
    /// `tuple(iterable)`
    Tuple,
    /// `dict(mapping_or_pairs)`
    Dict,
    /// `set(iterable)`
    Set,
    /// `isinstance(x, cls)`
    IsInstance,
}

impl BuiltinFn {
    /// Every builtin function, in registration order
    pub const ALL: [BuiltinFn; 17] = [
        BuiltinFn::Print,
        BuiltinFn::Len,
        BuiltinFn::Range,
        BuiltinFn::Str,
        BuiltinFn::Repr,
        BuiltinFn::Int,
        BuiltinFn::Float,
        BuiltinFn::Bool,
        BuiltinFn::Abs,
        BuiltinFn::Min,
        BuiltinFn::Max,
        BuiltinFn::Sum,
        BuiltinFn::List,
        BuiltinFn::Tuple,
        BuiltinFn::Dict,
        BuiltinFn::Set,
        BuiltinFn::IsInstance,
    ];

    /// Global name of the builtin
    pub fn name(self) -> &'static str {
        match self {
            BuiltinFn::Print => "print",
            BuiltinFn::Len => "len",
            BuiltinFn::Range => "range",
            BuiltinFn::Str => "str",
            BuiltinFn::Repr => "repr",
            BuiltinFn::Int => "int",
            BuiltinFn::Float => "float",
            BuiltinFn::Bool => "bool",
            BuiltinFn::Abs => "abs",
            BuiltinFn::Min => "min",
            BuiltinFn::Max => "max",
            BuiltinFn::Sum => "sum",
            BuiltinFn::List => "list",
            BuiltinFn::Tuple => "tuple",
            BuiltinFn::Dict => "dict",
            BuiltinFn::Set => "set",
            BuiltinFn::IsInstance => "isinstance",
        }
    }
}

/// Reject calls with fewer than `min` or more than `max` arguments.
pub fn check_arity(name: &str, args: &[TaggedValue], min: usize, max: usize) -> Result<(), RuntimeError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let plural = |n: usize| if n == 1 { "" } else { "s" };
    let expected = if min == max {
        match min {
            0 => "no arguments".to_string(),
            1 => "exactly one argument".to_string(),
            n => format!("exactly {} arguments", n),
        }
    } else if args.len() < min {
        format!("at least {} argument{}", min, plural(min))
    } else {
        format!("at most {} argument{}", max, plural(max))
    };
    Err(RuntimeError::type_error(format!(
        "{}() takes {} ({} given)",
        name,
        expected,
        args.len()
    )))
}

/// Invoke a builtin function.
pub fn call_builtin(
    rt: &mut Runtime,
    function: BuiltinFn,
    args: &[TaggedValue],
) -> Result<TaggedValue, RuntimeError> {
    let name = function.name();
    match function {
        BuiltinFn::Print => {
            let mut line = String::new();
            for (i, &arg) in args.iter().enumerate() {
                if i > 0 {
                    line.push(' ');
                }
                line.push_str(&to_str(&rt.heap, arg)?);
            }
            rt.write_line(&line)?;
            Ok(none())
        }
        BuiltinFn::Len => {
            check_arity(name, args, 1, 1)?;
            containers::len(&rt.heap, args[0]).map(make_int)
        }
        BuiltinFn::Range => {
            check_arity(name, args, 1, 3)?;
            let mut bounds = [0i64, 0, 1];
            for (i, &arg) in args.iter().enumerate() {
                bounds[i] = arg.as_int().ok_or_else(|| {
                    RuntimeError::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        type_name(&rt.heap, arg).unwrap_or_default()
                    ))
                })?;
            }
            let [start, stop, step] = match args.len() {
                1 => [0, bounds[0], 1],
                _ => bounds,
            };
            if step == 0 {
                return Err(RuntimeError::new(
                    ErrorKind::ValueError,
                    "range() arg 3 must not be zero",
                ));
            }
            Ok(rt.heap.alloc(HeapObject::Range(RangeObject { start, stop, step })))
        }
        BuiltinFn::Str => {
            check_arity(name, args, 0, 1)?;
            match args.first() {
                Some(&v) if rt.heap.as_str(v).is_some() => Ok(v),
                Some(&v) => {
                    let s = to_str(&rt.heap, v)?;
                    Ok(rt.heap.alloc_str(s))
                }
                None => Ok(rt.heap.alloc_str("")),
            }
        }
        BuiltinFn::Repr => {
            check_arity(name, args, 1, 1)?;
            let s = repr(&rt.heap, args[0])?;
            Ok(rt.heap.alloc_str(s))
        }
        BuiltinFn::Int => {
            check_arity(name, args, 0, 1)?;
            match args.first() {
                Some(&v) => to_int(&mut rt.heap, v),
                None => Ok(make_int(0)),
            }
        }
        BuiltinFn::Float => {
            check_arity(name, args, 0, 1)?;
            match args.first() {
                Some(&v) => to_float(&rt.heap, v).map(make_float),
                None => Ok(make_float(0.0)),
            }
        }
        BuiltinFn::Bool => {
            check_arity(name, args, 0, 1)?;
            match args.first() {
                Some(&v) => truthy(&rt.heap, v).map(make_bool),
                None => Ok(make_bool(false)),
            }
        }
        BuiltinFn::Abs => {
            check_arity(name, args, 1, 1)?;
            abs(&mut rt.heap, args[0])
        }
        BuiltinFn::Min | BuiltinFn::Max => {
            if args.is_empty() {
                return Err(RuntimeError::type_error(format!(
                    "{} expected at least 1 argument, got 0",
                    name
                )));
            }
            let candidates = if args.len() == 1 {
                iter::collect(&mut rt.heap, args[0])?
            } else {
                args.to_vec()
            };
            let mut best = *candidates.first().ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::ValueError,
                    format!("{}() arg is an empty sequence", name),
                )
            })?;
            for &candidate in &candidates[1..] {
                let order = ordering(&rt.heap, candidate, best, "<")?;
                let better = match function {
                    BuiltinFn::Min => order.is_some_and(|o| o.is_lt()),
                    _ => order.is_some_and(|o| o.is_gt()),
                };
                if better {
                    best = candidate;
                }
            }
            Ok(best)
        }
        BuiltinFn::Sum => {
            check_arity(name, args, 1, 2)?;
            let items = iter::collect(&mut rt.heap, args[0])?;
            let mut total = args.get(1).copied().unwrap_or(make_int(0));
            if rt.heap.as_str(total).is_some() {
                return Err(RuntimeError::type_error(
                    "sum() can't sum strings [use ''.join(seq) instead]",
                ));
            }
            for item in items {
                total = binary_op(&mut rt.heap, BinaryOp::Add, total, item)?;
            }
            Ok(total)
        }
        BuiltinFn::List | BuiltinFn::Tuple | BuiltinFn::Set => {
            check_arity(name, args, 0, 1)?;
            let items = match args.first() {
                Some(&v) => iter::collect(&mut rt.heap, v)?,
                None => Vec::new(),
            };
            match function {
                BuiltinFn::List => Ok(rt.heap.alloc_list(items)),
                BuiltinFn::Tuple => Ok(rt.heap.alloc_tuple(items)),
                _ => rt.heap.alloc_set(items),
            }
        }
        BuiltinFn::Dict => {
            check_arity(name, args, 0, 1)?;
            let pairs = match args.first() {
                Some(&v) => dict_pairs(&mut rt.heap, v)?,
                None => Vec::new(),
            };
            rt.heap.alloc_dict(pairs)
        }
        BuiltinFn::IsInstance => {
            check_arity(name, args, 2, 2)?;
            isinstance(&rt.heap, args[0], args[1]).map(make_bool)
        }
    }
}

fn to_int(heap: &mut Heap, value: TaggedValue) -> Result<TaggedValue, RuntimeError> {
    match value {
        TaggedValue::Int(_) => return Ok(value),
        TaggedValue::Bool(b) => return Ok(make_int(b as i64)),
        TaggedValue::Float(f) => {
            if f.is_nan() {
                return Err(RuntimeError::new(
                    ErrorKind::ValueError,
                    "cannot convert float NaN to integer",
                ));
            }
            if f.is_infinite() {
                return Err(RuntimeError::new(
                    ErrorKind::ValueError,
                    "cannot convert float infinity to integer",
                ));
            }
            let truncated = f.trunc();
            return Ok(match BigInt::from_f64(truncated) {
                Some(n) => heap.int_from_big(n),
                None => make_int(truncated as i64),
            });
        }
        _ => {}
    }
    if heap.is_bigint(value) {
        return Ok(value);
    }
    if let Some(text) = heap.as_str(value) {
        let parsed = BigInt::from_str(text.trim()).ok();
        let literal = quote_str(text);
        return match parsed {
            Some(n) => Ok(heap.int_from_big(n)),
            None => Err(RuntimeError::new(
                ErrorKind::ValueError,
                format!("invalid literal for int() with base 10: {}", literal),
            )),
        };
    }
    Err(RuntimeError::type_error(format!(
        "int() argument must be a string or a number, not '{}'",
        type_name(heap, value)?
    )))
}

fn to_float(heap: &Heap, value: TaggedValue) -> Result<f64, RuntimeError> {
    if let Some(f) = as_f64(heap, value) {
        return Ok(f);
    }
    if let Some(text) = heap.as_str(value) {
        return text.trim().parse::<f64>().map_err(|_| {
            RuntimeError::new(
                ErrorKind::ValueError,
                format!("could not convert string to float: {}", quote_str(text)),
            )
        });
    }
    Err(RuntimeError::type_error(format!(
        "float() argument must be a string or a number, not '{}'",
        type_name(heap, value)?
    )))
}

fn abs(heap: &mut Heap, value: TaggedValue) -> Result<TaggedValue, RuntimeError> {
    match value {
        TaggedValue::Int(i) => Ok(match i.checked_abs() {
            Some(a) => make_int(a),
            None => heap.int_from_big(BigInt::from(i).abs()),
        }),
        TaggedValue::Bool(b) => Ok(make_int(b as i64)),
        TaggedValue::Float(f) => Ok(make_float(f.abs())),
        _ => match heap.as_bigint(value) {
            Some(n) => Ok(heap.int_from_big(n.abs())),
            None => Err(RuntimeError::type_error(format!(
                "bad operand type for abs(): '{}'",
                type_name(heap, value)?
            ))),
        },
    }
}

fn dict_pairs(
    heap: &mut Heap,
    value: TaggedValue,
) -> Result<Vec<(TaggedValue, TaggedValue)>, RuntimeError> {
    if let Some(HeapObject::Dict(d)) = heap.object(value)? {
        return Ok(d.entries().to_vec());
    }
    let mut pairs = Vec::new();
    for (i, element) in iter::collect(heap, value)?.into_iter().enumerate() {
        let pair = iter::collect(heap, element)?;
        match pair.as_slice() {
            &[k, v] => pairs.push((k, v)),
            other => {
                return Err(RuntimeError::new(
                    ErrorKind::ValueError,
                    format!(
                        "dictionary update sequence element #{} has length {}; 2 is required",
                        i,
                        other.len()
                    ),
                ))
            }
        }
    }
    Ok(pairs)
}

/// `isinstance(value, cls)`; `cls` may be a tuple of classes.
pub fn isinstance(heap: &Heap, value: TaggedValue, cls: TaggedValue) -> Result<bool, RuntimeError> {
    let object = heap.object(value)?;
    match heap.object(cls)? {
        Some(HeapObject::Tuple(options)) => {
            for &option in options {
                if isinstance(heap, value, option)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Some(HeapObject::Class(_)) => match (object, cls.as_object()) {
            (Some(HeapObject::Instance(inst)), Some(class)) => is_subclass(heap, inst.class, class),
            _ => Ok(false),
        },
        Some(HeapObject::ExceptionType(kind)) => exception_matches(heap, value, *kind),
        Some(HeapObject::Builtin(f)) => Ok(match f {
            BuiltinFn::Int => {
                matches!(value, TaggedValue::Int(_) | TaggedValue::Bool(_))
                    || matches!(object, Some(HeapObject::BigInt(_)))
            }
            BuiltinFn::Float => matches!(value, TaggedValue::Float(_)),
            BuiltinFn::Bool => matches!(value, TaggedValue::Bool(_)),
            BuiltinFn::Str => matches!(object, Some(HeapObject::Str(_))),
            BuiltinFn::List => matches!(object, Some(HeapObject::List(_))),
            BuiltinFn::Tuple => matches!(object, Some(HeapObject::Tuple(_))),
            BuiltinFn::Dict => matches!(object, Some(HeapObject::Dict(_))),
            BuiltinFn::Set => matches!(object, Some(HeapObject::Set(_))),
            BuiltinFn::Range => matches!(object, Some(HeapObject::Range(_))),
            _ => return Err(isinstance_type_error()),
        }),
        _ => Err(isinstance_type_error()),
    }
}

fn isinstance_type_error() -> RuntimeError {
    RuntimeError::type_error("isinstance() arg 2 must be a type or tuple of types")
}
