//! Python-style `str()` and `repr()` rendering

use core_types::{ObjectHandle, RuntimeError, TaggedValue};

use crate::heap::Heap;
use crate::object::HeapObject;

/// Render a float the way Python's `repr` does.
///
/// Uses the shortest round-trip digits (ryu) and switches to exponent
/// notation outside `1e-4 <= |f| < 1e16`.
///
/// ```
/// use builtins::format::format_float;
///
/// assert_eq!(format_float(0.1), "0.1");
/// assert_eq!(format_float(3.0), "3.0");
/// assert_eq!(format_float(1e16), "1e+16");
/// assert_eq!(format_float(1.5e-7), "1.5e-07");
/// ```
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let mut buffer = ryu::Buffer::new();
    let shortest = buffer.format_finite(f);
    let (negative, body) = match shortest.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, shortest),
    };
    let (mantissa, exp) = match body.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (body, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    // value = 0.DIGITS * 10^decpt
    let mut digits: String = format!("{}{}", int_part, frac_part);
    let mut decpt = int_part.len() as i32 + exp;
    let leading = digits.len() - digits.trim_start_matches('0').len();
    digits.drain(..leading);
    decpt -= leading as i32;
    let trimmed = digits.trim_end_matches('0').len();
    digits.truncate(trimmed);

    let n = digits.len() as i32;
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if -4 < decpt && decpt <= 16 {
        if decpt <= 0 {
            out.push_str("0.");
            out.extend(std::iter::repeat('0').take((-decpt) as usize));
            out.push_str(&digits);
        } else if decpt >= n {
            out.push_str(&digits);
            out.extend(std::iter::repeat('0').take((decpt - n) as usize));
            out.push_str(".0");
        } else {
            let (head, tail) = digits.split_at(decpt as usize);
            out.push_str(head);
            out.push('.');
            out.push_str(tail);
        }
    } else {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        let e = decpt - 1;
        out.push_str(&format!("e{}{:02}", if e < 0 { '-' } else { '+' }, e.abs()));
    }
    out
}

/// Quote a string Python-style.
pub fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Python-visible type name, resolving instances to their class name.
pub fn type_name(heap: &Heap, value: TaggedValue) -> Result<String, RuntimeError> {
    Ok(match heap.object(value)? {
        None => value.type_name().to_string(),
        Some(HeapObject::Instance(inst)) => match heap.get(inst.class)? {
            HeapObject::Class(class) => class.name.clone(),
            other => other.type_name().to_string(),
        },
        Some(HeapObject::Exception(exc)) => exc.class_name.clone(),
        Some(obj) => obj.type_name().to_string(),
    })
}

/// `str(value)`
pub fn to_str(heap: &Heap, value: TaggedValue) -> Result<String, RuntimeError> {
    match heap.object(value)? {
        Some(HeapObject::Str(s)) => Ok(s.clone()),
        Some(HeapObject::Exception(exc)) => Ok(exc.message.clone()),
        _ => repr(heap, value),
    }
}

/// `repr(value)`
pub fn repr(heap: &Heap, value: TaggedValue) -> Result<String, RuntimeError> {
    let mut out = String::new();
    write_repr(heap, value, &mut Vec::new(), &mut out)?;
    Ok(out)
}

fn write_seq(
    heap: &Heap,
    items: &[TaggedValue],
    seen: &mut Vec<ObjectHandle>,
    out: &mut String,
) -> Result<(), RuntimeError> {
    for (i, &item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_repr(heap, item, seen, out)?;
    }
    Ok(())
}

fn write_repr(
    heap: &Heap,
    value: TaggedValue,
    seen: &mut Vec<ObjectHandle>,
    out: &mut String,
) -> Result<(), RuntimeError> {
    let handle = match value {
        TaggedValue::Float(f) => {
            out.push_str(&format_float(f));
            return Ok(());
        }
        TaggedValue::Object(h) => h,
        other => {
            out.push_str(&other.to_string());
            return Ok(());
        }
    };

    let object = heap.get(handle)?;
    if seen.contains(&handle) {
        out.push_str(match object {
            HeapObject::List(_) => "[...]",
            HeapObject::Dict(_) => "{...}",
            _ => "...",
        });
        return Ok(());
    }

    match object {
        HeapObject::Str(s) => out.push_str(&quote_str(s)),
        HeapObject::BigInt(n) => out.push_str(&n.to_string()),
        HeapObject::List(items) => {
            seen.push(handle);
            out.push('[');
            write_seq(heap, items, seen, out)?;
            out.push(']');
            seen.pop();
        }
        HeapObject::Tuple(items) => {
            seen.push(handle);
            out.push('(');
            write_seq(heap, items, seen, out)?;
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
            seen.pop();
        }
        HeapObject::Dict(dict) => {
            seen.push(handle);
            out.push('{');
            for (i, &(k, v)) in dict.entries().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(heap, k, seen, out)?;
                out.push_str(": ");
                write_repr(heap, v, seen, out)?;
            }
            out.push('}');
            seen.pop();
        }
        HeapObject::Set(set) if set.is_empty() => out.push_str("set()"),
        HeapObject::Set(set) => {
            seen.push(handle);
            out.push('{');
            write_seq(heap, set.items(), seen, out)?;
            out.push('}');
            seen.pop();
        }
        HeapObject::Range(r) if r.step == 1 => {
            out.push_str(&format!("range({}, {})", r.start, r.stop))
        }
        HeapObject::Range(r) => {
            out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step))
        }
        HeapObject::Iterator(_) => out.push_str("<iterator object>"),
        HeapObject::Function(f) => out.push_str(&format!("<function {}>", f.name)),
        HeapObject::Class(c) => out.push_str(&format!("<class '{}'>", c.name)),
        HeapObject::Instance(_) => {
            out.push_str(&format!("<{} object>", type_name(heap, value)?))
        }
        HeapObject::BoundMethod { function, .. } => {
            let name = match heap.object(*function)? {
                Some(HeapObject::Function(f)) => f.name.as_str(),
                _ => "?",
            };
            out.push_str(&format!("<bound method {}>", name));
        }
        HeapObject::Builtin(f) => out.push_str(&format!("<built-in function {}>", f.name())),
        HeapObject::BuiltinMethod { receiver, name } => out.push_str(&format!(
            "<built-in method {} of {} object>",
            name,
            type_name(heap, *receiver)?
        )),
        HeapObject::ExceptionType(kind) => {
            out.push_str(&format!("<class '{}'>", kind.python_name()))
        }
        HeapObject::Exception(exc) => {
            out.push_str(&format!("{}({})", exc.class_name, quote_str(&exc.message)))
        }
    }
    Ok(())
}
