//! Generic arithmetic, comparison and truthiness
//!
//! These run whenever a fast-path operation reports a fallback: an object
//! operand or a 64-bit overflow. Integers that leave the `i64` range are
//! promoted to arbitrary precision and normalized back once they fit.

use std::cmp::Ordering;

use bytecode_system::{BinaryOp, CompareOp, UnaryOp};
use core_types::{make_bool, make_float, ops, ErrorKind, RuntimeError, TaggedValue};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::containers;
use crate::format::type_name;
use crate::heap::Heap;
use crate::iter;
use crate::object::HeapObject;

/// Structural comparisons deeper than this are reported as recursion errors.
const MAX_COMPARE_DEPTH: usize = 512;

/// Largest sequence a repetition may build (bytes for `str`, items otherwise).
pub const MAX_REPEAT_LEN: usize = 1 << 28;

/// Largest integer, in bits, that pow, shifts and products may produce.
pub const MAX_INT_BITS: u64 = 1 << 24;

fn primitive(op: BinaryOp, a: TaggedValue, b: TaggedValue) -> ops::OpResult {
    match op {
        BinaryOp::Add => ops::add(a, b),
        BinaryOp::Sub => ops::sub(a, b),
        BinaryOp::Mul => ops::mul(a, b),
        BinaryOp::Div => ops::div(a, b),
        BinaryOp::FloorDiv => ops::floordiv(a, b),
        BinaryOp::Mod => ops::r#mod(a, b),
        BinaryOp::Pow => ops::pow(a, b),
        BinaryOp::BitAnd => ops::and_(a, b),
        BinaryOp::BitOr => ops::or_(a, b),
        BinaryOp::BitXor => ops::xor(a, b),
        BinaryOp::Shl => ops::shl(a, b),
        BinaryOp::Shr => ops::shr(a, b),
    }
}

fn op_error(kind: ErrorKind, op: BinaryOp) -> RuntimeError {
    let message = match (kind, op) {
        (ErrorKind::DivisionByZero, BinaryOp::Div) => "division by zero",
        (ErrorKind::DivisionByZero, BinaryOp::FloorDiv) => "integer division or modulo by zero",
        (ErrorKind::DivisionByZero, BinaryOp::Mod) => "integer modulo by zero",
        (ErrorKind::DivisionByZero, BinaryOp::Pow) => "0 cannot be raised to a negative power",
        (ErrorKind::ValueError, BinaryOp::Shl | BinaryOp::Shr) => "negative shift count",
        _ => return RuntimeError::from(kind),
    };
    RuntimeError::new(kind, message)
}

fn unsupported(heap: &Heap, op: BinaryOp, a: TaggedValue, b: TaggedValue) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        type_name(heap, a).unwrap_or_default(),
        type_name(heap, b).unwrap_or_default()
    ))
}

/// `a <op> b` with full semantics.
pub fn binary_op(
    heap: &mut Heap,
    op: BinaryOp,
    a: TaggedValue,
    b: TaggedValue,
) -> Result<TaggedValue, RuntimeError> {
    if a.is_fast_path() && b.is_fast_path() {
        match primitive(op, a, b) {
            Ok(v) => return Ok(v),
            Err(ErrorKind::IntegerOverflow) => {}
            Err(ErrorKind::TypeMismatch) => return Err(unsupported(heap, op, a, b)),
            Err(kind) => return Err(op_error(kind, op)),
        }
    }

    if let (Some(x), Some(y)) = (heap.as_bigint(a), heap.as_bigint(b)) {
        return big_binary(heap, op, x, y);
    }

    // Boxed integer mixed with a float
    if heap.is_bigint(a) || heap.is_bigint(b) {
        if let (Some(x), Some(y)) = (as_f64(heap, a), as_f64(heap, b)) {
            return primitive(op, make_float(x), make_float(y)).map_err(|kind| {
                if kind == ErrorKind::TypeMismatch {
                    unsupported(heap, op, a, b)
                } else {
                    op_error(kind, op)
                }
            });
        }
    }

    sequence_binary(heap, op, a, b)
}

/// Float view of any numeric value, including boxed integers.
pub fn as_f64(heap: &Heap, value: TaggedValue) -> Option<f64> {
    value.as_float().or_else(|| match heap.object(value) {
        Ok(Some(HeapObject::BigInt(n))) => n.to_f64(),
        _ => None,
    })
}

fn big_binary(
    heap: &mut Heap,
    op: BinaryOp,
    x: BigInt,
    y: BigInt,
) -> Result<TaggedValue, RuntimeError> {
    let zero_check = |y: &BigInt| {
        if y.is_zero() {
            Err(op_error(ErrorKind::DivisionByZero, op))
        } else {
            Ok(())
        }
    };
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => {
            if x.bits() + y.bits() > MAX_INT_BITS {
                return Err(too_large());
            }
            x * y
        }
        BinaryOp::Div => {
            zero_check(&y)?;
            let (fx, fy) = (x.to_f64().unwrap_or(f64::NAN), y.to_f64().unwrap_or(f64::NAN));
            return Ok(make_float(fx / fy));
        }
        BinaryOp::FloorDiv => {
            zero_check(&y)?;
            x.div_floor(&y)
        }
        BinaryOp::Mod => {
            zero_check(&y)?;
            x.mod_floor(&y)
        }
        BinaryOp::Pow => {
            if y.is_negative() {
                if x.is_zero() {
                    return Err(op_error(ErrorKind::DivisionByZero, op));
                }
                let (fx, fy) = (x.to_f64().unwrap_or(f64::NAN), y.to_f64().unwrap_or(f64::NAN));
                return Ok(make_float(fx.powf(fy)));
            }
            if y.is_zero() {
                BigInt::from(1)
            } else if x.bits() <= 1 {
                // 0, 1 and -1 stay small for any exponent
                if x.is_negative() && y.is_even() {
                    BigInt::from(1)
                } else {
                    x
                }
            } else {
                match y.to_u64().filter(|&e| x.bits().saturating_mul(e) <= MAX_INT_BITS) {
                    Some(e) => x.pow(e as u32),
                    None => return Err(too_large()),
                }
            }
        }
        BinaryOp::BitAnd => x & y,
        BinaryOp::BitOr => x | y,
        BinaryOp::BitXor => x ^ y,
        BinaryOp::Shl | BinaryOp::Shr if y.is_negative() => {
            return Err(op_error(ErrorKind::ValueError, op))
        }
        BinaryOp::Shl => {
            if x.is_zero() {
                x
            } else {
                match y.to_u64().filter(|&n| x.bits().saturating_add(n) <= MAX_INT_BITS) {
                    Some(n) => x << n as usize,
                    None => return Err(too_large()),
                }
            }
        }
        BinaryOp::Shr => match y.to_usize() {
            Some(n) => x >> n,
            None if x.is_negative() => BigInt::from(-1),
            None => BigInt::zero(),
        },
    };
    Ok(heap.int_from_big(result))
}

fn repeat_count(value: TaggedValue) -> Option<usize> {
    value.as_int().map(|n| usize::try_from(n.max(0)).unwrap_or(usize::MAX))
}

fn check_repeat(what: &str, len: usize, count: usize) -> Result<usize, RuntimeError> {
    len.checked_mul(count)
        .filter(|&total| total <= MAX_REPEAT_LEN)
        .map(|_| count)
        .ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::ValueError,
                format!("repeated {} is too long", what),
            )
        })
}

fn too_large() -> RuntimeError {
    RuntimeError::new(ErrorKind::ValueError, "integer result too large")
}

fn sequence_binary(
    heap: &mut Heap,
    op: BinaryOp,
    a: TaggedValue,
    b: TaggedValue,
) -> Result<TaggedValue, RuntimeError> {
    let result = match (op, heap.object(a)?, heap.object(b)?) {
        (BinaryOp::Add, Some(HeapObject::Str(x)), Some(HeapObject::Str(y))) => {
            HeapObject::Str(format!("{}{}", x, y))
        }
        (BinaryOp::Add, Some(HeapObject::List(x)), Some(HeapObject::List(y))) => {
            HeapObject::List(x.iter().chain(y.iter()).copied().collect())
        }
        (BinaryOp::Add, Some(HeapObject::Tuple(x)), Some(HeapObject::Tuple(y))) => {
            HeapObject::Tuple(x.iter().chain(y.iter()).copied().collect())
        }
        (BinaryOp::Mul, Some(seq), None) | (BinaryOp::Mul, None, Some(seq)) => {
            let count = repeat_count(if heap.object(a)?.is_some() { b } else { a });
            match (seq, count) {
                (HeapObject::Str(s), Some(n)) => {
                    HeapObject::Str(s.repeat(check_repeat("string", s.len(), n)?))
                }
                (HeapObject::List(items), Some(n)) => {
                    HeapObject::List(items.repeat(check_repeat("list", items.len(), n)?))
                }
                (HeapObject::Tuple(items), Some(n)) => {
                    HeapObject::Tuple(items.repeat(check_repeat("tuple", items.len(), n)?))
                }
                _ => return Err(unsupported(heap, op, a, b)),
            }
        }
        _ => return Err(unsupported(heap, op, a, b)),
    };
    Ok(heap.alloc(result))
}

/// `a += b`: lists extend in place, everything else rebinds.
pub fn inplace_add(
    heap: &mut Heap,
    a: TaggedValue,
    b: TaggedValue,
) -> Result<TaggedValue, RuntimeError> {
    if let Some(HeapObject::List(_)) = heap.object(a)? {
        let extra = iter::collect(heap, b)?;
        containers::extend_list(heap, a, extra)?;
        return Ok(a);
    }
    binary_op(heap, BinaryOp::Add, a, b)
}

/// Identity comparison (`is`).
pub fn identical(a: TaggedValue, b: TaggedValue) -> bool {
    match (a, b) {
        (TaggedValue::Float(x), TaggedValue::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

/// Truthiness of any value.
pub fn truthy(heap: &Heap, value: TaggedValue) -> Result<bool, RuntimeError> {
    if let Some(t) = value.primitive_truthiness() {
        return Ok(t);
    }
    Ok(match heap.object(value)? {
        Some(HeapObject::Str(s)) => !s.is_empty(),
        Some(HeapObject::BigInt(n)) => !n.is_zero(),
        Some(HeapObject::List(items)) | Some(HeapObject::Tuple(items)) => !items.is_empty(),
        Some(HeapObject::Dict(d)) => !d.is_empty(),
        Some(HeapObject::Set(s)) => !s.is_empty(),
        Some(HeapObject::Range(r)) => !r.is_empty(),
        _ => true,
    })
}

/// Structural equality (`==`).
pub fn values_equal(heap: &Heap, a: TaggedValue, b: TaggedValue) -> Result<bool, RuntimeError> {
    equal_at(heap, a, b, 0)
}

fn equal_at(heap: &Heap, a: TaggedValue, b: TaggedValue, depth: usize) -> Result<bool, RuntimeError> {
    if depth > MAX_COMPARE_DEPTH {
        return Err(RuntimeError::new(
            ErrorKind::StackOverflow,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    if !matches!(a, TaggedValue::Object(_)) && !matches!(b, TaggedValue::Object(_)) {
        return Ok(ops::eq(a, b)? == make_bool(true));
    }
    if a == b {
        return Ok(true);
    }
    if heap.is_bigint(a) || heap.is_bigint(b) {
        if let (Some(x), Some(y)) = (heap.as_bigint(a), heap.as_bigint(b)) {
            return Ok(x == y);
        }
        return Ok(match (as_f64(heap, a), as_f64(heap, b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        });
    }
    let seq_equal = |x: &[TaggedValue], y: &[TaggedValue]| -> Result<bool, RuntimeError> {
        if x.len() != y.len() {
            return Ok(false);
        }
        for (&l, &r) in x.iter().zip(y.iter()) {
            if !equal_at(heap, l, r, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    };
    match (heap.object(a)?, heap.object(b)?) {
        (Some(HeapObject::Str(x)), Some(HeapObject::Str(y))) => Ok(x == y),
        (Some(HeapObject::List(x)), Some(HeapObject::List(y)))
        | (Some(HeapObject::Tuple(x)), Some(HeapObject::Tuple(y))) => seq_equal(x, y),
        (Some(HeapObject::Dict(x)), Some(HeapObject::Dict(y))) => {
            if x.len() != y.len() {
                return Ok(false);
            }
            for &(k, v) in x.entries() {
                let key = crate::hash::hash_key(heap, k)?;
                match y.get(&key) {
                    Some(other) if equal_at(heap, v, other, depth + 1)? => {}
                    _ => return Ok(false),
                }
            }
            Ok(true)
        }
        (Some(HeapObject::Set(x)), Some(HeapObject::Set(y))) => {
            if x.len() != y.len() {
                return Ok(false);
            }
            for &item in x.items() {
                if !y.contains(&crate::hash::hash_key(heap, item)?) {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Some(HeapObject::Range(x)), Some(HeapObject::Range(y))) => Ok(x == y),
        _ => Ok(false),
    }
}

/// Ordering between two values; `None` when unordered (NaN).
pub fn ordering(
    heap: &Heap,
    a: TaggedValue,
    b: TaggedValue,
    symbol: &str,
) -> Result<Option<Ordering>, RuntimeError> {
    ordering_at(heap, a, b, symbol, 0)
}

fn ordering_at(
    heap: &Heap,
    a: TaggedValue,
    b: TaggedValue,
    symbol: &str,
    depth: usize,
) -> Result<Option<Ordering>, RuntimeError> {
    if depth > MAX_COMPARE_DEPTH {
        return Err(RuntimeError::new(
            ErrorKind::StackOverflow,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        return Ok(Some(x.cmp(&y)));
    }
    if let (Some(x), Some(y)) = (heap.as_bigint(a), heap.as_bigint(b)) {
        return Ok(Some(x.cmp(&y)));
    }
    if let (Some(x), Some(y)) = (as_f64(heap, a), as_f64(heap, b)) {
        return Ok(x.partial_cmp(&y));
    }
    let seq_order = |x: &[TaggedValue], y: &[TaggedValue]| -> Result<Option<Ordering>, RuntimeError> {
        for (&l, &r) in x.iter().zip(y.iter()) {
            if !equal_at(heap, l, r, depth + 1)? {
                return ordering_at(heap, l, r, symbol, depth + 1);
            }
        }
        Ok(Some(x.len().cmp(&y.len())))
    };
    match (heap.object(a)?, heap.object(b)?) {
        (Some(HeapObject::Str(x)), Some(HeapObject::Str(y))) => Ok(Some(x.cmp(y))),
        (Some(HeapObject::List(x)), Some(HeapObject::List(y)))
        | (Some(HeapObject::Tuple(x)), Some(HeapObject::Tuple(y))) => seq_order(x, y),
        _ => Err(RuntimeError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            type_name(heap, a)?,
            type_name(heap, b)?
        ))),
    }
}

/// `a <op> b` for comparison operators.
pub fn compare_op(
    heap: &mut Heap,
    op: CompareOp,
    a: TaggedValue,
    b: TaggedValue,
) -> Result<TaggedValue, RuntimeError> {
    let result = match op {
        CompareOp::Is => identical(a, b),
        CompareOp::IsNot => !identical(a, b),
        CompareOp::In => containers::contains(heap, b, a)?,
        CompareOp::NotIn => !containers::contains(heap, b, a)?,
        CompareOp::Eq => values_equal(heap, a, b)?,
        CompareOp::Ne => !values_equal(heap, a, b)?,
        CompareOp::Lt => ordering(heap, a, b, "<")?.is_some_and(Ordering::is_lt),
        CompareOp::Le => ordering(heap, a, b, "<=")?.is_some_and(Ordering::is_le),
        CompareOp::Gt => ordering(heap, a, b, ">")?.is_some_and(Ordering::is_gt),
        CompareOp::Ge => ordering(heap, a, b, ">=")?.is_some_and(Ordering::is_ge),
    };
    Ok(make_bool(result))
}

/// `<op> a` for unary operators.
pub fn unary_op(heap: &mut Heap, op: UnaryOp, a: TaggedValue) -> Result<TaggedValue, RuntimeError> {
    if op == UnaryOp::Not {
        return Ok(make_bool(!truthy(heap, a)?));
    }
    if a.is_fast_path() {
        let fast = match op {
            UnaryOp::Neg => ops::neg(a),
            UnaryOp::Pos => ops::pos(a),
            UnaryOp::Invert => ops::invert(a),
            UnaryOp::Not => ops::not_(a),
        };
        match fast {
            Ok(v) => return Ok(v),
            Err(ErrorKind::IntegerOverflow) => {}
            Err(_) => return Err(bad_operand(heap, op, a)),
        }
    }
    let n = heap.as_bigint(a).ok_or_else(|| bad_operand(heap, op, a))?;
    let result = match op {
        UnaryOp::Neg => -n,
        UnaryOp::Invert => !n,
        _ => n,
    };
    Ok(heap.int_from_big(result))
}

fn bad_operand(heap: &Heap, op: UnaryOp, a: TaggedValue) -> RuntimeError {
    let symbol = match op {
        UnaryOp::Neg => "-",
        UnaryOp::Pos => "+",
        UnaryOp::Invert => "~",
        UnaryOp::Not => "not",
    };
    RuntimeError::type_error(format!(
        "bad operand type for unary {}: '{}'",
        symbol,
        type_name(heap, a).unwrap_or_default()
    ))
}
