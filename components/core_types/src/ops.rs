//! Fast-path arithmetic, bitwise and comparison operations.
//!
//! Each operation dispatches on the tags of its operands:
//!
//! - `Int`/`Bool` with `Int`/`Bool` computes on `i64` (booleans are 0 and 1)
//! - any mix with `Float` promotes the integer side to `f64`
//! - an `Object` operand returns `Err(ErrorKind::TypeMismatch)`
//! - an integer result outside `i64` returns `Err(ErrorKind::IntegerOverflow)`
//!
//! The last two are not user errors: callers retry the operation on the
//! generic path, which handles heap objects and arbitrary-precision
//! integers. Integer division by zero is `Err(ErrorKind::DivisionByZero)`;
//! float division by zero follows IEEE-754.

use crate::error::ErrorKind;
use crate::value::{make_bool, make_float, make_int, TaggedValue};

/// Result of a fast-path operation
pub type OpResult = Result<TaggedValue, ErrorKind>;

#[derive(Clone, Copy)]
enum Num {
    I(i64),
    F(f64),
}

impl Num {
    #[inline]
    fn of(v: TaggedValue) -> Option<Num> {
        match v {
            TaggedValue::Int(i) => Some(Num::I(i)),
            TaggedValue::Bool(b) => Some(Num::I(b as i64)),
            TaggedValue::Float(f) => Some(Num::F(f)),
            TaggedValue::None | TaggedValue::Object(_) => None,
        }
    }

    #[inline]
    fn f(self) -> f64 {
        match self {
            Num::I(i) => i as f64,
            Num::F(f) => f,
        }
    }
}

#[inline]
fn pair(a: TaggedValue, b: TaggedValue) -> Result<(Num, Num), ErrorKind> {
    match (Num::of(a), Num::of(b)) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(ErrorKind::TypeMismatch),
    }
}

#[inline]
fn int_pair(a: TaggedValue, b: TaggedValue) -> Result<(i64, i64), ErrorKind> {
    match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(ErrorKind::TypeMismatch),
    }
}

#[inline]
fn checked(result: Option<i64>) -> OpResult {
    result.map(make_int).ok_or(ErrorKind::IntegerOverflow)
}

/// `a + b`
#[inline]
pub fn add(a: TaggedValue, b: TaggedValue) -> OpResult {
    match pair(a, b)? {
        (Num::I(x), Num::I(y)) => checked(x.checked_add(y)),
        (x, y) => Ok(make_float(x.f() + y.f())),
    }
}

/// `a - b`
#[inline]
pub fn sub(a: TaggedValue, b: TaggedValue) -> OpResult {
    match pair(a, b)? {
        (Num::I(x), Num::I(y)) => checked(x.checked_sub(y)),
        (x, y) => Ok(make_float(x.f() - y.f())),
    }
}

/// `a * b`
#[inline]
pub fn mul(a: TaggedValue, b: TaggedValue) -> OpResult {
    match pair(a, b)? {
        (Num::I(x), Num::I(y)) => checked(x.checked_mul(y)),
        (x, y) => Ok(make_float(x.f() * y.f())),
    }
}

/// True division `a / b`; always produces a float.
pub fn div(a: TaggedValue, b: TaggedValue) -> OpResult {
    match pair(a, b)? {
        (Num::I(_), Num::I(0)) => Err(ErrorKind::DivisionByZero),
        (x, y) => Ok(make_float(x.f() / y.f())),
    }
}

/// Integer floor division of two `i64`s, `None` on overflow.
pub fn floor_div_i64(x: i64, y: i64) -> Option<i64> {
    let q = x.checked_div(y)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

/// Floor modulo of two `i64`s; the result takes the sign of `y`.
/// `None` when `y` is zero.
pub fn floor_mod_i64(x: i64, y: i64) -> Option<i64> {
    if y == -1 {
        return Some(0);
    }
    let r = x.checked_rem(y)?;
    if r != 0 && ((r < 0) != (y < 0)) {
        Some(r + y)
    } else {
        Some(r)
    }
}

fn floor_mod_f64(x: f64, y: f64) -> f64 {
    let r = x % y;
    if r != 0.0 {
        if (r < 0.0) != (y < 0.0) {
            r + y
        } else {
            r
        }
    } else {
        0.0f64.copysign(y)
    }
}

/// Float floor division consistent with [`floor_mod_f64`]: `x == q * y + r`
/// up to rounding, with `q` integral.
fn floor_div_f64(x: f64, y: f64) -> f64 {
    if y == 0.0 {
        return (x / y).floor();
    }
    let m = x % y;
    let mut div = (x - m) / y;
    if m != 0.0 && (y < 0.0) != (m < 0.0) {
        div -= 1.0;
    }
    if div == 0.0 {
        return 0.0f64.copysign(x / y);
    }
    let q = div.floor();
    if div - q > 0.5 {
        q + 1.0
    } else {
        q
    }
}

/// Floor division `a // b`
pub fn floordiv(a: TaggedValue, b: TaggedValue) -> OpResult {
    match pair(a, b)? {
        (Num::I(_), Num::I(0)) => Err(ErrorKind::DivisionByZero),
        (Num::I(x), Num::I(y)) => checked(floor_div_i64(x, y)),
        (x, y) => Ok(make_float(floor_div_f64(x.f(), y.f()))),
    }
}

/// Floor modulo `a % b`
pub fn r#mod(a: TaggedValue, b: TaggedValue) -> OpResult {
    match pair(a, b)? {
        (Num::I(_), Num::I(0)) => Err(ErrorKind::DivisionByZero),
        (Num::I(x), Num::I(y)) => floor_mod_i64(x, y)
            .map(make_int)
            .ok_or(ErrorKind::DivisionByZero),
        (x, y) => Ok(make_float(floor_mod_f64(x.f(), y.f()))),
    }
}

/// Exponentiation `a ** b`
///
/// A negative integer exponent produces a float.
pub fn pow(a: TaggedValue, b: TaggedValue) -> OpResult {
    match pair(a, b)? {
        (Num::I(x), Num::I(y)) if y >= 0 => match u32::try_from(y) {
            Ok(e) => checked(x.checked_pow(e)),
            Err(_) => match x {
                0 | 1 => Ok(make_int(x)),
                -1 => Ok(make_int(if y % 2 == 0 { 1 } else { -1 })),
                _ => Err(ErrorKind::IntegerOverflow),
            },
        },
        (Num::I(0), Num::I(_)) => Err(ErrorKind::DivisionByZero),
        (x, y) => Ok(make_float(x.f().powf(y.f()))),
    }
}

/// Bitwise and; `bool & bool` stays boolean.
pub fn and_(a: TaggedValue, b: TaggedValue) -> OpResult {
    if let (TaggedValue::Bool(x), TaggedValue::Bool(y)) = (a, b) {
        return Ok(make_bool(x & y));
    }
    let (x, y) = int_pair(a, b)?;
    Ok(make_int(x & y))
}

/// Bitwise or; `bool | bool` stays boolean.
pub fn or_(a: TaggedValue, b: TaggedValue) -> OpResult {
    if let (TaggedValue::Bool(x), TaggedValue::Bool(y)) = (a, b) {
        return Ok(make_bool(x | y));
    }
    let (x, y) = int_pair(a, b)?;
    Ok(make_int(x | y))
}

/// Bitwise xor; `bool ^ bool` stays boolean.
pub fn xor(a: TaggedValue, b: TaggedValue) -> OpResult {
    if let (TaggedValue::Bool(x), TaggedValue::Bool(y)) = (a, b) {
        return Ok(make_bool(x ^ y));
    }
    let (x, y) = int_pair(a, b)?;
    Ok(make_int(x ^ y))
}

/// Left shift. Bits shifted out of `i64` are an overflow, not a wrap.
pub fn shl(a: TaggedValue, b: TaggedValue) -> OpResult {
    let (x, y) = int_pair(a, b)?;
    if y < 0 {
        return Err(ErrorKind::ValueError);
    }
    if x == 0 {
        return Ok(make_int(0));
    }
    if y >= 64 {
        return Err(ErrorKind::IntegerOverflow);
    }
    let r = x << y;
    if r >> y != x {
        return Err(ErrorKind::IntegerOverflow);
    }
    Ok(make_int(r))
}

/// Arithmetic right shift.
pub fn shr(a: TaggedValue, b: TaggedValue) -> OpResult {
    let (x, y) = int_pair(a, b)?;
    if y < 0 {
        return Err(ErrorKind::ValueError);
    }
    if y >= 64 {
        return Ok(make_int(if x < 0 { -1 } else { 0 }));
    }
    Ok(make_int(x >> y))
}

#[inline]
fn order(a: TaggedValue, b: TaggedValue) -> Result<Option<std::cmp::Ordering>, ErrorKind> {
    Ok(match pair(a, b)? {
        (Num::I(x), Num::I(y)) => Some(x.cmp(&y)),
        (x, y) => x.f().partial_cmp(&y.f()),
    })
}

/// `a < b`
#[inline]
pub fn lt(a: TaggedValue, b: TaggedValue) -> OpResult {
    Ok(make_bool(order(a, b)?.is_some_and(|o| o.is_lt())))
}

/// `a <= b`
#[inline]
pub fn le(a: TaggedValue, b: TaggedValue) -> OpResult {
    Ok(make_bool(order(a, b)?.is_some_and(|o| o.is_le())))
}

/// `a > b`
#[inline]
pub fn gt(a: TaggedValue, b: TaggedValue) -> OpResult {
    Ok(make_bool(order(a, b)?.is_some_and(|o| o.is_gt())))
}

/// `a >= b`
#[inline]
pub fn ge(a: TaggedValue, b: TaggedValue) -> OpResult {
    Ok(make_bool(order(a, b)?.is_some_and(|o| o.is_ge())))
}

fn primitive_eq(a: TaggedValue, b: TaggedValue) -> Result<bool, ErrorKind> {
    match (a, b) {
        (TaggedValue::Object(_), _) | (_, TaggedValue::Object(_)) => Err(ErrorKind::TypeMismatch),
        (TaggedValue::None, TaggedValue::None) => Ok(true),
        (TaggedValue::None, _) | (_, TaggedValue::None) => Ok(false),
        _ => Ok(order(a, b)? == Some(std::cmp::Ordering::Equal)),
    }
}

/// `a == b`
#[inline]
pub fn eq(a: TaggedValue, b: TaggedValue) -> OpResult {
    primitive_eq(a, b).map(make_bool)
}

/// `a != b`
#[inline]
pub fn ne(a: TaggedValue, b: TaggedValue) -> OpResult {
    primitive_eq(a, b).map(|e| make_bool(!e))
}

/// Unary minus
pub fn neg(a: TaggedValue) -> OpResult {
    match a {
        TaggedValue::Int(i) => checked(i.checked_neg()),
        TaggedValue::Bool(b) => Ok(make_int(-(b as i64))),
        TaggedValue::Float(f) => Ok(make_float(-f)),
        _ => Err(ErrorKind::TypeMismatch),
    }
}

/// Unary plus; booleans become integers.
pub fn pos(a: TaggedValue) -> OpResult {
    match a {
        TaggedValue::Int(_) | TaggedValue::Float(_) => Ok(a),
        TaggedValue::Bool(b) => Ok(make_int(b as i64)),
        _ => Err(ErrorKind::TypeMismatch),
    }
}

/// Logical not
pub fn not_(a: TaggedValue) -> OpResult {
    a.primitive_truthiness()
        .map(|t| make_bool(!t))
        .ok_or(ErrorKind::TypeMismatch)
}

/// Bitwise inversion `~a`
pub fn invert(a: TaggedValue) -> OpResult {
    a.as_int()
        .map(|i| make_int(!i))
        .ok_or(ErrorKind::TypeMismatch)
}
