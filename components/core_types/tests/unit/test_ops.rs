//! Unit tests for the fast-path operation table

use core_types::{ops, ErrorKind, TaggedValue};

fn i(v: i64) -> TaggedValue {
    TaggedValue::Int(v)
}

#[test]
fn test_every_binary_op_on_small_ints() {
    let table: [(fn(TaggedValue, TaggedValue) -> ops::OpResult, i64); 11] = [
        (ops::add, 17),
        (ops::sub, 11),
        (ops::mul, 42),
        (ops::floordiv, 4),
        (ops::r#mod, 2),
        (ops::pow, 2744),
        (ops::and_, 2),
        (ops::or_, 15),
        (ops::xor, 13),
        (ops::shl, 112),
        (ops::shr, 1),
    ];
    for (op, expected) in table {
        assert_eq!(op(i(14), i(3)), Ok(i(expected)));
    }
}

#[test]
fn test_comparisons_return_bools() {
    assert_eq!(ops::lt(i(1), i(2)), Ok(TaggedValue::Bool(true)));
    assert_eq!(ops::le(i(2), i(2)), Ok(TaggedValue::Bool(true)));
    assert_eq!(ops::gt(i(1), i(2)), Ok(TaggedValue::Bool(false)));
    assert_eq!(ops::ge(TaggedValue::Float(2.5), i(2)), Ok(TaggedValue::Bool(true)));
    assert_eq!(ops::eq(i(3), i(3)), Ok(TaggedValue::Bool(true)));
    assert_eq!(ops::ne(i(3), i(3)), Ok(TaggedValue::Bool(false)));
}

#[test]
fn test_float_semantics_are_ieee() {
    assert_eq!(
        ops::add(TaggedValue::Float(0.1), TaggedValue::Float(0.2)),
        Ok(TaggedValue::Float(0.1 + 0.2))
    );
    assert_eq!(
        ops::div(TaggedValue::Float(-1.0), TaggedValue::Float(0.0)),
        Ok(TaggedValue::Float(f64::NEG_INFINITY))
    );
}

#[test]
fn test_integer_zero_division() {
    assert_eq!(ops::div(i(1), i(0)), Err(ErrorKind::DivisionByZero));
    assert_eq!(ops::floordiv(i(1), i(0)), Err(ErrorKind::DivisionByZero));
    assert_eq!(ops::r#mod(i(1), TaggedValue::Bool(false)), Err(ErrorKind::DivisionByZero));
}
