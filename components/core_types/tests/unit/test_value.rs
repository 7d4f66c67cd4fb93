//! Unit tests for TaggedValue and the small-value pool

use core_types::{make_bool, make_float, make_int, none, ops, SmallValuePool, TaggedValue};

#[cfg(test)]
mod pool_tests {
    use super::*;

    #[test]
    fn test_make_int_twice_is_tag_and_value_equal() {
        let a = make_int(5);
        let b = make_int(5);
        assert_eq!(a, b);
        assert!(matches!((a, b), (TaggedValue::Int(5), TaggedValue::Int(5))));
    }

    #[test]
    fn test_pooled_entries_share_identity() {
        let pool = SmallValuePool::global();
        for v in [-5, 0, 5, 256] {
            let a = pool.int(v).unwrap() as *const TaggedValue;
            let b = pool.int(v).unwrap() as *const TaggedValue;
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_arithmetic_never_writes_through_pool() {
        let pool = SmallValuePool::global();
        let five = make_int(5);
        let _ = ops::add(five, make_int(1)).unwrap();
        let _ = ops::mul(five, make_int(7)).unwrap();
        let _ = ops::neg(five).unwrap();
        assert_eq!(pool.int(5), Some(&TaggedValue::Int(5)));
        assert_eq!(five, TaggedValue::Int(5));
    }

    #[test]
    fn test_singletons() {
        assert_eq!(make_bool(true), TaggedValue::Bool(true));
        assert_eq!(make_bool(false), TaggedValue::Bool(false));
        assert_eq!(none(), TaggedValue::None);
        assert_eq!(make_float(2.5), TaggedValue::Float(2.5));
    }

    #[test]
    fn test_out_of_range_ints_are_fresh() {
        assert!(SmallValuePool::global().int(257).is_none());
        assert_eq!(make_int(257), TaggedValue::Int(257));
        assert_eq!(make_int(-6), TaggedValue::Int(-6));
    }
}
