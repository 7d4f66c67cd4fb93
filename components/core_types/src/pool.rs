//! Process-wide pool of pre-built primitive values.
//!
//! Small integers, the two booleans and `None` are built once and shared.
//! Lookups are a range check plus an index.

use std::sync::OnceLock;

use crate::value::TaggedValue;

/// Smallest pooled integer
pub const POOL_MIN_INT: i64 = -5;
/// Largest pooled integer
pub const POOL_MAX_INT: i64 = 256;

static POOL: OnceLock<SmallValuePool> = OnceLock::new();

/// Immutable table of shared primitive values.
///
/// # Examples
///
/// ```
/// use core_types::SmallValuePool;
///
/// let pool = SmallValuePool::global();
/// let a = pool.int(5).unwrap();
/// let b = pool.int(5).unwrap();
/// assert!(std::ptr::eq(a, b));
/// assert!(pool.int(1000).is_none());
/// ```
#[derive(Debug)]
pub struct SmallValuePool {
    ints: Box<[TaggedValue]>,
    bools: [TaggedValue; 2],
    none: TaggedValue,
}

impl SmallValuePool {
    fn build() -> Self {
        let ints = (POOL_MIN_INT..=POOL_MAX_INT)
            .map(TaggedValue::Int)
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            ints,
            bools: [TaggedValue::Bool(false), TaggedValue::Bool(true)],
            none: TaggedValue::None,
        }
    }

    /// The shared pool, built on first use.
    #[inline]
    pub fn global() -> &'static SmallValuePool {
        POOL.get_or_init(Self::build)
    }

    /// Force construction of the pool. Called at VM start-up so the first
    /// arithmetic operation does not pay for it.
    pub fn init() -> &'static SmallValuePool {
        Self::global()
    }

    /// Pooled integer, if `value` lies in the pooled range.
    #[inline]
    pub fn int(&'static self, value: i64) -> Option<&'static TaggedValue> {
        if (POOL_MIN_INT..=POOL_MAX_INT).contains(&value) {
            self.ints.get((value - POOL_MIN_INT) as usize)
        } else {
            None
        }
    }

    /// Pooled boolean.
    #[inline]
    pub fn bool(&'static self, value: bool) -> &'static TaggedValue {
        &self.bools[value as usize]
    }

    /// Pooled `None`.
    #[inline]
    pub fn none(&'static self) -> &'static TaggedValue {
        &self.none
    }

    /// Number of pooled integers.
    pub fn int_count(&self) -> usize {
        self.ints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_bounds() {
        let pool = SmallValuePool::global();
        assert_eq!(pool.int(POOL_MIN_INT), Some(&TaggedValue::Int(-5)));
        assert_eq!(pool.int(POOL_MAX_INT), Some(&TaggedValue::Int(256)));
        assert!(pool.int(POOL_MIN_INT - 1).is_none());
        assert!(pool.int(POOL_MAX_INT + 1).is_none());
        assert_eq!(pool.int_count(), 262);
    }

    #[test]
    fn test_pool_identity() {
        let pool = SmallValuePool::init();
        assert!(std::ptr::eq(pool.bool(true), pool.bool(true)));
        assert!(std::ptr::eq(pool.none(), SmallValuePool::global().none()));
        let five = pool.int(5).map(|v| v as *const TaggedValue);
        let again = pool.int(5).map(|v| v as *const TaggedValue);
        assert_eq!(five, again);
    }
}
