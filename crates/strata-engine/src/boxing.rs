//! Canonical boxed-primitive cache
//!
//! Small-range boxed primitives share one canonical instance per value so
//! identity-sensitive code cannot distinguish interpreted from compiled
//! execution. Booleans, bytes, shorts, and chars are canonical across their
//! full range; ints and longs only within [-128, 127]. Outside the range
//! every boxing mints a fresh instance, and identity must not be assumed.
//!
//! Both compiled allocation of boxed values and deopt-time frame
//! materialization go through this cache.

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::value::{BoxedRef, PrimitiveKind, Value};

/// Inclusive lower bound of the int/long canonical range
pub const SMALL_CACHE_MIN: i64 = -128;
/// Inclusive upper bound of the int/long canonical range
pub const SMALL_CACHE_MAX: i64 = 127;

/// Canonical-instance cache for boxed primitives
///
/// Engine-scoped: callers receive it by reference through the engine's
/// runtime services rather than ambient global state.
pub struct BoxingCache {
    booleans: OnceCell<[BoxedRef; 2]>,
    bytes: OnceCell<Vec<BoxedRef>>,
    ints: OnceCell<Vec<BoxedRef>>,
    longs: OnceCell<Vec<BoxedRef>>,
    /// Full-range kinds are populated lazily per value
    wide: DashMap<(PrimitiveKind, i64), BoxedRef>,
}

impl BoxingCache {
    /// Create an empty cache; canonical tables populate on first use
    pub fn new() -> Self {
        BoxingCache {
            booleans: OnceCell::new(),
            bytes: OnceCell::new(),
            ints: OnceCell::new(),
            longs: OnceCell::new(),
            wide: DashMap::new(),
        }
    }

    /// Whether `(kind, bits)` falls in the kind's canonical range
    pub fn in_canonical_range(kind: PrimitiveKind, bits: i64) -> bool {
        match kind {
            PrimitiveKind::Boolean => (0..=1).contains(&bits),
            PrimitiveKind::Byte => (i8::MIN as i64..=i8::MAX as i64).contains(&bits),
            PrimitiveKind::Short => (i16::MIN as i64..=i16::MAX as i64).contains(&bits),
            PrimitiveKind::Char => (0..=u16::MAX as i64).contains(&bits),
            PrimitiveKind::Int | PrimitiveKind::Long => {
                (SMALL_CACHE_MIN..=SMALL_CACHE_MAX).contains(&bits)
            }
        }
    }

    /// Return the canonical instance for an in-range value, a fresh
    /// instance otherwise
    pub fn canonical_box(&self, kind: PrimitiveKind, bits: i64) -> BoxedRef {
        if !Self::in_canonical_range(kind, bits) {
            return BoxedRef::new(kind, bits);
        }
        match kind {
            PrimitiveKind::Boolean => {
                let table = self.booleans.get_or_init(|| {
                    [
                        BoxedRef::new(PrimitiveKind::Boolean, 0),
                        BoxedRef::new(PrimitiveKind::Boolean, 1),
                    ]
                });
                table[bits as usize].clone()
            }
            PrimitiveKind::Byte => Self::small_entry(&self.bytes, kind, bits),
            PrimitiveKind::Int => Self::small_entry(&self.ints, kind, bits),
            PrimitiveKind::Long => Self::small_entry(&self.longs, kind, bits),
            PrimitiveKind::Short | PrimitiveKind::Char => self
                .wide
                .entry((kind, bits))
                .or_insert_with(|| BoxedRef::new(kind, bits))
                .clone(),
        }
    }

    /// Box a scalar value through the cache; `None` for references
    pub fn box_value(&self, value: &Value) -> Option<BoxedRef> {
        let (kind, bits) = value.scalar_bits()?;
        Some(self.canonical_box(kind, bits))
    }

    fn small_entry(cell: &OnceCell<Vec<BoxedRef>>, kind: PrimitiveKind, bits: i64) -> BoxedRef {
        let table = cell.get_or_init(|| {
            (SMALL_CACHE_MIN..=SMALL_CACHE_MAX)
                .map(|v| BoxedRef::new(kind, v))
                .collect()
        });
        table[(bits - SMALL_CACHE_MIN) as usize].clone()
    }
}

impl Default for BoxingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_canonical_in_range() {
        let cache = BoxingCache::new();
        let a = cache.canonical_box(PrimitiveKind::Int, 42);
        let b = cache.canonical_box(PrimitiveKind::Int, 42);
        let c = cache.canonical_box(PrimitiveKind::Int, -42);
        let d = cache.canonical_box(PrimitiveKind::Int, -42);

        assert!(a.same_identity(&b));
        assert!(c.same_identity(&d));
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn test_int_fresh_out_of_range() {
        let cache = BoxingCache::new();
        let a = cache.canonical_box(PrimitiveKind::Int, 128);
        let b = cache.canonical_box(PrimitiveKind::Int, 128);
        assert!(!a.same_identity(&b));
    }

    #[test]
    fn test_long_range_boundaries() {
        let cache = BoxingCache::new();
        let lo1 = cache.canonical_box(PrimitiveKind::Long, -128);
        let lo2 = cache.canonical_box(PrimitiveKind::Long, -128);
        let hi1 = cache.canonical_box(PrimitiveKind::Long, 127);
        let hi2 = cache.canonical_box(PrimitiveKind::Long, 127);
        assert!(lo1.same_identity(&lo2));
        assert!(hi1.same_identity(&hi2));

        let big1 = cache.canonical_box(PrimitiveKind::Long, 2_i64 << 40);
        let big2 = cache.canonical_box(PrimitiveKind::Long, 2_i64 << 40);
        assert!(!big1.same_identity(&big2));
    }

    #[test]
    fn test_full_range_kinds_canonical() {
        let cache = BoxingCache::new();
        let s1 = cache.canonical_box(PrimitiveKind::Short, 30_000);
        let s2 = cache.canonical_box(PrimitiveKind::Short, 30_000);
        assert!(s1.same_identity(&s2));

        let c1 = cache.canonical_box(PrimitiveKind::Char, 0xFFFF);
        let c2 = cache.canonical_box(PrimitiveKind::Char, 0xFFFF);
        assert!(c1.same_identity(&c2));

        let t = cache.canonical_box(PrimitiveKind::Boolean, 1);
        let f = cache.canonical_box(PrimitiveKind::Boolean, 0);
        assert!(t.same_identity(&cache.canonical_box(PrimitiveKind::Boolean, 1)));
        assert!(!t.same_identity(&f));
    }

    #[test]
    fn test_box_value() {
        let cache = BoxingCache::new();
        let a = cache.box_value(&Value::Int(7)).unwrap();
        let b = cache.box_value(&Value::Int(7)).unwrap();
        assert!(a.same_identity(&b));
        assert!(cache.box_value(&Value::Null).is_none());
    }

    #[test]
    fn test_kinds_do_not_alias() {
        let cache = BoxingCache::new();
        let i = cache.canonical_box(PrimitiveKind::Int, 1);
        let l = cache.canonical_box(PrimitiveKind::Long, 1);
        assert!(!i.same_identity(&l));
        assert_eq!(i.kind(), PrimitiveKind::Int);
        assert_eq!(l.kind(), PrimitiveKind::Long);
    }
}
