//! # Element Type Contract
//!
//! [`CellType`] is the closed per-type trait behind every array and variable
//! in the crate. It folds together the concerns that would otherwise need
//! runtime type dispatch: dynamic-value conversion, ordering for auto-sorted
//! axes, and the "next value" arithmetic used to synthesize unique keys for
//! freshly added rows.
//!
//! The set of implementations is deliberately fixed: the numeric primitives
//! (`i16`, `i32`, `i64`, `f32`, `f64`), `String`, `chrono::NaiveDateTime`
//! (stepped by a `chrono::Duration`) and `chrono::Duration` itself. Everything
//! is selected at construction time through the trait bound; no per-call
//! reflection exists anywhere downstream.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use num_traits::Bounded;

use crate::value::{ConversionError, Value, ValueKind};

/// Element type of an array or variable.
///
/// `Step` is the increment type used for auto-generated key sequences:
/// numeric types step by themselves, date-times step by a duration, and
/// text has no built-in stepping rule (a custom generator is required).
pub trait CellType: Clone + PartialEq + fmt::Debug + 'static {
    /// Increment type for [`CellType::next`].
    type Step: Clone + fmt::Debug + 'static;

    /// The dynamic kind this type maps to.
    const KIND: ValueKind;

    /// The value an unset storage slot reads as.
    fn empty_value() -> Self;

    /// Converts into a dynamic cell value.
    fn to_value(&self) -> Value;

    /// Converts from a dynamic cell value, applying best-effort conversion.
    fn from_value(value: Value) -> Result<Self, ConversionError>;

    /// Ordering between two values, or `None` when the pair has no order
    /// (NaN on the float types). Auto-sorted variables require this to
    /// produce an order for every stored pair.
    fn compare(&self, other: &Self) -> Option<Ordering>;

    /// The built-in default increment, if the type has one.
    fn default_step() -> Option<Self::Step>;

    /// The successor of `self` under `step`, if the type supports stepping.
    fn next(&self, step: &Self::Step) -> Option<Self>;

    /// Lowest representable value, where the type is bounded.
    fn default_min() -> Option<Self>;

    /// Highest representable value, where the type is bounded.
    fn default_max() -> Option<Self>;
}

macro_rules! numeric_cell_type {
    ($ty:ty, $kind:expr, $ctor:expr, $one:expr) => {
        impl CellType for $ty {
            type Step = $ty;

            const KIND: ValueKind = $kind;

            fn empty_value() -> Self {
                <$ty>::default()
            }

            fn to_value(&self) -> Value {
                $ctor(*self)
            }

            fn from_value(value: Value) -> Result<Self, ConversionError> {
                Ok(Self::unpack(value.convert_to($kind)?))
            }

            fn compare(&self, other: &Self) -> Option<Ordering> {
                self.partial_cmp(other)
            }

            fn default_step() -> Option<Self::Step> {
                Some($one)
            }

            fn next(&self, step: &Self::Step) -> Option<Self> {
                Some(*self + *step)
            }

            fn default_min() -> Option<Self> {
                Some(<$ty as Bounded>::min_value())
            }

            fn default_max() -> Option<Self> {
                Some(<$ty as Bounded>::max_value())
            }
        }
    };
}

/// Internal unpacking helper used by the numeric implementations.
trait Unpack: Sized {
    fn unpack(value: Value) -> Self;
}

macro_rules! unpack_impl {
    ($ty:ty, $variant:path) => {
        impl Unpack for $ty {
            fn unpack(value: Value) -> Self {
                match value {
                    $variant(v) => v,
                    other => unreachable!("expected {} value, got {:?}", stringify!($variant), other),
                }
            }
        }
    };
}

unpack_impl!(i16, Value::Short);
unpack_impl!(i32, Value::Int);
unpack_impl!(i64, Value::Long);
unpack_impl!(f32, Value::Float);
unpack_impl!(f64, Value::Double);

numeric_cell_type!(i16, ValueKind::Short, Value::Short, 1);
numeric_cell_type!(i32, ValueKind::Int, Value::Int, 1);
numeric_cell_type!(i64, ValueKind::Long, Value::Long, 1);
numeric_cell_type!(f32, ValueKind::Float, Value::Float, 1.0);
numeric_cell_type!(f64, ValueKind::Double, Value::Double, 1.0);

impl CellType for String {
    type Step = String;

    const KIND: ValueKind = ValueKind::Text;

    fn empty_value() -> Self {
        String::new()
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value.convert_to(ValueKind::Text)? {
            Value::Text(text) => Ok(text),
            other => unreachable!("convert_to returned {:?}", other),
        }
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    // Text has no arithmetic successor; callers must install a custom
    // next-value generator before enabling unique default generation.
    fn default_step() -> Option<Self::Step> {
        None
    }

    fn next(&self, _step: &Self::Step) -> Option<Self> {
        None
    }

    fn default_min() -> Option<Self> {
        None
    }

    fn default_max() -> Option<Self> {
        None
    }
}

impl CellType for NaiveDateTime {
    type Step = Duration;

    const KIND: ValueKind = ValueKind::DateTime;

    fn empty_value() -> Self {
        DateTime::<Utc>::UNIX_EPOCH.naive_utc()
    }

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value.convert_to(ValueKind::DateTime)? {
            Value::DateTime(dt) => Ok(dt),
            other => unreachable!("convert_to returned {:?}", other),
        }
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn default_step() -> Option<Self::Step> {
        Some(Duration::days(1))
    }

    fn next(&self, step: &Self::Step) -> Option<Self> {
        self.checked_add_signed(*step)
    }

    fn default_min() -> Option<Self> {
        Some(NaiveDateTime::MIN)
    }

    fn default_max() -> Option<Self> {
        Some(NaiveDateTime::MAX)
    }
}

impl CellType for Duration {
    type Step = Duration;

    const KIND: ValueKind = ValueKind::Duration;

    fn empty_value() -> Self {
        Duration::zero()
    }

    fn to_value(&self) -> Value {
        Value::Duration(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value.convert_to(ValueKind::Duration)? {
            Value::Duration(d) => Ok(d),
            other => unreachable!("convert_to returned {:?}", other),
        }
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn default_step() -> Option<Self::Step> {
        Some(Duration::seconds(1))
    }

    fn next(&self, step: &Self::Step) -> Option<Self> {
        self.checked_add(step)
    }

    fn default_min() -> Option<Self> {
        Some(Duration::MIN)
    }

    fn default_max() -> Option<Self> {
        Some(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod stepping_tests {
        use super::*;

        #[test]
        fn test_numeric_next() {
            assert_eq!(5_i32.next(&1), Some(6));
            assert_eq!(2.5_f64.next(&0.5), Some(3.0));
        }

        #[test]
        fn test_date_time_next() {
            let start = NaiveDateTime::empty_value();
            let step = Duration::hours(6);
            assert_eq!(start.next(&step), Some(start + step));
        }

        #[test]
        fn test_text_has_no_step() {
            assert!(<String as CellType>::default_step().is_none());
            assert!("a".to_string().next(&"b".to_string()).is_none());
        }
    }

    mod conversion_tests {
        use super::*;

        #[test]
        fn test_round_trip_through_value() {
            let v = 42_i32.to_value();
            assert_eq!(i32::from_value(v).unwrap(), 42);

            let v = "hello".to_string().to_value();
            assert_eq!(String::from_value(v).unwrap(), "hello");
        }

        #[test]
        fn test_cross_kind_conversion() {
            assert_eq!(f64::from_value(Value::Int(3)).unwrap(), 3.0);
            assert_eq!(i32::from_value(Value::Text("7".to_string())).unwrap(), 7);
        }
    }

    mod ordering_tests {
        use super::*;

        #[test]
        fn test_nan_has_no_order() {
            assert!(f64::NAN.compare(&1.0).is_none());
        }

        #[test]
        fn test_bounded_defaults() {
            assert_eq!(<i32 as CellType>::default_max(), Some(i32::MAX));
            assert!(<String as CellType>::default_max().is_none());
        }
    }
}
