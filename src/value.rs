//! # Dynamic Cell Values
//!
//! The tabular side of the binding layer is untyped: a grid hands the adapter
//! whatever the user typed, and the adapter has to reconcile that with the
//! element type of the variable behind the column. [`Value`] is that bridge.
//!
//! Conversions are deliberately forgiving: a `Value::Text("42")` written into
//! an integer column becomes `Value::Int(42)`, a `Value::Int(3)` written into
//! a double column becomes `Value::Double(3.0)`, and so on. Only when the
//! best-effort conversion genuinely cannot produce a value of the target kind
//! does the write fail, with a [`ConversionError`] naming both kinds.
//!
//! ```rust
//! use functab::value::{Value, ValueKind};
//!
//! let text = Value::Text("2.5".to_string());
//! let double = text.convert_to(ValueKind::Double).unwrap();
//! assert_eq!(double, Value::Double(2.5));
//!
//! let narrowed = Value::Double(3.0).convert_to(ValueKind::Int).unwrap();
//! assert_eq!(narrowed, Value::Int(3));
//! ```

use std::fmt;

use chrono::{Duration, NaiveDateTime};
use num_traits::cast;
use thiserror::Error;

/// The closed set of element kinds the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Short,
    Int,
    Long,
    Float,
    Double,
    Text,
    DateTime,
    Duration,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Short => "short",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Text => "text",
            ValueKind::DateTime => "date-time",
            ValueKind::Duration => "duration",
        };
        write!(f, "{}", name)
    }
}

/// A dynamically typed cell value.
///
/// `Empty` stands for "no value supplied"; writing it into a variable lets the
/// variable's default-value policy decide what actually lands in storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    DateTime(NaiveDateTime),
    Duration(Duration),
    Empty,
}

/// Failure to convert a [`Value`] to a requested [`ValueKind`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot convert {value} from {from} to {to}")]
pub struct ConversionError {
    /// Display form of the offending value.
    pub value: String,
    /// The kind the value arrived as.
    pub from: ValueKind,
    /// The kind the conversion was asked for.
    pub to: ValueKind,
}

/// Date formats accepted when parsing text into a date-time cell.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d"];

impl Value {
    /// Returns the kind of this value, or `None` for [`Value::Empty`].
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Short(_) => Some(ValueKind::Short),
            Value::Int(_) => Some(ValueKind::Int),
            Value::Long(_) => Some(ValueKind::Long),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Double(_) => Some(ValueKind::Double),
            Value::Text(_) => Some(ValueKind::Text),
            Value::DateTime(_) => Some(ValueKind::DateTime),
            Value::Duration(_) => Some(ValueKind::Duration),
            Value::Empty => None,
        }
    }

    /// Returns true for [`Value::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Best-effort conversion to the requested kind.
    ///
    /// Numeric kinds convert through lossless or checked casts, text parses
    /// and formats, date-times accept a small set of common formats, and
    /// durations exchange with the numeric kinds as whole seconds.
    ///
    /// # Errors
    /// [`ConversionError`] when the value cannot be represented in the target
    /// kind (including [`Value::Empty`], which has no representation at all).
    pub fn convert_to(&self, kind: ValueKind) -> Result<Value, ConversionError> {
        if self.kind() == Some(kind) {
            return Ok(self.clone());
        }
        let fail = |from: ValueKind| ConversionError {
            value: self.to_string(),
            from,
            to: kind,
        };
        let from = self.kind().ok_or(ConversionError {
            value: "<empty>".to_string(),
            from: ValueKind::Text,
            to: kind,
        })?;

        match kind {
            ValueKind::Short => self
                .as_i64()
                .and_then(cast::<i64, i16>)
                .or_else(|| self.as_f64().and_then(cast::<f64, i16>))
                .map(Value::Short)
                .ok_or_else(|| fail(from)),
            ValueKind::Int => self
                .as_i64()
                .and_then(cast::<i64, i32>)
                .or_else(|| self.as_f64().and_then(cast::<f64, i32>))
                .map(Value::Int)
                .ok_or_else(|| fail(from)),
            ValueKind::Long => self
                .as_i64()
                .or_else(|| self.as_f64().and_then(cast::<f64, i64>))
                .map(Value::Long)
                .ok_or_else(|| fail(from)),
            ValueKind::Float => self
                .as_f64()
                .and_then(cast::<f64, f32>)
                .map(Value::Float)
                .ok_or_else(|| fail(from)),
            ValueKind::Double => self.as_f64().map(Value::Double).ok_or_else(|| fail(from)),
            ValueKind::Text => Ok(Value::Text(self.to_string())),
            ValueKind::DateTime => match self {
                Value::Text(text) => DATE_FORMATS
                    .iter()
                    .find_map(|format| NaiveDateTime::parse_from_str(text.trim(), format).ok())
                    .map(Value::DateTime)
                    .ok_or_else(|| fail(from)),
                _ => Err(fail(from)),
            },
            ValueKind::Duration => match self {
                Value::Text(text) => text
                    .trim()
                    .trim_end_matches('s')
                    .parse::<i64>()
                    .ok()
                    .map(|seconds| Value::Duration(Duration::seconds(seconds)))
                    .ok_or_else(|| fail(from)),
                _ => self
                    .as_i64()
                    .or_else(|| self.as_f64().and_then(cast::<f64, i64>))
                    .map(|seconds| Value::Duration(Duration::seconds(seconds)))
                    .ok_or_else(|| fail(from)),
            },
        }
    }

    /// Exact integer reading of this value, where one exists.
    ///
    /// Text parses as a decimal integer; durations read as whole seconds.
    /// Floating point values are excluded here so that integers wider than
    /// the `f64` mantissa never round; they reach the integer kinds through
    /// [`Value::as_f64`] instead.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            Value::Text(text) => text.trim().parse::<i64>().ok(),
            Value::Duration(d) => Some(d.num_seconds()),
            Value::Float(_) | Value::Double(_) | Value::DateTime(_) | Value::Empty => None,
        }
    }

    /// Numeric reading of this value, where one exists.
    ///
    /// Text parses as a floating point number; durations read as whole
    /// seconds; date-times have no numeric reading.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Short(v) => Some(f64::from(*v)),
            Value::Int(v) => Some(f64::from(*v)),
            Value::Long(v) => cast::<i64, f64>(*v),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            Value::Text(text) => text.trim().parse::<f64>().ok(),
            Value::Duration(d) => cast::<i64, f64>(d.num_seconds()),
            Value::DateTime(_) | Value::Empty => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Short(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::Duration(v) => write!(f, "{}s", v.num_seconds()),
            Value::Empty => write!(f, ""),
        }
    }
}
