//! Scalar values used for statistics bounds and predicate literals

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// A statistics bound or predicate literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    /// Nanoseconds since the Unix epoch, UTC
    Timestamp(i64),
    Bool(bool),
}

/// The kind of a [`Value`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Int,
    Float,
    Str,
    Timestamp,
    Bool,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Bool => "bool",
        };
        f.write_str(name)
    }
}

impl ValueKind {
    /// Whether values of the two kinds have a defined ordering between them
    pub fn is_comparable_with(self, other: ValueKind) -> bool {
        self == other
            || matches!(
                (self, other),
                (ValueKind::Int, ValueKind::Float) | (ValueKind::Float, ValueKind::Int)
            )
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::Bool(_) => ValueKind::Bool,
        }
    }

    /// Timestamp value from days since the Unix epoch, saturating at the i64 nanosecond range
    pub fn from_days(days: i64) -> Self {
        Value::Timestamp(days.saturating_mul(NANOS_PER_DAY))
    }

    /// Orders `self` relative to `other`.
    ///
    /// Returns `None` when the kinds are not comparable or a NaN is involved.
    /// Ints and floats compare exactly, without rounding the int.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).map(Ordering::reverse),
            (Value::Str(a), Value::Str(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn cmp_int_float(i: i64, f: f64) -> Option<Ordering> {
    // 2^63, the first float above i64::MAX
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if f.is_nan() {
        return None;
    }
    if f >= LIMIT {
        return Some(Ordering::Less);
    }
    if f < -LIMIT {
        return Some(Ordering::Greater);
    }

    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64.partial_cmp(&(f - whole)),
        ord => Some(ord),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            // Debug keeps a fraction or exponent so the literal reads back as a float
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Str(s) if s.contains('\'') => write!(f, "\"{}\"", s),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Timestamp(ns) => {
                let ts = DateTime::from_timestamp_nanos(*ns);
                f.write_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}
