//! Mapping from Parquet column types to [`Value`] bounds

use parquet::basic::{ConvertedType, LogicalType, TimeUnit, Type as PhysicalType};
use parquet::data_type::AsBytes;
use parquet::file::statistics::Statistics;
use parquet::schema::types::ColumnDescriptor;

use crate::value::Value;

/// How the statistics of a column are turned into values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Bool,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Date32,
    Timestamp(TimestampScale),
    Float,
    Double,
    Utf8,
    /// No ordered value mapping (INT96, plain binary, decimals, ...)
    Unorderable,
}

/// Multiplier from a stored timestamp unit to nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimestampScale {
    Millis,
    Micros,
    Nanos,
}

impl TimestampScale {
    fn to_nanos(self, v: i64) -> i64 {
        match self {
            TimestampScale::Millis => v.saturating_mul(1_000_000),
            TimestampScale::Micros => v.saturating_mul(1_000),
            TimestampScale::Nanos => v,
        }
    }

    fn from_unit(unit: &TimeUnit) -> Self {
        match unit {
            TimeUnit::MILLIS(_) => TimestampScale::Millis,
            TimeUnit::MICROS(_) => TimestampScale::Micros,
            TimeUnit::NANOS(_) => TimestampScale::Nanos,
        }
    }
}

impl ColumnKind {
    /// Classifies a leaf column from its physical, logical and converted types
    pub(crate) fn classify(descr: &ColumnDescriptor) -> Self {
        let logical = descr.logical_type();
        let converted = descr.converted_type();

        match descr.physical_type() {
            PhysicalType::BOOLEAN => ColumnKind::Bool,
            PhysicalType::INT32 => match logical {
                Some(LogicalType::Integer {
                    is_signed: false, ..
                }) => ColumnKind::UInt32,
                Some(LogicalType::Date) => ColumnKind::Date32,
                Some(LogicalType::Decimal { .. }) => ColumnKind::Unorderable,
                Some(_) => ColumnKind::Int32,
                None => match converted {
                    ConvertedType::UINT_8 | ConvertedType::UINT_16 | ConvertedType::UINT_32 => {
                        ColumnKind::UInt32
                    }
                    ConvertedType::DATE => ColumnKind::Date32,
                    ConvertedType::DECIMAL => ColumnKind::Unorderable,
                    _ => ColumnKind::Int32,
                },
            },
            PhysicalType::INT64 => match logical {
                Some(LogicalType::Integer {
                    is_signed: false, ..
                }) => ColumnKind::UInt64,
                Some(LogicalType::Timestamp { unit, .. }) => {
                    ColumnKind::Timestamp(TimestampScale::from_unit(&unit))
                }
                Some(LogicalType::Decimal { .. }) => ColumnKind::Unorderable,
                Some(_) => ColumnKind::Int64,
                None => match converted {
                    ConvertedType::UINT_64 => ColumnKind::UInt64,
                    ConvertedType::TIMESTAMP_MILLIS => {
                        ColumnKind::Timestamp(TimestampScale::Millis)
                    }
                    ConvertedType::TIMESTAMP_MICROS => {
                        ColumnKind::Timestamp(TimestampScale::Micros)
                    }
                    ConvertedType::DECIMAL => ColumnKind::Unorderable,
                    _ => ColumnKind::Int64,
                },
            },
            PhysicalType::FLOAT => ColumnKind::Float,
            PhysicalType::DOUBLE => ColumnKind::Double,
            PhysicalType::BYTE_ARRAY => match logical {
                Some(LogicalType::String | LogicalType::Enum | LogicalType::Json) => {
                    ColumnKind::Utf8
                }
                Some(_) => ColumnKind::Unorderable,
                None => match converted {
                    ConvertedType::UTF8 | ConvertedType::ENUM | ConvertedType::JSON => {
                        ColumnKind::Utf8
                    }
                    _ => ColumnKind::Unorderable,
                },
            },
            PhysicalType::INT96 | PhysicalType::FIXED_LEN_BYTE_ARRAY => ColumnKind::Unorderable,
        }
    }

    /// Converts chunk statistics into (min, max) bounds.
    ///
    /// A bound that cannot be represented exactly is dropped, never approximated.
    pub(crate) fn bounds(self, stats: &Statistics) -> (Option<Value>, Option<Value>) {
        match (self, stats) {
            (ColumnKind::Bool, Statistics::Boolean(s)) => (
                s.min_opt().map(|v| Value::Bool(*v)),
                s.max_opt().map(|v| Value::Bool(*v)),
            ),
            (ColumnKind::Int32, Statistics::Int32(s)) => (
                s.min_opt().map(|v| Value::Int(*v as i64)),
                s.max_opt().map(|v| Value::Int(*v as i64)),
            ),
            // Unsigned columns are ordered by their unsigned interpretation
            (ColumnKind::UInt32, Statistics::Int32(s)) => (
                s.min_opt().map(|v| Value::Int(*v as u32 as i64)),
                s.max_opt().map(|v| Value::Int(*v as u32 as i64)),
            ),
            (ColumnKind::Date32, Statistics::Int32(s)) => (
                s.min_opt().map(|v| Value::from_days(*v as i64)),
                s.max_opt().map(|v| Value::from_days(*v as i64)),
            ),
            (ColumnKind::Int64, Statistics::Int64(s)) => (
                s.min_opt().map(|v| Value::Int(*v)),
                s.max_opt().map(|v| Value::Int(*v)),
            ),
            (ColumnKind::UInt64, Statistics::Int64(s)) => (
                s.min_opt().and_then(|v| unsigned_to_int(*v)),
                s.max_opt().and_then(|v| unsigned_to_int(*v)),
            ),
            (ColumnKind::Timestamp(scale), Statistics::Int64(s)) => (
                s.min_opt().map(|v| Value::Timestamp(scale.to_nanos(*v))),
                s.max_opt().map(|v| Value::Timestamp(scale.to_nanos(*v))),
            ),
            (ColumnKind::Float, Statistics::Float(s)) => (
                s.min_opt().and_then(|v| finite(*v as f64)),
                s.max_opt().and_then(|v| finite(*v as f64)),
            ),
            (ColumnKind::Double, Statistics::Double(s)) => (
                s.min_opt().and_then(|v| finite(*v)),
                s.max_opt().and_then(|v| finite(*v)),
            ),
            (ColumnKind::Utf8, Statistics::ByteArray(s)) => (
                s.min_opt().and_then(|v| utf8(v.as_bytes())),
                s.max_opt().and_then(|v| utf8(v.as_bytes())),
            ),
            _ => (None, None),
        }
    }
}

fn unsigned_to_int(raw: i64) -> Option<Value> {
    i64::try_from(raw as u64).ok().map(Value::Int)
}

fn finite(v: f64) -> Option<Value> {
    v.is_finite().then_some(Value::Float(v))
}

fn utf8(bytes: &[u8]) -> Option<Value> {
    std::str::from_utf8(bytes)
        .ok()
        .map(|s| Value::Str(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parquet::file::statistics::ValueStatistics;

    #[test]
    fn test_unsigned_bounds() {
        let stats = Statistics::Int32(ValueStatistics::new(Some(1), Some(-1), None, Some(0), false));
        let (min, max) = ColumnKind::UInt32.bounds(&stats);
        assert_eq!(min, Some(Value::Int(1)));
        assert_eq!(max, Some(Value::Int(u32::MAX as i64)));

        let stats = Statistics::Int64(ValueStatistics::new(Some(5), Some(-1), None, Some(0), false));
        let (min, max) = ColumnKind::UInt64.bounds(&stats);
        assert_eq!(min, Some(Value::Int(5)));
        assert_eq!(max, None);
    }

    #[test]
    fn test_timestamp_and_date_bounds() {
        let stats = Statistics::Int64(ValueStatistics::new(Some(1), Some(2), None, None, false));
        let (min, max) = ColumnKind::Timestamp(TimestampScale::Millis).bounds(&stats);
        assert_eq!(min, Some(Value::Timestamp(1_000_000)));
        assert_eq!(max, Some(Value::Timestamp(2_000_000)));

        let stats = Statistics::Int32(ValueStatistics::new(Some(0), Some(1), None, None, false));
        let (_, max) = ColumnKind::Date32.bounds(&stats);
        assert_eq!(max, Some(Value::Timestamp(86_400_000_000_000)));
    }

    #[test]
    fn test_non_finite_float_bounds_dropped() {
        let stats = Statistics::Double(ValueStatistics::new(
            Some(f64::NEG_INFINITY),
            Some(3.5),
            None,
            None,
            false,
        ));
        let (min, max) = ColumnKind::Double.bounds(&stats);
        assert_eq!(min, None);
        assert_eq!(max, Some(Value::Float(3.5)));
    }

    #[test]
    fn test_mismatched_statistics_variant() {
        let stats = Statistics::Boolean(ValueStatistics::new(Some(false), Some(true), None, None, false));
        assert_eq!(ColumnKind::Int64.bounds(&stats), (None, None));
    }
}
