//! Row-level residual filtering during Parquet reads

use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, RecordBatch, Scalar, StringArray,
    StructArray, TimestampNanosecondArray,
};
use arrow::buffer::NullBuffer;
use arrow::compute::kernels::cmp::{eq, gt, gt_eq, lt, lt_eq};
use arrow::compute::{and, cast, cast_with_options, prep_null_mask_filter, CastOptions};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::error::ArrowError;
use parquet::arrow::arrow_reader::ArrowPredicate;
use parquet::arrow::ProjectionMask;
use parquet::schema::types::SchemaDescriptor;

use crate::error::{FetchError, FetchResult};
use crate::predicate::{Clause, Comparison, Predicate};
use crate::value::{Value, ValueKind};

/// Arrow predicate evaluating a conjunction of clauses row by row.
///
/// Columns are named like their statistics: a top-level name, or a dotted
/// path into nested structs (`payload.id`). Only the leaves under the
/// referenced columns are decoded for evaluation. Rows where a compared
/// value or an enclosing struct is null never match.
pub struct ResidualPredicate {
    clauses: Vec<Clause>,
    projection: ProjectionMask,
}

impl ResidualPredicate {
    pub fn try_new(
        predicate: &Predicate,
        parquet_schema: &SchemaDescriptor,
        arrow_schema: &Schema,
    ) -> FetchResult<Self> {
        for clause in predicate.clauses() {
            let field = resolve_field(arrow_schema, &clause.column)
                .ok_or_else(|| FetchError::UnknownColumn(clause.column.clone()))?;

            for literal in clause.comparison.values() {
                if !literal_fits(literal.kind(), field.data_type()) {
                    return Err(FetchError::TypeMismatch {
                        column: clause.column.clone(),
                        data_type: field.data_type().to_string(),
                        actual: literal.kind(),
                    });
                }
            }
        }

        let columns = predicate.columns();
        let leaves: Vec<usize> = parquet_schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                let path = c.path().string();
                columns.iter().any(|column| {
                    path == *column
                        || path
                            .strip_prefix(*column)
                            .is_some_and(|rest| rest.starts_with('.'))
                })
            })
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            clauses: predicate.clauses().to_vec(),
            projection: ProjectionMask::leaves(parquet_schema, leaves),
        })
    }

    /// Columns read for evaluation
    pub fn columns(&self) -> BTreeSet<&str> {
        self.clauses.iter().map(|c| c.column.as_str()).collect()
    }
}

impl ArrowPredicate for ResidualPredicate {
    fn projection(&self) -> &ProjectionMask {
        &self.projection
    }

    fn evaluate(&mut self, batch: RecordBatch) -> Result<BooleanArray, ArrowError> {
        let mut mask: Option<BooleanArray> = None;

        for clause in &self.clauses {
            let (column, enclosing) = resolve_column(&batch, &clause.column).ok_or_else(|| {
                ArrowError::SchemaError(format!("Column {} not in projected batch", clause.column))
            })?;

            let mut clause_mask = compare(&column, &clause.comparison)?;
            if let Some(enclosing) = enclosing {
                let nulls = NullBuffer::union(clause_mask.nulls(), Some(&enclosing));
                clause_mask = BooleanArray::new(clause_mask.values().clone(), nulls);
            }
            mask = Some(match mask {
                Some(prev) => and(&prev, &clause_mask)?,
                None => clause_mask,
            });
        }

        let mask = mask.unwrap_or_else(|| BooleanArray::from(vec![true; batch.num_rows()]));
        Ok(nulls_as_false(mask))
    }
}

/// Null mask slots become `false`
fn nulls_as_false(mask: BooleanArray) -> BooleanArray {
    if mask.null_count() > 0 {
        prep_null_mask_filter(&mask)
    } else {
        mask
    }
}

/// Looks `column` up as a top-level field, then as a dotted path through structs
fn resolve_field<'a>(schema: &'a Schema, column: &str) -> Option<&'a Field> {
    if let Ok(field) = schema.field_with_name(column) {
        return Some(field);
    }

    let mut parts = column.split('.');
    let mut field = schema.field_with_name(parts.next()?).ok()?;
    for part in parts {
        let DataType::Struct(children) = field.data_type() else {
            return None;
        };
        field = children.iter().find(|f| f.name() == part)?.as_ref();
    }
    Some(field)
}

/// The array for `column` and the combined validity of the structs around it
fn resolve_column(batch: &RecordBatch, column: &str) -> Option<(ArrayRef, Option<NullBuffer>)> {
    if let Some(array) = batch.column_by_name(column) {
        return Some((Arc::clone(array), None));
    }

    let mut parts = column.split('.');
    let mut array = Arc::clone(batch.column_by_name(parts.next()?)?);
    let mut enclosing: Option<NullBuffer> = None;
    for part in parts {
        let parent = array.as_any().downcast_ref::<StructArray>()?;
        enclosing = NullBuffer::union(enclosing.as_ref(), parent.nulls());
        let child = Arc::clone(parent.column_by_name(part)?);
        array = child;
    }
    Some((array, enclosing))
}

fn literal_fits(kind: ValueKind, data_type: &DataType) -> bool {
    match kind {
        ValueKind::Int | ValueKind::Float => data_type.is_numeric(),
        ValueKind::Str => matches!(
            data_type,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Dictionary(_, _)
        ),
        ValueKind::Timestamp => matches!(
            data_type,
            DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64
        ),
        ValueKind::Bool => matches!(data_type, DataType::Boolean),
    }
}

fn compare(column: &ArrayRef, comparison: &Comparison) -> Result<BooleanArray, ArrowError> {
    match comparison {
        Comparison::Eq(v) => {
            let (col, lit) = align(column, v)?;
            eq(&col, &lit)
        }
        Comparison::Lt(v) => {
            let (col, lit) = align(column, v)?;
            lt(&col, &lit)
        }
        Comparison::Lte(v) => {
            let (col, lit) = align(column, v)?;
            lt_eq(&col, &lit)
        }
        Comparison::Gt(v) => {
            let (col, lit) = align(column, v)?;
            gt(&col, &lit)
        }
        Comparison::Gte(v) => {
            let (col, lit) = align(column, v)?;
            gt_eq(&col, &lit)
        }
        Comparison::Range(lo, hi) => {
            let (col, lo) = align(column, lo)?;
            let lower = gt_eq(&col, &lo)?;
            let (col, hi) = align(column, hi)?;
            let upper = lt_eq(&col, &hi)?;
            and(&lower, &upper)
        }
    }
}

/// Brings the column and literal to a common data type.
///
/// Temporal columns are widened to nanoseconds, the unit of timestamp
/// literals. Otherwise the literal is cast to the column type when that is
/// lossless, and numeric operands are both widened to Float64 when it is not.
fn align(column: &ArrayRef, value: &Value) -> Result<(ArrayRef, Scalar<ArrayRef>), ArrowError> {
    let target = match column.data_type() {
        DataType::Dictionary(_, values) => values.as_ref().clone(),
        other => other.clone(),
    };
    let column = if &target != column.data_type() {
        cast(column, &target)?
    } else {
        Arc::clone(column)
    };

    if let Value::Timestamp(ns) = value {
        let tz = match &target {
            DataType::Timestamp(_, tz) => tz.clone(),
            _ => None,
        };
        let column = cast(&column, &DataType::Timestamp(TimeUnit::Nanosecond, tz.clone()))?;
        let literal: ArrayRef =
            Arc::new(TimestampNanosecondArray::from(vec![*ns]).with_timezone_opt(tz));
        return Ok((column, Scalar::new(literal)));
    }

    let literal = literal_array(value);
    let fractional = matches!(value, Value::Float(f) if f.fract() != 0.0);

    if !(fractional && target.is_integer()) {
        let strict = CastOptions {
            safe: false,
            ..Default::default()
        };
        match cast_with_options(&literal, &target, &strict) {
            Ok(lit) => return Ok((column, Scalar::new(lit))),
            Err(e) if !target.is_numeric() => return Err(e),
            Err(_) => {}
        }
    }

    let column = cast(&column, &DataType::Float64)?;
    let literal = cast(&literal, &DataType::Float64)?;
    Ok((column, Scalar::new(literal)))
}

fn literal_array(value: &Value) -> ArrayRef {
    match value {
        Value::Int(v) => Arc::new(Int64Array::from(vec![*v])),
        Value::Float(v) => Arc::new(Float64Array::from(vec![*v])),
        Value::Str(s) => Arc::new(StringArray::from(vec![s.as_str()])),
        Value::Timestamp(ns) => Arc::new(TimestampNanosecondArray::from(vec![*ns])),
        Value::Bool(b) => Arc::new(BooleanArray::from(vec![*b])),
    }
}
