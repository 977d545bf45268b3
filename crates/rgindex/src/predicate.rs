//! Conjunctive predicates over column values and their text grammar.
//!
//! The grammar is a `;`-separated list of clauses:
//!
//! ```text
//! Year=2023;Month>=1;Month<=6
//! price=10.5..20
//! created=2023-01-01..2023-12-31T23:59:59Z
//! city='Paris'
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};

use crate::error::PredicateParseError;
use crate::value::Value;

/// A comparison against one column
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    /// Inclusive on both ends
    Range(Value, Value),
}

impl Comparison {
    /// Literal values the comparison refers to
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Comparison::Eq(v)
            | Comparison::Lt(v)
            | Comparison::Lte(v)
            | Comparison::Gt(v)
            | Comparison::Gte(v) => vec![v],
            Comparison::Range(lo, hi) => vec![lo, hi],
        }
    }

    /// Row-level semantics for a single non-null value.
    ///
    /// Incomparable values never match.
    pub fn matches(&self, value: &Value) -> bool {
        use std::cmp::Ordering::*;

        match self {
            Comparison::Eq(v) => value.compare(v) == Some(Equal),
            Comparison::Lt(v) => value.compare(v) == Some(Less),
            Comparison::Lte(v) => matches!(value.compare(v), Some(Less | Equal)),
            Comparison::Gt(v) => value.compare(v) == Some(Greater),
            Comparison::Gte(v) => matches!(value.compare(v), Some(Greater | Equal)),
            Comparison::Range(lo, hi) => {
                matches!(value.compare(lo), Some(Greater | Equal))
                    && matches!(value.compare(hi), Some(Less | Equal))
            }
        }
    }
}

/// One column comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub column: String,
    pub comparison: Comparison,
}

impl Clause {
    pub fn new(column: impl Into<String>, comparison: Comparison) -> Self {
        Self {
            column: column.into(),
            comparison,
        }
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, Comparison::Eq(value))
    }

    pub fn lt(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, Comparison::Lt(value))
    }

    pub fn lte(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, Comparison::Lte(value))
    }

    pub fn gt(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, Comparison::Gt(value))
    }

    pub fn gte(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, Comparison::Gte(value))
    }

    pub fn range(column: impl Into<String>, low: Value, high: Value) -> Self {
        Self::new(column, Comparison::Range(low, high))
    }
}

/// Conjunction (AND) of clauses. An empty predicate matches everything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_clauses(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }

    /// Adds a clause to the conjunction
    pub fn and(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Distinct column names referenced by the predicate
    pub fn columns(&self) -> BTreeSet<&str> {
        self.clauses.iter().map(|c| c.column.as_str()).collect()
    }
}

impl FromStr for Predicate {
    type Err = PredicateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(PredicateParseError::Empty);
        }

        let mut clauses = Vec::new();
        for (position, raw) in s.split(';').enumerate() {
            let raw = raw.trim();
            if raw.is_empty() {
                return Err(PredicateParseError::EmptyClause(position));
            }
            clauses.push(parse_clause(raw)?);
        }

        Ok(Self { clauses })
    }
}

fn parse_clause(raw: &str) -> Result<Clause, PredicateParseError> {
    let op_start = raw
        .find(['<', '>', '='])
        .ok_or_else(|| PredicateParseError::MissingOperator(raw.to_string()))?;

    let column = raw[..op_start].trim();
    if column.is_empty() {
        return Err(PredicateParseError::MissingColumn(raw.to_string()));
    }

    let rest = &raw[op_start..];
    let (op, literal) = if let Some(v) = rest.strip_prefix("<=") {
        ("<=", v)
    } else if let Some(v) = rest.strip_prefix(">=") {
        (">=", v)
    } else {
        rest.split_at(1)
    };

    let literal = literal.trim();
    if literal.is_empty() {
        return Err(PredicateParseError::MissingValue(raw.to_string()));
    }

    let comparison = match op {
        "=" => match split_range(literal) {
            Some((lo, hi)) => Comparison::Range(parse_literal(lo)?, parse_literal(hi)?),
            None => Comparison::Eq(parse_literal(literal)?),
        },
        "<" => Comparison::Lt(parse_literal(literal)?),
        "<=" => Comparison::Lte(parse_literal(literal)?),
        ">" => Comparison::Gt(parse_literal(literal)?),
        ">=" => Comparison::Gte(parse_literal(literal)?),
        _ => return Err(PredicateParseError::MissingOperator(raw.to_string())),
    };

    Ok(Clause::new(column, comparison))
}

/// Splits `lo..hi` unless the literal is quoted
fn split_range(literal: &str) -> Option<(&str, &str)> {
    if is_quoted(literal) {
        return None;
    }
    literal.split_once("..")
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')))
}

/// Parses a single literal: bool, int, float, date/RFC 3339 timestamp, or string
pub fn parse_literal(raw: &str) -> Result<Value, PredicateParseError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(PredicateParseError::InvalidLiteral {
            literal: raw.to_string(),
            reason: "empty literal".to_string(),
        });
    }

    if is_quoted(s) {
        return Ok(Value::Str(s[1..s.len() - 1].to_string()));
    }

    if s.eq_ignore_ascii_case("true") {
        return Ok(Value::Bool(true));
    }
    if s.eq_ignore_ascii_case("false") {
        return Ok(Value::Bool(false));
    }

    if let Ok(v) = s.parse::<i64>() {
        return Ok(Value::Int(v));
    }

    // Require a digit so words like "inf" or "nan" stay strings
    if s.bytes().any(|b| b.is_ascii_digit()) {
        if let Ok(v) = s.parse::<f64>() {
            return Ok(Value::Float(v));
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return ts
            .timestamp_nanos_opt()
            .map(Value::Timestamp)
            .ok_or_else(|| PredicateParseError::InvalidLiteral {
                literal: s.to_string(),
                reason: "timestamp outside the nanosecond range".to_string(),
            });
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .and_then(|dt| dt.and_utc().timestamp_nanos_opt())
            .map(Value::Timestamp)
            .ok_or_else(|| PredicateParseError::InvalidLiteral {
                literal: s.to_string(),
                reason: "date outside the nanosecond range".to_string(),
            });
    }

    Ok(Value::Str(s.to_string()))
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.comparison {
            Comparison::Eq(v) => write!(f, "{}={}", self.column, v),
            Comparison::Lt(v) => write!(f, "{}<{}", self.column, v),
            Comparison::Lte(v) => write!(f, "{}<={}", self.column, v),
            Comparison::Gt(v) => write!(f, "{}>{}", self.column, v),
            Comparison::Gte(v) => write!(f, "{}>={}", self.column, v),
            Comparison::Range(lo, hi) => write!(f, "{}={}..{}", self.column, lo, hi),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}
