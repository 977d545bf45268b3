//! Predicate evaluation against row group statistics
//!
//! Pruning is sound but not complete: a row group is only skipped when its
//! statistics prove that no row can satisfy the predicate. Unknown or
//! incomparable statistics always keep the group.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::error::EvaluationError;
use crate::model::{FileIndex, PruneDecision, RowGroupStats};
use crate::predicate::{Clause, Comparison, Predicate};
use crate::value::Value;

/// Result of evaluating a predicate over every row group of one file
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub file_id: String,

    /// One decision per row group, indexed by row group id
    pub decisions: Vec<PruneDecision>,

    /// Clauses that could not be checked and were resolved as keep
    pub mismatches: Vec<EvaluationError>,
}

impl Evaluation {
    /// Ids of the row groups that must be scanned
    pub fn surviving_groups(&self) -> BTreeSet<u32> {
        self.decisions
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == PruneDecision::Keep)
            .map(|(i, _)| i as u32)
            .collect()
    }

    pub fn skipped(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| **d == PruneDecision::Skip)
            .count()
    }
}

/// Evaluates `predicate` against every row group in `index`
pub fn evaluate(index: &FileIndex, predicate: &Predicate) -> Evaluation {
    let mut decisions = Vec::with_capacity(index.groups.len());
    let mut mismatches = Vec::new();

    for group in &index.groups {
        let (decision, errors) = decide(group, predicate);
        decisions.push(decision);
        mismatches.extend(errors);
    }

    report_mismatches(&index.file_id, &mismatches);

    let evaluation = Evaluation {
        file_id: index.file_id.clone(),
        decisions,
        mismatches,
    };

    debug!(
        file_id = %index.file_id,
        row_groups = index.groups.len(),
        skipped = evaluation.skipped(),
        "Evaluated predicate"
    );

    evaluation
}

/// Decides a single row group. The group is skipped iff any clause proves exclusion.
pub fn decide(group: &RowGroupStats, predicate: &Predicate) -> (PruneDecision, Vec<EvaluationError>) {
    let mut decision = PruneDecision::Keep;
    let mut errors = Vec::new();

    for clause in predicate.clauses() {
        match clause_keeps(group, clause) {
            Ok(true) => {}
            Ok(false) => decision = PruneDecision::Skip,
            Err(e) => errors.push(e),
        }
    }

    (decision, errors)
}

fn clause_keeps(group: &RowGroupStats, clause: &Clause) -> Result<bool, EvaluationError> {
    let Some(stats) = group.column(&clause.column) else {
        return Ok(true);
    };
    if !stats.has_bounds() {
        return Ok(true);
    }

    let min = stats.min.as_ref();
    let max = stats.max.as_ref();

    for bound in [min, max].into_iter().flatten() {
        for literal in clause.comparison.values() {
            if !bound.kind().is_comparable_with(literal.kind()) {
                return Err(EvaluationError::TypeMismatch {
                    row_group_id: group.row_group_id,
                    column: clause.column.clone(),
                    expected: bound.kind(),
                    actual: literal.kind(),
                });
            }
        }
    }

    let keep = match &clause.comparison {
        Comparison::Eq(v) => holds(min, v, |o| o != Ordering::Greater) && holds(max, v, |o| o != Ordering::Less),
        Comparison::Lt(v) => holds(min, v, |o| o == Ordering::Less),
        Comparison::Lte(v) => holds(min, v, |o| o != Ordering::Greater),
        Comparison::Gt(v) => holds(max, v, |o| o == Ordering::Greater),
        Comparison::Gte(v) => holds(max, v, |o| o != Ordering::Less),
        Comparison::Range(lo, hi) => {
            // An empty range matches no row at all
            if lo.compare(hi) == Some(Ordering::Greater) {
                false
            } else {
                holds(max, lo, |o| o != Ordering::Less) && holds(min, hi, |o| o != Ordering::Greater)
            }
        }
    };

    Ok(keep)
}

/// Tests `bound <op> value`; an absent bound or an undefined ordering (NaN) holds
fn holds(bound: Option<&Value>, value: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match bound.and_then(|b| b.compare(value)) {
        Some(ordering) => accept(ordering),
        None => true,
    }
}

/// Logs one warning per mismatched column rather than one per row group
fn report_mismatches(file_id: &str, mismatches: &[EvaluationError]) {
    let mut by_column: BTreeMap<&str, (usize, &EvaluationError)> = BTreeMap::new();
    for mismatch in mismatches {
        let EvaluationError::TypeMismatch { column, .. } = mismatch;
        by_column
            .entry(column.as_str())
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, mismatch));
    }

    for (column, (count, first)) in by_column {
        warn!(
            file_id = file_id,
            column = column,
            row_groups = count,
            "Keeping row groups after type mismatch: {}",
            first
        );
    }
}
