//! Verifier: checks parsed result sets against ground-truth projections.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{HarnessError, Result};
use crate::ground_truth::{GroundTruth, Key};
use crate::parser::ResultSet;
use crate::workload::{Operation, Workload};

/// Why one select's answer is wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFailure {
    /// The store returned a different set of ids.
    KeySet {
        query: usize,
        op: Operation,
        missing: Vec<Key>,
        extra: Vec<Key>,
    },
    /// Same ids, but at least one value differs. Only the first differing id
    /// is recorded.
    Value {
        query: usize,
        op: Operation,
        key: Key,
        expected: String,
        actual: String,
    },
}

impl QueryFailure {
    /// 1-based position among the workload's selects.
    pub fn query(&self) -> usize {
        match self {
            QueryFailure::KeySet { query, .. } | QueryFailure::Value { query, .. } => *query,
        }
    }
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryFailure::KeySet {
                query,
                op,
                missing,
                extra,
            } => write!(
                f,
                "Query #{query} ({op}) FAILED\n      Missing IDs: {missing:?}\n      Extra IDs:   {extra:?}"
            ),
            QueryFailure::Value {
                query,
                op,
                key,
                expected,
                actual,
            } => write!(
                f,
                "Query #{query} ({op}) Value Mismatch for ID {key}: expected {expected:?}, got {actual:?}"
            ),
        }
    }
}

/// Verdict for one batch of selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed { queries: usize },
    /// The number of result sets does not match the number of selects: the
    /// store crashed, lost the table, or the output desynchronised. No
    /// per-row comparison is attempted.
    CountMismatch { expected: usize, received: usize },
    /// Every failing query, in workload order.
    Failed {
        queries: usize,
        failures: Vec<QueryFailure>,
    },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed { .. })
    }

    pub fn failing_queries(&self) -> usize {
        match self {
            Verdict::Failed { failures, .. } => failures.len(),
            _ => 0,
        }
    }

    /// Logs the verdict, spelling out at most `limit` failing queries. The
    /// total number of failures is always logged.
    pub fn log(&self, limit: usize) {
        match self {
            Verdict::Passed { queries } => log::info!("All {queries} queries matched."),
            Verdict::CountMismatch { expected, received } => {
                log::error!("CRITICAL FAIL: Query Count Mismatch!");
                log::error!("   Expected: {expected} results");
                log::error!("   Received: {received} results");
                log::error!("   (the store most likely crashed or did not persist the table)");
            }
            Verdict::Failed { queries, failures } => {
                for failure in failures.iter().take(limit) {
                    log::error!("{failure}");
                }
                if failures.len() > limit {
                    log::error!("... {} more failing queries not shown", failures.len() - limit);
                }
                log::error!(
                    "FAILED: {} of {queries} queries had incorrect results.",
                    failures.len()
                );
            }
        }
    }
}

/// Compares result sets with the ground truth, pairing them positionally
/// with the workload's selects.
///
/// Expectations come from the unmutated ground truth, so a select that comes
/// after a delete cannot be checked and is rejected with
/// [`HarnessError::MutatingWorkload`]. Deletes after the last select are fine.
pub fn verify(truth: &GroundTruth, workload: &Workload, results: &[ResultSet]) -> Result<Verdict> {
    let selects = checked_selects(workload)?;

    if selects.len() != results.len() {
        return Ok(Verdict::CountMismatch {
            expected: selects.len(),
            received: results.len(),
        });
    }

    let mut failures = Vec::new();
    for (i, (op, actual)) in selects.iter().zip(results).enumerate() {
        if let Some(failure) = check_query(truth, i + 1, op, actual) {
            failures.push(failure);
        }
    }

    Ok(if failures.is_empty() {
        Verdict::Passed {
            queries: selects.len(),
        }
    } else {
        Verdict::Failed {
            queries: selects.len(),
            failures,
        }
    })
}

fn checked_selects(workload: &Workload) -> Result<Vec<Operation>> {
    let mut seen_delete = false;
    let mut selects = Vec::with_capacity(workload.select_count());
    for op in workload.ops() {
        if op.is_delete() {
            seen_delete = true;
        } else if seen_delete {
            return Err(HarnessError::MutatingWorkload {
                position: selects.len() + 1,
            });
        } else {
            selects.push(*op);
        }
    }
    Ok(selects)
}

fn check_query(
    truth: &GroundTruth,
    query: usize,
    op: &Operation,
    actual: &ResultSet,
) -> Option<QueryFailure> {
    let (lo, hi) = op.bounds();
    let expected = truth.project(lo, hi);
    let actual = actual.to_map();

    let expected_keys: BTreeSet<Key> = expected.keys().copied().collect();
    let actual_keys: BTreeSet<Key> = actual.keys().copied().collect();
    if expected_keys != actual_keys {
        return Some(QueryFailure::KeySet {
            query,
            op: *op,
            missing: expected_keys.difference(&actual_keys).copied().collect(),
            extra: actual_keys.difference(&expected_keys).copied().collect(),
        });
    }

    expected
        .iter()
        .find(|(key, value)| actual.get(*key) != Some(*value))
        .map(|(key, value)| QueryFailure::Value {
            query,
            op: *op,
            key: *key,
            expected: (*value).to_string(),
            actual: actual.get(key).copied().unwrap_or_default().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> GroundTruth {
        GroundTruth::from_records([(1, "aa"), (2, "bb"), (3, "cc")]).unwrap()
    }

    fn rs(rows: &[(Key, &str)]) -> ResultSet {
        rows.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn matching_range_passes() {
        let workload = Workload::from_ops(vec![Operation::range_select(1, 2)]);
        let verdict = verify(&abc(), &workload, &[rs(&[(2, "bb"), (1, "aa")])]).unwrap();
        assert_eq!(verdict, Verdict::Passed { queries: 1 });
    }

    #[test]
    fn absent_point_expects_empty_set() {
        let truth = GroundTruth::from_records((1..=1000).map(|k| (k, "v"))).unwrap();
        let workload = Workload::from_ops(vec![Operation::PointSelect(9999)]);
        assert!(verify(&truth, &workload, &[ResultSet::default()]).unwrap().passed());

        let verdict = verify(&truth, &workload, &[rs(&[(9999, "v")])]).unwrap();
        assert_eq!(verdict.failing_queries(), 1);
    }

    #[test]
    fn key_set_difference_lists_missing_and_extra() {
        let workload = Workload::from_ops(vec![Operation::range_select(1, 3)]);
        let verdict = verify(&abc(), &workload, &[rs(&[(1, "aa"), (4, "dd")])]).unwrap();
        match verdict {
            Verdict::Failed { failures, .. } => assert_eq!(
                failures,
                vec![QueryFailure::KeySet {
                    query: 1,
                    op: Operation::range_select(1, 3),
                    missing: vec![2, 3],
                    extra: vec![4],
                }]
            ),
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn value_mismatch_reports_first_differing_id() {
        let workload = Workload::from_ops(vec![
            Operation::PointSelect(1),
            Operation::range_select(1, 3),
        ]);
        let results = [
            rs(&[(1, "aa")]),
            rs(&[(1, "aa"), (2, "XX"), (3, "YY")]),
        ];
        let verdict = verify(&abc(), &workload, &results).unwrap();
        match &verdict {
            Verdict::Failed { queries, failures } => {
                assert_eq!(*queries, 2);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].query(), 2);
                assert!(matches!(&failures[0], QueryFailure::Value { key: 2, .. }));
            }
            other => panic!("unexpected verdict {other:?}"),
        }
    }

    #[test]
    fn count_mismatch_is_fatal_for_the_batch() {
        let workload = Workload::from_ops(vec![
            Operation::PointSelect(1),
            Operation::PointSelect(2),
        ]);
        let verdict = verify(&abc(), &workload, &[rs(&[(1, "aa")])]).unwrap();
        assert_eq!(
            verdict,
            Verdict::CountMismatch {
                expected: 2,
                received: 1
            }
        );
        assert!(!verdict.passed());
    }

    #[test]
    fn every_failure_is_counted_beyond_the_display_limit() {
        let workload = Workload::from_ops((1..=3).map(Operation::PointSelect).collect());
        let results = vec![ResultSet::default(); 3];
        let verdict = verify(&abc(), &workload, &results).unwrap();
        assert_eq!(verdict.failing_queries(), 3);
        verdict.log(1);
    }

    #[test]
    fn trailing_deletes_are_ignored_but_select_after_delete_is_rejected() {
        let ok = Workload::from_ops(vec![Operation::PointSelect(1), Operation::PointDelete(1)]);
        assert!(verify(&abc(), &ok, &[rs(&[(1, "aa")])]).unwrap().passed());

        let bad = Workload::from_ops(vec![Operation::PointDelete(1), Operation::PointSelect(1)]);
        assert!(matches!(
            verify(&abc(), &bad, &[ResultSet::default()]),
            Err(HarnessError::MutatingWorkload { position: 1 })
        ));
    }
}
