//! Workload generation: typed point/range operations derived from the key
//! universe of a [`crate::ground_truth::GroundTruth`].

use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::error::{HarnessError, Result};
use crate::ground_truth::Key;

/// One command of the query script. For point variants `lo == hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    PointSelect(Key),
    RangeSelect { lo: Key, hi: Key },
    PointDelete(Key),
    RangeDelete { lo: Key, hi: Key },
}

impl Operation {
    /// Range select over `[lo, hi]`; swapped bounds are put back in order.
    pub fn range_select(lo: Key, hi: Key) -> Self {
        Operation::RangeSelect {
            lo: lo.min(hi),
            hi: lo.max(hi),
        }
    }

    /// Range delete over `[lo, hi]`; swapped bounds are put back in order.
    pub fn range_delete(lo: Key, hi: Key) -> Self {
        Operation::RangeDelete {
            lo: lo.min(hi),
            hi: lo.max(hi),
        }
    }

    /// Inclusive `(lo, hi)` as written into the script.
    pub fn bounds(&self) -> (Key, Key) {
        match *self {
            Operation::PointSelect(key) | Operation::PointDelete(key) => (key, key),
            Operation::RangeSelect { lo, hi } | Operation::RangeDelete { lo, hi } => (lo, hi),
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(
            self,
            Operation::PointSelect(_) | Operation::RangeSelect { .. }
        )
    }

    pub fn is_delete(&self) -> bool {
        !self.is_select()
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Operation::PointSelect(_) | Operation::PointDelete(_))
    }

    pub fn class(&self) -> OpClass {
        match self {
            Operation::PointSelect(_) => OpClass::PointSelect,
            Operation::RangeSelect { .. } => OpClass::RangeSelect,
            Operation::PointDelete(_) => OpClass::PointDelete,
            Operation::RangeDelete { .. } => OpClass::RangeDelete,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lo, hi) = self.bounds();
        let shape = if self.is_point() { "POINT" } else { "RANGE" };
        let verb = if self.is_select() { "SELECT" } else { "DELETE" };
        write!(f, "{shape} {verb} {lo}-{hi}")
    }
}

/// Operation classes latencies are bucketed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpClass {
    Insert,
    PointSelect,
    RangeSelect,
    PointDelete,
    RangeDelete,
}

impl OpClass {
    pub const ALL: [OpClass; 5] = [
        OpClass::Insert,
        OpClass::PointSelect,
        OpClass::RangeSelect,
        OpClass::PointDelete,
        OpClass::RangeDelete,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            OpClass::Insert => "Insert",
            OpClass::PointSelect => "Point SELECT",
            OpClass::RangeSelect => "Range SELECT",
            OpClass::PointDelete => "Point DELETE",
            OpClass::RangeDelete => "Range DELETE",
        }
    }
}

/// Per-class operation counts of a workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassCounts {
    pub point_selects: usize,
    pub range_selects: usize,
    pub point_deletes: usize,
    pub range_deletes: usize,
}

impl ClassCounts {
    pub fn selects(&self) -> usize {
        self.point_selects + self.range_selects
    }
}

/// Random mix of selects used by the accuracy tester. No deletes, so every
/// answer can be checked against the unmutated ground truth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectMix {
    pub count: usize,
    /// Probability that a generated select is a point select.
    pub point_ratio: f64,
    /// Range selects span `start..=start + rand(0..=max_span)`.
    pub max_span: Key,
}

impl Default for SelectMix {
    fn default() -> Self {
        SelectMix {
            count: crate::config::ACCURACY_DEFAULT_QUERIES,
            point_ratio: 1.0 / 3.0,
            max_span: 50,
        }
    }
}

impl SelectMix {
    pub fn with_count(count: usize) -> Self {
        SelectMix {
            count,
            ..Self::default()
        }
    }

    pub fn generate<R: Rng + ?Sized>(&self, keys: &[Key], rng: &mut R) -> Result<Workload> {
        if keys.is_empty() {
            return Err(HarnessError::EmptyKeyUniverse);
        }
        let point_ratio = self.point_ratio.clamp(0.0, 1.0);

        let ops = (0..self.count)
            .map(|_| {
                let start = pick(keys, rng);
                if rng.gen_bool(point_ratio) {
                    Operation::PointSelect(start)
                } else {
                    let span = rng.gen_range(0..=self.max_span);
                    Operation::range_select(start, start.saturating_add(span))
                }
            })
            .collect();

        Ok(Workload::new(ops, WorkloadPlan::Mix(*self)))
    }
}

/// Fixed operation counts used by the benchmark, with range sizes scaled to
/// the table so the index/no-index speedup stays comparable across sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BenchPlan {
    pub point_selects: usize,
    pub range_selects: usize,
    pub point_deletes: usize,
    pub range_deletes: usize,
    pub select_span: Key,
    pub delete_span: Key,
}

impl BenchPlan {
    pub const DEFAULT_POINT_SELECTS: usize = 1000;
    pub const DEFAULT_RANGE_SELECTS: usize = 100;
    pub const DEFAULT_POINT_DELETES: usize = 1000;
    pub const DEFAULT_RANGE_DELETES: usize = 100;

    /// Default counts with spans derived from `rows`.
    pub fn scaled(rows: usize) -> Self {
        let select_span = Self::select_span_for(rows);
        BenchPlan {
            point_selects: Self::DEFAULT_POINT_SELECTS,
            range_selects: Self::DEFAULT_RANGE_SELECTS,
            point_deletes: Self::DEFAULT_POINT_DELETES,
            range_deletes: Self::DEFAULT_RANGE_DELETES,
            select_span,
            delete_span: select_span / 2,
        }
    }

    /// `max(10, floor(rows * 0.01))`.
    pub fn select_span_for(rows: usize) -> Key {
        ((rows / 100) as Key).max(10)
    }

    pub fn counts(&self) -> ClassCounts {
        ClassCounts {
            point_selects: self.point_selects,
            range_selects: self.range_selects,
            point_deletes: self.point_deletes,
            range_deletes: self.range_deletes,
        }
    }

    /// Emits four contiguous blocks: point selects, range selects, point
    /// deletes, range deletes.
    ///
    /// Latency attribution depends on this order: within a class the first
    /// `point_*` timing samples are the point operations. All selects also
    /// precede every delete, so their answers are still checkable.
    pub fn generate<R: Rng + ?Sized>(&self, keys: &[Key], rng: &mut R) -> Result<Workload> {
        if keys.is_empty() {
            return Err(HarnessError::EmptyKeyUniverse);
        }
        let mut ops = Vec::with_capacity(
            self.point_selects + self.range_selects + self.point_deletes + self.range_deletes,
        );

        for _ in 0..self.point_selects {
            ops.push(Operation::PointSelect(pick(keys, rng)));
        }
        for _ in 0..self.range_selects {
            let start = pick(keys, rng);
            ops.push(Operation::range_select(
                start,
                start.saturating_add(self.select_span),
            ));
        }
        for _ in 0..self.point_deletes {
            ops.push(Operation::PointDelete(pick(keys, rng)));
        }
        for _ in 0..self.range_deletes {
            let start = pick(keys, rng);
            ops.push(Operation::range_delete(
                start,
                start.saturating_add(self.delete_span),
            ));
        }

        Ok(Workload::new(ops, WorkloadPlan::Bench(*self)))
    }
}

/// What produced a workload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkloadPlan {
    Mix(SelectMix),
    Bench(BenchPlan),
    /// Hand-built operation list.
    Explicit,
}

/// Ordered operations plus the plan behind them. Order is significant: parsed
/// result sets are matched to selects by position.
#[derive(Debug, Clone, PartialEq)]
pub struct Workload {
    ops: Vec<Operation>,
    plan: WorkloadPlan,
    counts: ClassCounts,
}

impl Workload {
    fn new(ops: Vec<Operation>, plan: WorkloadPlan) -> Self {
        let mut counts = ClassCounts::default();
        for op in &ops {
            match op.class() {
                OpClass::PointSelect => counts.point_selects += 1,
                OpClass::RangeSelect => counts.range_selects += 1,
                OpClass::PointDelete => counts.point_deletes += 1,
                OpClass::RangeDelete => counts.range_deletes += 1,
                OpClass::Insert => {}
            }
        }
        Workload { ops, plan, counts }
    }

    pub fn from_ops(ops: Vec<Operation>) -> Self {
        Self::new(ops, WorkloadPlan::Explicit)
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn plan(&self) -> &WorkloadPlan {
        &self.plan
    }

    pub fn counts(&self) -> ClassCounts {
        self.counts
    }

    pub fn select_count(&self) -> usize {
        self.counts.selects()
    }

    /// True when, for selects and for deletes separately, no point operation
    /// comes after a range operation. Ordinal latency attribution is only
    /// meaningful when this holds.
    pub fn points_precede_ranges(&self) -> bool {
        let mut seen_range_select = false;
        let mut seen_range_delete = false;
        for op in &self.ops {
            match op {
                Operation::RangeSelect { .. } => seen_range_select = true,
                Operation::RangeDelete { .. } => seen_range_delete = true,
                Operation::PointSelect(_) if seen_range_select => return false,
                Operation::PointDelete(_) if seen_range_delete => return false,
                _ => {}
            }
        }
        true
    }
}

fn pick<R: Rng + ?Sized>(keys: &[Key], rng: &mut R) -> Key {
    // Callers reject an empty key list before generating.
    *keys.choose(rng).unwrap_or(&1)
}
