//! Response parser: turns the store's console output into ordered result sets
//! and per-class latency samples.
//!
//! The store's output is free-form, so attribution runs on a small state
//! machine keyed on the most recent command kind:
//!
//! ```text
//!   "row inserted" ──► Insert ─┐
//!   "rows in set"  ──► Select ─┼── "(<n> ms|us)" ──► sample attributed ──► Unknown
//!   "Deleted"      ──► Delete ─┘
//! ```
//!
//! A timing annotation seen while `Unknown` has no owner and is only counted.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use teto_core::stats::SampleSeries;

use crate::ground_truth::Key;
use crate::workload::{ClassCounts, OpClass};

lazy_static! {
    static ref DATA_ROW_RE: Regex = Regex::new(r"^\|\s*(\d+)\s*\|\s*(\S+)\s*\|$").unwrap();
    static ref TIMING_RE: Regex = Regex::new(r"\((\d+(?:\.\d+)?)\s*(ms|us)\)").unwrap();
}

const RESULT_SET_END: &str = "rows in set";
const INSERT_CONFIRMED: &str = "row inserted";
const DELETE_CONFIRMED: &str = "Deleted";

/// Most recently confirmed command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    #[default]
    Unknown,
    Insert,
    Select,
    Delete,
}

/// Rows the store returned for one select, in output order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    rows: Vec<(Key, String)>,
}

impl ResultSet {
    pub fn push(&mut self, key: Key, value: impl Into<String>) {
        self.rows.push((key, value.into()));
    }

    pub fn rows(&self) -> &[(Key, String)] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Key → value view. A key printed twice keeps its last value.
    pub fn to_map(&self) -> BTreeMap<Key, &str> {
        self.rows
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect()
    }
}

impl<V: Into<String>> FromIterator<(Key, V)> for ResultSet {
    fn from_iter<I: IntoIterator<Item = (Key, V)>>(iter: I) -> Self {
        ResultSet {
            rows: iter.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

/// How many samples of each class belong to point operations. The first
/// `selects` select samples are point selects, the rest range selects; same
/// for deletes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointQuota {
    pub selects: usize,
    pub deletes: usize,
}

impl From<ClassCounts> for PointQuota {
    fn from(counts: ClassCounts) -> Self {
        PointQuota {
            selects: counts.point_selects,
            deletes: counts.point_deletes,
        }
    }
}

/// Latency samples in milliseconds, one series per [`OpClass`].
#[derive(Debug, Clone, Default)]
pub struct LatencyLog {
    series: [SampleSeries; 5],
}

impl LatencyLog {
    pub fn push(&mut self, class: OpClass, ms: f64) {
        self.series[class.index()].push(ms);
    }

    pub fn series(&self, class: OpClass) -> &SampleSeries {
        &self.series[class.index()]
    }

    pub fn mean(&self, class: OpClass) -> f64 {
        self.series(class).mean()
    }

    pub fn total_samples(&self) -> usize {
        self.series.iter().map(SampleSeries::len).sum()
    }

    /// Takes `class` samples from `other`, leaving the rest untouched. Used
    /// to combine insert timings of the load phase with the query phase.
    pub fn absorb(&mut self, class: OpClass, other: &LatencyLog) {
        self.series[class.index()].extend(other.series(class).samples().iter().copied());
    }
}

/// Everything recovered from one phase's output.
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    pub result_sets: Vec<ResultSet>,
    pub latencies: LatencyLog,
    pub inserts_confirmed: usize,
    pub deletes_confirmed: usize,
    /// Timing annotations seen before any command marker.
    pub unattributed_samples: usize,
    /// Data rows after the last terminator (output cut off mid result set).
    pub trailing_rows: usize,
}

/// What a single output line carries. A line may hold a marker and a timing
/// annotation at once, e.g. `3 rows in set (0.120 ms)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineInfo {
    pub row: Option<(Key, String)>,
    pub marker: Option<CommandKind>,
    pub timing_ms: Option<f64>,
}

/// Classifies one line of store output without touching parser state.
pub fn classify_line(line: &str) -> LineInfo {
    let line = line.trim();
    let mut info = LineInfo::default();

    // The key cell must be numeric, so the `| id | val |` header never
    // matches and values are kept whatever letters they contain.
    if let Some(caps) = DATA_ROW_RE.captures(line) {
        if let Ok(key) = caps[1].parse::<Key>() {
            info.row = Some((key, caps[2].to_string()));
        }
    }

    info.marker = if info.row.is_some() {
        None
    } else if line.contains(INSERT_CONFIRMED) {
        Some(CommandKind::Insert)
    } else if line.contains(RESULT_SET_END) {
        Some(CommandKind::Select)
    } else if line.contains(DELETE_CONFIRMED) {
        Some(CommandKind::Delete)
    } else {
        None
    };

    if let Some(caps) = TIMING_RE.captures(line) {
        if let Ok(value) = caps[1].parse::<f64>() {
            info.timing_ms = Some(match &caps[2] {
                "us" => value / 1000.0,
                _ => value,
            });
        }
    }

    info
}

/// Incremental parser; feed it lines as they arrive, then [`finish`] it.
///
/// [`finish`]: ResponseParser::finish
#[derive(Debug, Clone, Default)]
pub struct ResponseParser {
    quota: PointQuota,
    state: CommandKind,
    current: ResultSet,
    parsed: ParsedResponse,
    select_samples: usize,
    delete_samples: usize,
}

impl ResponseParser {
    pub fn new(quota: PointQuota) -> Self {
        ResponseParser {
            quota,
            ..Self::default()
        }
    }

    pub fn state(&self) -> CommandKind {
        self.state
    }

    pub fn inserts_confirmed(&self) -> usize {
        self.parsed.inserts_confirmed
    }

    /// Consumes one line and returns the command marker it carried, if any.
    pub fn feed_line(&mut self, line: &str) -> Option<CommandKind> {
        let info = classify_line(line);

        if let Some((key, value)) = info.row {
            self.current.push(key, value);
        }

        if let Some(marker) = info.marker {
            self.state = marker;
            match marker {
                CommandKind::Select => {
                    let finished = std::mem::take(&mut self.current);
                    self.parsed.result_sets.push(finished);
                }
                CommandKind::Insert => self.parsed.inserts_confirmed += 1,
                CommandKind::Delete => self.parsed.deletes_confirmed += 1,
                CommandKind::Unknown => {}
            }
        }

        if let Some(ms) = info.timing_ms {
            self.attribute(ms);
        }

        info.marker
    }

    fn attribute(&mut self, ms: f64) {
        let class = match self.state {
            CommandKind::Unknown => {
                self.parsed.unattributed_samples += 1;
                log::debug!("timing sample {ms} ms seen before any command marker; not attributed");
                return;
            }
            CommandKind::Insert => OpClass::Insert,
            CommandKind::Select => {
                let ordinal = self.select_samples;
                self.select_samples += 1;
                if ordinal < self.quota.selects {
                    OpClass::PointSelect
                } else {
                    OpClass::RangeSelect
                }
            }
            CommandKind::Delete => {
                let ordinal = self.delete_samples;
                self.delete_samples += 1;
                if ordinal < self.quota.deletes {
                    OpClass::PointDelete
                } else {
                    OpClass::RangeDelete
                }
            }
        };
        self.parsed.latencies.push(class, ms);
        self.state = CommandKind::Unknown;
    }

    pub fn finish(mut self) -> ParsedResponse {
        self.parsed.trailing_rows = self.current.len();
        self.parsed
    }
}

/// Parses a complete captured output.
pub fn parse_output(output: &str, quota: PointQuota) -> ParsedResponse {
    let mut parser = ResponseParser::new(quota);
    for line in output.lines() {
        parser.feed_line(line);
    }
    parser.finish()
}
