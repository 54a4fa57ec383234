//! Human-readable and JSON renderings of finished runs.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::accuracy::AccuracyReport;
use crate::benchmark::BenchmarkComparison;
use crate::config::IndexMode;
use crate::error::{HarnessError, Result};
use crate::workload::{BenchPlan, OpClass};

const RULE_WIDTH: usize = 100;
const METRIC_WIDTH: usize = 30;

pub fn write_accuracy_summary<W: Write>(out: &mut W, report: &AccuracyReport) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "=".repeat(40))?;
    writeln!(out, "FINAL SUMMARY")?;
    writeln!(out, "{}", "=".repeat(40))?;
    for (mode, outcome) in &report.modes {
        let verdict = if outcome.passed() { "PASS" } else { "FAIL" };
        writeln!(out, "{:<12}{verdict}", format!("{}:", mode.label()))?;
    }
    writeln!(
        out,
        "({} rows, {} queries per mode, seed {})",
        report.rows, report.queries, report.seed
    )
}

/// The header printed before a benchmark starts.
pub fn write_benchmark_banner<W: Write>(out: &mut W, rows: usize, plan: &BenchPlan) -> io::Result<()> {
    let rule = "=".repeat(60);
    writeln!(out, "{rule}")?;
    writeln!(out, "BENCHMARK: {rows} ROWS")?;
    writeln!(out, " - Range Size: {} Rows (1% of Total)", plan.select_span)?;
    writeln!(out, " - {} Point Selects", plan.point_selects)?;
    writeln!(out, " - {} Range Selects", plan.range_selects)?;
    writeln!(out, " - {} Point Deletes", plan.point_deletes)?;
    writeln!(out, " - {} Range Deletes", plan.range_deletes)?;
    writeln!(out, "{rule}")
}

/// Side-by-side mean latencies with the speedup of every class.
pub fn write_comparison<W: Write>(out: &mut W, comparison: &BenchmarkComparison) -> io::Result<()> {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);

    writeln!(out)?;
    writeln!(out, "{heavy}")?;
    writeln!(out, "STATISTICAL RESULTS ({} Rows)", comparison.rows)?;
    writeln!(out, "{heavy}")?;
    writeln!(
        out,
        "{:<METRIC_WIDTH$} | {:<15} | {:<15} | Speedup",
        "Metric (Average Time)",
        IndexMode::NoIndex.label(),
        IndexMode::WithIndex.label()
    )?;
    writeln!(out, "{light}")?;

    for class in OpClass::ALL {
        let verdict = if class == OpClass::Insert {
            format!("Overhead: {:.4} ms", comparison.insert_overhead_ms())
        } else {
            comparison.speedup(class).to_string()
        };
        writeln!(
            out,
            "{:<METRIC_WIDTH$} | {:<15} | {:<15} | {verdict}",
            metric_label(class, &comparison.plan),
            format!("{:.4} ms", comparison.no_index.mean(class)),
            format!("{:.4} ms", comparison.with_index.mean(class)),
        )?;
    }
    writeln!(out, "{light}")?;

    for result in [&comparison.no_index, &comparison.with_index] {
        if result.unattributed_samples > 0 {
            writeln!(
                out,
                "{}: {} timing samples could not be attributed to an operation",
                result.mode.label(),
                result.unattributed_samples
            )?;
        }
        if let Some(verified) = result.verified {
            let verdict = if verified { "all selects matched" } else { "MISMATCHES" };
            writeln!(out, "{}: {verdict}", result.mode.label())?;
        }
    }
    Ok(())
}

fn metric_label(class: OpClass, plan: &BenchPlan) -> String {
    match class {
        OpClass::RangeSelect => format!("{} ({} rows)", class.label(), plan.select_span),
        OpClass::RangeDelete => format!("{} ({} rows)", class.label(), plan.delete_span),
        _ => class.label().to_string(),
    }
}

/// Writes the comparison as pretty-printed JSON.
pub fn write_json(path: &Path, comparison: &BenchmarkComparison) -> Result<()> {
    let file = File::create(path)
        .map_err(|e| HarnessError::io(format!("creating {}", path.display()), e))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, comparison)
        .map_err(|e| HarnessError::io(format!("writing {}", path.display()), e.into()))?;
    out.write_all(b"\n")
        .and_then(|()| out.flush())
        .map_err(|e| HarnessError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accuracy::ModeOutcome;
    use crate::benchmark::BenchmarkResult;
    use crate::parser::LatencyLog;

    fn comparison() -> BenchmarkComparison {
        let mut slow = LatencyLog::default();
        slow.push(OpClass::Insert, 0.01);
        slow.push(OpClass::PointSelect, 5.0);
        slow.push(OpClass::RangeSelect, 8.0);
        let mut fast = LatencyLog::default();
        fast.push(OpClass::Insert, 0.02);
        fast.push(OpClass::PointSelect, 0.05);
        fast.push(OpClass::RangeSelect, 0.0);
        let mut with_index = BenchmarkResult::from_latencies(IndexMode::WithIndex, &fast);
        with_index.unattributed_samples = 2;
        BenchmarkComparison {
            rows: 1000,
            seed: 9,
            plan: BenchPlan::scaled(1000),
            no_index: BenchmarkResult::from_latencies(IndexMode::NoIndex, &slow),
            with_index,
        }
    }

    #[test]
    fn comparison_table_has_one_row_per_class() {
        let mut out = Vec::new();
        write_comparison(&mut out, &comparison()).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("STATISTICAL RESULTS (1000 Rows)"));
        assert!(text.contains("Overhead: 0.0100 ms"));
        assert!(text.contains("100.0x"));
        assert!(text.contains("Range SELECT (10 rows)"));
        assert!(text.contains("unbounded"));
        assert!(text.contains("With Index: 2 timing samples"));
        let table_rows = text.lines().filter(|line| line.contains(" ms ")).count();
        assert_eq!(table_rows, 5);
    }

    #[test]
    fn summary_names_each_mode() {
        let report = AccuracyReport {
            rows: 1000,
            queries: 50,
            seed: 3,
            modes: vec![
                (IndexMode::NoIndex, ModeOutcome::Passed { queries: 50 }),
                (
                    IndexMode::WithIndex,
                    ModeOutcome::CountMismatch {
                        expected: 50,
                        received: 0,
                    },
                ),
            ],
        };
        let mut out = Vec::new();
        write_accuracy_summary(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("FINAL SUMMARY"));
        assert!(text.contains("No Index:   PASS"));
        assert!(text.contains("With Index: FAIL"));
    }

    #[test]
    fn banner_lists_the_plan() {
        let mut out = Vec::new();
        write_benchmark_banner(&mut out, 50_000, &BenchPlan::scaled(50_000)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("BENCHMARK: 50000 ROWS"));
        assert!(text.contains("Range Size: 500 Rows"));
        assert!(text.contains("1000 Point Selects"));
    }

    #[test]
    fn json_report_is_written() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bench.json");
        write_json(&path, &comparison()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["rows"], 1000);
        assert_eq!(value["with_index"]["unattributed_samples"], 2);
    }
}
