//! Index benchmark: the same workload against a table without and with the
//! key index, compared class by class.

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Serializer};

use crate::config::{HarnessConfig, IndexMode};
use crate::error::Result;
use crate::ground_truth::GroundTruth;
use crate::parser::LatencyLog;
use crate::runner::{settle, StoreRunner};
use crate::script::{write_load_script, write_query_script, write_script_file, TableSpec};
use crate::verify::verify;
use crate::workload::{BenchPlan, OpClass, Workload};
use crate::workspace::Workspace;

/// Latency summary of one operation class, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassSummary {
    pub class: OpClass,
    pub samples: usize,
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

/// Per-class latencies of one run. Computed once, compared, discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkResult {
    pub mode: IndexMode,
    pub classes: Vec<ClassSummary>,
    pub unattributed_samples: usize,
    /// Whether the run's selects matched the ground truth; `None` when not
    /// checked.
    pub verified: Option<bool>,
}

impl BenchmarkResult {
    pub fn from_latencies(mode: IndexMode, latencies: &LatencyLog) -> Self {
        let classes = OpClass::ALL
            .iter()
            .map(|&class| {
                let series = latencies.series(class);
                let stats = series.stats();
                ClassSummary {
                    class,
                    samples: stats.count,
                    mean_ms: stats.mean,
                    std_ms: stats.std,
                    min_ms: stats.min,
                    max_ms: stats.max,
                    p50_ms: series.percentile(50.0),
                    p95_ms: series.percentile(95.0),
                }
            })
            .collect();
        BenchmarkResult {
            mode,
            classes,
            unattributed_samples: 0,
            verified: None,
        }
    }

    pub fn summary(&self, class: OpClass) -> Option<&ClassSummary> {
        self.classes.iter().find(|summary| summary.class == class)
    }

    /// Mean latency of `class`, 0.0 when it has no samples.
    pub fn mean(&self, class: OpClass) -> f64 {
        self.summary(class).map_or(0.0, |summary| summary.mean_ms)
    }
}

/// `no_index / indexed` for one class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Speedup {
    Ratio(f64),
    /// The indexed mean is zero.
    Unbounded,
}

impl Speedup {
    pub fn between(no_index_ms: f64, indexed_ms: f64) -> Self {
        if indexed_ms == 0.0 {
            Speedup::Unbounded
        } else {
            Speedup::Ratio(no_index_ms / indexed_ms)
        }
    }
}

impl fmt::Display for Speedup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speedup::Ratio(ratio) => write!(f, "{ratio:.1}x"),
            Speedup::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl Serialize for Speedup {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Both runs of a benchmark over an identical workload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkComparison {
    pub rows: usize,
    pub seed: u64,
    pub plan: BenchPlan,
    pub no_index: BenchmarkResult,
    pub with_index: BenchmarkResult,
}

impl BenchmarkComparison {
    pub fn speedup(&self, class: OpClass) -> Speedup {
        Speedup::between(self.no_index.mean(class), self.with_index.mean(class))
    }

    /// Extra insert cost of maintaining the index, in milliseconds.
    pub fn insert_overhead_ms(&self) -> f64 {
        self.with_index.mean(OpClass::Insert) - self.no_index.mean(OpClass::Insert)
    }

    pub fn speedups(&self) -> Vec<(OpClass, Speedup)> {
        OpClass::ALL
            .iter()
            .filter(|class| **class != OpClass::Insert)
            .map(|&class| (class, self.speedup(class)))
            .collect()
    }
}

/// Benchmark inputs besides the shared configuration.
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkSpec {
    pub rows: usize,
    pub plan: BenchPlan,
    /// Also check every select's answer against the ground truth.
    pub verify: bool,
}

/// Generates one dataset and workload, then runs it without and with the
/// index. Any failing run aborts the comparison.
pub fn run_benchmark(config: &HarnessConfig, spec: &BenchmarkSpec) -> Result<BenchmarkComparison> {
    let store_exe = config.resolve_store_exe()?;
    let workspace = Workspace::prepare(&config.work_dir, &config.db_name)?;
    let runner = StoreRunner::new(store_exe, &workspace);

    log::info!("Pre-generating data for {} rows in memory...", spec.rows);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let truth = GroundTruth::generate(spec.rows, config.value_len, &mut rng)?;
    let workload = spec.plan.generate(truth.keys(), &mut rng)?;
    if !workload.points_precede_ranges() {
        log::warn!("workload interleaves point and range operations; point/range latencies will be misattributed");
    }

    settle(config.settle, "system stabilisation");

    let run = |mode: IndexMode| {
        run_suite(config, &workspace, &runner, mode, &truth, &workload, spec.verify)
            .inspect_err(|err| log::error!("{} run failed: {err}", mode.label()))
    };

    log::info!(">>> BENCHMARK 1: NO INDEX (linear scan)");
    let no_index = run(IndexMode::NoIndex)?;

    settle(config.settle, "intermission");

    log::info!(">>> BENCHMARK 2: WITH INDEX (B-tree)");
    let with_index = run(IndexMode::WithIndex)?;

    Ok(BenchmarkComparison {
        rows: spec.rows,
        seed: config.seed,
        plan: spec.plan,
        no_index,
        with_index,
    })
}

fn run_suite(
    config: &HarnessConfig,
    workspace: &Workspace,
    runner: &StoreRunner,
    mode: IndexMode,
    truth: &GroundTruth,
    workload: &Workload,
    check_answers: bool,
) -> Result<BenchmarkResult> {
    workspace.clean_db_files()?;

    let paths = workspace.script_paths(&config.script_prefix, mode);
    let table = TableSpec {
        name: mode.bench_table(),
        index: mode,
        value_width: config.value_width,
    };
    let commit_step = config.commit_step_for(truth.len());

    log::info!("Writing LOAD script {}...", paths.load.display());
    write_script_file(&paths.load, |out| {
        write_load_script(out, &table, truth, commit_step)
    })?;
    log::info!("Writing QUERY script {}...", paths.query.display());
    write_script_file(&paths.query, |out| write_query_script(out, table.name, workload))?;

    log::info!("[PHASE 1] Loading Data ({})...", table.name);
    let load = runner.run_load(&paths.load, truth.len())?;

    settle(config.settle, "I/O cooldown");

    log::info!("[PHASE 2] Running Queries ({})...", table.name);
    let query = runner.run_query(&paths.query, workload.counts().into())?;

    let mut latencies = query.parsed.latencies.clone();
    latencies.absorb(OpClass::Insert, &load.parsed.latencies);

    let mut result = BenchmarkResult::from_latencies(mode, &latencies);
    result.unattributed_samples =
        load.parsed.unattributed_samples + query.parsed.unattributed_samples;

    if check_answers {
        let verdict = verify(truth, workload, &query.parsed.result_sets)?;
        verdict.log(config.diagnostic_limit);
        result.verified = Some(verdict.passed());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(mode: IndexMode, samples: &[(OpClass, f64)]) -> BenchmarkResult {
        let mut log = LatencyLog::default();
        for (class, ms) in samples {
            log.push(*class, *ms);
        }
        BenchmarkResult::from_latencies(mode, &log)
    }

    #[test]
    fn speedup_is_rendered_with_one_decimal() {
        assert_eq!(Speedup::between(5.0, 0.05).to_string(), "100.0x");
        assert_eq!(Speedup::between(1.0, 4.0).to_string(), "0.2x");
    }

    #[test]
    fn zero_indexed_latency_is_unbounded() {
        assert_eq!(Speedup::between(3.0, 0.0), Speedup::Unbounded);
        assert_eq!(Speedup::Unbounded.to_string(), "unbounded");
    }

    #[test]
    fn means_per_class_and_empty_classes_read_zero() {
        let result = result_with(
            IndexMode::NoIndex,
            &[(OpClass::PointSelect, 4.0), (OpClass::PointSelect, 6.0)],
        );
        assert_eq!(result.mean(OpClass::PointSelect), 5.0);
        assert_eq!(result.mean(OpClass::RangeDelete), 0.0);
        assert_eq!(result.summary(OpClass::PointSelect).unwrap().samples, 2);
        assert_eq!(result.classes.len(), 5);
    }

    #[test]
    fn comparison_reports_overhead_and_speedups() {
        let comparison = BenchmarkComparison {
            rows: 1000,
            seed: 1,
            plan: BenchPlan::scaled(1000),
            no_index: result_with(
                IndexMode::NoIndex,
                &[(OpClass::Insert, 0.010), (OpClass::PointSelect, 5.0)],
            ),
            with_index: result_with(
                IndexMode::WithIndex,
                &[(OpClass::Insert, 0.015), (OpClass::PointSelect, 0.05)],
            ),
        };
        assert!((comparison.insert_overhead_ms() - 0.005).abs() < 1e-12);
        assert_eq!(comparison.speedup(OpClass::PointSelect).to_string(), "100.0x");
        assert_eq!(comparison.speedup(OpClass::RangeSelect), Speedup::Unbounded);
        assert_eq!(comparison.speedups().len(), 4);

        let json = serde_json::to_value(&comparison).unwrap();
        assert_eq!(json["no_index"]["mode"], "no_index");
        assert_eq!(json["with_index"]["classes"][1]["class"], "point_select");
    }
}
