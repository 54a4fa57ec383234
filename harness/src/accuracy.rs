//! Accuracy tester: random selects against a freshly loaded table, every
//! answer checked against the ground truth. Runs once without and once with
//! the key index.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{HarnessConfig, IndexMode, ACCURACY_TABLE};
use crate::error::{HarnessError, Result};
use crate::ground_truth::GroundTruth;
use crate::parser::PointQuota;
use crate::runner::{settle, StoreRunner};
use crate::script::{write_load_script, write_query_script, write_script_file, TableSpec};
use crate::verify::{verify, Verdict};
use crate::workload::{SelectMix, Workload};
use crate::workspace::Workspace;

/// Pass/fail outcome of one test mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeOutcome {
    Passed { queries: usize },
    /// Scripts could not be written or the store files not cleaned.
    SetupFailed(String),
    /// The load process exited with a failure; no queries were run.
    LoadFailed(String),
    /// Running or parsing the query phase failed.
    QueryError(String),
    /// Result-set count differs from the number of selects.
    CountMismatch { expected: usize, received: usize },
    Mismatches { failing: usize, queries: usize },
}

impl ModeOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, ModeOutcome::Passed { .. })
    }
}

impl From<Verdict> for ModeOutcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Passed { queries } => ModeOutcome::Passed { queries },
            Verdict::CountMismatch { expected, received } => {
                ModeOutcome::CountMismatch { expected, received }
            }
            Verdict::Failed { queries, failures } => ModeOutcome::Mismatches {
                failing: failures.len(),
                queries,
            },
        }
    }
}

/// Outcome of a full accuracy pass.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyReport {
    pub rows: usize,
    pub queries: usize,
    pub seed: u64,
    pub modes: Vec<(IndexMode, ModeOutcome)>,
}

impl AccuracyReport {
    pub fn all_passed(&self) -> bool {
        self.modes.iter().all(|(_, outcome)| outcome.passed())
    }

    pub fn outcome(&self, mode: IndexMode) -> Option<&ModeOutcome> {
        self.modes
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, outcome)| outcome)
    }
}

/// Runs the no-index and the indexed mode in that order.
///
/// Only setup problems (missing store, unusable working directory, zero
/// rows) are returned as errors. Everything that goes wrong inside a mode
/// becomes that mode's [`ModeOutcome`].
pub fn run_accuracy(config: &HarnessConfig, rows: usize, mix: &SelectMix) -> Result<AccuracyReport> {
    let store_exe = config.resolve_store_exe()?;
    if rows == 0 {
        return Err(HarnessError::EmptyKeyUniverse);
    }
    let workspace = Workspace::prepare(&config.work_dir, &config.db_name)?;
    let runner = StoreRunner::new(store_exe, &workspace);

    log::info!("FUZZ TESTER (split persistence): {rows} rows, seed {}", config.seed);

    let modes = IndexMode::ALL
        .into_iter()
        .map(|mode| {
            log::info!("=========================================");
            log::info!("TEST RUN: {}", mode.label());
            log::info!("=========================================");
            let outcome = run_mode(config, &workspace, &runner, mode, rows, mix);
            (mode, outcome)
        })
        .collect();

    Ok(AccuracyReport {
        rows,
        queries: mix.count,
        seed: config.seed,
        modes,
    })
}

/// Each mode draws from its own stream so either mode can be reproduced
/// alone from the reported seed.
pub fn mode_seed(seed: u64, mode: IndexMode) -> u64 {
    seed.wrapping_add(mode.flag() as u64)
}

fn run_mode(
    config: &HarnessConfig,
    workspace: &Workspace,
    runner: &StoreRunner,
    mode: IndexMode,
    rows: usize,
    mix: &SelectMix,
) -> ModeOutcome {
    let mut rng = StdRng::seed_from_u64(mode_seed(config.seed, mode));

    log::info!("   [1/5] Generating ground truth data ({rows} rows)...");
    let prepared = GroundTruth::generate(rows, config.value_len, &mut rng).and_then(|truth| {
        log::info!("   [2/5] Generating {} random queries...", mix.count);
        let workload = mix.generate(truth.keys(), &mut rng)?;
        Ok((truth, workload))
    });
    let (truth, workload) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => return setup_failed(err),
    };

    let paths = workspace.script_paths(&config.script_prefix, mode);
    let table = TableSpec {
        name: ACCURACY_TABLE,
        index: mode,
        value_width: config.value_width,
    };
    let commit_step = config.commit_step_for(truth.len());

    let written = workspace.clean_db_files().and_then(|_| {
        log::info!("   [3/5] Writing LOAD script {}...", paths.load.display());
        write_script_file(&paths.load, |out| {
            write_load_script(out, &table, &truth, commit_step)
        })?;
        log::info!("   [4/5] Writing QUERY script {}...", paths.query.display());
        write_script_file(&paths.query, |out| {
            write_query_script(out, table.name, &workload)
        })
    });
    if let Err(err) = written {
        return setup_failed(err);
    }

    log::info!("   [EXEC] Loading Data...");
    if let Err(err) = runner.run_load(&paths.load, truth.len()) {
        log::error!("   {err}");
        if let HarnessError::LoadCrashed { stderr, .. } = &err {
            if !stderr.trim().is_empty() {
                log::error!("   store stderr: {}", stderr.trim());
            }
        }
        return ModeOutcome::LoadFailed(err.to_string());
    }

    settle(config.settle, "OS flush");

    log::info!("   [EXEC] Running Queries...");
    match query_and_verify(runner, &paths.query, &truth, &workload) {
        Ok(verdict) => {
            log::info!("   [5/5] Verifying {} queries...", workload.select_count());
            verdict.log(config.diagnostic_limit);
            verdict.into()
        }
        Err(err) => {
            log::error!("   Query Execution Error: {err}");
            ModeOutcome::QueryError(err.to_string())
        }
    }
}

fn query_and_verify(
    runner: &StoreRunner,
    script: &std::path::Path,
    truth: &GroundTruth,
    workload: &Workload,
) -> Result<Verdict> {
    let report = runner.run_query(script, PointQuota::from(workload.counts()))?;
    if report.parsed.result_sets.len() != workload.select_count() {
        for line in &report.exit.tail {
            log::debug!("   store> {line}");
        }
    }
    verify(truth, workload, &report.parsed.result_sets)
}

fn setup_failed(err: HarnessError) -> ModeOutcome {
    log::error!("   setup failed: {err}");
    ModeOutcome::SetupFailed(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::QueryFailure;
    use crate::workload::Operation;

    #[test]
    fn verdicts_map_onto_outcomes() {
        assert_eq!(
            ModeOutcome::from(Verdict::Passed { queries: 4 }),
            ModeOutcome::Passed { queries: 4 }
        );
        let failed = Verdict::Failed {
            queries: 10,
            failures: vec![QueryFailure::KeySet {
                query: 3,
                op: Operation::PointSelect(3),
                missing: vec![3],
                extra: vec![],
            }],
        };
        assert_eq!(
            ModeOutcome::from(failed),
            ModeOutcome::Mismatches {
                failing: 1,
                queries: 10
            }
        );
    }

    #[test]
    fn mode_seeds_differ() {
        assert_ne!(
            mode_seed(7, IndexMode::NoIndex),
            mode_seed(7, IndexMode::WithIndex)
        );
        assert_eq!(mode_seed(u64::MAX, IndexMode::WithIndex), 0);
    }

    #[test]
    fn report_passes_only_when_every_mode_passes() {
        let mut report = AccuracyReport {
            rows: 10,
            queries: 5,
            seed: 1,
            modes: vec![
                (IndexMode::NoIndex, ModeOutcome::Passed { queries: 5 }),
                (IndexMode::WithIndex, ModeOutcome::Passed { queries: 5 }),
            ],
        };
        assert!(report.all_passed());

        report.modes[1].1 = ModeOutcome::LoadFailed("Load process crashed! (exit status: 1)".into());
        assert!(!report.all_passed());
        assert!(report.outcome(IndexMode::NoIndex).unwrap().passed());
    }
}
