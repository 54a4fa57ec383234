//! Run configuration shared by the accuracy and benchmark drivers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{HarnessError, Result};

/// Length of every generated value.
pub const DEFAULT_VALUE_LEN: usize = 16;
/// Declared width of the `val char <width>` column.
pub const DEFAULT_VALUE_WIDTH: usize = 32;
/// Failing queries printed in full; the rest are only counted.
pub const DEFAULT_DIAGNOSTIC_LIMIT: usize = 3;
/// Seed used when a caller does not pick one.
pub const DEFAULT_SEED: u64 = 0x7E70_DB00_5EED_0001;

pub const ACCURACY_DEFAULT_ROWS: usize = 1000;
pub const ACCURACY_DEFAULT_QUERIES: usize = 50;
pub const ACCURACY_SETTLE: Duration = Duration::from_secs(2);
pub const ACCURACY_DB_NAME: &str = "acc_fuzz_db";
pub const ACCURACY_SCRIPT_PREFIX: &str = "fuzz";
pub const ACCURACY_TABLE: &str = "fuzz_table";

pub const BENCH_DEFAULT_ROWS: usize = 50_000;
pub const BENCH_SETTLE: Duration = Duration::from_secs(5);
pub const BENCH_DB_NAME: &str = "bench_db";
pub const BENCH_SCRIPT_PREFIX: &str = "bench";

/// Extensions of the files the store creates next to its database identifier.
pub const DB_FILE_EXTENSIONS: [&str; 4] = [".db", ".teto", ".btree", ".tmp"];

/// Store binary looked up when neither `--db-exe` nor `TETO_DB_EXE` is set.
pub fn default_store_exe() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("TetoDB.exe")
    } else {
        PathBuf::from("./TetoDB")
    }
}

/// Whether the key column is created with the store's secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    NoIndex,
    WithIndex,
}

impl IndexMode {
    /// Run order of a full accuracy or benchmark pass.
    pub const ALL: [IndexMode; 2] = [IndexMode::NoIndex, IndexMode::WithIndex];

    pub fn is_indexed(self) -> bool {
        matches!(self, IndexMode::WithIndex)
    }

    /// The `<0|1>` flag of `create table`.
    pub fn flag(self) -> u8 {
        u8::from(self.is_indexed())
    }

    /// File-name fragment.
    pub fn slug(self) -> &'static str {
        match self {
            IndexMode::NoIndex => "no_index",
            IndexMode::WithIndex => "with_index",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IndexMode::NoIndex => "No Index",
            IndexMode::WithIndex => "With Index",
        }
    }

    /// Table name used by the benchmark, one per mode.
    pub fn bench_table(self) -> &'static str {
        match self {
            IndexMode::NoIndex => "table_slow",
            IndexMode::WithIndex => "table_fast",
        }
    }
}

/// Everything a driver needs besides the workload sizes.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub store_exe: PathBuf,
    /// Directory the store runs in; scripts and database files live here.
    pub work_dir: PathBuf,
    /// Database identifier passed as the store's first argument.
    pub db_name: String,
    /// Prefix of the generated script files.
    pub script_prefix: String,
    /// Wait between the load process exiting and the query process starting.
    pub settle: Duration,
    pub seed: u64,
    pub value_len: usize,
    pub value_width: usize,
    /// Inserts per `.commit` batch; `None` uses [`default_commit_step`].
    pub commit_step: Option<usize>,
    pub diagnostic_limit: usize,
}

impl HarnessConfig {
    fn base(store_exe: PathBuf, work_dir: PathBuf) -> Self {
        HarnessConfig {
            store_exe,
            work_dir,
            db_name: String::new(),
            script_prefix: String::new(),
            settle: Duration::ZERO,
            seed: DEFAULT_SEED,
            value_len: DEFAULT_VALUE_LEN,
            value_width: DEFAULT_VALUE_WIDTH,
            commit_step: None,
            diagnostic_limit: DEFAULT_DIAGNOSTIC_LIMIT,
        }
    }

    pub fn accuracy(store_exe: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        HarnessConfig {
            db_name: ACCURACY_DB_NAME.to_string(),
            script_prefix: ACCURACY_SCRIPT_PREFIX.to_string(),
            settle: ACCURACY_SETTLE,
            ..Self::base(store_exe.into(), work_dir.into())
        }
    }

    pub fn benchmark(store_exe: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        HarnessConfig {
            db_name: BENCH_DB_NAME.to_string(),
            script_prefix: BENCH_SCRIPT_PREFIX.to_string(),
            settle: BENCH_SETTLE,
            ..Self::base(store_exe.into(), work_dir.into())
        }
    }

    pub fn commit_step_for(&self, rows: usize) -> usize {
        self.commit_step
            .filter(|step| *step > 0)
            .unwrap_or_else(|| default_commit_step(rows))
    }

    /// Absolute path of the store binary, or [`HarnessError::StoreMissing`].
    ///
    /// The store runs with `work_dir` as its current directory, so a relative
    /// path has to be pinned against the harness's own directory first.
    pub fn resolve_store_exe(&self) -> Result<PathBuf> {
        resolve_existing(&self.store_exe)
            .ok_or_else(|| HarnessError::StoreMissing(self.store_exe.clone()))
    }
}

/// `max(5000, rows / 20)`: about twenty commits for large loads, never a
/// commit per handful of rows for small ones.
pub fn default_commit_step(rows: usize) -> usize {
    (rows / 20).max(5000)
}

fn resolve_existing(path: &Path) -> Option<PathBuf> {
    if !path.is_file() {
        return None;
    }
    std::fs::canonicalize(path).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_step_has_a_floor_of_five_thousand() {
        assert_eq!(default_commit_step(1000), 5000);
        assert_eq!(default_commit_step(100_000), 5000);
        assert_eq!(default_commit_step(1_000_000), 50_000);
    }

    #[test]
    fn explicit_commit_step_wins_unless_zero() {
        let mut config = HarnessConfig::accuracy("./TetoDB", ".");
        config.commit_step = Some(250);
        assert_eq!(config.commit_step_for(1_000_000), 250);
        config.commit_step = Some(0);
        assert_eq!(config.commit_step_for(1_000_000), 50_000);
    }

    #[test]
    fn mode_names_and_flags() {
        assert_eq!(IndexMode::NoIndex.flag(), 0);
        assert_eq!(IndexMode::WithIndex.flag(), 1);
        assert_eq!(IndexMode::NoIndex.slug(), "no_index");
        assert_eq!(IndexMode::WithIndex.bench_table(), "table_fast");
    }

    #[test]
    fn presets_differ_in_names_and_settle_time() {
        let acc = HarnessConfig::accuracy("./TetoDB", ".");
        let bench = HarnessConfig::benchmark("./TetoDB", ".");
        assert_eq!(acc.db_name, "acc_fuzz_db");
        assert_eq!(bench.db_name, "bench_db");
        assert_eq!(acc.settle, Duration::from_secs(2));
        assert_eq!(bench.settle, Duration::from_secs(5));
    }

    #[test]
    fn missing_store_is_reported_with_its_path() {
        let config = HarnessConfig::accuracy("./definitely-not-a-store-binary", ".");
        match config.resolve_store_exe() {
            Err(HarnessError::StoreMissing(path)) => {
                assert_eq!(path, PathBuf::from("./definitely-not-a-store-binary"))
            }
            other => panic!("expected StoreMissing, got {other:?}"),
        }
    }
}
