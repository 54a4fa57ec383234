use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use tetobench::accuracy::run_accuracy;
use tetobench::benchmark::{run_benchmark, BenchmarkSpec};
use tetobench::config::{
    default_store_exe, HarnessConfig, ACCURACY_DEFAULT_QUERIES, ACCURACY_DEFAULT_ROWS,
    BENCH_DEFAULT_ROWS,
};
use tetobench::report;
use tetobench::workload::{BenchPlan, SelectMix};
use tetobench::HarnessError;

#[derive(Parser)]
#[command(author, version, about = "Accuracy tester and index benchmark for TetoDB")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Args)]
struct GlobalArgs {
    /// Store executable under test
    #[arg(long, global = true, env = "TETO_DB_EXE")]
    db_exe: Option<PathBuf>,

    /// Directory scripts and database files are written to
    #[arg(long, global = true, env = "TETO_WORK_DIR", default_value = ".")]
    work_dir: PathBuf,

    /// RNG seed; a random one is picked and logged when omitted
    #[arg(long, global = true, env = "TETO_SEED")]
    seed: Option<u64>,

    /// Wait between store processes, in milliseconds
    #[arg(long, global = true, env = "TETO_SETTLE_MS")]
    settle_ms: Option<u64>,

    /// Inserts per `.commit` in load scripts
    #[arg(long, global = true)]
    commit_step: Option<usize>,

    /// off, error, warn, info, debug or trace
    #[arg(long, global = true, env = "TETO_LOG_LEVEL", default_value = "info", value_parser = parse_level)]
    log_level: LevelFilter,

    /// Also write the log to this file
    #[arg(long, global = true, env = "TETO_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Mode {
    /// Check random selects against the ground truth, without and with index
    Accuracy {
        #[arg(default_value_t = ACCURACY_DEFAULT_ROWS)]
        rows: usize,

        #[arg(long, default_value_t = ACCURACY_DEFAULT_QUERIES)]
        queries: usize,
    },
    /// Compare latencies of one workload without and with index
    Bench(BenchArgs),
}

#[derive(Args)]
struct BenchArgs {
    #[arg(default_value_t = BENCH_DEFAULT_ROWS)]
    rows: usize,

    #[arg(long, default_value_t = BenchPlan::DEFAULT_POINT_SELECTS)]
    point_selects: usize,

    #[arg(long, default_value_t = BenchPlan::DEFAULT_RANGE_SELECTS)]
    range_selects: usize,

    #[arg(long, default_value_t = BenchPlan::DEFAULT_POINT_DELETES)]
    point_deletes: usize,

    #[arg(long, default_value_t = BenchPlan::DEFAULT_RANGE_DELETES)]
    range_deletes: usize,

    /// Check select answers against the ground truth as well
    #[arg(long)]
    verify: bool,

    /// Write the comparison as JSON
    #[arg(long)]
    json_out: Option<PathBuf>,
}

impl BenchArgs {
    fn plan(&self) -> BenchPlan {
        BenchPlan {
            point_selects: self.point_selects,
            range_selects: self.range_selects,
            point_deletes: self.point_deletes,
            range_deletes: self.range_deletes,
            ..BenchPlan::scaled(self.rows)
        }
    }
}

fn parse_level(s: &str) -> Result<LevelFilter, String> {
    s.parse().map_err(|_| format!("unknown log level '{s}'"))
}

impl GlobalArgs {
    fn apply(&self, mut config: HarnessConfig) -> HarnessConfig {
        if let Some(ms) = self.settle_ms {
            config.settle = Duration::from_millis(ms);
        }
        config.commit_step = self.commit_step;
        config.seed = self.seed.unwrap_or_else(rand::random);
        config
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_file = cli.global.log_file.as_ref().map(|p| p.to_string_lossy().into_owned());
    if let Err(e) = teto_core::initialize_logger(cli.global.log_level, log_file.as_deref()) {
        eprintln!("Failed to initialize logger: {e:#}. Exiting.");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            match e.downcast_ref::<HarnessError>() {
                Some(HarnessError::StoreMissing(exe)) => {
                    eprintln!("Error: {} not found.", exe.display());
                }
                _ => log::error!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every mode passed.
fn run(cli: &Cli) -> anyhow::Result<bool> {
    let exe = cli.global.db_exe.clone().unwrap_or_else(default_store_exe);
    let mut stdout = io::stdout().lock();

    match &cli.command {
        Mode::Accuracy { rows, queries } => {
            let config = cli
                .global
                .apply(HarnessConfig::accuracy(exe, &cli.global.work_dir));
            log::info!("seed: {}", config.seed);

            let report = run_accuracy(&config, *rows, &SelectMix::with_count(*queries))?;
            report::write_accuracy_summary(&mut stdout, &report)?;
            Ok(report.all_passed())
        }
        Mode::Bench(args) => {
            let config = cli
                .global
                .apply(HarnessConfig::benchmark(exe, &cli.global.work_dir));
            let spec = BenchmarkSpec {
                rows: args.rows,
                plan: args.plan(),
                verify: args.verify,
            };
            report::write_benchmark_banner(&mut stdout, spec.rows, &spec.plan)?;
            stdout.flush()?;
            log::info!("seed: {}", config.seed);

            let comparison = run_benchmark(&config, &spec)?;
            report::write_comparison(&mut stdout, &comparison)?;

            if let Some(path) = &args.json_out {
                report::write_json(path, &comparison)
                    .with_context(|| format!("saving benchmark report to {}", path.display()))?;
                log::info!("report written to {}", path.display());
            }
            let verified = [&comparison.no_index, &comparison.with_index]
                .iter()
                .all(|result| result.verified != Some(false));
            Ok(verified)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bench_defaults_scale_spans_with_rows() {
        let cli = Cli::parse_from(["tetobench", "bench", "20000", "--range-deletes", "7"]);
        let Mode::Bench(args) = cli.command else {
            panic!("expected bench");
        };
        let plan = args.plan();
        assert_eq!(plan.select_span, 200);
        assert_eq!(plan.delete_span, 100);
        assert_eq!(plan.range_deletes, 7);
        assert_eq!(plan.point_selects, BenchPlan::DEFAULT_POINT_SELECTS);
    }

    #[test]
    fn global_options_override_mode_defaults() {
        let cli = Cli::parse_from([
            "tetobench",
            "accuracy",
            "10",
            "--seed",
            "42",
            "--settle-ms",
            "0",
            "--commit-step",
            "3",
        ]);
        let config = cli.global.apply(HarnessConfig::accuracy("x", "."));
        assert_eq!(config.seed, 42);
        assert!(config.settle.is_zero());
        assert_eq!(config.commit_step_for(10), 3);
        assert!(matches!(
            cli.command,
            Mode::Accuracy {
                rows: 10,
                queries: ACCURACY_DEFAULT_QUERIES
            }
        ));
        assert_eq!(cli.global.log_level, LevelFilter::Info);
    }
}
