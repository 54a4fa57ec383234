//! Criterion benchmarks for the harness's own hot paths: parsing a large
//! store transcript and generating ground truth plus workload.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt::Write;
use tetobench::ground_truth::GroundTruth;
use tetobench::parser::{parse_output, PointQuota};
use tetobench::workload::BenchPlan;

/// Table sizes to benchmark.
fn row_counts() -> Vec<usize> {
    vec![10_000, 50_000]
}

/// Synthetic query-phase output: `selects` result sets of `span` rows each,
/// followed by as many delete confirmations.
fn transcript(selects: usize, span: usize) -> String {
    let mut out = String::new();
    for q in 0..selects {
        out.push_str("| id | val |\n");
        for k in 0..span {
            let _ = writeln!(out, "| {} | abcdefghijklmnop |", q * span + k);
        }
        let _ = writeln!(out, "{span} rows in set (0.{q:04} ms)");
    }
    for q in 0..selects {
        let _ = writeln!(out, "Deleted 1 rows ({q} us)");
    }
    out
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_output");
    for &(selects, span) in &[(1100, 1), (100, 500)] {
        let text = transcript(selects, span);
        let quota = PointQuota {
            selects: selects / 2,
            deletes: selects / 2,
        };
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{selects}x{span}")),
            &text,
            |b, text| b.iter(|| parse_output(black_box(text), quota)),
        );
    }
    group.finish();
}

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate");
    for rows in row_counts() {
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            b.iter(|| {
                let mut rng = StdRng::seed_from_u64(1);
                let truth = GroundTruth::generate(rows, 16, &mut rng).expect("generate failed");
                BenchPlan::scaled(rows)
                    .generate(truth.keys(), &mut rng)
                    .expect("workload failed")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_generate);
criterion_main!(benches);
