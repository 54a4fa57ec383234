//! Process runner: starts the store against one script and streams its
//! output.
//!
//! Each phase is a separate process on purpose. Whatever the query phase sees
//! was written by the load process and had to survive its exit.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{HarnessError, Result};
use crate::parser::{CommandKind, ParsedResponse, PointQuota, ResponseParser};
use crate::workspace::Workspace;

/// Stdout lines kept for diagnostics after a phase ends.
const TAIL_LINES: usize = 20;

/// How a store process ended.
#[derive(Debug, Clone)]
pub struct PhaseExit {
    pub status: ExitStatus,
    pub stderr: String,
    pub stdout_lines: usize,
    /// Last stdout lines, oldest first.
    pub tail: Vec<String>,
    pub elapsed: Duration,
}

impl PhaseExit {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Outcome of one phase: exit information plus the parsed stream.
#[derive(Debug, Clone)]
pub struct PhaseReport {
    pub exit: PhaseExit,
    pub parsed: ParsedResponse,
}

/// Invokes `<store-exe> <db-identifier> <script>` inside a workspace.
#[derive(Debug, Clone)]
pub struct StoreRunner {
    exe: PathBuf,
    work_dir: PathBuf,
    db_name: String,
}

impl StoreRunner {
    pub fn new(exe: impl Into<PathBuf>, workspace: &Workspace) -> Self {
        StoreRunner {
            exe: exe.into(),
            work_dir: workspace.dir().to_path_buf(),
            db_name: workspace.db_name().to_string(),
        }
    }

    /// Runs the store on `script`, handing every stdout line to `on_line` as
    /// it arrives. Stderr is drained on a helper thread so a chatty store
    /// cannot block on a full pipe.
    pub fn run_script<F>(&self, script: &Path, mut on_line: F) -> Result<PhaseExit>
    where
        F: FnMut(&str),
    {
        log::debug!(
            "spawning {} {} {}",
            self.exe.display(),
            self.db_name,
            script.display()
        );
        let started = Instant::now();
        let mut child = Command::new(&self.exe)
            .arg(&self.db_name)
            .arg(script)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| HarnessError::Spawn {
                exe: self.exe.clone(),
                source,
            })?;

        let stderr_pipe = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut bytes = Vec::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_end(&mut bytes);
            }
            String::from_utf8_lossy(&bytes).into_owned()
        });

        let mut tail = VecDeque::with_capacity(TAIL_LINES);
        let mut stdout_lines = 0;
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(HarnessError::io(
                            format!("reading output of {}", script.display()),
                            e,
                        ));
                    }
                }
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\r', '\n']);
                on_line(line);

                stdout_lines += 1;
                if tail.len() == TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line.to_string());
            }
        }

        let status = child
            .wait()
            .map_err(|e| HarnessError::io(format!("waiting for {}", self.exe.display()), e))?;
        let stderr = stderr_reader.join().unwrap_or_default();

        Ok(PhaseExit {
            status,
            stderr,
            stdout_lines,
            tail: tail.into(),
            elapsed: started.elapsed(),
        })
    }

    /// Runs the load script, logging progress roughly every 5 % of
    /// `expected_rows` confirmations. A failing exit status is a
    /// [`HarnessError::LoadCrashed`].
    pub fn run_load(&self, script: &Path, expected_rows: usize) -> Result<PhaseReport> {
        let mut parser = ResponseParser::new(PointQuota::default());
        let mut progress = LoadProgress::new(expected_rows);

        let exit = self.run_script(script, |line| {
            if parser.feed_line(line) == Some(CommandKind::Insert) {
                progress.record(parser.inserts_confirmed());
            }
        })?;

        if !exit.success() {
            return Err(HarnessError::LoadCrashed {
                status: exit.status.to_string(),
                stderr: exit.stderr,
            });
        }

        let parsed = parser.finish();
        if parsed.inserts_confirmed != expected_rows {
            log::warn!(
                "load confirmed {} of {} inserts",
                parsed.inserts_confirmed,
                expected_rows
            );
        }
        log::info!(
            "load finished in {:.1}s ({} inserts confirmed)",
            exit.elapsed.as_secs_f64(),
            parsed.inserts_confirmed
        );
        Ok(PhaseReport { exit, parsed })
    }

    /// Runs the query script and parses its whole output.
    ///
    /// A failing exit status is only logged: how many result sets made it out
    /// is what decides the verdict.
    pub fn run_query(&self, script: &Path, quota: PointQuota) -> Result<PhaseReport> {
        let mut parser = ResponseParser::new(quota);
        let exit = self.run_script(script, |line| {
            parser.feed_line(line);
        })?;

        if !exit.success() {
            log::warn!(
                "query process exited with {}; stderr: {}",
                exit.status,
                exit.stderr.trim()
            );
        }
        let parsed = parser.finish();
        log::info!(
            "query phase finished in {:.1}s ({} result sets, {} timing samples)",
            exit.elapsed.as_secs_f64(),
            parsed.result_sets.len(),
            parsed.latencies.total_samples()
        );
        Ok(PhaseReport { exit, parsed })
    }
}

/// Sleeps for the durability interval between two store processes.
pub fn settle(interval: Duration, reason: &str) {
    if interval.is_zero() {
        return;
    }
    log::info!(
        "[WAIT] sleeping {:.1}s for {reason}",
        interval.as_secs_f64()
    );
    thread::sleep(interval);
}

struct LoadProgress {
    total: usize,
    every: usize,
    started: Instant,
}

impl LoadProgress {
    fn new(total: usize) -> Self {
        LoadProgress {
            total,
            every: (total / 20).max(1),
            started: Instant::now(),
        }
    }

    fn record(&mut self, done: usize) {
        if self.total == 0 || done % self.every != 0 {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        let rate = done as f64 / elapsed;
        let eta = self.total.saturating_sub(done) as f64 / rate;
        log::info!(
            "[Loading: {}%] {}/{} ETA: {:.1}s",
            done * 100 / self.total,
            done,
            self.total,
            eta
        );
    }
}
