//! Rendering of the store's line protocol into load and query scripts.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::config::IndexMode;
use crate::error::{HarnessError, Result};
use crate::ground_truth::{GroundTruth, Key};
use crate::workload::{Operation, Workload};

/// Table definition shared by a mode's load and query scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec<'a> {
    pub name: &'a str,
    pub index: IndexMode,
    pub value_width: usize,
}

/// One line of a command script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    CreateTable(TableSpec<'a>),
    Insert {
        table: &'a str,
        key: Key,
        value: &'a str,
    },
    Select {
        table: &'a str,
        lo: Key,
        hi: Key,
    },
    Delete {
        table: &'a str,
        lo: Key,
        hi: Key,
    },
    Commit,
    Exit,
}

impl<'a> Command<'a> {
    pub fn for_operation(table: &'a str, op: &Operation) -> Self {
        let (lo, hi) = op.bounds();
        if op.is_select() {
            Command::Select { table, lo, hi }
        } else {
            Command::Delete { table, lo, hi }
        }
    }
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::CreateTable(spec) => write!(
                f,
                "create table {} id int {} val char {}",
                spec.name,
                spec.index.flag(),
                spec.value_width
            ),
            Command::Insert { table, key, value } => {
                write!(f, "insert into {table} {key} \"{value}\"")
            }
            Command::Select { table, lo, hi } => {
                write!(f, "select from {table} where id {lo} {hi}")
            }
            Command::Delete { table, lo, hi } => {
                write!(f, "delete from {table} where id {lo} {hi}")
            }
            Command::Commit => f.write_str(".commit"),
            Command::Exit => f.write_str(".exit"),
        }
    }
}

/// Line-per-command writer over any sink.
pub struct ScriptWriter<W: Write> {
    out: W,
    lines: usize,
}

impl<W: Write> ScriptWriter<W> {
    pub fn new(out: W) -> Self {
        ScriptWriter { out, lines: 0 }
    }

    pub fn command(&mut self, command: &Command<'_>) -> io::Result<()> {
        writeln!(self.out, "{command}")?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Table definition, every ground-truth row in insertion order with a
/// `.commit` after each `commit_step` inserts, then a final commit and exit.
pub fn write_load_script<W: Write>(
    out: W,
    table: &TableSpec<'_>,
    truth: &GroundTruth,
    commit_step: usize,
) -> io::Result<W> {
    let commit_step = commit_step.max(1);
    let mut writer = ScriptWriter::new(out);
    writer.command(&Command::CreateTable(*table))?;

    for (i, (key, value)) in truth.records().enumerate() {
        writer.command(&Command::Insert {
            table: table.name,
            key,
            value,
        })?;
        if (i + 1) % commit_step == 0 {
            writer.command(&Command::Commit)?;
        }
    }

    writer.command(&Command::Commit)?;
    writer.command(&Command::Exit)?;
    writer.finish()
}

/// Every operation of the workload against an already existing table.
///
/// No `create table`: the table must already exist from the load process.
pub fn write_query_script<W: Write>(out: W, table: &str, workload: &Workload) -> io::Result<W> {
    let mut writer = ScriptWriter::new(out);
    for op in workload.ops() {
        writer.command(&Command::for_operation(table, op))?;
    }
    writer.command(&Command::Commit)?;
    writer.command(&Command::Exit)?;
    writer.finish()
}

/// Creates (or truncates) `path` and hands a buffered writer to `render`.
pub fn write_script_file<F>(path: &Path, render: F) -> Result<()>
where
    F: FnOnce(BufWriter<File>) -> io::Result<BufWriter<File>>,
{
    let context = || format!("writing script {}", path.display());
    let file = File::create(path).map_err(|e| HarnessError::io(context(), e))?;
    render(BufWriter::new(file)).map_err(|e| HarnessError::io(context(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_load(truth: &GroundTruth, index: IndexMode, step: usize) -> String {
        let spec = TableSpec {
            name: "t",
            index,
            value_width: 32,
        };
        let bytes = write_load_script(Vec::new(), &spec, truth, step).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn load_script_lists_rows_in_insertion_order() {
        let truth = GroundTruth::from_records([(3, "cc"), (1, "aa"), (2, "bb")]).unwrap();
        let script = render_load(&truth, IndexMode::WithIndex, 5000);
        assert_eq!(
            script,
            "create table t id int 1 val char 32\n\
             insert into t 3 \"cc\"\n\
             insert into t 1 \"aa\"\n\
             insert into t 2 \"bb\"\n\
             .commit\n\
             .exit\n"
        );
    }

    #[test]
    fn load_script_commits_every_step() {
        let truth = GroundTruth::from_records((1..=10).map(|k| (k, "v"))).unwrap();
        let script = render_load(&truth, IndexMode::NoIndex, 4);
        let lines: Vec<&str> = script.lines().collect();

        assert_eq!(lines[0], "create table t id int 0 val char 32");
        let commits: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == ".commit")
            .map(|(i, _)| i)
            .collect();
        // after insert 4 (line 5), insert 8 (line 10), then the final one
        assert_eq!(commits, vec![5, 10, 13]);
        assert_eq!(lines.last(), Some(&".exit"));
    }

    #[test]
    fn query_script_has_no_table_definition() {
        let workload = Workload::from_ops(vec![
            Operation::PointSelect(9999),
            Operation::range_select(1, 2),
            Operation::PointDelete(5),
            Operation::range_delete(10, 20),
        ]);
        let bytes = write_query_script(Vec::new(), "fuzz_table", &workload).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "select from fuzz_table where id 9999 9999\n\
             select from fuzz_table where id 1 2\n\
             delete from fuzz_table where id 5 5\n\
             delete from fuzz_table where id 10 20\n\
             .commit\n\
             .exit\n"
        );
    }

    #[test]
    fn writer_counts_lines() {
        let mut writer = ScriptWriter::new(Vec::new());
        writer.command(&Command::Commit).unwrap();
        writer.command(&Command::Exit).unwrap();
        assert_eq!(writer.lines_written(), 2);
    }
}
