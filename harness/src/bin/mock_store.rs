//! In-memory stand-in for the TetoDB binary, used by the integration tests.
//!
//! Usage: `mock_store <db-identifier> <script>`. Tables live in memory and are
//! written to `<db-identifier>.teto` on every `.commit` and on `.exit`, so a
//! second process started with the same identifier sees them again.
//!
//! Identifiers ending in `_volatile` never persist anything, and identifiers
//! ending in `_corrupt` answer selects with altered values.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};

#[derive(Debug, Default)]
struct Table {
    indexed: bool,
    width: usize,
    rows: BTreeMap<u64, String>,
}

struct Store {
    path: PathBuf,
    volatile: bool,
    corrupt: bool,
    tables: BTreeMap<String, Table>,
}

impl Store {
    fn open(db_name: &str) -> Result<Self> {
        let path = PathBuf::from(format!("{db_name}.teto"));
        let mut store = Store {
            path,
            volatile: db_name.ends_with("_volatile"),
            corrupt: db_name.ends_with("_corrupt"),
            tables: BTreeMap::new(),
        };
        if store.path.is_file() {
            store.load()?;
        }
        Ok(store)
    }

    fn load(&mut self) -> Result<()> {
        let file = fs::File::open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let mut current = None;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let mut fields = line.splitn(4, '\t');
            match (fields.next(), fields.next(), fields.next(), fields.next()) {
                (Some("table"), Some(name), Some(indexed), Some(width)) => {
                    let table = Table {
                        indexed: indexed == "1",
                        width: width.parse()?,
                        rows: BTreeMap::new(),
                    };
                    self.tables.insert(name.to_string(), table);
                    current = Some(name.to_string());
                }
                (Some("row"), Some(key), Some(value), None) => {
                    let name = current.as_ref().ok_or_else(|| anyhow!("row before table"))?;
                    if let Some(table) = self.tables.get_mut(name) {
                        table.rows.insert(key.parse()?, value.to_string());
                    }
                }
                _ => bail!("corrupt store file {}", self.path.display()),
            }
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        if self.volatile {
            return Ok(());
        }
        let mut out = BufWriter::new(fs::File::create(&self.path)?);
        for (name, table) in &self.tables {
            writeln!(out, "table\t{name}\t{}\t{}", u8::from(table.indexed), table.width)?;
            for (key, value) in &table.rows {
                writeln!(out, "row\t{key}\t{value}")?;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn execute(&mut self, line: &str, out: &mut impl Write) -> Result<bool> {
        let started = Instant::now();
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            [".commit"] => self.persist()?,
            [".exit"] => {
                self.persist()?;
                return Ok(false);
            }
            ["create", "table", name, "id", "int", flag, "val", "char", width] => {
                let table = Table {
                    indexed: *flag == "1",
                    width: width.parse()?,
                    rows: BTreeMap::new(),
                };
                self.tables.insert(name.to_string(), table);
                writeln!(out, "Table '{name}' created.")?;
            }
            ["insert", "into", name, key, ..] => {
                let value = line
                    .splitn(5, char::is_whitespace)
                    .nth(4)
                    .ok_or_else(|| anyhow!("insert without value: {line}"))?
                    .trim()
                    .trim_matches('"');
                let table = self.table(name)?;
                let value: String = value.chars().take(table.width).collect();
                table.rows.insert(key.parse()?, value);
                writeln!(out, "1 row inserted ({:.4} ms)", elapsed_ms(started))?;
            }
            ["select", "from", name, "where", "id", lo, hi] => {
                let (lo, hi): (u64, u64) = (lo.parse()?, hi.parse()?);
                let corrupt = self.corrupt;
                match self.tables.get(*name) {
                    Some(table) => {
                        writeln!(out, "| id | val |")?;
                        let mut count = 0;
                        if lo <= hi {
                            for (key, value) in table.rows.range(lo..=hi) {
                                if corrupt {
                                    writeln!(out, "| {key} | {} |", value.to_ascii_uppercase())?;
                                } else {
                                    writeln!(out, "| {key} | {value} |")?;
                                }
                                count += 1;
                            }
                        }
                        writeln!(out, "{count} rows in set ({:.4} ms)", elapsed_ms(started))?;
                    }
                    None => writeln!(out, "Error: no such table '{name}'")?,
                }
            }
            ["delete", "from", name, "where", "id", lo, hi] => {
                let (lo, hi): (u64, u64) = (lo.parse()?, hi.parse()?);
                let table = self.table(name)?;
                let doomed: Vec<u64> = if lo <= hi {
                    table.rows.range(lo..=hi).map(|(key, _)| *key).collect()
                } else {
                    Vec::new()
                };
                for key in &doomed {
                    table.rows.remove(key);
                }
                writeln!(out, "Deleted {} rows ({:.4} ms)", doomed.len(), elapsed_ms(started))?;
            }
            _ => bail!("unrecognised command: {line}"),
        }
        Ok(true)
    }

    fn table(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| anyhow!("no such table '{name}'"))
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

fn run(db_name: &str, script: &Path) -> Result<()> {
    let mut store = Store::open(db_name)?;
    let file = fs::File::open(script).with_context(|| format!("opening {}", script.display()))?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for line in BufReader::new(file).lines() {
        let line = line?;
        if !store.execute(line.trim(), &mut out)? {
            break;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let [_, db_name, script] = args.as_slice() else {
        eprintln!("usage: mock_store <db-identifier> <script>");
        return ExitCode::from(2);
    };

    match run(db_name, Path::new(script)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("mock_store: {e:#}");
            ExitCode::FAILURE
        }
    }
}
