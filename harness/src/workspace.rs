//! On-disk isolation of a run: script locations and removal of stale store
//! files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{IndexMode, DB_FILE_EXTENSIONS};
use crate::error::{HarnessError, Result};

/// Load and query script locations for one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPaths {
    pub load: PathBuf,
    pub query: PathBuf,
}

/// Directory the store runs in, with the database identifier it is given.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
    db_name: String,
}

impl Workspace {
    /// Creates `dir` if needed and pins it to an absolute path, since the
    /// store process is started with it as its working directory.
    pub fn prepare(dir: &Path, db_name: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| HarnessError::io(format!("creating {}", dir.display()), e))?;
        let dir = fs::canonicalize(dir)
            .map_err(|e| HarnessError::io(format!("resolving {}", dir.display()), e))?;
        Ok(Workspace {
            dir,
            db_name: db_name.to_string(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn script_paths(&self, prefix: &str, mode: IndexMode) -> ScriptPaths {
        ScriptPaths {
            load: self.dir.join(format!("{prefix}_{}_load.txt", mode.slug())),
            query: self.dir.join(format!("{prefix}_{}_query.txt", mode.slug())),
        }
    }

    /// Deletes every store file belonging to this database identifier so the
    /// next load starts from nothing. Returns the number of files removed.
    ///
    /// A file that cannot be removed is logged and skipped; the count check
    /// after the query phase catches any state it leaks into the run.
    pub fn clean_db_files(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| HarnessError::io(format!("listing {}", self.dir.display()), e))?;

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !is_db_file(name, &self.db_name) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    log::debug!("removed stale store file {name}");
                    removed += 1;
                }
                Err(e) => log::warn!("could not remove stale store file {name}: {e}"),
            }
        }
        Ok(removed)
    }
}

fn is_db_file(name: &str, db_name: &str) -> bool {
    name.starts_with(db_name) && DB_FILE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_files_match_prefix_and_extension() {
        assert!(is_db_file("acc_fuzz_db.teto", "acc_fuzz_db"));
        assert!(is_db_file("acc_fuzz_db_fuzz_table.btree", "acc_fuzz_db"));
        assert!(!is_db_file("acc_fuzz_db.log", "acc_fuzz_db"));
        assert!(!is_db_file("other.db", "acc_fuzz_db"));
    }

    #[test]
    fn clean_removes_only_store_files() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["bench_db.db", "bench_db.tmp", "bench_db_notes.txt", "keep.db"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        let ws = Workspace::prepare(tmp.path(), "bench_db").unwrap();

        assert_eq!(ws.clean_db_files().unwrap(), 2);
        assert!(tmp.path().join("bench_db_notes.txt").exists());
        assert!(tmp.path().join("keep.db").exists());
        assert!(!tmp.path().join("bench_db.db").exists());
    }

    #[test]
    fn script_paths_are_named_per_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::prepare(&tmp.path().join("nested"), "acc_fuzz_db").unwrap();
        let paths = ws.script_paths("fuzz", IndexMode::NoIndex);

        assert!(ws.dir().is_absolute());
        assert_eq!(paths.load.file_name().unwrap(), "fuzz_no_index_load.txt");
        assert_eq!(paths.query.file_name().unwrap(), "fuzz_no_index_query.txt");
    }
}
