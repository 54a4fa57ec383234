//! Error taxonomy for the harness library.
//!
//! Per-query mismatches are not errors: they are data carried by
//! [`crate::verify::Verdict`]. Everything here aborts at least one test mode.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// The store binary does not exist. Raised before any test runs.
    #[error("store executable not found: {}", .0.display())]
    StoreMissing(PathBuf),

    /// Ground truth or workload generation was asked for zero rows.
    #[error("key universe is empty; row count must be at least 1")]
    EmptyKeyUniverse,

    /// The store process could not be started at all.
    #[error("failed to spawn {}: {source}", exe.display())]
    Spawn {
        exe: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The load phase exited with a failure status.
    #[error("Load process crashed! ({status})")]
    LoadCrashed { status: String, stderr: String },

    /// A select follows a delete, so its expectation cannot be computed from
    /// the unmutated ground truth.
    #[error("select #{position} follows a delete; only selects issued before any mutation can be verified")]
    MutatingWorkload { position: usize },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl HarnessError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        HarnessError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
