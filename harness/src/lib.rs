//! Differential accuracy tester and index benchmark for the TetoDB store.
//!
//! The store is driven as a black box: a load script is run by one process,
//! a query script by a second one against the same database identifier, and
//! the captured output is parsed back into result sets and latencies.
//!
//! * [`accuracy`] checks random selects against an in-memory ground truth.
//! * [`benchmark`] times the same workload without and with the key index.

pub mod accuracy;
pub mod benchmark;
pub mod config;
pub mod error;
pub mod ground_truth;
pub mod parser;
pub mod report;
pub mod runner;
pub mod script;
pub mod verify;
pub mod workload;
pub mod workspace;

pub use error::{HarnessError, Result};
