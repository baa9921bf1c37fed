//! Result types produced by cwcheck test runners
//!
//! A runner produces exactly one [`TestGroupResult`] holding one
//! [`TestResult`] per measured metric, in the order the runner measured them.
//! These types are the surface consumed by external reporters and are
//! serialized as JSON.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Terminal status of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The check held
    Passed,
    /// The check did not hold, or could not be evaluated
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Passed => write!(f, "PASSED"),
            Status::Failed => write!(f, "FAILED"),
        }
    }
}

/// Outcome of one check, usually one metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Name of the check, typically the metric name
    pub name: String,
    /// Final status
    pub status: Status,
}

impl TestResult {
    /// Create a passing result
    #[must_use]
    pub fn passed<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            status: Status::Passed,
        }
    }

    /// Create a failing result
    #[must_use]
    pub fn failed<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            status: Status::Failed,
        }
    }
}

/// The ordered results of one runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestGroupResult {
    /// Name of the runner
    pub name: String,
    /// Per-check results, in measurement order
    #[serde(rename = "test_results")]
    pub results: Vec<TestResult>,
}

impl TestGroupResult {
    /// Returns true if every result in the group passed
    ///
    /// An empty group has nothing that passed and is reported as failed.
    #[must_use]
    pub fn passed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| r.status == Status::Passed)
    }

    /// Number of failed results in the group
    #[must_use]
    pub fn failures(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == Status::Failed)
            .count()
    }
}
