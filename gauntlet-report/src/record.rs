//! Run Record Data Structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version bumped whenever the artifact layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete results artifact for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
    /// One record per discovered test, in completion order.
    pub records: Vec<TestRecord>,
}

impl RunReport {
    /// Wrap finished records with current metadata.
    pub fn new(records: Vec<TestRecord>) -> Self {
        RunReport {
            schema_version: SCHEMA_VERSION,
            timestamp: Utc::now(),
            records,
        }
    }
}

/// Final outcome of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    /// Excluded before execution; never dispatched to a worker.
    NotRelevant,
}

/// Individual test result in the artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRecord {
    /// Test path relative to the suite root.
    pub name: String,
    pub status: TestStatus,
    /// Unix seconds when the test started.
    pub start_time: i64,
    /// Unix seconds when the test finished.
    pub end_time: i64,
    /// Elapsed wall-clock seconds, fractional.
    pub time: f64,
    /// Diff text for failures, skip reason for skips.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
