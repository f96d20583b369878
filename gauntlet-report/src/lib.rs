#![warn(missing_docs)]
//! Gauntlet Report - Results Artifact and Summaries
//!
//! Owns the per-test record shape, the JSON results artifact written at
//! the end of a run, and the terminal digest rendered both live and when
//! replaying a saved artifact.

mod json;
mod record;
mod summary;

pub use json::{load_json_report, render_json_report, write_json_report, ArtifactError};
pub use record::{RunReport, TestRecord, TestStatus, SCHEMA_VERSION};
pub use summary::{render_summary, Totals};
