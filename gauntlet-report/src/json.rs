//! JSON Artifact I/O

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::record::RunReport;

/// Reading or writing the results artifact failed.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("couldn't access results file: {0}")]
    Io(#[from] std::io::Error),

    #[error("results file is not a valid report: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Generate the prettified JSON artifact.
pub fn render_json_report(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

/// Write the artifact to `path`.
pub fn write_json_report(path: &Path, report: &RunReport) -> Result<(), ArtifactError> {
    fs::write(path, render_json_report(report)?)?;
    Ok(())
}

/// Load a previously written artifact, for replay.
pub fn load_json_report(path: &Path) -> Result<RunReport, ArtifactError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}
