//! Verdicts
//!
//! Tri-state outcome of one test invocation.

/// How a passing test actually ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassDetail {
    /// Fresh process per invocation.
    Fresh,
    /// Served by a long-lived server instance.
    Server,
    /// Server path failed; the fresh-process fallback passed.
    ServerFallback,
}

/// Outcome of one test invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Output matched the expectation.
    Passed(PassDetail),
    /// The test was not run; the reason feeds the skip histogram.
    Skipped(String),
    /// Output mismatched; carries the diff artifact.
    Failed(String),
}

impl Verdict {
    /// Convenience for exit-code computation.
    pub fn is_failed(&self) -> bool {
        matches!(self, Verdict::Failed(_))
    }

    /// Build a skip verdict from a static reason.
    pub fn skipped(reason: &str) -> Self {
        Verdict::Skipped(reason.to_string())
    }
}
