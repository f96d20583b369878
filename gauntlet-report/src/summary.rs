//! Terminal Summary
//!
//! Renders the end-of-run digest from finished records. The same code
//! serves a live run and replay of a saved artifact, so it derives
//! everything from the records rather than live counters.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::record::{TestRecord, TestStatus};

/// Aggregated counts over one run's records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Totals {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_relevant: usize,
    /// Skip-reason histogram, keyed by reason.
    pub skip_reasons: BTreeMap<String, usize>,
    /// Names of failed tests, in completion order.
    pub failed_tests: Vec<String>,
    /// Total wall-clock seconds spent inside tests.
    pub test_time: f64,
}

impl Totals {
    /// Tally records into counts.
    pub fn from_records(records: &[TestRecord]) -> Self {
        let mut totals = Totals::default();
        for record in records {
            totals.test_time += record.time;
            match record.status {
                TestStatus::Passed => totals.passed += 1,
                TestStatus::Failed => {
                    totals.failed += 1;
                    totals.failed_tests.push(record.name.clone());
                }
                TestStatus::Skipped => {
                    totals.skipped += 1;
                    let reason = record.details.as_deref().unwrap_or("unspecified");
                    *totals.skip_reasons.entry(reason.to_string()).or_default() += 1;
                }
                // Pre-execution skips; their reasons still belong in the
                // histogram.
                TestStatus::NotRelevant => {
                    totals.not_relevant += 1;
                    let reason = record.details.as_deref().unwrap_or("unspecified");
                    *totals.skip_reasons.entry(reason.to_string()).or_default() += 1;
                }
            }
        }
        totals
    }

    /// Count of tests that reached a worker at all.
    pub fn executed(&self) -> usize {
        self.passed + self.failed + self.skipped + self.not_relevant
    }

    /// Skips of both kinds, for display.
    pub fn skipped_like(&self) -> usize {
        self.skipped + self.not_relevant
    }

    /// Process exit code for these totals. Any failure is nonzero; a run
    /// that executed nothing is reported as a failure upstream, before
    /// totals exist.
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failed > 0)
    }
}

/// Render the human-readable digest.
pub fn render_summary(totals: &Totals) -> String {
    let mut out = String::new();

    if totals.executed() == 0 {
        out.push_str("No tests executed.\n");
        return out;
    }
    if totals.passed == 0 && totals.failed == 0 {
        out.push_str("All tests were skipped.\n");
    } else if totals.failed == 0 {
        let _ = writeln!(out, "All tests passed.");
    } else {
        let _ = writeln!(out, "{} test(s) failed:", totals.failed);
        for name in &totals.failed_tests {
            let _ = writeln!(out, "  {name}");
        }
    }

    let _ = writeln!(
        out,
        "Total: {} passed, {} failed, {} skipped ({:.1}s of test time)",
        totals.passed,
        totals.failed,
        totals.skipped_like(),
        totals.test_time
    );
    if !totals.skip_reasons.is_empty() {
        out.push_str("Skip reasons:\n");
        for (reason, count) in &totals.skip_reasons {
            let _ = writeln!(out, "  {reason}: {count}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(name: &str, status: TestStatus, details: Option<&str>) -> TestRecord {
        TestRecord {
            name: name.to_string(),
            status,
            start_time: 0,
            end_time: 1,
            time: 1.0,
            details: details.map(str::to_string),
        }
    }

    #[test]
    fn totals_tally_by_status() {
        let records = vec![
            record("a", TestStatus::Passed, None),
            record("b", TestStatus::Failed, Some("diff")),
            record("c", TestStatus::Skipped, Some("skipif")),
            record("d", TestStatus::Skipped, Some("skipif")),
            record("e", TestStatus::NotRelevant, None),
        ];
        let totals = Totals::from_records(&records);
        assert_eq!(totals.passed, 1);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.skipped, 2);
        assert_eq!(totals.not_relevant, 1);
        assert_eq!(totals.skip_reasons.get("skipif"), Some(&2));
        assert_eq!(totals.failed_tests, ["b"]);
        assert_eq!(totals.exit_code(), 1);
    }

    #[test]
    fn summary_names_failed_tests() {
        let totals = Totals::from_records(&[
            record("good", TestStatus::Passed, None),
            record("bad/one.t", TestStatus::Failed, Some("diff")),
        ]);
        let text = render_summary(&totals);
        assert!(text.contains("1 test(s) failed"), "{text}");
        assert!(text.contains("bad/one.t"), "{text}");
    }

    #[test]
    fn all_skipped_is_not_success_prose() {
        let totals = Totals::from_records(&[record("a", TestStatus::Skipped, Some("server"))]);
        let text = render_summary(&totals);
        assert!(text.contains("All tests were skipped"), "{text}");
        assert_eq!(totals.exit_code(), 0);
    }

    #[test]
    fn zero_records_render_distinctly() {
        let totals = Totals::from_records(&[]);
        assert_eq!(render_summary(&totals), "No tests executed.\n");
    }

    #[test]
    fn clean_run_passes() {
        let totals = Totals::from_records(&[record("a", TestStatus::Passed, None)]);
        assert!(render_summary(&totals).contains("All tests passed"));
        assert_eq!(totals.exit_code(), 0);
    }
}
