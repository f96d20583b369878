#![warn(missing_docs)]
//! Gauntlet Core
//!
//! Data model shared by every part of the conformance-test runner:
//! test cases and their expectation files, per-test modifiers, the
//! executor collaborator seam, verdicts, and the bucketizer that
//! partitions a test list across worker slots.

mod bucket;
mod executor;
mod expect;
mod test_case;
mod verdict;

pub use bucket::{bucketize, Bucket};
pub use executor::{ExecError, ExecutionResult, Invocation, TestExecutor};
pub use expect::{find_expect_file, probed_suffixes, ExpectFile, ExpectKind, Expectation, Mode};
pub use test_case::{DiscoveryError, TestCase};
pub use verdict::{PassDetail, Verdict};
