#![warn(missing_docs)]
//! Gauntlet Verification Engine
//!
//! Decides pass/fail for one captured execution against a recorded
//! expectation, and renders a line-level diff for failure reports.
//!
//! Three expectation grammars are supported: exact text, `%`-placeholder
//! patterns compiled to regular expressions, and raw regular expressions
//! anchored to the full trimmed output. A repeat count wraps the compiled
//! source to account for one persistent process emitting the expected
//! output n times back to back.

mod diff;
mod pattern;
mod verify;

pub use diff::generate_diff;
pub use pattern::{compile_pattern, normalize_newlines};
pub use verify::{verify, FORCE_PASS};
