//! Pass/fail decision for one captured execution.

use gauntlet_core::{ExecutionResult, Expectation, PassDetail, Verdict};
use regex::RegexBuilder;

use crate::diff::generate_diff;
use crate::pattern::{compile_pattern, normalize_newlines};

/// Output sentinel that forces a pass regardless of the expectation.
/// Lets a test decide at run time that its environment makes the real
/// assertion meaningless.
pub const FORCE_PASS: &str = "FORCE PASS";

/// Skip reason recorded when a repeat-wrapped expectation fails to
/// compile as a regex.
const SKIP_REPEATS: &str = "repeats-fail";

/// Decide the verdict for one execution against its expectation.
///
/// Anything on stderr fails the test outright. Otherwise both sides are
/// trimmed and compared per the expectation grammar; a nonzero `repeats`
/// wraps the compiled source so one persistent process may emit the
/// expected output that many times back to back.
pub fn verify(result: &ExecutionResult, expectation: &Expectation, repeats: u32) -> Verdict {
    if !result.stderr.trim().is_empty() {
        return Verdict::Failed(format!(
            "Test failed because the process wrote on stderr:\n{}",
            result.stderr.trim_end()
        ));
    }

    let output = result.stdout.trim();
    if output == FORCE_PASS {
        return Verdict::Passed(PassDetail::Fresh);
    }

    match expectation {
        Expectation::Exact(wanted) => {
            let wanted = wanted.trim();
            if repeats > 0 {
                // The repeated form routes through the regex engine, so
                // the literal text is quoted first. Placeholder tokens in
                // an exact expectation stay literal.
                match_compiled(&regex::escape(wanted), output, repeats)
            } else if wanted == output {
                Verdict::Passed(PassDetail::Fresh)
            } else {
                Verdict::Failed(generate_diff(wanted, None, output))
            }
        }
        Expectation::Pattern(wanted) => {
            let wanted = normalize_newlines(wanted.trim());
            let output = normalize_newlines(output);
            match_compiled(&compile_pattern(&wanted), &output, repeats)
        }
        Expectation::Regex(wanted) => {
            let output = normalize_newlines(output);
            match_compiled(wanted.trim(), &output, repeats)
        }
    }
}

/// Match compiled regex source against the full output, with repeat
/// wrapping and the line-diff fallback.
fn match_compiled(source: &str, output: &str, repeats: u32) -> Verdict {
    let source = if repeats > 0 {
        format!(r"({source}\s*){{{repeats}}}")
    } else {
        source.to_string()
    };

    let compiled = RegexBuilder::new(&format!("^(?:{source})$"))
        .dot_matches_new_line(true)
        .build();
    match compiled {
        Ok(re) if re.is_match(output) => Verdict::Passed(PassDetail::Fresh),
        Err(_) if repeats > 0 => Verdict::skipped(SKIP_REPEATS),
        // A non-matching or uncompilable source falls through to the
        // line diff. An empty diff means every line matched its fragment
        // even though the whole-output match failed; that counts as a
        // pass rather than an unactionable empty report.
        _ => {
            let diff = generate_diff(&source, Some(&source), output);
            if diff.is_empty() {
                Verdict::Passed(PassDetail::Fresh)
            } else {
                Verdict::Failed(diff)
            }
        }
    }
}
