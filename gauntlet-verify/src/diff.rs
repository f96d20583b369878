//! Failure-report diff generator
//!
//! A recursive longest-common-subsequence heuristic with a bounded
//! look-ahead budget. At each divergence it advances whichever cursor
//! re-synchronizes sooner within the budget, preferring the expected
//! side on ties. This is a diagnostic aid, not a correctness oracle:
//! the output is approximate by design.

use regex::{Regex, RegexBuilder};

/// Look-ahead budget at each point of divergence.
const LOOKAHEAD_STEPS: i32 = 10;

/// Compares actual lines against expected lines, where the expected side
/// may be regex fragments (one per line). Fragments are compiled once;
/// an invalid fragment never matches.
struct LineMatcher {
    regexes: Option<Vec<Option<Regex>>>,
}

impl LineMatcher {
    fn new(expected: &[String], pattern: bool) -> Self {
        let regexes = pattern.then(|| {
            expected
                .iter()
                .map(|line| {
                    RegexBuilder::new(&format!("^(?:{line})$"))
                        .dot_matches_new_line(true)
                        .build()
                        .ok()
                })
                .collect()
        });
        LineMatcher { regexes }
    }

    fn line_matches(&self, expected: &[String], idx: usize, actual: &str) -> bool {
        match &self.regexes {
            Some(compiled) => compiled[idx]
                .as_ref()
                .is_some_and(|re| re.is_match(actual)),
            None => expected[idx] == actual,
        }
    }
}

/// Count how many lines re-align from (idx1, idx2) within `steps`.
fn count_resync(
    matcher: &LineMatcher,
    expected: &[String],
    actual: &[&str],
    mut idx1: usize,
    mut idx2: usize,
    mut steps: i32,
) -> usize {
    let mut equal = 0;
    while idx1 < expected.len()
        && idx2 < actual.len()
        && matcher.line_matches(expected, idx1, actual[idx2])
    {
        idx1 += 1;
        idx2 += 1;
        equal += 1;
        steps -= 1;
    }
    steps -= 1;
    if steps > 0 {
        // Probe skipping expected lines with half the remaining budget,
        // actual lines with the full budget; keep the best re-sync.
        let mut best_expected = 0;
        let mut st = steps / 2;
        let mut ofs1 = idx1 + 1;
        while ofs1 < expected.len() && st > 0 {
            st -= 1;
            let eq = count_resync(matcher, expected, actual, ofs1, idx2, st);
            best_expected = best_expected.max(eq);
            ofs1 += 1;
        }

        let mut best_actual = 0;
        let mut st = steps;
        let mut ofs2 = idx2 + 1;
        while ofs2 < actual.len() && st > 0 {
            st -= 1;
            let eq = count_resync(matcher, expected, actual, idx1, ofs2, st);
            best_actual = best_actual.max(eq);
            ofs2 += 1;
        }

        if best_expected > best_actual {
            equal += best_expected;
        } else if best_actual > 0 {
            equal += best_actual;
        }
    }
    equal
}

fn removed_line(idx: usize, text: &str) -> String {
    format!("{:03}- {}", idx + 1, text)
}

fn added_line(idx: usize, text: &str) -> String {
    format!("{:03}+ {}", idx + 1, text)
}

/// Walk both sides, emitting annotated removed/added lines.
///
/// `display` carries the text shown for removed lines; it differs from
/// `expected` when the expected side is compiled regex source but the
/// raw expectation text is more readable.
fn diff_lines(
    expected: &[String],
    actual: &[&str],
    pattern: bool,
    display: &[String],
) -> Vec<String> {
    let matcher = LineMatcher::new(expected, pattern);
    let mut idx1 = 0;
    let mut idx2 = 0;
    let mut removed: Vec<(usize, String)> = Vec::new();
    let mut added: Vec<(usize, String)> = Vec::new();

    while idx1 < expected.len() && idx2 < actual.len() {
        if matcher.line_matches(expected, idx1, actual[idx2]) {
            idx1 += 1;
            idx2 += 1;
            continue;
        }
        let skip_expected = count_resync(
            &matcher,
            expected,
            actual,
            idx1 + 1,
            idx2,
            LOOKAHEAD_STEPS,
        );
        let skip_actual = count_resync(
            &matcher,
            expected,
            actual,
            idx1,
            idx2 + 1,
            LOOKAHEAD_STEPS,
        );

        if skip_expected > skip_actual {
            removed.push((idx1, removed_line(idx1, &display[idx1])));
            idx1 += 1;
        } else if skip_actual > 0 {
            added.push((idx2, added_line(idx2, actual[idx2])));
            idx2 += 1;
        } else {
            removed.push((idx1, removed_line(idx1, &display[idx1])));
            added.push((idx2, added_line(idx2, actual[idx2])));
            idx1 += 1;
            idx2 += 1;
        }
    }

    // Interleave removed and added runs so adjacent line numbers group.
    let mut diff = Vec::with_capacity(removed.len() + added.len());
    let mut i = 0;
    let mut j = 0;
    let mut last_removed: isize = -2;
    let mut last_added: isize = -2;
    while i < removed.len() || j < added.len() {
        let k1 = removed.get(i).map(|(k, _)| *k as isize);
        let k2 = added.get(j).map(|(k, _)| *k as isize);
        let take_removed = match (k1, k2) {
            (Some(_), None) => true,
            (None, _) => false,
            (Some(k1), Some(k2)) => {
                if k1 == last_removed + 1 {
                    true
                } else if k2 == last_added + 1 {
                    false
                } else {
                    k1 < k2
                }
            }
        };
        if take_removed {
            let (k, line) = &removed[i];
            last_removed = *k as isize;
            diff.push(line.clone());
            i += 1;
        } else {
            let (k, line) = &added[j];
            last_added = *k as isize;
            diff.push(line.clone());
            j += 1;
        }
    }

    while idx1 < expected.len() {
        diff.push(removed_line(idx1, &display[idx1]));
        idx1 += 1;
    }
    while idx2 < actual.len() {
        diff.push(added_line(idx2, actual[idx2]));
        idx2 += 1;
    }

    diff
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

/// Generate the annotated diff between an expectation and actual output.
///
/// `wanted` is the displayable expectation text. When `wanted_re` is
/// present the expected side is compiled regex source and each line is
/// matched as an anchored fragment; a repeat-wrapped `(...){n}` source is
/// expanded to n copies before diffing.
pub fn generate_diff(wanted: &str, wanted_re: Option<&str>, output: &str) -> String {
    let wanted_lines = split_lines(wanted);
    let actual: Vec<&str> = output.split('\n').collect();

    let (expected, display, pattern) = match wanted_re {
        None => (wanted_lines.clone(), wanted_lines, false),
        Some(source) => match repeat_wrapper(source) {
            Some((inner, n)) => {
                let inner_lines = split_lines(inner);
                let mut expected = Vec::with_capacity(inner_lines.len() * n);
                let mut repeated_wanted = Vec::with_capacity(wanted_lines.len() * n);
                for _ in 0..n {
                    expected.extend(inner_lines.iter().cloned());
                    repeated_wanted.extend(wanted_lines.iter().cloned());
                }
                let display = if wanted == source {
                    expected.clone()
                } else {
                    repeated_wanted
                };
                (expected, display, true)
            }
            None => (split_lines(source), wanted_lines, true),
        },
    };

    diff_lines(&expected, &actual, pattern, &display).join("\n")
}

/// Recognize a `(inner){n}` repeat wrapper around regex source.
fn repeat_wrapper(source: &str) -> Option<(&str, usize)> {
    let rest = source.strip_prefix('(')?;
    let (inner, count) = rest.rsplit_once("){")?;
    let n: usize = count.strip_suffix('}')?.parse().ok()?;
    Some((inner, n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_changed_line() {
        let diff = generate_diff("a\nb\nc", None, "a\nx\nc");
        let lines: Vec<&str> = diff.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.contains(&"002- b"), "{diff}");
        assert!(lines.contains(&"002+ x"), "{diff}");
    }

    #[test]
    fn unchanged_output_is_empty() {
        assert_eq!(generate_diff("a\nb", None, "a\nb"), "");
    }

    #[test]
    fn missing_expected_line() {
        let diff = generate_diff("a\nb\nc", None, "a\nc");
        assert_eq!(diff, "002- b");
    }

    #[test]
    fn extra_actual_line() {
        let diff = generate_diff("a\nc", None, "a\nb\nc");
        assert_eq!(diff, "002+ b");
    }

    #[test]
    fn trailing_tails_are_annotated() {
        let diff = generate_diff("a", None, "a\nb\nc");
        assert_eq!(diff, "002+ b\n003+ c");

        let diff = generate_diff("a\nb\nc", None, "a");
        assert_eq!(diff, "002- b\n003- c");
    }

    #[test]
    fn pattern_lines_match_as_fragments() {
        // Expected side is regex source, one fragment per line.
        let diff = generate_diff("x=\\d+\nend", Some("x=\\d+\nend"), "x=42\nend");
        assert_eq!(diff, "");

        let diff = generate_diff("x=\\d+\nend", Some("x=\\d+\nend"), "x=oops\nend");
        assert!(diff.contains("001- x=\\d+"), "{diff}");
        assert!(diff.contains("001+ x=oops"), "{diff}");
    }

    #[test]
    fn invalid_fragment_never_matches() {
        let diff = generate_diff("(", Some("("), "(");
        assert!(!diff.is_empty());
    }

    #[test]
    fn repeat_wrapper_expands_expected_side() {
        let source = r"(OK\s*){2}";
        let diff = generate_diff(r"OK\s*", Some(source), "OK\nOK");
        assert_eq!(diff, "");

        let diff = generate_diff(r"OK\s*", Some(source), "OK");
        assert!(diff.contains('-'), "{diff}");
    }

    #[test]
    fn repeat_wrapper_parser() {
        assert_eq!(repeat_wrapper("(abc){3}"), Some(("abc", 3)));
        assert_eq!(repeat_wrapper("(a\nb){2}"), Some(("a\nb", 2)));
        assert_eq!(repeat_wrapper("plain"), None);
        assert_eq!(repeat_wrapper("(abc){x}"), None);
    }
}
