//! Expectation files
//!
//! Each test records its correct output in a sibling file found by suffix
//! convention. Three grammars exist: exact text, a pattern with `%`
//! placeholders, and a raw regular expression. Discovery order is fixed
//! and the first existing suffix wins.

use std::io;
use std::path::{Path, PathBuf};

/// Which harness the executable under test implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// A language runtime invoked once per test file.
    #[default]
    Runtime,
    /// A type-checking service invoked against a fixture directory.
    Typechecker,
}

/// Grammar of an expectation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectKind {
    /// Trimmed byte-for-byte equality.
    Exact,
    /// Text with `%` placeholder tokens, compiled to a regex.
    Pattern,
    /// A regular expression used verbatim, anchored to the full output.
    Regex,
}

/// A discovered expectation file beside a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectFile {
    /// Path of the expectation file.
    pub path: PathBuf,
    /// Grammar the file is written in.
    pub kind: ExpectKind,
}

/// Loaded expectation contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// Exact output text.
    Exact(String),
    /// Placeholder-pattern text.
    Pattern(String),
    /// Raw regular expression text.
    Regex(String),
}

impl Expectation {
    /// Read the contents of an expectation file.
    pub fn load(file: &ExpectFile) -> io::Result<Self> {
        let text = std::fs::read_to_string(&file.path)?;
        Ok(match file.kind {
            ExpectKind::Exact => Expectation::Exact(text),
            ExpectKind::Pattern => Expectation::Pattern(text),
            ExpectKind::Regex => Expectation::Regex(text),
        })
    }
}

const RUNTIME_SUFFIXES: &[(&str, ExpectKind)] = &[
    ("expect", ExpectKind::Exact),
    ("expectf", ExpectKind::Pattern),
    ("expectregex", ExpectKind::Regex),
];

const TYPECHECKER_SUFFIXES: &[(&str, ExpectKind)] = &[
    ("typechecker.expect", ExpectKind::Exact),
    ("typechecker.expectf", ExpectKind::Pattern),
];

fn suffix_table(mode: Mode) -> &'static [(&'static str, ExpectKind)] {
    match mode {
        Mode::Runtime => RUNTIME_SUFFIXES,
        Mode::Typechecker => TYPECHECKER_SUFFIXES,
    }
}

/// Locate the expectation file for `test`, first existing suffix wins.
pub fn find_expect_file(test: &Path, mode: Mode) -> Option<ExpectFile> {
    for (suffix, kind) in suffix_table(mode) {
        let candidate = sibling(test, suffix);
        if candidate.is_file() {
            return Some(ExpectFile {
                path: candidate,
                kind: *kind,
            });
        }
    }
    None
}

/// Suffixes probed for `mode`, for diagnostics when none exists.
pub fn probed_suffixes(mode: Mode) -> Vec<&'static str> {
    suffix_table(mode).iter().map(|(s, _)| *s).collect()
}

/// `<test>.<suffix>` next to the test file.
pub(crate) fn sibling(test: &Path, suffix: &str) -> PathBuf {
    let mut name = test.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
