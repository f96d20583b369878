//! Test case discovery
//!
//! A test case is identified by the canonical path of its backing file.
//! Everything else — the expectation file and the per-test modifiers —
//! is resolved from sibling marker files at discovery time and is
//! immutable afterward.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::expect::{find_expect_file, probed_suffixes, sibling, ExpectFile, Mode};

/// Errors raised while resolving a test case. These are configuration
/// errors: the run aborts before any test executes.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The test path could not be canonicalized.
    #[error("cannot resolve test path {path}: {source}")]
    Canonicalize {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No expectation file exists for the test.
    #[error("no expectation file for {test} (probed suffixes: {probed})")]
    MissingExpectation {
        /// Test path.
        test: PathBuf,
        /// Comma-joined suffixes that were probed.
        probed: String,
    },
}

/// An immutable, discovered test case.
#[derive(Debug, Clone)]
pub struct TestCase {
    path: PathBuf,
    expect: ExpectFile,
    serial: bool,
    no_server: bool,
    skipif: Option<PathBuf>,
}

impl TestCase {
    /// Resolve a test case from its backing file.
    ///
    /// Modifier marker files live beside the test: `<test>.serial` forces
    /// the test into the serial bucket, `<test>.noserver` keeps it off the
    /// long-lived server path, and `<test>.skipif` names a program whose
    /// non-empty output skips the test at run time.
    pub fn discover(path: &Path, mode: Mode) -> Result<Self, DiscoveryError> {
        let path = path
            .canonicalize()
            .map_err(|source| DiscoveryError::Canonicalize {
                path: path.to_path_buf(),
                source,
            })?;
        let expect =
            find_expect_file(&path, mode).ok_or_else(|| DiscoveryError::MissingExpectation {
                test: path.clone(),
                probed: probed_suffixes(mode).join(", "),
            })?;
        let skipif = Some(sibling(&path, "skipif")).filter(|p| p.is_file());
        Ok(TestCase {
            serial: sibling(&path, "serial").is_file(),
            no_server: sibling(&path, "noserver").is_file(),
            skipif,
            expect,
            path,
        })
    }

    /// Canonical path of the test file; this is the test's identity.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name (the canonical path, lossily decoded).
    pub fn name(&self) -> String {
        self.path.display().to_string()
    }

    /// The discovered expectation file.
    pub fn expect_file(&self) -> &ExpectFile {
        &self.expect
    }

    /// Whether the test must run in the dedicated serial bucket.
    pub fn is_serial(&self) -> bool {
        self.serial
    }

    /// Whether the test is incompatible with server-mode execution.
    pub fn is_server_incompatible(&self) -> bool {
        self.no_server
    }

    /// Skip-check program, if one exists beside the test.
    pub fn skipif(&self) -> Option<&Path> {
        self.skipif.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn fake(path: &str, serial: bool) -> Self {
        TestCase {
            path: PathBuf::from(path),
            expect: ExpectFile {
                path: PathBuf::from(format!("{path}.expect")),
                kind: crate::expect::ExpectKind::Exact,
            },
            serial,
            no_server: false,
            skipif: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expect::ExpectKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn discovers_modifiers_and_expectation() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("slow.t");
        std::fs::write(&test, "body").unwrap();
        std::fs::write(sibling(&test, "expect"), "ok").unwrap();
        std::fs::write(sibling(&test, "serial"), "").unwrap();
        std::fs::write(sibling(&test, "skipif"), "#!/bin/sh").unwrap();

        let case = TestCase::discover(&test, Mode::Runtime).unwrap();
        assert!(case.is_serial());
        assert!(!case.is_server_incompatible());
        assert!(case.skipif().is_some());
        assert_eq!(case.expect_file().kind, ExpectKind::Exact);
    }

    #[test]
    fn missing_expectation_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("orphan.t");
        std::fs::write(&test, "body").unwrap();

        let err = TestCase::discover(&test, Mode::Runtime).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no expectation file"), "{msg}");
        assert!(msg.contains("expectregex"), "{msg}");
    }
}
