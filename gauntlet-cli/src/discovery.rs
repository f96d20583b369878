//! Test discovery
//!
//! Resolves the paths given on the command line into a deterministic,
//! sorted list of test cases. Directories are walked recursively; a file
//! inside a directory counts as a test only when an expectation file
//! exists beside it. A file named explicitly must have one, or the run
//! aborts before anything executes.

use std::path::{Path, PathBuf};

use anyhow::Context;

use gauntlet_core::{find_expect_file, probed_suffixes, Mode, TestCase};

/// Marker suffixes that make a file an annotation rather than a test.
const MARKER_SUFFIXES: &[&str] = &["serial", "noserver", "skipif"];

fn is_auxiliary_file(name: &str, mode: Mode) -> bool {
    probed_suffixes(mode)
        .iter()
        .chain(MARKER_SUFFIXES)
        .any(|suffix| name.ends_with(&format!(".{suffix}")))
}

/// Resolve command-line paths into test cases, sorted by path.
pub fn find_tests(paths: &[PathBuf], mode: Mode) -> anyhow::Result<Vec<TestCase>> {
    let mut tests = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk(path, mode, &mut tests)
                .with_context(|| format!("walking test directory {}", path.display()))?;
        } else {
            // An explicit file must resolve; silence here would hide a
            // typo as a green run.
            tests.push(TestCase::discover(path, mode)?);
        }
    }
    tests.sort_by(|a, b| a.path().cmp(b.path()));
    tests.dedup_by(|a, b| a.path() == b.path());
    Ok(tests)
}

fn walk(dir: &Path, mode: Mode, out: &mut Vec<TestCase>) -> anyhow::Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            walk(&path, mode, out)?;
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if is_auxiliary_file(name, mode) {
            continue;
        }
        if find_expect_file(&path, mode).is_some() {
            out.push(TestCase::discover(&path, mode)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn touch(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn directory_walk_finds_only_tests_with_expectations() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.t"), "test a");
        touch(&root.join("a.t.expect"), "out");
        touch(&root.join("orphan.t"), "no expectation");
        std::fs::create_dir(root.join("sub")).unwrap();
        touch(&root.join("sub/b.t"), "test b");
        touch(&root.join("sub/b.t.expectf"), "out %d");
        touch(&root.join("sub/b.t.serial"), "");

        let tests = find_tests(&[root.to_path_buf()], Mode::Runtime).unwrap();
        let names: Vec<String> = tests.iter().map(|t| t.name()).collect();
        assert_eq!(tests.len(), 2);
        assert!(names[0].ends_with("a.t"), "{names:?}");
        assert!(names[1].ends_with("b.t"), "{names:?}");
        assert!(tests[1].is_serial());
    }

    #[test]
    fn expectation_files_are_never_tests() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.t"), "test");
        touch(&root.join("a.t.expect"), "out");
        // The expectation file itself has no expectation of its own, but
        // it must be excluded by name, not by that accident.
        touch(&root.join("a.t.expect.expect"), "meta");

        let tests = find_tests(&[root.to_path_buf()], Mode::Runtime).unwrap();
        assert_eq!(tests.len(), 1);
    }

    #[test]
    fn explicit_file_without_expectation_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("lonely.t");
        touch(&test, "test");

        let err = find_tests(&[test], Mode::Runtime).unwrap_err();
        assert!(err.to_string().contains("expect"), "{err}");
    }

    #[test]
    fn duplicate_arguments_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let test = dir.path().join("a.t");
        touch(&test, "test");
        touch(&dir.path().join("a.t.expect"), "out");

        let tests =
            find_tests(&[test.clone(), dir.path().to_path_buf()], Mode::Runtime).unwrap();
        assert_eq!(tests.len(), 1);
    }
}
