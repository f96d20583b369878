//! Per-test advisory lock
//!
//! An exclusive `flock` on the test's backing file, so two runner
//! processes sharing a checkout never execute the same test at once.
//! The lock rides the open file description and drops with the handle.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Held exclusive lock on one test file.
#[derive(Debug)]
pub struct TestLock {
    file: File,
}

impl TestLock {
    /// Acquire the lock, blocking until it is free.
    pub fn acquire(path: &Path) -> io::Result<TestLock> {
        let file = File::open(path)?;
        flock(&file, libc::LOCK_EX)?;
        Ok(TestLock { file })
    }

    /// Acquire without blocking; `None` when another holder has it.
    pub fn try_acquire(path: &Path) -> io::Result<Option<TestLock>> {
        let file = File::open(path)?;
        match flock(&file, libc::LOCK_EX | libc::LOCK_NB) {
            Ok(()) => Ok(Some(TestLock { file })),
            Err(e) if e.raw_os_error() == Some(libc::EWOULDBLOCK) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for TestLock {
    fn drop(&mut self) {
        let _ = flock(&self.file, libc::LOCK_UN);
    }
}

fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    let ret = unsafe { libc::flock(file.as_raw_fd(), operation) };
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
