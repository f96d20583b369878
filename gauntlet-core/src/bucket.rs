//! Bucketizer
//!
//! Partitions the test list into one ordered bucket per worker slot.
//! Round-robin assignment keeps results arriving in approximately the
//! discovery order. Serial-only tests are pulled out into a single
//! dedicated bucket; when any exist, one slot is reserved for it by
//! shrinking the parallel slot count.

use crate::test_case::TestCase;

/// A statically assigned, ordered subset of tests run by one worker.
#[derive(Debug)]
pub struct Bucket {
    /// Worker slot index the bucket is pinned to.
    pub slot: usize,
    /// Whether this is the dedicated serial bucket.
    pub serial: bool,
    /// Tests in execution order.
    pub tests: Vec<TestCase>,
}

/// Partition `tests` across at most `slots` worker slots.
///
/// Non-serial tests land in bucket `i % parallel_slots` in input order.
/// With serial tests present, `parallel_slots = slots - 1` and the serial
/// bucket takes the next unused slot index when the parallel buckets were
/// not all filled, otherwise the last slot.
///
/// Zero tests yield zero buckets; the caller must treat that as a
/// configuration error, not a passing run.
pub fn bucketize(tests: Vec<TestCase>, slots: usize) -> Vec<Bucket> {
    if tests.is_empty() {
        return Vec::new();
    }
    let slots = slots.clamp(1, tests.len());

    let has_serial = tests.iter().any(TestCase::is_serial);
    let has_parallel = tests.iter().any(|t| !t.is_serial());
    let parallel_slots = if has_serial {
        // Reserve one slot for the serial bucket, but never starve the
        // parallel tests entirely when only one slot was requested.
        (slots - 1).max(usize::from(has_parallel))
    } else {
        slots
    };

    let mut parallel: Vec<Vec<TestCase>> = vec![Vec::new(); parallel_slots];
    let mut serial: Vec<TestCase> = Vec::new();
    let mut next = 0usize;
    let mut non_serial = 0usize;
    for test in tests {
        if test.is_serial() {
            serial.push(test);
        } else {
            parallel[next].push(test);
            next = (next + 1) % parallel_slots;
            non_serial += 1;
        }
    }

    let mut buckets: Vec<Bucket> = parallel
        .into_iter()
        .enumerate()
        .filter(|(_, tests)| !tests.is_empty())
        .map(|(slot, tests)| Bucket {
            slot,
            serial: false,
            tests,
        })
        .collect();

    if !serial.is_empty() {
        // Underfilled parallel buckets leave `next` pointing at the first
        // unused slot; otherwise the reserved slot is the last one.
        let slot = if non_serial < parallel_slots {
            next
        } else {
            slots - 1
        };
        buckets.push(Bucket {
            slot,
            serial: true,
            tests: serial,
        });
    }

    buckets
}
