//! Status Event Types
//!
//! Everything a worker may tell the aggregator. Events carry complete
//! records rather than deltas, so the aggregator is the only holder of
//! counters and a lost sender can never corrupt a tally. The types are
//! serde-serializable so the channel transport can become a pipe without
//! touching the protocol.

use gauntlet_report::TestRecord;
use serde::{Deserialize, Serialize};

/// Messages sent from workers to the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StatusEvent {
    /// Dispatch is about to begin; carries the number of tests queued.
    Started {
        /// Tests that will be dispatched to workers.
        queued: usize,
    },

    /// All workers finished and no more events will follow.
    Finished,

    /// A server instance crashed mid-run and was respawned.
    ServerRestarted {
        /// Identifier of the configuration whose server crashed.
        config_id: String,
    },

    /// One test reached a verdict.
    TestPassed(TestRecord),
    /// One test was skipped; the record's details carry the reason.
    TestSkipped(TestRecord),
    /// One test failed; the record's details carry the diff.
    TestFailed(TestRecord),
}

impl StatusEvent {
    /// The finished record inside a per-test event, if this is one.
    pub fn record(&self) -> Option<&TestRecord> {
        match self {
            StatusEvent::TestPassed(r)
            | StatusEvent::TestSkipped(r)
            | StatusEvent::TestFailed(r) => Some(r),
            _ => None,
        }
    }
}
