#![warn(missing_docs)]
//! Gauntlet Status Protocol
//!
//! Cross-worker status reporting: the event vocabulary, the channel the
//! events travel over, and the aggregator that owns every counter. The
//! design invariant is single ownership: workers observe, the aggregator
//! counts, and nothing is double-counted when a worker dies mid-bucket.

mod aggregator;
mod channel;
mod events;

pub use aggregator::{aggregate, AggregateStatus, AggregatorOptions};
pub use channel::{request_shutdown, shutdown_requested, status_channel, StatusSender};
pub use events::StatusEvent;
