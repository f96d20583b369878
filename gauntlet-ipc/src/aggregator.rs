//! Status Aggregator
//!
//! Single consumer of the status channel. All counters live here and
//! nowhere else; workers only emit events. The aggregator runs until it
//! sees `Finished`, every sender hangs up, or a shutdown request arrives
//! while the channel is idle.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use gauntlet_report::{TestRecord, Totals};

use crate::channel::shutdown_requested;
use crate::events::StatusEvent;

/// How often the idle channel is re-checked for a shutdown request.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Aggregator presentation options.
#[derive(Debug, Clone, Default)]
pub struct AggregatorOptions {
    /// Draw a progress bar; disabled for verbose and non-tty output.
    pub progress: bool,
}

/// Everything the aggregator accumulated over one run.
#[derive(Debug, Default)]
pub struct AggregateStatus {
    /// Finished records in arrival order.
    pub records: Vec<TestRecord>,
    /// Server crash/respawn cycles observed.
    pub server_restarts: usize,
    /// The run was cut short by a shutdown request.
    pub interrupted: bool,
}

impl AggregateStatus {
    /// Tally the accumulated records.
    pub fn totals(&self) -> Totals {
        Totals::from_records(&self.records)
    }
}

fn progress_bar(queued: usize) -> ProgressBar {
    let pb = ProgressBar::new(queued as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Drain the status channel until the run ends.
pub fn aggregate(rx: &Receiver<StatusEvent>, options: &AggregatorOptions) -> AggregateStatus {
    let mut status = AggregateStatus::default();
    let mut bar: Option<ProgressBar> = None;
    let mut failed = 0usize;

    loop {
        let event = match rx.recv_timeout(IDLE_POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                if shutdown_requested() {
                    status.interrupted = true;
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match event {
            StatusEvent::Started { queued } => {
                debug!(queued, "run started");
                if options.progress {
                    bar = Some(progress_bar(queued));
                }
            }
            StatusEvent::Finished => break,
            StatusEvent::ServerRestarted { config_id } => {
                status.server_restarts += 1;
                warn!(%config_id, "server crashed mid-run, respawned");
            }
            StatusEvent::TestPassed(record) => {
                debug!(test = %record.name, "passed");
                finish_one(&mut status, &bar, record, failed);
            }
            StatusEvent::TestSkipped(record) => {
                debug!(test = %record.name, reason = ?record.details, "skipped");
                finish_one(&mut status, &bar, record, failed);
            }
            StatusEvent::TestFailed(record) => {
                failed += 1;
                let report = format!(
                    "FAILED: {}\n{}",
                    record.name,
                    record.details.as_deref().unwrap_or("")
                );
                match &bar {
                    Some(bar) => bar.suspend(|| eprintln!("{report}")),
                    None => eprintln!("{report}"),
                }
                finish_one(&mut status, &bar, record, failed);
            }
        }
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    status
}

fn finish_one(
    status: &mut AggregateStatus,
    bar: &Option<ProgressBar>,
    record: TestRecord,
    failed: usize,
) {
    if let Some(bar) = bar {
        bar.inc(1);
        if failed > 0 {
            bar.set_message(format!("{failed} failed"));
        }
    }
    status.records.push(record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{request_shutdown, reset_shutdown, status_channel};
    use gauntlet_report::TestStatus;
    use pretty_assertions::assert_eq;

    fn record(name: &str, status: TestStatus, details: Option<&str>) -> TestRecord {
        TestRecord {
            name: name.to_string(),
            status,
            start_time: 0,
            end_time: 0,
            time: 0.5,
            details: details.map(str::to_string),
        }
    }

    #[test]
    fn counters_survive_interleaved_senders() {
        let (tx, rx) = status_channel();
        tx.send(StatusEvent::Started { queued: 30 });

        let handles: Vec<_> = (0..3)
            .map(|worker| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        let name = format!("w{worker}/t{i}");
                        let event = if i % 3 == 0 {
                            StatusEvent::TestFailed(record(
                                &name,
                                TestStatus::Failed,
                                Some("diff"),
                            ))
                        } else {
                            StatusEvent::TestPassed(record(&name, TestStatus::Passed, None))
                        };
                        tx.send(event);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        tx.finish();

        let status = aggregate(&rx, &AggregatorOptions::default());
        let totals = status.totals();
        assert_eq!(status.records.len(), 30);
        assert_eq!(totals.failed, 12);
        assert_eq!(totals.passed, 18);
        assert!(!status.interrupted);
    }

    #[test]
    fn skip_reasons_feed_the_histogram() {
        let (tx, rx) = status_channel();
        tx.send(StatusEvent::TestSkipped(record(
            "a",
            TestStatus::Skipped,
            Some("skipif"),
        )));
        tx.send(StatusEvent::TestSkipped(record(
            "b",
            TestStatus::Skipped,
            Some("skipif"),
        )));
        tx.send(StatusEvent::ServerRestarted {
            config_id: "default".to_string(),
        });
        tx.finish();

        let status = aggregate(&rx, &AggregatorOptions::default());
        assert_eq!(status.server_restarts, 1);
        assert_eq!(status.totals().skip_reasons.get("skipif"), Some(&2));
    }

    #[test]
    fn shutdown_request_interrupts_an_idle_run() {
        reset_shutdown();
        let (tx, rx) = status_channel();
        tx.send(StatusEvent::TestPassed(record("a", TestStatus::Passed, None)));
        request_shutdown();

        // No Finished event: the aggregator drains what is queued, then
        // notices the shutdown flag on its idle poll.
        let status = aggregate(&rx, &AggregatorOptions::default());
        reset_shutdown();

        assert_eq!(status.records.len(), 1);
        assert!(status.interrupted);
    }
}
