//! Pass scheduling
//!
//! Triggers from the event stream are queued on a bounded channel consumed by
//! a single task, so passes run one at a time in arrival order. Triggers that
//! pile up while a pass runs are folded into one follow-up pass; every pass
//! recomputes the full desired set, so nothing is lost by dropping them.

use crate::reconciler::Reconciler;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Default capacity of the trigger queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Why a pass was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassTrigger {
    /// The event stream (re)connected; changes may have been missed.
    Connected { attempt: u64 },
    /// A relevant lifecycle event arrived.
    Lifecycle { action: String, source: String },
}

impl fmt::Display for PassTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassTrigger::Connected { attempt } => write!(f, "connected (#{attempt})"),
            PassTrigger::Lifecycle { action, source } => write!(f, "{action} {source}"),
        }
    }
}

/// Producer side of the trigger queue. Cheap to clone, never blocks.
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::Sender<PassTrigger>,
}

impl TriggerSender {
    /// Requests a pass. Returns false if the trigger was coalesced or the
    /// scheduler has stopped.
    pub fn notify(&self, trigger: PassTrigger) -> bool {
        match self.tx.try_send(trigger) {
            Ok(()) => true,
            Err(TrySendError::Full(trigger)) => {
                debug!(trigger = %trigger, "Pass already pending, coalescing trigger");
                false
            }
            Err(TrySendError::Closed(trigger)) => {
                warn!(trigger = %trigger, "Pass scheduler stopped, dropping trigger");
                false
            }
        }
    }
}

/// Single consumer running reconciliation passes.
pub struct PassScheduler {
    rx: mpsc::Receiver<PassTrigger>,
    reconciler: Arc<Reconciler>,
    passes: u64,
}

/// Creates a connected trigger sender and scheduler.
pub fn pass_queue(depth: usize, reconciler: Arc<Reconciler>) -> (TriggerSender, PassScheduler) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (
        TriggerSender { tx },
        PassScheduler {
            rx,
            reconciler,
            passes: 0,
        },
    )
}

impl PassScheduler {
    /// Runs passes until cancelled or every sender is dropped.
    ///
    /// Cancellation is observed only between passes. Returns the number of
    /// passes run.
    pub async fn run(mut self, cancel: CancellationToken) -> u64 {
        info!("Pass scheduler started");

        loop {
            let trigger = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                trigger = self.rx.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            let coalesced = self.drain_pending();
            self.run_pass(trigger, coalesced).await;
        }

        info!(passes = self.passes, "Pass scheduler stopped");
        self.passes
    }

    /// Discards queued triggers; the next pass covers them.
    fn drain_pending(&mut self) -> usize {
        let mut drained = 0;
        loop {
            match self.rx.try_recv() {
                Ok(_) => drained += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return drained,
            }
        }
    }

    async fn run_pass(&mut self, trigger: PassTrigger, coalesced: usize) {
        self.passes += 1;
        let span = tracing::info_span!("pass", seq = self.passes, trigger = %trigger);

        async {
            debug!(coalesced, "Starting reconciliation pass");
            match self.reconciler.run().await {
                Ok(report) if report.calls() == 0 => {
                    debug!(desired = report.desired, "Routes already in sync");
                }
                Ok(report) => info!(
                    desired = report.desired,
                    unchanged = report.unchanged,
                    published = report.published,
                    publish_failed = report.publish_failed,
                    withdrawn = report.withdrawn,
                    withdraw_failed = report.withdraw_failed,
                    "Reconciliation pass complete"
                ),
                Err(e) => warn!(
                    error = %e,
                    kind = ?e.kind(),
                    "Reconciliation pass failed, waiting for next trigger"
                ),
            }
        }
        .instrument(span)
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_display() {
        assert_eq!(
            PassTrigger::Connected { attempt: 2 }.to_string(),
            "connected (#2)"
        );
        let trigger = PassTrigger::Lifecycle {
            action: "instance-started".to_string(),
            source: "/1.0/instances/c1".to_string(),
        };
        assert_eq!(trigger.to_string(), "instance-started /1.0/instances/c1");
    }
}
