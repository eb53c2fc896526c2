//! Recurring-task scheduler
//!
//! Drives a reconciler on fixed-interval ticks. Missed ticks are skipped
//! rather than queued, so a slow cycle never causes a burst of catch-up
//! cycles; combined with the reconcilers' internal cycle locks this enforces
//! at-most-one concurrent cycle per reconciler.
//!
//! Shutdown is a `watch` channel flipped to `true`; it is honored between
//! cycles (and forwarded into cycles that take checkpoints). A closed
//! channel counts as shutdown, since nobody can signal it anymore. Only a fatal
//! error from the task terminates the loop early; every other cycle error
//! is logged and the next tick proceeds.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::IntervalStream;
use tracing::{error, info, warn};

use crate::error::Result;

/// A named periodic task with a cooperative shutdown signal
pub struct RecurringTask {
    name: &'static str,
    interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl RecurringTask {
    pub fn new(name: &'static str, interval: Duration, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            name,
            interval,
            shutdown_rx,
        }
    }

    /// Run the task on every tick until shutdown or a fatal error
    ///
    /// The first tick fires immediately. Returns `Ok(())` on clean shutdown
    /// and `Err` only when the task reported a fatal condition.
    pub async fn run<F, Fut>(mut self, task: F) -> Result<()>
    where
        F: Fn(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = IntervalStream::new(interval);

        info!(task = self.name, interval_secs = self.interval.as_secs(), "recurring task started");

        loop {
            tokio::select! {
                Some(_) = ticks.next() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                    match task(self.shutdown_rx.clone()).await {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            error!(task = self.name, "fatal error, stopping scheduler: {}", e);
                            return Err(e);
                        }
                        Err(e) => {
                            // Retryable by the next scheduled cycle
                            warn!(task = self.name, "cycle failed: {}", e);
                        }
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    // A dropped sender can never signal shutdown; treat the
                    // closed channel as one instead of spinning on it.
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!(task = self.name, "recurring task stopped");
        Ok(())
    }
}
