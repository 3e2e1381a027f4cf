//! Supervised fan-out for inbound message handling.
//!
//! Every inbound message becomes one unit of work on a shared
//! [`TaskTracker`]. The receive loop never waits on a unit; a failing or
//! panicking unit is logged and counted, and nothing else is affected. There is
//! no queue limit: sustained inbound volume grows the in-flight set without
//! bound.

use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug, Default)]
pub struct TaskSupervisor {
    tracker: TaskTracker,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `unit` and returns immediately.
    ///
    /// The unit removes itself from the in-flight set when it finishes,
    /// whatever the outcome. `label` is attached to every log line about it.
    pub fn dispatch<F, E>(&self, label: impl Into<String>, unit: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let label = label.into();
        let completed = self.completed.clone();
        let failed = self.failed.clone();

        self.tracker.spawn(async move {
            match AssertUnwindSafe(unit).catch_unwind().await {
                Ok(Ok(())) => {
                    completed.fetch_add(1, Ordering::Relaxed);
                    debug!("Finished processing {}", label);
                }
                Ok(Err(e)) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    error!("Error processing {}: {}", label, e);
                }
                Err(panic) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    error!("Panic while processing {}: {}", label, panic_message(&*panic));
                }
            }
        });
    }

    /// Number of units that have been dispatched and not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Waits until every dispatched unit has finished.
    ///
    /// Units dispatched while waiting are still waited for.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stops waiting after `grace`. Returns `true` if everything drained.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let outstanding = self.in_flight();
        info!("Draining {} in-flight message units", outstanding);
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "{} message units still running after {}s grace period",
                    self.in_flight(),
                    grace.as_secs()
                );
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
