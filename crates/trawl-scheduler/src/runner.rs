//! Bounded-concurrency task runner.
//!
//! Tasks are polled cooperatively from a single `FuturesUnordered` set, so
//! "concurrent" means interleaved on the caller's task rather than spread
//! across worker threads.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, error};

/// A unit of work for the runner.
///
/// The task is responsible for logging its own failure; the runner only
/// counts it.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

type Settled = Result<Result<(), String>, Box<dyn Any + Send>>;

/// How a batch of tasks settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Number of settled tasks.
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record(&mut self, settled: Settled) {
        match settled {
            Ok(Ok(())) => self.succeeded += 1,
            Ok(Err(e)) => {
                debug!(error = %e, "task settled with failure");
                self.failed += 1;
            }
            Err(panic) => {
                error!(panic = %panic_message(&*panic), "task panicked");
                self.failed += 1;
            }
        }
    }
}

/// Run `tasks` with at most `limit` unsettled at any instant.
///
/// Tasks are submitted in input order. When the in-flight set is full,
/// submission waits for any one task to settle. Returns once every task has
/// settled; neither an `Err` nor a panic from a task escapes. A `limit` of
/// zero is treated as one.
pub async fn run_bounded<I>(tasks: I, limit: usize) -> RunSummary
where
    I: IntoIterator<Item = TaskFuture>,
{
    let limit = limit.max(1);
    let mut in_flight = FuturesUnordered::new();
    let mut summary = RunSummary::default();

    for task in tasks {
        if in_flight.len() >= limit
            && let Some(settled) = in_flight.next().await
        {
            summary.record(settled);
        }
        in_flight.push(AssertUnwindSafe(task).catch_unwind());
    }

    while let Some(settled) = in_flight.next().await {
        summary.record(settled);
    }

    summary
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
