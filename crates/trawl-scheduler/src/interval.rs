//! Interval scheduling loop with manual triggers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{CycleOutcome, Orchestrator};

/// What caused a cycle attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    Timer,
    Manual,
}

/// Receiving side of the manual trigger channel.
pub type TriggerReceiver = mpsc::Receiver<()>;

/// Sends "run now" signals to the interval scheduler.
///
/// Cheaply cloneable. At most one signal is buffered; further signals while
/// one is pending are coalesced.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Request a cycle now. Returns false once the scheduler has stopped.
    pub fn trigger(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("manual trigger already pending");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Create a manual trigger channel.
pub fn trigger_channel() -> (TriggerHandle, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (TriggerHandle { tx }, rx)
}

/// Fires the orchestrator immediately, then every `period`, and whenever a
/// manual trigger arrives.
///
/// Every attempt is spawned, so a long cycle never stalls the loop; the
/// orchestrator's gate drops attempts that overlap a running cycle.
#[derive(Debug, Clone)]
pub struct IntervalScheduler {
    period: Duration,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the scheduling loop.
    ///
    /// The loop ends when `shutdown_rx` turns true (or its sender is dropped).
    /// The returned handle completes after any cycle still running at that
    /// point has finished.
    pub fn start(
        self,
        orchestrator: Arc<Orchestrator>,
        triggers: TriggerReceiver,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(orchestrator, triggers, shutdown_rx))
    }

    async fn run(
        self,
        orchestrator: Arc<Orchestrator>,
        mut triggers: TriggerReceiver,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!(period_secs = self.period.as_secs(), "interval scheduler started");

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut triggers_open = true;
        let mut cycles = JoinSet::new();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            // Reap finished attempts so the set doesn't grow unbounded
            while cycles.try_join_next().is_some() {}

            let trigger = tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("interval scheduler received shutdown signal");
                        break;
                    }
                    continue;
                }

                _ = interval.tick() => CycleTrigger::Timer,

                msg = triggers.recv(), if triggers_open => match msg {
                    Some(()) => CycleTrigger::Manual,
                    None => {
                        debug!("manual trigger channel closed");
                        triggers_open = false;
                        continue;
                    }
                },
            };

            debug!(?trigger, "cycle triggered");
            let orchestrator = Arc::clone(&orchestrator);
            cycles.spawn(async move {
                if orchestrator.run_cycle().await == CycleOutcome::Busy {
                    debug!(?trigger, "cycle attempt dropped, previous cycle still running");
                }
            });
        }

        if !cycles.is_empty() {
            info!("waiting for running cycle to finish");
        }
        while let Some(result) = cycles.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "cycle task ended abnormally");
            }
        }

        info!("interval scheduler stopped");
    }
}
