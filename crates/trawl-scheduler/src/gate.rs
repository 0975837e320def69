//! Single-flight execution gate.
//!
//! The gate is a two-state machine (idle/running) held in an atomic. Entering
//! the running state is a compare-exchange, so a second attempt while a cycle
//! is in flight is rejected synchronously and never queued.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono::{DateTime, Local, NaiveTime, Utc};
use tracing::{debug, error, info};

use crate::{SchedulerError, TaskFuture, run_bounded};

/// Default number of tasks running at once within a cycle.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum GateState {
    Idle = 0,
    Running = 1,
}

/// A daily window during which cycles may run.
///
/// `from` is inclusive and `to` exclusive. A window whose `from` is after its
/// `to` wraps past midnight; equal bounds mean the whole day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingHours {
    pub from: NaiveTime,
    pub to: NaiveTime,
}

impl WorkingHours {
    pub fn new(from: NaiveTime, to: NaiveTime) -> Self {
        Self { from, to }
    }

    /// Whether `time` falls inside the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.from == self.to {
            true
        } else if self.from < self.to {
            self.from <= time && time < self.to
        } else {
            time >= self.from || time < self.to
        }
    }
}

impl FromStr for WorkingHours {
    type Err = SchedulerError;

    /// Parse `HH:MM-HH:MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (from, to) = s.trim().split_once('-').ok_or_else(|| {
            SchedulerError::InvalidConfig(format!(
                "working hours '{}' must look like HH:MM-HH:MM",
                s
            ))
        })?;

        let parse = |part: &str| {
            NaiveTime::parse_from_str(part.trim(), "%H:%M").map_err(|e| {
                SchedulerError::InvalidConfig(format!("invalid time '{}': {}", part.trim(), e))
            })
        };

        Ok(Self::new(parse(from)?, parse(to)?))
    }
}

impl fmt::Display for WorkingHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from.format("%H:%M"), self.to.format("%H:%M"))
    }
}

/// Policy consulted each time a cycle is allowed to start.
#[derive(Debug, Clone)]
pub struct GatePolicy {
    /// Skip every cycle while set.
    pub demo_mode: bool,
    /// Only run inside this window, when configured.
    pub working_hours: Option<WorkingHours>,
    /// Maximum tasks running at once.
    pub concurrency: usize,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            demo_mode: false,
            working_hours: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Counts for one executed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub planned: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// What happened to a cycle attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle was in flight; this attempt was dropped.
    Busy,
    /// Demo mode is active.
    SkippedDemoMode,
    /// The current time is outside the working-hours window.
    SkippedOutsideWorkingHours,
    /// Planning failed before any task ran.
    PlanningFailed(String),
    /// The cycle ran (possibly with zero tasks).
    Completed(CycleReport),
}

type Clock = Arc<dyn Fn() -> NaiveTime + Send + Sync>;

/// Returns the gate to idle when dropped, including on error and unwinding.
struct RunningGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.state.store(GateState::Idle as u8, Ordering::SeqCst);
    }
}

/// Single-flight guard plus policy gates in front of the task runner.
pub struct ExecutionGate {
    state: AtomicU8,
    policy: GatePolicy,
    clock: Clock,
    last_started: RwLock<Option<DateTime<Utc>>>,
}

impl ExecutionGate {
    /// Create a gate reading the local wall clock for working hours.
    pub fn new(policy: GatePolicy) -> Self {
        Self {
            state: AtomicU8::new(GateState::Idle as u8),
            policy,
            clock: Arc::new(|| Local::now().time()),
            last_started: RwLock::new(None),
        }
    }

    /// Replace the clock used for the working-hours check.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Whether a cycle is currently in flight.
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::SeqCst) == GateState::Running as u8
    }

    /// When the most recent cycle attempt entered the running state.
    pub fn last_cycle_started(&self) -> Option<DateTime<Utc>> {
        *self
            .last_started
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self) -> Option<RunningGuard<'_>> {
        self.state
            .compare_exchange(
                GateState::Idle as u8,
                GateState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .ok()
            .map(|_| RunningGuard { state: &self.state })
    }

    /// Attempt one execution cycle.
    ///
    /// Rejected immediately with [`CycleOutcome::Busy`] if a cycle is already
    /// running. Otherwise the policy gates are evaluated in order (demo mode,
    /// then working hours); if both pass, `plan` materializes the tasks and
    /// they run with the configured concurrency limit.
    pub async fn attempt_cycle<F, Fut>(&self, plan: F) -> CycleOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<TaskFuture>, SchedulerError>>,
    {
        let Some(_guard) = self.enter() else {
            debug!("cycle already in flight, dropping trigger");
            return CycleOutcome::Busy;
        };

        let started_at = Utc::now();
        *self
            .last_started
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(started_at);

        if self.policy.demo_mode {
            info!("demo mode active, skipping cycle");
            return CycleOutcome::SkippedDemoMode;
        }

        if let Some(hours) = &self.policy.working_hours {
            let now = (self.clock)();
            if !hours.contains(now) {
                info!(
                    working_hours = %hours,
                    now = %now.format("%H:%M"),
                    "outside working hours, skipping cycle"
                );
                return CycleOutcome::SkippedOutsideWorkingHours;
            }
        }

        let tasks = match plan().await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "cycle planning failed");
                return CycleOutcome::PlanningFailed(e.to_string());
            }
        };

        let planned = tasks.len();
        if planned == 0 {
            info!("no tasks planned, cycle complete");
            return CycleOutcome::Completed(CycleReport {
                started_at,
                planned: 0,
                succeeded: 0,
                failed: 0,
            });
        }

        info!(planned, concurrency = self.policy.concurrency, "cycle started");
        let timer = Instant::now();
        let summary = run_bounded(tasks, self.policy.concurrency).await;

        info!(
            planned,
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = timer.elapsed().as_millis() as u64,
            "cycle complete"
        );

        CycleOutcome::Completed(CycleReport {
            started_at,
            planned,
            succeeded: summary.succeeded,
            failed: summary.failed,
        })
    }
}

impl fmt::Debug for ExecutionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGate")
            .field("running", &self.is_running())
            .field("policy", &self.policy)
            .finish()
    }
}
