//! Execution orchestrator for Trawl.
//!
//! This crate provides:
//! - A bounded-concurrency runner that never lets one task's failure escape
//! - Task planning from jobs and the provider registry
//! - A single-flight execution gate with demo-mode and working-hours policy
//! - An interval scheduler that also reacts to manual "run now" triggers

mod error;
mod gate;
mod interval;
mod orchestrator;
mod planner;
mod provider;
mod runner;

pub use error::{ProviderError, SchedulerError};
pub use gate::{
    CycleOutcome, CycleReport, DEFAULT_CONCURRENCY, ExecutionGate, GatePolicy, WorkingHours,
};
pub use interval::{CycleTrigger, IntervalScheduler, TriggerHandle, TriggerReceiver, trigger_channel};
pub use orchestrator::{Orchestrator, PipelineError, TaskPipeline};
pub use planner::{Task, plan_tasks};
pub use provider::{Provider, ProviderConfig, ProviderRegistry};
pub use runner::{RunSummary, TaskFuture, run_bounded};
