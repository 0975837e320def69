//! Keeps the job store in step with a human-edited jobs file.
//!
//! This crate provides:
//! - Loading the declarative jobs file, with `${NAME}` secret placeholders
//!   resolved from the environment
//! - Normalization of the legacy notification-adapter shapes
//! - The reconciler that upserts file jobs and removes the ones it owns
//!   that disappeared from the file
//! - A debounced file watcher that re-runs the reconciler after edits

mod adapter;
mod document;
mod error;
mod placeholders;
mod reconciler;
mod watcher;

pub use adapter::{AdapterShape, normalize_adapter, normalize_job_adapters};
pub use document::{DeclarativeJob, JobsDocument};
pub use error::SyncError;
pub use placeholders::resolve_placeholders;
pub use reconciler::{
    ConfigReconciler, DEFAULT_OWNER_ID, EnvLookup, SyncOutcome, SyncReport,
};
pub use watcher::{
    DEFAULT_QUIET_PERIOD, FileWatchDebouncer, MAX_QUIET_PERIOD, WatchHandle, debounce,
};
