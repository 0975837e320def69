//! Jobs file to store reconciliation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use trawl_store::{JobStore, NotificationAdapter, User, UserStore};

use crate::SyncError;
use crate::document::{DeclarativeJob, JobsDocument};

/// Owner id for jobs created from the jobs file.
pub const DEFAULT_OWNER_ID: &str = "declarative-config";

/// Looks up the value for a `${NAME}` placeholder.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Idle = 0,
    Syncing = 1,
}

struct SyncingGuard<'a> {
    state: &'a AtomicU8,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.state.store(SyncState::Idle as u8, Ordering::SeqCst);
    }
}

/// Counts from one completed sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Jobs inserted or changed in the store.
    pub written: usize,
    /// File jobs already identical in the store.
    pub unchanged: usize,
    /// File jobs that were invalid and left alone.
    pub skipped: usize,
    /// Owned jobs removed because they left the file.
    pub removed: usize,
}

/// Result of a sync request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another sync was in progress; nothing was done.
    AlreadyRunning,
    Completed(SyncReport),
}

/// Makes the store reflect the jobs file.
///
/// Every job in the file is upserted under a synthetic owner. Jobs with that
/// owner which no longer appear in the file are removed; jobs belonging to
/// anyone else are never touched by removal.
pub struct ConfigReconciler {
    path: PathBuf,
    owner_id: String,
    jobs: Arc<dyn JobStore>,
    users: Arc<dyn UserStore>,
    env: EnvLookup,
    state: AtomicU8,
    last_sync: RwLock<Option<DateTime<Utc>>>,
}

impl ConfigReconciler {
    /// Create a reconciler for the jobs file at `path`, resolving
    /// placeholders from the process environment.
    pub fn new(
        path: impl Into<PathBuf>,
        jobs: Arc<dyn JobStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            path: path.into(),
            owner_id: DEFAULT_OWNER_ID.to_string(),
            jobs,
            users,
            env: Arc::new(|name: &str| std::env::var(name).ok()),
            state: AtomicU8::new(SyncState::Idle as u8),
            last_sync: RwLock::new(None),
        }
    }

    /// Replace the placeholder lookup.
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Use a different synthetic owner id.
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn is_syncing(&self) -> bool {
        self.state.load(Ordering::SeqCst) == SyncState::Syncing as u8
    }

    /// When the last successful sync finished.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self
            .last_sync
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self) -> Option<SyncingGuard<'_>> {
        self.state
            .compare_exchange(
                SyncState::Idle as u8,
                SyncState::Syncing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .ok()
            .map(|_| SyncingGuard { state: &self.state })
    }

    /// Manual entry point: sync now and log the result.
    pub async fn trigger_sync(&self) -> Option<SyncReport> {
        match self.sync().await {
            Ok(SyncOutcome::Completed(report)) => Some(report),
            Ok(SyncOutcome::AlreadyRunning) => {
                info!("config sync already in progress");
                None
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "config sync failed");
                None
            }
        }
    }

    /// Reconcile the store with the jobs file.
    ///
    /// Failures reading or parsing the file (including an unresolved
    /// placeholder) or creating the owner abort before any job is written.
    /// An invalid individual job is skipped and keeps whatever version the
    /// store already has.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn sync(&self) -> Result<SyncOutcome, SyncError> {
        let Some(_guard) = self.enter() else {
            debug!("config sync requested while another is running");
            return Ok(SyncOutcome::AlreadyRunning);
        };

        debug!("config sync started");

        let document = JobsDocument::load(&self.path, &*self.env).await?;
        self.ensure_owner().await?;

        let mut report = SyncReport::default();

        // Index of the last entry for each id; earlier duplicates are never written
        let last_entry: HashMap<&str, usize> = document
            .jobs
            .iter()
            .enumerate()
            .filter_map(|(index, raw)| DeclarativeJob::raw_id(raw).map(|id| (id, index)))
            .collect();

        for (index, raw) in document.jobs.iter().enumerate() {
            let Some(id) = DeclarativeJob::raw_id(raw) else {
                warn!(entry = %raw, "skipping job without an id");
                report.skipped += 1;
                continue;
            };
            if last_entry.get(id) != Some(&index) {
                warn!(job_id = %id, "duplicate job id in jobs file, later entry wins");
                report.skipped += 1;
                continue;
            }

            match self.sync_job(raw, &document.adapters).await {
                Ok(true) => report.written += 1,
                Ok(false) => report.unchanged += 1,
                Err(e) => {
                    warn!(job_id = %id, error = %e, "skipping invalid job");
                    report.skipped += 1;
                }
            }
        }

        for job in self.jobs.get_jobs().await? {
            if job.user_id != self.owner_id || last_entry.contains_key(job.id.as_str()) {
                continue;
            }
            match self.jobs.remove_job(&job.id).await {
                Ok(()) => {
                    info!(job_id = %job.id, "removed job no longer in jobs file");
                    report.removed += 1;
                }
                Err(e) => warn!(job_id = %job.id, error = %e, "failed to remove job"),
            }
        }

        *self
            .last_sync
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Utc::now());

        info!(
            written = report.written,
            unchanged = report.unchanged,
            skipped = report.skipped,
            removed = report.removed,
            "config sync complete"
        );

        Ok(SyncOutcome::Completed(report))
    }

    /// Upsert one job. Returns whether the store changed.
    async fn sync_job(
        &self,
        raw: &Value,
        global_adapters: &[NotificationAdapter],
    ) -> Result<bool, SyncError> {
        let job = DeclarativeJob::from_value(raw)?.into_job(&self.owner_id, global_adapters)?;

        match self.jobs.get_job(&job.id).await? {
            Some(existing) if existing == job => return Ok(false),
            Some(existing) if existing.user_id != self.owner_id => {
                warn!(
                    job_id = %job.id,
                    previous_owner = %existing.user_id,
                    "jobs file takes over an existing job"
                );
            }
            _ => {}
        }

        self.jobs.upsert_job(job).await?;
        Ok(true)
    }

    async fn ensure_owner(&self) -> Result<(), SyncError> {
        if self.users.get_user(&self.owner_id).await?.is_some() {
            return Ok(());
        }

        info!(user_id = %self.owner_id, "creating owner for declarative jobs");
        self.users
            .upsert_user(User {
                id: self.owner_id.clone(),
                username: self.owner_id.clone(),
                is_admin: false,
                created_at: Utc::now(),
            })
            .await?;
        Ok(())
    }
}
