//! Storage contracts consumed by the orchestrator.

use async_trait::async_trait;

use crate::{Job, StoreError, User};

/// Persistent job storage.
///
/// Other writers (UI, API) share the same store; the orchestrator only
/// distinguishes its own jobs by owner id.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// All jobs, in store order.
    async fn get_jobs(&self) -> Result<Vec<Job>, StoreError>;

    /// A single job by id.
    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Insert or replace the job with the same id.
    async fn upsert_job(&self, job: Job) -> Result<(), StoreError>;

    /// Remove a job. Removing an unknown id is not an error.
    async fn remove_job(&self, id: &str) -> Result<(), StoreError>;
}

/// Persistent user storage.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn upsert_user(&self, user: User) -> Result<(), StoreError>;
}
