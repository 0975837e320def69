//! In-memory store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Job, JobStore, StoreError, User, UserStore};

/// A store that keeps everything in memory.
///
/// Jobs keep their insertion order; upserting an existing id replaces it in place.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<Vec<Job>>,
    users: RwLock<Vec<User>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with jobs.
    pub fn with_jobs(jobs: Vec<Job>) -> Self {
        Self {
            jobs: RwLock::new(jobs),
            users: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.jobs.read().await.clone())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.jobs.read().await.iter().find(|j| j.id == id).cloned())
    }

    async fn upsert_job(&self, job: Job) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => jobs.push(job),
        }
        Ok(())
    }

    async fn remove_job(&self, id: &str) -> Result<(), StoreError> {
        self.jobs.write().await.retain(|j| j.id != id);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn upsert_user(&self, user: User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => users.push(user),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let store = MemoryStore::with_jobs(vec![Job::new("a", "u"), Job::new("b", "u")]);

        let mut updated = Job::new("a", "u");
        updated.enabled = false;
        store.upsert_job(updated).await.unwrap();

        let jobs = store.get_jobs().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, "a");
        assert!(!jobs[0].enabled);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_ok() {
        let store = MemoryStore::new();
        store.remove_job("missing").await.unwrap();
        assert!(store.get_job("missing").await.unwrap().is_none());
    }
}
