//! JSON-file store.
//!
//! The whole store is a single JSON document, rewritten on every mutation.
//! Writes go to a temp file first and are renamed into place, so a crash
//! mid-write leaves the previous document intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{Job, JobStore, StoreError, User, UserStore};

/// Store file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    jobs: Vec<Job>,
    #[serde(default)]
    users: Vec<User>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: 1,
            jobs: Vec::new(),
            users: Vec::new(),
        }
    }
}

/// A store persisted as one JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<StoreDocument>,
}

impl JsonFileStore {
    /// Load the store from `path`.
    ///
    /// If the file doesn't exist, starts with an empty store; the file is
    /// created on the first write.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let data = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            serde_json::from_str(&content)?
        } else {
            StoreDocument::default()
        };

        info!(
            path = %path.display(),
            jobs = data.jobs.len(),
            users = data.users.len(),
            "loaded job store"
        );

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the document to disk.
    ///
    /// Callers hold the write lock, which serializes concurrent saves.
    async fn save(&self, data: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(data)?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        debug!(path = %self.path.display(), "persisted job store");

        Ok(())
    }
}

#[async_trait]
impl JobStore for JsonFileStore {
    async fn get_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.data.read().await.jobs.clone())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned())
    }

    async fn upsert_job(&self, job: Job) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        match next.jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job,
            None => next.jobs.push(job),
        }

        // Only publish the change in memory once it is on disk
        self.save(&next).await?;
        *data = next;
        Ok(())
    }

    async fn remove_job(&self, id: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        if !data.jobs.iter().any(|j| j.id == id) {
            return Ok(());
        }

        let mut next = data.clone();
        next.jobs.retain(|j| j.id != id);
        self.save(&next).await?;
        *data = next;
        Ok(())
    }
}

#[async_trait]
impl UserStore for JsonFileStore {
    async fn get_user(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .users
            .iter()
            .find(|u| u.id == id)
            .cloned())
    }

    async fn upsert_user(&self, user: User) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();
        match next.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => next.users.push(user),
        }

        self.save(&next).await?;
        *data = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderBinding;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::load(dir.path().join("store.json"))
            .await
            .unwrap();

        assert!(store.get_jobs().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_writes_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        {
            let store = JsonFileStore::load(&path).await.unwrap();
            let mut job = Job::new("a", "owner");
            job.providers.push(ProviderBinding::new("p1").with_setting("url", "https://x.test"));
            store.upsert_job(job).await.unwrap();
            store.upsert_job(Job::new("b", "owner")).await.unwrap();
            store.remove_job("b").await.unwrap();
        }

        let reloaded = JsonFileStore::load(&path).await.unwrap();
        let jobs = reloaded.get_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "a");
        assert_eq!(jobs[0].providers[0].id, "p1");
        assert!(!path.with_extension("tmp").exists());
    }
}
