//! The declarative jobs file.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use trawl_store::{Job, NotificationAdapter, ProviderBinding};

use crate::SyncError;
use crate::adapter::{normalize_adapter, normalize_job_adapters};
use crate::placeholders::resolve_placeholders;

/// A jobs file after placeholder substitution.
///
/// Jobs stay as raw JSON so that one malformed job can be skipped without
/// rejecting the whole file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobsDocument {
    pub jobs: Vec<Value>,
    pub adapters: Vec<NotificationAdapter>,
}

impl JobsDocument {
    /// Read and parse the jobs file at `path`, resolving placeholders with `lookup`.
    pub async fn load(
        path: &Path,
        lookup: &(dyn Fn(&str) -> Option<String> + Sync),
    ) -> Result<Self, SyncError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content, lookup)
    }

    /// Parse a jobs document from a string.
    ///
    /// Accepts either `{"jobs": [..], "adapters": [..]}` or a bare array of jobs.
    pub fn parse(
        content: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, SyncError> {
        let mut root: Value = serde_json::from_str(content)?;
        resolve_placeholders(&mut root, lookup)?;

        let (jobs, adapters) = match root {
            Value::Array(jobs) => (jobs, Vec::new()),
            Value::Object(mut map) => {
                let jobs = match map.remove("jobs") {
                    Some(Value::Array(jobs)) => jobs,
                    None | Some(Value::Null) => Vec::new(),
                    Some(_) => {
                        return Err(SyncError::InvalidDocument(
                            "`jobs` must be an array".to_string(),
                        ));
                    }
                };
                let adapters = match map.remove("adapters") {
                    Some(Value::Array(adapters)) => adapters,
                    None | Some(Value::Null) => Vec::new(),
                    Some(_) => {
                        return Err(SyncError::InvalidDocument(
                            "`adapters` must be an array".to_string(),
                        ));
                    }
                };
                (jobs, adapters)
            }
            _ => {
                return Err(SyncError::InvalidDocument(
                    "expected an object or an array of jobs".to_string(),
                ));
            }
        };

        Ok(Self {
            jobs,
            adapters: adapters.iter().filter_map(normalize_adapter).collect(),
        })
    }
}

/// One job entry as written in the jobs file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarativeJob {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, alias = "providers")]
    pub provider: Vec<ProviderBinding>,
    #[serde(default, alias = "notificationAdapters", alias = "adapters")]
    pub notification_adapter: Vec<Value>,
    #[serde(default, alias = "sharedWithUsers")]
    pub share_with_users: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl DeclarativeJob {
    /// The identifier of a raw job entry, if it has a usable one.
    pub fn raw_id(raw: &Value) -> Option<&str> {
        raw.get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Parse a raw job entry.
    pub fn from_value(raw: &Value) -> Result<Self, SyncError> {
        let mut job: Self = serde_json::from_value(raw.clone())?;
        job.id = job.id.trim().to_string();
        Ok(job)
    }

    /// Build the stored form of this job, owned by `owner_id`.
    pub fn into_job(
        self,
        owner_id: &str,
        global_adapters: &[NotificationAdapter],
    ) -> Result<Job, SyncError> {
        let adapters =
            normalize_job_adapters(&self.id, &self.notification_adapter, global_adapters);
        if adapters.is_empty() {
            return Err(SyncError::NoAdapters(self.id));
        }

        Ok(Job {
            id: self.id,
            name: self.name,
            enabled: self.enabled,
            providers: self.provider,
            notification_adapters: adapters,
            user_id: owner_id.to_string(),
            shared_with_users: self.share_with_users,
            blacklist: self.blacklist,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_envelope() {
        let doc = JobsDocument::parse(
            r#"{
                "jobs": [{"id": "a", "provider": [{"id": "p1"}]}],
                "adapters": [{"id": "console"}, "garbage"]
            }"#,
            &no_env,
        )
        .unwrap();

        assert_eq!(doc.jobs.len(), 1);
        assert_eq!(doc.adapters.len(), 1);
        assert_eq!(doc.adapters[0].id, "console");
    }

    #[test]
    fn test_parse_bare_array() {
        let doc = JobsDocument::parse(r#"[{"id": "a"}, {"id": "b"}]"#, &no_env).unwrap();
        assert_eq!(doc.jobs.len(), 2);
        assert!(doc.adapters.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_document() {
        assert!(matches!(
            JobsDocument::parse(r#""jobs""#, &no_env),
            Err(SyncError::InvalidDocument(_))
        ));
        assert!(matches!(
            JobsDocument::parse(r#"{"jobs": {}}"#, &no_env),
            Err(SyncError::InvalidDocument(_))
        ));
        assert!(matches!(
            JobsDocument::parse("{not json", &no_env),
            Err(SyncError::Json(_))
        ));
    }

    #[test]
    fn test_job_aliases_and_defaults() {
        let job = DeclarativeJob::from_value(&json!({
            "id": " a ",
            "providers": [{"id": "p1", "url": "https://example.test"}],
            "notificationAdapters": [{"type": "ntfy", "topic": "flats"}],
            "sharedWithUsers": ["bob"]
        }))
        .unwrap();

        assert_eq!(job.id, "a");
        assert!(job.enabled);
        assert_eq!(job.provider.len(), 1);
        assert_eq!(job.notification_adapter.len(), 1);
        assert_eq!(job.share_with_users, vec!["bob".to_string()]);

        let stored = job.into_job("declarative-config", &[]).unwrap();
        assert_eq!(stored.user_id, "declarative-config");
        assert_eq!(stored.notification_adapters[0].id, "ntfy");
    }

    #[test]
    fn test_job_without_adapters_is_rejected() {
        let job = DeclarativeJob::from_value(&json!({"id": "a"})).unwrap();
        assert!(matches!(
            job.into_job("owner", &[]),
            Err(SyncError::NoAdapters(id)) if id == "a"
        ));
    }

    #[test]
    fn test_raw_id() {
        assert_eq!(DeclarativeJob::raw_id(&json!({"id": "x"})), Some("x"));
        assert_eq!(DeclarativeJob::raw_id(&json!({"id": ""})), None);
        assert_eq!(DeclarativeJob::raw_id(&json!({"id": 7})), None);
        assert_eq!(DeclarativeJob::raw_id(&json!([])), None);
    }
}
