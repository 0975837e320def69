//! Stored record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A data-collection job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique, stable identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Disabled jobs are never planned.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Provider bindings, in execution-planning order.
    #[serde(default)]
    pub providers: Vec<ProviderBinding>,
    /// Where results of this job are delivered.
    #[serde(default)]
    pub notification_adapters: Vec<NotificationAdapter>,
    /// Owner of the job. The reconciler only ever removes jobs it owns.
    pub user_id: String,
    /// Other users who can see this job.
    #[serde(default)]
    pub shared_with_users: Vec<String>,
    /// Excluded terms or listing ids applied to every binding without its own override.
    #[serde(default)]
    pub blacklist: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Job {
    /// Create an enabled job with no bindings or adapters.
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            enabled: true,
            providers: Vec::new(),
            notification_adapters: Vec::new(),
            user_id: user_id.into(),
            shared_with_users: Vec::new(),
            blacklist: Vec::new(),
        }
    }

    /// A job is schedulable when it is enabled and has at least one provider binding.
    pub fn is_schedulable(&self) -> bool {
        self.enabled && !self.providers.is_empty()
    }
}

/// A provider reference nested inside a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBinding {
    /// Provider-type identifier, resolved against the provider registry.
    pub id: String,
    /// Replaces the job-level blacklist for this binding when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<Vec<String>>,
    /// Provider-specific settings (search URL and the like).
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ProviderBinding {
    /// Create a binding with no settings.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            blacklist: None,
            settings: Map::new(),
        }
    }

    /// Add a provider-specific setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// The blacklist that applies to this binding within `job`.
    pub fn effective_blacklist<'a>(&'a self, job: &'a Job) -> &'a [String] {
        self.blacklist.as_deref().unwrap_or(&job.blacklist)
    }
}

/// A notification adapter in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAdapter {
    /// Adapter-type identifier (e.g. `telegram`).
    pub id: String,
    /// Adapter-specific fields (tokens, chat ids, webhook URLs).
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// A user known to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_is_schedulable() {
        let mut job = Job::new("a", "owner");
        assert!(!job.is_schedulable());

        job.providers.push(ProviderBinding::new("p1"));
        assert!(job.is_schedulable());

        job.enabled = false;
        assert!(!job.is_schedulable());
    }

    #[test]
    fn test_binding_settings_flatten() {
        let binding: ProviderBinding = serde_json::from_value(json!({
            "id": "immoscout",
            "url": "https://example.test/search",
            "blacklist": ["wg"]
        }))
        .unwrap();

        assert_eq!(binding.id, "immoscout");
        assert_eq!(binding.blacklist, Some(vec!["wg".to_string()]));
        assert_eq!(
            binding.settings.get("url"),
            Some(&json!("https://example.test/search"))
        );
        assert!(!binding.settings.contains_key("blacklist"));
    }

    #[test]
    fn test_effective_blacklist_override() {
        let mut job = Job::new("a", "owner");
        job.blacklist = vec!["job-level".to_string()];

        let inherits = ProviderBinding::new("p1");
        assert_eq!(inherits.effective_blacklist(&job), ["job-level".to_string()]);

        let mut overrides = ProviderBinding::new("p2");
        overrides.blacklist = Some(vec![]);
        assert!(overrides.effective_blacklist(&job).is_empty());
    }

    #[test]
    fn test_job_defaults_enabled() {
        let job: Job = serde_json::from_value(json!({"id": "a", "userId": "u"})).unwrap();
        assert!(job.enabled);
        assert!(job.providers.is_empty());
    }
}
