//! Provider contract and registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;
use trawl_store::ProviderBinding;

use crate::ProviderError;

/// A loaded provider capability.
///
/// Implementations are the collectors themselves (one per listing site);
/// the orchestrator only asks them to produce an effective configuration for
/// a specific binding of a specific job.
pub trait Provider: Send + Sync {
    /// Stable identifier that bindings refer to.
    fn id(&self) -> &str;

    /// Configure this provider for one binding.
    ///
    /// `blacklist` is already resolved (binding override or job-level list).
    /// The returned configuration is scoped to that binding+job pair.
    fn configure(
        &self,
        binding: &ProviderBinding,
        blacklist: &[String],
    ) -> Result<ProviderConfig, ProviderError>;
}

/// The effective configuration of a provider for one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub settings: Map<String, Value>,
    pub blacklist: Vec<String>,
}

impl ProviderConfig {
    /// Build a configuration that carries the binding settings through unchanged.
    pub fn from_binding(binding: &ProviderBinding, blacklist: &[String]) -> Self {
        Self {
            provider_id: binding.id.clone(),
            settings: binding.settings.clone(),
            blacklist: blacklist.to_vec(),
        }
    }

    /// A string setting by key.
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }

    /// A required string setting.
    pub fn require_str(&self, key: &str) -> Result<&str, ProviderError> {
        self.setting_str(key)
            .ok_or_else(|| ProviderError::MissingSetting(key.to_string()))
    }
}

/// Providers keyed by identifier.
///
/// Populated once at startup and shared read-only afterwards.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any earlier one with the same id.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.id().to_string();
        if self.providers.insert(id.clone(), provider).is_some() {
            warn!(provider = %id, "provider registered twice, keeping the latest");
        }
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    /// Look up a provider by id.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(&'static str);

    impl Provider for Echo {
        fn id(&self) -> &str {
            self.0
        }

        fn configure(
            &self,
            binding: &ProviderBinding,
            blacklist: &[String],
        ) -> Result<ProviderConfig, ProviderError> {
            Ok(ProviderConfig::from_binding(binding, blacklist))
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProviderRegistry::new()
            .with(Arc::new(Echo("kleinanzeigen")))
            .with(Arc::new(Echo("immowelt")));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("immowelt").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["immowelt", "kleinanzeigen"]);
    }

    #[test]
    fn test_require_str() {
        let binding = ProviderBinding::new("p").with_setting("url", "https://x.test");
        let config = ProviderConfig::from_binding(&binding, &[]);

        assert_eq!(config.require_str("url").unwrap(), "https://x.test");
        assert!(matches!(
            config.require_str("token"),
            Err(ProviderError::MissingSetting(key)) if key == "token"
        ));
    }
}
