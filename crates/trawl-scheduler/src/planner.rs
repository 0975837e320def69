//! Turning jobs into per-cycle tasks.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{debug, warn};
use trawl_store::{Job, NotificationAdapter};

use crate::runner::panic_message;
use crate::{ProviderConfig, ProviderError, ProviderRegistry};

/// One provider binding of one job, ready to execute.
///
/// Built fresh every cycle and discarded afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub job_id: String,
    pub provider: ProviderConfig,
    pub adapters: Vec<NotificationAdapter>,
}

impl Task {
    pub fn provider_id(&self) -> &str {
        &self.provider.provider_id
    }
}

/// Plan the tasks for one cycle.
///
/// Only enabled jobs with at least one binding are considered. Bindings whose
/// provider is not registered, or whose provider fails to configure, are
/// skipped without affecting the job's other bindings. Output order is job
/// order, then binding order.
pub fn plan_tasks(jobs: &[Job], registry: &ProviderRegistry) -> Vec<Task> {
    let mut tasks = Vec::new();

    for job in jobs.iter().filter(|j| j.is_schedulable()) {
        for binding in &job.providers {
            let Some(provider) = registry.get(&binding.id) else {
                warn!(
                    provider = %binding.id,
                    job_id = %job.id,
                    "provider not registered, skipping binding"
                );
                continue;
            };

            let blacklist = binding.effective_blacklist(job);
            let configured = catch_unwind(AssertUnwindSafe(|| {
                provider.configure(binding, blacklist)
            }))
            .unwrap_or_else(|panic| Err(ProviderError::Panicked(panic_message(&*panic))));

            match configured {
                Ok(config) => tasks.push(Task {
                    job_id: job.id.clone(),
                    provider: config,
                    adapters: job.notification_adapters.clone(),
                }),
                Err(e) => {
                    warn!(
                        provider = %binding.id,
                        job_id = %job.id,
                        error = %e,
                        "provider failed to configure, skipping binding"
                    );
                }
            }
        }
    }

    debug!(tasks = tasks.len(), "planned cycle tasks");
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Provider;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use trawl_store::ProviderBinding;

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

    struct Broken;

    impl Provider for Broken {
        fn id(&self) -> &str {
            "broken"
        }

        fn configure(
            &self,
            _binding: &ProviderBinding,
            _blacklist: &[String],
        ) -> Result<ProviderConfig, ProviderError> {
            Err(ProviderError::MissingSetting("url".to_string()))
        }
    }

    struct Panicky;

    impl Provider for Panicky {
        fn id(&self) -> &str {
            "panicky"
        }

        fn configure(
            &self,
            _binding: &ProviderBinding,
            _blacklist: &[String],
        ) -> Result<ProviderConfig, ProviderError> {
            panic!("bad selector")
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new()
            .with(Arc::new(Echo("p1")))
            .with(Arc::new(Echo("p2")))
            .with(Arc::new(Broken))
            .with(Arc::new(Panicky))
    }

    fn job(id: &str, providers: &[&str]) -> Job {
        let mut job = Job::new(id, "owner");
        job.providers = providers.iter().map(|p| ProviderBinding::new(*p)).collect();
        job
    }

    fn summary(tasks: &[Task]) -> Vec<(String, String)> {
        tasks
            .iter()
            .map(|t| (t.job_id.clone(), t.provider_id().to_string()))
            .collect()
    }

    #[test]
    fn test_job_then_binding_order() {
        let jobs = vec![job("a", &["p2", "p1"]), job("b", &["p1"])];
        let tasks = plan_tasks(&jobs, &registry());

        assert_eq!(
            summary(&tasks),
            vec![
                ("a".to_string(), "p2".to_string()),
                ("a".to_string(), "p1".to_string()),
                ("b".to_string(), "p1".to_string()),
            ]
        );
    }

    #[test]
    fn test_disabled_and_empty_jobs_skipped() {
        let mut disabled = job("off", &["p1"]);
        disabled.enabled = false;
        let jobs = vec![disabled, job("empty", &[]), job("on", &["p1"])];

        let tasks = plan_tasks(&jobs, &registry());
        assert_eq!(summary(&tasks), vec![("on".to_string(), "p1".to_string())]);
    }

    #[test]
    fn test_unresolved_binding_does_not_block_siblings() {
        let jobs = vec![job("a", &["missing", "p1", "broken", "panicky", "p2"])];
        let tasks = plan_tasks(&jobs, &registry());

        assert_eq!(
            summary(&tasks),
            vec![
                ("a".to_string(), "p1".to_string()),
                ("a".to_string(), "p2".to_string()),
            ]
        );
    }

    #[test]
    fn test_blacklist_resolution() {
        let mut j = job("a", &["p1", "p2"]);
        j.blacklist = vec!["wg".to_string()];
        j.providers[1].blacklist = Some(vec!["tausch".to_string()]);

        let tasks = plan_tasks(&[j], &registry());
        assert_eq!(tasks[0].provider.blacklist, vec!["wg".to_string()]);
        assert_eq!(tasks[1].provider.blacklist, vec!["tausch".to_string()]);
    }

    #[test]
    fn test_tasks_carry_job_adapters() {
        let mut j = job("a", &["p1"]);
        j.notification_adapters = vec![NotificationAdapter {
            id: "telegram".to_string(),
            fields: Default::default(),
        }];

        let tasks = plan_tasks(&[j], &registry());
        assert_eq!(tasks[0].adapters[0].id, "telegram");
    }
}
