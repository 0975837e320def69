//! One-shot commands for the jobs file: `sync` and `validate`.

use std::path::Path;

use miette::Result;
use trawl_scheduler::{Provider, ProviderRegistry};
use trawl_store::Job;
use trawl_sync::{ConfigReconciler, DEFAULT_OWNER_ID, DeclarativeJob, JobsDocument, SyncOutcome};

use crate::daemon::{open_stores, provider_registry};

/// Reconcile the jobs file into the store once and print what changed.
pub async fn run(jobs_file: &Path, store_path: Option<&Path>) -> Result<()> {
    let stores = open_stores(store_path).await?;
    let reconciler = ConfigReconciler::new(jobs_file, stores.jobs, stores.users);

    let outcome = reconciler
        .sync()
        .await
        .map_err(|e| miette::miette!("failed to sync {}: {}", jobs_file.display(), e))?;

    match outcome {
        SyncOutcome::Completed(report) => {
            println!(
                "Synced {}: {} written, {} unchanged, {} skipped, {} removed",
                jobs_file.display(),
                report.written,
                report.unchanged,
                report.skipped,
                report.removed
            );
        }
        SyncOutcome::AlreadyRunning => println!("A sync is already running"),
    }

    Ok(())
}

/// Problems found in one job.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct JobCheck {
    pub id: Option<String>,
    pub problems: Vec<String>,
}

/// Check every job in a document without touching any store.
pub(crate) fn check_document(document: &JobsDocument) -> Vec<JobCheck> {
    let registry = provider_registry();

    document
        .jobs
        .iter()
        .map(|raw| {
            let mut check = JobCheck {
                id: DeclarativeJob::raw_id(raw).map(str::to_string),
                problems: Vec::new(),
            };
            if check.id.is_none() {
                check.problems.push("missing id".to_string());
                return check;
            }

            let job = match DeclarativeJob::from_value(raw)
                .and_then(|job| job.into_job(DEFAULT_OWNER_ID, &document.adapters))
            {
                Ok(job) => job,
                Err(e) => {
                    check.problems.push(e.to_string());
                    return check;
                }
            };

            check.problems.extend(binding_problems(&job, &registry));
            check
        })
        .collect()
}

fn binding_problems(job: &Job, registry: &ProviderRegistry) -> Vec<String> {
    job.providers
        .iter()
        .filter_map(|binding| match registry.get(&binding.id) {
            None => Some(format!("unknown provider {}", binding.id)),
            Some(provider) => provider
                .configure(binding, binding.effective_blacklist(job))
                .err()
                .map(|e| format!("provider {}: {}", binding.id, e)),
        })
        .collect()
}

/// Parse the jobs file, resolve its placeholders and check every job.
pub async fn validate(jobs_file: &Path) -> Result<()> {
    let lookup = |name: &str| std::env::var(name).ok();
    let document = JobsDocument::load(jobs_file, &lookup)
        .await
        .map_err(|e| miette::miette!("failed to load {}: {}", jobs_file.display(), e))?;

    let checks = check_document(&document);
    let mut invalid = 0;
    for check in &checks {
        let id = check.id.as_deref().unwrap_or("<no id>");
        if check.problems.is_empty() {
            println!("  ok      {}", id);
        } else {
            invalid += 1;
            println!("  invalid {}", id);
            for problem in &check.problems {
                println!("          - {}", problem);
            }
        }
    }

    println!(
        "\n{} jobs, {} valid, {} invalid",
        checks.len(),
        checks.len() - invalid,
        invalid
    );

    if invalid > 0 {
        return Err(miette::miette!("{} invalid jobs in {}", invalid, jobs_file.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawl_store::JobStore;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_check_document_reports_each_problem() {
        let document = JobsDocument::parse(
            r#"{
                "adapters": [{"id": "console"}],
                "jobs": [
                    {"id": "good", "provider": [{"id": "http", "url": "https://example.test"}]},
                    {"name": "anonymous"},
                    {"id": "ghost", "provider": [{"id": "nope"}]},
                    {"id": "no-url", "provider": [{"id": "http"}]}
                ]
            }"#,
            &no_env,
        )
        .unwrap();

        let checks = check_document(&document);
        assert_eq!(checks.len(), 4);

        assert_eq!(checks[0].id.as_deref(), Some("good"));
        assert!(checks[0].problems.is_empty());

        assert_eq!(checks[1].id, None);
        assert_eq!(checks[1].problems, vec!["missing id".to_string()]);

        assert_eq!(checks[2].problems, vec!["unknown provider nope".to_string()]);

        assert_eq!(checks[3].problems.len(), 1);
        assert!(checks[3].problems[0].contains("url"));
    }

    #[test]
    fn test_check_document_without_adapters() {
        let document =
            JobsDocument::parse(r#"[{"id": "lonely", "provider": []}]"#, &no_env).unwrap();

        let checks = check_document(&document);
        assert_eq!(checks.len(), 1);
        assert!(checks[0].problems[0].contains("notification adapter"));
    }

    #[tokio::test]
    async fn test_run_persists_to_store_file() {
        let dir = tempfile::tempdir().unwrap();
        let jobs_file = dir.path().join("jobs.json");
        let store_path = dir.path().join("store.json");
        std::fs::write(
            &jobs_file,
            r#"{"adapters": [{"id": "console"}], "jobs": [{"id": "a", "provider": [{"id": "http", "url": "https://example.test"}]}]}"#,
        )
        .unwrap();

        run(&jobs_file, Some(store_path.as_path())).await.unwrap();

        let stores = open_stores(Some(store_path.as_path())).await.unwrap();
        let jobs = stores.jobs.get_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].user_id, DEFAULT_OWNER_ID);
    }
}
