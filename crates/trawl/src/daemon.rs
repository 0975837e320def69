//! Daemon command: interval-driven collection cycles with live jobs file sync.
//!
//! The daemon runs:
//! - A startup sync of the jobs file, then a debounced file watcher and an
//!   optional periodic re-sync
//! - The interval scheduler, which fires a cycle immediately and then every
//!   interval, plus on manual triggers
//! - Signal handlers for shutdown, "run now" and "sync now"

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

use trawl_scheduler::{
    ExecutionGate, GatePolicy, IntervalScheduler, Orchestrator, ProviderRegistry, TriggerHandle,
    trigger_channel,
};
use trawl_store::{JobStore, JsonFileStore, MemoryStore, UserStore};
use trawl_sync::{ConfigReconciler, FileWatchDebouncer};

use crate::http::{HttpPipeline, HttpProvider};

/// Default minutes between execution cycles.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;

/// Default minutes between periodic re-syncs of the jobs file.
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 60;

/// Default quiet period for the jobs file watcher, in milliseconds.
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 2000;

/// Upper bound for the cycle and re-sync intervals (one year).
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Upper bound for the jobs file quiet period.
pub const MAX_QUIET_PERIOD_MS: u64 = 60 * 60 * 1000;

/// Upper bound for the `http` provider request timeout.
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 60 * 60;

/// Configuration for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Time between execution cycles.
    pub interval: Duration,
    pub policy: GatePolicy,
    /// Backing file for the job store; `None` keeps everything in memory.
    pub store_path: Option<PathBuf>,
    pub jobs_file: PathBuf,
    /// Reconcile the jobs file into the store (startup, file changes, timer).
    pub sync_enabled: bool,
    /// Periodic re-sync; `None` disables it.
    pub sync_interval: Option<Duration>,
    pub quiet_period: Duration,
    /// Default per-request timeout for the `http` provider.
    pub http_timeout: Duration,
}

/// The job and user views of one store.
pub(crate) struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub users: Arc<dyn UserStore>,
}

/// Open the file-backed store at `path`, or an in-memory store for `None`.
pub(crate) async fn open_stores(path: Option<&Path>) -> Result<Stores> {
    match path {
        Some(path) => {
            let store = Arc::new(JsonFileStore::load(path).await.map_err(|e| {
                miette::miette!("failed to open job store at {}: {}", path.display(), e)
            })?);
            Ok(Stores {
                jobs: store.clone(),
                users: store,
            })
        }
        None => {
            info!("using in-memory job store, nothing will be persisted");
            let store = Arc::new(MemoryStore::new());
            Ok(Stores {
                jobs: store.clone(),
                users: store,
            })
        }
    }
}

/// The providers built into this binary.
pub(crate) fn provider_registry() -> ProviderRegistry {
    ProviderRegistry::new().with(Arc::new(HttpProvider))
}

/// Run the daemon until a shutdown signal arrives.
pub async fn run(config: DaemonConfig) -> Result<()> {
    info!(
        interval_secs = config.interval.as_secs(),
        concurrency = config.policy.concurrency,
        demo_mode = config.policy.demo_mode,
        working_hours = ?config.policy.working_hours.map(|w| w.to_string()),
        store = ?config.store_path,
        jobs_file = %config.jobs_file.display(),
        sync_enabled = config.sync_enabled,
        sync_interval_secs = ?config.sync_interval.map(|d| d.as_secs()),
        "starting trawl daemon"
    );

    let stores = open_stores(config.store_path.as_deref()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reconciler = if config.sync_enabled {
        let reconciler = Arc::new(ConfigReconciler::new(
            &config.jobs_file,
            Arc::clone(&stores.jobs),
            Arc::clone(&stores.users),
        ));
        // Failure is logged; the watcher and the timer retry
        reconciler.trigger_sync().await;
        Some(reconciler)
    } else {
        info!("jobs file sync disabled");
        None
    };

    let watch_handle = reconciler.as_ref().and_then(|reconciler| {
        let reconciler = Arc::clone(reconciler);
        FileWatchDebouncer::new(config.quiet_period).watch(
            &config.jobs_file,
            move || {
                let reconciler = Arc::clone(&reconciler);
                async move {
                    reconciler.trigger_sync().await;
                }
            },
            shutdown_rx.clone(),
        )
    });

    let resync_handle = match (&reconciler, config.sync_interval) {
        (Some(reconciler), Some(period)) => Some(spawn_resync(
            Arc::clone(reconciler),
            period,
            shutdown_rx.clone(),
        )),
        _ => None,
    };

    let orchestrator = Arc::new(Orchestrator::new(
        ExecutionGate::new(config.policy.clone()),
        Arc::clone(&stores.jobs),
        Arc::new(provider_registry()),
        Arc::new(HttpPipeline::new(config.http_timeout)),
    ));

    let (trigger, triggers) = trigger_channel();
    let scheduler_handle =
        IntervalScheduler::new(config.interval).start(orchestrator, triggers, shutdown_rx.clone());

    spawn_signal_handlers(trigger, reconciler.clone(), shutdown_tx.clone())?;

    // Wait for shutdown signal
    let mut main_shutdown_rx = shutdown_rx.clone();
    loop {
        if main_shutdown_rx.changed().await.is_err() || *main_shutdown_rx.borrow() {
            break;
        }
    }

    info!("shutting down daemon tasks");

    // Lets a running cycle finish
    let _ = scheduler_handle.await;
    if let Some(handle) = watch_handle {
        handle.join().await;
    }
    if let Some(handle) = resync_handle {
        let _ = handle.await;
    }

    info!("daemon shut down gracefully");
    Ok(())
}

/// Re-sync the jobs file every `period`, starting one period from now.
fn spawn_resync(
    reconciler: Arc<ConfigReconciler>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    reconciler.trigger_sync().await;
                }
            }
        }
        info!("periodic jobs file sync stopped");
    })
}

/// SIGUSR1 runs a cycle now, SIGHUP syncs the jobs file, Ctrl-C and
/// SIGTERM shut down.
#[cfg(unix)]
fn spawn_signal_handlers(
    trigger: TriggerHandle,
    reconciler: Option<Arc<ConfigReconciler>>,
    shutdown_tx: watch::Sender<bool>,
) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let install = |kind: SignalKind, name: &str| {
        signal(kind).map_err(|e| miette::miette!("failed to install {} handler: {}", name, e))
    };
    let mut terminate = install(SignalKind::terminate(), "SIGTERM")?;
    let mut run_now = install(SignalKind::user_defined1(), "SIGUSR1")?;
    let mut sync_now = install(SignalKind::hangup(), "SIGHUP")?;
    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => break,
                _ = tokio::signal::ctrl_c() => {
                    info!("received interrupt, shutting down");
                    let _ = shutdown_tx.send(true);
                    break;
                }
                _ = terminate.recv() => {
                    info!("received SIGTERM, shutting down");
                    let _ = shutdown_tx.send(true);
                    break;
                }
                _ = run_now.recv() => {
                    info!("received SIGUSR1, running a cycle now");
                    trigger.trigger();
                }
                _ = sync_now.recv() => match &reconciler {
                    Some(reconciler) => {
                        info!("received SIGHUP, syncing jobs file");
                        let reconciler = Arc::clone(reconciler);
                        tokio::spawn(async move {
                            reconciler.trigger_sync().await;
                        });
                    }
                    None => info!("received SIGHUP, but jobs file sync is disabled"),
                },
            }
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn spawn_signal_handlers(
    _trigger: TriggerHandle,
    _reconciler: Option<Arc<ConfigReconciler>>,
    shutdown_tx: watch::Sender<bool>,
) -> Result<()> {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trawl_store::Job;

    #[tokio::test]
    async fn test_file_store_is_shared_between_views() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let stores = open_stores(Some(path.as_path())).await.unwrap();
        stores.jobs.upsert_job(Job::new("a", "owner")).await.unwrap();

        let reopened = open_stores(Some(path.as_path())).await.unwrap();
        let jobs = reopened.jobs.get_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "a");
    }

    #[tokio::test]
    async fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(open_stores(Some(path.as_path())).await.is_err());
    }

    #[test]
    fn test_builtin_providers() {
        let registry = provider_registry();
        assert!(registry.get("http").is_some());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_resync_runs_on_timer_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"{"adapters": [{"id": "console"}], "jobs": [{"id": "a", "provider": [{"id": "http", "url": "https://example.test"}]}]}"#,
        )
        .unwrap();

        let stores = open_stores(None).await.unwrap();
        let reconciler = Arc::new(ConfigReconciler::new(
            &path,
            Arc::clone(&stores.jobs),
            Arc::clone(&stores.users),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn_resync(Arc::clone(&reconciler), Duration::from_millis(300), shutdown_rx);

        // No sync before the first period elapses
        assert!(reconciler.last_sync_time().is_none());

        let deadline = Instant::now() + Duration::from_secs(5);
        while reconciler.last_sync_time().is_none() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(reconciler.last_sync_time().is_some());
        assert_eq!(stores.jobs.get_jobs().await.unwrap().len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
