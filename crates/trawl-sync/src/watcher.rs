//! Debounced watching of the jobs file.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

/// How long the file must stay quiet before a change is acted on.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Longer quiet periods are clamped to this.
pub const MAX_QUIET_PERIOD: Duration = Duration::from_secs(60 * 60);

enum DebounceState {
    Waiting,
    Pending(Instant),
}

/// Collapse bursts of change events into one callback.
///
/// Every event restarts the quiet timer; `on_stable_change` runs once the
/// timer expires with no further events. Events arriving while the callback
/// runs are queued and schedule another callback. Returns when `shutdown`
/// fires or every event sender is gone; a pending change is dropped.
/// `quiet` is clamped to [`MAX_QUIET_PERIOD`].
pub async fn debounce<F, Fut>(
    mut events: mpsc::UnboundedReceiver<()>,
    quiet: Duration,
    on_stable_change: F,
    mut shutdown: watch::Receiver<bool>,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let quiet = quiet.min(MAX_QUIET_PERIOD);
    let mut state = DebounceState::Waiting;

    loop {
        state = match state {
            DebounceState::Waiting => tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(()) => DebounceState::Pending(Instant::now() + quiet),
                    None => break,
                },
            },
            DebounceState::Pending(deadline) => tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(()) => DebounceState::Pending(Instant::now() + quiet),
                    None => break,
                },
                _ = sleep_until(deadline) => {
                    debug!("watched file settled");
                    on_stable_change().await;
                    DebounceState::Waiting
                }
            },
        };
    }
}

/// Keeps a file watch alive. Dropping it stops the watch.
pub struct WatchHandle {
    watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Wait for the debounce loop to end after shutdown was signalled.
    pub async fn join(self) {
        let Self { watcher, task } = self;
        if let Err(e) = task.await {
            warn!(error = %e, "file watch task failed");
        }
        drop(watcher);
    }

    /// Stop watching immediately. An in-flight callback is cancelled.
    pub async fn stop(self) {
        let Self { watcher, task } = self;
        drop(watcher);
        task.abort();
        if let Err(e) = task.await
            && !e.is_cancelled()
        {
            warn!(error = %e, "file watch task failed");
        }
    }
}

/// Watches a single file and runs a callback after it settles.
#[derive(Debug, Clone, Copy)]
pub struct FileWatchDebouncer {
    quiet: Duration,
}

impl Default for FileWatchDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}

impl FileWatchDebouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet: quiet.min(MAX_QUIET_PERIOD),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Start watching `path`.
    ///
    /// The parent directory is watched so that editors which replace the
    /// file instead of writing in place are still seen. Returns `None` if the
    /// platform watcher can't be set up; the caller carries on without
    /// live reload.
    pub fn watch<F, Fut>(
        &self,
        path: &Path,
        on_stable_change: F,
        shutdown: watch::Receiver<bool>,
    ) -> Option<WatchHandle>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(file_name) = path.file_name().map(OsString::from) else {
            warn!(path = %path.display(), "cannot watch a path without a file name");
            return None;
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) if is_relevant(&event, &file_name) => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "file watch error"),
            }
        });

        let mut watcher = match watcher {
            Ok(watcher) => watcher,
            Err(e) => {
                warn!(error = %e, "file watching unavailable, live reload disabled");
                return None;
            }
        };

        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!(
                dir = %dir.display(),
                error = %e,
                "failed to watch jobs file directory, live reload disabled"
            );
            return None;
        }

        info!(
            path = %path.display(),
            quiet_ms = self.quiet.as_millis() as u64,
            "watching jobs file"
        );

        let task = tokio::spawn(debounce(rx, self.quiet, on_stable_change, shutdown));
        Some(WatchHandle { watcher, task })
    }
}

fn is_relevant(event: &notify::Event, file_name: &OsString) -> bool {
    matches!(
        event.kind,
        EventKind::Any | EventKind::Create(_) | EventKind::Modify(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
