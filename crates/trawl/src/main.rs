//! Trawl: periodic listing collection driven by a declarative jobs file.
//!
//! Main binary with subcommands:
//! - `daemon`: Interval-driven execution cycles with live jobs file sync
//! - `sync`: Reconcile the jobs file into the store once
//! - `validate`: Check the jobs file without touching the store

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trawl_scheduler::{DEFAULT_CONCURRENCY, GatePolicy, WorkingHours};

mod daemon;
mod http;
mod sync;

use daemon::{
    DEFAULT_INTERVAL_MINUTES, DEFAULT_QUIET_PERIOD_MS, DEFAULT_SYNC_INTERVAL_MINUTES, DaemonConfig,
    MAX_HTTP_TIMEOUT_SECS, MAX_INTERVAL_MINUTES, MAX_QUIET_PERIOD_MS,
};

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

fn default_jobs_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trawl")
        .join("jobs.json")
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trawl")
        .join("store.json")
}

#[derive(Parser)]
#[command(name = "trawl")]
#[command(about = "Periodic listing collection from a declarative jobs file", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct StoreArgs {
    /// Job store file (defaults to the platform data directory)
    #[arg(long, env = "TRAWL_STORE_PATH")]
    store_path: Option<PathBuf>,

    /// Keep the job store in memory only
    #[arg(long, conflicts_with = "store_path")]
    ephemeral: bool,
}

impl StoreArgs {
    fn resolve(self) -> Option<PathBuf> {
        if self.ephemeral {
            None
        } else {
            Some(self.store_path.unwrap_or_else(default_store_path))
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run execution cycles on an interval and keep the store in step with the jobs file
    Daemon {
        /// Minutes between execution cycles
        #[arg(
            long,
            env = "TRAWL_INTERVAL_MINUTES",
            default_value_t = DEFAULT_INTERVAL_MINUTES,
            value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_MINUTES)
        )]
        interval_minutes: u64,

        /// Maximum provider tasks running at once
        #[arg(
            long,
            env = "TRAWL_CONCURRENCY",
            default_value_t = DEFAULT_CONCURRENCY as u64,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        concurrency: u64,

        /// Skip every execution cycle.
        /// Accepts "1", "true", "yes", "on" or "0", "false", "no", "off".
        #[arg(long, env = "TRAWL_DEMO_MODE", value_parser = parse_bool_env, default_value = "false")]
        demo_mode: bool,

        /// Only run cycles inside this local-time window, e.g. 08:00-22:00
        #[arg(long, env = "TRAWL_WORKING_HOURS")]
        working_hours: Option<WorkingHours>,

        /// Reconcile the jobs file into the store
        #[arg(long, env = "TRAWL_SYNC_ENABLED", value_parser = parse_bool_env, default_value = "true")]
        sync_enabled: bool,

        /// Jobs file (defaults to the platform config directory)
        #[arg(long, env = "TRAWL_JOBS_FILE")]
        jobs_file: Option<PathBuf>,

        /// Minutes between periodic re-syncs of the jobs file (0 to disable)
        #[arg(
            long,
            env = "TRAWL_SYNC_INTERVAL_MINUTES",
            default_value_t = DEFAULT_SYNC_INTERVAL_MINUTES,
            value_parser = clap::value_parser!(u64).range(0..=MAX_INTERVAL_MINUTES)
        )]
        sync_interval_minutes: u64,

        /// Quiet period before a jobs file change is synced, in milliseconds
        #[arg(
            long,
            env = "TRAWL_SYNC_QUIET_MS",
            default_value_t = DEFAULT_QUIET_PERIOD_MS,
            value_parser = clap::value_parser!(u64).range(0..=MAX_QUIET_PERIOD_MS)
        )]
        quiet_ms: u64,

        /// Default timeout for `http` provider requests, in seconds
        #[arg(
            long,
            env = "TRAWL_HTTP_TIMEOUT_SECS",
            default_value_t = http::DEFAULT_HTTP_TIMEOUT.as_secs(),
            value_parser = clap::value_parser!(u64).range(1..=MAX_HTTP_TIMEOUT_SECS)
        )]
        http_timeout_secs: u64,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Reconcile the jobs file into the store once
    Sync {
        /// Jobs file (defaults to the platform config directory)
        #[arg(long, env = "TRAWL_JOBS_FILE")]
        jobs_file: Option<PathBuf>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Check the jobs file and its placeholders without touching the store
    Validate {
        /// Jobs file (defaults to the platform config directory)
        #[arg(long, env = "TRAWL_JOBS_FILE")]
        jobs_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "trawl=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            interval_minutes,
            concurrency,
            demo_mode,
            working_hours,
            sync_enabled,
            jobs_file,
            sync_interval_minutes,
            quiet_ms,
            http_timeout_secs,
            store,
        } => {
            daemon::run(DaemonConfig {
                interval: Duration::from_secs(interval_minutes * 60),
                policy: GatePolicy {
                    demo_mode,
                    working_hours,
                    concurrency: concurrency as usize,
                },
                store_path: store.resolve(),
                jobs_file: jobs_file.unwrap_or_else(default_jobs_file),
                sync_enabled,
                sync_interval: (sync_interval_minutes > 0)
                    .then(|| Duration::from_secs(sync_interval_minutes * 60)),
                quiet_period: Duration::from_millis(quiet_ms),
                http_timeout: Duration::from_secs(http_timeout_secs),
            })
            .await
        }

        Commands::Sync { jobs_file, store } => {
            let jobs_file = jobs_file.unwrap_or_else(default_jobs_file);
            sync::run(&jobs_file, store.resolve().as_deref()).await
        }

        Commands::Validate { jobs_file } => {
            sync::validate(&jobs_file.unwrap_or_else(default_jobs_file)).await
        }
    }
}
