//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indexsync_client::{ClientOptions, HttpIndexingClient};
use indexsync_core::{ACTION_JOB, Action, CycleOutcome, JobRun, Worker, schedule_action};
use indexsync_shared::{
    ActionType, AppConfig, init_config, load_config, load_config_from, validate_backend_url,
};
use indexsync_storage::Storage;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// indexsync: keep a search index in step with deletions and access changes.
#[derive(Parser)]
#[command(
    name = "indexsync",
    version,
    about = "Queue index-maintenance actions and forward them to the indexing backend.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.indexsync/indexsync.toml).
    #[arg(long, global = true, env = "INDEXSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path, overriding the config file.
    #[arg(long, global = true, env = "INDEXSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Indexing backend base URL, overriding the config file.
    #[arg(long, global = true, env = "INDEXSYNC_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Queue an action and schedule the drain job.
    Enqueue {
        /// Action type, e.g. delete_user_id or update_access_source_id.
        action_type: String,

        /// JSON payload for the action.
        #[arg(short, long)]
        payload: Option<String>,
    },

    /// Inspect the action queue.
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Show queue depth, pending jobs and the last heartbeat.
    Status,

    /// Run pending jobs until nothing is due, then exit.
    Run,

    /// Run jobs continuously until interrupted.
    Worker,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Queue subcommands.
#[derive(Subcommand)]
pub(crate) enum QueueAction {
    /// List the oldest queued entries.
    List {
        /// Maximum entries to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Crates whose events the default filter lets through.
const LOG_TARGETS: [&str; 5] = [
    "indexsync",
    "indexsync_core",
    "indexsync_client",
    "indexsync_storage",
    "indexsync_shared",
];

/// `EnvFilter` directives used when `RUST_LOG` is unset.
fn default_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = default_filter(cli.verbose);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&resolve_config(&cli)?).await,
        };
    }

    let config = resolve_config(&cli)?;
    match cli.command {
        Command::Enqueue {
            action_type,
            payload,
        } => cmd_enqueue(&config, &action_type, payload.as_deref()).await,
        Command::Queue {
            action: QueueAction::List { limit },
        } => cmd_queue_list(&config, limit).await,
        Command::Status => cmd_status(&config).await,
        Command::Run => cmd_run(&config).await,
        Command::Worker => cmd_worker(&config).await,
        Command::Config { .. } => Ok(()),
    }
}

/// Load the config file and apply command-line overrides.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    if let Some(db) = &cli.db {
        config.database.path = Some(db.clone());
    }
    if let Some(url) = &cli.backend_url {
        config.backend.url = url.clone();
    }
    Ok(config)
}

fn db_path(config: &AppConfig) -> Result<PathBuf> {
    Ok(config.database.resolve_path()?)
}

async fn open_worker(config: &AppConfig) -> Result<Worker> {
    let base_url = validate_backend_url(config)?;
    let client = HttpIndexingClient::new(
        &base_url,
        &ClientOptions {
            timeout_secs: config.backend.timeout_secs,
        },
    )?;

    let path = db_path(config)?;
    let storage = Storage::open(&path)
        .await
        .wrap_err_with(|| format!("opening {}", path.display()))?;

    info!(db = %path.display(), backend = %base_url, "worker ready");
    Ok(Worker::new(Arc::new(storage), Arc::new(client)))
}

async fn open_readonly(path: &Path) -> Result<Storage> {
    Storage::open_readonly(path)
        .await
        .wrap_err("no queue database yet; enqueue an action first")
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_enqueue(config: &AppConfig, action_type: &str, payload: Option<&str>) -> Result<()> {
    let kind: ActionType = action_type.parse()?;
    let action = Action::from_parts(kind, payload).wrap_err("invalid payload")?;

    let storage = Storage::open(&db_path(config)?).await?;
    let id = schedule_action(&storage, &action).await?;

    println!("Queued {kind} as entry {id}");
    Ok(())
}

async fn cmd_queue_list(config: &AppConfig, limit: usize) -> Result<()> {
    let storage = open_readonly(&db_path(config)?).await?;
    let entries = storage.fetch_batch(limit).await?;

    if entries.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!("{:>8}  {:<30}  PAYLOAD", "ID", "TYPE");
    for entry in entries {
        println!(
            "{:>8}  {:<30}  {}",
            entry.id,
            entry.action_type,
            entry.payload.as_deref().unwrap_or("<null>")
        );
    }
    Ok(())
}

async fn cmd_status(config: &AppConfig) -> Result<()> {
    let path = db_path(config)?;
    let storage = open_readonly(&path).await?;

    let queued = storage.queue_len().await?;
    let jobs = storage.list_jobs().await?;
    let heartbeat = storage.last_heartbeat(ACTION_JOB).await?;

    println!();
    println!("  Database:  {}", path.display());
    println!("  Queued:    {queued}");
    if jobs.is_empty() {
        println!("  Jobs:      none pending");
    } else {
        for job in &jobs {
            println!("  Job:       {} (since {})", job.job_class, job.added_at.to_rfc3339());
        }
    }
    match heartbeat {
        Some(beat) => println!(
            "  Heartbeat: run {} at {}",
            beat.run_id,
            beat.beat_at.to_rfc3339()
        ),
        None => println!("  Heartbeat: never"),
    }
    println!();
    Ok(())
}

async fn cmd_run(config: &AppConfig) -> Result<()> {
    let worker = open_worker(config).await?;
    worker.ensure_scheduled().await?;

    let mut cycles = 0usize;
    while let Some(run) = worker.run_pending().await? {
        match run {
            JobRun::Ran {
                job,
                outcome: CycleOutcome::Rescheduled(report),
            } => {
                cycles += 1;
                println!(
                    "  run {}: fetched {}, dispatched {}, rejected {}, removed {}",
                    job.id, report.fetched, report.dispatched, report.rejected, report.removed
                );
            }
            JobRun::Ran {
                outcome: CycleOutcome::Idle,
                ..
            } => {}
            JobRun::Unknown(job) => println!("  skipped unknown job {}", job.job_class),
        }
    }

    if cycles == 0 {
        println!("Nothing to do.");
    }
    Ok(())
}

async fn cmd_worker(config: &AppConfig) -> Result<()> {
    let worker = open_worker(config).await?;
    let poll_interval = Duration::from_millis(config.worker.poll_interval_ms);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
    };

    worker.run_forever(poll_interval, shutdown).await?;
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
