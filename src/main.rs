#![forbid(unsafe_code)]

//! `lab-stacks`: stack lifecycle server binary.
//!
//! Bootstraps configuration, the stack database, the local task worker
//! pool, and the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use lab_stacks::config::GlobalConfig;
use lab_stacks::http::{self, AppState};
use lab_stacks::orchestrator::{rearm_pending_suspends, DeadMansSwitch, LifecycleOrchestrator};
use lab_stacks::persistence::stack_repo::StackRepo;
use lab_stacks::persistence::{db, retention};
use lab_stacks::tasks::local::LocalTaskClient;
use lab_stacks::tasks::provisioner::CommandProvisioner;
use lab_stacks::tasks::TaskClient;
use lab_stacks::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "lab-stacks", about = "Lab stack lifecycle server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the configured HTTP port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("lab-stacks server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(port) = args.port {
        config.http_port = port;
    }
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(config.db_path()).await?);
    info!("database connected");

    // ── Start retention service ──────────────────────────
    let ct = CancellationToken::new();
    let retention_handle =
        retention::spawn_retention_task(Arc::clone(&db), config.retention_days, ct.clone());
    info!("retention service started");

    // ── Build task client and orchestrator ──────────────
    let provisioner = Arc::new(CommandProvisioner::from_config(&config.workers));
    let task_client = LocalTaskClient::from_config(provisioner, &config.workers, ct.child_token());
    let tasks: Arc<dyn TaskClient> = Arc::new(task_client.clone());
    let switch = DeadMansSwitch::new(Arc::clone(&tasks), config.suspend_delay());
    let orchestrator =
        LifecycleOrchestrator::new(tasks, switch.clone(), config.terminal_url.clone());
    info!(
        pool_size = config.workers.pool_size,
        suspend_delay_seconds = config.lifecycle.suspend_delay_seconds,
        "task worker pool ready"
    );

    // ── Re-arm switches from the prior run ──────────────
    let repo = StackRepo::new(Arc::clone(&db));
    rearm_pending_suspends(&repo, &switch, &config.credentials()).await?;

    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        db,
        orchestrator,
    });

    // ── Start HTTP API ──────────────────────────────────
    let http_ct = ct.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve_http(state, http_ct).await {
            error!(%err, "http api failed");
        }
    });

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();
    task_client.close();

    let _ = tokio::join!(http_handle, retention_handle);
    info!("lab-stacks shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
